//! # Event Bridge
//!
//! Hands events from provider callback threads to the single polling
//! thread that owns the engine state.
//!
//! Producers capture everything an event needs **by value** at the point
//! of the callback and push a boxed closure; the consumer later runs each
//! closure against the engine state from `poll()`. No provider-owned
//! memory is ever borrowed across the boundary.
//!
//! The queue is bounded and never blocks a producer: when it is full the
//! event is dropped, a warning is logged and an overflow counter is
//! bumped. Consumers drain in strict FIFO order.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, TrySendError, sync_channel};

use log::{debug, warn};

/// A deferred state mutation crossing from a producer thread.
type Event<S> = Box<dyn FnOnce(&mut S) + Send + 'static>;

/// Consumer half of the bridge, owned by the engine next to its state.
pub struct EventBridge<S> {
    sender: SyncSender<Event<S>>,
    receiver: Receiver<Event<S>>,
    overflow: Arc<AtomicU64>,
}

impl<S> EventBridge<S> {
    /// Creates a bridge holding at most `capacity` pending events.
    pub fn new(capacity: usize) -> Self {
        // A zero-slot channel would turn every push into a drop.
        let (sender, receiver) = sync_channel(capacity.max(1));
        EventBridge {
            sender,
            receiver,
            overflow: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns a new producer handle. Handles are cheap to clone and may
    /// be moved to any thread.
    pub fn sender(&self) -> BridgeSender<S> {
        BridgeSender {
            sender: self.sender.clone(),
            overflow: Arc::clone(&self.overflow),
        }
    }

    /// Runs every queued event against `state` in arrival order and
    /// returns how many were executed. Events pushed while draining are
    /// picked up in the same call.
    pub fn drain(&mut self, state: &mut S) -> usize {
        let mut executed = 0;
        while let Ok(event) = self.receiver.try_recv() {
            event(state);
            executed += 1;
        }
        executed
    }

    /// Number of events dropped so far because the queue was full.
    pub fn overflow_count(&self) -> u64 {
        self.overflow.load(Ordering::Relaxed)
    }
}

/// Producer half of the bridge. Pushing never blocks.
pub struct BridgeSender<S> {
    sender: SyncSender<Event<S>>,
    overflow: Arc<AtomicU64>,
}

// Manual impl: `S` itself is never cloned, so no `S: Clone` bound.
impl<S> Clone for BridgeSender<S> {
    fn clone(&self) -> Self {
        BridgeSender {
            sender: self.sender.clone(),
            overflow: Arc::clone(&self.overflow),
        }
    }
}

impl<S> BridgeSender<S> {
    /// Queues `event` for the consumer. If the queue is full the event is
    /// dropped and counted; if the consumer is gone it is dropped
    /// silently.
    pub fn push<F>(&self, event: F)
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        match self.sender.try_send(Box::new(event)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let dropped = self.overflow.fetch_add(1, Ordering::Relaxed) + 1;
                warn!("event bridge full, dropping event ({dropped} dropped so far)");
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("event bridge consumer gone, dropping event");
            }
        }
    }

    /// Number of events dropped so far because the queue was full.
    pub fn overflow_count(&self) -> u64 {
        self.overflow.load(Ordering::Relaxed)
    }
}
