//! Supervised background threads for provider backends.
//!
//! Backend callback loops run on a named thread with a shared stop flag.
//! The thread is joined on `stop()` and again as a safety net on drop, so
//! a provider can never leak a detached thread past its own lifetime.
//! Loop bodies must use bounded waits and recheck the flag between them.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use log::{debug, warn};

use crate::error::Result;

/// A named worker thread that is always joined before its owner goes away.
pub struct SupervisedWorker {
    name: String,
    stop: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl SupervisedWorker {
    /// Spawns `body` on a thread called `name`. The body receives the
    /// stop flag and should return soon after it is raised.
    pub fn spawn<F>(name: &str, body: F) -> Result<Self>
    where
        F: FnOnce(Arc<AtomicBool>) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(flag))?;
        debug!("worker '{name}' started");
        Ok(SupervisedWorker {
            name: name.to_string(),
            stop,
            thread: Some(thread),
        })
    }

    /// Raises the stop flag and joins the thread. Safe to call more than
    /// once.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("worker '{}' panicked", self.name);
            } else {
                debug!("worker '{}' joined", self.name);
            }
        }
    }
}

impl Drop for SupervisedWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn test_body_runs_until_stopped() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let mut worker = SupervisedWorker::spawn("test-ticker", move |stop| {
            while !stop.load(Ordering::SeqCst) {
                counter.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(5));
            }
        })
        .unwrap();

        thread::sleep(Duration::from_millis(50));
        worker.stop();
        let after_stop = ticks.load(Ordering::SeqCst);
        assert!(after_stop > 0);

        // Joined: the count no longer moves.
        thread::sleep(Duration::from_millis(20));
        assert_eq!(ticks.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut worker = SupervisedWorker::spawn("test-idle", |stop| {
            while !stop.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(5));
            }
        })
        .unwrap();
        worker.stop();
        worker.stop();
    }

    #[test]
    fn test_drop_waits_for_completion() {
        let done = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&done);
        let worker = SupervisedWorker::spawn("test-oneshot", move |_stop| {
            thread::sleep(Duration::from_millis(30));
            flag.store(true, Ordering::SeqCst);
        })
        .unwrap();

        drop(worker);
        assert!(done.load(Ordering::SeqCst));
    }
}
