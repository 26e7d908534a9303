//! Observer lists for engine events.
//!
//! Handlers are invoked synchronously on the polling thread while events
//! are dispatched, in the order they were connected. A connection is
//! identified by a [`HandlerId`] and can be removed at any time.

use std::sync::atomic::{AtomicU64, Ordering};

// Ids are minted process-wide so a single id can never refer to slots in
// two different lists.
static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one connected handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

impl HandlerId {
    fn next() -> Self {
        HandlerId(NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

type Handler<E> = Box<dyn FnMut(&E) + Send>;

/// An ordered list of callbacks interested in events of type `E`.
pub struct ObserverList<E> {
    slots: Vec<(HandlerId, Handler<E>)>,
}

impl<E> Default for ObserverList<E> {
    fn default() -> Self {
        ObserverList { slots: Vec::new() }
    }
}

impl<E> ObserverList<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handler and returns its id.
    pub fn connect<F>(&mut self, handler: F) -> HandlerId
    where
        F: FnMut(&E) + Send + 'static,
    {
        let id = HandlerId::next();
        self.slots.push((id, Box::new(handler)));
        id
    }

    /// Removes the handler with `id`. Returns `false` if it was not in
    /// this list.
    pub fn disconnect(&mut self, id: HandlerId) -> bool {
        let before = self.slots.len();
        self.slots.retain(|(slot_id, _)| *slot_id != id);
        self.slots.len() != before
    }

    /// Calls every handler with `event`, in connection order.
    pub fn emit(&mut self, event: &E) {
        for (_, handler) in self.slots.iter_mut() {
            handler(event);
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_emit_calls_handlers_in_connection_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut list: ObserverList<u32> = ObserverList::new();

        let first = Arc::clone(&order);
        list.connect(move |value: &u32| first.lock().unwrap().push(("first", *value)));
        let second = Arc::clone(&order);
        list.connect(move |value: &u32| second.lock().unwrap().push(("second", *value)));

        list.emit(&7);
        assert_eq!(*order.lock().unwrap(), vec![("first", 7), ("second", 7)]);
    }

    #[test]
    fn test_disconnect_removes_only_that_handler() {
        let hits = Arc::new(Mutex::new(Vec::new()));
        let mut list: ObserverList<u32> = ObserverList::new();

        let a = Arc::clone(&hits);
        let id_a = list.connect(move |_: &u32| a.lock().unwrap().push("a"));
        let b = Arc::clone(&hits);
        let _id_b = list.connect(move |_: &u32| b.lock().unwrap().push("b"));

        assert!(list.disconnect(id_a));
        assert!(!list.disconnect(id_a));
        list.emit(&0);
        assert_eq!(*hits.lock().unwrap(), vec!["b"]);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_ids_are_unique_across_lists() {
        let mut numbers: ObserverList<u32> = ObserverList::new();
        let mut strings: ObserverList<String> = ObserverList::new();
        let id_n = numbers.connect(|_| {});
        let id_s = strings.connect(|_| {});
        assert_ne!(id_n, id_s);
        // An id from one list never disconnects from another.
        assert!(!numbers.disconnect(id_s));
    }

    #[test]
    fn test_emit_on_empty_list_is_noop() {
        let mut list: ObserverList<u32> = ObserverList::new();
        assert!(list.is_empty());
        list.emit(&1);
    }
}
