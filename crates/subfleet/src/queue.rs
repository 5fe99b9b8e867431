use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::error;

/// Bounded FIFO shared between the event router and the embedder.
///
/// Push never blocks: at capacity the oldest entry is discarded first, so the
/// queue length never exceeds `cap` once a push returns.
pub(crate) struct EventQueue<T> {
    items: Mutex<VecDeque<T>>,
    cap: usize,
    label: &'static str,
}

impl<T> EventQueue<T> {
    pub(crate) fn new(cap: usize, label: &'static str) -> Self {
        assert!(cap > 0, "queue capacity must be positive");
        Self {
            items: Mutex::new(VecDeque::with_capacity(cap.min(64))),
            cap,
            label,
        }
    }

    pub(crate) fn push(&self, item: T) {
        let mut items = self.items.lock().unwrap();
        if items.len() >= self.cap {
            error!(queue = self.label, cap = self.cap, "queue full, dropping oldest entry");
            items.pop_front();
        }
        items.push_back(item);
    }

    pub(crate) fn try_pop(&self) -> Option<T> {
        self.items.lock().unwrap().pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_preserves_fifo_order() {
        let queue = EventQueue::new(4, "test");
        queue.push(1);
        queue.push(2);
        queue.push(3);
        assert_eq!(queue.try_pop(), Some(1));
        assert_eq!(queue.try_pop(), Some(2));
        assert_eq!(queue.try_pop(), Some(3));
        assert_eq!(queue.try_pop(), None);
    }

    #[test]
    fn overflow_drops_oldest_and_keeps_cap() {
        let queue = EventQueue::new(3, "test");
        for i in 0..8 {
            queue.push(i);
            assert!(queue.len() <= 3);
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.try_pop(), Some(5));
        assert_eq!(queue.try_pop(), Some(6));
        assert_eq!(queue.try_pop(), Some(7));
    }

    #[test]
    fn empty_pop_returns_none_without_blocking() {
        let queue: EventQueue<u8> = EventQueue::new(1, "test");
        assert_eq!(queue.try_pop(), None);
        assert_eq!(queue.len(), 0);
    }
}
