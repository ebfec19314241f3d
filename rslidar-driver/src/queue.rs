use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crossbeam_utils::CachePadded;

/// FIFO of packets with a single-consumer claim flag.
///
/// The producer pushes and then calls [`PacketQueue::try_claim`]; only when
/// the claim succeeds does it submit a consumer task. The consumer drains
/// the queue and calls [`PacketQueue::release`] when it exits. At most one
/// consumer holds the claim at any time.
pub(crate) struct PacketQueue<T> {
    items: Mutex<VecDeque<T>>,
    task_finished: CachePadded<AtomicBool>,
    #[cfg(test)]
    consumers: ConsumerCount,
}

/// Number of consumers inside their drain loop, and the highest seen.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct ConsumerCount {
    active: std::sync::atomic::AtomicUsize,
    max_active: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
pub(crate) struct ActiveConsumer<'a>(&'a ConsumerCount);

#[cfg(test)]
impl Drop for ActiveConsumer<'_> {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<T> PacketQueue<T> {
    pub(crate) fn new() -> Self {
        PacketQueue {
            items: Mutex::new(VecDeque::new()),
            task_finished: CachePadded::new(AtomicBool::new(true)),
            #[cfg(test)]
            consumers: ConsumerCount::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn push(&self, item: T) {
        self.lock().push_back(item);
    }

    pub(crate) fn pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Discards every queued item and returns how many were dropped.
    pub(crate) fn clear(&self) -> usize {
        let mut items = self.lock();
        let n = items.len();
        items.clear();
        n
    }

    /// Returns true if the caller became the consumer.
    pub(crate) fn try_claim(&self) -> bool {
        self.task_finished
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn release(&self) {
        self.task_finished.store(true, Ordering::Release);
    }

    #[cfg(test)]
    pub(crate) fn is_task_finished(&self) -> bool {
        self.task_finished.load(Ordering::Acquire)
    }

    /// Counts the caller as a consumer until the returned value is dropped.
    #[cfg(test)]
    pub(crate) fn track_consumer(&self) -> ActiveConsumer<'_> {
        let now = self.consumers.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.consumers.max_active.fetch_max(now, Ordering::SeqCst);
        ActiveConsumer(&self.consumers)
    }

    #[cfg(test)]
    pub(crate) fn max_consumers(&self) -> usize {
        self.consumers.max_active.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let queue = PacketQueue::new();
        for i in 0..5 {
            queue.push(i);
        }
        assert_eq!(queue.len(), 5);
        let drained: Vec<i32> = std::iter::from_fn(|| queue.pop()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_clear_returns_dropped_count() {
        let queue = PacketQueue::new();
        queue.push(1u8);
        queue.push(2u8);
        assert_eq!(queue.clear(), 2);
        assert!(queue.pop().is_none());
        assert_eq!(queue.clear(), 0);
    }

    #[test]
    fn test_claim_is_exclusive() {
        let queue = PacketQueue::<u8>::new();
        assert!(queue.is_task_finished());
        assert!(queue.try_claim());
        assert!(!queue.is_task_finished());
        assert!(!queue.try_claim());
        queue.release();
        assert!(queue.try_claim());
    }

    #[test]
    fn test_track_consumer_records_overlap() {
        let queue = PacketQueue::<u8>::new();
        assert_eq!(queue.max_consumers(), 0);
        {
            let _first = queue.track_consumer();
        }
        {
            let _second = queue.track_consumer();
        }
        assert_eq!(queue.max_consumers(), 1);
        {
            let _first = queue.track_consumer();
            let _second = queue.track_consumer();
        }
        assert_eq!(queue.max_consumers(), 2);
    }
}
