use crate::agent::error::MonitorError;
use crate::util::cancel::CancelToken;
use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, select};
use deskwatch_core::events::ActivityEvent;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Result of one bounded wait on the queue.
#[derive(Debug, PartialEq, Eq)]
pub enum Pop {
    Event(ActivityEvent),
    /// Nothing arrived before the timeout, or the wait was cut short by closing.
    Idle,
}

/// FIFO handoff between the sampler and the persistence worker.
///
/// Pushing never blocks: when the queue is at capacity the new event is
/// rejected and counted. A capacity of zero makes the queue unbounded.
///
/// The producer side calls [`EventQueue::close`] once it has made its last
/// push. Until then an empty queue only means "nothing yet".
#[derive(Clone)]
pub struct EventQueue {
    tx: Sender<ActivityEvent>,
    rx: Receiver<ActivityEvent>,
    capacity: Option<usize>,
    overflowed: Arc<AtomicU64>,
    closed: CancelToken,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx, capacity) = if capacity == 0 {
            let (tx, rx) = crossbeam_channel::unbounded();
            (tx, rx, None)
        } else {
            let (tx, rx) = crossbeam_channel::bounded(capacity);
            (tx, rx, Some(capacity))
        };
        Self {
            tx,
            rx,
            capacity,
            overflowed: Arc::new(AtomicU64::new(0)),
            closed: CancelToken::new(),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(0)
    }

    pub fn push(&self, event: ActivityEvent) -> Result<(), MonitorError> {
        match self.tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.overflowed.fetch_add(1, Ordering::Relaxed);
                Err(MonitorError::QueueFull {
                    capacity: self.capacity.unwrap_or(usize::MAX),
                })
            }
            // The queue holds its own receiver, so it cannot disconnect.
            Err(TrySendError::Disconnected(_)) => unreachable!("event queue receiver dropped"),
        }
    }

    /// Marks the producer side as finished. Idempotent.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Closed and nothing left to hand out.
    pub fn is_exhausted(&self) -> bool {
        self.is_closed() && self.is_empty()
    }

    /// Waits up to `timeout` for the next event.
    ///
    /// Once the queue is closed this no longer waits at all; it hands out
    /// whatever is still queued and reports `Idle` when empty.
    pub fn pop(&self, timeout: Duration) -> Pop {
        if self.is_closed() {
            return self.try_pop();
        }
        select! {
            recv(self.rx) -> msg => match msg {
                Ok(event) => Pop::Event(event),
                Err(_) => Pop::Idle,
            },
            recv(self.closed.signal()) -> _ => self.try_pop(),
            default(timeout) => Pop::Idle,
        }
    }

    pub fn try_pop(&self) -> Pop {
        match self.rx.try_recv() {
            Ok(event) => Pop::Event(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => Pop::Idle,
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Events rejected because the queue was full.
    pub fn overflowed(&self) -> u64 {
        self.overflowed.load(Ordering::Relaxed)
    }

    /// Empties the queue without delivering anything. Returns how many events
    /// were thrown away.
    pub fn discard_pending(&self) -> usize {
        self.rx.try_iter().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::thread;
    use std::time::Instant;

    fn event(title: &str) -> ActivityEvent {
        ActivityEvent::new(Utc::now(), title, "proc", "alice")
    }

    fn titles(queue: &EventQueue) -> Vec<String> {
        let mut out = Vec::new();
        while let Pop::Event(e) = queue.pop(Duration::from_millis(1)) {
            out.push(e.activity);
        }
        out
    }

    #[test]
    fn preserves_fifo_order() {
        let queue = EventQueue::new(16);
        for t in ["a", "b", "c", "d"] {
            queue.push(event(t)).expect("push");
        }
        assert_eq!(queue.len(), 4);
        assert_eq!(titles(&queue), vec!["a", "b", "c", "d"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn full_queue_rejects_new_events_without_blocking() {
        let queue = EventQueue::new(2);
        queue.push(event("a")).expect("push a");
        queue.push(event("b")).expect("push b");

        let start = Instant::now();
        let err = queue.push(event("c")).expect_err("queue should be full");
        assert!(start.elapsed() < Duration::from_millis(100));
        assert!(matches!(err, MonitorError::QueueFull { capacity: 2 }));
        assert_eq!(queue.overflowed(), 1);

        // The oldest events are kept.
        assert_eq!(titles(&queue), vec!["a", "b"]);
    }

    #[test]
    fn zero_capacity_means_unbounded() {
        let queue = EventQueue::new(0);
        for i in 0..10_000 {
            queue.push(event(&i.to_string())).expect("push");
        }
        assert_eq!(queue.len(), 10_000);
        assert_eq!(queue.overflowed(), 0);
    }

    #[test]
    fn pop_times_out_when_idle() {
        let queue = EventQueue::unbounded();
        let start = Instant::now();
        assert_eq!(queue.pop(Duration::from_millis(40)), Pop::Idle);
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn closing_interrupts_an_idle_pop() {
        let queue = EventQueue::unbounded();
        let waiter = {
            let queue = queue.clone();
            thread::spawn(move || {
                let start = Instant::now();
                let popped = queue.pop(Duration::from_secs(30));
                (popped, start.elapsed())
            })
        };
        thread::sleep(Duration::from_millis(20));
        queue.close();

        let (popped, elapsed) = waiter.join().expect("waiter panicked");
        assert_eq!(popped, Pop::Idle);
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn closed_queue_still_hands_out_remaining_events() {
        let queue = EventQueue::unbounded();
        queue.push(event("a")).expect("push");
        queue.push(event("b")).expect("push");
        queue.close();

        assert!(!queue.is_exhausted());
        assert_eq!(titles(&queue), vec!["a", "b"]);
        assert_eq!(queue.pop(Duration::from_secs(30)), Pop::Idle);
        assert!(queue.is_exhausted());
    }

    #[test]
    fn empty_open_queue_is_not_exhausted() {
        let queue = EventQueue::unbounded();
        assert!(!queue.is_exhausted());
        queue.close();
        queue.close();
        assert!(queue.is_exhausted());
    }

    #[test]
    fn discard_pending_empties_the_queue() {
        let queue = EventQueue::new(8);
        for t in ["a", "b", "c"] {
            queue.push(event(t)).expect("push");
        }
        assert_eq!(queue.discard_pending(), 3);
        assert!(queue.is_empty());
        assert_eq!(queue.discard_pending(), 0);
    }
}
