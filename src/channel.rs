//! Inter-thread message channel with dual-queue draining.
//!
//! A sender appends to the *idle* queue under a mutex and wakes the
//! receiver; the receiver, on the wakeup event, locks only long enough to
//! swap the idle and *active* queues and then drains `active` without
//! holding the lock. This bounds the critical section to a pointer swap
//! regardless of queue depth, and preserves FIFO order within a single
//! sender.
//!
//! The wakeup is backed by `mio::Waker`, which lets the receiver register
//! the same `Poll` it already uses for socket readiness.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use mio::Waker;

struct Inner<T> {
    idle: Mutex<VecDeque<T>>,
    waker: Waker,
}

/// The sending half of a channel. Cheaply cloneable; every clone wakes the
/// same receiver.
pub struct Sender<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Sender<T> {
    /// Appends `msg` to the idle queue and wakes the receiver's poll.
    pub fn send(&self, msg: T) -> io::Result<()> {
        self.inner.idle.lock().expect("channel mutex poisoned").push_back(msg);
        self.inner.waker.wake()
    }
}

/// The receiving half of a channel. Owned by exactly one worker thread.
pub struct Receiver<T> {
    inner: Arc<Inner<T>>,
    active: VecDeque<T>,
}

impl<T> Receiver<T> {
    /// Swaps the idle queue into `active` and drains it. Call this once per
    /// wakeup event; it is safe to call speculatively (an empty idle queue
    /// is a no-op swap).
    pub fn drain(&mut self) -> std::collections::vec_deque::Drain<'_, T> {
        {
            let mut idle = self.inner.idle.lock().expect("channel mutex poisoned");
            std::mem::swap(&mut *idle, &mut self.active);
        }
        self.active.drain(..)
    }
}

/// Creates a linked sender/receiver pair, with the receiver's readiness
/// signaled through `waker`.
pub fn channel<T>(waker: Waker) -> (Sender<T>, Receiver<T>) {
    let inner = Arc::new(Inner {
        idle: Mutex::new(VecDeque::new()),
        waker,
    });
    (
        Sender {
            inner: Arc::clone(&inner),
        },
        Receiver {
            inner,
            active: VecDeque::new(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::{Poll, Token};

    fn test_waker() -> (Poll, Waker) {
        let poll = Poll::new().unwrap();
        let waker = Waker::new(poll.registry(), Token(0)).unwrap();
        (poll, waker)
    }

    #[test]
    fn single_sender_preserves_fifo_order() {
        let (_poll, waker) = test_waker();
        let (tx, mut rx) = channel::<u32>(waker);
        for i in 0..5 {
            tx.send(i).unwrap();
        }
        let drained: Vec<_> = rx.drain().collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn per_sender_order_preserved_across_interleaved_senders() {
        let (_poll, waker) = test_waker();
        let (tx_a, mut rx) = channel::<(char, u32)>(waker);
        let tx_b = tx_a.clone();

        tx_a.send(('a', 0)).unwrap();
        tx_b.send(('b', 0)).unwrap();
        tx_a.send(('a', 1)).unwrap();
        tx_b.send(('b', 1)).unwrap();

        let drained: Vec<_> = rx.drain().collect();
        let a_seq: Vec<_> = drained.iter().filter(|(s, _)| *s == 'a').map(|(_, n)| *n).collect();
        let b_seq: Vec<_> = drained.iter().filter(|(s, _)| *s == 'b').map(|(_, n)| *n).collect();
        assert_eq!(a_seq, vec![0, 1]);
        assert_eq!(b_seq, vec![0, 1]);
    }

    #[test]
    fn drain_on_empty_idle_queue_is_a_no_op() {
        let (_poll, waker) = test_waker();
        let (_tx, mut rx) = channel::<u32>(waker);
        assert_eq!(rx.drain().count(), 0);
    }

    #[test]
    fn messages_sent_after_a_drain_are_delivered_on_the_next_one() {
        let (_poll, waker) = test_waker();
        let (tx, mut rx) = channel::<u32>(waker);
        tx.send(1).unwrap();
        assert_eq!(rx.drain().collect::<Vec<_>>(), vec![1]);
        tx.send(2).unwrap();
        assert_eq!(rx.drain().collect::<Vec<_>>(), vec![2]);
    }
}
