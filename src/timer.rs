//! Per-thread monotonic-time timer wheel.
//!
//! A `TimerWheel` is a priority queue of [`Timer`] records ordered by
//! `fire_at`, with stable per-thread ids so a connection's destruction path
//! can cancel exactly the timers it owns.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::collections::HashSet;
use std::time::Instant;

use crate::connection::ConnId;

/// Stable per-thread timer identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

/// What kind of deadline a timer represents, used to route
/// `handle_timeout` calls to the right logic without a dynamic cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// The protocol detector's detection deadline.
    DetectTimeout,
    /// A graceful close, run from the event loop rather than a handler.
    DelayClose,
    /// HTTP/2 client PING interval.
    H2Ping,
    /// HTTP/2 client total-response deadline.
    H2TotalTimeout,
    /// User-scheduled timeout, opaque to the core.
    UserTimeout(u32),
}

/// A scheduled callback, fired once `fire_at <= now`.
#[derive(Debug, Clone)]
pub struct Timer {
    /// Stable id, unique within this thread's wheel.
    pub id: TimerId,
    /// Connection that owns this timer.
    pub conn: ConnId,
    /// What this timer represents.
    pub kind: TimerKind,
    /// When the timer fires.
    pub fire_at: Instant,
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at == other.fire_at && self.id == other.id
    }
}
impl Eq for Timer {}

impl Ord for Timer {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse so `BinaryHeap` (a max-heap) pops the earliest deadline first.
        other.fire_at.cmp(&self.fire_at)
    }
}
impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Per-worker timer wheel.
#[derive(Debug, Default)]
pub struct TimerWheel {
    heap: BinaryHeap<Timer>,
    cancelled: HashSet<TimerId>,
    next_id: u64,
}

impl TimerWheel {
    /// Creates an empty wheel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `kind` for `conn` to fire at `fire_at`, returning its id.
    pub fn schedule(&mut self, conn: ConnId, kind: TimerKind, fire_at: Instant) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.heap.push(Timer {
            id,
            conn,
            kind,
            fire_at,
        });
        id
    }

    /// Cancels a previously scheduled timer. Idempotent; cancelling an
    /// already-fired or unknown id is a no-op.
    pub fn cancel(&mut self, id: TimerId) {
        self.cancelled.insert(id);
    }

    /// Cancels every timer owned by `conn`. Used by the connection
    /// destruction path.
    pub fn cancel_all_for(&mut self, conn: ConnId) {
        for timer in self.heap.iter() {
            if timer.conn == conn {
                self.cancelled.insert(timer.id);
            }
        }
    }

    /// Pops and returns every timer whose deadline has elapsed as of `now`,
    /// in monotonic fire-order, skipping cancelled ones.
    pub fn drain_expired(&mut self, now: Instant) -> Vec<Timer> {
        let mut fired = Vec::new();
        while let Some(top) = self.heap.peek() {
            if top.fire_at > now {
                break;
            }
            let timer = self.heap.pop().expect("peeked Some");
            if self.cancelled.remove(&timer.id) {
                continue;
            }
            fired.push(timer);
        }
        fired
    }

    /// Whether the wheel currently holds no live timers.
    pub fn is_empty(&self) -> bool {
        self.heap.len() == self.cancelled.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn conn(n: u32) -> ConnId {
        ConnId { thread: 0, local: n }
    }

    #[test]
    fn timers_fire_in_monotonic_order() {
        let mut wheel = TimerWheel::new();
        let now = Instant::now();
        wheel.schedule(conn(1), TimerKind::DetectTimeout, now + Duration::from_millis(30));
        wheel.schedule(conn(2), TimerKind::DetectTimeout, now + Duration::from_millis(10));
        wheel.schedule(conn(3), TimerKind::DetectTimeout, now + Duration::from_millis(20));

        let fired = wheel.drain_expired(now + Duration::from_millis(25));
        let order: Vec<_> = fired.iter().map(|t| t.conn.local).collect();
        assert_eq!(order, vec![2, 3]);
    }

    #[test]
    fn cancelled_timer_does_not_fire() {
        let mut wheel = TimerWheel::new();
        let now = Instant::now();
        let id = wheel.schedule(conn(1), TimerKind::DelayClose, now);
        wheel.cancel(id);
        assert!(wheel.drain_expired(now + Duration::from_millis(1)).is_empty());
    }

    #[test]
    fn cancel_all_for_connection_removes_its_timers_only() {
        let mut wheel = TimerWheel::new();
        let now = Instant::now();
        wheel.schedule(conn(1), TimerKind::DetectTimeout, now);
        wheel.schedule(conn(2), TimerKind::DetectTimeout, now);
        wheel.cancel_all_for(conn(1));

        let fired = wheel.drain_expired(now);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].conn, conn(2));
    }
}
