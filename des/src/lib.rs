//! Discrete-event simulation engine
//!
//! The engine is built from three layers:
//!
//! - [`EventQueue`]: the virtual clock and the pending-event heap. Events are
//!   ordered by `(scheduled_time, sequence_id)` so that same-time events fire
//!   in the order they were scheduled.
//! - [`Simulation`]: the cooperative process scheduler. Processes are explicit
//!   state machines implementing [`Process`]; they suspend on a timed wait or
//!   on a [`ResourcePool`] slot and are resumed when the matching event fires.
//! - [`ResourcePool`]: a fixed number of identical slots with a FIFO queue.
//!
//! [`parallel`] runs many independent simulations side by side, one per
//! worker thread. A single simulation is always single-threaded.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use tracing::trace;

pub mod error;
pub mod parallel;
pub mod resource;
pub mod scheduler;

pub use error::SimError;
pub use resource::{Grant, Occupant, Outcome, PoolStats, Request, ResourcePool};
pub use scheduler::{
    Context, Process, ProcessId, ProcessState, Resumption, RunReport, Simulation, Wake, Yield,
};

/// Identifies a scheduled event by its sequence id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventHandle(u64);

impl EventHandle {
    pub fn sequence_id(&self) -> u64 {
        self.0
    }
}

struct Event<T> {
    t: f64,
    seq: u64,
    data: T,
}

impl<T> PartialEq for Event<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Event<T> {}

impl<T> Ord for Event<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: reverse both keys to pop the earliest,
        // lowest-sequence event first.
        other
            .t
            .total_cmp(&self.t)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<T> PartialOrd for Event<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Virtual clock plus the queue of pending events
pub struct EventQueue<T> {
    queue: BinaryHeap<Event<T>>,
    current_t: f64,
    next_seq: u64,
}

impl<T> Default for EventQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventQueue<T> {
    pub fn new() -> EventQueue<T> {
        EventQueue {
            queue: BinaryHeap::new(),
            current_t: 0.0,
            next_seq: 0,
        }
    }

    /// Current virtual time
    pub fn now(&self) -> f64 {
        self.current_t
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Scheduled time of the earliest pending event
    pub fn peek_time(&self) -> Option<f64> {
        self.queue.peek().map(|event| event.t)
    }

    /// Schedule `data` at absolute virtual time `t`.
    ///
    /// Fails with [`SimError::Causality`] if `t` lies before the current time
    /// or is not finite.
    pub fn schedule_at(&mut self, t: f64, data: T) -> Result<EventHandle, SimError> {
        if !t.is_finite() || t < self.current_t {
            return Err(SimError::Causality {
                now: self.current_t,
                requested: t,
            });
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Event { t, seq, data });
        Ok(EventHandle(seq))
    }

    /// Schedule `data` after `delay` units of virtual time.
    pub fn schedule_in(&mut self, delay: f64, data: T) -> Result<EventHandle, SimError> {
        // Also rejects NaN.
        if !(delay >= 0.0) {
            return Err(SimError::Causality {
                now: self.current_t,
                requested: self.current_t + delay,
            });
        }
        self.schedule_at(self.current_t + delay, data)
    }

    /// Pop the earliest event if it is due no later than `horizon`,
    /// advancing the clock to its scheduled time.
    pub fn pop_until(&mut self, horizon: f64) -> Option<(EventHandle, T)> {
        if self.peek_time()? > horizon {
            return None;
        }
        let event = self.queue.pop()?;
        self.current_t = event.t;
        Some((EventHandle(event.seq), event.data))
    }

    /// Move the clock forward to `t` without firing anything.
    ///
    /// Refuses to jump over a pending event or to move backwards.
    pub fn advance_to(&mut self, t: f64) -> Result<(), SimError> {
        let blocked = self.peek_time().is_some_and(|next| next < t);
        if !t.is_finite() || t < self.current_t || blocked {
            return Err(SimError::Causality {
                now: self.current_t,
                requested: t,
            });
        }
        self.current_t = t;
        Ok(())
    }

    /// Dispatch events in key order until the queue is empty or the next
    /// event lies beyond `horizon`. The handler may schedule further events.
    ///
    /// Returns the number of events dispatched. When the loop stops, the
    /// clock is moved to `horizon` so the run covers `[0, horizon]`.
    pub fn run_until<F>(&mut self, horizon: f64, mut handler: F) -> Result<u64, SimError>
    where
        F: FnMut(&mut Self, EventHandle, T) -> Result<(), SimError>,
    {
        if horizon.is_nan() || horizon < self.current_t {
            return Err(SimError::Causality {
                now: self.current_t,
                requested: horizon,
            });
        }
        let mut dispatched = 0;
        while let Some((handle, data)) = self.pop_until(horizon) {
            trace!(t = self.current_t, seq = handle.0, "dispatch");
            handler(self, handle, data)?;
            dispatched += 1;
        }
        if horizon.is_finite() {
            self.advance_to(horizon)?;
        }
        Ok(dispatched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_queue() {
        let mut queue = BinaryHeap::<Event<u8>>::new();
        queue.push(Event { t: 2.0, seq: 0, data: 2 });
        queue.push(Event { t: 1.0, seq: 1, data: 1 });
        if let Some(first) = queue.peek() {
            assert_eq!(first.data, 1);
        }
    }

    #[test]
    fn same_time_events_pop_in_insertion_order() {
        let mut queue = EventQueue::new();
        queue.schedule_at(5.0, 'a').unwrap();
        queue.schedule_at(5.0, 'b').unwrap();
        queue.schedule_at(1.0, 'c').unwrap();
        queue.schedule_at(5.0, 'd').unwrap();

        let order: Vec<char> = std::iter::from_fn(|| queue.pop_until(10.0))
            .map(|(_, c)| c)
            .collect();
        assert_eq!(order, vec!['c', 'a', 'b', 'd']);
        assert_eq!(queue.now(), 5.0);
    }

    #[test]
    fn handles_carry_increasing_sequence_ids() {
        let mut queue = EventQueue::new();
        let first = queue.schedule_in(3.0, ()).unwrap();
        let second = queue.schedule_in(1.0, ()).unwrap();
        assert!(first < second);
        assert_eq!(second.sequence_id(), 1);
    }

    #[test]
    fn scheduling_in_the_past_is_a_causality_error() {
        let mut queue = EventQueue::new();
        queue.schedule_at(4.0, ()).unwrap();
        queue.pop_until(10.0).unwrap();

        let err = queue.schedule_at(3.0, ()).unwrap_err();
        assert_eq!(
            err,
            SimError::Causality {
                now: 4.0,
                requested: 3.0
            }
        );
        assert!(queue.schedule_in(-1.0, ()).is_err());
        assert!(queue.schedule_in(f64::NAN, ()).is_err());
        assert!(queue.schedule_at(f64::INFINITY, ()).is_err());
    }

    #[test]
    fn zero_delay_is_allowed() {
        let mut queue = EventQueue::new();
        queue.schedule_at(2.0, 0).unwrap();
        queue.pop_until(2.0).unwrap();
        queue.schedule_in(0.0, 1).unwrap();
        assert_eq!(queue.pop_until(2.0).map(|(_, v)| v), Some(1));
    }

    #[test]
    fn run_until_stops_at_horizon_and_leaves_later_events() {
        let mut queue = EventQueue::new();
        queue.schedule_at(1.0, 1).unwrap();
        queue.schedule_at(2.0, 2).unwrap();
        queue.schedule_at(7.0, 7).unwrap();

        let mut seen = Vec::new();
        let dispatched = queue
            .run_until(5.0, |_, _, v| {
                seen.push(v);
                Ok(())
            })
            .unwrap();

        assert_eq!(dispatched, 2);
        assert_eq!(seen, vec![1, 2]);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.now(), 5.0);
    }

    #[test]
    fn run_until_fires_events_exactly_at_horizon() {
        let mut queue = EventQueue::new();
        queue.schedule_at(5.0, ()).unwrap();
        let dispatched = queue.run_until(5.0, |_, _, _| Ok(())).unwrap();
        assert_eq!(dispatched, 1);
    }

    #[test]
    fn handler_can_schedule_follow_up_events() {
        // Each event reschedules itself one unit later: a self-perpetuating
        // process that only the horizon stops.
        let mut queue = EventQueue::new();
        queue.schedule_at(0.0, 0u32).unwrap();

        let dispatched = queue
            .run_until(10.0, |q, _, n| {
                q.schedule_in(1.0, n + 1)?;
                Ok(())
            })
            .unwrap();

        assert_eq!(dispatched, 11);
        assert_eq!(queue.peek_time(), Some(11.0));
    }

    #[test]
    fn handler_errors_abort_the_run() {
        let mut queue = EventQueue::new();
        queue.schedule_at(1.0, ()).unwrap();
        queue.schedule_at(2.0, ()).unwrap();

        let result = queue.run_until(10.0, |q, _, _| q.schedule_at(0.5, ()).map(|_| ()));

        assert!(matches!(result, Err(SimError::Causality { .. })));
        assert_eq!(queue.now(), 1.0);
    }

    #[test]
    fn run_until_rejects_horizon_in_the_past() {
        let mut queue: EventQueue<()> = EventQueue::new();
        queue.advance_to(3.0).unwrap();
        assert!(queue.run_until(2.0, |_, _, _| Ok(())).is_err());
    }

    #[test]
    fn advance_to_cannot_skip_pending_events() {
        let mut queue = EventQueue::new();
        queue.schedule_at(2.0, ()).unwrap();
        assert!(queue.advance_to(3.0).is_err());
        assert!(queue.advance_to(2.0).is_ok());
    }
}
