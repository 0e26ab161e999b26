use std::collections::VecDeque;

use tracing::debug;

use crate::{ProcessId, SimError};

/// Result of an acquire attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The caller now occupies this slot.
    Granted(usize),
    /// Every slot is busy; the caller joined the tail of the wait queue.
    Enqueued,
}

/// A pending demand for a slot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Request {
    pub requester: ProcessId,
    pub enqueue_time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Occupant {
    pub holder: ProcessId,
    pub granted_at: f64,
}

/// A queued request handed a slot on release
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grant {
    pub requester: ProcessId,
    pub slot: usize,
    pub enqueue_time: f64,
    pub granted_at: f64,
}

impl Grant {
    pub fn wait(&self) -> f64 {
        self.granted_at - self.enqueue_time
    }
}

/// Observable state of a pool
#[derive(Debug, Clone, PartialEq)]
pub struct PoolStats {
    pub capacity: usize,
    pub current_occupied: usize,
    pub current_queue_length: usize,
    pub total_requests: usize,
    pub total_granted: usize,
    pub total_enqueued: usize,
    pub total_released: usize,
    pub peak_occupied: usize,
    pub peak_queue_length: usize,
}

impl PoolStats {
    pub fn is_at_capacity(&self) -> bool {
        self.current_occupied == self.capacity
    }

    pub fn has_queue(&self) -> bool {
        self.current_queue_length > 0
    }

    /// Fraction of slots occupied right now
    pub fn occupancy(&self) -> f64 {
        self.current_occupied as f64 / self.capacity as f64
    }
}

/// `capacity` identical slots with a FIFO wait queue.
///
/// Invariants: at most `capacity` slots are occupied, and the wait queue is
/// non-empty only while every slot is occupied.
#[derive(Debug, Clone)]
pub struct ResourcePool {
    slots: Vec<Option<Occupant>>,
    wait_queue: VecDeque<Request>,
    occupied: usize,
    stats: PoolStats,
}

impl ResourcePool {
    pub fn new(capacity: usize) -> Result<ResourcePool, SimError> {
        if capacity == 0 {
            return Err(SimError::Config(
                "resource pool capacity must be at least 1".to_string(),
            ));
        }
        Ok(ResourcePool {
            slots: vec![None; capacity],
            wait_queue: VecDeque::new(),
            occupied: 0,
            stats: PoolStats {
                capacity,
                current_occupied: 0,
                current_queue_length: 0,
                total_requests: 0,
                total_granted: 0,
                total_enqueued: 0,
                total_released: 0,
                peak_occupied: 0,
                peak_queue_length: 0,
            },
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn occupied(&self) -> usize {
        self.occupied
    }

    /// Size of the wait queue at the instant of the query
    pub fn queue_length(&self) -> usize {
        self.wait_queue.len()
    }

    pub fn occupant(&self, slot: usize) -> Option<Occupant> {
        self.slots.get(slot).copied().flatten()
    }

    /// Waiting requests, head first
    pub fn waiting(&self) -> impl Iterator<Item = &Request> {
        self.wait_queue.iter()
    }

    pub fn holds(&self, process: ProcessId) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.is_some_and(|occupant| occupant.holder == process))
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            current_occupied: self.occupied,
            current_queue_length: self.wait_queue.len(),
            ..self.stats.clone()
        }
    }

    /// Take the lowest-index free slot, or join the tail of the wait queue.
    pub fn acquire(&mut self, requester: ProcessId, now: f64) -> Result<Outcome, SimError> {
        if let Some(slot) = self.holds(requester) {
            return Err(SimError::ProtocolViolation(format!(
                "process {requester} requested a slot while holding slot {slot}"
            )));
        }
        if self.wait_queue.iter().any(|r| r.requester == requester) {
            return Err(SimError::ProtocolViolation(format!(
                "process {requester} requested a slot while already queued"
            )));
        }
        self.stats.total_requests += 1;

        match self.slots.iter().position(Option::is_none) {
            Some(slot) => {
                self.slots[slot] = Some(Occupant {
                    holder: requester,
                    granted_at: now,
                });
                self.occupied += 1;
                self.stats.total_granted += 1;
                self.stats.peak_occupied = self.stats.peak_occupied.max(self.occupied);
                debug!(t = now, process = requester, slot, "slot granted");
                Ok(Outcome::Granted(slot))
            }
            None => {
                self.wait_queue.push_back(Request {
                    requester,
                    enqueue_time: now,
                });
                self.stats.total_enqueued += 1;
                self.stats.peak_queue_length =
                    self.stats.peak_queue_length.max(self.wait_queue.len());
                debug!(
                    t = now,
                    process = requester,
                    queue_length = self.wait_queue.len(),
                    "pool full, request queued"
                );
                Ok(Outcome::Enqueued)
            }
        }
    }

    /// Free `slot`. If anyone is waiting, the head of the queue takes the slot
    /// over immediately and its grant is returned so the caller can resume it.
    pub fn release(
        &mut self,
        holder: ProcessId,
        slot: usize,
        now: f64,
    ) -> Result<Option<Grant>, SimError> {
        match self.slots.get(slot) {
            Some(Some(occupant)) if occupant.holder == holder => {}
            Some(_) => {
                return Err(SimError::ProtocolViolation(format!(
                    "process {holder} released slot {slot} which it does not hold"
                )));
            }
            None => {
                return Err(SimError::ProtocolViolation(format!(
                    "process {holder} released slot {slot} of a pool with {} slots",
                    self.slots.len()
                )));
            }
        }
        self.stats.total_released += 1;

        let Some(request) = self.wait_queue.pop_front() else {
            self.slots[slot] = None;
            self.occupied -= 1;
            debug!(t = now, process = holder, slot, "slot released");
            return Ok(None);
        };

        self.slots[slot] = Some(Occupant {
            holder: request.requester,
            granted_at: now,
        });
        self.stats.total_granted += 1;
        let grant = Grant {
            requester: request.requester,
            slot,
            enqueue_time: request.enqueue_time,
            granted_at: now,
        };
        debug!(
            t = now,
            from = holder,
            to = request.requester,
            slot,
            wait = grant.wait(),
            "slot handed to queued request"
        );
        Ok(Some(grant))
    }
}
