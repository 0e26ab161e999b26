//! Cooperative process scheduler
//!
//! A process is a state machine implementing [`Process`]. The scheduler
//! resumes it with a [`Wake`] reason and the process answers with a
//! [`Yield`] naming its next suspension point. Exactly one process runs at a
//! time and it runs until it yields, so the shared model state handed to it
//! through [`Context`] needs no locking.

use std::collections::HashMap;

use tracing::{debug, info, trace};

use crate::resource::{Grant, Outcome, ResourcePool};
use crate::{EventQueue, SimError};

pub type ProcessId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Runnable,
    WaitingOnTime,
    WaitingOnResource,
    Finished,
}

/// Why a process is being resumed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// First resumption after spawn.
    Start,
    /// A timed wait elapsed.
    Timeout,
    /// The resource pool granted this slot.
    Granted(usize),
}

/// Where a process suspends next
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Yield {
    /// Sleep for this much virtual time.
    Timeout(f64),
    /// Wait for a slot in the resource pool.
    Acquire,
    /// Run to completion; the process is dropped.
    Finish,
}

pub trait Process<S> {
    fn resume(&mut self, ctx: &mut Context<'_, S>, wake: Wake) -> Result<Yield, SimError>;
}

/// Event payload: which process to resume, and why
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resumption {
    pub process: ProcessId,
    pub wake: Wake,
}

/// The running process's view of the simulation
pub struct Context<'a, S> {
    process: ProcessId,
    state: &'a mut S,
    queue: &'a mut EventQueue<Resumption>,
    pool: &'a mut ResourcePool,
    spawned: &'a mut Vec<(ProcessId, Box<dyn Process<S>>)>,
    next_id: &'a mut ProcessId,
}

impl<S> Context<'_, S> {
    /// Id of the process being resumed
    pub fn process_id(&self) -> ProcessId {
        self.process
    }

    pub fn now(&self) -> f64 {
        self.queue.now()
    }

    /// Shared model state
    pub fn state(&mut self) -> &mut S {
        &mut *self.state
    }

    pub fn queue_length(&self) -> usize {
        self.pool.queue_length()
    }

    /// Register a new process; it starts at the current time, after every
    /// event already scheduled for this instant.
    pub fn spawn<P>(&mut self, process: P) -> Result<ProcessId, SimError>
    where
        P: Process<S> + 'static,
    {
        let id = *self.next_id;
        *self.next_id += 1;
        self.queue.schedule_in(
            0.0,
            Resumption {
                process: id,
                wake: Wake::Start,
            },
        )?;
        self.spawned.push((id, Box::new(process)));
        debug!(t = self.now(), parent = self.process, process = id, "spawned");
        Ok(id)
    }

    /// Release a slot held by the running process. A waiting process that
    /// inherits the slot is resumed at the current time.
    pub fn release(&mut self, slot: usize) -> Result<Option<Grant>, SimError> {
        let now = self.queue.now();
        let grant = self.pool.release(self.process, slot, now)?;
        if let Some(grant) = grant {
            self.queue.schedule_in(
                0.0,
                Resumption {
                    process: grant.requester,
                    wake: Wake::Granted(grant.slot),
                },
            )?;
        }
        Ok(grant)
    }
}

struct ProcessEntry<S> {
    state: ProcessState,
    process: Box<dyn Process<S>>,
}

/// Summary of a [`Simulation::run_until`] call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunReport {
    pub events_processed: u64,
    pub processes_spawned: usize,
    pub processes_finished: usize,
    /// Processes still suspended when the horizon was reached
    pub processes_abandoned: usize,
    pub final_time: f64,
}

/// All mutable simulation state: clock, event queue, resource pool, process
/// table, and the model state `S` shared by every process.
pub struct Simulation<S> {
    queue: EventQueue<Resumption>,
    pool: ResourcePool,
    processes: HashMap<ProcessId, ProcessEntry<S>>,
    state: S,
    next_id: ProcessId,
    processes_finished: usize,
}

impl<S> Simulation<S> {
    pub fn new(capacity: usize, state: S) -> Result<Simulation<S>, SimError> {
        Ok(Simulation {
            queue: EventQueue::new(),
            pool: ResourcePool::new(capacity)?,
            processes: HashMap::new(),
            state,
            next_id: 0,
            processes_finished: 0,
        })
    }

    pub fn now(&self) -> f64 {
        self.queue.now()
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }

    pub fn into_state(self) -> S {
        self.state
    }

    pub fn pool(&self) -> &ResourcePool {
        &self.pool
    }

    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    /// State of a live process; `None` once it has finished and been dropped
    pub fn process_state(&self, id: ProcessId) -> Option<ProcessState> {
        self.processes.get(&id).map(|entry| entry.state)
    }

    pub fn live_processes(&self) -> usize {
        self.processes.len()
    }

    /// Register a process that starts at the current time
    pub fn spawn<P>(&mut self, process: P) -> Result<ProcessId, SimError>
    where
        P: Process<S> + 'static,
    {
        let id = self.next_id;
        self.next_id += 1;
        self.queue.schedule_in(
            0.0,
            Resumption {
                process: id,
                wake: Wake::Start,
            },
        )?;
        self.processes.insert(
            id,
            ProcessEntry {
                state: ProcessState::Runnable,
                process: Box::new(process),
            },
        );
        Ok(id)
    }

    /// Fire events until the queue empties or the next event lies past
    /// `horizon`. Processes still suspended at that point are left as they
    /// are; the first error aborts the run.
    pub fn run_until(&mut self, horizon: f64) -> Result<RunReport, SimError> {
        info!(start = self.queue.now(), horizon, "simulation started");
        let Simulation {
            queue,
            pool,
            processes,
            state,
            next_id,
            processes_finished,
        } = self;

        let events_processed = queue.run_until(horizon, |queue, _, resumption| {
            let finished = dispatch(queue, pool, processes, state, next_id, resumption)?;
            if finished {
                *processes_finished += 1;
            }
            Ok(())
        })?;

        let report = RunReport {
            events_processed,
            processes_spawned: self.next_id,
            processes_finished: self.processes_finished,
            processes_abandoned: self.processes.len(),
            final_time: self.queue.now(),
        };
        info!(
            t = report.final_time,
            events = report.events_processed,
            abandoned = report.processes_abandoned,
            "simulation reached horizon"
        );
        Ok(report)
    }
}

/// Resume one process and keep driving it until it suspends. Returns whether
/// the process finished.
fn dispatch<S>(
    queue: &mut EventQueue<Resumption>,
    pool: &mut ResourcePool,
    processes: &mut HashMap<ProcessId, ProcessEntry<S>>,
    state: &mut S,
    next_id: &mut ProcessId,
    resumption: Resumption,
) -> Result<bool, SimError> {
    let id = resumption.process;
    let mut entry = processes.remove(&id).ok_or_else(|| {
        SimError::ProtocolViolation(format!("event targets unknown process {id}"))
    })?;

    let expected = match resumption.wake {
        Wake::Start => ProcessState::Runnable,
        Wake::Timeout => ProcessState::WaitingOnTime,
        Wake::Granted(_) => ProcessState::WaitingOnResource,
    };
    if entry.state != expected {
        return Err(SimError::ProtocolViolation(format!(
            "process {id} woken by {:?} while {:?}",
            resumption.wake, entry.state
        )));
    }

    let mut spawned = Vec::new();
    let mut wake = resumption.wake;
    loop {
        entry.state = ProcessState::Runnable;
        trace!(t = queue.now(), process = id, ?wake, "resume");
        let step = {
            let mut ctx = Context {
                process: id,
                state: &mut *state,
                queue: &mut *queue,
                pool: &mut *pool,
                spawned: &mut spawned,
                next_id: &mut *next_id,
            };
            entry.process.resume(&mut ctx, wake)?
        };

        match step {
            Yield::Timeout(delay) => {
                queue.schedule_in(
                    delay,
                    Resumption {
                        process: id,
                        wake: Wake::Timeout,
                    },
                )?;
                entry.state = ProcessState::WaitingOnTime;
                break;
            }
            Yield::Acquire => match pool.acquire(id, queue.now())? {
                Outcome::Granted(slot) => wake = Wake::Granted(slot),
                Outcome::Enqueued => {
                    entry.state = ProcessState::WaitingOnResource;
                    break;
                }
            },
            Yield::Finish => {
                entry.state = ProcessState::Finished;
                break;
            }
        }
    }

    for (child, process) in spawned {
        processes.insert(
            child,
            ProcessEntry {
                state: ProcessState::Runnable,
                process,
            },
        );
    }

    let finished = entry.state == ProcessState::Finished;
    if finished {
        trace!(t = queue.now(), process = id, "finished");
    } else {
        processes.insert(id, entry);
    }
    Ok(finished)
}
