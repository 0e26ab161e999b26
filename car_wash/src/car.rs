use des::{Context, Process, SimError, Wake, Yield};
use rand::rngs::StdRng;
use rand_distr::{Distribution, Exp};
use tracing::debug;

use crate::metrics::{MetricsState, ServiceEntity};

#[derive(Debug, Clone, Copy, PartialEq)]
enum CarPhase {
    Arriving,
    Queued,
    Washing { slot: usize, duration: f64 },
    Done,
}

/// One car: arrive, wait for a bay, wash, leave.
pub struct Car {
    id: usize,
    phase: CarPhase,
    arrival_time: f64,
    service: Exp<f64>,
    rng: StdRng,
    sample_on_arrival: bool,
}

impl Car {
    pub fn new(id: usize, service: Exp<f64>, rng: StdRng, sample_on_arrival: bool) -> Car {
        Car {
            id,
            phase: CarPhase::Arriving,
            arrival_time: 0.0,
            service,
            rng,
            sample_on_arrival,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }
}

impl Process<MetricsState> for Car {
    fn resume(
        &mut self,
        ctx: &mut Context<'_, MetricsState>,
        wake: Wake,
    ) -> Result<Yield, SimError> {
        let now = ctx.now();
        match (self.phase, wake) {
            (CarPhase::Arriving, Wake::Start) => {
                self.arrival_time = now;
                let queue_length = ctx.queue_length();
                let metrics = ctx.state();
                metrics.record_arrival(now);
                if self.sample_on_arrival {
                    metrics.sample_queue_length(now, queue_length);
                }
                debug!(t = now, car = self.id, queue_length, "car arrived");
                self.phase = CarPhase::Queued;
                Ok(Yield::Acquire)
            }
            (CarPhase::Queued, Wake::Granted(slot)) => {
                let wait_time = now - self.arrival_time;
                let duration = self.service.sample(&mut self.rng);
                let metrics = ctx.state();
                metrics.record_wait(wait_time);
                metrics.record_entity(ServiceEntity {
                    id: self.id,
                    arrival_time: self.arrival_time,
                    grant_time: now,
                    wait_time,
                    slot,
                    service_duration: duration,
                });
                debug!(t = now, car = self.id, slot, wait_time, duration, "wash started");
                self.phase = CarPhase::Washing { slot, duration };
                Ok(Yield::Timeout(duration))
            }
            (CarPhase::Washing { slot, duration }, Wake::Timeout) => {
                ctx.release(slot)?;
                let metrics = ctx.state();
                metrics.add_busy_time(slot, duration);
                metrics.record_completion(now);
                debug!(t = now, car = self.id, slot, "car left");
                self.phase = CarPhase::Done;
                Ok(Yield::Finish)
            }
            (phase, wake) => Err(SimError::ProtocolViolation(format!(
                "car {} woken by {wake:?} while {phase:?}",
                self.id
            ))),
        }
    }
}
