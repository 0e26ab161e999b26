use des::{Context, Process, SimError, Wake, Yield};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use rand_distr::{Distribution, Exp};
use tracing::trace;

use crate::car::Car;
use crate::metrics::MetricsState;

/// Spawns a [`Car`] after every exponential gap, forever.
///
/// Each car gets its own RNG seeded from the generator's stream, so the whole
/// run is reproducible from the generator's seed.
pub struct ArrivalGenerator {
    interarrival: Exp<f64>,
    service: Exp<f64>,
    rng: StdRng,
    next_car_id: usize,
    sample_on_arrival: bool,
}

impl ArrivalGenerator {
    pub fn new(
        mean_interarrival_time: f64,
        mean_service_time: f64,
        rng: StdRng,
        sample_on_arrival: bool,
    ) -> Result<ArrivalGenerator, SimError> {
        Ok(ArrivalGenerator {
            interarrival: exponential("mean_interarrival_time", mean_interarrival_time)?,
            service: exponential("mean_service_time", mean_service_time)?,
            rng,
            next_car_id: 0,
            sample_on_arrival,
        })
    }

    pub fn cars_spawned(&self) -> usize {
        self.next_car_id
    }

    fn next_car(&mut self) -> Car {
        let id = self.next_car_id;
        self.next_car_id += 1;
        let rng = StdRng::seed_from_u64(self.rng.next_u64());
        Car::new(id, self.service, rng, self.sample_on_arrival)
    }
}

fn exponential(name: &str, mean: f64) -> Result<Exp<f64>, SimError> {
    if !(mean.is_finite() && mean > 0.0) {
        return Err(SimError::Config(format!(
            "{name} must be a positive finite number, got {mean}"
        )));
    }
    Exp::new(1.0 / mean).map_err(|e| SimError::Config(format!("{name}: {e}")))
}

impl Process<MetricsState> for ArrivalGenerator {
    fn resume(
        &mut self,
        ctx: &mut Context<'_, MetricsState>,
        wake: Wake,
    ) -> Result<Yield, SimError> {
        match wake {
            Wake::Start => {}
            Wake::Timeout => {
                let car = self.next_car();
                ctx.spawn(car)?;
            }
            Wake::Granted(slot) => {
                return Err(SimError::ProtocolViolation(format!(
                    "arrival generator was granted slot {slot} it never asked for"
                )));
            }
        }
        let gap = self.interarrival.sample(&mut self.rng);
        trace!(t = ctx.now(), gap, "next arrival scheduled");
        Ok(Yield::Timeout(gap))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use des::Simulation;

    fn generator(seed: u64) -> ArrivalGenerator {
        ArrivalGenerator::new(2.0, 1.0, StdRng::seed_from_u64(seed), true).unwrap()
    }

    #[test]
    fn rejects_non_positive_means() {
        let rng = StdRng::seed_from_u64(0);
        assert!(ArrivalGenerator::new(0.0, 1.0, rng.clone(), true).is_err());
        assert!(ArrivalGenerator::new(1.0, -1.0, rng.clone(), true).is_err());
        assert!(ArrivalGenerator::new(f64::INFINITY, 1.0, rng, true).is_err());
    }

    #[test]
    fn cars_are_numbered_in_arrival_order() {
        let mut arrivals = generator(3);

        let ids: Vec<usize> = (0..3).map(|_| arrivals.next_car().id()).collect();

        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(arrivals.cars_spawned(), 3);
    }

    #[test]
    fn first_resume_schedules_without_spawning() {
        let mut sim = Simulation::new(1, MetricsState::new(1)).unwrap();
        sim.spawn(generator(9)).unwrap();

        sim.run_until(0.0).unwrap();

        assert_eq!(sim.state().arrivals(), 0);
        assert_eq!(sim.pending_events(), 1);
    }

    #[test]
    fn arrivals_keep_coming_until_the_horizon() {
        let mut sim = Simulation::new(4, MetricsState::new(4)).unwrap();
        sim.spawn(generator(9)).unwrap();

        let report = sim.run_until(1000.0).unwrap();

        // Mean gap 2.0 over 1000 time units: about 500 arrivals.
        let arrivals = sim.state().arrivals();
        assert!((400..600).contains(&arrivals), "got {arrivals} arrivals");
        assert_eq!(report.processes_spawned, arrivals + 1);
        // The generator itself is always left suspended.
        assert!(report.processes_abandoned >= 1);
    }

    #[test]
    fn same_seed_same_arrival_times() {
        let run = |seed| {
            let mut sim = Simulation::new(1, MetricsState::new(1)).unwrap();
            sim.spawn(generator(seed)).unwrap();
            sim.run_until(200.0).unwrap();
            sim.into_state()
                .queue_samples()
                .iter()
                .map(|s| s.time)
                .collect::<Vec<f64>>()
        };

        assert_eq!(run(5), run(5));
        assert_ne!(run(5), run(6));
    }
}
