//! Car wash station model
//!
//! A fixed number of wash bays fed by Poisson arrivals. Cars queue FIFO when
//! every bay is busy, hold a bay for an exponential wash time, and leave. The
//! run stops at a virtual-time horizon and reports wait times, queue lengths
//! and per-bay utilization.
//!
//! Processes:
//! - [`ArrivalGenerator`]: spawns cars at exponential intervals
//! - [`Car`]: arrive, wait for a bay, wash, release
//! - [`QueueSampler`]: optional fixed-interval queue-length sampling
//!
//! All of them share one [`MetricsState`] through the engine's
//! [`Simulation`] context.

use des::parallel::{ParallelRunner, ReplicationError};
use des::{PoolStats, RunReport, SimError, Simulation};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;

pub mod arrivals;
pub mod car;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod output;
pub mod sampler;

pub use arrivals::ArrivalGenerator;
pub use car::Car;
pub use config::{QueueSampling, SimulationConfig};
pub use metrics::{MetricsState, QueueSample, ServiceEntity, Summary};
pub use sampler::QueueSampler;

/// Everything a finished run produced
#[derive(Debug, Clone)]
pub struct SimulationRun {
    pub config: SimulationConfig,
    pub report: RunReport,
    pub pool: PoolStats,
    pub metrics: MetricsState,
}

impl SimulationRun {
    pub fn summary(&self) -> Summary {
        self.metrics.summary(self.config.horizon)
    }
}

/// Build the station described by `config` and run it to the horizon.
pub fn simulate(config: &SimulationConfig) -> Result<SimulationRun, SimError> {
    config.validate()?;

    let sample_on_arrival = config.queue_sampling == QueueSampling::OnArrival;
    let mut sim = Simulation::new(config.capacity, MetricsState::new(config.capacity))?;
    sim.spawn(ArrivalGenerator::new(
        config.mean_interarrival_time,
        config.mean_service_time,
        StdRng::seed_from_u64(config.seed),
        sample_on_arrival,
    )?)?;
    if let QueueSampling::Periodic { interval } = config.queue_sampling {
        sim.spawn(QueueSampler::new(interval)?)?;
    }

    let report = sim.run_until(config.horizon)?;
    let pool = sim.pool().clone();
    let mut metrics = sim.into_state();
    metrics.close(&pool, config.horizon);
    info!(
        seed = config.seed,
        arrived = metrics.arrivals(),
        served = metrics.wait_times().len(),
        "run complete"
    );

    Ok(SimulationRun {
        config: config.clone(),
        report,
        pool: pool.stats(),
        metrics,
    })
}

/// Run `replications` copies of `config` with seeds `seed, seed + 1, ...`
/// on a rayon pool and return their summaries in seed order.
pub fn simulate_replications(
    config: &SimulationConfig,
    replications: usize,
    threads: Option<usize>,
) -> Vec<Result<Summary, ReplicationError>> {
    let runner = ParallelRunner::new(replications, |replication| {
        let config = config
            .clone()
            .with_seed(config.seed.wrapping_add(replication as u64));
        simulate(&config).map(|run| run.summary())
    });
    match threads {
        Some(n) => runner.num_threads(n).run(),
        None => runner.run(),
    }
}
