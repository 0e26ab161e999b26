//! Car wash station simulation
//!
//! ```bash
//! car_wash                                   # reference station, seed 42
//! car_wash --capacity 3 --horizon 480
//! car_wash --config station.toml --json
//! car_wash --replications 100 --threads 8    # seeds 42..=141 in parallel
//! car_wash --export-dir results/run_42       # CSV series for charting
//! ```

use std::path::PathBuf;
use std::process;

use car_wash::logging::init_logging;
use car_wash::output::{ReplicationAggregate, SimulationOutput};
use car_wash::{QueueSampling, SimulationConfig, Summary, simulate, simulate_replications};
use clap::Parser;
use tracing::{error, info};

/// Simulate a car wash with a fixed number of bays under random arrivals.
#[derive(Parser, Debug)]
#[command(name = "car_wash")]
#[command(about = "Discrete-event simulation of a limited-capacity car wash")]
struct Cli {
    /// TOML file with a station configuration; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    seed: Option<u64>,

    /// Number of wash bays.
    #[arg(long)]
    capacity: Option<usize>,

    /// Mean time between arrivals.
    #[arg(long)]
    mean_interarrival: Option<f64>,

    /// Mean wash duration.
    #[arg(long)]
    mean_service: Option<f64>,

    /// Virtual time at which the run stops.
    #[arg(long)]
    horizon: Option<f64>,

    /// Sample the queue every N time units instead of on each arrival.
    #[arg(long)]
    sample_interval: Option<f64>,

    /// Independent runs with consecutive seeds.
    #[arg(long, default_value_t = 1)]
    replications: usize,

    /// Worker threads for replications (defaults to one per core).
    #[arg(long)]
    threads: Option<usize>,

    /// Print the summary as JSON.
    #[arg(long)]
    json: bool,

    /// Write queue_lengths.csv, wait_times.csv and summary.json here, or
    /// replications.json when running several seeds.
    #[arg(long)]
    export_dir: Option<PathBuf>,

    /// Log level when RUST_LOG is unset.
    #[arg(long, default_value = "warn")]
    log_level: String,
}

impl Cli {
    fn station_config(&self) -> Result<SimulationConfig, des::SimError> {
        let mut config = match &self.config {
            Some(path) => SimulationConfig::from_toml_file(path)?,
            None => SimulationConfig::default(),
        };
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(capacity) = self.capacity {
            config.capacity = capacity;
        }
        if let Some(mean) = self.mean_interarrival {
            config.mean_interarrival_time = mean;
        }
        if let Some(mean) = self.mean_service {
            config.mean_service_time = mean;
        }
        if let Some(horizon) = self.horizon {
            config.horizon = horizon;
        }
        if let Some(interval) = self.sample_interval {
            config.queue_sampling = QueueSampling::Periodic { interval };
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = cli.station_config().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        process::exit(2);
    });
    info!(?config, "configuration loaded");

    if cli.replications > 1 {
        run_replications(&cli, &config);
    } else {
        run_single(&cli, &config);
    }
}

fn run_single(cli: &Cli, config: &SimulationConfig) {
    let run = simulate(config).unwrap_or_else(|e| {
        error!(error = %e, "simulation aborted");
        eprintln!("Error: {e}");
        process::exit(1);
    });
    let output = SimulationOutput::from(&run);

    if cli.json {
        match output.to_json() {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        }
    } else {
        print_summary(&output.summary);
    }

    if let Some(dir) = &cli.export_dir {
        if let Err(e) = output.write_all(dir) {
            eprintln!("Error writing {}: {e}", dir.display());
            process::exit(1);
        }
        info!(dir = %dir.display(), "series exported");
    }
}

fn run_replications(cli: &Cli, config: &SimulationConfig) {
    let results = simulate_replications(config, cli.replications, cli.threads);

    let mut summaries = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(summary) => summaries.push(summary),
            Err(e) => eprintln!("Error: {e}"),
        }
    }
    if summaries.is_empty() {
        process::exit(1);
    }

    let aggregate = ReplicationAggregate::from_summaries(&summaries);
    if let Some(dir) = &cli.export_dir {
        if let Err(e) = aggregate.write_all(dir) {
            eprintln!("Error writing {}: {e}", dir.display());
            process::exit(1);
        }
        info!(dir = %dir.display(), "replication aggregate exported");
    }

    if cli.json {
        match serde_json::to_string_pretty(&aggregate) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        }
        return;
    }

    println!(
        "Replications: {} (seeds {})",
        aggregate.replications,
        seed_range(config.seed, cli.replications)
    );
    println!(
        "Average wait time: {:.2} ± {:.2} time units",
        aggregate.average_wait.mean, aggregate.average_wait.std
    );
    println!(
        "Average queue length: {:.2} ± {:.2} cars",
        aggregate.average_queue_length.mean, aggregate.average_queue_length.std
    );
    for (i, u) in aggregate.per_slot_utilization.iter().enumerate() {
        println!(
            "Utilization of Washer {}: {:.2}% ± {:.2}%",
            i + 1,
            u.mean * 100.0,
            u.std * 100.0
        );
    }
}

/// Inclusive range of the seeds used by `replications` runs
fn seed_range(seed: u64, replications: usize) -> String {
    let last = seed.wrapping_add(replications.saturating_sub(1) as u64);
    format!("{seed}..={last}")
}

fn print_summary(summary: &Summary) {
    println!("Average wait time: {:.2} time units", summary.average_wait);
    println!("Average queue length: {:.2} cars", summary.average_queue_length);
    for (i, u) in summary.utilization_percent().iter().enumerate() {
        println!("Utilization of Washer {}: {:.2}%", i + 1, u);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_range_is_inclusive() {
        assert_eq!(seed_range(42, 100), "42..=141");
        assert_eq!(seed_range(7, 2), "7..=8");
    }

    #[test]
    fn export_dir_is_accepted_with_replications() {
        let cli = Cli::parse_from([
            "car_wash",
            "--replications",
            "4",
            "--export-dir",
            "out",
            "--seed",
            "9",
        ]);
        assert_eq!(cli.replications, 4);
        assert_eq!(cli.export_dir, Some(PathBuf::from("out")));
        assert_eq!(cli.station_config().unwrap().seed, 9);
    }
}
