//! Structured export of run results
//!
//! JSON for the summary, CSV for the raw series that external charting
//! tools consume.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{QueueSample, ServiceEntity, SimulationConfig, SimulationRun, Summary};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Metadata for reproducibility
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub config: SimulationConfig,
    pub events_processed: u64,
    pub processes_spawned: usize,
    pub processes_abandoned: usize,
    pub final_time: f64,
    pub peak_occupied: usize,
    pub peak_queue_length: usize,
}

/// Top-level container for a single run's output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationOutput {
    pub metadata: RunMetadata,
    pub summary: Summary,
    #[serde(skip)]
    pub queue_samples: Vec<QueueSample>,
    #[serde(skip)]
    pub cars: Vec<ServiceEntity>,
}

impl From<&SimulationRun> for SimulationOutput {
    fn from(run: &SimulationRun) -> Self {
        SimulationOutput {
            metadata: RunMetadata {
                config: run.config.clone(),
                events_processed: run.report.events_processed,
                processes_spawned: run.report.processes_spawned,
                processes_abandoned: run.report.processes_abandoned,
                final_time: run.report.final_time,
                peak_occupied: run.pool.peak_occupied,
                peak_queue_length: run.pool.peak_queue_length,
            },
            summary: run.summary(),
            queue_samples: run.metrics.queue_samples().to_vec(),
            cars: run.metrics.entities().to_vec(),
        }
    }
}

impl SimulationOutput {
    pub fn to_json(&self) -> Result<String, ExportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write `(time, queue_length)` samples to CSV
    pub fn write_queue_csv<P: AsRef<Path>>(&self, path: P) -> Result<(), ExportError> {
        let mut wtr = csv::Writer::from_path(path)?;
        for sample in &self.queue_samples {
            wtr.serialize(sample)?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Write one row per served car, in grant order
    pub fn write_wait_csv<P: AsRef<Path>>(&self, path: P) -> Result<(), ExportError> {
        let mut wtr = csv::Writer::from_path(path)?;
        for car in &self.cars {
            wtr.serialize(car)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn write_summary_json<P: AsRef<Path>>(&self, path: P) -> Result<(), ExportError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Write all outputs to a directory
    ///
    /// Creates:
    /// - queue_lengths.csv
    /// - wait_times.csv
    /// - summary.json
    pub fn write_all<P: AsRef<Path>>(&self, dir: P) -> Result<(), ExportError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        self.write_queue_csv(dir.join("queue_lengths.csv"))?;
        self.write_wait_csv(dir.join("wait_times.csv"))?;
        self.write_summary_json(dir.join("summary.json"))?;

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeanStd {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

impl MeanStd {
    pub fn from_values(values: &[f64]) -> MeanStd {
        if values.is_empty() {
            return MeanStd {
                mean: 0.0,
                std: 0.0,
                min: 0.0,
                max: 0.0,
            };
        }

        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let variance =
            values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / values.len() as f64;
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        MeanStd {
            mean,
            std: variance.sqrt(),
            min,
            max,
        }
    }
}

/// Statistics across independent replications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicationAggregate {
    pub replications: usize,
    pub average_wait: MeanStd,
    pub average_queue_length: MeanStd,
    pub per_slot_utilization: Vec<MeanStd>,
}

impl ReplicationAggregate {
    pub fn from_summaries(summaries: &[Summary]) -> ReplicationAggregate {
        let waits: Vec<f64> = summaries.iter().map(|s| s.average_wait).collect();
        let queues: Vec<f64> = summaries.iter().map(|s| s.average_queue_length).collect();
        let slots = summaries
            .iter()
            .map(|s| s.per_slot_utilization.len())
            .max()
            .unwrap_or(0);
        let per_slot_utilization = (0..slots)
            .map(|slot| {
                let values: Vec<f64> = summaries
                    .iter()
                    .map(|s| s.per_slot_utilization.get(slot).copied().unwrap_or(0.0))
                    .collect();
                MeanStd::from_values(&values)
            })
            .collect();

        ReplicationAggregate {
            replications: summaries.len(),
            average_wait: MeanStd::from_values(&waits),
            average_queue_length: MeanStd::from_values(&queues),
            per_slot_utilization,
        }
    }

    /// Write `replications.json` into `dir`, creating it if needed
    pub fn write_all<P: AsRef<Path>>(&self, dir: P) -> Result<(), ExportError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        fs::write(
            dir.join("replications.json"),
            serde_json::to_string_pretty(self)?,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulate;
    use approx::assert_relative_eq;

    fn summary(wait: f64, queue: f64, utilization: Vec<f64>) -> Summary {
        Summary {
            average_wait: wait,
            max_wait: wait,
            average_queue_length: queue,
            per_slot_utilization: utilization,
            cars_arrived: 0,
            cars_served: 0,
            cars_completed: 0,
        }
    }

    #[test]
    fn mean_std_of_empty_is_zero() {
        assert_eq!(MeanStd::from_values(&[]).mean, 0.0);
    }

    #[test]
    fn mean_std_basic() {
        let stats = MeanStd::from_values(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_relative_eq!(stats.mean, 5.0);
        assert_relative_eq!(stats.std, 2.0);
        assert_eq!(stats.min, 2.0);
        assert_eq!(stats.max, 9.0);
    }

    #[test]
    fn aggregate_across_replications() {
        let aggregate = ReplicationAggregate::from_summaries(&[
            summary(1.0, 0.5, vec![0.2, 0.4]),
            summary(3.0, 1.5, vec![0.4, 0.6]),
        ]);
        assert_eq!(aggregate.replications, 2);
        assert_relative_eq!(aggregate.average_wait.mean, 2.0);
        assert_relative_eq!(aggregate.average_queue_length.mean, 1.0);
        assert_relative_eq!(aggregate.per_slot_utilization[0].mean, 0.3);
        assert_relative_eq!(aggregate.per_slot_utilization[1].mean, 0.5);
    }

    #[test]
    fn aggregate_is_written_as_json() {
        let aggregate = ReplicationAggregate::from_summaries(&[
            summary(1.0, 0.5, vec![0.25]),
            summary(3.0, 1.5, vec![0.75]),
        ]);
        let dir = std::env::temp_dir().join(format!("car_wash_agg_{}", std::process::id()));

        aggregate.write_all(&dir).unwrap();

        let text = fs::read_to_string(dir.join("replications.json")).unwrap();
        let parsed: ReplicationAggregate = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.replications, 2);
        assert_relative_eq!(parsed.average_wait.mean, 2.0);
        assert_relative_eq!(parsed.per_slot_utilization[0].mean, 0.5);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn json_round_trips_summary_and_metadata() {
        let run = simulate(&SimulationConfig::default()).unwrap();
        let output = SimulationOutput::from(&run);

        let parsed: SimulationOutput = serde_json::from_str(&output.to_json().unwrap()).unwrap();
        assert_eq!(parsed.metadata.config.seed, 42);
        assert_eq!(parsed.metadata.events_processed, output.metadata.events_processed);
        assert_eq!(parsed.summary.cars_served, output.summary.cars_served);
        assert_relative_eq!(
            parsed.summary.average_wait,
            output.summary.average_wait,
            max_relative = 1e-12
        );
        // Raw series are exported as CSV, not JSON.
        assert!(parsed.cars.is_empty());
    }

    #[test]
    fn write_all_creates_three_files() {
        let run = simulate(&SimulationConfig::default()).unwrap();
        let output = SimulationOutput::from(&run);
        let dir = std::env::temp_dir().join(format!("car_wash_export_{}", std::process::id()));

        output.write_all(&dir).unwrap();

        let queue_csv = fs::read_to_string(dir.join("queue_lengths.csv")).unwrap();
        assert!(queue_csv.starts_with("time,queue_length"));
        assert_eq!(queue_csv.lines().count(), output.queue_samples.len() + 1);
        let wait_csv = fs::read_to_string(dir.join("wait_times.csv")).unwrap();
        assert!(wait_csv.starts_with("id,arrival_time,grant_time,wait_time"));
        assert!(dir.join("summary.json").exists());

        fs::remove_dir_all(&dir).unwrap();
    }
}
