use std::fs;
use std::path::Path;

use des::SimError;
use serde::{Deserialize, Serialize};

/// When queue-length samples are taken
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum QueueSampling {
    /// One sample per arriving car, taken before it asks for a bay.
    #[default]
    OnArrival,
    /// One sample every `interval` time units starting at t=0.
    Periodic { interval: f64 },
}

/// Parameters of a single car-wash run
///
/// Loadable from TOML; missing keys fall back to [`SimulationConfig::default`]:
///
/// ```toml
/// seed = 7
/// capacity = 3
/// horizon = 480.0
///
/// [queue_sampling]
/// policy = "periodic"
/// interval = 1.0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Seed of the arrival generator's RNG; every other stream derives from it
    pub seed: u64,
    /// Mean of the exponential gap between arrivals
    pub mean_interarrival_time: f64,
    /// Mean of the exponential wash duration
    pub mean_service_time: f64,
    /// Virtual time at which the run stops
    pub horizon: f64,
    /// Number of wash bays
    pub capacity: usize,
    pub queue_sampling: QueueSampling,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            seed: 42,
            mean_interarrival_time: 5.0,
            mean_service_time: 10.0,
            horizon: 100.0,
            capacity: 2,
            queue_sampling: QueueSampling::OnArrival,
        }
    }
}

impl SimulationConfig {
    /// Sparse arrivals into a single bay: cars almost never wait
    pub fn no_contention() -> Self {
        SimulationConfig {
            seed: 1,
            mean_interarrival_time: 100.0,
            mean_service_time: 1.0,
            horizon: 50.0,
            capacity: 1,
            ..Self::default()
        }
    }

    /// Arrivals a hundred times faster than service: the bay never idles
    /// and the queue grows with elapsed time
    pub fn saturation() -> Self {
        SimulationConfig {
            seed: 1,
            mean_interarrival_time: 1.0,
            mean_service_time: 100.0,
            horizon: 1000.0,
            capacity: 1,
            ..Self::default()
        }
    }

    pub fn with_seed(self, seed: u64) -> Self {
        SimulationConfig { seed, ..self }
    }

    pub fn validate(&self) -> Result<(), SimError> {
        fn positive(name: &str, value: f64) -> Result<(), SimError> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(SimError::Config(format!(
                    "{name} must be a positive finite number, got {value}"
                )))
            }
        }

        if self.capacity == 0 {
            return Err(SimError::Config("capacity must be at least 1".to_string()));
        }
        positive("mean_interarrival_time", self.mean_interarrival_time)?;
        positive("mean_service_time", self.mean_service_time)?;
        positive("horizon", self.horizon)?;
        if let QueueSampling::Periodic { interval } = self.queue_sampling {
            positive("queue sampling interval", interval)?;
        }
        Ok(())
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self, SimError> {
        let config: SimulationConfig = toml::from_str(text)
            .map_err(|e| SimError::Config(format!("cannot parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, SimError> {
        let text = fs::read_to_string(path).map_err(|e| {
            SimError::Config(format!("cannot read config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_reference_station() {
        let config = SimulationConfig::default();
        assert_eq!(config.seed, 42);
        assert_eq!(config.capacity, 2);
        assert_eq!(config.horizon, 100.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn presets_are_valid() {
        assert!(SimulationConfig::no_contention().validate().is_ok());
        assert!(SimulationConfig::saturation().validate().is_ok());
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let config = SimulationConfig {
            capacity: 0,
            ..SimulationConfig::default()
        };
        assert!(matches!(config.validate(), Err(SimError::Config(_))));
    }

    #[test]
    fn non_positive_means_and_horizon_are_rejected() {
        let bad = [
            SimulationConfig {
                mean_interarrival_time: 0.0,
                ..SimulationConfig::default()
            },
            SimulationConfig {
                mean_service_time: -2.0,
                ..SimulationConfig::default()
            },
            SimulationConfig {
                horizon: 0.0,
                ..SimulationConfig::default()
            },
            SimulationConfig {
                horizon: f64::NAN,
                ..SimulationConfig::default()
            },
            SimulationConfig {
                queue_sampling: QueueSampling::Periodic { interval: 0.0 },
                ..SimulationConfig::default()
            },
        ];
        for config in bad {
            assert!(config.validate().is_err(), "{config:?} should be rejected");
        }
    }

    #[test]
    fn toml_overrides_only_given_keys() {
        let config = SimulationConfig::from_toml_str(
            r#"
            seed = 7
            capacity = 3

            [queue_sampling]
            policy = "periodic"
            interval = 0.5
            "#,
        )
        .unwrap();

        assert_eq!(config.seed, 7);
        assert_eq!(config.capacity, 3);
        assert_eq!(config.mean_service_time, 10.0);
        assert_eq!(
            config.queue_sampling,
            QueueSampling::Periodic { interval: 0.5 }
        );
    }

    #[test]
    fn toml_with_invalid_values_is_rejected() {
        assert!(SimulationConfig::from_toml_str("capacity = 0").is_err());
        assert!(SimulationConfig::from_toml_str("horizon = \"soon\"").is_err());
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = SimulationConfig::from_toml_file(Path::new("/nonexistent/car_wash.toml"))
            .unwrap_err();
        assert!(matches!(err, SimError::Config(_)));
    }
}
