use des::ResourcePool;
use serde::{Deserialize, Serialize};

/// Queue length observed at `time`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueueSample {
    pub time: f64,
    pub queue_length: usize,
}

/// One car's passage through the station, recorded when it gets a bay
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ServiceEntity {
    pub id: usize,
    pub arrival_time: f64,
    pub grant_time: f64,
    pub wait_time: f64,
    pub slot: usize,
    pub service_duration: f64,
}

/// Aggregates read after a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub average_wait: f64,
    pub max_wait: f64,
    pub average_queue_length: f64,
    /// Busy time of each bay divided by the horizon
    pub per_slot_utilization: Vec<f64>,
    pub cars_arrived: usize,
    pub cars_served: usize,
    pub cars_completed: usize,
}

impl Summary {
    pub fn utilization_percent(&self) -> Vec<f64> {
        self.per_slot_utilization.iter().map(|u| u * 100.0).collect()
    }
}

/// Append-only measurements shared by every process of a run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsState {
    wait_times: Vec<f64>,
    queue_samples: Vec<QueueSample>,
    busy_time: Vec<f64>,
    entities: Vec<ServiceEntity>,
    arrivals: usize,
    completions: usize,
    last_update_time: f64,
}

impl MetricsState {
    pub fn new(slots: usize) -> Self {
        MetricsState {
            busy_time: vec![0.0; slots],
            ..Self::default()
        }
    }

    pub fn record_arrival(&mut self, now: f64) {
        self.arrivals += 1;
        self.touch(now);
    }

    pub fn record_wait(&mut self, duration: f64) {
        self.wait_times.push(duration);
    }

    pub fn sample_queue_length(&mut self, time: f64, queue_length: usize) {
        self.queue_samples.push(QueueSample { time, queue_length });
        self.touch(time);
    }

    pub fn add_busy_time(&mut self, slot: usize, duration: f64) {
        if self.busy_time.len() <= slot {
            self.busy_time.resize(slot + 1, 0.0);
        }
        self.busy_time[slot] += duration;
    }

    pub fn record_entity(&mut self, entity: ServiceEntity) {
        self.touch(entity.grant_time);
        self.entities.push(entity);
    }

    pub fn record_completion(&mut self, now: f64) {
        self.completions += 1;
        self.touch(now);
    }

    /// Credit every bay still washing at `horizon` with the time since its
    /// grant. Call once, after the run.
    pub fn close(&mut self, pool: &ResourcePool, horizon: f64) {
        for slot in 0..pool.capacity() {
            if let Some(occupant) = pool.occupant(slot) {
                self.add_busy_time(slot, (horizon - occupant.granted_at).max(0.0));
            }
        }
    }

    fn touch(&mut self, now: f64) {
        self.last_update_time = self.last_update_time.max(now);
    }

    /// Wait times in the order bays were granted
    pub fn wait_times(&self) -> &[f64] {
        &self.wait_times
    }

    pub fn queue_samples(&self) -> &[QueueSample] {
        &self.queue_samples
    }

    pub fn busy_time(&self) -> &[f64] {
        &self.busy_time
    }

    /// Cars that got a bay, in grant order
    pub fn entities(&self) -> &[ServiceEntity] {
        &self.entities
    }

    pub fn arrivals(&self) -> usize {
        self.arrivals
    }

    pub fn completions(&self) -> usize {
        self.completions
    }

    pub fn last_update_time(&self) -> f64 {
        self.last_update_time
    }

    /// Averages over everything recorded; empty sequences give zeros.
    pub fn summary(&self, horizon: f64) -> Summary {
        let average_wait = mean(self.wait_times.iter().copied());
        let max_wait = self.wait_times.iter().copied().fold(0.0, f64::max);
        let average_queue_length =
            mean(self.queue_samples.iter().map(|s| s.queue_length as f64));
        let per_slot_utilization = self
            .busy_time
            .iter()
            .map(|busy| if horizon > 0.0 { busy / horizon } else { 0.0 })
            .collect();

        Summary {
            average_wait,
            max_wait,
            average_queue_length,
            per_slot_utilization,
            cars_arrived: self.arrivals,
            cars_served: self.wait_times.len(),
            cars_completed: self.completions,
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 { 0.0 } else { sum / count as f64 }
}
