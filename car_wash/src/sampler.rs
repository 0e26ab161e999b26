use des::{Context, Process, SimError, Wake, Yield};

use crate::metrics::MetricsState;

/// Records the queue length every `interval` time units, starting at spawn.
pub struct QueueSampler {
    interval: f64,
}

impl QueueSampler {
    pub fn new(interval: f64) -> Result<QueueSampler, SimError> {
        if !(interval.is_finite() && interval > 0.0) {
            return Err(SimError::Config(format!(
                "queue sampling interval must be a positive finite number, got {interval}"
            )));
        }
        Ok(QueueSampler { interval })
    }
}

impl Process<MetricsState> for QueueSampler {
    fn resume(
        &mut self,
        ctx: &mut Context<'_, MetricsState>,
        wake: Wake,
    ) -> Result<Yield, SimError> {
        if let Wake::Granted(slot) = wake {
            return Err(SimError::ProtocolViolation(format!(
                "queue sampler was granted slot {slot} it never asked for"
            )));
        }
        let now = ctx.now();
        let queue_length = ctx.queue_length();
        ctx.state().sample_queue_length(now, queue_length);
        Ok(Yield::Timeout(self.interval))
    }
}
