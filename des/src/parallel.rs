//! Parallel execution of independent replications
//!
//! Each replication builds and runs its own [`Simulation`](crate::Simulation)
//! on one worker thread; nothing is shared between replications, and every
//! individual run stays single-threaded.
//!
//! # Example: 100 seeds of the same model
//!
//! ```rust
//! use des::parallel::{ParallelRunner, simple_progress_reporter};
//! use des::{Context, Process, SimError, Simulation, Wake, Yield};
//!
//! struct Ticker;
//!
//! impl Process<u64> for Ticker {
//!     fn resume(&mut self, ctx: &mut Context<'_, u64>, _wake: Wake) -> Result<Yield, SimError> {
//!         *ctx.state() += 1;
//!         Ok(Yield::Timeout(1.0))
//!     }
//! }
//!
//! let results = ParallelRunner::new(100, |replication| {
//!     let mut sim = Simulation::new(1, 0u64)?;
//!     sim.spawn(Ticker)?;
//!     sim.run_until(10.0 + replication as f64)?;
//!     Ok(sim.into_state())
//! })
//! .progress(simple_progress_reporter(10))
//! .num_threads(4)
//! .run();
//!
//! assert_eq!(results[0], Ok(11));
//! assert_eq!(results[99], Ok(110));
//! ```
//!
//! # Determinism
//!
//! Results are deterministic when the builder derives every seed from the
//! replication index and the model draws only from RNGs it was handed.
//! Results come back in replication order regardless of thread count.
//!
//! # Error Handling
//!
//! A replication that returns a [`SimError`] or panics yields an `Err` in its
//! own slot; the other replications carry on.

use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use thiserror::Error;
use tracing::{info, warn};

use crate::SimError;

/// Why a replication produced no result
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReplicationError {
    #[error("replication {replication} failed: {source}")]
    Failed {
        replication: usize,
        #[source]
        source: SimError,
    },

    #[error("replication {replication} panicked: {message}")]
    Panicked { replication: usize, message: String },
}

type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Runs independent replications in parallel
///
/// The builder `F` receives the replication index, runs one complete
/// simulation, and returns its result. It must be `Send + Sync` because
/// rayon calls it from several threads.
pub struct ParallelRunner<R, F>
where
    F: Fn(usize) -> Result<R, SimError> + Send + Sync,
    R: Send,
{
    num_replications: usize,
    builder: F,
    num_threads: Option<usize>,
    progress_callback: Option<ProgressCallback>,
    _result: PhantomData<fn() -> R>,
}

impl<R, F> ParallelRunner<R, F>
where
    F: Fn(usize) -> Result<R, SimError> + Send + Sync,
    R: Send,
{
    pub fn new(num_replications: usize, builder: F) -> Self {
        ParallelRunner {
            num_replications,
            builder,
            num_threads: None,
            progress_callback: None,
            _result: PhantomData,
        }
    }

    /// Set number of threads (defaults to rayon's global pool)
    pub fn num_threads(mut self, n: usize) -> Self {
        self.num_threads = Some(n);
        self
    }

    /// Set progress callback, called with `(completed, total)` after each
    /// replication finishes
    pub fn progress<P>(mut self, callback: P) -> Self
    where
        P: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(callback));
        self
    }

    /// Execute all replications and return results in replication order
    pub fn run(self) -> Vec<Result<R, ReplicationError>> {
        let progress_counter = AtomicUsize::new(0);

        let pool = self.num_threads.and_then(|n| {
            rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| warn!(threads = n, error = %e, "falling back to global thread pool"))
                .ok()
        });

        let execute = || {
            (0..self.num_replications)
                .into_par_iter()
                .map(|replication| {
                    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        (self.builder)(replication)
                    }));

                    let completed = progress_counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if let Some(ref callback) = self.progress_callback {
                        callback(completed, self.num_replications);
                    }

                    match result {
                        Ok(Ok(value)) => Ok(value),
                        Ok(Err(source)) => Err(ReplicationError::Failed {
                            replication,
                            source,
                        }),
                        Err(panic) => Err(ReplicationError::Panicked {
                            replication,
                            message: panic_message(panic.as_ref()),
                        }),
                    }
                })
                .collect()
        };

        match pool {
            Some(pool) => pool.install(execute),
            None => execute(),
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Run replications in parallel with the default thread pool
pub fn run_parallel<R, F>(num_replications: usize, builder: F) -> Vec<Result<R, ReplicationError>>
where
    F: Fn(usize) -> Result<R, SimError> + Send + Sync,
    R: Send,
{
    ParallelRunner::new(num_replications, builder).run()
}

/// Run replications in batches of at most `batch_size` to bound peak memory
pub fn run_batched<R, F>(
    num_replications: usize,
    batch_size: usize,
    builder: F,
) -> Vec<Result<R, ReplicationError>>
where
    F: Fn(usize) -> Result<R, SimError> + Send + Sync,
    R: Send,
{
    let mut all_results = Vec::with_capacity(num_replications);

    for batch_start in (0..num_replications).step_by(batch_size.max(1)) {
        let batch_end = (batch_start + batch_size.max(1)).min(num_replications);
        let batch_results = run_parallel(batch_end - batch_start, |local_id| {
            builder(batch_start + local_id)
        });
        // Indices inside a batch are local; report global ones.
        all_results.extend(batch_results.into_iter().map(|result| {
            result.map_err(|e| match e {
                ReplicationError::Failed {
                    replication,
                    source,
                } => ReplicationError::Failed {
                    replication: batch_start + replication,
                    source,
                },
                ReplicationError::Panicked {
                    replication,
                    message,
                } => ReplicationError::Panicked {
                    replication: batch_start + replication,
                    message,
                },
            })
        }));
    }

    all_results
}

/// Progress callback that logs every `interval` completed replications
pub fn simple_progress_reporter(interval: usize) -> impl Fn(usize, usize) + Send + Sync {
    let interval = interval.max(1);
    move |completed, total| {
        if completed % interval == 0 || completed == total {
            info!(completed, total, "replications completed");
        }
    }
}
