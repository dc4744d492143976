//! Per-request sampling gate.
//!
//! # Responsibilities
//! - Decide, once per inbound request, whether tracing middleware runs
//! - Supply uniform samples without contention between requests
//!
//! # Design Decisions
//! - Rate 0 and rate 100 never consult the random source
//! - The default source draws from a thread-local generator per call
//! - The buffered source is fed by one task bound to the shutdown signal and
//!   falls back to a direct draw instead of ever waiting

use std::sync::{Arc, Mutex};

use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::sync::{broadcast, mpsc};

use crate::instrumentation::config::SamplingRate;
use crate::observability::metrics;

/// Source of uniform samples in `[0, 1)`.
pub trait SampleSource: Send + Sync {
    fn sample(&self) -> f64;
}

/// Thread-local generator, drawn synchronously on every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct FastRandSource;

impl SampleSource for FastRandSource {
    fn sample(&self) -> f64 {
        fastrand::f64()
    }
}

/// Bounded buffer of pre-drawn samples filled by a background task.
pub struct BufferedSampleSource {
    samples: Mutex<mpsc::Receiver<f64>>,
}

impl BufferedSampleSource {
    pub const DEFAULT_CAPACITY: usize = 1000;

    /// Spawn the producer task on the current tokio runtime.
    ///
    /// The producer exits when `shutdown` fires or when the source is dropped.
    pub fn start(capacity: usize, mut shutdown: broadcast::Receiver<()>) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(capacity.max(1));

        tokio::spawn(async move {
            let mut rng = StdRng::from_entropy();
            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        tracing::debug!("Sample producer received shutdown signal");
                        break;
                    }
                    permit = tx.reserve() => match permit {
                        Ok(permit) => permit.send(rng.gen::<f64>()),
                        Err(_) => break,
                    },
                }
            }
        });

        Arc::new(Self {
            samples: Mutex::new(rx),
        })
    }
}

impl SampleSource for BufferedSampleSource {
    fn sample(&self) -> f64 {
        let buffered = match self.samples.try_lock() {
            Ok(mut rx) => rx.try_recv().ok(),
            Err(_) => None,
        };
        buffered.unwrap_or_else(fastrand::f64)
    }
}

/// Decides whether a request is traced.
#[derive(Clone)]
pub struct SamplingGate {
    rate: SamplingRate,
    source: Arc<dyn SampleSource>,
}

impl SamplingGate {
    pub fn new(rate: SamplingRate, source: Arc<dyn SampleSource>) -> Self {
        Self { rate, source }
    }

    pub fn rate(&self) -> SamplingRate {
        self.rate
    }

    pub fn decide(&self) -> bool {
        let sampled = match self.rate {
            SamplingRate::NEVER => false,
            SamplingRate::ALWAYS => true,
            rate => self.source.sample() <= rate.probability(),
        };
        metrics::record_sampling_decision(sampled);
        sampled
    }
}
