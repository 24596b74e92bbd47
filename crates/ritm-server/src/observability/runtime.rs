//! Async runtime instrumentation.
//!
//! Exposes tokio runtime gauges and samples scheduling lag: a timer is armed
//! for a fixed interval and the delay between its deadline and the moment
//! the task actually resumes is recorded. A busy or blocked runtime shows up
//! as growing lag.

use opentelemetry::metrics::{Histogram, Meter, ObservableGauge};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Tokio runtime instruments.
pub struct RuntimeMetrics {
    _workers: ObservableGauge<u64>,
    _alive_tasks: ObservableGauge<u64>,
    _global_queue_depth: ObservableGauge<u64>,
    scheduling_lag: Histogram<f64>,
}

impl RuntimeMetrics {
    /// Register the runtime gauges for the runtime behind `handle`.
    pub fn new(meter: &Meter, handle: Handle) -> Self {
        let workers_handle = handle.clone();
        let tasks_handle = handle.clone();
        let queue_handle = handle;

        Self {
            _workers: meter
                .u64_observable_gauge("runtime.tokio.workers")
                .with_description("Number of runtime worker threads")
                .with_callback(move |observer| {
                    observer.observe(workers_handle.metrics().num_workers() as u64, &[]);
                })
                .build(),
            _alive_tasks: meter
                .u64_observable_gauge("runtime.tokio.alive_tasks")
                .with_description("Number of tasks alive in the runtime")
                .with_callback(move |observer| {
                    observer.observe(tasks_handle.metrics().num_alive_tasks() as u64, &[]);
                })
                .build(),
            _global_queue_depth: meter
                .u64_observable_gauge("runtime.tokio.global_queue_depth")
                .with_description("Tasks waiting in the runtime's global queue")
                .with_callback(move |observer| {
                    observer.observe(queue_handle.metrics().global_queue_depth() as u64, &[]);
                })
                .build(),
            scheduling_lag: meter
                .f64_histogram("runtime.tokio.scheduling_lag")
                .with_description("Delay between a timer deadline and the task resuming")
                .with_unit("s")
                .build(),
        }
    }

    /// Record one scheduling lag sample.
    pub fn record_lag(&self, lag: Duration) {
        self.scheduling_lag.record(lag.as_secs_f64(), &[]);
    }

    /// Spawn the recurring lag sampler. It stops when `shutdown_rx` fires.
    pub fn spawn_lag_sampler(
        self,
        interval: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let armed = Instant::now();
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        self.record_lag(lag_since(armed, interval));
                    }
                    _ = shutdown_rx.changed() => {
                        tracing::debug!("Runtime lag sampler stopping");
                        break;
                    }
                }
            }
        })
    }
}

/// Time past `interval` that elapsed since `armed`.
fn lag_since(armed: Instant, interval: Duration) -> Duration {
    armed.elapsed().saturating_sub(interval)
}
