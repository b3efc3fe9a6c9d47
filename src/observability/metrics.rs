//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Own a Prometheus recorder per process (no global recorder is installed)
//! - Instrument routes with request counts, in-flight gauges and latency
//! - Count log entries by level and background task outcomes
//! - Render the Prometheus text exposition format
//! - Drain buffered histogram samples periodically, scraped or not
//!
//! # Metrics
//! - `http_requests_total` (counter): requests by route, method, status
//! - `http_request_duration_seconds` (histogram): latency by route, method
//! - `http_requests_in_flight` (gauge): requests currently being served by route
//! - `log_entries_total` (counter): log events by level
//! - `task_operations_total` (counter): task outcomes by task, operation, code

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::Response,
    routing::MethodRouter,
};
use metrics::{counter, gauge, histogram, Gauge};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use serde::{Deserialize, Serialize};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Default latency buckets in seconds, tuned for typical web latencies.
pub const DEFAULT_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// How often buffered histogram samples are folded into their buckets.
pub const DEFAULT_UPKEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Error type for metrics construction.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// The exporter rejected the configuration (e.g. empty bucket list).
    #[error("invalid metrics configuration: {0}")]
    Build(#[from] BuildError),
}

/// Metrics client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Optional prefix applied to every metric name (`<namespace>_<name>`).
    pub namespace: Option<String>,

    /// Histogram buckets for request latency, in seconds.
    pub buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            buckets: DEFAULT_BUCKETS.to_vec(),
        }
    }
}

/// Process-wide metrics client.
///
/// Cheap to clone; every clone records into the same recorder.
#[derive(Clone)]
pub struct Metrics {
    recorder: Arc<PrometheusRecorder>,
    handle: PrometheusHandle,
    namespace: Option<Arc<str>>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl Metrics {
    /// Build a metrics client backed by a fresh Prometheus recorder.
    pub fn new(config: &MetricsConfig) -> Result<Self, MetricsError> {
        let namespace: Option<Arc<str>> = config
            .namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .map(Arc::from);

        let duration_name = qualify(namespace.as_deref(), "http_request_duration_seconds");
        let recorder = PrometheusBuilder::new()
            .set_buckets_for_metric(Matcher::Full(duration_name), &config.buckets)?
            .build_recorder();
        let handle = recorder.handle();

        Ok(Self {
            recorder: Arc::new(recorder),
            handle,
            namespace,
        })
    }

    fn name(&self, base: &str) -> String {
        qualify(self.namespace.as_deref(), base)
    }

    /// Record one completed request.
    pub fn record_request(&self, route: &str, method: &str, status: u16, elapsed: Duration) {
        let requests = self.name("http_requests_total");
        let duration = self.name("http_request_duration_seconds");
        metrics::with_local_recorder(&*self.recorder, || {
            counter!(
                requests,
                "route" => route.to_owned(),
                "method" => method.to_owned(),
                "status" => status.to_string()
            )
            .increment(1);
            histogram!(
                duration,
                "route" => route.to_owned(),
                "method" => method.to_owned()
            )
            .record(elapsed.as_secs_f64());
        });
    }

    /// Mark a request as in flight on `route` until the guard is dropped.
    pub fn in_flight(&self, route: &str) -> InFlightGuard {
        let name = self.name("http_requests_in_flight");
        let gauge = metrics::with_local_recorder(&*self.recorder, || {
            gauge!(name, "route" => route.to_owned())
        });
        gauge.increment(1.0);
        InFlightGuard { gauge }
    }

    /// Count one log entry at `level`.
    pub fn increment_log_level(&self, level: &tracing::Level) {
        let name = self.name("log_entries_total");
        metrics::with_local_recorder(&*self.recorder, || {
            counter!(name, "level" => level.as_str().to_ascii_lowercase()).increment(1);
        });
    }

    /// Count one outcome of a background task operation.
    pub fn increment_task(&self, task: &str, operation: &str, code: &str) {
        let name = self.name("task_operations_total");
        metrics::with_local_recorder(&*self.recorder, || {
            counter!(
                name,
                "task" => task.to_owned(),
                "operation" => operation.to_owned(),
                "code" => code.to_owned()
            )
            .increment(1);
        });
    }

    /// Render the Prometheus text exposition.
    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Fold buffered histogram samples into their buckets.
    ///
    /// The recorder buffers every sample until this or [`render`](Self::render)
    /// runs, so a process that is never scraped needs it on a timer.
    pub fn run_upkeep(&self) {
        self.handle.run_upkeep();
    }

    /// Run [`run_upkeep`](Self::run_upkeep) every `period` until `token` is
    /// cancelled.
    pub async fn upkeep(self, token: CancellationToken, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => self.run_upkeep(),
            }
        }
        self.run_upkeep();
        tracing::debug!("Metrics upkeep stopped");
    }

    /// Wrap `endpoint` so every request through it is counted and timed
    /// under `route`. Completion is logged at debug unless `quiet`.
    pub fn instrument(&self, endpoint: MethodRouter, route: impl Into<String>, quiet: bool) -> MethodRouter {
        let state = RouteInstrument {
            metrics: self.clone(),
            route: route.into().into(),
            quiet,
        };
        endpoint.layer(middleware::from_fn_with_state(state, instrument_request))
    }
}

fn qualify(namespace: Option<&str>, base: &str) -> String {
    match namespace {
        Some(ns) => format!("{ns}_{base}"),
        None => base.to_string(),
    }
}

/// Decrements the in-flight gauge on drop, including on panic unwind.
#[must_use = "the request stops counting as in flight when the guard is dropped"]
pub struct InFlightGuard {
    gauge: Gauge,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.gauge.decrement(1.0);
    }
}

#[derive(Clone)]
struct RouteInstrument {
    metrics: Metrics,
    route: Arc<str>,
    quiet: bool,
}

async fn instrument_request(
    State(instrument): State<RouteInstrument>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let _in_flight = instrument.metrics.in_flight(&instrument.route);
    let start = Instant::now();

    let response = next.run(request).await;

    let elapsed = start.elapsed();
    let status = response.status().as_u16();
    instrument
        .metrics
        .record_request(&instrument.route, method.as_str(), status, elapsed);

    if !instrument.quiet {
        tracing::debug!(
            route = %instrument.route,
            status,
            elapsed_ms = elapsed.as_millis() as u64,
            "Request completed"
        );
    }
    response
}
