//! Process bootstrap orchestration.
//!
//! # Responsibilities
//! - Build the process context, metrics client and logger
//! - Keep the metrics recorder drained on a timer
//! - Invoke the application's bind function exactly once
//! - Block until a termination signal or context cancellation
//! - Wait for every tracked task (listeners) to finish before returning
//!
//! # Design Decisions
//! - Fail fast: any construction or bind error is returned, nothing is retried
//! - One watcher task owns the signal/cancel race; the caller only awaits it,
//!   so "application started" always precedes "application stopped"

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::instrument::WithSubscriber;
use tracing::Level;

use crate::lifecycle::context::AppContext;
use crate::lifecycle::signals;
use crate::observability::logging::{self, BoxError, BoxedLayer, LogLevelCounter, LoggingConfig};
use crate::observability::metrics::{MetricsConfig, DEFAULT_UPKEEP_INTERVAL};
use crate::observability::{Logger, Metrics};

/// Builds the log layer.
pub type LoggerFactory = Box<dyn FnOnce() -> Result<BoxedLayer, BoxError> + Send>;

/// Builds the metrics client.
pub type MetricsFactory = Box<dyn FnOnce() -> Result<Metrics, BoxError> + Send>;

/// Completes when the process should shut down.
pub type ShutdownSignal = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A mutation applied to the default [`BootstrapConfig`].
pub type BootstrapOption = Box<dyn FnOnce(&mut BootstrapConfig) + Send>;

/// Error type for bootstrap.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("failed to construct metrics client: {0}")]
    Metrics(#[source] BoxError),

    #[error("failed to construct logger: {0}")]
    Logger(#[source] BoxError),

    #[error("failed to bind application: {0}")]
    Bind(#[source] BoxError),
}

/// Inputs of one process lifetime.
pub struct BootstrapConfig {
    /// Base context; bootstrap runs under a child of it.
    pub context: CancellationToken,
    pub make_logger: LoggerFactory,
    pub make_metrics: MetricsFactory,
    /// Tasks shutdown waits on before reporting the application stopped.
    pub tracker: TaskTracker,
    pub shutdown_signal: ShutdownSignal,
    /// Log events at or above this level are counted into metrics.
    pub counted_level: Level,
    pub upkeep_interval: Duration,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            context: CancellationToken::new(),
            make_logger: Box::new(|| logging::build_layer(&LoggingConfig::default())),
            make_metrics: Box::new(|| Ok(Metrics::new(&MetricsConfig::default())?)),
            tracker: TaskTracker::new(),
            shutdown_signal: Box::pin(signals::shutdown_signal()),
            counted_level: Level::INFO,
            upkeep_interval: DEFAULT_UPKEEP_INTERVAL,
        }
    }
}

/// Run under `token`; cancelling it shuts the application down.
pub fn with_context(token: CancellationToken) -> BootstrapOption {
    Box::new(move |config| config.context = token)
}

pub fn with_logger<F>(make_logger: F) -> BootstrapOption
where
    F: FnOnce() -> Result<BoxedLayer, BoxError> + Send + 'static,
{
    Box::new(move |config| config.make_logger = Box::new(make_logger))
}

pub fn with_logging_config(logging: LoggingConfig) -> BootstrapOption {
    with_logger(move || logging::build_layer(&logging))
}

pub fn with_metrics<F>(make_metrics: F) -> BootstrapOption
where
    F: FnOnce() -> Result<Metrics, BoxError> + Send + 'static,
{
    Box::new(move |config| config.make_metrics = Box::new(make_metrics))
}

pub fn with_metrics_config(metrics: MetricsConfig) -> BootstrapOption {
    with_metrics(move || Ok(Metrics::new(&metrics)?))
}

pub fn with_task_tracker(tracker: TaskTracker) -> BootstrapOption {
    Box::new(move |config| config.tracker = tracker)
}

/// Replace the OS signal wait, e.g. with a test trigger.
pub fn with_shutdown_signal<F>(signal: F) -> BootstrapOption
where
    F: Future<Output = ()> + Send + 'static,
{
    Box::new(move |config| config.shutdown_signal = Box::pin(signal))
}

pub fn with_counted_level(level: Level) -> BootstrapOption {
    Box::new(move |config| config.counted_level = level)
}

/// How often the metrics recorder folds buffered histogram samples.
pub fn with_metrics_upkeep(interval: Duration) -> BootstrapOption {
    Box::new(move |config| config.upkeep_interval = interval)
}

/// Bootstrap the application and block until it has shut down.
///
/// `bind` wires the application (typically by starting one or two HTTP
/// servers) and is called exactly once. An error from it is returned
/// immediately; the context is cancelled on every return path.
pub async fn bootstrap<F, Fut>(
    bind: F,
    options: impl IntoIterator<Item = BootstrapOption>,
) -> Result<(), BootstrapError>
where
    F: FnOnce(AppContext, Logger, Metrics) -> Fut + Send,
    Fut: Future<Output = Result<(), BoxError>> + Send,
{
    let mut config = BootstrapConfig::default();
    for option in options {
        option(&mut config);
    }
    let BootstrapConfig {
        context,
        make_logger,
        make_metrics,
        tracker,
        shutdown_signal,
        counted_level,
        upkeep_interval,
    } = config;

    let token = context.child_token();
    let _cancel_on_return = token.clone().drop_guard();

    let metrics = make_metrics().map_err(BootstrapError::Metrics)?;
    let layer = make_logger().map_err(BootstrapError::Logger)?;
    let logger = Logger::with_counter(layer, LogLevelCounter::new(metrics.clone(), counted_level));

    let ctx = AppContext::from_parts(token, tracker, logger.clone(), metrics);
    ctx.spawn(ctx.metrics().clone().upkeep(ctx.token().clone(), upkeep_interval));
    let dispatch = logger.dispatch().clone();
    run(ctx, bind, shutdown_signal).with_subscriber(dispatch).await
}

async fn run<F, Fut>(ctx: AppContext, bind: F, shutdown_signal: ShutdownSignal) -> Result<(), BootstrapError>
where
    F: FnOnce(AppContext, Logger, Metrics) -> Fut,
    Fut: Future<Output = Result<(), BoxError>>,
{
    tracing::info!("Binding application components");
    bind(ctx.clone(), ctx.logger().clone(), ctx.metrics().clone())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Application bind failed");
            BootstrapError::Bind(e)
        })?;
    tracing::info!("Application started");

    let token = ctx.token().clone();
    let done = tokio::spawn(
        async move {
            tokio::select! {
                _ = shutdown_signal => {},
                _ = token.cancelled() => tracing::debug!("Context cancelled"),
            }
            token.cancel();
        }
        .with_current_subscriber(),
    );
    if let Err(e) = done.await {
        tracing::error!(error = %e, "Shutdown watcher failed");
        ctx.cancel();
    }

    tracing::info!("Application stopping, waiting for tasks");
    ctx.wait().await;
    tracing::info!("Application stopped");
    Ok(())
}
