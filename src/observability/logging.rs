//! Structured logging.
//!
//! # Responsibilities
//! - Build the process log layer (pretty or JSON, level from config or `RUST_LOG`)
//! - Count log events by level into [`Metrics`]
//! - Carry a logger (dispatch + contextual span) through tasks and requests
//!
//! # Design Decisions
//! - No global subscriber is installed; the [`Logger`] is passed explicitly
//! - A child logger is a child span, so contextual fields attach to every event

use std::future::Future;

use serde::{Deserialize, Serialize};
use tracing::instrument::{Instrument, WithSubscriber};
use tracing::{Dispatch, Event, Level, Span, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::{EnvFilter, Registry};

use crate::observability::metrics::Metrics;

/// Boxed error used at caller-supplied seams.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A log layer ready to be stacked on the registry.
pub type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (trace, debug, info, warn, error, or full `EnvFilter` syntax).
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Build the default log layer. `RUST_LOG` takes precedence over `config.level`.
pub fn build_layer(config: &LoggingConfig) -> Result<BoxedLayer, BoxError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)?,
    };

    let layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_filter(filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_filter(filter).boxed()
    };
    Ok(layer)
}

/// Layer that counts every event at or above `threshold` severity.
pub struct LogLevelCounter {
    metrics: Metrics,
    threshold: Level,
}

impl LogLevelCounter {
    pub fn new(metrics: Metrics, threshold: Level) -> Self {
        Self { metrics, threshold }
    }
}

impl<S: Subscriber> Layer<S> for LogLevelCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = event.metadata().level();
        // tracing orders verbosity upwards: ERROR < WARN < ... < TRACE
        if *level <= self.threshold {
            self.metrics.increment_log_level(level);
        }
    }
}

/// A logger: the dispatch events are routed to plus the contextual span
/// whose fields decorate them.
#[derive(Clone, Debug)]
pub struct Logger {
    dispatch: Dispatch,
    span: Span,
}

impl Logger {
    /// Wrap an existing dispatch with no contextual span.
    pub fn new(dispatch: Dispatch) -> Self {
        Self {
            dispatch,
            span: Span::none(),
        }
    }

    /// Compose `layer` with a level counter into a process logger.
    pub fn with_counter(layer: BoxedLayer, counter: LogLevelCounter) -> Self {
        let subscriber = Registry::default().with(layer).with(counter);
        Self::new(Dispatch::new(subscriber))
    }

    /// A logger that discards everything.
    pub fn disabled() -> Self {
        Self::new(Dispatch::new(tracing::subscriber::NoSubscriber::default()))
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Derive a child logger. `make_span` runs inside this logger's span,
    /// so the new span is its child and inherits its context.
    pub fn child(&self, make_span: impl FnOnce() -> Span) -> Logger {
        let span = self.in_scope(make_span);
        Logger {
            dispatch: self.dispatch.clone(),
            span,
        }
    }

    /// Run `f` with this logger as the current dispatch and span.
    pub fn in_scope<R>(&self, f: impl FnOnce() -> R) -> R {
        tracing::dispatcher::with_default(&self.dispatch, || self.span.in_scope(f))
    }

    /// Attach this logger to a future for every poll.
    pub fn scope<F: Future>(&self, future: F) -> impl Future<Output = F::Output> {
        future
            .instrument(self.span.clone())
            .with_subscriber(self.dispatch.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::metrics::MetricsConfig;

    #[test]
    fn test_counter_respects_threshold() {
        let metrics = Metrics::new(&MetricsConfig::default()).unwrap();
        let layer = build_layer(&LoggingConfig {
            level: "off".into(),
            json: false,
        })
        .unwrap();
        let logger = Logger::with_counter(layer, LogLevelCounter::new(metrics.clone(), Level::WARN));

        logger.in_scope(|| {
            tracing::error!("boom");
            tracing::warn!("careful");
            tracing::info!("fine");
        });

        let output = metrics.render();
        assert!(output.contains(r#"log_entries_total{level="error"} 1"#));
        assert!(output.contains(r#"log_entries_total{level="warn"} 1"#));
        assert!(!output.contains(r#"level="info""#));
    }

    #[test]
    fn test_invalid_level_is_an_error() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let config = LoggingConfig {
            level: "service_runtime=verbose".into(),
            json: false,
        };
        assert!(build_layer(&config).is_err());
    }

    #[test]
    fn test_child_span_is_nested() {
        let logger = Logger::with_counter(
            build_layer(&LoggingConfig::default()).unwrap(),
            LogLevelCounter::new(Metrics::new(&MetricsConfig::default()).unwrap(), Level::ERROR),
        );
        let parent = logger.child(|| tracing::info_span!("parent"));
        let child = parent.child(|| tracing::info_span!("child"));
        assert_eq!(child.span().metadata().map(|m| m.name()), Some("child"));
        assert!(!child.span().is_disabled());
    }
}
