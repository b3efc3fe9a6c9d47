//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use service_runtime::observability::logging::BoxedLayer;
use service_runtime::observability::{Logger, Metrics, MetricsConfig};
use service_runtime::AppContext;
use tokio_util::sync::CancellationToken;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

/// A context with a silent logger and its own metrics client.
pub fn context() -> AppContext {
    let metrics = Metrics::new(&MetricsConfig::default()).unwrap();
    AppContext::new(CancellationToken::new(), Logger::disabled(), metrics)
}

/// HTTP client that never goes through a proxy.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

pub fn url(addr: SocketAddr, path: &str) -> String {
    format!("http://{addr}{path}")
}

/// HTTPS client trusting any certificate, for self-signed test listeners.
pub fn https_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .danger_accept_invalid_certs(true)
        .build()
        .unwrap()
}

/// A fresh self-signed certificate and private key for `localhost`, PEM encoded.
pub fn self_signed() -> (String, String) {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    (cert.pem(), key_pair.serialize_pem())
}

/// Log messages recorded by a [`CaptureLayer`].
#[derive(Clone, Default)]
pub struct Captured(Arc<Mutex<Vec<String>>>);

impl Captured {
    pub fn messages(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, message: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|m| *m == message).count()
    }

    pub fn position(&self, message: &str) -> Option<usize> {
        self.0.lock().unwrap().iter().position(|m| m == message)
    }
}

/// Layer recording the message of every event.
pub struct CaptureLayer(Captured);

/// A boxed capture layer for `with_logger`, plus the handle to read it.
pub fn capture() -> (BoxedLayer, Captured) {
    let captured = Captured::default();
    (Box::new(CaptureLayer(captured.clone())), captured)
}

struct MessageVisitor(Option<String>);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = Some(format!("{value:?}"));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.0 = Some(value.to_owned());
        }
    }
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor(None);
        event.record(&mut visitor);
        if let Some(message) = visitor.0 {
            (self.0).0.lock().unwrap().push(message);
        }
    }
}
