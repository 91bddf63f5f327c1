//! Mock tracing layer for testing.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::Level;
use tracing_subscriber::Layer;

/// Mock layer that captures events for testing.
///
/// Used to assert that admission paths which must not fail the request
/// (such as a corrupt counter) still leave a trace in the logs.
#[derive(Clone)]
pub struct MockCaptureLayer {
    captured: Arc<Mutex<Vec<CapturedEvent>>>,
}

/// Captured event information.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct CapturedEvent {
    pub level: Level,
    pub target: String,
    pub message: String,
    pub fields: BTreeMap<String, String>,
}

impl CapturedEvent {
    /// Look up a recorded field by name.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

impl MockCaptureLayer {
    /// Create a new mock capture layer.
    pub fn new() -> Self {
        Self {
            captured: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Get all captured events.
    pub fn get_captured(&self) -> Vec<CapturedEvent> {
        self.captured
            .lock()
            .expect(
                "MockCaptureLayer mutex poisoned - a test thread panicked while holding the lock",
            )
            .clone()
    }

    /// Get captured events at `level`.
    pub fn at_level(&self, level: Level) -> Vec<CapturedEvent> {
        self.get_captured()
            .into_iter()
            .filter(|e| e.level == level)
            .collect()
    }

    /// Get the count of captured events.
    pub fn count(&self) -> usize {
        self.captured
            .lock()
            .expect(
                "MockCaptureLayer mutex poisoned - a test thread panicked while holding the lock",
            )
            .len()
    }

    /// Clear all captured events.
    pub fn clear(&self) {
        self.captured
            .lock()
            .expect(
                "MockCaptureLayer mutex poisoned - a test thread panicked while holding the lock",
            )
            .clear();
    }
}

impl Default for MockCaptureLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Layer<S> for MockCaptureLayer
where
    S: tracing::Subscriber,
{
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);

        self.captured
            .lock()
            .expect(
                "MockCaptureLayer mutex poisoned - a test thread panicked while holding the lock",
            )
            .push(CapturedEvent {
                level: *event.metadata().level(),
                target: event.metadata().target().to_string(),
                message: visitor.message,
                fields: visitor.fields,
            });
    }
}

/// Splits the `message` field from the structured fields.
#[derive(Default)]
struct EventVisitor {
    message: String,
    fields: BTreeMap<String, String>,
}

impl EventVisitor {
    fn insert(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = value;
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for EventVisitor {
    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, value.to_string());
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, value.to_string());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, format!("{:?}", value));
    }
}
