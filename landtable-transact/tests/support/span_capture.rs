//! Span capture for asserting on the coordinator's tracing instrumentation.
//!
//! A `tracing_subscriber` layer records every span, its level, its parent and
//! its fields (including ones recorded after creation) into a [`SpanStore`].
//!
//! The subscriber is installed with `set_default`, so it only sees work on
//! the current thread: tests must use
//! `#[tokio::test(flavor = "current_thread")]`.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::Subscriber;
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;

#[derive(Debug, Clone)]
pub struct CapturedSpan {
    pub name: &'static str,
    pub level: tracing::Level,
    pub fields: HashMap<String, String>,
    pub parent: Option<&'static str>,
}

impl CapturedSpan {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Position of a span in the store, kept in the span's extensions
struct Slot(usize);

#[derive(Debug, Clone, Default)]
pub struct SpanStore(Arc<Mutex<Vec<CapturedSpan>>>);

impl SpanStore {
    pub fn has_span(&self, name: &str) -> bool {
        self.0.lock().iter().any(|span| span.name == name)
    }

    pub fn find_span(&self, name: &str) -> Option<CapturedSpan> {
        self.0.lock().iter().find(|span| span.name == name).cloned()
    }

    pub fn find_spans(&self, name: &str) -> Vec<CapturedSpan> {
        self.0
            .lock()
            .iter()
            .filter(|span| span.name == name)
            .cloned()
            .collect()
    }

    /// Span names in creation order
    pub fn span_names(&self) -> Vec<&'static str> {
        self.0.lock().iter().map(|span| span.name).collect()
    }
}

struct CaptureLayer {
    store: SpanStore,
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut fields = Fields::default();
        attrs.record(&mut fields);

        let parent = attrs
            .parent()
            .and_then(|parent| ctx.span(parent))
            .or_else(|| ctx.lookup_current())
            .map(|span| span.name());

        let Some(span) = ctx.span(id) else { return };
        let meta = span.metadata();
        let slot = {
            let mut store = self.store.0.lock();
            store.push(CapturedSpan {
                name: meta.name(),
                level: *meta.level(),
                fields: fields.0,
                parent,
            });
            store.len() - 1
        };
        span.extensions_mut().insert(Slot(slot));
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let extensions = span.extensions();
        let Some(Slot(slot)) = extensions.get::<Slot>() else {
            return;
        };
        let mut fields = Fields::default();
        values.record(&mut fields);
        if let Some(captured) = self.store.0.lock().get_mut(*slot) {
            captured.fields.extend(fields.0);
        }
    }
}

#[derive(Default)]
struct Fields(HashMap<String, String>);

impl Visit for Fields {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{value:?}"));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.0.insert(field.name().to_string(), value.to_string());
    }
}

/// Capture every span created on this thread until the guard drops
pub fn init_test_tracing() -> (SpanStore, tracing::subscriber::DefaultGuard) {
    let store = SpanStore::default();
    let subscriber = tracing_subscriber::Registry::default().with(CaptureLayer {
        store: store.clone(),
    });
    (store, tracing::subscriber::set_default(subscriber))
}
