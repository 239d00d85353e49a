use std::fmt;
use tracing::field::{Field, Visit};

/// Collects the fields of a metadata event as `(name, value)` strings.
#[derive(Default)]
pub(crate) struct MetaVisitor {
    pub fields: Vec<(&'static str, String)>,
}

impl MetaVisitor {
    fn push(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            return;
        }
        self.fields.push((field.name(), value));
    }
}

impl Visit for MetaVisitor {
    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, value.to_string());
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.push(field, format!("{:?}", value));
    }
}
