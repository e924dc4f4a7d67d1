//! Quality Gate: decides whether a parse result is fit to serve from cache.
//!
//! Applied on every cache read, before every cache write, and by the sweep.
//! Gates are pure and must never panic: anything malformed is simply invalid.

use serde_json::Value;

use crate::models::resume::{ContactInfo, ParsedResume};

/// Carried as `Arc<dyn QualityGate>` by the manager and the sweep job.
pub trait QualityGate: Send + Sync {
    fn is_valid(&self, result: &ParsedResume) -> bool;

    /// Short label used in logs.
    fn name(&self) -> &'static str;
}

/// Evaluates a raw stored value. `null`, non-objects and values that do not
/// decode as a `ParsedResume` are invalid.
pub fn is_valid_value(gate: &dyn QualityGate, value: &Value) -> bool {
    if !value.is_object() {
        return false;
    }
    match serde_json::from_value::<ParsedResume>(value.clone()) {
        Ok(parsed) => gate.is_valid(&parsed),
        Err(_) => false,
    }
}

/// A result is usable when it identifies the candidate somehow: at least one
/// meaningful contact field, or at least one link.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContactQualityGate;

impl QualityGate for ContactQualityGate {
    fn is_valid(&self, result: &ParsedResume) -> bool {
        match &result.contact {
            Some(contact) => has_identifying_field(contact) || !contact.links.is_empty(),
            None => false,
        }
    }

    fn name(&self) -> &'static str {
        "contact"
    }
}

fn has_identifying_field(contact: &ContactInfo) -> bool {
    [
        &contact.name,
        &contact.email,
        &contact.phone,
        &contact.linkedin,
        &contact.github,
        &contact.website,
        &contact.location,
    ]
    .into_iter()
    .any(|field| is_meaningful(field.as_deref()))
}

fn is_meaningful(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}
