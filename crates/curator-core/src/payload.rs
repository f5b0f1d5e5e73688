//! Artifact payloads produced by workers.

use crate::step::StepName;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Opaque artifact data produced by a successful worker invocation.
///
/// A payload is a set of named JSON values. Merging two payloads is a key
/// union where the right-hand side wins on collision.
///
/// # Examples
///
/// ```
/// use curator_core::Payload;
///
/// let mut news = Payload::new().with("curated_content", "3 articles");
/// let social = Payload::new().with("social_media_report", "12 posts");
///
/// news.merge(social);
/// assert_eq!(news.len(), 2);
/// assert_eq!(news.get("social_media_report").and_then(|v| v.as_str()), Some("12 posts"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(BTreeMap<String, Value>);

impl Payload {
    /// Creates an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts an entry, returning the value it replaced.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Unions `other` into `self`; entries of `other` win on collision.
    pub fn merge(&mut self, other: Payload) {
        self.0.extend(other.0);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Payload {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Payloads keyed by the step that produced them, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Artifacts(IndexMap<StepName, Payload>);

impl Artifacts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the payload of a step. A later insert for the same step
    /// replaces the earlier one but keeps its position.
    pub fn insert(&mut self, step: StepName, payload: Payload) {
        self.0.insert(step, payload);
    }

    /// Returns the payload produced by `step`, if any.
    pub fn get(&self, step: &str) -> Option<&Payload> {
        self.0.get(step)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StepName, &Payload)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Unions every payload in execution order into a single payload.
    pub fn merged(&self) -> Payload {
        let mut merged = Payload::new();
        for payload in self.0.values() {
            merged.merge(payload.clone());
        }
        merged
    }
}
