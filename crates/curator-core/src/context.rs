//! Read-only shared context handed to every worker.

use crate::payload::Artifacts;
use crate::step::StepName;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Type-safe context key wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextKey(String);

impl ContextKey {
    /// Creates a new ContextKey.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ContextKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ContextKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::borrow::Borrow<str> for ContextKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

type Entries = HashMap<ContextKey, Arc<dyn Any + Send + Sync>>;

/// Shared pipeline configuration (brand voice, keyword lists, platform
/// selection, ...) with heterogeneous type storage.
///
/// A `Context` is frozen once built: workers can read it but nothing in the
/// engine can change it during a run. Cloning is cheap, every clone points at
/// the same entries.
///
/// # Examples
///
/// ```
/// use curator_core::Context;
///
/// let ctx = Context::builder()
///     .insert("brand", "Acme".to_string())
///     .insert("keywords", vec!["AI policy".to_string()])
///     .insert("max_items", 5u32)
///     .build();
///
/// assert_eq!(ctx.get::<String>("brand"), Some(&"Acme".to_string()));
/// assert_eq!(ctx.get::<u32>("max_items"), Some(&5));
///
/// // Wrong type returns None
/// assert_eq!(ctx.get::<String>("max_items"), None);
/// ```
#[derive(Clone, Default)]
pub struct Context {
    entries: Arc<Entries>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("keys", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Context {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts building a context.
    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    /// Returns a reference to the value for the given key.
    ///
    /// Returns `None` if the key doesn't exist or the type doesn't match.
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.entries.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    /// Returns `true` if the context contains a value for the given key.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns an iterator over all keys in the context.
    pub fn keys(&self) -> impl Iterator<Item = &ContextKey> {
        self.entries.keys()
    }

    /// Returns the number of entries in the context.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the context contains no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builder for [`Context`].
#[derive(Default)]
pub struct ContextBuilder {
    entries: Entries,
}

impl fmt::Debug for ContextBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextBuilder")
            .field("keys", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ContextBuilder {
    /// Inserts a value with the given key.
    ///
    /// If the key already exists, the previous value is replaced.
    pub fn insert<T: Any + Send + Sync>(mut self, key: impl Into<ContextKey>, value: T) -> Self {
        self.entries.insert(key.into(), Arc::new(value));
        self
    }

    /// Freezes the entries into a [`Context`].
    pub fn build(self) -> Context {
        Context {
            entries: Arc::new(self.entries),
        }
    }
}

/// Everything a worker gets to see for one invocation.
#[derive(Debug, Clone)]
pub struct WorkerInput {
    step: StepName,
    context: Context,
    upstream: Arc<Artifacts>,
}

impl WorkerInput {
    /// Creates the input for one invocation of a worker of `step`.
    pub fn new(step: StepName, context: Context, upstream: Arc<Artifacts>) -> Self {
        Self {
            step,
            context,
            upstream,
        }
    }

    /// Name of the step the worker is running for.
    pub fn step(&self) -> &StepName {
        &self.step
    }

    /// The shared read-only configuration.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Artifacts produced by the steps that ran before this one.
    pub fn upstream(&self) -> &Artifacts {
        &self.upstream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::Payload;

    #[test]
    fn test_heterogeneous_storage() {
        let ctx = Context::builder()
            .insert("int", 42i32)
            .insert("string", "hello".to_string())
            .insert("bool", true)
            .build();

        assert_eq!(ctx.get::<i32>("int"), Some(&42));
        assert_eq!(ctx.get::<String>("string"), Some(&"hello".to_string()));
        assert_eq!(ctx.get::<bool>("bool"), Some(&true));
        assert_eq!(ctx.len(), 3);

        // Wrong type returns None
        assert_eq!(ctx.get::<String>("int"), None);
    }

    #[test]
    fn test_insert_replaces() {
        let ctx = Context::builder()
            .insert("voice", "formal".to_string())
            .insert("voice", "playful".to_string())
            .build();

        assert_eq!(ctx.get::<String>("voice").map(String::as_str), Some("playful"));
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn test_clones_share_entries() {
        let ctx = Context::builder().insert("k", 1u8).build();
        let clone = ctx.clone();
        assert!(Arc::ptr_eq(&ctx.entries, &clone.entries));
        assert!(clone.contains_key("k"));
        assert!(Context::new().is_empty());
    }

    #[test]
    fn test_worker_input_accessors() {
        let mut artifacts = Artifacts::new();
        artifacts.insert(
            StepName::new("news"),
            Payload::new().with("curated_content", "three items"),
        );
        let input = WorkerInput::new(
            StepName::new("content"),
            Context::builder().insert("brand", "Acme".to_string()).build(),
            Arc::new(artifacts),
        );

        assert_eq!(input.step().as_str(), "content");
        assert!(input.context().contains_key("brand"));
        assert!(input.upstream().get("news").is_some());
    }

    #[test]
    fn test_context_key() {
        let key1 = ContextKey::new("test");
        let key2: ContextKey = "test".into();
        assert_eq!(key1, key2);
        assert_eq!(key1.to_string(), "test");
    }
}
