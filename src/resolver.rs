//! Resolution context threaded through every pattern operation
//!
//! The resolver carries the name-to-pattern registry, the cycle-detection
//! markers, the generation-mode flags, the example store and the mismatch
//! message policy. It is immutable per call: descending into a named pattern
//! derives a new resolver with one extra cycle marker, which feeds exactly
//! one recursive call and is then discarded. That derivation — never an
//! in-place mutation — is what keeps concurrent scenario evaluation safe and
//! infinite schema recursion bounded.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::error::EngineError;
use crate::pattern::Pattern;
use crate::results::MismatchDetail;
use crate::value::Value;

/// One "currently descending" marker: the registered alias plus the field
/// under which the descent happened
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CycleMarker {
    pub alias: String,
    pub field: String,
}

/// Immutable per-call resolution context
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    registry: Arc<HashMap<String, Pattern>>,
    seen: HashSet<CycleMarker>,
    negative: bool,
    all_patterns_mandatory: bool,
    examples: Arc<HashMap<String, Value>>,
    mismatch_detail: MismatchDetail,
}

impl Resolver {
    pub fn new() -> Self {
        Resolver::default()
    }

    /// Build a resolver whose registry holds the given named patterns; each
    /// pattern is stamped with its registry name as its type alias
    pub fn with_patterns(patterns: impl IntoIterator<Item = (String, Pattern)>) -> Self {
        let registry: HashMap<String, Pattern> = patterns
            .into_iter()
            .map(|(name, pattern)| {
                let aliased = pattern.with_alias(name.clone());
                (name, aliased)
            })
            .collect();
        Resolver {
            registry: Arc::new(registry),
            ..Default::default()
        }
    }

    /// Register one more named pattern (construction-time only)
    pub fn register(&mut self, name: impl Into<String>, pattern: Pattern) {
        let name = name.into();
        let aliased = pattern.with_alias(name.clone());
        Arc::make_mut(&mut self.registry).insert(name, aliased);
    }

    /// Attach the example store consulted during generation
    pub fn with_examples(mut self, examples: HashMap<String, Value>) -> Self {
        self.examples = Arc::new(examples);
        self
    }

    /// Switch to negative-generation mode
    pub fn in_negative_mode(mut self) -> Self {
        self.negative = true;
        self
    }

    /// Treat optional fields as mandatory during generation and derivation
    pub fn with_all_patterns_mandatory(mut self) -> Self {
        self.all_patterns_mandatory = true;
        self
    }

    pub fn with_mismatch_detail(mut self, detail: MismatchDetail) -> Self {
        self.mismatch_detail = detail;
        self
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    pub fn all_patterns_mandatory(&self) -> bool {
        self.all_patterns_mandatory
    }

    pub fn mismatch_detail(&self) -> MismatchDetail {
        self.mismatch_detail
    }

    /// Look up a registered pattern by name
    pub fn resolve(&self, name: &str) -> Result<Pattern, EngineError> {
        self.registry
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnresolvedReference(name.to_string()))
    }

    /// True if the `(alias, field)` descent is already in progress
    pub fn has_seen(&self, alias: &str, field: &str) -> bool {
        self.seen.contains(&CycleMarker {
            alias: alias.to_string(),
            field: field.to_string(),
        })
    }

    /// Derive a resolver with one extra cycle marker; feed it to exactly one
    /// recursive call
    pub fn with_cycle_marker(&self, alias: &str, field: &str) -> Resolver {
        debug!(alias, field, "descending into named pattern");
        let mut derived = self.clone();
        derived.seen.insert(CycleMarker {
            alias: alias.to_string(),
            field: field.to_string(),
        });
        derived
    }

    /// Example value registered for the given field path, if any
    pub fn example_for(&self, path: &str) -> Option<&Value> {
        self.examples.get(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_stamps_alias() {
        let resolver = Resolver::with_patterns(vec![("Customer".to_string(), Pattern::string())]);
        let resolved = resolver.resolve("Customer").unwrap();
        assert_eq!(resolved.type_alias.as_deref(), Some("Customer"));
    }

    #[test]
    fn test_unresolved_reference_is_an_error() {
        let resolver = Resolver::new();
        assert_eq!(
            resolver.resolve("Missing"),
            Err(EngineError::UnresolvedReference("Missing".to_string()))
        );
    }

    #[test]
    fn test_cycle_marker_derivation_does_not_mutate_parent() {
        let resolver = Resolver::new();
        let derived = resolver.with_cycle_marker("Node", "next");

        assert!(derived.has_seen("Node", "next"));
        assert!(!resolver.has_seen("Node", "next"));
        assert!(!derived.has_seen("Node", "parent"));
    }

    #[test]
    fn test_examples_are_path_keyed() {
        let mut examples = HashMap::new();
        examples.insert("order.id".to_string(), Value::Int(10));
        let resolver = Resolver::new().with_examples(examples);

        assert_eq!(resolver.example_for("order.id"), Some(&Value::Int(10)));
        assert_eq!(resolver.example_for("order.name"), None);
    }
}
