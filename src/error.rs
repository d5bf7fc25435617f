//! Configuration and programming errors for the pattern engine
//!
//! Structural mismatches are never represented here — they are ordinary
//! `MatchResult::Failure` values. `EngineError` covers the conditions that
//! abort an operation: a registry miss, a malformed constraint, or a schema
//! that genuinely cannot be instantiated.

use thiserror::Error;

/// Non-recoverable error raised by pattern construction or traversal
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// A `(Name)` reference was not found in the resolver's registry
    #[error("pattern '{0}' could not be resolved in the registry")]
    UnresolvedReference(String),

    /// A row column still carries an unresolved file/variable reference
    #[error("column '{column}' carries unresolved reference '{reference}'")]
    UnresolvedRowReference { column: String, reference: String },

    /// A string constraint carried a regex that failed to compile
    #[error("invalid regex '{pattern}': {detail}")]
    MalformedRegex { pattern: String, detail: String },

    /// Constraint bounds that contradict each other, e.g. maxLength < minLength
    #[error("inconsistent bounds: {0}")]
    InconsistentBounds(String),

    /// A non-optional, non-nullable self-reference cannot be instantiated
    #[error("'{alias}' at '{path}' recurses with no optional or nullable escape")]
    UnboundedRecursion { alias: String, path: String },

    /// The combination scheduler was configured with a cap below 1
    #[error("maxCombinations must be at least 1, got {0}")]
    InvalidCombinationCap(usize),

    /// A registered example did not itself match the pattern it overrides
    #[error("example for '{path}' does not match its pattern: {report}")]
    InvalidExample { path: String, report: String },

    /// A value kind that has no JSON representation
    #[error("{0} values have no JSON representation")]
    JsonUnrepresentable(&'static str),

    /// A derivation drained at a module boundary produced no usable value
    #[error("derivation failed: {0}")]
    DerivationFailed(String),
}
