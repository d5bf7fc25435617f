//! Match outcome algebra
//!
//! `matches` and `encompasses` never throw for ordinary mismatches: they
//! return a `MatchResult` value. A failure carries every individual cause,
//! each tagged with a breadcrumb path pinpointing where in the nested
//! structure it occurred, so an object with three bad fields reports all
//! three at once.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::value::Value;

/// Outcome of a validation or compatibility check
#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    Success,
    Failure(Failure),
}

/// Why a particular cause failed, beyond its message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    Mismatch,
    MissingKey,
    UnexpectedKey,
    /// Wrong union variant entirely, as opposed to a compatible variant with
    /// one incompatible field
    DiscriminatorMismatch,
}

/// How much of the concrete value may appear in mismatch messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MismatchDetail {
    #[default]
    Full,
    /// Keep payload contents out of reports, show only the value's kind
    ValueRedacted,
}

/// One individual failed check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureCause {
    pub breadcrumbs: Vec<String>,
    pub message: String,
    pub reason: FailureReason,
}

/// An aggregate of one or more failed checks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub causes: Vec<FailureCause>,
}

impl Failure {
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_reason(message, FailureReason::Mismatch)
    }

    pub fn with_reason(message: impl Into<String>, reason: FailureReason) -> Self {
        Failure {
            causes: vec![FailureCause {
                breadcrumbs: Vec::new(),
                message: message.into(),
                reason,
            }],
        }
    }

    /// Merge several failures into one, preserving every cause
    pub fn from_failures(failures: Vec<Failure>) -> Self {
        Failure {
            causes: failures.into_iter().flat_map(|f| f.causes).collect(),
        }
    }

    pub fn from_error(error: &EngineError) -> Self {
        Failure::new(error.to_string())
    }

    /// Prefix every cause with a path segment (a field name or `[index]`)
    pub fn breadcrumb(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        for cause in &mut self.causes {
            cause.breadcrumbs.insert(0, name.clone());
        }
        self
    }

    pub fn has_reason(&self, reason: FailureReason) -> bool {
        self.causes.iter().any(|c| c.reason == reason)
    }

    /// Dotted path of the first cause, e.g. `a.b` or `items.[0]`
    pub fn breadcrumb_path(&self) -> String {
        self.causes
            .first()
            .map(|c| c.breadcrumbs.join("."))
            .unwrap_or_default()
    }

    /// Human-readable report: one `>> path` header plus message per cause
    pub fn report(&self) -> String {
        let mut out = String::new();
        for cause in &self.causes {
            if !cause.breadcrumbs.is_empty() {
                out.push_str(&format!(">> {}\n", cause.breadcrumbs.join(".")));
            }
            out.push_str(&cause.message);
            out.push('\n');
        }
        out.trim_end().to_string()
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.report())
    }
}

impl MatchResult {
    pub fn is_success(&self) -> bool {
        matches!(self, MatchResult::Success)
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            MatchResult::Success => None,
            MatchResult::Failure(f) => Some(f),
        }
    }

    /// Tag a failure with a path segment; success passes through unchanged
    pub fn breadcrumb(self, name: impl Into<String>) -> Self {
        match self {
            MatchResult::Success => MatchResult::Success,
            MatchResult::Failure(f) => MatchResult::Failure(f.breadcrumb(name)),
        }
    }

    /// Fold many results into one: success only if all succeed, otherwise a
    /// single failure carrying every cause
    pub fn from_results(results: impl IntoIterator<Item = MatchResult>) -> Self {
        let failures: Vec<Failure> = results
            .into_iter()
            .filter_map(|r| match r {
                MatchResult::Success => None,
                MatchResult::Failure(f) => Some(f),
            })
            .collect();
        if failures.is_empty() {
            MatchResult::Success
        } else {
            MatchResult::Failure(Failure::from_failures(failures))
        }
    }
}

/// Standard "expected X, got Y" message honoring the redaction policy
pub fn mismatch_message(expected: &str, actual: &Value, detail: MismatchDetail) -> String {
    match detail {
        MismatchDetail::Full => format!("Expected {}, got {}", expected, actual.quoted_text()),
        MismatchDetail::ValueRedacted => {
            format!("Expected {}, got a value of type {}", expected, actual.type_name())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breadcrumb_prefixing() {
        let failure = Failure::new("Expected string, got 5")
            .breadcrumb("b")
            .breadcrumb("a");
        assert_eq!(failure.breadcrumb_path(), "a.b");
        assert!(failure.report().contains(">> a.b"));
    }

    #[test]
    fn test_fold_keeps_all_causes() {
        let result = MatchResult::from_results(vec![
            MatchResult::Success,
            MatchResult::Failure(Failure::new("first")),
            MatchResult::Failure(Failure::new("second")),
        ]);
        let failure = result.failure().expect("should fail");
        assert_eq!(failure.causes.len(), 2);
        assert!(failure.report().contains("first"));
        assert!(failure.report().contains("second"));
    }

    #[test]
    fn test_fold_all_success() {
        let result = MatchResult::from_results(vec![MatchResult::Success, MatchResult::Success]);
        assert!(result.is_success());
    }

    #[test]
    fn test_redacted_message_hides_value() {
        let msg = mismatch_message(
            "string",
            &Value::String("secret".to_string()),
            MismatchDetail::ValueRedacted,
        );
        assert!(!msg.contains("secret"));
        assert!(msg.contains("string"));
    }

    #[test]
    fn test_reason_is_queryable() {
        let failure = Failure::with_reason("wrong variant", FailureReason::DiscriminatorMismatch);
        assert!(failure.has_reason(FailureReason::DiscriminatorMismatch));
        assert!(!failure.has_reason(FailureReason::MissingKey));
    }
}
