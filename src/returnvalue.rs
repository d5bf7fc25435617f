//! Three-way outcome type for derivation paths
//!
//! Test-variant derivation must not abort a whole sequence because one branch
//! failed: a field whose example fails to parse should surface as a failure
//! entry while sibling variants keep flowing. `ReturnValue` replaces
//! exceptions on those hot paths and keeps the three outcomes distinct:
//! a usable value, a recoverable failure, and a programming/configuration
//! exception.

use crate::error::EngineError;
use crate::results::Failure;

/// Value, recoverable failure, or exception
#[derive(Debug, Clone, PartialEq)]
pub enum ReturnValue<T> {
    Value(T),
    Failure(Failure),
    Exception {
        error: EngineError,
        breadcrumbs: Vec<String>,
    },
}

impl<T> ReturnValue<T> {
    pub fn exception(error: EngineError) -> Self {
        ReturnValue::Exception {
            error,
            breadcrumbs: Vec::new(),
        }
    }

    pub fn is_value(&self) -> bool {
        matches!(self, ReturnValue::Value(_))
    }

    pub fn is_exception(&self) -> bool {
        matches!(self, ReturnValue::Exception { .. })
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            ReturnValue::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ReturnValue<U> {
        match self {
            ReturnValue::Value(v) => ReturnValue::Value(f(v)),
            ReturnValue::Failure(failure) => ReturnValue::Failure(failure),
            ReturnValue::Exception { error, breadcrumbs } => {
                ReturnValue::Exception { error, breadcrumbs }
            }
        }
    }

    pub fn and_then<U>(self, f: impl FnOnce(T) -> ReturnValue<U>) -> ReturnValue<U> {
        match self {
            ReturnValue::Value(v) => f(v),
            ReturnValue::Failure(failure) => ReturnValue::Failure(failure),
            ReturnValue::Exception { error, breadcrumbs } => {
                ReturnValue::Exception { error, breadcrumbs }
            }
        }
    }

    /// Attach trace context; exceptions keep their breadcrumbs too so the
    /// caller can localize a configuration defect
    pub fn with_breadcrumb(self, name: impl Into<String>) -> Self {
        match self {
            ReturnValue::Value(v) => ReturnValue::Value(v),
            ReturnValue::Failure(failure) => ReturnValue::Failure(failure.breadcrumb(name)),
            ReturnValue::Exception {
                error,
                mut breadcrumbs,
            } => {
                breadcrumbs.insert(0, name.into());
                ReturnValue::Exception { error, breadcrumbs }
            }
        }
    }

    /// Fold a collection of outcomes into one: the first exception wins,
    /// otherwise all failures merge, otherwise all values are kept
    pub fn sequence(outcomes: Vec<ReturnValue<T>>) -> ReturnValue<Vec<T>> {
        let mut values = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome {
                ReturnValue::Value(v) => values.push(v),
                ReturnValue::Failure(f) => failures.push(f),
                ReturnValue::Exception { error, breadcrumbs } => {
                    return ReturnValue::Exception { error, breadcrumbs }
                }
            }
        }
        if failures.is_empty() {
            ReturnValue::Value(values)
        } else {
            ReturnValue::Failure(Failure::from_failures(failures))
        }
    }

    /// Consume at a module boundary, collapsing into a plain `Result`
    pub fn into_result(self) -> Result<T, EngineError> {
        match self {
            ReturnValue::Value(v) => Ok(v),
            ReturnValue::Failure(failure) => Err(EngineError::DerivationFailed(failure.report())),
            ReturnValue::Exception { error, .. } => Err(error),
        }
    }
}

impl<T> From<Result<T, EngineError>> for ReturnValue<T> {
    fn from(result: Result<T, EngineError>) -> Self {
        match result {
            Ok(v) => ReturnValue::Value(v),
            Err(e) => ReturnValue::exception(e),
        }
    }
}
