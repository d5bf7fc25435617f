//! Stencil - structural pattern engine for schema-driven contract testing
//!
//! Validates concrete values against schema patterns, synthesizes example
//! values, derives bounded positive and negative test variants from example
//! rows, and checks backward compatibility between schema versions.

pub mod combination;
pub mod encompass;
pub mod error;
pub mod generation;
pub mod matching;
pub mod negative;
pub mod pattern;
pub mod resolver;
pub mod results;
pub mod returnvalue;
pub mod row;
pub mod value;
pub mod variants;

// Re-export commonly used types
pub use combination::{CombinationSpec, DEFAULT_MAX_COMBINATIONS};
pub use encompass::encompasses;
pub use error::EngineError;
pub use generation::generate;
pub use matching::{matches, parse_scalar_text};
pub use negative::{negative_based_on, NegativeStrategy};
pub use pattern::{
    AdditionalProperties, NumberConstraints, ObjectPattern, Occurrence, Pattern, PatternKind,
    RegexSpec, StringConstraints, XmlPattern,
};
pub use resolver::Resolver;
pub use results::{Failure, FailureReason, MatchResult, MismatchDetail};
pub use returnvalue::ReturnValue;
pub use row::{Row, RowValue};
pub use value::{Value, XmlValue};
pub use variants::new_based_on;

/// Stencil version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
