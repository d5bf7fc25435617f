//! Pattern algebra: the tagged union of schema node kinds
//!
//! Every schema node the engine operates on is a `Pattern`: scalars with
//! constraints, composites, combinators, and references resolved through the
//! resolver's registry. The union is closed so that every algorithm's variant
//! dispatch is exhaustively checked by the compiler.

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::value::Value;

/// Sentinel field key that switches an object to ignore-unexpected-keys mode
pub const UNEXPECTED_KEYS_SENTINEL: &str = "...";

/// Marker suffix on an object field key that makes the field optional
pub const OPTIONAL_SUFFIX: char = '?';

/// True if an object field key carries the optional marker
pub fn is_optional(key: &str) -> bool {
    key.ends_with(OPTIONAL_SUFFIX)
}

/// Field key with the optional marker stripped
pub fn without_optionality(key: &str) -> &str {
    key.strip_suffix(OPTIONAL_SUFFIX).unwrap_or(key)
}

/// A schema node plus the registry name it was registered under, if any
///
/// The alias drives cycle detection during generation and pairing during
/// compatibility checks; anonymous inline patterns have none.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub kind: PatternKind,
    pub type_alias: Option<String>,
}

/// The closed set of schema node kinds
#[derive(Debug, Clone, PartialEq)]
pub enum PatternKind {
    // Scalars
    Boolean,
    Number(NumberConstraints),
    Str(StringConstraints),
    Date,
    DateTime,
    Time,
    Uuid,
    Url { scheme: Option<String> },
    EmptyString,
    Binary,
    /// Matches any value at all
    Anything,

    // Composites
    Object(ObjectPattern),
    /// Fixed-arity array; the last element may be `RestOf`
    Array { elements: Vec<Pattern> },
    /// Homogeneous list of arbitrary length
    ListOf(Box<Pattern>),
    Xml(XmlPattern),
    Dictionary { key: Box<Pattern>, value: Box<Pattern> },
    Csv(Box<Pattern>),

    // Combinators
    AnyOf { options: Vec<Pattern> },
    Enum { options: Vec<Value> },
    Exact(Value),

    // References and wrappers
    Ref(String),
    LookupRow { inner: Box<Pattern>, key: String },
    InString(Box<Pattern>),
    RestOf(Box<Pattern>),
    QueryScalar(Box<Pattern>),
}

/// Numeric constraints: digit counts, range bounds, integer-versus-float
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NumberConstraints {
    pub min_digits: Option<usize>,
    pub max_digits: Option<usize>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub exclusive_min: bool,
    pub exclusive_max: bool,
    pub is_float: bool,
}

impl NumberConstraints {
    pub fn validate(&self) -> Result<(), EngineError> {
        if let (Some(min), Some(max)) = (self.min_digits, self.max_digits) {
            if max < min {
                return Err(EngineError::InconsistentBounds(format!(
                    "maxDigits {} < minDigits {}",
                    max, min
                )));
            }
        }
        if let (Some(min), Some(max)) = (self.minimum, self.maximum) {
            if max < min {
                return Err(EngineError::InconsistentBounds(format!(
                    "maximum {} < minimum {}",
                    max, min
                )));
            }
        }
        Ok(())
    }
}

/// String constraints: length bounds and an optional regex
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StringConstraints {
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub regex: Option<RegexSpec>,
}

impl StringConstraints {
    pub fn validate(&self) -> Result<(), EngineError> {
        if let (Some(min), Some(max)) = (self.min_length, self.max_length) {
            if max < min {
                return Err(EngineError::InconsistentBounds(format!(
                    "maxLength {} < minLength {}",
                    max, min
                )));
            }
        }
        Ok(())
    }
}

/// A regex constraint: compiled once at construction, compared by source
#[derive(Debug, Clone)]
pub struct RegexSpec {
    source: String,
    compiled: Regex,
}

impl RegexSpec {
    pub fn parse(source: &str) -> Result<Self, EngineError> {
        let compiled = Regex::new(source).map_err(|e| EngineError::MalformedRegex {
            pattern: source.to_string(),
            detail: e.to_string(),
        })?;
        Ok(RegexSpec {
            source: source.to_string(),
            compiled,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.compiled.is_match(text)
    }
}

impl PartialEq for RegexSpec {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// How an object treats keys beyond its declared fields
#[derive(Debug, Clone, PartialEq, Default)]
pub enum AdditionalProperties {
    /// Unknown keys are reported as failures
    #[default]
    None,
    /// Unknown keys are accepted with any value
    FreeForm,
    /// Unknown keys are accepted when their values match the given pattern
    ConstrainedBy(Box<Pattern>),
}

/// JSON object schema node
///
/// Field keys may carry the `?` optional marker; a `...` sentinel key enables
/// ignore-unexpected-keys mode independent of `additional`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectPattern {
    pub fields: IndexMap<String, Pattern>,
    pub min_properties: Option<usize>,
    pub max_properties: Option<usize>,
    pub additional: AdditionalProperties,
    /// Key whose exact value selects the union variant this object represents
    pub discriminator: Option<String>,
}

impl ObjectPattern {
    pub fn new(fields: IndexMap<String, Pattern>) -> Self {
        ObjectPattern {
            fields,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if let (Some(min), Some(max)) = (self.min_properties, self.max_properties) {
            if max < min {
                return Err(EngineError::InconsistentBounds(format!(
                    "maxProperties {} < minProperties {}",
                    max, min
                )));
            }
        }
        Ok(())
    }

    /// True when unexpected keys are tolerated (via the sentinel or policy)
    pub fn ignores_unexpected_keys(&self) -> bool {
        self.fields.contains_key(UNEXPECTED_KEYS_SENTINEL)
            || matches!(self.additional, AdditionalProperties::FreeForm)
    }

    /// Declared fields minus the sentinel, as (key, clean name, optional, pattern)
    pub fn declared_fields(&self) -> impl Iterator<Item = (&String, &str, bool, &Pattern)> {
        self.fields
            .iter()
            .filter(|(k, _)| k.as_str() != UNEXPECTED_KEYS_SENTINEL)
            .map(|(k, p)| (k, without_optionality(k), is_optional(k), p))
    }
}

/// How often an XML node may occur within its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Occurrence {
    #[default]
    Once,
    Optional,
    Multiple,
}

/// XML element schema node
#[derive(Debug, Clone, PartialEq)]
pub struct XmlPattern {
    pub name: String,
    pub attributes: IndexMap<String, Pattern>,
    pub children: Vec<Pattern>,
    pub occurrence: Occurrence,
    pub nillable: bool,
}

impl XmlPattern {
    pub fn new(name: impl Into<String>) -> Self {
        XmlPattern {
            name: name.into(),
            attributes: IndexMap::new(),
            children: Vec::new(),
            occurrence: Occurrence::Once,
            nillable: false,
        }
    }
}

impl Pattern {
    fn from_kind(kind: PatternKind) -> Self {
        Pattern {
            kind,
            type_alias: None,
        }
    }

    /// Attach the registry name this pattern was registered under
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.type_alias = Some(alias.into());
        self
    }

    // Scalars

    pub fn boolean() -> Self {
        Pattern::from_kind(PatternKind::Boolean)
    }

    pub fn number() -> Self {
        Pattern::from_kind(PatternKind::Number(NumberConstraints::default()))
    }

    pub fn number_with(constraints: NumberConstraints) -> Result<Self, EngineError> {
        constraints.validate()?;
        Ok(Pattern::from_kind(PatternKind::Number(constraints)))
    }

    pub fn string() -> Self {
        Pattern::from_kind(PatternKind::Str(StringConstraints::default()))
    }

    pub fn string_with(constraints: StringConstraints) -> Result<Self, EngineError> {
        constraints.validate()?;
        Ok(Pattern::from_kind(PatternKind::Str(constraints)))
    }

    pub fn date() -> Self {
        Pattern::from_kind(PatternKind::Date)
    }

    pub fn datetime() -> Self {
        Pattern::from_kind(PatternKind::DateTime)
    }

    pub fn time() -> Self {
        Pattern::from_kind(PatternKind::Time)
    }

    pub fn uuid() -> Self {
        Pattern::from_kind(PatternKind::Uuid)
    }

    pub fn url() -> Self {
        Pattern::from_kind(PatternKind::Url { scheme: None })
    }

    pub fn url_with_scheme(scheme: impl Into<String>) -> Self {
        Pattern::from_kind(PatternKind::Url {
            scheme: Some(scheme.into()),
        })
    }

    pub fn empty_string() -> Self {
        Pattern::from_kind(PatternKind::EmptyString)
    }

    pub fn binary() -> Self {
        Pattern::from_kind(PatternKind::Binary)
    }

    pub fn anything() -> Self {
        Pattern::from_kind(PatternKind::Anything)
    }

    /// The null pattern: an exact match on `Value::Null`
    pub fn null() -> Self {
        Pattern::from_kind(PatternKind::Exact(Value::Null))
    }

    // Composites

    pub fn object(object: ObjectPattern) -> Result<Self, EngineError> {
        object.validate()?;
        Ok(Pattern::from_kind(PatternKind::Object(object)))
    }

    pub fn object_of(fields: IndexMap<String, Pattern>) -> Self {
        Pattern::from_kind(PatternKind::Object(ObjectPattern::new(fields)))
    }

    pub fn array(elements: Vec<Pattern>) -> Self {
        Pattern::from_kind(PatternKind::Array { elements })
    }

    pub fn list_of(element: Pattern) -> Self {
        Pattern::from_kind(PatternKind::ListOf(Box::new(element)))
    }

    pub fn xml(xml: XmlPattern) -> Self {
        Pattern::from_kind(PatternKind::Xml(xml))
    }

    pub fn dictionary(key: Pattern, value: Pattern) -> Self {
        Pattern::from_kind(PatternKind::Dictionary {
            key: Box::new(key),
            value: Box::new(value),
        })
    }

    pub fn csv(element: Pattern) -> Self {
        Pattern::from_kind(PatternKind::Csv(Box::new(element)))
    }

    // Combinators

    pub fn any_of(options: Vec<Pattern>) -> Self {
        Pattern::from_kind(PatternKind::AnyOf { options })
    }

    /// Sugar for the nullable union of a pattern and null
    pub fn nullable(inner: Pattern) -> Self {
        Pattern::any_of(vec![inner, Pattern::null()])
    }

    pub fn enum_of(options: Vec<Value>) -> Self {
        Pattern::from_kind(PatternKind::Enum { options })
    }

    pub fn exact(value: Value) -> Self {
        Pattern::from_kind(PatternKind::Exact(value))
    }

    // References and wrappers

    pub fn reference(name: impl Into<String>) -> Self {
        Pattern::from_kind(PatternKind::Ref(name.into()))
    }

    pub fn lookup_row(inner: Pattern, key: impl Into<String>) -> Self {
        Pattern::from_kind(PatternKind::LookupRow {
            inner: Box::new(inner),
            key: key.into(),
        })
    }

    pub fn in_string(inner: Pattern) -> Self {
        Pattern::from_kind(PatternKind::InString(Box::new(inner)))
    }

    pub fn rest_of(inner: Pattern) -> Self {
        Pattern::from_kind(PatternKind::RestOf(Box::new(inner)))
    }

    pub fn query_scalar(inner: Pattern) -> Self {
        Pattern::from_kind(PatternKind::QueryScalar(Box::new(inner)))
    }

    /// True for the patterns a nullable union treats as null
    pub fn is_null_like(&self) -> bool {
        match &self.kind {
            PatternKind::Exact(v) => v.is_null_like(),
            PatternKind::EmptyString => true,
            _ => false,
        }
    }

    /// A 2-option union where exactly one side is null-like
    pub fn nullable_inner(&self) -> Option<&Pattern> {
        match &self.kind {
            PatternKind::AnyOf { options } if options.len() == 2 => {
                match (options[0].is_null_like(), options[1].is_null_like()) {
                    (false, true) => Some(&options[0]),
                    (true, false) => Some(&options[1]),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Parse a textual pattern token
    ///
    /// Recognizes the built-in scalar forms (`(string)`, `(number)`, ...),
    /// `(Name)` registry references, `(Name*)` rest-of-array markers and
    /// `(Name?)` nullable unions. Text without the parenthesized form is an
    /// exact string value. Composite skeletons are not a textual format and
    /// are not parsed here.
    pub fn from_token(token: &str) -> Pattern {
        let trimmed = token.trim();
        let inner = match trimmed.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
            Some(inner) if !inner.is_empty() => inner,
            _ => return Pattern::exact(Value::String(trimmed.to_string())),
        };

        if let Some(base) = inner.strip_suffix('*') {
            return Pattern::rest_of(Pattern::from_token(&format!("({})", base)));
        }
        if let Some(base) = inner.strip_suffix('?') {
            return Pattern::nullable(Pattern::from_token(&format!("({})", base)));
        }

        match inner {
            "boolean" | "bool" => Pattern::boolean(),
            "number" => Pattern::number(),
            "string" => Pattern::string(),
            "date" => Pattern::date(),
            "datetime" => Pattern::datetime(),
            "time" => Pattern::time(),
            "uuid" => Pattern::uuid(),
            "url" => Pattern::url(),
            "binary" => Pattern::binary(),
            "emptystring" => Pattern::empty_string(),
            "anyvalue" => Pattern::anything(),
            "empty" | "null" => Pattern::null(),
            name => Pattern::reference(name),
        }
    }

    /// True if the token text denotes a pattern rather than a literal value
    pub fn is_pattern_token(token: &str) -> bool {
        let t = token.trim();
        t.len() > 2 && t.starts_with('(') && t.ends_with(')')
    }
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            PatternKind::Boolean => write!(f, "(boolean)"),
            PatternKind::Number(_) => write!(f, "(number)"),
            PatternKind::Str(_) => write!(f, "(string)"),
            PatternKind::Date => write!(f, "(date)"),
            PatternKind::DateTime => write!(f, "(datetime)"),
            PatternKind::Time => write!(f, "(time)"),
            PatternKind::Uuid => write!(f, "(uuid)"),
            PatternKind::Url { .. } => write!(f, "(url)"),
            PatternKind::EmptyString => write!(f, "(emptystring)"),
            PatternKind::Binary => write!(f, "(binary)"),
            PatternKind::Anything => write!(f, "(anyvalue)"),
            PatternKind::Object(object) => {
                write!(f, "{{")?;
                let mut first = true;
                for (key, child) in &object.fields {
                    if !first {
                        write!(f, ", ")?;
                    }
                    first = false;
                    write!(f, "\"{}\": {}", key, child)?;
                }
                write!(f, "}}")
            }
            PatternKind::Array { elements } => {
                write!(f, "[")?;
                let mut first = true;
                for element in elements {
                    if !first {
                        write!(f, ", ")?;
                    }
                    first = false;
                    write!(f, "{}", element)?;
                }
                write!(f, "]")
            }
            PatternKind::ListOf(element) => write!(f, "[{}...]", element),
            PatternKind::Xml(xml) => write!(f, "<{}/>", xml.name),
            PatternKind::Dictionary { key, value } => write!(f, "{{{}: {}}}", key, value),
            PatternKind::Csv(element) => write!(f, "csv of {}", element),
            PatternKind::AnyOf { options } => {
                if let Some(inner) = self.nullable_inner() {
                    let text = inner.to_string();
                    return write!(
                        f,
                        "({}?)",
                        text.trim_start_matches('(').trim_end_matches(')')
                    );
                }
                let rendered: Vec<String> = options.iter().map(|o| o.to_string()).collect();
                write!(f, "{}", rendered.join(" or "))
            }
            PatternKind::Enum { options } => {
                let rendered: Vec<String> = options.iter().map(|v| v.quoted_text()).collect();
                write!(f, "one of [{}]", rendered.join(", "))
            }
            PatternKind::Exact(Value::Null) => write!(f, "(null)"),
            PatternKind::Exact(value) => write!(f, "{}", value.quoted_text()),
            PatternKind::Ref(name) => write!(f, "({})", name),
            PatternKind::LookupRow { inner, .. } => write!(f, "{}", inner),
            PatternKind::InString(inner) => write!(f, "{} in string", inner),
            PatternKind::RestOf(inner) => {
                let text = inner.to_string();
                write!(f, "({}*)", text.trim_start_matches('(').trim_end_matches(')'))
            }
            PatternKind::QueryScalar(inner) => write!(f, "{}", inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optionality_predicates() {
        assert!(is_optional("name?"));
        assert!(!is_optional("name"));
        assert_eq!(without_optionality("name?"), "name");
        assert_eq!(without_optionality("name"), "name");
    }

    #[test]
    fn test_token_round_trip_for_scalars() {
        for token in [
            "(boolean)",
            "(number)",
            "(string)",
            "(date)",
            "(datetime)",
            "(time)",
            "(uuid)",
            "(url)",
            "(binary)",
            "(emptystring)",
            "(anyvalue)",
        ] {
            let pattern = Pattern::from_token(token);
            assert_eq!(pattern.to_string(), token, "token {}", token);
        }
    }

    #[test]
    fn test_reference_and_rest_tokens() {
        assert_eq!(
            Pattern::from_token("(Customer)").kind,
            PatternKind::Ref("Customer".to_string())
        );
        assert_eq!(
            Pattern::from_token("(string*)"),
            Pattern::rest_of(Pattern::string())
        );
        assert_eq!(
            Pattern::from_token("(string?)"),
            Pattern::nullable(Pattern::string())
        );
    }

    #[test]
    fn test_plain_text_is_exact_value() {
        assert_eq!(
            Pattern::from_token("active"),
            Pattern::exact(Value::String("active".to_string()))
        );
    }

    #[test]
    fn test_nullable_detection_requires_two_options() {
        let nullable = Pattern::nullable(Pattern::string());
        assert_eq!(nullable.nullable_inner(), Some(&Pattern::string()));

        let triple = Pattern::any_of(vec![
            Pattern::string(),
            Pattern::number(),
            Pattern::null(),
        ]);
        assert_eq!(triple.nullable_inner(), None);
    }

    #[test]
    fn test_inconsistent_bounds_rejected() {
        let result = Pattern::string_with(StringConstraints {
            min_length: Some(10),
            max_length: Some(3),
            regex: None,
        });
        assert!(matches!(result, Err(EngineError::InconsistentBounds(_))));

        let result = Pattern::number_with(NumberConstraints {
            minimum: Some(100.0),
            maximum: Some(1.0),
            ..Default::default()
        });
        assert!(matches!(result, Err(EngineError::InconsistentBounds(_))));
    }

    #[test]
    fn test_malformed_regex_rejected() {
        assert!(matches!(
            RegexSpec::parse("["),
            Err(EngineError::MalformedRegex { .. })
        ));
    }

    #[test]
    fn test_sentinel_enables_ignore_mode() {
        let mut fields = IndexMap::new();
        fields.insert("id".to_string(), Pattern::number());
        fields.insert(UNEXPECTED_KEYS_SENTINEL.to_string(), Pattern::anything());
        let object = ObjectPattern::new(fields);
        assert!(object.ignores_unexpected_keys());
        assert_eq!(object.declared_fields().count(), 1);
    }
}
