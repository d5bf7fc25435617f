//! Negative test-variant derivation
//!
//! `negative_based_on` mirrors the positive derivation but produces pattern
//! variants whose generated values are expected to *fail* validation, so the
//! system under test can be shown to reject bad input. Exactly one field is
//! negated per variant while every sibling stays valid, which keeps a
//! rejection attributable to the single mutated field. The candidate kinds
//! are type confusion, boundary violation and enum violation, selected by a
//! pluggable strategy; the "stringly" strategy additionally discards
//! candidates that would sneak through a transport that stringifies all
//! values.

use indexmap::IndexMap;
use tracing::debug;

use crate::error::EngineError;
use crate::generation::generate;
use crate::matching::{matches, parse_scalar_text};
use crate::pattern::{ObjectPattern, Pattern, PatternKind};
use crate::resolver::Resolver;
use crate::returnvalue::ReturnValue;
use crate::row::Row;
use crate::value::Value;

/// Which candidate kinds a negative derivation substitutes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NegativeStrategy {
    /// Type confusion plus boundary and enum violations
    #[default]
    All,
    /// Boundary and enum violations only
    Strict,
    /// Like `All`, but filtered for stringly-typed transports
    Stringly,
}

impl NegativeStrategy {
    fn includes_type_confusion(self) -> bool {
        matches!(self, NegativeStrategy::All | NegativeStrategy::Stringly)
    }
}

/// Derive negative test variants: one mutated field per variant
pub fn negative_based_on(
    pattern: &Pattern,
    row: &Row,
    resolver: &Resolver,
    strategy: NegativeStrategy,
) -> Box<dyn Iterator<Item = ReturnValue<Pattern>>> {
    debug!(pattern = %pattern, ?strategy, "deriving negative variants");
    let resolver = resolver.clone().in_negative_mode();
    let variants = match &pattern.kind {
        PatternKind::Object(object) => object_negatives(object, row, &resolver, strategy),
        PatternKind::Ref(name) => match resolver.resolve(name) {
            Ok(resolved) => {
                return negative_based_on(&resolved, row, &resolver, strategy);
            }
            Err(error) => vec![ReturnValue::exception(error)],
        },
        _ => match negative_candidates(pattern, "", &resolver, strategy) {
            Ok(candidates) => candidates.into_iter().map(ReturnValue::Value).collect(),
            Err(error) => vec![ReturnValue::exception(error)],
        },
    };
    Box::new(variants.into_iter())
}

/// Discard candidates that, once stringified, still satisfy the original
/// pattern when re-matched in-string
///
/// The check regenerates each candidate, so it is probabilistic by nature: a
/// candidate is kept whenever generation fails or the stringified value is
/// rejected.
pub fn stringly_filter(
    original: &Pattern,
    candidates: Vec<Pattern>,
    resolver: &Resolver,
) -> Vec<Pattern> {
    candidates
        .into_iter()
        .filter(|candidate| survives_stringly(original, candidate, resolver))
        .collect()
}

fn survives_stringly(original: &Pattern, candidate: &Pattern, resolver: &Resolver) -> bool {
    match generate(candidate, resolver) {
        Ok(value) => {
            let text = value.display_text();
            !matches(
                &Pattern::in_string(original.clone()),
                &Value::String(text),
                resolver,
            )
            .is_success()
        }
        Err(_) => true,
    }
}

fn object_negatives(
    object: &ObjectPattern,
    row: &Row,
    resolver: &Resolver,
    strategy: NegativeStrategy,
) -> Vec<ReturnValue<Pattern>> {
    let mut variants = Vec::new();
    for (key, clean, _, child) in object.declared_fields() {
        let candidates = match negative_candidates(child, clean, resolver, strategy) {
            Ok(candidates) => candidates,
            Err(error) => {
                variants.push(ReturnValue::exception(error).with_breadcrumb(clean));
                continue;
            }
        };
        for candidate in candidates {
            variants.push(ReturnValue::Value(mutated_object(
                object, key, clean, candidate, row, resolver,
            )));
        }
    }
    variants
}

/// Rebuild the object with one field replaced by a negative candidate; the
/// mutated key drops its optional marker so the bad value is always present,
/// and siblings pick up row-supplied literals where they parse cleanly
fn mutated_object(
    object: &ObjectPattern,
    mutated_key: &str,
    clean: &str,
    candidate: Pattern,
    row: &Row,
    resolver: &Resolver,
) -> Pattern {
    let mut fields = IndexMap::new();
    for (key, child) in &object.fields {
        if key == mutated_key {
            fields.insert(clean.to_string(), candidate.clone());
            continue;
        }
        let sibling_key = crate::pattern::without_optionality(key);
        let sibling = match row.literal(sibling_key) {
            Ok(Some(text)) if !Pattern::is_pattern_token(text) => {
                match parse_scalar_text(child, text, resolver) {
                    Ok(value) => Pattern::exact(value),
                    Err(_) => child.clone(),
                }
            }
            _ => child.clone(),
        };
        fields.insert(key.clone(), sibling);
    }
    Pattern {
        kind: PatternKind::Object(ObjectPattern {
            fields,
            min_properties: object.min_properties,
            max_properties: object.max_properties,
            additional: object.additional.clone(),
            discriminator: object.discriminator.clone(),
        }),
        type_alias: None,
    }
}

/// All negative candidate patterns for one schema node
fn negative_candidates(
    pattern: &Pattern,
    field: &str,
    resolver: &Resolver,
    strategy: NegativeStrategy,
) -> Result<Vec<Pattern>, EngineError> {
    // a recursive branch simply contributes no candidates
    let derived;
    let resolver = if let Some(alias) = &pattern.type_alias {
        if resolver.has_seen(alias, field) {
            return Ok(Vec::new());
        }
        derived = resolver.with_cycle_marker(alias, field);
        &derived
    } else {
        resolver
    };

    let mut candidates = Vec::new();
    if strategy.includes_type_confusion() {
        candidates.extend(type_confusions(pattern));
    }
    candidates.extend(boundary_violations(pattern));
    candidates.extend(enum_violations(pattern));

    match &pattern.kind {
        PatternKind::Ref(name) => {
            let resolved = resolver.resolve(name)?;
            candidates.extend(negative_candidates(&resolved, field, resolver, strategy)?);
        }
        PatternKind::AnyOf { options } => {
            // a candidate is only negative if no option accepts it
            for option in options {
                for candidate in negative_candidates(option, field, resolver, strategy)? {
                    let accepted_elsewhere = match generate(&candidate, resolver) {
                        Ok(value) => matches(pattern, &value, resolver).is_success(),
                        Err(_) => false,
                    };
                    if !accepted_elsewhere {
                        candidates.push(candidate);
                    }
                }
            }
        }
        PatternKind::Object(object) => {
            // nested mutations: one inner field negated at a time
            for (key, clean, _, child) in object.declared_fields() {
                for inner in negative_candidates(child, clean, resolver, strategy)? {
                    candidates.push(mutated_object(
                        object,
                        key,
                        clean,
                        inner,
                        &Row::default(),
                        resolver,
                    ));
                }
            }
        }
        PatternKind::ListOf(element) => {
            for inner in negative_candidates(element, field, resolver, strategy)? {
                candidates.push(Pattern::list_of(inner));
            }
        }
        PatternKind::Array { elements } => {
            for (i, element) in elements.iter().enumerate() {
                for inner in negative_candidates(element, field, resolver, strategy)? {
                    let mut mutated = elements.clone();
                    mutated[i] = inner;
                    candidates.push(Pattern::array(mutated));
                }
            }
        }
        PatternKind::LookupRow { inner, .. }
        | PatternKind::InString(inner)
        | PatternKind::QueryScalar(inner) => {
            candidates.extend(negative_candidates(inner, field, resolver, strategy)?);
        }
        _ => {}
    }

    if strategy == NegativeStrategy::Stringly {
        candidates = stringly_filter(pattern, candidates, resolver);
    }
    Ok(candidates)
}

fn type_confusions(pattern: &Pattern) -> Vec<Pattern> {
    match &pattern.kind {
        PatternKind::Str(_)
        | PatternKind::Date
        | PatternKind::DateTime
        | PatternKind::Time
        | PatternKind::Uuid
        | PatternKind::Url { .. }
        | PatternKind::EmptyString
        | PatternKind::Binary => {
            vec![Pattern::boolean(), Pattern::number(), Pattern::null()]
        }
        PatternKind::Number(_) => {
            vec![Pattern::boolean(), Pattern::string(), Pattern::null()]
        }
        PatternKind::Boolean => {
            vec![Pattern::number(), Pattern::string(), Pattern::null()]
        }
        PatternKind::Object(_)
        | PatternKind::Array { .. }
        | PatternKind::ListOf(_)
        | PatternKind::Dictionary { .. } => vec![
            Pattern::string(),
            Pattern::number(),
            Pattern::boolean(),
            Pattern::null(),
        ],
        PatternKind::Enum { .. } => vec![Pattern::null()],
        PatternKind::Exact(value) => match value {
            Value::Null => Vec::new(),
            Value::String(_) => vec![Pattern::boolean(), Pattern::number(), Pattern::null()],
            Value::Int(_) | Value::Float(_) => {
                vec![Pattern::boolean(), Pattern::string(), Pattern::null()]
            }
            Value::Bool(_) => vec![Pattern::number(), Pattern::string(), Pattern::null()],
            _ => vec![Pattern::null()],
        },
        _ => Vec::new(),
    }
}

fn boundary_violations(pattern: &Pattern) -> Vec<Pattern> {
    let mut out = Vec::new();
    match &pattern.kind {
        PatternKind::Str(constraints) => {
            if let Some(min) = constraints.min_length {
                if min > 0 {
                    out.push(Pattern::exact(Value::String("a".repeat(min - 1))));
                }
            }
            if let Some(max) = constraints.max_length {
                out.push(Pattern::exact(Value::String("a".repeat(max + 1))));
            }
        }
        PatternKind::Number(constraints) => {
            if let Some(min) = constraints.minimum {
                let outside = if constraints.exclusive_min { min } else { min - 1.0 };
                out.push(Pattern::exact(number_value(outside, constraints.is_float)));
            }
            if let Some(max) = constraints.maximum {
                let outside = if constraints.exclusive_max { max } else { max + 1.0 };
                out.push(Pattern::exact(number_value(outside, constraints.is_float)));
            }
            if let Some(min) = constraints.min_digits {
                if (2..=18).contains(&min) {
                    out.push(Pattern::exact(Value::Int(10i64.pow(min as u32 - 2))));
                }
            }
            if let Some(max) = constraints.max_digits {
                if max <= 17 {
                    out.push(Pattern::exact(Value::Int(10i64.pow(max as u32))));
                }
            }
        }
        _ => {}
    }
    out
}

fn enum_violations(pattern: &Pattern) -> Vec<Pattern> {
    let PatternKind::Enum { options } = &pattern.kind else {
        return Vec::new();
    };
    if options.iter().all(|v| matches!(v, Value::Int(_))) {
        let max = options
            .iter()
            .filter_map(|v| match v {
                Value::Int(i) => Some(*i),
                _ => None,
            })
            .max()
            .unwrap_or(0);
        return vec![Pattern::exact(Value::Int(max + 1))];
    }
    let mut text = "unexpected_value".to_string();
    while options.contains(&Value::String(text.clone())) {
        text.push('x');
    }
    vec![Pattern::exact(Value::String(text))]
}

fn number_value(n: f64, is_float: bool) -> Value {
    if is_float || n.fract() != 0.0 {
        Value::Float(n)
    } else {
        Value::Int(n as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{NumberConstraints, StringConstraints};

    fn drain(
        pattern: &Pattern,
        strategy: NegativeStrategy,
    ) -> Vec<ReturnValue<Pattern>> {
        negative_based_on(pattern, &Row::new("t"), &Resolver::new(), strategy).collect()
    }

    #[test]
    fn test_type_confusion_for_a_string_field() {
        let variants = drain(&Pattern::string(), NegativeStrategy::All);
        let patterns: Vec<&Pattern> = variants.iter().filter_map(|v| v.value()).collect();
        assert!(patterns.contains(&&Pattern::boolean()));
        assert!(patterns.contains(&&Pattern::number()));
        assert!(patterns.contains(&&Pattern::null()));
    }

    #[test]
    fn test_strict_strategy_skips_type_confusion() {
        let pattern = Pattern::string_with(StringConstraints {
            min_length: Some(3),
            max_length: Some(5),
            regex: None,
        })
        .unwrap();
        let variants = drain(&pattern, NegativeStrategy::Strict);
        let patterns: Vec<&Pattern> = variants.iter().filter_map(|v| v.value()).collect();

        assert_eq!(patterns.len(), 2);
        assert!(patterns.contains(&&Pattern::exact(Value::String("aa".to_string()))));
        assert!(patterns.contains(&&Pattern::exact(Value::String("aaaaaa".to_string()))));
    }

    #[test]
    fn test_numeric_boundaries_step_just_outside() {
        let pattern = Pattern::number_with(NumberConstraints {
            minimum: Some(1.0),
            maximum: Some(10.0),
            ..Default::default()
        })
        .unwrap();
        let variants = drain(&pattern, NegativeStrategy::Strict);
        let patterns: Vec<&Pattern> = variants.iter().filter_map(|v| v.value()).collect();
        assert!(patterns.contains(&&Pattern::exact(Value::Int(0))));
        assert!(patterns.contains(&&Pattern::exact(Value::Int(11))));
    }

    #[test]
    fn test_one_field_negated_per_variant() {
        let mut fields = IndexMap::new();
        fields.insert("id".to_string(), Pattern::number());
        fields.insert("name".to_string(), Pattern::string());
        let pattern = Pattern::object_of(fields);

        let resolver = Resolver::new();
        for variant in drain(&pattern, NegativeStrategy::All) {
            let object = variant.value().expect("negative variants are values");
            let PatternKind::Object(o) = &object.kind else {
                panic!("expected object variant");
            };
            let untouched = (o.fields["id"] == Pattern::number()) as usize
                + (o.fields["name"] == Pattern::string()) as usize;
            assert_eq!(untouched, 1, "exactly one field must be mutated");

            // and the mutated variant as a whole must fail validation
            let value = generate(object, &resolver).expect("variant should generate");
            assert!(!matches(&pattern, &value, &resolver).is_success());
        }
    }

    #[test]
    fn test_enum_violation_is_outside_the_option_set() {
        let options = vec![
            Value::String("red".to_string()),
            Value::String("green".to_string()),
        ];
        let pattern = Pattern::enum_of(options.clone());
        let variants = drain(&pattern, NegativeStrategy::Strict);
        let patterns: Vec<&Pattern> = variants.iter().filter_map(|v| v.value()).collect();
        assert_eq!(patterns.len(), 1);
        match &patterns[0].kind {
            PatternKind::Exact(value) => assert!(!options.contains(value)),
            other => panic!("expected exact value, got {:?}", other),
        }
    }

    #[test]
    fn test_stringly_filter_discards_accidental_passes() {
        let resolver = Resolver::new();
        // a number stringifies into something (string) accepts in-string
        let candidates = vec![Pattern::number(), Pattern::boolean()];
        let surviving = stringly_filter(&Pattern::string(), candidates, &resolver);
        assert!(surviving.is_empty());

        // the reverse direction keeps both: words and booleans are not numbers
        let candidates = vec![Pattern::boolean(), Pattern::string()];
        let surviving = stringly_filter(&Pattern::number(), candidates.clone(), &resolver);
        assert_eq!(surviving, candidates);
    }

    #[test]
    fn test_stringly_filter_is_idempotent() {
        let resolver = Resolver::new();
        let candidates = vec![
            Pattern::boolean(),
            Pattern::string(),
            Pattern::exact(Value::String("oops".to_string())),
        ];
        let once = stringly_filter(&Pattern::number(), candidates, &resolver);
        let twice = stringly_filter(&Pattern::number(), once.clone(), &resolver);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_self_referential_object_terminates() {
        let mut fields = IndexMap::new();
        fields.insert("id".to_string(), Pattern::number());
        fields.insert("next?".to_string(), Pattern::reference("Node"));
        let node = Pattern::object_of(fields);
        let resolver = Resolver::with_patterns(vec![("Node".to_string(), node)]);
        let pattern = resolver.resolve("Node").unwrap();

        let variants: Vec<_> =
            negative_based_on(&pattern, &Row::new("t"), &resolver, NegativeStrategy::All)
                .collect();
        assert!(!variants.is_empty());
    }

    #[test]
    fn test_row_literal_concretizes_untouched_siblings() {
        let mut fields = IndexMap::new();
        fields.insert("id".to_string(), Pattern::number());
        fields.insert("name".to_string(), Pattern::string());
        let pattern = Pattern::object_of(fields);

        let row = Row::new("t").with_entry("id", "7");
        let resolver = Resolver::new();
        let variants: Vec<_> =
            negative_based_on(&pattern, &row, &resolver, NegativeStrategy::All).collect();
        let mutated_name = variants
            .iter()
            .filter_map(|v| v.value())
            .find(|p| match &p.kind {
                PatternKind::Object(o) => o.fields["name"] != Pattern::string(),
                _ => false,
            })
            .expect("some variant mutates name");
        let PatternKind::Object(o) = &mutated_name.kind else {
            unreachable!()
        };
        assert_eq!(o.fields["id"], Pattern::exact(Value::Int(7)));
    }
}
