//! Positive test-variant derivation
//!
//! `new_based_on` turns a pattern plus an example row into a lazy sequence of
//! concretized pattern variants, each wrapped in `ReturnValue` so one failing
//! branch never aborts its siblings. Objects follow the all-or-nothing
//! optional-key policy: a variant includes either every eligible optional key
//! or only the mandatory ones (plus row-forced keys), never a partial subset.
//! Per-field candidates are combined through the capped combination
//! scheduler, and boundary exact-value variants are derived for constrained
//! scalars so that declared limits are exercised, not just mentioned.

use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::debug;

use crate::combination::{CombinationSpec, DEFAULT_MAX_COMBINATIONS};
use crate::encompass::encompasses;
use crate::error::EngineError;
use crate::matching::parse_scalar_text;
use crate::pattern::{NumberConstraints, ObjectPattern, Pattern, PatternKind};
use crate::resolver::Resolver;
use crate::returnvalue::ReturnValue;
use crate::row::Row;
use crate::value::Value;

/// Derive positive test variants for a pattern, steered by the example row
pub fn new_based_on(
    pattern: &Pattern,
    row: &Row,
    resolver: &Resolver,
) -> Box<dyn Iterator<Item = ReturnValue<Pattern>>> {
    debug!(pattern = %pattern, row = %row.name, "deriving positive variants");
    based_on(pattern, "", row, resolver)
}

pub(crate) fn based_on(
    pattern: &Pattern,
    field: &str,
    row: &Row,
    resolver: &Resolver,
) -> Box<dyn Iterator<Item = ReturnValue<Pattern>>> {
    // named patterns consult the cycle markers before descending
    let derived;
    let resolver = if let Some(alias) = &pattern.type_alias {
        if resolver.has_seen(alias, field) {
            return once(ReturnValue::exception(EngineError::UnboundedRecursion {
                alias: alias.clone(),
                path: field.to_string(),
            }));
        }
        derived = resolver.with_cycle_marker(alias, field);
        &derived
    } else {
        resolver
    };

    match &pattern.kind {
        PatternKind::Str(constraints) => {
            let mut variants = vec![ReturnValue::Value(pattern.clone())];
            if constraints.regex.is_none() {
                if let Some(min) = constraints.min_length {
                    if min > 0 {
                        variants.push(ReturnValue::Value(Pattern::exact(Value::String(
                            "a".repeat(min),
                        ))));
                    }
                }
                if let Some(max) = constraints.max_length {
                    variants.push(ReturnValue::Value(Pattern::exact(Value::String(
                        "a".repeat(max),
                    ))));
                }
            }
            boxed(variants)
        }
        PatternKind::Number(constraints) => {
            let mut variants = vec![ReturnValue::Value(pattern.clone())];
            if let Some(low) = lower_number_boundary(constraints) {
                variants.push(ReturnValue::Value(Pattern::exact(low)));
            }
            if let Some(high) = upper_number_boundary(constraints) {
                variants.push(ReturnValue::Value(Pattern::exact(high)));
            }
            boxed(variants)
        }
        PatternKind::Enum { options } => boxed(
            options
                .iter()
                .map(|v| ReturnValue::Value(Pattern::exact(v.clone())))
                .collect(),
        ),
        PatternKind::Object(object) => object_variants(object, row, resolver),
        PatternKind::Array { elements } => array_variants(elements, row, resolver),
        PatternKind::ListOf(element) => {
            let list_row = row.step_into_list();
            Box::new(
                based_on(element, field, &list_row, resolver)
                    .map(|outcome| outcome.map(Pattern::list_of)),
            )
        }
        PatternKind::AnyOf { options } => {
            // nullable options come last so positive variants lead
            let mut ordered = options.clone();
            ordered.sort_by_key(|o| o.is_null_like());
            let field = field.to_string();
            let row = row.clone();
            let resolver = resolver.clone();
            Box::new(
                ordered
                    .into_iter()
                    .flat_map(move |option| based_on(&option, &field, &row, &resolver)),
            )
        }
        PatternKind::Ref(name) => match resolver.resolve(name) {
            Ok(resolved) => based_on(&resolved, field, row, resolver),
            Err(error) => once(ReturnValue::exception(error)),
        },
        PatternKind::LookupRow { inner, key } => match row.literal(key) {
            Err(error) => once(ReturnValue::exception(error)),
            Ok(Some(text)) => once(literal_candidate(inner, &text.to_string(), resolver)),
            Ok(None) => {
                let key = key.clone();
                Box::new(based_on(inner, field, row, resolver).map(move |outcome| {
                    outcome.map(|p| Pattern::lookup_row(p, key.clone()))
                }))
            }
        },
        PatternKind::InString(inner) => Box::new(
            based_on(inner, field, row, resolver).map(|outcome| outcome.map(Pattern::in_string)),
        ),
        PatternKind::RestOf(inner) => Box::new(
            based_on(inner, field, row, resolver).map(|outcome| outcome.map(Pattern::rest_of)),
        ),
        PatternKind::QueryScalar(inner) => Box::new(
            based_on(inner, field, row, resolver)
                .map(|outcome| outcome.map(Pattern::query_scalar)),
        ),
        PatternKind::Dictionary { key, value } => {
            let key = key.as_ref().clone();
            Box::new(based_on(value, field, row, resolver).map(move |outcome| {
                outcome.map(|v| Pattern::dictionary(key.clone(), v))
            }))
        }
        PatternKind::Csv(element) => Box::new(
            based_on(element, field, row, resolver).map(|outcome| outcome.map(Pattern::csv)),
        ),
        // remaining kinds contribute themselves as the single variant
        _ => once(ReturnValue::Value(pattern.clone())),
    }
}

fn boxed(
    variants: Vec<ReturnValue<Pattern>>,
) -> Box<dyn Iterator<Item = ReturnValue<Pattern>>> {
    Box::new(variants.into_iter())
}

fn once(outcome: ReturnValue<Pattern>) -> Box<dyn Iterator<Item = ReturnValue<Pattern>>> {
    Box::new(std::iter::once(outcome))
}

/// First admissible value at a declared lower bound. An exclusive float bound
/// has no exact edge value and contributes no boundary variant; an exclusive
/// integer bound steps inward to the next integer.
fn lower_number_boundary(constraints: &NumberConstraints) -> Option<Value> {
    let min = constraints.minimum?;
    if constraints.is_float {
        return (!constraints.exclusive_min).then(|| Value::Float(min));
    }
    let edge = if constraints.exclusive_min {
        min.floor() as i64 + 1
    } else {
        min.ceil() as i64
    };
    Some(Value::Int(edge))
}

/// Last admissible value at a declared upper bound, mirroring
/// `lower_number_boundary`
fn upper_number_boundary(constraints: &NumberConstraints) -> Option<Value> {
    let max = constraints.maximum?;
    if constraints.is_float {
        return (!constraints.exclusive_max).then(|| Value::Float(max));
    }
    let edge = if constraints.exclusive_max {
        max.ceil() as i64 - 1
    } else {
        max.floor() as i64
    };
    Some(Value::Int(edge))
}

fn is_cycle_exception(outcome: &ReturnValue<Pattern>) -> bool {
    matches!(
        outcome,
        ReturnValue::Exception {
            error: EngineError::UnboundedRecursion { .. },
            ..
        }
    )
}

/// Row override or recursive derivation for one object field
fn field_candidates(
    key: &str,
    child: &Pattern,
    optional: bool,
    row: &Row,
    resolver: &Resolver,
) -> Result<Vec<ReturnValue<Pattern>>, EngineError> {
    if let Some(text) = row.literal(key)? {
        return Ok(vec![literal_candidate(child, &text.to_string(), resolver)]);
    }
    let child_row = row.step_into_field(key);
    if let Some(text) = child_row.literal(key)? {
        return Ok(vec![literal_candidate(child, &text.to_string(), resolver)]);
    }

    let mut candidates: Vec<ReturnValue<Pattern>> =
        based_on(child, key, &child_row, resolver).collect();
    if optional {
        // a recursive branch under an optional key is simply omitted
        candidates.retain(|c| !is_cycle_exception(c));
    }
    Ok(candidates)
}

/// Turn a row-supplied literal into an exact-value candidate; a pattern token
/// must instead be encompasses-compatible with the declared pattern
fn literal_candidate(pattern: &Pattern, text: &str, resolver: &Resolver) -> ReturnValue<Pattern> {
    if Pattern::is_pattern_token(text) {
        let token = Pattern::from_token(text);
        return match encompasses(pattern, &token, resolver, resolver, &HashSet::new()) {
            crate::results::MatchResult::Success => ReturnValue::Value(token),
            crate::results::MatchResult::Failure(failure) => ReturnValue::Failure(failure),
        };
    }
    match parse_scalar_text(pattern, text, resolver) {
        Ok(value) => ReturnValue::Value(Pattern::exact(value)),
        Err(failure) => ReturnValue::Failure(failure),
    }
}

fn row_forces(row: &Row, key: &str) -> bool {
    if row.contains(key) {
        return true;
    }
    matches!(row.json_body(), Some(Value::Object(map)) if map.contains_key(key))
}

fn object_variants(
    object: &ObjectPattern,
    row: &Row,
    resolver: &Resolver,
) -> Box<dyn Iterator<Item = ReturnValue<Pattern>>> {
    let mandatory: Vec<(String, bool, Pattern)> = object
        .declared_fields()
        .filter(|(_, _, optional, _)| !optional)
        .map(|(_, clean, _, p)| (clean.to_string(), false, p.clone()))
        .collect();
    let optionals: Vec<(String, bool, Pattern)> = object
        .declared_fields()
        .filter(|(_, _, optional, _)| *optional)
        .map(|(_, clean, _, p)| (clean.to_string(), true, p.clone()))
        .collect();

    // all-or-nothing: either every optional key, or only mandatory plus
    // row-forced keys
    let mut all_keys = mandatory.clone();
    all_keys.extend(optionals.iter().cloned());

    let mut keysets = vec![all_keys];
    let unforced_optionals_exist = optionals.iter().any(|(key, _, _)| !row_forces(row, key));
    if unforced_optionals_exist && !resolver.all_patterns_mandatory() {
        let mut mandatory_only = mandatory.clone();
        mandatory_only.extend(
            optionals
                .iter()
                .filter(|(key, _, _)| row_forces(row, key))
                .cloned(),
        );
        keysets.push(mandatory_only);
    }

    let iterators: Vec<Box<dyn Iterator<Item = ReturnValue<Pattern>>>> = keysets
        .into_iter()
        .map(|keyset| keyset_variants(object, keyset, row, resolver))
        .collect();
    Box::new(iterators.into_iter().flatten())
}

fn keyset_variants(
    object: &ObjectPattern,
    keyset: Vec<(String, bool, Pattern)>,
    row: &Row,
    resolver: &Resolver,
) -> Box<dyn Iterator<Item = ReturnValue<Pattern>>> {
    if let Some(min) = object.min_properties {
        if keyset.len() < min {
            return once(ReturnValue::Failure(crate::results::Failure::new(format!(
                "minProperties {} cannot be satisfied with {} keys",
                min,
                keyset.len()
            ))));
        }
    }
    if let Some(max) = object.max_properties {
        if keyset.len() > max {
            return once(ReturnValue::Failure(crate::results::Failure::new(format!(
                "maxProperties {} cannot be satisfied with {} keys",
                max,
                keyset.len()
            ))));
        }
    }

    let mut fields: Vec<(String, Vec<ReturnValue<Pattern>>)> = Vec::new();
    for (key, optional, child) in keyset {
        let candidates = match field_candidates(&key, &child, optional, row, resolver) {
            Ok(candidates) => candidates,
            Err(error) => return once(ReturnValue::exception(error)),
        };
        if candidates.is_empty() {
            if optional {
                continue;
            }
            return once(ReturnValue::exception(EngineError::UnboundedRecursion {
                alias: child.type_alias.clone().unwrap_or_else(|| key.clone()),
                path: key,
            }));
        }
        fields.push((key, candidates));
    }

    if fields.is_empty() {
        return once(ReturnValue::Value(Pattern::object_of(IndexMap::new())));
    }

    let spec = match CombinationSpec::new(fields, DEFAULT_MAX_COMBINATIONS) {
        Ok(spec) => spec,
        Err(error) => return once(ReturnValue::exception(error)),
    };

    let min_properties = object.min_properties;
    let max_properties = object.max_properties;
    let additional = object.additional.clone();
    let discriminator = object.discriminator.clone();
    Box::new(spec.combinations().map(move |combo| {
        let parts: Vec<ReturnValue<(String, Pattern)>> = combo
            .into_iter()
            .map(|(key, outcome)| {
                outcome
                    .with_breadcrumb(key.clone())
                    .map(|pattern| (key, pattern))
            })
            .collect();
        ReturnValue::sequence(parts).map(|pairs| {
            let fields: IndexMap<String, Pattern> = pairs.into_iter().collect();
            Pattern {
                kind: PatternKind::Object(ObjectPattern {
                    fields,
                    min_properties,
                    max_properties,
                    additional: additional.clone(),
                    discriminator: discriminator.clone(),
                }),
                type_alias: None,
            }
        })
    }))
}

fn array_variants(
    elements: &[Pattern],
    row: &Row,
    resolver: &Resolver,
) -> Box<dyn Iterator<Item = ReturnValue<Pattern>>> {
    let list_row = row.step_into_list();
    let mut fields: Vec<(String, Vec<ReturnValue<Pattern>>)> = Vec::new();
    for (i, element) in elements.iter().enumerate() {
        let slot = format!("[{}]", i);
        let candidates: Vec<ReturnValue<Pattern>> =
            based_on(element, &slot, &list_row, resolver).collect();
        if candidates.is_empty() {
            return Box::new(std::iter::empty());
        }
        fields.push((i.to_string(), candidates));
    }

    if fields.is_empty() {
        return once(ReturnValue::Value(Pattern::array(Vec::new())));
    }

    let spec = match CombinationSpec::new(fields, DEFAULT_MAX_COMBINATIONS) {
        Ok(spec) => spec,
        Err(error) => return once(ReturnValue::exception(error)),
    };
    Box::new(spec.combinations().map(|combo| {
        let parts: Vec<ReturnValue<Pattern>> = combo
            .into_iter()
            .map(|(slot, outcome)| outcome.with_breadcrumb(format!("[{}]", slot)))
            .collect();
        ReturnValue::sequence(parts).map(Pattern::array)
    }))
}
