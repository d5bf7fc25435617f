//! Structural validation: does a concrete value conform to a pattern?
//!
//! Composites recurse into children and compose child failures instead of
//! short-circuiting, so the final failure for an object or array carries
//! every mismatching field, each tagged with its breadcrumb. Scalars name the
//! violated bound in their message so a report can show which constraint was
//! broken.

use chrono::{DateTime, NaiveDate, NaiveTime};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::trace;

use crate::pattern::{
    AdditionalProperties, NumberConstraints, ObjectPattern, Occurrence, Pattern, PatternKind,
    StringConstraints, XmlPattern,
};
use crate::resolver::Resolver;
use crate::results::{mismatch_message, Failure, FailureReason, MatchResult};
use crate::value::Value;

lazy_static! {
    static ref URL_RE: Regex =
        Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*://[^\s/$.?#].[^\s]*$").unwrap();
}

/// Check whether `value` conforms to `pattern` within the given context
pub fn matches(pattern: &Pattern, value: &Value, resolver: &Resolver) -> MatchResult {
    trace!(pattern = %pattern, kind = value.type_name(), "matching value against pattern");
    match &pattern.kind {
        PatternKind::Boolean => match value {
            Value::Bool(_) => MatchResult::Success,
            other => mismatch("boolean", other, resolver),
        },
        PatternKind::Number(constraints) => match_number(constraints, value, resolver),
        PatternKind::Str(constraints) => match_string(constraints, value, resolver),
        PatternKind::Date => match_text_format(value, resolver, "date", |s| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
        }),
        PatternKind::DateTime => match_text_format(value, resolver, "datetime", |s| {
            DateTime::parse_from_rfc3339(s).is_ok()
        }),
        PatternKind::Time => match_text_format(value, resolver, "time", |s| {
            NaiveTime::parse_from_str(s, "%H:%M:%S").is_ok()
        }),
        PatternKind::Uuid => match_text_format(value, resolver, "uuid", |s| {
            uuid::Uuid::parse_str(s).is_ok()
        }),
        PatternKind::Url { scheme } => match value {
            Value::String(s) => {
                if !URL_RE.is_match(s) {
                    return MatchResult::Failure(Failure::new(mismatch_message(
                        "url",
                        value,
                        resolver.mismatch_detail(),
                    )));
                }
                if let Some(scheme) = scheme {
                    if !s.starts_with(&format!("{}://", scheme)) {
                        return MatchResult::Failure(Failure::new(format!(
                            "Expected url with scheme {}, got {}",
                            scheme,
                            value.quoted_text()
                        )));
                    }
                }
                MatchResult::Success
            }
            other => mismatch("url", other, resolver),
        },
        PatternKind::EmptyString => match value {
            Value::String(s) if s.is_empty() => MatchResult::Success,
            Value::Empty => MatchResult::Success,
            other => mismatch("empty string", other, resolver),
        },
        PatternKind::Binary => match value {
            Value::Binary(_) => MatchResult::Success,
            other => mismatch("binary", other, resolver),
        },
        PatternKind::Anything => MatchResult::Success,
        PatternKind::Object(object) => match_object(object, value, resolver),
        PatternKind::Array { elements } => match_array(elements, value, resolver),
        PatternKind::ListOf(element) => match value {
            Value::List(items) => MatchResult::from_results(items.iter().enumerate().map(
                |(i, item)| matches(element, item, resolver).breadcrumb(format!("[{}]", i)),
            )),
            other => mismatch("list", other, resolver),
        },
        PatternKind::Xml(xml) => match_xml(xml, value, resolver),
        PatternKind::Dictionary { key, value: value_pattern } => match value {
            Value::Object(map) => MatchResult::from_results(map.iter().flat_map(|(k, v)| {
                vec![
                    matches(key, &Value::String(k.clone()), resolver).breadcrumb(k.clone()),
                    matches(value_pattern, v, resolver).breadcrumb(k.clone()),
                ]
            })),
            other => mismatch("object", other, resolver),
        },
        PatternKind::Csv(element) => match value {
            Value::String(s) => {
                MatchResult::from_results(s.split(',').enumerate().map(|(i, part)| {
                    match parse_scalar_text(element, part.trim(), resolver) {
                        Ok(_) => MatchResult::Success,
                        Err(failure) => {
                            MatchResult::Failure(failure).breadcrumb(format!("[{}]", i))
                        }
                    }
                }))
            }
            Value::List(items) => MatchResult::from_results(items.iter().enumerate().map(
                |(i, item)| matches(element, item, resolver).breadcrumb(format!("[{}]", i)),
            )),
            other => mismatch("csv", other, resolver),
        },
        PatternKind::AnyOf { options } => match_any_of(pattern, options, value, resolver),
        PatternKind::Enum { options } => {
            if options.contains(value) {
                MatchResult::Success
            } else {
                let allowed: Vec<String> = options.iter().map(|v| v.quoted_text()).collect();
                MatchResult::Failure(Failure::new(format!(
                    "Expected one of [{}], got {}",
                    allowed.join(", "),
                    value.quoted_text()
                )))
            }
        }
        PatternKind::Exact(expected) => {
            if expected == value || (expected.is_null_like() && value.is_null_like()) {
                MatchResult::Success
            } else {
                MatchResult::Failure(Failure::new(mismatch_message(
                    &expected.quoted_text(),
                    value,
                    resolver.mismatch_detail(),
                )))
            }
        }
        PatternKind::Ref(name) => match resolver.resolve(name) {
            Ok(resolved) => matches(&resolved, value, resolver),
            Err(error) => MatchResult::Failure(Failure::from_error(&error)),
        },
        PatternKind::LookupRow { inner, .. } => matches(inner, value, resolver),
        PatternKind::InString(inner) => match value {
            Value::String(s) => match parse_scalar_text(inner, s, resolver) {
                Ok(_) => MatchResult::Success,
                Err(failure) => MatchResult::Failure(failure),
            },
            other => mismatch("string", other, resolver),
        },
        PatternKind::QueryScalar(inner) => match value {
            Value::String(s) => match parse_scalar_text(inner, s, resolver) {
                Ok(_) => MatchResult::Success,
                Err(failure) => MatchResult::Failure(failure),
            },
            other => matches(inner, other, resolver),
        },
        PatternKind::RestOf(inner) => matches(inner, value, resolver),
    }
}

fn mismatch(expected: &str, actual: &Value, resolver: &Resolver) -> MatchResult {
    MatchResult::Failure(Failure::new(mismatch_message(
        expected,
        actual,
        resolver.mismatch_detail(),
    )))
}

fn match_text_format(
    value: &Value,
    resolver: &Resolver,
    kind: &str,
    is_valid: impl Fn(&str) -> bool,
) -> MatchResult {
    match value {
        Value::String(s) if is_valid(s) => MatchResult::Success,
        other => mismatch(kind, other, resolver),
    }
}

fn digit_count(n: f64) -> usize {
    let magnitude = n.abs().trunc() as u64;
    magnitude.to_string().len()
}

fn match_number(
    constraints: &NumberConstraints,
    value: &Value,
    resolver: &Resolver,
) -> MatchResult {
    let number = match value.as_number() {
        Some(n) => n,
        None => return mismatch("number", value, resolver),
    };
    if !constraints.is_float {
        if let Value::Float(f) = value {
            if f.fract() != 0.0 {
                return MatchResult::Failure(Failure::new(format!(
                    "Expected integer, got {}",
                    value.quoted_text()
                )));
            }
        }
    }

    let mut failures = Vec::new();
    let digits = digit_count(number);
    if let Some(min) = constraints.min_digits {
        if digits < min {
            failures.push(Failure::new(format!(
                "Number {} has {} digits, fewer than minimum {}",
                value, digits, min
            )));
        }
    }
    if let Some(max) = constraints.max_digits {
        if digits > max {
            failures.push(Failure::new(format!(
                "Number {} has {} digits, more than maximum {}",
                value, digits, max
            )));
        }
    }
    if let Some(min) = constraints.minimum {
        let violated = if constraints.exclusive_min {
            number <= min
        } else {
            number < min
        };
        if violated {
            failures.push(Failure::new(format!(
                "Number {} is less than {}minimum {}",
                value,
                if constraints.exclusive_min { "exclusive " } else { "" },
                min
            )));
        }
    }
    if let Some(max) = constraints.maximum {
        let violated = if constraints.exclusive_max {
            number >= max
        } else {
            number > max
        };
        if violated {
            failures.push(Failure::new(format!(
                "Number {} exceeds {}maximum {}",
                value,
                if constraints.exclusive_max { "exclusive " } else { "" },
                max
            )));
        }
    }

    if failures.is_empty() {
        MatchResult::Success
    } else {
        MatchResult::Failure(Failure::from_failures(failures))
    }
}

fn match_string(
    constraints: &StringConstraints,
    value: &Value,
    resolver: &Resolver,
) -> MatchResult {
    let text = match value {
        Value::String(s) => s,
        other => return mismatch("string", other, resolver),
    };

    let mut failures = Vec::new();
    let length = text.chars().count();
    if let Some(min) = constraints.min_length {
        if length < min {
            failures.push(Failure::new(format!(
                "String length {} is less than minimum {}",
                length, min
            )));
        }
    }
    if let Some(max) = constraints.max_length {
        if length > max {
            failures.push(Failure::new(format!(
                "String length {} exceeds maximum {}",
                length, max
            )));
        }
    }
    if let Some(regex) = &constraints.regex {
        if !regex.is_match(text) {
            failures.push(Failure::new(format!(
                "String {} does not match regex {}",
                value.quoted_text(),
                regex.source()
            )));
        }
    }

    if failures.is_empty() {
        MatchResult::Success
    } else {
        MatchResult::Failure(Failure::from_failures(failures))
    }
}

fn match_object(object: &ObjectPattern, value: &Value, resolver: &Resolver) -> MatchResult {
    let map = match value {
        Value::Object(map) => map,
        other => return mismatch("object", other, resolver),
    };

    let mut results = Vec::new();

    // property-count bounds are independent of per-field matching
    if let Some(min) = object.min_properties {
        if map.len() < min {
            results.push(MatchResult::Failure(Failure::new(format!(
                "Expected at least {} properties, got {}",
                min,
                map.len()
            ))));
        }
    }
    if let Some(max) = object.max_properties {
        if map.len() > max {
            results.push(MatchResult::Failure(Failure::new(format!(
                "Expected at most {} properties, got {}",
                max,
                map.len()
            ))));
        }
    }

    for (_, clean, optional, child) in object.declared_fields() {
        match map.get(clean) {
            Some(present) => {
                results.push(matches(child, present, resolver).breadcrumb(clean));
            }
            None => {
                let required = !optional || resolver.all_patterns_mandatory();
                if required {
                    results.push(MatchResult::Failure(
                        Failure::with_reason(
                            format!("Required key '{}' is missing", clean),
                            FailureReason::MissingKey,
                        )
                        .breadcrumb(clean),
                    ));
                }
            }
        }
    }

    let declared: Vec<&str> = object.declared_fields().map(|(_, clean, _, _)| clean).collect();
    for (key, present) in map {
        if declared.contains(&key.as_str()) {
            continue;
        }
        match &object.additional {
            AdditionalProperties::ConstrainedBy(pattern) => {
                results.push(matches(pattern, present, resolver).breadcrumb(key.clone()));
            }
            _ if object.ignores_unexpected_keys() => {}
            _ => {
                results.push(MatchResult::Failure(
                    Failure::with_reason(
                        format!("Unexpected key '{}'", key),
                        FailureReason::UnexpectedKey,
                    )
                    .breadcrumb(key.clone()),
                ));
            }
        }
    }

    MatchResult::from_results(results)
}

fn match_array(elements: &[Pattern], value: &Value, resolver: &Resolver) -> MatchResult {
    let items = match value {
        Value::List(items) => items,
        other => return mismatch("list", other, resolver),
    };

    let rest = elements
        .last()
        .and_then(|last| match &last.kind {
            PatternKind::RestOf(inner) => Some(inner.as_ref()),
            _ => None,
        });
    let fixed_len = if rest.is_some() {
        elements.len() - 1
    } else {
        elements.len()
    };

    if items.len() < fixed_len || (rest.is_none() && items.len() != fixed_len) {
        return MatchResult::Failure(Failure::new(format!(
            "Expected {}{} elements, got {}",
            if rest.is_some() { "at least " } else { "" },
            fixed_len,
            items.len()
        )));
    }

    let mut results = Vec::new();
    for (i, item) in items.iter().enumerate() {
        let pattern = if i < fixed_len {
            &elements[i]
        } else {
            rest.expect("extra elements imply a rest marker")
        };
        results.push(matches(pattern, item, resolver).breadcrumb(format!("[{}]", i)));
    }
    MatchResult::from_results(results)
}

fn match_xml(xml: &XmlPattern, value: &Value, resolver: &Resolver) -> MatchResult {
    let node = match value {
        Value::Xml(node) => node,
        other => return mismatch("xml", other, resolver),
    };

    if node.name != xml.name {
        return MatchResult::Failure(Failure::new(format!(
            "Expected element <{}>, got <{}>",
            xml.name, node.name
        )));
    }

    let mut results = Vec::new();
    for (name, pattern) in &xml.attributes {
        match node.attributes.get(name) {
            Some(text) => {
                let result = match parse_scalar_text(pattern, text, resolver) {
                    Ok(_) => MatchResult::Success,
                    Err(failure) => MatchResult::Failure(failure),
                };
                results.push(result.breadcrumb(format!("@{}", name)));
            }
            None => results.push(MatchResult::Failure(
                Failure::with_reason(
                    format!("Attribute '{}' is missing", name),
                    FailureReason::MissingKey,
                )
                .breadcrumb(format!("@{}", name)),
            )),
        }
    }

    if node.children.is_empty() && xml.nillable {
        return MatchResult::from_results(results);
    }

    match xml.occurrence {
        Occurrence::Multiple => {
            // every child node matches the single declared child pattern
            if let Some(child_pattern) = xml.children.first() {
                for (i, child) in node.children.iter().enumerate() {
                    results.push(
                        matches(child_pattern, child, resolver).breadcrumb(format!("[{}]", i)),
                    );
                }
            }
        }
        Occurrence::Optional if node.children.is_empty() => {}
        _ => {
            if node.children.len() != xml.children.len() {
                results.push(MatchResult::Failure(Failure::new(format!(
                    "Expected {} child nodes, got {}",
                    xml.children.len(),
                    node.children.len()
                ))));
            } else {
                for (i, (child_pattern, child)) in
                    xml.children.iter().zip(node.children.iter()).enumerate()
                {
                    results.push(
                        matches(child_pattern, child, resolver).breadcrumb(format!("[{}]", i)),
                    );
                }
            }
        }
    }

    MatchResult::from_results(results)
}

fn match_any_of(
    pattern: &Pattern,
    options: &[Pattern],
    value: &Value,
    resolver: &Resolver,
) -> MatchResult {
    let mut failures = Vec::new();
    for option in options {
        match matches(option, value, resolver) {
            MatchResult::Success => return MatchResult::Success,
            MatchResult::Failure(f) => failures.push((option, f)),
        }
    }

    // for a nullable 2-option union the single non-null failure is surfaced
    // verbatim; n-ary unions concatenate every option's failure
    if pattern.nullable_inner().is_some() {
        if let Some((_, failure)) = failures.iter().find(|(option, _)| !option.is_null_like()) {
            return MatchResult::Failure(failure.clone());
        }
    }
    MatchResult::Failure(Failure::from_failures(
        failures.into_iter().map(|(_, f)| f).collect(),
    ))
}

/// Parse the canonical textual form of a scalar value against a pattern
///
/// Used by in-string matching, query/CSV parameters, and row literal
/// overrides. The parsed value is constraint-checked before being returned.
pub fn parse_scalar_text(
    pattern: &Pattern,
    text: &str,
    resolver: &Resolver,
) -> Result<Value, Failure> {
    let value = match &pattern.kind {
        PatternKind::Boolean => match text {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => {
                return Err(Failure::new(format!(
                    "Expected boolean, got \"{}\"",
                    text
                )))
            }
        },
        PatternKind::Number(_) => {
            if let Ok(i) = text.parse::<i64>() {
                Value::Int(i)
            } else if let Ok(f) = text.parse::<f64>() {
                Value::Float(f)
            } else {
                return Err(Failure::new(format!("Expected number, got \"{}\"", text)));
            }
        }
        PatternKind::Str(_)
        | PatternKind::Date
        | PatternKind::DateTime
        | PatternKind::Time
        | PatternKind::Uuid
        | PatternKind::Url { .. }
        | PatternKind::EmptyString
        | PatternKind::Anything => Value::String(text.to_string()),
        PatternKind::Binary => Value::Binary(text.as_bytes().to_vec()),
        PatternKind::Exact(expected) => {
            if expected.display_text() == text {
                expected.clone()
            } else {
                return Err(Failure::new(format!(
                    "Expected {}, got \"{}\"",
                    expected.quoted_text(),
                    text
                )));
            }
        }
        PatternKind::Enum { options } => match options.iter().find(|v| v.display_text() == text) {
            Some(found) => found.clone(),
            None => {
                let allowed: Vec<String> = options.iter().map(|v| v.quoted_text()).collect();
                return Err(Failure::new(format!(
                    "Expected one of [{}], got \"{}\"",
                    allowed.join(", "),
                    text
                )));
            }
        },
        PatternKind::AnyOf { options } => {
            let mut failures = Vec::new();
            for option in options {
                match parse_scalar_text(option, text, resolver) {
                    Ok(value) => return Ok(value),
                    Err(failure) => failures.push(failure),
                }
            }
            return Err(Failure::from_failures(failures));
        }
        PatternKind::Ref(name) => {
            let resolved = resolver
                .resolve(name)
                .map_err(|e| Failure::from_error(&e))?;
            return parse_scalar_text(&resolved, text, resolver);
        }
        PatternKind::InString(inner)
        | PatternKind::QueryScalar(inner)
        | PatternKind::RestOf(inner)
        | PatternKind::LookupRow { inner, .. } => return parse_scalar_text(inner, text, resolver),
        PatternKind::Csv(_) => Value::String(text.to_string()),
        // composite skeletons arrive as JSON text
        PatternKind::Object(_)
        | PatternKind::Array { .. }
        | PatternKind::ListOf(_)
        | PatternKind::Dictionary { .. }
        | PatternKind::Xml(_) => match serde_json::from_str::<serde_json::Value>(text) {
            Ok(json) => Value::from_json(&json),
            Err(_) => {
                return Err(Failure::new(format!(
                    "Expected {}, got \"{}\"",
                    pattern, text
                )))
            }
        },
    };

    match matches(pattern, &value, resolver) {
        MatchResult::Success => Ok(value),
        MatchResult::Failure(failure) => Err(failure),
    }
}
