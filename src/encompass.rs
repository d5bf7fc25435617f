//! Backward-compatibility checking between two schema versions
//!
//! `encompasses(older, newer, ...)` answers: is every value accepted by
//! `newer` also accepted by `older`? The check is structural and deliberately
//! asymmetric; the caller picks the direction. Each side resolves its named
//! references against its own resolver, and named pairs already on the type
//! stack are assumed compatible so mutually recursive schemas terminate.

use std::collections::HashSet;

use tracing::debug;

use crate::matching::matches;
use crate::pattern::{
    AdditionalProperties, NumberConstraints, ObjectPattern, Occurrence, Pattern, PatternKind,
    StringConstraints, XmlPattern,
};
use crate::resolver::Resolver;
use crate::results::{Failure, FailureReason, MatchResult};
use crate::value::Value;

/// Check that `older` structurally encompasses `newer`
pub fn encompasses(
    older: &Pattern,
    newer: &Pattern,
    older_resolver: &Resolver,
    newer_resolver: &Resolver,
    type_stack: &HashSet<(String, String)>,
) -> MatchResult {
    // each side resolves its references in its own registry
    if let PatternKind::Ref(name) = &older.kind {
        return match older_resolver.resolve(name) {
            Ok(resolved) => {
                encompasses(&resolved, newer, older_resolver, newer_resolver, type_stack)
            }
            Err(error) => MatchResult::Failure(Failure::from_error(&error)),
        };
    }
    if let PatternKind::Ref(name) = &newer.kind {
        return match newer_resolver.resolve(name) {
            Ok(resolved) => {
                encompasses(older, &resolved, older_resolver, newer_resolver, type_stack)
            }
            Err(error) => MatchResult::Failure(Failure::from_error(&error)),
        };
    }

    // named pairs already being compared are assumed compatible; anonymous
    // patterns always recurse structurally
    let extended;
    let type_stack = match (&older.type_alias, &newer.type_alias) {
        (Some(older_alias), Some(newer_alias)) => {
            let pair = (older_alias.clone(), newer_alias.clone());
            if type_stack.contains(&pair) {
                return MatchResult::Success;
            }
            debug!(older = %older_alias, newer = %newer_alias, "comparing named pair");
            let mut stack = type_stack.clone();
            stack.insert(pair);
            extended = stack;
            &extended
        }
        _ => type_stack,
    };

    // wrappers are transparent for compatibility purposes
    if let Some(inner) = unwrap(older) {
        return encompasses(inner, newer, older_resolver, newer_resolver, type_stack);
    }
    if let Some(inner) = unwrap(newer) {
        return encompasses(older, inner, older_resolver, newer_resolver, type_stack);
    }

    if matches!(older.kind, PatternKind::Anything) {
        return MatchResult::Success;
    }

    // a union on the newer side must have every option covered
    if let PatternKind::AnyOf { options } = &newer.kind {
        let results = options.iter().map(|option| {
            encompasses(older, option, older_resolver, newer_resolver, type_stack)
        });
        return MatchResult::from_results(results);
    }

    // an exact newer value narrows to a single value: older just has to match it
    if let PatternKind::Exact(value) = &newer.kind {
        if let PatternKind::Exact(expected) = &older.kind {
            return if expected == value {
                MatchResult::Success
            } else {
                fail(format!(
                    "Expected exactly {}, got {}",
                    expected.quoted_text(),
                    value.quoted_text()
                ))
            };
        }
        return matches(older, value, older_resolver);
    }

    // a union on the older side needs only one covering option
    if let PatternKind::AnyOf { options } = &older.kind {
        let mut failures = Vec::new();
        for option in options {
            match encompasses(option, newer, older_resolver, newer_resolver, type_stack) {
                MatchResult::Success => return MatchResult::Success,
                MatchResult::Failure(f) => failures.push(f),
            }
        }
        return MatchResult::Failure(Failure::from_failures(failures));
    }

    match (&older.kind, &newer.kind) {
        (PatternKind::Boolean, PatternKind::Boolean)
        | (PatternKind::Date, PatternKind::Date)
        | (PatternKind::DateTime, PatternKind::DateTime)
        | (PatternKind::Time, PatternKind::Time)
        | (PatternKind::Uuid, PatternKind::Uuid)
        | (PatternKind::Binary, PatternKind::Binary)
        | (PatternKind::EmptyString, PatternKind::EmptyString) => MatchResult::Success,

        (PatternKind::Url { scheme: older_scheme }, PatternKind::Url { scheme: newer_scheme }) => {
            match older_scheme {
                None => MatchResult::Success,
                Some(scheme) if newer_scheme.as_deref() == Some(scheme) => MatchResult::Success,
                Some(scheme) => fail(format!(
                    "Expected url with scheme {}, got {}",
                    scheme,
                    newer_scheme.as_deref().unwrap_or("any scheme")
                )),
            }
        }

        (PatternKind::Number(older_c), PatternKind::Number(newer_c)) => {
            encompasses_number(older_c, newer_c)
        }

        (PatternKind::Str(older_c), PatternKind::Str(newer_c)) => {
            encompasses_string(older_c, newer_c)
        }

        // an unconstrained string covers the formatted-string scalars
        (
            PatternKind::Str(older_c),
            PatternKind::Date
            | PatternKind::DateTime
            | PatternKind::Time
            | PatternKind::Uuid
            | PatternKind::Url { .. }
            | PatternKind::EmptyString,
        ) if older_c.regex.is_none()
            && older_c.min_length.is_none()
            && older_c.max_length.is_none() =>
        {
            MatchResult::Success
        }

        (PatternKind::Enum { options: older_o }, PatternKind::Enum { options: newer_o }) => {
            let missing: Vec<&Value> =
                newer_o.iter().filter(|v| !older_o.contains(v)).collect();
            if missing.is_empty() {
                MatchResult::Success
            } else {
                let rendered: Vec<String> = missing.iter().map(|v| v.quoted_text()).collect();
                fail(format!(
                    "Enum options {} are not in the older option set",
                    rendered.join(", ")
                ))
            }
        }

        (PatternKind::Enum { .. }, _) => {
            fail(format!("Expected one of the enum options, got {}", newer))
        }

        (PatternKind::Object(older_o), PatternKind::Object(newer_o)) => {
            encompasses_object(older_o, newer_o, older_resolver, newer_resolver, type_stack)
        }

        (PatternKind::ListOf(older_e), PatternKind::ListOf(newer_e)) => {
            encompasses(older_e, newer_e, older_resolver, newer_resolver, type_stack)
        }

        (PatternKind::ListOf(older_e), PatternKind::Array { elements }) => {
            MatchResult::from_results(elements.iter().enumerate().map(|(i, element)| {
                encompasses(older_e, element, older_resolver, newer_resolver, type_stack)
                    .breadcrumb(format!("[{}]", i))
            }))
        }

        (PatternKind::Array { elements: older_e }, PatternKind::Array { elements: newer_e }) => {
            encompasses_array(older_e, newer_e, older_resolver, newer_resolver, type_stack)
        }

        (
            PatternKind::Dictionary { key: older_k, value: older_v },
            PatternKind::Dictionary { key: newer_k, value: newer_v },
        ) => MatchResult::from_results(vec![
            encompasses(older_k, newer_k, older_resolver, newer_resolver, type_stack),
            encompasses(older_v, newer_v, older_resolver, newer_resolver, type_stack),
        ]),

        (PatternKind::Csv(older_e), PatternKind::Csv(newer_e)) => {
            encompasses(older_e, newer_e, older_resolver, newer_resolver, type_stack)
        }

        (PatternKind::Xml(older_x), PatternKind::Xml(newer_x)) => {
            encompasses_xml(older_x, newer_x, older_resolver, newer_resolver, type_stack)
        }

        (PatternKind::Exact(expected), _) => fail(format!(
            "Expected exactly {}, got the non-exact pattern {}",
            expected.quoted_text(),
            newer
        )),

        _ => fail(format!("Expected {}, got {}", older, newer)),
    }
}

fn fail(message: String) -> MatchResult {
    MatchResult::Failure(Failure::new(message))
}

/// Wrappers that do not change the set of accepted values
fn unwrap(pattern: &Pattern) -> Option<&Pattern> {
    match &pattern.kind {
        PatternKind::LookupRow { inner, .. }
        | PatternKind::InString(inner)
        | PatternKind::RestOf(inner)
        | PatternKind::QueryScalar(inner) => Some(inner),
        _ => None,
    }
}

fn encompasses_number(older: &NumberConstraints, newer: &NumberConstraints) -> MatchResult {
    let mut failures = Vec::new();

    if !older.is_float && newer.is_float {
        failures.push(Failure::new("Expected an integer, got a float pattern"));
    }
    if let Some(older_min) = older.minimum {
        match newer.minimum {
            Some(newer_min) if newer_min > older_min => {}
            Some(newer_min) if newer_min == older_min && newer.exclusive_min >= older.exclusive_min => {}
            _ => failures.push(Failure::new(format!(
                "minimum {} is looser than the older bound",
                bound_text(newer.minimum)
            ))),
        }
    }
    if let Some(older_max) = older.maximum {
        match newer.maximum {
            Some(newer_max) if newer_max < older_max => {}
            Some(newer_max) if newer_max == older_max && newer.exclusive_max >= older.exclusive_max => {}
            _ => failures.push(Failure::new(format!(
                "maximum {} is looser than the older bound",
                bound_text(newer.maximum)
            ))),
        }
    }
    if let Some(older_min) = older.min_digits {
        if newer.min_digits.map_or(true, |n| n < older_min) {
            failures.push(Failure::new("minDigits is looser than the older bound"));
        }
    }
    if let Some(older_max) = older.max_digits {
        if newer.max_digits.map_or(true, |n| n > older_max) {
            failures.push(Failure::new("maxDigits is looser than the older bound"));
        }
    }

    if failures.is_empty() {
        MatchResult::Success
    } else {
        MatchResult::Failure(Failure::from_failures(failures))
    }
}

fn bound_text(bound: Option<f64>) -> String {
    bound.map_or_else(|| "(absent)".to_string(), |b| b.to_string())
}

fn encompasses_string(older: &StringConstraints, newer: &StringConstraints) -> MatchResult {
    let mut failures = Vec::new();

    if let Some(older_min) = older.min_length {
        if newer.min_length.map_or(true, |n| n < older_min) {
            failures.push(Failure::new(format!(
                "minLength must be at least {}",
                older_min
            )));
        }
    }
    if let Some(older_max) = older.max_length {
        if newer.max_length.map_or(true, |n| n > older_max) {
            failures.push(Failure::new(format!(
                "maxLength must be at most {}",
                older_max
            )));
        }
    }
    if let Some(older_regex) = &older.regex {
        // regex subsumption is undecidable in general, so require equality
        if newer.regex.as_ref().map(|r| r.source()) != Some(older_regex.source()) {
            failures.push(Failure::new(format!(
                "regex {} is not carried by the newer pattern",
                older_regex.source()
            )));
        }
    }

    if failures.is_empty() {
        MatchResult::Success
    } else {
        MatchResult::Failure(Failure::from_failures(failures))
    }
}

fn permissiveness(additional: &AdditionalProperties) -> u8 {
    match additional {
        AdditionalProperties::None => 0,
        AdditionalProperties::ConstrainedBy(_) => 1,
        AdditionalProperties::FreeForm => 2,
    }
}

fn encompasses_object(
    older: &ObjectPattern,
    newer: &ObjectPattern,
    older_resolver: &Resolver,
    newer_resolver: &Resolver,
    type_stack: &HashSet<(String, String)>,
) -> MatchResult {
    let mut results = Vec::new();

    // a discriminator must agree by exact value before anything else
    if let Some(discriminator) = &older.discriminator {
        let older_value = exact_field_value(older, discriminator);
        let newer_value = exact_field_value(newer, discriminator);
        match (older_value, newer_value) {
            (Some(expected), Some(actual)) if expected == actual => {}
            (Some(expected), actual) => {
                return MatchResult::Failure(
                    Failure::with_reason(
                        format!(
                            "Discriminator expected {}, got {}",
                            expected.quoted_text(),
                            actual.map_or_else(
                                || "no exact value".to_string(),
                                |v| v.quoted_text()
                            )
                        ),
                        FailureReason::DiscriminatorMismatch,
                    )
                    .breadcrumb(discriminator.clone()),
                );
            }
            (None, _) => {}
        }
    }

    let newer_fields: Vec<(String, bool, &Pattern)> = newer
        .declared_fields()
        .map(|(_, clean, optional, p)| (clean.to_string(), optional, p))
        .collect();

    for (_, clean, older_optional, older_child) in older.declared_fields() {
        match newer_fields.iter().find(|(name, _, _)| name == clean) {
            Some((_, _, newer_child)) => {
                results.push(
                    encompasses(
                        older_child,
                        newer_child,
                        older_resolver,
                        newer_resolver,
                        type_stack,
                    )
                    .breadcrumb(clean),
                );
            }
            None if older_optional => {}
            None => {
                results.push(MatchResult::Failure(
                    Failure::with_reason(
                        format!("Key {} is missing from the newer schema", clean),
                        FailureReason::MissingKey,
                    )
                    .breadcrumb(clean),
                ));
            }
        }
    }

    if permissiveness(&newer.additional) > permissiveness(&older.additional) {
        results.push(fail(
            "additionalProperties policy is more permissive than the older schema".to_string(),
        ));
    }
    if let (
        AdditionalProperties::ConstrainedBy(older_extra),
        AdditionalProperties::ConstrainedBy(newer_extra),
    ) = (&older.additional, &newer.additional)
    {
        results.push(encompasses(
            older_extra,
            newer_extra,
            older_resolver,
            newer_resolver,
            type_stack,
        ));
    }

    if let Some(older_min) = older.min_properties {
        if newer.min_properties.map_or(true, |n| n < older_min) {
            results.push(fail(format!("minProperties must be at least {}", older_min)));
        }
    }
    if let Some(older_max) = older.max_properties {
        if newer.max_properties.map_or(true, |n| n > older_max) {
            results.push(fail(format!("maxProperties must be at most {}", older_max)));
        }
    }

    MatchResult::from_results(results)
}

fn exact_field_value<'a>(object: &'a ObjectPattern, key: &str) -> Option<&'a Value> {
    object
        .declared_fields()
        .find(|(_, clean, _, _)| *clean == key)
        .and_then(|(_, _, _, pattern)| match &pattern.kind {
            PatternKind::Exact(value) => Some(value),
            _ => None,
        })
}

fn encompasses_array(
    older: &[Pattern],
    newer: &[Pattern],
    older_resolver: &Resolver,
    newer_resolver: &Resolver,
    type_stack: &HashSet<(String, String)>,
) -> MatchResult {
    let older_rest = older.last().and_then(|p| match &p.kind {
        PatternKind::RestOf(inner) => Some(inner.as_ref()),
        _ => None,
    });

    match older_rest {
        None => {
            if older.len() != newer.len() {
                return fail(format!(
                    "Expected {} elements, got {}",
                    older.len(),
                    newer.len()
                ));
            }
            MatchResult::from_results(older.iter().zip(newer).enumerate().map(
                |(i, (older_e, newer_e))| {
                    encompasses(older_e, newer_e, older_resolver, newer_resolver, type_stack)
                        .breadcrumb(format!("[{}]", i))
                },
            ))
        }
        Some(rest) => {
            let fixed = older.len() - 1;
            if newer.len() < fixed {
                return fail(format!(
                    "Expected at least {} elements, got {}",
                    fixed,
                    newer.len()
                ));
            }
            let mut results = Vec::new();
            for (i, newer_e) in newer.iter().enumerate() {
                let older_e = if i < fixed { &older[i] } else { rest };
                results.push(
                    encompasses(older_e, newer_e, older_resolver, newer_resolver, type_stack)
                        .breadcrumb(format!("[{}]", i)),
                );
            }
            MatchResult::from_results(results)
        }
    }
}

fn occurrence_rank(occurrence: Occurrence) -> u8 {
    match occurrence {
        Occurrence::Once => 0,
        Occurrence::Optional => 1,
        Occurrence::Multiple => 2,
    }
}

fn encompasses_xml(
    older: &XmlPattern,
    newer: &XmlPattern,
    older_resolver: &Resolver,
    newer_resolver: &Resolver,
    type_stack: &HashSet<(String, String)>,
) -> MatchResult {
    if older.name != newer.name {
        return fail(format!(
            "Expected node {}, got {}",
            older.name, newer.name
        ));
    }
    let mut results = Vec::new();
    if occurrence_rank(newer.occurrence) > occurrence_rank(older.occurrence) {
        results.push(fail(format!(
            "Occurrence of {} is more permissive than the older schema",
            newer.name
        )));
    }
    if newer.nillable && !older.nillable {
        results.push(fail(format!(
            "Node {} must not be nillable",
            newer.name
        )));
    }
    for (name, older_attr) in &older.attributes {
        match newer.attributes.get(name) {
            Some(newer_attr) => results.push(
                encompasses(older_attr, newer_attr, older_resolver, newer_resolver, type_stack)
                    .breadcrumb(name.clone()),
            ),
            None => results.push(MatchResult::Failure(
                Failure::with_reason(
                    format!("Attribute {} is missing from the newer schema", name),
                    FailureReason::MissingKey,
                )
                .breadcrumb(name.clone()),
            )),
        }
    }
    if older.children.len() != newer.children.len() {
        results.push(fail(format!(
            "Expected {} children under {}, got {}",
            older.children.len(),
            older.name,
            newer.children.len()
        )));
    } else {
        for (i, (older_c, newer_c)) in older.children.iter().zip(&newer.children).enumerate() {
            results.push(
                encompasses(older_c, newer_c, older_resolver, newer_resolver, type_stack)
                    .breadcrumb(format!("[{}]", i)),
            );
        }
    }
    MatchResult::from_results(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn check(older: &Pattern, newer: &Pattern) -> MatchResult {
        let resolver = Resolver::new();
        encompasses(older, newer, &resolver, &resolver, &HashSet::new())
    }

    fn object(fields: Vec<(&str, Pattern)>) -> Pattern {
        let map: IndexMap<String, Pattern> = fields
            .into_iter()
            .map(|(k, p)| (k.to_string(), p))
            .collect();
        Pattern::object_of(map)
    }

    #[test]
    fn test_compatibility_is_asymmetric() {
        let older = object(vec![("id", Pattern::string()), ("name?", Pattern::string())]);
        let newer = object(vec![
            ("id", Pattern::string()),
            ("name", Pattern::string()),
            ("age", Pattern::number()),
        ]);

        // newer is a safe narrowing for consumers of older
        assert!(check(&older, &newer).is_success());
        // but older lacks the now-mandatory age
        let reverse = check(&newer, &older);
        let failure = reverse.failure().expect("reverse direction should fail");
        assert!(failure.has_reason(FailureReason::MissingKey));
        assert_eq!(failure.breadcrumb_path(), "age");
    }

    #[test]
    fn test_optional_age_makes_both_directions_succeed() {
        let older = object(vec![("id", Pattern::string()), ("name?", Pattern::string())]);
        let newer = object(vec![
            ("id", Pattern::string()),
            ("name", Pattern::string()),
            ("age?", Pattern::number()),
        ]);

        assert!(check(&older, &newer).is_success());
        assert!(check(&newer, &older).is_success());
    }

    #[test]
    fn test_newer_constraints_must_be_at_least_as_tight() {
        let older = Pattern::string_with(StringConstraints {
            min_length: Some(3),
            max_length: Some(10),
            regex: None,
        })
        .unwrap();

        let tighter = Pattern::string_with(StringConstraints {
            min_length: Some(5),
            max_length: Some(8),
            regex: None,
        })
        .unwrap();
        assert!(check(&older, &tighter).is_success());

        let looser = Pattern::string();
        let failure = check(&older, &looser).failure().cloned().expect("loosening fails");
        assert!(failure.report().contains("minLength"));
        assert!(failure.report().contains("maxLength"));
    }

    #[test]
    fn test_number_bound_loosening_names_the_bound() {
        let older = Pattern::number_with(NumberConstraints {
            minimum: Some(1.0),
            maximum: Some(100.0),
            ..Default::default()
        })
        .unwrap();
        let failure = check(&older, &Pattern::number())
            .failure()
            .cloned()
            .expect("unbounded number fails");
        assert!(failure.report().contains("minimum"));
        assert!(failure.report().contains("maximum"));
    }

    #[test]
    fn test_anyof_newer_requires_every_option_covered() {
        let older = Pattern::any_of(vec![Pattern::string(), Pattern::number()]);
        let covered = Pattern::any_of(vec![Pattern::number(), Pattern::string()]);
        assert!(check(&older, &covered).is_success());

        let uncovered = Pattern::any_of(vec![Pattern::string(), Pattern::boolean()]);
        assert!(!check(&older, &uncovered).is_success());

        // newer may narrow to a single option
        assert!(check(&older, &Pattern::number()).is_success());
        // but older must not
        assert!(!check(&Pattern::number(), &older).is_success());
    }

    #[test]
    fn test_exact_newer_is_matched_by_older() {
        assert!(check(&Pattern::string(), &Pattern::exact(Value::String("hi".to_string())))
            .is_success());
        assert!(!check(&Pattern::number(), &Pattern::exact(Value::String("hi".to_string())))
            .is_success());
    }

    #[test]
    fn test_enum_narrowing() {
        let older = Pattern::enum_of(vec![
            Value::String("red".to_string()),
            Value::String("green".to_string()),
            Value::String("blue".to_string()),
        ]);
        let narrower = Pattern::enum_of(vec![Value::String("red".to_string())]);
        assert!(check(&older, &narrower).is_success());

        let wider = Pattern::enum_of(vec![
            Value::String("red".to_string()),
            Value::String("purple".to_string()),
        ]);
        assert!(!check(&older, &wider).is_success());
    }

    #[test]
    fn test_discriminator_mismatch_is_distinguished() {
        let mut older_fields = IndexMap::new();
        older_fields.insert(
            "type".to_string(),
            Pattern::exact(Value::String("card".to_string())),
        );
        older_fields.insert("number".to_string(), Pattern::string());
        let older = Pattern {
            kind: PatternKind::Object(ObjectPattern {
                fields: older_fields,
                discriminator: Some("type".to_string()),
                ..Default::default()
            }),
            type_alias: None,
        };

        let newer = object(vec![
            ("type", Pattern::exact(Value::String("wallet".to_string()))),
            ("number", Pattern::string()),
        ]);

        let failure = check(&older, &newer).failure().cloned().expect("wrong variant");
        assert!(failure.has_reason(FailureReason::DiscriminatorMismatch));
    }

    #[test]
    fn test_additional_properties_must_not_loosen() {
        let closed = object(vec![("id", Pattern::string())]);
        let mut open = closed.clone();
        if let PatternKind::Object(o) = &mut open.kind {
            o.additional = AdditionalProperties::FreeForm;
        }

        assert!(check(&open, &closed).is_success());
        assert!(!check(&closed, &open).is_success());
    }

    #[test]
    fn test_mutually_recursive_named_schemas_terminate() {
        let mut fields = IndexMap::new();
        fields.insert("id".to_string(), Pattern::number());
        fields.insert("next?".to_string(), Pattern::reference("Node"));
        let node = Pattern::object_of(fields);

        let older_resolver =
            Resolver::with_patterns(vec![("Node".to_string(), node.clone())]);
        let newer_resolver = Resolver::with_patterns(vec![("Node".to_string(), node)]);

        let older = older_resolver.resolve("Node").unwrap();
        let newer = newer_resolver.resolve("Node").unwrap();
        let result = encompasses(
            &older,
            &newer,
            &older_resolver,
            &newer_resolver,
            &HashSet::new(),
        );
        assert!(result.is_success());
    }

    #[test]
    fn test_list_and_array_compatibility() {
        let older = Pattern::list_of(Pattern::number());
        let newer = Pattern::array(vec![Pattern::number(), Pattern::number()]);
        assert!(check(&older, &newer).is_success());

        let bad = Pattern::array(vec![Pattern::number(), Pattern::string()]);
        let failure = check(&older, &bad).failure().cloned().expect("string element fails");
        assert_eq!(failure.breadcrumb_path(), "[1]");
    }
}
