use std::collections::HashSet;

use indexmap::IndexMap;
use proptest::prelude::*;

use stencil::{
    encompasses, generate, matches, negative_based_on, new_based_on, parse_scalar_text,
    CombinationSpec, MatchResult, NegativeStrategy, Pattern, PatternKind, Resolver, Row,
    StringConstraints, Value,
};

fn object(fields: Vec<(&str, Pattern)>) -> Pattern {
    let map: IndexMap<String, Pattern> = fields
        .into_iter()
        .map(|(k, p)| (k.to_string(), p))
        .collect();
    Pattern::object_of(map)
}

/// Helper: register a schema and hand back the aliased root
fn registered(name: &str, pattern: Pattern) -> (Pattern, Resolver) {
    let resolver = Resolver::with_patterns(vec![(name.to_string(), pattern)]);
    let root = resolver.resolve(name).expect("just registered");
    (root, resolver)
}

#[test]
fn test_scalar_round_trip() {
    let resolver = Resolver::new();
    let patterns = vec![
        Pattern::boolean(),
        Pattern::number(),
        Pattern::string(),
        Pattern::date(),
        Pattern::datetime(),
        Pattern::time(),
        Pattern::uuid(),
        Pattern::string_with(StringConstraints {
            min_length: Some(3),
            max_length: Some(12),
            regex: None,
        })
        .unwrap(),
    ];

    for pattern in patterns {
        let generated = generate(&pattern, &resolver).expect("generation should succeed");
        assert!(
            matches(&pattern, &generated, &resolver).is_success(),
            "generated value {:?} should match {}",
            generated,
            pattern
        );

        // serialize to literal text and parse back
        let text = generated.display_text();
        let reparsed =
            parse_scalar_text(&pattern, &text, &resolver).expect("literal should parse back");
        assert!(matches(&pattern, &reparsed, &resolver).is_success());
    }
}

#[test]
fn test_full_positive_workflow() {
    let address = object(vec![
        ("street", Pattern::string()),
        ("city", Pattern::string()),
    ]);
    let customer = object(vec![
        ("id", Pattern::number()),
        ("name", Pattern::string()),
        ("address", Pattern::reference("Address")),
        ("nickname?", Pattern::string()),
    ]);
    let resolver = Resolver::with_patterns(vec![
        ("Address".to_string(), address),
        ("Customer".to_string(), customer),
    ]);
    let root = resolver.resolve("Customer").unwrap();

    let row = Row::new("example").with_entry("name", "Jill");
    let variants: Vec<_> = new_based_on(&root, &row, &resolver).collect();
    assert!(!variants.is_empty());

    // every derived variant generates a value the original schema accepts
    for variant in &variants {
        let pattern = variant.value().expect("positive variants are values");
        let value = generate(pattern, &resolver).expect("variant should generate");
        let result = matches(&root, &value, &resolver);
        assert!(
            result.is_success(),
            "{:?} rejected: {:?}",
            value,
            result.failure().map(|f| f.report())
        );

        // the row-steered field came through
        if let (PatternKind::Object(_), Value::Object(map)) = (&pattern.kind, &value) {
            assert_eq!(map.get("name"), Some(&Value::String("Jill".to_string())));
        }
    }
}

#[test]
fn test_full_negative_workflow() {
    let order = object(vec![
        ("id", Pattern::number()),
        (
            "status",
            Pattern::enum_of(vec![
                Value::String("placed".to_string()),
                Value::String("shipped".to_string()),
            ]),
        ),
    ]);
    let (root, resolver) = registered("Order", order);

    let variants: Vec<_> =
        negative_based_on(&root, &Row::new("neg"), &resolver, NegativeStrategy::All).collect();
    assert!(!variants.is_empty());

    for variant in variants {
        let pattern = variant.value().expect("negative variants are values");
        let value = generate(pattern, &resolver).expect("variant should generate");
        assert!(
            !matches(&root, &value, &resolver).is_success(),
            "negative value {:?} was accepted",
            value
        );
    }
}

#[test]
fn test_all_or_nothing_optional_keys() {
    let pattern = object(vec![
        ("id", Pattern::number()),
        ("nickname?", Pattern::string()),
        ("age?", Pattern::number()),
        ("email?", Pattern::string()),
    ]);
    let resolver = Resolver::new();

    let variants: Vec<_> = new_based_on(&pattern, &Row::new("t"), &resolver).collect();
    let mut saw_all = false;
    let mut saw_mandatory_only = false;
    for variant in variants.iter().filter_map(|v| v.value()) {
        let PatternKind::Object(o) = &variant.kind else {
            panic!("expected object variant");
        };
        let optional_count = o.fields.keys().filter(|k| *k != "id").count();
        match optional_count {
            0 => saw_mandatory_only = true,
            3 => saw_all = true,
            n => panic!("variant with {} of 3 optional keys violates all-or-nothing", n),
        }
    }
    assert!(saw_all && saw_mandatory_only);
}

#[test]
fn test_combination_cap_with_lockstep_prefix() {
    let spec = CombinationSpec::new(vec![("a", vec![1, 2, 3]), ("b", vec![10, 20])], 4).unwrap();
    let combos: Vec<_> = spec.combinations().collect();

    assert_eq!(combos.len(), 4);
    assert_eq!(combos[0]["a"], 1);
    assert_eq!(combos[0]["b"], 10);
    assert_eq!(combos[1]["a"], 2);
    assert_eq!(combos[1]["b"], 20);
}

#[test]
fn test_compatibility_asymmetry() {
    let older = object(vec![("id", Pattern::string()), ("name?", Pattern::string())]);
    let newer = object(vec![
        ("id", Pattern::string()),
        ("name", Pattern::string()),
        ("age", Pattern::number()),
    ]);
    let resolver = Resolver::new();

    let forward = encompasses(&older, &newer, &resolver, &resolver, &HashSet::new());
    assert!(forward.is_success());

    let backward = encompasses(&newer, &older, &resolver, &resolver, &HashSet::new());
    match backward {
        MatchResult::Failure(failure) => {
            assert_eq!(failure.breadcrumb_path(), "age");
        }
        MatchResult::Success => panic!("older must not encompass newer with mandatory age"),
    }

    // an optional age removes the obstacle in both directions
    let relaxed = object(vec![
        ("id", Pattern::string()),
        ("name", Pattern::string()),
        ("age?", Pattern::number()),
    ]);
    assert!(encompasses(&older, &relaxed, &resolver, &resolver, &HashSet::new()).is_success());
    assert!(encompasses(&relaxed, &older, &resolver, &resolver, &HashSet::new()).is_success());
}

#[test]
fn test_cycle_termination_across_operations() {
    let node = object(vec![
        ("id", Pattern::number()),
        ("next?", Pattern::reference("Node")),
    ]);
    let (root, resolver) = registered("Node", node);

    // generation terminates
    let value = generate(&root, &resolver).expect("optional self-reference terminates");
    assert!(matches(&root, &value, &resolver).is_success());

    // positive derivation yields a finite, non-empty sequence
    let variants: Vec<_> = new_based_on(&root, &Row::new("t"), &resolver).collect();
    assert!(!variants.is_empty());
    assert!(variants.iter().any(|v| v.is_value()));

    // a mandatory self-reference with no escape fails loudly instead
    let strict = object(vec![
        ("id", Pattern::number()),
        ("next", Pattern::reference("Strict")),
    ]);
    let (strict_root, strict_resolver) = registered("Strict", strict);
    let error = generate(&strict_root, &strict_resolver).expect_err("must not hang");
    assert!(matches!(
        error,
        stencil::EngineError::UnboundedRecursion { .. }
    ));
}

#[test]
fn test_breadcrumbs_pinpoint_nested_failures() {
    let pattern = object(vec![("a", object(vec![("b", Pattern::string())]))]);
    let resolver = Resolver::new();

    let mut inner = IndexMap::new();
    inner.insert("b".to_string(), Value::Int(5));
    let mut outer = IndexMap::new();
    outer.insert("a".to_string(), Value::Object(inner));

    let result = matches(&pattern, &Value::Object(outer), &resolver);
    let failure = result.failure().expect("5 is not a string");
    assert_eq!(failure.breadcrumb_path(), "a.b");

    // list elements use the index form
    let list_pattern = Pattern::list_of(Pattern::number());
    let result = matches(
        &list_pattern,
        &Value::List(vec![Value::String("x".to_string())]),
        &resolver,
    );
    let failure = result.failure().expect("string element fails");
    assert_eq!(failure.breadcrumb_path(), "[0]");
}

#[test]
fn test_row_json_body_steers_nested_fields() {
    let pattern = object(vec![
        ("id", Pattern::number()),
        ("address", object(vec![("city", Pattern::string())])),
    ]);
    let resolver = Resolver::new();
    let row = Row::from_json_text("nested", r#"{"id": 9, "address": {"city": "Pune"}}"#)
        .expect("valid JSON body");

    let variants: Vec<_> = new_based_on(&pattern, &row, &resolver).collect();
    let variant = variants[0].value().expect("first variant is a value");
    let PatternKind::Object(o) = &variant.kind else {
        panic!("expected object variant");
    };
    assert_eq!(o.fields["id"], Pattern::exact(Value::Int(9)));
    let PatternKind::Object(address) = &o.fields["address"].kind else {
        panic!("expected nested object variant");
    };
    assert_eq!(
        address.fields["city"],
        Pattern::exact(Value::String("Pune".to_string()))
    );
}

proptest! {
    #[test]
    fn prop_integers_round_trip_through_literals(n in any::<i64>()) {
        let resolver = Resolver::new();
        let pattern = Pattern::number();
        let parsed = parse_scalar_text(&pattern, &n.to_string(), &resolver)
            .expect("integer literal parses");
        prop_assert_eq!(&parsed, &Value::Int(n));
        prop_assert!(matches(&pattern, &parsed, &resolver).is_success());
    }

    #[test]
    fn prop_generated_strings_respect_length_bounds(min in 0usize..8, extra in 0usize..8) {
        let resolver = Resolver::new();
        let pattern = Pattern::string_with(StringConstraints {
            min_length: Some(min),
            max_length: Some(min + extra),
            regex: None,
        })
        .unwrap();
        let value = generate(&pattern, &resolver).expect("bounded string generates");
        prop_assert!(matches(&pattern, &value, &resolver).is_success());
    }
}
