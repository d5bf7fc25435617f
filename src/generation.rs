//! Example-value synthesis
//!
//! `generate` is total for any well-formed pattern: scalars synthesize random
//! representatives honoring their constraints, composites generate each child
//! independently. Recursion into named patterns is bounded by cycle markers
//! on the resolver — when a marker for the same `(alias, field)` descent is
//! already present, the optional enclosing field is omitted, a nullable union
//! substitutes null, and anything else fails loudly as unbounded recursion.
//! Depth counters are deliberately not used: they would silently change the
//! shape of generated data for deep-but-finite schemas.

use chrono::{Duration, SecondsFormat, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use regex_syntax::hir::{Class, Hir, HirKind};
use tracing::debug;

use crate::error::EngineError;
use crate::matching::matches;
use crate::pattern::{
    NumberConstraints, ObjectPattern, Occurrence, Pattern, PatternKind, StringConstraints,
    XmlPattern,
};
use crate::resolver::Resolver;
use crate::value::{Value, XmlValue};

/// Internal outcome: a cycle hit travels up until an optional field or a
/// nullable union absorbs it
enum GenFailure {
    Cycle { alias: String },
    Error(EngineError),
}

impl From<EngineError> for GenFailure {
    fn from(error: EngineError) -> Self {
        GenFailure::Error(error)
    }
}

/// Synthesize a representative value for the pattern
pub fn generate(pattern: &Pattern, resolver: &Resolver) -> Result<Value, EngineError> {
    debug!(pattern = %pattern, "generating value");
    match generate_inner(pattern, "", "", resolver) {
        Ok(value) => Ok(value),
        Err(GenFailure::Error(error)) => Err(error),
        Err(GenFailure::Cycle { alias }) => Err(EngineError::UnboundedRecursion {
            alias,
            path: String::new(),
        }),
    }
}

fn child_path(path: &str, field: &str) -> String {
    if path.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", path, field)
    }
}

fn generate_inner(
    pattern: &Pattern,
    field: &str,
    path: &str,
    resolver: &Resolver,
) -> Result<Value, GenFailure> {
    // example overrides win over synthesis, after a conformance check
    if !path.is_empty() {
        if let Some(example) = resolver.example_for(path) {
            return match matches(pattern, example, resolver) {
                crate::results::MatchResult::Success => Ok(example.clone()),
                crate::results::MatchResult::Failure(failure) => {
                    Err(GenFailure::Error(EngineError::InvalidExample {
                        path: path.to_string(),
                        report: failure.report(),
                    }))
                }
            };
        }
    }

    // named patterns consult the cycle markers before descending
    let derived;
    let resolver = if let Some(alias) = &pattern.type_alias {
        if resolver.has_seen(alias, field) {
            debug!(alias, field, "cycle marker hit");
            return Err(GenFailure::Cycle {
                alias: alias.clone(),
            });
        }
        derived = resolver.with_cycle_marker(alias, field);
        &derived
    } else {
        resolver
    };

    let mut rng = rand::thread_rng();
    match &pattern.kind {
        PatternKind::Boolean => Ok(Value::Bool(rng.gen())),
        PatternKind::Number(constraints) => Ok(generate_number(constraints, &mut rng)?),
        PatternKind::Str(constraints) => Ok(generate_string(constraints, &mut rng)?),
        PatternKind::Date => {
            let date = Utc::now().date_naive() + Duration::days(rng.gen_range(-300..300));
            Ok(Value::String(date.format("%Y-%m-%d").to_string()))
        }
        PatternKind::DateTime => {
            let instant = Utc::now() + Duration::seconds(rng.gen_range(-2_592_000..2_592_000));
            Ok(Value::String(
                instant.to_rfc3339_opts(SecondsFormat::Secs, true),
            ))
        }
        PatternKind::Time => Ok(Value::String(format!(
            "{:02}:{:02}:{:02}",
            rng.gen_range(0..24),
            rng.gen_range(0..60),
            rng.gen_range(0..60)
        ))),
        PatternKind::Uuid => Ok(Value::String(uuid::Uuid::new_v4().to_string())),
        PatternKind::Url { scheme } => {
            let scheme = scheme.as_deref().unwrap_or("https");
            Ok(Value::String(format!(
                "{}://example.com/{}",
                scheme,
                random_word(&mut rng, 8)
            )))
        }
        PatternKind::EmptyString => Ok(Value::String(String::new())),
        PatternKind::Binary => {
            let len = rng.gen_range(8..=16);
            Ok(Value::Binary((0..len).map(|_| rng.gen()).collect()))
        }
        PatternKind::Anything => Ok(Value::String(random_word(&mut rng, 10))),
        PatternKind::Object(object) => generate_object(object, path, resolver, &mut rng),
        PatternKind::Array { elements } => {
            let mut items = Vec::new();
            for (i, element) in elements.iter().enumerate() {
                let slot = format!("[{}]", i);
                if let PatternKind::RestOf(inner) = &element.kind {
                    for _ in 0..rng.gen_range(1..=2) {
                        items.push(generate_inner(inner, &slot, &child_path(path, &slot), resolver)?);
                    }
                } else {
                    items.push(generate_inner(element, &slot, &child_path(path, &slot), resolver)?);
                }
            }
            Ok(Value::List(items))
        }
        PatternKind::ListOf(element) => {
            let len = rng.gen_range(1..=3);
            let mut items = Vec::new();
            for i in 0..len {
                let slot = format!("[{}]", i);
                items.push(generate_inner(element, &slot, &child_path(path, &slot), resolver)?);
            }
            Ok(Value::List(items))
        }
        PatternKind::Xml(xml) => generate_xml(xml, path, resolver, &mut rng),
        PatternKind::Dictionary { key, value } => {
            let mut map = indexmap::IndexMap::new();
            for _ in 0..rng.gen_range(1..=3) {
                let k = generate_inner(key, field, path, resolver)?.display_text();
                let v = generate_inner(value, &k.clone(), &child_path(path, &k), resolver)?;
                map.insert(k, v);
            }
            Ok(Value::Object(map))
        }
        PatternKind::Csv(element) => {
            let parts: Result<Vec<String>, GenFailure> = (0..rng.gen_range(1..=3))
                .map(|_| Ok(generate_inner(element, field, path, resolver)?.display_text()))
                .collect();
            Ok(Value::String(parts?.join(",")))
        }
        PatternKind::AnyOf { options } => {
            if options.is_empty() {
                return Err(GenFailure::Error(EngineError::InconsistentBounds(
                    "anyOf with no options".to_string(),
                )));
            }
            let chosen = options.choose(&mut rng).expect("options is non-empty");
            match generate_inner(chosen, field, path, resolver) {
                Ok(value) => Ok(value),
                Err(GenFailure::Cycle { alias }) => {
                    // a nullable union escapes recursion by substituting null
                    if options.iter().any(|o| o.is_null_like()) {
                        Ok(Value::Null)
                    } else {
                        Err(GenFailure::Cycle { alias })
                    }
                }
                Err(other) => Err(other),
            }
        }
        PatternKind::Enum { options } => options
            .choose(&mut rng)
            .cloned()
            .ok_or_else(|| {
                GenFailure::Error(EngineError::InconsistentBounds(
                    "enum with no options".to_string(),
                ))
            }),
        PatternKind::Exact(value) => Ok(value.clone()),
        PatternKind::Ref(name) => {
            let resolved = resolver.resolve(name)?;
            generate_inner(&resolved, field, path, resolver)
        }
        PatternKind::LookupRow { inner, .. } => generate_inner(inner, field, path, resolver),
        PatternKind::InString(inner) => {
            let value = generate_inner(inner, field, path, resolver)?;
            Ok(Value::String(value.display_text()))
        }
        PatternKind::RestOf(inner) => generate_inner(inner, field, path, resolver),
        PatternKind::QueryScalar(inner) => {
            let value = generate_inner(inner, field, path, resolver)?;
            Ok(Value::String(value.display_text()))
        }
    }
}

fn generate_object(
    object: &ObjectPattern,
    path: &str,
    resolver: &Resolver,
    rng: &mut impl Rng,
) -> Result<Value, GenFailure> {
    let mandatory: Vec<(&str, &Pattern)> = object
        .declared_fields()
        .filter(|(_, _, optional, _)| !optional)
        .map(|(_, clean, _, p)| (clean, p))
        .collect();
    let optionals: Vec<(&str, &Pattern)> = object
        .declared_fields()
        .filter(|(_, _, optional, _)| *optional)
        .map(|(_, clean, _, p)| (clean, p))
        .collect();

    if let Some(max) = object.max_properties {
        if mandatory.len() > max {
            return Err(GenFailure::Error(EngineError::InconsistentBounds(format!(
                "{} mandatory properties cannot satisfy maxProperties {}",
                mandatory.len(),
                max
            ))));
        }
    }

    // pick which optional keys to include before generating anything
    let mut included: Vec<(bool, &str, &Pattern)> =
        mandatory.iter().map(|(k, p)| (false, *k, *p)).collect();
    let mut remaining: Vec<(&str, &Pattern)> = Vec::new();
    for (key, child) in optionals.iter().copied() {
        if resolver.all_patterns_mandatory() || rng.gen_bool(0.5) {
            included.push((true, key, child));
        } else {
            remaining.push((key, child));
        }
    }
    if let Some(min) = object.min_properties {
        while included.len() < min {
            match remaining.pop() {
                Some((key, child)) => included.push((true, key, child)),
                None => {
                    return Err(GenFailure::Error(EngineError::InconsistentBounds(format!(
                        "cannot reach minProperties {} with {} declared properties",
                        min,
                        included.len()
                    ))))
                }
            }
        }
    }
    if let Some(max) = object.max_properties {
        while included.len() > max {
            match included.iter().rposition(|(optional, _, _)| *optional) {
                Some(i) => {
                    included.remove(i);
                }
                None => break,
            }
        }
    }

    let mut map = indexmap::IndexMap::new();
    for (optional, key, child) in included {
        match generate_inner(child, key, &child_path(path, key), resolver) {
            Ok(value) => {
                map.insert(key.to_string(), value);
            }
            // a recursive branch under an optional key is simply omitted
            Err(GenFailure::Cycle { .. }) if optional => {}
            Err(GenFailure::Cycle { alias }) => {
                return Err(GenFailure::Error(EngineError::UnboundedRecursion {
                    alias,
                    path: child_path(path, key),
                }))
            }
            Err(other) => return Err(other),
        }
    }
    Ok(Value::Object(map))
}

fn generate_xml(
    xml: &XmlPattern,
    path: &str,
    resolver: &Resolver,
    rng: &mut impl Rng,
) -> Result<Value, GenFailure> {
    let mut node = XmlValue::new(xml.name.clone());
    for (name, pattern) in &xml.attributes {
        let value = generate_inner(pattern, name, &child_path(path, name), resolver)?;
        node.attributes.insert(name.clone(), value.display_text());
    }
    match xml.occurrence {
        Occurrence::Multiple => {
            if let Some(child) = xml.children.first() {
                for i in 0..rng.gen_range(1..=2) {
                    let slot = format!("[{}]", i);
                    node.children
                        .push(generate_inner(child, &slot, &child_path(path, &slot), resolver)?);
                }
            }
        }
        Occurrence::Optional if rng.gen_bool(0.5) => {}
        _ => {
            for (i, child) in xml.children.iter().enumerate() {
                let slot = format!("[{}]", i);
                node.children
                    .push(generate_inner(child, &slot, &child_path(path, &slot), resolver)?);
            }
        }
    }
    Ok(Value::Xml(node))
}

// i64::MAX has 19 decimal digits
const MAX_I64_DIGITS: usize = 19;

fn generate_number(
    constraints: &NumberConstraints,
    rng: &mut impl Rng,
) -> Result<Value, EngineError> {
    // digit-count constraints take precedence over plain range bounds
    if constraints.min_digits.is_some() || constraints.max_digits.is_some() {
        let min_digits = constraints.min_digits.unwrap_or(1).max(1);
        if min_digits > MAX_I64_DIGITS {
            return Err(EngineError::InconsistentBounds(format!(
                "minDigits {} exceeds the {} digits of a 64-bit integer",
                min_digits, MAX_I64_DIGITS
            )));
        }
        let max_digits = constraints
            .max_digits
            .unwrap_or(min_digits.max(3))
            .max(min_digits)
            .min(MAX_I64_DIGITS);
        let digits = rng.gen_range(min_digits..=max_digits) as u32;
        let low = 10_i64.pow(digits - 1);
        // 10^19 overflows, so a 19-digit magnitude tops out at i64::MAX
        let high = 10_i64.checked_pow(digits).map_or(i64::MAX, |p| p - 1);
        let magnitude = rng.gen_range(low..=high);
        return Ok(if constraints.is_float {
            Value::Float(magnitude as f64)
        } else {
            Value::Int(magnitude)
        });
    }

    if constraints.is_float {
        let low = constraints.minimum.unwrap_or(1.0);
        let high = constraints.maximum.unwrap_or(low + 999.0);
        if low >= high {
            if constraints.exclusive_min || constraints.exclusive_max || low > high {
                return Err(EngineError::InconsistentBounds(format!(
                    "no float lies strictly between {} and {}",
                    low, high
                )));
            }
            return Ok(Value::Float(low));
        }
        // sample the interior of the interval so exclusive bounds always hold
        let sample = low + (high - low) * rng.gen_range(0.25..=0.75);
        if (constraints.exclusive_min && sample <= low)
            || (constraints.exclusive_max && sample >= high)
        {
            return Err(EngineError::InconsistentBounds(format!(
                "no float lies strictly between {} and {}",
                low, high
            )));
        }
        return Ok(Value::Float(sample));
    }

    // first and last admissible integers, exclusive bounds stepped inward
    let low = match constraints.minimum {
        Some(min) if constraints.exclusive_min => min.floor() as i64 + 1,
        Some(min) => min.ceil() as i64,
        None => 1,
    };
    let high = match constraints.maximum {
        Some(max) if constraints.exclusive_max => max.ceil() as i64 - 1,
        Some(max) => max.floor() as i64,
        None => low + 999,
    };
    if high < low {
        return Err(EngineError::InconsistentBounds(format!(
            "no integer satisfies minimum {} and maximum {}",
            constraints.minimum.unwrap_or(low as f64),
            constraints.maximum.unwrap_or(high as f64),
        )));
    }
    Ok(Value::Int(rng.gen_range(low..=high)))
}

fn generate_string(
    constraints: &StringConstraints,
    rng: &mut impl Rng,
) -> Result<Value, GenFailure> {
    if let Some(regex) = &constraints.regex {
        let text = generate_from_regex(regex.source(), rng)?;
        return Ok(Value::String(text));
    }
    let min = constraints.min_length.unwrap_or(5);
    let max = constraints.max_length.unwrap_or(min + 15).max(min);
    let len = rng.gen_range(min..=max);
    Ok(Value::String(random_word(rng, len)))
}

fn random_word(rng: &mut impl Rng, len: usize) -> String {
    const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
    (0..len)
        .map(|_| LETTERS[rng.gen_range(0..LETTERS.len())] as char)
        .collect()
}

/// Regex-directed generation: walk the parsed HIR and emit a matching string
fn generate_from_regex(source: &str, rng: &mut impl Rng) -> Result<String, GenFailure> {
    let hir = regex_syntax::Parser::new()
        .parse(source)
        .map_err(|e| EngineError::MalformedRegex {
            pattern: source.to_string(),
            detail: e.to_string(),
        })?;
    let mut out = String::new();
    emit_hir(&hir, rng, &mut out);
    Ok(out)
}

fn emit_hir(hir: &Hir, rng: &mut impl Rng, out: &mut String) {
    match hir.kind() {
        HirKind::Empty | HirKind::Look(_) => {}
        HirKind::Literal(literal) => {
            out.push_str(&String::from_utf8_lossy(&literal.0));
        }
        HirKind::Class(class) => {
            if let Some(c) = random_class_char(class, rng) {
                out.push(c);
            }
        }
        HirKind::Repetition(rep) => {
            // unbounded repetitions are sampled, never materialized
            let min = rep.min;
            let max = rep.max.unwrap_or(min + 3).max(min);
            let count = rng.gen_range(min..=max);
            for _ in 0..count {
                emit_hir(&rep.sub, rng, out);
            }
        }
        HirKind::Capture(capture) => emit_hir(&capture.sub, rng, out),
        HirKind::Concat(parts) => {
            for part in parts {
                emit_hir(part, rng, out);
            }
        }
        HirKind::Alternation(options) => {
            if let Some(option) = options.choose(rng) {
                emit_hir(option, rng, out);
            }
        }
    }
}

fn random_class_char(class: &Class, rng: &mut impl Rng) -> Option<char> {
    match class {
        Class::Unicode(unicode) => {
            let ranges = unicode.ranges();
            let range = ranges.get(rng.gen_range(0..ranges.len().max(1)))?;
            let cp = rng.gen_range(range.start() as u32..=range.end() as u32);
            // skip the surrogate gap
            char::from_u32(cp).or(Some(range.start()))
        }
        Class::Bytes(bytes) => {
            let ranges = bytes.ranges();
            let range = ranges.get(rng.gen_range(0..ranges.len().max(1)))?;
            Some(rng.gen_range(range.start()..=range.end()) as char)
        }
    }
}
