//! Runtime value model for the pattern engine
//!
//! A closed set of value variants covering everything a contract payload can
//! hold: JSON scalars and composites, XML nodes, raw binary, and the two
//! "nothing" states (explicit null versus no value at all). Values are
//! immutable once constructed.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// A concrete runtime value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Binary(Vec<u8>),
    List(Vec<Value>),
    Object(IndexMap<String, Value>),
    Xml(XmlValue),
    /// The absence of any value (distinct from an explicit null)
    Empty,
}

/// An XML element: name, attributes, and child values
///
/// Children are either `Value::String` text nodes or nested `Value::Xml`
/// elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XmlValue {
    pub name: String,
    pub attributes: IndexMap<String, String>,
    pub children: Vec<Value>,
}

impl XmlValue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: IndexMap::new(),
            children: Vec::new(),
        }
    }
}

impl Value {
    /// Human-readable kind name used in mismatch messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "number",
            Value::Float(_) => "number",
            Value::String(_) => "string",
            Value::Binary(_) => "binary",
            Value::List(_) => "list",
            Value::Object(_) => "object",
            Value::Xml(_) => "xml",
            Value::Empty => "nothing",
        }
    }

    /// True for the variants a nullable union treats as null
    pub fn is_null_like(&self) -> bool {
        matches!(self, Value::Null | Value::Empty)
    }

    /// Canonical literal text, as used in diagnostics and when a transport
    /// stringifies a payload
    pub fn display_text(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::Binary(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            Value::List(_) | Value::Object(_) => self
                .to_json()
                .map(|j| j.to_string())
                .unwrap_or_else(|_| format!("{:?}", self)),
            Value::Xml(xml) => render_xml(xml),
            Value::Empty => String::new(),
        }
    }

    /// Quoted form for mismatch messages: strings get quotes, the rest render
    /// as their literal text
    pub fn quoted_text(&self) -> String {
        match self {
            Value::String(s) => format!("\"{}\"", s),
            _ => self.display_text(),
        }
    }

    /// Convert from a parsed JSON document
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::List(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert to a JSON document
    ///
    /// `Empty` has no JSON form; `Binary` and `Xml` round-trip as strings.
    pub fn to_json(&self) -> Result<serde_json::Value, EngineError> {
        Ok(match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::Number((*i).into()),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .ok_or(EngineError::JsonUnrepresentable("non-finite float"))?,
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Binary(bytes) => {
                serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned())
            }
            Value::List(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(|v| v.to_json())
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), v.to_json()?)))
                    .collect::<Result<serde_json::Map<_, _>, EngineError>>()?,
            ),
            Value::Xml(xml) => serde_json::Value::String(render_xml(xml)),
            Value::Empty => return Err(EngineError::JsonUnrepresentable("empty")),
        })
    }

    /// Numeric view used by range checks (integers widen to f64)
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }
}

fn render_xml(xml: &XmlValue) -> String {
    let mut out = String::new();
    out.push('<');
    out.push_str(&xml.name);
    for (k, v) in &xml.attributes {
        out.push_str(&format!(" {}=\"{}\"", k, v));
    }
    if xml.children.is_empty() {
        out.push_str("/>");
        return out;
    }
    out.push('>');
    for child in &xml.children {
        out.push_str(&child.display_text());
    }
    out.push_str(&format!("</{}>", xml.name));
    out
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_text())
    }
}
