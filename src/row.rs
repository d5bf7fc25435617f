//! Example rows supplied per test scenario
//!
//! A row carries flat column/value pairs and optionally a parsed JSON example
//! body. File and variable indirections are resolved by the ingestion
//! collaborator before a row reaches this engine; a column that still reports
//! itself unresolved is a configuration error. Rows are read-only during
//! pattern operations: traversal narrows them with `step_into_field` /
//! `step_into_list`, each producing a new row and never mutating the parent.

use anyhow::Context;
use indexmap::IndexMap;

use crate::error::EngineError;
use crate::value::Value;

/// A column value: either a resolved literal or a reference the ingestion
/// collaborator failed to resolve
#[derive(Debug, Clone, PartialEq)]
pub enum RowValue {
    Literal(String),
    Unresolved(String),
}

/// Example data for one test scenario
#[derive(Debug, Clone, Default)]
pub struct Row {
    pub name: String,
    entries: IndexMap<String, RowValue>,
    json_body: Option<Value>,
}

impl Row {
    pub fn new(name: impl Into<String>) -> Self {
        Row {
            name: name.into(),
            entries: IndexMap::new(),
            json_body: None,
        }
    }

    pub fn with_entry(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries
            .insert(column.into(), RowValue::Literal(value.into()));
        self
    }

    pub fn with_unresolved(
        mut self,
        column: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        self.entries
            .insert(column.into(), RowValue::Unresolved(reference.into()));
        self
    }

    pub fn with_json_body(mut self, body: Value) -> Self {
        self.json_body = Some(body);
        self
    }

    /// Parse a JSON example body from text (boundary helper for callers)
    pub fn from_json_text(name: impl Into<String>, text: &str) -> anyhow::Result<Row> {
        let json: serde_json::Value =
            serde_json::from_str(text).context("Failed to parse row example body")?;
        Ok(Row::new(name).with_json_body(Value::from_json(&json)))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.json_body.is_none()
    }

    pub fn json_body(&self) -> Option<&Value> {
        self.json_body.as_ref()
    }

    /// True if the row supplies a value for the given (clean) field name
    pub fn contains(&self, field: &str) -> bool {
        self.entries.contains_key(field)
    }

    /// Names of every column the row forces a value for
    pub fn forced_fields(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    /// Literal text for a column; an unresolved reference is an error
    pub fn literal(&self, field: &str) -> Result<Option<&str>, EngineError> {
        match self.entries.get(field) {
            None => Ok(None),
            Some(RowValue::Literal(text)) => Ok(Some(text)),
            Some(RowValue::Unresolved(reference)) => Err(EngineError::UnresolvedRowReference {
                column: field.to_string(),
                reference: reference.clone(),
            }),
        }
    }

    /// Narrow into a named field of the JSON example body
    ///
    /// A composite child becomes the new body; a scalar child becomes a flat
    /// column entry so the field's pattern can consume it as a literal.
    pub fn step_into_field(&self, field: &str) -> Row {
        let mut narrowed = Row::new(self.name.clone());
        if let Some(Value::Object(map)) = &self.json_body {
            match map.get(field) {
                Some(child @ (Value::Object(_) | Value::List(_))) => {
                    narrowed.json_body = Some(child.clone());
                }
                Some(scalar) => {
                    narrowed.entries.insert(
                        field.to_string(),
                        RowValue::Literal(scalar.display_text()),
                    );
                }
                None => {}
            }
        }
        narrowed
    }

    /// Narrow into the first element of a JSON list body
    pub fn step_into_list(&self) -> Row {
        let mut narrowed = Row::new(self.name.clone());
        if let Some(Value::List(items)) = &self.json_body {
            if let Some(first) = items.first() {
                narrowed.json_body = Some(first.clone());
            }
        }
        narrowed
    }

    /// Example value for a field, from the flat columns or the JSON body
    pub fn example_for(&self, field: &str) -> Result<Option<Value>, EngineError> {
        if let Some(text) = self.literal(field)? {
            return Ok(Some(Value::String(text.to_string())));
        }
        if let Some(Value::Object(map)) = &self.json_body {
            return Ok(map.get(field).cloned());
        }
        Ok(None)
    }
}
