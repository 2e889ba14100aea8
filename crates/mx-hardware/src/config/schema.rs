//! Schema definitions for record database files.
//!
//! # Schema Structure
//!
//! ```toml
//! [[record]]          # One table per record, in creation order
//! name = "..."        # Record name, unique within the file
//! type = "..."        # Registered driver type name
//! fields = { ... }    # Configured field values by field name
//! ```
//!
//! Field values are plain TOML values. Integers, floats, booleans and
//! strings map onto the matching scalar [`FieldValue`]; an array of
//! integers becomes an integer array, any other flat numeric array a float
//! array, and an array of arrays a float matrix. A string supplied for a
//! record-reference field names the referenced record; the field engine
//! accepts it there.

use std::collections::BTreeMap;

use mx_core::FieldValue;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_valid::Validate;

// =============================================================================
// Top-Level Config
// =============================================================================

/// A record database file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Records in creation order
    #[serde(default, rename = "record")]
    #[validate]
    pub records: Vec<RecordConfig>,
}

/// One configured record.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(deny_unknown_fields)]
pub struct RecordConfig {
    /// Record name, at most `MAX_RECORD_NAME_LENGTH` characters
    #[validate(min_length = 1)]
    #[validate(max_length = 40)]
    pub name: String,

    /// Driver type name, e.g. "soft_motor"
    #[serde(rename = "type")]
    #[validate(min_length = 1)]
    pub type_name: String,

    /// Configured field values
    #[serde(default)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl RecordConfig {
    /// Field values converted for the record database, in name order.
    pub fn field_values(&self) -> anyhow::Result<Vec<(String, FieldValue)>> {
        self.fields
            .iter()
            .map(|(name, value)| {
                to_field_value(value)
                    .map(|v| (name.clone(), v))
                    .map_err(|reason| {
                        anyhow::anyhow!("record '{}' field '{}': {}", self.name, name, reason)
                    })
            })
            .collect()
    }
}

// =============================================================================
// Value conversion
// =============================================================================

/// Converts one configured value to a typed field value.
pub fn to_field_value(value: &serde_json::Value) -> Result<FieldValue, String> {
    use serde_json::Value;

    match value {
        Value::Bool(b) => Ok(FieldValue::Bool(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(FieldValue::Int(i)),
            None => match n.as_u64() {
                Some(u) => Ok(FieldValue::UInt(u)),
                None => n
                    .as_f64()
                    .map(FieldValue::Float)
                    .ok_or_else(|| format!("{} is out of range", n)),
            },
        },
        Value::String(s) => Ok(FieldValue::Str(s.clone())),
        Value::Array(items) if items.iter().all(Value::is_array) && !items.is_empty() => items
            .iter()
            .map(|row| match row {
                Value::Array(cells) => float_row(cells),
                _ => Err("mixed nesting in matrix".to_string()),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(FieldValue::FloatMatrix),
        Value::Array(items) if items.iter().all(|v| v.as_i64().is_some()) => Ok(FieldValue::IntArray(
            items.iter().filter_map(Value::as_i64).collect(),
        )),
        Value::Array(items) => float_row(items).map(FieldValue::FloatArray),
        Value::Null => Err("null is not a field value".to_string()),
        Value::Object(_) => Err("tables are not field values".to_string()),
    }
}

fn float_row(items: &[serde_json::Value]) -> Result<Vec<f64>, String> {
    items
        .iter()
        .map(|v| {
            v.as_f64()
                .ok_or_else(|| format!("array element {} is not a number", v))
        })
        .collect()
}
