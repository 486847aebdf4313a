//! Structured records handed to the sink by the pipeline

use serde::{Deserialize, Serialize};
use std::fmt;

/// A primitive field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Double(d) => write_double(f, *d),
            Value::String(s) => f.write_str(s),
        }
    }
}

/// Doubles always carry a fractional digit; magnitudes outside
/// `[1e-3, 1e7)` use scientific notation such as `1.0E20`.
fn write_double(f: &mut fmt::Formatter<'_>, d: f64) -> fmt::Result {
    if d.is_nan() {
        return f.write_str("NaN");
    }
    if d.is_infinite() {
        return f.write_str(if d > 0.0 { "Infinity" } else { "-Infinity" });
    }

    let magnitude = d.abs();
    if magnitude == 0.0 || (1e-3..1e7).contains(&magnitude) {
        let plain = d.to_string();
        if plain.contains('.') {
            f.write_str(&plain)
        } else {
            write!(f, "{}.0", plain)
        }
    } else {
        let scientific = format!("{:e}", d);
        let (mantissa, exponent) = scientific
            .split_once('e')
            .unwrap_or((scientific.as_str(), "0"));
        if mantissa.contains('.') {
            write!(f, "{}E{}", mantissa, exponent)
        } else {
            write!(f, "{}.0E{}", mantissa, exponent)
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// A named field of a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: Value,
}

/// An ordered sequence of named fields, in schema order
///
/// Records are immutable once built. Different records flowing through the
/// same sink may carry a different number of fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: Vec<Field>,
}

impl Record {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn builder() -> RecordBuilder {
        RecordBuilder::default()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Look up a field value by name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .map(|field| &field.value)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Builder for [`Record`]
#[derive(Debug, Default)]
pub struct RecordBuilder {
    fields: Vec<Field>,
}

impl RecordBuilder {
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push(Field {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn build(self) -> Record {
        Record {
            fields: self.fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_value_display_is_canonical() {
        assert_eq!(Value::from(42).to_string(), "42");
        assert_eq!(Value::from(-7i64).to_string(), "-7");
        assert_eq!(Value::from(true).to_string(), "true");
        assert_eq!(Value::from(2.5).to_string(), "2.5");
        assert_eq!(Value::from("body").to_string(), "body");
    }

    #[test]
    fn test_double_always_has_fraction() {
        assert_eq!(Value::from(1.0).to_string(), "1.0");
        assert_eq!(Value::from(-0.0).to_string(), "-0.0");
        assert_eq!(Value::from(0.001).to_string(), "0.001");
        assert_eq!(Value::from(1234567.0).to_string(), "1234567.0");
        assert_eq!(Value::from(1e7).to_string(), "1.0E7");
        assert_eq!(Value::from(1e20).to_string(), "1.0E20");
        assert_eq!(Value::from(1.5e-5).to_string(), "1.5E-5");
        assert_eq!(Value::from(-2.25e10).to_string(), "-2.25E10");
        assert_eq!(Value::from(f64::NAN).to_string(), "NaN");
        assert_eq!(Value::from(f64::NEG_INFINITY).to_string(), "-Infinity");
    }

    #[test]
    fn test_option_maps_to_null() {
        let missing: Option<i64> = None;
        assert!(Value::from(missing).is_null());
        assert_eq!(Value::from(Some("x")), Value::String("x".to_string()));
    }

    #[test]
    fn test_builder_keeps_field_order() {
        let record = Record::builder()
            .field("rowkey", "r1")
            .field("body", "hello")
            .field("count", 3)
            .build();

        let names: Vec<&str> = record.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["rowkey", "body", "count"]);
        assert_eq!(record.get("count"), Some(&Value::Int(3)));
        assert_eq!(record.get("missing"), None);
        assert_eq!(record.len(), 3);
    }

    #[test]
    fn test_record_from_json() -> anyhow::Result<()> {
        let record: Record = serde_json::from_str(
            r#"[{"name":"id","value":1},{"name":"ok","value":false},{"name":"note","value":null}]"#,
        )?;

        assert_eq!(record.get("id"), Some(&Value::Int(1)));
        assert_eq!(record.get("ok"), Some(&Value::Bool(false)));
        assert_eq!(record.get("note"), Some(&Value::Null));
        Ok(())
    }
}
