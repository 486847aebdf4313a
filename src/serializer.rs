//! Conversion of records into delimited text lines

use crate::record::{Record, Value};

/// Sentinel written in place of a null field
pub const NULL_SENTINEL: &str = "\0";

/// Default field delimiter
pub const DEFAULT_DELIMITER: char = ',';

/// Trait for turning one record into the payload sent to the stream
pub trait RecordSerializer: Send + Sync {
    fn serialize(&self, record: &Record) -> String;
}

/// Joins field values with a delimiter, in schema order
///
/// Delimiters inside field values are not escaped, so a value containing
/// the delimiter cannot be told apart from a field boundary downstream.
#[derive(Debug, Clone)]
pub struct DelimitedSerializer {
    delimiter: char,
    null_sentinel: String,
}

impl Default for DelimitedSerializer {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            null_sentinel: NULL_SENTINEL.to_string(),
        }
    }
}

impl DelimitedSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_null_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.null_sentinel = sentinel.into();
        self
    }
}

impl RecordSerializer for DelimitedSerializer {
    fn serialize(&self, record: &Record) -> String {
        let mut line = String::new();
        for (i, field) in record.fields().iter().enumerate() {
            if i > 0 {
                line.push(self.delimiter);
            }
            match &field.value {
                Value::Null => line.push_str(&self.null_sentinel),
                value => line.push_str(&value.to_string()),
            }
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_fields_joined_in_order() {
        let record = Record::builder()
            .field("rowkey", "r1")
            .field("body", "hello")
            .field("count", 3)
            .field("ratio", 0.25)
            .field("active", true)
            .build();

        assert_eq!(
            DelimitedSerializer::new().serialize(&record),
            "r1,hello,3,0.25,true"
        );
    }

    #[test]
    fn test_null_fields_use_sentinel() {
        let record = Record::builder()
            .field("a", Value::Null)
            .field("b", "x")
            .field("c", Option::<i64>::None)
            .build();

        assert_eq!(DelimitedSerializer::new().serialize(&record), "\0,x,\0");
    }

    #[test]
    fn test_no_trailing_delimiter() {
        let single = Record::builder().field("only", 1).build();
        assert_eq!(DelimitedSerializer::new().serialize(&single), "1");

        let empty = Record::default();
        assert_eq!(DelimitedSerializer::new().serialize(&empty), "");
    }

    #[test]
    fn test_embedded_delimiter_is_not_escaped() {
        let record = Record::builder()
            .field("body", "a,b")
            .field("count", 2)
            .build();

        let line = DelimitedSerializer::new().serialize(&record);
        assert_eq!(line, "a,b,2");
        assert_eq!(line.split(',').count(), 3);
    }

    #[test]
    fn test_empty_string_differs_from_null() {
        let record = Record::builder()
            .field("empty", "")
            .field("null", Value::Null)
            .build();

        assert_eq!(DelimitedSerializer::new().serialize(&record), ",\0");
    }

    #[test]
    fn test_custom_delimiter_and_sentinel() {
        let record = Record::builder()
            .field("a", 1)
            .field("b", Value::Null)
            .build();

        let serializer = DelimitedSerializer::new()
            .with_delimiter('|')
            .with_null_sentinel("NULL");
        assert_eq!(serializer.serialize(&record), "1|NULL");
    }
}
