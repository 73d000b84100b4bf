//! InfluxDB line protocol builder
//!
//! Timestamps are carried in milliseconds; writes must use `precision=ms`.

use std::fmt::{self, Write};

/// Field value type
#[derive(Debug, Clone)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    String(String),
    Boolean(bool),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::Integer(v) => write!(f, "{v}i"),
            FieldValue::String(v) => write!(f, "\"{}\"", v.replace('"', "\\\"")),
            FieldValue::Boolean(v) => write!(f, "{v}"),
        }
    }
}

/// Line protocol builder for one measurement line
#[derive(Debug)]
pub struct LineProtocolBuilder {
    measurement: String,
    tags: Vec<(String, String)>,
    fields: Vec<(String, FieldValue)>,
    timestamp_ms: Option<i64>,
}

impl LineProtocolBuilder {
    /// Create new builder
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: Vec::new(),
            fields: Vec::new(),
            timestamp_ms: None,
        }
    }

    /// Add tag
    #[must_use]
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }

    /// Add field
    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    /// Set timestamp (milliseconds since epoch)
    #[must_use]
    pub fn timestamp_ms(mut self, timestamp_ms: i64) -> Self {
        self.timestamp_ms = Some(timestamp_ms);
        self
    }

    /// Build line protocol string
    pub fn build(self) -> String {
        let mut result = String::new();

        let _ = write!(&mut result, "{}", escape_measurement(&self.measurement));

        for (key, value) in &self.tags {
            let _ = write!(
                &mut result,
                ",{}={}",
                escape_key(key),
                escape_key(value)
            );
        }

        result.push(' ');
        let mut first = true;
        for (key, value) in &self.fields {
            if !first {
                result.push(',');
            }
            let _ = write!(&mut result, "{}={}", escape_key(key), value);
            first = false;
        }

        if let Some(ts) = self.timestamp_ms {
            let _ = write!(&mut result, " {ts}");
        }

        result
    }
}

fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

// Tag keys, tag values and field keys share the same escape set.
fn escape_key(s: &str) -> String {
    s.replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_line() {
        let line = LineProtocolBuilder::new("modbus_telemetry")
            .tag("signal_id", "9f2d1f0a-0000-0000-0000-000000000001")
            .field("value", 20.0)
            .timestamp_ms(1_700_000_000_000)
            .build();

        assert_eq!(
            line,
            "modbus_telemetry,signal_id=9f2d1f0a-0000-0000-0000-000000000001 value=20 1700000000000"
        );
    }

    #[test]
    fn test_escaping() {
        let line = LineProtocolBuilder::new("my measurement")
            .tag("tag key", "a=b,c")
            .field("value", 1.5)
            .build();

        assert_eq!(line, "my\\ measurement,tag\\ key=a\\=b\\,c value=1.5");
    }

    #[test]
    fn test_field_value_display() {
        assert_eq!(FieldValue::Float(3.25).to_string(), "3.25");
        assert_eq!(FieldValue::Integer(42).to_string(), "42i");
        assert_eq!(
            FieldValue::String("he said \"hi\"".to_string()).to_string(),
            "\"he said \\\"hi\\\"\""
        );
        assert_eq!(FieldValue::Boolean(true).to_string(), "true");
    }

    #[test]
    fn test_no_timestamp() {
        let line = LineProtocolBuilder::new("m").field("value", 1.0).build();
        assert_eq!(line, "m value=1");
    }
}
