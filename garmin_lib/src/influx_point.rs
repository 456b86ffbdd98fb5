use serde::Serialize;
use serde_json::Value;
use stack_string::{format_sstr, StackString};
use std::{collections::BTreeMap, fmt::Write};
use time::{OffsetDateTime, UtcOffset};

use crate::errors::GarminImportError as Error;

pub type Tags = BTreeMap<StackString, StackString>;
pub type Fields = BTreeMap<StackString, FieldValue>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(StackString),
}

impl From<i64> for FieldValue {
    fn from(item: i64) -> Self {
        Self::Integer(item)
    }
}

impl From<f64> for FieldValue {
    fn from(item: f64) -> Self {
        Self::Float(item)
    }
}

impl From<bool> for FieldValue {
    fn from(item: bool) -> Self {
        Self::Boolean(item)
    }
}

impl From<&str> for FieldValue {
    fn from(item: &str) -> Self {
        Self::String(item.into())
    }
}

impl FieldValue {
    /// Map a scalar json value onto a field value, `null` maps to `None`.
    /// # Errors
    /// Return error on arrays and objects
    pub fn from_json(value: &Value) -> Result<Option<Self>, Error> {
        match value {
            Value::Null => Ok(None),
            Value::Bool(b) => Ok(Some(Self::Boolean(*b))),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Some(Self::Integer(i)))
                } else if let Some(f) = n.as_f64() {
                    Ok(Some(Self::Float(f)))
                } else {
                    Err(Error::ConversionError(format_sstr!("invalid number {n}")))
                }
            }
            Value::String(s) => Ok(Some(Self::String(s.into()))),
            Value::Array(_) | Value::Object(_) => Err(Error::ConversionError(format_sstr!(
                "non-scalar field value {value}"
            ))),
        }
    }

    fn write_line_protocol(&self, buf: &mut String) -> Result<(), Error> {
        match self {
            Self::Integer(i) => write!(buf, "{i}i")?,
            Self::Float(f) => write!(buf, "{f}")?,
            Self::Boolean(b) => write!(buf, "{b}")?,
            Self::String(s) => {
                buf.push('"');
                for c in s.chars() {
                    if c == '"' || c == '\\' {
                        buf.push('\\');
                    }
                    buf.push(c);
                }
                buf.push('"');
            }
        }
        Ok(())
    }
}

/// A single time-series point: measurement, tags, UTC timestamp and fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InfluxPoint {
    pub measurement: StackString,
    pub tags: Tags,
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
    pub fields: Fields,
}

impl InfluxPoint {
    /// # Errors
    /// Return error if `fields` is empty, a point must carry at least one
    /// field
    pub fn new(
        measurement: impl Into<StackString>,
        tags: &Tags,
        time: OffsetDateTime,
        fields: Fields,
    ) -> Result<Self, Error> {
        let measurement = measurement.into();
        if fields.is_empty() {
            return Err(Error::ConversionError(format_sstr!(
                "point {measurement} has no fields"
            )));
        }
        Ok(Self {
            measurement,
            tags: tags.clone(),
            time: time.to_offset(UtcOffset::UTC),
            fields,
        })
    }

    /// Add a tag unless a tag of the same name is already set.
    #[must_use]
    pub fn with_tag(mut self, key: &str, value: &str) -> Self {
        self.tags.entry(key.into()).or_insert_with(|| value.into());
        self
    }

    /// Encode as one line of the influxdb line protocol with a nanosecond
    /// timestamp.
    /// # Errors
    /// Return error if formatting fails
    pub fn to_line_protocol(&self) -> Result<StackString, Error> {
        let mut buf = String::new();
        escape_into(&mut buf, &self.measurement, &[',', ' ']);
        for (key, value) in &self.tags {
            buf.push(',');
            escape_into(&mut buf, key, &[',', '=', ' ']);
            buf.push('=');
            escape_into(&mut buf, value, &[',', '=', ' ']);
        }
        for (idx, (key, value)) in self.fields.iter().enumerate() {
            buf.push(if idx == 0 { ' ' } else { ',' });
            escape_into(&mut buf, key, &[',', '=', ' ']);
            buf.push('=');
            value.write_line_protocol(&mut buf)?;
        }
        write!(buf, " {}", self.time.unix_timestamp_nanos())?;
        Ok(buf.into())
    }
}

fn escape_into(buf: &mut String, s: &str, special: &[char]) {
    for c in s.chars() {
        if special.contains(&c) {
            buf.push('\\');
        }
        buf.push(c);
    }
}

#[cfg(test)]
mod tests {
    use maplit::btreemap;
    use serde_json::json;
    use time::macros::datetime;

    use crate::{
        errors::GarminImportError as Error,
        influx_point::{FieldValue, Fields, InfluxPoint, Tags},
    };

    fn profile_tags() -> Tags {
        btreemap! {"profile".into() => "jos".into()}
    }

    #[test]
    fn test_new_rejects_empty_fields() {
        let result = InfluxPoint::new(
            "summary",
            &profile_tags(),
            datetime!(2024-01-01 00:00 UTC),
            Fields::new(),
        );
        assert!(matches!(result, Err(Error::ConversionError(_))));
    }

    #[test]
    fn test_time_is_normalized_to_utc() -> Result<(), Error> {
        let fields: Fields = btreemap! {"bpm".into() => FieldValue::Integer(60)};
        let point = InfluxPoint::new(
            "heartrate",
            &profile_tags(),
            datetime!(2024-01-01 02:00 +02:00),
            fields,
        )?;
        assert_eq!(point.time, datetime!(2024-01-01 00:00 UTC));
        assert!(point.time.offset().is_utc());
        Ok(())
    }

    #[test]
    fn test_with_tag_does_not_overwrite() -> Result<(), Error> {
        let fields: Fields = btreemap! {"steps".into() => FieldValue::Integer(316)};
        let point = InfluxPoint::new(
            "steps",
            &profile_tags(),
            datetime!(2019-10-25 18:00 UTC),
            fields,
        )?
        .with_tag("activity", "active")
        .with_tag("profile", "someone_else");
        assert_eq!(point.tags.get("profile").map(|s| s.as_str()), Some("jos"));
        assert_eq!(point.tags.get("activity").map(|s| s.as_str()), Some("active"));
        Ok(())
    }

    #[test]
    fn test_line_protocol() -> Result<(), Error> {
        let fields: Fields = btreemap! {
            "name".into() => FieldValue::from("Morning \"Run\""),
            "distance".into() => FieldValue::Float(5012.5),
            "steps".into() => FieldValue::Integer(4211),
        };
        let tags = btreemap! {"profile".into() => "jos van bakel".into()};
        let point = InfluxPoint::new(
            "activity",
            &tags,
            datetime!(2019-10-25 17:45:00 UTC),
            fields,
        )?;
        assert_eq!(
            point.to_line_protocol()?,
            "activity,profile=jos\\ van\\ bakel distance=5012.5,name=\"Morning \\\"Run\\\"\",steps=4211i 1572025500000000000"
        );
        Ok(())
    }

    #[test]
    fn test_serialize_point() -> Result<(), Error> {
        let fields: Fields = btreemap! {"weight".into() => FieldValue::Float(72.5)};
        let point = InfluxPoint::new(
            "weight",
            &profile_tags(),
            datetime!(2024-01-01 07:30 UTC),
            fields,
        )?;
        let value = serde_json::to_value(&point)?;
        assert_eq!(
            value,
            json!({
                "measurement": "weight",
                "tags": {"profile": "jos"},
                "time": "2024-01-01T07:30:00Z",
                "fields": {"weight": 72.5},
            })
        );
        Ok(())
    }

    #[test]
    fn test_field_value_from_json() -> Result<(), Error> {
        assert_eq!(FieldValue::from_json(&json!(null))?, None);
        assert_eq!(FieldValue::from_json(&json!(3))?, Some(FieldValue::Integer(3)));
        assert_eq!(
            FieldValue::from_json(&json!(3.5))?,
            Some(FieldValue::Float(3.5))
        );
        assert_eq!(
            FieldValue::from_json(&json!("2024-01-01T08:00:00.0"))?,
            Some(FieldValue::from("2024-01-01T08:00:00.0"))
        );
        assert!(FieldValue::from_json(&json!([1, 2])).is_err());
        Ok(())
    }
}
