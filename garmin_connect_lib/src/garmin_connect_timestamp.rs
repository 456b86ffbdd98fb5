use derive_more::{Display, Into};
use stack_string::format_sstr;
use time::{
    macros::format_description, Date, Duration, OffsetDateTime, PrimitiveDateTime, UtcOffset,
};

use garmin_lib::errors::GarminImportError as Error;

/// UTC instant as reported by garmin connect, either epoch milliseconds or a
/// `...GMT` string without an offset.
#[derive(Into, Copy, Clone, Debug, PartialEq, Eq, Display)]
pub struct GarminConnectTimestamp(OffsetDateTime);

impl TryFrom<i64> for GarminConnectTimestamp {
    type Error = Error;

    fn try_from(timestamp_ms: i64) -> Result<Self, Self::Error> {
        let timestamp = timestamp_ms.div_euclid(1000);
        let millis = timestamp_ms.rem_euclid(1000);
        let datetime =
            OffsetDateTime::from_unix_timestamp(timestamp)? + Duration::milliseconds(millis);
        Ok(Self(datetime))
    }
}

impl GarminConnectTimestamp {
    /// Parse `2019-10-25T18:00:00.0` or `2019-10-25 18:00:00` as UTC.
    /// # Errors
    /// Return error if the string matches neither layout
    pub fn from_gmt_str(s: &str) -> Result<Self, Error> {
        let normalized = s.trim().replacen(' ', "T", 1);
        let datetime = if normalized.contains('.') {
            PrimitiveDateTime::parse(
                &normalized,
                format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
            )?
        } else {
            PrimitiveDateTime::parse(
                &normalized,
                format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
            )?
        };
        Ok(Self(datetime.assume_utc()))
    }

    /// # Errors
    /// Return error if value is not an integral or floating number
    pub fn from_json_millis(value: &serde_json::Value) -> Result<Self, Error> {
        let timestamp_ms = value
            .as_i64()
            .or_else(|| value.as_f64().map(|f| f as i64))
            .ok_or_else(|| Error::ConversionError(format_sstr!("invalid timestamp {value}")))?;
        timestamp_ms.try_into()
    }

    #[must_use]
    pub fn from_date(date: Date) -> Self {
        Self(date.midnight().assume_utc())
    }

    #[must_use]
    pub fn date(self) -> Date {
        self.0.to_offset(UtcOffset::UTC).date()
    }
}
