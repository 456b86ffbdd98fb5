use log::debug;
use serde_json::Value;
use stack_string::format_sstr;
use std::iter::{once, once_with};
use time::{macros::format_description, Date};

use garmin_lib::{
    errors::GarminImportError as Error,
    influx_point::{FieldValue, Fields, InfluxPoint, Tags},
};

use crate::garmin_connect_timestamp::GarminConnectTimestamp;

/// Lazily produced points of a single conversion, each call yields an
/// independent sequence.
pub type PointIter<'a> = Box<dyn Iterator<Item = Result<InfluxPoint, Error>> + 'a>;

pub const SUMMARY_FIELDS: [&str; 52] = [
    "abnormalHeartRateAlertsCount",
    "activeKilocalories",
    "activeSeconds",
    "activityStressDuration",
    "activityStressPercentage",
    "averageStressLevel",
    "bmrKilocalories",
    "burnedKilocalories",
    "consumedKilocalories",
    "dailyStepGoal",
    "floorsAscended",
    "floorsAscendedInMeters",
    "floorsDescended",
    "floorsDescendedInMeters",
    "highStressDuration",
    "highStressPercentage",
    "highlyActiveSeconds",
    "intensityMinutesGoal",
    "lastSevenDaysAvgRestingHeartRate",
    "lastSyncTimestampGMT",
    "lowStressDuration",
    "lowStressPercentage",
    "maxAvgHeartRate",
    "maxHeartRate",
    "maxStressLevel",
    "measurableAsleepDuration",
    "measurableAwakeDuration",
    "mediumStressDuration",
    "mediumStressPercentage",
    "minAvgHeartRate",
    "minHeartRate",
    "moderateIntensityMinutes",
    "netRemainingKilocalories",
    "remainingKilocalories",
    "restStressDuration",
    "restStressPercentage",
    "restingHeartRate",
    "sedentarySeconds",
    "sleepingSeconds",
    "stressDuration",
    "stressPercentage",
    "totalDistanceMeters",
    "totalKilocalories",
    "totalSteps",
    "totalStressDuration",
    "uncategorizedStressDuration",
    "uncategorizedStressPercentage",
    "userFloorsAscendedGoal",
    "vigorousIntensityMinutes",
    "wellnessActiveKilocalories",
    "wellnessDistanceMeters",
    "wellnessKilocalories",
];

pub const ACTIVITY_FIELDS: [&str; 6] = [
    "activeCalories",
    "averageHR",
    "calories",
    "distance",
    "duration",
    "steps",
];

/// (field name, key in `dailySleepDTO`)
pub const SLEEP_FIELDS: [(&str, &str); 6] = [
    ("awake", "awakeSleepSeconds"),
    ("deep", "deepSleepSeconds"),
    ("light", "lightSleepSeconds"),
    ("nap", "napTimeSeconds"),
    ("rem", "remSleepSeconds"),
    ("time", "sleepTimeSeconds"),
];

pub const HYDRATION_FIELDS: [&str; 6] = [
    "activityIntakeInML",
    "sweatLossInML",
    "baseGoalInML",
    "goalInML",
    "valueInML",
    "lastEntryTimestampLocal",
];

fn get_key<'a>(data: &'a Value, key: &str) -> Result<&'a Value, Error> {
    data.get(key)
        .ok_or_else(|| Error::ConversionError(format_sstr!("missing field {key}")))
}

fn get_str<'a>(data: &'a Value, key: &str) -> Result<&'a str, Error> {
    get_key(data, key)?
        .as_str()
        .ok_or_else(|| Error::ConversionError(format_sstr!("field {key} is not a string")))
}

fn insert_field(fields: &mut Fields, name: &str, value: &Value) -> Result<(), Error> {
    if let Some(value) = FieldValue::from_json(value)? {
        fields.insert(name.into(), value);
    }
    Ok(())
}

/// Copy whitelisted keys, a missing key is an error, a `null` value is left
/// out.
fn copy_fields(data: &Value, keys: &[&str]) -> Result<Fields, Error> {
    let mut fields = Fields::new();
    for key in keys {
        insert_field(&mut fields, key, get_key(data, key)?)?;
    }
    Ok(fields)
}

fn require_non_negative(data: &Value, key: &str) -> Result<(), Error> {
    let value = get_key(data, key)?;
    match value.as_f64() {
        Some(v) if v >= 0.0 => Ok(()),
        _ => Err(Error::ConversionError(format_sstr!(
            "expected non-negative {key}, got {value}"
        ))),
    }
}

fn single_point<'a, F>(f: F) -> PointIter<'a>
where
    F: FnOnce() -> Result<InfluxPoint, Error> + 'a,
{
    Box::new(once_with(f))
}

fn as_rows<'a>(data: &'a Value, what: &str) -> Result<&'a Vec<Value>, Error> {
    data.as_array()
        .ok_or_else(|| Error::ConversionError(format_sstr!("expected a list of {what}")))
}

/// Daily aggregates, validated then copied into one point at midnight.
pub fn convert_summary<'a>(date: Date, data: &'a Value, tags: &'a Tags) -> PointIter<'a> {
    single_point(move || {
        require_non_negative(data, "activeSeconds")?;
        require_non_negative(data, "totalSteps")?;
        let fields = copy_fields(data, &SUMMARY_FIELDS)?;
        let time = GarminConnectTimestamp::from_date(date);
        InfluxPoint::new("summary", tags, time.into(), fields)
    })
}

/// One point per activity at the activity's own start time.
pub fn convert_activities<'a>(_: Date, data: &'a Value, tags: &'a Tags) -> PointIter<'a> {
    let rows = match as_rows(data, "activities") {
        Ok(rows) => rows,
        Err(e) => return Box::new(once(Err(e))),
    };
    Box::new(rows.iter().map(move |row| {
        let mut fields = copy_fields(row, &ACTIVITY_FIELDS)?;
        insert_field(&mut fields, "name", get_key(row, "activityName")?)?;
        let time = GarminConnectTimestamp::from_gmt_str(get_str(row, "startTimeGMT")?)?;
        InfluxPoint::new("activity", tags, time.into(), fields)
    }))
}

/// The sleep record's calendar date wins over the requested date, a night
/// spans midnight.
pub fn convert_sleep<'a>(_: Date, data: &'a Value, tags: &'a Tags) -> PointIter<'a> {
    single_point(move || {
        let dto = get_key(data, "dailySleepDTO")?;
        let mut fields = Fields::new();
        for (name, key) in SLEEP_FIELDS {
            insert_field(&mut fields, name, get_key(dto, key)?)?;
        }
        let calendar_date = Date::parse(
            get_str(dto, "calendarDate")?,
            format_description!("[year]-[month]-[day]"),
        )?;
        let time = GarminConnectTimestamp::from_date(calendar_date);
        InfluxPoint::new("sleep", tags, time.into(), fields)
    })
}

/// One point per intraday bucket, tagged with its activity level and stamped
/// with the bucket end.
pub fn convert_steps<'a>(_: Date, data: &'a Value, tags: &'a Tags) -> PointIter<'a> {
    let rows = match as_rows(data, "step buckets") {
        Ok(rows) => rows,
        Err(e) => return Box::new(once(Err(e))),
    };
    Box::new(rows.iter().map(move |row| {
        let steps = get_key(row, "steps")?;
        let steps = steps
            .as_i64()
            .or_else(|| steps.as_f64().map(|s| s as i64))
            .ok_or_else(|| Error::ConversionError(format_sstr!("invalid steps {steps}")))?;
        let level = get_str(row, "primaryActivityLevel")?;
        let time = GarminConnectTimestamp::from_gmt_str(get_str(row, "endGMT")?)?;
        let mut fields = Fields::new();
        fields.insert("steps".into(), FieldValue::Integer(steps));
        Ok(InfluxPoint::new("steps", tags, time.into(), fields)?.with_tag("activity", level))
    }))
}

/// `heartRateValues` is a list of `[epoch_ms, bpm]`, gaps come as `null` bpm
/// and are dropped. A `null` list is an error.
pub fn convert_heartrate<'a>(_: Date, data: &'a Value, tags: &'a Tags) -> PointIter<'a> {
    let samples = match get_key(data, "heartRateValues").and_then(|samples| {
        if samples.is_null() {
            Err(Error::ConversionError("heartRateValues is null".into()))
        } else {
            as_rows(samples, "heart rate samples")
        }
    }) {
        Ok(samples) => samples,
        Err(e) => return Box::new(once(Err(e))),
    };
    Box::new(samples.iter().filter_map(move |sample| {
        let (timestamp, bpm) = match sample.as_array().map(Vec::as_slice) {
            Some([timestamp, bpm]) => (timestamp, bpm),
            _ => {
                return Some(Err(Error::ConversionError(format_sstr!(
                    "invalid heart rate sample {sample}"
                ))))
            }
        };
        if !bpm.is_number() {
            return None;
        }
        let result = FieldValue::from_json(bpm).and_then(|bpm| {
            let time = GarminConnectTimestamp::from_json_millis(timestamp)?;
            let mut fields = Fields::new();
            if let Some(bpm) = bpm {
                fields.insert("bpm".into(), bpm);
            }
            InfluxPoint::new("heartrate", tags, time.into(), fields)
        });
        Some(result)
    }))
}

/// Known unreliable: the endpoint ignores the requested date and returns the
/// most recent weigh-in, whose own timestamp is used here.
pub fn convert_weight<'a>(date: Date, data: &'a Value, tags: &'a Tags) -> PointIter<'a> {
    single_point(move || {
        let time = GarminConnectTimestamp::from_json_millis(get_key(data, "timestampGMT")?)?;
        if time.date() != date {
            debug!(
                "latest weigh-in is from {}, not the requested {date}",
                time.date()
            );
        }
        let mut fields = Fields::new();
        insert_field(&mut fields, "weight", get_key(data, "weight")?)?;
        InfluxPoint::new("weight", tags, time.into(), fields)
    })
}

pub fn convert_hydration<'a>(date: Date, data: &'a Value, tags: &'a Tags) -> PointIter<'a> {
    single_point(move || {
        let fields = copy_fields(data, &HYDRATION_FIELDS)?;
        let time = GarminConnectTimestamp::from_date(date);
        InfluxPoint::new("hydration", tags, time.into(), fields)
    })
}
