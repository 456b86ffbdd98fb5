use async_trait::async_trait;
use serde_json::Value;
use stack_string::{format_sstr, StackString};
use std::{
    fmt::{self, Write},
    str::FromStr,
};
use time::Date;
use url::Url;

use garmin_lib::{errors::GarminImportError as Error, influx_point::Tags};

use crate::garmin_connect_convert::{
    convert_activities, convert_heartrate, convert_hydration, convert_sleep, convert_steps,
    convert_summary, convert_weight, PointIter,
};

/// Converts one raw response into points.
pub type ConvertFn = for<'a> fn(Date, &'a Value, &'a Tags) -> PointIter<'a>;

/// Anything that can return the raw json of a source for a given day.
#[async_trait]
pub trait DataFetcher {
    async fn fetch(&self, source: GarminConnectSource, date: Date) -> Result<Value, Error>;
}

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub enum GarminConnectSource {
    Summary,
    Activities,
    Sleep,
    Steps,
    Heartrate,
    Weight,
    Hydration,
}

/// How the requested date reaches the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateEncoding {
    Query(&'static str),
    PathSegment,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceEndpoint {
    pub path: &'static str,
    pub use_display_name: bool,
    pub date_encoding: DateEncoding,
    pub extra_params: &'static [(&'static str, &'static str)],
}

impl SourceEndpoint {
    /// # Errors
    /// Return error if the resulting url is invalid
    pub fn url(&self, connect_url: &str, display_name: &str, date: Date) -> Result<Url, Error> {
        let mut url = format!(
            "{}/modern/proxy/{}",
            connect_url.trim_end_matches('/'),
            self.path
        );
        if self.use_display_name {
            write!(url, "/{display_name}")?;
        }
        if self.date_encoding == DateEncoding::PathSegment {
            write!(url, "/{date}")?;
        }
        let mut url: Url = url.parse()?;
        if let DateEncoding::Query(param) = self.date_encoding {
            url.query_pairs_mut()
                .append_pair(param, &format_sstr!("{date}"));
        }
        if !self.extra_params.is_empty() {
            url.query_pairs_mut().extend_pairs(self.extra_params);
        }
        Ok(url)
    }
}

impl fmt::Display for GarminConnectSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.to_str())
    }
}

impl FromStr for GarminConnectSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|source| source.to_str() == s)
            .ok_or_else(|| {
                let valid: Vec<_> = Self::ALL.iter().map(|s| s.to_str()).collect();
                Error::CustomError(format_sstr!(
                    "Invalid source {s}, expected one of {}",
                    valid.join(", ")
                ))
            })
    }
}

impl GarminConnectSource {
    /// Every source, in import order.
    pub const ALL: [Self; 7] = [
        Self::Summary,
        Self::Activities,
        Self::Sleep,
        Self::Steps,
        Self::Heartrate,
        Self::Weight,
        Self::Hydration,
    ];

    #[must_use]
    pub fn to_str(self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Activities => "activities",
            Self::Sleep => "sleep",
            Self::Steps => "steps",
            Self::Heartrate => "heartrate",
            Self::Weight => "weight",
            Self::Hydration => "hydration",
        }
    }

    #[must_use]
    pub fn endpoint(self) -> SourceEndpoint {
        match self {
            Self::Summary => SourceEndpoint {
                path: "usersummary-service/usersummary/daily",
                use_display_name: true,
                date_encoding: DateEncoding::Query("calendarDate"),
                extra_params: &[],
            },
            Self::Activities => SourceEndpoint {
                path: "activitylist-service/activities/fordailysummary",
                use_display_name: true,
                date_encoding: DateEncoding::Query("calendarDate"),
                extra_params: &[],
            },
            Self::Sleep => SourceEndpoint {
                path: "wellness-service/wellness/dailySleepData",
                use_display_name: true,
                date_encoding: DateEncoding::Query("date"),
                extra_params: &[("nonSleepBufferMinutes", "60")],
            },
            Self::Steps => SourceEndpoint {
                path: "wellness-service/wellness/dailySummaryChart",
                use_display_name: true,
                date_encoding: DateEncoding::Query("date"),
                extra_params: &[],
            },
            Self::Heartrate => SourceEndpoint {
                path: "wellness-service/wellness/dailyHeartRate",
                use_display_name: true,
                date_encoding: DateEncoding::Query("date"),
                extra_params: &[],
            },
            // server returns the latest weigh-in whatever the date
            Self::Weight => SourceEndpoint {
                path: "weight-service/weight/latest",
                use_display_name: false,
                date_encoding: DateEncoding::Query("date"),
                extra_params: &[("ignorePriority", "true")],
            },
            Self::Hydration => SourceEndpoint {
                path: "usersummary-service/usersummary/hydration/allData",
                use_display_name: false,
                date_encoding: DateEncoding::PathSegment,
                extra_params: &[],
            },
        }
    }

    #[must_use]
    pub fn converter(self) -> ConvertFn {
        match self {
            Self::Summary => convert_summary,
            Self::Activities => convert_activities,
            Self::Sleep => convert_sleep,
            Self::Steps => convert_steps,
            Self::Heartrate => convert_heartrate,
            Self::Weight => convert_weight,
            Self::Hydration => convert_hydration,
        }
    }

    /// Parse a list of source names, keeping declared order and dropping
    /// duplicates.
    /// # Errors
    /// Return error on an unknown source name
    pub fn parse_list<T: AsRef<str>>(names: &[T]) -> Result<Vec<Self>, Error> {
        let selected: Vec<Self> = names
            .iter()
            .map(|name| name.as_ref().parse())
            .collect::<Result<_, _>>()?;
        Ok(Self::ordered(&selected))
    }

    /// Subset of `ALL` contained in `selected`, in declared order.
    #[must_use]
    pub fn ordered(selected: &[Self]) -> Vec<Self> {
        Self::ALL
            .into_iter()
            .filter(|source| selected.contains(source))
            .collect()
    }
}

impl From<GarminConnectSource> for StackString {
    fn from(item: GarminConnectSource) -> StackString {
        item.to_str().into()
    }
}
