use log::{error, info};
use stack_string::StackString;
use std::fmt;
use time::{Date, Duration};

use garmin_connect_lib::garmin_connect_source::{DataFetcher, GarminConnectSource};
use garmin_lib::{
    errors::GarminImportError as Error,
    influx_client::PointSink,
    influx_point::{InfluxPoint, Tags},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOptions {
    pub tags: Tags,
    pub start_date: Date,
    pub days: u32,
    pub sources: Vec<GarminConnectSource>,
    pub dry_run: bool,
}

impl ImportOptions {
    /// One day of every source, written to the sink.
    #[must_use]
    pub fn new(tags: Tags, start_date: Date) -> Self {
        Self {
            tags,
            start_date,
            days: 1,
            sources: GarminConnectSource::ALL.to_vec(),
            dry_run: false,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub points: usize,
}

impl fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "imported {} points, {} of {} source/day pairs failed",
            self.points, self.failed, self.attempted
        )
    }
}

#[derive(Debug)]
pub struct GarminImport {
    options: ImportOptions,
}

impl GarminImport {
    #[must_use]
    pub fn new(mut options: ImportOptions) -> Self {
        options.sources = GarminConnectSource::ordered(&options.sources);
        Self { options }
    }

    #[must_use]
    pub fn options(&self) -> &ImportOptions {
        &self.options
    }

    pub fn dates(&self) -> impl Iterator<Item = Date> + '_ {
        (0..self.options.days).map_while(move |n| {
            self.options
                .start_date
                .checked_add(Duration::days(n.into()))
        })
    }

    /// Import every (date, source) pair, date-major, one request at a time.
    /// A failing pair is logged and skipped.
    pub async fn run<F, S>(&self, fetcher: &F, sink: &S) -> ImportSummary
    where
        F: DataFetcher + Sync,
        S: PointSink + Sync,
    {
        let mut summary = ImportSummary::default();
        for date in self.dates() {
            for source in &self.options.sources {
                let source = *source;
                info!("Importing data about {source} on {date}");
                summary.attempted += 1;
                match self.import_source(fetcher, sink, source, date).await {
                    Ok(n) => {
                        summary.succeeded += 1;
                        summary.points += n;
                    }
                    Err(e) => {
                        summary.failed += 1;
                        error!("Error importing from source {source} on {date}: {e}");
                    }
                }
            }
        }
        info!("{summary}");
        summary
    }

    async fn import_source<F, S>(
        &self,
        fetcher: &F,
        sink: &S,
        source: GarminConnectSource,
        date: Date,
    ) -> Result<usize, Error>
    where
        F: DataFetcher + Sync,
        S: PointSink + Sync,
    {
        let data = fetcher.fetch(source, date).await?;
        let convert = source.converter();
        let points: Vec<InfluxPoint> =
            convert(date, &data, &self.options.tags).collect::<Result<_, _>>()?;
        if self.options.dry_run {
            for point in &points {
                info!("{}", format_point_record(point)?);
            }
        } else {
            sink.write_points(&points).await?;
        }
        Ok(points.len())
    }
}

/// Json object with `measurement`, `tags`, `time` and `fields`, as logged in
/// dry-run mode.
/// # Errors
/// Return error if serialization fails
pub fn format_point_record(point: &InfluxPoint) -> Result<StackString, Error> {
    serde_json::to_string(point)
        .map(Into::into)
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use time::macros::{date, datetime};

    use garmin_connect_lib::garmin_connect_source::GarminConnectSource;
    use garmin_lib::{
        errors::GarminImportError as Error,
        influx_point::{FieldValue, InfluxPoint, Tags},
    };

    use crate::garmin_import::{format_point_record, GarminImport, ImportOptions};

    fn tags() -> Tags {
        let mut tags = Tags::new();
        tags.insert("profile".into(), "jos".into());
        tags
    }

    #[test]
    fn test_dates() {
        let mut options = ImportOptions::new(tags(), date!(2023 - 12 - 30));
        options.days = 4;
        let import = GarminImport::new(options);
        let dates: Vec<_> = import.dates().collect();
        assert_eq!(
            dates,
            vec![
                date!(2023 - 12 - 30),
                date!(2023 - 12 - 31),
                date!(2024 - 01 - 01),
                date!(2024 - 01 - 02),
            ]
        );
    }

    #[test]
    fn test_sources_in_declared_order() {
        let mut options = ImportOptions::new(tags(), date!(2024 - 01 - 01));
        options.sources = vec![
            GarminConnectSource::Hydration,
            GarminConnectSource::Summary,
            GarminConnectSource::Hydration,
        ];
        let import = GarminImport::new(options);
        assert_eq!(
            import.options().sources,
            vec![GarminConnectSource::Summary, GarminConnectSource::Hydration]
        );
    }

    #[test]
    fn test_format_point_record() -> Result<(), Error> {
        let mut fields = BTreeMap::new();
        fields.insert("steps".into(), FieldValue::Integer(316));
        let point = InfluxPoint::new("steps", &tags(), datetime!(2019-10-25 18:00 UTC), fields)?
            .with_tag("activity", "active");
        let record = format_point_record(&point)?;
        let value: serde_json::Value = serde_json::from_str(&record)?;
        assert_eq!(value["measurement"], "steps");
        assert_eq!(value["tags"]["profile"], "jos");
        assert_eq!(value["tags"]["activity"], "active");
        assert_eq!(value["time"], "2019-10-25T18:00:00Z");
        assert_eq!(value["fields"]["steps"], 316);
        Ok(())
    }
}
