use clap::Parser;
use log::info;
use stack_string::StackString;
use std::path::PathBuf;
use time::{macros::format_description, Date, OffsetDateTime};

use garmin_connect_lib::{
    garmin_connect_client::GarminConnectSession, garmin_connect_source::GarminConnectSource,
};
use garmin_lib::{
    errors::GarminImportError as Error,
    garmin_config::GarminConfig,
    influx_client::InfluxClient,
    influx_point::Tags,
};

use crate::garmin_import::{GarminImport, ImportOptions, ImportSummary};

fn parse_date(s: &str) -> Result<Date, Error> {
    Date::parse(s, format_description!("[year]-[month]-[day]")).map_err(Into::into)
}

#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(
    name = "import-garmin-connect",
    about = "Import daily Garmin Connect metrics into InfluxDB"
)]
pub struct GarminImportOpts {
    /// Garmin Connect login email
    #[arg(long)]
    pub user: Option<String>,
    /// Garmin Connect password
    #[arg(long)]
    pub password: Option<String>,
    /// Value of the `profile` tag on every point
    #[arg(long)]
    pub profile: Option<String>,
    #[arg(long)]
    pub influx_host: Option<String>,
    #[arg(long)]
    pub influx_port: Option<u16>,
    #[arg(long)]
    pub influx_db: Option<String>,
    /// First day to import (YYYY-MM-DD), defaults to today
    #[arg(long, value_parser = parse_date)]
    pub date: Option<Date>,
    /// Number of consecutive days to import
    #[arg(long, default_value_t = 1)]
    pub days: u32,
    /// Restrict the import to these sources, may be repeated
    #[arg(short, long = "source")]
    pub sources: Vec<GarminConnectSource>,
    /// Log points as json instead of writing them to InfluxDB
    #[arg(short, long)]
    pub test: bool,
    /// Log level
    #[arg(long, default_value = "info")]
    pub log: String,
    /// Path to a config.env file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

fn today() -> Date {
    OffsetDateTime::now_local()
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
        .date()
}

impl GarminImportOpts {
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Command line values win over the environment and the config file.
    /// # Errors
    /// Return error if a required setting is missing
    pub fn merge_config(&self, config: &GarminConfig) -> Result<ResolvedSettings, Error> {
        let username = self
            .user
            .as_deref()
            .or(config.garmin_connect_email.as_ref().map(StackString::as_str))
            .ok_or_else(|| {
                Error::ConfigError("No username given, set --user or GARMIN_CONNECT_EMAIL".into())
            })?;
        let password = self
            .password
            .as_deref()
            .or(config.garmin_connect_password.as_ref().map(StackString::as_str))
            .ok_or_else(|| {
                Error::ConfigError(
                    "No password given, set --password or GARMIN_CONNECT_PASSWORD".into(),
                )
            })?;
        let profile = self
            .profile
            .as_deref()
            .or(config.garmin_profile.as_ref().map(StackString::as_str))
            .ok_or_else(|| {
                Error::ConfigError("No profile given, set --profile or GARMIN_PROFILE".into())
            })?;
        Ok(ResolvedSettings {
            username: username.into(),
            password: password.into(),
            profile: profile.into(),
            influx_host: self
                .influx_host
                .as_deref()
                .unwrap_or(config.influx_host.as_str())
                .into(),
            influx_port: self.influx_port.unwrap_or(config.influx_port),
            influx_db: self
                .influx_db
                .as_deref()
                .unwrap_or(config.influx_db.as_str())
                .into(),
        })
    }

    #[must_use]
    pub fn import_options(&self, profile: &str) -> ImportOptions {
        let mut tags = Tags::new();
        tags.insert("profile".into(), profile.into());
        let mut options = ImportOptions::new(tags, self.date.unwrap_or_else(today));
        options.days = self.days;
        options.dry_run = self.test;
        if !self.sources.is_empty() {
            options.sources = GarminConnectSource::ordered(&self.sources);
        }
        options
    }

    /// # Errors
    /// Return error if configuration is incomplete, or if login or the
    /// profile lookup fail
    pub async fn process_args(&self) -> Result<ImportSummary, Error> {
        let config = GarminConfig::get_config(self.config.as_deref())?;
        let settings = self.merge_config(&config)?;
        let influx = InfluxClient::new(
            &settings.influx_host,
            settings.influx_port,
            &settings.influx_db,
        )?;
        let options = self.import_options(&settings.profile);

        info!("Authenticating to Garmin as {}", settings.username);
        let session =
            GarminConnectSession::login(&config, &settings.username, &settings.password).await?;
        info!("You have display_name: {}", session.display_name());

        let import = GarminImport::new(options);
        Ok(import.run(&session, &influx).await)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSettings {
    pub username: StackString,
    pub password: StackString,
    pub profile: StackString,
    pub influx_host: StackString,
    pub influx_port: u16,
    pub influx_db: StackString,
}
