use serde::Deserialize;
use stack_string::StackString;
use std::{ops::Deref, path::Path, sync::Arc};

use crate::errors::GarminImportError as Error;

fn default_sso_url() -> StackString {
    "https://sso.garmin.com".into()
}

fn default_connect_url() -> StackString {
    "https://connect.garmin.com".into()
}

fn default_influx_host() -> StackString {
    "localhost".into()
}

fn default_influx_port() -> u16 {
    8086
}

fn default_influx_db() -> StackString {
    "garmin".into()
}

/// `GarminConfig` holds configuration information which can be set either
/// through environment variables or the config.env file, see the dotenvy
/// crate for more information about the config file format.
#[derive(Debug, Deserialize, PartialEq, Eq)]
pub struct GarminConfigInner {
    pub garmin_connect_email: Option<StackString>,
    pub garmin_connect_password: Option<StackString>,
    pub garmin_profile: Option<StackString>,
    #[serde(default = "default_sso_url")]
    pub garmin_sso_url: StackString,
    #[serde(default = "default_connect_url")]
    pub garmin_connect_url: StackString,
    #[serde(default = "default_influx_host")]
    pub influx_host: StackString,
    #[serde(default = "default_influx_port")]
    pub influx_port: u16,
    #[serde(default = "default_influx_db")]
    pub influx_db: StackString,
}

impl Default for GarminConfigInner {
    fn default() -> Self {
        Self {
            garmin_connect_email: None,
            garmin_connect_password: None,
            garmin_profile: None,
            garmin_sso_url: default_sso_url(),
            garmin_connect_url: default_connect_url(),
            influx_host: default_influx_host(),
            influx_port: default_influx_port(),
            influx_db: default_influx_db(),
        }
    }
}

#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct GarminConfig(Arc<GarminConfigInner>);

impl GarminConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pull configuration from a file if it exists,
    /// first look for the file given on the command line,
    /// then try `${HOME}/.config/garmin_connect_import/config.env`,
    /// then a config.env file in the current directory.
    /// Variables already present in the environment take precedence.
    pub fn get_config(fname: Option<&Path>) -> Result<Self, Error> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::ConfigError("No CONFIG directory".into()))?;
        let default_fname = config_dir
            .join("garmin_connect_import")
            .join("config.env");

        let env_file = match fname {
            Some(fname) if fname.exists() => fname,
            _ => &default_fname,
        };

        dotenvy::dotenv().ok();

        if env_file.exists() {
            dotenvy::from_path(env_file).ok();
        } else if Path::new("config.env").exists() {
            dotenvy::from_filename("config.env").ok();
        }

        let conf: GarminConfigInner = envy::from_env()?;
        Ok(Self(Arc::new(conf)))
    }

    /// Build a config from explicit key/value pairs, keys use the same
    /// upper-case names as the environment variables.
    pub fn from_pairs<I, K, V>(iter: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let conf: GarminConfigInner = envy::from_iter(
            iter.into_iter()
                .map(|(k, v)| (k.as_ref().to_uppercase(), v.into())),
        )?;
        Ok(Self(Arc::new(conf)))
    }
}

impl From<GarminConfigInner> for GarminConfig {
    fn from(inner: GarminConfigInner) -> Self {
        Self(Arc::new(inner))
    }
}

impl Deref for GarminConfig {
    type Target = GarminConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use crate::{errors::GarminImportError as Error, garmin_config::GarminConfig};

    #[test]
    fn test_garmin_config_new() {
        let config = GarminConfig::new();
        assert_eq!(config.garmin_connect_url.as_str(), "https://connect.garmin.com");
        assert_eq!(config.garmin_sso_url.as_str(), "https://sso.garmin.com");
        assert_eq!(config.influx_host.as_str(), "localhost");
        assert_eq!(config.influx_port, 8086);
        assert_eq!(config.influx_db.as_str(), "garmin");
        assert!(config.garmin_profile.is_none());
    }

    #[test]
    fn test_garmin_config_from_pairs() -> Result<(), Error> {
        let config = GarminConfig::from_pairs([
            ("garmin_connect_email", "user@example.com"),
            ("garmin_profile", "jos"),
            ("influx_port", "9999"),
        ])?;
        assert_eq!(
            config.garmin_connect_email.as_ref().map(|s| s.as_str()),
            Some("user@example.com")
        );
        assert_eq!(config.garmin_profile.as_ref().map(|s| s.as_str()), Some("jos"));
        assert_eq!(config.influx_port, 9999);
        assert_eq!(config.influx_db.as_str(), "garmin");
        Ok(())
    }

    #[test]
    fn test_garmin_config_bad_port() {
        let result = GarminConfig::from_pairs([("influx_port", "not a port")]);
        assert!(result.is_err());
    }
}
