use envy::Error as EnvyError;
use http::header::InvalidHeaderValue;
use reqwest::Error as ReqwestError;
use serde_json::Error as SerdeJsonError;
use stack_string::StackString;
use std::fmt::{Debug, Error as FmtError};
use thiserror::Error;
use time::error::{ComponentRange as TimeComponentRange, Parse as TimeParseError};
use url::ParseError as UrlParseError;

#[derive(Error, Debug)]
pub enum GarminImportError {
    #[error("AuthenticationError {0}")]
    AuthenticationError(StackString),
    #[error("ProfileLookupError {0}")]
    ProfileLookupError(StackString),
    #[error("FetchError {source_name}: {message}")]
    FetchError {
        source_name: &'static str,
        message: StackString,
    },
    #[error("ConversionError {0}")]
    ConversionError(StackString),
    #[error("InfluxWriteError {0}")]
    InfluxWriteError(StackString),
    #[error("ConfigError {0}")]
    ConfigError(StackString),
    #[error("ReqwestError {0}")]
    ReqwestError(#[from] ReqwestError),
    #[error("SerdeJsonError {0}")]
    SerdeJsonError(#[from] SerdeJsonError),
    #[error("UrlParseError {0}")]
    UrlParseError(#[from] UrlParseError),
    #[error("EnvyError {0}")]
    EnvyError(#[from] EnvyError),
    #[error("InvalidHeaderValue {0}")]
    InvalidHeaderValue(#[from] InvalidHeaderValue),
    #[error("TimeParseError {0}")]
    TimeParseError(Box<TimeParseError>),
    #[error("TimeComponentRange {0}")]
    TimeComponentRange(Box<TimeComponentRange>),
    #[error("FmtError {0}")]
    FmtError(#[from] FmtError),
    #[error("{0}")]
    CustomError(StackString),
}

impl GarminImportError {
    /// Errors that leave nothing downstream reachable: the run must stop
    /// before the import loop begins.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationError(_) | Self::ProfileLookupError(_) | Self::ConfigError(_)
        )
    }
}

impl From<TimeParseError> for GarminImportError {
    fn from(value: TimeParseError) -> Self {
        Self::TimeParseError(value.into())
    }
}

impl From<TimeComponentRange> for GarminImportError {
    fn from(value: TimeComponentRange) -> Self {
        Self::TimeComponentRange(value.into())
    }
}

#[cfg(test)]
mod test {
    use stack_string::StackString;

    use crate::errors::GarminImportError as Error;

    #[test]
    fn test_error_size() {
        println!("StackString {}", std::mem::size_of::<StackString>());
        println!("Error {}", std::mem::size_of::<Error>());
        assert!(std::mem::size_of::<Error>() <= 48);
    }

    #[test]
    fn test_is_fatal() {
        assert!(Error::AuthenticationError("bad password".into()).is_fatal());
        assert!(Error::ProfileLookupError("no display name".into()).is_fatal());
        assert!(Error::ConfigError("no profile".into()).is_fatal());
        let e = Error::FetchError {
            source_name: "sleep",
            message: "500 Internal Server Error".into(),
        };
        assert!(!e.is_fatal());
        assert_eq!(
            e.to_string(),
            "FetchError sleep: 500 Internal Server Error"
        );
        assert!(!Error::ConversionError("missing totalSteps".into()).is_fatal());
    }
}
