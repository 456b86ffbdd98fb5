#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::similar_names)]

pub mod garmin_connect_client;
pub mod garmin_connect_convert;
pub mod garmin_connect_source;
pub mod garmin_connect_timestamp;
