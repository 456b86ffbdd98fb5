use std::path::Path;

use garmin_lib::{errors::GarminImportError as Error, garmin_config::GarminConfig};

#[test]
fn test_garmin_config_get_config() -> Result<(), Error> {
    let test_fname = Path::new("tests/data/test.env");

    let gc = GarminConfig::get_config(Some(test_fname))?;

    assert_eq!(
        gc.garmin_connect_email.as_ref().map(|s| s.as_str()),
        Some("test@example.com")
    );
    assert_eq!(gc.garmin_profile.as_ref().map(|s| s.as_str()), Some("testprofile"));
    assert_eq!(gc.influx_host.as_str(), "influx.test");
    assert_eq!(gc.influx_port, 8087);
    assert_eq!(gc.influx_db.as_str(), "garmin_test");
    assert_eq!(gc.garmin_connect_url.as_str(), "https://connect.garmin.com");
    Ok(())
}
