use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use stack_string::format_sstr;
use url::Url;

use crate::{
    errors::GarminImportError as Error, garmin_config::GarminConfig, influx_point::InfluxPoint,
};

/// Destination for converted points.
#[async_trait]
pub trait PointSink {
    async fn write_points(&self, points: &[InfluxPoint]) -> Result<(), Error>;
}

/// Writes points to the `/write` endpoint of an influxdb 1.x server.
#[derive(Debug, Clone)]
pub struct InfluxClient {
    client: Client,
    write_url: Url,
}

impl InfluxClient {
    /// # Errors
    /// Return error if the url cannot be built or client setup fails
    pub fn new(host: &str, port: u16, database: &str) -> Result<Self, Error> {
        let mut write_url: Url = format_sstr!("http://{host}:{port}/write").parse()?;
        write_url
            .query_pairs_mut()
            .append_pair("db", database)
            .append_pair("precision", "ns");
        let client = Client::builder().build()?;
        Ok(Self { client, write_url })
    }

    /// # Errors
    /// Return error if the url cannot be built or client setup fails
    pub fn from_config(config: &GarminConfig) -> Result<Self, Error> {
        Self::new(&config.influx_host, config.influx_port, &config.influx_db)
    }

    #[must_use]
    pub fn write_url(&self) -> &Url {
        &self.write_url
    }
}

#[async_trait]
impl PointSink for InfluxClient {
    async fn write_points(&self, points: &[InfluxPoint]) -> Result<(), Error> {
        if points.is_empty() {
            return Ok(());
        }
        let mut body = String::new();
        for point in points {
            body.push_str(&point.to_line_protocol()?);
            body.push('\n');
        }
        debug!("POST {} ({} points)", self.write_url, points.len());
        let response = self
            .client
            .post(self.write_url.clone())
            .body(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::InfluxWriteError(format_sstr!("{status} {text}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use maplit::btreemap;
    use time::macros::datetime;
    use wiremock::{
        matchers::{body_string, method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    use crate::{
        errors::GarminImportError as Error,
        influx_client::{InfluxClient, PointSink},
        influx_point::{FieldValue, InfluxPoint},
    };

    fn test_points() -> Result<Vec<InfluxPoint>, Error> {
        let tags = btreemap! {"profile".into() => "jos".into()};
        let first = InfluxPoint::new(
            "heartrate",
            &tags,
            datetime!(2024-01-01 00:00 UTC),
            btreemap! {"bpm".into() => FieldValue::Integer(58)},
        )?;
        let second = InfluxPoint::new(
            "heartrate",
            &tags,
            datetime!(2024-01-01 00:02 UTC),
            btreemap! {"bpm".into() => FieldValue::Integer(61)},
        )?;
        Ok(vec![first, second])
    }

    #[test]
    fn test_write_url() -> Result<(), Error> {
        let client = InfluxClient::new("localhost", 8086, "garmin")?;
        assert_eq!(
            client.write_url().as_str(),
            "http://localhost:8086/write?db=garmin&precision=ns"
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_write_points() -> Result<(), Error> {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/write"))
            .and(query_param("db", "garmin"))
            .and(body_string(
                "heartrate,profile=jos bpm=58i 1704067200000000000\n\
                 heartrate,profile=jos bpm=61i 1704067320000000000\n",
            ))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;

        let addr = mock_server.address();
        let client = InfluxClient::new(&addr.ip().to_string(), addr.port(), "garmin")?;
        client.write_points(&test_points()?).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_write_points_empty_batch_is_not_sent() -> Result<(), Error> {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&mock_server)
            .await;

        let addr = mock_server.address();
        let client = InfluxClient::new(&addr.ip().to_string(), addr.port(), "garmin")?;
        client.write_points(&[]).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_write_points_server_error() -> Result<(), Error> {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/write"))
            .respond_with(ResponseTemplate::new(404).set_body_string("database not found"))
            .mount(&mock_server)
            .await;

        let addr = mock_server.address();
        let client = InfluxClient::new(&addr.ip().to_string(), addr.port(), "missing")?;
        let result = client.write_points(&test_points()?).await;
        assert!(matches!(result, Err(Error::InfluxWriteError(_))));
        Ok(())
    }
}
