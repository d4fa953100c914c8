use std::time::Duration;

use agentmart_core::config::GeocodingConfig;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
    pub formatted_address: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GeocodeError {
    #[error("geocoding API key is not configured")]
    MissingApiKey,
    #[error("geocoding request failed: {0}")]
    Transport(String),
    #[error("geocoding error: {status}. {message}")]
    Status { status: String, message: String },
    #[error("geocoding response is malformed: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, address: &str) -> Result<Coordinates, GeocodeError>;
}

/// Google Geocoding API lookup.
pub struct GoogleGeocoder {
    http: Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl GoogleGeocoder {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, GeocodeError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| GeocodeError::Transport(error.to_string()))?;
        Ok(Self { http, base_url: base_url.into(), api_key })
    }

    pub fn from_config(config: &GeocodingConfig) -> Result<Self, GeocodeError> {
        Self::new(
            config.base_url.clone(),
            config.api_key.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }
}

impl std::fmt::Debug for GoogleGeocoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleGeocoder")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl Geocoder for GoogleGeocoder {
    async fn geocode(&self, address: &str) -> Result<Coordinates, GeocodeError> {
        let key = self
            .api_key
            .as_ref()
            .map(|key| key.expose_secret())
            .filter(|key| !key.trim().is_empty())
            .ok_or(GeocodeError::MissingApiKey)?;

        let payload: Value = self
            .http
            .get(&self.base_url)
            .query(&[("address", address), ("key", key)])
            .send()
            .await
            .map_err(|error| GeocodeError::Transport(error.to_string()))?
            .json()
            .await
            .map_err(|error| GeocodeError::InvalidResponse(error.to_string()))?;

        parse_geocode_response(&payload)
    }
}

pub(crate) fn parse_geocode_response(payload: &Value) -> Result<Coordinates, GeocodeError> {
    let status = payload.get("status").and_then(Value::as_str).unwrap_or("UNKNOWN");
    if status != "OK" {
        let message =
            payload.get("error_message").and_then(Value::as_str).unwrap_or_default().to_string();
        return Err(GeocodeError::Status { status: status.to_string(), message });
    }

    let first = payload
        .get("results")
        .and_then(|results| results.get(0))
        .ok_or_else(|| GeocodeError::InvalidResponse("no results".to_string()))?;
    let location = &first["geometry"]["location"];
    let lat = location["lat"]
        .as_f64()
        .ok_or_else(|| GeocodeError::InvalidResponse("missing latitude".to_string()))?;
    let lng = location["lng"]
        .as_f64()
        .ok_or_else(|| GeocodeError::InvalidResponse("missing longitude".to_string()))?;
    let formatted_address = first["formatted_address"]
        .as_str()
        .ok_or_else(|| GeocodeError::InvalidResponse("missing formatted_address".to_string()))?
        .to_string();

    Ok(Coordinates { lat, lng, formatted_address })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::{parse_geocode_response, GeocodeError, Geocoder, GoogleGeocoder};

    #[test]
    fn parses_first_result() {
        let payload = json!({
            "status": "OK",
            "results": [{
                "formatted_address": "1 Apple Park Way, Cupertino, CA 95014, USA",
                "geometry": { "location": { "lat": 37.3349, "lng": -122.009 } }
            }]
        });

        let coordinates = parse_geocode_response(&payload).expect("coordinates");
        assert_eq!(coordinates.formatted_address, "1 Apple Park Way, Cupertino, CA 95014, USA");
        assert!((coordinates.lat - 37.3349).abs() < f64::EPSILON);
        assert!((coordinates.lng + 122.009).abs() < f64::EPSILON);
    }

    #[test]
    fn non_ok_status_is_an_error() {
        let payload = json!({ "status": "ZERO_RESULTS", "results": [] });
        assert_eq!(
            parse_geocode_response(&payload),
            Err(GeocodeError::Status { status: "ZERO_RESULTS".to_string(), message: String::new() })
        );

        let payload = json!({ "status": "REQUEST_DENIED", "error_message": "bad key" });
        let error = parse_geocode_response(&payload).expect_err("denied");
        assert_eq!(error.to_string(), "geocoding error: REQUEST_DENIED. bad key");
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let geocoder = GoogleGeocoder::new("http://127.0.0.1:9", None, Duration::from_secs(1))
            .expect("geocoder should build");
        assert_eq!(geocoder.geocode("anywhere").await, Err(GeocodeError::MissingApiKey));
    }
}
