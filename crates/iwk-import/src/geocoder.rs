//! Reverse geocoding of delivery points into taxing jurisdictions

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use iwk_common::types::Jurisdiction;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

/// Default endpoint host for the Google geocoding API.
pub const DEFAULT_GEOCODING_BASE_URL: &str = "https://geocode.googleapis.com";

/// Path of the reverse geocoding endpoint, relative to the base URL.
const LOCATION_PATH: &str = "/v4beta/geocode/location";

/// Resolves a coordinate pair to the jurisdiction it falls under
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn resolve_jurisdiction(&self, latitude: f64, longitude: f64) -> Result<Jurisdiction>;
}

/// Google Geocoding API client
#[derive(Debug, Clone)]
pub struct GoogleGeocoder {
    client: Client,
    base_url: String,
    api_key: String,
}

impl GoogleGeocoder {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("iwk-import/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self::with_client(client, base_url, api_key))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl Geocoder for GoogleGeocoder {
    async fn resolve_jurisdiction(&self, latitude: f64, longitude: f64) -> Result<Jurisdiction> {
        let url = format!("{}{}", self.base_url, LOCATION_PATH);
        debug!(latitude, longitude, "Reverse geocoding delivery point");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("location.latitude", latitude.to_string()),
                ("location.longitude", longitude.to_string()),
                ("key", self.api_key.clone()),
            ])
            .send()
            .await
            .context("Geocoding request failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Geocoding API returned HTTP {}", status);
        }

        let body: GeocodeResponse = response
            .json()
            .await
            .context("Failed to decode geocoding response")?;

        extract_jurisdiction(&body)
    }
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeocodeResult {
    #[serde(default)]
    address_components: Vec<AddressComponent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddressComponent {
    #[serde(default)]
    long_text: String,
    #[serde(default)]
    types: Vec<String>,
}

/// Pull state, county and city out of the first result
fn extract_jurisdiction(body: &GeocodeResponse) -> Result<Jurisdiction> {
    let first = body
        .results
        .first()
        .context("Geocoding API returned no results")?;

    let mut jurisdiction = Jurisdiction::default();
    for component in &first.address_components {
        for kind in &component.types {
            match kind.as_str() {
                "administrative_area_level_1" => jurisdiction.state = component.long_text.clone(),
                "administrative_area_level_2" => {
                    jurisdiction.county = component
                        .long_text
                        .strip_suffix(" County")
                        .unwrap_or(&component.long_text)
                        .to_string();
                },
                "locality" => jurisdiction.city = component.long_text.clone(),
                _ => {},
            }
        }
    }

    Ok(jurisdiction)
}
