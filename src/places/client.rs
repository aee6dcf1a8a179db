use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::PlacesConfig;

const FIELD_MASK: &str = "places.id,places.displayName,places.formattedAddress,places.types,\
places.location,places.nationalPhoneNumber,places.internationalPhoneNumber,\
places.websiteUri,places.googleMapsUri";

const VETERAN_TERMS: &str = r#"(VA OR Veterans OR "Vet Center" OR "American Legion" OR VFW OR DAV)"#;
const PAGE_SIZE: u32 = 20;

pub const DEFAULT_RADIUS_M: f64 = 40_000.0;
pub const MAX_RADIUS_M: f64 = 50_000.0;

#[derive(Debug, Clone, PartialEq)]
pub enum PlacesQuery {
    Text { place: String },
    Near { lat: f64, lng: f64, radius_m: f64 },
}

impl PlacesQuery {
    pub fn near(lat: f64, lng: f64, radius_m: Option<f64>) -> Self {
        let radius_m = radius_m
            .filter(|r| r.is_finite() && *r > 0.0)
            .unwrap_or(DEFAULT_RADIUS_M)
            .min(MAX_RADIUS_M);
        Self::Near { lat, lng, radius_m }
    }

    /// `searchText` request body.
    pub fn body(&self) -> Value {
        match self {
            PlacesQuery::Text { place } => json!({
                "textQuery": format!("{VETERAN_TERMS} in {place}"),
                "pageSize": PAGE_SIZE,
            }),
            PlacesQuery::Near { lat, lng, radius_m } => json!({
                "textQuery": VETERAN_TERMS,
                "pageSize": PAGE_SIZE,
                "locationBias": {
                    "circle": {
                        "center": { "latitude": lat, "longitude": lng },
                        "radius": radius_m,
                    }
                },
            }),
        }
    }
}

#[derive(Debug, Error)]
pub enum PlacesError {
    #[error("Missing GOOGLE_MAPS_API_KEY")]
    MissingApiKey,
    #[error("TextSearch {status}")]
    Upstream { status: u16, details: String },
    #[error("Upstream timeout")]
    Timeout,
    #[error("Upstream request failed")]
    Request(String),
}

impl PlacesError {
    pub fn details(&self) -> Option<&str> {
        match self {
            PlacesError::Upstream { details, .. } | PlacesError::Request(details) => Some(details),
            PlacesError::MissingApiKey | PlacesError::Timeout => None,
        }
    }
}

impl From<reqwest::Error> for PlacesError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            PlacesError::Timeout
        } else {
            PlacesError::Request(e.to_string())
        }
    }
}

/// A places text-search service.
#[async_trait]
pub trait PlacesBackend: Send + Sync {
    fn is_configured(&self) -> bool;
    /// Raw place objects as returned upstream, unfiltered.
    async fn search(&self, query: &PlacesQuery) -> Result<Vec<Value>, PlacesError>;
}

/// Google Places API (New) `places:searchText`.
pub struct GooglePlaces {
    http: reqwest::Client,
    cfg: PlacesConfig,
}

impl GooglePlaces {
    pub fn new(http: reqwest::Client, cfg: PlacesConfig) -> Self {
        Self { http, cfg }
    }

    fn headers(&self, key: &str) -> Result<HeaderMap, PlacesError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(key).map_err(|e| PlacesError::Request(e.to_string()))?,
        );
        headers.insert("x-goog-fieldmask", HeaderValue::from_static(FIELD_MASK));
        Ok(headers)
    }
}

#[async_trait]
impl PlacesBackend for GooglePlaces {
    fn is_configured(&self) -> bool {
        self.cfg.api_key.is_some()
    }

    async fn search(&self, query: &PlacesQuery) -> Result<Vec<Value>, PlacesError> {
        let key = self.cfg.api_key.as_deref().ok_or(PlacesError::MissingApiKey)?;
        debug!(?query, "places text search");

        let res = self
            .http
            .post(&self.cfg.endpoint)
            .headers(self.headers(key)?)
            .timeout(Duration::from_secs(self.cfg.timeout_secs))
            .json(&query.body())
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let details = res.text().await.unwrap_or_default();
            warn!(%status, "places search rejected");
            return Err(PlacesError::Upstream { status: status.as_u16(), details });
        }

        let body: Value = res.json().await?;
        Ok(match body.get("places") {
            Some(Value::Array(places)) => places.clone(),
            _ => Vec::new(),
        })
    }
}
