use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use super::{
    client::{PlacesError, PlacesQuery},
    filter::filter_veteran_places,
};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/veterans_nearby", get(veterans_nearby))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NearbyParams {
    pub place: Option<String>,
    pub lat: Option<String>,
    pub lng: Option<String>,
    pub radius: Option<String>,
}

impl NearbyParams {
    /// Coordinates win over a place name; unparsable numbers count as absent.
    fn query(&self) -> Option<PlacesQuery> {
        let num = |v: &Option<String>| v.as_deref().and_then(|s| s.trim().parse::<f64>().ok()).filter(|n| n.is_finite());
        if let (Some(lat), Some(lng)) = (num(&self.lat), num(&self.lng)) {
            return Some(PlacesQuery::near(lat, lng, num(&self.radius)));
        }
        let place = self.place.as_deref().map(str::trim).unwrap_or_default();
        (!place.is_empty()).then(|| PlacesQuery::Text { place: place.to_string() })
    }
}

#[derive(Debug, Default, Serialize)]
pub struct NearbyResponse {
    pub results: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl NearbyResponse {
    fn failed(error: impl Into<String>) -> Self {
        Self { error: Some(error.into()), ..Default::default() }
    }
}

impl From<PlacesError> for NearbyResponse {
    fn from(e: PlacesError) -> Self {
        Self {
            results: Vec::new(),
            details: e.details().map(str::to_string),
            error: Some(e.to_string()),
        }
    }
}

/// Always answers 200; failures travel in the `error` field.
#[instrument(skip(state))]
pub async fn veterans_nearby(
    State(state): State<AppState>,
    Query(params): Query<NearbyParams>,
) -> Json<NearbyResponse> {
    if !state.places.is_configured() {
        return Json(PlacesError::MissingApiKey.into());
    }
    let Some(query) = params.query() else {
        return Json(NearbyResponse::failed("Provide ?place=City, State"));
    };

    match state.places.search(&query).await {
        Ok(places) => {
            let total = places.len();
            let results = filter_veteran_places(places);
            info!(total, kept = results.len(), "veteran places found");
            Json(NearbyResponse { results, ..Default::default() })
        }
        Err(e) => {
            warn!(error = %e, "veteran places lookup failed");
            Json(e.into())
        }
    }
}
