use axum::{
    http::header::SET_COOKIE,
    response::{AppendHeaders, IntoResponse, Redirect, Response},
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::cookies::{set_cookie, FLASH_COOKIE};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Success,
    Warning,
    Error,
}

/// One-shot message shown on the next rendered page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Flash {
    pub level: Level,
    pub text: String,
}

impl Flash {
    pub fn success(text: impl Into<String>) -> Self {
        Self { level: Level::Success, text: text.into() }
    }
    pub fn warning(text: impl Into<String>) -> Self {
        Self { level: Level::Warning, text: text.into() }
    }
    pub fn error(text: impl Into<String>) -> Self {
        Self { level: Level::Error, text: text.into() }
    }
}

pub fn encode(flashes: &[Flash]) -> String {
    let json = serde_json::to_vec(flashes).unwrap_or_default();
    URL_SAFE_NO_PAD.encode(json)
}

/// Tampered or stale cookies decode to nothing.
pub fn decode(raw: &str) -> Vec<Flash> {
    URL_SAFE_NO_PAD
        .decode(raw)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .unwrap_or_else(|| {
            if !raw.is_empty() {
                debug!("discarding undecodable flash cookie");
            }
            Vec::new()
        })
}

/// Redirect that carries `flashes` to the next page render.
pub fn redirect_with(to: &str, flashes: &[Flash], secure: bool) -> Response {
    let cookie = set_cookie(FLASH_COOKIE, &encode(flashes), 60, secure);
    (AppendHeaders([(SET_COOKIE, cookie)]), Redirect::to(to)).into_response()
}
