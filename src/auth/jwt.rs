use std::time::Duration;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, HeaderMap},
    response::{IntoResponse, Redirect, Response},
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{config::SessionConfig, state::AppState, web::cookies::{get_cookie, SESSION_COOKIE}};

/// Session token payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,        // user ID
    pub sid: Uuid,        // login session, scopes chat history
    pub name: String,     // username, for page chrome
    pub exp: usize,
    pub iat: usize,
    pub iss: String,
    pub aud: String,
}

#[derive(Clone)]
pub struct SessionKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
}

impl FromRef<AppState> for SessionKeys {
    fn from_ref(state: &AppState) -> Self {
        SessionKeys::from_config(&state.config.session)
    }
}

impl SessionKeys {
    pub fn from_config(cfg: &SessionConfig) -> Self {
        let SessionConfig {
            secret,
            issuer,
            audience,
            ttl_minutes,
        } = cfg.clone();
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
            audience,
            ttl: Duration::from_secs((ttl_minutes.max(1) as u64) * 60),
        }
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl.as_secs() as i64
    }

    /// Mints a token for a fresh login session.
    pub fn sign(&self, user_id: Uuid, username: &str) -> anyhow::Result<(String, Uuid)> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(self.ttl_secs());
        let sid = Uuid::new_v4();
        let claims = Claims {
            sub: user_id,
            sid,
            name: username.to_string(),
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, session_id = %sid, "session token signed");
        Ok((token, sid))
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }
}

/// Session cookie first, then `Authorization: Bearer`.
pub(crate) fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    get_cookie(headers, SESSION_COOKIE).filter(|t| !t.is_empty()).or_else(|| {
        headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::to_string)
    })
}

/// Signed-in user. Rejects page requests with a redirect to the login form.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub session_id: Uuid,
    pub username: String,
}

impl AuthUser {
    pub fn session_key(&self) -> String {
        self.session_id.simple().to_string()
    }
}

pub struct LoginRedirect(String);

impl IntoResponse for LoginRedirect {
    fn into_response(self) -> Response {
        Redirect::to(&self.0).into_response()
    }
}

pub(crate) fn login_url(next: &str) -> String {
    match Url::parse("http://localhost/login/") {
        Ok(mut url) => {
            url.query_pairs_mut().append_pair("next", next);
            format!("{}?{}", url.path(), url.query().unwrap_or_default())
        }
        Err(_) => "/login/".to_string(),
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    SessionKeys: FromRef<S>,
{
    type Rejection = LoginRedirect;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let back_to = parts.uri.path_and_query().map_or(parts.uri.path(), |pq| pq.as_str());
        let redirect = || LoginRedirect(login_url(back_to));
        let token = token_from_headers(&parts.headers).ok_or_else(redirect)?;

        let keys = SessionKeys::from_ref(state);
        let claims = match keys.verify(&token) {
            Ok(c) => c,
            Err(_) => {
                warn!("invalid or expired session token");
                return Err(redirect());
            }
        };

        Ok(AuthUser {
            user_id: claims.sub,
            session_id: claims.sid,
            username: claims.name,
        })
    }
}
