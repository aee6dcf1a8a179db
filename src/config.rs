use anyhow::Context;
use serde::Deserialize;
use time::{macros::format_description, UtcOffset};

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlacesConfig {
    pub api_key: Option<String>,
    pub endpoint: String,
    pub timeout_secs: u64,
}

/// Login throttling, modelled on django-axes.
#[derive(Debug, Clone, Deserialize)]
pub struct LockoutConfig {
    pub enabled: bool,
    pub failure_limit: i64,
    pub cooloff_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub session: SessionConfig,
    pub chat: ChatConfig,
    pub places: PlacesConfig,
    pub lockout: LockoutConfig,
    pub debug: bool,
    pub allowed_hosts: Vec<String>,
    pub local_offset: UtcOffset,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let session = SessionConfig {
            secret: std::env::var("SECRET_KEY").context("SECRET_KEY is not set")?,
            issuer: std::env::var("SESSION_ISSUER").unwrap_or_else(|_| "vetmh".into()),
            audience: std::env::var("SESSION_AUDIENCE").unwrap_or_else(|_| "vetmh-web".into()),
            ttl_minutes: parse_or("SESSION_TTL_MINUTES", 60 * 24 * 14),
        };
        let chat = ChatConfig {
            api_key: non_empty("OPENAI_API_KEY"),
            model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into()),
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".into()),
            timeout_secs: parse_or("OPENAI_TIMEOUT_SECS", 30),
        };
        let places = PlacesConfig {
            api_key: non_empty("GOOGLE_MAPS_API_KEY"),
            endpoint: std::env::var("PLACES_ENDPOINT")
                .unwrap_or_else(|_| "https://places.googleapis.com/v1/places:searchText".into()),
            timeout_secs: parse_or("PLACES_TIMEOUT_SECS", 15),
        };
        let lockout = LockoutConfig {
            enabled: flag("AXES_ENABLED", false),
            failure_limit: parse_or("AXES_FAILURE_LIMIT", 5),
            cooloff_minutes: parse_or("AXES_COOLOFF_MINUTES", 60),
        };
        let allowed_hosts = split_hosts(
            &std::env::var("ALLOWED_HOSTS").unwrap_or_else(|_| "localhost 127.0.0.1".into()),
        );
        let local_offset = match std::env::var("LOCAL_UTC_OFFSET") {
            Ok(raw) => parse_offset(&raw)?,
            Err(_) => UtcOffset::UTC,
        };

        Ok(Self {
            database_url,
            session,
            chat,
            places,
            lockout,
            debug: flag("DEBUG", true),
            allowed_hosts,
            local_offset,
        })
    }
}

fn non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

/// Hosts may be separated by commas, whitespace, or both.
pub(crate) fn split_hosts(raw: &str) -> Vec<String> {
    raw.replace(',', " ")
        .split_whitespace()
        .map(|h| h.to_lowercase())
        .collect()
}

pub(crate) fn parse_offset(raw: &str) -> anyhow::Result<UtcOffset> {
    UtcOffset::parse(
        raw.trim(),
        format_description!("[offset_hour sign:mandatory]:[offset_minute]"),
    )
    .with_context(|| format!("LOCAL_UTC_OFFSET must look like -08:00, got {raw:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hosts_accept_commas_and_spaces() {
        assert_eq!(
            split_hosts("localhost, 127.0.0.1  Example.org"),
            vec!["localhost", "127.0.0.1", "example.org"]
        );
        assert!(split_hosts("  ").is_empty());
    }

    #[test]
    fn offsets_parse_with_sign() {
        assert_eq!(parse_offset("-08:00").unwrap(), UtcOffset::from_hms(-8, 0, 0).unwrap());
        assert_eq!(parse_offset("+05:30").unwrap(), UtcOffset::from_hms(5, 30, 0).unwrap());
        assert!(parse_offset("PST").is_err());
    }
}
