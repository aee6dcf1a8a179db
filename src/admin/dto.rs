use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::mood::repo_types::iso_day;

pub const DEFAULT_LIMIT: i64 = 50;
pub const MAX_LIMIT: i64 = 200;

/// Query string shared by all listings; each listing reads its own filter.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListParams {
    pub q: Option<String>,
    pub mood: Option<String>,
    pub event: Option<String>,
    pub role: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListParams {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }

    /// `ILIKE` pattern for the search box, wildcards in the input escaped.
    pub fn pattern(&self) -> Option<String> {
        let q = self.q.as_deref().map(str::trim).filter(|q| !q.is_empty())?;
        let escaped = q.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
        Some(format!("%{escaped}%"))
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Serialize, FromRow)]
pub struct MoodEntryRow {
    pub id: i64,
    pub username: String,
    pub mood: String,
    pub note: String,
    pub session_id: String,
    #[serde(with = "iso_day")]
    pub day: Date,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Serialize, FromRow)]
pub struct LoginEventRow {
    pub id: i64,
    pub user_id: Option<Uuid>,
    pub username: Option<String>,
    pub event: String,
    pub ip_address: Option<String>,
    pub user_agent: String,
    pub username_tried: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Serialize, FromRow)]
pub struct ChatMessageRow {
    pub id: i64,
    pub username: Option<String>,
    pub session_id: String,
    pub role: String,
    pub content: String,
    pub meta: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
