use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

time::serde::format_description!(pub(crate) iso_day, Date, "[year]-[month]-[day]");

/// Mood labels, in chart order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Great,
    Good,
    Ok,
    Sad,
    Down,
    Angry,
    Anxious,
    Stressed,
}

impl Mood {
    pub const ALL: [Mood; 8] = [
        Mood::Great,
        Mood::Good,
        Mood::Ok,
        Mood::Sad,
        Mood::Down,
        Mood::Angry,
        Mood::Anxious,
        Mood::Stressed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Mood::Great => "great",
            Mood::Good => "good",
            Mood::Ok => "ok",
            Mood::Sad => "sad",
            Mood::Down => "down",
            Mood::Angry => "angry",
            Mood::Anxious => "anxious",
            Mood::Stressed => "stressed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL.into_iter().find(|m| m.as_str().eq_ignore_ascii_case(raw))
    }

    /// Position on the dashboard chart axis.
    pub fn index(self) -> usize {
        Self::ALL.iter().position(|m| *m == self).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MoodEntry {
    pub id: i64,
    pub user_id: Uuid,
    pub mood: String,
    pub note: String,
    pub session_id: String,
    #[serde(with = "iso_day")]
    pub day: Date,
    pub chat_user_text: String,
    pub chat_assistant_text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl MoodEntry {
    pub fn mood(&self) -> Option<Mood> {
        Mood::parse(&self.mood)
    }
}

/// Replacement values for a day's mood row.
#[derive(Debug, Clone, Default)]
pub struct MoodUpdate<'a> {
    pub mood: Option<Mood>,
    pub note: &'a str,
    pub session_id: &'a str,
    pub chat_user_text: &'a str,
    pub chat_assistant_text: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Exercise {
    Breathing,
    Grounding,
    Sleep,
}

impl Exercise {
    pub fn as_str(self) -> &'static str {
        match self {
            Exercise::Breathing => "breathing",
            Exercise::Grounding => "grounding",
            Exercise::Sleep => "sleep",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        [Exercise::Breathing, Exercise::Grounding, Exercise::Sleep]
            .into_iter()
            .find(|e| e.as_str() == raw.trim())
    }
}
