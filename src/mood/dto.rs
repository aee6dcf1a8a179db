use serde::{Deserialize, Serialize};

use super::repo_types::MoodEntry;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MoodForm {
    pub mood: String,
    pub note: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ExerciseForm {
    pub exercise: String,
}

/// Shared by the dashboard page and `/api/mood`.
#[derive(Debug, Serialize)]
pub struct Dashboard {
    pub entries: Vec<MoodEntry>,
    pub labels: Vec<String>,
    pub values: Vec<usize>,
    pub mood_labels: Vec<&'static str>,
    pub streak: u32,
    pub latest_mood: &'static str,
}
