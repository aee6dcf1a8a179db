use std::collections::BTreeSet;

use serde::Serialize;
use time::{macros::format_description, Date, Duration};

use super::{
    dto::Dashboard,
    repo_types::{Mood, MoodEntry},
};

/// Consecutive days with an entry, ending today, or yesterday when today has
/// nothing logged yet.
pub fn current_streak<I>(days: I, today: Date) -> u32
where
    I: IntoIterator<Item = Date>,
{
    let days: BTreeSet<Date> = days.into_iter().collect();
    let mut cursor = if days.contains(&today) {
        today
    } else {
        today - Duration::days(1)
    };

    let mut streak = 0;
    while days.contains(&cursor) {
        streak += 1;
        cursor -= Duration::days(1);
    }
    streak
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ChartSeries {
    pub labels: Vec<String>,
    pub values: Vec<usize>,
}

/// One point per entry: "Mar 07" style label, mood position on the y axis.
/// Unrecognised moods sit at the bottom of the axis.
pub fn chart_series(entries: &[MoodEntry]) -> ChartSeries {
    let label_format = format_description!("[month repr:short] [day]");
    let mut series = ChartSeries::default();
    for entry in entries {
        let label = entry
            .created_at
            .format(label_format)
            .unwrap_or_else(|_| entry.day.to_string());
        series.labels.push(label);
        series.values.push(entry.mood().map_or(0, Mood::index));
    }
    series
}

/// Axis labels for the chart, in index order.
pub fn mood_labels() -> Vec<&'static str> {
    Mood::ALL.iter().map(|m| m.as_str()).collect()
}

/// Dashboard view of `entries` (oldest first) as seen on `today`.
pub fn dashboard(entries: Vec<MoodEntry>, today: Date) -> Dashboard {
    let ChartSeries { labels, values } = chart_series(&entries);
    let streak = current_streak(entries.iter().map(|e| e.day), today);
    let latest_mood = entries
        .last()
        .and_then(MoodEntry::mood)
        .unwrap_or(Mood::Ok)
        .as_str();
    Dashboard {
        entries,
        labels,
        values,
        mood_labels: mood_labels(),
        streak,
        latest_mood,
    }
}
