use crate::mood::repo_types::Mood;

/// Keyword groups checked in order; the first group with a hit decides.
const RULES: &[(&[&str], Mood, &str)] = &[
    (
        &["suicid", "kill myself", "end it", "can't go on"],
        Mood::Stressed,
        "flagged crisis language in chat",
    ),
    (
        &["panic", "panicking", "anxious", "anxiety", "overwhelmed"],
        Mood::Anxious,
        "detected anxious wording in chat",
    ),
    (
        &["angry", "mad", "pissed", "frustrated"],
        Mood::Angry,
        "detected anger/frustration in chat",
    ),
    (
        &["sad", "down", "depressed", "lonely"],
        Mood::Down,
        "detected low/sad wording in chat",
    ),
    (
        &["tired", "stressed", "burned out", "burnt out", "exhausted"],
        Mood::Stressed,
        "detected stress/fatigue in chat",
    ),
    (&["ok", "fine", "alright", "hanging in"], Mood::Ok, "neutral wording in chat"),
    (
        &["good", "great", "better today", "feeling better"],
        Mood::Good,
        "positive wording in chat",
    ),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectedMood {
    pub mood: Mood,
    pub note: &'static str,
}

/// Plain substring matching on the lower-cased text, so "mad" also fires on
/// "made". Crisis wording always wins.
pub fn detect_mood(text: &str) -> Option<DetectedMood> {
    let lowered = text.to_lowercase().replace('\u{2019}', "'");
    RULES
        .iter()
        .find(|(words, _, _)| words.iter().any(|w| lowered.contains(w)))
        .map(|&(_, mood, note)| DetectedMood { mood, note })
}

/// True when the text trips the crisis group.
pub fn is_crisis(text: &str) -> bool {
    detect_mood(text).is_some_and(|d| d.note == RULES[0].2)
}
