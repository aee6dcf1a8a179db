use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

lazy_static! {
    static ref VET_REGEX: Regex = Regex::new(
        r"(?i)\b(va|veterans?|vet\s*center|department of veterans affairs|county veterans service|vfw|american legion|dav|amvets|us\s*vets)\b"
    )
    .expect("veteran pattern compiles");
}

/// "<display name> <address>" of a place object; missing parts are empty.
fn haystack(place: &Value) -> String {
    let name = place
        .get("displayName")
        .and_then(|d| d.get("text"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    let addr = place
        .get("formattedAddress")
        .and_then(Value::as_str)
        .unwrap_or_default();
    format!("{name} {addr}")
}

/// Keeps the places whose name or address reads as a veteran service.
pub fn filter_veteran_places(places: Vec<Value>) -> Vec<Value> {
    places
        .into_iter()
        .filter(|p| VET_REGEX.is_match(&haystack(p)))
        .collect()
}
