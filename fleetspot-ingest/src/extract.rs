//! Free-text field extraction
//!
//! Pulls a candidate plate and a borough out of whatever the sender typed.
//! All matching runs over the trimmed, uppercased text.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::Borough;

/// Plate patterns in priority order; group 1 is always the six digits
static PLATE_PATTERNS: Lazy<[Regex; 4]> = Lazy::new(|| {
    [
        Regex::new(r"\bT(\d{6})C\b").unwrap(),
        Regex::new(r"\b(\d{6})\b").unwrap(),
        Regex::new(r"\bT(\d{6})\b").unwrap(),
        Regex::new(r"\b(\d{6})C\b").unwrap(),
    ]
});

/// Isolated single letters, one per borough code
static CODE_PATTERNS: Lazy<Vec<(Regex, Borough)>> = Lazy::new(|| {
    Borough::ALL
        .into_iter()
        .map(|b| (Regex::new(&format!(r"\b{}\b", b.code())).unwrap(), b))
        .collect()
});

/// Whole-input names and short codes
const EXACT_NAMES: &[(&str, Borough)] = &[
    ("B", Borough::Brooklyn),
    ("BROOKLYN", Borough::Brooklyn),
    ("BK", Borough::Brooklyn),
    ("M", Borough::Manhattan),
    ("MANHATTAN", Borough::Manhattan),
    ("Q", Borough::Queens),
    ("QUEENS", Borough::Queens),
    ("X", Borough::Bronx),
    ("BRONX", Borough::Bronx),
    ("S", Borough::StatenIsland),
    ("SI", Borough::StatenIsland),
    ("STATEN ISLAND", Borough::StatenIsland),
];

/// Substrings searched anywhere in the text, in this order
const CONTAINED_NAMES: &[(&str, Borough)] = &[
    ("BROOKLYN", Borough::Brooklyn),
    ("MANHATTAN", Borough::Manhattan),
    ("QUEENS", Borough::Queens),
    ("BRONX", Borough::Bronx),
    ("STATEN ISLAND", Borough::StatenIsland),
    ("BK", Borough::Brooklyn),
];

/// Extract a normalized `T######C` plate, or `None`
///
/// Patterns are tried in a fixed order and the first match wins.
pub fn extract_plate(text: &str) -> Option<String> {
    let normalized = text.trim().to_uppercase();
    if normalized.is_empty() {
        return None;
    }

    PLATE_PATTERNS.iter().enumerate().find_map(|(index, re)| {
        let digits = re.captures(&normalized)?.get(1)?.as_str();
        tracing::trace!(pattern = index, digits = %digits, "Plate pattern matched");
        Some(format!("T{}C", digits))
    })
}

/// Parse the entire input as a borough name or code
pub fn parse_borough(text: &str) -> Option<Borough> {
    let normalized = text.trim().to_uppercase();
    EXACT_NAMES
        .iter()
        .find(|(name, _)| *name == normalized)
        .map(|(_, borough)| *borough)
}

/// Find a borough anywhere in the text
///
/// Exact whole-input parse first, then contained names, then an isolated
/// single-letter code. The last step can misfire on a stray letter such as
/// the "M" in "I'M ON 5TH"; that behavior is kept as is.
pub fn extract_borough(text: &str) -> Option<Borough> {
    if let Some(borough) = parse_borough(text) {
        return Some(borough);
    }

    let normalized = text.trim().to_uppercase();
    if normalized.is_empty() {
        return None;
    }

    if let Some((_, borough)) = CONTAINED_NAMES
        .iter()
        .find(|(name, _)| normalized.contains(name))
    {
        return Some(*borough);
    }

    CODE_PATTERNS
        .iter()
        .find(|(re, _)| re.is_match(&normalized))
        .map(|(_, borough)| *borough)
}
