//! Plate validation against the vehicle registry
//!
//! Registry membership is the only definition of a valid plate. Misses can be
//! recovered with a wildcard search or with typo-tolerant fuzzy suggestions.

use fleetspot_common::db::RegistryEntry;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::db::registry;
use crate::error::IngestResult;

/// Matches exactly one arbitrary character in a wildcard pattern
pub const WILDCARD: char = '*';

/// Fuzzy suggestions differ from the candidate in at most this many positions
pub const MAX_FUZZY_DIFFERENCES: usize = 2;

/// Outcome of an exact registry lookup
#[derive(Debug, Clone, PartialEq)]
pub enum PlateCheck {
    Registered(RegistryEntry),
    Unregistered,
}

impl PlateCheck {
    pub fn is_valid(&self) -> bool {
        matches!(self, PlateCheck::Registered(_))
    }
}

/// Registered plate close to a rejected candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlateSuggestion {
    pub plate: String,
    pub differences: usize,
}

fn normalize(plate: &str) -> String {
    plate.trim().to_uppercase()
}

/// Count of differing positions, or `None` when lengths differ
pub fn position_differences(a: &str, b: &str) -> Option<usize> {
    if a.chars().count() != b.chars().count() {
        return None;
    }
    Some(a.chars().zip(b.chars()).filter(|(x, y)| x != y).count())
}

/// True when `plate` matches `pattern` at every non-wildcard position
pub fn matches_wildcard(pattern: &str, plate: &str) -> bool {
    pattern.chars().count() == plate.chars().count()
        && pattern
            .chars()
            .zip(plate.chars())
            .all(|(p, c)| p == WILDCARD || p == c)
}

/// Rank registered plates against a candidate
///
/// Keeps plates with 1 to [`MAX_FUZZY_DIFFERENCES`] differing positions, sorted
/// ascending by difference count. Input order breaks ties.
pub fn rank_fuzzy<'a>(
    candidate: &str,
    plates: impl IntoIterator<Item = &'a str>,
    max_results: usize,
) -> Vec<PlateSuggestion> {
    let mut ranked: Vec<PlateSuggestion> = plates
        .into_iter()
        .filter_map(|plate| {
            let differences = position_differences(candidate, plate)?;
            (1..=MAX_FUZZY_DIFFERENCES)
                .contains(&differences)
                .then(|| PlateSuggestion {
                    plate: plate.to_string(),
                    differences,
                })
        })
        .collect();
    ranked.sort_by_key(|s| s.differences);
    ranked.truncate(max_results);
    ranked
}

/// Registry-backed plate validator
#[derive(Clone)]
pub struct PlateValidator {
    db: SqlitePool,
}

impl PlateValidator {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Exact, case-normalized registry lookup
    pub async fn validate(&self, plate: &str) -> IngestResult<PlateCheck> {
        let plate = normalize(plate);
        let check = match registry::find_by_plate(&self.db, &plate).await? {
            Some(entry) => PlateCheck::Registered(entry),
            None => PlateCheck::Unregistered,
        };
        tracing::debug!(plate = %plate, valid = check.is_valid(), "Plate validated");
        Ok(check)
    }

    /// Registry entries matching a pattern where `*` stands for any one character
    pub async fn wildcard_search(&self, pattern: &str) -> IngestResult<Vec<RegistryEntry>> {
        let pattern = normalize(pattern);
        let entries = registry::entries_with_length(&self.db, pattern.chars().count()).await?;
        Ok(entries
            .into_iter()
            .filter(|entry| matches_wildcard(&pattern, &entry.plate))
            .collect())
    }

    /// Registered plates one or two characters away from `candidate`
    pub async fn fuzzy_matches(
        &self,
        candidate: &str,
        max_results: usize,
    ) -> IngestResult<Vec<PlateSuggestion>> {
        let candidate = normalize(candidate);
        let plates = registry::plates_with_length(&self.db, candidate.chars().count()).await?;
        let suggestions = rank_fuzzy(&candidate, plates.iter().map(String::as_str), max_results);
        tracing::debug!(
            candidate = %candidate,
            suggestions = suggestions.len(),
            "Fuzzy plate matching"
        );
        Ok(suggestions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_differences() {
        assert_eq!(position_differences("T123456C", "T123456C"), Some(0));
        assert_eq!(position_differences("T123456C", "T123457C"), Some(1));
        assert_eq!(position_differences("T123456C", "T12345C"), None);
    }

    #[test]
    fn test_wildcard_matches_single_positions() {
        assert!(matches_wildcard("T12**56C", "T123456C"));
        assert!(matches_wildcard("********", "T123456C"));
        assert!(!matches_wildcard("T12**56C", "T123457C"));
        assert!(!matches_wildcard("T12*56C", "T123456C"));
    }

    #[test]
    fn test_fuzzy_excludes_exact_and_far_matches() {
        let plates = ["T123456C", "T123457C", "T124457C", "T999999C"];
        let ranked = rank_fuzzy("T123456C", plates, 5);
        assert_eq!(
            ranked,
            vec![
                PlateSuggestion { plate: "T123457C".to_string(), differences: 1 },
                PlateSuggestion { plate: "T124457C".to_string(), differences: 2 },
            ]
        );
    }

    #[test]
    fn test_fuzzy_sorted_ascending_and_truncated() {
        let plates = ["T100056C", "T123450C", "T120056C", "T123406C", "T023456C", "T123455C"];
        let ranked = rank_fuzzy("T123456C", plates, 3);
        assert_eq!(ranked.len(), 3);
        assert!(ranked.iter().all(|s| s.differences == 1));
        assert_eq!(ranked[0].plate, "T123450C");
    }

    #[test]
    fn test_fuzzy_ignores_other_lengths() {
        assert!(rank_fuzzy("T123456C", ["T12345C", "T1234567C"], 5).is_empty());
    }
}
