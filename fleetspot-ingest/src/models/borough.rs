//! Borough names and codes

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the five covered boroughs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Borough {
    Brooklyn,
    Manhattan,
    Queens,
    Bronx,
    StatenIsland,
}

impl Borough {
    /// Fixed enumeration order, also the priority of the single-letter fallback
    pub const ALL: [Borough; 5] = [
        Borough::Brooklyn,
        Borough::Manhattan,
        Borough::Queens,
        Borough::Bronx,
        Borough::StatenIsland,
    ];

    /// Canonical display name, also the stored form
    pub fn name(&self) -> &'static str {
        match self {
            Borough::Brooklyn => "Brooklyn",
            Borough::Manhattan => "Manhattan",
            Borough::Queens => "Queens",
            Borough::Bronx => "Bronx",
            Borough::StatenIsland => "Staten Island",
        }
    }

    /// Single-letter code
    pub fn code(&self) -> char {
        match self {
            Borough::Brooklyn => 'B',
            Borough::Manhattan => 'M',
            Borough::Queens => 'Q',
            Borough::Bronx => 'X',
            Borough::StatenIsland => 'S',
        }
    }
}

impl fmt::Display for Borough {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Borough {
    type Err = String;

    /// Parses the stored canonical name (case-insensitive)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Borough::ALL
            .into_iter()
            .find(|b| b.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("Unknown borough: {}", s))
    }
}
