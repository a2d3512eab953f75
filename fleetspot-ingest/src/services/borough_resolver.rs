//! GPS coordinate to borough resolution
//!
//! Boroughs are approximated by rectangles that overlap along shared edges.
//! Overlaps are settled by the tie-break rules below, in order, and otherwise
//! by the first matching rectangle.

use crate::models::Borough;

/// Inclusive bounding rectangle for one borough
#[derive(Debug, Clone, Copy)]
struct Bounds {
    borough: Borough,
    min_lat: f64,
    max_lat: f64,
    min_lon: f64,
    max_lon: f64,
}

impl Bounds {
    fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat) && (self.min_lon..=self.max_lon).contains(&lon)
    }
}

/// Rectangles in match order
const BOUNDS: [Bounds; 5] = [
    Bounds {
        borough: Borough::Bronx,
        min_lat: 40.785,
        max_lat: 40.917,
        min_lon: -73.934,
        max_lon: -73.749,
    },
    Bounds {
        borough: Borough::StatenIsland,
        min_lat: 40.477,
        max_lat: 40.651,
        min_lon: -74.256,
        max_lon: -74.050,
    },
    Bounds {
        borough: Borough::Queens,
        min_lat: 40.541,
        max_lat: 40.800,
        min_lon: -73.962,
        max_lon: -73.700,
    },
    Bounds {
        borough: Borough::Manhattan,
        min_lat: 40.700,
        max_lat: 40.882,
        min_lon: -74.019,
        max_lon: -73.907,
    },
    Bounds {
        borough: Borough::Brooklyn,
        min_lat: 40.570,
        max_lat: 40.740,
        min_lon: -74.042,
        max_lon: -73.833,
    },
];

/// Overlap rule: prefer `prefer` when it matched and the point satisfies the condition
#[derive(Debug, Clone, Copy)]
struct TieBreak {
    prefer: Borough,
    /// Point must be strictly south of this latitude
    below_lat: Option<f64>,
    /// Point must be strictly north of this latitude
    above_lat: Option<f64>,
    /// Point must be strictly west of this longitude
    west_of_lon: Option<f64>,
}

impl TieBreak {
    fn applies(&self, lat: f64, lon: f64) -> bool {
        self.below_lat.map_or(true, |t| lat < t)
            && self.above_lat.map_or(true, |t| lat > t)
            && self.west_of_lon.map_or(true, |t| lon < t)
    }
}

/// Tie-breaks, checked in order when more than one rectangle matches
const TIE_BREAKS: [TieBreak; 2] = [
    // Lower Manhattan against downtown Brooklyn
    TieBreak {
        prefer: Borough::Manhattan,
        below_lat: Some(40.71),
        above_lat: None,
        west_of_lon: None,
    },
    // North Brooklyn against Manhattan and western Queens
    TieBreak {
        prefer: Borough::Brooklyn,
        below_lat: None,
        above_lat: Some(40.73),
        west_of_lon: Some(-73.90),
    },
];

/// Every borough whose rectangle contains the point, in match order
pub fn matching_boroughs(lat: f64, lon: f64) -> Vec<Borough> {
    BOUNDS
        .iter()
        .filter(|b| b.contains(lat, lon))
        .map(|b| b.borough)
        .collect()
}

/// Resolve coordinates to a borough, or `None` outside coverage
pub fn resolve_borough(lat: f64, lon: f64) -> Option<Borough> {
    let matches = matching_boroughs(lat, lon);
    match matches.as_slice() {
        [] => None,
        [only] => Some(*only),
        [first, ..] => {
            let preferred = TIE_BREAKS
                .iter()
                .find(|rule| matches.contains(&rule.prefer) && rule.applies(lat, lon))
                .map(|rule| rule.prefer);
            tracing::trace!(lat, lon, candidates = ?matches, ?preferred, "Borough overlap");
            Some(preferred.unwrap_or(*first))
        }
    }
}
