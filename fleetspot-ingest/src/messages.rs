//! Reply texts sent back to senders

use std::fmt;

/// Every reply the service can send
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Help,
    Cancelled,
    /// Photo received, plate still needed
    RequestPlate { name: Option<String> },
    RequestBorough,
    InvalidBorough,
    PlateNotFound {
        candidate: String,
        suggestions: Vec<String>,
    },
    DuplicatePhoto,
    Confirmed {
        plate: String,
        vehicle_count: i64,
        total_count: i64,
        contributor_count: i64,
        ask_name: bool,
    },
    NameSaved(String),
    NameAlreadySet(String),
    NameNotSaved,
    StayAnonymous,
    NameTooLong { max: usize },
    GenericError,
}

fn ordinal(n: i64) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{}{}", n, suffix)
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Help => f.write_str(
                "Send a photo of a vehicle to log a sighting. Include the plate (e.g. T123456C) \
                 and borough if you know them. Reply CANCEL to start over.",
            ),
            Reply::Cancelled => f.write_str("Sighting cancelled. Send a new photo anytime!"),
            Reply::RequestPlate { name: Some(name) } => write!(
                f,
                "Thanks {}! What's the plate number? (e.g. T123456C)",
                name
            ),
            Reply::RequestPlate { name: None } => {
                f.write_str("Thanks for the photo! What's the plate number? (e.g. T123456C)")
            }
            Reply::RequestBorough => f.write_str(
                "Which borough was this in? Reply B (Brooklyn), M (Manhattan), Q (Queens), \
                 X (Bronx) or S (Staten Island).",
            ),
            Reply::InvalidBorough => f.write_str(
                "Sorry, I didn't recognize that borough. Reply B, M, Q, X or S.",
            ),
            Reply::PlateNotFound {
                candidate,
                suggestions,
            } => {
                write!(f, "{} isn't in the registry.", candidate)?;
                if suggestions.is_empty() {
                    f.write_str(" Please check the plate and try again.")
                } else {
                    write!(f, " Did you mean: {}?", suggestions.join(", "))
                }
            }
            Reply::DuplicatePhoto => f.write_str(
                "You've already submitted this exact photo. Send a new photo to log another sighting!",
            ),
            Reply::Confirmed {
                plate,
                vehicle_count,
                total_count,
                contributor_count,
                ask_name,
            } => {
                write!(
                    f,
                    "Logged {}! That's the {} sighting of this vehicle and sighting #{} overall. \
                     You've contributed {}.",
                    plate,
                    ordinal(*vehicle_count),
                    total_count,
                    contributor_count
                )?;
                if *ask_name {
                    f.write_str(
                        "\n\nWould you like to set a name for future posts? \
                         Reply with your name, or SKIP to remain anonymous.",
                    )?;
                }
                Ok(())
            }
            Reply::NameSaved(name) => write!(
                f,
                "Great! Future posts will credit you as '{}'. Send a new photo anytime!",
                name
            ),
            Reply::NameAlreadySet(name) => write!(
                f,
                "Posts already credit you as '{}'. Send a new photo anytime!",
                name
            ),
            Reply::NameNotSaved => f.write_str("Error setting name. Send a new photo anytime!"),
            Reply::StayAnonymous => {
                f.write_str("No problem, you'll remain anonymous. Send a new photo anytime!")
            }
            Reply::NameTooLong { max } => write!(
                f,
                "Name is too long (max {} characters). Please try again or reply SKIP.",
                max
            ),
            Reply::GenericError => {
                f.write_str("Sorry, something went wrong. Please send your photo again.")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordinals() {
        assert_eq!(ordinal(1), "1st");
        assert_eq!(ordinal(2), "2nd");
        assert_eq!(ordinal(3), "3rd");
        assert_eq!(ordinal(11), "11th");
        assert_eq!(ordinal(22), "22nd");
        assert_eq!(ordinal(113), "113th");
    }

    #[test]
    fn test_plate_not_found_lists_suggestions() {
        let reply = Reply::PlateNotFound {
            candidate: "T123456C".to_string(),
            suggestions: vec!["T123457C".to_string(), "T123466C".to_string()],
        };
        assert_eq!(
            reply.to_string(),
            "T123456C isn't in the registry. Did you mean: T123457C, T123466C?"
        );
    }

    #[test]
    fn test_confirmation_with_name_prompt() {
        let reply = Reply::Confirmed {
            plate: "T123456C".to_string(),
            vehicle_count: 2,
            total_count: 40,
            contributor_count: 3,
            ask_name: true,
        };
        let text = reply.to_string();
        assert!(text.starts_with("Logged T123456C! That's the 2nd sighting"));
        assert!(text.ends_with("or SKIP to remain anonymous."));
    }

    #[test]
    fn test_name_too_long_mentions_limit() {
        assert!(Reply::NameTooLong { max: 50 }.to_string().contains("max 50"));
    }
}
