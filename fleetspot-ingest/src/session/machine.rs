//! Conversation transition function
//!
//! Pure: given the stored conversation, the inbound message and the facts the
//! engine gathered for this turn, compute the conversation update and the one
//! effect to run. Nothing here touches storage or the network.
//!
//! **Turn shape:**
//! 1. [`plan`] says what the engine must look up (media, plate)
//! 2. The engine gathers [`TurnFacts`]
//! 3. [`decide`] returns a [`Step`]
//! 4. After a completion is recorded, [`after_completion`] picks the follow-up

use chrono::{DateTime, Utc};
use fleetspot_common::db::Contributor;

use crate::error::{IngestError, IngestResult};
use crate::extract::{extract_borough, extract_plate};
use crate::messages::Reply;
use crate::models::{Borough, Conversation, ConversationState, ConversationUpdate, InboundMessage, Patch};

const HELP_KEYWORD: &str = "HELP";
const CANCEL_KEYWORD: &str = "CANCEL";
const SKIP_KEYWORD: &str = "SKIP";

/// Tunables for the transition function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionRules {
    pub max_name_len: usize,
    pub fuzzy_max_results: usize,
}

impl Default for SessionRules {
    fn default() -> Self {
        Self {
            max_name_len: 50,
            fuzzy_max_results: 5,
        }
    }
}

/// Registry question the engine must answer before deciding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlateQuery {
    /// Plate pulled out of the text, validated against the registry
    pub extracted: Option<String>,
    /// Text offered for suggestions when nothing validates
    pub candidate: String,
    /// Whether to compute suggestions at all
    pub suggest: bool,
}

/// Lookups needed for one turn
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnPlan {
    pub media_url: Option<String>,
    pub plate_query: Option<PlateQuery>,
}

/// Image accepted into the conversation
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMedia {
    pub image_ref: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub captured_at: Option<DateTime<Utc>>,
}

impl StoredMedia {
    fn has_gps(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }
}

/// Outcome of fetching and checking the inbound image
#[derive(Debug, Clone, PartialEq)]
pub enum MediaIntake {
    /// Same bytes already back a recorded sighting
    Duplicate { existing_id: i64 },
    Stored(StoredMedia),
}

/// Answer to a [`PlateQuery`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlateLookup {
    Registered(String),
    Unregistered {
        candidate: String,
        suggestions: Vec<String>,
    },
}

/// Everything the engine learned for this turn
#[derive(Debug, Clone)]
pub struct TurnFacts {
    pub now: DateTime<Utc>,
    pub media: Option<MediaIntake>,
    pub plate: Option<PlateLookup>,
    pub contributor: Option<Contributor>,
}

impl TurnFacts {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now,
            media: None,
            plate: None,
            contributor: None,
        }
    }
}

/// Data needed to record a sighting
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub plate: String,
    pub timestamp: DateTime<Utc>,
    /// Time used to name the stored image
    pub image_timestamp: DateTime<Utc>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Only carried when there is no GPS; otherwise resolved from coordinates
    pub borough: Option<Borough>,
    pub image_ref: String,
}

/// Side effect requested by a transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Reply(Reply),
    Complete(Completion),
    SaveName(String),
}

/// Result of [`decide`]
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// Written before the effect runs
    pub update: Option<ConversationUpdate>,
    pub effect: Effect,
}

impl Step {
    fn reply(reply: Reply) -> Self {
        Self {
            update: None,
            effect: Effect::Reply(reply),
        }
    }

    fn reset_with(reply: Reply) -> Self {
        Self {
            update: Some(ConversationUpdate::reset()),
            effect: Effect::Reply(reply),
        }
    }
}

/// Counts shown in the confirmation reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SightingCounts {
    pub vehicle: i64,
    pub total: i64,
    pub contributor: i64,
}

/// What happened when a completion was recorded
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionResult {
    Recorded {
        plate: String,
        counts: SightingCounts,
        contributor_named: bool,
    },
    Duplicate,
}

fn is_keyword(msg: &InboundMessage) -> bool {
    matches!(msg.normalized_body().as_str(), HELP_KEYWORD | CANCEL_KEYWORD)
}

/// Lookups the engine must perform before calling [`decide`]
pub fn plan(conversation: &Conversation, msg: &InboundMessage) -> TurnPlan {
    if is_keyword(msg) {
        return TurnPlan::default();
    }

    match conversation.state {
        ConversationState::Idle => match msg.first_media() {
            Some(url) => TurnPlan {
                media_url: Some(url.to_string()),
                // Caption plates are kept only if registered; no suggestions
                plate_query: extract_plate(&msg.body).map(|plate| PlateQuery {
                    candidate: plate.clone(),
                    extracted: Some(plate),
                    suggest: false,
                }),
            },
            None => TurnPlan::default(),
        },
        ConversationState::AwaitingPlate if msg.has_text() => {
            let extracted = extract_plate(&msg.body);
            let candidate = extracted.clone().unwrap_or_else(|| msg.normalized_body());
            TurnPlan {
                media_url: None,
                plate_query: Some(PlateQuery {
                    extracted,
                    candidate,
                    suggest: true,
                }),
            }
        }
        _ => TurnPlan::default(),
    }
}

fn preferred_name(facts: &TurnFacts) -> Option<String> {
    facts
        .contributor
        .as_ref()
        .and_then(|c| c.preferred_name.clone())
}

fn registered_plate(facts: &TurnFacts) -> Option<String> {
    match &facts.plate {
        Some(PlateLookup::Registered(plate)) => Some(plate.clone()),
        _ => None,
    }
}

/// Compute the next conversation state and the effect for one turn
pub fn decide(
    conversation: &Conversation,
    msg: &InboundMessage,
    facts: &TurnFacts,
    rules: &SessionRules,
) -> IngestResult<Step> {
    match msg.normalized_body().as_str() {
        HELP_KEYWORD => return Ok(Step::reply(Reply::Help)),
        CANCEL_KEYWORD => return Ok(Step::reset_with(Reply::Cancelled)),
        _ => {}
    }

    match &conversation.state {
        ConversationState::Idle => decide_idle(msg, facts),
        ConversationState::AwaitingPlate => decide_awaiting_plate(conversation, msg, facts),
        ConversationState::AwaitingBorough => decide_awaiting_borough(conversation, msg, facts),
        ConversationState::AwaitingName => Ok(decide_awaiting_name(msg, rules)),
        ConversationState::Unrecognized(raw) => {
            tracing::warn!(sender = %conversation.sender, state = %raw, "Unknown conversation state, resetting");
            Ok(Step::reset_with(Reply::Help))
        }
    }
}

fn decide_idle(msg: &InboundMessage, facts: &TurnFacts) -> IngestResult<Step> {
    if msg.first_media().is_none() {
        return Ok(Step::reply(Reply::Help));
    }

    let media = match &facts.media {
        Some(MediaIntake::Stored(media)) => media,
        Some(MediaIntake::Duplicate { .. }) => return Ok(Step::reset_with(Reply::DuplicatePhoto)),
        None => {
            return Err(IngestError::State(
                "Media attached but no intake result".to_string(),
            ))
        }
    };

    let plate = registered_plate(facts);
    let borough = if msg.has_text() {
        extract_borough(&msg.body)
    } else {
        None
    };
    let timestamp = media.captured_at.unwrap_or(facts.now);

    let update = ConversationUpdate {
        state: Some(ConversationState::AwaitingPlate),
        pending_image_ref: Patch::Set(media.image_ref.clone()),
        pending_plate: Patch::from_option(plate.clone()),
        pending_latitude: Patch::from_option(media.latitude),
        pending_longitude: Patch::from_option(media.longitude),
        pending_timestamp: Patch::Set(timestamp),
        pending_borough: Patch::from_option(borough),
        pending_image_timestamp: Patch::Set(timestamp),
    };

    let effect = match plate {
        Some(plate) if media.has_gps() || borough.is_some() => Effect::Complete(Completion {
            plate,
            timestamp,
            image_timestamp: timestamp,
            latitude: media.latitude,
            longitude: media.longitude,
            borough: if media.has_gps() { None } else { borough },
            image_ref: media.image_ref.clone(),
        }),
        Some(_) => Effect::Reply(Reply::RequestBorough),
        None => Effect::Reply(Reply::RequestPlate {
            name: preferred_name(facts),
        }),
    };

    Ok(Step {
        update: Some(update),
        effect,
    })
}

fn pending_image_ref(conversation: &Conversation) -> IngestResult<String> {
    conversation.pending_image_ref.clone().ok_or_else(|| {
        IngestError::State(format!(
            "Conversation {} in {} without a pending image",
            conversation.sender,
            conversation.state.as_str()
        ))
    })
}

fn decide_awaiting_plate(
    conversation: &Conversation,
    msg: &InboundMessage,
    facts: &TurnFacts,
) -> IngestResult<Step> {
    if !msg.has_text() {
        return Ok(Step::reply(Reply::RequestPlate {
            name: preferred_name(facts),
        }));
    }

    let plate = match &facts.plate {
        Some(PlateLookup::Registered(plate)) => plate.clone(),
        Some(PlateLookup::Unregistered {
            candidate,
            suggestions,
        }) => {
            return Ok(Step::reply(Reply::PlateNotFound {
                candidate: candidate.clone(),
                suggestions: suggestions.clone(),
            }))
        }
        None => {
            return Err(IngestError::State(
                "Plate reply without a registry lookup".to_string(),
            ))
        }
    };

    let extracted_borough = extract_borough(&msg.body);
    let borough = extracted_borough.or(conversation.pending_borough);

    let mut update = ConversationUpdate {
        pending_plate: Patch::Set(plate.clone()),
        pending_borough: Patch::if_some(extracted_borough),
        ..Default::default()
    };

    if !conversation.has_gps() && borough.is_none() {
        update.state = Some(ConversationState::AwaitingBorough);
        return Ok(Step {
            update: Some(update),
            effect: Effect::Reply(Reply::RequestBorough),
        });
    }

    let timestamp = conversation.pending_timestamp.unwrap_or(facts.now);
    let completion = Completion {
        plate,
        timestamp,
        image_timestamp: conversation.pending_image_timestamp.unwrap_or(timestamp),
        latitude: conversation.pending_latitude,
        longitude: conversation.pending_longitude,
        borough: if conversation.has_gps() { None } else { borough },
        image_ref: pending_image_ref(conversation)?,
    };

    Ok(Step {
        update: Some(update),
        effect: Effect::Complete(completion),
    })
}

fn decide_awaiting_borough(
    conversation: &Conversation,
    msg: &InboundMessage,
    facts: &TurnFacts,
) -> IngestResult<Step> {
    if !msg.has_text() {
        return Ok(Step::reply(Reply::RequestBorough));
    }
    let Some(borough) = extract_borough(&msg.body) else {
        return Ok(Step::reply(Reply::InvalidBorough));
    };

    let plate = conversation.pending_plate.clone().ok_or_else(|| {
        IngestError::State(format!(
            "Conversation {} awaiting borough without a pending plate",
            conversation.sender
        ))
    })?;
    let timestamp = conversation.pending_timestamp.unwrap_or(facts.now);

    Ok(Step {
        update: Some(ConversationUpdate {
            pending_borough: Patch::Set(borough),
            ..Default::default()
        }),
        effect: Effect::Complete(Completion {
            plate,
            timestamp,
            image_timestamp: conversation.pending_image_timestamp.unwrap_or(timestamp),
            latitude: None,
            longitude: None,
            borough: Some(borough),
            image_ref: pending_image_ref(conversation)?,
        }),
    })
}

fn decide_awaiting_name(msg: &InboundMessage, rules: &SessionRules) -> Step {
    if !msg.has_text() || msg.normalized_body() == SKIP_KEYWORD {
        return Step::reset_with(Reply::StayAnonymous);
    }

    let name = msg.body.trim();
    if name.chars().count() > rules.max_name_len {
        return Step::reply(Reply::NameTooLong {
            max: rules.max_name_len,
        });
    }

    Step {
        update: Some(ConversationUpdate::reset()),
        effect: Effect::SaveName(name.to_string()),
    }
}

/// Follow-up once a completion has been handed to the recorder
pub fn after_completion(result: CompletionResult) -> (ConversationUpdate, Reply) {
    match result {
        CompletionResult::Recorded {
            plate,
            counts,
            contributor_named,
        } => {
            let update = if contributor_named {
                ConversationUpdate::reset()
            } else {
                ConversationUpdate {
                    state: Some(ConversationState::AwaitingName),
                    ..ConversationUpdate::reset()
                }
            };
            let reply = Reply::Confirmed {
                plate,
                vehicle_count: counts.vehicle,
                total_count: counts.total,
                contributor_count: counts.contributor,
                ask_name: !contributor_named,
            };
            (update, reply)
        }
        CompletionResult::Duplicate => (ConversationUpdate::reset(), Reply::DuplicatePhoto),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SENDER: &str = "+15550001111";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn conversation(state: ConversationState) -> Conversation {
        let mut conversation = Conversation::new(SENDER, now());
        conversation.state = state;
        conversation
    }

    fn photo(body: &str) -> InboundMessage {
        InboundMessage::new(SENDER, body).with_media("https://media.example/1")
    }

    fn stored(lat: Option<f64>, lon: Option<f64>) -> MediaIntake {
        MediaIntake::Stored(StoredMedia {
            image_ref: "pending_1.jpg".to_string(),
            latitude: lat,
            longitude: lon,
            captured_at: Some(Utc.with_ymd_and_hms(2025, 6, 1, 9, 30, 0).unwrap()),
        })
    }

    fn facts(media: Option<MediaIntake>, plate: Option<PlateLookup>) -> TurnFacts {
        TurnFacts {
            media,
            plate,
            ..TurnFacts::at(now())
        }
    }

    fn registered() -> Option<PlateLookup> {
        Some(PlateLookup::Registered("T123456C".to_string()))
    }

    fn awaiting_plate_with_image() -> Conversation {
        let mut conversation = conversation(ConversationState::AwaitingPlate);
        conversation.pending_image_ref = Some("pending_1.jpg".to_string());
        conversation.pending_timestamp = Some(now());
        conversation.pending_image_timestamp = Some(now());
        conversation
    }

    #[test]
    fn test_plan_idle_photo_with_caption() {
        let plan = plan(&conversation(ConversationState::Idle), &photo("saw 123456 in bk"));
        assert_eq!(plan.media_url.as_deref(), Some("https://media.example/1"));
        let query = plan.plate_query.unwrap();
        assert_eq!(query.extracted.as_deref(), Some("T123456C"));
        assert!(!query.suggest);
    }

    #[test]
    fn test_plan_awaiting_plate_uses_body_as_candidate() {
        let msg = InboundMessage::new(SENDER, " t12345c ");
        let plan = plan(&conversation(ConversationState::AwaitingPlate), &msg);
        let query = plan.plate_query.unwrap();
        assert_eq!(query.extracted, None);
        assert_eq!(query.candidate, "T12345C");
        assert!(query.suggest);
    }

    #[test]
    fn test_plan_skips_lookups_for_keywords() {
        let plan = plan(&conversation(ConversationState::Idle), &photo("cancel"));
        assert_eq!(plan, TurnPlan::default());
    }

    #[test]
    fn test_help_leaves_state_alone() {
        let conv = awaiting_plate_with_image();
        let step = decide(&conv, &InboundMessage::new(SENDER, " help "), &TurnFacts::at(now()), &SessionRules::default()).unwrap();
        assert_eq!(step, Step::reply(Reply::Help));
    }

    #[test]
    fn test_cancel_resets_from_any_state() {
        for state in [
            ConversationState::Idle,
            ConversationState::AwaitingPlate,
            ConversationState::AwaitingBorough,
            ConversationState::AwaitingName,
        ] {
            let step = decide(&conversation(state), &InboundMessage::new(SENDER, "Cancel"), &TurnFacts::at(now()), &SessionRules::default()).unwrap();
            assert_eq!(step, Step::reset_with(Reply::Cancelled));
        }
    }

    #[test]
    fn test_idle_text_only_gets_help() {
        let step = decide(&conversation(ConversationState::Idle), &InboundMessage::new(SENDER, "hello"), &TurnFacts::at(now()), &SessionRules::default()).unwrap();
        assert_eq!(step, Step::reply(Reply::Help));
    }

    #[test]
    fn test_idle_photo_with_gps_and_plate_completes() {
        let facts = facts(Some(stored(Some(40.7589), Some(-73.9851))), registered());
        let step = decide(&conversation(ConversationState::Idle), &photo("T123456C"), &facts, &SessionRules::default()).unwrap();

        let update = step.update.unwrap();
        assert_eq!(update.state, Some(ConversationState::AwaitingPlate));
        assert_eq!(update.pending_plate, Patch::Set("T123456C".to_string()));
        match step.effect {
            Effect::Complete(completion) => {
                assert_eq!(completion.plate, "T123456C");
                assert_eq!(completion.latitude, Some(40.7589));
                assert_eq!(completion.borough, None);
                assert_eq!(completion.timestamp, Utc.with_ymd_and_hms(2025, 6, 1, 9, 30, 0).unwrap());
                assert_eq!(completion.image_ref, "pending_1.jpg");
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[test]
    fn test_idle_photo_without_plate_asks_for_plate() {
        let mut facts = facts(Some(stored(None, None)), None);
        facts.contributor = Some(Contributor {
            id: 3,
            sender: Some(SENDER.to_string()),
            external_handle: None,
            preferred_name: Some("Sam".to_string()),
        });
        let step = decide(&conversation(ConversationState::Idle), &photo(""), &facts, &SessionRules::default()).unwrap();

        let update = step.update.unwrap();
        assert_eq!(update.state, Some(ConversationState::AwaitingPlate));
        assert_eq!(update.pending_plate, Patch::Clear);
        assert_eq!(update.pending_latitude, Patch::Clear);
        assert_eq!(
            step.effect,
            Effect::Reply(Reply::RequestPlate {
                name: Some("Sam".to_string())
            })
        );
    }

    #[test]
    fn test_idle_photo_with_unregistered_caption_plate_drops_it() {
        let lookup = Some(PlateLookup::Unregistered {
            candidate: "T999999C".to_string(),
            suggestions: vec![],
        });
        let step = decide(&conversation(ConversationState::Idle), &photo("T999999C"), &facts(Some(stored(Some(40.7), Some(-73.9))), lookup), &SessionRules::default()).unwrap();
        assert_eq!(step.update.unwrap().pending_plate, Patch::Clear);
        assert_eq!(step.effect, Effect::Reply(Reply::RequestPlate { name: None }));
    }

    #[test]
    fn test_idle_photo_with_plate_but_no_location_asks_borough() {
        let step = decide(&conversation(ConversationState::Idle), &photo("T123456C"), &facts(Some(stored(None, None)), registered()), &SessionRules::default()).unwrap();
        assert_eq!(step.effect, Effect::Reply(Reply::RequestBorough));
        assert_eq!(step.update.unwrap().state, Some(ConversationState::AwaitingPlate));
    }

    #[test]
    fn test_idle_photo_with_caption_borough_completes_without_gps() {
        let step = decide(&conversation(ConversationState::Idle), &photo("T123456C queens"), &facts(Some(stored(None, None)), registered()), &SessionRules::default()).unwrap();
        match step.effect {
            Effect::Complete(completion) => assert_eq!(completion.borough, Some(Borough::Queens)),
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_intake_resets() {
        let step = decide(&conversation(ConversationState::Idle), &photo(""), &facts(Some(MediaIntake::Duplicate { existing_id: 4 }), None), &SessionRules::default()).unwrap();
        assert_eq!(step, Step::reset_with(Reply::DuplicatePhoto));
    }

    #[test]
    fn test_missing_intake_is_state_error() {
        let result = decide(&conversation(ConversationState::Idle), &photo(""), &TurnFacts::at(now()), &SessionRules::default());
        assert!(matches!(result, Err(IngestError::State(_))));
    }

    #[test]
    fn test_unregistered_plate_lists_suggestions() {
        let lookup = Some(PlateLookup::Unregistered {
            candidate: "T123456C".to_string(),
            suggestions: vec!["T123457C".to_string()],
        });
        let step = decide(&awaiting_plate_with_image(), &InboundMessage::new(SENDER, "123456"), &facts(None, lookup), &SessionRules::default()).unwrap();
        assert_eq!(step.update, None);
        assert_eq!(
            step.effect,
            Effect::Reply(Reply::PlateNotFound {
                candidate: "T123456C".to_string(),
                suggestions: vec!["T123457C".to_string()],
            })
        );
    }

    #[test]
    fn test_plate_without_location_moves_to_awaiting_borough() {
        let step = decide(&awaiting_plate_with_image(), &InboundMessage::new(SENDER, "T123456C"), &facts(None, registered()), &SessionRules::default()).unwrap();
        let update = step.update.unwrap();
        assert_eq!(update.state, Some(ConversationState::AwaitingBorough));
        assert_eq!(update.pending_plate, Patch::Set("T123456C".to_string()));
        assert_eq!(step.effect, Effect::Reply(Reply::RequestBorough));
    }

    #[test]
    fn test_plate_with_pending_borough_completes() {
        let mut conv = awaiting_plate_with_image();
        conv.pending_borough = Some(Borough::Bronx);
        let step = decide(&conv, &InboundMessage::new(SENDER, "T123456C"), &facts(None, registered()), &SessionRules::default()).unwrap();
        match step.effect {
            Effect::Complete(completion) => {
                assert_eq!(completion.borough, Some(Borough::Bronx));
                assert_eq!(completion.timestamp, now());
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[test]
    fn test_plate_with_gps_leaves_borough_to_resolver() {
        let mut conv = awaiting_plate_with_image();
        conv.pending_latitude = Some(40.643);
        conv.pending_longitude = Some(-74.074);
        let step = decide(&conv, &InboundMessage::new(SENDER, "T123456C brooklyn"), &facts(None, registered()), &SessionRules::default()).unwrap();
        match step.effect {
            Effect::Complete(completion) => {
                assert_eq!(completion.borough, None);
                assert_eq!(completion.latitude, Some(40.643));
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[test]
    fn test_completion_without_pending_image_is_state_error() {
        let mut conv = conversation(ConversationState::AwaitingPlate);
        conv.pending_borough = Some(Borough::Queens);
        let result = decide(&conv, &InboundMessage::new(SENDER, "T123456C"), &facts(None, registered()), &SessionRules::default());
        assert!(matches!(result, Err(IngestError::State(_))));
    }

    #[test]
    fn test_awaiting_borough() {
        let mut conv = conversation(ConversationState::AwaitingBorough);
        conv.pending_image_ref = Some("pending_1.jpg".to_string());
        conv.pending_plate = Some("T123456C".to_string());

        let step = decide(&conv, &InboundMessage::new(SENDER, "nowhere"), &TurnFacts::at(now()), &SessionRules::default()).unwrap();
        assert_eq!(step, Step::reply(Reply::InvalidBorough));

        let step = decide(&conv, &InboundMessage::new(SENDER, "s"), &TurnFacts::at(now()), &SessionRules::default()).unwrap();
        match step.effect {
            Effect::Complete(completion) => {
                assert_eq!(completion.borough, Some(Borough::StatenIsland));
                assert_eq!(completion.latitude, None);
                assert_eq!(completion.timestamp, now());
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[test]
    fn test_awaiting_name() {
        let rules = SessionRules::default();
        let conv = conversation(ConversationState::AwaitingName);

        let step = decide(&conv, &InboundMessage::new(SENDER, "skip"), &TurnFacts::at(now()), &rules).unwrap();
        assert_eq!(step, Step::reset_with(Reply::StayAnonymous));

        let step = decide(&conv, &InboundMessage::new(SENDER, "  Sam  "), &TurnFacts::at(now()), &rules).unwrap();
        assert_eq!(step.effect, Effect::SaveName("Sam".to_string()));
        assert_eq!(step.update, Some(ConversationUpdate::reset()));

        let long = "x".repeat(51);
        let step = decide(&conv, &InboundMessage::new(SENDER, long), &TurnFacts::at(now()), &rules).unwrap();
        assert_eq!(step, Step::reply(Reply::NameTooLong { max: 50 }));
    }

    #[test]
    fn test_unrecognized_state_resets_with_help() {
        let conv = conversation(ConversationState::Unrecognized("confirming".to_string()));
        let step = decide(&conv, &InboundMessage::new(SENDER, "T123456C"), &TurnFacts::at(now()), &SessionRules::default()).unwrap();
        assert_eq!(step, Step::reset_with(Reply::Help));
    }

    #[test]
    fn test_after_completion_asks_unnamed_contributor() {
        let counts = SightingCounts {
            vehicle: 1,
            total: 10,
            contributor: 1,
        };
        let (update, reply) = after_completion(CompletionResult::Recorded {
            plate: "T123456C".to_string(),
            counts,
            contributor_named: false,
        });
        assert_eq!(update.state, Some(ConversationState::AwaitingName));
        assert_eq!(update.pending_plate, Patch::Clear);
        assert!(matches!(reply, Reply::Confirmed { ask_name: true, .. }));

        let (update, reply) = after_completion(CompletionResult::Recorded {
            plate: "T123456C".to_string(),
            counts,
            contributor_named: true,
        });
        assert_eq!(update, ConversationUpdate::reset());
        assert!(matches!(reply, Reply::Confirmed { ask_name: false, .. }));

        let (update, reply) = after_completion(CompletionResult::Duplicate);
        assert_eq!(update, ConversationUpdate::reset());
        assert_eq!(reply, Reply::DuplicatePhoto);
    }
}
