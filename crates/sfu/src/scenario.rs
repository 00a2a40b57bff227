//! SFU-abuse scenario model and parser.

use foxwhisper_core::{
    CorpusError, CorpusScenario, EventKind, FieldReader, ScenarioHeader, Timeline,
};
use foxwhisper_types::{ErrorCategory, ParticipantId, TrackId};
use indexmap::IndexMap;
use serde_json::Value;

/// The forwarding unit and room under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SfuContext {
    pub sfu_id: String,
    pub room_id: String,
    pub expected_participants: Vec<String>,
    pub auth_mode: String,
}

/// A declared room participant.
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub id: ParticipantId,
    pub role: String,
    pub authz_tokens: Vec<String>,
    /// Opaque track descriptors.
    pub tracks: Vec<Value>,
}

impl Participant {
    /// Whether `token` is one of the participant's authorization tokens.
    pub fn holds_token(&self, token: &str) -> bool {
        self.authz_tokens.iter().any(|held| held == token)
    }
}

/// One entry of the SFU `timeline`.
///
/// Participant and track references are never resolved at parse time: a
/// reference to something undeclared is the abuse being modeled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SfuEvent {
    Join {
        participant: ParticipantId,
        token: Option<String>,
    },
    Publish {
        participant: Option<ParticipantId>,
        track_id: Option<TrackId>,
        layers: Vec<String>,
    },
    Subscribe {
        participant: Option<ParticipantId>,
        track_id: Option<TrackId>,
    },
    GhostSubscribe {
        participant: Option<ParticipantId>,
        track_id: Option<TrackId>,
    },
    Impersonate {
        participant: Option<ParticipantId>,
    },
    ReplayTrack {
        track_id: Option<TrackId>,
    },
    DupTrack {
        track_id: Option<TrackId>,
    },
    SimulcastSpoof {
        track_id: Option<TrackId>,
        requested_layers: Vec<String>,
    },
    BitrateAbuse,
    KeyRotationSkip,
    StaleKeyReuse,
    StealKey,
}

impl EventKind for SfuEvent {
    fn kind(&self) -> &'static str {
        match self {
            SfuEvent::Join { .. } => "join",
            SfuEvent::Publish { .. } => "publish",
            SfuEvent::Subscribe { .. } => "subscribe",
            SfuEvent::GhostSubscribe { .. } => "ghost_subscribe",
            SfuEvent::Impersonate { .. } => "impersonate",
            SfuEvent::ReplayTrack { .. } => "replay_track",
            SfuEvent::DupTrack { .. } => "dup_track",
            SfuEvent::SimulcastSpoof { .. } => "simulcast_spoof",
            SfuEvent::BitrateAbuse => "bitrate_abuse",
            SfuEvent::KeyRotationSkip => "key_rotation_skip",
            SfuEvent::StaleKeyReuse => "stale_key_reuse",
            SfuEvent::StealKey => "steal_key",
        }
    }
}

/// Declared outcome of an SFU-abuse scenario. Every field is required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SfuExpectations {
    pub should_detect: bool,
    pub expected_errors: Vec<ErrorCategory>,
    pub max_detection_ms: u64,
    pub allow_partial_accept: bool,
    pub residual_routing_allowed: bool,
    pub max_hijacked_tracks: u64,
    pub max_unauthorized_tracks: u64,
    pub max_key_leak_attempts: u64,
    pub max_extra_latency_ms: u64,
    pub max_false_positive_blocks: u64,
    pub max_false_negative_leaks: u64,
}

impl SfuExpectations {
    fn parse(reader: &FieldReader<'_>) -> Result<Self, CorpusError> {
        Ok(Self {
            should_detect: reader.bool("should_detect")?,
            expected_errors: reader.categories("expected_errors")?,
            max_detection_ms: reader.u64("max_detection_ms")?,
            allow_partial_accept: reader.bool("allow_partial_accept")?,
            residual_routing_allowed: reader.bool("residual_routing_allowed")?,
            max_hijacked_tracks: reader.u64("max_hijacked_tracks")?,
            max_unauthorized_tracks: reader.u64("max_unauthorized_tracks")?,
            max_key_leak_attempts: reader.u64("max_key_leak_attempts")?,
            max_extra_latency_ms: reader.u64("max_extra_latency_ms")?,
            max_false_positive_blocks: reader.u64("max_false_positive_blocks")?,
            max_false_negative_leaks: reader.u64("max_false_negative_leaks")?,
        })
    }
}

/// A validated SFU-abuse scenario.
#[derive(Debug, Clone)]
pub struct SfuScenario {
    pub header: ScenarioHeader,
    pub sfu_context: SfuContext,
    pub participants: IndexMap<ParticipantId, Participant>,
    pub timeline: Timeline<SfuEvent>,
    pub expectations: SfuExpectations,
}

impl CorpusScenario for SfuScenario {
    fn header(&self) -> &ScenarioHeader {
        &self.header
    }
}

impl SfuScenario {
    /// Parse the domain body of a scenario.
    pub fn parse(header: ScenarioHeader, reader: &FieldReader<'_>) -> Result<Self, CorpusError> {
        let context = reader.object("sfu_context")?;
        let sfu_context = SfuContext {
            sfu_id: context.str("sfu_id")?.to_owned(),
            room_id: context.str("room_id")?.to_owned(),
            expected_participants: context.required_string_list("expected_participants")?,
            auth_mode: context.str("auth_mode")?.to_owned(),
        };

        let participants = parse_participants(reader)?;

        let items = reader.non_empty_array("timeline")?;
        let timeline = Timeline::parse(reader, "timeline", items, parse_event)?;

        let expectations = SfuExpectations::parse(&reader.object("expectations")?)?;

        Ok(Self {
            header,
            sfu_context,
            participants,
            timeline,
            expectations,
        })
    }
}

fn parse_participants(
    reader: &FieldReader<'_>,
) -> Result<IndexMap<ParticipantId, Participant>, CorpusError> {
    let items = reader.non_empty_array("participants")?;
    let mut participants = IndexMap::with_capacity(items.len());

    for participant in reader.objects("participants", items)? {
        let id = ParticipantId::new(participant.non_empty_str("id")?);
        if participants.contains_key(&id) {
            return Err(reader.error(format!("duplicate participant id {id}")));
        }
        let parsed = Participant {
            id: id.clone(),
            role: participant
                .opt_str("role")?
                .unwrap_or("subscriber")
                .to_owned(),
            authz_tokens: participant.required_string_list("authz_tokens")?,
            tracks: participant.array("tracks")?.to_vec(),
        };
        participants.insert(id, parsed);
    }

    Ok(participants)
}

fn parse_event(kind: &str, event: &FieldReader<'_>) -> Result<Option<SfuEvent>, CorpusError> {
    let participant = || {
        event
            .opt_str("participant")
            .map(|id| id.map(ParticipantId::new))
    };
    let track_id = || event.opt_str("track_id").map(|id| id.map(TrackId::new));

    let parsed = match kind {
        "join" => SfuEvent::Join {
            participant: ParticipantId::new(event.str("participant")?),
            token: event.opt_str("token")?.map(str::to_owned),
        },
        "publish" => SfuEvent::Publish {
            participant: participant()?,
            track_id: track_id()?,
            layers: event.string_list("layers")?,
        },
        "subscribe" => SfuEvent::Subscribe {
            participant: participant()?,
            track_id: track_id()?,
        },
        "ghost_subscribe" => SfuEvent::GhostSubscribe {
            participant: participant()?,
            track_id: track_id()?,
        },
        "impersonate" => SfuEvent::Impersonate {
            participant: participant()?,
        },
        "replay_track" => SfuEvent::ReplayTrack {
            track_id: track_id()?,
        },
        "dup_track" => SfuEvent::DupTrack {
            track_id: track_id()?,
        },
        "simulcast_spoof" => SfuEvent::SimulcastSpoof {
            track_id: track_id()?,
            requested_layers: event.string_list("requested_layers")?,
        },
        "bitrate_abuse" => SfuEvent::BitrateAbuse,
        "key_rotation_skip" => SfuEvent::KeyRotationSkip,
        "stale_key_reuse" => SfuEvent::StaleKeyReuse,
        "steal_key" => SfuEvent::StealKey,
        _ => return Ok(None),
    };
    Ok(Some(parsed))
}
