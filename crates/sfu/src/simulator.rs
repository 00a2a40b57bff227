//! SFU abuse replay.
//!
//! The forwarding unit authenticates joins by token, routes published tracks,
//! and refuses subscriptions from unauthenticated participants or to tracks
//! nobody published. Attack events are detected as they occur.

use crate::scenario::{SfuEvent, SfuScenario};
use foxwhisper_core::{ErrorSet, SimulationResult, TimedEvent};
use foxwhisper_types::{ErrorCategory, Millis, ParticipantId, TrackId};
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use tracing::debug;

/// SFU-abuse metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SfuMetrics {
    pub unauthorized_tracks: u64,
    pub hijacked_tracks: u64,
    /// 1 when any impersonation was seen.
    pub impersonation_attempts: u64,
    pub key_leak_attempts: u64,
    pub duplicate_routes: u64,
    pub replayed_tracks: u64,
    pub simulcast_spoofs: u64,
    pub bitrate_abuse_events: u64,
    pub accepted_tracks: usize,
    pub rejected_tracks: u64,
    pub false_positive_blocks: u64,
    pub false_negative_leaks: u64,
    /// Time until the first abuse was flagged.
    pub max_extra_latency_ms: u64,
    pub affected_participant_count: usize,
}

#[derive(Default)]
struct Counters {
    unauthorized: u64,
    key_leaks: u64,
    duplicate_routes: u64,
    replayed: u64,
    spoofs: u64,
    bitrate_abuse: u64,
}

/// Forwarding-unit state for one replay.
struct Router<'a> {
    scenario: &'a SfuScenario,
    authenticated: IndexSet<ParticipantId>,
    /// track → publishing participant.
    routes: IndexMap<TrackId, ParticipantId>,
    /// track → published simulcast layers.
    layers: IndexMap<TrackId, Vec<String>>,
    affected: IndexSet<String>,
    errors: ErrorSet,
    counters: Counters,
    detection_time: Option<Millis>,
}

impl<'a> Router<'a> {
    fn new(scenario: &'a SfuScenario) -> Self {
        Self {
            scenario,
            authenticated: IndexSet::new(),
            routes: IndexMap::new(),
            layers: IndexMap::new(),
            affected: IndexSet::new(),
            errors: ErrorSet::new(),
            counters: Counters::default(),
            detection_time: None,
        }
    }

    fn raise(&mut self, category: ErrorCategory, t: Millis) {
        if self.errors.insert(category) {
            debug!(
                scenario = %self.scenario.header.scenario_id,
                category = %category,
                t,
                "SFU abuse flagged"
            );
        }
    }

    fn unauthorized(&mut self, t: Millis) {
        self.counters.unauthorized += 1;
        self.raise(ErrorCategory::UnauthorizedSubscribe, t);
    }

    fn is_authenticated(&self, participant: Option<&ParticipantId>) -> bool {
        participant.is_some_and(|id| self.authenticated.contains(id))
    }

    fn apply(&mut self, timed: &TimedEvent<SfuEvent>) {
        let scenario = self.scenario;
        let t = timed.t;
        match &timed.event {
            SfuEvent::Join { participant, token } => {
                match scenario.participants.get(participant) {
                    None => self.unauthorized(t),
                    Some(declared)
                        if !token.as_deref().is_some_and(|tok| declared.holds_token(tok)) =>
                    {
                        self.raise(ErrorCategory::Impersonation, t);
                    }
                    Some(_) => {
                        self.authenticated.insert(participant.clone());
                    }
                }
            }
            SfuEvent::Publish {
                participant,
                track_id,
                layers,
            } => match (participant, track_id) {
                (Some(participant), Some(track))
                    if self.authenticated.contains(participant) =>
                {
                    self.routes.insert(track.clone(), participant.clone());
                    self.layers.insert(track.clone(), layers.clone());
                }
                _ => self.unauthorized(t),
            },
            SfuEvent::Subscribe {
                participant,
                track_id,
            } => {
                let routed = track_id
                    .as_ref()
                    .is_some_and(|track| self.routes.contains_key(track));
                if !self.is_authenticated(participant.as_ref()) || !routed {
                    self.unauthorized(t);
                }
            }
            SfuEvent::GhostSubscribe { participant, .. } => {
                self.unauthorized(t);
                self.affected
                    .insert(participant.as_ref().map_or("ghost", |id| id.as_str()).to_owned());
            }
            SfuEvent::Impersonate { participant } => {
                self.raise(ErrorCategory::Impersonation, t);
                self.affected
                    .insert(participant.as_ref().map_or("unknown", |id| id.as_str()).to_owned());
            }
            SfuEvent::ReplayTrack { track_id } => {
                if self.is_routed(track_id.as_ref()) {
                    self.counters.replayed += 1;
                    self.raise(ErrorCategory::ReplayTrack, t);
                }
            }
            SfuEvent::DupTrack { track_id } => {
                if self.is_routed(track_id.as_ref()) {
                    self.counters.duplicate_routes += 1;
                    self.raise(ErrorCategory::DuplicateRoute, t);
                }
            }
            SfuEvent::SimulcastSpoof {
                track_id,
                requested_layers,
            } => {
                let published: &[String] = track_id
                    .as_ref()
                    .and_then(|track| self.layers.get(track))
                    .map_or(&[][..], Vec::as_slice);
                if requested_layers.iter().any(|layer| !published.contains(layer)) {
                    self.counters.spoofs += 1;
                    self.raise(ErrorCategory::SimulcastSpoof, t);
                }
            }
            SfuEvent::BitrateAbuse => {
                self.counters.bitrate_abuse += 1;
                self.raise(ErrorCategory::BitrateAbuse, t);
            }
            SfuEvent::KeyRotationSkip | SfuEvent::StaleKeyReuse => {
                self.counters.key_leaks += 1;
                self.raise(ErrorCategory::StaleKeyReuse, t);
            }
            SfuEvent::StealKey => {
                self.counters.key_leaks += 1;
                self.raise(ErrorCategory::KeyLeakAttempt, t);
            }
        }

        if !self.errors.is_empty() {
            self.detection_time.get_or_insert(t);
        }
    }

    fn is_routed(&self, track: Option<&TrackId>) -> bool {
        track.is_some_and(|track| self.routes.contains_key(track))
    }
}

/// Replay an SFU-abuse scenario.
pub fn simulate(scenario: &SfuScenario) -> SimulationResult<SfuMetrics> {
    let mut router = Router::new(scenario);
    for timed in &scenario.timeline {
        router.apply(timed);
    }

    let detection = !router.errors.is_empty();
    let detection_ms = router.detection_time.map(|t| t.max(0).unsigned_abs());
    let counters = &router.counters;

    let metrics = SfuMetrics {
        unauthorized_tracks: counters.unauthorized,
        hijacked_tracks: 0,
        impersonation_attempts: u64::from(router.errors.contains(ErrorCategory::Impersonation)),
        key_leak_attempts: counters.key_leaks,
        duplicate_routes: counters.duplicate_routes,
        replayed_tracks: counters.replayed,
        simulcast_spoofs: counters.spoofs,
        bitrate_abuse_events: counters.bitrate_abuse,
        accepted_tracks: router.routes.len(),
        rejected_tracks: counters.unauthorized,
        false_positive_blocks: 0,
        false_negative_leaks: 0,
        max_extra_latency_ms: detection_ms.unwrap_or(0),
        affected_participant_count: router.affected.len(),
    };

    debug!(
        scenario = %scenario.header.scenario_id,
        detection,
        routes = metrics.accepted_tracks,
        unauthorized = metrics.unauthorized_tracks,
        "SFU replay finished"
    );

    SimulationResult {
        detection,
        detection_ms,
        recovery_ms: None,
        errors: router.errors,
        notes: Vec::new(),
        metrics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SfuAbuseSimulator;
    use foxwhisper_core::parse_scenario;
    use foxwhisper_test_helpers::sfu;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use serde_json::{json, Value};
    use tracing_test::traced_test;

    fn run(value: Value) -> SimulationResult<SfuMetrics> {
        let scenario = parse_scenario::<SfuAbuseSimulator>(0, &value).unwrap();
        simulate(&scenario)
    }

    fn room(timeline: Vec<Value>) -> Value {
        sfu::scenario(
            "sfu-sim",
            vec![sfu::participant("alice", "tok-a"), sfu::participant("bob", "tok-b")],
            timeline,
        )
    }

    #[traced_test]
    #[test]
    fn test_authorized_flow_is_quiet() {
        let result = run(room(vec![
            sfu::join(0, "alice", "tok-a"),
            sfu::join(1, "bob", "tok-b"),
            sfu::publish(2, "alice", "cam", &["h", "m", "l"]),
            sfu::subscribe(3, "bob", "cam"),
        ]));
        assert!(!result.detection);
        assert_eq!(result.detection_ms, None);
        assert_eq!(result.metrics.accepted_tracks, 1);
        assert_eq!(result.metrics.rejected_tracks, 0);
    }

    #[traced_test]
    #[test]
    fn test_bad_token_blocks_later_publish() {
        let result = run(room(vec![
            sfu::join(10, "alice", "forged"),
            sfu::publish(20, "alice", "cam", &["h"]),
        ]));
        assert!(result.detection);
        assert_eq!(
            result.errors.as_slice(),
            &[ErrorCategory::Impersonation, ErrorCategory::UnauthorizedSubscribe]
        );
        assert_eq!(result.detection_ms, Some(10));
        assert_eq!(result.metrics.impersonation_attempts, 1);
        assert_eq!(result.metrics.unauthorized_tracks, 1);
        assert_eq!(result.metrics.accepted_tracks, 0);
        assert_eq!(result.metrics.max_extra_latency_ms, 10);
    }

    #[test]
    fn test_undeclared_join_and_unrouted_subscribe() {
        let result = run(room(vec![
            sfu::join(0, "mallory", "tok-a"),
            sfu::join(1, "bob", "tok-b"),
            sfu::subscribe(2, "bob", "nothing"),
            json!({"t": 3, "event": "subscribe", "participant": "bob"}),
        ]));
        assert_eq!(result.errors.as_slice(), &[ErrorCategory::UnauthorizedSubscribe]);
        assert_eq!(result.metrics.unauthorized_tracks, 3);
        assert_eq!(result.detection_ms, Some(0));
    }

    #[test]
    fn test_track_attacks() {
        let result = run(room(vec![
            sfu::join(0, "alice", "tok-a"),
            sfu::publish(1, "alice", "cam", &["h", "l"]),
            json!({"t": 2, "event": "replay_track", "track_id": "cam"}),
            json!({"t": 3, "event": "dup_track", "track_id": "cam"}),
            json!({"t": 4, "event": "dup_track", "track_id": "mic"}),
            json!({
                "t": 5, "event": "simulcast_spoof", "track_id": "cam", "requested_layers": ["l"]
            }),
            json!({
                "t": 6,
                "event": "simulcast_spoof",
                "track_id": "cam",
                "requested_layers": ["l", "x"],
            }),
            json!({"t": 7, "event": "bitrate_abuse"}),
        ]));
        assert_eq!(
            result.errors.as_slice(),
            &[
                ErrorCategory::ReplayTrack,
                ErrorCategory::DuplicateRoute,
                ErrorCategory::SimulcastSpoof,
                ErrorCategory::BitrateAbuse,
            ]
        );
        assert_eq!(result.metrics.replayed_tracks, 1);
        assert_eq!(result.metrics.duplicate_routes, 1);
        assert_eq!(result.metrics.simulcast_spoofs, 1);
        assert_eq!(result.metrics.bitrate_abuse_events, 1);
        assert_eq!(result.detection_ms, Some(2));
    }

    #[test]
    fn test_key_attacks_and_affected_participants() {
        let result = run(room(vec![
            json!({"t": 0, "event": "key_rotation_skip"}),
            json!({"t": 1, "event": "stale_key_reuse"}),
            json!({"t": 2, "event": "steal_key"}),
            json!({"t": 3, "event": "ghost_subscribe"}),
            json!({"t": 4, "event": "impersonate", "participant": "bob"}),
            json!({"t": 5, "event": "impersonate"}),
        ]));
        assert_eq!(result.metrics.key_leak_attempts, 3);
        assert_eq!(result.metrics.affected_participant_count, 3);
        assert_eq!(result.metrics.impersonation_attempts, 1);
        assert!(result.errors.contains(ErrorCategory::StaleKeyReuse));
        assert!(result.errors.contains(ErrorCategory::KeyLeakAttempt));
    }

    #[test]
    fn test_deterministic_under_declaration_shuffle() {
        let mut timeline = vec![
            sfu::join(0, "alice", "tok-a"),
            sfu::publish(1, "alice", "cam", &["h"]),
            json!({"t": 2, "event": "dup_track", "track_id": "cam"}),
            sfu::join(3, "bob", "bad"),
            json!({"t": 4, "event": "steal_key"}),
        ];
        let baseline = run(room(timeline.clone()));
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        for _ in 0..16 {
            timeline.shuffle(&mut rng);
            assert_eq!(run(room(timeline.clone())), baseline);
        }
    }
}
