//! Test helpers for FoxWhisper simulators.
//!
//! Builders for corpus JSON shared by the domain test suites. Every builder
//! produces a scenario whose default expectations match a quiet run (nothing
//! detected, generous bounds), so a test only patches the fields it asserts.

use serde_json::{json, Map, Value};

/// Recursively merge `patch` into `base`; objects merge, everything else replaces.
pub fn merge(mut base: Value, patch: Value) -> Value {
    merge_into(&mut base, patch);
    base
}

fn merge_into(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                let nested = value.is_object() && base.get(&key).is_some_and(Value::is_object);
                if !nested {
                    base.insert(key, value);
                } else if let Some(existing) = base.get_mut(&key) {
                    merge_into(existing, value);
                }
            }
        }
        (base, patch) => *base = patch,
    }
}

/// Remove a top-level key from a scenario object.
pub fn without(mut scenario: Value, key: &str) -> Value {
    if let Value::Object(map) = &mut scenario {
        map.remove(key);
    }
    scenario
}

/// Wrap scenarios into a corpus document.
pub fn corpus(scenarios: impl IntoIterator<Item = Value>) -> Value {
    Value::Array(scenarios.into_iter().collect())
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Epoch-fork fixtures.
pub mod epoch {
    use super::*;

    /// A root node.
    pub fn root(node_id: &str, epoch_id: i64, hash: &str) -> Value {
        json!({
            "node_id": node_id,
            "epoch_id": epoch_id,
            "eare_hash": hash,
            "issued_by": "controller-a",
            "timestamp_ms": 0,
        })
    }

    /// A node chained to `parent`, declaring `previous_epoch_hash`.
    pub fn child(node_id: &str, epoch_id: i64, hash: &str, parent: &str, previous: &str) -> Value {
        merge(
            root(node_id, epoch_id, hash),
            json!({"parent_id": parent, "previous_epoch_hash": previous}),
        )
    }

    /// An `epoch_issue` event.
    pub fn issue(t: i64, node_id: &str) -> Value {
        json!({"t": t, "event": "epoch_issue", "node_id": node_id})
    }

    /// A `merge` event.
    pub fn merge_event(t: i64) -> Value {
        json!({
            "t": t,
            "event": "merge",
            "participants": ["controller-a"],
            "reconcile_strategy": "longest_chain",
        })
    }

    /// A scenario with the given nodes and event stream.
    pub fn scenario(scenario_id: &str, nodes: Vec<Value>, events: Vec<Value>) -> Value {
        json!({
            "scenario_id": scenario_id,
            "tags": ["fork"],
            "group_context": {"group_id": "g-1"},
            "graph": {"nodes": nodes, "edges": []},
            "event_stream": events,
            "expectations": {"detected": false},
        })
    }
}

/// Device-desync fixtures.
pub mod desync {
    use super::*;

    /// A device at a DR version.
    pub fn device(device_id: &str, dr_version: i64) -> Value {
        json!({"device_id": device_id, "dr_version": dr_version, "clock_ms": 0})
    }

    /// A `send` event.
    pub fn send(t: i64, msg_id: &str, from: &str, to: &[&str], dr_version: i64) -> Value {
        json!({
            "t": t,
            "event": "send",
            "msg_id": msg_id,
            "from": from,
            "to": to,
            "dr_version": dr_version,
        })
    }

    /// A `recv` event applying a DR version.
    pub fn recv(t: i64, msg_id: &str, device: &str, apply_dr_version: i64) -> Value {
        json!({
            "t": t,
            "event": "recv",
            "msg_id": msg_id,
            "device": device,
            "apply_dr_version": apply_dr_version,
        })
    }

    /// Expectations that accept a quiet run.
    pub fn expectations() -> Value {
        json!({
            "detected": false,
            "max_detection_ms": 0,
            "max_recovery_ms": 0,
            "healing_required": false,
            "residual_divergence_allowed": true,
            "max_dr_version_delta": 100,
            "max_clock_skew_ms": 1000,
            "allow_message_loss_rate": 1.0,
            "allow_out_of_order_rate": 1.0,
            "expected_error_categories": [],
            "max_rollback_events": 100,
        })
    }

    /// A scenario with the given devices and timeline.
    pub fn scenario(scenario_id: &str, devices: Vec<Value>, timeline: Vec<Value>) -> Value {
        json!({
            "scenario_id": scenario_id,
            "tags": ["desync"],
            "devices": devices,
            "timeline": timeline,
            "expectations": expectations(),
        })
    }

    /// Override expectation fields.
    pub fn expect(scenario: Value, patch: Value) -> Value {
        merge(scenario, json!({"expectations": patch}))
    }
}

/// Corrupted-record-chain fixtures.
pub mod eare {
    use super::*;

    /// A record node.
    pub fn node(node_id: &str, epoch_id: i64, hash: &str, previous: &str) -> Value {
        json!({
            "node_id": node_id,
            "epoch_id": epoch_id,
            "eare_hash": hash,
            "issued_by": "controller-a",
            "previous_epoch_hash": previous,
            "membership_digest": "md-1",
        })
    }

    /// A well-formed chain `n0 → n1 → …` of `len` nodes.
    pub fn chain(len: usize) -> Vec<Value> {
        (0..len)
            .map(|i| {
                let previous = if i == 0 {
                    "genesis".to_owned()
                } else {
                    format!("h{}", i - 1)
                };
                node(&format!("n{i}"), i as i64, &format!("h{i}"), &previous)
            })
            .collect()
    }

    /// A corruption targeting `target` (`None` applies to every node).
    pub fn corruption(kind: &str, target: Option<&str>) -> Value {
        let mut value = object(json!({"type": kind, "reason": "fixture"}));
        if let Some(target) = target {
            value.insert("target_node".into(), json!(target));
        }
        Value::Object(value)
    }

    /// Expectations that accept a quiet run.
    pub fn expectations() -> Value {
        json!({
            "should_detect": false,
            "expected_errors": [],
            "max_detection_ms": 0,
            "allow_partial_accept": true,
            "residual_divergence_allowed": true,
        })
    }

    /// A scenario with the given nodes and corruptions.
    pub fn scenario(scenario_id: &str, nodes: Vec<Value>, corruptions: Vec<Value>) -> Value {
        json!({
            "scenario_id": scenario_id,
            "tags": ["eare"],
            "group_context": {"group_id": "g-1", "membership_version": 1, "epoch_size_limit": 64},
            "nodes": nodes,
            "corruptions": corruptions,
            "expectations": expectations(),
        })
    }

    /// Override expectation fields.
    pub fn expect(scenario: Value, patch: Value) -> Value {
        merge(scenario, json!({"expectations": patch}))
    }
}

/// SFU-abuse fixtures.
pub mod sfu {
    use super::*;

    /// A participant holding one token.
    pub fn participant(id: &str, token: &str) -> Value {
        json!({"id": id, "role": "publisher", "authz_tokens": [token], "tracks": []})
    }

    /// A `join` event.
    pub fn join(t: i64, participant: &str, token: &str) -> Value {
        json!({"t": t, "event": "join", "participant": participant, "token": token})
    }

    /// A `publish` event.
    pub fn publish(t: i64, participant: &str, track_id: &str, layers: &[&str]) -> Value {
        json!({
            "t": t,
            "event": "publish",
            "participant": participant,
            "track_id": track_id,
            "layers": layers,
        })
    }

    /// A `subscribe` event.
    pub fn subscribe(t: i64, participant: &str, track_id: &str) -> Value {
        json!({"t": t, "event": "subscribe", "participant": participant, "track_id": track_id})
    }

    /// Expectations that accept a quiet run.
    pub fn expectations() -> Value {
        json!({
            "should_detect": false,
            "expected_errors": [],
            "max_detection_ms": 0,
            "allow_partial_accept": true,
            "residual_routing_allowed": true,
            "max_hijacked_tracks": 0,
            "max_unauthorized_tracks": 10,
            "max_key_leak_attempts": 10,
            "max_extra_latency_ms": 1000,
            "max_false_positive_blocks": 0,
            "max_false_negative_leaks": 0,
        })
    }

    /// A scenario with the given participants and timeline.
    pub fn scenario(scenario_id: &str, participants: Vec<Value>, timeline: Vec<Value>) -> Value {
        let ids: Vec<Value> = participants.iter().filter_map(|p| p.get("id").cloned()).collect();
        json!({
            "scenario_id": scenario_id,
            "tags": ["sfu"],
            "sfu_context": {
                "sfu_id": "sfu-1",
                "room_id": "room-1",
                "expected_participants": ids,
                "auth_mode": "token",
            },
            "participants": participants,
            "timeline": timeline,
            "expectations": expectations(),
        })
    }

    /// Override expectation fields.
    pub fn expect(scenario: Value, patch: Value) -> Value {
        merge(scenario, json!({"expectations": patch}))
    }
}

/// Replay-storm fixtures.
pub mod replay {
    use super::*;

    /// A profile with default threshold and expectations.
    pub fn profile(profile_id: &str, burst_rate: f64, duration_ms: i64) -> Value {
        json!({"profile_id": profile_id, "burst_rate": burst_rate, "duration_ms": duration_ms})
    }

    /// A profile set document.
    pub fn profile_set(window_size: i64, capacity_per_ms: f64, profiles: Vec<Value>) -> Value {
        json!({
            "description": "fixture",
            "window_size": window_size,
            "capacity_per_ms": capacity_per_ms,
            "profiles": profiles,
        })
    }
}
