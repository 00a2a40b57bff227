//! Device-desync scenario model and parser.

use foxwhisper_core::{
    CorpusError, CorpusScenario, EventKind, FieldReader, ScenarioHeader, Timeline,
};
use foxwhisper_types::{DeviceId, ErrorCategory, MessageId, Millis};
use indexmap::IndexMap;

/// Initial state of one of a user's devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub device_id: DeviceId,
    /// Double-ratchet version counter.
    pub dr_version: i64,
    /// Logical clock.
    pub clock_ms: Millis,
    pub state_hash: Option<String>,
    pub notes: Vec<String>,
}

/// One entry of the desync `timeline`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DesyncEvent {
    /// A device sends a message and adopts `dr_version` (default: its current).
    Send {
        msg_id: MessageId,
        from: DeviceId,
        to: Vec<DeviceId>,
        dr_version: Option<i64>,
        state_hash: Option<String>,
    },
    /// A device receives a message, optionally applying a version.
    ///
    /// Neither the message nor the device has to exist; an unknown reference
    /// is what the scenario is testing.
    Recv {
        msg_id: MessageId,
        device: DeviceId,
        apply_dr_version: Option<i64>,
        state_hash: Option<String>,
    },
    /// A message is lost for `targets` (default: all of its targets).
    Drop {
        msg_id: MessageId,
        targets: Option<Vec<DeviceId>>,
    },
    /// An attacker re-injects a message.
    Replay {
        msg_id: MessageId,
        from: DeviceId,
        to: Vec<DeviceId>,
        dr_version: Option<i64>,
    },
    /// A device state is force-restored from backup.
    BackupRestore {
        device: DeviceId,
        dr_version: i64,
        state_hash: Option<String>,
    },
    /// A device clock jumps by `delta_ms`.
    ClockSkew { device: DeviceId, delta_ms: Millis },
    /// A device resynchronizes to `target_dr_version`.
    Resync {
        device: DeviceId,
        target_dr_version: i64,
        state_hash: Option<String>,
    },
}

impl EventKind for DesyncEvent {
    fn kind(&self) -> &'static str {
        match self {
            DesyncEvent::Send { .. } => "send",
            DesyncEvent::Recv { .. } => "recv",
            DesyncEvent::Drop { .. } => "drop",
            DesyncEvent::Replay { .. } => "replay",
            DesyncEvent::BackupRestore { .. } => "backup_restore",
            DesyncEvent::ClockSkew { .. } => "clock_skew",
            DesyncEvent::Resync { .. } => "resync",
        }
    }
}

/// Declared outcome of a desync scenario. Every field is required.
#[derive(Debug, Clone, PartialEq)]
pub struct DesyncExpectations {
    pub detected: bool,
    pub max_detection_ms: u64,
    pub max_recovery_ms: u64,
    pub healing_required: bool,
    pub residual_divergence_allowed: bool,
    pub max_dr_version_delta: u64,
    pub max_clock_skew_ms: u64,
    pub allow_message_loss_rate: f64,
    pub allow_out_of_order_rate: f64,
    pub expected_error_categories: Vec<ErrorCategory>,
    pub max_rollback_events: u64,
}

impl DesyncExpectations {
    fn parse(reader: &FieldReader<'_>) -> Result<Self, CorpusError> {
        Ok(Self {
            detected: reader.bool("detected")?,
            max_detection_ms: reader.u64("max_detection_ms")?,
            max_recovery_ms: reader.u64("max_recovery_ms")?,
            healing_required: reader.bool("healing_required")?,
            residual_divergence_allowed: reader.bool("residual_divergence_allowed")?,
            max_dr_version_delta: reader.u64("max_dr_version_delta")?,
            max_clock_skew_ms: reader.u64("max_clock_skew_ms")?,
            allow_message_loss_rate: reader.f64("allow_message_loss_rate")?,
            allow_out_of_order_rate: reader.f64("allow_out_of_order_rate")?,
            expected_error_categories: reader.categories("expected_error_categories")?,
            max_rollback_events: reader.u64("max_rollback_events")?,
        })
    }
}

/// A validated device-desync scenario.
#[derive(Debug, Clone)]
pub struct DesyncScenario {
    pub header: ScenarioHeader,
    /// Devices in declaration order.
    pub devices: IndexMap<DeviceId, Device>,
    pub timeline: Timeline<DesyncEvent>,
    pub expectations: DesyncExpectations,
}

impl CorpusScenario for DesyncScenario {
    fn header(&self) -> &ScenarioHeader {
        &self.header
    }
}

impl DesyncScenario {
    /// Parse the domain body of a scenario.
    pub fn parse(header: ScenarioHeader, reader: &FieldReader<'_>) -> Result<Self, CorpusError> {
        let devices = parse_devices(reader)?;

        let items = reader.non_empty_array("timeline")?;
        let timeline = Timeline::parse(reader, "timeline", items, |kind, event| {
            parse_event(kind, event, &devices)
        })?;

        let expectations = DesyncExpectations::parse(&reader.object("expectations")?)?;

        Ok(Self {
            header,
            devices,
            timeline,
            expectations,
        })
    }
}

fn parse_devices(reader: &FieldReader<'_>) -> Result<IndexMap<DeviceId, Device>, CorpusError> {
    let items = reader.non_empty_array("devices")?;
    let mut devices = IndexMap::with_capacity(items.len());

    for device in reader.objects("devices", items)? {
        let device_id = DeviceId::new(device.non_empty_str("device_id")?);
        if devices.contains_key(&device_id) {
            return Err(reader.error(format!("duplicate device_id {device_id}")));
        }
        let parsed = Device {
            device_id: device_id.clone(),
            dr_version: device.i64("dr_version")?,
            clock_ms: device.opt_i64("clock_ms")?.unwrap_or(0),
            state_hash: device.opt_str("state_hash")?.map(str::to_owned),
            notes: device.string_list("notes")?,
        };
        devices.insert(device_id, parsed);
    }

    Ok(devices)
}

fn known_device(
    event: &FieldReader<'_>,
    key: &str,
    devices: &IndexMap<DeviceId, Device>,
) -> Result<DeviceId, CorpusError> {
    let id = event.str(key)?;
    if !devices.contains_key(id) {
        return Err(event.error(format!(
            "{} references unknown device {id}",
            event.field_name(key)
        )));
    }
    Ok(DeviceId::new(id))
}

fn device_list(event: &FieldReader<'_>, key: &str) -> Result<Vec<DeviceId>, CorpusError> {
    Ok(event
        .string_list(key)?
        .into_iter()
        .map(DeviceId::from)
        .collect())
}

fn parse_event(
    kind: &str,
    event: &FieldReader<'_>,
    devices: &IndexMap<DeviceId, Device>,
) -> Result<Option<DesyncEvent>, CorpusError> {
    let msg_id = || event.str("msg_id").map(MessageId::new);
    let state_hash = || event.opt_str("state_hash").map(|hash| hash.map(str::to_owned));

    let parsed = match kind {
        "send" => DesyncEvent::Send {
            msg_id: msg_id()?,
            from: known_device(event, "from", devices)?,
            to: device_list(event, "to")?,
            dr_version: event.opt_i64("dr_version")?,
            state_hash: state_hash()?,
        },
        "recv" => DesyncEvent::Recv {
            msg_id: msg_id()?,
            device: DeviceId::new(event.str("device")?),
            apply_dr_version: event.opt_i64("apply_dr_version")?,
            state_hash: state_hash()?,
        },
        "drop" => DesyncEvent::Drop {
            msg_id: msg_id()?,
            targets: match event.opt_array("targets")? {
                Some(_) => Some(device_list(event, "targets")?),
                None => None,
            },
        },
        "replay" => DesyncEvent::Replay {
            msg_id: msg_id()?,
            from: known_device(event, "from", devices)?,
            to: device_list(event, "to")?,
            dr_version: event.opt_i64("dr_version")?,
        },
        "backup_restore" => DesyncEvent::BackupRestore {
            device: known_device(event, "device", devices)?,
            dr_version: event.i64("dr_version")?,
            state_hash: state_hash()?,
        },
        "clock_skew" => DesyncEvent::ClockSkew {
            device: known_device(event, "device", devices)?,
            delta_ms: event.i64("delta_ms")?,
        },
        "resync" => DesyncEvent::Resync {
            device: known_device(event, "device", devices)?,
            target_dr_version: event.i64("target_dr_version")?,
            state_hash: state_hash()?,
        },
        _ => return Ok(None),
    };
    Ok(Some(parsed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeviceDesyncSimulator;
    use foxwhisper_core::parse_scenario;
    use foxwhisper_test_helpers::{desync, without};
    use serde_json::{json, Value};

    fn parse(value: Value) -> Result<DesyncScenario, CorpusError> {
        parse_scenario::<DeviceDesyncSimulator>(0, &value)
    }

    fn pair(timeline: Vec<Value>) -> Value {
        desync::scenario(
            "desync-parse",
            vec![desync::device("a", 1), desync::device("b", 1)],
            timeline,
        )
    }

    #[test]
    fn test_parses_every_event_kind() {
        let scenario = parse(pair(vec![
            desync::send(0, "m1", "a", &["b"], 2),
            desync::recv(5, "m1", "b", 2),
            json!({"t": 6, "event": "drop", "msg_id": "m1"}),
            json!({"t": 7, "event": "replay", "msg_id": "m1", "from": "a", "to": ["b"]}),
            json!({"t": 8, "event": "backup_restore", "device": "b", "dr_version": 1}),
            json!({"t": 9, "event": "clock_skew", "device": "a", "delta_ms": 30}),
            json!({"t": 10, "event": "resync", "device": "b", "target_dr_version": 2}),
        ]))
        .unwrap();
        let kinds: Vec<_> = scenario.timeline.iter().map(|e| e.event.kind()).collect();
        assert_eq!(
            kinds,
            vec!["send", "recv", "drop", "replay", "backup_restore", "clock_skew", "resync"]
        );
        assert_eq!(scenario.devices.len(), 2);
    }

    #[test]
    fn test_unknown_event_kind_is_fatal() {
        let teleport = json!({"t": 0, "event": "teleport", "device": "a"});
        let err = parse(pair(vec![teleport])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "[desync-parse] unsupported event type teleport at timeline[0]"
        );
    }

    #[test]
    fn test_device_references_resolve() {
        let err = parse(pair(vec![desync::send(0, "m1", "z", &["b"], 2)])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "[desync-parse] timeline[0].from references unknown device z"
        );

        // Receiving on an unknown device is part of the attack surface.
        assert!(parse(pair(vec![desync::recv(0, "m9", "z", 2)])).is_ok());
    }

    #[test]
    fn test_device_fields_are_strict() {
        let err = parse(desync::scenario(
            "desync-parse",
            vec![desync::device("a", 1), json!({"device_id": "b", "dr_version": 1.5})],
            vec![desync::send(0, "m1", "a", &["b"], 2)],
        ))
        .unwrap_err();
        assert_eq!(err.to_string(), "[desync-parse] devices[1].dr_version must be an integer");

        let err = parse(desync::scenario(
            "desync-parse",
            vec![desync::device("a", 1), desync::device("a", 2)],
            vec![desync::send(0, "m1", "a", &["b"], 2)],
        ))
        .unwrap_err();
        assert_eq!(err.to_string(), "[desync-parse] duplicate device_id a");
    }

    #[test]
    fn test_required_collections() {
        let err = parse(pair(vec![])).unwrap_err();
        assert_eq!(err.to_string(), "[desync-parse] timeline must be a non-empty array");

        let value = without(pair(vec![desync::send(0, "m1", "a", &["b"], 2)]), "devices");
        let err = parse(value).unwrap_err();
        assert_eq!(err.to_string(), "[desync-parse] missing required field devices");
    }

    #[test]
    fn test_every_expectation_required() {
        let mut value = pair(vec![desync::send(0, "m1", "a", &["b"], 2)]);
        if let Some(expectations) = value["expectations"].as_object_mut() {
            expectations.remove("max_rollback_events");
        }
        let err = parse(value).unwrap_err();
        assert_eq!(err.to_string(), "[desync-parse] expectations missing max_rollback_events");
    }
}
