//! Multi-device desync replay.
//!
//! Every device carries a DR version and a logical clock. Messages are
//! tracked as envelopes with per-target delivery and drop sets. After each
//! event the spread between the highest and lowest DR version is sampled;
//! a positive spread is divergence, and the first return to zero after it
//! is recovery.

use crate::scenario::{Device, DesyncEvent, DesyncScenario};
use foxwhisper_core::{ErrorSet, SimulationResult, TimedEvent};
use foxwhisper_types::{latency_between, DeviceId, ErrorCategory, MessageId, Millis};
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use tracing::debug;

/// Device-desync metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DesyncMetrics {
    pub max_dr_version_delta: u64,
    pub avg_dr_version_delta: f64,
    pub max_clock_skew_ms: u64,
    /// Devices off the minimum version at the end of the timeline.
    pub diverged_device_count: usize,
    pub max_diverged_device_count: usize,
    pub delivered_messages: u64,
    pub expected_messages: u64,
    pub dropped_messages: u64,
    /// Re-sends of a known message plus injected replays.
    pub replayed_messages: u64,
    pub message_loss_rate: f64,
    pub out_of_order_deliveries: u64,
    pub out_of_order_rate: f64,
    pub skew_violations: u64,
    pub recovery_attempts: u64,
    pub successful_recoveries: u64,
    pub failed_recoveries: u64,
    /// Largest single regression of any device's DR version.
    pub max_rollback_events: u64,
    pub residual_divergence: bool,
}

#[derive(Debug, Clone)]
struct DeviceState {
    dr_version: i64,
    clock_ms: Millis,
    state_hash: Option<String>,
}

impl From<&Device> for DeviceState {
    fn from(device: &Device) -> Self {
        Self {
            dr_version: device.dr_version,
            clock_ms: device.clock_ms,
            state_hash: device.state_hash.clone(),
        }
    }
}

#[derive(Debug)]
struct Envelope {
    targets: Vec<DeviceId>,
    send_time: Millis,
    delivered: IndexSet<DeviceId>,
    replay_count: u64,
}

impl Envelope {
    fn new(targets: &[DeviceId], send_time: Millis) -> Self {
        Self {
            targets: targets.to_vec(),
            send_time,
            delivered: IndexSet::new(),
            replay_count: 0,
        }
    }
}

/// Replay state for one desync scenario.
struct DesyncTracker<'a> {
    scenario: &'a DesyncScenario,
    devices: IndexMap<DeviceId, DeviceState>,
    messages: IndexMap<MessageId, Envelope>,
    errors: ErrorSet,
    notes: Vec<String>,

    divergence_start: Option<Millis>,
    detection_time: Option<Millis>,
    recovery_time: Option<Millis>,

    delta_integral: u64,
    delta_samples: u64,
    max_delta: u64,
    max_skew: u64,
    max_diverged: usize,
    max_rollback: u64,

    expected_messages: u64,
    delivered_messages: u64,
    dropped_messages: u64,
    out_of_order: u64,
    skew_violations: u64,
    recovery_attempts: u64,
    successful_recoveries: u64,
    failed_recoveries: u64,
}

impl<'a> DesyncTracker<'a> {
    fn new(scenario: &'a DesyncScenario) -> Self {
        let devices: IndexMap<_, _> = scenario
            .devices
            .iter()
            .map(|(id, device)| (id.clone(), DeviceState::from(device)))
            .collect();
        let mut tracker = Self {
            scenario,
            devices,
            messages: IndexMap::new(),
            errors: ErrorSet::new(),
            notes: Vec::new(),
            divergence_start: None,
            detection_time: None,
            recovery_time: None,
            delta_integral: 0,
            delta_samples: 0,
            max_delta: 0,
            max_skew: 0,
            max_diverged: 0,
            max_rollback: 0,
            expected_messages: 0,
            delivered_messages: 0,
            dropped_messages: 0,
            out_of_order: 0,
            skew_violations: 0,
            recovery_attempts: 0,
            successful_recoveries: 0,
            failed_recoveries: 0,
        };
        tracker.max_skew = tracker.clock_skew();
        tracker
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Observables
    // ═══════════════════════════════════════════════════════════════════════

    fn version_bounds(&self) -> Option<(i64, i64)> {
        let mut versions = self.devices.values().map(|device| device.dr_version);
        let first = versions.next()?;
        Some(versions.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
    }

    fn version_delta(&self) -> u64 {
        self.version_bounds()
            .map_or(0, |(lo, hi)| latency_between(lo, hi))
    }

    fn diverged_count(&self) -> usize {
        let Some((lo, _)) = self.version_bounds() else {
            return 0;
        };
        self.devices
            .values()
            .filter(|device| device.dr_version != lo)
            .count()
    }

    fn clock_skew(&self) -> u64 {
        let lo = self.devices.values().map(|device| device.clock_ms).min();
        let hi = self.devices.values().map(|device| device.clock_ms).max();
        match (lo, hi) {
            (Some(lo), Some(hi)) => latency_between(lo, hi),
            _ => 0,
        }
    }

    fn distinct_state_hashes(&self) -> usize {
        self.devices
            .values()
            .filter_map(|device| device.state_hash.as_deref())
            .collect::<IndexSet<_>>()
            .len()
    }

    fn mark_error(&mut self, category: ErrorCategory, at: Option<Millis>) {
        if self.errors.insert(category) {
            debug!(
                scenario = %self.scenario.header.scenario_id,
                category = %category,
                at = ?at,
                "Desync error raised"
            );
        }
        if let Some(at) = at {
            self.detection_time.get_or_insert(at);
        }
    }

    /// Move a device to `version`, recording the size of any regression.
    /// Returns whether the move was a rollback.
    fn set_version(
        &mut self,
        device: &DeviceId,
        version: i64,
        state_hash: Option<&String>,
    ) -> bool {
        let Some(state) = self.devices.get_mut(device) else {
            return false;
        };
        let rolled_back = version < state.dr_version;
        if rolled_back {
            self.max_rollback = self
                .max_rollback
                .max(latency_between(version, state.dr_version));
        }
        state.dr_version = version;
        if let Some(hash) = state_hash {
            state.state_hash = Some(hash.clone());
        }
        rolled_back
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Event handling
    // ═══════════════════════════════════════════════════════════════════════

    fn apply(&mut self, timed: &TimedEvent<DesyncEvent>) {
        let t = timed.t;
        for device in self.devices.values_mut() {
            device.clock_ms = device.clock_ms.max(t);
        }

        match &timed.event {
            DesyncEvent::Send {
                msg_id,
                from,
                to,
                dr_version,
                state_hash,
            } => self.on_send(t, msg_id, from, to, *dr_version, state_hash.as_ref()),
            DesyncEvent::Recv {
                msg_id,
                device,
                apply_dr_version,
                state_hash,
            } => self.on_recv(t, msg_id, device, *apply_dr_version, state_hash.as_ref()),
            DesyncEvent::Drop { msg_id, targets } => self.on_drop(t, msg_id, targets.as_deref()),
            DesyncEvent::Replay { msg_id, to, .. } => self.on_replay(t, msg_id, to),
            DesyncEvent::BackupRestore {
                device,
                dr_version,
                state_hash,
            } => {
                if self.set_version(device, *dr_version, state_hash.as_ref()) {
                    self.mark_error(ErrorCategory::RollbackApplied, None);
                }
            }
            DesyncEvent::ClockSkew { device, delta_ms } => self.on_clock_skew(t, device, *delta_ms),
            DesyncEvent::Resync {
                device,
                target_dr_version,
                state_hash,
            } => self.on_resync(device, *target_dr_version, state_hash.as_ref()),
        }

        self.sample(t);
    }

    fn on_send(
        &mut self,
        t: Millis,
        msg_id: &MessageId,
        from: &DeviceId,
        to: &[DeviceId],
        dr_version: Option<i64>,
        state_hash: Option<&String>,
    ) {
        self.messages
            .entry(msg_id.clone())
            .and_modify(|envelope| envelope.replay_count += 1)
            .or_insert_with(|| Envelope::new(to, t));
        self.expected_messages += to.len() as u64;

        let Some(current) = self.devices.get(from).map(|device| device.dr_version) else {
            return;
        };
        self.set_version(from, dr_version.unwrap_or(current), state_hash);
    }

    fn on_recv(
        &mut self,
        t: Millis,
        msg_id: &MessageId,
        device: &DeviceId,
        apply_dr_version: Option<i64>,
        state_hash: Option<&String>,
    ) {
        let Some(current) = self.devices.get(device).map(|state| state.dr_version) else {
            self.mark_error(ErrorCategory::UnknownMessage, Some(t));
            return;
        };
        let Some(envelope) = self.messages.get_mut(msg_id) else {
            self.mark_error(ErrorCategory::UnknownMessage, Some(t));
            return;
        };

        let duplicate = !envelope.delivered.insert(device.clone());
        let out_of_order = t < envelope.send_time;
        self.delivered_messages += 1;
        if duplicate {
            self.mark_error(ErrorCategory::DuplicateDelivery, None);
        }
        if out_of_order {
            self.out_of_order += 1;
        }

        self.set_version(device, apply_dr_version.unwrap_or(current), state_hash);
    }

    fn on_drop(&mut self, t: Millis, msg_id: &MessageId, targets: Option<&[DeviceId]>) {
        let Some(envelope) = self.messages.get(msg_id) else {
            self.mark_error(ErrorCategory::UnknownMessage, Some(t));
            return;
        };
        let lost = targets.map_or(envelope.targets.len(), <[DeviceId]>::len);
        self.dropped_messages += lost as u64;
    }

    fn on_replay(&mut self, t: Millis, msg_id: &MessageId, to: &[DeviceId]) {
        self.messages
            .entry(msg_id.clone())
            .or_insert_with(|| Envelope::new(to, t))
            .replay_count += 1;
        self.expected_messages += to.len() as u64;
        self.mark_error(ErrorCategory::ReplayInjected, Some(t));
    }

    fn on_clock_skew(&mut self, t: Millis, device: &DeviceId, delta_ms: Millis) {
        if let Some(state) = self.devices.get_mut(device) {
            state.clock_ms = state.clock_ms.saturating_add(delta_ms);
        }
        self.max_skew = self.max_skew.max(self.clock_skew());
        if self.max_skew > self.scenario.expectations.max_clock_skew_ms {
            self.skew_violations += 1;
            self.mark_error(ErrorCategory::ClockSkewViolation, Some(t));
        }
    }

    fn on_resync(&mut self, device: &DeviceId, target: i64, state_hash: Option<&String>) {
        self.recovery_attempts += 1;
        let before = self.version_delta();
        self.set_version(device, target, state_hash);
        let after = self.version_delta();

        if after == 0 {
            self.successful_recoveries += 1;
        } else if after < before {
            self.notes.push(format!("resync on {device} reduced divergence"));
        } else {
            self.failed_recoveries += 1;
        }
    }

    fn sample(&mut self, t: Millis) {
        let delta = self.version_delta();
        self.delta_integral = self.delta_integral.saturating_add(delta);
        self.delta_samples += 1;
        self.max_delta = self.max_delta.max(delta);

        if delta > 0 {
            if self.divergence_start.is_none() {
                self.divergence_start = Some(t);
                self.detection_time.get_or_insert(t);
                debug!(
                    scenario = %self.scenario.header.scenario_id,
                    t,
                    delta,
                    "Divergence started"
                );
            }
            self.errors.insert(ErrorCategory::DivergenceDetected);
        } else if self.divergence_start.is_some() && self.recovery_time.is_none() {
            self.recovery_time = Some(t);
            debug!(scenario = %self.scenario.header.scenario_id, t, "Divergence healed");
        }

        self.max_diverged = self.max_diverged.max(self.diverged_count());
        self.max_skew = self.max_skew.max(self.clock_skew());
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Replay a device-desync scenario.
pub fn simulate(scenario: &DesyncScenario) -> SimulationResult<DesyncMetrics> {
    let mut tracker = DesyncTracker::new(scenario);
    for timed in &scenario.timeline {
        tracker.apply(timed);
    }

    // Errors without any version spread still count as a detected divergence,
    // anchored at the start of the timeline.
    if tracker.divergence_start.is_none() && !tracker.errors.is_empty() {
        let first = scenario.timeline.first_time().unwrap_or(0);
        tracker.divergence_start = Some(first);
        tracker.detection_time.get_or_insert(first);
    }

    let final_delta = tracker.version_delta();
    let detection = tracker.divergence_start.is_some();
    let detection_ms = tracker
        .divergence_start
        .zip(tracker.detection_time)
        .map(|(start, detected)| latency_between(start, detected));
    let recovery_ms = tracker
        .detection_time
        .zip(tracker.recovery_time)
        .map(|(detected, recovered)| latency_between(detected, recovered));

    let undelivered = tracker
        .expected_messages
        .saturating_sub(tracker.delivered_messages);
    let message_loss_rate = ratio(undelivered, tracker.expected_messages);
    let out_of_order_rate = ratio(tracker.out_of_order, tracker.delivered_messages);

    // Delivery anomalies are reported but do not count towards detection.
    if message_loss_rate > 0.0 {
        tracker.mark_error(ErrorCategory::MessageLoss, None);
    }
    if tracker.out_of_order > 0 {
        tracker.mark_error(ErrorCategory::OutOfOrder, None);
    }

    let metrics = DesyncMetrics {
        max_dr_version_delta: tracker.max_delta,
        avg_dr_version_delta: ratio(tracker.delta_integral, tracker.delta_samples),
        max_clock_skew_ms: tracker.max_skew,
        diverged_device_count: tracker.diverged_count(),
        max_diverged_device_count: tracker.max_diverged,
        delivered_messages: tracker.delivered_messages,
        expected_messages: tracker.expected_messages,
        dropped_messages: tracker.dropped_messages,
        replayed_messages: tracker.messages.values().map(|env| env.replay_count).sum(),
        message_loss_rate,
        out_of_order_deliveries: tracker.out_of_order,
        out_of_order_rate,
        skew_violations: tracker.skew_violations,
        recovery_attempts: tracker.recovery_attempts,
        successful_recoveries: tracker.successful_recoveries,
        failed_recoveries: tracker.failed_recoveries,
        max_rollback_events: tracker.max_rollback,
        residual_divergence: final_delta > 0,
    };

    debug!(
        scenario = %scenario.header.scenario_id,
        detection,
        max_delta = metrics.max_dr_version_delta,
        residual = metrics.residual_divergence,
        state_hashes = tracker.distinct_state_hashes(),
        "Desync replay finished"
    );

    SimulationResult {
        detection,
        detection_ms,
        recovery_ms,
        errors: tracker.errors,
        notes: tracker.notes,
        metrics,
    }
}
