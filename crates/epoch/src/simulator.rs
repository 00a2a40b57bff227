//! Epoch-fork replay.
//!
//! The validator model keeps two accumulating indexes: every record seen per
//! epoch, and every child seen per parent. A record conflicts when its epoch
//! already holds a different hash, or when its parent already has a child with
//! a different `(epoch_id, hash)` pair. After the stream is replayed the
//! "longest valid chain" among all observed records is selected as winner.

use crate::scenario::{DetectionReference, EpochAction, EpochEvent, EpochNode, EpochScenario};
use foxwhisper_core::{ErrorSet, SimulationResult, TimedEvent};
use foxwhisper_types::{latency_between, EpochId, ErrorCategory, Millis, NodeId};
use indexmap::IndexMap;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::HashSet;
use tracing::debug;

/// Counters reported as zero; the model raises no false positives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FalsePositives {
    pub warnings: u64,
    pub hard_errors: u64,
}

/// Epoch-fork metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EpochMetrics {
    pub winning_epoch_id: Option<EpochId>,
    pub winning_hash: Option<String>,
    pub winning_node_id: Option<NodeId>,
    /// Replayed messages discarded by replay protection.
    pub messages_dropped: u64,
    /// Time the first conflicting record was issued.
    pub fork_created_ms: Option<Millis>,
    /// Records that reached the validator.
    pub observed_entries: usize,
    pub healing_actions: Vec<String>,
    pub false_positives: FalsePositives,
}

/// Validator state for one replay.
struct ForkTracker<'a> {
    scenario: &'a EpochScenario,
    /// epoch → records seen at that epoch, first-seen epoch order.
    by_epoch: IndexMap<EpochId, Vec<&'a EpochNode>>,
    /// parent → children seen under it.
    by_parent: IndexMap<&'a NodeId, Vec<&'a EpochNode>>,
    errors: ErrorSet,
    fork_created_time: Option<Millis>,
    detection_time: Option<Millis>,
    messages_dropped: u64,
}

impl<'a> ForkTracker<'a> {
    fn new(scenario: &'a EpochScenario) -> Self {
        Self {
            scenario,
            by_epoch: IndexMap::new(),
            by_parent: IndexMap::new(),
            errors: ErrorSet::new(),
            fork_created_time: None,
            detection_time: None,
            messages_dropped: 0,
        }
    }

    fn apply(&mut self, timed: &TimedEvent<EpochEvent>) {
        match &timed.event.action {
            EpochAction::EpochIssue { node_id } => self.on_issue(timed.t, &timed.event, node_id),
            EpochAction::ReplayAttempt { count } => {
                self.messages_dropped = self.messages_dropped.saturating_add(count.unwrap_or(0));
            }
            EpochAction::Merge { .. } => {}
        }
    }

    fn on_issue(&mut self, t: Millis, event: &EpochEvent, node_id: &NodeId) {
        if event.is_dropped() {
            debug!(
                scenario = %self.scenario.header.scenario_id,
                node = %node_id,
                t,
                "Record dropped before validation"
            );
            return;
        }
        let scenario = self.scenario;
        // Node references are resolved at parse time.
        let Some(node) = scenario.nodes.get(node_id) else {
            return;
        };

        let forked = self.conflicts_at_epoch(node) || self.conflicts_under_parent(node);

        self.by_epoch.entry(node.epoch_id).or_default().push(node);
        if let Some(parent) = &node.parent_id {
            self.by_parent.entry(parent).or_default().push(node);
        }

        if forked {
            self.fork_created_time.get_or_insert(t);
            if self.detection_time.is_none() {
                let detected_at = t.saturating_add(event.validation_delay());
                self.detection_time = Some(detected_at);
                self.errors.insert(ErrorCategory::EpochForkDetected);
                debug!(
                    scenario = %self.scenario.header.scenario_id,
                    node = %node.node_id,
                    epoch = node.epoch_id.get(),
                    t,
                    detected_at,
                    "Epoch fork detected"
                );
            }
        }

        self.check_chain(node);
    }

    fn conflicts_at_epoch(&self, node: &EpochNode) -> bool {
        self.by_epoch.get(&node.epoch_id).is_some_and(|seen| {
            !seen.is_empty() && seen.iter().all(|prior| prior.eare_hash != node.eare_hash)
        })
    }

    fn conflicts_under_parent(&self, node: &EpochNode) -> bool {
        let Some(parent) = &node.parent_id else {
            return false;
        };
        self.by_parent.get(parent).is_some_and(|siblings| {
            !siblings.is_empty()
                && siblings.iter().all(|prior| {
                    (prior.epoch_id, &prior.eare_hash) != (node.epoch_id, &node.eare_hash)
                })
        })
    }

    fn check_chain(&mut self, node: &EpochNode) {
        let (Some(previous), Some(parent_id)) = (&node.previous_epoch_hash, &node.parent_id) else {
            return;
        };
        if previous.is_empty() {
            return;
        }
        let Some(parent) = self.scenario.nodes.get(parent_id) else {
            return;
        };
        if parent.eare_hash != *previous && self.errors.insert(ErrorCategory::HashChainBreak) {
            debug!(
                scenario = %self.scenario.header.scenario_id,
                node = %node.node_id,
                parent = %parent_id,
                "Hash chain break"
            );
        }
    }

    /// Maximize `(depth, epoch_id, -timestamp_ms, hash)`; the first observed
    /// record wins exact ties.
    fn winner(&self) -> Option<&'a EpochNode> {
        let mut best: Option<(&'a EpochNode, (usize, EpochId, Reverse<Millis>, &'a str))> = None;
        for &node in self.by_epoch.values().flatten() {
            let key = (
                depth(node, &self.scenario.nodes),
                node.epoch_id,
                Reverse(node.timestamp_ms),
                node.eare_hash.as_str(),
            );
            if best.as_ref().map_or(true, |(_, best_key)| key > *best_key) {
                best = Some((node, key));
            }
        }
        best.map(|(node, _)| node)
    }
}

/// Distance to the root along `parent_id`, stopping at the first revisit.
fn depth(node: &EpochNode, nodes: &IndexMap<NodeId, EpochNode>) -> usize {
    let mut depth = 0;
    let mut seen = HashSet::new();
    let mut cursor = Some(node);
    while let Some(current) = cursor {
        let Some(parent) = &current.parent_id else {
            break;
        };
        if !seen.insert(&current.node_id) {
            break;
        }
        depth += 1;
        cursor = nodes.get(parent);
    }
    depth
}

/// Replay an epoch-fork scenario.
pub fn simulate(scenario: &EpochScenario) -> SimulationResult<EpochMetrics> {
    let mut tracker = ForkTracker::new(scenario);
    for timed in &scenario.events {
        tracker.apply(timed);
    }

    let winner = tracker.winner();
    let detection_time = tracker.detection_time;

    let reference_time = match scenario.expectations.detection_reference {
        DetectionReference::ForkObservable => detection_time,
        DetectionReference::ForkCreated => tracker.fork_created_time.or(detection_time),
    };
    let detection_ms = detection_time
        .zip(reference_time)
        .map(|(detected, reference)| latency_between(reference, detected));

    let merge_time = scenario.events.first_of_kind("merge").map(|merge| merge.t);
    let reconciliation_ms = detection_time
        .zip(merge_time)
        .map(|(detected, merged)| latency_between(detected, merged));

    let metrics = EpochMetrics {
        winning_epoch_id: winner.map(|node| node.epoch_id),
        winning_hash: winner.map(|node| node.eare_hash.clone()),
        winning_node_id: winner.map(|node| node.node_id.clone()),
        messages_dropped: tracker.messages_dropped,
        fork_created_ms: tracker.fork_created_time,
        observed_entries: tracker.by_epoch.values().map(Vec::len).sum(),
        healing_actions: Vec::new(),
        false_positives: FalsePositives::default(),
    };

    debug!(
        scenario = %scenario.header.scenario_id,
        detected = detection_time.is_some(),
        winner = ?metrics.winning_node_id,
        "Epoch replay finished"
    );

    SimulationResult {
        detection: detection_time.is_some(),
        detection_ms,
        recovery_ms: reconciliation_ms,
        errors: tracker.errors,
        notes: Vec::new(),
        metrics,
    }
}
