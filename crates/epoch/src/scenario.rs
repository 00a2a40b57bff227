//! Epoch-fork scenario model and parser.

use foxwhisper_core::{
    CorpusError, CorpusScenario, EventKind, FieldReader, ScenarioHeader, Timeline,
};
use foxwhisper_types::{EpochId, ErrorCategory, Millis, NodeId};
use indexmap::IndexMap;
use serde_json::{Map, Value};

/// One epoch record in the fork graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochNode {
    pub node_id: NodeId,
    pub epoch_id: EpochId,
    pub eare_hash: String,
    pub previous_epoch_hash: Option<String>,
    pub membership_digest: Option<String>,
    /// Parent in the epoch tree; an empty string in the corpus means none.
    pub parent_id: Option<NodeId>,
    pub issued_by: String,
    pub timestamp_ms: Millis,
}

/// Declared graph edge. Kept for reporting; the simulator follows `parent_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochEdge {
    pub from: NodeId,
    pub to: NodeId,
    pub edge_type: String,
}

/// Fault annotation carried by an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// The issued record never reaches the validator.
    DropNextEare,
    /// Validation of the record is delayed by this many milliseconds.
    DelayValidation(Millis),
    /// Any other annotation; carried but inert.
    Other(String),
}

impl Fault {
    fn parse(raw: &str) -> Self {
        if raw == "drop_next_eare" {
            return Fault::DropNextEare;
        }
        match raw.strip_prefix("delay_validation:") {
            Some(ms) => Fault::DelayValidation(ms.trim().parse().unwrap_or(0)),
            None => Fault::Other(raw.to_owned()),
        }
    }
}

/// What an event does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EpochAction {
    /// A controller issues the record of `node_id`.
    EpochIssue { node_id: NodeId },
    /// Replayed traffic; `count` messages are dropped by replay protection.
    ReplayAttempt { count: Option<u64> },
    /// Controllers reconcile the fork.
    Merge {
        participants: Vec<String>,
        reconcile_strategy: Option<String>,
    },
}

/// An event of the `event_stream`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochEvent {
    pub action: EpochAction,
    pub controller: Option<String>,
    pub epoch_id: Option<EpochId>,
    pub faults: Vec<Fault>,
}

impl EpochEvent {
    /// Whether the event carries `drop_next_eare`.
    pub fn is_dropped(&self) -> bool {
        self.faults.contains(&Fault::DropNextEare)
    }

    /// Validation delay of the first `delay_validation` fault, or 0.
    pub fn validation_delay(&self) -> Millis {
        self.faults
            .iter()
            .find_map(|fault| match fault {
                Fault::DelayValidation(ms) => Some(*ms),
                _ => None,
            })
            .unwrap_or(0)
    }
}

impl EventKind for EpochEvent {
    fn kind(&self) -> &'static str {
        match self.action {
            EpochAction::EpochIssue { .. } => "epoch_issue",
            EpochAction::ReplayAttempt { .. } => "replay_attempt",
            EpochAction::Merge { .. } => "merge",
        }
    }
}

/// Which instant detection latency is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectionReference {
    /// When the conflicting record was issued.
    #[default]
    ForkCreated,
    /// When the conflict became observable (after validation delay).
    ForkObservable,
}

impl DetectionReference {
    fn parse(reader: &FieldReader<'_>) -> Result<Self, CorpusError> {
        match reader.opt_str("detection_reference")? {
            None | Some("fork_created") => Ok(DetectionReference::ForkCreated),
            Some("fork_observable") => Ok(DetectionReference::ForkObservable),
            Some(other) => Err(reader.error(format!(
                "{} must be fork_created or fork_observable, got {other}",
                reader.field_name("detection_reference")
            ))),
        }
    }
}

/// Epoch the scenario must reconcile to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReconciledEpoch {
    pub epoch_id: Option<EpochId>,
    pub eare_hash: Option<String>,
}

/// Tolerated replay gap. A zero bound is not enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplayGap {
    pub max_messages: u64,
    pub max_ms: u64,
}

/// Declared outcome of an epoch-fork scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochExpectations {
    pub detected: bool,
    pub detection_reference: DetectionReference,
    pub max_detection_ms: u64,
    pub max_reconciliation_ms: u64,
    pub reconciled_epoch: ReconciledEpoch,
    pub allow_replay_gap: ReplayGap,
    pub expected_error_categories: Vec<ErrorCategory>,
    pub healing_required: bool,
}

impl EpochExpectations {
    fn parse(reader: &FieldReader<'_>) -> Result<Self, CorpusError> {
        let reconciled_epoch = match reader.opt_object("reconciled_epoch")? {
            Some(epoch) => ReconciledEpoch {
                epoch_id: epoch.opt_i64("epoch_id")?.map(EpochId),
                eare_hash: epoch
                    .opt_str("eare_hash")?
                    .filter(|hash| !hash.is_empty())
                    .map(str::to_owned),
            },
            None => ReconciledEpoch::default(),
        };
        let allow_replay_gap = match reader.opt_object("allow_replay_gap")? {
            Some(gap) => ReplayGap {
                max_messages: gap.opt_u64("max_messages")?.unwrap_or(0),
                max_ms: gap.opt_u64("max_ms")?.unwrap_or(0),
            },
            None => ReplayGap::default(),
        };

        Ok(Self {
            detected: reader.bool("detected")?,
            detection_reference: DetectionReference::parse(reader)?,
            max_detection_ms: reader.opt_u64("max_detection_ms")?.unwrap_or(0),
            max_reconciliation_ms: reader.opt_u64("max_reconciliation_ms")?.unwrap_or(0),
            reconciled_epoch,
            allow_replay_gap,
            expected_error_categories: reader.opt_categories("expected_error_categories")?,
            healing_required: reader.opt_bool("healing_required")?.unwrap_or(false),
        })
    }
}

/// A validated epoch-fork scenario.
#[derive(Debug, Clone)]
pub struct EpochScenario {
    pub header: ScenarioHeader,
    /// Opaque group metadata.
    pub group_context: Map<String, Value>,
    /// Nodes in declaration order.
    pub nodes: IndexMap<NodeId, EpochNode>,
    pub edges: Vec<EpochEdge>,
    pub events: Timeline<EpochEvent>,
    pub expectations: EpochExpectations,
}

impl CorpusScenario for EpochScenario {
    fn header(&self) -> &ScenarioHeader {
        &self.header
    }
}

impl EpochScenario {
    /// Parse the domain body of a scenario.
    pub fn parse(header: ScenarioHeader, reader: &FieldReader<'_>) -> Result<Self, CorpusError> {
        let group_context = reader
            .opt_object("group_context")?
            .map(|context| context.raw().clone())
            .unwrap_or_default();

        let graph = reader.object("graph")?;
        let nodes = parse_nodes(&graph)?;
        let edges = parse_edges(&graph, &nodes)?;

        let items = reader.array("event_stream")?;
        let events = Timeline::parse(reader, "event_stream", items, |kind, event| {
            parse_event(kind, event, &nodes)
        })?;

        let expectations = EpochExpectations::parse(&reader.object("expectations")?)?;

        Ok(Self {
            header,
            group_context,
            nodes,
            edges,
            events,
            expectations,
        })
    }
}

fn parse_nodes(graph: &FieldReader<'_>) -> Result<IndexMap<NodeId, EpochNode>, CorpusError> {
    let items = graph.array("nodes")?;
    let mut nodes = IndexMap::with_capacity(items.len());

    for node in graph.objects("nodes", items)? {
        let node_id = NodeId::new(node.non_empty_str("node_id")?);
        if nodes.contains_key(&node_id) {
            return Err(graph.error(format!("duplicate node_id {node_id}")));
        }
        let parsed = EpochNode {
            node_id: node_id.clone(),
            epoch_id: EpochId(node.i64("epoch_id")?),
            eare_hash: node.str("eare_hash")?.to_owned(),
            previous_epoch_hash: node.opt_str("previous_epoch_hash")?.map(str::to_owned),
            membership_digest: node.opt_str("membership_digest")?.map(str::to_owned),
            parent_id: node
                .opt_str("parent_id")?
                .filter(|parent| !parent.is_empty())
                .map(NodeId::new),
            issued_by: node.opt_str("issued_by")?.unwrap_or_default().to_owned(),
            timestamp_ms: node.opt_i64("timestamp_ms")?.unwrap_or(0),
        };
        nodes.insert(node_id, parsed);
    }

    for node in nodes.values() {
        if let Some(parent) = &node.parent_id {
            if !nodes.contains_key(parent) {
                return Err(graph.error(format!(
                    "node {} references unknown parent {parent}",
                    node.node_id
                )));
            }
        }
    }

    Ok(nodes)
}

fn parse_edges(
    graph: &FieldReader<'_>,
    nodes: &IndexMap<NodeId, EpochNode>,
) -> Result<Vec<EpochEdge>, CorpusError> {
    let Some(items) = graph.opt_array("edges")? else {
        return Ok(Vec::new());
    };

    graph
        .objects("edges", items)?
        .iter()
        .map(|edge| {
            let from = known_node(edge, "from", nodes)?;
            let to = known_node(edge, "to", nodes)?;
            Ok(EpochEdge {
                from,
                to,
                edge_type: edge.opt_str("type")?.unwrap_or("linear").to_owned(),
            })
        })
        .collect()
}

fn known_node(
    reader: &FieldReader<'_>,
    key: &str,
    nodes: &IndexMap<NodeId, EpochNode>,
) -> Result<NodeId, CorpusError> {
    let id = reader.str(key)?;
    if !nodes.contains_key(id) {
        return Err(reader.error(format!(
            "{} references unknown node {id}",
            reader.field_name(key)
        )));
    }
    Ok(NodeId::new(id))
}

fn parse_event(
    kind: &str,
    event: &FieldReader<'_>,
    nodes: &IndexMap<NodeId, EpochNode>,
) -> Result<Option<EpochEvent>, CorpusError> {
    let action = match kind {
        "epoch_issue" => EpochAction::EpochIssue {
            node_id: known_node(event, "node_id", nodes)?,
        },
        "replay_attempt" => EpochAction::ReplayAttempt {
            count: event.opt_u64("count")?,
        },
        "merge" => EpochAction::Merge {
            participants: event.string_list("participants")?,
            reconcile_strategy: event.opt_str("reconcile_strategy")?.map(str::to_owned),
        },
        _ => return Ok(None),
    };

    Ok(Some(EpochEvent {
        action,
        controller: event.opt_str("controller")?.map(str::to_owned),
        epoch_id: event.opt_i64("epoch_id")?.map(EpochId),
        faults: event
            .string_list("faults")?
            .iter()
            .map(|fault| Fault::parse(fault))
            .collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EpochForkSimulator;
    use foxwhisper_core::parse_scenario;
    use foxwhisper_test_helpers::{epoch, merge};
    use serde_json::json;

    fn parse(value: Value) -> Result<EpochScenario, CorpusError> {
        parse_scenario::<EpochForkSimulator>(0, &value)
    }

    #[test]
    fn test_parses_graph_and_defaults() {
        let value = epoch::scenario(
            "fork-01",
            vec![epoch::root("n0", 0, "h0"), epoch::child("n1", 1, "h1", "n0", "h0")],
            vec![epoch::issue(0, "n0"), epoch::issue(5, "n1")],
        );
        let value = merge(value, json!({"graph": {"edges": [{"from": "n0", "to": "n1"}]}}));
        let scenario = parse(value).unwrap();

        assert_eq!(scenario.nodes.len(), 2);
        assert_eq!(scenario.nodes["n1"].parent_id, Some(NodeId::new("n0")));
        assert_eq!(scenario.edges[0].edge_type, "linear");
        assert_eq!(scenario.events.len(), 2);
        assert_eq!(
            scenario.expectations.detection_reference,
            DetectionReference::ForkCreated
        );
        assert!(scenario.expectations.expected_error_categories.is_empty());
    }

    #[test]
    fn test_faults_parse() {
        assert_eq!(Fault::parse("drop_next_eare"), Fault::DropNextEare);
        assert_eq!(Fault::parse("delay_validation:40"), Fault::DelayValidation(40));
        assert_eq!(Fault::parse("delay_validation:soon"), Fault::DelayValidation(0));
        assert_eq!(Fault::parse("jitter"), Fault::Other("jitter".into()));
    }

    #[test]
    fn test_dangling_parent_rejected() {
        let value = epoch::scenario(
            "fork-02",
            vec![epoch::child("n1", 1, "h1", "ghost", "h0")],
            vec![],
        );
        let err = parse(value).unwrap_err();
        assert_eq!(err.to_string(), "[fork-02] node n1 references unknown parent ghost");
    }

    #[test]
    fn test_unknown_issue_node_rejected() {
        let value = epoch::scenario("fork-03", vec![epoch::root("n0", 0, "h0")], vec![
            epoch::issue(0, "n9"),
        ]);
        let err = parse(value).unwrap_err();
        assert_eq!(
            err.to_string(),
            "[fork-03] event_stream[0].node_id references unknown node n9"
        );
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let value = epoch::scenario(
            "fork-04",
            vec![epoch::root("n0", 0, "h0"), epoch::root("n0", 1, "h1")],
            vec![],
        );
        let err = parse(value).unwrap_err();
        assert_eq!(err.to_string(), "[fork-04] duplicate node_id n0");
    }

    #[test]
    fn test_unknown_event_and_reference_rejected() {
        let value = epoch::scenario("fork-05", vec![epoch::root("n0", 0, "h0")], vec![
            json!({"t": 1, "event": "rewind"}),
        ]);
        let err = parse(value).unwrap_err();
        assert_eq!(
            err.to_string(),
            "[fork-05] unsupported event type rewind at event_stream[0]"
        );

        let value = merge(
            epoch::scenario("fork-06", vec![epoch::root("n0", 0, "h0")], vec![]),
            json!({"expectations": {"detection_reference": "fork_soon"}}),
        );
        assert!(parse(value).is_err());
    }

    #[test]
    fn test_detected_is_required() {
        let mut value = epoch::scenario("fork-07", vec![epoch::root("n0", 0, "h0")], vec![]);
        value["expectations"] = json!({"max_detection_ms": 10});
        let err = parse(value).unwrap_err();
        assert_eq!(err.to_string(), "[fork-07] expectations missing detected");
    }
}
