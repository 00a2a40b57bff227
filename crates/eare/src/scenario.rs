//! Corrupted EARE chain scenario model and parser.

use foxwhisper_core::{CorpusError, CorpusScenario, FieldReader, ScenarioHeader};
use foxwhisper_types::{EpochId, ErrorCategory, NodeId};
use indexmap::IndexSet;
use serde_json::{Map, Value};
use std::fmt;

/// Group the record chain belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupContext {
    pub group_id: String,
    pub membership_version: i64,
    pub epoch_size_limit: i64,
}

/// One EARE record in the chain.
#[derive(Debug, Clone, PartialEq)]
pub struct EareNode {
    pub node_id: NodeId,
    pub epoch_id: EpochId,
    pub eare_hash: String,
    pub issued_by: String,
    pub previous_epoch_hash: String,
    pub membership_digest: String,
    pub payload: Option<Map<String, Value>>,
}

/// The kind of damage a corruption inflicts, matched case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorruptionKind {
    InvalidSignature,
    InvalidPop,
    ExtraFields,
    PayloadTampered,
    StaleEpochRef,
    HashChainBreak,
    TruncatedEare,
    /// Legacy spelling of [`CorruptionKind::PayloadTampered`].
    TamperPayload,
    /// Unrecognized type, spelled as declared.
    Unknown(String),
}

impl CorruptionKind {
    /// Parse a corruption type name. Known codes match case-insensitively.
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "INVALID_SIGNATURE" => CorruptionKind::InvalidSignature,
            "INVALID_POP" => CorruptionKind::InvalidPop,
            "EXTRA_FIELDS" => CorruptionKind::ExtraFields,
            "PAYLOAD_TAMPERED" => CorruptionKind::PayloadTampered,
            "STALE_EPOCH_REF" => CorruptionKind::StaleEpochRef,
            "HASH_CHAIN_BREAK" => CorruptionKind::HashChainBreak,
            "TRUNCATED_EARE" => CorruptionKind::TruncatedEare,
            "TAMPER_PAYLOAD" => CorruptionKind::TamperPayload,
            _ => CorruptionKind::Unknown(name.to_owned()),
        }
    }

    /// Upper-case wire name, or the declared spelling of an unknown type.
    pub fn as_str(&self) -> &str {
        match self {
            CorruptionKind::InvalidSignature => "INVALID_SIGNATURE",
            CorruptionKind::InvalidPop => "INVALID_POP",
            CorruptionKind::ExtraFields => "EXTRA_FIELDS",
            CorruptionKind::PayloadTampered => "PAYLOAD_TAMPERED",
            CorruptionKind::StaleEpochRef => "STALE_EPOCH_REF",
            CorruptionKind::HashChainBreak => "HASH_CHAIN_BREAK",
            CorruptionKind::TruncatedEare => "TRUNCATED_EARE",
            CorruptionKind::TamperPayload => "TAMPER_PAYLOAD",
            CorruptionKind::Unknown(name) => name,
        }
    }

    /// Whether the name is one of the canonical corruption codes.
    ///
    /// The legacy `TAMPER_PAYLOAD` spelling is handled but not canonical.
    pub fn is_canonical(&self) -> bool {
        !matches!(self, CorruptionKind::TamperPayload | CorruptionKind::Unknown(_))
    }

    /// Category raised when the corruption is applied.
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            CorruptionKind::InvalidSignature => Some(ErrorCategory::InvalidSignature),
            CorruptionKind::InvalidPop => Some(ErrorCategory::InvalidPop),
            CorruptionKind::ExtraFields => Some(ErrorCategory::ExtraFields),
            CorruptionKind::PayloadTampered | CorruptionKind::TamperPayload => {
                Some(ErrorCategory::PayloadTampered)
            }
            CorruptionKind::StaleEpochRef => Some(ErrorCategory::StaleEpochRef),
            CorruptionKind::HashChainBreak => Some(ErrorCategory::HashChainBreak),
            CorruptionKind::TruncatedEare => Some(ErrorCategory::TruncatedEare),
            CorruptionKind::Unknown(_) => None,
        }
    }
}

impl fmt::Display for CorruptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which records a corruption applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorruptionTarget {
    /// `"*"` or absent.
    AllNodes,
    Node(NodeId),
}

/// A declared mutation of the record chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Corruption {
    /// `type` exactly as declared.
    pub name: String,
    pub kind: CorruptionKind,
    pub target: CorruptionTarget,
    pub fields: Vec<String>,
    pub payload_patch: Option<Map<String, Value>>,
    pub reason: Option<String>,
}

impl Corruption {
    /// Whether this corruption is aimed at `node_id` specifically.
    pub fn targets_node(&self, node_id: &NodeId) -> bool {
        matches!(&self.target, CorruptionTarget::Node(target) if target == node_id)
    }

    /// Whether this corruption applies to every record.
    pub fn targets_all(&self) -> bool {
        self.target == CorruptionTarget::AllNodes
    }
}

/// Declared outcome of a corrupted-chain scenario. Every field is required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EareExpectations {
    pub should_detect: bool,
    pub expected_errors: Vec<ErrorCategory>,
    pub max_detection_ms: u64,
    pub allow_partial_accept: bool,
    pub residual_divergence_allowed: bool,
}

/// A validated corrupted-chain scenario.
#[derive(Debug, Clone)]
pub struct EareScenario {
    pub header: ScenarioHeader,
    pub group_context: GroupContext,
    /// Records sorted by epoch, declaration order within an epoch.
    pub nodes: Vec<EareNode>,
    pub corruptions: Vec<Corruption>,
    pub expectations: EareExpectations,
}

impl CorpusScenario for EareScenario {
    fn header(&self) -> &ScenarioHeader {
        &self.header
    }
}

impl EareScenario {
    /// Parse the domain body of a scenario.
    pub fn parse(header: ScenarioHeader, reader: &FieldReader<'_>) -> Result<Self, CorpusError> {
        let context = reader.object("group_context")?;
        let group_context = GroupContext {
            group_id: context.str("group_id")?.to_owned(),
            membership_version: context.i64("membership_version")?,
            epoch_size_limit: context.i64("epoch_size_limit")?,
        };

        let mut nodes = parse_nodes(reader)?;
        nodes.sort_by_key(|node| node.epoch_id);

        let corruptions = parse_corruptions(reader, &nodes)?;

        let exp = reader.object("expectations")?;
        let expectations = EareExpectations {
            should_detect: exp.bool("should_detect")?,
            expected_errors: exp.categories("expected_errors")?,
            max_detection_ms: exp.u64("max_detection_ms")?,
            allow_partial_accept: exp.bool("allow_partial_accept")?,
            residual_divergence_allowed: exp.bool("residual_divergence_allowed")?,
        };

        Ok(Self {
            header,
            group_context,
            nodes,
            corruptions,
            expectations,
        })
    }
}

fn parse_nodes(reader: &FieldReader<'_>) -> Result<Vec<EareNode>, CorpusError> {
    let items = reader.non_empty_array("nodes")?;
    let mut seen = IndexSet::with_capacity(items.len());
    let mut nodes = Vec::with_capacity(items.len());

    for node in reader.objects("nodes", items)? {
        let node_id = NodeId::new(node.str("node_id")?);
        if !seen.insert(node_id.clone()) {
            return Err(reader.error(format!("duplicate node_id {node_id}")));
        }
        nodes.push(EareNode {
            node_id,
            epoch_id: EpochId(node.i64("epoch_id")?),
            eare_hash: node.str("eare_hash")?.to_owned(),
            issued_by: node.str("issued_by")?.to_owned(),
            previous_epoch_hash: node.str("previous_epoch_hash")?.to_owned(),
            membership_digest: node.str("membership_digest")?.to_owned(),
            payload: node.opt_object("payload")?.map(|payload| payload.raw().clone()),
        });
    }

    Ok(nodes)
}

fn parse_corruptions(
    reader: &FieldReader<'_>,
    nodes: &[EareNode],
) -> Result<Vec<Corruption>, CorpusError> {
    let Some(items) = reader.opt_array("corruptions")? else {
        return Ok(Vec::new());
    };

    reader
        .objects("corruptions", items)?
        .iter()
        .map(|corruption| {
            let target = match corruption.opt_str("target_node")? {
                None | Some("*") => CorruptionTarget::AllNodes,
                Some(id) => {
                    if !nodes.iter().any(|node| node.node_id.as_str() == id) {
                        return Err(corruption.error(format!(
                            "{} references unknown node {id}",
                            corruption.field_name("target_node")
                        )));
                    }
                    CorruptionTarget::Node(NodeId::new(id))
                }
            };
            let name = corruption.str("type")?;
            Ok(Corruption {
                name: name.to_owned(),
                kind: CorruptionKind::parse(name),
                target,
                fields: corruption.string_list("fields")?,
                payload_patch: corruption
                    .opt_object("payload_patch")?
                    .map(|patch| patch.raw().clone()),
                reason: corruption.opt_str("reason")?.map(str::to_owned),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CorruptedEareSimulator;
    use foxwhisper_core::parse_scenario;
    use foxwhisper_test_helpers::{eare, without};
    use serde_json::json;

    fn parse(value: Value) -> Result<EareScenario, CorpusError> {
        parse_scenario::<CorruptedEareSimulator>(0, &value)
    }

    #[test]
    fn test_nodes_sorted_stably_by_epoch() {
        let nodes = vec![
            eare::node("late", 2, "h2", "h1"),
            eare::node("first", 1, "h1a", "h0"),
            eare::node("second", 1, "h1b", "h0"),
        ];
        let scenario = parse(eare::scenario("eare-sort", nodes, vec![])).unwrap();
        let order: Vec<_> = scenario.nodes.iter().map(|n| n.node_id.as_str()).collect();
        assert_eq!(order, vec!["first", "second", "late"]);
    }

    #[test]
    fn test_corruption_targets() {
        let scenario = parse(eare::scenario(
            "eare-targets",
            eare::chain(2),
            vec![
                eare::corruption("invalid_signature", Some("n1")),
                eare::corruption("EXTRA_FIELDS", Some("*")),
                eare::corruption("Truncated_Eare", None),
            ],
        ))
        .unwrap();
        let kinds: Vec<_> = scenario.corruptions.iter().map(|c| c.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                CorruptionKind::InvalidSignature,
                CorruptionKind::ExtraFields,
                CorruptionKind::TruncatedEare,
            ]
        );
        assert!(scenario.corruptions[0].targets_node(&NodeId::new("n1")));
        assert!(scenario.corruptions[1].targets_all());
        assert!(scenario.corruptions[2].targets_all());
    }

    #[test]
    fn test_unknown_target_rejected() {
        let err = parse(eare::scenario(
            "eare-target",
            eare::chain(2),
            vec![eare::corruption("INVALID_POP", Some("n9"))],
        ))
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "[eare-target] corruptions[0].target_node references unknown node n9"
        );
    }

    #[test]
    fn test_unknown_corruption_type_is_tolerated() {
        let scenario = parse(eare::scenario(
            "eare-unknown",
            eare::chain(1),
            vec![eare::corruption("bit_flip", None)],
        ))
        .unwrap();
        assert_eq!(scenario.corruptions[0].name, "bit_flip");
        assert_eq!(scenario.corruptions[0].kind, CorruptionKind::Unknown("bit_flip".into()));
        assert_eq!(CorruptionKind::parse("Bit_Flip").as_str(), "Bit_Flip");
        assert_eq!(CorruptionKind::parse("Invalid_Signature"), CorruptionKind::InvalidSignature);
        assert!(!CorruptionKind::parse("tamper_payload").is_canonical());
    }

    #[test]
    fn test_required_fields() {
        let value = without(eare::scenario("eare-req", eare::chain(1), vec![]), "group_context");
        let err = parse(value).unwrap_err();
        assert_eq!(err.to_string(), "[eare-req] missing required field group_context");

        let mut node = eare::node("n0", 0, "h0", "genesis");
        if let Some(object) = node.as_object_mut() {
            object.remove("membership_digest");
        }
        let err = parse(eare::scenario("eare-req", vec![node], vec![])).unwrap_err();
        assert_eq!(err.to_string(), "[eare-req] nodes[0] missing membership_digest");

        let err = parse(eare::scenario("eare-req", vec![], vec![])).unwrap_err();
        assert_eq!(err.to_string(), "[eare-req] nodes must be a non-empty array");
    }

    #[test]
    fn test_payload_kept_as_object() {
        let node = json!({
            "node_id": "n0", "epoch_id": 0, "eare_hash": "h0", "issued_by": "c",
            "previous_epoch_hash": "genesis", "membership_digest": "md",
            "payload": {"members": ["alice"]},
        });
        let scenario = parse(eare::scenario("eare-payload", vec![node], vec![])).unwrap();
        let payload = scenario.nodes[0].payload.as_ref().unwrap();
        assert_eq!(payload["members"], json!(["alice"]));
    }
}
