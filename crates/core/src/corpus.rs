//! Corpus loading.
//!
//! A corpus is a JSON array of scenario objects. Loading is split into two
//! layers: the shared header (`scenario_id`, `tags`) parsed here, and the
//! domain body parsed by [`Simulator::parse_scenario`].

use crate::{CorpusError, FieldReader, Simulator};
use foxwhisper_types::ScenarioId;
use indexmap::{IndexMap, IndexSet};
use serde_json::Value;
use std::path::Path;
use tracing::debug;

/// Fields every scenario carries regardless of domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioHeader {
    /// Trimmed, non-empty, unique within the corpus.
    pub scenario_id: ScenarioId,
    /// Filtering labels in declaration order, duplicates collapsed.
    pub tags: IndexSet<String>,
    /// Position of the scenario in the corpus array.
    pub index: usize,
}

impl ScenarioHeader {
    /// Create a header directly (used by built-in scenarios and tests).
    pub fn new(scenario_id: impl Into<ScenarioId>, index: usize) -> Self {
        Self {
            scenario_id: scenario_id.into(),
            tags: IndexSet::new(),
            index,
        }
    }

    /// Add a tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Parse the header of the corpus entry at `index`.
    pub fn parse(index: usize, value: &Value) -> Result<Self, CorpusError> {
        let label = format!("#{index}");
        let object = value
            .as_object()
            .ok_or_else(|| CorpusError::schema(&label, "scenario entry must be an object"))?;

        let scenario_id = object
            .get("scenario_id")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(CorpusError::MissingScenarioId { index })?;

        let reader = FieldReader::new(scenario_id, "", object);
        let tags = reader.string_list("tags")?.into_iter().collect();

        Ok(Self {
            scenario_id: ScenarioId::new(scenario_id),
            tags,
            index,
        })
    }
}

/// Access to the shared header of a parsed scenario.
pub trait CorpusScenario {
    /// The scenario header.
    fn header(&self) -> &ScenarioHeader;

    /// The scenario identifier.
    fn scenario_id(&self) -> &ScenarioId {
        &self.header().scenario_id
    }

    /// The scenario tags.
    fn tags(&self) -> &IndexSet<String> {
        &self.header().tags
    }

    /// Whether the scenario carries a tag.
    fn has_tag(&self, tag: &str) -> bool {
        self.header().tags.contains(tag)
    }
}

/// One corpus entry, parsed independently of its neighbours.
#[derive(Debug)]
pub struct CorpusEntry<T> {
    /// Position in the corpus array.
    pub index: usize,
    /// `scenario_id` when readable, `#<index>` otherwise.
    pub label: String,
    /// The parsed scenario or the reason it was rejected.
    pub scenario: Result<T, CorpusError>,
}

/// Parse a single scenario object.
pub fn parse_scenario<S: Simulator>(
    index: usize,
    value: &Value,
) -> Result<S::Scenario, CorpusError> {
    let header = ScenarioHeader::parse(index, value)?;
    let scenario_id = header.scenario_id.clone();
    let reader = FieldReader::from_value(scenario_id.as_str(), "", value)?;
    S::parse_scenario(header, &reader)
}

/// Parse a whole corpus; the first malformed entry aborts the load.
pub fn parse_corpus<S: Simulator>(document: &Value) -> Result<Vec<S::Scenario>, CorpusError> {
    let items = corpus_items(document)?;
    let mut seen = IndexMap::new();
    let mut scenarios = Vec::with_capacity(items.len());

    for (index, item) in items.iter().enumerate() {
        let scenario = parse_scenario::<S>(index, item)?;
        check_unique(&mut seen, scenario.scenario_id(), index)?;
        scenarios.push(scenario);
    }

    debug!(domain = S::DOMAIN, count = scenarios.len(), "Parsed corpus");
    Ok(scenarios)
}

/// Parse every entry of a corpus, keeping per-entry failures.
///
/// Root-level problems (not an array, not JSON) are still fatal.
pub fn parse_corpus_entries<S: Simulator>(
    document: &Value,
) -> Result<Vec<CorpusEntry<S::Scenario>>, CorpusError> {
    let items = corpus_items(document)?;
    let mut seen = IndexMap::new();

    let entries: Vec<_> = items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let label = entry_label(index, item);
            let scenario = parse_scenario::<S>(index, item).and_then(|scenario| {
                check_unique(&mut seen, scenario.scenario_id(), index).map(|()| scenario)
            });
            CorpusEntry {
                index,
                label,
                scenario,
            }
        })
        .collect();

    let rejected = entries.iter().filter(|entry| entry.scenario.is_err()).count();
    debug!(
        domain = S::DOMAIN,
        count = entries.len(),
        rejected,
        "Parsed corpus entries"
    );
    Ok(entries)
}

/// Read and parse a corpus file; the first malformed entry aborts the load.
pub fn load_corpus<S: Simulator>(path: impl AsRef<Path>) -> Result<Vec<S::Scenario>, CorpusError> {
    let document = read_document(path.as_ref())?;
    parse_corpus::<S>(&document)
}

/// Read a corpus file and parse each entry independently.
pub fn read_corpus_entries<S: Simulator>(
    path: impl AsRef<Path>,
) -> Result<Vec<CorpusEntry<S::Scenario>>, CorpusError> {
    let document = read_document(path.as_ref())?;
    parse_corpus_entries::<S>(&document)
}

/// Read a JSON document from disk.
pub fn read_document(path: &Path) -> Result<Value, CorpusError> {
    let text = std::fs::read_to_string(path).map_err(|source| CorpusError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&text)?)
}

fn corpus_items(document: &Value) -> Result<&[Value], CorpusError> {
    document
        .as_array()
        .map(Vec::as_slice)
        .ok_or(CorpusError::Root {
            expected: "an array of scenarios",
        })
}

fn check_unique(
    seen: &mut IndexMap<ScenarioId, usize>,
    scenario_id: &ScenarioId,
    index: usize,
) -> Result<(), CorpusError> {
    if let Some(&first_index) = seen.get(scenario_id) {
        return Err(CorpusError::DuplicateScenario {
            scenario_id: scenario_id.to_string(),
            first_index,
        });
    }
    seen.insert(scenario_id.clone(), index);
    Ok(())
}

fn entry_label(index: usize, item: &Value) -> String {
    item.get("scenario_id")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map_or_else(|| format!("#{index}"), str::to_owned)
}
