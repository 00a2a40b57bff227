//! Corpus error type.

use std::path::PathBuf;
use thiserror::Error;

/// The input does not conform to the expected corpus schema.
///
/// Always fatal to loading the affected scenario, never retried. Every variant
/// that concerns a single scenario carries its `scenario_id` (or `#<index>`
/// when the id itself is missing) so the message is actionable on its own.
#[derive(Debug, Error)]
pub enum CorpusError {
    /// The corpus file could not be read.
    #[error("failed to read corpus {path}: {source}")]
    Io {
        /// Path that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The corpus is not valid JSON.
    #[error("corpus is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The corpus root is not the expected JSON type.
    #[error("corpus root must be {expected}")]
    Root {
        /// Human description of the expected root shape.
        expected: &'static str,
    },

    /// A scenario entry has no usable `scenario_id`.
    #[error("[#{index}] scenario_id is required")]
    MissingScenarioId {
        /// Position of the entry in the corpus array.
        index: usize,
    },

    /// A field is missing or malformed.
    #[error("[{scenario}] {detail}")]
    Schema {
        /// Scenario label.
        scenario: String,
        /// What is wrong, naming the field.
        detail: String,
    },

    /// An event discriminant outside the domain's closed vocabulary.
    #[error("[{scenario}] unsupported event type {kind} at {field}[{index}]")]
    UnsupportedEvent {
        /// Scenario label.
        scenario: String,
        /// Field holding the event list.
        field: String,
        /// Position of the event in declaration order.
        index: usize,
        /// The rejected discriminant.
        kind: String,
    },

    /// Two corpus entries share a `scenario_id`.
    #[error("[{scenario_id}] duplicate scenario_id (first declared at #{first_index})")]
    DuplicateScenario {
        /// The repeated identifier.
        scenario_id: String,
        /// Position of the first entry with this id.
        first_index: usize,
    },
}

impl CorpusError {
    /// Build a schema error for a scenario.
    pub fn schema(scenario: impl Into<String>, detail: impl Into<String>) -> Self {
        CorpusError::Schema {
            scenario: scenario.into(),
            detail: detail.into(),
        }
    }

    /// The scenario label this error refers to, if any.
    pub fn scenario(&self) -> Option<&str> {
        match self {
            CorpusError::Schema { scenario, .. }
            | CorpusError::UnsupportedEvent { scenario, .. } => Some(scenario),
            CorpusError::DuplicateScenario { scenario_id, .. } => Some(scenario_id),
            CorpusError::Io { .. }
            | CorpusError::Json(_)
            | CorpusError::Root { .. }
            | CorpusError::MissingScenarioId { .. } => None,
        }
    }
}
