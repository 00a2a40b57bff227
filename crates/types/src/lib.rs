//! Core types shared by every FoxWhisper adversarial simulator.
//!
//! This crate carries the vocabulary that crosses crate boundaries:
//!
//! - **Identifiers**: [`ScenarioId`], [`NodeId`], [`DeviceId`], [`ParticipantId`],
//!   [`TrackId`], [`MessageId`] and the integer [`EpochId`]
//! - **Error categories**: the closed [`ErrorCategory`] vocabulary raised by
//!   simulators and declared by corpus authors
//! - **Failure reasons**: the [`FailureReason`] vocabulary produced by
//!   expectation evaluation
//!
//! All textual forms are part of the corpus/report wire contract and must not
//! change.

mod category;
mod failure;
mod identifiers;

pub use category::{ErrorCategory, UnknownCategory};
pub use failure::FailureReason;
pub use identifiers::{DeviceId, EpochId, MessageId, NodeId, ParticipantId, ScenarioId, TrackId};

/// Scenario time in milliseconds.
///
/// Corpus timestamps are plain integers relative to the start of a scenario.
/// They are signed because corpora may contain pre-start setup events.
pub type Millis = i64;

/// Clamp a signed time delta into a latency value.
///
/// Latencies reported by simulators are never negative.
pub fn latency_between(from: Millis, to: Millis) -> u64 {
    to.saturating_sub(from).max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_is_clamped() {
        assert_eq!(latency_between(10, 25), 15);
        assert_eq!(latency_between(25, 10), 0);
        assert_eq!(latency_between(-5, 5), 10);
    }
}
