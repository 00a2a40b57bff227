//! Error categories raised by simulators.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The closed vocabulary of attack/fault categories.
///
/// A simulator raises a category when it detects the corresponding condition;
/// a corpus author declares the categories a scenario must raise. The string
/// form is the wire format in both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorCategory {
    // ═══════════════════════════════════════════════════════════════════════
    // Epoch graph / record chain
    // ═══════════════════════════════════════════════════════════════════════
    /// Two divergent records claim the same epoch or the same parent.
    EpochForkDetected,
    /// A record's `previous_epoch_hash` does not match its predecessor.
    HashChainBreak,
    /// Record signature failed verification.
    InvalidSignature,
    /// Proof-of-possession failed verification.
    InvalidPop,
    /// Record was truncated and had to be rejected.
    TruncatedEare,
    /// Record carried fields outside its schema.
    ExtraFields,
    /// Record payload was altered after signing.
    PayloadTampered,
    /// Record references an epoch that is no longer current.
    StaleEpochRef,

    // ═══════════════════════════════════════════════════════════════════════
    // Multi-device state
    // ═══════════════════════════════════════════════════════════════════════
    /// Devices disagree on their DR version.
    DivergenceDetected,
    /// A delivery or drop referenced a message or device that does not exist.
    UnknownMessage,
    /// A message was delivered twice to the same device.
    DuplicateDelivery,
    /// A previously seen message was injected again.
    ReplayInjected,
    /// A device state was restored to an older version.
    RollbackApplied,
    /// Pairwise device clock skew exceeded its bound.
    ClockSkewViolation,
    /// Some expected deliveries never happened.
    MessageLoss,
    /// A delivery happened before its send.
    OutOfOrder,

    // ═══════════════════════════════════════════════════════════════════════
    // SFU relay
    // ═══════════════════════════════════════════════════════════════════════
    /// Publish or subscribe without authorization.
    UnauthorizedSubscribe,
    /// A participant presented someone else's credentials.
    Impersonation,
    /// Attempt to obtain media keys.
    KeyLeakAttempt,
    /// A rotated-out key was used again.
    StaleKeyReuse,
    /// A track was routed twice.
    DuplicateRoute,
    /// A published track was replayed.
    ReplayTrack,
    /// A track was taken over by a different publisher.
    HijackedTrack,
    /// A subscriber requested simulcast layers the publisher never declared.
    SimulcastSpoof,
    /// A participant exceeded its bitrate allowance.
    BitrateAbuse,
}

impl ErrorCategory {
    /// Every category, in declaration order.
    pub const ALL: [ErrorCategory; 25] = [
        ErrorCategory::EpochForkDetected,
        ErrorCategory::HashChainBreak,
        ErrorCategory::InvalidSignature,
        ErrorCategory::InvalidPop,
        ErrorCategory::TruncatedEare,
        ErrorCategory::ExtraFields,
        ErrorCategory::PayloadTampered,
        ErrorCategory::StaleEpochRef,
        ErrorCategory::DivergenceDetected,
        ErrorCategory::UnknownMessage,
        ErrorCategory::DuplicateDelivery,
        ErrorCategory::ReplayInjected,
        ErrorCategory::RollbackApplied,
        ErrorCategory::ClockSkewViolation,
        ErrorCategory::MessageLoss,
        ErrorCategory::OutOfOrder,
        ErrorCategory::UnauthorizedSubscribe,
        ErrorCategory::Impersonation,
        ErrorCategory::KeyLeakAttempt,
        ErrorCategory::StaleKeyReuse,
        ErrorCategory::DuplicateRoute,
        ErrorCategory::ReplayTrack,
        ErrorCategory::HijackedTrack,
        ErrorCategory::SimulcastSpoof,
        ErrorCategory::BitrateAbuse,
    ];

    /// Get the wire name of this category.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::EpochForkDetected => "EPOCH_FORK_DETECTED",
            ErrorCategory::HashChainBreak => "HASH_CHAIN_BREAK",
            ErrorCategory::InvalidSignature => "INVALID_SIGNATURE",
            ErrorCategory::InvalidPop => "INVALID_POP",
            ErrorCategory::TruncatedEare => "TRUNCATED_EARE",
            ErrorCategory::ExtraFields => "EXTRA_FIELDS",
            ErrorCategory::PayloadTampered => "PAYLOAD_TAMPERED",
            ErrorCategory::StaleEpochRef => "STALE_EPOCH_REF",
            ErrorCategory::DivergenceDetected => "DIVERGENCE_DETECTED",
            ErrorCategory::UnknownMessage => "UNKNOWN_MESSAGE",
            ErrorCategory::DuplicateDelivery => "DUPLICATE_DELIVERY",
            ErrorCategory::ReplayInjected => "REPLAY_INJECTED",
            ErrorCategory::RollbackApplied => "ROLLBACK_APPLIED",
            ErrorCategory::ClockSkewViolation => "CLOCK_SKEW_VIOLATION",
            ErrorCategory::MessageLoss => "MESSAGE_LOSS",
            ErrorCategory::OutOfOrder => "OUT_OF_ORDER",
            ErrorCategory::UnauthorizedSubscribe => "UNAUTHORIZED_SUBSCRIBE",
            ErrorCategory::Impersonation => "IMPERSONATION",
            ErrorCategory::KeyLeakAttempt => "KEY_LEAK_ATTEMPT",
            ErrorCategory::StaleKeyReuse => "STALE_KEY_REUSE",
            ErrorCategory::DuplicateRoute => "DUPLICATE_ROUTE",
            ErrorCategory::ReplayTrack => "REPLAY_TRACK",
            ErrorCategory::HijackedTrack => "HIJACKED_TRACK",
            ErrorCategory::SimulcastSpoof => "SIMULCAST_SPOOF",
            ErrorCategory::BitrateAbuse => "BITRATE_ABUSE",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A category name outside the known vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown error category {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for ErrorCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ErrorCategory::ALL
            .iter()
            .copied()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| UnknownCategory(s.to_owned()))
    }
}

impl Serialize for ErrorCategory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ErrorCategory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_parse_back() {
        for category in ErrorCategory::ALL {
            assert_eq!(category.as_str().parse::<ErrorCategory>(), Ok(category));
        }
    }

    #[test]
    fn test_unknown_name_rejected() {
        let err = "NOT_A_CATEGORY".parse::<ErrorCategory>().unwrap_err();
        assert_eq!(err.to_string(), "unknown error category NOT_A_CATEGORY");
    }

    #[test]
    fn test_serde_uses_wire_name() {
        let json = serde_json::to_string(&ErrorCategory::RollbackApplied).unwrap();
        assert_eq!(json, "\"ROLLBACK_APPLIED\"");
        let back: ErrorCategory = serde_json::from_str("\"SIMULCAST_SPOOF\"").unwrap();
        assert_eq!(back, ErrorCategory::SimulcastSpoof);
    }
}
