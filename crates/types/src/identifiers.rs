//! Domain-specific identifier types.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

macro_rules! string_identifier {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create an identifier from any string-like value.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if f.alternate() {
                    write!(f, concat!($label, "({})"), self.0)
                } else {
                    f.write_str(&self.0)
                }
            }
        }
    };
}

string_identifier!(
    /// Scenario identifier, unique within a corpus.
    ScenarioId,
    "Scenario"
);

string_identifier!(
    /// Epoch graph / record-chain node identifier.
    NodeId,
    "Node"
);

string_identifier!(
    /// Device identifier within one user's device set.
    DeviceId,
    "Device"
);

string_identifier!(
    /// SFU call participant identifier.
    ParticipantId,
    "Participant"
);

string_identifier!(
    /// SFU media track identifier.
    TrackId,
    "Track"
);

string_identifier!(
    /// Message identifier in the desync message table.
    MessageId,
    "Message"
);

/// Epoch number.
///
/// Epochs are compared numerically; corpora occasionally use negative values
/// for synthetic pre-genesis records, so the inner type is signed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EpochId(pub i64);

impl EpochId {
    /// Genesis epoch.
    pub const GENESIS: Self = EpochId(0);

    /// Get the raw value.
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for EpochId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Epoch({})", self.0)
    }
}
