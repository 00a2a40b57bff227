//! Replay-storm simulator.
//!
//! A replay storm floods a receiver's replay-protection queue with captured
//! messages. This crate models the queue as a fixed processing capacity per
//! millisecond with a bounded backlog, runs each profile of a set to
//! completion, and checks the resulting drop ratio and alert state against
//! the profile's expectations within the set's tolerance.
//!
//! Unlike the event-driven domains there is no corpus of timelines: a
//! [`ProfileSet`] document carries the queue model and its profiles.

mod evaluate;
mod profile;
mod simulator;

pub use evaluate::{evaluate_profile, run_profile_set, ProfileReport, ReplayStormSummary};
pub use profile::{ProfileError, ProfileSet, ReplayProfile};
pub use simulator::{ReplayOutcome, ReplayStormConfig, ReplayStormSimulator};
