//! Bounded-queue replay storm model.
//!
//! One step per millisecond: the burst arrives, up to `capacity_per_ms` is
//! processed, and anything above the queue limit is dropped.

use crate::profile::{ProfileSet, ReplayProfile};
use serde::Serialize;
use tracing::debug;

/// Queue model shared by every profile of a set.
#[derive(Clone, Debug, PartialEq)]
pub struct ReplayStormConfig {
    /// Replay-protection window; at least 1.
    pub window_size: u64,
    /// Messages processed per millisecond; at least 0.
    pub capacity_per_ms: f64,
    /// Queue depth above which messages are dropped. Defaults to
    /// `window_size * 8`.
    pub queue_limit: f64,
}

impl ReplayStormConfig {
    /// Create a configuration, clamping the window and capacity.
    pub fn new(window_size: i64, capacity_per_ms: f64) -> Self {
        let window_size = window_size.max(1).unsigned_abs();
        Self {
            window_size,
            capacity_per_ms: capacity_per_ms.max(0.0),
            queue_limit: window_size.saturating_mul(8) as f64,
        }
    }

    /// Set the queue limit.
    pub fn with_queue_limit(mut self, queue_limit: f64) -> Self {
        self.queue_limit = queue_limit;
        self
    }

    /// Build the configuration described by a profile set.
    pub fn from_profile_set(set: &ProfileSet) -> Self {
        let config = Self::new(set.window_size, set.capacity_per_ms);
        match set.queue_limit {
            Some(limit) => config.with_queue_limit(limit),
            None => config,
        }
    }
}

impl Default for ReplayStormConfig {
    fn default() -> Self {
        Self::new(32, 1.0)
    }
}

/// Outcome of one profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayOutcome {
    pub profile_id: String,
    pub total_generated: f64,
    pub processed: f64,
    pub dropped: f64,
    pub drop_ratio: f64,
    pub delivery_ratio: f64,
    pub max_queue_depth: f64,
    /// Mean queue depth over the run.
    pub latency_penalty: f64,
    pub alert_triggered: bool,
}

/// Deterministic replay storm simulator.
#[derive(Clone, Debug, Default)]
pub struct ReplayStormSimulator {
    config: ReplayStormConfig,
}

impl ReplayStormSimulator {
    /// Create a simulator from a configuration.
    pub fn new(config: ReplayStormConfig) -> Self {
        Self { config }
    }

    /// Get the configuration.
    pub fn config(&self) -> &ReplayStormConfig {
        &self.config
    }

    /// Queue limit applied to `profile`.
    pub fn queue_limit_for(&self, profile: &ReplayProfile) -> f64 {
        profile
            .queue_limit
            .filter(|limit| *limit != 0.0)
            .unwrap_or(self.config.queue_limit)
    }

    /// Run one profile to completion.
    pub fn simulate(&self, profile: &ReplayProfile) -> ReplayOutcome {
        let queue_limit = self.queue_limit_for(profile);
        let capacity = self.config.capacity_per_ms;

        let mut pending = 0.0_f64;
        let mut processed = 0.0_f64;
        let mut dropped = 0.0_f64;
        let mut generated = 0.0_f64;
        let mut max_queue = 0.0_f64;
        let mut depth_integral = 0.0_f64;

        for _ in 0..profile.duration_ms.max(0) {
            pending += profile.burst_rate;
            generated += profile.burst_rate;

            let processed_now = if capacity > 0.0 {
                pending.min(capacity)
            } else {
                0.0
            };
            pending -= processed_now;
            processed += processed_now;

            let overflow = (pending - queue_limit).max(0.0);
            if overflow > 0.0 {
                pending -= overflow;
                dropped += overflow;
            }

            max_queue = max_queue.max(pending);
            depth_integral += pending;
        }

        let ratio = |value: f64| if generated > 0.0 { value / generated } else { 0.0 };
        let drop_ratio = ratio(dropped);
        let latency_penalty = if profile.duration_ms > 0 {
            depth_integral / profile.duration_ms as f64
        } else {
            depth_integral
        };

        debug!(
            profile = %profile.profile_id,
            generated,
            dropped,
            max_queue,
            "Replay storm simulated"
        );

        ReplayOutcome {
            profile_id: profile.profile_id.clone(),
            total_generated: generated,
            processed,
            dropped,
            drop_ratio,
            delivery_ratio: ratio(processed),
            max_queue_depth: max_queue,
            latency_penalty,
            alert_triggered: drop_ratio >= profile.alert_threshold,
        }
    }
}
