//! Replay-storm profile documents.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors loading a profile set.
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("failed to read profiles {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid profile document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("profile {profile_id} has a negative duration_ms")]
    NegativeDuration { profile_id: String },
}

fn default_alert_threshold() -> f64 {
    0.5
}

fn default_expected_alert() -> bool {
    true
}

fn default_tolerance() -> f64 {
    0.05
}

/// One replay storm: a constant burst of replayed messages for a duration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReplayProfile {
    pub profile_id: String,
    /// Messages arriving per millisecond.
    pub burst_rate: f64,
    pub duration_ms: i64,
    /// Drop ratio at or above which the replay alert fires.
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: f64,
    /// Overrides the set-wide queue limit when nonzero.
    #[serde(default)]
    pub queue_limit: Option<f64>,
    #[serde(default)]
    pub expected_drop_ratio: f64,
    #[serde(default = "default_expected_alert")]
    pub expected_alert: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ReplayProfile {
    /// Create a profile with default threshold and expectations.
    pub fn new(profile_id: impl Into<String>, burst_rate: f64, duration_ms: i64) -> Self {
        Self {
            profile_id: profile_id.into(),
            burst_rate,
            duration_ms,
            alert_threshold: default_alert_threshold(),
            queue_limit: None,
            expected_drop_ratio: 0.0,
            expected_alert: default_expected_alert(),
            notes: None,
        }
    }

    /// Set the expected drop ratio and alert state.
    pub fn with_expectation(mut self, drop_ratio: f64, alert: bool) -> Self {
        self.expected_drop_ratio = drop_ratio;
        self.expected_alert = alert;
        self
    }

    /// Set the per-profile queue limit.
    pub fn with_queue_limit(mut self, queue_limit: f64) -> Self {
        self.queue_limit = Some(queue_limit);
        self
    }
}

/// A set of profiles sharing one queue model.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProfileSet {
    #[serde(default)]
    pub description: Option<String>,
    pub window_size: i64,
    pub capacity_per_ms: f64,
    #[serde(default)]
    pub queue_limit: Option<f64>,
    /// Allowed absolute distance between actual and expected drop ratio.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default)]
    pub profiles: Vec<ReplayProfile>,
}

impl ProfileSet {
    /// Parse a profile set from a JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ProfileError> {
        let set: Self = serde_json::from_value(value)?;
        set.validate()?;
        Ok(set)
    }

    /// Read a profile set from disk.
    pub fn load(path: &Path) -> Result<Self, ProfileError> {
        let text = std::fs::read_to_string(path).map_err(|source| ProfileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let set: Self = serde_json::from_str(&text)?;
        set.validate()?;
        Ok(set)
    }

    fn validate(&self) -> Result<(), ProfileError> {
        match self.profiles.iter().find(|profile| profile.duration_ms < 0) {
            Some(profile) => Err(ProfileError::NegativeDuration {
                profile_id: profile.profile_id.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foxwhisper_test_helpers::replay;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_defaults_applied() {
        let set = ProfileSet::from_value(replay::profile_set(
            32,
            1.0,
            vec![replay::profile("steady", 1.0, 100)],
        ))
        .unwrap();
        assert_eq!(set.tolerance, 0.05);
        assert_eq!(set.queue_limit, None);
        let profile = &set.profiles[0];
        assert_eq!(profile.alert_threshold, 0.5);
        assert_eq!(profile.expected_drop_ratio, 0.0);
        assert!(profile.expected_alert);
    }

    #[test]
    fn test_missing_fields_rejected() {
        let err = ProfileSet::from_value(json!({"window_size": 8, "profiles": []})).unwrap_err();
        assert!(err.to_string().contains("capacity_per_ms"), "{err}");
    }

    #[test]
    fn test_negative_duration_rejected() {
        let err = ProfileSet::from_value(replay::profile_set(
            8,
            1.0,
            vec![replay::profile("backwards", 1.0, -5)],
        ))
        .unwrap_err();
        assert_eq!(err.to_string(), "profile backwards has a negative duration_ms");
    }

    #[test]
    fn test_load_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let document = replay::profile_set(8, 2.0, vec![replay::profile("p", 1.0, 10)]);
        write!(file, "{document}").unwrap();

        let set = ProfileSet::load(file.path()).unwrap();
        assert_eq!(set.window_size, 8);
        assert_eq!(set.profiles.len(), 1);

        let missing = ProfileSet::load(Path::new("/nonexistent/profiles.json")).unwrap_err();
        assert!(matches!(missing, ProfileError::Io { .. }));
    }
}
