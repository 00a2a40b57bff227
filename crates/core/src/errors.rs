//! Ordered set of raised error categories.

use foxwhisper_types::ErrorCategory;
use serde::Serialize;

/// Error categories in the order they were first raised, without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ErrorSet(Vec<ErrorCategory>);

impl ErrorSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise a category. Returns `true` if it was not raised before.
    pub fn insert(&mut self, category: ErrorCategory) -> bool {
        if self.0.contains(&category) {
            return false;
        }
        self.0.push(category);
        true
    }

    /// Whether a category has been raised.
    pub fn contains(&self, category: ErrorCategory) -> bool {
        self.0.contains(&category)
    }

    /// Categories from `expected` that were never raised.
    pub fn missing_from<'a>(
        &'a self,
        expected: &'a [ErrorCategory],
    ) -> impl Iterator<Item = ErrorCategory> + 'a {
        expected
            .iter()
            .copied()
            .filter(move |category| !self.contains(*category))
    }

    /// The categories in raise order.
    pub fn as_slice(&self) -> &[ErrorCategory] {
        &self.0
    }

    /// Iterate in raise order.
    pub fn iter(&self) -> impl Iterator<Item = ErrorCategory> + '_ {
        self.0.iter().copied()
    }

    /// Number of distinct categories raised.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing was raised.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<ErrorCategory> for ErrorSet {
    fn from_iter<I: IntoIterator<Item = ErrorCategory>>(iter: I) -> Self {
        let mut set = ErrorSet::new();
        for category in iter {
            set.insert(category);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_first_raise_order() {
        let mut set = ErrorSet::new();
        assert!(set.insert(ErrorCategory::ReplayInjected));
        assert!(set.insert(ErrorCategory::DivergenceDetected));
        assert!(!set.insert(ErrorCategory::ReplayInjected));
        assert_eq!(
            set.as_slice(),
            &[ErrorCategory::ReplayInjected, ErrorCategory::DivergenceDetected]
        );
        assert_eq!(
            serde_json::to_string(&set).unwrap(),
            r#"["REPLAY_INJECTED","DIVERGENCE_DETECTED"]"#
        );
    }

    #[test]
    fn test_missing_ignores_extras() {
        let set: ErrorSet = [ErrorCategory::Impersonation, ErrorCategory::BitrateAbuse]
            .into_iter()
            .collect();
        let expected = [ErrorCategory::Impersonation];
        assert_eq!(set.missing_from(&expected).count(), 0);
        let expected = [ErrorCategory::Impersonation, ErrorCategory::ReplayTrack];
        assert_eq!(
            set.missing_from(&expected).collect::<Vec<_>>(),
            vec![ErrorCategory::ReplayTrack]
        );
    }
}
