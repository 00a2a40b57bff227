//! Deterministically ordered event timelines.

use crate::{CorpusError, FieldReader};
use foxwhisper_types::Millis;
use serde_json::Value;

/// An event that knows its wire discriminant.
pub trait EventKind {
    /// The `event` string this value was parsed from.
    fn kind(&self) -> &'static str;
}

/// An event together with its timestamp and declaration position.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedEvent<E> {
    /// Scenario time of the event.
    pub t: Millis,
    /// Position in the declared event list.
    pub index: usize,
    /// The event payload.
    pub event: E,
}

impl<E: EventKind> TimedEvent<E> {
    /// Ordering key: time, then event kind, then declaration order.
    pub fn sort_key(&self) -> (Millis, &'static str, usize) {
        (self.t, self.event.kind(), self.index)
    }
}

/// Events of one scenario ordered by `(t, kind, declaration index)`.
///
/// Ties on `t` are broken by the lexicographic event kind, not by declaration
/// order, so two corpora that differ only in the order of simultaneous events
/// of different kinds replay identically.
#[derive(Debug, Clone, PartialEq)]
pub struct Timeline<E> {
    events: Vec<TimedEvent<E>>,
}

impl<E: EventKind> Timeline<E> {
    /// Order a list of events.
    pub fn new(mut events: Vec<TimedEvent<E>>) -> Self {
        events.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        Self { events }
    }

    /// Parse the event list stored under `key`.
    ///
    /// Every element must be an object with a string `event` and an integer
    /// `t`. `parse_event` receives the discriminant and a reader over the
    /// element; returning `Ok(None)` rejects the discriminant as unsupported.
    pub fn parse<F>(
        reader: &FieldReader<'_>,
        key: &str,
        items: &[Value],
        mut parse_event: F,
    ) -> Result<Self, CorpusError>
    where
        F: FnMut(&str, &FieldReader<'_>) -> Result<Option<E>, CorpusError>,
    {
        let mut events = Vec::with_capacity(items.len());
        for (index, item) in reader.objects(key, items)?.iter().enumerate() {
            let kind = item.str("event")?;
            let t = item.i64("t")?;
            let event = parse_event(kind, item)?.ok_or_else(|| CorpusError::UnsupportedEvent {
                scenario: reader.scenario().to_owned(),
                field: reader.field_name(key),
                index,
                kind: kind.to_owned(),
            })?;
            events.push(TimedEvent { t, index, event });
        }
        Ok(Self::new(events))
    }

    /// Iterate in replay order.
    pub fn iter(&self) -> impl Iterator<Item = &TimedEvent<E>> {
        self.events.iter()
    }

    /// Time of the first event in replay order.
    pub fn first_time(&self) -> Option<Millis> {
        self.events.first().map(|event| event.t)
    }

    /// First event of the given kind in replay order.
    pub fn first_of_kind(&self, kind: &str) -> Option<&TimedEvent<E>> {
        self.events.iter().find(|event| event.event.kind() == kind)
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the timeline has no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl<'a, E> IntoIterator for &'a Timeline<E> {
    type Item = &'a TimedEvent<E>;
    type IntoIter = std::slice::Iter<'a, TimedEvent<E>>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq)]
    enum Wire {
        Send,
        Recv,
    }

    impl EventKind for Wire {
        fn kind(&self) -> &'static str {
            match self {
                Wire::Send => "send",
                Wire::Recv => "recv",
            }
        }
    }

    fn parse(value: &Value) -> Result<Timeline<Wire>, CorpusError> {
        let reader = FieldReader::from_value("s1", "", value)?;
        let items = reader.array("timeline")?;
        Timeline::parse(&reader, "timeline", items, |kind, _| {
            Ok(match kind {
                "send" => Some(Wire::Send),
                "recv" => Some(Wire::Recv),
                _ => None,
            })
        })
    }

    #[test]
    fn test_kind_breaks_time_ties() {
        let value = json!({"timeline": [
            {"event": "send", "t": 5},
            {"event": "recv", "t": 5},
            {"event": "send", "t": 1},
        ]});
        let timeline = parse(&value).unwrap();
        let order: Vec<_> = timeline.iter().map(|e| (e.t, e.event.kind(), e.index)).collect();
        assert_eq!(order, vec![(1, "send", 2), (5, "recv", 1), (5, "send", 0)]);
        assert_eq!(timeline.first_time(), Some(1));
        assert_eq!(timeline.first_of_kind("recv").map(|e| e.index), Some(1));
    }

    #[test]
    fn test_declaration_order_breaks_full_ties() {
        let value = json!({"timeline": [
            {"event": "send", "t": 0},
            {"event": "send", "t": 0},
        ]});
        let timeline = parse(&value).unwrap();
        let order: Vec<_> = timeline.iter().map(|e| e.index).collect();
        assert_eq!(order, vec![0, 1]);
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let value = json!({"timeline": [{"event": "send", "t": 0}, {"event": "warp", "t": 1}]});
        let err = parse(&value).unwrap_err();
        assert_eq!(err.to_string(), "[s1] unsupported event type warp at timeline[1]");
    }

    #[test]
    fn test_time_must_be_integer() {
        let value = json!({"timeline": [{"event": "send", "t": 1.5}]});
        let err = parse(&value).unwrap_err();
        assert_eq!(err.to_string(), "[s1] timeline[0].t must be an integer");

        let value = json!({"timeline": [{"t": 1}]});
        let err = parse(&value).unwrap_err();
        assert_eq!(err.to_string(), "[s1] timeline[0] missing event");
    }
}
