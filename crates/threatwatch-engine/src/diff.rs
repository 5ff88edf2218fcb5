use std::collections::{HashMap, HashSet};

use threatwatch_types::ThreatEvent;

/// Whether two fetch results differ in a way consumers should see.
///
/// Checks are ordered cheapest first: length, then id membership in both
/// directions, then per-event status/severity. Skipping the update on an
/// unchanged poll keeps downstream consumers from re-rendering identical
/// data every five seconds.
pub fn has_changed(previous: &[ThreatEvent], current: &[ThreatEvent]) -> bool {
    if previous.len() != current.len() {
        return true;
    }

    let previous_ids: HashSet<&str> = previous.iter().map(|t| t.id.as_str()).collect();
    let current_ids: HashSet<&str> = current.iter().map(|t| t.id.as_str()).collect();

    // New events appeared
    if current_ids.iter().any(|id| !previous_ids.contains(id)) {
        return true;
    }
    // Events disappeared
    if previous_ids.iter().any(|id| !current_ids.contains(id)) {
        return true;
    }

    // Same ids on both sides: look for status or severity edits
    let previous_by_id: HashMap<&str, &ThreatEvent> =
        previous.iter().map(|t| (t.id.as_str(), t)).collect();
    current.iter().any(|event| {
        previous_by_id
            .get(event.id.as_str())
            .is_none_or(|prior| prior.status != event.status || prior.severity != event.severity)
    })
}

/// Ids seen so far in this connection session. Grows for the lifetime of a
/// connection, never shrinks; drives one-shot "new threat" highlighting.
#[derive(Debug, Default)]
pub struct SeenThreats {
    ids: HashSet<String>,
}

impl SeenThreats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `current` and return the events not previously seen.
    pub fn record<'a>(&mut self, current: &'a [ThreatEvent]) -> Vec<&'a ThreatEvent> {
        let fresh: Vec<&ThreatEvent> = current
            .iter()
            .filter(|t| !self.ids.contains(&t.id))
            .collect();
        for event in &fresh {
            self.ids.insert(event.id.clone());
        }
        fresh
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;
    use threatwatch_types::{Severity, ThreatDetails};

    fn event(id: &str, severity: Severity, status: &str) -> ThreatEvent {
        ThreatEvent {
            id: id.to_string(),
            timestamp: Utc::now(),
            source_ip: "10.0.0.1".into(),
            attack_type: "XSS".into(),
            severity,
            status: status.to_string(),
            details: ThreatDetails::default(),
            coordinates: None,
        }
    }

    #[test]
    fn test_identical_lists_unchanged() {
        let a = vec![
            event("1", Severity::High, "Active"),
            event("2", Severity::Low, "Mitigated"),
        ];
        assert!(!has_changed(&a, &a.clone()));
    }

    #[test]
    fn test_length_difference() {
        let a = vec![event("1", Severity::High, "Active")];
        let b = vec![];
        assert!(has_changed(&a, &b));
        assert!(has_changed(&b, &a));
    }

    #[test]
    fn test_id_swap_same_length() {
        let a = vec![event("1", Severity::High, "Active")];
        let b = vec![event("2", Severity::High, "Active")];
        assert!(has_changed(&a, &b));
    }

    #[test]
    fn test_status_change_detected() {
        let a = vec![event("1", Severity::High, "Active")];
        let b = vec![event("1", Severity::High, "Mitigated")];
        assert!(has_changed(&a, &b));
    }

    #[test]
    fn test_severity_change_detected() {
        let a = vec![event("1", Severity::Medium, "Active")];
        let b = vec![event("1", Severity::High, "Active")];
        assert!(has_changed(&a, &b));
    }

    #[test]
    fn test_reordering_alone_is_not_a_change() {
        let a = vec![
            event("1", Severity::High, "Active"),
            event("2", Severity::Low, "Active"),
        ];
        let b = vec![
            event("2", Severity::Low, "Active"),
            event("1", Severity::High, "Active"),
        ];
        assert!(!has_changed(&a, &b));
    }

    #[test]
    fn test_other_field_edits_are_ignored() {
        let a = vec![event("1", Severity::High, "Active")];
        let mut b = a.clone();
        b[0].source_ip = "203.0.113.7".into();
        b[0].attack_type = "DDOS".into();
        assert!(!has_changed(&a, &b));
    }

    #[test]
    fn test_seen_set_only_grows() {
        let mut seen = SeenThreats::new();
        let first = vec![event("1", Severity::Low, "Active")];
        assert_eq!(seen.record(&first).len(), 1);

        let second = vec![
            event("1", Severity::Low, "Active"),
            event("2", Severity::High, "Active"),
        ];
        let fresh = seen.record(&second);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].id, "2");

        // Events leaving the feed do not shrink the set
        assert_eq!(seen.record(&[]).len(), 0);
        assert_eq!(seen.len(), 2);
        assert_eq!(seen.record(&first).len(), 0);
    }

    fn arb_event() -> impl Strategy<Value = ThreatEvent> {
        (
            "[a-f0-9]{8}",
            prop_oneof![
                Just(Severity::Low),
                Just(Severity::Medium),
                Just(Severity::High)
            ],
            prop_oneof![Just("Active"), Just("Mitigated"), Just("Investigating")],
        )
            .prop_map(|(id, severity, status)| event(&id, severity, status))
    }

    proptest! {
        #[test]
        fn prop_shuffle_is_never_a_change(mut events in prop::collection::vec(arb_event(), 0..20)) {
            // De-dupe ids so the session invariant holds
            events.sort_by(|a, b| a.id.cmp(&b.id));
            events.dedup_by(|a, b| a.id == b.id);

            let mut shuffled = events.clone();
            shuffled.reverse();
            prop_assert!(!has_changed(&events, &shuffled));
        }

        #[test]
        fn prop_status_edit_is_always_a_change(events in prop::collection::vec(arb_event(), 1..20), idx in 0usize..20) {
            let mut events = events;
            events.sort_by(|a, b| a.id.cmp(&b.id));
            events.dedup_by(|a, b| a.id == b.id);

            let mut edited = events.clone();
            let idx = idx % edited.len();
            edited[idx].status = format!("{}-edited", edited[idx].status);
            prop_assert!(has_changed(&events, &edited));
        }
    }
}
