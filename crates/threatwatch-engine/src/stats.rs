use serde::{Deserialize, Serialize};

use threatwatch_types::{Severity, ThreatEvent};

/// Aggregate counts over the current threat list. Pure derivation,
/// recomputed whenever the list changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreatStats {
    pub total: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub mitigated: usize,
    pub active: usize,
}

impl ThreatStats {
    /// Single O(n) pass; the input is never mutated.
    pub fn from_events(events: &[ThreatEvent]) -> Self {
        let mut stats = Self::default();
        for event in events {
            stats.total += 1;
            match event.severity {
                Severity::High => stats.high += 1,
                Severity::Medium => stats.medium += 1,
                Severity::Low => stats.low += 1,
            }
            if event.is_mitigated() {
                stats.mitigated += 1;
            } else {
                stats.active += 1;
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;
    use threatwatch_types::ThreatDetails;

    fn event(severity: Severity, status: &str) -> ThreatEvent {
        ThreatEvent {
            id: uuid::Uuid::new_v4().to_string(),
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
    fn test_empty_list() {
        assert_eq!(ThreatStats::from_events(&[]), ThreatStats::default());
    }

    #[test]
    fn test_counts() {
        let events = vec![
            event(Severity::High, "Active"),
            event(Severity::High, "Mitigated"),
            event(Severity::Medium, "Active"),
            event(Severity::Low, "Investigating"),
        ];
        let stats = ThreatStats::from_events(&events);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.high, 2);
        assert_eq!(stats.medium, 1);
        assert_eq!(stats.low, 1);
        assert_eq!(stats.mitigated, 1);
        assert_eq!(stats.active, 3);
    }

    #[test]
    fn test_only_exact_mitigated_counts() {
        let events = vec![event(Severity::Low, "mitigated")];
        let stats = ThreatStats::from_events(&events);
        assert_eq!(stats.mitigated, 0);
        assert_eq!(stats.active, 1);
    }

    proptest! {
        #[test]
        fn prop_partitions_sum_to_total(
            high in 0usize..20, medium in 0usize..20, low in 0usize..20, mitigated_among in 0usize..20
        ) {
            let mut events = Vec::new();
            for _ in 0..high { events.push(event(Severity::High, "Active")); }
            for _ in 0..medium { events.push(event(Severity::Medium, "Active")); }
            for _ in 0..low { events.push(event(Severity::Low, "Active")); }
            let k = mitigated_among.min(events.len());
            for e in events.iter_mut().take(k) {
                e.status = "Mitigated".into();
            }

            let stats = ThreatStats::from_events(&events);
            prop_assert_eq!(stats.total, high + medium + low);
            prop_assert_eq!(stats.high, high);
            prop_assert_eq!(stats.medium, medium);
            prop_assert_eq!(stats.low, low);
            prop_assert_eq!(stats.mitigated, k);
            prop_assert_eq!(stats.active, stats.total - k);
        }
    }
}
