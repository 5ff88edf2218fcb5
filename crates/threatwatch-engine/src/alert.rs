use std::collections::HashSet;
use std::sync::Arc;

use threatwatch_store::{PreferenceStore, PreferenceStoreExt, keys};
use threatwatch_types::{Severity, ThreatEvent};

/// A sound alert the consumer should play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertDecision {
    pub threat_id: String,
    /// Volume 0-100, clamped from the stored preference.
    pub volume: u8,
}

/// Decides which newly applied threats warrant an audible alert, gated by
/// the persisted preferences. Alert history is session-scoped and
/// grow-only: each threat id alerts at most once per connection.
pub struct AlertGate {
    store: Arc<dyn PreferenceStore>,
    alerted: HashSet<String>,
}

impl AlertGate {
    pub fn new(store: Arc<dyn PreferenceStore>) -> Self {
        Self {
            store,
            alerted: HashSet::new(),
        }
    }

    pub fn sound_enabled(&self) -> bool {
        self.store.get_or(keys::SOUND_ENABLED, true)
    }

    pub fn notifications_enabled(&self) -> bool {
        self.store.get_or(keys::NOTIFICATIONS_ENABLED, true)
    }

    pub fn volume(&self) -> u8 {
        self.store.get_or(keys::SOUND_VOLUME, 70u32).min(100) as u8
    }

    /// Evaluate a batch of threats that just became visible. Only
    /// unmitigated High-severity events that have not alerted before make
    /// the cut; nothing is produced while sound is disabled.
    pub fn evaluate(&mut self, new_threats: &[&ThreatEvent]) -> Vec<AlertDecision> {
        if !self.sound_enabled() {
            return Vec::new();
        }
        let volume = self.volume();

        new_threats
            .iter()
            .filter_map(|t| {
                // `insert` returning true doubles as the not-yet-alerted check.
                let eligible = t.severity == Severity::High
                    && !t.is_mitigated()
                    && self.alerted.insert(t.id.clone());
                eligible.then(|| AlertDecision {
                    threat_id: t.id.clone(),
                    volume,
                })
            })
            .collect()
    }

    /// Forget session alert history; called when a new session starts.
    pub fn reset(&mut self) {
        self.alerted.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use threatwatch_store::MemoryPreferenceStore;
    use threatwatch_types::ThreatDetails;

    fn event(id: &str, severity: Severity, status: &str) -> ThreatEvent {
        ThreatEvent {
            id: id.to_string(),
            timestamp: Utc::now(),
            source_ip: "10.0.0.1".into(),
            attack_type: "Ransomware".into(),
            severity,
            status: status.to_string(),
            details: ThreatDetails::default(),
            coordinates: None,
        }
    }

    fn gate() -> AlertGate {
        AlertGate::new(Arc::new(MemoryPreferenceStore::new()))
    }

    #[test]
    fn test_only_active_high_severity_alerts() {
        let mut gate = gate();
        let high = event("h", Severity::High, "Active");
        let mitigated_high = event("m", Severity::High, "Mitigated");
        let medium = event("x", Severity::Medium, "Active");

        let decisions = gate.evaluate(&[&high, &mitigated_high, &medium]);
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].threat_id, "h");
    }

    #[test]
    fn test_each_threat_alerts_once() {
        let mut gate = gate();
        let high = event("h", Severity::High, "Active");
        assert_eq!(gate.evaluate(&[&high]).len(), 1);
        assert_eq!(gate.evaluate(&[&high]).len(), 0);

        gate.reset();
        assert_eq!(gate.evaluate(&[&high]).len(), 1);
    }

    #[test]
    fn test_duplicate_ids_within_one_batch_alert_once() {
        let mut gate = gate();
        let high = event("h", Severity::High, "Active");
        let dup = high.clone();
        let decisions = gate.evaluate(&[&high, &dup]);
        assert_eq!(decisions.len(), 1);
    }

    #[test]
    fn test_sound_disabled_suppresses_alerts() {
        let store = Arc::new(MemoryPreferenceStore::new());
        store.put(keys::SOUND_ENABLED, &false).unwrap();
        let mut gate = AlertGate::new(store);

        let high = event("h", Severity::High, "Active");
        assert!(gate.evaluate(&[&high]).is_empty());
    }

    #[test]
    fn test_volume_clamped_to_100() {
        let store = Arc::new(MemoryPreferenceStore::new());
        store.put(keys::SOUND_VOLUME, &250u32).unwrap();
        let mut gate = AlertGate::new(store);

        let high = event("h", Severity::High, "Active");
        let decisions = gate.evaluate(&[&high]);
        assert_eq!(decisions[0].volume, 100);
    }

    #[test]
    fn test_default_volume() {
        let gate = gate();
        assert_eq!(gate.volume(), 70);
        assert!(gate.sound_enabled());
        assert!(gate.notifications_enabled());
    }
}
