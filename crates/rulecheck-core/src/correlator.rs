//! ---
//! rc_section: "04-core"
//! rc_subsection: "module"
//! rc_type: "source"
//! rc_scope: "code"
//! rc_description: "Response-time correlation between trigger and alarm delivery."
//! rc_version: "v0.1.0"
//! rc_owner: "tbd"
//! ---
use std::fmt;
use std::sync::Arc;

use rulecheck_common::time::format_epoch;
use rulecheck_common::Clock;

use crate::store::OperationStore;

/// Wall-clock moment, in epoch seconds, just before the triggering send.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct TriggerInstant(pub f64);

impl TriggerInstant {
    pub fn capture(clock: &dyn Clock) -> Self {
        Self(clock.now_epoch())
    }

    pub fn epoch(&self) -> f64 {
        self.0
    }
}

impl fmt::Display for TriggerInstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_epoch(self.0))
    }
}

/// Computes alarm timestamp minus trigger instant.
#[derive(Debug, Clone)]
pub struct ResponseTimeCorrelator {
    store: Arc<OperationStore>,
}

impl ResponseTimeCorrelator {
    pub fn new(store: Arc<OperationStore>) -> Self {
        Self { store }
    }

    /// Seconds between `trigger` and the latest alarm timestamp.
    ///
    /// Not validated: before any timestamped receipt the alarm timestamp is 0
    /// and the result is `-trigger`. Call after a positive `check`.
    pub fn elapsed(&self, trigger: TriggerInstant) -> f64 {
        elapsed(&self.store, trigger)
    }

    /// Like [`elapsed`](Self::elapsed), but `None` until a receipt carried a
    /// parsable delivery time.
    pub fn response_time(&self, trigger: TriggerInstant) -> Option<f64> {
        (self.store.alarm_timestamp() != 0.0).then(|| elapsed(&self.store, trigger))
    }
}

pub fn elapsed(store: &OperationStore, trigger: TriggerInstant) -> f64 {
    store.alarm_timestamp() - trigger.epoch()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_uses_latest_delivery_time() {
        let store = Arc::new(OperationStore::new());
        let correlator = ResponseTimeCorrelator::new(store.clone());
        store.on_receive(
            br#"{"MotorOverheat": {}, "delivery": {"time": "2024-03-01T10:00:03.500Z"}}"#,
        );
        let trigger = TriggerInstant(1_709_287_200.0);
        assert!((correlator.elapsed(trigger) - 3.5).abs() < 1e-6);
    }

    #[test]
    fn elapsed_before_any_receipt_is_negative() {
        let store = OperationStore::new();
        let trigger = TriggerInstant(1_709_287_200.0);
        assert_eq!(elapsed(&store, trigger), -1_709_287_200.0);
    }

    #[test]
    fn response_time_requires_a_delivery_time() {
        let store = Arc::new(OperationStore::new());
        let correlator = ResponseTimeCorrelator::new(store.clone());
        let trigger = TriggerInstant(1_709_287_200.0);
        store.on_receive(br#"{"MotorOverheat": {"status": "PENDING"}}"#);
        assert!(store.check("MotorOverheat"));
        assert_eq!(correlator.response_time(trigger), None);

        store.on_receive(br#"{"delivery": {"time": "2024-03-01T10:00:02Z"}}"#);
        assert_eq!(correlator.response_time(trigger), Some(2.0));
    }

    #[test]
    fn trigger_displays_as_rfc3339() {
        assert_eq!(
            TriggerInstant(1_709_287_200.25).to_string(),
            "2024-03-01T10:00:00.250Z"
        );
    }
}
