//! ---
//! rc_section: "04-core"
//! rc_subsection: "module"
//! rc_type: "source"
//! rc_scope: "code"
//! rc_description: "Operation store: merged inbound records and the alarm timestamp."
//! rc_version: "v0.1.0"
//! rc_owner: "tbd"
//! ---
//! Operation store.
//!
//! Inbound documents are JSON objects keyed by fragment. Every receipt is
//! merged key-by-key into a single record (last write wins) and, when it
//! carries `delivery.time`, overwrites the alarm timestamp. A reset clears
//! both under the same lock that guards the merge.

use parking_lot::Mutex;
use rulecheck_common::time::parse_iso8601;
use rulecheck_msg::MessagingMetricsExporter;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Result of feeding one raw payload into the store.
#[derive(Debug, Clone, PartialEq)]
pub enum ReceiveOutcome {
    /// The document was merged. `alarm_timestamp` is set when `delivery.time`
    /// was present and parsable.
    Merged {
        keys: Vec<String>,
        alarm_timestamp: Option<f64>,
    },
    /// Not a JSON object; discarded and not counted as a receipt.
    Malformed,
}

impl ReceiveOutcome {
    pub fn is_merged(&self) -> bool {
        matches!(self, ReceiveOutcome::Merged { .. })
    }
}

#[derive(Debug, Default)]
struct StoreState {
    records: Map<String, Value>,
    alarm_timestamp: f64,
    generation: u64,
}

#[derive(Default)]
pub struct OperationStore {
    state: Mutex<StoreState>,
    exporter: Option<MessagingMetricsExporter>,
}

impl std::fmt::Debug for OperationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("OperationStore")
            .field("fragments", &state.records.keys().collect::<Vec<_>>())
            .field("alarm_timestamp", &state.alarm_timestamp)
            .field("generation", &state.generation)
            .finish()
    }
}

impl OperationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count received and malformed documents in `exporter`.
    pub fn with_exporter(exporter: MessagingMetricsExporter) -> Self {
        Self {
            state: Mutex::default(),
            exporter: Some(exporter),
        }
    }

    /// Merge a raw inbound payload. Never fails; malformed input is logged
    /// and dropped so the subscription keeps running.
    pub fn on_receive(&self, raw: &[u8]) -> ReceiveOutcome {
        let document = match serde_json::from_slice::<Value>(raw) {
            Ok(Value::Object(document)) => document,
            Ok(other) => {
                warn!(kind = json_kind(&other), "discarding non-object inbound document");
                return self.malformed();
            }
            Err(err) => {
                warn!(
                    error = %err,
                    payload = %String::from_utf8_lossy(raw),
                    "discarding inbound payload that is not valid JSON"
                );
                return self.malformed();
            }
        };

        let delivery_time = document
            .get("delivery")
            .and_then(|delivery| delivery.get("time"))
            .and_then(Value::as_str)
            .map(str::to_owned);
        let keys: Vec<String> = document.keys().cloned().collect();

        let mut state = self.state.lock();
        for (key, value) in document {
            state.records.insert(key, value);
        }
        let alarm_timestamp = match delivery_time.as_deref().map(parse_iso8601) {
            Some(Ok(epoch)) => {
                state.alarm_timestamp = epoch;
                Some(epoch)
            }
            Some(Err(err)) => {
                warn!(error = %err, "keeping previous alarm timestamp");
                None
            }
            None => None,
        };
        drop(state);

        if let Some(exporter) = &self.exporter {
            exporter.observe_received();
        }
        debug!(?keys, ?alarm_timestamp, "operation document merged");
        ReceiveOutcome::Merged {
            keys,
            alarm_timestamp,
        }
    }

    /// Whether any merged document carried `fragment` as a top-level key.
    pub fn check(&self, fragment: &str) -> bool {
        self.state.lock().records.contains_key(fragment)
    }

    /// Clear all records and zero the alarm timestamp.
    pub fn reset(&self) {
        self.reset_with(|| {});
    }

    /// Run `drain` while holding the store lock, then clear.
    ///
    /// No merge can interleave between the drain and the clear.
    pub(crate) fn reset_with<F: FnOnce()>(&self, drain: F) {
        let mut state = self.state.lock();
        drain();
        state.records.clear();
        state.alarm_timestamp = 0.0;
        state.generation += 1;
    }

    /// Epoch seconds of the most recent parsable `delivery.time`, or 0.
    pub fn alarm_timestamp(&self) -> f64 {
        self.state.lock().alarm_timestamp
    }

    pub fn get(&self, fragment: &str) -> Option<Value> {
        self.state.lock().records.get(fragment).cloned()
    }

    pub fn snapshot(&self) -> Map<String, Value> {
        self.state.lock().records.clone()
    }

    /// Number of resets performed so far.
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    fn malformed(&self) -> ReceiveOutcome {
        if let Some(exporter) = &self.exporter {
            exporter.observe_malformed();
        }
        ReceiveOutcome::Malformed
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
