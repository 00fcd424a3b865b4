//! ---
//! rc_section: "02-messaging"
//! rc_subsection: "module"
//! rc_type: "source"
//! rc_scope: "code"
//! rc_description: "Measurement publisher: frame encoding, topic routing and counters."
//! rc_version: "v0.1.0"
//! rc_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rulecheck_common::config::{HarnessConfig, SeriesBinding};

use crate::logging::{log_message, MessageDirection, MessagingMetricsExporter};
use crate::{DeliveryGuarantee, Measurement, MeasurementKind, Result, SmartRestFrame, Transport};

/// Snapshot of publisher counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MessagingMetrics {
    /// Frames successfully handed to the transport.
    pub sent: u64,
    /// Frames the transport refused.
    pub dropped: u64,
}

#[derive(Default)]
struct Counters {
    sent: AtomicU64,
    dropped: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> MessagingMetrics {
        MessagingMetrics {
            sent: self.sent.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Encodes frames and hands them to a transport on the publish topic.
///
/// There is no retry: a transport error is counted and returned unchanged.
pub struct Publisher {
    transport: Arc<dyn Transport>,
    topic: String,
    guarantee: DeliveryGuarantee,
    bindings: HashMap<MeasurementKind, SeriesBinding>,
    counters: Counters,
    exporter: Option<MessagingMetricsExporter>,
}

impl Publisher {
    /// Publisher using the default series names (fragment = series = kind name).
    pub fn new(
        transport: Arc<dyn Transport>,
        topic: impl Into<String>,
        guarantee: DeliveryGuarantee,
    ) -> Self {
        let bindings = MeasurementKind::ALL
            .into_iter()
            .map(|kind| (kind, SeriesBinding::same(kind.as_str())))
            .collect();
        Self {
            transport,
            topic: topic.into(),
            guarantee,
            bindings,
            counters: Counters::default(),
            exporter: None,
        }
    }

    /// Publisher wired to the topic, QoS and series bindings of `config`.
    pub fn from_config(transport: Arc<dyn Transport>, config: &HarnessConfig) -> Result<Self> {
        let guarantee = DeliveryGuarantee::try_from(config.mqtt.qos)?;
        let mut publisher = Self::new(transport, config.mqtt.publish_topic.clone(), guarantee);
        for kind in MeasurementKind::ALL {
            publisher
                .bindings
                .insert(kind, config.series_binding(kind.as_str()));
        }
        Ok(publisher)
    }

    pub fn with_exporter(mut self, exporter: MessagingMetricsExporter) -> Self {
        self.exporter = Some(exporter);
        self
    }

    /// Encode and send a single frame, returning the wire payload.
    pub async fn send(&self, frame: &SmartRestFrame) -> Result<String> {
        let payload = frame.encode();
        log_message(MessageDirection::Outbound, &self.topic, &payload);
        match self
            .transport
            .publish(&self.topic, payload.clone(), self.guarantee)
            .await
        {
            Ok(()) => {
                self.counters.sent.fetch_add(1, Ordering::Relaxed);
                if let Some(exporter) = &self.exporter {
                    exporter.observe_published();
                }
                Ok(payload)
            }
            Err(err) => {
                tracing::warn!(
                    transport = self.transport.name(),
                    topic = %self.topic,
                    error = %err,
                    "transport publish failed"
                );
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                if let Some(exporter) = &self.exporter {
                    exporter.observe_dropped();
                }
                Err(err)
            }
        }
    }

    /// Send a sensor measurement. `value` must be 0 or 1.
    pub async fn measurement(&self, kind: MeasurementKind, value: i64) -> Result<String> {
        let measurement = Measurement::new(kind, value)?;
        let frame = measurement.frame(self.binding(kind));
        self.send(&frame).await
    }

    /// Clear the active alarm of the given type.
    pub async fn clear_alarm(&self, alarm_type: &str) -> Result<String> {
        self.send(&SmartRestFrame::ClearAlarm {
            alarm_type: alarm_type.to_owned(),
        })
        .await
    }

    pub fn binding(&self, kind: MeasurementKind) -> &SeriesBinding {
        // every kind is inserted at construction
        &self.bindings[&kind]
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn exporter(&self) -> Option<&MessagingMetricsExporter> {
        self.exporter.as_ref()
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Return the current counter snapshot.
    pub fn metrics(&self) -> MessagingMetrics {
        self.counters.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::transport::InMemoryTransport;
    use crate::MessagingError;

    fn publisher_with_in_memory() -> (Publisher, InMemoryTransport) {
        let transport = InMemoryTransport::new();
        let publisher = Publisher::new(
            Arc::new(transport.clone()),
            "s/us",
            DeliveryGuarantee::AtLeastOnce,
        );
        (publisher, transport)
    }

    #[tokio::test]
    async fn measurement_uses_publish_topic_and_qos() {
        let (publisher, transport) = publisher_with_in_memory();
        let payload = publisher
            .measurement(MeasurementKind::MotorState, 1)
            .await
            .expect("publish succeeds");
        assert_eq!(payload, "200,motor-state,motor-state,1,state");

        let sent = transport.published();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].topic, "s/us");
        assert_eq!(sent[0].guarantee, DeliveryGuarantee::AtLeastOnce);
        assert_eq!(publisher.metrics().sent, 1);
    }

    #[tokio::test]
    async fn invalid_values_never_reach_the_transport() {
        let (publisher, transport) = publisher_with_in_memory();
        let err = publisher
            .measurement(MeasurementKind::MaintenanceMode, 7)
            .await
            .unwrap_err();
        assert!(matches!(err, MessagingError::InvalidValue { value: 7, .. }));
        assert!(transport.published().is_empty());
        assert_eq!(publisher.metrics(), MessagingMetrics::default());
    }

    #[tokio::test]
    async fn transport_errors_propagate_and_count_as_dropped() {
        let (publisher, transport) = publisher_with_in_memory();
        transport.fail_with("connection reset");
        let err = publisher.clear_alarm("MotorOverheat").await.unwrap_err();
        assert!(matches!(err, MessagingError::Transport { .. }));
        assert_eq!(publisher.metrics().dropped, 1);
    }

    #[tokio::test]
    async fn config_bindings_override_series_names() {
        let config = HarnessConfig::from_str(
            "[mqtt]\nqos = 0\npublish_topic = \"s/uc/overheat\"\n\n[measurements.motor-overheated]\nfragment = \"c8y_Motor\"\nseries = \"overheated\"\n",
        )
        .expect("config parses");
        let transport = InMemoryTransport::new();
        let publisher =
            Publisher::from_config(Arc::new(transport.clone()), &config).expect("publisher");

        publisher
            .measurement(MeasurementKind::MotorOverheated, 1)
            .await
            .expect("publish succeeds");
        let sent = transport.take();
        assert_eq!(sent[0].payload, "200,c8y_Motor,overheated,1,state");
        assert_eq!(sent[0].topic, "s/uc/overheat");
        assert_eq!(sent[0].guarantee, DeliveryGuarantee::AtMostOnce);
    }
}
