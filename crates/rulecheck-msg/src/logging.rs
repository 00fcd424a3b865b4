//! ---
//! rc_section: "02-messaging"
//! rc_subsection: "module"
//! rc_type: "source"
//! rc_scope: "code"
//! rc_description: "Message activity logging and Prometheus metric handles."
//! rc_version: "v0.1.0"
//! rc_owner: "tbd"
//! ---
use std::time::Duration;

use prometheus::{Histogram, HistogramOpts, IntCounter, Opts, Registry};
use tracing::debug;

/// Direction of the message movement, used for consistent logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageDirection {
    /// Frame handed to a transport.
    Outbound,
    /// Document received from the platform.
    Inbound,
}

impl MessageDirection {
    fn as_str(&self) -> &'static str {
        match self {
            MessageDirection::Outbound => "outbound",
            MessageDirection::Inbound => "inbound",
        }
    }
}

/// Emit a structured log entry for message activity.
pub fn log_message(direction: MessageDirection, topic: &str, payload: &str) {
    debug!(
        direction = direction.as_str(),
        topic,
        bytes = payload.len(),
        payload,
        "messaging activity"
    );
}

/// Response-time buckets in seconds, spanning the usual alarm rule delays.
const RESPONSE_TIME_BUCKETS: &[f64] = &[0.25, 0.5, 1.0, 1.5, 2.0, 3.0, 5.0, 10.0, 30.0];

/// Prometheus metric handles for messaging activity.
#[derive(Clone)]
pub struct MessagingMetricsExporter {
    published: IntCounter,
    dropped: IntCounter,
    received: IntCounter,
    malformed: IntCounter,
    response_time: Histogram,
}

impl MessagingMetricsExporter {
    /// Register messaging metrics with the provided registry.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let published = IntCounter::with_opts(Opts::new(
            "rulecheck_frames_published_total",
            "Frames handed to the transport",
        ))?;
        let dropped = IntCounter::with_opts(Opts::new(
            "rulecheck_frames_dropped_total",
            "Frames the transport refused",
        ))?;
        let received = IntCounter::with_opts(Opts::new(
            "rulecheck_documents_received_total",
            "Operation documents merged into the store",
        ))?;
        let malformed = IntCounter::with_opts(Opts::new(
            "rulecheck_documents_malformed_total",
            "Inbound payloads discarded as malformed",
        ))?;
        let response_time = Histogram::with_opts(
            HistogramOpts::new(
                "rulecheck_alarm_response_seconds",
                "Elapsed time between trigger and alarm delivery",
            )
            .buckets(RESPONSE_TIME_BUCKETS.to_vec()),
        )?;

        registry.register(Box::new(published.clone()))?;
        registry.register(Box::new(dropped.clone()))?;
        registry.register(Box::new(received.clone()))?;
        registry.register(Box::new(malformed.clone()))?;
        registry.register(Box::new(response_time.clone()))?;

        Ok(Self {
            published,
            dropped,
            received,
            malformed,
            response_time,
        })
    }

    pub fn observe_published(&self) {
        self.published.inc();
    }

    pub fn observe_dropped(&self) {
        self.dropped.inc();
    }

    pub fn observe_received(&self) {
        self.received.inc();
    }

    pub fn observe_malformed(&self) {
        self.malformed.inc();
    }

    /// Record the trigger-to-alarm response time.
    pub fn observe_response_time(&self, elapsed: Duration) {
        self.response_time.observe(elapsed.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_exporter_records_counts() {
        let registry = Registry::new();
        let metrics = MessagingMetricsExporter::register(&registry).expect("register metrics");
        metrics.observe_published();
        metrics.observe_received();
        metrics.observe_dropped();
        metrics.observe_malformed();
        metrics.observe_response_time(Duration::from_millis(1500));

        let families = registry.gather();
        let published = families
            .iter()
            .find(|f| f.get_name() == "rulecheck_frames_published_total")
            .expect("published counter registered");
        assert_eq!(published.get_metric()[0].get_counter().get_value(), 1.0);
        assert!(families
            .iter()
            .any(|f| f.get_name() == "rulecheck_alarm_response_seconds"));
    }

    #[test]
    fn double_registration_is_rejected() {
        let registry = Registry::new();
        MessagingMetricsExporter::register(&registry).expect("first registration");
        assert!(MessagingMetricsExporter::register(&registry).is_err());
    }
}
