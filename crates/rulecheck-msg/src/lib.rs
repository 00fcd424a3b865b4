//! ---
//! rc_section: "02-messaging"
//! rc_subsection: "module"
//! rc_type: "source"
//! rc_scope: "code"
//! rc_description: "SmartREST frame codec, transports and measurement publishing."
//! rc_version: "v0.1.0"
//! rc_owner: "tbd"
//! ---

pub mod logging;
pub mod mqtt;
pub mod publisher;
pub mod qos;
pub mod transport;
pub mod types;

/// Shared result type for messaging operations.
pub type Result<T> = std::result::Result<T, MessagingError>;

/// Errors raised while encoding, parsing or moving frames.
#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    /// A measurement value outside the 0/1 flag range.
    #[error("invalid value {value} for {kind}; expected 0 or 1")]
    InvalidValue { kind: &'static str, value: i64 },
    /// A frame line that does not match any known template.
    #[error("malformed frame: {0:?}")]
    MalformedFrame(String),
    /// A measurement kind name that is not recognised.
    #[error("unknown measurement kind: {0}")]
    UnknownKind(String),
    /// A QoS level outside 0..=2.
    #[error("invalid qos level {0}; expected 0, 1 or 2")]
    InvalidQos(u8),
    /// The transport refused or failed to queue a publish.
    #[error("{transport} transport error: {reason}")]
    Transport {
        transport: &'static str,
        reason: String,
    },
    /// The broker connection failed or was lost.
    #[error("connection error: {0}")]
    Connection(String),
    /// TLS material could not be loaded or assembled.
    #[error("tls error: {0}")]
    Tls(String),
    /// Wrapper for IO errors encountered during messaging operations.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub use logging::{log_message, MessageDirection, MessagingMetricsExporter};
pub use mqtt::MqttTransport;
pub use publisher::{MessagingMetrics, Publisher};
pub use qos::DeliveryGuarantee;
pub use transport::{
    inbound_channel, InMemoryTransport, InboundReceiver, InboundSender, PublishedFrame, Transport,
};
pub use types::{InboundMessage, Measurement, MeasurementKind, SmartRestFrame};
