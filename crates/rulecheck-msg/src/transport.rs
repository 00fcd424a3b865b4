//! ---
//! rc_section: "02-messaging"
//! rc_subsection: "module"
//! rc_type: "source"
//! rc_scope: "code"
//! rc_description: "Transport seam, inbound channel and the in-memory transport."
//! rc_version: "v0.1.0"
//! rc_owner: "tbd"
//! ---
use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::{DeliveryGuarantee, InboundMessage, MessagingError, Result};

/// Sending half handed to a transport's delivery task.
pub type InboundSender = mpsc::UnboundedSender<InboundMessage>;
/// Receiving half drained by the scenario driver.
pub type InboundReceiver = mpsc::UnboundedReceiver<InboundMessage>;

/// Create the channel that carries inbound messages from a transport to the driver.
pub fn inbound_channel() -> (InboundSender, InboundReceiver) {
    mpsc::unbounded_channel()
}

/// Outbound half of a broker connection.
///
/// Inbound traffic does not flow through this trait; implementations push it
/// into an [`InboundSender`] from their own task.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Hand a payload to the transport. Returns once it is queued, not delivered.
    async fn publish(&self, topic: &str, payload: String, guarantee: DeliveryGuarantee)
        -> Result<()>;

    /// Report a connection failure observed by the background task, if any.
    fn health(&self) -> Result<()> {
        Ok(())
    }

    /// Human-readable transport name for logging/metrics.
    fn name(&self) -> &'static str;
}

/// Frame captured by [`InMemoryTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedFrame {
    pub topic: String,
    pub payload: String,
    pub guarantee: DeliveryGuarantee,
}

/// Records outbound frames in order; used by tests and dry runs.
#[derive(Clone, Default)]
pub struct InMemoryTransport {
    sent: Arc<Mutex<VecDeque<PublishedFrame>>>,
    failure: Arc<Mutex<Option<String>>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payloads published so far, oldest first.
    pub fn payloads(&self) -> Vec<String> {
        self.sent.lock().iter().map(|f| f.payload.clone()).collect()
    }

    pub fn published(&self) -> Vec<PublishedFrame> {
        self.sent.lock().iter().cloned().collect()
    }

    /// Remove and return everything published so far.
    pub fn take(&self) -> Vec<PublishedFrame> {
        self.sent.lock().drain(..).collect()
    }

    /// Make every subsequent publish and health check fail.
    pub fn fail_with(&self, reason: impl Into<String>) {
        *self.failure.lock() = Some(reason.into());
    }

    pub fn recover(&self) {
        self.failure.lock().take();
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn publish(
        &self,
        topic: &str,
        payload: String,
        guarantee: DeliveryGuarantee,
    ) -> Result<()> {
        if let Some(reason) = self.failure.lock().clone() {
            return Err(MessagingError::Transport {
                transport: self.name(),
                reason,
            });
        }
        self.sent.lock().push_back(PublishedFrame {
            topic: topic.to_owned(),
            payload,
            guarantee,
        });
        Ok(())
    }

    fn health(&self) -> Result<()> {
        match self.failure.lock().as_ref() {
            Some(reason) => Err(MessagingError::Connection(reason.clone())),
            None => Ok(()),
        }
    }

    fn name(&self) -> &'static str {
        "in_memory"
    }
}
