//! ---
//! rc_section: "04-core"
//! rc_subsection: "module"
//! rc_type: "source"
//! rc_scope: "code"
//! rc_description: "Operation lifecycle controller: executing then success or failure."
//! rc_version: "v0.1.0"
//! rc_owner: "tbd"
//! ---
use std::sync::Arc;

use rulecheck_msg::{MessagingError, Publisher, SmartRestFrame};
use tracing::info;

/// Reports operation transitions back to the platform.
#[derive(Clone)]
pub struct OperationLifecycle {
    publisher: Arc<Publisher>,
}

impl OperationLifecycle {
    pub fn new(publisher: Arc<Publisher>) -> Self {
        Self { publisher }
    }

    /// Send `501,<fragment>` followed by either `503,<fragment>` or
    /// `502,<fragment>,<reason>`. Always exactly two frames; the second is
    /// not sent if the first fails.
    pub async fn finalize(
        &self,
        fragment: &str,
        succeeded: bool,
        reason: &str,
    ) -> Result<(), MessagingError> {
        info!(fragment, succeeded, reason, "finalizing operation");
        self.publisher
            .send(&SmartRestFrame::OperationExecuting {
                fragment: fragment.to_owned(),
            })
            .await?;
        let outcome = if succeeded {
            SmartRestFrame::OperationSuccessful {
                fragment: fragment.to_owned(),
            }
        } else {
            SmartRestFrame::OperationFailed {
                fragment: fragment.to_owned(),
                reason: reason.to_owned(),
            }
        };
        self.publisher.send(&outcome).await?;
        Ok(())
    }

    /// Clear the active alarm of `alarm_type` (`306,<alarm_type>`).
    pub async fn clear_alarm(&self, alarm_type: &str) -> Result<(), MessagingError> {
        info!(alarm_type, "clearing alarm");
        self.publisher.clear_alarm(alarm_type).await.map(|_| ())
    }

    pub fn publisher(&self) -> &Arc<Publisher> {
        &self.publisher
    }
}

#[cfg(test)]
mod tests {
    use rulecheck_msg::{DeliveryGuarantee, InMemoryTransport};

    use super::*;

    fn lifecycle() -> (OperationLifecycle, InMemoryTransport) {
        let transport = InMemoryTransport::new();
        let publisher = Publisher::new(
            Arc::new(transport.clone()),
            "s/us",
            DeliveryGuarantee::AtLeastOnce,
        );
        (OperationLifecycle::new(Arc::new(publisher)), transport)
    }

    #[tokio::test]
    async fn success_sends_executing_then_successful() {
        let (lifecycle, transport) = lifecycle();
        lifecycle
            .finalize("MotorOverheat", true, "Alarm received in 3.000s")
            .await
            .unwrap();
        assert_eq!(
            transport.payloads(),
            vec!["501,MotorOverheat", "503,MotorOverheat"]
        );
    }

    #[tokio::test]
    async fn failure_carries_reason() {
        let (lifecycle, transport) = lifecycle();
        lifecycle
            .finalize("MotorOverheat", false, "Initial reset")
            .await
            .unwrap();
        assert_eq!(
            transport.payloads(),
            vec!["501,MotorOverheat", "502,MotorOverheat,Initial reset"]
        );
    }

    #[tokio::test]
    async fn failed_executing_frame_stops_the_sequence() {
        let (lifecycle, transport) = lifecycle();
        transport.fail_with("offline");
        assert!(lifecycle
            .finalize("MotorOverheat", false, "Alarm not received")
            .await
            .is_err());
        transport.recover();
        assert!(transport.payloads().is_empty());
    }

    #[tokio::test]
    async fn clear_alarm_sends_306() {
        let (lifecycle, transport) = lifecycle();
        lifecycle.clear_alarm("MotorOverheat").await.unwrap();
        assert_eq!(transport.payloads(), vec!["306,MotorOverheat"]);
    }
}
