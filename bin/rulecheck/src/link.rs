//! ---
//! rc_section: "06-cli"
//! rc_subsection: "binary"
//! rc_type: "source"
//! rc_scope: "code"
//! rc_description: "Transport selection: live broker or simulated platform."
//! rc_version: "v0.1.0"
//! rc_owner: "tbd"
//! ---
use std::sync::Arc;

use anyhow::{Context, Result};
use rulecheck_common::config::HarnessConfig;
use rulecheck_common::{Clock, SystemClock};
use rulecheck_msg::{InboundSender, MqttTransport, Transport};
use rulecheck_testharness::{PlatformSettings, SimulatedPlatform};
use tracing::{info, warn};

/// Connected transport plus the handle needed to close it.
pub struct Link {
    pub transport: Arc<dyn Transport>,
    mqtt: Option<Arc<MqttTransport>>,
}

impl Link {
    /// Connect to the configured broker.
    pub async fn live(config: &HarnessConfig, inbound: InboundSender) -> Result<Self> {
        config.mqtt.validate_connection()?;
        let mqtt = MqttTransport::connect(&config.mqtt, inbound)
            .await
            .context("failed to connect to MQTT broker")?;
        let mqtt = Arc::new(mqtt);
        Ok(Self {
            transport: mqtt.clone(),
            mqtt: Some(mqtt),
        })
    }

    /// Wire the in-process platform in place of the broker.
    pub fn simulated(config: &HarnessConfig, clock: Arc<dyn Clock>, inbound: InboundSender) -> Self {
        info!(
            response_delay = ?config.simulation.response_delay,
            "using simulated platform"
        );
        let platform = SimulatedPlatform::new(PlatformSettings::from_config(config), clock, inbound);
        Self {
            transport: Arc::new(platform),
            mqtt: None,
        }
    }

    pub async fn open(
        config: &HarnessConfig,
        simulate: bool,
        inbound: InboundSender,
    ) -> Result<Self> {
        if simulate {
            Ok(Self::simulated(config, Arc::new(SystemClock), inbound))
        } else {
            Self::live(config, inbound).await
        }
    }

    pub async fn close(self) {
        if let Some(mqtt) = self.mqtt {
            if let Err(err) = mqtt.disconnect().await {
                warn!(error = %err, "disconnect failed");
            }
        }
    }
}
