//! ---
//! rc_section: "05-simulation"
//! rc_subsection: "module"
//! rc_type: "source"
//! rc_scope: "code"
//! rc_description: "Simulated platform evaluating the motor-overheat rule in process."
//! rc_version: "v0.1.0"
//! rc_owner: "tbd"
//! ---
//! In-process stand-in for the remote IoT platform.
//!
//! [`SimulatedPlatform`] implements [`Transport`]: outbound frames are parsed
//! and applied to a small device model, and the motor-overheat rule answers
//! through the inbound channel exactly like the broker subscription would.
//!
//! Rule: an overheat signal (`motor-overheated = 1`) while the motor runs and
//! maintenance is off arms the alarm. After `response_delay` the conditions
//! are checked again and, if they still hold, the alarm operation is
//! delivered. Only one alarm is active at a time; `306` clears it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rulecheck_common::config::HarnessConfig;
use rulecheck_common::time::format_epoch;
use rulecheck_common::Clock;
use rulecheck_msg::{
    DeliveryGuarantee, InboundMessage, InboundSender, MeasurementKind, MessagingError,
    SmartRestFrame, Transport,
};
use serde_json::json;
use tracing::{debug, info, warn};

/// Topic the simulated operations are delivered on.
pub const OPERATION_TOPIC: &str = "s/ds";

/// Rule parameters and wire names the platform recognises.
#[derive(Debug, Clone)]
pub struct PlatformSettings {
    pub response_delay: Duration,
    pub operation_fragment: String,
    pub alarm_type: String,
    bindings: HashMap<(String, String), MeasurementKind>,
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self::from_config(&HarnessConfig::default())
    }
}

impl PlatformSettings {
    pub fn from_config(config: &HarnessConfig) -> Self {
        let bindings = MeasurementKind::ALL
            .into_iter()
            .map(|kind| {
                let binding = config.series_binding(kind.as_str());
                ((binding.fragment, binding.series), kind)
            })
            .collect();
        Self {
            response_delay: config.simulation.response_delay,
            operation_fragment: config.scenario.operation_fragment.clone(),
            alarm_type: config.scenario.alarm_type.clone(),
            bindings,
        }
    }

    pub fn with_response_delay(mut self, delay: Duration) -> Self {
        self.response_delay = delay;
        self
    }

    fn kind_of(&self, fragment: &str, series: &str) -> Option<MeasurementKind> {
        self.bindings
            .get(&(fragment.to_owned(), series.to_owned()))
            .copied()
    }
}

#[derive(Debug, Default)]
struct DeviceState {
    motor: i64,
    maintenance: i64,
    overheated: i64,
    /// Token of the armed alarm, if any.
    pending: Option<u64>,
    alarm_active: bool,
    next_token: u64,
    alarms_raised: u64,
    operations: Vec<SmartRestFrame>,
}

impl DeviceState {
    fn rule_holds(&self) -> bool {
        self.motor == 1 && self.maintenance == 0 && self.overheated == 1
    }
}

struct PlatformInner {
    settings: PlatformSettings,
    clock: Arc<dyn Clock>,
    inbound: InboundSender,
    state: Mutex<DeviceState>,
    failure: Mutex<Option<String>>,
}

/// Fake platform wired in place of the MQTT transport.
#[derive(Clone)]
pub struct SimulatedPlatform {
    inner: Arc<PlatformInner>,
}

impl SimulatedPlatform {
    pub fn new(settings: PlatformSettings, clock: Arc<dyn Clock>, inbound: InboundSender) -> Self {
        Self {
            inner: Arc::new(PlatformInner {
                settings,
                clock,
                inbound,
                state: Mutex::default(),
                failure: Mutex::new(None),
            }),
        }
    }

    /// Number of alarms delivered so far.
    pub fn alarms_raised(&self) -> u64 {
        self.inner.state.lock().alarms_raised
    }

    pub fn alarm_active(&self) -> bool {
        self.inner.state.lock().alarm_active
    }

    /// Operation transitions (`501`/`502`/`503`) received so far.
    pub fn operations(&self) -> Vec<SmartRestFrame> {
        self.inner.state.lock().operations.clone()
    }

    /// Simulate a lost broker connection.
    pub fn fail_with(&self, reason: impl Into<String>) {
        *self.inner.failure.lock() = Some(reason.into());
    }

    fn apply(&self, frame: SmartRestFrame) {
        let settings = &self.inner.settings;
        let mut state = self.inner.state.lock();
        match frame {
            SmartRestFrame::Measurement {
                fragment,
                series,
                value,
            } => {
                let Some(kind) = settings.kind_of(&fragment, &series) else {
                    debug!(%fragment, %series, "ignoring unknown series");
                    return;
                };
                match kind {
                    MeasurementKind::MotorState => state.motor = value,
                    MeasurementKind::MaintenanceMode => state.maintenance = value,
                    MeasurementKind::MotorOverheated => state.overheated = value,
                }
                if kind == MeasurementKind::MotorOverheated
                    && state.rule_holds()
                    && !state.alarm_active
                    && state.pending.is_none()
                {
                    state.next_token += 1;
                    let token = state.next_token;
                    state.pending = Some(token);
                    drop(state);
                    debug!(token, delay = ?settings.response_delay, "overheat rule armed");
                    self.schedule(token);
                }
            }
            SmartRestFrame::ClearAlarm { alarm_type } => {
                if alarm_type == settings.alarm_type {
                    state.alarm_active = false;
                    state.pending = None;
                }
            }
            transition => state.operations.push(transition),
        }
    }

    fn schedule(&self, token: u64) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            tokio::time::sleep(inner.settings.response_delay).await;
            let mut state = inner.state.lock();
            if state.pending != Some(token) {
                return;
            }
            state.pending = None;
            if !state.rule_holds() {
                info!(token, "overheat rule no longer holds, alarm suppressed");
                return;
            }
            state.alarm_active = true;
            state.alarms_raised += 1;
            drop(state);

            let settings = &inner.settings;
            let mut document = serde_json::Map::new();
            document.insert(
                settings.operation_fragment.clone(),
                json!({
                    "alarmType": settings.alarm_type,
                    "status": "PENDING",
                    "text": "Motor overheated",
                }),
            );
            document.insert(
                "delivery".to_owned(),
                json!({ "time": format_epoch(inner.clock.now_epoch()) }),
            );
            let payload = serde_json::Value::Object(document).to_string();
            info!(token, "alarm raised");
            if inner
                .inbound
                .send(InboundMessage::new(OPERATION_TOPIC, payload))
                .is_err()
            {
                warn!("inbound receiver dropped, alarm not delivered");
            }
        });
    }
}

#[async_trait]
impl Transport for SimulatedPlatform {
    async fn publish(
        &self,
        _topic: &str,
        payload: String,
        _guarantee: DeliveryGuarantee,
    ) -> Result<(), MessagingError> {
        self.health()?;
        match SmartRestFrame::parse(&payload) {
            Ok(frame) => self.apply(frame),
            Err(err) => warn!(error = %err, "platform rejected frame"),
        }
        Ok(())
    }

    fn health(&self) -> Result<(), MessagingError> {
        match self.inner.failure.lock().as_ref() {
            Some(reason) => Err(MessagingError::Connection(reason.clone())),
            None => Ok(()),
        }
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

#[cfg(test)]
mod tests {
    use rulecheck_common::AnchoredClock;
    use rulecheck_msg::{inbound_channel, InboundReceiver};

    use super::*;

    const EPOCH: f64 = 1_709_287_200.0;

    fn platform() -> (SimulatedPlatform, InboundReceiver) {
        let (tx, rx) = inbound_channel();
        let platform = SimulatedPlatform::new(
            PlatformSettings::default(),
            Arc::new(AnchoredClock::new(EPOCH)),
            tx,
        );
        (platform, rx)
    }

    async fn send(platform: &SimulatedPlatform, payload: &str) {
        platform
            .publish("s/us", payload.to_owned(), DeliveryGuarantee::AtLeastOnce)
            .await
            .expect("publish accepted");
    }

    #[tokio::test(start_paused = true)]
    async fn alarm_fires_after_response_delay() {
        let (platform, mut rx) = platform();
        send(&platform, "200,motor-state,motor-state,1,state").await;
        send(&platform, "200,maintenance-mode,maintenance-mode,0,state").await;
        send(&platform, "200,motor-overheated,motor-overheated,1,state").await;

        tokio::time::sleep(Duration::from_secs(4)).await;
        let message = rx.try_recv().expect("alarm delivered");
        let document: serde_json::Value = serde_json::from_slice(&message.payload).unwrap();
        assert_eq!(document["MotorOverheat"]["alarmType"], "MotorOverheat");
        assert_eq!(document["delivery"]["time"], "2024-03-01T10:00:03.000Z");
        assert!(platform.alarm_active());
    }

    #[tokio::test(start_paused = true)]
    async fn maintenance_before_the_deadline_suppresses_the_alarm() {
        let (platform, mut rx) = platform();
        send(&platform, "200,motor-state,motor-state,1,state").await;
        send(&platform, "200,motor-overheated,motor-overheated,1,state").await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        send(&platform, "200,maintenance-mode,maintenance-mode,1,state").await;

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(platform.alarms_raised(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn active_alarm_is_not_duplicated_until_cleared() {
        let (platform, mut rx) = platform();
        send(&platform, "200,motor-state,motor-state,1,state").await;
        for _ in 0..3 {
            send(&platform, "200,motor-overheated,motor-overheated,1,state").await;
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        tokio::time::sleep(Duration::from_secs(5)).await;
        send(&platform, "200,motor-overheated,motor-overheated,1,state").await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(platform.alarms_raised(), 1);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());

        send(&platform, "306,MotorOverheat").await;
        assert!(!platform.alarm_active());
    }

    #[tokio::test]
    async fn operation_transitions_are_recorded() {
        let (platform, _rx) = platform();
        send(&platform, "501,MotorOverheat").await;
        send(&platform, "502,MotorOverheat,Initial reset").await;
        assert_eq!(
            platform.operations(),
            vec![
                SmartRestFrame::OperationExecuting {
                    fragment: "MotorOverheat".into()
                },
                SmartRestFrame::OperationFailed {
                    fragment: "MotorOverheat".into(),
                    reason: "Initial reset".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn injected_failure_rejects_publishes() {
        let (platform, _rx) = platform();
        platform.fail_with("broker offline");
        assert!(platform
            .publish("s/us", "306,MotorOverheat".into(), DeliveryGuarantee::AtLeastOnce)
            .await
            .is_err());
    }
}
