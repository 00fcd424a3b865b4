//! ---
//! rc_section: "04-core"
//! rc_subsection: "module"
//! rc_type: "source"
//! rc_scope: "code"
//! rc_description: "Scenario driver state machine and verdict evaluation."
//! rc_version: "v0.1.0"
//! rc_owner: "tbd"
//! ---
//! Scenario driver.
//!
//! Walks a scenario through `Idle → Setup → Triggered → Waiting → Verified`.
//! Every wait is a plain sleep with no early exit, so a run always takes the
//! full configured time. Inbound messages are merged into the store only
//! when the wait is over, right before verification.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rulecheck_common::config::{EarlyAlarmPolicy, ScenarioConfig};
use rulecheck_common::Clock;
use rulecheck_logging::{
    log_scenario_event, rc_debug, rc_info, rc_warn, LogContext, ScenarioEventOutcome,
};
use rulecheck_msg::{MeasurementKind, Publisher};
use serde::Serialize;

use crate::correlator::{ResponseTimeCorrelator, TriggerInstant};
use crate::error::{HarnessError, Result};
use crate::inbox::OperationInbox;
use crate::lifecycle::OperationLifecycle;
use crate::scenario::{Expectation, Scenario, Step};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioPhase {
    Idle,
    Setup,
    Triggered,
    Waiting,
    Verified,
}

impl ScenarioPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioPhase::Idle => "idle",
            ScenarioPhase::Setup => "setup",
            ScenarioPhase::Triggered => "triggered",
            ScenarioPhase::Waiting => "waiting",
            ScenarioPhase::Verified => "verified",
        }
    }
}

impl fmt::Display for ScenarioPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Pass,
    /// Accepted under `early_alarm = "qualified-pass"`.
    QualifiedPass,
    Fail,
}

impl Outcome {
    /// Whether the operation is reported upstream as successful.
    pub fn is_success(&self) -> bool {
        !matches!(self, Outcome::Fail)
    }
}

/// Result of one scenario run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub scenario: String,
    pub expectation: Expectation,
    pub outcome: Outcome,
    pub reason: String,
    /// Seconds from trigger to alarm delivery, when an alarm was received.
    pub response_time: Option<f64>,
}

/// Decide the outcome and reason text from what was observed.
///
/// `elapsed` is `None` when no delivery time was recorded. The alarm window
/// is exclusive on both ends; an arrival before the trigger is never early.
pub fn judge(
    expectation: Expectation,
    alarm_received: bool,
    elapsed: Option<f64>,
    settings: &ScenarioConfig,
) -> (Outcome, String) {
    let floor = settings.alarm_receive_timeout.as_secs_f64();
    let ceiling = settings.wait_for_alarm.as_secs_f64();
    match (expectation, alarm_received, elapsed) {
        (Expectation::Alarm, false, _) => (Outcome::Fail, "Alarm not received".to_owned()),
        (Expectation::Alarm, true, None) => (
            Outcome::Fail,
            "Alarm received without delivery time".to_owned(),
        ),
        (Expectation::Alarm, true, Some(elapsed)) if elapsed > floor && elapsed < ceiling => (
            Outcome::Pass,
            format!("Alarm received in {elapsed:.3}s"),
        ),
        (Expectation::Alarm, true, Some(elapsed))
            if (0.0..=floor).contains(&elapsed)
                && settings.early_alarm == EarlyAlarmPolicy::QualifiedPass =>
        {
            (
                Outcome::QualifiedPass,
                format!("Alarm received in {elapsed:.3}s, earlier than expected"),
            )
        }
        (Expectation::Alarm, true, Some(elapsed)) => (
            Outcome::Fail,
            format!("Alarm received in {elapsed:.3}s outside expected range"),
        ),
        (Expectation::NoAlarm, false, _) => (Outcome::Pass, "No alarm received".to_owned()),
        (Expectation::NoAlarm, true, Some(elapsed)) => (
            Outcome::Fail,
            format!("Unexpected alarm received in {elapsed:.3}s"),
        ),
        (Expectation::NoAlarm, true, None) => {
            (Outcome::Fail, "Unexpected alarm received".to_owned())
        }
    }
}

/// Executes scenarios against a publisher and an inbound inbox.
pub struct ScenarioDriver {
    publisher: Arc<Publisher>,
    lifecycle: OperationLifecycle,
    inbox: OperationInbox,
    correlator: ResponseTimeCorrelator,
    clock: Arc<dyn Clock>,
    settings: ScenarioConfig,
    phase: ScenarioPhase,
}

impl ScenarioDriver {
    pub fn new(
        publisher: Arc<Publisher>,
        inbox: OperationInbox,
        settings: ScenarioConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let correlator = ResponseTimeCorrelator::new(inbox.store().clone());
        Self {
            lifecycle: OperationLifecycle::new(publisher.clone()),
            publisher,
            inbox,
            correlator,
            clock,
            settings,
            phase: ScenarioPhase::Idle,
        }
    }

    pub fn phase(&self) -> ScenarioPhase {
        self.phase
    }

    pub fn settings(&self) -> &ScenarioConfig {
        &self.settings
    }

    pub fn lifecycle(&self) -> &OperationLifecycle {
        &self.lifecycle
    }

    pub fn publisher(&self) -> &Arc<Publisher> {
        &self.publisher
    }

    pub fn inbox_mut(&mut self) -> &mut OperationInbox {
        &mut self.inbox
    }

    /// Run `scenario` to a verdict and report it through the lifecycle
    /// controller. Transport errors abort the run.
    pub async fn run(&mut self, scenario: &Scenario) -> Result<Verdict> {
        scenario.validate()?;
        let fragment = self.settings.operation_fragment.clone();
        let mut trigger: Option<TriggerInstant> = None;
        self.enter(ScenarioPhase::Setup, scenario);

        for step in &scenario.steps {
            match step {
                Step::Publish { kind, value } => self.send(scenario, *kind, *value).await?,
                Step::Settle => tokio::time::sleep(self.settings.wait_between_commands).await,
                Step::Pause { millis } => tokio::time::sleep(Duration::from_millis(*millis)).await,
                Step::Trigger {
                    kind,
                    value,
                    repeat,
                    gap_ms,
                } => {
                    let instant = TriggerInstant::capture(self.clock.as_ref());
                    trigger = Some(instant);
                    self.enter(ScenarioPhase::Triggered, scenario);
                    rc_info!(
                        context = self.context(scenario, &fragment),
                        "triggering {} at {}",
                        kind,
                        instant
                    );
                    for _ in 0..*repeat {
                        self.send(scenario, *kind, *value).await?;
                        tokio::time::sleep(Duration::from_millis(*gap_ms)).await;
                    }
                }
                Step::AwaitAlarm => {
                    self.enter(ScenarioPhase::Waiting, scenario);
                    tokio::time::sleep(self.settings.wait_for_alarm).await;
                }
            }
        }

        let trigger = trigger.ok_or_else(|| {
            HarnessError::invalid(&scenario.name, "scenario finished without a trigger")
        })?;
        let merged = self.inbox.drain();
        let received = self.inbox.store().check(&fragment);
        let response_time = self
            .correlator
            .response_time(trigger)
            .filter(|_| received);
        let (outcome, reason) = judge(scenario.expect, received, response_time, &self.settings);
        self.enter(ScenarioPhase::Verified, scenario);
        rc_debug!(
            context = self.context(scenario, &fragment),
            "merged {} inbound documents, alarm present: {}",
            merged,
            received
        );

        match response_time {
            Some(elapsed) if elapsed >= 0.0 => {
                if let Some(exporter) = self.publisher.exporter() {
                    exporter.observe_response_time(Duration::from_secs_f64(elapsed));
                }
            }
            Some(elapsed) => rc_warn!(
                context = self.context(scenario, &fragment),
                "alarm delivered {:.3}s before the trigger",
                -elapsed
            ),
            None if received => rc_warn!(
                context = self.context(scenario, &fragment),
                "alarm document carries no delivery time"
            ),
            None => {}
        }

        let verdict = Verdict {
            scenario: scenario.name.clone(),
            expectation: scenario.expect,
            outcome,
            reason,
            response_time,
        };
        let event_outcome = match verdict.outcome {
            Outcome::Pass => ScenarioEventOutcome::Success,
            Outcome::QualifiedPass => ScenarioEventOutcome::Qualified,
            Outcome::Fail => ScenarioEventOutcome::Fault,
        };
        log_scenario_event(
            Some(&self.context(scenario, &fragment)),
            "scenario.verified",
            &verdict.reason,
            event_outcome,
        );

        self.lifecycle
            .finalize(&fragment, verdict.outcome.is_success(), &verdict.reason)
            .await?;
        Ok(verdict)
    }

    async fn send(&self, scenario: &Scenario, kind: MeasurementKind, value: u8) -> Result<()> {
        let payload = self
            .publisher
            .measurement(kind, i64::from(value))
            .await?;
        rc_debug!(
            context = self.context(scenario, &self.settings.operation_fragment),
            "sent {}",
            payload
        );
        Ok(())
    }

    fn enter(&mut self, phase: ScenarioPhase, scenario: &Scenario) {
        tracing::debug!(scenario = %scenario.name, from = %self.phase, to = %phase, "phase transition");
        self.phase = phase;
    }

    fn context<'a>(&'a self, scenario: &'a Scenario, fragment: &'a str) -> LogContext<'a> {
        LogContext::new()
            .with_scenario(&scenario.name)
            .with_fragment(fragment)
            .with_phase(self.phase.as_str())
    }
}

#[cfg(test)]
mod tests {
    use rulecheck_common::AnchoredClock;
    use rulecheck_msg::{inbound_channel, DeliveryGuarantee, InMemoryTransport, InboundMessage};

    use super::*;
    use crate::scenario::motor_overheat_catalog;
    use crate::store::OperationStore;

    const EPOCH: f64 = 1_709_287_200.0;

    fn settings(early_alarm: EarlyAlarmPolicy) -> ScenarioConfig {
        ScenarioConfig {
            early_alarm,
            ..ScenarioConfig::default()
        }
    }

    #[test]
    fn positive_window_is_exclusive() {
        let s = settings(EarlyAlarmPolicy::Fail);
        assert_eq!(
            judge(Expectation::Alarm, true, Some(3.0), &s),
            (Outcome::Pass, "Alarm received in 3.000s".into())
        );
        assert_eq!(judge(Expectation::Alarm, true, Some(0.5), &s).0, Outcome::Fail);
        assert_eq!(
            judge(Expectation::Alarm, true, Some(10.0), &s),
            (
                Outcome::Fail,
                "Alarm received in 10.000s outside expected range".into()
            )
        );
        assert_eq!(
            judge(Expectation::Alarm, false, None, &s),
            (Outcome::Fail, "Alarm not received".into())
        );
    }

    #[test]
    fn early_alarm_policy_only_affects_too_fast_arrivals() {
        let s = settings(EarlyAlarmPolicy::QualifiedPass);
        assert_eq!(
            judge(Expectation::Alarm, true, Some(0.2), &s).0,
            Outcome::QualifiedPass
        );
        assert_eq!(
            judge(Expectation::Alarm, true, Some(0.0), &s).0,
            Outcome::QualifiedPass
        );
        assert_eq!(judge(Expectation::Alarm, true, Some(12.0), &s).0, Outcome::Fail);
    }

    #[test]
    fn stale_or_untimed_alarms_are_never_early() {
        let s = settings(EarlyAlarmPolicy::QualifiedPass);
        assert_eq!(
            judge(Expectation::Alarm, true, Some(-30.0), &s),
            (
                Outcome::Fail,
                "Alarm received in -30.000s outside expected range".into()
            )
        );
        assert_eq!(
            judge(Expectation::Alarm, true, None, &s),
            (Outcome::Fail, "Alarm received without delivery time".into())
        );
        assert_eq!(
            judge(Expectation::NoAlarm, true, None, &s),
            (Outcome::Fail, "Unexpected alarm received".into())
        );
    }

    #[test]
    fn negative_scenarios_fail_on_any_alarm() {
        let s = settings(EarlyAlarmPolicy::Fail);
        assert_eq!(
            judge(Expectation::NoAlarm, false, None, &s),
            (Outcome::Pass, "No alarm received".into())
        );
        assert_eq!(
            judge(Expectation::NoAlarm, true, Some(4.25), &s),
            (Outcome::Fail, "Unexpected alarm received in 4.250s".into())
        );
    }

    fn driver() -> (
        ScenarioDriver,
        InMemoryTransport,
        rulecheck_msg::InboundSender,
    ) {
        let transport = InMemoryTransport::new();
        let publisher = Arc::new(Publisher::new(
            Arc::new(transport.clone()),
            "s/us",
            DeliveryGuarantee::AtLeastOnce,
        ));
        let (tx, rx) = inbound_channel();
        let inbox = OperationInbox::new(rx, Arc::new(OperationStore::new()));
        let driver = ScenarioDriver::new(
            publisher,
            inbox,
            ScenarioConfig::default(),
            Arc::new(AnchoredClock::new(EPOCH)),
        );
        (driver, transport, tx)
    }

    #[tokio::test(start_paused = true)]
    async fn missing_alarm_fails_and_reports_upstream() {
        let (mut driver, transport, _tx) = driver();
        let scenario = motor_overheat_catalog().remove(0);

        let verdict = driver.run(&scenario).await.expect("run completes");
        assert_eq!(verdict.outcome, Outcome::Fail);
        assert_eq!(verdict.reason, "Alarm not received");
        assert_eq!(verdict.response_time, None);
        assert_eq!(driver.phase(), ScenarioPhase::Verified);
        assert_eq!(
            transport.payloads(),
            vec![
                "200,motor-state,motor-state,1,state",
                "200,maintenance-mode,maintenance-mode,0,state",
                "200,motor-overheated,motor-overheated,1,state",
                "501,MotorOverheat",
                "502,MotorOverheat,Alarm not received",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn queued_alarm_is_correlated_with_the_trigger() {
        let (mut driver, transport, tx) = driver();
        let scenario = motor_overheat_catalog().remove(0);
        // trigger fires after two settles (4s); alarm 2.5s later
        tx.send(InboundMessage::new(
            "s/ds",
            r#"{"MotorOverheat": {"status": "PENDING"}, "delivery": {"time": "2024-03-01T10:00:06.500Z"}}"#,
        ))
        .unwrap();

        let verdict = driver.run(&scenario).await.expect("run completes");
        assert_eq!(verdict.outcome, Outcome::Pass);
        assert_eq!(verdict.reason, "Alarm received in 2.500s");
        assert!((verdict.response_time.unwrap() - 2.5).abs() < 1e-6);
        assert_eq!(
            transport.payloads().last().map(String::as_str),
            Some("503,MotorOverheat")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_trigger_sends_every_signal() {
        let (mut driver, transport, _tx) = driver();
        let scenario = motor_overheat_catalog()
            .into_iter()
            .find(|s| s.name == "m1_ma0_oh1_multiple_signals_alarm_expected")
            .unwrap();

        let started = tokio::time::Instant::now();
        driver.run(&scenario).await.expect("run completes");
        // two settles + three 500 ms gaps + wait_for_alarm
        assert_eq!(started.elapsed(), Duration::from_millis(15_500));
        let overheat_frames = transport
            .payloads()
            .iter()
            .filter(|p| p.starts_with("200,motor-overheated"))
            .count();
        assert_eq!(overheat_frames, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_trigger_is_timed_from_the_first_signal() {
        let (mut driver, _transport, tx) = driver();
        let scenario = motor_overheat_catalog()
            .into_iter()
            .find(|s| s.name == "m1_ma0_oh1_multiple_signals_alarm_expected")
            .unwrap();
        // signals at 4.0s, 4.5s and 5.0s; the alarm lands before the last one
        tx.send(InboundMessage::new(
            "s/ds",
            r#"{"MotorOverheat": {}, "delivery": {"time": "2024-03-01T10:00:04.700Z"}}"#,
        ))
        .unwrap();

        let verdict = driver.run(&scenario).await.expect("run completes");
        assert_eq!(verdict.outcome, Outcome::Pass);
        assert_eq!(verdict.reason, "Alarm received in 0.700s");
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_aborts_the_run() {
        let (mut driver, transport, _tx) = driver();
        transport.fail_with("broker unreachable");
        let err = driver
            .run(&motor_overheat_catalog().remove(1))
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::Transport(_)));
        assert_eq!(driver.phase(), ScenarioPhase::Setup);
    }
}
