//! ---
//! rc_section: "04-core"
//! rc_subsection: "tests"
//! rc_type: "source"
//! rc_scope: "code"
//! rc_description: "Engine-level tests: reset races, YAML scenarios and early alarms."
//! rc_version: "v0.1.0"
//! rc_owner: "tbd"
//! ---
use std::sync::Arc;

use rulecheck_common::config::{EarlyAlarmPolicy, ScenarioConfig};
use rulecheck_common::AnchoredClock;
use rulecheck_core::{
    OperationInbox, OperationStore, Outcome, Scenario, ScenarioDriver, SuiteRunner,
};
use rulecheck_msg::{
    inbound_channel, DeliveryGuarantee, InMemoryTransport, InboundMessage, InboundSender,
    Publisher,
};

const EPOCH: f64 = 1_709_287_200.0;

fn wire(settings: ScenarioConfig) -> (ScenarioDriver, InMemoryTransport, InboundSender) {
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
        settings,
        Arc::new(AnchoredClock::new(EPOCH)),
    );
    (driver, transport, tx)
}

const SHORT_SCENARIO: &str = r#"
scenarios:
  - name: quick_overheat
    expect: alarm
    steps:
      - { step: publish, kind: motor-state, value: 1 }
      - { step: trigger, kind: motor-overheated, value: 1 }
      - { step: await_alarm }
"#;

#[tokio::test(start_paused = true)]
async fn alarm_left_over_from_previous_scenario_is_discarded_by_the_fixture() {
    let (driver, _transport, tx) = wire(ScenarioConfig::default());
    let mut runner = SuiteRunner::new(driver);
    let scenarios = Scenario::from_yaml(SHORT_SCENARIO).expect("yaml parses");

    // delivered before the fixture reset: must not count for this scenario
    tx.send(InboundMessage::new(
        "s/ds",
        r#"{"MotorOverheat": {}, "delivery": {"time": "2024-03-01T09:59:59Z"}}"#,
    ))
    .unwrap();

    let report = runner.run(&scenarios).await.expect("suite runs");
    assert_eq!(report.failed, 1);
    assert_eq!(report.scenarios[0].verdict.reason, "Alarm not received");
}

#[tokio::test(start_paused = true)]
async fn too_fast_alarm_fails_by_default() {
    let (mut driver, transport, tx) = wire(ScenarioConfig::default());
    let scenario = Scenario::from_yaml(SHORT_SCENARIO).unwrap().remove(0);
    tx.send(InboundMessage::new(
        "s/ds",
        r#"{"MotorOverheat": {}, "delivery": {"time": "2024-03-01T10:00:00.200Z"}}"#,
    ))
    .unwrap();

    let verdict = driver.run(&scenario).await.expect("run completes");
    assert_eq!(verdict.outcome, Outcome::Fail);
    assert_eq!(verdict.reason, "Alarm received in 0.200s outside expected range");
    // the comma-free reason goes out verbatim
    assert_eq!(
        transport.payloads().last().map(String::as_str),
        Some("502,MotorOverheat,Alarm received in 0.200s outside expected range")
    );
}

#[tokio::test(start_paused = true)]
async fn too_fast_alarm_can_be_a_qualified_pass() {
    let settings = ScenarioConfig {
        early_alarm: EarlyAlarmPolicy::QualifiedPass,
        ..ScenarioConfig::default()
    };
    let (mut driver, transport, tx) = wire(settings);
    let scenario = Scenario::from_yaml(SHORT_SCENARIO).unwrap().remove(0);
    tx.send(InboundMessage::new(
        "s/ds",
        r#"{"MotorOverheat": {}, "delivery": {"time": "2024-03-01T10:00:00.200Z"}}"#,
    ))
    .unwrap();

    let verdict = driver.run(&scenario).await.expect("run completes");
    assert_eq!(verdict.outcome, Outcome::QualifiedPass);
    assert_eq!(
        transport.payloads().last().map(String::as_str),
        Some("503,MotorOverheat")
    );
}

#[tokio::test(start_paused = true)]
async fn alarm_after_the_window_is_out_of_range() {
    let (mut driver, _transport, tx) = wire(ScenarioConfig::default());
    let scenario = Scenario::from_yaml(SHORT_SCENARIO).unwrap().remove(0);
    tx.send(InboundMessage::new(
        "s/ds",
        r#"{"MotorOverheat": {}, "delivery": {"time": "2024-03-01T10:00:11Z"}}"#,
    ))
    .unwrap();

    let verdict = driver.run(&scenario).await.expect("run completes");
    assert_eq!(verdict.outcome, Outcome::Fail);
    assert_eq!(
        verdict.reason,
        "Alarm received in 11.000s outside expected range"
    );
}

fn qualified_pass() -> ScenarioConfig {
    ScenarioConfig {
        early_alarm: EarlyAlarmPolicy::QualifiedPass,
        ..ScenarioConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn alarm_without_delivery_time_fails_under_qualified_pass() {
    let (mut driver, transport, tx) = wire(qualified_pass());
    let scenario = Scenario::from_yaml(SHORT_SCENARIO).unwrap().remove(0);
    tx.send(InboundMessage::new(
        "s/ds",
        r#"{"MotorOverheat": {"status": "PENDING"}}"#,
    ))
    .unwrap();

    let verdict = driver.run(&scenario).await.expect("run completes");
    assert_eq!(verdict.outcome, Outcome::Fail);
    assert_eq!(verdict.reason, "Alarm received without delivery time");
    assert_eq!(verdict.response_time, None);
    assert_eq!(
        transport.payloads().last().map(String::as_str),
        Some("502,MotorOverheat,Alarm received without delivery time")
    );
}

#[tokio::test(start_paused = true)]
async fn alarm_delivered_before_the_trigger_fails_under_qualified_pass() {
    let (mut driver, transport, tx) = wire(qualified_pass());
    let scenario = Scenario::from_yaml(SHORT_SCENARIO).unwrap().remove(0);
    tx.send(InboundMessage::new(
        "s/ds",
        r#"{"MotorOverheat": {}, "delivery": {"time": "2024-03-01T09:59:30Z"}}"#,
    ))
    .unwrap();

    let verdict = driver.run(&scenario).await.expect("run completes");
    assert_eq!(verdict.outcome, Outcome::Fail);
    assert_eq!(
        verdict.reason,
        "Alarm received in -30.000s outside expected range"
    );
    assert_eq!(
        transport.payloads().last().map(String::as_str),
        Some("502,MotorOverheat,Alarm received in -30.000s outside expected range")
    );
}
