//! ---
//! rc_section: "07-testing"
//! rc_subsection: "integration-tests"
//! rc_type: "source"
//! rc_scope: "code"
//! rc_description: "Checks that the shipped configuration and scenario files load and pass."
//! rc_version: "v0.1.0"
//! rc_owner: "tbd"
//! ---
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rulecheck_common::config::HarnessConfig;
use rulecheck_common::{AnchoredClock, Clock, EarlyAlarmPolicy};
use rulecheck_core::{OperationInbox, OperationStore, Scenario, ScenarioDriver, SuiteRunner};
use rulecheck_msg::{inbound_channel, Publisher};
use rulecheck_testharness::{PlatformSettings, SimulatedPlatform};

fn workspace_file(path: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join(path)
}

#[test]
fn example_config_is_complete_for_a_live_run() {
    let config = HarnessConfig::from_path(&workspace_file("configs/rulecheck.example.toml"))
        .expect("example config parses");
    config.validate().expect("example config validates");
    assert!(config.mqtt.missing_keys().is_empty());
    assert_eq!(config.scenario.early_alarm, EarlyAlarmPolicy::Fail);
    assert_eq!(config.measurements.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn scenario_file_passes_against_the_simulated_rule() {
    let scenarios = Scenario::load_file(&workspace_file("scenarios/motor_overheat.yaml"))
        .expect("scenario file loads");
    assert_eq!(scenarios.len(), 3);

    let config = HarnessConfig::default();
    let clock: Arc<dyn Clock> = Arc::new(AnchoredClock::new(1_709_287_200.0));
    let (tx, rx) = inbound_channel();
    let platform = SimulatedPlatform::new(PlatformSettings::from_config(&config), clock.clone(), tx);
    let publisher =
        Publisher::from_config(Arc::new(platform.clone()), &config).expect("publisher");
    let driver = ScenarioDriver::new(
        Arc::new(publisher),
        OperationInbox::new(rx, Arc::new(OperationStore::new())),
        config.scenario.clone(),
        clock,
    );

    let report = SuiteRunner::new(driver)
        .run(&scenarios)
        .await
        .expect("suite completes");
    assert!(
        report.all_passed(),
        "{:?}",
        report
            .scenarios
            .iter()
            .map(|entry| (&entry.verdict.scenario, &entry.verdict.reason))
            .collect::<Vec<_>>()
    );
    assert_eq!(platform.alarms_raised(), 1);
}
