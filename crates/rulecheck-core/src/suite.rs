//! ---
//! rc_section: "04-core"
//! rc_subsection: "module"
//! rc_type: "source"
//! rc_scope: "code"
//! rc_description: "Suite runner: per-scenario fixtures, sequencing and the run report."
//! rc_version: "v0.1.0"
//! rc_owner: "tbd"
//! ---
use std::time::Duration;

use chrono::{DateTime, Utc};
use rulecheck_logging::{rc_error, rc_warn, LogContext};
use serde::Serialize;
use tokio::time::Instant;
use tracing::info;
use uuid::Uuid;

use crate::driver::{Outcome, ScenarioDriver, Verdict};
use crate::error::Result;
use crate::scenario::Scenario;

/// Reason attached to the failure transition sent before every scenario.
pub const INITIAL_RESET_REASON: &str = "Initial reset";

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    #[serde(flatten)]
    pub verdict: Verdict,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub scenarios: Vec<ScenarioReport>,
    pub passed: usize,
    pub qualified: usize,
    pub failed: usize,
}

impl SuiteReport {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            scenarios: Vec::new(),
            passed: 0,
            qualified: 0,
            failed: 0,
        }
    }

    fn record(&mut self, verdict: Verdict, duration_ms: u64) {
        match verdict.outcome {
            Outcome::Pass => self.passed += 1,
            Outcome::QualifiedPass => self.qualified += 1,
            Outcome::Fail => self.failed += 1,
        }
        self.scenarios.push(ScenarioReport {
            verdict,
            duration_ms,
        });
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn whole_millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Runs scenarios in order, each wrapped in the reset fixture and teardown.
pub struct SuiteRunner {
    driver: ScenarioDriver,
}

impl SuiteRunner {
    pub fn new(driver: ScenarioDriver) -> Self {
        Self { driver }
    }

    pub fn driver(&self) -> &ScenarioDriver {
        &self.driver
    }

    /// Run every scenario. Failed assertions are recorded and the batch goes
    /// on; a transport failure stops it and is returned as the error.
    pub async fn run(&mut self, scenarios: &[Scenario]) -> Result<SuiteReport> {
        let mut report = SuiteReport::new();
        info!(run_id = %report.run_id, count = scenarios.len(), "suite started");

        for scenario in scenarios {
            let started = Instant::now();
            let context = LogContext::new().with_scenario(&scenario.name);
            let verdict = match self.run_one(scenario).await {
                Ok(verdict) => verdict,
                Err(err) => {
                    rc_error!(context = context, "aborting suite: {}", err);
                    return Err(err);
                }
            };
            let duration_ms = whole_millis(started.elapsed());
            if verdict.outcome == Outcome::Fail {
                rc_warn!(context = context, "scenario failed: {}", verdict.reason);
            }
            report.record(verdict, duration_ms);
        }

        info!(
            run_id = %report.run_id,
            passed = report.passed,
            qualified = report.qualified,
            failed = report.failed,
            "suite finished"
        );
        Ok(report)
    }

    async fn run_one(&mut self, scenario: &Scenario) -> Result<Verdict> {
        self.driver.publisher().transport().health()?;
        self.setup().await?;
        let verdict = self.driver.run(scenario).await?;
        self.teardown().await?;
        Ok(verdict)
    }

    /// Clear the alarm, close out any leftover operation, let the platform
    /// settle, then drop whatever it sent back.
    async fn setup(&mut self) -> Result<()> {
        let settings = self.driver.settings().clone();
        let lifecycle = self.driver.lifecycle().clone();
        lifecycle.clear_alarm(&settings.alarm_type).await?;
        lifecycle
            .finalize(&settings.operation_fragment, false, INITIAL_RESET_REASON)
            .await?;
        tokio::time::sleep(settings.wait_between_commands).await;
        self.driver.inbox_mut().reset();
        Ok(())
    }

    async fn teardown(&mut self) -> Result<()> {
        let alarm_type = self.driver.settings().alarm_type.clone();
        self.driver.lifecycle().clear_alarm(&alarm_type).await?;
        self.driver.inbox_mut().reset();
        Ok(())
    }
}
