//! ---
//! rc_section: "04-core"
//! rc_subsection: "module"
//! rc_type: "source"
//! rc_scope: "code"
//! rc_description: "Scenario model, validation, YAML loading and the built-in catalog."
//! rc_version: "v0.1.0"
//! rc_owner: "tbd"
//! ---
//! Scenarios are ordered step lists: preconditions, one trigger, optional late
//! changes, and a final wait for the alarm.
//!
//! ```yaml
//! scenarios:
//!   - name: m1_ma0_oh1_alarm_expected
//!     expect: alarm
//!     steps:
//!       - { step: publish, kind: motor-state, value: 1 }
//!       - { step: settle }
//!       - { step: publish, kind: maintenance-mode, value: 0 }
//!       - { step: settle }
//!       - { step: trigger, kind: motor-overheated, value: 1 }
//!       - { step: await_alarm }
//! ```

use std::fs;
use std::path::Path;

use rulecheck_msg::MeasurementKind;
use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};

/// Whether the scenario expects the platform to raise the alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expectation {
    Alarm,
    NoAlarm,
}

impl Expectation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Expectation::Alarm => "alarm",
            Expectation::NoAlarm => "no_alarm",
        }
    }
}

fn default_repeat() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    /// Send one measurement.
    Publish { kind: MeasurementKind, value: u8 },
    /// Sleep `wait_between_commands`.
    Settle,
    /// Sleep for an explicit number of milliseconds.
    Pause { millis: u64 },
    /// Capture the trigger instant, then send the measurement `repeat` times,
    /// sleeping `gap_ms` after each send.
    Trigger {
        kind: MeasurementKind,
        value: u8,
        #[serde(default = "default_repeat")]
        repeat: u32,
        #[serde(default)]
        gap_ms: u64,
    },
    /// Sleep `wait_for_alarm`.
    AwaitAlarm,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub expect: Expectation,
    pub steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
struct ScenarioFile {
    scenarios: Vec<Scenario>,
}

impl Scenario {
    /// Check the step list shape: exactly one trigger, flag values only, and a
    /// final `await_alarm` after the trigger.
    pub fn validate(&self) -> Result<()> {
        let name = self.name.as_str();
        if name.trim().is_empty() {
            return Err(HarnessError::invalid(name, "name cannot be empty"));
        }

        let triggers: Vec<usize> = self
            .steps
            .iter()
            .enumerate()
            .filter(|(_, step)| matches!(step, Step::Trigger { .. }))
            .map(|(index, _)| index)
            .collect();
        let trigger_index = match triggers.as_slice() {
            [index] => *index,
            [] => return Err(HarnessError::invalid(name, "missing trigger step")),
            _ => {
                return Err(HarnessError::invalid(
                    name,
                    format!("expected exactly one trigger step, found {}", triggers.len()),
                ))
            }
        };

        for step in &self.steps {
            match step {
                Step::Publish { kind, value } | Step::Trigger { kind, value, .. } if *value > 1 => {
                    return Err(HarnessError::invalid(
                        name,
                        format!("{kind} value must be 0 or 1, got {value}"),
                    ));
                }
                Step::Trigger { repeat: 0, .. } => {
                    return Err(HarnessError::invalid(name, "trigger repeat must be at least 1"));
                }
                _ => {}
            }
        }

        match self.steps.last() {
            Some(Step::AwaitAlarm) if self.steps.len() - 1 > trigger_index => Ok(()),
            _ => Err(HarnessError::invalid(
                name,
                "last step must be await_alarm following the trigger",
            )),
        }
    }

    /// Load and validate every scenario of a YAML file.
    pub fn load_file(path: &Path) -> Result<Vec<Scenario>> {
        let contents = fs::read_to_string(path).map_err(|source| HarnessError::ScenarioIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&contents).map_err(|err| match err {
            HarnessError::ScenarioParse { source, .. } => HarnessError::ScenarioParse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Parse and validate scenarios from a YAML document.
    pub fn from_yaml(contents: &str) -> Result<Vec<Scenario>> {
        let file: ScenarioFile =
            serde_yaml::from_str(contents).map_err(|source| HarnessError::ScenarioParse {
                path: Default::default(),
                source,
            })?;
        for scenario in &file.scenarios {
            scenario.validate()?;
        }
        Ok(file.scenarios)
    }

    /// The trigger step, if present.
    pub fn trigger(&self) -> Option<&Step> {
        self.steps
            .iter()
            .find(|step| matches!(step, Step::Trigger { .. }))
    }
}

fn publish(kind: MeasurementKind, value: u8) -> Step {
    Step::Publish { kind, value }
}

fn trigger_once(kind: MeasurementKind) -> Step {
    Step::Trigger {
        kind,
        value: 1,
        repeat: 1,
        gap_ms: 0,
    }
}

fn preconditions(motor: u8, maintenance: u8) -> Vec<Step> {
    vec![
        publish(MeasurementKind::MotorState, motor),
        Step::Settle,
        publish(MeasurementKind::MaintenanceMode, maintenance),
        Step::Settle,
    ]
}

fn scenario(name: &str, description: &str, expect: Expectation, steps: Vec<Step>) -> Scenario {
    Scenario {
        name: name.to_owned(),
        description: description.to_owned(),
        expect,
        steps,
    }
}

/// The motor-overheat rule matrix.
pub fn motor_overheat_catalog() -> Vec<Scenario> {
    use MeasurementKind::{MaintenanceMode, MotorOverheated};

    let simple = |motor: u8, maintenance: u8| {
        let mut steps = preconditions(motor, maintenance);
        steps.push(trigger_once(MotorOverheated));
        steps.push(Step::AwaitAlarm);
        steps
    };
    let late_change = |motor: u8, maintenance: u8, late_maintenance: u8| {
        let mut steps = preconditions(motor, maintenance);
        steps.push(trigger_once(MotorOverheated));
        steps.push(Step::Settle);
        steps.push(publish(MaintenanceMode, late_maintenance));
        steps.push(Step::AwaitAlarm);
        steps
    };
    let repeated = {
        let mut steps = preconditions(1, 0);
        steps.push(Step::Trigger {
            kind: MotorOverheated,
            value: 1,
            repeat: 3,
            gap_ms: 500,
        });
        steps.push(Step::AwaitAlarm);
        steps
    };

    vec![
        scenario(
            "m1_ma0_oh1_alarm_expected",
            "Motor on, maintenance off, overheated: alarm expected",
            Expectation::Alarm,
            simple(1, 0),
        ),
        scenario(
            "m0_ma0_oh1_no_alarm",
            "Motor off, maintenance off, overheated: no alarm",
            Expectation::NoAlarm,
            simple(0, 0),
        ),
        scenario(
            "m1_ma1_oh1_no_alarm",
            "Motor on, maintenance on, overheated: no alarm",
            Expectation::NoAlarm,
            simple(1, 1),
        ),
        scenario(
            "m1_ma0_oh1_then_ma1_no_alarm",
            "Overheat triggered, then maintenance switched on before the alarm fires: no alarm",
            Expectation::NoAlarm,
            late_change(1, 0, 1),
        ),
        scenario(
            "m1_ma0_oh1_multiple_signals_alarm_expected",
            "Three overheat signals 500 ms apart: alarm expected, timed from the first",
            Expectation::Alarm,
            repeated,
        ),
        scenario(
            "m0_ma1_oh1_no_alarm",
            "Motor off, maintenance on, overheated: no alarm",
            Expectation::NoAlarm,
            simple(0, 1),
        ),
        scenario(
            "m1_ma1_oh1_then_ma0_no_alarm",
            "Overheat during maintenance, maintenance switched off afterwards: no alarm",
            Expectation::NoAlarm,
            late_change(1, 1, 0),
        ),
    ]
}

/// Pick scenarios from `available` by name, preserving the requested order.
pub fn select(available: &[Scenario], names: &[String]) -> Result<Vec<Scenario>> {
    if names.is_empty() {
        return Ok(available.to_vec());
    }
    names
        .iter()
        .map(|name| {
            available
                .iter()
                .find(|scenario| &scenario.name == name)
                .cloned()
                .ok_or_else(|| HarnessError::UnknownScenario(name.clone()))
        })
        .collect()
}
