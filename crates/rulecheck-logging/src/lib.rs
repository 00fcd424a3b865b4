//! ---
//! rc_section: "03-logging"
//! rc_subsection: "module"
//! rc_type: "source"
//! rc_scope: "code"
//! rc_description: "Structured logging context for scenario execution."
//! rc_version: "v0.1.0"
//! rc_owner: "tbd"
//! ---
#![warn(missing_docs)]

pub mod macros;

/// Structured logging context propagated by the convenience macros.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogContext<'a> {
    /// Scenario currently executing.
    pub scenario: Option<&'a str>,
    /// Operation fragment the scenario correlates on.
    pub fragment: Option<&'a str>,
    /// Driver phase (`setup`, `triggered`, ...).
    pub phase: Option<&'a str>,
}

impl<'a> LogContext<'a> {
    /// Create an empty logging context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a scenario name.
    pub fn with_scenario(mut self, scenario: &'a str) -> Self {
        self.scenario = Some(scenario);
        self
    }

    /// Attach an operation fragment.
    pub fn with_fragment(mut self, fragment: &'a str) -> Self {
        self.fragment = Some(fragment);
        self
    }

    /// Attach a driver phase.
    pub fn with_phase(mut self, phase: &'a str) -> Self {
        self.phase = Some(phase);
        self
    }
}

/// Outcome attached to scenario lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioEventOutcome {
    /// The scenario met its expectation.
    Success,
    /// The scenario passed with a caveat.
    Qualified,
    /// The scenario failed its assertion.
    Fault,
}

impl ScenarioEventOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            ScenarioEventOutcome::Success => "success",
            ScenarioEventOutcome::Qualified => "qualified",
            ScenarioEventOutcome::Fault => "fault",
        }
    }
}

/// Emit a standardized scenario event; faults are logged at error level.
pub fn log_scenario_event(
    context: Option<&LogContext>,
    event: &str,
    message: &str,
    outcome: ScenarioEventOutcome,
) {
    let ctx = context.copied().unwrap_or_default();
    match outcome {
        ScenarioEventOutcome::Success => tracing::info!(
            event = %event,
            outcome = outcome.as_str(),
            scenario = ctx.scenario.unwrap_or(""),
            fragment = ctx.fragment.unwrap_or(""),
            message = %message
        ),
        ScenarioEventOutcome::Qualified => tracing::warn!(
            event = %event,
            outcome = outcome.as_str(),
            scenario = ctx.scenario.unwrap_or(""),
            fragment = ctx.fragment.unwrap_or(""),
            message = %message
        ),
        ScenarioEventOutcome::Fault => tracing::error!(
            event = %event,
            outcome = outcome.as_str(),
            scenario = ctx.scenario.unwrap_or(""),
            fragment = ctx.fragment.unwrap_or(""),
            message = %message
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macros_emit_without_panic() {
        let ctx = LogContext::new()
            .with_scenario("m1_ma0_oh1_alarm_expected")
            .with_fragment("MotorOverheat")
            .with_phase("setup");
        rc_info!(context = ctx, "publishing preconditions");
        rc_debug!("debug message");
        rc_warn!(context = ctx, "late record after {}s", 1.5);
        rc_error!(context = ctx, "error code: {}", 42);
    }

    #[test]
    fn scenario_event_helper_emits() {
        let ctx = LogContext::new().with_scenario("m0_ma0_oh1_no_alarm");
        log_scenario_event(
            Some(&ctx),
            "scenario.verified",
            "No alarm received",
            ScenarioEventOutcome::Success,
        );
        log_scenario_event(
            None,
            "scenario.verified",
            "Alarm NOT received",
            ScenarioEventOutcome::Fault,
        );
    }
}
