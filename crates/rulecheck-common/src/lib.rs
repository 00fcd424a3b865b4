//! ---
//! rc_section: "01-core-functionality"
//! rc_subsection: "module"
//! rc_type: "source"
//! rc_scope: "code"
//! rc_description: "Shared primitives and utilities for the harness crates."
//! rc_version: "v0.1.0"
//! rc_owner: "tbd"
//! ---
//! Shared primitives for the rulecheck workspace: configuration loading,
//! tracing setup and the clocks used for response-time arithmetic.

pub mod config;
pub mod logging;
pub mod time;

pub use config::{
    EarlyAlarmPolicy, HarnessConfig, LoadedConfig, LoggingConfig, MqttConfig, ScenarioConfig,
    SeriesBinding, SimulationConfig,
};
pub use logging::{init_tracing, LogFormat};
pub use time::{AnchoredClock, Clock, SystemClock, TimeParseError};
