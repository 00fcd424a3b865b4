//! ---
//! rc_section: "04-core"
//! rc_subsection: "module"
//! rc_type: "source"
//! rc_scope: "code"
//! rc_description: "Error taxonomy of the scenario engine."
//! rc_version: "v0.1.0"
//! rc_owner: "tbd"
//! ---
use std::path::PathBuf;

use rulecheck_msg::MessagingError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, HarnessError>;

/// Failures that stop a scenario run.
///
/// Assertion failures are not errors; they are reported as a failed
/// [`Verdict`](crate::driver::Verdict) and the batch continues.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Transport or connection failure. Fatal to the whole batch.
    #[error("transport failure: {0}")]
    Transport(#[from] MessagingError),
    #[error("invalid scenario '{name}': {reason}")]
    InvalidScenario { name: String, reason: String },
    #[error("unknown scenario '{0}'")]
    UnknownScenario(String),
    #[error("failed to read scenario file {path}: {source}")]
    ScenarioIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse scenario file {path}: {source}")]
    ScenarioParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("failed to encode report: {0}")]
    Report(#[from] serde_json::Error),
}

impl HarnessError {
    pub(crate) fn invalid(name: &str, reason: impl Into<String>) -> Self {
        HarnessError::InvalidScenario {
            name: name.to_owned(),
            reason: reason.into(),
        }
    }
}
