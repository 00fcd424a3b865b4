//! ---
//! rc_section: "01-core-functionality"
//! rc_subsection: "module"
//! rc_type: "source"
//! rc_scope: "code"
//! rc_description: "Tracing subscriber initialisation for harness binaries."
//! rc_version: "v0.1.0"
//! rc_owner: "tbd"
//! ---
//! Tracing setup for `rulecheck` runs.
//!
//! Scenario progress goes to stdout for the operator. Each run can also leave a
//! JSON log under `logging.directory`, one file per day, which keeps the
//! published frames and received alarm documents of a failed scenario around
//! after the console has scrolled away.

use anyhow::Result;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::registry::Registry;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "RULECHECK_LOG";
const DEFAULT_DIRECTIVE: &str = "info";

static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();
static STDOUT_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Console output of a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    /// One JSON object per event, for CI log collectors.
    StructuredJson,
    /// Human-readable lines for interactive runs.
    #[default]
    Pretty,
}

/// Filter from a `RULECHECK_LOG` value, else `RUST_LOG`, else `info`.
///
/// An unparsable `RULECHECK_LOG` falls back to `info` with a note on stderr,
/// since tracing is not up yet.
fn resolve_filter(directive: Option<String>) -> EnvFilter {
    match directive {
        Some(directive) => EnvFilter::try_new(&directive).unwrap_or_else(|err| {
            eprintln!(
                "invalid {LOG_ENV} directive '{directive}' ({err}); using {DEFAULT_DIRECTIVE}"
            );
            EnvFilter::new(DEFAULT_DIRECTIVE)
        }),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE)),
    }
}

fn console_layer(format: LogFormat, writer: NonBlocking) -> BoxedLayer {
    let layer = fmt::layer().with_timer(fmt::time::UtcTime::rfc_3339());
    match format {
        LogFormat::StructuredJson => layer.with_target(false).json().with_writer(writer).boxed(),
        LogFormat::Pretty => layer.with_target(true).with_writer(writer).boxed(),
    }
}

fn run_log_layer(service_name: &str, config: &LoggingConfig) -> Result<Option<BoxedLayer>> {
    if !config.file_enabled {
        return Ok(None);
    }
    std::fs::create_dir_all(&config.directory)?;
    let prefix = config.file_prefix.as_deref().unwrap_or(service_name);
    let (writer, guard) = tracing_appender::non_blocking(daily(
        &config.directory,
        format!("{prefix}.log"),
    ));
    let _ = FILE_GUARD.set(guard);
    Ok(Some(
        fmt::layer()
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .json()
            .with_writer(writer)
            .boxed(),
    ))
}

/// Install the global subscriber for `service_name`.
///
/// Calling it again is harmless: the first subscriber stays installed.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    let filter = resolve_filter(std::env::var(LOG_ENV).ok());
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let _ = STDOUT_GUARD.set(stdout_guard);

    let layers: Vec<BoxedLayer> = std::iter::once(console_layer(config.format, stdout_writer))
        .chain(run_log_layer(service_name, config)?)
        .collect();

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .ok();

    info!(
        service = %service_name,
        log_dir = %config.directory.display(),
        format = ?config.format,
        file = config.file_enabled,
        "tracing initialised"
    );
    Ok(())
}
