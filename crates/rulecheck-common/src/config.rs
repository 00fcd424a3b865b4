//! ---
//! rc_section: "01-core-functionality"
//! rc_subsection: "module"
//! rc_type: "source"
//! rc_scope: "code"
//! rc_description: "Harness configuration model, loading and validation."
//! rc_version: "v0.1.0"
//! rc_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds, DurationSecondsWithFrac};
use tracing::debug;

use crate::logging::LogFormat;

fn default_port() -> u16 {
    8883
}

fn default_publish_topic() -> String {
    "s/us".to_owned()
}

fn default_qos() -> u8 {
    1
}

fn default_tls_insecure() -> bool {
    true
}

fn default_keep_alive() -> Duration {
    Duration::from_secs(30)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_request_capacity() -> usize {
    64
}

fn default_wait_between_commands() -> Duration {
    Duration::from_secs(2)
}

fn default_wait_for_alarm() -> Duration {
    Duration::from_secs(10)
}

fn default_alarm_receive_timeout() -> Duration {
    Duration::from_millis(500)
}

fn default_fragment() -> String {
    "MotorOverheat".to_owned()
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

fn default_file_enabled() -> bool {
    true
}

fn default_response_delay() -> Duration {
    Duration::from_secs(3)
}

/// Top-level configuration for a harness run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarnessConfig {
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub scenario: ScenarioConfig,
    /// Fragment/series overrides keyed by measurement kind (`motor-state`, ...).
    #[serde(default)]
    pub measurements: IndexMap<String, SeriesBinding>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Metadata describing where a [`HarnessConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: HarnessConfig,
    /// `None` when no file was found and defaults were used.
    pub source: Option<PathBuf>,
}

impl HarnessConfig {
    pub const ENV_CONFIG_PATH: &'static str = "RULECHECK_CONFIG";

    /// Load configuration together with the effective source path.
    ///
    /// `RULECHECK_CONFIG` takes precedence over the candidate list. When no
    /// candidate exists the defaults are returned; connection settings are then
    /// expected to arrive through the `MQTT_*` environment variables.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        for candidate in candidates {
            let path = candidate.as_ref();
            if path.exists() {
                let config = Self::from_path(path)?;
                return Ok(LoadedConfig {
                    config,
                    source: Some(path.to_path_buf()),
                });
            }
        }

        debug!("no configuration file found, using defaults");
        Ok(LoadedConfig {
            config: HarnessConfig::default(),
            source: None,
        })
    }

    /// Parse and validate a configuration file.
    pub fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<HarnessConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `MQTT_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply `MQTT_*` overrides resolved through `lookup`.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mqtt = &mut self.mqtt;
        if let Some(value) = lookup("MQTT_CLIENT_ID") {
            mqtt.client_id = Some(value);
        }
        if let Some(value) = lookup("MQTT_HOST") {
            mqtt.host = Some(value);
        }
        if let Some(value) = lookup("MQTT_PORT") {
            mqtt.port = value
                .trim()
                .parse()
                .with_context(|| format!("MQTT_PORT is not a valid port: {value}"))?;
        }
        if let Some(value) = lookup("MQTT_TOPICS") {
            mqtt.topics = split_topics(&value);
        }
        if let Some(value) = lookup("MQTT_CA_CERTS") {
            mqtt.ca_certs = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup("MQTT_CERTFILE") {
            mqtt.certfile = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup("MQTT_KEYFILE") {
            mqtt.keyfile = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup("MQTT_TLS_INSECURE") {
            mqtt.tls_insecure = value.trim().eq_ignore_ascii_case("true");
        }
        Ok(())
    }

    /// Resolve the fragment/series pair used on the wire for a measurement kind.
    pub fn series_binding(&self, kind: &str) -> SeriesBinding {
        self.measurements
            .get(kind)
            .cloned()
            .unwrap_or_else(|| SeriesBinding::same(kind))
    }

    /// Validate structural invariants that do not depend on the run mode.
    pub fn validate(&self) -> Result<()> {
        self.scenario.validate()?;
        if self.mqtt.qos > 2 {
            return Err(anyhow!("mqtt.qos must be 0, 1 or 2 (got {})", self.mqtt.qos));
        }
        if self.mqtt.publish_topic.trim().is_empty() {
            return Err(anyhow!("mqtt.publish_topic cannot be empty"));
        }
        if self.mqtt.keep_alive < Duration::from_secs(5) {
            return Err(anyhow!(
                "mqtt.keep_alive must be at least 5 seconds (got {:?})",
                self.mqtt.keep_alive
            ));
        }
        for (kind, binding) in &self.measurements {
            if binding.fragment.trim().is_empty() || binding.series.trim().is_empty() {
                return Err(anyhow!(
                    "measurement '{}' must declare a non-empty fragment and series",
                    kind
                ));
            }
        }
        Ok(())
    }
}

impl std::str::FromStr for HarnessConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: HarnessConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

fn split_topics(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|topic| !topic.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Broker connection parameters.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Must match the common name of the client certificate.
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Topics subscribed for inbound operations and errors.
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default = "default_publish_topic")]
    pub publish_topic: String,
    #[serde(default = "default_qos")]
    pub qos: u8,
    #[serde(default)]
    pub ca_certs: Option<PathBuf>,
    #[serde(default)]
    pub certfile: Option<PathBuf>,
    #[serde(default)]
    pub keyfile: Option<PathBuf>,
    /// Skip server certificate verification.
    #[serde(default = "default_tls_insecure")]
    pub tls_insecure: bool,
    #[serde(default = "default_keep_alive")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub keep_alive: Duration,
    #[serde(default = "default_connect_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub connect_timeout: Duration,
    #[serde(default = "default_request_capacity")]
    pub request_capacity: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            host: None,
            port: default_port(),
            topics: Vec::new(),
            publish_topic: default_publish_topic(),
            qos: default_qos(),
            ca_certs: None,
            certfile: None,
            keyfile: None,
            tls_insecure: default_tls_insecure(),
            keep_alive: default_keep_alive(),
            connect_timeout: default_connect_timeout(),
            request_capacity: default_request_capacity(),
        }
    }
}

impl MqttConfig {
    /// Names of the connection settings that are required for a live run but missing.
    pub fn missing_keys(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.client_id.as_deref().map_or(true, |v| v.trim().is_empty()) {
            missing.push("client_id");
        }
        if self.host.as_deref().map_or(true, |v| v.trim().is_empty()) {
            missing.push("host");
        }
        if self.topics.is_empty() {
            missing.push("topics");
        }
        if self.ca_certs.is_none() && !self.tls_insecure {
            missing.push("ca_certs");
        }
        if self.certfile.is_none() {
            missing.push("certfile");
        }
        if self.keyfile.is_none() {
            missing.push("keyfile");
        }
        missing
    }

    /// Validate that every setting needed to reach a real broker is present.
    pub fn validate_connection(&self) -> Result<()> {
        let missing = self.missing_keys();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(anyhow!(
                "Missing required MQTT configuration: {}",
                missing.join(", ")
            ))
        }
    }
}

/// How an alarm that arrives before `alarm_receive_timeout` is judged.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum EarlyAlarmPolicy {
    /// Treat the arrival as a leftover record and fail the scenario.
    #[default]
    Fail,
    /// Accept the alarm but flag the verdict as qualified.
    QualifiedPass,
}

/// Timing windows and correlation keys of a scenario run.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    #[serde(default = "default_wait_between_commands")]
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub wait_between_commands: Duration,
    /// Upper bound of the alarm window and the post-trigger sleep.
    #[serde(default = "default_wait_for_alarm")]
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub wait_for_alarm: Duration,
    /// Lower bound of a plausible response time.
    #[serde(default = "default_alarm_receive_timeout")]
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub alarm_receive_timeout: Duration,
    #[serde(default = "default_fragment")]
    pub operation_fragment: String,
    #[serde(default = "default_fragment")]
    pub alarm_type: String,
    #[serde(default)]
    pub early_alarm: EarlyAlarmPolicy,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            wait_between_commands: default_wait_between_commands(),
            wait_for_alarm: default_wait_for_alarm(),
            alarm_receive_timeout: default_alarm_receive_timeout(),
            operation_fragment: default_fragment(),
            alarm_type: default_fragment(),
            early_alarm: EarlyAlarmPolicy::default(),
        }
    }
}

impl ScenarioConfig {
    pub fn validate(&self) -> Result<()> {
        if self.operation_fragment.trim().is_empty() {
            return Err(anyhow!("scenario.operation_fragment cannot be empty"));
        }
        if self.alarm_type.trim().is_empty() {
            return Err(anyhow!("scenario.alarm_type cannot be empty"));
        }
        if self.wait_for_alarm.is_zero() {
            return Err(anyhow!("scenario.wait_for_alarm must be greater than zero"));
        }
        if self.alarm_receive_timeout >= self.wait_for_alarm {
            return Err(anyhow!(
                "scenario.alarm_receive_timeout ({:.3}s) must be below wait_for_alarm ({:.3}s)",
                self.alarm_receive_timeout.as_secs_f64(),
                self.wait_for_alarm.as_secs_f64()
            ));
        }
        Ok(())
    }
}

/// Fragment and series names of one measurement on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeriesBinding {
    pub fragment: String,
    pub series: String,
}

impl SeriesBinding {
    /// Binding whose fragment and series both equal `name`.
    pub fn same(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            fragment: name.clone(),
            series: name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
    #[serde(default = "default_file_enabled")]
    pub file_enabled: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
            file_enabled: default_file_enabled(),
        }
    }
}

/// Behaviour of the in-process platform used by `--simulate`.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Delay between a qualifying overheat signal and the raised alarm.
    #[serde(default = "default_response_delay")]
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub response_delay: Duration,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            response_delay: default_response_delay(),
        }
    }
}
