//! ---
//! rc_section: "02-messaging"
//! rc_subsection: "module"
//! rc_type: "source"
//! rc_scope: "code"
//! rc_description: "SmartREST frame model, measurement kinds and inbound envelopes."
//! rc_version: "v0.1.0"
//! rc_owner: "tbd"
//! ---
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use bytes::Bytes;
use rulecheck_common::config::SeriesBinding;
use serde::{Deserialize, Serialize};

use crate::{MessagingError, Result};

/// Template id of a measurement frame.
pub const MEASUREMENT_TEMPLATE: u16 = 200;
/// Template id clearing an active alarm by type.
pub const CLEAR_ALARM_TEMPLATE: u16 = 306;
/// Template id moving an operation to EXECUTING.
pub const OPERATION_EXECUTING_TEMPLATE: u16 = 501;
/// Template id moving an operation to FAILED.
pub const OPERATION_FAILED_TEMPLATE: u16 = 502;
/// Template id moving an operation to SUCCESSFUL.
pub const OPERATION_SUCCESSFUL_TEMPLATE: u16 = 503;

/// Trailing unit marker of every measurement frame.
pub const MEASUREMENT_UNIT: &str = "state";

/// Sensor signals the harness can inject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MeasurementKind {
    MotorState,
    MaintenanceMode,
    MotorOverheated,
}

impl MeasurementKind {
    pub const ALL: [MeasurementKind; 3] = [
        MeasurementKind::MotorState,
        MeasurementKind::MaintenanceMode,
        MeasurementKind::MotorOverheated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MeasurementKind::MotorState => "motor-state",
            MeasurementKind::MaintenanceMode => "maintenance-mode",
            MeasurementKind::MotorOverheated => "motor-overheated",
        }
    }
}

impl fmt::Display for MeasurementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MeasurementKind {
    type Err = MessagingError;

    fn from_str(s: &str) -> Result<Self> {
        MeasurementKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s.trim())
            .ok_or_else(|| MessagingError::UnknownKind(s.to_owned()))
    }
}

/// A boolean sensor sample; `value` is always 0 or 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measurement {
    pub kind: MeasurementKind,
    pub value: u8,
}

impl Measurement {
    pub fn new(kind: MeasurementKind, value: i64) -> Result<Self> {
        match value {
            0 | 1 => Ok(Self {
                kind,
                value: value as u8,
            }),
            other => Err(MessagingError::InvalidValue {
                kind: kind.as_str(),
                value: other,
            }),
        }
    }

    /// Build the wire frame using the given fragment/series names.
    pub fn frame(&self, binding: &SeriesBinding) -> SmartRestFrame {
        SmartRestFrame::Measurement {
            fragment: binding.fragment.clone(),
            series: binding.series.clone(),
            value: i64::from(self.value),
        }
    }
}

/// Outbound comma-separated frames understood by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmartRestFrame {
    Measurement {
        fragment: String,
        series: String,
        value: i64,
    },
    ClearAlarm {
        alarm_type: String,
    },
    OperationExecuting {
        fragment: String,
    },
    OperationFailed {
        fragment: String,
        reason: String,
    },
    OperationSuccessful {
        fragment: String,
    },
}

impl SmartRestFrame {
    pub fn template(&self) -> u16 {
        match self {
            SmartRestFrame::Measurement { .. } => MEASUREMENT_TEMPLATE,
            SmartRestFrame::ClearAlarm { .. } => CLEAR_ALARM_TEMPLATE,
            SmartRestFrame::OperationExecuting { .. } => OPERATION_EXECUTING_TEMPLATE,
            SmartRestFrame::OperationFailed { .. } => OPERATION_FAILED_TEMPLATE,
            SmartRestFrame::OperationSuccessful { .. } => OPERATION_SUCCESSFUL_TEMPLATE,
        }
    }

    /// Encode the frame as a single line, quoting fields that contain separators.
    pub fn encode(&self) -> String {
        let template = self.template().to_string();
        let fields: Vec<String> = match self {
            SmartRestFrame::Measurement {
                fragment,
                series,
                value,
            } => vec![
                template,
                quote_field(fragment),
                quote_field(series),
                value.to_string(),
                MEASUREMENT_UNIT.to_owned(),
            ],
            SmartRestFrame::ClearAlarm { alarm_type } => vec![template, quote_field(alarm_type)],
            SmartRestFrame::OperationExecuting { fragment }
            | SmartRestFrame::OperationSuccessful { fragment } => {
                vec![template, quote_field(fragment)]
            }
            SmartRestFrame::OperationFailed { fragment, reason } => {
                vec![template, quote_field(fragment), quote_field(reason)]
            }
        };
        fields.join(",")
    }

    /// Parse a single frame line. A measurement's trailing unit is optional.
    pub fn parse(line: &str) -> Result<Self> {
        let fields = split_fields(line)?;
        let malformed = || MessagingError::MalformedFrame(line.to_owned());
        let template: u16 = fields
            .first()
            .and_then(|raw| raw.trim().parse().ok())
            .ok_or_else(malformed)?;
        let frame = match (template, fields.len()) {
            (MEASUREMENT_TEMPLATE, 4 | 5) => SmartRestFrame::Measurement {
                fragment: fields[1].clone(),
                series: fields[2].clone(),
                value: fields[3].trim().parse().map_err(|_| malformed())?,
            },
            (CLEAR_ALARM_TEMPLATE, 2) => SmartRestFrame::ClearAlarm {
                alarm_type: fields[1].clone(),
            },
            (OPERATION_EXECUTING_TEMPLATE, 2) => SmartRestFrame::OperationExecuting {
                fragment: fields[1].clone(),
            },
            (OPERATION_FAILED_TEMPLATE, 3) => SmartRestFrame::OperationFailed {
                fragment: fields[1].clone(),
                reason: fields[2].clone(),
            },
            (OPERATION_SUCCESSFUL_TEMPLATE, 2) => SmartRestFrame::OperationSuccessful {
                fragment: fields[1].clone(),
            },
            _ => return Err(malformed()),
        };
        Ok(frame)
    }
}

impl fmt::Display for SmartRestFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

fn quote_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_owned()
    }
}

fn split_fields(line: &str) -> Result<Vec<String>> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = line.trim_end_matches(['\r', '\n']).chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if quoted && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' if quoted => quoted = false,
            '"' if current.is_empty() => quoted = true,
            ',' if !quoted => fields.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    if quoted {
        return Err(MessagingError::MalformedFrame(line.to_owned()));
    }
    fields.push(current);
    Ok(fields)
}

/// Raw message delivered by a transport's background task.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
    pub received_at: Instant,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            received_at: Instant::now(),
        }
    }
}
