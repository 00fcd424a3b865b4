//! ---
//! rc_section: "01-core-functionality"
//! rc_subsection: "module"
//! rc_type: "source"
//! rc_scope: "code"
//! rc_description: "Epoch conversion helpers and injectable wall clocks."
//! rc_version: "v0.1.0"
//! rc_owner: "tbd"
//! ---
use std::fmt::Debug;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use thiserror::Error;

/// Raised when a platform timestamp cannot be interpreted.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unrecognised ISO-8601 timestamp '{0}'")]
pub struct TimeParseError(pub String);

/// Convert a UTC date-time into fractional seconds since the Unix epoch.
pub fn epoch_seconds(time: DateTime<Utc>) -> f64 {
    time.timestamp() as f64 + f64::from(time.timestamp_subsec_nanos()) / 1_000_000_000.0
}

/// Parse an ISO-8601 timestamp into epoch seconds.
///
/// Offsets are honoured; a timestamp without offset is taken as UTC.
pub fn parse_iso8601(raw: &str) -> Result<f64, TimeParseError> {
    let trimmed = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(epoch_seconds(parsed.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| epoch_seconds(naive.and_utc()))
        .map_err(|_| TimeParseError(raw.to_owned()))
}

/// Render epoch seconds as an RFC 3339 string with millisecond precision.
pub fn format_epoch(epoch: f64) -> String {
    let millis = (epoch * 1000.0).round() as i64;
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|time| time.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| format!("{epoch:.3}"))
}

/// Source of wall-clock time expressed as epoch seconds.
pub trait Clock: Send + Sync + Debug {
    fn now_epoch(&self) -> f64;
}

/// Reads the host clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch(&self) -> f64 {
        epoch_seconds(Utc::now())
    }
}

/// Wall clock that advances with the tokio timer instead of the host clock.
///
/// Under a paused test runtime it moves exactly as far as the runtime's virtual
/// time, which keeps epoch arithmetic consistent with `tokio::time::sleep`.
#[derive(Debug, Clone)]
pub struct AnchoredClock {
    epoch: f64,
    anchor: tokio::time::Instant,
}

impl AnchoredClock {
    pub fn new(epoch: f64) -> Self {
        Self {
            epoch,
            anchor: tokio::time::Instant::now(),
        }
    }

    /// Anchor at the current host time.
    pub fn starting_now() -> Self {
        Self::new(SystemClock.now_epoch())
    }
}

impl Clock for AnchoredClock {
    fn now_epoch(&self) -> f64 {
        self.epoch + self.anchor.elapsed().as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn parses_zulu_and_offset_timestamps() {
        let zulu = parse_iso8601("2024-03-01T10:00:00.250Z").expect("zulu");
        let offset = parse_iso8601("2024-03-01T11:00:00.250+01:00").expect("offset");
        assert!((zulu - offset).abs() < 1e-9);
        assert!((zulu - 1_709_287_200.25).abs() < 1e-6);
    }

    #[test]
    fn naive_timestamps_are_utc() {
        let naive = parse_iso8601("2024-03-01T10:00:00").expect("naive");
        assert!((naive - 1_709_287_200.0).abs() < 1e-6);
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(
            parse_iso8601("yesterday"),
            Err(TimeParseError("yesterday".into()))
        );
    }

    #[test]
    fn format_round_trips_through_parse() {
        let epoch = 1_709_287_200.125;
        let rendered = format_epoch(epoch);
        assert_eq!(rendered, "2024-03-01T10:00:00.125Z");
        assert!((parse_iso8601(&rendered).unwrap() - epoch).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn anchored_clock_follows_virtual_time() {
        let clock = AnchoredClock::new(1_000.0);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!((clock.now_epoch() - 1_001.5).abs() < 1e-3);
    }
}
