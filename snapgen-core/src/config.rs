//! Configuration for the rotation engine.
//!
//! There is no configuration file: every instance declares its own retention
//! through tags. This struct only makes the fixed reference points of a run
//! explicit (tag keys, the date-stamp timezone, the fan-out bound) so they
//! can be validated and pinned in tests.

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::{Result, RotateError};

/// Tag key carrying the per-instance generation count.
pub const DECLARATION_TAG: &str = "Snapshot-Generation";

/// Tag key marking snapshots owned by the rotation automation.
pub const MARKER_TAG: &str = "Auto-Snapshot";

/// Value of the managed-marker tag.
pub const MARKER_VALUE: &str = "true";

/// Tag key holding the human-readable instance name.
pub const NAME_TAG: &str = "Name";

/// Reference timezone offset for the date suffix (UTC+9).
pub const DEFAULT_UTC_OFFSET_SECS: i32 = 9 * 3600;

/// Default bound on concurrent provider calls within one phase.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 4;

/// Fixed reference values for one rotation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationConfig {
    /// Tag key declaring the retention generation count
    pub declaration_tag: String,

    /// Tag key whose value seeds the snapshot name
    pub name_tag: String,

    /// Managed-marker tag key applied to every snapshot the engine creates
    pub marker_tag: String,

    /// Managed-marker tag value
    pub marker_value: String,

    /// Fixed UTC offset, in seconds, used to compute the run date stamp
    pub utc_offset_secs: i32,

    /// Upper bound on concurrent provider calls within one phase
    pub max_in_flight: usize,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            declaration_tag: DECLARATION_TAG.to_string(),
            name_tag: NAME_TAG.to_string(),
            marker_tag: MARKER_TAG.to_string(),
            marker_value: MARKER_VALUE.to_string(),
            utc_offset_secs: DEFAULT_UTC_OFFSET_SECS,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

impl RotationConfig {
    /// Override the declaration tag key
    pub fn with_declaration_tag<S: Into<String>>(mut self, key: S) -> Self {
        self.declaration_tag = key.into();
        self
    }

    /// Override the managed-marker tag
    pub fn with_marker_tag<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.marker_tag = key.into();
        self.marker_value = value.into();
        self
    }

    /// Override the reference timezone offset
    pub fn with_utc_offset_secs(mut self, secs: i32) -> Self {
        self.utc_offset_secs = secs;
        self
    }

    /// Override the per-phase concurrency bound
    pub fn with_max_in_flight(mut self, limit: usize) -> Self {
        self.max_in_flight = limit;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.declaration_tag.is_empty()
            || self.name_tag.is_empty()
            || self.marker_tag.is_empty()
        {
            return Err(RotateError::config("tag keys must not be empty"));
        }
        if self.marker_value.is_empty() {
            return Err(RotateError::config("marker tag value must not be empty"));
        }
        if self.max_in_flight == 0 {
            return Err(RotateError::config("max_in_flight must be at least 1"));
        }
        if FixedOffset::east_opt(self.utc_offset_secs).is_none() {
            return Err(RotateError::config(format!(
                "utc offset {} seconds is out of range",
                self.utc_offset_secs
            )));
        }
        Ok(())
    }

    /// Date stamp (`YYYYMMDD`) for a run starting at `now`, rendered in the
    /// fixed reference timezone. Computed once per run so every snapshot of
    /// the run shares the same suffix.
    pub fn date_stamp(&self, now: DateTime<Utc>) -> String {
        let tz = FixedOffset::east_opt(self.utc_offset_secs).unwrap_or_else(|| Utc.fix());
        now.with_timezone(&tz).format("%Y%m%d").to_string()
    }
}
