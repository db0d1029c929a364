use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Role a connected user announces in its auth payload.
///
/// The two roles the show cares about get their own variants; anything else
/// is carried through verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UserRole {
    Dj,
    Vj,
    Other(String),
}

impl UserRole {
    pub fn as_str(&self) -> &str {
        match self {
            UserRole::Dj => "DJ",
            UserRole::Vj => "VJ",
            UserRole::Other(s) => s,
        }
    }
}

impl From<String> for UserRole {
    fn from(s: String) -> Self {
        match s.as_str() {
            "DJ" | "dj" => UserRole::Dj,
            "VJ" | "vj" => UserRole::Vj,
            _ => UserRole::Other(s),
        }
    }
}

impl From<UserRole> for String {
    fn from(role: UserRole) -> Self {
        role.as_str().to_string()
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Online/offline state of the catalog synchroniser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMode {
    /// `false` after any failed remote call, until a pull succeeds.
    pub is_online: bool,
    /// Operator override: automatic pulls are suspended while set.
    pub offline_mode: bool,
    /// Completion time of the last successful reconciliation.
    pub last_sync: Option<DateTime<Utc>>,
}

impl Default for SyncMode {
    fn default() -> Self {
        Self {
            is_online: true,
            offline_mode: false,
            last_sync: None,
        }
    }
}

/// Per-event countdown configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSettings {
    pub duration_ms: i64,
    /// Remaining time at which surfaces should flag the countdown.
    #[serde(default)]
    pub warning_ms: Option<u64>,
    /// Start the countdown automatically when one of the event's logos goes on air.
    #[serde(default)]
    pub auto_start: bool,
}

impl TimerSettings {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let duration_ms = validate_duration_ms(self.duration_ms)?;
        if let Some(warning_ms) = self.warning_ms {
            if warning_ms > duration_ms {
                return Err(ValidationError::WarningExceedsDuration {
                    warning_ms,
                    duration_ms,
                });
            }
        }
        Ok(())
    }
}

/// Accept a timer duration in milliseconds. Zero and negative values are rejected.
pub fn validate_duration_ms(ms: i64) -> Result<u64, ValidationError> {
    if ms <= 0 {
        return Err(ValidationError::NonPositiveDuration(ms));
    }
    Ok(ms as u64)
}

/// Coarse playback state as seen by the control surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackPhase {
    Idle,
    Playing,
    TimerRunning,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_known_and_custom_values() {
        let dj: UserRole = serde_json::from_str("\"DJ\"").unwrap();
        assert_eq!(dj, UserRole::Dj);
        assert_eq!(serde_json::to_string(&UserRole::Vj).unwrap(), "\"VJ\"");

        let lj: UserRole = serde_json::from_str("\"LJ\"").unwrap();
        assert_eq!(lj, UserRole::Other("LJ".into()));
        assert_eq!(lj.to_string(), "LJ");
    }

    #[test]
    fn duration_must_be_positive() {
        assert_eq!(validate_duration_ms(5000), Ok(5000));
        assert_eq!(
            validate_duration_ms(0),
            Err(ValidationError::NonPositiveDuration(0))
        );
        assert!(validate_duration_ms(-1).is_err());
    }

    #[test]
    fn warning_cannot_exceed_duration() {
        let settings = TimerSettings {
            duration_ms: 1000,
            warning_ms: Some(2000),
            auto_start: false,
        };
        assert!(matches!(
            settings.validate(),
            Err(ValidationError::WarningExceedsDuration { .. })
        ));
    }
}
