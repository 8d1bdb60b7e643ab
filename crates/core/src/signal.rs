//! Queued events considered by one pipeline invocation.

use crate::recommendation::TargetKind;
use crate::snapshot::CheckInKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    /// The user's morning check-in window opened.
    MorningWindowStart,
    /// The user's evening check-in window opened.
    EveningWindowStart,
    TaskUpdated,
    TaskCompleted,
    HabitLogged,
    HabitMissed,
    CheckInRecorded,
    MetricObserved,
    GoalUpdated,
    ProjectUpdated,
    /// Periodic sweep with no specific target.
    ScheduledSweep,
}

impl SignalType {
    /// The check-in a window-start signal asks for.
    pub fn check_in_kind(self) -> Option<CheckInKind> {
        match self {
            SignalType::MorningWindowStart => Some(CheckInKind::Morning),
            SignalType::EveningWindowStart => Some(CheckInKind::Evening),
            _ => None,
        }
    }
}

/// One queued event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalEntry {
    pub id: String,
    pub signal_type: SignalType,
    /// Lower is more urgent.
    #[serde(default)]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_kind: Option<TargetKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl SignalEntry {
    pub fn new(id: impl Into<String>, signal_type: SignalType, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            signal_type,
            priority: 0,
            target_kind: None,
            target_entity_id: None,
            window_start: None,
            window_end: None,
            created_at,
        }
    }

    pub fn targeting(mut self, kind: TargetKind, id: impl Into<String>) -> Self {
        self.target_kind = Some(kind);
        self.target_entity_id = Some(id.into());
        self
    }

    pub fn targets(&self, kind: TargetKind, id: &str) -> bool {
        self.target_kind == Some(kind) && self.target_entity_id.as_deref() == Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_signals_map_to_check_in_kind() {
        assert_eq!(
            SignalType::MorningWindowStart.check_in_kind(),
            Some(CheckInKind::Morning)
        );
        assert_eq!(
            SignalType::EveningWindowStart.check_in_kind(),
            Some(CheckInKind::Evening)
        );
        assert_eq!(SignalType::TaskUpdated.check_in_kind(), None);
    }

    #[test]
    fn signal_parses_snake_case_type() {
        let signal: SignalEntry = serde_json::from_value(serde_json::json!({
            "id": "s1",
            "signal_type": "morning_window_start",
            "created_at": "2026-03-10T07:00:00Z"
        }))
        .unwrap();
        assert_eq!(signal.signal_type, SignalType::MorningWindowStart);
        assert_eq!(signal.priority, 0);
    }
}
