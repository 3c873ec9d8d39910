//! Weekly schedule overrides
//!
//! Editors can cancel, move or replace entries of one week, or inject a
//! one-off special program. An override is ephemeral: it targets a single
//! week and self-expires at the next week boundary. The stored shape is
//! versioned; legacy records are upgraded once on read.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::DayOfWeek;

/// What the override targets
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum OverrideScope {
    /// A single schedule entry
    Schedule(Uuid),
    /// Every entry of a program in the target week. Takes precedence over
    /// schedule-scope overrides touching the same entries.
    Program(Uuid),
    /// No existing target; only valid for create-type overrides
    None,
}

impl OverrideScope {
    /// Stable key used for deterministic ids and store keys
    pub fn key(&self) -> String {
        match self {
            OverrideScope::Schedule(id) => format!("schedule:{id}"),
            OverrideScope::Program(id) => format!("program:{id}"),
            OverrideScope::None => "create".to_string(),
        }
    }
}

/// Override semantics, keyed by type
///
/// Each variant carries only the fields relevant to it, so an override can
/// never be stored with a half-filled mixture of shapes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OverrideAction {
    /// Drop the targeted entries for the week
    Cancel,
    /// Rewrite start/end on the same day
    TimeChange {
        new_start: NaiveTime,
        new_end: NaiveTime,
    },
    /// Rewrite start/end and move to another day
    Reschedule {
        new_start: NaiveTime,
        new_end: NaiveTime,
        new_day: DayOfWeek,
    },
    /// Inject a one-off entry with a virtual program
    Create {
        new_start: NaiveTime,
        new_end: NaiveTime,
        new_day: DayOfWeek,
        channel_id: Uuid,
        program: VirtualProgramSpec,
    },
}

impl OverrideAction {
    pub fn type_name(&self) -> &'static str {
        match self {
            OverrideAction::Cancel => "cancel",
            OverrideAction::TimeChange { .. } => "time_change",
            OverrideAction::Reschedule { .. } => "reschedule",
            OverrideAction::Create { .. } => "create",
        }
    }
}

/// Descriptor for the program of a create-type override
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VirtualProgramSpec {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

fn default_visible() -> bool {
    true
}

/// Denormalized channel fields for fast reads without a source join
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelSnapshot {
    pub id: Uuid,
    pub name: String,
    pub handle: String,
}

/// Denormalized panelist fields for fast reads without a source join
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PanelistSnapshot {
    pub id: Uuid,
    pub name: String,
}

/// One ad-hoc override of the weekly schedule
///
/// The id is deterministic over scope + target week, so at most one override
/// can exist per scope per week; recreating one is a conflict, not a
/// duplicate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeeklyOverride {
    pub id: Uuid,
    /// Monday of the target week
    pub week_start: NaiveDate,
    pub scope: OverrideScope,
    pub action: OverrideAction,
    #[serde(default)]
    pub channel_snapshot: Option<ChannelSnapshot>,
    #[serde(default)]
    pub panelist_snapshots: Vec<PanelistSnapshot>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WeeklyOverride {
    /// Instant past which the override is dead weight: the next week boundary
    pub fn expires_on(&self) -> NaiveDate {
        self.week_start + chrono::Duration::days(7)
    }

    pub fn is_expired(&self, today: NaiveDate) -> bool {
        today >= self.expires_on()
    }
}

/// Override type as named by the management surface
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverrideType {
    Cancel,
    TimeChange,
    Reschedule,
    Create,
}

/// Incoming create/update request, validated before persistence
#[derive(Debug, Clone, Deserialize)]
pub struct OverrideRequest {
    pub override_type: OverrideType,
    /// Monday of the target week
    pub week_start: NaiveDate,
    #[serde(default)]
    pub schedule_id: Option<Uuid>,
    #[serde(default)]
    pub program_id: Option<Uuid>,
    /// Target channel; required for create-type requests
    #[serde(default)]
    pub channel_id: Option<Uuid>,
    /// "HH:MM[:SS]"
    #[serde(default)]
    pub new_start: Option<String>,
    #[serde(default)]
    pub new_end: Option<String>,
    #[serde(default)]
    pub new_day: Option<String>,
    #[serde(default)]
    pub virtual_program: Option<VirtualProgramSpec>,
}
