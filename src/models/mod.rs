use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod live_status;
pub mod overrides;

pub use live_status::{AttemptTracking, LiveStatusCacheEntry, StreamDescriptor};
pub use overrides::{
    ChannelSnapshot, OverrideAction, OverrideRequest, OverrideScope, OverrideType,
    PanelistSnapshot, VirtualProgramSpec, WeeklyOverride,
};

/// Day of week a schedule entry belongs to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    pub fn from_date(date: NaiveDate) -> Self {
        match date.weekday() {
            Weekday::Mon => DayOfWeek::Monday,
            Weekday::Tue => DayOfWeek::Tuesday,
            Weekday::Wed => DayOfWeek::Wednesday,
            Weekday::Thu => DayOfWeek::Thursday,
            Weekday::Fri => DayOfWeek::Friday,
            Weekday::Sat => DayOfWeek::Saturday,
            Weekday::Sun => DayOfWeek::Sunday,
        }
    }

    /// Parse a lowercase day name, as sent by the override surface
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "monday" => Some(DayOfWeek::Monday),
            "tuesday" => Some(DayOfWeek::Tuesday),
            "wednesday" => Some(DayOfWeek::Wednesday),
            "thursday" => Some(DayOfWeek::Thursday),
            "friday" => Some(DayOfWeek::Friday),
            "saturday" => Some(DayOfWeek::Saturday),
            "sunday" => Some(DayOfWeek::Sunday),
            _ => None,
        }
    }
}

/// Where an effective schedule entry came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Straight from the base schedule
    Base,
    /// Base entry rewritten by a weekly override
    Overridden,
    /// Synthesized from a create-type override
    Virtual,
}

/// One slot of the weekly schedule grid
///
/// Immutable once resolved for a request: the resolver produces a fresh
/// vector of entries, it never rewrites entries in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleEntry {
    pub id: Uuid,
    pub program_id: Uuid,
    pub channel_id: Uuid,
    pub day: DayOfWeek,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub provenance: Provenance,
    /// Program synthesized from a create-type override; absent for entries
    /// whose program lives in the schedule source
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub virtual_program: Option<VirtualProgramSpec>,
}

impl ScheduleEntry {
    /// Whether this entry's interval contains the given local instant.
    ///
    /// Entries whose end is not after their start are treated as running
    /// until the end of the day.
    pub fn is_on_air(&self, day: DayOfWeek, time: NaiveTime) -> bool {
        if self.day != day {
            return false;
        }
        if self.end_time > self.start_time {
            self.start_time <= time && time < self.end_time
        } else {
            self.start_time <= time
        }
    }
}

/// Channel metadata from the schedule source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: Uuid,
    pub name: String,
    /// Stable handle used to key live-status state
    pub handle: String,
    /// Channel id on the external video platform; channels without one can
    /// never be queried for live status
    pub provider_channel_id: Option<String>,
    pub visible: bool,
    /// Policy switch (e.g. holiday override) disabling provider lookups
    pub fetch_enabled: bool,
}

/// Program metadata from the schedule source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub id: Uuid,
    pub name: String,
    pub visible: bool,
}
