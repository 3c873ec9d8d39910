//! Weekly override management and resolution
//!
//! Overrides are ephemeral records in the shared store, keyed by target week
//! and scope, expiring at the next week boundary. Resolution merges them
//! into the base schedule: program-scope overrides win over schedule-scope
//! overrides touching the same entries, and create-type overrides synthesize
//! virtual entries.
//!
//! The resolved effective schedule of a week is itself cached with a short
//! TTL; every override mutation invalidates that cache and triggers a
//! non-blocking warm.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache_store::{self, CacheStore, keys};
use crate::errors::{AppError, Result, StoreError};
use crate::models::{
    ChannelSnapshot, DayOfWeek, OverrideAction, OverrideRequest, OverrideScope, OverrideType,
    Provenance, ScheduleEntry, VirtualProgramSpec, WeeklyOverride,
};
use crate::utils::deterministic_uuid::{generate_deterministic_uuid, override_uuid,
    virtual_entry_uuid};
use crate::utils::timefmt::parse_time_of_day;

/// Current stored schema version; older shapes are upgraded on read
const SCHEMA_VERSION: u8 = 2;

/// Placeholder program name when a legacy create-override lost its snapshot
const PLACEHOLDER_PROGRAM_NAME: &str = "Special broadcast";

#[derive(Debug, Clone)]
pub struct OverrideSettings {
    /// TTL of the cached resolved-week schedule
    pub resolved_cache_ttl: Duration,
}

impl Default for OverrideSettings {
    fn default() -> Self {
        Self {
            resolved_cache_ttl: Duration::from_secs(300),
        }
    }
}

pub struct OverrideService {
    store: Arc<dyn CacheStore>,
    source: Arc<dyn crate::sources::ScheduleSource>,
    settings: OverrideSettings,
    tz: Tz,
}

/// Legacy flat override shape (schema v1): loosely typed, no snapshots
#[derive(Debug, Deserialize)]
struct LegacyOverrideV1 {
    #[serde(rename = "type")]
    override_type: String,
    week_start: NaiveDate,
    #[serde(default)]
    schedule_id: Option<Uuid>,
    #[serde(default)]
    program_id: Option<Uuid>,
    #[serde(default)]
    channel_id: Option<Uuid>,
    #[serde(default)]
    new_start_time: Option<String>,
    #[serde(default)]
    new_end_time: Option<String>,
    #[serde(default)]
    new_day: Option<String>,
    #[serde(default)]
    program_name: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

impl OverrideService {
    pub fn new(
        store: Arc<dyn CacheStore>,
        source: Arc<dyn crate::sources::ScheduleSource>,
        settings: OverrideSettings,
        tz: Tz,
    ) -> Self {
        Self {
            store,
            source,
            settings,
            tz,
        }
    }

    // ------------------------------------------------------------------
    // Management surface
    // ------------------------------------------------------------------

    /// Validate and persist a new override. Rejects duplicates for the same
    /// scope+week with a conflict.
    pub async fn create(
        self: &Arc<Self>,
        request: OverrideRequest,
        now: DateTime<Utc>,
    ) -> Result<WeeklyOverride> {
        let (scope, action) = self.validate(&request).await?;
        let week_start = request.week_start;

        let ttl = self.record_ttl(week_start, now)?;
        let slot = slot_key(&scope, &action);
        let key = keys::override_record(week_start, &slot);

        if self.store.get(&key).await?.is_some() {
            return Err(AppError::conflict(slot, week_start.to_string()));
        }

        let record = WeeklyOverride {
            id: override_uuid(&slot, week_start),
            week_start,
            scope,
            action,
            channel_snapshot: self.snapshot_for(&scope, &request).await,
            panelist_snapshots: vec![],
            created_at: now,
            updated_at: now,
        };

        self.write_record(&key, &record, ttl).await?;
        info!(
            id = %record.id,
            scope = %slot,
            week = %week_start,
            "Created weekly override"
        );

        self.invalidate_and_warm(week_start);
        Ok(record)
    }

    /// Replace an override's semantics, preserving id and creation time.
    /// The scope of an override cannot change.
    pub async fn update(
        self: &Arc<Self>,
        id: Uuid,
        request: OverrideRequest,
        now: DateTime<Utc>,
    ) -> Result<WeeklyOverride> {
        let (key, existing) = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("override", id.to_string()))?;

        let (scope, action) = self.validate(&request).await?;
        // The slot also pins create-type overrides to their target channel
        if slot_key(&scope, &action) != slot_key(&existing.scope, &existing.action)
            || request.week_start != existing.week_start
        {
            return Err(AppError::validation(
                "Override target and week cannot change; delete and recreate instead",
            ));
        }

        let ttl = self.record_ttl(existing.week_start, now)?;
        let record = WeeklyOverride {
            action,
            updated_at: now,
            ..existing
        };

        self.write_record(&key, &record, ttl).await?;
        info!(id = %record.id, week = %record.week_start, "Updated weekly override");

        self.invalidate_and_warm(record.week_start);
        Ok(record)
    }

    pub async fn delete(self: &Arc<Self>, id: Uuid) -> Result<()> {
        let (key, existing) = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("override", id.to_string()))?;

        self.store.delete(&key).await?;
        info!(id = %id, week = %existing.week_start, "Deleted weekly override");

        self.invalidate_and_warm(existing.week_start);
        Ok(())
    }

    /// All non-expired overrides targeting one week
    pub async fn list_week(&self, week_start: NaiveDate) -> Result<Vec<WeeklyOverride>> {
        Ok(self
            .load_week(week_start)
            .await?
            .into_iter()
            .map(|(_, record)| record)
            .collect())
    }

    // ------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------

    /// Merge the week's overrides into the base schedule
    pub async fn apply_overrides(
        &self,
        base: &[ScheduleEntry],
        week_start: NaiveDate,
    ) -> Result<Vec<ScheduleEntry>> {
        let overrides: Vec<WeeklyOverride> = self
            .load_week(week_start)
            .await?
            .into_iter()
            .map(|(_, record)| record)
            .collect();
        Ok(merge(base, &overrides))
    }

    /// Effective schedule for a week, served from the resolved cache when
    /// fresh
    pub async fn resolve_week(&self, week_start: NaiveDate) -> Result<Vec<ScheduleEntry>> {
        let key = keys::resolved_week(week_start);
        if let Some(cached) =
            cache_store::get_json_lenient::<Vec<ScheduleEntry>>(self.store.as_ref(), &key).await?
        {
            debug!(week = %week_start, "Resolved schedule served from cache");
            return Ok(cached);
        }

        let base = self.source.base_entries().await?;
        let effective = self.apply_overrides(&base, week_start).await?;
        cache_store::set_json(
            self.store.as_ref(),
            &key,
            &effective,
            self.settings.resolved_cache_ttl,
        )
        .await?;
        Ok(effective)
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Delete overrides past their week boundary. Store TTLs already bound
    /// their lifetime; the sweep reclaims records early when clocks or TTLs
    /// drifted, then invalidates and re-warms the affected weeks.
    pub async fn cleanup_expired(self: &Arc<Self>, today: NaiveDate) -> Result<usize> {
        let all_keys = self.store.keys(&keys::override_all_pattern()).await?;
        let mut removed = 0usize;
        let mut affected_weeks: Vec<NaiveDate> = Vec::new();

        for key in all_keys {
            let record = match self.read_record(&key).await {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Skipping undecodable override {}: {}", key, e);
                    continue;
                }
            };

            if record.is_expired(today) {
                self.store.delete(&key).await?;
                removed += 1;
                if !affected_weeks.contains(&record.week_start) {
                    affected_weeks.push(record.week_start);
                }
            }
        }

        for week in affected_weeks {
            self.invalidate_and_warm(week);
        }

        if removed > 0 {
            info!(removed, "Cleaned up expired weekly overrides");
        }
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn validate(&self, request: &OverrideRequest) -> Result<(OverrideScope, OverrideAction)> {
        match request.override_type {
            OverrideType::Create => self.validate_create(request).await,
            _ => self.validate_targeted(request).await,
        }
    }

    async fn validate_targeted(
        &self,
        request: &OverrideRequest,
    ) -> Result<(OverrideScope, OverrideAction)> {
        let scope = match (request.schedule_id, request.program_id) {
            (Some(schedule_id), None) => {
                if self.source.find_entry(schedule_id).await?.is_none() {
                    return Err(AppError::not_found("schedule entry", schedule_id.to_string()));
                }
                OverrideScope::Schedule(schedule_id)
            }
            (None, Some(program_id)) => {
                if self.source.find_program(program_id).await?.is_none() {
                    return Err(AppError::not_found("program", program_id.to_string()));
                }
                OverrideScope::Program(program_id)
            }
            _ => {
                return Err(AppError::validation(
                    "Exactly one of schedule_id or program_id is required",
                ));
            }
        };

        let action = match request.override_type {
            OverrideType::Cancel => OverrideAction::Cancel,
            OverrideType::TimeChange => {
                let (new_start, new_end) = parse_times(request)?;
                OverrideAction::TimeChange { new_start, new_end }
            }
            OverrideType::Reschedule => {
                let (new_start, new_end) = parse_times(request)?;
                let new_day = parse_day(request)?;
                OverrideAction::Reschedule {
                    new_start,
                    new_end,
                    new_day,
                }
            }
            OverrideType::Create => unreachable!("handled by validate_create"),
        };

        Ok((scope, action))
    }

    async fn validate_create(
        &self,
        request: &OverrideRequest,
    ) -> Result<(OverrideScope, OverrideAction)> {
        if request.schedule_id.is_some() || request.program_id.is_some() {
            return Err(AppError::validation(
                "Create-type overrides must not reference an existing schedule or program",
            ));
        }

        let channel_id = request
            .channel_id
            .ok_or_else(|| AppError::validation("Create-type overrides require channel_id"))?;
        if self.source.find_channel(channel_id).await?.is_none() {
            return Err(AppError::not_found("channel", channel_id.to_string()));
        }

        let program = request
            .virtual_program
            .clone()
            .filter(|p| !p.name.trim().is_empty())
            .ok_or_else(|| {
                AppError::validation("Create-type overrides require a complete virtual program")
            })?;

        let (new_start, new_end) = parse_times(request)?;
        let new_day = parse_day(request)?;

        Ok((
            OverrideScope::None,
            OverrideAction::Create {
                new_start,
                new_end,
                new_day,
                channel_id,
                program,
            },
        ))
    }

    async fn snapshot_for(
        &self,
        scope: &OverrideScope,
        request: &OverrideRequest,
    ) -> Option<ChannelSnapshot> {
        let channel_id = match scope {
            OverrideScope::None => request.channel_id,
            OverrideScope::Schedule(schedule_id) => self
                .source
                .find_entry(*schedule_id)
                .await
                .ok()
                .flatten()
                .map(|entry| entry.channel_id),
            // Program-scope overrides may span channels; no single snapshot
            OverrideScope::Program(_) => None,
        }?;

        self.source
            .find_channel(channel_id)
            .await
            .ok()
            .flatten()
            .map(|channel| ChannelSnapshot {
                id: channel.id,
                name: channel.name,
                handle: channel.handle,
            })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<(String, WeeklyOverride)>> {
        let all_keys = self.store.keys(&keys::override_all_pattern()).await?;
        for key in all_keys {
            if let Some(record) = self.read_record(&key).await? {
                if record.id == id {
                    return Ok(Some((key, record)));
                }
            }
        }
        Ok(None)
    }

    /// Overrides of one week with their store keys, upgrading legacy records
    /// in place
    async fn load_week(&self, week_start: NaiveDate) -> Result<Vec<(String, WeeklyOverride)>> {
        let week_keys = self.store.keys(&keys::override_week_pattern(week_start)).await?;
        let mut records = Vec::with_capacity(week_keys.len());
        for key in week_keys {
            if let Some(record) = self.read_record(&key).await? {
                records.push((key, record));
            }
        }
        Ok(records)
    }

    /// Read one stored override, applying the lazy schema migration.
    /// Corrupted records are dropped.
    async fn read_record(&self, key: &str) -> Result<Option<WeeklyOverride>> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };

        let value: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!("Deleting corrupted override record {}: {}", key, e);
                self.store.delete(key).await?;
                return Ok(None);
            }
        };

        let version = value
            .get("schema_version")
            .and_then(Value::as_u64)
            .unwrap_or(1) as u8;

        if version >= SCHEMA_VERSION {
            match serde_json::from_value::<WeeklyOverride>(value) {
                Ok(record) => return Ok(Some(record)),
                Err(e) => {
                    warn!("Deleting corrupted override record {}: {}", key, e);
                    self.store.delete(key).await?;
                    return Ok(None);
                }
            }
        }

        // Legacy shape: upgrade once and write back
        let legacy: LegacyOverrideV1 = match serde_json::from_value(value) {
            Ok(legacy) => legacy,
            Err(e) => {
                warn!("Deleting unupgradable override record {}: {}", key, e);
                self.store.delete(key).await?;
                return Ok(None);
            }
        };

        let record = self.upgrade_legacy(legacy).await?;
        let now = Utc::now();
        match self.record_ttl(record.week_start, now) {
            Ok(ttl) => {
                self.write_record(key, &record, ttl).await?;
                debug!(key, "Upgraded legacy override record");
            }
            Err(_) => {
                // Already past its week; leave deletion to the sweep
                debug!(key, "Skipping write-back of expired legacy override");
            }
        }
        Ok(Some(record))
    }

    async fn upgrade_legacy(&self, legacy: LegacyOverrideV1) -> Result<WeeklyOverride> {
        let new_start = legacy.new_start_time.as_deref().map(parse_time_of_day);
        let new_end = legacy.new_end_time.as_deref().map(parse_time_of_day);
        let new_day = legacy.new_day.as_deref().and_then(DayOfWeek::parse);

        let require_times = || -> Result<(NaiveTime, NaiveTime)> {
            match (new_start.clone(), new_end.clone()) {
                (Some(Ok(start)), Some(Ok(end))) => Ok((start, end)),
                _ => Err(AppError::validation("Legacy override is missing new times")),
            }
        };

        let (scope, action) = match legacy.override_type.as_str() {
            "cancel" => (legacy_scope(&legacy)?, OverrideAction::Cancel),
            "time_change" => {
                let (new_start, new_end) = require_times()?;
                (
                    legacy_scope(&legacy)?,
                    OverrideAction::TimeChange { new_start, new_end },
                )
            }
            "reschedule" => {
                let (new_start, new_end) = require_times()?;
                let new_day = new_day
                    .ok_or_else(|| AppError::validation("Legacy reschedule is missing new_day"))?;
                (
                    legacy_scope(&legacy)?,
                    OverrideAction::Reschedule {
                        new_start,
                        new_end,
                        new_day,
                    },
                )
            }
            "create" => {
                let (new_start, new_end) = require_times()?;
                let channel_id = legacy.channel_id.ok_or_else(|| {
                    AppError::validation("Legacy create override is missing channel_id")
                })?;
                let new_day = new_day
                    .ok_or_else(|| AppError::validation("Legacy create is missing new_day"))?;
                let program = VirtualProgramSpec {
                    name: legacy
                        .program_name
                        .unwrap_or_else(|| PLACEHOLDER_PROGRAM_NAME.to_string()),
                    description: None,
                    visible: true,
                };
                (
                    OverrideScope::None,
                    OverrideAction::Create {
                        new_start,
                        new_end,
                        new_day,
                        channel_id,
                        program,
                    },
                )
            }
            other => {
                return Err(AppError::validation(format!(
                    "Unknown legacy override type '{other}'"
                )));
            }
        };

        let slot = slot_key(&scope, &action);
        let created_at = legacy.created_at.unwrap_or_else(Utc::now);

        // Fill the denormalized snapshot the legacy shape never carried
        let channel_id = match &action {
            OverrideAction::Create { channel_id, .. } => Some(*channel_id),
            _ => match scope {
                OverrideScope::Schedule(schedule_id) => self
                    .source
                    .find_entry(schedule_id)
                    .await
                    .ok()
                    .flatten()
                    .map(|entry| entry.channel_id),
                _ => None,
            },
        };
        let channel_snapshot = match channel_id {
            Some(id) => self
                .source
                .find_channel(id)
                .await
                .ok()
                .flatten()
                .map(|channel| ChannelSnapshot {
                    id: channel.id,
                    name: channel.name,
                    handle: channel.handle,
                }),
            None => None,
        };

        Ok(WeeklyOverride {
            id: override_uuid(&slot, legacy.week_start),
            week_start: legacy.week_start,
            scope,
            action,
            channel_snapshot,
            panelist_snapshots: vec![],
            created_at,
            updated_at: created_at,
        })
    }

    async fn write_record(
        &self,
        key: &str,
        record: &WeeklyOverride,
        ttl: Duration,
    ) -> Result<()> {
        let mut value = serde_json::to_value(record).map_err(StoreError::from)?;
        value["schema_version"] = Value::from(SCHEMA_VERSION);
        let raw = serde_json::to_string(&value).map_err(StoreError::from)?;
        self.store.set(key, &raw, ttl).await?;
        Ok(())
    }

    /// Store TTL bounding an override to its week: seconds from `now` until
    /// local midnight at the next week boundary
    fn record_ttl(&self, week_start: NaiveDate, now: DateTime<Utc>) -> Result<Duration> {
        let boundary_local = (week_start + chrono::Duration::days(7))
            .and_time(NaiveTime::MIN);
        let boundary = boundary_local
            .and_local_timezone(self.tz)
            .earliest()
            .ok_or_else(|| AppError::internal("Week boundary has no local representation"))?
            .with_timezone(&Utc);

        let seconds = (boundary - now).num_seconds();
        if seconds <= 0 {
            return Err(AppError::validation(format!(
                "Week starting {week_start} has already expired"
            )));
        }
        Ok(Duration::from_secs(seconds as u64))
    }

    /// Drop the week's resolved-schedule cache and re-resolve it off the
    /// caller's path
    fn invalidate_and_warm(self: &Arc<Self>, week_start: NaiveDate) {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let key = keys::resolved_week(week_start);
            if let Err(e) = service.store.delete(&key).await {
                warn!(week = %week_start, "Failed to invalidate resolved schedule: {}", e);
                return;
            }
            if let Err(e) = service.resolve_week(week_start).await {
                warn!(week = %week_start, "Failed to warm resolved schedule: {}", e);
            }
        });
    }
}

fn legacy_scope(legacy: &LegacyOverrideV1) -> Result<OverrideScope> {
    match (legacy.schedule_id, legacy.program_id) {
        (Some(schedule_id), None) => Ok(OverrideScope::Schedule(schedule_id)),
        (None, Some(program_id)) => Ok(OverrideScope::Program(program_id)),
        _ => Err(AppError::validation("Legacy override has an ambiguous scope")),
    }
}

fn parse_times(request: &OverrideRequest) -> Result<(NaiveTime, NaiveTime)> {
    let start = request
        .new_start
        .as_deref()
        .ok_or_else(|| AppError::validation("new_start is required"))?;
    let end = request
        .new_end
        .as_deref()
        .ok_or_else(|| AppError::validation("new_end is required"))?;
    Ok((
        parse_time_of_day(start).map_err(AppError::validation)?,
        parse_time_of_day(end).map_err(AppError::validation)?,
    ))
}

fn parse_day(request: &OverrideRequest) -> Result<DayOfWeek> {
    let day = request
        .new_day
        .as_deref()
        .ok_or_else(|| AppError::validation("new_day is required"))?;
    DayOfWeek::parse(day)
        .ok_or_else(|| AppError::validation(format!("Unknown day of week '{day}'")))
}

/// Identity of an override within its week. One override per slot per week;
/// create-type overrides slot per target channel.
fn slot_key(scope: &OverrideScope, action: &OverrideAction) -> String {
    match (scope, action) {
        (OverrideScope::None, OverrideAction::Create { channel_id, .. }) => {
            format!("create:{channel_id}")
        }
        (scope, _) => scope.key(),
    }
}

/// Merge a week's overrides into the base schedule.
///
/// Deterministic and side-effect free: the same inputs always produce the
/// same effective schedule.
pub fn merge(base: &[ScheduleEntry], overrides: &[WeeklyOverride]) -> Vec<ScheduleEntry> {
    let mut by_schedule: HashMap<Uuid, &WeeklyOverride> = HashMap::new();
    let mut by_program: HashMap<Uuid, &WeeklyOverride> = HashMap::new();
    let mut creates: Vec<&WeeklyOverride> = Vec::new();

    for record in overrides {
        match record.scope {
            OverrideScope::Schedule(schedule_id) => {
                by_schedule.insert(schedule_id, record);
            }
            OverrideScope::Program(program_id) => {
                by_program.insert(program_id, record);
            }
            OverrideScope::None => {
                if matches!(record.action, OverrideAction::Create { .. }) {
                    creates.push(record);
                }
            }
        }
    }

    let mut effective: Vec<ScheduleEntry> = Vec::with_capacity(base.len() + creates.len());

    for entry in base {
        // Program scope strictly wins; a schedule-scope override on the same
        // entry is ignored
        let applied = if let Some(record) = by_program.get(&entry.program_id) {
            apply_action(entry, &record.action)
        } else if let Some(record) = by_schedule.get(&entry.id) {
            apply_action(entry, &record.action)
        } else {
            Some(entry.clone())
        };
        if let Some(entry) = applied {
            effective.push(entry);
        }
    }

    for record in creates {
        if let OverrideAction::Create {
            new_start,
            new_end,
            new_day,
            channel_id,
            program,
        } = &record.action
        {
            let entry_id = virtual_entry_uuid(&record.id);
            if effective.iter().any(|e| e.id == entry_id) {
                continue;
            }
            effective.push(ScheduleEntry {
                id: entry_id,
                program_id: generate_deterministic_uuid(&[
                    &"virtual-program",
                    &record.id.to_string(),
                ]),
                channel_id: *channel_id,
                day: *new_day,
                start_time: *new_start,
                end_time: *new_end,
                provenance: Provenance::Virtual,
                virtual_program: Some(virtual_program_or_placeholder(program)),
            });
        }
    }

    effective
}

fn virtual_program_or_placeholder(program: &VirtualProgramSpec) -> VirtualProgramSpec {
    if program.name.trim().is_empty() {
        VirtualProgramSpec {
            name: PLACEHOLDER_PROGRAM_NAME.to_string(),
            description: None,
            visible: true,
        }
    } else {
        program.clone()
    }
}

fn apply_action(entry: &ScheduleEntry, action: &OverrideAction) -> Option<ScheduleEntry> {
    match action {
        OverrideAction::Cancel => None,
        OverrideAction::TimeChange { new_start, new_end } => Some(ScheduleEntry {
            start_time: *new_start,
            end_time: *new_end,
            provenance: Provenance::Overridden,
            ..entry.clone()
        }),
        OverrideAction::Reschedule {
            new_start,
            new_end,
            new_day,
        } => Some(ScheduleEntry {
            start_time: *new_start,
            end_time: *new_end,
            day: *new_day,
            provenance: Provenance::Overridden,
            ..entry.clone()
        }),
        // A create action never targets an existing entry
        OverrideAction::Create { .. } => Some(entry.clone()),
    }
}
