//! Override management lifecycle: validation, conflicts, week resolution,
//! legacy upgrades and the cleanup sweep

mod support;

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Utc};
use chrono_tz::UTC;
use uuid::Uuid;

use onair::cache_store::{CacheStore, MemoryCacheStore, keys};
use onair::errors::AppError;
use onair::models::{
    Channel, DayOfWeek, OverrideAction, OverrideRequest, OverrideType, Program, Provenance,
    ScheduleEntry, VirtualProgramSpec,
};
use onair::schedule::{OverrideService, OverrideSettings};
use onair::utils::week_start;

use support::StaticScheduleSource;

struct Fixture {
    service: Arc<OverrideService>,
    store: Arc<MemoryCacheStore>,
    base: Vec<ScheduleEntry>,
    entry_id: Uuid,
    program_id: Uuid,
    channel: Channel,
    other_channel: Channel,
}

fn fixture() -> Fixture {
    let channel = Channel {
        id: Uuid::new_v4(),
        name: "Canal Uno".to_string(),
        handle: "canal-1".to_string(),
        provider_channel_id: Some("UC-uno".to_string()),
        visible: true,
        fetch_enabled: true,
    };
    let other_channel = Channel {
        id: Uuid::new_v4(),
        name: "Canal Dos".to_string(),
        handle: "canal-2".to_string(),
        provider_channel_id: Some("UC-dos".to_string()),
        visible: true,
        fetch_enabled: true,
    };
    let program = Program {
        id: Uuid::new_v4(),
        name: "Morning Show".to_string(),
        visible: true,
    };
    let entry = ScheduleEntry {
        id: Uuid::new_v4(),
        program_id: program.id,
        channel_id: channel.id,
        day: DayOfWeek::Monday,
        start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        end_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        provenance: Provenance::Base,
        virtual_program: None,
    };

    let store = Arc::new(MemoryCacheStore::new());
    let store_dyn: Arc<dyn CacheStore> = store.clone();
    let source = Arc::new(StaticScheduleSource {
        entries: vec![entry.clone()],
        channels: vec![channel.clone(), other_channel.clone()],
        programs: vec![program.clone()],
    });
    let service = Arc::new(OverrideService::new(
        store_dyn,
        source,
        OverrideSettings::default(),
        UTC,
    ));

    Fixture {
        service,
        store,
        base: vec![entry.clone()],
        entry_id: entry.id,
        program_id: program.id,
        channel,
        other_channel,
    }
}

fn this_week() -> NaiveDate {
    week_start(Utc::now().date_naive())
}

fn request(override_type: OverrideType, week: NaiveDate) -> OverrideRequest {
    OverrideRequest {
        override_type,
        week_start: week,
        schedule_id: None,
        program_id: None,
        channel_id: None,
        new_start: None,
        new_end: None,
        new_day: None,
        virtual_program: None,
    }
}

#[tokio::test]
async fn test_time_change_yields_single_rewritten_entry() {
    let f = fixture();
    let week = this_week();

    f.service
        .create(
            OverrideRequest {
                schedule_id: Some(f.entry_id),
                new_start: Some("09:30".to_string()),
                new_end: Some("10:30".to_string()),
                ..request(OverrideType::TimeChange, week)
            },
            Utc::now(),
        )
        .await
        .unwrap();

    let effective = f.service.apply_overrides(&f.base, week).await.unwrap();
    assert_eq!(effective.len(), 1);
    assert_eq!(effective[0].id, f.entry_id);
    assert_eq!(
        effective[0].start_time,
        NaiveTime::from_hms_opt(9, 30, 0).unwrap()
    );
    assert_eq!(
        effective[0].end_time,
        NaiveTime::from_hms_opt(10, 30, 0).unwrap()
    );
    assert_eq!(effective[0].provenance, Provenance::Overridden);
}

#[tokio::test]
async fn test_duplicate_scope_and_week_is_a_conflict() {
    let f = fixture();
    let week = this_week();
    let make = || OverrideRequest {
        schedule_id: Some(f.entry_id),
        ..request(OverrideType::Cancel, week)
    };

    f.service.create(make(), Utc::now()).await.unwrap();
    let err = f.service.create(make(), Utc::now()).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict { .. }));

    // Still exactly one override for the week
    assert_eq!(f.service.list_week(week).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_update_preserves_identity() {
    let f = fixture();
    let week = this_week();
    let created_at = Utc::now();

    let created = f
        .service
        .create(
            OverrideRequest {
                schedule_id: Some(f.entry_id),
                new_start: Some("09:30".to_string()),
                new_end: Some("10:30".to_string()),
                ..request(OverrideType::TimeChange, week)
            },
            created_at,
        )
        .await
        .unwrap();

    let updated = f
        .service
        .update(
            created.id,
            OverrideRequest {
                schedule_id: Some(f.entry_id),
                new_start: Some("11:00".to_string()),
                new_end: Some("12:00".to_string()),
                ..request(OverrideType::TimeChange, week)
            },
            created_at + chrono::Duration::minutes(10),
        )
        .await
        .unwrap();

    assert_eq!(updated.id, created.id);
    assert_eq!(updated.created_at, created.created_at);
    assert!(updated.updated_at > created.updated_at);
    assert!(matches!(updated.action, OverrideAction::TimeChange { new_start, .. }
        if new_start == NaiveTime::from_hms_opt(11, 0, 0).unwrap()));
}

#[tokio::test]
async fn test_delete_restores_the_base_schedule() {
    let f = fixture();
    let week = this_week();

    let created = f
        .service
        .create(
            OverrideRequest {
                program_id: Some(f.program_id),
                ..request(OverrideType::Cancel, week)
            },
            Utc::now(),
        )
        .await
        .unwrap();
    assert!(f.service.apply_overrides(&f.base, week).await.unwrap().is_empty());

    f.service.delete(created.id).await.unwrap();
    let effective = f.service.apply_overrides(&f.base, week).await.unwrap();
    assert_eq!(effective.len(), 1);
    assert_eq!(effective[0].provenance, Provenance::Base);
}

#[tokio::test]
async fn test_validation_rejects_malformed_requests() {
    let f = fixture();
    let week = this_week();

    // Both scopes set
    let err = f
        .service
        .create(
            OverrideRequest {
                schedule_id: Some(f.entry_id),
                program_id: Some(f.program_id),
                ..request(OverrideType::Cancel, week)
            },
            Utc::now(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { .. }));

    // Missing new times for a time change
    let err = f
        .service
        .create(
            OverrideRequest {
                schedule_id: Some(f.entry_id),
                ..request(OverrideType::TimeChange, week)
            },
            Utc::now(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { .. }));

    // Unknown schedule entry
    let err = f
        .service
        .create(
            OverrideRequest {
                schedule_id: Some(Uuid::new_v4()),
                ..request(OverrideType::Cancel, week)
            },
            Utc::now(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound { .. }));

    // Create without a virtual program
    let err = f
        .service
        .create(
            OverrideRequest {
                channel_id: Some(f.channel.id),
                new_start: Some("14:00".to_string()),
                new_end: Some("16:00".to_string()),
                new_day: Some("monday".to_string()),
                ..request(OverrideType::Create, week)
            },
            Utc::now(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { .. }));
}

#[tokio::test]
async fn test_create_override_lives_and_dies_with_its_week() {
    let f = fixture();
    let next_week = this_week() + chrono::Duration::days(7);

    let created = f
        .service
        .create(
            OverrideRequest {
                channel_id: Some(f.channel.id),
                new_start: Some("14:00".to_string()),
                new_end: Some("16:00".to_string()),
                new_day: Some("monday".to_string()),
                virtual_program: Some(VirtualProgramSpec {
                    name: "Election Special".to_string(),
                    description: None,
                    visible: true,
                }),
                ..request(OverrideType::Create, next_week)
            },
            Utc::now(),
        )
        .await
        .unwrap();

    // The denormalized snapshot carries the referenced channel's fields
    let snapshot = created.channel_snapshot.as_ref().unwrap();
    assert_eq!(snapshot.name, f.channel.name);
    assert_eq!(snapshot.handle, f.channel.handle);

    let effective = f.service.apply_overrides(&f.base, next_week).await.unwrap();
    assert_eq!(effective.len(), 2);
    let extra = effective
        .iter()
        .find(|e| e.provenance == Provenance::Virtual)
        .unwrap();
    assert_eq!(extra.channel_id, f.channel.id);
    assert_eq!(extra.day, DayOfWeek::Monday);
    assert_eq!(extra.virtual_program.as_ref().unwrap().name, "Election Special");

    // Past the week boundary the sweep removes it
    let after_expiry = next_week + chrono::Duration::days(7);
    let removed = f.service.cleanup_expired(after_expiry).await.unwrap();
    assert_eq!(removed, 1);
    let effective = f.service.apply_overrides(&f.base, next_week).await.unwrap();
    assert_eq!(effective.len(), 1);
}

#[tokio::test]
async fn test_update_cannot_retarget_a_special_to_another_channel() {
    let f = fixture();
    let week = this_week();
    let special = |channel_id: Uuid| OverrideRequest {
        channel_id: Some(channel_id),
        new_start: Some("14:00".to_string()),
        new_end: Some("16:00".to_string()),
        new_day: Some("monday".to_string()),
        virtual_program: Some(VirtualProgramSpec {
            name: "Election Special".to_string(),
            description: None,
            visible: true,
        }),
        ..request(OverrideType::Create, week)
    };

    let created = f
        .service
        .create(special(f.channel.id), Utc::now())
        .await
        .unwrap();

    // Moving the special to another channel would leave it filed under the
    // first channel's slot
    let err = f
        .service
        .update(created.id, special(f.other_channel.id), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { .. }));

    // The second channel's slot is free, so at most one special can exist
    // per channel for the week
    f.service
        .create(special(f.other_channel.id), Utc::now())
        .await
        .unwrap();
    let records = f.service.list_week(week).await.unwrap();
    assert_eq!(records.len(), 2);
    let targets: Vec<Uuid> = records
        .iter()
        .filter_map(|r| match r.action {
            OverrideAction::Create { channel_id, .. } => Some(channel_id),
            _ => None,
        })
        .collect();
    assert!(targets.contains(&f.channel.id));
    assert!(targets.contains(&f.other_channel.id));
}

#[tokio::test]
async fn test_legacy_record_is_upgraded_once_on_read() {
    let f = fixture();
    let week = this_week();
    let key = keys::override_record(week, &format!("schedule:{}", f.entry_id));

    let legacy = serde_json::json!({
        "type": "time_change",
        "week_start": week,
        "schedule_id": f.entry_id,
        "new_start_time": "09:30",
        "new_end_time": "10:30"
    });
    f.store
        .set(&key, &legacy.to_string(), std::time::Duration::from_secs(3600))
        .await
        .unwrap();

    let records = f.service.list_week(week).await.unwrap();
    assert_eq!(records.len(), 1);
    assert!(matches!(records[0].action, OverrideAction::TimeChange { .. }));
    // The upgrade filled the snapshot the legacy shape never carried
    assert_eq!(
        records[0].channel_snapshot.as_ref().unwrap().handle,
        f.channel.handle
    );

    // The upgraded shape was written back
    let raw = f.store.get(&key).await.unwrap().unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["schema_version"], 2);

    // A second read decodes the current shape directly
    let again = f.service.list_week(week).await.unwrap();
    assert_eq!(again[0].id, records[0].id);
}
