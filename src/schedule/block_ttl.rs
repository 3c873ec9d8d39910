//! Block/TTL calculator
//!
//! Pure computation over one channel's schedule entries for a single day.
//! Adjacent entries separated by less than the merge gap form one contiguous
//! block, so a cache entry written mid-block stays valid until the whole
//! block ends instead of churning at every program boundary.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tracing::warn;
use uuid::Uuid;

use crate::models::ScheduleEntry;

#[derive(Debug, Clone)]
pub struct CalculatorSettings {
    /// Gap under which adjacent entries merge into one block
    pub merge_gap: chrono::Duration,
    /// Floor for the next-entry fallback TTL after an anomaly
    pub min_fallback_ttl: chrono::Duration,
    /// Per-channel cooldown for negative-TTL anomaly warnings
    pub warn_cooldown: chrono::Duration,
}

impl Default for CalculatorSettings {
    fn default() -> Self {
        Self {
            merge_gap: chrono::Duration::minutes(2),
            min_fallback_ttl: chrono::Duration::seconds(60),
            warn_cooldown: chrono::Duration::minutes(5),
        }
    }
}

/// Outcome of a TTL computation
#[derive(Debug, Clone, PartialEq)]
pub struct TtlResolution {
    /// Seconds the live-status verdict stays valid; always positive
    pub ttl_seconds: i64,
    /// End of the containing block, when the instant falls inside one
    pub block_end: Option<NaiveDateTime>,
    /// Whether the schedule claimed a program that had already ended
    pub anomaly: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Block {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

pub struct BlockTtlCalculator {
    settings: CalculatorSettings,
    /// In-process warning dedup; a fast-path hint, not shared state
    warn_cooldowns: Mutex<HashMap<Uuid, NaiveDateTime>>,
}

impl BlockTtlCalculator {
    pub fn new(settings: CalculatorSettings) -> Self {
        Self {
            settings,
            warn_cooldowns: Mutex::new(HashMap::new()),
        }
    }

    /// Drop accumulated in-process state
    pub fn reset(&self) {
        self.warn_cooldowns.lock().unwrap().clear();
    }

    /// Compute the verdict TTL for one channel at `now`.
    ///
    /// `entries` are the channel's entries for `now`'s day; other entries are
    /// ignored.
    pub fn resolve(
        &self,
        channel_id: Uuid,
        entries: &[ScheduleEntry],
        now: NaiveDateTime,
    ) -> TtlResolution {
        let date = now.date();
        let blocks = self.day_blocks(entries, date);
        let end_of_day = Self::end_of_day(date);

        // The last block that has started; its end may already be behind us
        let current = blocks
            .iter()
            .filter(|b| b.start <= now)
            .max_by_key(|b| b.start)
            .copied();

        let Some(block) = current else {
            // Nothing started yet today: full-day fallback
            return TtlResolution {
                ttl_seconds: (end_of_day - now).num_seconds().max(1),
                block_end: None,
                anomaly: false,
            };
        };

        let ttl = (block.end - now).num_seconds();
        if ttl > 0 {
            return TtlResolution {
                ttl_seconds: ttl,
                block_end: Some(block.end),
                anomaly: false,
            };
        }

        // Schedule says the program already ended: clock drift or stale data
        if self.should_warn(channel_id, now) {
            warn!(
                channel_id = %channel_id,
                block_end = %block.end,
                "Schedule block ended in the past; falling back to next boundary"
            );
        }

        let next_start = blocks
            .iter()
            .filter(|b| b.start > now)
            .map(|b| b.start)
            .min();

        let fallback = match next_start {
            Some(start) => (start - now)
                .num_seconds()
                .max(self.settings.min_fallback_ttl.num_seconds()),
            None => (end_of_day - now).num_seconds().max(1),
        };

        TtlResolution {
            ttl_seconds: fallback,
            block_end: None,
            anomaly: true,
        }
    }

    /// End of the block containing `now`, if any; used to bound suppression
    /// windows and tracker record lifetimes
    pub fn block_end(
        &self,
        entries: &[ScheduleEntry],
        now: NaiveDateTime,
    ) -> Option<NaiveDateTime> {
        self.day_blocks(entries, now.date())
            .into_iter()
            .find(|b| b.start <= now && now < b.end)
            .map(|b| b.end)
    }

    fn day_blocks(&self, entries: &[ScheduleEntry], date: NaiveDate) -> Vec<Block> {
        let end_of_day = Self::end_of_day(date);

        let mut intervals: Vec<Block> = entries
            .iter()
            .map(|entry| {
                let start = date.and_time(entry.start_time);
                // Entries that run past midnight end at end-of-day for TTL
                // purposes; the next day's grid owns the remainder
                let end = if entry.end_time > entry.start_time {
                    date.and_time(entry.end_time)
                } else {
                    end_of_day
                };
                Block { start, end }
            })
            .collect();
        intervals.sort_by_key(|b| b.start);

        let mut blocks: Vec<Block> = Vec::new();
        for interval in intervals {
            match blocks.last_mut() {
                Some(last) if interval.start - last.end < self.settings.merge_gap => {
                    last.end = last.end.max(interval.end);
                }
                _ => blocks.push(interval),
            }
        }
        blocks
    }

    fn should_warn(&self, channel_id: Uuid, now: NaiveDateTime) -> bool {
        let mut cooldowns = self.warn_cooldowns.lock().unwrap();
        match cooldowns.get(&channel_id) {
            Some(last) if now - *last < self.settings.warn_cooldown => false,
            _ => {
                cooldowns.insert(channel_id, now);
                true
            }
        }
    }

    fn end_of_day(date: NaiveDate) -> NaiveDateTime {
        (date + chrono::Duration::days(1)).and_time(NaiveTime::MIN)
    }
}

impl Default for BlockTtlCalculator {
    fn default() -> Self {
        Self::new(CalculatorSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DayOfWeek, Provenance};

    fn entry(start: (u32, u32), end: (u32, u32)) -> ScheduleEntry {
        ScheduleEntry {
            id: Uuid::new_v4(),
            program_id: Uuid::new_v4(),
            channel_id: Uuid::new_v4(),
            day: DayOfWeek::Monday,
            start_time: NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
            provenance: Provenance::Base,
            virtual_program: None,
        }
    }

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 8, 24)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn test_small_gap_merges_into_one_block() {
        let calc = BlockTtlCalculator::default();
        let channel = Uuid::new_v4();
        // 09:00-10:00 and 10:01-11:00, gap of 1 minute
        let entries = vec![entry((9, 0), (10, 0)), entry((10, 1), (11, 0))];

        let resolution = calc.resolve(channel, &entries, at(9, 30));
        // TTL reaches the far end of the merged block
        assert_eq!(resolution.ttl_seconds, 90 * 60);
        assert_eq!(resolution.block_end, Some(at(11, 0)));
        assert!(!resolution.anomaly);
    }

    #[test]
    fn test_large_gap_keeps_blocks_separate() {
        let calc = BlockTtlCalculator::default();
        let channel = Uuid::new_v4();
        // Gap of exactly 2 minutes is not merged
        let entries = vec![entry((9, 0), (10, 0)), entry((10, 2), (11, 0))];

        let resolution = calc.resolve(channel, &entries, at(9, 30));
        assert_eq!(resolution.ttl_seconds, 30 * 60);
        assert_eq!(resolution.block_end, Some(at(10, 0)));
    }

    #[test]
    fn test_no_block_yet_gives_full_day_fallback() {
        let calc = BlockTtlCalculator::default();
        let entries = vec![entry((18, 0), (19, 0))];

        let resolution = calc.resolve(Uuid::new_v4(), &entries, at(8, 0));
        // Seconds until local midnight
        assert_eq!(resolution.ttl_seconds, 16 * 3600);
        assert_eq!(resolution.block_end, None);
        assert!(!resolution.anomaly);
    }

    #[test]
    fn test_stale_block_falls_back_to_next_entry() {
        let calc = BlockTtlCalculator::default();
        // Last started block ended at 10:00; next starts at 10:30
        let entries = vec![entry((9, 0), (10, 0)), entry((10, 30), (11, 0))];

        let resolution = calc.resolve(Uuid::new_v4(), &entries, at(10, 10));
        assert!(resolution.anomaly);
        assert_eq!(resolution.ttl_seconds, 20 * 60);
        assert_eq!(resolution.block_end, None);
    }

    #[test]
    fn test_stale_block_fallback_has_floor() {
        let calc = BlockTtlCalculator::default();
        // Next entry starts in 10 seconds; fallback still at least 60s
        let entries = vec![
            entry((9, 0), (10, 0)),
            ScheduleEntry {
                start_time: NaiveTime::from_hms_opt(10, 10, 10).unwrap(),
                end_time: NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
                ..entry((10, 10), (11, 0))
            },
        ];

        let resolution = calc.resolve(Uuid::new_v4(), &entries, at(10, 10));
        assert!(resolution.anomaly);
        assert_eq!(resolution.ttl_seconds, 60);
    }

    #[test]
    fn test_stale_block_without_future_entries_uses_end_of_day() {
        let calc = BlockTtlCalculator::default();
        let entries = vec![entry((9, 0), (10, 0))];

        let resolution = calc.resolve(Uuid::new_v4(), &entries, at(22, 0));
        assert!(resolution.anomaly);
        assert_eq!(resolution.ttl_seconds, 2 * 3600);
    }

    #[test]
    fn test_midnight_spanning_entry_ends_at_end_of_day() {
        let calc = BlockTtlCalculator::default();
        let entries = vec![entry((23, 0), (0, 30))];

        let resolution = calc.resolve(Uuid::new_v4(), &entries, at(23, 30));
        assert_eq!(resolution.ttl_seconds, 30 * 60);
        assert!(!resolution.anomaly);
    }

    #[test]
    fn test_warn_dedup_respects_cooldown() {
        let calc = BlockTtlCalculator::default();
        let channel = Uuid::new_v4();

        assert!(calc.should_warn(channel, at(10, 0)));
        // Within the 5-minute cooldown
        assert!(!calc.should_warn(channel, at(10, 3)));
        // After the cooldown
        assert!(calc.should_warn(channel, at(10, 6)));

        // Other channels are unaffected
        assert!(calc.should_warn(Uuid::new_v4(), at(10, 3)));
    }

    #[test]
    fn test_block_end_requires_containment() {
        let calc = BlockTtlCalculator::default();
        let entries = vec![entry((9, 0), (10, 0))];

        assert_eq!(calc.block_end(&entries, at(9, 30)), Some(at(10, 0)));
        assert_eq!(calc.block_end(&entries, at(10, 30)), None);
    }
}
