//! Parsing for the "HH:MM[:SS]" wall-clock times used by schedule entries

use chrono::NaiveTime;

/// Parse a schedule time of day, accepting "HH:MM" and "HH:MM:SS"
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime, String> {
    let value = value.trim();

    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map_err(|_| {
            format!("Invalid time of day: '{value}'. Expected 'HH:MM' or 'HH:MM:SS'")
        })
}
