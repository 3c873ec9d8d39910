pub mod deterministic_uuid;
pub mod timefmt;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;

/// Current wall-clock date+time in the schedule timezone
pub fn local_now(tz: Tz) -> NaiveDateTime {
    Utc::now().with_timezone(&tz).naive_local()
}

/// Monday of the week containing `date`
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - chrono::Duration::days(date.weekday().num_days_from_monday() as i64)
}
