use crate::config::QuietHours;
use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;

/// Whether `instant` falls inside `[start_hour, end_hour)` in `zone`.
/// Windows wrap around midnight when `start_hour > end_hour`.
pub fn is_quiet_hours(instant: DateTime<Utc>, start_hour: u32, end_hour: u32, zone: Tz) -> bool {
    let hour = instant.with_timezone(&zone).hour();
    let start = start_hour % 24;
    let end = end_hour % 24;

    if start < end {
        hour >= start && hour < end
    } else if start > end {
        hour >= start || hour < end
    } else {
        false
    }
}

impl QuietHours {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.enabled && is_quiet_hours(instant, self.start_hour, self.end_hour, self.zone)
    }
}
