//! Warehouse wall clock.
//!
//! Every time-of-day rule (priority bands, sweeping window, maintenance
//! hours) runs on Europe/Berlin wall time. Components never read the OS
//! clock themselves; the orchestrator samples the clock once per run and
//! hands the instant down, so a run sees one consistent "now" and tests can
//! pin it.

use chrono::{DateTime, Datelike, Utc, Weekday};
use chrono_tz::Europe::Berlin;
use chrono_tz::Tz;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Tz>;
}

/// Live Europe/Berlin wall clock.
pub struct BerlinClock;

impl Clock for BerlinClock {
    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&Berlin)
    }
}

/// Pinned instant for tests.
pub struct FixedClock(pub DateTime<Tz>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Tz> {
        self.0
    }
}

/// Monday through Friday count as working days.
pub fn is_working_day(now: &DateTime<Tz>) -> bool {
    !matches!(now.weekday(), Weekday::Sat | Weekday::Sun)
}

#[cfg(test)]
pub fn berlin(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Tz> {
    use chrono::TimeZone;
    Berlin.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weekend_is_not_a_working_day() {
        // 2024-10-05 is a Saturday, 2024-10-07 a Monday.
        assert!(!is_working_day(&berlin(2024, 10, 5, 12, 0)));
        assert!(!is_working_day(&berlin(2024, 10, 6, 12, 0)));
        assert!(is_working_day(&berlin(2024, 10, 7, 12, 0)));
    }
}
