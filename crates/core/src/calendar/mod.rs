//! Trading-session calendar.
//!
//! Pure classification of timezone-aware instants against a market's
//! open/close bounds. All operations convert the instant into the session
//! timezone before comparing; timezone-naive instants are unrepresentable
//! in this API.

use chrono::{DateTime, Datelike, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

/// A market's regular trading session: weekday-only, with wall-clock
/// open/close bounds in the market's local timezone.
///
/// Defaults to the NYSE regular session, 09:30-16:00 America/New_York.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketSession {
    open_time: NaiveTime,
    close_time: NaiveTime,
    tz: Tz,
}

impl Default for MarketSession {
    fn default() -> Self {
        Self {
            open_time: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            close_time: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            tz: chrono_tz::America::New_York,
        }
    }
}

impl MarketSession {
    pub fn new(open_time: NaiveTime, close_time: NaiveTime, tz: Tz) -> Self {
        Self {
            open_time,
            close_time,
            tz,
        }
    }

    pub fn open_time(&self) -> NaiveTime {
        self.open_time
    }

    pub fn close_time(&self) -> NaiveTime {
        self.close_time
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    /// Current instant in the session timezone.
    pub fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.tz)
    }

    /// Time-of-day of the instant on the market's wall clock.
    fn local_time<T: TimeZone>(&self, instant: &DateTime<T>) -> NaiveTime {
        instant.with_timezone(&self.tz).time()
    }

    /// True for Monday-Friday in the market's local time.
    pub fn is_weekday<T: TimeZone>(&self, instant: &DateTime<T>) -> bool {
        instant
            .with_timezone(&self.tz)
            .weekday()
            .num_days_from_monday()
            < 5
    }

    /// True iff the instant falls on a weekday with local time-of-day
    /// within `[open_time, close_time]` inclusive.
    pub fn is_in_session<T: TimeZone>(&self, instant: &DateTime<T>) -> bool {
        if !self.is_weekday(instant) {
            return false;
        }
        let t = self.local_time(instant);
        self.open_time <= t && t <= self.close_time
    }

    /// True iff local time-of-day is strictly before the open.
    pub fn is_before_open<T: TimeZone>(&self, instant: &DateTime<T>) -> bool {
        self.local_time(instant) < self.open_time
    }

    /// True iff local time-of-day is strictly after the close.
    pub fn is_after_close<T: TimeZone>(&self, instant: &DateTime<T>) -> bool {
        self.local_time(instant) > self.close_time
    }

    /// Seconds elapsed since the close on the instant's local day, if any.
    pub fn seconds_after_close<T: TimeZone>(&self, instant: &DateTime<T>) -> Option<i64> {
        let t = self.local_time(instant);
        if t > self.close_time {
            let elapsed = t.num_seconds_from_midnight() as i64
                - self.close_time.num_seconds_from_midnight() as i64;
            Some(elapsed)
        } else {
            None
        }
    }
}
