use crate::error::RiskError;
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Offset, Utc};

/// Calendar boundaries for the loss limits, in a fixed reference timezone.
///
/// A day starts at 00:00 local time; a week starts Monday 00:00.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskWindow {
    offset: FixedOffset,
}

impl RiskWindow {
    pub fn new(utc_offset_hours: i32) -> Result<Self, RiskError> {
        let offset = FixedOffset::east_opt(utc_offset_hours * 3600).ok_or_else(|| {
            RiskError::InvalidParameters(format!("UTC offset of {utc_offset_hours}h is out of range"))
        })?;
        Ok(Self { offset })
    }

    pub fn utc() -> Self {
        Self { offset: Utc.fix() }
    }

    /// The reference-timezone date `now` falls on.
    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset).date_naive()
    }

    /// The Monday of the week `now` falls in.
    pub fn week_start(&self, now: DateTime<Utc>) -> NaiveDate {
        let today = self.today(now);
        today - Duration::days(i64::from(today.weekday().num_days_from_monday()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn week_starts_on_monday() {
        let window = RiskWindow::utc();
        // Thursday
        let now = Utc.with_ymd_and_hms(2024, 3, 7, 15, 0, 0).unwrap();
        assert_eq!(window.week_start(now), NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        // Monday itself
        let monday = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
        assert_eq!(window.week_start(monday), NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
    }

    #[test]
    fn offset_moves_the_day_boundary() {
        // 22:00 UTC Sunday is already Monday in UTC+3.
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 22, 0, 0).unwrap();
        assert_eq!(RiskWindow::utc().today(now), NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());
        let plus_three = RiskWindow::new(3).unwrap();
        assert_eq!(plus_three.today(now), NaiveDate::from_ymd_opt(2024, 3, 11).unwrap());
        assert_eq!(plus_three.week_start(now), NaiveDate::from_ymd_opt(2024, 3, 11).unwrap());
    }

    #[test]
    fn absurd_offset_is_rejected() {
        assert!(RiskWindow::new(30).is_err());
    }
}
