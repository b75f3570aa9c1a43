//! Clinic-local calendar arithmetic.
//!
//! Appointments are stored as UTC instants while schedule slots are authored as a
//! clinic-local date plus time of day. `ClinicCalendar` converts between the two
//! using the clinic's fixed UTC offset.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, DateTime, Duration, FixedOffset, Months, NaiveDate, NaiveTime, Offset, Utc};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeWindowError {
    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("invalid time of day '{0}', expected HH:MM or HH:MM:SS")]
    InvalidTime(String),

    #[error("invalid month '{0}', expected YYYY-MM")]
    InvalidMonth(String),

    #[error("UTC offset of {0} minutes is out of range")]
    InvalidOffset(i32),
}

pub fn parse_date(value: &str) -> Result<NaiveDate, TimeWindowError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| TimeWindowError::InvalidDate(value.to_string()))
}

pub fn parse_time_of_day(value: &str) -> Result<NaiveTime, TimeWindowError> {
    let trimmed = value.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
        .map_err(|_| TimeWindowError::InvalidTime(value.to_string()))
}

/// The Sunday on or before `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_sunday()))
}

/// A calendar month, written `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct YearMonth {
    first_day: NaiveDate,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|first_day| Self { first_day })
    }

    /// The month containing `date`.
    pub fn of(date: NaiveDate) -> Self {
        Self {
            first_day: date - Duration::days(i64::from(date.day0())),
        }
    }

    pub fn first_day(&self) -> NaiveDate {
        self.first_day
    }

    pub fn last_day(&self) -> NaiveDate {
        self.first_day
            .checked_add_months(Months::new(1))
            .and_then(|next| next.pred_opt())
            .unwrap_or(self.first_day)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.first_day && date <= self.last_day()
    }
}

impl FromStr for YearMonth {
    type Err = TimeWindowError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || TimeWindowError::InvalidMonth(value.to_string());
        let (year, month) = value.trim().split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        YearMonth::new(year, month).ok_or_else(invalid)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.first_day.format("%Y-%m"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClinicCalendar {
    offset: FixedOffset,
}

impl Default for ClinicCalendar {
    fn default() -> Self {
        Self::utc()
    }
}

impl ClinicCalendar {
    pub fn new(offset_minutes: i32) -> Result<Self, TimeWindowError> {
        FixedOffset::east_opt(offset_minutes.saturating_mul(60))
            .map(|offset| Self { offset })
            .ok_or(TimeWindowError::InvalidOffset(offset_minutes))
    }

    pub fn utc() -> Self {
        Self { offset: Utc.fix() }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }

    pub fn local_time(&self, instant: DateTime<Utc>) -> NaiveTime {
        instant.with_timezone(&self.offset).time()
    }

    /// Clinic-local date and time of day as a UTC instant.
    pub fn to_instant(&self, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
        let local = date.and_time(time);
        (local - Duration::seconds(i64::from(self.offset.local_minus_utc()))).and_utc()
    }

    /// `[start, end)` of a clinic-local day in UTC.
    pub fn day_bounds(&self, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self.to_instant(date, NaiveTime::MIN);
        (start, start + Duration::days(1))
    }

    /// Hourly instants from `opening_hour` up to (not including) `closing_hour`.
    pub fn hourly_grid(&self, date: NaiveDate, opening_hour: u32, closing_hour: u32) -> Vec<DateTime<Utc>> {
        (opening_hour..closing_hour)
            .filter_map(|hour| NaiveTime::from_hms_opt(hour, 0, 0))
            .map(|time| self.to_instant(date, time))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::TimeZone;

    #[test]
    fn parses_dates_and_times() {
        assert_eq!(parse_date("2025-06-10").unwrap(), NaiveDate::from_ymd_opt(2025, 6, 10).unwrap());
        assert_matches!(parse_date("10/06/2025"), Err(TimeWindowError::InvalidDate(_)));
        assert_eq!(parse_time_of_day("09:00").unwrap(), NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert_eq!(parse_time_of_day("13:30:15").unwrap(), NaiveTime::from_hms_opt(13, 30, 15).unwrap());
        assert_matches!(parse_time_of_day("noon"), Err(TimeWindowError::InvalidTime(_)));
    }

    #[test]
    fn year_month_bounds() {
        let june: YearMonth = "2025-06".parse().unwrap();
        assert_eq!(june.first_day(), NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
        assert_eq!(june.last_day(), NaiveDate::from_ymd_opt(2025, 6, 30).unwrap());
        assert!(june.contains(NaiveDate::from_ymd_opt(2025, 6, 30).unwrap()));
        assert!(!june.contains(NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()));
        assert_eq!(june.to_string(), "2025-06");

        let feb: YearMonth = "2024-02".parse().unwrap();
        assert_eq!(feb.last_day(), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());

        assert_eq!(YearMonth::of(NaiveDate::from_ymd_opt(2025, 6, 17).unwrap()), june);
        assert!("2025-13".parse::<YearMonth>().is_err());
        assert!("2025-6".parse::<YearMonth>().is_err());
    }

    #[test]
    fn weeks_start_on_sunday() {
        let sunday = NaiveDate::from_ymd_opt(2025, 6, 8).unwrap();
        assert_eq!(week_start(sunday), sunday);
        assert_eq!(week_start(NaiveDate::from_ymd_opt(2025, 6, 14).unwrap()), sunday);
        // Crosses into the previous month.
        assert_eq!(
            week_start(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()),
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
        );
        assert_eq!(
            week_start(NaiveDate::from_ymd_opt(2025, 7, 2).unwrap()),
            NaiveDate::from_ymd_opt(2025, 6, 29).unwrap()
        );
    }

    #[test]
    fn converts_local_slot_to_utc_instant() {
        let taipei = ClinicCalendar::new(8 * 60).unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();

        let instant = taipei.to_instant(date, nine);
        assert_eq!(instant, Utc.with_ymd_and_hms(2025, 6, 10, 1, 0, 0).unwrap());
        assert_eq!(taipei.local_date(instant), date);
        assert_eq!(taipei.local_time(instant), nine);
    }

    #[test]
    fn local_date_crosses_utc_midnight() {
        let taipei = ClinicCalendar::new(8 * 60).unwrap();
        let instant = Utc.with_ymd_and_hms(2025, 6, 9, 17, 30, 0).unwrap();
        assert_eq!(taipei.local_date(instant), NaiveDate::from_ymd_opt(2025, 6, 10).unwrap());

        let (start, end) = taipei.day_bounds(NaiveDate::from_ymd_opt(2025, 6, 10).unwrap());
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 6, 9, 16, 0, 0).unwrap());
        assert_eq!(end - start, Duration::days(1));
    }

    #[test]
    fn hourly_grid_excludes_closing_hour() {
        let grid = ClinicCalendar::utc().hourly_grid(NaiveDate::from_ymd_opt(2025, 6, 10).unwrap(), 9, 12);
        assert_eq!(grid.len(), 3);
        assert_eq!(grid[0], Utc.with_ymd_and_hms(2025, 6, 10, 9, 0, 0).unwrap());
        assert_eq!(grid[2], Utc.with_ymd_and_hms(2025, 6, 10, 11, 0, 0).unwrap());
    }

    #[test]
    fn rejects_out_of_range_offset() {
        assert_matches!(ClinicCalendar::new(60 * 30), Err(TimeWindowError::InvalidOffset(1800)));
    }
}
