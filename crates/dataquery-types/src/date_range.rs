//! Date range and day iteration.

use chrono::{Datelike, NaiveDate, Weekday};

use crate::DateRangeError;

/// A range of file dates for batch retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    /// Start date (inclusive).
    pub start: NaiveDate,
    /// End date (inclusive).
    pub end: NaiveDate,
}

impl DateRange {
    /// Creates a new date range, validating that start <= end.
    ///
    /// # Errors
    ///
    /// Returns an error if start > end.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, DateRangeError> {
        if start > end {
            return Err(DateRangeError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Parses a date range from two `YYYYMMDD` or `YYYY-MM-DD` strings.
    ///
    /// # Errors
    ///
    /// Returns an error if either date is malformed or start > end.
    pub fn parse(start: &str, end: &str) -> Result<Self, DateRangeError> {
        Self::new(parse_file_datetime(start)?, parse_file_datetime(end)?)
    }

    /// Creates a date range for a single day.
    #[must_use]
    pub const fn single_day(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    /// Returns an iterator over every calendar day in the range.
    pub const fn days(&self) -> DayIterator {
        DayIterator::new(self.start, self.end, false)
    }

    /// Returns an iterator over Monday-to-Friday days in the range.
    pub const fn weekdays(&self) -> DayIterator {
        DayIterator::new(self.start, self.end, true)
    }

    /// Returns the total number of days in the range.
    #[must_use]
    pub fn total_days(&self) -> usize {
        ((self.end - self.start).num_days() + 1) as usize
    }

    /// Returns true if the range contains the given date.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

/// Iterator over the days of a date range.
#[derive(Debug, Clone)]
pub struct DayIterator {
    current: Option<NaiveDate>,
    end: NaiveDate,
    weekdays_only: bool,
}

impl DayIterator {
    const fn new(start: NaiveDate, end: NaiveDate, weekdays_only: bool) -> Self {
        Self {
            current: Some(start),
            end,
            weekdays_only,
        }
    }
}

impl Iterator for DayIterator {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let day = self.current.filter(|d| *d <= self.end)?;
            self.current = day.succ_opt();
            if !self.weekdays_only || !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
                return Some(day);
            }
        }
    }
}

/// Formats a date the way the file API expects it (`YYYYMMDD`).
#[must_use]
pub fn file_datetime(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Parses a `YYYYMMDD` or `YYYY-MM-DD` date.
///
/// # Errors
///
/// Returns an error if the string matches neither format.
pub fn parse_file_datetime(s: &str) -> Result<NaiveDate, DateRangeError> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .map_err(|_| DateRangeError::InvalidDate(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_date_range_new() {
        let range = DateRange::new(date(2024, 1, 1), date(2024, 1, 31)).unwrap();
        assert_eq!(range.start, date(2024, 1, 1));
        assert_eq!(range.end, date(2024, 1, 31));
        assert_eq!(range.total_days(), 31);
    }

    #[test]
    fn test_date_range_invalid() {
        assert!(DateRange::new(date(2024, 1, 31), date(2024, 1, 1)).is_err());
    }

    #[test]
    fn test_days_iterator() {
        let range = DateRange::new(date(2024, 2, 27), date(2024, 3, 2)).unwrap();
        let days: Vec<_> = range.days().collect();
        assert_eq!(days.len(), 5);
        assert_eq!(days[2], date(2024, 2, 29));
        assert_eq!(days[4], date(2024, 3, 2));
    }

    #[test]
    fn test_weekdays_iterator() {
        // 2024-01-05 is a Friday, 2024-01-08 a Monday
        let range = DateRange::new(date(2024, 1, 5), date(2024, 1, 8)).unwrap();
        let days: Vec<_> = range.weekdays().collect();
        assert_eq!(days, vec![date(2024, 1, 5), date(2024, 1, 8)]);
    }

    #[test]
    fn test_file_datetime_round_trip() {
        assert_eq!(file_datetime(date(2024, 3, 9)), "20240309");
        assert_eq!(parse_file_datetime("20240309").unwrap(), date(2024, 3, 9));
        assert_eq!(parse_file_datetime("2024-03-09").unwrap(), date(2024, 3, 9));
        assert!(parse_file_datetime("09/03/2024").is_err());
    }

    #[test]
    fn test_parse_range() {
        let range = DateRange::parse("20240101", "2024-01-10").unwrap();
        assert_eq!(range.total_days(), 10);
    }
}
