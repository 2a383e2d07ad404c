use std::{fmt, path::PathBuf, str::FromStr};

use chrono::{Datelike, Local, NaiveDate};

use crate::error::{JournalError, Result};

/// Lifecycle state of the encrypted volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum VolumeState {
    /// No mount process is running.
    Unmounted = 0,
    /// A mount process was spawned and its outcome is pending.
    Mounting = 1,
    /// The plaintext view is available.
    Mounted = 2,
    /// The mount process was asked to exit.
    Unmounting = 3,
}

impl VolumeState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Mounting,
            2 => Self::Mounted,
            3 => Self::Unmounting,
            _ => Self::Unmounted,
        }
    }
}

/// Kind of change observed under the mount path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// File or directory was created.
    Create,
    /// File contents were written.
    Write,
    /// File or directory was removed.
    Remove,
    /// File or directory was renamed.
    Rename,
}

/// One filesystem notification observed while mounted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Absolute path of the changed file.
    pub path: PathBuf,
    /// Operation kind.
    pub kind: ChangeKind,
}

/// Calendar day identifying one journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryDate(NaiveDate);

impl EntryDate {
    /// Creates a validated entry date.
    pub fn new(year: i32, month: u32, day: u32) -> Result<Self> {
        if !(0..=9999).contains(&year) {
            return Err(JournalError::InvalidDate(format!(
                "year {year} is outside 0000..=9999"
            )));
        }
        NaiveDate::from_ymd_opt(year, month, day)
            .map(Self)
            .ok_or_else(|| {
                JournalError::InvalidDate(format!("{year:04}/{month:02}/{day:02} is not a date"))
            })
    }

    /// Returns the local calendar day.
    pub fn today() -> Self {
        Self(Local::now().date_naive())
    }

    /// Year component.
    pub fn year(&self) -> i32 {
        self.0.year()
    }

    /// Month component (1-based).
    pub fn month(&self) -> u32 {
        self.0.month()
    }

    /// Day-of-month component (1-based).
    pub fn day(&self) -> u32 {
        self.0.day()
    }

    /// Underlying chrono date.
    pub fn as_naive(&self) -> NaiveDate {
        self.0
    }

    /// Header written at the top of a freshly created entry, e.g. `Thu - 07 Mar 2024`.
    pub fn heading(&self) -> String {
        self.0.format("%a - %d %b %Y").to_string()
    }

    /// Short human-readable label, e.g. `07 Mar 2024`.
    pub fn label(&self) -> String {
        self.0.format("%d %b %Y").to_string()
    }

    /// Shifts by a signed number of days, saturating at the representable range.
    pub fn add_days(&self, days: i64) -> Self {
        let shifted = if days >= 0 {
            self.0.checked_add_days(chrono::Days::new(days.unsigned_abs()))
        } else {
            self.0.checked_sub_days(chrono::Days::new(days.unsigned_abs()))
        };
        shifted.map(Self).unwrap_or(*self)
    }

    /// Shifts by a signed number of months, clamping the day to the target month length.
    pub fn add_months(&self, months: i32) -> Self {
        let shifted = if months >= 0 {
            self.0.checked_add_months(chrono::Months::new(months.unsigned_abs()))
        } else {
            self.0.checked_sub_months(chrono::Months::new(months.unsigned_abs()))
        };
        shifted.map(Self).unwrap_or(*self)
    }

    /// First day of this date's month.
    pub fn first_of_month(&self) -> Self {
        Self(self.0.with_day(1).unwrap_or(self.0))
    }
}

impl From<NaiveDate> for EntryDate {
    fn from(value: NaiveDate) -> Self {
        Self(value)
    }
}

impl fmt::Display for EntryDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}/{:02}/{:02}", self.year(), self.month(), self.day())
    }
}

/// Parses `YYYY/MM/DD` (also accepts `-` as separator).
impl FromStr for EntryDate {
    type Err = JournalError;

    fn from_str(value: &str) -> Result<Self> {
        let parts = value
            .trim()
            .split(['/', '-'])
            .collect::<Vec<_>>();
        if parts.len() != 3 {
            return Err(JournalError::InvalidDate(format!(
                "invalid date `{value}`: must be <year>/<month>/<day>"
            )));
        }
        let number = |part: &str| {
            part.parse::<u32>().map_err(|_| {
                JournalError::InvalidDate(format!("invalid date: `{part}` is not a number"))
            })
        };
        let year = number(parts[0])?;
        let month = number(parts[1])?;
        let day = number(parts[2])?;
        let year = i32::try_from(year)
            .map_err(|_| JournalError::InvalidDate(format!("year {year} is out of range")))?;
        Self::new(year, month, day)
    }
}

#[cfg(test)]
mod unit_tests {
    use super::{EntryDate, VolumeState};

    #[test]
    fn heading_uses_weekday_and_short_month() {
        let date = EntryDate::new(2024, 3, 7).unwrap();
        assert_eq!(date.heading(), "Thu - 07 Mar 2024");
        assert_eq!(date.label(), "07 Mar 2024");
    }

    #[test]
    fn rejects_impossible_dates() {
        assert!(EntryDate::new(2023, 2, 29).is_err());
        assert!(EntryDate::new(2024, 13, 1).is_err());
        assert!(EntryDate::new(2024, 2, 29).is_ok());
    }

    #[test]
    fn parses_slash_and_dash_separated_dates() {
        let expected = EntryDate::new(2024, 3, 7).unwrap();
        assert_eq!("2024/03/07".parse::<EntryDate>().unwrap(), expected);
        assert_eq!("2024-3-7".parse::<EntryDate>().unwrap(), expected);
        assert!("2024/03".parse::<EntryDate>().is_err());
        assert!("2024/xx/07".parse::<EntryDate>().is_err());
    }

    #[test]
    fn month_shift_clamps_day() {
        let date = EntryDate::new(2024, 1, 31).unwrap();
        assert_eq!(date.add_months(1), EntryDate::new(2024, 2, 29).unwrap());
        assert_eq!(date.add_months(-1), EntryDate::new(2023, 12, 31).unwrap());
    }

    #[test]
    fn unknown_state_byte_reads_as_unmounted() {
        assert_eq!(VolumeState::from_u8(2), VolumeState::Mounted);
        assert_eq!(VolumeState::from_u8(42), VolumeState::Unmounted);
    }
}
