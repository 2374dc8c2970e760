//! Seller availability windows

use chrono::{Datelike, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Day of week, Sunday = 0 through Saturday = 6
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayOfWeek {
    Sunday = 0,
    Monday = 1,
    Tuesday = 2,
    Wednesday = 3,
    Thursday = 4,
    Friday = 5,
    Saturday = 6,
}

impl DayOfWeek {
    const ALL: [DayOfWeek; 7] = [
        DayOfWeek::Sunday,
        DayOfWeek::Monday,
        DayOfWeek::Tuesday,
        DayOfWeek::Wednesday,
        DayOfWeek::Thursday,
        DayOfWeek::Friday,
        DayOfWeek::Saturday,
    ];

    /// Weekday of a calendar date
    pub fn from_date(date: NaiveDate) -> Self {
        Self::ALL[date.weekday().num_days_from_sunday() as usize]
    }

    /// Integer form as stored
    pub fn index(self) -> i16 {
        self as i16
    }

    /// Rebuild from the stored integer
    pub fn from_index(index: i16) -> Result<Self> {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
            .ok_or_else(|| Error::ValidationError(format!("invalid day of week {}", index)))
    }

    pub fn name(self) -> &'static str {
        match self {
            DayOfWeek::Sunday => "Sunday",
            DayOfWeek::Monday => "Monday",
            DayOfWeek::Tuesday => "Tuesday",
            DayOfWeek::Wednesday => "Wednesday",
            DayOfWeek::Thursday => "Thursday",
            DayOfWeek::Friday => "Friday",
            DayOfWeek::Saturday => "Saturday",
        }
    }
}

impl std::fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

text_enum! {
    /// Window status; windows are deactivated, not deleted
    pub enum WindowStatus {
        Active => "active",
        Inactive => "inactive",
    }
}

/// Weekly time range during which a seller accepts meetings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub day: DayOfWeek,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub status: WindowStatus,
}

impl AvailabilityWindow {
    /// Create an active window; start must precede end
    pub fn new(seller_id: Uuid, day: DayOfWeek, start: NaiveTime, end: NaiveTime) -> Result<Self> {
        if start >= end {
            return Err(Error::ValidationError(format!(
                "window start {} must be before end {}",
                start.format("%H:%M"),
                end.format("%H:%M")
            )));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            seller_id,
            day,
            start,
            end,
            status: WindowStatus::Active,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == WindowStatus::Active
    }

    /// Inclusive on both bounds
    pub fn contains(&self, day: DayOfWeek, time: NaiveTime) -> bool {
        self.is_active() && self.day == day && self.start <= time && time <= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weekday_numbering_starts_on_sunday() {
        let sunday = NaiveDate::from_ymd_opt(2024, 6, 2).unwrap();
        let tuesday = NaiveDate::from_ymd_opt(2024, 6, 4).unwrap();
        assert_eq!(DayOfWeek::from_date(sunday).index(), 0);
        assert_eq!(DayOfWeek::from_date(tuesday), DayOfWeek::Tuesday);
        assert_eq!(DayOfWeek::from_index(6).unwrap(), DayOfWeek::Saturday);
        assert!(DayOfWeek::from_index(7).is_err());
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let start = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let end = NaiveTime::from_hms_opt(12, 0, 0).unwrap();
        let window = AvailabilityWindow::new(Uuid::new_v4(), DayOfWeek::Tuesday, start, end).unwrap();

        assert!(window.contains(DayOfWeek::Tuesday, start));
        assert!(window.contains(DayOfWeek::Tuesday, end));
        assert!(!window.contains(DayOfWeek::Tuesday, NaiveTime::from_hms_opt(13, 0, 0).unwrap()));
        assert!(!window.contains(DayOfWeek::Monday, start));
        assert!(AvailabilityWindow::new(Uuid::new_v4(), DayOfWeek::Tuesday, end, start).is_err());
    }
}
