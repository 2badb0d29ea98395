//! Student model

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Weekday on which detention sessions are held
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DayOfWeek {
    Maandag,
    Dinsdag,
    Donderdag,
}

impl DayOfWeek {
    /// All session days in week order
    pub const ALL: [Self; 3] = [Self::Maandag, Self::Dinsdag, Self::Donderdag];

    /// Wire representation (`MAANDAG`, ...)
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Maandag => "MAANDAG",
            Self::Dinsdag => "DINSDAG",
            Self::Donderdag => "DONDERDAG",
        }
    }

    /// Session day of a `YYYY-MM-DD` date, if sessions are held that weekday.
    #[must_use]
    pub fn for_date(date: &str) -> Option<Self> {
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
        match date.weekday() {
            Weekday::Mon => Some(Self::Maandag),
            Weekday::Tue => Some(Self::Dinsdag),
            Weekday::Thu => Some(Self::Donderdag),
            _ => None,
        }
    }

    /// Only Monday sessions can run as a double period
    #[must_use]
    pub const fn allows_double_period(self) -> bool {
        matches!(self, Self::Maandag)
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DayOfWeek {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MAANDAG" => Ok(Self::Maandag),
            "DINSDAG" => Ok(Self::Dinsdag),
            "DONDERDAG" => Ok(Self::Donderdag),
            other => Err(Error::InvalidInput(format!("Unknown session day: {other}"))),
        }
    }
}

/// A student assigned to a fixed detention day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    pub name: String,
    pub grade: String,
    pub day: DayOfWeek,
}

impl Student {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        grade: impl Into<String>,
        day: DayOfWeek,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            grade: grade.into(),
            day,
        }
    }

    /// Reject records the remote API would refuse anyway.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::InvalidInput("Student id cannot be empty".into()));
        }
        if self.name.trim().is_empty() {
            return Err(Error::InvalidInput("Student name cannot be empty".into()));
        }
        Ok(())
    }

    /// Label used on detention rows, e.g. `Jan Peeters - 2A`
    #[must_use]
    pub fn display_label(&self) -> String {
        if self.grade.trim().is_empty() {
            self.name.clone()
        } else {
            format!("{} - {}", self.name, self.grade)
        }
    }
}

/// Students for an optional day, sorted by name.
#[must_use]
pub fn filter_students(students: &[Student], day: Option<DayOfWeek>) -> Vec<Student> {
    let mut filtered: Vec<Student> = students
        .iter()
        .filter(|student| day.map_or(true, |day| student.day == day))
        .cloned()
        .collect();
    filtered.sort_by(|a, b| a.name.cmp(&b.name));
    filtered
}
