//! Detention model and session grouping

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::DayOfWeek;
use crate::error::{Error, Result};
use crate::util::is_iso_date;

/// Time slot of a double-period detention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimePeriod {
    #[serde(rename = "16:00-16:15")]
    From1600,
    #[serde(rename = "16:15-16:30")]
    From1615,
    #[serde(rename = "16:30-16:45")]
    From1630,
    #[serde(rename = "16:45-17:00")]
    From1645,
    #[serde(rename = "17:00-17:15")]
    From1700,
    #[serde(rename = "17:15-17:30")]
    From1715,
    #[serde(rename = "17:30-17:40")]
    From1730,
}

impl TimePeriod {
    pub const ALL: [Self; 7] = [
        Self::From1600,
        Self::From1615,
        Self::From1630,
        Self::From1645,
        Self::From1700,
        Self::From1715,
        Self::From1730,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::From1600 => "16:00-16:15",
            Self::From1615 => "16:15-16:30",
            Self::From1630 => "16:30-16:45",
            Self::From1645 => "16:45-17:00",
            Self::From1700 => "17:00-17:15",
            Self::From1715 => "17:15-17:30",
            Self::From1730 => "17:30-17:40",
        }
    }
}

impl fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimePeriod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|period| period.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown time period: {s}")))
    }
}

/// One student's detention on a given session date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detention {
    pub id: String,
    /// Position within the session, 1-based
    pub number: u32,
    /// Session date, `YYYY-MM-DD`
    pub date: String,
    pub day_of_week: DayOfWeek,
    /// Student label, e.g. `Luca Vandenbroucke - 2 aarde Move`
    pub student: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    /// Date registered in the school's LVS system
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lvs_date: Option<String>,
    #[serde(default)]
    pub should_print: bool,
    #[serde(default)]
    pub can_use_chromebook: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_double_period: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_period: Option<TimePeriod>,
}

impl Detention {
    /// Create a detention with only the required fields set.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        number: u32,
        date: impl Into<String>,
        day_of_week: DayOfWeek,
        student: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            number,
            date: date.into(),
            day_of_week,
            student: student.into(),
            teacher: None,
            reason: None,
            task: None,
            lvs_date: None,
            should_print: false,
            can_use_chromebook: false,
            extra_notes: None,
            is_double_period: None,
            time_period: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::InvalidInput("Detention id cannot be empty".into()));
        }
        if self.student.trim().is_empty() {
            return Err(Error::InvalidInput(
                "Detention student cannot be empty".into(),
            ));
        }
        if !is_iso_date(&self.date) {
            return Err(Error::InvalidInput(format!(
                "Detention date must be YYYY-MM-DD, got {}",
                self.date
            )));
        }
        if let Some(lvs_date) = &self.lvs_date {
            if !is_iso_date(lvs_date) {
                return Err(Error::InvalidInput(format!(
                    "LVS date must be YYYY-MM-DD, got {lvs_date}"
                )));
            }
        }
        if self.is_double_period == Some(true) && !self.day_of_week.allows_double_period() {
            return Err(Error::InvalidInput(
                "Double periods are only held on MAANDAG".into(),
            ));
        }
        Ok(())
    }
}

/// All detentions of a single session date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetentionSession {
    pub date: String,
    pub day_of_week: DayOfWeek,
    pub detentions: Vec<Detention>,
}

/// Detentions for an optional date, ordered by date then session number.
#[must_use]
pub fn filter_by_date(detentions: &[Detention], date: Option<&str>) -> Vec<Detention> {
    let mut filtered: Vec<Detention> = detentions
        .iter()
        .filter(|detention| date.map_or(true, |date| detention.date == date))
        .cloned()
        .collect();
    filtered.sort_by(|a, b| a.date.cmp(&b.date).then(a.number.cmp(&b.number)));
    filtered
}

/// Detentions whose date lies in `start..=end`, ordered by date then number.
///
/// ISO dates compare correctly as strings.
#[must_use]
pub fn filter_by_date_range(detentions: &[Detention], start: &str, end: &str) -> Vec<Detention> {
    let mut filtered: Vec<Detention> = detentions
        .iter()
        .filter(|detention| detention.date.as_str() >= start && detention.date.as_str() <= end)
        .cloned()
        .collect();
    filtered.sort_by(|a, b| a.date.cmp(&b.date).then(a.number.cmp(&b.number)));
    filtered
}

/// Group detentions into sessions, oldest date first.
#[must_use]
pub fn group_sessions(detentions: &[Detention]) -> Vec<DetentionSession> {
    let mut by_date: BTreeMap<&str, Vec<Detention>> = BTreeMap::new();
    for detention in detentions {
        by_date
            .entry(detention.date.as_str())
            .or_default()
            .push(detention.clone());
    }

    by_date
        .into_iter()
        .map(|(date, mut detentions)| {
            detentions.sort_by_key(|detention| detention.number);
            DetentionSession {
                date: date.to_string(),
                day_of_week: detentions[0].day_of_week,
                detentions,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn detention(id: &str, number: u32, date: &str) -> Detention {
        Detention::new(id, number, date, DayOfWeek::Maandag, "Jan - 2A")
    }

    #[test]
    fn serializes_camel_case_and_skips_empty_optionals() {
        let mut record = detention("d1", 1, "2024-09-16");
        record.time_period = Some(TimePeriod::From1615);
        record.is_double_period = Some(true);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": "d1",
                "number": 1,
                "date": "2024-09-16",
                "dayOfWeek": "MAANDAG",
                "student": "Jan - 2A",
                "shouldPrint": false,
                "canUseChromebook": false,
                "isDoublePeriod": true,
                "timePeriod": "16:15-16:30"
            })
        );
    }

    #[test]
    fn deserializes_minimal_remote_payload() {
        let record: Detention = serde_json::from_value(serde_json::json!({
            "id": "d2",
            "number": 3,
            "date": "2024-09-17",
            "dayOfWeek": "DINSDAG",
            "student": "Anna - 3C",
            "teacher": "VDB"
        }))
        .unwrap();

        assert_eq!(record.teacher.as_deref(), Some("VDB"));
        assert!(!record.should_print);
        assert_eq!(record.time_period, None);
    }

    #[test]
    fn validate_checks_dates_and_double_period_day() {
        assert!(detention("d1", 1, "2024-09-16").validate().is_ok());
        assert!(detention("d1", 1, "16/09/2024").validate().is_err());

        let mut tuesday = Detention::new("d3", 1, "2024-09-17", DayOfWeek::Dinsdag, "Bram");
        tuesday.is_double_period = Some(true);
        assert!(tuesday.validate().is_err());
    }

    #[test]
    fn filter_by_date_sorts_by_number() {
        let records = vec![
            detention("a", 3, "2024-09-16"),
            detention("b", 1, "2024-09-16"),
            detention("c", 2, "2024-09-23"),
        ];

        let ids: Vec<String> = filter_by_date(&records, Some("2024-09-16"))
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn filter_by_date_range_is_inclusive() {
        let records = vec![
            detention("a", 1, "2024-09-09"),
            detention("b", 1, "2024-09-16"),
            detention("c", 1, "2024-09-23"),
            detention("d", 1, "2024-09-30"),
        ];

        let ids: Vec<String> = filter_by_date_range(&records, "2024-09-16", "2024-09-23")
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn group_sessions_orders_dates_and_numbers() {
        let records = vec![
            detention("late", 2, "2024-09-23"),
            detention("b", 2, "2024-09-16"),
            detention("a", 1, "2024-09-16"),
        ];

        let sessions = group_sessions(&records);
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].date, "2024-09-16");
        assert_eq!(
            sessions[0]
                .detentions
                .iter()
                .map(|d| d.id.as_str())
                .collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert_eq!(sessions[1].detentions[0].id, "late");
    }
}
