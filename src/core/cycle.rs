//! Cycle model: recurring time periods that group scenarios.
//!
//! Two scenarios created with the same frequency inside the same period
//! share a single cycle; the manager deduplicates on
//! `(frequency, period_start)`. Period boundaries are fixed here: daily
//! periods start at 00:00 UTC, weekly periods start on Monday (ISO-8601),
//! monthly periods on the 1st and yearly periods on January 1st.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CycleId(pub Uuid);

impl CycleId {
    /// Create a new unique cycle identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for CycleId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CycleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for CycleId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Recurrence frequency of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Frequency::Daily => write!(f, "daily"),
            Frequency::Weekly => write!(f, "weekly"),
            Frequency::Monthly => write!(f, "monthly"),
            Frequency::Yearly => write!(f, "yearly"),
        }
    }
}

impl Frequency {
    /// Start of the period containing `at`.
    pub fn period_start(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let date = at.date_naive();
        let start_date = match self {
            Frequency::Daily => date,
            Frequency::Weekly => {
                let back = date.weekday().num_days_from_monday() as i64;
                date - Duration::days(back)
            }
            Frequency::Monthly => date.with_day(1).unwrap_or(date),
            Frequency::Yearly => date.with_day(1).and_then(|d| d.with_month(1)).unwrap_or(date),
        };
        Utc.from_utc_datetime(&start_date.and_time(chrono::NaiveTime::MIN))
    }

    /// Start of the period immediately after the one containing `at`.
    pub fn next_period_start(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let start = self.period_start(at);
        match self {
            Frequency::Daily => start + Duration::days(1),
            Frequency::Weekly => start + Duration::days(7),
            Frequency::Monthly => {
                let date = start.date_naive();
                let (y, m) = if date.month() == 12 {
                    (date.year() + 1, 1)
                } else {
                    (date.year(), date.month() + 1)
                };
                let next = date.with_year(y).and_then(|d| d.with_month(m)).unwrap_or(date);
                Utc.from_utc_datetime(&next.and_time(chrono::NaiveTime::MIN))
            }
            Frequency::Yearly => {
                let date = start.date_naive();
                let next = date.with_year(date.year() + 1).unwrap_or(date);
                Utc.from_utc_datetime(&next.and_time(chrono::NaiveTime::MIN))
            }
        }
    }
}

/// A recurring time period grouping scenarios.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cycle {
    /// Unique identifier for this cycle.
    pub id: CycleId,
    /// Recurrence frequency.
    pub frequency: Frequency,
    /// Human-readable name derived from the period start.
    pub name: String,
    /// When the cycle record was created.
    pub creation_date: DateTime<Utc>,
    /// Inclusive start of the period.
    pub start: DateTime<Utc>,
    /// Inclusive end of the period (last instant before the next one).
    pub end: DateTime<Utc>,
}

impl Cycle {
    /// Create the cycle covering the period that contains `at`.
    pub fn new(frequency: Frequency, at: DateTime<Utc>) -> Self {
        let start = frequency.period_start(at);
        let end = frequency.next_period_start(at) - Duration::nanoseconds(1);
        let name = format!("{}_{}", frequency, start.format("%Y-%m-%d"));
        Self {
            id: CycleId::new(),
            frequency,
            name,
            creation_date: Utc::now(),
            start,
            end,
        }
    }

    /// Whether `at` falls inside this cycle's period.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}
