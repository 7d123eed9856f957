//! Reporting windows and trend bucketing.

use core::str::FromStr;

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// A half-open time window `[start, end)`.
///
/// A record dated exactly at `end` is outside the window; one dated at
/// `start` is inside. `start == end` is a valid, empty window.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> DomainResult<Self> {
        if start > end {
            return Err(DomainError::validation(format!(
                "window start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// The `days` leading up to `now`: `[now - days, now)`.
    pub fn trailing_days(now: DateTime<Utc>, days: u32) -> Self {
        let start = now
            .checked_sub_signed(Duration::days(i64::from(days)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self { start, end: now }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Granularity of a revenue trend.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendInterval {
    Daily,
    Weekly,
    Monthly,
}

impl TrendInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendInterval::Daily => "daily",
            TrendInterval::Weekly => "weekly",
            TrendInterval::Monthly => "monthly",
        }
    }

    /// Bucket label for a timestamp.
    ///
    /// - daily: `YYYY-MM-DD`
    /// - weekly: ISO week, `YYYY-Www` (ISO year, which may differ from the calendar year)
    /// - monthly: `YYYY-MM`
    ///
    /// Labels sort lexicographically in chronological order.
    pub fn bucket_label(&self, at: DateTime<Utc>) -> String {
        match self {
            TrendInterval::Daily => at.format("%Y-%m-%d").to_string(),
            TrendInterval::Weekly => {
                let week = at.iso_week();
                format!("{:04}-W{:02}", week.year(), week.week())
            }
            TrendInterval::Monthly => format!("{:04}-{:02}", at.year(), at.month()),
        }
    }
}

impl FromStr for TrendInterval {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Ok(TrendInterval::Daily),
            "weekly" => Ok(TrendInterval::Weekly),
            "monthly" => Ok(TrendInterval::Monthly),
            _ => Err(DomainError::validation(
                "interval must be one of: daily, weekly, monthly",
            )),
        }
    }
}
