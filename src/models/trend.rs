use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Day,
    Week,
    Month,
}

impl Granularity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }

    /// First day of the bucket containing `date`.
    pub fn bucket_start(self, date: NaiveDate) -> NaiveDate {
        match self {
            Self::Day => date,
            Self::Week => find_monday(date),
            Self::Month => date.with_day(1).unwrap_or(date),
        }
    }

    /// First day of the bucket after the one starting at `bucket`, or `None`
    /// past the last representable date.
    pub fn next_bucket(self, bucket: NaiveDate) -> Option<NaiveDate> {
        match self {
            Self::Day => bucket.succ_opt(),
            Self::Week => bucket.checked_add_signed(Duration::days(7)),
            Self::Month => {
                let (year, month) = if bucket.month() == 12 {
                    (bucket.year().checked_add(1)?, 1)
                } else {
                    (bucket.year(), bucket.month() + 1)
                };
                NaiveDate::from_ymd_opt(year, month, 1)
            }
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            other => Err(format!("unsupported granularity: {other}")),
        }
    }
}

fn find_monday(date: NaiveDate) -> NaiveDate {
    let weekday = date.weekday().num_days_from_monday(); // Mon=0
    date.checked_sub_signed(Duration::days(weekday as i64))
        .unwrap_or(NaiveDate::MIN)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub avg_score: Option<f64>,
}

/// Cache key for a precomputed trend series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrendKey {
    pub user_id: Uuid,
    pub range_start: NaiveDate,
    pub range_end: NaiveDate,
    pub granularity: Granularity,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendSeries {
    pub user_id: Uuid,
    pub range_start: NaiveDate,
    pub range_end: NaiveDate,
    pub granularity: Granularity,
    pub points: Vec<TrendPoint>,
}

impl TrendSeries {
    pub fn key(&self) -> TrendKey {
        TrendKey {
            user_id: self.user_id,
            range_start: self.range_start,
            range_end: self.range_end,
            granularity: self.granularity,
        }
    }
}
