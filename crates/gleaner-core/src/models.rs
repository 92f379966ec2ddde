use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::fields::FieldSet;

/// Logical date partition of a run, written as `YYYYMMDD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunDate(NaiveDate);

impl RunDate {
    pub const FORMAT: &'static str = "%Y%m%d";

    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl FromStr for RunDate {
    type Err = AppError;

    /// Accepts exactly eight ASCII digits forming a real calendar date.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AppError::InvalidRunDate(s.to_string()));
        }
        NaiveDate::parse_from_str(s, Self::FORMAT)
            .map(RunDate)
            .map_err(|_| AppError::InvalidRunDate(s.to_string()))
    }
}

impl fmt::Display for RunDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(Self::FORMAT))
    }
}

impl Serialize for RunDate {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RunDate {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Which targets a run should process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    /// Every target with a location for the run date.
    All,
    /// Upstream population minus the keys already recorded for the run date.
    #[default]
    Missing,
}

impl SelectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionMode::All => "all",
            SelectionMode::Missing => "missing",
        }
    }
}

impl fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SelectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" => Ok(SelectionMode::All),
            "missing" => Ok(SelectionMode::Missing),
            _ => Err(format!("Unknown selection mode: {s} (expected 'all' or 'missing')")),
        }
    }
}

/// One unit of fetch work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub key: String,
    pub location: String,
}

impl Job {
    pub fn new(key: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            location: location.into(),
        }
    }
}

/// Terminal result of processing one [`Job`].
#[derive(Debug)]
pub enum Outcome {
    Success {
        key: String,
        fields: FieldSet,
    },
    Failure {
        key: String,
        error: AppError,
        attempts: u32,
    },
}

impl Outcome {
    pub fn key(&self) -> &str {
        match self {
            Outcome::Success { key, .. } | Outcome::Failure { key, .. } => key,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }
}

/// The durable unit, keyed by `(run_date, key)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub run_date: RunDate,
    pub key: String,
    pub fields: FieldSet,
}

impl Record {
    pub fn new(run_date: RunDate, key: impl Into<String>, fields: FieldSet) -> Self {
        Self {
            run_date,
            key: key.into(),
            fields,
        }
    }
}
