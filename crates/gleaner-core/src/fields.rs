use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The fixed set of values read from every target page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Rating,
    Sales,
    Profit,
    Scale,
    Cheap,
    Growth,
    Profitab,
    Safety,
    Risk,
    ReturnRate,
    Liquidity,
    Trend,
    Forex,
    Technical,
}

impl Field {
    pub const COUNT: usize = 14;

    /// Every field, in column order.
    pub const ALL: [Field; Field::COUNT] = [
        Field::Rating,
        Field::Sales,
        Field::Profit,
        Field::Scale,
        Field::Cheap,
        Field::Growth,
        Field::Profitab,
        Field::Safety,
        Field::Risk,
        Field::ReturnRate,
        Field::Liquidity,
        Field::Trend,
        Field::Forex,
        Field::Technical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Rating => "rating",
            Field::Sales => "sales",
            Field::Profit => "profit",
            Field::Scale => "scale",
            Field::Cheap => "cheap",
            Field::Growth => "growth",
            Field::Profitab => "profitab",
            Field::Safety => "safety",
            Field::Risk => "risk",
            Field::ReturnRate => "return_rate",
            Field::Liquidity => "liquidity",
            Field::Trend => "trend",
            Field::Forex => "forex",
            Field::Technical => "technical",
        }
    }

    /// Position of this field in [`Field::ALL`] and in stored rows.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Fields whose values are percentages and get a `%` suffix.
    pub fn is_percentage(self) -> bool {
        matches!(self, Field::Sales | Field::Profit)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .iter()
            .copied()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| format!("Unknown field: {s}"))
    }
}

/// Append `%` to a non-empty value that does not already end with one.
pub fn normalize_percent(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.ends_with('%') {
        trimmed.to_string()
    } else {
        format!("{trimmed}%")
    }
}

/// One value per [`Field`]. Absent values are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSet {
    values: [String; Field::COUNT],
}

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble a field set from per-field lookups.
    ///
    /// `None` means the node was not on the page and becomes `""`.
    /// Present values are trimmed. Fields not mentioned stay empty.
    pub fn from_lookups<I>(lookups: I) -> Self
    where
        I: IntoIterator<Item = (Field, Option<String>)>,
    {
        let mut set = Self::new();
        for (field, value) in lookups {
            if let Some(value) = value {
                set.values[field.index()] = value.trim().to_string();
            }
        }
        set
    }

    pub fn get(&self, field: Field) -> &str {
        &self.values[field.index()]
    }

    pub fn set(&mut self, field: Field, value: impl Into<String>) {
        self.values[field.index()] = value.into();
    }

    pub fn with(mut self, field: Field, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    /// Apply the percent-suffix rule to the percentage fields. Idempotent.
    pub fn normalize(&mut self) {
        for field in Field::ALL.into_iter().filter(|f| f.is_percentage()) {
            let normalized = normalize_percent(self.get(field));
            self.set(field, normalized);
        }
    }

    pub fn normalized(mut self) -> Self {
        self.normalize();
        self
    }

    /// Values in [`Field::ALL`] order.
    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &str)> {
        Field::ALL
            .into_iter()
            .map(move |field| (field, self.get(field)))
    }

    pub fn is_empty(&self) -> bool {
        self.values.iter().all(String::is_empty)
    }
}
