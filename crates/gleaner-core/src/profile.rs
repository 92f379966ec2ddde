//! Page profiles: where on a target page each field lives.
//!
//! A profile names two readiness markers (a coarse page container and a
//! fine-grained data node) plus one [`Locator`] per [`Field`]. Profiles are
//! loaded from JSON and validated against the fixed field set before any
//! job starts:
//!
//! ```json
//! {
//!   "container": "#stock-page",
//!   "ready": "xpath=//*[@id='quick_info']/dl[1]/dd/span[3]",
//!   "fields": { "rating": "css=.rating span", "sales": "...", "...": "..." }
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::AppError;
use crate::fields::Field;

/// A location-within-page descriptor.
///
/// Strings prefixed with `xpath=` (or starting with `/` or `(`) are XPath
/// expressions; `css=` or anything else is a CSS selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Css(String),
    XPath(String),
}

impl Locator {
    pub fn expression(&self) -> &str {
        match self {
            Locator::Css(s) | Locator::XPath(s) => s,
        }
    }
}

impl FromStr for Locator {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let locator = if let Some(rest) = s.strip_prefix("xpath=") {
            Locator::XPath(rest.trim().to_string())
        } else if let Some(rest) = s.strip_prefix("css=") {
            Locator::Css(rest.trim().to_string())
        } else if s.starts_with('/') || s.starts_with('(') {
            Locator::XPath(s.to_string())
        } else {
            Locator::Css(s.to_string())
        };

        if locator.expression().is_empty() {
            return Err(AppError::ProfileError(format!("Empty locator: '{s}'")));
        }
        Ok(locator)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(s) => write!(f, "css={s}"),
            Locator::XPath(s) => write!(f, "xpath={s}"),
        }
    }
}

/// Field → locator table, one entry per [`Field`] in column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpecs {
    entries: Vec<(Field, Locator)>,
}

impl FieldSpecs {
    /// Build a complete table. Every field must be present exactly once.
    pub fn new(entries: impl IntoIterator<Item = (Field, Locator)>) -> Result<Self, AppError> {
        let mut by_field: BTreeMap<Field, Locator> = BTreeMap::new();
        for (field, locator) in entries {
            if by_field.insert(field, locator).is_some() {
                return Err(AppError::ProfileError(format!(
                    "Field '{field}' is defined more than once"
                )));
            }
        }

        let missing: Vec<&str> = Field::ALL
            .iter()
            .filter(|f| !by_field.contains_key(*f))
            .map(|f| f.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(AppError::ProfileError(format!(
                "Missing locators for fields: {}",
                missing.join(", ")
            )));
        }

        // BTreeMap iterates in Field order, which is column order.
        Ok(Self {
            entries: by_field.into_iter().collect(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &Locator)> {
        self.entries.iter().map(|(f, l)| (*f, l))
    }

    pub fn locators(&self) -> Vec<&Locator> {
        self.entries.iter().map(|(_, l)| l).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProfileFile {
    container: String,
    ready: String,
    fields: BTreeMap<String, String>,
}

/// Readiness markers plus field locators for one kind of target page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageProfile {
    pub name: String,
    /// Coarse marker: the page container has rendered.
    pub container: Locator,
    /// Fine marker: the data nodes have rendered.
    pub ready: Locator,
    pub fields: FieldSpecs,
}

impl PageProfile {
    pub fn new(
        name: impl Into<String>,
        container: Locator,
        ready: Locator,
        fields: FieldSpecs,
    ) -> Self {
        Self {
            name: name.into(),
            container,
            ready,
            fields,
        }
    }

    /// Parse and validate a profile from JSON text.
    pub fn from_json(name: impl Into<String>, json: &str) -> Result<Self, AppError> {
        let file: ProfileFile = serde_json::from_str(json)
            .map_err(|e| AppError::ProfileError(format!("Invalid profile JSON: {e}")))?;

        let mut entries = Vec::with_capacity(file.fields.len());
        for (field_name, raw) in &file.fields {
            let field: Field = field_name.parse().map_err(AppError::ProfileError)?;
            entries.push((field, raw.parse::<Locator>()?));
        }

        Ok(Self {
            name: name.into(),
            container: file.container.parse()?,
            ready: file.ready.parse()?,
            fields: FieldSpecs::new(entries)?,
        })
    }

    /// Load a profile from a JSON file. The profile is named after the file stem.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            AppError::ProfileError(format!(
                "Failed to read profile file {}: {e}",
                path.display()
            ))
        })?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("default");
        Self::from_json(name, &json)
    }

    /// True if any marker or field locator is an XPath expression.
    pub fn uses_xpath(&self) -> bool {
        matches!(self.container, Locator::XPath(_))
            || matches!(self.ready, Locator::XPath(_))
            || self
                .fields
                .iter()
                .any(|(_, l)| matches!(l, Locator::XPath(_)))
    }
}
