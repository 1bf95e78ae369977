// Unit and application names

use crate::{Result, TrackerError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of a unit: `<application>/<number>`, e.g. `mysql/0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UnitId {
    application: String,
    number: u32,
}

impl UnitId {
    pub fn new(application: &str, number: u32) -> Result<Self> {
        if !is_valid_application_name(application) {
            return Err(TrackerError::InvalidUnitId(format!("{application}/{number}")));
        }
        Ok(Self {
            application: application.to_owned(),
            number,
        })
    }

    /// The application this unit belongs to; leadership is held on it.
    pub fn application(&self) -> &str {
        &self.application
    }

    pub fn number(&self) -> u32 {
        self.number
    }
}

/// Application names are lower-case alphanumeric segments joined by single
/// hyphens. The name starts with a letter and no segment is purely numeric.
pub fn is_valid_application_name(name: &str) -> bool {
    if !name.starts_with(|c: char| c.is_ascii_lowercase()) {
        return false;
    }
    name.split('-').all(|segment| {
        !segment.is_empty()
            && segment
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
            && segment.bytes().any(|b| b.is_ascii_lowercase())
    })
}

fn parse_unit_number(number: &str) -> Option<u32> {
    // No sign, no leading zeros.
    if number.is_empty()
        || !number.bytes().all(|b| b.is_ascii_digit())
        || (number.len() > 1 && number.starts_with('0'))
    {
        return None;
    }
    number.parse().ok()
}

impl FromStr for UnitId {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || TrackerError::InvalidUnitId(s.to_owned());

        let (application, number) = s.split_once('/').ok_or_else(invalid)?;
        let number = parse_unit_number(number).ok_or_else(invalid)?;
        if !is_valid_application_name(application) {
            return Err(invalid());
        }

        Ok(Self {
            application: application.to_owned(),
            number,
        })
    }
}

impl TryFrom<String> for UnitId {
    type Error = TrackerError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<UnitId> for String {
    fn from(unit: UnitId) -> Self {
        unit.to_string()
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.application, self.number)
    }
}
