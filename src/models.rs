use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{dataset::YearFilter, error::QueryInputError};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TagFrequencyRequest {
    #[serde(rename = "Tags", default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopTagsRequest {
    #[serde(default)]
    pub year: YearSelection,
}

/// The year filter as it arrives on the wire: clients send either the
/// literal "All", an integer, or an integer-valued string. Anything
/// else still deserializes (into `Other`) so resolution, not parsing,
/// decides what is invalid.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum YearSelection {
    Number(i64),
    Float(f64),
    Text(String),
    Other(Value),
}

impl Default for YearSelection {
    fn default() -> Self {
        Self::Text("All".to_string())
    }
}

impl YearSelection {
    pub fn resolve(&self) -> Result<YearFilter, QueryInputError> {
        match self {
            Self::Number(value) => i32::try_from(*value)
                .map(YearFilter::Year)
                .map_err(|_| QueryInputError::InvalidYear(value.to_string())),
            Self::Float(value) => {
                if value.fract() == 0.0
                    && *value >= f64::from(i32::MIN)
                    && *value <= f64::from(i32::MAX)
                {
                    Ok(YearFilter::Year(*value as i32))
                } else {
                    Err(QueryInputError::InvalidYear(value.to_string()))
                }
            }
            Self::Text(raw) => {
                let trimmed = raw.trim();
                if trimmed == "All" {
                    return Ok(YearFilter::All);
                }
                trimmed
                    .parse::<i32>()
                    .map(YearFilter::Year)
                    .map_err(|_| QueryInputError::InvalidYear(raw.clone()))
            }
            Self::Other(value) => Err(QueryInputError::InvalidYear(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagShare {
    pub tag: String,
    pub count: u64,
    pub percentage: f64,
}
