//! Disease detection models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Severity of a detected disease
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Severity {
    Low,
    Moderate,
    High,
    /// Used for healthy plants where no disease was found
    None,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "Low",
            Severity::Moderate => "Moderate",
            Severity::High => "High",
            Severity::None => "None",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a severity label cannot be parsed
#[derive(Debug, Error)]
#[error("unknown severity label: {0}")]
pub struct ParseSeverityError(String);

impl FromStr for Severity {
    type Err = ParseSeverityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Low" => Ok(Severity::Low),
            "Moderate" => Ok(Severity::Moderate),
            "High" => Ok(Severity::High),
            "None" => Ok(Severity::None),
            other => Err(ParseSeverityError(other.to_string())),
        }
    }
}

/// Result of an image analysis, persisted once per analysis call
///
/// Immutable after creation; deleting a detection cascades to its chat
/// history at the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiseaseDetection {
    pub id: Uuid,
    pub crop_id: Uuid,
    pub disease_name: String,
    /// Integer percentage, 0-100
    pub confidence: i32,
    pub severity: Severity,
    /// JSON text of the full analysis (precautions, treatment)
    pub recommendations: Option<String>,
    pub detected_at: DateTime<Utc>,
}

/// The structured analysis contract returned by the image-analysis model
///
/// This six-field shape is the one externally-depended-upon JSON contract
/// of the AI subsystem.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiseaseAnalysis {
    /// Disease name, or "Healthy Plant"
    pub disease: String,
    /// Short cause phrase
    pub cause: String,
    /// Integer percentage, 0-100
    pub confidence: i32,
    pub severity: Severity,
    pub precautions: Vec<String>,
    pub treatment: Vec<String>,
}
