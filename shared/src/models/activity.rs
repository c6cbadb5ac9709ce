//! Activity log models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A farming action recorded against a crop (watering, fertilizing, ...)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub id: Uuid,
    pub crop_id: Uuid,
    pub activity_type: String,
    pub description: String,
    pub quantity: Option<Decimal>,
    pub unit: Option<String>,
    pub performed_at: DateTime<Utc>,
}
