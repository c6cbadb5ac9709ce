//! Weather alert models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A weather-derived advisory tied to a crop
///
/// Produced by the weather pipeline; the AI subsystem only reads these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherAlert {
    pub id: Uuid,
    pub crop_id: Uuid,
    pub alert_type: String,
    pub description: String,
    pub temperature_celsius: Option<Decimal>,
    pub humidity_percent: Option<i32>,
    pub precipitation_mm: Option<Decimal>,
    pub wind_speed_mps: Option<Decimal>,
    pub is_critical: bool,
    pub created_at: DateTime<Utc>,
}
