//! Crop models

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A cultivated plot registered by a farmer
///
/// Crops are created and maintained by the user-facing CRUD surface; the
/// AI subsystem only ever reads them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Crop {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub variety: Option<String>,
    /// Cultivated area in acres
    pub area: Option<Decimal>,
    pub location: Option<String>,
    pub district: Option<String>,
    pub state: Option<String>,
    pub planting_date: Option<NaiveDate>,
    pub harvest_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}
