//! Crop context assembly
//!
//! Builds a bounded textual summary of a crop's recent state (activities,
//! disease detections, weather alerts) for embedding in a model instruction.
//! Each history sub-fetch is independently fault-tolerant: a failing query
//! degrades that section to empty instead of blocking chat availability.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::AppResult;
use shared::{ActivityLogEntry, Crop, DiseaseDetection, Severity, WeatherAlert};

/// Formatted context returned when the crop does not exist
pub const NO_CROP_DATA: &str = "No crop data available.";

/// Lookback window and cap for recent activities
const ACTIVITY_WINDOW_DAYS: i64 = 7;
const ACTIVITY_LIMIT: i64 = 10;

/// Lookback window and cap for disease detections
const DISEASE_WINDOW_DAYS: i64 = 30;
const DISEASE_LIMIT: i64 = 5;

/// Lookback window and cap for weather alerts
const WEATHER_WINDOW_DAYS: i64 = 7;
const WEATHER_LIMIT: i64 = 5;

/// Structured snapshot of a crop's recent state
///
/// Collections are newest-first, windowed and capped at fetch time.
#[derive(Debug, Clone)]
pub struct CropSnapshot {
    pub crop: Crop,
    pub activities: Vec<ActivityLogEntry>,
    pub diseases: Vec<DiseaseDetection>,
    pub weather: Vec<WeatherAlert>,
}

/// Seam for assembling crop snapshots
#[async_trait]
pub trait ContextSource: Send + Sync {
    /// Assemble the snapshot for a crop; `None` when the crop is absent
    async fn crop_snapshot(&self, crop_id: Uuid) -> AppResult<Option<CropSnapshot>>;
}

/// Context assembly service backed by PostgreSQL
#[derive(Clone)]
pub struct CropContextService {
    db: PgPool,
}

// ============================================================================
// Row types
// ============================================================================

#[derive(Debug, FromRow)]
struct CropRow {
    id: Uuid,
    user_id: Uuid,
    name: String,
    variety: Option<String>,
    area: Option<Decimal>,
    location: Option<String>,
    district: Option<String>,
    state: Option<String>,
    planting_date: Option<NaiveDate>,
    harvest_date: Option<NaiveDate>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<CropRow> for Crop {
    fn from(r: CropRow) -> Self {
        Crop {
            id: r.id,
            user_id: r.user_id,
            name: r.name,
            variety: r.variety,
            area: r.area,
            location: r.location,
            district: r.district,
            state: r.state,
            planting_date: r.planting_date,
            harvest_date: r.harvest_date,
            notes: r.notes,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct ActivityRow {
    id: Uuid,
    crop_id: Uuid,
    activity_type: String,
    description: String,
    quantity: Option<Decimal>,
    unit: Option<String>,
    performed_at: DateTime<Utc>,
}

impl From<ActivityRow> for ActivityLogEntry {
    fn from(r: ActivityRow) -> Self {
        ActivityLogEntry {
            id: r.id,
            crop_id: r.crop_id,
            activity_type: r.activity_type,
            description: r.description,
            quantity: r.quantity,
            unit: r.unit,
            performed_at: r.performed_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct DiseaseRow {
    id: Uuid,
    crop_id: Uuid,
    disease_name: String,
    confidence: i32,
    severity: String,
    recommendations: Option<String>,
    detected_at: DateTime<Utc>,
}

impl From<DiseaseRow> for DiseaseDetection {
    fn from(r: DiseaseRow) -> Self {
        DiseaseDetection {
            id: r.id,
            crop_id: r.crop_id,
            disease_name: r.disease_name,
            confidence: r.confidence,
            severity: r.severity.parse().unwrap_or(Severity::Moderate),
            recommendations: r.recommendations,
            detected_at: r.detected_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct WeatherRow {
    id: Uuid,
    crop_id: Uuid,
    alert_type: String,
    description: String,
    temperature_celsius: Option<Decimal>,
    humidity_percent: Option<i32>,
    precipitation_mm: Option<Decimal>,
    wind_speed_mps: Option<Decimal>,
    is_critical: bool,
    created_at: DateTime<Utc>,
}

impl From<WeatherRow> for WeatherAlert {
    fn from(r: WeatherRow) -> Self {
        WeatherAlert {
            id: r.id,
            crop_id: r.crop_id,
            alert_type: r.alert_type,
            description: r.description,
            temperature_celsius: r.temperature_celsius,
            humidity_percent: r.humidity_percent,
            precipitation_mm: r.precipitation_mm,
            wind_speed_mps: r.wind_speed_mps,
            is_critical: r.is_critical,
            created_at: r.created_at,
        }
    }
}

// ============================================================================
// Service
// ============================================================================

impl CropContextService {
    /// Create a new CropContextService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn fetch_crop(&self, crop_id: Uuid) -> AppResult<Option<Crop>> {
        let row = sqlx::query_as::<_, CropRow>(
            r#"
            SELECT id, user_id, name, variety, area, location, district, state,
                   planting_date, harvest_date, notes, created_at
            FROM crops
            WHERE id = $1
            "#,
        )
        .bind(crop_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(Crop::from))
    }

    async fn fetch_recent_activities(
        &self,
        crop_id: Uuid,
        since: DateTime<Utc>,
    ) -> AppResult<Vec<ActivityLogEntry>> {
        let rows = sqlx::query_as::<_, ActivityRow>(
            r#"
            SELECT id, crop_id, activity_type, description, quantity, unit, performed_at
            FROM activity_logs
            WHERE crop_id = $1 AND performed_at >= $2
            ORDER BY performed_at DESC
            LIMIT $3
            "#,
        )
        .bind(crop_id)
        .bind(since)
        .bind(ACTIVITY_LIMIT)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(ActivityLogEntry::from).collect())
    }

    async fn fetch_recent_diseases(
        &self,
        crop_id: Uuid,
        since: DateTime<Utc>,
    ) -> AppResult<Vec<DiseaseDetection>> {
        let rows = sqlx::query_as::<_, DiseaseRow>(
            r#"
            SELECT id, crop_id, disease_name, confidence, severity, recommendations, detected_at
            FROM disease_detections
            WHERE crop_id = $1 AND detected_at >= $2
            ORDER BY detected_at DESC
            LIMIT $3
            "#,
        )
        .bind(crop_id)
        .bind(since)
        .bind(DISEASE_LIMIT)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(DiseaseDetection::from).collect())
    }

    async fn fetch_recent_weather(
        &self,
        crop_id: Uuid,
        since: DateTime<Utc>,
    ) -> AppResult<Vec<WeatherAlert>> {
        let rows = sqlx::query_as::<_, WeatherRow>(
            r#"
            SELECT id, crop_id, alert_type, description, temperature_celsius, humidity_percent,
                   precipitation_mm, wind_speed_mps, is_critical, created_at
            FROM weather_alerts
            WHERE crop_id = $1 AND created_at >= $2
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(crop_id)
        .bind(since)
        .bind(WEATHER_LIMIT)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(WeatherAlert::from).collect())
    }
}

#[async_trait]
impl ContextSource for CropContextService {
    async fn crop_snapshot(&self, crop_id: Uuid) -> AppResult<Option<CropSnapshot>> {
        let Some(crop) = self.fetch_crop(crop_id).await? else {
            return Ok(None);
        };

        let now = Utc::now();
        let activities = sub_fetch(
            "activities",
            crop_id,
            self.fetch_recent_activities(crop_id, now - Duration::days(ACTIVITY_WINDOW_DAYS)),
        )
        .await;
        let diseases = sub_fetch(
            "disease detections",
            crop_id,
            self.fetch_recent_diseases(crop_id, now - Duration::days(DISEASE_WINDOW_DAYS)),
        )
        .await;
        let weather = sub_fetch(
            "weather alerts",
            crop_id,
            self.fetch_recent_weather(crop_id, now - Duration::days(WEATHER_WINDOW_DAYS)),
        )
        .await;

        Ok(Some(CropSnapshot {
            crop,
            activities,
            diseases,
            weather,
        }))
    }
}

/// Degrade a failed history sub-fetch to an empty collection
///
/// A schema or data issue in one history type must never block chat
/// availability; only the crop lookup itself is allowed to fail assembly.
pub async fn sub_fetch<T, F>(label: &str, crop_id: Uuid, fut: F) -> Vec<T>
where
    F: std::future::Future<Output = AppResult<Vec<T>>>,
{
    match fut.await {
        Ok(items) => items,
        Err(err) => {
            tracing::warn!("Could not fetch {} for crop {}: {}", label, crop_id, err);
            Vec::new()
        }
    }
}

// ============================================================================
// Rendering
// ============================================================================

fn days_ago(now: DateTime<Utc>, at: DateTime<Utc>) -> i64 {
    (now - at).num_days()
}

/// Render a snapshot as the plain-text context block embedded in prompts
///
/// "now" is captured once by the caller so relative-day labels stay
/// self-consistent within a single render pass.
pub fn format_context(snapshot: &CropSnapshot, now: DateTime<Utc>) -> String {
    let crop = &snapshot.crop;

    let variety = crop.variety.as_deref().unwrap_or("Not specified");
    let days_since_planting = match crop.planting_date {
        Some(planted) => (now.date_naive() - planted).num_days().to_string(),
        None => "Unknown".to_string(),
    };
    let area = crop
        .area
        .map(|a| a.to_string())
        .unwrap_or_else(|| "Not specified".to_string());
    let location = crop.location.as_deref().unwrap_or("Not specified");
    let district = crop.district.as_deref().unwrap_or("Not specified");
    let state = crop.state.as_deref().unwrap_or("Not specified");
    let harvest_date = crop
        .harvest_date
        .map(|d| d.to_string())
        .unwrap_or_else(|| "Not specified".to_string());
    let notes = crop.notes.as_deref().unwrap_or("None");

    let mut out = format!(
        "CROP INFORMATION:\n\
         - Name: {}\n\
         - Variety: {}\n\
         - Days Since Planting: {}\n\
         - Area: {}\n\
         - Location: {}\n\
         - District: {}\n\
         - State: {}\n\
         - Harvest Date: {}\n\
         - Notes: {}\n\
         \n\
         RECENT ACTIVITIES (Last 7 days):\n",
        crop.name, variety, days_since_planting, area, location, district, state, harvest_date, notes
    );

    if snapshot.activities.is_empty() {
        out.push_str("- No recent activities recorded\n");
    } else {
        for activity in &snapshot.activities {
            out.push_str(&format!(
                "- {}: {}",
                activity.activity_type, activity.description
            ));
            if let Some(quantity) = activity.quantity {
                if !quantity.is_zero() {
                    out.push_str(&format!(
                        " ({} {})",
                        quantity,
                        activity.unit.as_deref().unwrap_or_default()
                    ));
                }
            }
            out.push_str(&format!(
                " - {} days ago\n",
                days_ago(now, activity.performed_at)
            ));
        }
    }

    out.push_str("\nDISEASE DETECTIONS (Last 30 days):\n");
    if snapshot.diseases.is_empty() {
        out.push_str("- No diseases detected\n");
    } else {
        for disease in &snapshot.diseases {
            out.push_str(&format!(
                "- {} (Confidence: {}%, Severity: {}) - {} days ago\n",
                disease.disease_name,
                disease.confidence,
                disease.severity,
                days_ago(now, disease.detected_at)
            ));
        }
    }

    out.push_str("\nWEATHER ALERTS (Last 7 days):\n");
    if snapshot.weather.is_empty() {
        out.push_str("- No weather alerts\n");
    } else {
        for alert in &snapshot.weather {
            out.push_str(&format!("- {}: {}", alert.alert_type, alert.description));
            if alert.is_critical {
                out.push_str(" (CRITICAL)");
            }
            out.push_str(&format!(" - {} days ago\n", days_ago(now, alert.created_at)));
        }
    }

    out.trim().to_string()
}

/// Render an optional snapshot, falling back to the empty-context text
pub fn format_context_or_empty(snapshot: Option<&CropSnapshot>, now: DateTime<Utc>) -> String {
    match snapshot {
        Some(s) => format_context(s, now),
        None => NO_CROP_DATA.to_string(),
    }
}
