use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct WeeklyMileageRecord {
  pub id: i64,
  pub user_id: String,
  pub week_start_date: NaiveDate,
  pub total_mileage: f64,
  pub updated_at: Option<DateTime<Utc>>,
}

/// For upserting a week's total (without id, updated_at)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewWeeklyMileage {
  pub user_id: String,
  pub week_start_date: NaiveDate,
  pub total_mileage: f64,
}
