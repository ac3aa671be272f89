//! Weekly mileage record store
//!
//! Uniqueness of (user, week) is enforced here through the table's UNIQUE
//! constraint and upsert writes; the load engine only ever reads.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::debug;

use crate::db::DbPool;
use crate::models::{NewWeeklyMileage, WeeklyMileageRecord};
use crate::week::is_week_start;

/// ---------------------------------------------------------------------------
/// Error Handling
/// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  #[error("Database error: {0}")]
  Database(String),

  #[error("Week start {0} is not a Monday")]
  InvalidWeekStart(NaiveDate),

  #[error("Mileage cannot be negative: {0}")]
  NegativeMileage(f64),

  #[error("Mileage must be a finite number: {0}")]
  InvalidMileage(f64),
}

impl From<sqlx::Error> for StoreError {
  fn from(e: sqlx::Error) -> Self {
    StoreError::Database(e.to_string())
  }
}

/// ---------------------------------------------------------------------------
/// Reads
/// ---------------------------------------------------------------------------

/// Total for a single week, `None` when nothing was recorded
pub async fn load_weekly_total(
  db: &DbPool,
  user_id: &str,
  week_start: NaiveDate,
) -> Result<Option<f64>, StoreError> {
  let total: Option<f64> = sqlx::query_scalar(
    "SELECT total_mileage FROM weekly_mileage WHERE user_id = ?1 AND week_start_date = ?2",
  )
  .bind(user_id)
  .bind(week_start)
  .fetch_optional(db)
  .await?;

  Ok(total)
}

/// All totals with `start <= week_start_date <= end`, in one query
pub async fn load_weekly_totals(
  db: &DbPool,
  user_id: &str,
  start: NaiveDate,
  end: NaiveDate,
) -> Result<BTreeMap<NaiveDate, f64>, StoreError> {
  let rows: Vec<(NaiveDate, f64)> = sqlx::query_as(
    r#"
    SELECT week_start_date, total_mileage
    FROM weekly_mileage
    WHERE user_id = ?1 AND week_start_date >= ?2 AND week_start_date <= ?3
    "#,
  )
  .bind(user_id)
  .bind(start)
  .bind(end)
  .fetch_all(db)
  .await?;

  debug!(user_id, %start, %end, weeks = rows.len(), "Loaded weekly totals");

  Ok(rows.into_iter().collect())
}

/// Most recent weeks first
pub async fn list_weekly_mileage(
  db: &DbPool,
  user_id: &str,
  limit: i64,
) -> Result<Vec<WeeklyMileageRecord>, StoreError> {
  let records = sqlx::query_as::<_, WeeklyMileageRecord>(
    r#"
    SELECT id, user_id, week_start_date, total_mileage, updated_at
    FROM weekly_mileage
    WHERE user_id = ?1
    ORDER BY week_start_date DESC
    LIMIT ?2
    "#,
  )
  .bind(user_id)
  .bind(limit)
  .fetch_all(db)
  .await?;

  Ok(records)
}

/// ---------------------------------------------------------------------------
/// Writes
/// ---------------------------------------------------------------------------

/// Insert or replace the total for (user, week)
pub async fn save_weekly_total(db: &DbPool, entry: &NewWeeklyMileage) -> Result<(), StoreError> {
  validate(entry)?;

  sqlx::query(
    r#"
    INSERT INTO weekly_mileage (user_id, week_start_date, total_mileage)
    VALUES (?1, ?2, ?3)
    ON CONFLICT(user_id, week_start_date) DO UPDATE SET
      total_mileage = excluded.total_mileage,
      updated_at = CURRENT_TIMESTAMP
    "#,
  )
  .bind(&entry.user_id)
  .bind(entry.week_start_date)
  .bind(entry.total_mileage)
  .execute(db)
  .await?;

  debug!(
    user_id = %entry.user_id,
    week = %entry.week_start_date,
    miles = entry.total_mileage,
    "Saved weekly total"
  );

  Ok(())
}

fn validate(entry: &NewWeeklyMileage) -> Result<(), StoreError> {
  if !is_week_start(entry.week_start_date) {
    return Err(StoreError::InvalidWeekStart(entry.week_start_date));
  }
  if !entry.total_mileage.is_finite() {
    return Err(StoreError::InvalidMileage(entry.total_mileage));
  }
  if entry.total_mileage < 0.0 {
    return Err(StoreError::NegativeMileage(entry.total_mileage));
  }
  Ok(())
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
