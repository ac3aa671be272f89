//! Test utilities and helpers for integration and unit testing
//!
//! This module provides common test infrastructure including:
//! - Database setup/teardown
//! - Mock data factories
//! - Helper assertions

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use sqlx::SqlitePool;

use crate::models::NewWeeklyMileage;
use crate::store::save_weekly_total;
use crate::strava::{StravaActivity, StravaConfig};

/// ---------------------------------------------------------------------------
/// Database Test Utilities
/// ---------------------------------------------------------------------------

/// Create an in-memory SQLite database for testing
/// Runs all migrations and returns a ready-to-use pool
///
/// Uses max_connections(1) to prevent multiple pool connections from creating
/// isolated in-memory databases, which would cause intermittent test failures
pub async fn setup_test_db() -> SqlitePool {
  let pool = sqlx::sqlite::SqlitePoolOptions::new()
    .max_connections(1)
    .connect("sqlite::memory:")
    .await
    .expect("Failed to create in-memory database");

  sqlx::migrate!("./migrations")
    .run(&pool)
    .await
    .expect("Failed to run migrations");

  pool
}

/// Close a test database pool
pub async fn teardown_test_db(pool: SqlitePool) {
  pool.close().await;
}

/// Seed consecutive weeks ending at `current_week`; `miles[i]` is the total
/// for the week `i` weeks before it
pub async fn seed_weekly_mileage(
  pool: &SqlitePool,
  user_id: &str,
  current_week: NaiveDate,
  miles: &[f64],
) {
  for (i, total) in miles.iter().enumerate() {
    let entry = mock_weekly_mileage(user_id, weeks_ago(current_week, i as i64), *total);
    save_weekly_total(pool, &entry)
      .await
      .expect("Failed to seed weekly mileage");
  }
}

/// Store a Strava grant for `user_id`
pub async fn seed_strava_credentials(
  pool: &SqlitePool,
  user_id: &str,
  access_token: Option<&str>,
  refresh_token: Option<&str>,
  expires_at: Option<DateTime<Utc>>,
) {
  sqlx::query(
    r#"
    INSERT INTO strava_credentials (user_id, access_token, refresh_token, token_expires_at)
    VALUES (?1, ?2, ?3, ?4)
    "#,
  )
  .bind(user_id)
  .bind(access_token)
  .bind(refresh_token)
  .bind(expires_at)
  .execute(pool)
  .await
  .expect("Failed to seed Strava credentials");
}

/// ---------------------------------------------------------------------------
/// Mock Data Factories
/// ---------------------------------------------------------------------------

pub fn mock_weekly_mileage(user_id: &str, week_start: NaiveDate, miles: f64) -> NewWeeklyMileage {
  NewWeeklyMileage {
    user_id: user_id.to_string(),
    week_start_date: week_start,
    total_mileage: miles,
  }
}

/// Strava activity starting at `start_local` (athlete wall time)
pub fn mock_strava_activity(
  id: i64,
  activity_type: &str,
  start_local: DateTime<Utc>,
  distance_meters: f64,
) -> StravaActivity {
  StravaActivity {
    id,
    name: format!("{} {}", activity_type, id),
    activity_type: activity_type.to_string(),
    start_date: start_local,
    start_date_local: start_local,
    moving_time: 1800,
    distance: Some(distance_meters),
  }
}

/// Config pointing at a mock server: token calls under `{base}/oauth`, API at `{base}`
pub fn mock_strava_config(base: &str) -> StravaConfig {
  StravaConfig {
    client_id: "test-client".to_string(),
    client_secret: "test-secret".to_string(),
    redirect_uri: "http://localhost:8000/strava/callback/".to_string(),
    oauth_base: format!("{}/oauth", base),
    api_base: base.to_string(),
  }
}

/// ---------------------------------------------------------------------------
/// Time Helpers
/// ---------------------------------------------------------------------------

pub fn weeks_ago(week_start: NaiveDate, weeks: i64) -> NaiveDate {
  week_start - Duration::weeks(weeks)
}

/// Wall-clock timestamp, carried as UTC the way Strava sends `start_date_local`
pub fn local(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
  Utc
    .with_ymd_and_hms(year, month, day, hour, minute, 0)
    .single()
    .expect("valid test timestamp")
}

/// ---------------------------------------------------------------------------
/// Test Macros
/// ---------------------------------------------------------------------------

/// Assert two floats are approximately equal within a tolerance
#[macro_export]
macro_rules! assert_approx_eq {
  ($left:expr, $right:expr, $tolerance:expr) => {
    let diff = ($left - $right).abs();
    assert!(
      diff < $tolerance,
      "Values not approximately equal: {} vs {} (diff: {}, tolerance: {})",
      $left,
      $right,
      diff,
      $tolerance
    );
  };
}

/// ---------------------------------------------------------------------------
/// Tests for Test Utilities
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_setup_db_creates_schema() {
    let pool = setup_test_db().await;

    let tables: Vec<(String,)> = sqlx::query_as(
      "SELECT name FROM sqlite_master WHERE type='table' AND name IN ('weekly_mileage', 'strava_credentials')"
    )
    .fetch_all(&pool)
    .await
    .expect("Failed to query tables");

    assert_eq!(tables.len(), 2, "Expected 2 tables, got {}", tables.len());

    teardown_test_db(pool).await;
  }

  #[tokio::test]
  async fn test_seed_weekly_mileage_writes_consecutive_weeks() {
    let pool = setup_test_db().await;
    let monday = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();

    seed_weekly_mileage(&pool, "athlete-1", monday, &[10.0, 11.0, 12.0]).await;

    let oldest: Option<NaiveDate> =
      sqlx::query_scalar("SELECT MIN(week_start_date) FROM weekly_mileage")
        .fetch_one(&pool)
        .await
        .expect("Failed to query oldest week");
    assert_eq!(oldest, Some(weeks_ago(monday, 2)));

    teardown_test_db(pool).await;
  }

  #[test]
  fn test_mock_factories_create_valid_data() {
    let activity = mock_strava_activity(7, "Run", local(2024, 3, 4, 7, 0), 5000.0);
    assert_eq!(activity.activity_type, "Run");
    assert_eq!(activity.distance, Some(5000.0));

    let config = mock_strava_config("http://127.0.0.1:1234");
    assert_eq!(config.oauth_base, "http://127.0.0.1:1234/oauth");

    crate::assert_approx_eq!(activity.distance_miles(), 3.1, 0.01);
  }
}
