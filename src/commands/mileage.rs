use chrono::NaiveDate;
use tracing::info;

use crate::db::AppState;
use crate::models::{NewWeeklyMileage, WeeklyMileageRecord};
use crate::store::{list_weekly_mileage, save_weekly_total, StoreError};
use crate::week::monday_of;

/// Manually record a week's total. Any date inside the week is accepted and
/// snapped back to its Monday.
pub async fn log_weekly_mileage(
  state: &AppState,
  user_id: &str,
  week_of: NaiveDate,
  total_mileage: f64,
) -> Result<NewWeeklyMileage, StoreError> {
  let entry = NewWeeklyMileage {
    user_id: user_id.to_string(),
    week_start_date: monday_of(week_of),
    total_mileage,
  };
  save_weekly_total(&state.db, &entry).await?;

  info!(user_id, week = %entry.week_start_date, miles = total_mileage, "Logged weekly mileage");
  Ok(entry)
}

pub async fn get_weekly_mileage(
  state: &AppState,
  user_id: &str,
  limit: i64,
) -> Result<Vec<WeeklyMileageRecord>, StoreError> {
  list_weekly_mileage(&state.db, user_id, limit).await
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::AppConfig;
  use crate::test_utils::*;

  #[tokio::test]
  async fn test_log_snaps_to_monday_and_lists() {
    let state = AppState {
      db: setup_test_db().await,
      config: AppConfig::default(),
    };
    let thursday = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();

    let entry = log_weekly_mileage(&state, "athlete-1", thursday, 18.4).await.unwrap();
    assert_eq!(entry.week_start_date, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());

    let records = get_weekly_mileage(&state, "athlete-1", 10).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].total_mileage, 18.4);

    teardown_test_db(state.db).await;
  }

  #[tokio::test]
  async fn test_log_rejects_negative_mileage() {
    let state = AppState {
      db: setup_test_db().await,
      config: AppConfig::default(),
    };
    let monday = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();

    let result = log_weekly_mileage(&state, "athlete-1", monday, -3.0).await;
    assert!(matches!(result, Err(StoreError::NegativeMileage(_))));

    teardown_test_db(state.db).await;
  }
}
