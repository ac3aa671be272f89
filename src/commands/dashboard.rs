use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::info;

use crate::db::AppState;
use crate::load::{compute_snapshot, compute_trend, required_range, LoadSnapshot, LoadZone};
use crate::store::{load_weekly_totals, StoreError};
use crate::week::Clock;

/// ---------------------------------------------------------------------------
/// Dashboard
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
  pub user_id: String,
  pub as_of: DateTime<Utc>,
  pub week_start: NaiveDate,
  pub current: LoadSnapshot,
  pub zone: LoadZone,
  /// Newest first, `current` included as the first entry
  pub trend: Vec<LoadSnapshot>,
}

/// Current load and trend for `user_id` as of the clock's "now".
/// All weeks the trend touches are read in one query.
pub async fn get_dashboard(
  state: &AppState,
  clock: &dyn Clock,
  user_id: &str,
) -> Result<Dashboard, StoreError> {
  let as_of = clock.now();
  let local_now = as_of.with_timezone(&state.config.local_offset);
  let week_start = state.config.boundary.week_start(&local_now);

  let (start, end) = required_range(week_start, state.config.trend_weeks);
  let totals = load_weekly_totals(&state.db, user_id, start, end).await?;

  let current = compute_snapshot(week_start, &totals);
  let trend: Vec<LoadSnapshot> = compute_trend(week_start, &totals, state.config.trend_weeks)
    .into_iter()
    .collect();

  info!(
    user_id,
    %week_start,
    acute = current.acute,
    chronic = current.chronic,
    ratio = ?current.ratio.value(),
    "Computed training load"
  );

  Ok(Dashboard {
    user_id: user_id.to_string(),
    as_of,
    week_start,
    zone: current.ratio.zone(),
    current,
    trend,
  })
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
