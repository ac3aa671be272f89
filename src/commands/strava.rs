use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::db::{AppState, DbPool};
use crate::load::required_range;
use crate::models::{NewWeeklyMileage, StravaCredentials};
use crate::store::save_weekly_total;
use crate::strava::{aggregate_weekly_mileage, StravaClient, StravaError, StravaTokens, TokenState};
use crate::week::Clock;

/// ---------------------------------------------------------------------------
/// Start OAuth Flow
/// ---------------------------------------------------------------------------

/// Authorization URL the user opens in a browser
pub fn strava_start_auth(client: &StravaClient) -> Result<String, StravaError> {
  client.authorization_url()
}

/// ---------------------------------------------------------------------------
/// Exchange Code
/// ---------------------------------------------------------------------------

/// Exchange the code from the OAuth redirect and store the grant
pub async fn strava_complete_auth(
  state: &AppState,
  client: &StravaClient,
  user_id: &str,
  code: &str,
) -> Result<(), StravaError> {
  let tokens = client.exchange_code(code).await?;
  save_tokens(&state.db, user_id, &tokens).await?;

  info!(user_id, "Strava OAuth completed successfully");
  Ok(())
}

/// ---------------------------------------------------------------------------
/// Check Authentication Status
/// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct StravaAuthStatus {
  pub is_authenticated: bool,
  pub expires_at: Option<String>,
  pub needs_refresh: bool,
  pub last_sync_at: Option<String>,
}

pub async fn strava_get_auth_status(
  state: &AppState,
  clock: &dyn Clock,
  user_id: &str,
) -> Result<StravaAuthStatus, StravaError> {
  let credentials = load_credentials(&state.db, user_id).await?;
  let last_sync_at = credentials
    .as_ref()
    .and_then(|c| c.last_sync_at)
    .map(|t| t.to_rfc3339());

  let status = match token_state(credentials) {
    TokenState::NoToken => StravaAuthStatus {
      is_authenticated: false,
      expires_at: None,
      needs_refresh: false,
      last_sync_at,
    },
    TokenState::HasRefreshToken { .. } => StravaAuthStatus {
      is_authenticated: true,
      expires_at: None,
      needs_refresh: true,
      last_sync_at,
    },
    TokenState::HasAccessToken(tokens) => StravaAuthStatus {
      is_authenticated: true,
      expires_at: Some(tokens.expires_at.to_rfc3339()),
      needs_refresh: tokens.needs_refresh(clock.now()),
      last_sync_at,
    },
  };
  Ok(status)
}

/// ---------------------------------------------------------------------------
/// Disconnect Strava
/// ---------------------------------------------------------------------------

pub async fn strava_disconnect(state: &AppState, user_id: &str) -> Result<(), StravaError> {
  clear_tokens(&state.db, user_id).await?;
  info!(user_id, "Strava disconnected");
  Ok(())
}

/// ---------------------------------------------------------------------------
/// Get Valid Access Token (with auto-refresh)
/// ---------------------------------------------------------------------------

/// Usable access token for `user_id`, refreshing and persisting when needed.
/// A grant Strava rejects outright is cleared so the user is asked to
/// reconnect instead of failing the same way on every sync.
pub async fn get_valid_access_token(
  db: &DbPool,
  client: &StravaClient,
  user_id: &str,
  now: DateTime<Utc>,
) -> Result<String, StravaError> {
  let state = token_state(load_credentials(db, user_id).await?);

  match client.ensure_access_token(&state, now).await {
    Ok(tokens) => {
      if !matches!(&state, TokenState::HasAccessToken(current) if *current == tokens) {
        save_tokens(db, user_id, &tokens).await?;
        info!(user_id, "Strava tokens refreshed");
      }
      Ok(tokens.access_token)
    }
    Err(StravaError::AuthRevoked(reason)) => {
      warn!(user_id, %reason, "Strava grant rejected, clearing stored tokens");
      clear_tokens(db, user_id).await?;
      Err(StravaError::AuthRevoked(reason))
    }
    Err(e) => Err(e),
  }
}

/// ---------------------------------------------------------------------------
/// Sync Weekly Mileage from Strava
/// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct SyncResult {
  pub total_fetched: usize,
  pub weeks_updated: usize,
  pub oldest_week: NaiveDate,
}

/// Pull runs covering every week the dashboard trend reads and upsert the
/// per-week totals. Weeks with no runs in the response are not written, so
/// hand-logged weeks survive a sync.
pub async fn strava_sync_activities(
  state: &AppState,
  client: &StravaClient,
  clock: &dyn Clock,
  user_id: &str,
) -> Result<SyncResult, StravaError> {
  let now = clock.now();
  let access_token = get_valid_access_token(&state.db, client, user_id, now).await?;

  let boundary = state.config.boundary;
  let local_offset = state.config.local_offset;
  let current_week = boundary.week_start(&now.with_timezone(&local_offset));
  let (oldest_week, _) = required_range(current_week, state.config.trend_weeks);

  // Oldest week starts at Monday 00:00 local plus the boundary offset
  let oldest_local = oldest_week.and_time(NaiveTime::MIN) + boundary.offset;
  let after = (oldest_local - Duration::seconds(local_offset.local_minus_utc() as i64))
    .and_utc()
    .timestamp();

  let activities = client.fetch_all_activities(&access_token, Some(after)).await?;
  let total_fetched = activities.len();

  let weekly = aggregate_weekly_mileage(&activities, &boundary);
  let mut weeks_updated = 0;
  for (week_start, total_mileage) in weekly.into_iter().filter(|(week, _)| *week >= oldest_week) {
    let entry = NewWeeklyMileage {
      user_id: user_id.to_string(),
      week_start_date: week_start,
      total_mileage,
    };
    save_weekly_total(&state.db, &entry).await?;
    weeks_updated += 1;
  }

  update_sync_time(&state.db, user_id, now).await?;

  info!(
    user_id,
    total_fetched, weeks_updated, "Strava sync complete"
  );

  Ok(SyncResult {
    total_fetched,
    weeks_updated,
    oldest_week,
  })
}

/// ---------------------------------------------------------------------------
/// Database Helpers
/// ---------------------------------------------------------------------------

fn token_state(credentials: Option<StravaCredentials>) -> TokenState {
  match credentials {
    Some(c) => TokenState::from_parts(c.access_token, c.refresh_token, c.token_expires_at),
    None => TokenState::NoToken,
  }
}

async fn load_credentials(
  db: &DbPool,
  user_id: &str,
) -> Result<Option<StravaCredentials>, StravaError> {
  sqlx::query_as::<_, StravaCredentials>(
    "SELECT user_id, access_token, refresh_token, token_expires_at, last_sync_at
         FROM strava_credentials WHERE user_id = ?1",
  )
  .bind(user_id)
  .fetch_optional(db)
  .await
  .map_err(|e| StravaError::Database(e.to_string()))
}

async fn save_tokens(db: &DbPool, user_id: &str, tokens: &StravaTokens) -> Result<(), StravaError> {
  sqlx::query(
    r#"
        INSERT INTO strava_credentials (user_id, access_token, refresh_token, token_expires_at)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(user_id) DO UPDATE SET
            access_token = excluded.access_token,
            refresh_token = excluded.refresh_token,
            token_expires_at = excluded.token_expires_at
        "#,
  )
  .bind(user_id)
  .bind(&tokens.access_token)
  .bind(&tokens.refresh_token)
  .bind(tokens.expires_at)
  .execute(db)
  .await
  .map_err(|e| StravaError::Database(e.to_string()))?;

  Ok(())
}

async fn clear_tokens(db: &DbPool, user_id: &str) -> Result<(), StravaError> {
  sqlx::query(
    "UPDATE strava_credentials SET access_token = NULL, refresh_token = NULL,
         token_expires_at = NULL WHERE user_id = ?1",
  )
  .bind(user_id)
  .execute(db)
  .await
  .map_err(|e| StravaError::Database(e.to_string()))?;

  Ok(())
}

async fn update_sync_time(db: &DbPool, user_id: &str, now: DateTime<Utc>) -> Result<(), StravaError> {
  sqlx::query("UPDATE strava_credentials SET last_sync_at = ?1 WHERE user_id = ?2")
    .bind(now)
    .bind(user_id)
    .execute(db)
    .await
    .map_err(|e| StravaError::Database(e.to_string()))?;

  Ok(())
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
