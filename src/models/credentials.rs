use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored Strava grant for one user
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StravaCredentials {
  pub user_id: String,
  pub access_token: Option<String>,
  pub refresh_token: Option<String>,
  pub token_expires_at: Option<DateTime<Utc>>,
  pub last_sync_at: Option<DateTime<Utc>>,
}
