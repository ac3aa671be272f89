//! Strava ingestion client
//!
//! Fetches running activities and rolls them up into weekly mileage using
//! the same week boundary the dashboard uses. One `StravaClient` is built
//! from config and passed to whoever needs it.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use tracing::{debug, warn};
use url::Url;

use crate::load::round_to;
use crate::store::StoreError;
use crate::week::WeekBoundary;

/// ---------------------------------------------------------------------------
/// Configuration Constants
/// ---------------------------------------------------------------------------

const STRAVA_OAUTH_BASE: &str = "https://www.strava.com/oauth";
const STRAVA_API_BASE: &str = "https://www.strava.com/api/v3";
const DEFAULT_REDIRECT_URI: &str = "http://localhost:8000/strava/callback/";
const TOKEN_REFRESH_BUFFER_MINUTES: i64 = 5;

pub const ACTIVITIES_PER_PAGE: u32 = 200;
pub const METERS_PER_MILE: f64 = 1609.34;
const RUN_TYPES: [&str; 2] = ["Run", "VirtualRun"];

#[derive(Debug, Clone)]
pub struct StravaConfig {
  pub client_id: String,
  pub client_secret: String,
  pub redirect_uri: String,
  /// Base for /authorize and /token, overridable for tests
  pub oauth_base: String,
  pub api_base: String,
}

impl StravaConfig {
  pub fn from_env() -> Result<Self, StravaError> {
    Ok(Self {
      client_id: env::var("STRAVA_CLIENT_ID")
        .map_err(|_| StravaError::MissingConfig("STRAVA_CLIENT_ID".into()))?,
      client_secret: env::var("STRAVA_CLIENT_SECRET")
        .map_err(|_| StravaError::MissingConfig("STRAVA_CLIENT_SECRET".into()))?,
      redirect_uri: env::var("STRAVA_REDIRECT_URI")
        .unwrap_or_else(|_| DEFAULT_REDIRECT_URI.to_string()),
      oauth_base: env::var("STRAVA_OAUTH_BASE").unwrap_or_else(|_| STRAVA_OAUTH_BASE.to_string()),
      api_base: env::var("STRAVA_API_BASE").unwrap_or_else(|_| STRAVA_API_BASE.to_string()),
    })
  }
}

/// ---------------------------------------------------------------------------
/// OAuth Data Structures
/// ---------------------------------------------------------------------------

/// Response from Strava token endpoint
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
  pub access_token: String,
  pub refresh_token: String,
  pub expires_at: i64,
  #[serde(default)]
  pub athlete: Option<AthleteInfo>,
}

/// Basic athlete info returned with the first token exchange
#[derive(Debug, Deserialize)]
pub struct AthleteInfo {
  pub id: i64,
  pub firstname: Option<String>,
  pub lastname: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StravaTokens {
  pub access_token: String,
  pub refresh_token: String,
  pub expires_at: DateTime<Utc>,
}

impl StravaTokens {
  pub fn from_response(resp: TokenResponse) -> Self {
    Self {
      access_token: resp.access_token,
      refresh_token: resp.refresh_token,
      expires_at: DateTime::from_timestamp(resp.expires_at, 0).unwrap_or_else(Utc::now),
    }
  }

  pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
    let buffer = Duration::minutes(TOKEN_REFRESH_BUFFER_MINUTES);
    now + buffer >= self.expires_at
  }
}

/// Where a user's Strava grant stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenState {
  NoToken,
  HasRefreshToken { refresh_token: String },
  HasAccessToken(StravaTokens),
}

impl TokenState {
  /// Rebuild from stored columns. A refresh token without a usable access
  /// token still lets us mint a new one.
  pub fn from_parts(
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
  ) -> Self {
    match (access_token, refresh_token, expires_at) {
      (Some(access_token), Some(refresh_token), Some(expires_at)) => {
        TokenState::HasAccessToken(StravaTokens {
          access_token,
          refresh_token,
          expires_at,
        })
      }
      (_, Some(refresh_token), _) => TokenState::HasRefreshToken { refresh_token },
      _ => TokenState::NoToken,
    }
  }

  pub fn is_connected(&self) -> bool {
    !matches!(self, TokenState::NoToken)
  }
}

/// ---------------------------------------------------------------------------
/// Error Handling
/// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StravaError {
  #[error("Missing configuration: {0}")]
  MissingConfig(String),

  #[error("HTTP request failed: {0}")]
  Request(#[from] reqwest::Error),

  #[error("Strava unavailable ({status}): {body}")]
  Unavailable { status: u16, body: String },

  #[error("Strava authorization revoked or invalid: {0}")]
  AuthRevoked(String),

  #[error("OAuth error: {0}")]
  OAuth(String),

  #[error("Strava API error ({status}): {body}")]
  Api { status: u16, body: String },

  #[error("Failed to parse Strava response: {0}")]
  Parse(String),

  #[error("Database error: {0}")]
  Database(String),

  #[error("Not authenticated with Strava")]
  NotAuthenticated,
}

impl StravaError {
  /// Network failures, rate limiting and 5xx can be retried later; a
  /// rejected grant needs the user to reconnect.
  pub fn is_retriable(&self) -> bool {
    matches!(self, StravaError::Request(_) | StravaError::Unavailable { .. })
  }
}

impl From<StoreError> for StravaError {
  fn from(e: StoreError) -> Self {
    StravaError::Database(e.to_string())
  }
}

fn is_unavailable(status: StatusCode) -> bool {
  status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// ---------------------------------------------------------------------------
/// Activities
/// ---------------------------------------------------------------------------

/// Activity summary from /athlete/activities
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StravaActivity {
  pub id: i64,
  #[serde(default)]
  pub name: String,
  #[serde(rename = "type", default)]
  pub activity_type: String,
  pub start_date: DateTime<Utc>,
  /// Athlete's wall-clock start, sent with a misleading `Z` suffix
  pub start_date_local: DateTime<Utc>,
  #[serde(default)]
  pub moving_time: i64,
  #[serde(default)]
  pub distance: Option<f64>,
}

impl StravaActivity {
  pub fn is_run(&self) -> bool {
    RUN_TYPES.contains(&self.activity_type.as_str())
  }

  pub fn distance_miles(&self) -> f64 {
    self.distance.unwrap_or(0.0).max(0.0) / METERS_PER_MILE
  }
}

/// Sum running distance per training week, in miles rounded to 1 decimal
pub fn aggregate_weekly_mileage(
  activities: &[StravaActivity],
  boundary: &WeekBoundary,
) -> BTreeMap<NaiveDate, f64> {
  let mut weekly: BTreeMap<NaiveDate, f64> = BTreeMap::new();

  for activity in activities.iter().filter(|a| a.is_run()) {
    let week_start = boundary.week_start_naive(activity.start_date_local.naive_utc());
    *weekly.entry(week_start).or_insert(0.0) += activity.distance_miles();
  }

  for miles in weekly.values_mut() {
    *miles = round_to(*miles, 1);
  }
  weekly
}

/// ---------------------------------------------------------------------------
/// Client
/// ---------------------------------------------------------------------------

pub struct StravaClient {
  config: StravaConfig,
  http: Client,
}

impl StravaClient {
  pub fn new(config: StravaConfig) -> Self {
    Self {
      config,
      http: Client::new(),
    }
  }

  pub fn from_env() -> Result<Self, StravaError> {
    Ok(Self::new(StravaConfig::from_env()?))
  }

  pub fn authorization_url(&self) -> Result<String, StravaError> {
    let mut url = Url::parse(&format!("{}/authorize", self.config.oauth_base))
      .map_err(|e| StravaError::OAuth(e.to_string()))?;

    url
      .query_pairs_mut()
      .append_pair("client_id", &self.config.client_id)
      .append_pair("redirect_uri", &self.config.redirect_uri)
      .append_pair("response_type", "code")
      .append_pair("scope", "activity:read_all")
      .append_pair("approval_prompt", "force");

    Ok(url.to_string())
  }

  /// Authorization code -> tokens
  pub async fn exchange_code(&self, code: &str) -> Result<StravaTokens, StravaError> {
    self
      .token_request(&[("code", code), ("grant_type", "authorization_code")])
      .await
  }

  pub async fn refresh(&self, refresh_token: &str) -> Result<StravaTokens, StravaError> {
    self
      .token_request(&[("refresh_token", refresh_token), ("grant_type", "refresh_token")])
      .await
  }

  /// Walk the token state forward until there is a usable access token.
  /// Callers persist the result when it differs from what they stored.
  pub async fn ensure_access_token(
    &self,
    state: &TokenState,
    now: DateTime<Utc>,
  ) -> Result<StravaTokens, StravaError> {
    match state {
      TokenState::NoToken => Err(StravaError::NotAuthenticated),
      TokenState::HasRefreshToken { refresh_token } => self.refresh(refresh_token).await,
      TokenState::HasAccessToken(tokens) if tokens.needs_refresh(now) => {
        debug!("Strava access token expiring at {}, refreshing", tokens.expires_at);
        self.refresh(&tokens.refresh_token).await
      }
      TokenState::HasAccessToken(tokens) => Ok(tokens.clone()),
    }
  }

  async fn token_request(&self, grant: &[(&str, &str)]) -> Result<StravaTokens, StravaError> {
    let mut form = vec![
      ("client_id", self.config.client_id.as_str()),
      ("client_secret", self.config.client_secret.as_str()),
    ];
    form.extend_from_slice(grant);

    let response = self
      .http
      .post(format!("{}/token", self.config.oauth_base))
      .form(&form)
      .send()
      .await?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(match status {
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => StravaError::AuthRevoked(body),
        s if is_unavailable(s) => StravaError::Unavailable {
          status: s.as_u16(),
          body,
        },
        s => StravaError::OAuth(format!("Token request failed ({}): {}", s, body)),
      });
    }

    let body = response.text().await?;
    let token_response: TokenResponse =
      serde_json::from_str(&body).map_err(|e| StravaError::Parse(e.to_string()))?;

    if let Some(athlete) = &token_response.athlete {
      debug!(athlete_id = athlete.id, "Token issued for athlete");
    }

    Ok(StravaTokens::from_response(token_response))
  }

  /// One page of activities started after `after` (epoch seconds)
  pub async fn fetch_activities(
    &self,
    access_token: &str,
    after: Option<i64>,
    page: u32,
    per_page: u32,
  ) -> Result<Vec<StravaActivity>, StravaError> {
    let mut url = format!(
      "{}/athlete/activities?per_page={}&page={}",
      self.config.api_base, per_page, page
    );
    if let Some(after_timestamp) = after {
      url.push_str(&format!("&after={}", after_timestamp));
    }

    let response = self
      .http
      .get(&url)
      .header("Authorization", format!("Bearer {}", access_token))
      .send()
      .await?;

    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
      return Err(StravaError::NotAuthenticated);
    }
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(if is_unavailable(status) {
        StravaError::Unavailable {
          status: status.as_u16(),
          body,
        }
      } else {
        StravaError::Api {
          status: status.as_u16(),
          body,
        }
      });
    }

    let response_text = response.text().await?;
    serde_json::from_str(&response_text).map_err(|e| {
      let preview: String = response_text.chars().take(500).collect();
      warn!("Unparseable activities response (first 500 chars): {}", preview);
      StravaError::Parse(e.to_string())
    })
  }

  /// Every activity after `after`, following pages until a short one
  pub async fn fetch_all_activities(
    &self,
    access_token: &str,
    after: Option<i64>,
  ) -> Result<Vec<StravaActivity>, StravaError> {
    let mut activities = Vec::new();
    let mut page = 1;

    loop {
      let batch = self
        .fetch_activities(access_token, after, page, ACTIVITIES_PER_PAGE)
        .await?;
      let fetched = batch.len();
      activities.extend(batch);
      debug!(page, fetched, "Fetched Strava activity page");

      if fetched < ACTIVITIES_PER_PAGE as usize {
        break;
      }
      page += 1;
    }

    Ok(activities)
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
