//! Environment-driven configuration
//!
//! Values come from the process environment; `main` loads a `.env` file
//! first with dotenvy so local development needs no exported variables.

use chrono::{FixedOffset, Offset, Utc};
use std::env;
use std::str::FromStr;

use crate::load::DEFAULT_TREND_WINDOWS;
use crate::week::{WeekBoundary, BOUNDARY_OFFSET_HOURS};

/// ---------------------------------------------------------------------------
/// Defaults
/// ---------------------------------------------------------------------------

const DEFAULT_DATABASE_URL: &str = "sqlite://mileage-load.db?mode=rwc";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("Invalid value for {name}: {value}")]
  Invalid { name: String, value: String },
}

/// ---------------------------------------------------------------------------
/// Application Config
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AppConfig {
  pub database_url: String,
  pub boundary: WeekBoundary,
  /// Zone used to turn "now" into a local wall time
  pub local_offset: FixedOffset,
  pub trend_weeks: usize,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      database_url: DEFAULT_DATABASE_URL.to_string(),
      boundary: WeekBoundary::default(),
      local_offset: Utc.fix(),
      trend_weeks: DEFAULT_TREND_WINDOWS,
    }
  }
}

impl AppConfig {
  pub fn from_env() -> Result<Self, ConfigError> {
    let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());

    let offset_hours: i64 = parse_var("WEEK_BOUNDARY_OFFSET_HOURS", BOUNDARY_OFFSET_HOURS)?;
    if !(0..24).contains(&offset_hours) {
      return Err(invalid("WEEK_BOUNDARY_OFFSET_HOURS", offset_hours));
    }

    let offset_minutes: i32 = parse_var("LOCAL_UTC_OFFSET_MINUTES", 0)?;
    let local_offset = offset_minutes
      .checked_mul(60)
      .and_then(FixedOffset::east_opt)
      .ok_or_else(|| invalid("LOCAL_UTC_OFFSET_MINUTES", offset_minutes))?;

    let trend_weeks: usize = parse_var("TREND_WEEKS", DEFAULT_TREND_WINDOWS)?;
    if trend_weeks == 0 {
      return Err(invalid("TREND_WEEKS", trend_weeks));
    }

    Ok(Self {
      database_url,
      boundary: WeekBoundary::with_offset_hours(offset_hours),
      local_offset,
      trend_weeks,
    })
  }
}

/// ---------------------------------------------------------------------------
/// Helpers
/// ---------------------------------------------------------------------------

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
  match env::var(name) {
    Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
      name: name.to_string(),
      value: raw,
    }),
    Err(_) => Ok(default),
  }
}

fn invalid(name: &str, value: impl ToString) -> ConfigError {
  ConfigError::Invalid {
    name: name.to_string(),
    value: value.to_string(),
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
