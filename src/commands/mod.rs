pub mod dashboard;
pub mod mileage;
pub mod strava;

use crate::config::ConfigError;
use crate::store::StoreError;
use crate::strava::StravaError;

/// Everything a command can fail with, as seen from the CLI
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
  #[error(transparent)]
  Store(#[from] StoreError),

  #[error(transparent)]
  Strava(#[from] StravaError),

  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error("Database setup failed: {0}")]
  Database(#[from] sqlx::Error),

  #[error("Invalid input: {0}")]
  InvalidInput(String),

  #[error("Failed to serialize output: {0}")]
  Output(#[from] serde_json::Error),
}

impl CommandError {
  /// Whether running the same command again later may succeed
  pub fn is_retriable(&self) -> bool {
    match self {
      CommandError::Strava(e) => e.is_retriable(),
      _ => false,
    }
  }
}
