use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::config::AppConfig;

pub type DbPool = SqlitePool;

/// Application state shared by every command
pub struct AppState {
  pub db: DbPool,
  pub config: AppConfig,
}

/// Initialize the database connection pool and run migrations
///
/// `database_url` is a sqlx SQLite URL, e.g. `sqlite://mileage-load.db?mode=rwc`
pub async fn initialize_db(database_url: &str) -> Result<DbPool, sqlx::Error> {
  info!("Initializing database at: {}", database_url);

  let pool = SqlitePoolOptions::new()
    .max_connections(5)
    .connect(database_url)
    .await?;

  sqlx::migrate!("./migrations").run(&pool).await?;

  info!("Database initialized successfully");

  Ok(pool)
}
