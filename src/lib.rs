pub mod commands;
pub mod config;
pub mod db;
pub mod load;
pub mod logging;
pub mod models;
pub mod store;
pub mod strava;
pub mod week;

#[cfg(test)]
mod test_utils;

pub use commands::CommandError;
pub use config::AppConfig;
pub use db::{initialize_db, AppState};
pub use load::{compute_snapshot, compute_trend, LoadSnapshot, LoadZone, MileageLookup, Ratio};
pub use week::{Clock, SystemClock, WeekBoundary};
