//! mileage-load: weekly mileage tracking with acute:chronic workload ratio
//!
//! Usage:
//! ```bash
//! # Current load, zone and trend
//! mileage-load dashboard --user me
//!
//! # Record a week by hand (any date in the week works)
//! mileage-load log --user me --week 2024-03-06 --miles 24.5
//!
//! # Connect Strava and pull recent runs
//! mileage-load strava auth-url
//! mileage-load strava connect --user me --code <code from redirect>
//! mileage-load strava sync --user me
//! ```

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::process::ExitCode;
use tracing::{error, info};

use mileage_load_lib::commands::{dashboard, mileage, strava as strava_commands, CommandError};
use mileage_load_lib::config::AppConfig;
use mileage_load_lib::db::{initialize_db, AppState};
use mileage_load_lib::logging::init_logging;
use mileage_load_lib::strava::StravaClient;
use mileage_load_lib::week::SystemClock;

#[derive(Parser)]
#[command(
  name = "mileage-load",
  about = "Weekly mileage load tracker",
  long_about = "Tracks weekly running mileage and reports acute:chronic workload ratio with a recommended next-week capacity."
)]
struct Cli {
  #[command(subcommand)]
  command: Command,

  /// Database URL override
  #[arg(long, global = true)]
  database_url: Option<String>,

  /// Enable debug logging
  #[arg(long, short = 'v', global = true)]
  verbose: bool,
}

#[derive(Subcommand)]
enum Command {
  /// Current week's load, zone and recent trend
  Dashboard {
    #[arg(long)]
    user: String,
  },

  /// Record total mileage for a week
  Log {
    #[arg(long)]
    user: String,

    /// Any date inside the week (YYYY-MM-DD)
    #[arg(long)]
    week: NaiveDate,

    #[arg(long)]
    miles: f64,
  },

  /// Stored weekly totals, newest first
  History {
    #[arg(long)]
    user: String,

    #[arg(long, default_value = "12")]
    limit: i64,
  },

  /// Strava connection and sync
  Strava {
    #[command(subcommand)]
    action: StravaCommand,
  },
}

#[derive(Subcommand)]
enum StravaCommand {
  /// Print the URL to authorize this app
  AuthUrl,

  /// Exchange the code from the OAuth redirect
  Connect {
    #[arg(long)]
    user: String,

    #[arg(long)]
    code: String,
  },

  /// Show whether Strava is connected
  Status {
    #[arg(long)]
    user: String,
  },

  /// Pull runs and update weekly totals
  Sync {
    #[arg(long)]
    user: String,
  },

  /// Forget stored Strava tokens
  Disconnect {
    #[arg(long)]
    user: String,
  },
}

#[tokio::main]
async fn main() -> ExitCode {
  dotenvy::dotenv().ok();
  let cli = Cli::parse();
  init_logging(cli.verbose);

  match run(cli).await {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      error!(retriable = e.is_retriable(), "{}", e);
      ExitCode::FAILURE
    }
  }
}

async fn run(cli: Cli) -> Result<(), CommandError> {
  let mut config = AppConfig::from_env()?;
  if let Some(url) = cli.database_url {
    config.database_url = url;
  }

  // Auth URL needs no database
  if let Command::Strava {
    action: StravaCommand::AuthUrl,
  } = &cli.command
  {
    let client = StravaClient::from_env()?;
    println!("{}", strava_commands::strava_start_auth(&client)?);
    return Ok(());
  }

  let db = initialize_db(&config.database_url).await?;
  let state = AppState { db, config };
  let clock = SystemClock;

  match cli.command {
    Command::Dashboard { user } => {
      print_json(&dashboard::get_dashboard(&state, &clock, &user).await?)?;
    }
    Command::Log { user, week, miles } => {
      print_json(&mileage::log_weekly_mileage(&state, &user, week, miles).await?)?;
    }
    Command::History { user, limit } => {
      if limit <= 0 {
        return Err(CommandError::InvalidInput(format!("limit must be positive, got {}", limit)));
      }
      print_json(&mileage::get_weekly_mileage(&state, &user, limit).await?)?;
    }
    Command::Strava { action } => match action {
      StravaCommand::AuthUrl => {}
      StravaCommand::Connect { user, code } => {
        let client = StravaClient::from_env()?;
        strava_commands::strava_complete_auth(&state, &client, &user, &code).await?;
        info!("Strava connected for {}", user);
      }
      StravaCommand::Status { user } => {
        print_json(&strava_commands::strava_get_auth_status(&state, &clock, &user).await?)?;
      }
      StravaCommand::Sync { user } => {
        let client = StravaClient::from_env()?;
        print_json(&strava_commands::strava_sync_activities(&state, &client, &clock, &user).await?)?;
      }
      StravaCommand::Disconnect { user } => {
        strava_commands::strava_disconnect(&state, &user).await?;
      }
    },
  }

  state.db.close().await;
  Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CommandError> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}
