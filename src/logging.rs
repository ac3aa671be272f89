//! Tracing subscriber setup
//!
//! Output goes to stderr so command results on stdout stay pipeable.

use std::env;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset
pub fn default_filter(verbose: bool) -> EnvFilter {
  let level = if verbose { "debug" } else { "info" };
  EnvFilter::new(level)
    .add_directive("hyper=warn".parse().unwrap_or_else(|_| tracing::Level::WARN.into()))
    .add_directive("reqwest=warn".parse().unwrap_or_else(|_| tracing::Level::WARN.into()))
    .add_directive("sqlx=warn".parse().unwrap_or_else(|_| tracing::Level::WARN.into()))
}

/// Install the global subscriber. `RUST_LOG` wins over `verbose`.
/// Calling this twice is harmless; the second call is ignored.
pub fn init_logging(verbose: bool) {
  let filter = match env::var("RUST_LOG") {
    Ok(directive) if !directive.trim().is_empty() => EnvFilter::new(directive),
    _ => default_filter(verbose),
  };

  let _ = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .with_target(false)
    .try_init();
}
