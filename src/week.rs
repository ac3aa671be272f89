//! Training-week bucketing
//!
//! A training week starts on Monday, but not at midnight: the boundary is
//! shifted a few hours into Monday so that a late Sunday-night run logged
//! after midnight still counts toward the week it belongs to.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// ---------------------------------------------------------------------------
/// Boundary Policy
/// ---------------------------------------------------------------------------

/// Hours after Monday midnight before a new training week begins
pub const BOUNDARY_OFFSET_HOURS: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekBoundary {
  pub offset: Duration,
}

impl Default for WeekBoundary {
  fn default() -> Self {
    Self::with_offset_hours(BOUNDARY_OFFSET_HOURS)
  }
}

impl WeekBoundary {
  pub fn with_offset_hours(hours: i64) -> Self {
    Self {
      offset: Duration::hours(hours),
    }
  }

  /// Monday of the training week that `instant` falls in, judged by the
  /// instant's own local wall time.
  pub fn week_start<Tz: TimeZone>(&self, instant: &DateTime<Tz>) -> NaiveDate {
    self.week_start_naive(instant.naive_local())
  }

  /// Same rule for a wall-clock timestamp with no zone attached
  pub fn week_start_naive(&self, local: NaiveDateTime) -> NaiveDate {
    let shifted = (local - self.offset).date();
    monday_of(shifted)
  }
}

/// ---------------------------------------------------------------------------
/// Date Helpers
/// ---------------------------------------------------------------------------

/// Monday on or before `date`
pub fn monday_of(date: NaiveDate) -> NaiveDate {
  date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

pub fn is_week_start(date: NaiveDate) -> bool {
  date.weekday().num_days_from_monday() == 0
}

pub fn weeks_before(week_start: NaiveDate, weeks: i64) -> NaiveDate {
  week_start - Duration::weeks(weeks)
}

/// "Mar 04 - Mar 10"
pub fn week_range_label(week_start: NaiveDate) -> String {
  let week_end = week_start + Duration::days(6);
  format!(
    "{} - {}",
    week_start.format("%b %d"),
    week_end.format("%b %d")
  )
}

/// ---------------------------------------------------------------------------
/// Clock
/// ---------------------------------------------------------------------------

/// Source of "now", swappable in tests
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
  fn now(&self) -> DateTime<Utc> {
    self.0
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
