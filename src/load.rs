//! Acute:chronic workload engine
//!
//! Pure computation over weekly mileage totals. Callers hand in a lookup of
//! per-week totals for one user; nothing here performs I/O, and missing
//! weeks simply count as zero miles.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;

use crate::week::{week_range_label, weeks_before};

/// ---------------------------------------------------------------------------
/// Constants
/// ---------------------------------------------------------------------------

/// Weeks averaged into chronic load
pub const CHRONIC_WEEKS: usize = 4;

/// Safe week-over-week growth applied to chronic load
pub const CAPACITY_MULTIPLIER: f64 = 1.25;

/// Windows in the dashboard trend, current week included
pub const DEFAULT_TREND_WINDOWS: usize = 6;

pub const CURRENT_WEEK_LABEL: &str = "current";

/// ---------------------------------------------------------------------------
/// Record Lookup
/// ---------------------------------------------------------------------------

/// Read access to one user's weekly totals, keyed by week start (Monday)
pub trait MileageLookup {
  fn weekly_total(&self, week_start: NaiveDate) -> Option<f64>;
}

impl MileageLookup for BTreeMap<NaiveDate, f64> {
  fn weekly_total(&self, week_start: NaiveDate) -> Option<f64> {
    self.get(&week_start).copied()
  }
}

impl<S: BuildHasher> MileageLookup for HashMap<NaiveDate, f64, S> {
  fn weekly_total(&self, week_start: NaiveDate) -> Option<f64> {
    self.get(&week_start).copied()
  }
}

impl<T: MileageLookup + ?Sized> MileageLookup for &T {
  fn weekly_total(&self, week_start: NaiveDate) -> Option<f64> {
    (**self).weekly_total(week_start)
  }
}

/// Adapts any `Fn(NaiveDate) -> Option<f64>` into a lookup
pub struct FnLookup<F>(pub F);

impl<F> MileageLookup for FnLookup<F>
where
  F: Fn(NaiveDate) -> Option<f64>,
{
  fn weekly_total(&self, week_start: NaiveDate) -> Option<f64> {
    (self.0)(week_start)
  }
}

/// ---------------------------------------------------------------------------
/// Ratio
/// ---------------------------------------------------------------------------

/// Acute:chronic workload ratio. `Undefined` when there is no chronic load
/// to divide by, which is not the same thing as a ratio of zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Ratio {
  Undefined,
  Value(f64),
}

impl Ratio {
  pub fn value(&self) -> Option<f64> {
    match self {
      Ratio::Undefined => None,
      Ratio::Value(v) => Some(*v),
    }
  }

  pub fn zone(&self) -> LoadZone {
    match self {
      Ratio::Undefined => LoadZone::Unknown,
      Ratio::Value(r) if *r < 0.8 => LoadZone::Undertrained,
      Ratio::Value(r) if *r <= 1.3 => LoadZone::Optimal,
      Ratio::Value(r) if *r <= 1.5 => LoadZone::Elevated,
      Ratio::Value(_) => LoadZone::HighRisk,
    }
  }
}

impl Serialize for Ratio {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: Serializer,
  {
    match self {
      Ratio::Undefined => serializer.serialize_none(),
      Ratio::Value(v) => serializer.serialize_f64(*v),
    }
  }
}

impl<'de> Deserialize<'de> for Ratio {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: Deserializer<'de>,
  {
    Ok(match Option::<f64>::deserialize(deserializer)? {
      Some(v) => Ratio::Value(v),
      None => Ratio::Undefined,
    })
  }
}

/// Injury-risk reading of the ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadZone {
  /// < 0.8, losing fitness
  Undertrained,
  /// 0.8 - 1.3
  Optimal,
  /// 1.3 - 1.5
  Elevated,
  /// > 1.5
  HighRisk,
  /// No chronic load yet
  Unknown,
}

/// ---------------------------------------------------------------------------
/// Rounding
/// ---------------------------------------------------------------------------

/// Round to `decimals` places, ties to even. Every reported value goes
/// through here so the three rounding sites never disagree.
pub fn round_to(value: f64, decimals: i32) -> f64 {
  let factor = 10f64.powi(decimals);
  (value * factor).round_ties_even() / factor
}

/// ---------------------------------------------------------------------------
/// Snapshot
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadSnapshot {
  pub week_label: String,
  pub week_start: NaiveDate,
  /// Miles in the window's own week
  pub acute: f64,
  /// Mean of the 4 preceding weeks, always divided by 4
  pub chronic: f64,
  pub ratio: Ratio,
  /// Only set for the current window
  #[serde(skip_serializing_if = "Option::is_none", default)]
  pub recommended_capacity: Option<f64>,
}

/// Miles for the acute week followed by the 4 chronic weeks, newest first
type WeekTotals = [f64; CHRONIC_WEEKS + 1];

fn load_window<L: MileageLookup + ?Sized>(week_start: NaiveDate, lookup: &L) -> WeekTotals {
  let mut totals = [0.0; CHRONIC_WEEKS + 1];
  for (k, slot) in totals.iter_mut().enumerate() {
    *slot = lookup
      .weekly_total(weeks_before(week_start, k as i64))
      .unwrap_or(0.0);
  }
  totals
}

fn snapshot_from_totals(
  week_start: NaiveDate,
  week_label: String,
  totals: &WeekTotals,
  with_capacity: bool,
) -> LoadSnapshot {
  let acute = totals[0];
  let chronic = totals[1..].iter().sum::<f64>() / CHRONIC_WEEKS as f64;

  // Ratio comes from the unrounded loads; only the reported values are rounded
  let ratio = if chronic > 0.0 {
    Ratio::Value(round_to(acute / chronic, 2))
  } else {
    Ratio::Undefined
  };

  LoadSnapshot {
    week_label,
    week_start,
    acute: round_to(acute, 1),
    chronic: round_to(chronic, 1),
    ratio,
    recommended_capacity: with_capacity.then(|| round_to(chronic * CAPACITY_MULTIPLIER, 1)),
  }
}

/// Compute the snapshot for the week beginning `week_start`, including the
/// recommended capacity for the week that follows.
pub fn compute_snapshot<L: MileageLookup + ?Sized>(week_start: NaiveDate, lookup: &L) -> LoadSnapshot {
  let totals = load_window(week_start, lookup);
  snapshot_from_totals(week_start, CURRENT_WEEK_LABEL.to_string(), &totals, true)
}

/// ---------------------------------------------------------------------------
/// Trend
/// ---------------------------------------------------------------------------

/// `window_count` snapshots walking back one week at a time from
/// `current_week_start`. Nothing is computed until iterated, and it can be
/// iterated any number of times.
pub fn compute_trend<L: MileageLookup + ?Sized>(
  current_week_start: NaiveDate,
  lookup: &L,
  window_count: usize,
) -> LoadTrend<'_, L> {
  LoadTrend {
    current_week_start,
    window_count,
    lookup,
  }
}

/// Inclusive range of week starts a trend of `window_count` windows reads.
/// Load this range in one query and pass it in as a map.
pub fn required_range(current_week_start: NaiveDate, window_count: usize) -> (NaiveDate, NaiveDate) {
  let oldest_window = window_count.saturating_sub(1) + CHRONIC_WEEKS;
  (
    weeks_before(current_week_start, oldest_window as i64),
    current_week_start,
  )
}

pub struct LoadTrend<'a, L: ?Sized> {
  current_week_start: NaiveDate,
  window_count: usize,
  lookup: &'a L,
}

impl<'a, L: MileageLookup + ?Sized> LoadTrend<'a, L> {
  pub fn iter(&self) -> TrendIter<'a, L> {
    TrendIter {
      current_week_start: self.current_week_start,
      lookup: self.lookup,
      next: 0,
      end: self.window_count,
      totals: None,
    }
  }

  pub fn len(&self) -> usize {
    self.window_count
  }

  pub fn is_empty(&self) -> bool {
    self.window_count == 0
  }
}

impl<'a, L: MileageLookup + ?Sized> IntoIterator for &LoadTrend<'a, L> {
  type Item = LoadSnapshot;
  type IntoIter = TrendIter<'a, L>;

  fn into_iter(self) -> Self::IntoIter {
    self.iter()
  }
}

impl<'a, L: MileageLookup + ?Sized> IntoIterator for LoadTrend<'a, L> {
  type Item = LoadSnapshot;
  type IntoIter = TrendIter<'a, L>;

  fn into_iter(self) -> Self::IntoIter {
    self.iter()
  }
}

pub struct TrendIter<'a, L: ?Sized> {
  current_week_start: NaiveDate,
  lookup: &'a L,
  next: usize,
  end: usize,
  /// Totals of the previous window; consecutive windows share 4 weeks
  totals: Option<WeekTotals>,
}

impl<L: ?Sized> Clone for TrendIter<'_, L> {
  fn clone(&self) -> Self {
    Self {
      current_week_start: self.current_week_start,
      lookup: self.lookup,
      next: self.next,
      end: self.end,
      totals: self.totals,
    }
  }
}

impl<L: MileageLookup + ?Sized> Iterator for TrendIter<'_, L> {
  type Item = LoadSnapshot;

  fn next(&mut self) -> Option<Self::Item> {
    if self.next >= self.end {
      return None;
    }
    let i = self.next;
    self.next += 1;

    let week_start = weeks_before(self.current_week_start, i as i64);
    let totals = match self.totals.as_mut() {
      Some(totals) => {
        totals.rotate_left(1);
        totals[CHRONIC_WEEKS] = self
          .lookup
          .weekly_total(weeks_before(week_start, CHRONIC_WEEKS as i64))
          .unwrap_or(0.0);
        *totals
      }
      None => {
        let totals = load_window(week_start, self.lookup);
        self.totals = Some(totals);
        totals
      }
    };

    let snapshot = if i == 0 {
      snapshot_from_totals(week_start, CURRENT_WEEK_LABEL.to_string(), &totals, true)
    } else {
      snapshot_from_totals(week_start, week_range_label(week_start), &totals, false)
    };
    Some(snapshot)
  }

  fn size_hint(&self) -> (usize, Option<usize>) {
    let remaining = self.end.saturating_sub(self.next);
    (remaining, Some(remaining))
  }
}

impl<L: MileageLookup + ?Sized> ExactSizeIterator for TrendIter<'_, L> {}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;
  use std::cell::Cell;

  fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
  }

  fn history(entries: &[(i64, f64)]) -> BTreeMap<NaiveDate, f64> {
    entries
      .iter()
      .map(|(weeks_ago, miles)| (weeks_before(monday(), *weeks_ago), *miles))
      .collect()
  }

  #[test]
  fn test_no_data() {
    let records = BTreeMap::new();
    let snapshot = compute_snapshot(monday(), &records);

    assert_eq!(snapshot.acute, 0.0);
    assert_eq!(snapshot.chronic, 0.0);
    assert_eq!(snapshot.ratio, Ratio::Undefined);
    assert_eq!(snapshot.recommended_capacity, Some(0.0));
    assert_eq!(snapshot.week_label, "current");
  }

  #[test]
  fn test_worked_example() {
    // Acute 25, chronic weeks 20, 22, 18, 24 -> chronic 21
    let records = history(&[(0, 25.0), (1, 20.0), (2, 22.0), (3, 18.0), (4, 24.0)]);
    let snapshot = compute_snapshot(monday(), &records);

    assert_eq!(snapshot.acute, 25.0);
    assert_eq!(snapshot.chronic, 21.0);
    assert_eq!(snapshot.ratio, Ratio::Value(1.19));
    // 26.25 is an exact tie, half-to-even gives 26.2
    assert_eq!(snapshot.recommended_capacity, Some(26.2));
  }

  #[test]
  fn test_missing_weeks_still_divide_by_four() {
    let records = history(&[(1, 20.0), (4, 24.0)]);
    let snapshot = compute_snapshot(monday(), &records);

    assert_eq!(snapshot.chronic, 11.0);
    assert_eq!(snapshot.acute, 0.0);
    assert_eq!(snapshot.ratio, Ratio::Value(0.0));
  }

  #[test]
  fn test_weeks_outside_chronic_window_are_ignored() {
    // Five weeks back and next week must not leak into the calculation
    let records = history(&[(0, 10.0), (1, 8.0), (5, 100.0), (-1, 100.0)]);
    let snapshot = compute_snapshot(monday(), &records);

    assert_eq!(snapshot.acute, 10.0);
    assert_eq!(snapshot.chronic, 2.0);
    assert_eq!(snapshot.ratio, Ratio::Value(5.0));
  }

  #[test]
  fn test_ratio_uses_unrounded_loads() {
    // chronic = 4.18 / 4 = 1.045 (reported 1.0), acute 1.26 (reported 1.3)
    // unrounded 1.26 / 1.045 = 1.2057 -> 1.21, rounded-first 1.3 / 1.0 = 1.3
    let records = history(&[(0, 1.26), (1, 4.18)]);
    let snapshot = compute_snapshot(monday(), &records);

    assert_eq!(snapshot.acute, 1.3);
    assert_eq!(snapshot.chronic, 1.0);
    assert_eq!(snapshot.ratio, Ratio::Value(1.21));
  }

  #[test]
  fn test_round_to_ties_even() {
    assert_eq!(round_to(26.25, 1), 26.2);
    assert_eq!(round_to(26.35, 1), 26.4);
    assert_eq!(round_to(1.190476, 2), 1.19);
    assert_eq!(round_to(0.0, 1), 0.0);
  }

  #[test]
  fn test_trend_windowing() {
    let records = history(&[
      (0, 25.0),
      (1, 20.0),
      (2, 22.0),
      (3, 18.0),
      (4, 24.0),
      (5, 15.0),
      (6, 12.0),
      (7, 30.0),
      (8, 9.0),
      (9, 11.0),
    ]);
    let trend: Vec<_> = compute_trend(monday(), &records, DEFAULT_TREND_WINDOWS)
      .into_iter()
      .collect();

    assert_eq!(trend.len(), 6);
    for (i, snapshot) in trend.iter().enumerate() {
      assert_eq!(snapshot.week_start, weeks_before(monday(), i as i64));
    }

    // Window 0 is exactly the standalone snapshot
    assert_eq!(trend[0], compute_snapshot(monday(), &records));

    // Window 1: acute 20, chronic (22 + 18 + 24 + 15) / 4 = 19.75
    assert_eq!(trend[1].acute, 20.0);
    assert_eq!(trend[1].chronic, 19.8);
    assert_eq!(trend[1].ratio, Ratio::Value(1.01));
    assert_eq!(trend[1].recommended_capacity, None);
    assert_eq!(trend[1].week_label, "Feb 26 - Mar 03");

    // Window 5: acute 15, chronic (12 + 30 + 9 + 11) / 4 = 15.5
    assert_eq!(trend[5].acute, 15.0);
    assert_eq!(trend[5].chronic, 15.5);
    assert_eq!(trend[5].ratio, Ratio::Value(0.97));
  }

  #[test]
  fn test_trend_windows_match_standalone_computation() {
    let records = history(&[(0, 5.5), (1, 7.25), (3, 12.1), (4, 3.3), (6, 9.9), (8, 1.0)]);
    let trend = compute_trend(monday(), &records, 6);

    for (i, window) in trend.iter().enumerate() {
      let week_start = weeks_before(monday(), i as i64);
      let standalone = compute_snapshot(week_start, &records);
      assert_eq!(window.acute, standalone.acute);
      assert_eq!(window.chronic, standalone.chronic);
      assert_eq!(window.ratio, standalone.ratio);
    }
  }

  #[test]
  fn test_trend_is_restartable_and_idempotent() {
    let records = history(&[(0, 25.0), (1, 20.0), (2, 22.0)]);
    let trend = compute_trend(monday(), &records, 6);

    let first: Vec<_> = trend.iter().collect();
    let second: Vec<_> = trend.iter().collect();
    assert_eq!(first, second);

    let mut iter = trend.iter();
    assert_eq!(iter.len(), 6);
    iter.next();
    let resumed = iter.clone();
    assert_eq!(iter.collect::<Vec<_>>(), resumed.collect::<Vec<_>>());
  }

  #[test]
  fn test_trend_bounds_lookups() {
    let calls = Cell::new(0usize);
    let lookup = FnLookup(|_week: NaiveDate| {
      calls.set(calls.get() + 1);
      Some(10.0)
    });

    let count = compute_trend(monday(), &lookup, 6).iter().count();
    assert_eq!(count, 6);
    assert!(calls.get() <= 4 + 4 * 6, "made {} lookups", calls.get());
  }

  #[test]
  fn test_trend_is_lazy() {
    let calls = Cell::new(0usize);
    let lookup = FnLookup(|_week: NaiveDate| {
      calls.set(calls.get() + 1);
      None
    });

    let trend = compute_trend(monday(), &lookup, 6);
    assert_eq!(calls.get(), 0);
    let _ = trend.iter().next();
    assert_eq!(calls.get(), CHRONIC_WEEKS + 1);
  }

  #[test]
  fn test_empty_trend() {
    let records = BTreeMap::new();
    let trend = compute_trend(monday(), &records, 0);
    assert!(trend.is_empty());
    assert_eq!(trend.iter().count(), 0);
  }

  #[test]
  fn test_required_range_covers_oldest_chronic_week() {
    let (start, end) = required_range(monday(), 6);
    assert_eq!(end, monday());
    assert_eq!(start, weeks_before(monday(), 9));

    let (start, _) = required_range(monday(), 1);
    assert_eq!(start, weeks_before(monday(), 4));
  }

  #[test]
  fn test_ratio_zones() {
    assert_eq!(Ratio::Undefined.zone(), LoadZone::Unknown);
    assert_eq!(Ratio::Value(0.5).zone(), LoadZone::Undertrained);
    assert_eq!(Ratio::Value(1.19).zone(), LoadZone::Optimal);
    assert_eq!(Ratio::Value(1.4).zone(), LoadZone::Elevated);
    assert_eq!(Ratio::Value(1.8).zone(), LoadZone::HighRisk);
  }

  #[test]
  fn test_ratio_serializes_undefined_as_null() {
    let json = serde_json::to_string(&Ratio::Undefined).unwrap();
    assert_eq!(json, "null");
    let json = serde_json::to_string(&Ratio::Value(1.19)).unwrap();
    assert_eq!(json, "1.19");

    let parsed: Ratio = serde_json::from_str("null").unwrap();
    assert_eq!(parsed, Ratio::Undefined);
  }

  #[test]
  fn test_historical_snapshot_omits_capacity_in_json() {
    let records = history(&[(1, 10.0)]);
    let trend: Vec<_> = compute_trend(monday(), &records, 2).into_iter().collect();
    let json = serde_json::to_value(&trend[1]).unwrap();
    assert!(json.get("recommended_capacity").is_none());
    assert!(json["ratio"].is_null());
  }
}
