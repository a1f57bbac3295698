//! Fetch window computation

use chrono::{Duration, Months, NaiveDate};
use serde::Serialize;

use crate::config::SyncSettings;
use crate::store::Checkpoint;

/// Explicit limits for a constrained ("fast") run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOverrides {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    /// Stop after this many pages; the checkpoint then only advances to the
    /// day before the last grant date actually fetched
    pub max_pages: Option<usize>,
}

/// Grant dates in `(start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub lookback_start: NaiveDate,
}

impl SyncWindow {
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Oldest grant date we ever ask for
pub fn lookback_start(today: NaiveDate, lookback_years: u32) -> NaiveDate {
    today
        .checked_sub_months(Months::new(lookback_years.saturating_mul(12)))
        .unwrap_or(NaiveDate::MIN)
}

/// `start = max(lookback, checkpoint.end - overlap)`, `end = today`.
///
/// Without a checkpoint the whole lookback is fetched. Overrides replace
/// either bound, but the start never reaches back past the lookback.
pub fn compute_window(
    today: NaiveDate,
    settings: &SyncSettings,
    checkpoint: Option<&Checkpoint>,
    overrides: &SyncOverrides,
) -> SyncWindow {
    let lookback = lookback_start(today, settings.lookback_years);
    let end = overrides.end.unwrap_or(today);

    let incremental = checkpoint.map(|cp| {
        cp.last_window_end
            .checked_sub_signed(Duration::days(i64::from(settings.overlap_days)))
            .unwrap_or(NaiveDate::MIN)
    });
    let start = overrides
        .start
        .or(incremental)
        .unwrap_or(lookback)
        .max(lookback);

    SyncWindow {
        start,
        end,
        lookback_start: lookback,
    }
}
