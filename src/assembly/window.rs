use chrono::{DateTime, Days, NaiveTime, Utc};

/// Widen a precise time window to whole UTC days.
///
/// The coarse bounds are the cache-key granularity for assembled snapshots,
/// so requests differing only by time-of-day or timezone offset share one
/// cache entry. The precise window is restored afterward by truncation and
/// precise out-of-window removal.
#[must_use]
pub fn coarsen_window(time_from: DateTime<Utc>, time_to: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let floor = |ts: DateTime<Utc>| ts.date_naive().and_time(NaiveTime::MIN).and_utc();
    let coarse_from = floor(time_from);
    let coarse_to = if floor(time_to) == time_to {
        time_to
    } else {
        floor(time_to) + Days::new(1)
    };
    (coarse_from, coarse_to)
}
