//! Readiness checks shared by the forecast pipelines.
//!
//! Local days are computed with a fixed UTC offset, never with time-zone
//! rules, and are half-open: a reading stamped exactly at local midnight
//! belongs to the day that starts at that instant.

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Utc};

use crate::store::WeatherStore;

// ---

/// Minimum readings required before either model is run.
pub const MIN_READINGS: usize = 5;

/// How far ahead the image-sequence forecast targets.
pub fn forecast_horizon() -> Duration {
    Duration::minutes(5)
}

/// Target timestamp of an image-sequence forecast made from `source`.
pub fn target_time(source: DateTime<Utc>) -> DateTime<Utc> {
    source + forecast_horizon()
}

/// One local calendar day expressed as UTC bounds, `start <= t < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DayWindow {
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts < self.end
    }
}

/// The local day (under `offset`) that contains `ts`.
pub fn local_day_window(ts: DateTime<Utc>, offset: FixedOffset) -> DayWindow {
    // ---
    let local_midnight = ts.with_timezone(&offset).date_naive().and_time(NaiveTime::MIN);
    let start = (local_midnight - Duration::seconds(i64::from(offset.local_minus_utc()))).and_utc();

    DayWindow {
        start,
        end: start + Duration::days(1),
    }
}

/// Whether the local day containing `ts` holds at least [`MIN_READINGS`].
pub async fn day_is_ready(
    store: &dyn WeatherStore,
    ts: DateTime<Utc>,
    offset: FixedOffset,
) -> Result<bool, sqlx::Error> {
    // ---
    let window = local_day_window(ts, offset);
    let count = store.count_readings_between(window.start, window.end).await?;
    tracing::debug!(
        "Local day {} .. {} holds {} reading(s)",
        window.start,
        window.end,
        count
    );
    Ok(count >= MIN_READINGS as i64)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::sample_reading;
    use crate::store::testing::MemoryStore;
    use chrono::TimeZone;

    fn cst() -> FixedOffset {
        FixedOffset::west_opt(6 * 3600).unwrap()
    }

    #[test]
    fn test_window_uses_fixed_offset() {
        // ---
        // 03:30 UTC on the 27th is 21:30 CST on the 26th
        let ts = Utc.with_ymd_and_hms(2025, 3, 27, 3, 30, 0).unwrap();
        let window = local_day_window(ts, cst());

        assert_eq!(window.start, Utc.with_ymd_and_hms(2025, 3, 26, 6, 0, 0).unwrap());
        assert_eq!(window.end, Utc.with_ymd_and_hms(2025, 3, 27, 6, 0, 0).unwrap());
        assert!(window.contains(ts));
    }

    #[test]
    fn test_local_midnight_belongs_to_exactly_one_day() {
        // ---
        let midnight = Utc.with_ymd_and_hms(2025, 3, 27, 6, 0, 0).unwrap();
        let day = local_day_window(midnight, cst());
        let previous = local_day_window(midnight - Duration::milliseconds(1), cst());

        assert_eq!(day.start, midnight);
        assert!(day.contains(midnight));
        assert!(!previous.contains(midnight));
        assert_eq!(previous.end, day.start);
    }

    #[test]
    fn test_window_with_positive_offset() {
        // ---
        let offset = FixedOffset::east_opt(9 * 3600).unwrap();
        let ts = Utc.with_ymd_and_hms(2025, 3, 26, 16, 0, 0).unwrap(); // 01:00 next day locally
        let window = local_day_window(ts, offset);

        assert_eq!(window.start, Utc.with_ymd_and_hms(2025, 3, 26, 15, 0, 0).unwrap());
    }

    #[test]
    fn test_target_time_is_five_minutes_ahead() {
        // ---
        let ts = Utc.with_ymd_and_hms(2025, 3, 26, 23, 58, 0).unwrap();
        assert_eq!(
            target_time(ts),
            Utc.with_ymd_and_hms(2025, 3, 27, 0, 3, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_day_is_ready_needs_five_readings_in_the_local_day() {
        // ---
        let store = MemoryStore::default();
        let day_start = Utc.with_ymd_and_hms(2025, 3, 26, 6, 0, 0).unwrap();

        // Belongs to the previous local day
        store.push(sample_reading(day_start - Duration::minutes(1)), None);
        for i in 0..4 {
            store.push(sample_reading(day_start + Duration::minutes(5 * i)), None);
        }
        assert!(!day_is_ready(&store, day_start, cst()).await.unwrap());

        store.push(sample_reading(day_start + Duration::minutes(20)), None);
        assert!(day_is_ready(&store, day_start, cst()).await.unwrap());
    }
}
