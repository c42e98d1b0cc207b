//! Property tests for day-window generation and file naming.
//!
//! Uses proptest to verify:
//! 1. Window count: exactly N windows for N days
//! 2. Shape: every window spans 24h and starts at midnight
//! 3. Coverage: windows are contiguous, ordered and cover [start, start + N days)
//! 4. Identity: file names are unique per window and round-trip to the date

use chrono::{Days, NaiveDate, NaiveTime, TimeDelta};
use proptest::prelude::*;
use std::collections::HashSet;
use swapfetch_core::data::{daily_windows, CsvStore};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_date() -> impl Strategy<Value = NaiveDate> {
    // 2018-01-01 .. roughly 2035
    (0u64..6500).prop_map(|offset| {
        NaiveDate::from_ymd_opt(2018, 1, 1)
            .unwrap()
            .checked_add_days(Days::new(offset))
            .unwrap()
    })
}

fn arb_days() -> impl Strategy<Value = u32> {
    1u32..=400
}

proptest! {
    #[test]
    fn one_window_per_day(start in arb_date(), days in arb_days()) {
        let windows = daily_windows(start, days).unwrap();
        prop_assert_eq!(windows.len(), days as usize);
        prop_assert_eq!(windows[0].date(), start);
    }

    #[test]
    fn windows_are_whole_days_from_midnight(start in arb_date(), days in arb_days()) {
        for w in daily_windows(start, days).unwrap() {
            prop_assert_eq!(w.duration(), TimeDelta::days(1));
            prop_assert_eq!(w.start.time(), NaiveTime::MIN);
            prop_assert_eq!(w.end_timestamp() - w.start_timestamp(), 86_400);
        }
    }

    #[test]
    fn windows_are_contiguous_and_cover_the_range(start in arb_date(), days in arb_days()) {
        let windows = daily_windows(start, days).unwrap();
        for pair in windows.windows(2) {
            prop_assert_eq!(pair[0].end, pair[1].start);
            prop_assert!(pair[0] < pair[1]);
        }
        let last = windows.last().unwrap();
        prop_assert_eq!(
            last.end.date(),
            start.checked_add_days(Days::new(u64::from(days))).unwrap()
        );
    }

    #[test]
    fn file_names_are_unique_and_parseable(start in arb_date(), days in 1u32..=60) {
        let store = CsvStore::new("data", "uniswap_v3");
        let windows = daily_windows(start, days).unwrap();
        let paths: HashSet<_> = windows.iter().map(|w| store.path_for(w)).collect();
        prop_assert_eq!(paths.len(), windows.len());

        for w in &windows {
            let name = CsvStore::file_name(w.date());
            let stem = name.strip_prefix("swaps_").and_then(|s| s.strip_suffix(".csv")).unwrap();
            prop_assert_eq!(NaiveDate::parse_from_str(stem, "%Y-%m-%d").unwrap(), w.date());
        }
    }
}
