//! Reconciliation of an on-disk daily history with a freshly downloaded one.
//!
//! Histories are downloaded whole on every run, so the new series normally
//! extends the old one at the recent end while repeating its overlap. A
//! corporate action shifts every adjusted value of the overlap; the ratio of
//! the adjustment factors on overlapping dates is carried backwards to
//! rescale the bars only the old file still has.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::warn;

use crate::models::DailyBar;

/// Walking dates in descending order, every date falls into one phase; a
/// well-formed pair of series visits the phases in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Phase {
    Start,
    NewOnly,
    Overlap,
    OldOnly,
}

impl Phase {
    fn label(self) -> &'static str {
        match self {
            Phase::Start => "start",
            Phase::NewOnly => "new-only",
            Phase::Overlap => "overlap",
            Phase::OldOnly => "old-only",
        }
    }
}

/// Merge two daily histories keyed by date.
///
/// Returns the merged series in ascending date order and the list of
/// human-readable discrepancy messages. No discrepancy aborts the merge:
/// the newer value wins, except that a non-positive new price falls back
/// to the positive old one.
pub fn merge_daily_history(
    hist_old: &[DailyBar],
    hist_new: &[DailyBar],
) -> (Vec<DailyBar>, Vec<String>) {
    let mut messages = Vec::new();

    let map_old: BTreeMap<NaiveDate, &DailyBar> =
        hist_old.iter().map(|bar| (bar.date, bar)).collect();
    let map_new: BTreeMap<NaiveDate, &DailyBar> =
        hist_new.iter().map(|bar| (bar.date, bar)).collect();

    let mut dates: Vec<NaiveDate> = map_old.keys().chain(map_new.keys()).copied().collect();
    dates.sort_unstable();
    dates.dedup();

    let mut merged = Vec::with_capacity(dates.len());
    let mut phase = Phase::Start;
    let mut multiplier = 1.0;

    for date in dates.into_iter().rev() {
        let entry_old = map_old.get(&date).copied();
        let entry_new = map_new.get(&date).copied();

        let entry = match (entry_new, entry_old) {
            (Some(new), None) => {
                enter_phase(&mut phase, Phase::NewOnly, date, &mut messages);
                new.clone()
            }
            (Some(new), Some(old)) => {
                enter_phase(&mut phase, Phase::Overlap, date, &mut messages);

                let entry = reconcile_overlap(old, new, date, &mut messages);

                if old.adjustment_factor != 0.0 {
                    multiplier = new.adjustment_factor / old.adjustment_factor;
                }

                entry
            }
            (None, Some(old)) => {
                enter_phase(&mut phase, Phase::OldOnly, date, &mut messages);

                let mut entry = old.clone();
                if multiplier != 1.0 {
                    entry.adjustment_factor *= multiplier;
                    entry.open_adjusted *= multiplier;
                    entry.high_adjusted *= multiplier;
                    entry.low_adjusted *= multiplier;
                    entry.last_adjusted *= multiplier;
                    entry.close_adjusted *= multiplier;
                    entry.number_of_shares_adjusted /= multiplier;
                    entry.vwap_adjusted *= multiplier;
                }
                entry
            }
            (None, None) => unreachable!("date came from the union of both maps"),
        };

        let violations = entry.consistency_violations();
        if !violations.is_empty() {
            warn!("{}: inconsistent bar: {}", date, violations.join(", "));
        }

        merged.push(entry);
    }

    merged.sort_by_key(|bar| bar.date);
    (merged, messages)
}

/// Sort a freshly downloaded series for first-time persistence.
pub fn sort_ascending(mut bars: Vec<DailyBar>) -> Vec<DailyBar> {
    bars.sort_by_key(|bar| bar.date);
    bars
}

fn enter_phase(phase: &mut Phase, next: Phase, date: NaiveDate, messages: &mut Vec<String>) {
    if next >= *phase {
        *phase = next;
    } else {
        messages.push(format!(
            "{}: phase went backwards from {} to {}",
            date,
            phase.label(),
            next.label()
        ));
    }
}

/// The newer record wins; differing fields are reported, and a non-positive
/// new price falls back to the old value (together with its adjusted
/// counterpart).
fn reconcile_overlap(
    old: &DailyBar,
    new: &DailyBar,
    date: NaiveDate,
    messages: &mut Vec<String>,
) -> DailyBar {
    let mut entry = new.clone();

    let mut not_equal = Vec::new();
    let fields = [
        ("open", old.open, new.open),
        ("high", old.high, new.high),
        ("low", old.low, new.low),
        ("last", old.last, new.last),
        ("close", old.close, new.close),
        ("number of shares", old.number_of_shares, new.number_of_shares),
        ("number of trades", old.number_of_trades, new.number_of_trades),
        ("turnover", old.turnover, new.turnover),
        ("vwap", old.vwap, new.vwap),
    ];
    for (name, old_value, new_value) in fields {
        if old_value != new_value {
            not_equal.push(name);
        }
    }
    if old.has_marking != new.has_marking {
        not_equal.push("has marking");
    }
    if !not_equal.is_empty() {
        messages.push(format!(
            "{}: different values for {}",
            date,
            not_equal.join(", ")
        ));
    }

    let mut fallbacks = Vec::new();
    {
        let prices: [(&str, (f64, f64), (f64, f64), &mut f64, &mut f64); 6] = [
            (
                "open",
                (old.open, new.open),
                (old.open_adjusted, new.open_adjusted),
                &mut entry.open,
                &mut entry.open_adjusted,
            ),
            (
                "high",
                (old.high, new.high),
                (old.high_adjusted, new.high_adjusted),
                &mut entry.high,
                &mut entry.high_adjusted,
            ),
            (
                "low",
                (old.low, new.low),
                (old.low_adjusted, new.low_adjusted),
                &mut entry.low,
                &mut entry.low_adjusted,
            ),
            (
                "last",
                (old.last, new.last),
                (old.last_adjusted, new.last_adjusted),
                &mut entry.last,
                &mut entry.last_adjusted,
            ),
            (
                "close",
                (old.close, new.close),
                (old.close_adjusted, new.close_adjusted),
                &mut entry.close,
                &mut entry.close_adjusted,
            ),
            (
                "vwap",
                (old.vwap, new.vwap),
                (old.vwap_adjusted, new.vwap_adjusted),
                &mut entry.vwap,
                &mut entry.vwap_adjusted,
            ),
        ];

        for (name, (old_raw, new_raw), (old_adj, _), raw_slot, adj_slot) in prices {
            if new_raw <= 0.0 && old_raw > 0.0 {
                *raw_slot = old_raw;
                *adj_slot = old_adj;
                fallbacks.push(name);
            }
        }
    }
    if !fallbacks.is_empty() {
        messages.push(format!(
            "{}: keeping old values for non-positive new {}",
            date,
            fallbacks.join(", ")
        ));
    }

    entry
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    fn bar(day: u32, close: f64, factor: f64) -> DailyBar {
        let mut b = DailyBar::empty(date(day));
        b.open = close - 1.0;
        b.high = close + 1.0;
        b.low = close - 2.0;
        b.last = close;
        b.close = close;
        b.number_of_shares = 1000.0;
        b.number_of_trades = 10.0;
        b.turnover = close * 1000.0;
        b.vwap = close;
        b.open_adjusted = (close - 1.0) * factor;
        b.high_adjusted = (close + 1.0) * factor;
        b.low_adjusted = (close - 2.0) * factor;
        b.last_adjusted = close * factor;
        b.close_adjusted = close * factor;
        b.number_of_shares_adjusted = 1000.0 / factor;
        b.number_of_trades_adjusted = 10.0;
        b.turnover_adjusted = close * 1000.0;
        b.vwap_adjusted = close * factor;
        b.adjustment_factor = factor;
        b
    }

    #[test]
    fn test_merge_with_self_is_identity_without_messages() {
        let hist = vec![bar(1, 10.0, 1.0), bar(2, 11.0, 1.0), bar(3, 12.0, 1.0)];
        let (merged, messages) = merge_daily_history(&hist, &hist);
        assert_eq!(merged, hist);
        assert!(messages.is_empty(), "unexpected messages: {:?}", messages);
    }

    #[test]
    fn test_new_only_dates_are_taken_unchanged() {
        let old = vec![bar(1, 10.0, 1.0)];
        let new = vec![bar(1, 10.0, 1.0), bar(2, 11.0, 1.0)];
        let (merged, messages) = merge_daily_history(&old, &new);
        assert_eq!(merged, new);
        assert!(messages.is_empty());
    }

    #[test]
    fn test_old_only_dates_survive() {
        let old = vec![bar(1, 10.0, 1.0), bar(2, 11.0, 1.0)];
        let new = vec![bar(2, 11.0, 1.0), bar(3, 12.0, 1.0)];
        let (merged, messages) = merge_daily_history(&old, &new);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0], old[0]);
        assert!(messages.is_empty());
    }

    #[test]
    fn test_old_only_dates_are_rescaled_by_carried_multiplier() {
        // A 2:1 split between the runs halves every adjusted value the new
        // download reports for the overlap.
        let old = vec![bar(1, 10.0, 1.0), bar(2, 11.0, 1.0)];
        let new = vec![bar(2, 11.0, 0.5), bar(3, 12.0, 0.5)];
        let (merged, messages) = merge_daily_history(&old, &new);
        assert!(messages.is_empty());

        let rescaled = &merged[0];
        assert_eq!(rescaled.date, date(1));
        assert_eq!(rescaled.adjustment_factor, 0.5);
        assert_eq!(rescaled.close_adjusted, 10.0 * 0.5);
        assert_eq!(rescaled.open_adjusted, 9.0 * 0.5);
        assert_eq!(rescaled.vwap_adjusted, 10.0 * 0.5);
        // Share counts scale the other way.
        assert_eq!(rescaled.number_of_shares_adjusted, 1000.0 / 0.5);
        // Trade counts and turnover are scale-invariant.
        assert_eq!(rescaled.number_of_trades_adjusted, 10.0);
        assert_eq!(rescaled.turnover_adjusted, 10.0 * 1000.0);
        // Unadjusted side untouched.
        assert_eq!(rescaled.close, 10.0);
    }

    #[test]
    fn test_overlap_mismatch_is_reported_and_new_wins() {
        let old = vec![bar(1, 10.0, 1.0)];
        let mut changed = bar(1, 10.0, 1.0);
        changed.close = 10.5;
        changed.turnover = 9999.0;
        let new = vec![changed.clone()];

        let (merged, messages) = merge_daily_history(&old, &new);
        assert_eq!(merged[0], changed);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("different values for close, turnover"));
    }

    #[test]
    fn test_non_positive_new_price_falls_back_to_old() {
        let old = vec![bar(1, 10.0, 1.0)];
        let mut broken = bar(1, 10.0, 1.0);
        broken.low = 0.0;
        broken.low_adjusted = 0.0;
        let new = vec![broken];

        let (merged, messages) = merge_daily_history(&old, &new);
        assert_eq!(merged[0].low, old[0].low);
        assert_eq!(merged[0].low_adjusted, old[0].low_adjusted);
        assert!(messages
            .iter()
            .any(|m| m.contains("keeping old values for non-positive new low")));
    }

    #[test]
    fn test_phase_going_backwards_is_reported_but_not_rejected() {
        // The new download is missing a middle date the old file has, so a
        // new-only date shows up after the overlap already started.
        let old = vec![bar(2, 11.0, 1.0)];
        let new = vec![bar(1, 10.0, 1.0), bar(2, 11.0, 1.0)];

        let (merged, messages) = merge_daily_history(&old, &new);
        assert_eq!(merged.len(), 2);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("phase went backwards from overlap to new-only"));
    }

    #[test]
    fn test_multiplier_from_zero_old_factor_is_ignored() {
        let mut old_bar = bar(2, 11.0, 1.0);
        old_bar.adjustment_factor = 0.0;
        let old = vec![bar(1, 10.0, 1.0), old_bar];
        let new = vec![bar(2, 11.0, 0.5), bar(3, 12.0, 0.5)];

        let (merged, _) = merge_daily_history(&old, &new);
        // Multiplier stays 1.0: the old-only bar keeps its adjusted values.
        assert_eq!(merged[0].close_adjusted, 10.0);
    }

    #[test]
    fn test_merged_series_is_sorted_ascending() {
        let old = vec![bar(3, 12.0, 1.0), bar(1, 10.0, 1.0)];
        let new = vec![bar(2, 11.0, 1.0)];
        let (merged, _) = merge_daily_history(&old, &new);
        let dates: Vec<NaiveDate> = merged.iter().map(|b| b.date).collect();
        assert_eq!(dates, vec![date(1), date(2), date(3)]);
    }

    #[test]
    fn test_merge_into_empty_old() {
        let new = vec![bar(1, 10.0, 1.0), bar(2, 11.0, 1.0)];
        let (merged, messages) = merge_daily_history(&[], &new);
        assert_eq!(merged, new);
        assert!(messages.is_empty());
    }
}
