use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One trading day of a Euronext instrument: the unadjusted bar together
/// with its split/dividend-adjusted counterpart.
///
/// The adjustment factor converts the unadjusted close into the adjusted
/// one; it is carried through merges so that older bars can be rescaled
/// when a new download shifts the adjustment baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub last: f64,
    pub close: f64,
    pub number_of_shares: f64,
    pub number_of_trades: f64,
    pub turnover: f64,
    pub vwap: f64,
    pub open_adjusted: f64,
    pub high_adjusted: f64,
    pub low_adjusted: f64,
    pub last_adjusted: f64,
    pub close_adjusted: f64,
    pub number_of_shares_adjusted: f64,
    pub number_of_trades_adjusted: f64,
    pub turnover_adjusted: f64,
    pub vwap_adjusted: f64,
    pub adjustment_factor: f64,
    /// Some field on the unadjusted side carried the vendor's apostrophe
    /// prefix marking a synthetically filled gap.
    pub has_marking: bool,
    /// Same marking, observed on the adjusted side.
    pub has_marking_adjusted: bool,
}

/// Column count of the persisted combined history format.
pub const DAILY_BAR_COLUMNS: usize = 22;

/// Header row of the combined history CSV, in persisted column order.
pub const DAILY_BAR_HEADERS: [&str; DAILY_BAR_COLUMNS] = [
    "date",
    "open",
    "high",
    "low",
    "last",
    "close",
    "number of shares",
    "number of trades",
    "turnover",
    "vwap",
    "open adjusted",
    "high adjusted",
    "low adjusted",
    "last adjusted",
    "close adjusted",
    "number of shares adjusted",
    "number of trades adjusted",
    "turnover adjusted",
    "vwap adjusted",
    "adjustment factor",
    "has marking",
    "has marking adjusted",
];

impl DailyBar {
    /// An all-zero bar for the given date.
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            open: 0.0,
            high: 0.0,
            low: 0.0,
            last: 0.0,
            close: 0.0,
            number_of_shares: 0.0,
            number_of_trades: 0.0,
            turnover: 0.0,
            vwap: 0.0,
            open_adjusted: 0.0,
            high_adjusted: 0.0,
            low_adjusted: 0.0,
            last_adjusted: 0.0,
            close_adjusted: 0.0,
            number_of_shares_adjusted: 0.0,
            number_of_trades_adjusted: 0.0,
            turnover_adjusted: 0.0,
            vwap_adjusted: 0.0,
            adjustment_factor: 1.0,
            has_marking: false,
            has_marking_adjusted: false,
        }
    }

    /// Internal-consistency violations of the bar, e.g. a high below the
    /// close. Zero fields mean "no data" in the source and are skipped.
    pub fn consistency_violations(&self) -> Vec<String> {
        let mut violations = Vec::new();

        let sides = [
            ("", self.open, self.high, self.low, self.last, self.close),
            (
                " adjusted",
                self.open_adjusted,
                self.high_adjusted,
                self.low_adjusted,
                self.last_adjusted,
                self.close_adjusted,
            ),
        ];

        for (suffix, open, high, low, last, close) in sides {
            let checks = [
                ("high", high, "open", open),
                ("high", high, "low", low),
                ("high", high, "last", last),
                ("high", high, "close", close),
                ("open", open, "low", low),
                ("last", last, "low", low),
                ("close", close, "low", low),
            ];
            for (upper_name, upper, lower_name, lower) in checks {
                if upper > 0.0 && lower > 0.0 && upper < lower {
                    violations.push(format!(
                        "{}{} < {}{}",
                        upper_name, suffix, lower_name, suffix
                    ));
                }
            }
        }

        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(open: f64, high: f64, low: f64, close: f64) -> DailyBar {
        let mut b = DailyBar::empty(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        b.open = open;
        b.high = high;
        b.low = low;
        b.last = close;
        b.close = close;
        b
    }

    #[test]
    fn test_consistent_bar_has_no_violations() {
        assert!(bar(10.0, 12.0, 9.0, 11.0).consistency_violations().is_empty());
    }

    #[test]
    fn test_high_below_close_is_flagged() {
        let violations = bar(10.0, 10.5, 9.0, 11.0).consistency_violations();
        assert!(violations.iter().any(|v| v == "high < close"));
        assert!(violations.iter().any(|v| v == "high < last"));
    }

    #[test]
    fn test_zero_fields_are_skipped() {
        // Missing open (zero) must not trip the open/low relation.
        assert!(bar(0.0, 12.0, 9.0, 11.0).consistency_violations().is_empty());
    }
}
