//! Best-effort run statistics. Data-quality issues never abort a run; they
//! are collected as semicolon rows and dumped at the end so a nightly run
//! over thousands of instruments stays greppable.

use chrono::NaiveDate;

use crate::models::Instrument;

pub const DETAIL_HEADER: &str = "date;mep;mic;type;mnemonic;isin;error";
pub const MESSAGE_HEADER: &str = "date;mep;mic;type;mnemonic;isin;message";
pub const LINES_HEADER: &str = "date;mep;mic;type;mnemonic;isin;lines raw;lines adjusted";

#[derive(Debug, Default)]
pub struct RunReport {
    pub download_errors: Vec<String>,
    pub merge_errors: Vec<String>,
    pub merge_messages: Vec<String>,
    pub zero_lines: Vec<String>,
    pub unequal_lines: Vec<String>,
    pub under_five_lines: Vec<String>,
    pub no_history_lines: Vec<String>,
}

/// One `date;mep;mic;type;mnemonic;isin;detail` row.
pub fn report_row(session_date: NaiveDate, instrument: &Instrument, detail: &str) -> String {
    format!(
        "{};{};{};{};{};{};{}",
        session_date.format("%Y-%m-%d"),
        instrument.mep,
        instrument.mic,
        instrument.kind,
        instrument.mnemonic,
        instrument.isin,
        detail
    )
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn print_summary(&self, total: usize) {
        let sections: [(&str, &str, &Vec<String>); 7] = [
            ("instruments with download errors", DETAIL_HEADER, &self.download_errors),
            ("instruments with merge errors", DETAIL_HEADER, &self.merge_errors),
            ("instruments with merge messages", MESSAGE_HEADER, &self.merge_messages),
            ("instruments with zero lines", LINES_HEADER, &self.zero_lines),
            (
                "instruments with unequal raw and adjusted histories",
                LINES_HEADER,
                &self.unequal_lines,
            ),
            (
                "instruments with less than 5 history lines",
                LINES_HEADER,
                &self.under_five_lines,
            ),
            (
                "instruments with valid header but no history",
                LINES_HEADER,
                &self.no_history_lines,
            ),
        ];

        for (title, header, rows) in sections {
            println!("\n{}: {} from {}", title, rows.len(), total);
            if !rows.is_empty() {
                println!("{}", header);
                for row in rows {
                    println!("{}", row);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_row_format() {
        let instrument = Instrument {
            mnemonic: "cla".to_string(),
            mep: "par".to_string(),
            mic: "xpar".to_string(),
            isin: "fr0013426004".to_string(),
            kind: "stock".to_string(),
        };

        let row = report_row(
            NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            &instrument,
            "giving up after 3 retries",
        );
        assert_eq!(
            row,
            "2024-06-03;par;xpar;stock;cla;fr0013426004;giving up after 3 retries"
        );
    }
}
