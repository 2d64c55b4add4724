//! End-of-day history download and parsing.
//!
//! The venue serves one CSV per instrument and adjustment mode. Both modes
//! are downloaded as a pair, glued line-by-line into 20-field records and
//! parsed into combined daily bars.

use chrono::NaiveDate;

use crate::error::{AppError, Result};
use crate::models::{DailyBar, Instrument};
use crate::services::fetch::Fetcher;

/// Fields per combined line: ten per adjustment side.
const COMBINED_FIELDS: usize = 20;

/// Download lines before the header: disclaimer, instrument name, blank.
const PREAMBLE_LINES: usize = 3;

fn history_url(isin: &str, mic: &str, adjusted: bool) -> String {
    format!(
        "https://live.euronext.com/en/ajax/AwlHistoricalPrice/getFullDownloadAjax/{}-{}\
?format=csv&decimal_separator=.&date_form=d%2Fm%2FY&op=&&adjusted={}\
&base100=&startdate=2000-01-01&enddate=2034-12-31",
        isin.to_uppercase(),
        mic.to_uppercase(),
        if adjusted { "Y" } else { "N" }
    )
}

async fn download_history(
    fetcher: &Fetcher,
    instrument: &Instrument,
    adjusted: bool,
) -> Result<Vec<u8>> {
    let url = history_url(&instrument.isin, &instrument.mic, adjusted);
    let referer = instrument.quotes_page();
    let label = format!(
        "{}-{}-{}-{}-{}",
        instrument.mic,
        instrument.kind,
        instrument.mnemonic,
        instrument.isin,
        if adjusted { "Y" } else { "N" }
    );

    fetcher.get(&url, &referer, &label, true).await
}

/// Download the adjusted and unadjusted histories of one instrument.
///
/// Returns `(adjusted, unadjusted)`; the pair is all-or-nothing so a run
/// never merges one side of a partially failed download.
pub async fn download_pair(
    fetcher: &Fetcher,
    instrument: &Instrument,
) -> Result<(Vec<u8>, Vec<u8>)> {
    let adjusted = download_history(fetcher, instrument, true)
        .await
        .map_err(|e| AppError::Network(format!("cannot get EOD adjusted history: {}", e)))?;

    let unadjusted = download_history(fetcher, instrument, false)
        .await
        .map_err(|e| AppError::Network(format!("cannot get EOD unadjusted history: {}", e)))?;

    Ok((adjusted, unadjusted))
}

/// Glue the unadjusted and adjusted downloads line-by-line into
/// `raw;adjusted` records, tolerating unequal line counts by padding the
/// shorter side. Returns the combined lines and both raw line counts.
pub fn combine_lines(raw: &[u8], adjusted: &[u8]) -> (Vec<String>, usize, usize) {
    let raw = String::from_utf8_lossy(raw);
    let adjusted = String::from_utf8_lossy(adjusted);
    let lines_raw: Vec<&str> = raw.split('\n').collect();
    let lines_adj: Vec<&str> = adjusted.split('\n').collect();
    let len_raw = lines_raw.len();
    let len_adj = lines_adj.len();

    let mut combined = Vec::with_capacity(len_raw.max(len_adj));
    for i in 0..len_raw.max(len_adj) {
        let raw_line = lines_raw.get(i).copied().unwrap_or("");
        let adj_line = lines_adj.get(i).copied().unwrap_or("");
        if raw_line.is_empty() && adj_line.is_empty() {
            continue;
        }
        combined.push(format!("{};{}", raw_line, adj_line));
    }

    (combined, len_raw, len_adj)
}

/// Strip the vendor's apostrophe gap-marking prefix, noting it in `marking`.
fn clean_field<'a>(field: &'a str, marking: &mut bool) -> &'a str {
    let field = field.trim();
    if let Some(stripped) = field.strip_prefix('\'') {
        *marking = true;
        stripped
    } else {
        field
    }
}

fn parse_price(field: &str, marking: &mut bool, what: &str, line_no: usize) -> Result<f64> {
    let cleaned = clean_field(field, marking);
    if cleaned.is_empty() || cleaned == "0" || cleaned == "0.0" {
        return Ok(0.0);
    }

    cleaned.parse::<f64>().map_err(|e| {
        AppError::Parse(format!(
            "line {}: cannot parse {} '{}': {}",
            line_no, what, cleaned, e
        ))
    })
}

/// Parse combined download lines into daily bars.
///
/// The download starts with three metadata lines, then the header; a short
/// first data line means the instrument has no history at all.
pub fn parse_combined(lines: &[String]) -> Result<Vec<DailyBar>> {
    let mut history = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        if i < PREAMBLE_LINES {
            continue;
        }

        let line_no = i + 1;
        if i == PREAMBLE_LINES {
            if !line.starts_with("Date;Open;") {
                return Err(AppError::Parse(format!(
                    "line {}: unexpected header line: {}",
                    line_no, line
                )));
            }
            continue;
        }

        if i == PREAMBLE_LINES + 1 && line.len() < 10 {
            return Ok(history); // Empty history
        }

        let parts: Vec<&str> = line.split(';').collect();
        if parts.len() != COMBINED_FIELDS {
            return Err(AppError::Parse(format!(
                "line {}: expected {} fields, got {}: {}",
                line_no,
                COMBINED_FIELDS,
                parts.len(),
                line
            )));
        }

        let mut marking = false;
        let mut marking_adjusted = false;

        let date_raw = clean_field(parts[0], &mut marking).to_string();
        let date = NaiveDate::parse_from_str(&date_raw, "%d/%m/%Y").map_err(|e| {
            AppError::Parse(format!(
                "line {}: cannot parse date '{}': {}",
                line_no, date_raw, e
            ))
        })?;

        let date_adj = clean_field(parts[10], &mut marking_adjusted);
        if date_raw != date_adj {
            return Err(AppError::Parse(format!(
                "line {}: date '{}' does not match adjusted date '{}'",
                line_no, date_raw, date_adj
            )));
        }

        let open = parse_price(parts[1], &mut marking, "open price", line_no)?;
        let high = parse_price(parts[2], &mut marking, "high price", line_no)?;
        let low = parse_price(parts[3], &mut marking, "low price", line_no)?;
        let last = parse_price(parts[4], &mut marking, "last price", line_no)?;
        let close = parse_price(parts[5], &mut marking, "close price", line_no)?;
        let number_of_shares = parse_price(parts[6], &mut marking, "number of shares", line_no)?;
        let number_of_trades = parse_price(parts[7], &mut marking, "number of trades", line_no)?;
        let turnover = parse_price(parts[8], &mut marking, "turnover", line_no)?;
        let vwap = parse_price(parts[9], &mut marking, "vwap", line_no)?;

        let open_adjusted = parse_price(
            parts[11],
            &mut marking_adjusted,
            "adjusted open price",
            line_no,
        )?;
        let high_adjusted = parse_price(
            parts[12],
            &mut marking_adjusted,
            "adjusted high price",
            line_no,
        )?;
        let low_adjusted = parse_price(
            parts[13],
            &mut marking_adjusted,
            "adjusted low price",
            line_no,
        )?;
        let last_adjusted = parse_price(
            parts[14],
            &mut marking_adjusted,
            "adjusted last price",
            line_no,
        )?;
        let close_adjusted = parse_price(
            parts[15],
            &mut marking_adjusted,
            "adjusted close price",
            line_no,
        )?;
        let number_of_shares_adjusted = parse_price(
            parts[16],
            &mut marking_adjusted,
            "adjusted number of shares",
            line_no,
        )?;
        let number_of_trades_adjusted = parse_price(
            parts[17],
            &mut marking_adjusted,
            "adjusted number of trades",
            line_no,
        )?;
        let turnover_adjusted = parse_price(
            parts[18],
            &mut marking_adjusted,
            "adjusted turnover",
            line_no,
        )?;
        let vwap_adjusted = parse_price(
            parts[19],
            &mut marking_adjusted,
            "adjusted vwap",
            line_no,
        )?;

        let adjustment_factor = if close != close_adjusted && close != 0.0 {
            close_adjusted / close
        } else {
            1.0
        };

        history.push(DailyBar {
            date,
            open,
            high,
            low,
            last,
            close,
            number_of_shares,
            number_of_trades,
            turnover,
            vwap,
            open_adjusted,
            high_adjusted,
            low_adjusted,
            last_adjusted,
            close_adjusted,
            number_of_shares_adjusted,
            number_of_trades_adjusted,
            turnover_adjusted,
            vwap_adjusted,
            adjustment_factor,
            has_marking: marking,
            has_marking_adjusted: marking_adjusted,
        });
    }

    Ok(history)
}
