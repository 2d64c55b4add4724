//! Intraday trade download and per-session trade CSVs.

use chrono::{Datelike, Duration, NaiveDate, Utc, Weekday};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::error::{AppError, Result};
use crate::models::intraday::{trade_label, Trade};
use crate::models::Instrument;
use crate::services::fetch::Fetcher;

fn intraday_url(isin: &str, mic: &str) -> String {
    format!(
        "https://live.euronext.com/en/ajax/getIntradayPriceFilteredData/{}-{}",
        isin.to_uppercase(),
        mic.to_uppercase()
    )
}

/// The most recent weekday, then `days_back` further into the past.
pub fn last_working_day(days_back: u32) -> NaiveDate {
    last_working_day_from(Utc::now().date_naive(), days_back)
}

fn last_working_day_from(mut date: NaiveDate, days_back: u32) -> NaiveDate {
    while matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
        date -= Duration::days(1);
    }

    date - Duration::days(i64::from(days_back))
}

/// Fetch the trade tape of one instrument for the requested session.
pub async fn fetch_trades(
    fetcher: &Fetcher,
    instrument: &Instrument,
    days_back: u32,
) -> Result<Vec<u8>> {
    let url = intraday_url(&instrument.isin, &instrument.mic);
    let referer = instrument.quotes_page();
    let label = format!(
        "{}-{}-{}-{}",
        instrument.mic, instrument.kind, instrument.mnemonic, instrument.isin
    );

    let form = [
        ("nbitems", "900000".to_string()),
        ("timezone", "CET".to_string()),
        (
            "date",
            last_working_day(days_back).format("%Y-%m-%d").to_string(),
        ),
    ];

    fetcher.post_form(&url, &referer, &label, &form).await
}

/// Write one session's trades as `time;price;volume;type`, gzip-compressed
/// when the file name ends in `.gz`.
pub fn write_trades_csv(path: &Path, trades: &[Trade]) -> Result<usize> {
    let file = File::create(path).map_err(|e| {
        AppError::Io(format!("cannot create csv file '{}': {}", path.display(), e))
    })?;

    let mut writer: Box<dyn Write> = if path.extension().map(|e| e == "gz").unwrap_or(false) {
        Box::new(GzEncoder::new(file, Compression::default()))
    } else {
        Box::new(file)
    };

    writeln!(writer, "time;price;volume;type")
        .map_err(|e| AppError::Io(format!("cannot write to '{}': {}", path.display(), e)))?;

    for trade in trades {
        writeln!(
            writer,
            "{};{};{};{}",
            trade.time,
            trade.price,
            trade.volume,
            trade_label(&trade.kind)
        )
        .map_err(|e| AppError::Io(format!("cannot write to '{}': {}", path.display(), e)))?;
    }

    writer
        .flush()
        .map_err(|e| AppError::Io(format!("cannot flush '{}': {}", path.display(), e)))?;

    Ok(trades.len())
}
