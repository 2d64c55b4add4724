//! Persistence of combined daily histories: semicolon-delimited CSV with a
//! fixed 22-column header, transparently gzip-compressed when the file name
//! ends in `.gz`. The previous file is kept as a `.bak` sibling.

use chrono::NaiveDate;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};
use crate::models::daily_bar::{DAILY_BAR_COLUMNS, DAILY_BAR_HEADERS};
use crate::models::DailyBar;

const DATE_FORMAT: &str = "%Y-%m-%d";

fn is_gzipped(path: &Path) -> bool {
    path.extension().map(|ext| ext == "gz").unwrap_or(false)
}

pub fn write_history(path: &Path, history: &[DailyBar]) -> Result<()> {
    let file = File::create(path).map_err(|e| {
        AppError::Io(format!("cannot create csv file '{}': {}", path.display(), e))
    })?;

    let writer: Box<dyn Write> = if is_gzipped(path) {
        Box::new(GzEncoder::new(file, Compression::default()))
    } else {
        Box::new(file)
    };

    let mut csv_writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_writer(writer);

    csv_writer.write_record(DAILY_BAR_HEADERS).map_err(|e| {
        AppError::Io(format!(
            "cannot write header to csv file '{}': {}",
            path.display(),
            e
        ))
    })?;

    for bar in history {
        let row = [
            bar.date.format(DATE_FORMAT).to_string(),
            bar.open.to_string(),
            bar.high.to_string(),
            bar.low.to_string(),
            bar.last.to_string(),
            bar.close.to_string(),
            bar.number_of_shares.to_string(),
            bar.number_of_trades.to_string(),
            bar.turnover.to_string(),
            bar.vwap.to_string(),
            bar.open_adjusted.to_string(),
            bar.high_adjusted.to_string(),
            bar.low_adjusted.to_string(),
            bar.last_adjusted.to_string(),
            bar.close_adjusted.to_string(),
            bar.number_of_shares_adjusted.to_string(),
            bar.number_of_trades_adjusted.to_string(),
            bar.turnover_adjusted.to_string(),
            bar.vwap_adjusted.to_string(),
            bar.adjustment_factor.to_string(),
            bar.has_marking.to_string(),
            bar.has_marking_adjusted.to_string(),
        ];

        csv_writer.write_record(&row).map_err(|e| {
            AppError::Io(format!(
                "cannot write row to csv file '{}': {}",
                path.display(),
                e
            ))
        })?;
    }

    csv_writer
        .flush()
        .map_err(|e| AppError::Io(format!("cannot flush csv file '{}': {}", path.display(), e)))?;

    Ok(())
}

pub fn read_history(path: &Path) -> Result<Vec<DailyBar>> {
    let file = File::open(path)
        .map_err(|e| AppError::Io(format!("cannot open csv file '{}': {}", path.display(), e)))?;

    let reader: Box<dyn Read> = if is_gzipped(path) {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };

    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .from_reader(reader);

    let mut history = Vec::new();
    for (index, record) in csv_reader.records().enumerate() {
        let record = record.map_err(|e| {
            AppError::Parse(format!(
                "cannot read row {} from csv file '{}': {}",
                index + 2,
                path.display(),
                e
            ))
        })?;

        if record.len() != DAILY_BAR_COLUMNS {
            return Err(AppError::Parse(format!(
                "row {} of csv file '{}': expected {} columns, got {}",
                index + 2,
                path.display(),
                DAILY_BAR_COLUMNS,
                record.len()
            )));
        }

        let date = NaiveDate::parse_from_str(&record[0], DATE_FORMAT).map_err(|e| {
            AppError::Parse(format!(
                "cannot parse date '{}' in csv file '{}': {}",
                &record[0],
                path.display(),
                e
            ))
        })?;

        // Numeric fields are best-effort: a malformed cell reads as zero,
        // matching how the downloads themselves are parsed.
        let f = |i: usize| record[i].parse::<f64>().unwrap_or(0.0);
        let b = |i: usize| record[i].parse::<bool>().unwrap_or(false);

        history.push(DailyBar {
            date,
            open: f(1),
            high: f(2),
            low: f(3),
            last: f(4),
            close: f(5),
            number_of_shares: f(6),
            number_of_trades: f(7),
            turnover: f(8),
            vwap: f(9),
            open_adjusted: f(10),
            high_adjusted: f(11),
            low_adjusted: f(12),
            last_adjusted: f(13),
            close_adjusted: f(14),
            number_of_shares_adjusted: f(15),
            number_of_trades_adjusted: f(16),
            turnover_adjusted: f(17),
            vwap_adjusted: f(18),
            adjustment_factor: f(19),
            has_marking: b(20),
            has_marking_adjusted: b(21),
        });
    }

    Ok(history)
}

/// Move an existing file aside to `<name>.bak`, replacing any previous
/// backup. Missing files are not an error.
pub fn backup_file(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }

    let mut backup: PathBuf = path.to_path_buf();
    backup.as_mut_os_string().push(".bak");

    if backup.exists() {
        std::fs::remove_file(&backup).map_err(|e| {
            AppError::Io(format!(
                "cannot delete existing backup file '{}': {}",
                backup.display(),
                e
            ))
        })?;
    }

    std::fs::rename(path, &backup).map_err(|e| {
        AppError::Io(format!(
            "cannot rename file '{}' to '{}': {}",
            path.display(),
            backup.display(),
            e
        ))
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_history() -> Vec<DailyBar> {
        let mut first = DailyBar::empty(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        first.open = 10.1;
        first.high = 10.9;
        first.low = 9.85;
        first.last = 10.5;
        first.close = 10.5;
        first.number_of_shares = 12345.0;
        first.number_of_trades = 321.0;
        first.turnover = 129_645.0;
        first.vwap = 10.4;
        first.open_adjusted = 5.05;
        first.high_adjusted = 5.45;
        first.low_adjusted = 4.925;
        first.last_adjusted = 5.25;
        first.close_adjusted = 5.25;
        first.number_of_shares_adjusted = 24690.0;
        first.number_of_trades_adjusted = 321.0;
        first.turnover_adjusted = 129_645.0;
        first.vwap_adjusted = 5.2;
        first.adjustment_factor = 0.5;
        first.has_marking = true;

        let mut second = DailyBar::empty(NaiveDate::from_ymd_opt(2024, 5, 2).unwrap());
        second.close = 10.75;
        second.close_adjusted = 10.75;
        second.has_marking_adjusted = true;

        vec![first, second]
    }

    #[test]
    fn test_csv_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cla_fr0013426004_xpar.1d.csv");

        let history = sample_history();
        write_history(&path, &history).unwrap();
        assert_eq!(read_history(&path).unwrap(), history);
    }

    #[test]
    fn test_gzipped_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cla_fr0013426004_xpar.1d.csv.gz");

        let history = sample_history();
        write_history(&path, &history).unwrap();

        // The file really is gzip (magic bytes), not plain text.
        let raw = std::fs::read(&path).unwrap();
        assert_eq!(&raw[..2], &[0x1f, 0x8b]);

        assert_eq!(read_history(&path).unwrap(), history);
    }

    #[test]
    fn test_header_is_fixed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");
        write_history(&path, &[]).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents.lines().next().unwrap(),
            "date;open;high;low;last;close;number of shares;number of trades;turnover;vwap;\
open adjusted;high adjusted;low adjusted;last adjusted;close adjusted;\
number of shares adjusted;number of trades adjusted;turnover adjusted;vwap adjusted;\
adjustment factor;has marking;has marking adjusted"
        );
    }

    #[test]
    fn test_malformed_numeric_cell_reads_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");

        let mut contents = String::new();
        contents.push_str(&DAILY_BAR_HEADERS.join(";"));
        contents.push('\n');
        contents.push_str("2024-05-01;abc;1;1;1;1;1;1;1;1;1;1;1;1;1;1;1;1;1;1;false;false\n");
        std::fs::write(&path, contents).unwrap();

        let history = read_history(&path).unwrap();
        assert_eq!(history[0].open, 0.0);
        assert_eq!(history[0].high, 1.0);
    }

    #[test]
    fn test_bad_date_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");

        let mut contents = String::new();
        contents.push_str(&DAILY_BAR_HEADERS.join(";"));
        contents.push('\n');
        contents.push_str("01/05/2024;1;1;1;1;1;1;1;1;1;1;1;1;1;1;1;1;1;1;1;false;false\n");
        std::fs::write(&path, contents).unwrap();

        assert!(matches!(
            read_history(&path).unwrap_err(),
            AppError::Parse(_)
        ));
    }

    #[test]
    fn test_backup_replaces_previous_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");

        std::fs::write(&path, "first").unwrap();
        backup_file(&path).unwrap();
        assert!(!path.exists());

        std::fs::write(&path, "second").unwrap();
        backup_file(&path).unwrap();

        let backup = dir.path().join("history.csv.bak");
        assert_eq!(std::fs::read_to_string(&backup).unwrap(), "second");
    }

    #[test]
    fn test_backup_of_missing_file_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        backup_file(&dir.path().join("absent.csv")).unwrap();
    }
}
