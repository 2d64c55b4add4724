use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc, Weekday};
use std::path::Path;

use crate::error::{AppError, Result};

/// Create a directory (and its parents) if it does not exist yet.
pub fn ensure_directory_exists(directory: &Path) -> Result<()> {
    if !directory.exists() {
        std::fs::create_dir_all(directory).map_err(|e| {
            AppError::Io(format!(
                "cannot create directory '{}': {}",
                directory.display(),
                e
            ))
        })?;
    }

    Ok(())
}

/// The trading session a run attributes its downloads to.
///
/// Euronext publishes the current session's history after the close, so
/// before 19:00 CET the previous trading day is still the session of record.
/// Weekends map back to Friday.
pub fn session_date() -> NaiveDate {
    session_date_from(Utc::now())
}

fn session_date_from(now: DateTime<Utc>) -> NaiveDate {
    let today = now + Duration::hours(1);

    match today.weekday() {
        Weekday::Sat => (today - Duration::days(1)).date_naive(),
        Weekday::Sun => (today - Duration::days(2)).date_naive(),
        _ => {
            if today.hour() < 19 {
                (today - Duration::days(1)).date_naive()
            } else {
                today.date_naive()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_session_date_weekday_before_close() {
        // Wednesday 2024-06-12 10:00 UTC -> previous day
        assert_eq!(
            session_date_from(utc(2024, 6, 12, 10)),
            NaiveDate::from_ymd_opt(2024, 6, 11).unwrap()
        );
    }

    #[test]
    fn test_session_date_weekday_after_close() {
        // Wednesday 2024-06-12 20:00 UTC (21:00 CET) -> same day
        assert_eq!(
            session_date_from(utc(2024, 6, 12, 20)),
            NaiveDate::from_ymd_opt(2024, 6, 12).unwrap()
        );
    }

    #[test]
    fn test_session_date_weekend() {
        // Saturday 2024-06-15 -> Friday
        assert_eq!(
            session_date_from(utc(2024, 6, 15, 12)),
            NaiveDate::from_ymd_opt(2024, 6, 14).unwrap()
        );
        // Sunday 2024-06-16 -> Friday
        assert_eq!(
            session_date_from(utc(2024, 6, 16, 12)),
            NaiveDate::from_ymd_opt(2024, 6, 14).unwrap()
        );
    }

    #[test]
    fn test_session_date_utc_offset_rolls_into_saturday() {
        // Friday 23:30 UTC is already Saturday in CET -> Friday
        let now = Utc.with_ymd_and_hms(2024, 6, 14, 23, 30, 0).unwrap();
        assert_eq!(
            session_date_from(now),
            NaiveDate::from_ymd_opt(2024, 6, 14).unwrap()
        );
    }
}
