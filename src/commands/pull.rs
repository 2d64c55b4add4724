//! End-of-day pipeline: download every instrument's adjusted/unadjusted
//! history pair, archive the raw downloads, and merge the parsed bars into
//! the per-instrument repository files.
//!
//! Downloads fan out over a bounded worker pool; merges drain sequentially
//! from a channel so only one task ever touches the repository.

use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::PullConfig;
use crate::error::{Error, Result};
use crate::models::{catalog, DailyBar, Instrument};
use crate::services::{
    archive, eod, history_store, merge, report_row, Fetcher, RunReport,
};
use crate::utils::{ensure_directory_exists, session_date};

/// One instrument's download, handed to the merge drain.
struct Download {
    index: usize,
    total: usize,
    instrument: Instrument,
    error: Option<String>,
    unadjusted: Option<Vec<u8>>,
    adjusted: Option<Vec<u8>>,
}

pub fn run(config_path: &Path) {
    if let Err(e) = run_inner(config_path) {
        eprintln!("pull failed: {}", e);
        std::process::exit(1);
    }
}

fn run_inner(config_path: &Path) -> Result<()> {
    let config = PullConfig::load(config_path)?;
    let session = session_date();
    println!("trading session date: {}", session.format("%Y-%m-%d"));

    ensure_directory_exists(&config.downloads_folder)?;
    ensure_directory_exists(&config.repository_folder)?;

    let instruments = read_instruments(&config.instruments_file)?;
    println!(
        "{} instruments read from {}",
        instruments.len(),
        config.instruments_file.display()
    );

    let total = instruments.len();
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| Error::Other(format!("cannot create runtime: {}", e)))?;
    let report = runtime.block_on(run_pipeline(config, session, instruments))?;

    report.print_summary(total);
    Ok(())
}

fn read_instruments(path: &Path) -> Result<Vec<Instrument>> {
    let catalog = catalog::read_xml_file(path)?;
    Ok(catalog
        .instruments
        .iter()
        .map(Instrument::from_catalog)
        .collect())
}

async fn run_pipeline(
    config: PullConfig,
    session: NaiveDate,
    instruments: Vec<Instrument>,
) -> Result<RunReport> {
    let total = instruments.len();
    let fetcher = Arc::new(Fetcher::new(
        &config.user_agent,
        config.download_timeout(),
        config.transport_retry_delays(),
    )?);
    let semaphore = Arc::new(Semaphore::new(config.concurrency));
    let (tx, mut rx) = mpsc::channel::<Download>(total.max(1));

    let drain_config = config.clone();
    let drain = tokio::spawn(async move {
        let mut report = RunReport::new();
        while let Some(download) = rx.recv().await {
            merge_one(&drain_config, session, download, &mut report);
        }
        report
    });

    let config = Arc::new(config);
    let mut handles = Vec::with_capacity(total);
    for (index, instrument) in instruments.into_iter().enumerate() {
        let fetcher = Arc::clone(&fetcher);
        let semaphore = Arc::clone(&semaphore);
        let config = Arc::clone(&config);
        let tx = tx.clone();

        handles.push(tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("download semaphore closed");
            let download =
                download_one(&config, session, index, total, instrument, &fetcher).await;
            let _ = tx.send(download).await;
        }));
    }
    drop(tx);

    futures::future::join_all(handles).await;

    drain
        .await
        .map_err(|e| Error::Other(format!("merge task failed: {}", e)))
}

async fn download_one(
    config: &PullConfig,
    session: NaiveDate,
    index: usize,
    total: usize,
    instrument: Instrument,
    fetcher: &Fetcher,
) -> Download {
    let label = instrument.progress_label(index, total);
    let mut download = Download {
        index,
        total,
        instrument,
        error: None,
        unadjusted: None,
        adjusted: None,
    };
    let instrument = download.instrument.clone();

    let downloads_dir = config
        .downloads_folder
        .join(instrument.folder())
        .join("endofday");
    if let Err(e) = ensure_directory_exists(&downloads_dir) {
        let detail = format!("cannot create download directory: {}", e);
        error!("{}: {}", label, detail);
        download.error = Some(detail);
        return download;
    }

    let delays = config.pair_retry_delays();
    let attempts = delays.len().max(1);
    for attempt in 0..attempts {
        match eod::download_pair(fetcher, &instrument).await {
            Ok((adjusted, unadjusted)) => {
                download.adjusted = Some(adjusted);
                download.unadjusted = Some(unadjusted);
                break;
            }
            Err(e) => {
                if attempt + 1 >= attempts {
                    let detail = format!("giving up after {} retries", attempts);
                    error!("{}: {}: {}", label, detail, e);
                    download.error = Some(detail);
                    return download;
                }

                let delay = delays[attempt];
                warn!(
                    "{}: failed to download, retry {} of {} in {}s: {}",
                    label,
                    attempt + 1,
                    attempts,
                    delay.as_secs(),
                    e
                );
                sleep(delay).await;
            }
        }
    }

    if let (Some(unadjusted), Some(adjusted)) = (&download.unadjusted, &download.adjusted) {
        match archive::archive_eod_pair(
            &downloads_dir,
            &instrument.base_name(),
            session,
            unadjusted,
            adjusted,
        ) {
            Ok(_) => info!("{}: archived", label),
            Err(e) => {
                // The bytes are still good; record the archive failure and
                // let the merge proceed.
                let detail = format!("cannot archive downloads: {}", e);
                error!("{}: {}", label, detail);
                download.error = Some(detail);
            }
        }
    }

    download
}

fn merge_one(
    config: &PullConfig,
    session: NaiveDate,
    download: Download,
    report: &mut RunReport,
) {
    let instrument = &download.instrument;
    let label = format!(
        "[{} of {}] {}",
        download.index + 1,
        download.total,
        instrument.base_name()
    );

    if let Some(error) = &download.error {
        report
            .download_errors
            .push(report_row(session, instrument, error));
        if download.unadjusted.is_none() || download.adjusted.is_none() {
            info!("{}: not merged due to download error", label);
            return;
        }
    }

    let (Some(unadjusted), Some(adjusted)) = (&download.unadjusted, &download.adjusted) else {
        return;
    };

    let (combined, len_raw, len_adj) = eod::combine_lines(unadjusted, adjusted);
    let lines_detail = format!("{};{}", len_raw, len_adj);
    if len_raw != len_adj {
        report
            .unequal_lines
            .push(report_row(session, instrument, &lines_detail));
    }

    if combined.is_empty() {
        report
            .zero_lines
            .push(report_row(session, instrument, &lines_detail));
        info!("{}: empty download", label);
        return;
    }

    if len_raw == len_adj && combined.len() < 5 {
        report
            .under_five_lines
            .push(report_row(session, instrument, &lines_detail));
    }

    let bars = match eod::parse_combined(&combined) {
        Ok(bars) => bars,
        Err(e) => {
            let detail = format!("cannot convert download: {}", e);
            report
                .merge_errors
                .push(report_row(session, instrument, &detail));
            error!("{}: {}", label, detail);
            return;
        }
    };

    if bars.is_empty() {
        report
            .no_history_lines
            .push(report_row(session, instrument, &lines_detail));
        info!("{}: valid header but no history", label);
        return;
    }

    if let Err(e) = persist(config, session, instrument, bars, report, &label) {
        report
            .merge_errors
            .push(report_row(session, instrument, &e.to_string()));
        error!("{}: {}", label, e);
    }
}

fn persist(
    config: &PullConfig,
    session: NaiveDate,
    instrument: &Instrument,
    bars: Vec<DailyBar>,
    report: &mut RunReport,
    label: &str,
) -> Result<()> {
    let directory = config.repository_folder.join(instrument.folder());
    ensure_directory_exists(&directory)?;

    let mut file: PathBuf = directory.join(format!("{}.1d.csv", instrument.base_name()));
    if config.repository_gzipped {
        file.as_mut_os_string().push(".gz");
    }

    if file.exists() {
        let old = history_store::read_history(&file)?;
        let (merged, messages) = merge::merge_daily_history(&old, &bars);
        for message in messages {
            report
                .merge_messages
                .push(report_row(session, instrument, &message));
        }

        history_store::backup_file(&file)?;
        history_store::write_history(&file, &merged)?;
        info!("{}: merged {} bars", label, merged.len());
    } else {
        let sorted = merge::sort_ascending(bars);
        history_store::write_history(&file, &sorted)?;
        info!("{}: created with {} bars", label, sorted.len());
    }

    Ok(())
}
