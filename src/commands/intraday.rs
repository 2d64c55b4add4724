//! Intraday pipeline: download every instrument's trade tape for the
//! session, save the raw JSON, write the condensed trades CSV into the
//! repository and zip-archive the day's downloads.

use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::{error, info};

use crate::config::IntradayConfig;
use crate::error::{Error, Result};
use crate::models::{catalog, intraday::IntradaySession, Instrument};
use crate::services::{archive, intraday, report_row, Fetcher, RunReport};
use crate::utils::{ensure_directory_exists, session_date};

struct Download {
    index: usize,
    total: usize,
    instrument: Instrument,
    error: Option<String>,
    raw: Option<Vec<u8>>,
}

pub fn run(config_path: &Path) {
    if let Err(e) = run_inner(config_path) {
        eprintln!("intraday failed: {}", e);
        std::process::exit(1);
    }
}

fn run_inner(config_path: &Path) -> Result<()> {
    let config = IntradayConfig::load(config_path)?;
    let session = session_date();
    println!("trading session date: {}", session.format("%Y-%m-%d"));

    ensure_directory_exists(&config.repository_folder)?;

    let downloads_dir = config
        .downloads_folder
        .join("intraday")
        .join(session.format("%Y").to_string())
        .join(session.format("%Y%m%d").to_string());
    ensure_directory_exists(&downloads_dir)?;

    let instruments = read_instruments(&config.instruments_file)?;
    println!(
        "{} instruments read from {}",
        instruments.len(),
        config.instruments_file.display()
    );

    let total = instruments.len();
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| Error::Other(format!("cannot create runtime: {}", e)))?;
    let report =
        runtime.block_on(run_pipeline(config, session, &downloads_dir, instruments))?;

    // The day's raw downloads travel as one archive next to the folder.
    let parent = downloads_dir.parent().unwrap_or(Path::new("."));
    let dest = archive::next_archive_path(
        &parent.join(format!("{}_enx_eoi", session.format("%Y%m%d"))),
    );
    match archive::zip_folder(&downloads_dir, &dest) {
        Ok(count) => info!("archived {} downloads to {}", count, dest.display()),
        Err(e) => error!("cannot archive downloads: {}", e),
    }

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
    config: IntradayConfig,
    session: NaiveDate,
    downloads_dir: &Path,
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
            store_one(&drain_config, session, download, &mut report);
        }
        report
    });

    let config = Arc::new(config);
    let downloads_dir = downloads_dir.to_path_buf();
    let mut handles = Vec::with_capacity(total);
    for (index, instrument) in instruments.into_iter().enumerate() {
        let fetcher = Arc::clone(&fetcher);
        let semaphore = Arc::clone(&semaphore);
        let config = Arc::clone(&config);
        let downloads_dir = downloads_dir.clone();
        let tx = tx.clone();

        handles.push(tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("download semaphore closed");
            let download = download_one(
                &config,
                index,
                total,
                instrument,
                &fetcher,
                &downloads_dir,
            )
            .await;
            let _ = tx.send(download).await;
        }));
    }
    drop(tx);

    futures::future::join_all(handles).await;

    drain
        .await
        .map_err(|e| Error::Other(format!("store task failed: {}", e)))
}

async fn download_one(
    config: &IntradayConfig,
    index: usize,
    total: usize,
    instrument: Instrument,
    fetcher: &Fetcher,
    downloads_dir: &Path,
) -> Download {
    let label = instrument.progress_label(index, total);
    let mut download = Download {
        index,
        total,
        instrument,
        error: None,
        raw: None,
    };

    let raw = match intraday::fetch_trades(
        fetcher,
        &download.instrument,
        config.start_date_days_back,
    )
    .await
    {
        Ok(raw) => raw,
        Err(e) => {
            let detail = e.to_string();
            error!("{}: skipping: {}", label, detail);
            download.error = Some(detail);
            return download;
        }
    };

    let json_file = downloads_dir.join(format!("{}.json", download.instrument.base_name()));
    if let Err(e) = std::fs::write(&json_file, &raw) {
        let detail = format!("failed to save '{}': {}", json_file.display(), e);
        error!("{}: {}", label, detail);
        download.error = Some(detail);
    } else {
        info!("{}: downloaded and saved", label);
    }

    download.raw = Some(raw);
    download
}

fn store_one(
    config: &IntradayConfig,
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
        if download.raw.is_none() {
            info!("{}: not stored due to download error", label);
            return;
        }
    }

    let Some(raw) = &download.raw else {
        return;
    };

    if raw.len() < 10 {
        report
            .zero_lines
            .push(report_row(session, instrument, &raw.len().to_string()));
        info!("{}: raw data is too short, not stored", label);
        return;
    }

    let session_data: IntradaySession = match serde_json::from_slice(raw) {
        Ok(data) => data,
        Err(e) => {
            let detail = format!("cannot unmarshal json data: {}", e);
            report
                .merge_errors
                .push(report_row(session, instrument, &detail));
            error!("{}: {}", label, detail);
            return;
        }
    };

    if session_data.rows.is_empty() {
        report
            .no_history_lines
            .push(report_row(session, instrument, "no trades found"));
        info!("{}: no trades found", label);
        return;
    }

    if let Err(e) = write_trades(config, session, instrument, &session_data) {
        report
            .merge_errors
            .push(report_row(session, instrument, &e.to_string()));
        error!("{}: {}", label, e);
        return;
    }

    info!("{}: stored {} trades", label, session_data.rows.len());
}

fn write_trades(
    config: &IntradayConfig,
    session: NaiveDate,
    instrument: &Instrument,
    session_data: &IntradaySession,
) -> Result<()> {
    let directory = config
        .repository_folder
        .join(instrument.folder())
        .join("intraday");
    ensure_directory_exists(&directory)?;

    let mut file: PathBuf = directory.join(format!("{}.csv", session.format("%Y%m%d")));
    if config.repository_gzipped {
        file.as_mut_os_string().push(".gz");
    }

    intraday::write_trades_csv(&file, &session_data.rows)?;
    Ok(())
}
