use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, Result};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/108.0.0.0 Safari/537.36";

/// Downloads run with at most this many concurrent instruments.
pub const MAX_CONCURRENCY: usize = 8;

/// Configuration for the end-of-day `pull` command, read once at startup.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PullConfig {
    pub downloads_folder: PathBuf,
    pub repository_folder: PathBuf,
    pub instruments_file: PathBuf,
    pub repository_gzipped: bool,
    /// Transport-level retry schedule; the length is the retry budget.
    pub download_retry_delay_seconds: Vec<u64>,
    /// Outer per-instrument retry schedule for the adjusted/unadjusted pair.
    pub retry_delay_minutes: Vec<u64>,
    pub download_timeout_seconds: u64,
    pub concurrency: usize,
    pub user_agent: String,
}

impl Default for PullConfig {
    fn default() -> Self {
        Self {
            downloads_folder: PathBuf::from("downloads"),
            repository_folder: PathBuf::from("repository"),
            instruments_file: PathBuf::from("instruments.xml"),
            repository_gzipped: false,
            download_retry_delay_seconds: vec![2, 2, 2, 2, 2],
            retry_delay_minutes: vec![1, 2, 5],
            download_timeout_seconds: 60,
            concurrency: 1,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl PullConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let mut config: PullConfig = read_json(path)?;
        config.download_timeout_seconds = config.download_timeout_seconds.max(1);
        config.concurrency = clamp_concurrency(config.concurrency);
        Ok(config)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_seconds)
    }

    pub fn transport_retry_delays(&self) -> Vec<Duration> {
        seconds_to_durations(&self.download_retry_delay_seconds)
    }

    pub fn pair_retry_delays(&self) -> Vec<Duration> {
        self.retry_delay_minutes
            .iter()
            .map(|&m| Duration::from_secs(m.max(1) * 60))
            .collect()
    }
}

/// Configuration for the `intraday` command.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IntradayConfig {
    pub downloads_folder: PathBuf,
    pub repository_folder: PathBuf,
    pub instruments_file: PathBuf,
    pub repository_gzipped: bool,
    pub download_retry_delay_seconds: Vec<u64>,
    pub download_timeout_seconds: u64,
    pub concurrency: usize,
    pub user_agent: String,
    /// How many working days back the requested session lies.
    pub start_date_days_back: u32,
}

impl Default for IntradayConfig {
    fn default() -> Self {
        Self {
            downloads_folder: PathBuf::from("downloads"),
            repository_folder: PathBuf::from("repository"),
            instruments_file: PathBuf::from("instruments.xml"),
            repository_gzipped: false,
            download_retry_delay_seconds: vec![2, 2, 2, 2, 2],
            download_timeout_seconds: 60,
            concurrency: 1,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            start_date_days_back: 0,
        }
    }
}

impl IntradayConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let mut config: IntradayConfig = read_json(path)?;
        config.download_timeout_seconds = config.download_timeout_seconds.max(1);
        config.concurrency = clamp_concurrency(config.concurrency);
        Ok(config)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_seconds)
    }

    pub fn transport_retry_delays(&self) -> Vec<Duration> {
        seconds_to_durations(&self.download_retry_delay_seconds)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        AppError::Config(format!("cannot open '{}': {}", path.display(), e))
    })?;

    serde_json::from_str(&contents)
        .map_err(|e| AppError::Config(format!("cannot decode '{}': {}", path.display(), e)))
}

fn clamp_concurrency(concurrency: usize) -> usize {
    // Below 2 means sequential; the venue tolerates at most 8 parallel pulls.
    if concurrency < 2 {
        1
    } else {
        concurrency.min(MAX_CONCURRENCY)
    }
}

fn seconds_to_durations(seconds: &[u64]) -> Vec<Duration> {
    seconds
        .iter()
        .map(|&s| Duration::from_secs(s.max(1)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_pull_config_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"repositoryFolder": "repo", "concurrency": 32, "repositoryGzipped": true}}"#
        )
        .unwrap();

        let config = PullConfig::load(file.path()).unwrap();
        assert_eq!(config.repository_folder, PathBuf::from("repo"));
        assert_eq!(config.concurrency, MAX_CONCURRENCY);
        assert!(config.repository_gzipped);
        assert_eq!(config.downloads_folder, PathBuf::from("downloads"));
        assert!(!config.user_agent.is_empty());
    }

    #[test]
    fn test_concurrency_below_two_is_sequential() {
        assert_eq!(clamp_concurrency(0), 1);
        assert_eq!(clamp_concurrency(1), 1);
        assert_eq!(clamp_concurrency(2), 2);
        assert_eq!(clamp_concurrency(100), MAX_CONCURRENCY);
    }

    #[test]
    fn test_retry_delay_floor() {
        let config = IntradayConfig {
            download_retry_delay_seconds: vec![0, 3],
            ..Default::default()
        };
        let delays = config.transport_retry_delays();
        assert_eq!(delays, vec![Duration::from_secs(1), Duration::from_secs(3)]);
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let err = PullConfig::load(Path::new("no-such-file.json")).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
