use reqwest::Client;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{AppError, Result};

/// Shared HTTP fetcher used by every download path.
///
/// Requests carry the browser-like headers the venue expects; failures
/// (transport errors, non-2xx statuses, HTML bodies where CSV was expected)
/// are retried following the configured delay schedule. The schedule's
/// length is the retry budget.
pub struct Fetcher {
    client: Client,
    user_agent: String,
    retry_delays: Vec<Duration>,
}

enum Payload<'a> {
    Get,
    Form(&'a [(&'a str, String)]),
}

impl Fetcher {
    pub fn new(user_agent: &str, timeout: Duration, retry_delays: Vec<Duration>) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Network(format!("cannot create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            user_agent: user_agent.to_string(),
            retry_delays,
        })
    }

    /// GET `url`, optionally rejecting HTML bodies (the venue serves an HTML
    /// error page instead of a status code when it throttles downloads).
    pub async fn get(
        &self,
        url: &str,
        referer: &str,
        label: &str,
        reject_html: bool,
    ) -> Result<Vec<u8>> {
        self.fetch(url, referer, label, reject_html, Payload::Get)
            .await
    }

    /// POST a form-encoded body.
    pub async fn post_form(
        &self,
        url: &str,
        referer: &str,
        label: &str,
        form: &[(&str, String)],
    ) -> Result<Vec<u8>> {
        self.fetch(url, referer, label, false, Payload::Form(form))
            .await
    }

    async fn fetch(
        &self,
        url: &str,
        referer: &str,
        label: &str,
        reject_html: bool,
        payload: Payload<'_>,
    ) -> Result<Vec<u8>> {
        let attempts = self.retry_delays.len().max(1);
        let mut last_error = AppError::Network("no attempt made".to_string());

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = self.retry_delays[attempt - 1];
                warn!(
                    "{}: download failed, retrying in {:.0}s ({} of {} left): {}",
                    label,
                    delay.as_secs_f64(),
                    attempts - attempt,
                    attempts,
                    last_error
                );
                sleep(delay).await;
            }

            match self.attempt(url, referer, &payload).await {
                Ok(body) => {
                    if reject_html && body.first() == Some(&b'<') {
                        last_error =
                            AppError::Parse(format!("received an HTML page from {}", url));
                        continue;
                    }
                    debug!("{}: downloaded {} bytes", label, body.len());
                    return Ok(body);
                }
                Err(e) => {
                    last_error = e;
                }
            }
        }

        Err(AppError::Network(format!(
            "{}: download failed, giving up after {} attempts: {}",
            label, attempts, last_error
        )))
    }

    async fn attempt(&self, url: &str, referer: &str, payload: &Payload<'_>) -> Result<Vec<u8>> {
        let builder = match payload {
            Payload::Get => self.client.get(url),
            Payload::Form(form) => self.client.post(url).form(form),
        };

        let response = builder
            .header("User-Agent", &self.user_agent)
            .header("Referer", referer)
            .header("Accept-Language", "en-us,en;q=0.5")
            .header("Accept-Charset", "ISO-8859-1,utf-8;q=0.7,*;q=0.7")
            .header("X-Requested-With", "XMLHttpRequest")
            .header("Accept", "application/json, text/javascript, */*")
            .send()
            .await
            .map_err(|e| AppError::Network(format!("download failed {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Network(format!(
                "download failed {}: HTTP {}",
                url,
                status.as_u16()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| AppError::Network(format!("cannot read response body {}: {}", url, e)))?;

        Ok(body.to_vec())
    }
}
