//! Shared JSON POST with retry for the hosted provider clients.
//!
//! Retry strategy:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors, including timeouts → retry
//! - Backoff: 1s, 2s, 4s, ... (capped at 2^5)

use std::time::Duration;
use tracing::warn;

use crate::error::{Error, Result};

/// Build a client carrying the per-call timeout.
pub fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// POST `body` to `url` with bearer auth and return the decoded JSON reply.
///
/// Makes at most `1 + max_retries` attempts.
pub async fn post_json_with_retry(
    client: &reqwest::Client,
    url: &str,
    api_key: &str,
    body: &serde_json::Value,
    max_retries: u32,
) -> Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let resp = client
            .post(url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await;

        match resp {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                let body_text = response.text().await.unwrap_or_default();
                let err = Error::Provider(format!("{} returned {}: {}", url, status, body_text));

                if status.as_u16() == 429 || status.is_server_error() {
                    warn!(url, %status, attempt, "Transient provider error");
                    last_err = Some(err);
                    continue;
                }

                return Err(err);
            }
            Err(e) => {
                warn!(url, attempt, error = %e, "Provider request failed");
                last_err = Some(e.into());
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| Error::Provider("request failed after retries".to_string())))
}
