//! Listing sources: GitHub diff polling and Airtable tables

pub mod airtable;
pub mod github;

pub use airtable::AirtableClient;
pub use github::GitHubClient;

use crate::error::{Result, TrackerError};

const RETRIES: u32 = 3;
const TRANSIENT_STATUSES: &[u16] = &[429, 500, 502, 503, 504];

/// Whether an HTTP status is worth retrying.
///
/// Rate limiting and the common upstream 5xx statuses are transient;
/// everything else is terminal.
pub(crate) fn is_transient_status(status: u16) -> bool {
    TRANSIENT_STATUSES.contains(&status)
}

/// GET a JSON payload with short exponential backoff retries.
///
/// Transient statuses (429 and common 5xx) and transport failures are
/// retried; any other HTTP error is terminal.
pub(crate) async fn get_json_with_retry(
    client: &reqwest::Client,
    url: &str,
    query: &[(&str, String)],
    label: &str,
) -> Result<serde_json::Value> {
    let mut last_error: Option<TrackerError> = None;

    for attempt in 0..RETRIES {
        let outcome = client.get(url).query(query).send().await;
        match outcome {
            Ok(response) => {
                let status = response.status();
                if is_transient_status(status.as_u16()) {
                    if let Err(e) = response.error_for_status() {
                        last_error = Some(e.into());
                    }
                } else {
                    let response = response.error_for_status()?;
                    return Ok(response.json().await?);
                }
            }
            Err(e) if e.is_timeout() || e.is_connect() || e.is_request() => {
                last_error = Some(e.into());
            }
            Err(e) => return Err(e.into()),
        }

        if attempt + 1 < RETRIES {
            let sleep_seconds = 2u64.pow(attempt);
            tracing::warn!(
                "{} request failed (attempt {}/{}). Retrying in {}s.",
                label,
                attempt + 1,
                RETRIES,
                sleep_seconds
            );
            tokio::time::sleep(std::time::Duration::from_secs(sleep_seconds)).await;
        }
    }

    Err(last_error.unwrap_or_else(|| exhausted_error(label)))
}

/// Build the retries-exhausted error for the source named by `label`.
fn exhausted_error(label: &str) -> TrackerError {
    let message = format!("{} request failed after retries", label);
    match label {
        "Airtable" => TrackerError::Airtable(message),
        _ => TrackerError::GitHub(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_statuses_are_retried() {
        for status in [429, 500, 502, 503, 504] {
            assert!(is_transient_status(status), "{} should retry", status);
        }
    }

    #[test]
    fn test_terminal_statuses_are_not_retried() {
        for status in [200, 301, 400, 401, 403, 404, 422, 501] {
            assert!(!is_transient_status(status), "{} should be terminal", status);
        }
    }

    #[test]
    fn test_exhausted_error_uses_source_label() {
        assert!(matches!(
            exhausted_error("Airtable"),
            TrackerError::Airtable(_)
        ));
        assert!(matches!(exhausted_error("GitHub"), TrackerError::GitHub(_)));
    }
}
