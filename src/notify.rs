//! Notification handlers for Discord and optional Facebook

use crate::config::Settings;
use crate::error::{Result, TrackerError};
use crate::llm::JobAnalysis;
use std::time::Duration;

const RETRIES: u32 = 3;

/// Sends notifications to external channels
pub struct Notifier {
    client: reqwest::Client,
    discord_webhook_url: String,
    enable_facebook: bool,
    facebook_page_access_token: Option<String>,
    facebook_page_id: Option<String>,
}

impl Notifier {
    /// Build a notifier from settings.
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            discord_webhook_url: settings.discord_webhook_url.clone(),
            enable_facebook: settings.enable_facebook,
            facebook_page_access_token: settings.facebook_page_access_token.clone(),
            facebook_page_id: settings.facebook_page_id.clone(),
        })
    }

    /// Send one Discord embed notification.
    pub async fn send_discord(
        &self,
        job: &JobAnalysis,
        apply_link: &str,
        posted_age: Option<&str>,
        posted_date: Option<&str>,
    ) -> Result<()> {
        let payload = discord_payload(job, apply_link, posted_age, posted_date);

        let mut last_error: Option<TrackerError> = None;
        for attempt in 0..RETRIES {
            let outcome = self
                .client
                .post(&self.discord_webhook_url)
                .json(&payload)
                .send()
                .await;

            match outcome {
                Ok(response) => {
                    let status = response.status().as_u16();
                    match status {
                        200 | 204 => return Ok(()),
                        s if crate::source::is_transient_status(s) => {
                            last_error = Some(TrackerError::Notify(format!(
                                "transient Discord error: {}",
                                status
                            )));
                        }
                        _ => {
                            let body = response.text().await.unwrap_or_default();
                            return Err(TrackerError::Notify(format!(
                                "Discord webhook failed with status {}: {}",
                                status, body
                            )));
                        }
                    }
                }
                Err(e) if e.is_timeout() || e.is_connect() || e.is_request() => {
                    last_error = Some(e.into());
                }
                Err(e) => return Err(e.into()),
            }

            if attempt + 1 < RETRIES {
                let sleep_seconds = 2u64.pow(attempt);
                tracing::warn!("Discord send failed. Retrying in {}s.", sleep_seconds);
                tokio::time::sleep(Duration::from_secs(sleep_seconds)).await;
            }
        }

        Err(last_error
            .unwrap_or_else(|| TrackerError::Notify("Discord send failed after retries".to_string())))
    }

    /// Optional Facebook notifier stub (disabled by default).
    pub async fn send_facebook(&self, job: &JobAnalysis, _apply_link: &str) -> Result<()> {
        if !self.enable_facebook {
            return Ok(());
        }

        if self.facebook_page_access_token.is_none() || self.facebook_page_id.is_none() {
            tracing::warn!(
                "Facebook notifications enabled but credentials are incomplete; skipping."
            );
            return Ok(());
        }

        tracing::info!(
            "Facebook notifications are configured as a stub in this version. \
             No Facebook API call is performed for {}.",
            job.company
        );
        Ok(())
    }
}

/// Build the Discord embed payload for one job.
fn discord_payload(
    job: &JobAnalysis,
    apply_link: &str,
    posted_age: Option<&str>,
    posted_date: Option<&str>,
) -> serde_json::Value {
    let mut fields = vec![
        field("Company", truncate(&job.company, 1024), true),
        field("Role", truncate(&job.role, 1024), true),
        field("Location", truncate(location_or_unknown(job), 1024), true),
        field(
            "Score",
            format!("{} ({})", job.prestige_score, score_badge(job.prestige_score)),
            true,
        ),
    ];

    if let Some(age) = posted_age {
        fields.push(field("Posted", age.to_string(), true));
    }
    if let Some(date) = posted_date {
        fields.push(field("Posted Date", date.to_string(), true));
    }

    fields.push(field("Why This Match", truncate(&job.reason, 1024), false));
    fields.push(field(
        "Apply",
        format!("[Open application]({})", apply_link),
        false,
    ));

    serde_json::json!({
        "embeds": [{
            "title": format!("{} - {}", job.company, job.role),
            "url": apply_link,
            "description": "High-quality tech internship match detected.",
            "color": discord_color(job.prestige_score),
            "fields": fields,
        }]
    })
}

fn field(name: &str, value: String, inline: bool) -> serde_json::Value {
    serde_json::json!({ "name": name, "value": value, "inline": inline })
}

fn location_or_unknown(job: &JobAnalysis) -> &str {
    if job.location.trim().is_empty() {
        "Unknown"
    } else {
        &job.location
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}

fn discord_color(score: u8) -> u32 {
    if score > 85 {
        0x2ECC71 // Green
    } else if score > 75 {
        0xF1C40F // Yellow
    } else {
        0x95A5A6 // Neutral
    }
}

fn score_badge(score: u8) -> &'static str {
    if score >= 95 {
        "Elite"
    } else if score >= 85 {
        "Strong"
    } else if score >= 75 {
        "Good"
    } else {
        "Low"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job() -> JobAnalysis {
        JobAnalysis {
            company: "Stripe".to_string(),
            role: "SWE Intern".to_string(),
            location: "San Francisco, CA".to_string(),
            is_tech_intern: true,
            prestige_score: 96,
            reason: "Top-tier fintech.".to_string(),
        }
    }

    #[test]
    fn test_discord_color_bands() {
        assert_eq!(discord_color(96), 0x2ECC71);
        assert_eq!(discord_color(86), 0x2ECC71);
        assert_eq!(discord_color(80), 0xF1C40F);
        assert_eq!(discord_color(70), 0x95A5A6);
    }

    #[test]
    fn test_score_badges() {
        assert_eq!(score_badge(95), "Elite");
        assert_eq!(score_badge(85), "Strong");
        assert_eq!(score_badge(75), "Good");
        assert_eq!(score_badge(74), "Low");
    }

    #[test]
    fn test_discord_payload_shape() {
        let payload = discord_payload(
            &sample_job(),
            "https://stripe.com/jobs/listing/123",
            Some("3d"),
            Some("2026-08-20"),
        );
        let embed = &payload["embeds"][0];
        assert_eq!(embed["title"], "Stripe - SWE Intern");
        assert_eq!(embed["url"], "https://stripe.com/jobs/listing/123");
        assert_eq!(embed["color"], 0x2ECC71);

        let fields = embed["fields"].as_array().unwrap();
        assert!(fields.iter().any(|f| f["name"] == "Posted" && f["value"] == "3d"));
        assert!(fields
            .iter()
            .any(|f| f["name"] == "Apply"
                && f["value"]
                    .as_str()
                    .unwrap()
                    .contains("https://stripe.com/jobs/listing/123")));
    }

    #[test]
    fn test_discord_payload_omits_missing_age() {
        let payload = discord_payload(&sample_job(), "https://x.test/jobs/1", None, None);
        let fields = payload["embeds"][0]["fields"].as_array().unwrap();
        assert!(!fields.iter().any(|f| f["name"] == "Posted"));
        assert!(!fields.iter().any(|f| f["name"] == "Posted Date"));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let long = "é".repeat(2000);
        let cut = truncate(&long, 1024);
        assert_eq!(cut.chars().count(), 1024);
    }

    #[test]
    fn test_location_fallback() {
        let mut job = sample_job();
        job.location = "  ".to_string();
        assert_eq!(location_or_unknown(&job), "Unknown");
    }
}
