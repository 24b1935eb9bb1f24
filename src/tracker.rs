//! Main orchestration pipeline for diff-based internship tracking

use crate::config::{Settings, SourceType};
use crate::db::{self, JobStore};
use crate::error::{Result, TrackerError};
use crate::llm::LlmEngine;
use crate::notify::Notifier;
use crate::parse;
use crate::source::{AirtableClient, GitHubClient};
use once_cell::sync::Lazy;
use regex::Regex;

static URL_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r#"https?://[^\s<>"]+"#).unwrap());

/// One candidate listing extracted from a source
#[derive(Debug, Clone)]
pub struct JobCandidate {
    /// Raw row payload handed to the analysis engine
    pub row_payload: String,
    /// Normalized apply URL
    pub apply_url: String,
    /// Company fallback when analysis fails
    pub company_fallback: String,
    /// Role fallback when analysis fails
    pub role_fallback: String,
    /// Relative age token (GitHub rows only)
    pub posted_age: Option<String>,
    /// Approximate posting date
    pub posted_date: Option<String>,
}

/// Outcome of polling the GitHub source
#[derive(Debug)]
pub struct GithubFetch {
    /// Candidates reconstructed from added diff rows
    pub candidates: Vec<JobCandidate>,
    /// Latest commit SHA on the tracked branch
    pub current_sha: String,
    /// Whether the stored SHA should advance after processing
    pub should_update_sha: bool,
    /// First run with no stored SHA
    pub bootstrapped: bool,
}

/// Execute one polling cycle.
pub async fn run_once(settings: &Settings) -> Result<()> {
    let mut settings = settings.clone();
    let store = JobStore::open(std::path::Path::new(&settings.database_path))?;

    if settings.facebook_auto_use_captured_psid && settings.facebook_recipient_psid.is_none() {
        if let Some(psid) = store.get_state(db::FACEBOOK_RECIPIENT_PSID)? {
            settings.facebook_recipient_psid = Some(psid);
            tracing::info!("Loaded Facebook PSID from store state.");
        }
    }

    let llm = LlmEngine::new(&settings)?;
    let notifier = Notifier::new(&settings)?;

    match settings.source_type {
        SourceType::GitHub => run_from_github(&settings, &store, &llm, &notifier).await,
        SourceType::Airtable => run_from_airtable(&settings, &store, &llm, &notifier).await,
        SourceType::Both => run_from_both(&settings, &store, &llm, &notifier).await,
    }
}

async fn run_from_github(
    settings: &Settings,
    store: &JobStore,
    llm: &LlmEngine,
    notifier: &Notifier,
) -> Result<()> {
    let fetch = fetch_github_candidates(settings, store.last_commit_sha()?).await?;

    if fetch.bootstrapped {
        tracing::info!(
            "No previous commit found. Bootstrapping with current SHA: {}",
            fetch.current_sha
        );
        store.set_last_commit_sha(&fetch.current_sha)?;
        return Ok(());
    }

    if !fetch.should_update_sha {
        tracing::info!("No new commits since last run. Exiting.");
        return Ok(());
    }

    process_candidates(&fetch.candidates, store, llm, notifier, settings).await?;
    store.set_last_commit_sha(&fetch.current_sha)?;
    tracing::info!(
        "Run completed. Updated last processed SHA to {}",
        fetch.current_sha
    );
    Ok(())
}

async fn run_from_airtable(
    settings: &Settings,
    store: &JobStore,
    llm: &LlmEngine,
    notifier: &Notifier,
) -> Result<()> {
    let candidates = fetch_airtable_candidates(settings).await?;
    process_candidates(&candidates, store, llm, notifier, settings).await?;
    tracing::info!("Airtable run completed.");
    Ok(())
}

async fn run_from_both(
    settings: &Settings,
    store: &JobStore,
    llm: &LlmEngine,
    notifier: &Notifier,
) -> Result<()> {
    let last_sha = store.last_commit_sha()?;
    let (github_outcome, airtable_outcome) = tokio::join!(
        fetch_github_candidates(settings, last_sha),
        fetch_airtable_candidates(settings),
    );

    let github_fetch = match github_outcome {
        Ok(fetch) => Some(fetch),
        Err(e) => {
            tracing::error!("GitHub source failed in SOURCE_TYPE=both: {}", e);
            None
        }
    };
    let airtable_candidates = match airtable_outcome {
        Ok(candidates) => Some(candidates),
        Err(e) => {
            tracing::error!("Airtable source failed in SOURCE_TYPE=both: {}", e);
            None
        }
    };

    if github_fetch.is_none() && airtable_candidates.is_none() {
        return Err(TrackerError::GitHub(
            "both GitHub and Airtable sources failed".to_string(),
        ));
    }
    if github_fetch.is_none() || airtable_candidates.is_none() {
        tracing::warn!("One source failed, but the other source was processed successfully.");
    }

    if let Some(fetch) = github_fetch {
        if fetch.bootstrapped {
            tracing::info!(
                "No previous commit found. Bootstrapping with current SHA: {}",
                fetch.current_sha
            );
        } else if !fetch.should_update_sha {
            tracing::info!("No new commits since last run for GitHub source.");
        }

        process_candidates(&fetch.candidates, store, llm, notifier, settings).await?;
        if fetch.should_update_sha {
            store.set_last_commit_sha(&fetch.current_sha)?;
            tracing::info!("Updated last processed GitHub SHA to {}", fetch.current_sha);
        }
    }

    if let Some(candidates) = airtable_candidates {
        process_candidates(&candidates, store, llm, notifier, settings).await?;
    }

    tracing::info!("Combined run completed.");
    Ok(())
}

/// Poll GitHub for rows added to the target file since `last_sha`.
pub async fn fetch_github_candidates(
    settings: &Settings,
    last_sha: Option<String>,
) -> Result<GithubFetch> {
    let client = GitHubClient::new(settings)?;
    let current_sha = client.latest_commit_sha().await?;

    let Some(last_sha) = last_sha else {
        return Ok(GithubFetch {
            candidates: Vec::new(),
            current_sha,
            should_update_sha: true,
            bootstrapped: true,
        });
    };

    if last_sha == current_sha {
        return Ok(GithubFetch {
            candidates: Vec::new(),
            current_sha,
            should_update_sha: false,
            bootstrapped: false,
        });
    }

    let added_lines = client.added_lines(&last_sha, &current_sha).await?;
    let rows = parse::reconstruct_rows(&added_lines);
    let candidates: Vec<JobCandidate> = rows.iter().filter_map(|row| github_candidate(row)).collect();
    tracing::info!("Detected {} GitHub candidate row(s) to process.", candidates.len());

    Ok(GithubFetch {
        candidates,
        current_sha,
        should_update_sha: true,
        bootstrapped: false,
    })
}

/// Fetch all Airtable records and convert them to candidates.
pub async fn fetch_airtable_candidates(settings: &Settings) -> Result<Vec<JobCandidate>> {
    let client = AirtableClient::new(settings)?;
    let records = client.list_records().await?;
    tracing::info!("Fetched {} Airtable record(s).", records.len());

    let candidates: Vec<JobCandidate> = records
        .iter()
        .filter_map(|record| airtable_candidate(record, settings))
        .collect();
    tracing::info!("Detected {} Airtable candidate row(s) to process.", candidates.len());
    Ok(candidates)
}

/// Build a candidate from a reconstructed GitHub table row.
pub fn github_candidate(row: &str) -> Option<JobCandidate> {
    let apply_url = parse::extract_apply_link(row)?;

    let posted_age = parse::extract_posted_age(row);
    let posted_date = parse::estimate_posted_date(posted_age.as_deref());
    let (company, role, _) = parse::extract_company_role_location(row);

    Some(JobCandidate {
        row_payload: row.to_string(),
        apply_url,
        company_fallback: company.unwrap_or_else(|| "Unknown".to_string()),
        role_fallback: role.unwrap_or_else(|| "Unknown".to_string()),
        posted_age,
        posted_date,
    })
}

/// Build a candidate from an Airtable record.
pub fn airtable_candidate(record: &serde_json::Value, settings: &Settings) -> Option<JobCandidate> {
    let fields = record.get("fields")?.as_object()?;

    let apply_url = extract_apply_url_from_fields(fields, &settings.airtable_apply_field)?;
    let company_fallback = non_empty_or_unknown(stringify_value(
        fields.get(&settings.airtable_company_field),
    ));
    let role_fallback =
        non_empty_or_unknown(stringify_value(fields.get(&settings.airtable_role_field)));
    let posted_date = coerce_iso_date(fields.get(&settings.airtable_date_field));

    let mut row_payload = build_row_payload(fields);
    if row_payload.is_empty() {
        row_payload = format!(
            "Company: {} | Role: {} | Location: {}",
            company_fallback,
            role_fallback,
            stringify_value(fields.get(&settings.airtable_location_field)),
        );
    }

    Some(JobCandidate {
        row_payload,
        apply_url,
        company_fallback,
        role_fallback,
        posted_age: None,
        posted_date,
    })
}

async fn process_candidates(
    candidates: &[JobCandidate],
    store: &JobStore,
    llm: &LlmEngine,
    notifier: &Notifier,
    settings: &Settings,
) -> Result<()> {
    for candidate in candidates {
        process_candidate(candidate, store, llm, notifier, settings).await?;
    }
    Ok(())
}

async fn process_candidate(
    candidate: &JobCandidate,
    store: &JobStore,
    llm: &LlmEngine,
    notifier: &Notifier,
    settings: &Settings,
) -> Result<()> {
    let link_hash = db::hash_link(&candidate.apply_url);
    if store.exists(&link_hash)? {
        tracing::info!("Skipping existing job: {}", candidate.apply_url);
        return Ok(());
    }

    let analysis = match llm.analyze_job(&candidate.row_payload).await {
        Ok(analysis) => analysis,
        Err(e) => {
            tracing::error!(
                "LLM analysis failed ({}). Recording row as processed without notification.",
                e
            );
            store.insert_processed(
                &link_hash,
                &candidate.company_fallback,
                &candidate.role_fallback,
                0,
                false,
            )?;
            return Ok(());
        }
    };

    let mut notified = false;
    if analysis.is_tech_intern && analysis.prestige_score >= settings.min_notify_score {
        let mut discord_sent = false;
        match notifier
            .send_discord(
                &analysis,
                &candidate.apply_url,
                candidate.posted_age.as_deref(),
                candidate.posted_date.as_deref(),
            )
            .await
        {
            Ok(()) => discord_sent = true,
            Err(e) => {
                tracing::error!(
                    "Failed to send Discord notification for {}: {}",
                    candidate.apply_url,
                    e
                );
            }
        }

        let mut facebook_sent = false;
        if settings.enable_facebook {
            match notifier.send_facebook(&analysis, &candidate.apply_url).await {
                Ok(()) => facebook_sent = true,
                Err(e) => {
                    tracing::error!(
                        "Failed to send Facebook notification for {}: {}",
                        candidate.apply_url,
                        e
                    );
                }
            }
        }

        notified = discord_sent || facebook_sent;
    } else {
        tracing::info!(
            "Skipping notification company={} role={} score={} tech={}",
            analysis.company,
            analysis.role,
            analysis.prestige_score,
            analysis.is_tech_intern
        );
    }

    store.insert_processed(
        &link_hash,
        &analysis.company,
        &analysis.role,
        analysis.prestige_score,
        notified,
    )?;
    Ok(())
}

fn non_empty_or_unknown(text: String) -> String {
    if text.is_empty() {
        "Unknown".to_string()
    } else {
        text
    }
}

/// Flatten an Airtable field value into display text.
pub fn stringify_value(value: Option<&serde_json::Value>) -> String {
    let Some(value) = value else {
        return String::new();
    };
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Bool(b) => if *b { "true" } else { "false" }.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Object(map) => {
            for key in ["url", "href", "link", "name", "label", "title"] {
                if let Some(serde_json::Value::String(s)) = map.get(key) {
                    if !s.trim().is_empty() {
                        return s.trim().to_string();
                    }
                }
            }
            join_parts(map.values())
        }
        serde_json::Value::Array(items) => join_parts(items.iter()),
    }
}

fn join_parts<'a>(values: impl Iterator<Item = &'a serde_json::Value>) -> String {
    let parts: Vec<String> = values
        .map(|v| stringify_value(Some(v)))
        .filter(|part| !part.is_empty())
        .collect();
    parts.join(", ")
}

/// Pull a URL out of an arbitrarily shaped Airtable field value.
pub fn extract_url_from_value(value: Option<&serde_json::Value>) -> Option<String> {
    let value = value?;
    match value {
        serde_json::Value::String(s) => {
            let text = s.trim();
            if text.starts_with("http://") || text.starts_with("https://") {
                return Some(text.to_string());
            }
            URL_REGEX
                .find(text)
                .map(|m| m.as_str().trim_end_matches(&[')', '.', ','][..]).to_string())
        }
        serde_json::Value::Object(map) => {
            for key in ["url", "href", "link"] {
                if let Some(serde_json::Value::String(s)) = map.get(key) {
                    if !s.trim().is_empty() {
                        return Some(s.trim().to_string());
                    }
                }
            }
            map.values().find_map(|v| extract_url_from_value(Some(v)))
        }
        serde_json::Value::Array(items) => {
            items.iter().find_map(|v| extract_url_from_value(Some(v)))
        }
        _ => None,
    }
}

fn extract_apply_url_from_fields(
    fields: &serde_json::Map<String, serde_json::Value>,
    preferred_field: &str,
) -> Option<String> {
    if let Some(url) = extract_url_from_value(fields.get(preferred_field)) {
        return Some(url);
    }

    fields.iter().find_map(|(key, value)| {
        let key = key.to_lowercase();
        if !key.contains("apply") && !key.contains("job") && !key.contains("link") && !key.contains("url")
        {
            return None;
        }
        extract_url_from_value(Some(value))
    })
}

fn coerce_iso_date(value: Option<&serde_json::Value>) -> Option<String> {
    let text = stringify_value(value);
    if text.is_empty() {
        return None;
    }

    if let Ok(date) = text.parse::<chrono::NaiveDate>() {
        return Some(date.to_string());
    }
    if let Ok(datetime) = chrono::DateTime::parse_from_rfc3339(&text) {
        return Some(datetime.date_naive().to_string());
    }
    None
}

fn build_row_payload(fields: &serde_json::Map<String, serde_json::Value>) -> String {
    let parts: Vec<String> = fields
        .iter()
        .filter_map(|(key, value)| {
            let text = stringify_value(Some(value));
            if text.is_empty() {
                None
            } else {
                Some(format!("{}: {}", key, text))
            }
        })
        .collect();
    parts.join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_settings() -> Settings {
        Settings::from_lookup(|key| match key {
            "GITHUB_BRANCH" => Some("dev".to_string()),
            "OPENAI_API_KEY" => Some("sk-test".to_string()),
            "DISCORD_WEBHOOK_URL" => Some("https://discord.com/api/webhooks/1/x".to_string()),
            _ => None,
        })
        .unwrap()
    }

    const SAMPLE_ROW: &str = concat!(
        "<tr><td>Stripe</td><td>SWE Intern</td><td>SF</td>",
        r#"<td><a href="https://stripe.com/jobs/listing/123">Apply</a></td>"#,
        "<td>2d</td></tr>"
    );

    #[test]
    fn test_github_candidate_from_row() {
        let candidate = github_candidate(SAMPLE_ROW).unwrap();
        assert_eq!(candidate.apply_url, "https://stripe.com/jobs/listing/123");
        assert_eq!(candidate.company_fallback, "Stripe");
        assert_eq!(candidate.role_fallback, "SWE Intern");
        assert_eq!(candidate.posted_age.as_deref(), Some("2d"));
        assert!(candidate.posted_date.is_some());
    }

    #[test]
    fn test_github_candidate_without_link() {
        assert!(github_candidate("<tr><td>No link here</td></tr>").is_none());
    }

    #[test]
    fn test_airtable_candidate() {
        let settings = test_settings();
        let record = json!({
            "id": "recAbc",
            "fields": {
                "Company": "OpenAI",
                "Role": "Research Intern",
                "Location": "Remote",
                "Apply": {"url": "https://openai.com/careers/42"},
                "Date Posted": "2026-08-01",
            }
        });

        let candidate = airtable_candidate(&record, &settings).unwrap();
        assert_eq!(candidate.apply_url, "https://openai.com/careers/42");
        assert_eq!(candidate.company_fallback, "OpenAI");
        assert_eq!(candidate.role_fallback, "Research Intern");
        assert_eq!(candidate.posted_date.as_deref(), Some("2026-08-01"));
        assert!(candidate.row_payload.contains("Company: OpenAI"));
    }

    #[test]
    fn test_airtable_candidate_fallback_link_field() {
        let settings = test_settings();
        let record = json!({
            "fields": {
                "Company": "Acme",
                "Job Link": "see https://acme.example/jobs/7.",
            }
        });

        let candidate = airtable_candidate(&record, &settings).unwrap();
        assert_eq!(candidate.apply_url, "https://acme.example/jobs/7");
    }

    #[test]
    fn test_airtable_candidate_without_url() {
        let settings = test_settings();
        let record = json!({ "fields": { "Company": "Acme" } });
        assert!(airtable_candidate(&record, &settings).is_none());
    }

    #[test]
    fn test_stringify_value_shapes() {
        assert_eq!(stringify_value(Some(&json!("  text  "))), "text");
        assert_eq!(stringify_value(Some(&json!(true))), "true");
        assert_eq!(stringify_value(Some(&json!(42))), "42");
        assert_eq!(
            stringify_value(Some(&json!({"name": "Acme", "other": "x"}))),
            "Acme"
        );
        assert_eq!(stringify_value(Some(&json!(["a", "", "b"]))), "a, b");
        assert_eq!(stringify_value(None), "");
    }

    #[test]
    fn test_extract_url_from_value_nested() {
        let value = json!([{"attachment": {"href": "https://x.test/apply"}}]);
        assert_eq!(
            extract_url_from_value(Some(&value)).as_deref(),
            Some("https://x.test/apply")
        );
    }

    #[test]
    fn test_coerce_iso_date() {
        assert_eq!(
            coerce_iso_date(Some(&json!("2026-08-01"))).as_deref(),
            Some("2026-08-01")
        );
        assert_eq!(
            coerce_iso_date(Some(&json!("2026-08-01T12:30:00Z"))).as_deref(),
            Some("2026-08-01")
        );
        assert!(coerce_iso_date(Some(&json!("soon"))).is_none());
        assert!(coerce_iso_date(None).is_none());
    }
}
