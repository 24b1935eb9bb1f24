//! Airtable API client for listing job records

use super::get_json_with_retry;
use crate::config::Settings;
use crate::error::{Result, TrackerError};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use std::time::Duration;

const BASE_URL: &str = "https://api.airtable.com/v0";

static SHARED_URL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://airtable\.com/(app[a-zA-Z0-9]+)/(shr[a-zA-Z0-9]+)/(tbl[a-zA-Z0-9]+)")
        .unwrap()
});

/// Client responsible for retrieving records from the Airtable Web API
pub struct AirtableClient {
    client: reqwest::Client,
    base_id: String,
    table_id: String,
    view: Option<String>,
}

impl AirtableClient {
    /// Build a client from settings. Requires the PAT plus base/table ids
    /// (directly configured or derived from a shared view URL).
    pub fn new(settings: &Settings) -> Result<Self> {
        let pat = settings.airtable_pat.as_deref().ok_or_else(|| {
            TrackerError::InvalidConfig(
                "AIRTABLE_PAT is required when the Airtable source is enabled".to_string(),
            )
        })?;

        let (base_id, table_id) = resolve_identifiers(settings)?;

        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", pat))
            .map_err(|e| TrackerError::InvalidConfig(format!("AIRTABLE_PAT: {}", e)))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(settings.request_timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_id,
            table_id,
            view: settings.airtable_view.clone(),
        })
    }

    /// Extract base and table identifiers from a shared Airtable URL.
    pub fn parse_identifiers_from_shared_url(url: &str) -> (Option<String>, Option<String>) {
        match SHARED_URL_REGEX.captures(url.trim()) {
            Some(caps) => (Some(caps[1].to_string()), Some(caps[3].to_string())),
            None => (None, None),
        }
    }

    /// Return all records from the configured table, following pagination.
    pub async fn list_records(&self) -> Result<Vec<serde_json::Value>> {
        let endpoint = format!("{}/{}/{}", BASE_URL, self.base_id, self.table_id);

        let mut all_records = Vec::new();
        let mut offset: Option<String> = None;

        loop {
            let mut query: Vec<(&str, String)> = vec![("pageSize", "100".to_string())];
            if let Some(ref view) = self.view {
                query.push(("view", view.clone()));
            }
            if let Some(ref cursor) = offset {
                query.push(("offset", cursor.clone()));
            }

            let payload = get_json_with_retry(&self.client, &endpoint, &query, "Airtable")
                .await
                .map_err(|e| match e {
                    TrackerError::Http(inner) => TrackerError::Airtable(inner.to_string()),
                    other => other,
                })?;

            if let Some(records) = payload.get("records").and_then(|v| v.as_array()) {
                all_records.extend(records.iter().filter(|r| r.is_object()).cloned());
            }

            match payload.get("offset").and_then(|v| v.as_str()) {
                Some(cursor) if !cursor.is_empty() => offset = Some(cursor.to_string()),
                _ => break,
            }
        }

        Ok(all_records)
    }
}

/// Resolve base/table ids from explicit settings or the shared view URL.
fn resolve_identifiers(settings: &Settings) -> Result<(String, String)> {
    let mut base_id = settings.airtable_base_id.clone();
    let mut table_id = settings.airtable_table_id.clone();

    if base_id.is_none() || table_id.is_none() {
        if let Some(ref url) = settings.airtable_shared_view_url {
            let (parsed_base, parsed_table) = AirtableClient::parse_identifiers_from_shared_url(url);
            if base_id.is_none() {
                base_id = parsed_base;
            }
            if table_id.is_none() {
                table_id = parsed_table;
            }
        }
    }

    match (base_id, table_id) {
        (Some(base), Some(table)) => Ok((base, table)),
        _ => Err(TrackerError::InvalidConfig(
            "Airtable source requires AIRTABLE_BASE_ID and AIRTABLE_TABLE_ID, \
             or AIRTABLE_SHARED_VIEW_URL that contains both ids"
                .to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_identifiers_from_shared_url() {
        let (base, table) = AirtableClient::parse_identifiers_from_shared_url(
            "https://airtable.com/appAbC123/shrXyZ456/tblQwE789",
        );
        assert_eq!(base.as_deref(), Some("appAbC123"));
        assert_eq!(table.as_deref(), Some("tblQwE789"));
    }

    #[test]
    fn test_parse_identifiers_rejects_other_urls() {
        let (base, table) =
            AirtableClient::parse_identifiers_from_shared_url("https://airtable.com/appOnly");
        assert!(base.is_none());
        assert!(table.is_none());

        let (base, table) =
            AirtableClient::parse_identifiers_from_shared_url("https://example.com/appA/shrB/tblC");
        assert!(base.is_none());
        assert!(table.is_none());
    }

    #[test]
    fn test_resolve_identifiers_prefers_explicit_ids() {
        let mut settings = crate::config::Settings::from_lookup(|key| match key {
            "GITHUB_BRANCH" => Some("dev".to_string()),
            "OPENAI_API_KEY" => Some("sk-test".to_string()),
            "DISCORD_WEBHOOK_URL" => Some("https://discord.com/api/webhooks/1/x".to_string()),
            "AIRTABLE_SHARED_VIEW_URL" => {
                Some("https://airtable.com/appUrl/shrUrl/tblUrl".to_string())
            }
            _ => None,
        })
        .unwrap();
        settings.airtable_base_id = Some("appExplicit".to_string());

        let (base, table) = resolve_identifiers(&settings).unwrap();
        assert_eq!(base, "appExplicit");
        assert_eq!(table, "tblUrl");
    }

    #[test]
    fn test_resolve_identifiers_missing() {
        let settings = crate::config::Settings::from_lookup(|key| match key {
            "GITHUB_BRANCH" => Some("dev".to_string()),
            "OPENAI_API_KEY" => Some("sk-test".to_string()),
            "DISCORD_WEBHOOK_URL" => Some("https://discord.com/api/webhooks/1/x".to_string()),
            _ => None,
        })
        .unwrap();
        assert!(matches!(
            resolve_identifiers(&settings),
            Err(TrackerError::InvalidConfig(_))
        ));
    }
}
