//! Runtime settings loaded from environment variables

use crate::error::{Result, TrackerError};
use std::str::FromStr;

/// Which listing source a run reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    /// GitHub diff-based source
    GitHub,
    /// Airtable table source
    Airtable,
    /// Both sources, fetched concurrently
    Both,
}

impl FromStr for SourceType {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "github" => Ok(SourceType::GitHub),
            "airtable" => Ok(SourceType::Airtable),
            "both" => Ok(SourceType::Both),
            other => Err(TrackerError::InvalidConfig(format!(
                "SOURCE_TYPE must be one of 'github', 'airtable', 'both', got '{}'",
                other
            ))),
        }
    }
}

/// Runtime settings
#[derive(Debug, Clone)]
pub struct Settings {
    /// GitHub repository owner
    pub github_owner: String,
    /// GitHub repository name
    pub github_repo: String,
    /// Branch to poll for new commits
    pub github_branch: String,
    /// Optional GitHub API token
    pub github_token: Option<String>,
    /// File tracked for added rows
    pub github_target_file: String,

    /// OpenAI API key
    pub openai_api_key: String,
    /// OpenAI model name
    pub openai_model: String,

    /// Discord webhook URL for notifications
    pub discord_webhook_url: String,

    /// Enable the Facebook notifier
    pub enable_facebook: bool,
    /// Facebook page access token
    pub facebook_page_access_token: Option<String>,
    /// Facebook page id
    pub facebook_page_id: Option<String>,
    /// Graph API version
    pub facebook_graph_api_version: String,
    /// Send as Messenger DM instead of a page post
    pub facebook_send_as_dm: bool,
    /// Messenger recipient PSID
    pub facebook_recipient_psid: Option<String>,
    /// Load a webhook-captured PSID from the store when none is configured
    pub facebook_auto_use_captured_psid: bool,
    /// Messenger messaging type
    pub facebook_messaging_type: String,
    /// Optional Messenger message tag
    pub facebook_message_tag: Option<String>,
    /// Webhook verification token
    pub facebook_webhook_verify_token: Option<String>,
    /// App secret for webhook signature validation
    pub facebook_app_secret: Option<String>,

    /// Airtable personal access token
    pub airtable_pat: Option<String>,
    /// Airtable base id (appXXXX)
    pub airtable_base_id: Option<String>,
    /// Airtable table id (tblXXXX)
    pub airtable_table_id: Option<String>,
    /// Optional Airtable view name
    pub airtable_view: Option<String>,
    /// Shared view URL used to derive base/table ids
    pub airtable_shared_view_url: Option<String>,
    /// Field holding the apply link
    pub airtable_apply_field: String,
    /// Field holding the company name
    pub airtable_company_field: String,
    /// Field holding the role name
    pub airtable_role_field: String,
    /// Field holding the location
    pub airtable_location_field: String,
    /// Field holding the posting date
    pub airtable_date_field: String,

    /// Minimum prestige score required to notify
    pub min_notify_score: u8,
    /// Store path
    pub database_path: String,
    /// HTTP request timeout in seconds
    pub request_timeout_seconds: u64,
    /// Listing source for a run
    pub source_type: SourceType,
    /// Webhook server bind address
    pub webhook_bind: String,
}

impl Settings {
    /// Load settings from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through a variable lookup.
    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            get(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| TrackerError::InvalidConfig(format!("{} is required", key)))
        };
        let optional = |key: &str| get(key).filter(|v| !v.trim().is_empty());
        let or_default = |key: &str, default: &str| optional(key).unwrap_or_else(|| default.to_string());

        let source_type = or_default("SOURCE_TYPE", "github").parse::<SourceType>()?;
        let min_notify_score = parse_u8(&or_default("MIN_NOTIFY_SCORE", "75"), "MIN_NOTIFY_SCORE")?;
        let request_timeout_seconds =
            parse_u64(&or_default("REQUEST_TIMEOUT_SECONDS", "30"), "REQUEST_TIMEOUT_SECONDS")?;

        Ok(Settings {
            github_owner: or_default("GITHUB_OWNER", "SimplifyJobs"),
            github_repo: or_default("GITHUB_REPO", "Summer2026-Internships"),
            github_branch: required("GITHUB_BRANCH")?,
            github_token: optional("GITHUB_TOKEN"),
            github_target_file: or_default("GITHUB_TARGET_FILE", "README.md"),

            openai_api_key: required("OPENAI_API_KEY")?,
            openai_model: or_default("OPENAI_MODEL", "gpt-4o-mini"),

            discord_webhook_url: required("DISCORD_WEBHOOK_URL")?,

            enable_facebook: parse_bool(&or_default("ENABLE_FACEBOOK", "false")),
            facebook_page_access_token: optional("FACEBOOK_PAGE_ACCESS_TOKEN"),
            facebook_page_id: optional("FACEBOOK_PAGE_ID"),
            facebook_graph_api_version: or_default("FACEBOOK_GRAPH_API_VERSION", "v22.0"),
            facebook_send_as_dm: parse_bool(&or_default("FACEBOOK_SEND_AS_DM", "false")),
            facebook_recipient_psid: optional("FACEBOOK_RECIPIENT_PSID"),
            facebook_auto_use_captured_psid: parse_bool(&or_default(
                "FACEBOOK_AUTO_USE_CAPTURED_PSID",
                "true",
            )),
            facebook_messaging_type: or_default("FACEBOOK_MESSAGING_TYPE", "RESPONSE"),
            facebook_message_tag: optional("FACEBOOK_MESSAGE_TAG"),
            facebook_webhook_verify_token: optional("FACEBOOK_WEBHOOK_VERIFY_TOKEN"),
            facebook_app_secret: optional("FACEBOOK_APP_SECRET"),

            airtable_pat: optional("AIRTABLE_PAT"),
            airtable_base_id: optional("AIRTABLE_BASE_ID"),
            airtable_table_id: optional("AIRTABLE_TABLE_ID"),
            airtable_view: optional("AIRTABLE_VIEW"),
            airtable_shared_view_url: optional("AIRTABLE_SHARED_VIEW_URL"),
            airtable_apply_field: or_default("AIRTABLE_APPLY_FIELD", "Apply"),
            airtable_company_field: or_default("AIRTABLE_COMPANY_FIELD", "Company"),
            airtable_role_field: or_default("AIRTABLE_ROLE_FIELD", "Role"),
            airtable_location_field: or_default("AIRTABLE_LOCATION_FIELD", "Location"),
            airtable_date_field: or_default("AIRTABLE_DATE_FIELD", "Date Posted"),

            min_notify_score,
            database_path: or_default("DATABASE_PATH", "/data/jobs.db"),
            request_timeout_seconds,
            source_type,
            webhook_bind: or_default("WEBHOOK_BIND", "0.0.0.0:8080"),
        })
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn parse_u8(value: &str, key: &str) -> Result<u8> {
    value
        .trim()
        .parse()
        .map_err(|_| TrackerError::InvalidConfig(format!("{} must be an integer 0-255", key)))
}

fn parse_u64(value: &str, key: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| TrackerError::InvalidConfig(format!("{} must be a non-negative integer", key)))
}
