//! GitHub API client for commit and diff retrieval

use super::get_json_with_retry;
use crate::config::Settings;
use crate::error::{Result, TrackerError};
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use std::collections::HashMap;
use std::time::Duration;

const BASE_URL: &str = "https://api.github.com";

/// Client responsible for retrieving commits and diffs from GitHub
pub struct GitHubClient {
    client: reqwest::Client,
    owner: String,
    repo: String,
    branch: String,
    target_file: String,
}

impl GitHubClient {
    /// Build a client from settings, applying the auth token when present.
    pub fn new(settings: &Settings) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("diff-based-job-tracker"));
        if let Some(ref token) = settings.github_token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| TrackerError::InvalidConfig(format!("GITHUB_TOKEN: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(settings.request_timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            owner: settings.github_owner.clone(),
            repo: settings.github_repo.clone(),
            branch: settings.github_branch.clone(),
            target_file: settings.github_target_file.clone(),
        })
    }

    /// Return the latest commit SHA for the configured branch.
    pub async fn latest_commit_sha(&self) -> Result<String> {
        let url = format!(
            "{}/repos/{}/{}/branches/{}",
            BASE_URL, self.owner, self.repo, self.branch
        );
        let payload = get_json_with_retry(&self.client, &url, &[], "GitHub").await?;
        payload
            .pointer("/commit/sha")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                TrackerError::GitHub("unable to resolve latest commit SHA".to_string())
            })
    }

    /// Return added lines for the target file between two commits.
    pub async fn added_lines(&self, old_sha: &str, new_sha: &str) -> Result<Vec<String>> {
        let url = format!(
            "{}/repos/{}/{}/compare/{}...{}",
            BASE_URL, self.owner, self.repo, old_sha, new_sha
        );
        let payload = get_json_with_retry(&self.client, &url, &[], "GitHub").await?;
        let files = payload
            .get("files")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        for changed_file in &files {
            if changed_file.get("filename").and_then(|v| v.as_str()) != Some(&self.target_file) {
                continue;
            }

            match non_empty_patch(changed_file) {
                Some(patch) => return Ok(added_lines_from_patch(patch)),
                None => {
                    tracing::warn!(
                        "Patch missing for {} in compare API. Falling back to file-level diff.",
                        self.target_file
                    );
                    let old_content = self.file_content_at(old_sha).await?;
                    let new_content = self.file_content_at(new_sha).await?;
                    return Ok(added_lines_between(&old_content, &new_content));
                }
            }
        }

        tracing::info!("Target file {} not changed in compare result.", self.target_file);
        Ok(Vec::new())
    }

    /// Download and decode the target file at a commit SHA.
    ///
    /// A 404 means the file did not exist at that commit and yields empty
    /// content.
    async fn file_content_at(&self, sha: &str) -> Result<String> {
        let url = format!(
            "{}/repos/{}/{}/contents/{}",
            BASE_URL, self.owner, self.repo, self.target_file
        );
        let query = [("ref", sha.to_string())];
        let payload = match get_json_with_retry(&self.client, &url, &query, "GitHub").await {
            Ok(payload) => payload,
            Err(TrackerError::Http(e)) if e.status() == Some(reqwest::StatusCode::NOT_FOUND) => {
                return Ok(String::new());
            }
            Err(e) => return Err(e),
        };

        if payload.get("encoding").and_then(|v| v.as_str()) != Some("base64") {
            return Err(TrackerError::GitHub(
                "unexpected file encoding from contents API".to_string(),
            ));
        }

        let encoded: String = payload
            .get("content")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| TrackerError::GitHub(format!("invalid base64 content: {}", e)))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Patch text for a changed file. Large files come back with a missing
/// or empty `patch` field; both mean the file-level fallback is needed.
fn non_empty_patch(changed_file: &serde_json::Value) -> Option<&str> {
    changed_file
        .get("patch")
        .and_then(|v| v.as_str())
        .filter(|patch| !patch.is_empty())
}

/// Collect added lines from a unified diff patch, dropping the `+++` header.
pub fn added_lines_from_patch(patch: &str) -> Vec<String> {
    patch
        .lines()
        .filter(|line| !line.starts_with("+++"))
        .filter_map(|line| line.strip_prefix('+'))
        .map(str::to_string)
        .collect()
}

/// Compute lines present in `new` but not in `old`, respecting multiplicity.
pub fn added_lines_between(old: &str, new: &str) -> Vec<String> {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    for line in old.lines() {
        *seen.entry(line).or_insert(0) += 1;
    }

    let mut added = Vec::new();
    for line in new.lines() {
        match seen.get_mut(line) {
            Some(count) if *count > 0 => *count -= 1,
            _ => added.push(line.to_string()),
        }
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_added_lines_from_patch() {
        let patch = "\
@@ -1,3 +1,5 @@
--- a/README.md
+++ b/README.md
 context line
+<tr><td>Stripe</td></tr>
-removed line
+<tr><td>OpenAI</td></tr>";
        let added = added_lines_from_patch(patch);
        assert_eq!(
            added,
            vec![
                "<tr><td>Stripe</td></tr>".to_string(),
                "<tr><td>OpenAI</td></tr>".to_string(),
            ]
        );
    }

    #[test]
    fn test_added_lines_from_patch_empty() {
        assert!(added_lines_from_patch("").is_empty());
        assert!(added_lines_from_patch(" context only").is_empty());
    }

    #[test]
    fn test_added_lines_between() {
        let old = "a\nb\nc";
        let new = "a\nb\nc\nd\ne";
        assert_eq!(added_lines_between(old, new), vec!["d", "e"]);
    }

    #[test]
    fn test_added_lines_between_respects_multiplicity() {
        let old = "row\nrow";
        let new = "row\nrow\nrow";
        assert_eq!(added_lines_between(old, new), vec!["row"]);
    }

    #[test]
    fn test_non_empty_patch_treats_blank_as_missing() {
        let with_patch = serde_json::json!({ "patch": "+row" });
        assert_eq!(non_empty_patch(&with_patch), Some("+row"));

        let blank_patch = serde_json::json!({ "patch": "" });
        assert!(non_empty_patch(&blank_patch).is_none());

        let no_patch = serde_json::json!({ "filename": "README.md" });
        assert!(non_empty_patch(&no_patch).is_none());
    }

    #[test]
    fn test_added_lines_between_empty_old() {
        let new = "x\ny";
        assert_eq!(added_lines_between("", new), vec!["x", "y"]);
    }
}
