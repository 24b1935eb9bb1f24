//! Parsing of added diff lines into job row data

use chrono::{Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;

static HREF_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)href\s*=\s*["']([^"']+)["']"#).unwrap());
static APPLY_ANCHOR_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<a[^>]+href\s*=\s*["']([^"']+)["'][^>]*>\s*(?:<img[^>]*alt\s*=\s*["']Apply["']|Apply\b)"#)
        .unwrap()
});
static TAG_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
static CELL_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<td[^>]*>(.*?)</td>").unwrap());
static MARKDOWN_URL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\[(https?://[^\]]+)\]\((https?://[^)]+)\)").unwrap());
static AGE_TOKEN_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(\d+)\s*(h|d|w|mo)\s*$").unwrap());
static WHITESPACE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static NUMERIC_ENTITY_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&#(x[0-9a-fA-F]+|\d+);").unwrap());

const TRACKING_QUERY_KEYS: &[&str] = &["fbclid", "gclid", "igshid", "ref", "source"];
const IMAGE_DOMAINS: &[&str] = &[
    "imgur.com",
    "i.imgur.com",
    "raw.githubusercontent.com",
    "user-images.githubusercontent.com",
];
const IMAGE_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp", ".ico"];

/// Reconstruct complete added table rows from added diff lines.
///
/// Rows split across several added lines are stitched back together from
/// `<tr>` to `</tr>`. When no row markers are present, contiguous chunks
/// containing `<td>` cells are returned instead.
pub fn reconstruct_rows(added_lines: &[String]) -> Vec<String> {
    let mut rows = Vec::new();
    let mut buffer: Vec<String> = Vec::new();
    let mut collecting = false;

    for raw_line in added_lines {
        let line = raw_line.trim();
        let lower = line.to_lowercase();

        if lower.contains("<tr") {
            collecting = true;
            buffer = vec![line.to_string()];
            if lower.contains("</tr>") {
                rows.push(buffer.join(" "));
                buffer.clear();
                collecting = false;
            }
            continue;
        }

        if collecting {
            buffer.push(line.to_string());
            if lower.contains("</tr>") {
                rows.push(buffer.join(" "));
                buffer.clear();
                collecting = false;
            }
        }
    }

    if !rows.is_empty() {
        return rows;
    }

    // Fallback: aggregate contiguous html chunks that look like row content.
    let mut chunks = Vec::new();
    let mut current: Vec<String> = Vec::new();
    for raw_line in added_lines {
        let line = raw_line.trim();
        if line.is_empty() {
            if !current.is_empty() {
                let chunk = current.join(" ");
                if chunk.to_lowercase().contains("<td") {
                    chunks.push(chunk);
                }
                current.clear();
            }
            continue;
        }
        current.push(line.to_string());
    }

    if !current.is_empty() {
        let chunk = current.join(" ");
        if chunk.to_lowercase().contains("<td") {
            chunks.push(chunk);
        }
    }

    chunks
}

/// Extract and normalize the best apply link candidate from an HTML row.
pub fn extract_apply_link(row_html: &str) -> Option<String> {
    for caps in APPLY_ANCHOR_REGEX.captures_iter(row_html) {
        if let Some(candidate) = normalize_candidate_url(&caps[1]) {
            if is_valid_apply_link(&candidate) {
                return Some(candidate);
            }
        }
    }

    for caps in HREF_REGEX.captures_iter(row_html) {
        if let Some(candidate) = normalize_candidate_url(&caps[1]) {
            if is_valid_apply_link(&candidate) {
                return Some(candidate);
            }
        }
    }

    None
}

/// Best-effort extraction of company, role, and location from a row.
pub fn extract_company_role_location(
    row_html: &str,
) -> (Option<String>, Option<String>, Option<String>) {
    let cells: Vec<String> = CELL_REGEX
        .captures_iter(row_html)
        .map(|caps| clean_text(&caps[1]))
        .collect();

    let cell = |idx: usize| cells.get(idx).filter(|s| !s.is_empty()).cloned();
    (cell(0), cell(1), cell(2))
}

/// Extract a relative age token from a table row (e.g. 0d, 3d, 1w, 2mo).
pub fn extract_posted_age(row_html: &str) -> Option<String> {
    let cells: Vec<String> = CELL_REGEX
        .captures_iter(row_html)
        .map(|caps| clean_text(&caps[1]))
        .collect();
    if cells.len() < 5 {
        return None;
    }

    let age_text = &cells[4];
    if age_text.is_empty() || !AGE_TOKEN_REGEX.is_match(age_text) {
        return None;
    }
    Some(age_text.to_lowercase())
}

/// Convert an age token into an approximate UTC posting date (YYYY-MM-DD).
pub fn estimate_posted_date(age_token: Option<&str>) -> Option<String> {
    let token = age_token?;
    let caps = AGE_TOKEN_REGEX.captures(token)?;
    let amount: i64 = caps[1].parse().ok()?;
    let posted = match caps[2].to_lowercase().as_str() {
        "h" => Utc::now() - Duration::hours(amount),
        "d" => Utc::now() - Duration::days(amount),
        "w" => Utc::now() - Duration::weeks(amount),
        "mo" => Utc::now() - Duration::days(amount * 30),
        _ => return None,
    };
    Some(posted.date_naive().to_string())
}

fn normalize_candidate_url(raw_url: &str) -> Option<String> {
    let mut text = unescape_html(raw_url.trim());
    if text.is_empty() {
        return None;
    }

    if let Some(caps) = MARKDOWN_URL_REGEX.captures(&text) {
        text = caps[2].to_string();
    }

    if text.starts_with('[') && text.ends_with(']') {
        text = text[1..text.len() - 1].trim().to_string();
    }

    let mut url = Url::parse(&text).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| {
            let key = key.to_lowercase();
            !key.starts_with("utm_") && !TRACKING_QUERY_KEYS.contains(&key.as_str())
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    url.set_fragment(None);
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept).finish();
    }

    let trimmed_path = url.path().trim_end_matches('/').to_string();
    if !trimmed_path.is_empty() {
        url.set_path(&trimmed_path);
    }

    Some(url.to_string())
}

fn is_valid_apply_link(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let host = parsed.host_str().unwrap_or("").to_lowercase();
    let path = parsed.path().to_lowercase();

    if IMAGE_DOMAINS.iter().any(|domain| host.contains(domain)) {
        return false;
    }
    if IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        return false;
    }
    if path.contains("logo") || path.contains("icon") {
        return false;
    }

    // Common non-apply company profile links in Simplify table rows.
    if host.ends_with("simplify.jobs") && path.starts_with("/c/") {
        return false;
    }

    // Exclude obvious repository/documentation links.
    if host.contains("github.com") && !path.contains("jobs") {
        return false;
    }

    true
}

fn clean_text(raw: &str) -> String {
    let text = TAG_REGEX.replace_all(raw, " ");
    let text = unescape_html(&text);
    WHITESPACE_REGEX.replace_all(&text, " ").trim().to_string()
}

/// Decode the entities that show up in the tracked table markup.
fn unescape_html(text: &str) -> String {
    let text = NUMERIC_ENTITY_REGEX.replace_all(text, |caps: &regex::Captures| {
        let body = &caps[1];
        let code = if let Some(hex_digits) = body.strip_prefix('x') {
            u32::from_str_radix(hex_digits, 16).ok()
        } else {
            body.parse::<u32>().ok()
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    });

    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_ROW: &str = concat!(
        "<tr><td><strong>Stripe</strong></td><td>Software Engineer Intern</td>",
        "<td>San Francisco, CA</td>",
        r#"<td><a href="https://stripe.com/jobs/listing/123?utm_source=simplify"><img alt="Apply" src="x.png"></a></td>"#,
        "<td>3d</td></tr>"
    );

    #[test]
    fn test_reconstruct_rows_multiline() {
        let lines: Vec<String> = vec![
            "<tr>".into(),
            "<td>Stripe</td>".into(),
            "<td>SWE Intern</td>".into(),
            "</tr>".into(),
            "<tr><td>OpenAI</td></tr>".into(),
        ];
        let rows = reconstruct_rows(&lines);
        assert_eq!(rows.len(), 2);
        assert!(rows[0].contains("Stripe"));
        assert!(rows[1].contains("OpenAI"));
    }

    #[test]
    fn test_reconstruct_rows_fallback_chunks() {
        let lines: Vec<String> = vec![
            "<td>Stripe</td> <td>SWE Intern</td>".into(),
            "".into(),
            "plain text without cells".into(),
        ];
        let rows = reconstruct_rows(&lines);
        assert_eq!(rows.len(), 1);
        assert!(rows[0].contains("Stripe"));
    }

    #[test]
    fn test_extract_apply_link_strips_tracking_params() {
        let link = extract_apply_link(SAMPLE_ROW).unwrap();
        assert_eq!(link, "https://stripe.com/jobs/listing/123");
    }

    #[test]
    fn test_extract_apply_link_rejects_images() {
        let row = r#"<tr><td><a href="https://i.imgur.com/abc.png">Apply</a></td></tr>"#;
        assert!(extract_apply_link(row).is_none());
    }

    #[test]
    fn test_extract_apply_link_rejects_company_profiles() {
        let row = r#"<tr><td><a href="https://simplify.jobs/c/Stripe">Apply</a></td></tr>"#;
        assert!(extract_apply_link(row).is_none());
    }

    #[test]
    fn test_extract_apply_link_rejects_github_repos() {
        let row = r#"<tr><td><a href="https://github.com/SimplifyJobs/Summer2026-Internships">Apply</a></td></tr>"#;
        assert!(extract_apply_link(row).is_none());
    }

    #[test]
    fn test_extract_apply_link_prefers_apply_anchor() {
        let row = concat!(
            r#"<tr><td><a href="https://example.com/about">Company</a></td>"#,
            r#"<td><a href="https://example.com/careers/42">Apply</a></td></tr>"#,
        );
        let link = extract_apply_link(row).unwrap();
        assert_eq!(link, "https://example.com/careers/42");
    }

    #[test]
    fn test_extract_company_role_location() {
        let (company, role, location) = extract_company_role_location(SAMPLE_ROW);
        assert_eq!(company.as_deref(), Some("Stripe"));
        assert_eq!(role.as_deref(), Some("Software Engineer Intern"));
        assert_eq!(location.as_deref(), Some("San Francisco, CA"));
    }

    #[test]
    fn test_extract_company_role_location_empty_row() {
        let (company, role, location) = extract_company_role_location("no cells here");
        assert!(company.is_none());
        assert!(role.is_none());
        assert!(location.is_none());
    }

    #[test]
    fn test_extract_posted_age() {
        assert_eq!(extract_posted_age(SAMPLE_ROW).as_deref(), Some("3d"));

        let short_row = "<tr><td>a</td><td>b</td></tr>";
        assert!(extract_posted_age(short_row).is_none());

        let non_age = SAMPLE_ROW.replace("<td>3d</td>", "<td>yesterday</td>");
        assert!(extract_posted_age(&non_age).is_none());
    }

    #[test]
    fn test_estimate_posted_date() {
        let today = Utc::now().date_naive();
        assert_eq!(
            estimate_posted_date(Some("0d")).unwrap(),
            today.to_string()
        );
        assert_eq!(
            estimate_posted_date(Some("1w")).unwrap(),
            (today - Duration::weeks(1)).to_string()
        );
        assert!(estimate_posted_date(None).is_none());
        assert!(estimate_posted_date(Some("soon")).is_none());
    }

    #[test]
    fn test_unescape_html_entities() {
        assert_eq!(unescape_html("Tools &amp; Infra"), "Tools & Infra");
        assert_eq!(unescape_html("a &#38; b"), "a & b");
        assert_eq!(unescape_html("a &#x26; b"), "a & b");
    }

    #[test]
    fn test_clean_text_strips_tags_and_whitespace() {
        let cleaned = clean_text("<strong> Stripe </strong>\n <em>Inc.</em>");
        assert_eq!(cleaned, "Stripe Inc.");
    }
}
