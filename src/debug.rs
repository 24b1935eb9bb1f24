//! Verbose debug runner for diff processing and notification decisions

use crate::config::Settings;
use crate::db::{self, JobStore};
use crate::error::Result;
use crate::llm::LlmEngine;
use crate::notify::Notifier;
use crate::parse;
use crate::source::GitHubClient;

/// Options for a debug run
#[derive(Debug, Default)]
pub struct DebugOptions {
    /// Process at most N reconstructed rows (0 = all)
    pub max_rows: usize,
    /// Actually send Discord/Facebook notifications
    pub send: bool,
    /// Include links already present in the processed set
    pub include_processed: bool,
    /// Override the old/base SHA (defaults to the stored last SHA)
    pub old_sha: Option<String>,
    /// Override the new/head SHA (defaults to the latest branch SHA)
    pub new_sha: Option<String>,
}

#[derive(Debug, Default)]
struct Counters {
    total_rows: usize,
    no_apply_link: usize,
    already_processed: usize,
    llm_failed: usize,
    skipped_not_tech: usize,
    skipped_low_score: usize,
    eligible: usize,
    discord_ok: usize,
    discord_failed: usize,
    facebook_ok: usize,
    facebook_failed: usize,
}

/// Walk the diff between two SHAs and print every filter decision.
///
/// Returns the process exit code: 0 on a completed walk, 1 when no base
/// SHA is available.
pub async fn run(settings: &Settings, opts: &DebugOptions) -> Result<i32> {
    let store = JobStore::open(std::path::Path::new(&settings.database_path))?;
    let github = GitHubClient::new(settings)?;
    let llm = LlmEngine::new(settings)?;
    let notifier = Notifier::new(settings)?;

    let old_sha = match &opts.old_sha {
        Some(sha) if !sha.trim().is_empty() => sha.trim().to_string(),
        _ => store.last_commit_sha()?.unwrap_or_default(),
    };
    if old_sha.is_empty() {
        println!("No old SHA (stored last_commit_sha is empty). Use --old-sha or bootstrap first.");
        return Ok(1);
    }

    let new_sha = match &opts.new_sha {
        Some(sha) if !sha.trim().is_empty() => sha.trim().to_string(),
        _ => github.latest_commit_sha().await?,
    };

    println!("old_sha={}", old_sha);
    println!("new_sha={}", new_sha);
    println!("min_notify_score={}", settings.min_notify_score);
    println!(
        "enable_facebook={}, facebook_send_as_dm={}",
        settings.enable_facebook, settings.facebook_send_as_dm
    );
    println!("send_mode={}", if opts.send { "ON" } else { "OFF (dry-run)" });
    println!();

    let added_lines = github.added_lines(&old_sha, &new_sha).await?;
    let mut rows = parse::reconstruct_rows(&added_lines);
    if opts.max_rows > 0 {
        rows.truncate(opts.max_rows);
    }

    let mut counters = Counters {
        total_rows: rows.len(),
        ..Counters::default()
    };
    println!("reconstructed_rows={}", rows.len());

    for (idx, row) in rows.iter().enumerate() {
        let idx = idx + 1;

        let Some(apply_link) = parse::extract_apply_link(row) else {
            counters.no_apply_link += 1;
            println!("[{}] SKIP no_apply_link", idx);
            continue;
        };

        let link_hash = db::hash_link(&apply_link);
        if store.exists(&link_hash)? && !opts.include_processed {
            counters.already_processed += 1;
            println!("[{}] SKIP already_processed link={}", idx, apply_link);
            continue;
        }

        let (fallback_company, fallback_role, fallback_location) =
            parse::extract_company_role_location(row);

        let analysis = match llm.analyze_job(row).await {
            Ok(analysis) => analysis,
            Err(e) => {
                counters.llm_failed += 1;
                println!(
                    "[{}] SKIP llm_failed company={} role={} error={}",
                    idx,
                    fallback_company.as_deref().unwrap_or("Unknown"),
                    fallback_role.as_deref().unwrap_or("Unknown"),
                    e
                );
                continue;
            }
        };

        let mut reasons = Vec::new();
        if !analysis.is_tech_intern {
            counters.skipped_not_tech += 1;
            reasons.push("not_tech".to_string());
        }
        if analysis.prestige_score < settings.min_notify_score {
            counters.skipped_low_score += 1;
            reasons.push(format!("score<{}", settings.min_notify_score));
        }

        let company = pick(&analysis.company, fallback_company.as_deref());
        let role = pick(&analysis.role, fallback_role.as_deref());
        let location = pick(&analysis.location, fallback_location.as_deref());

        if !reasons.is_empty() {
            println!(
                "[{}] SKIP {} company={} role={} score={} tech={} location={}",
                idx,
                reasons.join(","),
                company,
                role,
                analysis.prestige_score,
                analysis.is_tech_intern,
                location
            );
            continue;
        }

        counters.eligible += 1;
        println!(
            "[{}] ELIGIBLE company={} role={} score={} tech={} location={}",
            idx, company, role, analysis.prestige_score, analysis.is_tech_intern, location
        );
        println!("      apply={}", apply_link);

        if !opts.send {
            continue;
        }

        let posted_age = parse::extract_posted_age(row);
        let posted_date = parse::estimate_posted_date(posted_age.as_deref());
        match notifier
            .send_discord(&analysis, &apply_link, posted_age.as_deref(), posted_date.as_deref())
            .await
        {
            Ok(()) => {
                counters.discord_ok += 1;
                println!("      discord=ok");
            }
            Err(e) => {
                counters.discord_failed += 1;
                println!("      discord=failed error={}", e);
            }
        }

        if settings.enable_facebook {
            match notifier.send_facebook(&analysis, &apply_link).await {
                Ok(()) => {
                    counters.facebook_ok += 1;
                    println!("      facebook=ok");
                }
                Err(e) => {
                    counters.facebook_failed += 1;
                    println!("      facebook=failed error={}", e);
                }
            }
        }
    }

    println!("\nSummary");
    println!("total_rows={}", counters.total_rows);
    println!("no_apply_link={}", counters.no_apply_link);
    println!("already_processed={}", counters.already_processed);
    println!("llm_failed={}", counters.llm_failed);
    println!("skipped_not_tech={}", counters.skipped_not_tech);
    println!("skipped_low_score={}", counters.skipped_low_score);
    println!("eligible={}", counters.eligible);
    println!("discord_ok={}", counters.discord_ok);
    println!("discord_failed={}", counters.discord_failed);
    println!("facebook_ok={}", counters.facebook_ok);
    println!("facebook_failed={}", counters.facebook_failed);

    Ok(0)
}

fn pick<'a>(primary: &'a str, fallback: Option<&'a str>) -> &'a str {
    if !primary.trim().is_empty() {
        primary
    } else {
        fallback.filter(|s| !s.trim().is_empty()).unwrap_or("Unknown")
    }
}
