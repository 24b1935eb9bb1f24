//! OpenAI-powered analysis engine for internship rows

use crate::config::Settings;
use crate::error::{Result, TrackerError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
const SYSTEM_PROMPT: &str = "You are an elite Tech Recruiter.";
const RETRIES: u32 = 2;

/// Structured output from LLM job analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobAnalysis {
    /// Company name
    pub company: String,
    /// Role name
    pub role: String,
    /// Location text
    pub location: String,
    /// True only for engineering-track internships
    pub is_tech_intern: bool,
    /// Prestige score, 0-100
    pub prestige_score: u8,
    /// Concise reasoning text
    pub reason: String,
}

impl JobAnalysis {
    /// Parse and validate a JSON payload returned by the model.
    pub fn from_json(content: &str) -> Result<Self> {
        let analysis: JobAnalysis = serde_json::from_str(content)
            .map_err(|e| TrackerError::LlmOutput(format!("invalid structured output: {}", e)))?;
        if analysis.prestige_score > 100 {
            return Err(TrackerError::LlmOutput(format!(
                "prestige_score out of range: {}",
                analysis.prestige_score
            )));
        }
        Ok(analysis)
    }
}

/// Wrapper around OpenAI for row-level job analysis
pub struct LlmEngine {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl LlmEngine {
    /// Build an engine from settings.
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            api_key: settings.openai_api_key.clone(),
            model: settings.openai_model.clone(),
        })
    }

    /// Analyze one table row and return validated structured output.
    pub async fn analyze_job(&self, raw_row: &str) -> Result<JobAnalysis> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": 0.1,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": user_prompt(raw_row) },
            ],
        });

        let mut last_error: Option<TrackerError> = None;

        for attempt in 0..RETRIES {
            let outcome = self
                .client
                .post(COMPLETIONS_URL)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match outcome {
                Ok(response) => {
                    let status = response.status();
                    if crate::source::is_transient_status(status.as_u16()) {
                        last_error = Some(TrackerError::Llm(format!(
                            "transient OpenAI error: {}",
                            status
                        )));
                    } else {
                        let response = response.error_for_status()?;
                        let payload: serde_json::Value = response.json().await?;
                        let content = payload
                            .pointer("/choices/0/message/content")
                            .and_then(|v| v.as_str())
                            .filter(|s| !s.is_empty())
                            .ok_or_else(|| {
                                TrackerError::Llm("OpenAI returned empty content".to_string())
                            })?;
                        return JobAnalysis::from_json(content);
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
                    "Transient OpenAI error. Retrying in {}s.",
                    sleep_seconds
                );
                tokio::time::sleep(Duration::from_secs(sleep_seconds)).await;
            }
        }

        Err(last_error
            .unwrap_or_else(|| TrackerError::Llm("OpenAI request failed after retries".to_string())))
    }
}

fn user_prompt(raw_row: &str) -> String {
    format!(
        "Analyze this internship listing row and return strict JSON with fields: \
         company, role, location, is_tech_intern, prestige_score, reason. \
         Classification: is_tech_intern=true only for SWE, Backend, Fullstack, AI/ML, DevOps, Quant. \
         Set false for QA, Testing, PM, Marketing and other non-engineering tracks. \
         Scoring rubric: 95+ for FAANG/HFT/unicorn-level (e.g., Stripe/OpenAI), \
         85+ for strong tech firms/YC-scale startups, \
         75+ for banks or major non-tech firms with engineering programs, \
         below 70 for unknown or low relevance. \
         Use concise reason text.\n\nRaw row:\n{}",
        raw_row
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_valid() {
        let content = r#"{
            "company": "Stripe",
            "role": "SWE Intern",
            "location": "SF",
            "is_tech_intern": true,
            "prestige_score": 96,
            "reason": "Top-tier fintech."
        }"#;
        let analysis = JobAnalysis::from_json(content).unwrap();
        assert_eq!(analysis.company, "Stripe");
        assert!(analysis.is_tech_intern);
        assert_eq!(analysis.prestige_score, 96);
    }

    #[test]
    fn test_from_json_rejects_out_of_range_score() {
        let content = r#"{
            "company": "X",
            "role": "Y",
            "location": "Z",
            "is_tech_intern": true,
            "prestige_score": 140,
            "reason": "overscored"
        }"#;
        assert!(matches!(
            JobAnalysis::from_json(content),
            Err(TrackerError::LlmOutput(_))
        ));
    }

    #[test]
    fn test_from_json_rejects_unknown_fields() {
        let content = r#"{
            "company": "X",
            "role": "Y",
            "location": "Z",
            "is_tech_intern": false,
            "prestige_score": 10,
            "reason": "r",
            "confidence": 0.9
        }"#;
        assert!(JobAnalysis::from_json(content).is_err());
    }

    #[test]
    fn test_from_json_rejects_missing_fields() {
        assert!(JobAnalysis::from_json(r#"{"company": "X"}"#).is_err());
        assert!(JobAnalysis::from_json("not json").is_err());
    }

    #[test]
    fn test_user_prompt_embeds_row() {
        let prompt = user_prompt("<tr><td>Stripe</td></tr>");
        assert!(prompt.contains("Raw row:\n<tr><td>Stripe</td></tr>"));
        assert!(prompt.contains("prestige_score"));
    }
}
