//! jobtrack - diff-based internship tracker
//!
//! Polls job listing sources for newly added rows, scores them with an
//! LLM, deduplicates against a local store, and notifies Discord. Ships
//! with:
//!
//! - GitHub diff polling and Airtable table ingestion
//! - Row parsing and apply-link normalization
//! - A Facebook Messenger webhook server for PSID capture
//! - A docker compose stack wrapper that propagates the tracker's exit code

pub mod config;
pub mod db;
pub mod debug;
pub mod error;
pub mod llm;
pub mod notify;
pub mod parse;
pub mod source;
pub mod stack;
pub mod tracker;
pub mod webhook;

pub use error::{Result, TrackerError};
