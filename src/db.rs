//! Persistent store for deduplication and run state, backed by redb.
//!
//! Two tables:
//! - `processed_jobs`: key = sha256 hex of the normalized apply link,
//!   value = JSON-encoded [`ProcessedJob`].
//! - `state`: string key/value pairs (`last_commit_sha`,
//!   `facebook_recipient_psid`).

use crate::error::{Result, TrackerError};
use chrono::{SecondsFormat, Utc};
use redb::{Database, TableDefinition};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

const PROCESSED_JOBS: TableDefinition<&str, &[u8]> = TableDefinition::new("processed_jobs");
const STATE: TableDefinition<&str, &str> = TableDefinition::new("state");

/// State key for the last processed commit SHA.
pub const LAST_COMMIT_SHA: &str = "last_commit_sha";
/// State key for the webhook-captured Messenger PSID.
pub const FACEBOOK_RECIPIENT_PSID: &str = "facebook_recipient_psid";

/// Hash an apply link into the processed-jobs key.
pub fn hash_link(link: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(link.as_bytes());
    hex::encode(hasher.finalize())
}

/// A processed job record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedJob {
    /// Company name
    pub company: String,
    /// Role name
    pub role: String,
    /// Prestige score assigned by analysis (0 when analysis failed)
    pub score: u8,
    /// Whether a notification was sent
    pub notified: bool,
    /// RFC 3339 creation timestamp
    pub created_at: String,
}

/// Store for processed jobs and run state
pub struct JobStore {
    db: Database,
}

impl JobStore {
    /// Open or create the store at `path`, creating parent directories
    /// and both tables as needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(|e| TrackerError::Store(e.to_string()))?;
        let wt = db.begin_write().map_err(|e| TrackerError::Store(e.to_string()))?;
        wt.open_table(PROCESSED_JOBS)
            .map_err(|e| TrackerError::Store(e.to_string()))?;
        wt.open_table(STATE)
            .map_err(|e| TrackerError::Store(e.to_string()))?;
        wt.commit().map_err(|e| TrackerError::Store(e.to_string()))?;
        Ok(Self { db })
    }

    /// Return true when the hashed apply link was already processed.
    pub fn exists(&self, link_hash: &str) -> Result<bool> {
        let rt = self
            .db
            .begin_read()
            .map_err(|e| TrackerError::Store(e.to_string()))?;
        let table = rt
            .open_table(PROCESSED_JOBS)
            .map_err(|e| TrackerError::Store(e.to_string()))?;
        let found = table
            .get(link_hash)
            .map_err(|e| TrackerError::Store(e.to_string()))?
            .is_some();
        Ok(found)
    }

    /// Insert a processed job row keyed by its link hash.
    pub fn insert_processed(
        &self,
        link_hash: &str,
        company: &str,
        role: &str,
        score: u8,
        notified: bool,
    ) -> Result<()> {
        let job = ProcessedJob {
            company: company.to_string(),
            role: role.to_string(),
            score,
            notified,
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        };
        let value = serde_json::to_vec(&job)?;

        let wt = self
            .db
            .begin_write()
            .map_err(|e| TrackerError::Store(e.to_string()))?;
        {
            let mut table = wt
                .open_table(PROCESSED_JOBS)
                .map_err(|e| TrackerError::Store(e.to_string()))?;
            table
                .insert(link_hash, value.as_slice())
                .map_err(|e| TrackerError::Store(e.to_string()))?;
        }
        wt.commit().map_err(|e| TrackerError::Store(e.to_string()))?;
        Ok(())
    }

    /// Read a processed job record by link hash.
    pub fn get_processed(&self, link_hash: &str) -> Result<Option<ProcessedJob>> {
        let rt = self
            .db
            .begin_read()
            .map_err(|e| TrackerError::Store(e.to_string()))?;
        let table = rt
            .open_table(PROCESSED_JOBS)
            .map_err(|e| TrackerError::Store(e.to_string()))?;
        let value = table
            .get(link_hash)
            .map_err(|e| TrackerError::Store(e.to_string()))?;
        match value {
            Some(v) => Ok(Some(serde_json::from_slice(v.value())?)),
            None => Ok(None),
        }
    }

    /// Read a state value.
    pub fn get_state(&self, key: &str) -> Result<Option<String>> {
        let rt = self
            .db
            .begin_read()
            .map_err(|e| TrackerError::Store(e.to_string()))?;
        let table = rt
            .open_table(STATE)
            .map_err(|e| TrackerError::Store(e.to_string()))?;
        let value = table
            .get(key)
            .map_err(|e| TrackerError::Store(e.to_string()))?;
        Ok(value.map(|v| v.value().to_string()))
    }

    /// Upsert a state value.
    pub fn set_state(&self, key: &str, value: &str) -> Result<()> {
        let wt = self
            .db
            .begin_write()
            .map_err(|e| TrackerError::Store(e.to_string()))?;
        {
            let mut table = wt
                .open_table(STATE)
                .map_err(|e| TrackerError::Store(e.to_string()))?;
            table
                .insert(key, value)
                .map_err(|e| TrackerError::Store(e.to_string()))?;
        }
        wt.commit().map_err(|e| TrackerError::Store(e.to_string()))?;
        Ok(())
    }

    /// Return the saved last processed commit SHA, if any.
    pub fn last_commit_sha(&self) -> Result<Option<String>> {
        self.get_state(LAST_COMMIT_SHA)
    }

    /// Persist the last processed commit SHA.
    pub fn set_last_commit_sha(&self, sha: &str) -> Result<()> {
        self.set_state(LAST_COMMIT_SHA, sha)
    }

    /// Persist a webhook-captured Messenger PSID.
    pub fn upsert_facebook_psid(&self, psid: &str) -> Result<()> {
        self.set_state(FACEBOOK_RECIPIENT_PSID, psid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_tmp() -> (TempDir, JobStore) {
        let dir = TempDir::new().unwrap();
        let store = JobStore::open(&dir.path().join("jobs.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("data/nested/jobs.db");
        JobStore::open(&nested).unwrap();
        assert!(nested.exists());
    }

    #[test]
    fn test_processed_roundtrip() {
        let (_dir, store) = open_tmp();
        let hash = hash_link("https://jobs.example.com/123");

        assert!(!store.exists(&hash).unwrap());
        store
            .insert_processed(&hash, "Stripe", "SWE Intern", 95, true)
            .unwrap();
        assert!(store.exists(&hash).unwrap());

        let job = store.get_processed(&hash).unwrap().unwrap();
        assert_eq!(job.company, "Stripe");
        assert_eq!(job.role, "SWE Intern");
        assert_eq!(job.score, 95);
        assert!(job.notified);
    }

    #[test]
    fn test_state_roundtrip() {
        let (_dir, store) = open_tmp();
        assert!(store.last_commit_sha().unwrap().is_none());

        store.set_last_commit_sha("abc123").unwrap();
        assert_eq!(store.last_commit_sha().unwrap().as_deref(), Some("abc123"));

        store.set_last_commit_sha("def456").unwrap();
        assert_eq!(store.last_commit_sha().unwrap().as_deref(), Some("def456"));
    }

    #[test]
    fn test_psid_upsert() {
        let (_dir, store) = open_tmp();
        store.upsert_facebook_psid("1234567890").unwrap();
        assert_eq!(
            store.get_state(FACEBOOK_RECIPIENT_PSID).unwrap().as_deref(),
            Some("1234567890")
        );
    }

    #[test]
    fn test_hash_link_is_stable_hex() {
        let hash = hash_link("https://jobs.example.com/123");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_link("https://jobs.example.com/123"));
        assert_ne!(hash, hash_link("https://jobs.example.com/124"));
    }
}
