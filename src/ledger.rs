use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

use crate::models::Job;

/// The single source of truth for "has this application already gone out".
/// Content-addressed by (company, title, apply URL); consulted before any
/// navigation starts so a half-filled but already-submitted job is never
/// touched again. Persisted as one JSON document, rewritten atomically.
pub struct SubmissionLedger {
    path: PathBuf,
    entries: Mutex<HashMap<String, SubmissionEntry>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionEntry {
    pub company: String,
    pub job_title: String,
    pub apply_url: String,
    pub status: SubmissionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Submitted,
    Failed,
}

#[derive(Debug, Clone, Copy)]
pub struct LedgerStats {
    pub total: usize,
    pub submitted: usize,
    pub failed: usize,
    pub success_rate: f64,
}

/// Stable id for a job posting across runs and across re-scrapes that
/// change letter case in the company or title.
pub fn job_id(job: &Job) -> String {
    let key = format!(
        "{}{}{}",
        job.company.to_lowercase(),
        job.title.to_lowercase(),
        job.apply_url
    );
    let digest = Sha256::digest(key.as_bytes());
    format!("{:x}", digest)[..16].to_string()
}

impl SubmissionLedger {
    pub fn open(path: PathBuf) -> Result<Self> {
        let entries = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read ledger: {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse ledger: {}", path.display()))?
        } else {
            HashMap::new()
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn open_default() -> Result<Self> {
        Self::open(Self::default_path()?)
    }

    fn default_path() -> Result<PathBuf> {
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "pounce") {
            let dir = proj_dirs.data_dir();
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create data dir: {}", dir.display()))?;
            Ok(dir.join("submissions.json"))
        } else {
            Ok(PathBuf::from("submissions.json"))
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// False iff this job already has a submitted entry. Failed entries are
    /// retryable and do not block.
    pub fn should_apply(&self, job: &Job) -> bool {
        let entries = self.entries.lock().unwrap();
        match entries.get(&job_id(job)) {
            Some(entry) => entry.status != SubmissionStatus::Submitted,
            None => true,
        }
    }

    /// Idempotent: a job that is already submitted stays byte-for-byte
    /// unchanged, original timestamp included.
    pub fn mark_submitted(&self, job: &Job, evidence: Option<&str>) -> Result<()> {
        let id = job_id(job);
        {
            let mut entries = self.entries.lock().unwrap();
            if entries
                .get(&id)
                .is_some_and(|e| e.status == SubmissionStatus::Submitted)
            {
                return Ok(());
            }
            entries.insert(
                id,
                SubmissionEntry {
                    company: job.company.clone(),
                    job_title: job.title.clone(),
                    apply_url: job.apply_url.clone(),
                    status: SubmissionStatus::Submitted,
                    submitted_at: Some(chrono::Utc::now().to_rfc3339()),
                    failed_at: None,
                    error: None,
                    evidence: evidence.map(|s| s.to_string()),
                },
            );
        }
        info!(company = %job.company, title = %job.title, "marked submitted");
        self.save()
    }

    /// Record a failed attempt for later retry. Never downgrades an entry
    /// that already reached submitted.
    pub fn mark_failed(&self, job: &Job, error: &str) -> Result<()> {
        let id = job_id(job);
        {
            let mut entries = self.entries.lock().unwrap();
            if entries
                .get(&id)
                .is_some_and(|e| e.status == SubmissionStatus::Submitted)
            {
                return Ok(());
            }
            entries.insert(
                id,
                SubmissionEntry {
                    company: job.company.clone(),
                    job_title: job.title.clone(),
                    apply_url: job.apply_url.clone(),
                    status: SubmissionStatus::Failed,
                    submitted_at: None,
                    failed_at: Some(chrono::Utc::now().to_rfc3339()),
                    error: Some(error.to_string()),
                    evidence: None,
                },
            );
        }
        self.save()
    }

    pub fn stats(&self) -> LedgerStats {
        let entries = self.entries.lock().unwrap();
        let total = entries.len();
        let submitted = entries
            .values()
            .filter(|e| e.status == SubmissionStatus::Submitted)
            .count();
        let failed = total - submitted;
        LedgerStats {
            total,
            submitted,
            failed,
            success_rate: if total > 0 {
                submitted as f64 / total as f64
            } else {
                0.0
            },
        }
    }

    pub fn submitted_entries(&self) -> Vec<SubmissionEntry> {
        let entries = self.entries.lock().unwrap();
        let mut submitted: Vec<SubmissionEntry> = entries
            .values()
            .filter(|e| e.status == SubmissionStatus::Submitted)
            .cloned()
            .collect();
        submitted.sort_by(|a, b| a.company.cmp(&b.company));
        submitted
    }

    /// Write-to-temp then rename, so a crash mid-write can never leave a
    /// truncated ledger behind.
    fn save(&self) -> Result<()> {
        let serialized = {
            let entries = self.entries.lock().unwrap();
            serde_json::to_string_pretty(&*entries)?
        };
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serialized)
            .with_context(|| format!("Failed to write ledger: {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace ledger: {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(company: &str, title: &str, url: &str) -> Job {
        Job {
            url: url.to_string(),
            apply_url: url.to_string(),
            title: title.to_string(),
            company: company.to_string(),
            description: None,
            source: None,
        }
    }

    fn temp_ledger() -> (tempfile::TempDir, SubmissionLedger) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = SubmissionLedger::open(dir.path().join("submissions.json")).unwrap();
        (dir, ledger)
    }

    #[test]
    fn test_job_id_case_insensitive_on_company_and_title() {
        let a = job("Acme", "Engineer", "https://acme.com/apply/1");
        let b = job("ACME", "engineer", "https://acme.com/apply/1");
        let c = job("Acme", "Engineer", "https://acme.com/apply/2");
        assert_eq!(job_id(&a), job_id(&b));
        assert_ne!(job_id(&a), job_id(&c));
    }

    #[test]
    fn test_mark_submitted_is_idempotent() {
        let (_dir, ledger) = temp_ledger();
        let j = job("Acme", "Engineer", "https://acme.com/apply/1");

        ledger.mark_submitted(&j, Some("thank you for applying")).unwrap();
        let first = ledger.submitted_entries();

        ledger.mark_submitted(&j, None).unwrap();
        let second = ledger.submitted_entries();

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(first[0].submitted_at, second[0].submitted_at);
        assert_eq!(second[0].evidence.as_deref(), Some("thank you for applying"));
        assert!(!ledger.should_apply(&j));
    }

    #[test]
    fn test_submitted_never_downgrades_to_failed() {
        let (_dir, ledger) = temp_ledger();
        let j = job("Acme", "Engineer", "https://acme.com/apply/1");

        ledger.mark_submitted(&j, None).unwrap();
        ledger.mark_failed(&j, "late timeout").unwrap();

        assert!(!ledger.should_apply(&j));
        assert_eq!(ledger.stats().submitted, 1);
        assert_eq!(ledger.stats().failed, 0);
    }

    #[test]
    fn test_failed_jobs_stay_retryable() {
        let (_dir, ledger) = temp_ledger();
        let j = job("Acme", "Engineer", "https://acme.com/apply/1");

        ledger.mark_failed(&j, "navigation failed").unwrap();
        assert!(ledger.should_apply(&j));

        ledger.mark_submitted(&j, None).unwrap();
        assert!(!ledger.should_apply(&j));
    }

    #[test]
    fn test_submitted_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("submissions.json");
        let j = job("Acme", "Engineer", "https://acme.com/apply/1");

        {
            let ledger = SubmissionLedger::open(path.clone()).unwrap();
            ledger.mark_submitted(&j, None).unwrap();
        }

        // A re-run of the same batch must skip Acme entirely.
        let reopened = SubmissionLedger::open(path).unwrap();
        assert!(!reopened.should_apply(&j));
        assert_eq!(reopened.stats().submitted, 1);
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let (dir, ledger) = temp_ledger();
        let j = job("Acme", "Engineer", "https://acme.com/apply/1");
        ledger.mark_submitted(&j, None).unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["submissions.json".to_string()]);
    }

    #[test]
    fn test_stats_counts() {
        let (_dir, ledger) = temp_ledger();
        ledger
            .mark_submitted(&job("Acme", "Engineer", "https://a/1"), None)
            .unwrap();
        ledger
            .mark_failed(&job("Globex", "Analyst", "https://g/1"), "oops")
            .unwrap();

        let stats = ledger.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.submitted, 1);
        assert_eq!(stats.failed, 1);
        assert!((stats.success_rate - 0.5).abs() < f64::EPSILON);
    }
}
