use serde::{Deserialize, Serialize};

/// A job posting handed to the engine by an upstream scraper. Read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub url: String,
    pub apply_url: String,
    pub title: String,
    pub company: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

/// A question observed on a live form: a label plus the option set for
/// choice widgets (None for free text).
#[derive(Debug, Clone)]
pub struct Question {
    pub label: String,
    pub options: Option<Vec<String>>,
}

impl Question {
    pub fn free_text(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            options: None,
        }
    }

    pub fn choice(label: impl Into<String>, options: Vec<String>) -> Self {
        Self {
            label: label.into(),
            options: Some(options),
        }
    }
}

/// Per-job state machine. Terminal states are Submitted, ReadyForReview
/// and Failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Navigating,
    Filling,
    Validating,
    Submitted,
    ReadyForReview,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Navigating => "navigating",
            JobState::Filling => "filling",
            JobState::Validating => "validating",
            JobState::Submitted => "submitted",
            JobState::ReadyForReview => "ready_for_review",
            JobState::Failed => "failed",
        }
    }
}

/// Outcome of one orchestrated fill pass over a job.
#[derive(Debug)]
pub struct FillOutcome {
    pub state: JobState,
    pub fields_filled: usize,
    pub fields_skipped: usize,
    pub report: Option<ValidationReport>,
    /// Confirmation snippet captured from the page after submission.
    pub evidence: Option<String>,
    pub error: Option<String>,
}

impl FillOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            state: JobState::Failed,
            fields_filled: 0,
            fields_skipped: 0,
            report: None,
            evidence: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldMismatch {
    pub field: String,
    pub expected: String,
    pub actual: String,
}

/// Post-fill accuracy report. A QA signal, never a submission gate.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub total_fields: usize,
    pub error_count: usize,
    pub accuracy: f64,
    pub mismatches: Vec<FieldMismatch>,
}

impl ValidationReport {
    pub fn new(total_fields: usize, mismatches: Vec<FieldMismatch>) -> Self {
        let error_count = mismatches.len();
        let accuracy = if total_fields > 0 {
            (total_fields - error_count) as f64 / total_fields as f64
        } else {
            1.0
        };
        Self {
            total_fields,
            error_count,
            accuracy,
            mismatches,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_report_accuracy() {
        let report = ValidationReport::new(10, vec![]);
        assert_eq!(report.error_count, 0);
        assert!((report.accuracy - 1.0).abs() < f64::EPSILON);

        let report = ValidationReport::new(
            4,
            vec![FieldMismatch {
                field: "Email".to_string(),
                expected: "a@b.c".to_string(),
                actual: "".to_string(),
            }],
        );
        assert_eq!(report.error_count, 1);
        assert!((report.accuracy - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_validation_report_empty_form() {
        let report = ValidationReport::new(0, vec![]);
        assert!((report.accuracy - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_job_deserializes_without_optionals() {
        let job: Job = serde_json::from_str(
            r#"{"url":"https://x.io/j/1","apply_url":"https://x.io/j/1/apply",
                "title":"Engineer","company":"Acme"}"#,
        )
        .unwrap();
        assert_eq!(job.company, "Acme");
        assert!(job.description.is_none());
    }
}
