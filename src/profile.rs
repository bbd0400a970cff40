use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Candidate facts loaded once per run. The engine never mutates a profile;
/// answers derived from it must stay reproducible across the whole batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub linkedin: Option<String>,
    #[serde(default)]
    pub portfolio: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub current_company: Option<String>,
    #[serde(default)]
    pub salary_expectation: Option<String>,
    #[serde(default)]
    pub resume_path: Option<PathBuf>,
    #[serde(default)]
    pub why_interested: Option<String>,
    #[serde(default)]
    pub relatives_at_company: Option<String>,
    #[serde(default)]
    pub demographics: Demographics,
    /// Keyword -> answer overrides. Checked before every other answer
    /// source; a keyword matches when it appears in the question text.
    #[serde(default)]
    pub custom_answers: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Demographics {
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub race: Option<String>,
    #[serde(default)]
    pub veteran: Option<String>,
    #[serde(default)]
    pub disability: Option<String>,
}

impl Profile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read profile file: {}", path.display()))?;
        let profile: Profile = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse profile file: {}", path.display()))?;
        Ok(profile)
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// First custom-answer override whose keyword appears in the question.
    pub fn custom_answer(&self, question: &str) -> Option<&str> {
        let q_lower = question.to_lowercase();
        self.custom_answers
            .iter()
            .find(|(keyword, _)| q_lower.contains(&keyword.to_lowercase()))
            .map(|(_, answer)| answer.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Profile {
        serde_json::from_str(
            r#"{
                "first_name": "Ada",
                "last_name": "Lovelace",
                "email": "ada@example.com",
                "phone": "+1 555-0100",
                "linkedin": "linkedin.com/in/ada",
                "demographics": {"gender": "Female", "veteran": "No"},
                "custom_answers": {"notice period": "Two weeks"}
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_minimal_profile_parses() {
        let p: Profile = serde_json::from_str(
            r#"{"first_name":"A","last_name":"B","email":"a@b.c","phone":"1"}"#,
        )
        .unwrap();
        assert!(p.demographics.gender.is_none());
        assert!(p.custom_answers.is_empty());
    }

    #[test]
    fn test_full_name() {
        assert_eq!(sample().full_name(), "Ada Lovelace");
    }

    #[test]
    fn test_custom_answer_keyword_match() {
        let p = sample();
        assert_eq!(
            p.custom_answer("What is your notice period at your current job?"),
            Some("Two weeks")
        );
        assert_eq!(p.custom_answer("Desired salary?"), None);
    }
}
