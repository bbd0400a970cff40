use std::collections::HashMap;
use tracing::info;

use crate::errors::EngineError;
use crate::models::{FieldMismatch, ValidationReport};
use crate::page::PageHandle;
use crate::profile::Profile;

const LABEL_SIMILARITY_THRESHOLD: f64 = 0.88;

/// Post-fill verification: re-reads every visible input and select against
/// an expected-value table derived from the profile. Measures fill quality
/// after the fact; never blocks submission.
pub struct FormValidator<'a> {
    page: &'a dyn PageHandle,
}

impl<'a> FormValidator<'a> {
    pub fn new(page: &'a dyn PageHandle) -> Self {
        Self { page }
    }

    pub async fn verify(
        &self,
        expected: &HashMap<String, String>,
    ) -> Result<ValidationReport, EngineError> {
        let mut total = 0;
        let mut mismatches = Vec::new();

        let selectors = [
            "input[type='text'], input[type='email'], input[type='tel']",
            "select",
        ];
        for selector in selectors {
            for element in self.page.locate(selector).await? {
                if !element.is_visible().await? {
                    continue;
                }
                total += 1;

                let label = self.label_for(element.attr("id").await?).await?;
                let Some(expected_value) = find_expected(&label, expected) else {
                    continue;
                };
                let actual = element.input_value().await?;
                if actual != expected_value {
                    mismatches.push(FieldMismatch {
                        field: label,
                        expected: expected_value,
                        actual,
                    });
                }
            }
        }

        let report = ValidationReport::new(total, mismatches);
        info!(
            total = report.total_fields,
            errors = report.error_count,
            accuracy = format!("{:.1}%", report.accuracy * 100.0),
            "form validation finished"
        );
        Ok(report)
    }

    async fn label_for(&self, id: Option<String>) -> Result<String, EngineError> {
        if let Some(id) = id {
            let labels = self.page.locate(&format!("label[for='{}']", id)).await?;
            if let Some(label) = labels.first() {
                let text = label.text().await?.trim().to_string();
                if !text.is_empty() {
                    return Ok(text);
                }
            }
        }
        Ok("Unknown Field".to_string())
    }
}

/// Expected value for a field label: exact key, containment either way,
/// then near-identical key spelling.
fn find_expected(label: &str, expected: &HashMap<String, String>) -> Option<String> {
    if let Some(value) = expected.get(label) {
        return Some(value.clone());
    }
    let label_lower = label.to_lowercase();
    for (key, value) in expected {
        let key_lower = key.to_lowercase();
        if label_lower.contains(&key_lower) || key_lower.contains(&label_lower) {
            return Some(value.clone());
        }
        if strsim::jaro_winkler(&label_lower, &key_lower) >= LABEL_SIMILARITY_THRESHOLD {
            return Some(value.clone());
        }
    }
    None
}

/// Expected-value table a filled form should agree with.
pub fn expected_values(profile: &Profile) -> HashMap<String, String> {
    let mut expected = HashMap::new();
    expected.insert("First Name".to_string(), profile.first_name.clone());
    expected.insert("Last Name".to_string(), profile.last_name.clone());
    expected.insert("Email".to_string(), profile.email.clone());
    expected.insert("Phone".to_string(), profile.phone.clone());
    if let Some(linkedin) = &profile.linkedin {
        expected.insert("LinkedIn Profile".to_string(), linkedin.clone());
    }
    expected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::mock::{MockElement, MockPage};

    fn profile() -> Profile {
        serde_json::from_str(
            r#"{
                "first_name": "Ada",
                "last_name": "Lovelace",
                "email": "ada@example.com",
                "phone": "+1 555-0100",
                "linkedin": "linkedin.com/in/ada"
            }"#,
        )
        .unwrap()
    }

    async fn labeled_input(id: &str, label: &str, value: &str) -> Vec<MockElement> {
        use crate::page::ElementHandle;
        let input = MockElement::new(
            "input",
            &["input[type='text'], input[type='email'], input[type='tel']"],
        )
        .with_attr("id", id);
        if !value.is_empty() {
            input.fill(value).await.unwrap();
        }
        let selector = format!("label[for='{}']", id);
        let label = MockElement::new("label", &[selector.as_str()]).with_text(label);
        vec![input, label]
    }

    #[tokio::test]
    async fn test_verify_reports_mismatches_and_accuracy() {
        let mut elements = labeled_input("first_name", "First Name", "Ada").await;
        elements.extend(labeled_input("email", "Email", "wrong@example.com").await);
        let page = MockPage::with_elements(elements);

        let report = FormValidator::new(&page)
            .verify(&expected_values(&profile()))
            .await
            .unwrap();

        assert_eq!(report.total_fields, 2);
        assert_eq!(report.error_count, 1);
        assert!((report.accuracy - 0.5).abs() < f64::EPSILON);
        assert_eq!(report.mismatches[0].field, "Email");
        assert_eq!(report.mismatches[0].actual, "wrong@example.com");
    }

    #[tokio::test]
    async fn test_verify_ignores_unknown_fields() {
        let elements = labeled_input("favorite_color", "Favorite Color", "mauve").await;
        let page = MockPage::with_elements(elements);

        let report = FormValidator::new(&page)
            .verify(&expected_values(&profile()))
            .await
            .unwrap();

        assert_eq!(report.total_fields, 1);
        assert_eq!(report.error_count, 0);
    }

    #[test]
    fn test_find_expected_fuzzy_containment() {
        let expected = expected_values(&profile());
        assert_eq!(find_expected("Email", &expected).unwrap(), "ada@example.com");
        assert_eq!(
            find_expected("Email Address", &expected).unwrap(),
            "ada@example.com"
        );
        assert_eq!(
            find_expected("LinkedIn Profile URL", &expected).unwrap(),
            "linkedin.com/in/ada"
        );
        assert!(find_expected("Cover Letter", &expected).is_none());
    }
}
