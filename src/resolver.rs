use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::errors::EngineError;
use crate::page::{ElementHandle, PageHandle};

/// What kind of element a semantic name should resolve to. Buttons get the
/// role+text strategy; inputs get attribute and placeholder strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Input,
    Button,
}

const FUZZY_BUTTON_THRESHOLD: f64 = 0.85;

/// Finds form elements for semantic field names by walking a fixed strategy
/// ladder, and fills them with read-back verification and backoff retries.
pub struct ElementResolver {
    page: Arc<dyn PageHandle>,
}

impl ElementResolver {
    pub fn new(page: Arc<dyn PageHandle>) -> Self {
        Self { page }
    }

    /// Resolve `semantic_name` ("email", "first name", "Submit application")
    /// to the first visible match. Strategy order: id-slug guess, accessible
    /// label, name/type attribute, placeholder, then role+text for buttons.
    pub async fn find(
        &self,
        semantic_name: &str,
        kind: TargetKind,
    ) -> Result<Box<dyn ElementHandle>, EngineError> {
        let slug = semantic_name.trim().to_lowercase().replace(' ', "_");
        let dashed = slug.replace('_', "-");

        // 1. id guesses
        for selector in [format!("#{}", slug), format!("#{}", dashed)] {
            if let Some(found) = self.first_visible(&selector).await? {
                debug!(field = %semantic_name, %selector, "resolved by id");
                return Ok(found);
            }
        }

        // 2. accessible label -> for attribute
        if let Some(found) = self.find_by_label(semantic_name).await? {
            debug!(field = %semantic_name, "resolved by label");
            return Ok(found);
        }

        if kind == TargetKind::Input {
            // 3. name / type attributes
            for selector in [
                format!("input[name='{}']", semantic_name),
                format!("input[name*='{}']", slug),
                format!("textarea[name*='{}']", slug),
                format!("input[type='{}']", semantic_name),
            ] {
                if let Some(found) = self.first_visible(&selector).await? {
                    debug!(field = %semantic_name, %selector, "resolved by attribute");
                    return Ok(found);
                }
            }

            // 4. placeholder
            for selector in [
                format!("input[placeholder*='{}']", semantic_name),
                format!("textarea[placeholder*='{}']", semantic_name),
            ] {
                if let Some(found) = self.first_visible(&selector).await? {
                    debug!(field = %semantic_name, %selector, "resolved by placeholder");
                    return Ok(found);
                }
            }
        }

        // 5. role + text
        if kind == TargetKind::Button {
            if let Some(found) = self.find_button_by_text(semantic_name).await? {
                debug!(field = %semantic_name, "resolved by button text");
                return Ok(found);
            }
        }

        Err(EngineError::ElementNotFound(semantic_name.to_string()))
    }

    async fn first_visible(
        &self,
        selector: &str,
    ) -> Result<Option<Box<dyn ElementHandle>>, EngineError> {
        for element in self.page.locate(selector).await? {
            if element.is_visible().await? {
                return Ok(Some(element));
            }
        }
        Ok(None)
    }

    async fn find_by_label(
        &self,
        semantic_name: &str,
    ) -> Result<Option<Box<dyn ElementHandle>>, EngineError> {
        let wanted = semantic_name.to_lowercase();
        for label in self.page.locate("label").await? {
            if !label.is_visible().await? {
                continue;
            }
            let text = label.text().await?.to_lowercase();
            if !text.contains(&wanted) {
                continue;
            }
            let Some(target_id) = label.attr("for").await? else {
                continue;
            };
            if let Some(found) = self.first_visible(&format!("#{}", target_id)).await? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    async fn find_button_by_text(
        &self,
        semantic_name: &str,
    ) -> Result<Option<Box<dyn ElementHandle>>, EngineError> {
        let wanted = semantic_name.to_lowercase();
        for button in self
            .page
            .locate("button, a[role='button'], input[type='submit']")
            .await?
        {
            if !button.is_visible().await? {
                continue;
            }
            let text = button.text().await?.trim().to_lowercase();
            if text.is_empty() {
                continue;
            }
            let similar = strsim::jaro_winkler(&text, &wanted) >= FUZZY_BUTTON_THRESHOLD;
            if text == wanted || text.contains(&wanted) || wanted.contains(&text) || similar {
                return Ok(Some(button));
            }
        }
        Ok(None)
    }

    /// Fill a field and verify the value actually stuck (component-framework
    /// inputs routinely swallow or reformat programmatic writes). Each retry
    /// re-resolves from scratch, which also survives detached elements.
    /// Returns false after `max_retries` failed attempts; never errors.
    pub async fn fill_with_retry(
        &self,
        semantic_name: &str,
        value: &str,
        max_retries: u32,
    ) -> bool {
        for attempt in 0..max_retries {
            let result = self.try_fill_once(semantic_name, value).await;
            match result {
                Ok(()) => return true,
                Err(e) => {
                    warn!(
                        field = %semantic_name,
                        attempt = attempt + 1,
                        error = %e,
                        "fill attempt failed"
                    );
                }
            }
            tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
        }
        warn!(field = %semantic_name, retries = max_retries, "giving up on field");
        false
    }

    async fn try_fill_once(&self, semantic_name: &str, value: &str) -> Result<(), EngineError> {
        let element = self.find(semantic_name, TargetKind::Input).await?;
        element.scroll_into_view().await?;
        element.fill(value).await?;
        let actual = element.input_value().await?;
        if actual != value {
            return Err(EngineError::FillValidation {
                field: semantic_name.to_string(),
                expected: value.to_string(),
                actual,
            });
        }
        Ok(())
    }
}
