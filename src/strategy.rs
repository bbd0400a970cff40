use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::errors::EngineError;
use crate::humanize::{ActionKind, Humanizer};
use crate::models::Job;
use crate::page::{ElementHandle, PageHandle};
use crate::prompt::Prompter;

const DESCRIPTION_LIMIT: usize = 3000;
const FUZZY_APPLY_THRESHOLD: f64 = 0.85;

/// Per-ATS navigation logic. A strategy gets the page from the job URL to a
/// fillable form: clicking Apply triggers, descending into iframes, and
/// suspending on login walls. It never types credentials.
#[async_trait]
pub trait ApplyStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// True once the application form is reachable and visible. Errors with
    /// `LoginWall` when an auth wall was hit and the human declined to help.
    async fn navigate_to_form(
        &self,
        page: &dyn PageHandle,
        job: &Job,
    ) -> Result<bool, EngineError>;

    /// Best-effort (role, description) scrape used to enrich AI context.
    async fn scrape_context(&self, page: &dyn PageHandle) -> (String, String);

    /// Field-container selectors in preference order for the fill pass.
    fn form_container_selectors(&self) -> &'static [&'static str];
}

// --- shared navigation helpers ---

async fn settle(page: &dyn PageHandle, human: &Humanizer) {
    // Load-state timeouts are routine on tracker-heavy career pages; the
    // reading pause still runs so pacing stays human.
    if page.wait_for_load(Duration::from_secs(10)).await.is_err() {
        warn!("page never reached readyState complete, continuing anyway");
    }
    human.pause(ActionKind::Reading).await;
}

async fn first_visible(
    page: &dyn PageHandle,
    selector: &str,
) -> Result<Option<Box<dyn ElementHandle>>, EngineError> {
    for element in page.locate(selector).await? {
        if element.is_visible().await? {
            return Ok(Some(element));
        }
    }
    Ok(None)
}

async fn visible_count(page: &dyn PageHandle, selector: &str) -> Result<usize, EngineError> {
    let mut count = 0;
    for element in page.locate(selector).await? {
        if element.is_visible().await? {
            count += 1;
        }
    }
    Ok(count)
}

/// First visible button/link whose text fuzzily matches `wanted`.
async fn button_with_text(
    page: &dyn PageHandle,
    wanted: &str,
) -> Result<Option<Box<dyn ElementHandle>>, EngineError> {
    let wanted = wanted.to_lowercase();
    for element in page.locate("button, a").await? {
        if !element.is_visible().await? {
            continue;
        }
        let text = element.text().await?.trim().to_lowercase();
        if text.is_empty() {
            continue;
        }
        if text.contains(&wanted) || strsim::jaro_winkler(&text, &wanted) >= FUZZY_APPLY_THRESHOLD
        {
            return Ok(Some(element));
        }
    }
    Ok(None)
}

/// First non-empty text among `selectors`, truncated to `limit` chars.
async fn first_text(page: &dyn PageHandle, selectors: &[&str], limit: usize) -> String {
    for selector in selectors {
        let Ok(elements) = page.locate(selector).await else {
            continue;
        };
        for element in elements {
            if let Ok(text) = element.text().await {
                let text = text.trim();
                if !text.is_empty() {
                    return text.chars().take(limit).collect();
                }
            }
        }
    }
    String::new()
}

// --- Greenhouse ---

pub struct GreenhouseStrategy {
    human: Arc<Humanizer>,
}

impl GreenhouseStrategy {
    pub fn new(human: Arc<Humanizer>) -> Self {
        Self { human }
    }
}

#[async_trait]
impl ApplyStrategy for GreenhouseStrategy {
    fn name(&self) -> &'static str {
        "greenhouse"
    }

    async fn navigate_to_form(
        &self,
        page: &dyn PageHandle,
        _job: &Job,
    ) -> Result<bool, EngineError> {
        settle(page, &self.human).await;

        let trigger = match first_visible(page, "[aria-label='Apply'], #apply_button").await? {
            Some(btn) => Some(btn),
            None => button_with_text(page, "apply for this job").await?,
        };

        if let Some(trigger) = trigger {
            info!("found Greenhouse apply trigger");
            self.human.move_and_click(page, trigger.as_ref()).await?;
            self.human.pause(ActionKind::Reading).await;

            if visible_count(page, "[role='dialog'], #application_form").await? > 0 {
                return Ok(true);
            }
        }

        // Single-page postings render the form inline with no trigger.
        if visible_count(page, "input[name*='name']").await? > 0 {
            info!("Greenhouse form already inline");
            return Ok(true);
        }

        Ok(false)
    }

    async fn scrape_context(&self, page: &dyn PageHandle) -> (String, String) {
        let role = first_text(page, &["h1", ".app-title", "#app_title"], 200).await;
        let description =
            first_text(page, &["#content", "#main", ".content-intro"], DESCRIPTION_LIMIT).await;
        (role, description)
    }

    fn form_container_selectors(&self) -> &'static [&'static str] {
        &["div.field", "div[id^='question']"]
    }
}

// --- Lever ---

pub struct LeverStrategy {
    human: Arc<Humanizer>,
}

impl LeverStrategy {
    pub fn new(human: Arc<Humanizer>) -> Self {
        Self { human }
    }
}

#[async_trait]
impl ApplyStrategy for LeverStrategy {
    fn name(&self) -> &'static str {
        "lever"
    }

    async fn navigate_to_form(
        &self,
        page: &dyn PageHandle,
        _job: &Job,
    ) -> Result<bool, EngineError> {
        settle(page, &self.human).await;

        if visible_count(page, "input[name='resume'], .application-form input").await? > 0 {
            return Ok(true);
        }

        let trigger = match first_visible(page, "a[href*='/apply']").await? {
            Some(btn) => Some(btn),
            None => button_with_text(page, "apply for this job").await?,
        };
        if let Some(trigger) = trigger {
            info!("found Lever apply trigger");
            self.human.move_and_click(page, trigger.as_ref()).await?;
            settle(page, &self.human).await;
        }

        Ok(visible_count(page, "input[name='resume'], .application-form input").await? > 0)
    }

    async fn scrape_context(&self, page: &dyn PageHandle) -> (String, String) {
        let role = first_text(page, &[".posting-headline h2", "h2"], 200).await;
        let description = first_text(
            page,
            &[".posting-content", ".content", "div[data-qa='job-description']"],
            DESCRIPTION_LIMIT,
        )
        .await;
        (role, description)
    }

    fn form_container_selectors(&self) -> &'static [&'static str] {
        &["li.application-question", ".application-field", "div.field"]
    }
}

// --- Workday ---

pub struct WorkdayStrategy {
    human: Arc<Humanizer>,
    prompter: Arc<dyn Prompter>,
}

impl WorkdayStrategy {
    pub fn new(human: Arc<Humanizer>, prompter: Arc<dyn Prompter>) -> Self {
        Self { human, prompter }
    }
}

#[async_trait]
impl ApplyStrategy for WorkdayStrategy {
    fn name(&self) -> &'static str {
        "workday"
    }

    async fn navigate_to_form(
        &self,
        page: &dyn PageHandle,
        _job: &Job,
    ) -> Result<bool, EngineError> {
        settle(page, &self.human).await;

        if let Some(trigger) = first_visible(
            page,
            "[data-automation-id='jobApplicationButton'], \
             button[data-automation-id='job-application-apply-button']",
        )
        .await?
        {
            info!("found Workday apply button");
            self.human.move_and_click(page, trigger.as_ref()).await?;
            self.human.pause(ActionKind::Reading).await;

            // The trigger often opens an Autofill-vs-Manual chooser.
            if let Some(manual) = button_with_text(page, "apply manually").await? {
                self.human.move_and_click(page, manual.as_ref()).await?;
                self.human.pause(ActionKind::Reading).await;
            }
        }

        let wall = visible_count(page, "[data-automation-id='loginPageComponent']").await? > 0 || {
            let body = page.body_text().await.unwrap_or_default();
            body.contains("Sign In") && body.contains("Create Account")
        };
        if wall {
            warn!("Workday login wall detected, asking for human help");
            let ready = self
                .prompter
                .wait_ready(
                    "Workday requires an account. Log in or create one in the browser, \
                     then navigate to the resume/experience step.",
                )
                .await;
            if !ready {
                return Err(EngineError::LoginWall("workday".to_string()));
            }
        }

        Ok(true)
    }

    async fn scrape_context(&self, page: &dyn PageHandle) -> (String, String) {
        let role = first_text(page, &["h1", "[data-automation-id='jobPostingHeader']"], 200).await;
        let description = first_text(
            page,
            &["[data-automation-id='jobPostingDescription']", "#main"],
            DESCRIPTION_LIMIT,
        )
        .await;
        (role, description)
    }

    fn form_container_selectors(&self) -> &'static [&'static str] {
        &["div[data-automation-id='formField']", "div.field"]
    }
}

// --- Taleo ---

pub struct TaleoStrategy {
    human: Arc<Humanizer>,
    prompter: Arc<dyn Prompter>,
}

impl TaleoStrategy {
    pub fn new(human: Arc<Humanizer>, prompter: Arc<dyn Prompter>) -> Self {
        Self { human, prompter }
    }

    async fn click_apply_in_frames(&self, page: &dyn PageHandle) -> Result<bool, EngineError> {
        // Taleo buries the apply link in one of a handful of iframes.
        for index in 0..4 {
            if !page.enter_frame(index).await? {
                break;
            }
            for link in page.locate("a.masterlink, a[id*='apply']").await? {
                if link.is_visible().await?
                    && link.text().await?.to_lowercase().contains("apply")
                {
                    info!("found Taleo apply link in iframe {}", index);
                    self.human.move_and_click(page, link.as_ref()).await?;
                    self.human.pause(ActionKind::Reading).await;
                    return Ok(true);
                }
            }
            page.leave_frame().await?;
        }
        Ok(false)
    }
}

#[async_trait]
impl ApplyStrategy for TaleoStrategy {
    fn name(&self) -> &'static str {
        "taleo"
    }

    async fn navigate_to_form(
        &self,
        page: &dyn PageHandle,
        _job: &Job,
    ) -> Result<bool, EngineError> {
        // Taleo renders slowly; give it a double settle before hunting.
        settle(page, &self.human).await;
        self.human.pause(ActionKind::Thinking).await;

        if !self.click_apply_in_frames(page).await? {
            for selector in ["#hqj-apply-button", "a[id*='apply']", ".taleo-apply-button"] {
                if let Some(btn) = first_visible(page, selector).await? {
                    info!(selector, "found Taleo apply button");
                    self.human.move_and_click(page, btn.as_ref()).await?;
                    self.human.pause(ActionKind::Reading).await;
                    break;
                }
            }
            if let Some(btn) = button_with_text(page, "apply now").await? {
                self.human.move_and_click(page, btn.as_ref()).await?;
                self.human.pause(ActionKind::Reading).await;
            }
        }

        // The wizard usually opens on a login/registration screen.
        if visible_count(page, "input[id*='user'], input[id*='User']").await? > 0 {
            warn!("Taleo login wall detected, asking for human help");
            let ready = self
                .prompter
                .wait_ready(
                    "Taleo requires login or registration. Complete it in the browser \
                     and continue to the resume upload or candidate profile screen.",
                )
                .await;
            if !ready {
                return Err(EngineError::LoginWall("taleo".to_string()));
            }
        }

        Ok(true)
    }

    async fn scrape_context(&self, page: &dyn PageHandle) -> (String, String) {
        let role = first_text(page, &["h1", "h2"], 200).await;
        let description = first_text(page, &["#requisitionDescriptionInterface", "body"], DESCRIPTION_LIMIT).await;
        (role, description)
    }

    fn form_container_selectors(&self) -> &'static [&'static str] {
        &["div.editblock", "div.field", "fieldset"]
    }
}

// --- Generic fallback ---

pub struct GenericStrategy {
    human: Arc<Humanizer>,
}

impl GenericStrategy {
    pub fn new(human: Arc<Humanizer>) -> Self {
        Self { human }
    }
}

const GENERIC_APPLY_VOCABULARY: &[&str] = &["Apply", "Start Application", "Match", "Submit"];

#[async_trait]
impl ApplyStrategy for GenericStrategy {
    fn name(&self) -> &'static str {
        "generic"
    }

    async fn navigate_to_form(
        &self,
        page: &dyn PageHandle,
        _job: &Job,
    ) -> Result<bool, EngineError> {
        settle(page, &self.human).await;

        // Deep links often land straight on the form.
        if visible_count(page, "input[type='text'], input[type='email']").await? > 2 {
            info!("form inputs detected directly");
            return Ok(true);
        }

        for word in GENERIC_APPLY_VOCABULARY {
            if let Some(btn) = button_with_text(page, word).await? {
                info!(word, "found generic apply button");
                self.human.move_and_click(page, btn.as_ref()).await?;
                self.human.pause(ActionKind::Reading).await;
                return Ok(true);
            }
        }

        // Inputs may have rendered while we were looking for buttons.
        Ok(visible_count(page, "input[type='text'], input[type='email']").await? > 1)
    }

    async fn scrape_context(&self, page: &dyn PageHandle) -> (String, String) {
        let role = first_text(page, &["h1", "h2"], 200).await;
        let description = page
            .body_text()
            .await
            .unwrap_or_default()
            .chars()
            .take(DESCRIPTION_LIMIT)
            .collect();
        (role, description)
    }

    fn form_container_selectors(&self) -> &'static [&'static str] {
        &["div.field", ".form-group", "fieldset"]
    }
}

// --- URL-pattern registry ---

/// Maps apply URLs onto strategies through a registration table. Total:
/// unknown hosts get the Generic strategy. New platforms register a pattern
/// instead of editing resolution logic.
pub struct StrategyResolver {
    table: Vec<(String, Arc<dyn ApplyStrategy>)>,
    fallback: Arc<dyn ApplyStrategy>,
}

impl StrategyResolver {
    pub fn with_defaults(human: Arc<Humanizer>, prompter: Arc<dyn Prompter>) -> Self {
        let generic: Arc<dyn ApplyStrategy> = Arc::new(GenericStrategy::new(human.clone()));
        let mut resolver = Self {
            table: Vec::new(),
            fallback: generic.clone(),
        };
        resolver.register("greenhouse", Arc::new(GreenhouseStrategy::new(human.clone())));
        resolver.register("lever", Arc::new(LeverStrategy::new(human.clone())));
        resolver.register(
            "taleo",
            Arc::new(TaleoStrategy::new(human.clone(), prompter.clone())),
        );
        resolver.register(
            "workday",
            Arc::new(WorkdayStrategy::new(human.clone(), prompter)),
        );
        // Ashby and iCIMS forms behave like plain pages; the generic
        // heuristics handle them better than a half-built specialization.
        resolver.register("ashbyhq", generic.clone());
        resolver.register("icims", generic);
        resolver
    }

    pub fn register(&mut self, pattern: &str, strategy: Arc<dyn ApplyStrategy>) {
        self.table.push((pattern.to_lowercase(), strategy));
    }

    pub fn resolve(&self, url: &str) -> Arc<dyn ApplyStrategy> {
        let url = url.to_lowercase();
        for (pattern, strategy) in &self.table {
            if url.contains(pattern) {
                return strategy.clone();
            }
        }
        self.fallback.clone()
    }
}
