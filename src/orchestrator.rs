use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::decision::{match_option, DecisionEngine};
use crate::errors::EngineError;
use crate::humanize::{ActionKind, Humanizer};
use crate::models::{FillOutcome, Job, JobState, Question};
use crate::page::{ElementHandle, PageHandle};
use crate::profile::Profile;
use crate::prompt::Prompter;
use crate::resolver::{ElementResolver, TargetKind};
use crate::strategy::ApplyStrategy;
use crate::validator::{expected_values, FormValidator};

const MAX_NAV_ATTEMPTS: usize = 3;
const FILL_RETRIES: u32 = 3;

/// Fixed keyword rules for questions with legal or compliance weight. These
/// run before any AI involvement; a probabilistic model must never decide
/// work-authorization, prior-employment or consent answers. Custom profile
/// overrides outrank everything.
pub fn compliance_answer(question: &str, profile: &Profile) -> Option<String> {
    if let Some(answer) = profile.custom_answer(question) {
        debug!(question = %question, "custom answer override matched");
        return Some(answer.to_string());
    }

    let q = question.to_lowercase();

    if q.contains("sponsorship") || q.contains("visa") {
        // Same literal-"not" polarity flip as the heuristic selector
        // (decision.rs); known-fragile on double negatives.
        let answer = if q.contains("not") { "Yes" } else { "No" };
        return Some(answer.to_string());
    }
    if q.contains("authorized") || q.contains("legally") {
        return Some("Yes".to_string());
    }
    if ["worked for", "worked at", "employed by", "employment with"]
        .iter()
        .any(|k| q.contains(k))
    {
        return Some("No".to_string());
    }
    if q.contains("relative") {
        return Some(
            profile
                .relatives_at_company
                .clone()
                .unwrap_or_else(|| "No".to_string()),
        );
    }
    if q.contains("relocat") || q.contains("onsite") {
        return Some("Yes".to_string());
    }
    if ["agree", "privacy", "policy", "terms", "acknowledge", "consent"]
        .iter()
        .any(|k| q.contains(k))
    {
        return Some("Yes".to_string());
    }

    None
}

/// Direct profile lookups for identity fields; no reasoning involved.
fn identity_answer(label: &str, profile: &Profile) -> Option<String> {
    let l = label.to_lowercase();

    if l.contains("first") && l.contains("name") {
        return Some(profile.first_name.clone());
    }
    if l.contains("last") && l.contains("name") {
        return Some(profile.last_name.clone());
    }
    if l.contains("full") && l.contains("name") {
        return Some(profile.full_name());
    }
    if l.contains("email") {
        return Some(profile.email.clone());
    }
    if l.contains("phone") {
        return Some(profile.phone.clone());
    }
    if l.contains("linkedin") {
        return profile.linkedin.clone();
    }
    if l.contains("website") || l.contains("portfolio") {
        return profile.portfolio.clone().or_else(|| profile.linkedin.clone());
    }
    if l.contains("address") {
        return profile.address.clone();
    }
    if l.contains("city") || l.contains("location") {
        return profile.city.clone();
    }
    if l.contains("salary") || l.contains("compensation") {
        return profile.salary_expectation.clone();
    }
    if l.contains("current company") || l.contains("employer") {
        return profile.current_company.clone();
    }

    None
}

fn is_attachment_label(label: &str) -> bool {
    let l = label.to_lowercase();
    l.contains("resume") || l.contains("cv") || l.contains("cover letter")
}

/// Scan page text for submission-confirmation phrasing; the matched snippet
/// becomes ledger evidence.
pub fn confirmation_evidence(body: &str) -> Option<String> {
    let patterns = [
        r"(?i)application (has been |was )?received",
        r"(?i)thank you for applying",
        r"(?i)thanks for applying",
        r"(?i)application (has been |was )?submitted",
        r"(?i)reference number[:\s#]*\w+",
        r"(?i)confirmation number[:\s#]*\w+",
    ];
    for pattern in patterns {
        let Ok(re) = Regex::new(pattern) else {
            continue;
        };
        if let Some(found) = re.find(body) {
            let snippet: String = body[found.start()..].chars().take(200).collect();
            return Some(snippet.trim().to_string());
        }
    }
    None
}

/// Walks discovered form fields in page order, classifies each one, and
/// routes answers through compliance rules, the profile, and the decision
/// engine — in that order. One instance per job.
pub struct FormFillOrchestrator {
    page: Arc<dyn PageHandle>,
    human: Arc<Humanizer>,
    engine: Arc<DecisionEngine>,
    prompter: Arc<dyn Prompter>,
    resolver: ElementResolver,
    submit: bool,
}

impl FormFillOrchestrator {
    pub fn new(
        page: Arc<dyn PageHandle>,
        human: Arc<Humanizer>,
        engine: Arc<DecisionEngine>,
        prompter: Arc<dyn Prompter>,
        submit: bool,
    ) -> Self {
        let resolver = ElementResolver::new(page.clone());
        Self {
            page,
            human,
            engine,
            prompter,
            resolver,
            submit,
        }
    }

    /// Drive one job from Pending to a terminal state. Never marks the
    /// ledger itself; the caller records the outcome.
    pub async fn run(
        &self,
        job: &Job,
        profile: &Profile,
        strategy: &dyn ApplyStrategy,
    ) -> FillOutcome {
        let mut state = JobState::Pending;
        info!(
            company = %job.company,
            title = %job.title,
            strategy = strategy.name(),
            state = state.as_str(),
            "processing job"
        );

        state = JobState::Navigating;
        debug!(state = state.as_str(), "state transition");
        if let Err(e) = self.page.goto(&job.apply_url).await {
            let err = EngineError::NavigationFailed(e.to_string());
            return FillOutcome::failed(err.to_string());
        }

        let mut reached = false;
        for attempt in 1..=MAX_NAV_ATTEMPTS {
            match strategy.navigate_to_form(self.page.as_ref(), job).await {
                Ok(true) => {
                    reached = true;
                    break;
                }
                Ok(false) => {
                    warn!(attempt, "application form not reachable yet");
                }
                Err(EngineError::LoginWall(wall)) => {
                    return FillOutcome::failed(format!("login wall declined: {}", wall));
                }
                Err(e) => {
                    warn!(attempt, error = %e, "navigation attempt failed");
                }
            }
            self.human.pause(ActionKind::Thinking).await;
        }
        if !reached {
            let err = EngineError::NavigationFailed(format!(
                "no form after {} attempts",
                MAX_NAV_ATTEMPTS
            ));
            return FillOutcome::failed(err.to_string());
        }

        // Fold scraped page context into the job so free-text answers can
        // reference the actual posting even when the scraper gave us none.
        let job = {
            let (_, description) = strategy.scrape_context(self.page.as_ref()).await;
            let mut job = job.clone();
            if job.description.is_none() && !description.is_empty() {
                job.description = Some(description);
            }
            job
        };

        state = JobState::Filling;
        debug!(state = state.as_str(), "state transition");
        let (filled, skipped) = match self.fill_fields(&job, profile, strategy).await {
            Ok(counts) => counts,
            Err(e) => return FillOutcome::failed(format!("fill pass failed: {}", e)),
        };
        match self.fix_required_fields(&job, profile).await {
            Ok(0) => {}
            Ok(fixed) => info!(fixed, "auto-fixed empty required fields"),
            Err(e) => warn!(error = %e, "required-field sweep failed"),
        }

        state = JobState::Validating;
        debug!(state = state.as_str(), "state transition");
        let report = match FormValidator::new(self.page.as_ref())
            .verify(&expected_values(profile))
            .await
        {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(error = %e, "validation pass failed");
                None
            }
        };

        // Validating -> terminal state
        let (terminal, evidence) = self.finalize().await;
        FillOutcome {
            state: terminal,
            fields_filled: filled,
            fields_skipped: skipped,
            report,
            evidence,
            error: None,
        }
    }

    async fn fill_fields(
        &self,
        job: &Job,
        profile: &Profile,
        strategy: &dyn ApplyStrategy,
    ) -> Result<(usize, usize), EngineError> {
        let mut containers = Vec::new();
        for selector in strategy.form_container_selectors() {
            containers = self.page.locate(selector).await?;
            if !containers.is_empty() {
                debug!(selector, count = containers.len(), "found field containers");
                break;
            }
        }
        info!(count = containers.len(), "filling form fields");

        let mut filled = 0;
        let mut skipped = 0;
        for container in &containers {
            match self.fill_one(container.as_ref(), job, profile).await {
                Ok(true) => filled += 1,
                Ok(false) => skipped += 1,
                Err(e) => {
                    // Field-level failures never sink the job.
                    warn!(error = %e, "field failed, continuing with the rest");
                    skipped += 1;
                }
            }
        }
        Ok((filled, skipped))
    }

    /// Classify and fill a single field container. Order matters:
    /// attachment, choice widget, checkbox, then free text.
    async fn fill_one(
        &self,
        field: &dyn ElementHandle,
        job: &Job,
        profile: &Profile,
    ) -> Result<bool, EngineError> {
        field.scroll_into_view().await?;
        self.human.pause(ActionKind::Scrolling).await;

        let label = match field.query("label").await?.first() {
            Some(label) => label.text().await?.trim().to_string(),
            None => String::new(),
        };
        if label.is_empty() {
            return Ok(false);
        }

        if is_attachment_label(&label) {
            return self.fill_attachment(field, &label, profile).await;
        }

        if let Some(select) = field.query("select").await?.into_iter().next() {
            return self.fill_native_select(select.as_ref(), &label, job, profile).await;
        }

        if let Some(control) = field
            .query("div[class*='control'], [role='combobox']")
            .await?
            .into_iter()
            .next()
        {
            return self
                .fill_component_dropdown(control.as_ref(), &label, job, profile)
                .await;
        }

        if let Some(checkbox) = field
            .query("input[type='checkbox']")
            .await?
            .into_iter()
            .next()
        {
            return self.fill_checkbox(checkbox.as_ref(), &label, job, profile).await;
        }

        if let Some(input) = field
            .query("input[type='text'], input[type='email'], input[type='tel'], textarea")
            .await?
            .into_iter()
            .next()
        {
            return self.fill_text(input.as_ref(), &label, job, profile).await;
        }

        Ok(false)
    }

    async fn fill_attachment(
        &self,
        field: &dyn ElementHandle,
        label: &str,
        profile: &Profile,
    ) -> Result<bool, EngineError> {
        let Some(file_input) = field.query("input[type='file']").await?.into_iter().next() else {
            return Ok(false);
        };
        if !file_input.input_value().await?.is_empty() {
            return Ok(false);
        }
        let Some(path) = &profile.resume_path else {
            warn!(field = %label, "no resume path configured, skipping upload");
            return Ok(false);
        };
        info!(field = %label, "uploading resume");
        file_input.upload(path).await?;
        self.human.pause(ActionKind::AfterClick).await;
        Ok(true)
    }

    async fn fill_native_select(
        &self,
        select: &dyn ElementHandle,
        label: &str,
        job: &Job,
        profile: &Profile,
    ) -> Result<bool, EngineError> {
        let mut options = Vec::new();
        for option in select.query("option").await? {
            let text = option.text().await?.trim().to_string();
            // Placeholder entries ("Select...", "Please select") are not
            // answers.
            if !text.is_empty() && !text.to_lowercase().starts_with("select") {
                options.push(text);
            }
        }
        if options.is_empty() {
            return Ok(false);
        }

        let question = Question::choice(label, options);
        let answer = self.answer_question(&question, profile, job).await;
        info!(field = %label, answer = %answer, "selecting dropdown option");
        self.human.pause(ActionKind::Thinking).await;
        select.select_label(&answer).await?;
        Ok(true)
    }

    async fn fill_component_dropdown(
        &self,
        control: &dyn ElementHandle,
        label: &str,
        job: &Job,
        profile: &Profile,
    ) -> Result<bool, EngineError> {
        self.human.move_and_click(self.page.as_ref(), control).await?;
        self.human.pause(ActionKind::Thinking).await;

        // Component dropdowns portal their option list to the page root.
        let option_elements = self
            .page
            .locate("[role='option'], div[class*='option']")
            .await?;
        let mut options = Vec::new();
        let mut elements = Vec::new();
        for element in option_elements {
            let text = element.text().await?.trim().to_string();
            if !text.is_empty() {
                options.push(text);
                elements.push(element);
            }
        }
        if options.is_empty() {
            warn!(field = %label, "dropdown opened but produced no options");
            self.human.move_and_click(self.page.as_ref(), control).await?;
            return Ok(false);
        }

        let question = Question::choice(label, options.clone());
        let answer = self.answer_question(&question, profile, job).await;
        info!(field = %label, answer = %answer, "picking dropdown option");
        match options.iter().position(|o| *o == answer) {
            Some(index) => {
                self.human
                    .move_and_click(self.page.as_ref(), elements[index].as_ref())
                    .await?;
                Ok(true)
            }
            None => {
                warn!(field = %label, answer = %answer, "answer not present among options");
                self.human.move_and_click(self.page.as_ref(), control).await?;
                Ok(false)
            }
        }
    }

    async fn fill_checkbox(
        &self,
        checkbox: &dyn ElementHandle,
        label: &str,
        job: &Job,
        profile: &Profile,
    ) -> Result<bool, EngineError> {
        // A checkbox is a two-option question in disguise.
        let question = Question::choice(label, vec!["Yes".to_string(), "No".to_string()]);
        let answer = self.answer_question(&question, profile, job).await;

        if answer.eq_ignore_ascii_case("yes") && !checkbox.is_checked().await? {
            info!(field = %label, "checking box");
            self.human.move_and_click(self.page.as_ref(), checkbox).await?;
            return Ok(true);
        }
        Ok(false)
    }

    async fn fill_text(
        &self,
        input: &dyn ElementHandle,
        label: &str,
        job: &Job,
        profile: &Profile,
    ) -> Result<bool, EngineError> {
        if !input.input_value().await?.is_empty() {
            return Ok(false);
        }

        let question = Question::free_text(label);
        let answer = self.answer_question(&question, profile, job).await;
        if answer.is_empty() {
            debug!(field = %label, "no answer available, leaving blank");
            return Ok(false);
        }

        info!(field = %label, "typing answer");
        self.human.type_like_human(input, &answer).await?;

        // Component frameworks sometimes swallow synthetic keystrokes;
        // recover through the resolver's validated fill.
        if input.input_value().await? != answer {
            warn!(field = %label, "read-back mismatch after typing, retrying fill");
            if !self.resolver.fill_with_retry(label, &answer, FILL_RETRIES).await {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Answer resolution: compliance rules, then identity lookups, then the
    /// decision engine. The engine is only reached by questions with no
    /// fixed rule.
    async fn answer_question(
        &self,
        question: &Question,
        profile: &Profile,
        job: &Job,
    ) -> String {
        match &question.options {
            Some(options) => self.answer_choice(&question.label, options, profile).await,
            None => self.answer_text(&question.label, profile, job).await,
        }
    }

    async fn answer_choice(
        &self,
        question: &str,
        options: &[String],
        profile: &Profile,
    ) -> String {
        if let Some(fixed) = compliance_answer(question, profile) {
            if let Some(option) = match_option(&fixed, options) {
                debug!(question = %question, "compliance rule answered");
                return option.to_string();
            }
        }
        if let Some(identity) = identity_answer(question, profile) {
            if let Some(option) = match_option(&identity, options) {
                return option.to_string();
            }
        }
        self.engine.select_option(question, options, profile).await
    }

    async fn answer_text(&self, label: &str, profile: &Profile, job: &Job) -> String {
        if let Some(answer) = compliance_answer(label, profile) {
            return answer;
        }
        if let Some(answer) = identity_answer(label, profile) {
            return answer;
        }
        self.engine.generate_answer(label, profile, Some(job)).await
    }

    /// Post-fill sweep over `[required]` inputs that are still empty,
    /// re-answering through the same chain the main pass used.
    async fn fix_required_fields(
        &self,
        job: &Job,
        profile: &Profile,
    ) -> Result<usize, EngineError> {
        let mut fixed = 0;
        for input in self
            .page
            .locate("input[required], textarea[required]")
            .await?
        {
            if !input.is_visible().await? || !input.input_value().await?.is_empty() {
                continue;
            }

            let mut label = "Unknown Field".to_string();
            if let Some(id) = input.attr("id").await? {
                let labels = self.page.locate(&format!("label[for='{}']", id)).await?;
                if let Some(found) = labels.first() {
                    let text = found.text().await?.trim().to_string();
                    if !text.is_empty() {
                        label = text;
                    }
                }
            }
            warn!(field = %label, "required field still empty, attempting fix");

            let answer = self.answer_text(&label, profile, job).await;
            if answer.is_empty() {
                continue;
            }
            self.human.type_like_human(input.as_ref(), &answer).await?;
            if input.input_value().await? == answer {
                fixed += 1;
            }
        }
        Ok(fixed)
    }

    /// Submission gate. Auto-submit is opt-in; the default posture is to
    /// stop at ReadyForReview and let a human push the button. The ledger
    /// only ever sees Submitted after an explicit success signal.
    async fn finalize(&self) -> (JobState, Option<String>) {
        if self.submit {
            match self.click_submit().await {
                Ok(true) => {
                    if self
                        .page
                        .wait_for_load(Duration::from_secs(15))
                        .await
                        .is_err()
                    {
                        warn!("post-submit load wait timed out");
                    }
                    self.human.pause(ActionKind::Reading).await;

                    let body = self.page.body_text().await.unwrap_or_default();
                    if let Some(evidence) = confirmation_evidence(&body) {
                        return (JobState::Submitted, Some(evidence));
                    }
                    if self
                        .prompter
                        .confirm("No confirmation text found. Did the application go through?")
                        .await
                    {
                        return (JobState::Submitted, None);
                    }
                    (JobState::ReadyForReview, None)
                }
                _ => {
                    warn!("no submit button found, leaving for review");
                    (JobState::ReadyForReview, None)
                }
            }
        } else {
            info!("stopping before submission; review the form in the browser");
            if self
                .prompter
                .confirm("Form filled and paused for review. Did you submit it manually?")
                .await
            {
                let body = self.page.body_text().await.unwrap_or_default();
                let evidence = confirmation_evidence(&body);
                return (JobState::Submitted, evidence);
            }
            (JobState::ReadyForReview, None)
        }
    }

    async fn click_submit(&self) -> Result<bool, EngineError> {
        for selector in ["#submit_app", "button[type='submit']", "input[type='submit']"] {
            let buttons = self.page.locate(selector).await?;
            for button in buttons {
                if button.is_visible().await? {
                    info!(selector, "clicking submit");
                    self.human
                        .move_and_click(self.page.as_ref(), button.as_ref())
                        .await?;
                    return Ok(true);
                }
            }
        }
        match self.resolver.find("Submit application", TargetKind::Button).await {
            Ok(button) => {
                info!("clicking submit (by text)");
                self.human
                    .move_and_click(self.page.as_ref(), button.as_ref())
                    .await?;
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{AiBackend, CompletionRequest, RateLimiter};
    use crate::errors::AiError;
    use crate::page::mock::{MockElement, MockPage};
    use crate::prompt::AutoPrompter;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TEXT_INPUT_SELECTOR: &str =
        "input[type='text'], input[type='email'], input[type='tel'], textarea";

    struct CountingBackend {
        calls: AtomicUsize,
    }

    impl CountingBackend {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl AiBackend for CountingBackend {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, AiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(AiError::Unavailable("stub".to_string()))
        }
    }

    struct StubStrategy {
        reachable: bool,
    }

    #[async_trait]
    impl ApplyStrategy for StubStrategy {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn navigate_to_form(
            &self,
            _page: &dyn PageHandle,
            _job: &Job,
        ) -> Result<bool, EngineError> {
            Ok(self.reachable)
        }

        async fn scrape_context(&self, _page: &dyn PageHandle) -> (String, String) {
            (String::new(), String::new())
        }

        fn form_container_selectors(&self) -> &'static [&'static str] {
            &["div.field"]
        }
    }

    fn job() -> Job {
        Job {
            url: "https://acme.com/jobs/1".to_string(),
            apply_url: "https://acme.com/apply/1".to_string(),
            title: "Engineer".to_string(),
            company: "Acme".to_string(),
            description: Some("Build things.".to_string()),
            source: None,
        }
    }

    fn profile() -> Profile {
        serde_json::from_str(
            r#"{
                "first_name": "Ada",
                "last_name": "Lovelace",
                "email": "ada@example.com",
                "phone": "+1 555-0100",
                "linkedin": "linkedin.com/in/ada",
                "resume_path": "/tmp/resume.pdf"
            }"#,
        )
        .unwrap()
    }

    fn orchestrator(
        page: Arc<MockPage>,
        backend: Option<Arc<dyn AiBackend>>,
        submit: bool,
    ) -> FormFillOrchestrator {
        let engine = Arc::new(DecisionEngine::new(
            backend,
            Arc::new(RateLimiter::default_window()),
        ));
        FormFillOrchestrator::new(
            page,
            Arc::new(Humanizer::instant()),
            engine,
            Arc::new(AutoPrompter::no()),
            submit,
        )
    }

    fn select_field(label: &str, options: &[&str]) -> (MockElement, MockElement) {
        let mut select = MockElement::new("select", &["select"]);
        for option in options {
            select = select.with_child(MockElement::new("option", &["option"]).with_text(option));
        }
        let container = MockElement::new("div", &["div.field"])
            .with_child(MockElement::new("label", &["label"]).with_text(label))
            .with_child(select.clone());
        (container, select)
    }

    #[test]
    fn test_compliance_sponsorship_polarity() {
        let p = profile();
        assert_eq!(
            compliance_answer("Will you now or in the future require sponsorship?", &p),
            Some("No".to_string())
        );
        assert_eq!(
            compliance_answer("Do you NOT require visa sponsorship?", &p),
            Some("Yes".to_string())
        );
        assert_eq!(
            compliance_answer("Are you legally authorized to work in the US?", &p),
            Some("Yes".to_string())
        );
        assert_eq!(
            compliance_answer("Have you ever worked for Acme before?", &p),
            Some("No".to_string())
        );
        assert_eq!(compliance_answer("Favorite color?", &p), None);
    }

    #[test]
    fn test_custom_override_beats_compliance_rules() {
        let mut p = profile();
        p.custom_answers
            .insert("sponsorship".to_string(), "Yes".to_string());
        assert_eq!(
            compliance_answer("Will you require sponsorship?", &p),
            Some("Yes".to_string())
        );
    }

    #[test]
    fn test_confirmation_evidence_patterns() {
        assert!(confirmation_evidence("Thank you for applying to Acme!").is_some());
        assert!(confirmation_evidence("Your application has been received.").is_some());
        assert!(confirmation_evidence("Reference number: AB1234").is_some());
        assert!(confirmation_evidence("Please complete all required fields").is_none());

        let evidence = confirmation_evidence("... Thank you for applying to Acme!").unwrap();
        assert!(evidence.starts_with("Thank you for applying"));
    }

    #[tokio::test]
    async fn test_sponsorship_select_answered_without_ai() {
        let (container, select) = select_field(
            "Will you now or in the future require sponsorship?",
            &["Yes", "No"],
        );
        let page = Arc::new(MockPage::with_elements(vec![container]));
        let backend = CountingBackend::new();
        let orch = orchestrator(page, Some(backend.clone() as Arc<dyn AiBackend>), false);

        let outcome = orch.run(&job(), &profile(), &StubStrategy { reachable: true }).await;

        assert_eq!(outcome.state, JobState::ReadyForReview);
        assert_eq!(select.selected_label().as_deref(), Some("No"));
        // Compliance rules run before any AI involvement.
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_identity_text_fields_filled_from_profile() {
        let input = MockElement::new("input", &[TEXT_INPUT_SELECTOR]);
        let container = MockElement::new("div", &["div.field"])
            .with_child(MockElement::new("label", &["label"]).with_text("First Name"))
            .with_child(input.clone());
        let page = Arc::new(MockPage::with_elements(vec![container]));
        let orch = orchestrator(page, None, false);

        let outcome = orch.run(&job(), &profile(), &StubStrategy { reachable: true }).await;

        assert_eq!(outcome.fields_filled, 1);
        assert_eq!(input.current_value(), "Ada");
    }

    #[tokio::test]
    async fn test_prefilled_text_field_left_alone() {
        use crate::page::ElementHandle;
        let input = MockElement::new("input", &[TEXT_INPUT_SELECTOR]);
        input.fill("already here").await.unwrap();
        let container = MockElement::new("div", &["div.field"])
            .with_child(MockElement::new("label", &["label"]).with_text("First Name"))
            .with_child(input.clone());
        let page = Arc::new(MockPage::with_elements(vec![container]));
        let orch = orchestrator(page, None, false);

        orch.run(&job(), &profile(), &StubStrategy { reachable: true }).await;

        assert_eq!(input.current_value(), "already here");
    }

    #[tokio::test]
    async fn test_consent_checkbox_gets_checked() {
        let checkbox = MockElement::new("input", &["input[type='checkbox']"])
            .with_attr("type", "checkbox");
        let container = MockElement::new("div", &["div.field"])
            .with_child(
                MockElement::new("label", &["label"]).with_text("I agree to the privacy policy"),
            )
            .with_child(checkbox.clone());
        let page = Arc::new(MockPage::with_elements(vec![container]));
        let orch = orchestrator(page, None, false);

        orch.run(&job(), &profile(), &StubStrategy { reachable: true }).await;

        assert!(checkbox.currently_checked());
    }

    #[tokio::test]
    async fn test_resume_upload() {
        let file_input = MockElement::new("input", &["input[type='file']"]);
        let container = MockElement::new("div", &["div.field"])
            .with_child(MockElement::new("label", &["label"]).with_text("Resume/CV"))
            .with_child(file_input.clone());
        let page = Arc::new(MockPage::with_elements(vec![container]));
        let orch = orchestrator(page, None, false);

        let outcome = orch.run(&job(), &profile(), &StubStrategy { reachable: true }).await;

        assert_eq!(outcome.fields_filled, 1);
        assert_eq!(file_input.uploaded(), vec!["/tmp/resume.pdf".to_string()]);
    }

    #[tokio::test]
    async fn test_component_dropdown_picks_compliance_option() {
        let control =
            MockElement::new("div", &["div[class*='control'], [role='combobox']"]);
        let container = MockElement::new("div", &["div.field"])
            .with_child(
                MockElement::new("label", &["label"]).with_text("Do you require sponsorship?"),
            )
            .with_child(control.clone());
        let yes = MockElement::new("div", &["[role='option'], div[class*='option']"])
            .with_text("Yes");
        let no = MockElement::new("div", &["[role='option'], div[class*='option']"])
            .with_text("No, I do not require sponsorship");
        let page = Arc::new(MockPage::with_elements(vec![container, yes.clone(), no.clone()]));
        let orch = orchestrator(page, None, false);

        orch.run(&job(), &profile(), &StubStrategy { reachable: true }).await;

        assert_eq!(no.click_count(), 1);
        assert_eq!(yes.click_count(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_form_marks_job_failed() {
        let page = Arc::new(MockPage::new());
        let orch = orchestrator(page, None, false);

        let outcome = orch.run(&job(), &profile(), &StubStrategy { reachable: false }).await;

        assert_eq!(outcome.state, JobState::Failed);
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn test_submit_flag_clicks_submit_and_captures_evidence() {
        let submit_button = MockElement::new("button", &["button[type='submit']"]);
        let page = Arc::new(
            MockPage::with_elements(vec![submit_button.clone()])
                .with_body("Thank you for applying to Acme!"),
        );
        let orch = orchestrator(page, None, true);

        let outcome = orch.run(&job(), &profile(), &StubStrategy { reachable: true }).await;

        assert_eq!(outcome.state, JobState::Submitted);
        assert_eq!(submit_button.click_count(), 1);
        assert!(outcome.evidence.unwrap().starts_with("Thank you for applying"));
    }

    #[tokio::test]
    async fn test_default_posture_stops_at_ready_for_review() {
        let page = Arc::new(MockPage::new());
        let orch = orchestrator(page, None, false);

        let outcome = orch.run(&job(), &profile(), &StubStrategy { reachable: true }).await;

        assert_eq!(outcome.state, JobState::ReadyForReview);
        assert!(outcome.evidence.is_none());
    }

    #[tokio::test]
    async fn test_required_field_autofix_fills_email() {
        let input = MockElement::new("input", &["input[required], textarea[required]"])
            .with_attr("id", "email")
            .with_attr("required", "");
        let label = MockElement::new("label", &["label[for='email']"]).with_text("Email");
        let page = Arc::new(MockPage::with_elements(vec![input.clone(), label]));
        let orch = orchestrator(page, None, false);

        orch.run(&job(), &profile(), &StubStrategy { reachable: true }).await;

        assert_eq!(input.current_value(), "ada@example.com");
    }
}
