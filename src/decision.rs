use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::ai::{AiBackend, CompletionRequest, RateLimiter};
use crate::models::Job;
use crate::profile::Profile;

/// Map a raw answer onto the option set: exact match, then
/// case-insensitive, then prefix containment in either direction (so "No"
/// picks "No, I do not require sponsorship"). None if nothing fits.
pub fn match_option<'a>(answer: &str, options: &'a [String]) -> Option<&'a str> {
    let answer = answer.trim();
    if answer.is_empty() {
        return None;
    }
    if let Some(opt) = options.iter().find(|o| o.as_str() == answer) {
        return Some(opt);
    }
    let lower = answer.to_lowercase();
    if let Some(opt) = options.iter().find(|o| o.to_lowercase() == lower) {
        return Some(opt);
    }
    options
        .iter()
        .find(|o| {
            let o_lower = o.to_lowercase();
            o_lower.starts_with(&lower) || lower.starts_with(&o_lower)
        })
        .map(|s| s.as_str())
}

/// Rule-based selector for the recurring screening categories. Runs when the
/// AI backend is missing, rate-limited out, or answered outside the option
/// set. Always returns a member of `options`.
pub fn heuristic_select<'a>(question: &str, options: &'a [String], profile: &Profile) -> &'a str {
    let q = question.to_lowercase();

    if q.contains("gender") {
        if let Some(gender) = &profile.demographics.gender {
            let gender = gender.to_lowercase();
            // Start-match first so "Male" never lands on "Female".
            for opt in options {
                let opt_lower = opt.to_lowercase();
                if opt_lower == gender || opt_lower.starts_with(&gender) {
                    return opt;
                }
                if gender == "male" && opt_lower == "man" {
                    return opt;
                }
                if gender == "female" && opt_lower == "woman" {
                    return opt;
                }
            }
        } else if let Some(opt) = decline_option(options) {
            return opt;
        }
    }

    if q.contains("race") || q.contains("ethnicity") {
        if let Some(race) = &profile.demographics.race {
            let race = race.to_lowercase();
            if let Some(opt) = options.iter().find(|o| o.to_lowercase().contains(&race)) {
                return opt;
            }
        } else if let Some(opt) = decline_option(options) {
            return opt;
        }
    }

    if q.contains("veteran") {
        match &profile.demographics.veteran {
            Some(status) => {
                let status = status.to_lowercase();
                let is_not_veteran =
                    status.contains("not") || status.contains("no") || status.contains("non");
                for opt in options {
                    let opt_lower = opt.to_lowercase();
                    if is_not_veteran {
                        if opt_lower.contains("not") || opt_lower.contains("no") {
                            return opt;
                        }
                    } else {
                        if opt_lower.contains("i am a") && !opt_lower.contains("not") {
                            return opt;
                        }
                        if opt_lower.contains("identify as one") {
                            return opt;
                        }
                    }
                }
            }
            None => {
                if let Some(opt) = decline_option(options) {
                    return opt;
                }
            }
        }
    }

    if q.contains("disability") {
        match &profile.demographics.disability {
            Some(status) => {
                let status = status.to_lowercase();
                let no_disability = status.contains("no") || status.contains("don't");
                for opt in options {
                    let opt_lower = opt.to_lowercase();
                    if no_disability {
                        if opt_lower.contains("no") || opt_lower.contains("don't") {
                            return opt;
                        }
                    } else if opt_lower.contains("yes") {
                        return opt;
                    }
                }
            }
            None => {
                if let Some(opt) = decline_option(options) {
                    return opt;
                }
            }
        }
    }

    if q.contains("authorized") {
        if let Some(opt) = options.iter().find(|o| o.to_lowercase().contains("yes")) {
            return opt;
        }
    }

    if q.contains("sponsorship") || q.contains("visa") {
        // "Will you require sponsorship?" -> No. The polarity flips when the
        // question text contains a literal "not" ("Do you NOT require..."),
        // which also fires on words like "notice" and on double negatives.
        // Carried over from the original selector unchanged; treat answers
        // to unusually-phrased sponsorship questions as suspect.
        let target = if q.contains("not") { "yes" } else { "no" };
        for opt in options {
            let opt_lower = opt.to_lowercase();
            if opt_lower == target || opt_lower.contains(target) {
                return opt;
            }
        }
    }

    if q.contains("hear") {
        if let Some(opt) = options
            .iter()
            .find(|o| o.to_lowercase().contains("linkedin"))
        {
            return opt;
        }
    }

    warn!(question = %question, "heuristic selector fell back to the first option");
    &options[0]
}

fn decline_option(options: &[String]) -> Option<&String> {
    options.iter().find(|o| {
        let lower = o.to_lowercase();
        lower.contains("prefer not") || lower.contains("decline") || lower.contains("don't wish")
    })
}

/// Hybrid answer resolver: cache, then rate-limited AI with strict response
/// validation, then the deterministic heuristics. Shared across tabs; the
/// cache and in-flight locks guarantee one AI call per unique signature.
pub struct DecisionEngine {
    backend: Option<Arc<dyn AiBackend>>,
    limiter: Arc<RateLimiter>,
    cache: Mutex<HashMap<String, String>>,
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DecisionEngine {
    pub fn new(backend: Option<Arc<dyn AiBackend>>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            backend,
            limiter,
            cache: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Signature over the question and the sorted option set, so option
    /// ordering differences on re-rendered pages still hit the cache.
    fn cache_key(question: &str, options: &[String]) -> String {
        let mut sorted: Vec<&str> = options.iter().map(String::as_str).collect();
        sorted.sort_unstable();
        format!("{}\x1f{}", question.trim().to_lowercase(), sorted.join("\x1f"))
    }

    /// Pick one of `options` for `question`. Total over non-empty option
    /// sets: the result is always a member of the set, and identical
    /// signatures resolve identically for the process lifetime.
    pub async fn select_option(
        &self,
        question: &str,
        options: &[String],
        profile: &Profile,
    ) -> String {
        if options.is_empty() {
            return String::new();
        }

        let key = Self::cache_key(question, options);
        if let Some(hit) = self.cache.lock().await.get(&key) {
            debug!(question = %question, "answer cache hit");
            return hit.clone();
        }

        // One resolver per signature; concurrent identical questions wait
        // here instead of issuing duplicate AI calls.
        let signature_lock = {
            let mut in_flight = self.in_flight.lock().await;
            in_flight
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _guard = signature_lock.lock().await;

        if let Some(hit) = self.cache.lock().await.get(&key) {
            return hit.clone();
        }

        let answer = match self.ask_backend_for_option(question, options, profile).await {
            Some(validated) => validated,
            None => heuristic_select(question, options, profile).to_string(),
        };

        self.cache.lock().await.insert(key.clone(), answer.clone());
        self.in_flight.lock().await.remove(&key);
        answer
    }

    async fn ask_backend_for_option(
        &self,
        question: &str,
        options: &[String],
        profile: &Profile,
    ) -> Option<String> {
        let backend = self.backend.as_ref()?;
        self.limiter.acquire().await;

        let prompt = format!(
            "You are filling a job application form. Select the EXACT text of the \
             option that best matches the candidate profile.\n\n\
             Question: \"{}\"\n\
             Options: {}\n\n\
             Profile:\n{}\n\n\
             Return ONLY the exact string from Options. No explanation. \
             If nothing clearly matches, pick the most neutral option.",
            question,
            serde_json::to_string(options).unwrap_or_default(),
            serde_json::to_string_pretty(profile).unwrap_or_default(),
        );
        let request = CompletionRequest::new(prompt)
            .with_max_tokens(64)
            .with_temperature(0.0);

        match backend.complete(&request).await {
            Ok(raw) => {
                let answer = raw.trim().trim_matches('"').trim();
                match match_option(answer, options) {
                    Some(opt) => Some(opt.to_string()),
                    None => {
                        warn!(
                            question = %question,
                            answer = %answer,
                            "invalid AI answer: not in the option set, using heuristics"
                        );
                        None
                    }
                }
            }
            Err(e) => {
                warn!(question = %question, error = %e, "AI call failed, using heuristics");
                None
            }
        }
    }

    /// Free-text answer. Profile statics win for recognized patterns; AI is
    /// only consulted after, with job context folded in. Empty string means
    /// "skip this field", never "fill with empty".
    pub async fn generate_answer(
        &self,
        question: &str,
        profile: &Profile,
        job: Option<&Job>,
    ) -> String {
        let q = question.to_lowercase();

        if (q.contains("interested") || q.contains("why")) && job.is_none() {
            if let Some(text) = &profile.why_interested {
                return text.clone();
            }
        }
        if q.contains("relative") {
            if let Some(text) = &profile.relatives_at_company {
                return text.clone();
            }
        }
        if q.contains("linkedin") {
            if let Some(url) = &profile.linkedin {
                return url.clone();
            }
        }
        if q.contains("website") || q.contains("portfolio") {
            if let Some(url) = profile.portfolio.as_ref().or(profile.linkedin.as_ref()) {
                return url.clone();
            }
        }

        if let Some(backend) = &self.backend {
            self.limiter.acquire().await;

            let mut context = String::new();
            if let Some(job) = job {
                let snippet: String = job
                    .description
                    .as_deref()
                    .unwrap_or_default()
                    .chars()
                    .take(1000)
                    .collect();
                context = format!(
                    "Job Context:\n- Company: {}\n- Role: {}\n- Description: {}\n\n",
                    job.company, job.title, snippet
                );
            }

            let prompt = format!(
                "{}Candidate Profile:\n{}\n\nQuestion: \"{}\"\n\n\
                 Write a concise, professional answer (2-3 sentences) in the first \
                 person. Mention the company and role specifically if available, and \
                 connect the candidate's experience to the job. No generic buzzwords. \
                 Output only the answer text.",
                context,
                serde_json::to_string_pretty(profile).unwrap_or_default(),
                question,
            );
            let request = CompletionRequest::new(prompt)
                .with_system("You are a helpful, factual assistant for job applications.")
                .with_max_tokens(200)
                .with_temperature(0.7);

            match backend.complete(&request).await {
                Ok(text) => return text.trim().to_string(),
                Err(e) => {
                    warn!(question = %question, error = %e, "free-text generation failed");
                }
            }
        }

        String::new()
    }
}
