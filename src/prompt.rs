use async_trait::async_trait;
use std::io::Write;

/// Human-intervention boundary. Login walls and the pre-submit review both
/// suspend here; implementations must be cancellable futures so a job-level
/// timeout can abandon the wait.
#[async_trait]
pub trait Prompter: Send + Sync {
    /// Ask a yes/no question. Returns false on EOF or unreadable input.
    async fn confirm(&self, message: &str) -> bool;

    /// Block until the human signals readiness (login walls, manual wizard
    /// steps). Returns false if the human declined.
    async fn wait_ready(&self, message: &str) -> bool;
}

/// Interactive prompter reading from stdin.
pub struct StdinPrompter;

impl StdinPrompter {
    fn read_line_blocking(message: String) -> Option<String> {
        print!("{}", message);
        std::io::stdout().flush().ok()?;
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).ok()?;
        Some(line.trim().to_lowercase())
    }
}

#[async_trait]
impl Prompter for StdinPrompter {
    async fn confirm(&self, message: &str) -> bool {
        let message = format!("{} (y/n): ", message);
        let answer = tokio::task::spawn_blocking(move || Self::read_line_blocking(message))
            .await
            .ok()
            .flatten();
        matches!(answer.as_deref(), Some("y") | Some("yes"))
    }

    async fn wait_ready(&self, message: &str) -> bool {
        let message = format!("{}\n   Press Enter when ready (or type 'skip'): ", message);
        let answer = tokio::task::spawn_blocking(move || Self::read_line_blocking(message))
            .await
            .ok()
            .flatten();
        !matches!(answer.as_deref(), Some("skip") | None)
    }
}

/// Scripted prompter for tests and headless batch runs.
#[allow(dead_code)]
pub struct AutoPrompter {
    pub answer: bool,
}

#[allow(dead_code)]
impl AutoPrompter {
    pub fn yes() -> Self {
        Self { answer: true }
    }

    pub fn no() -> Self {
        Self { answer: false }
    }
}

#[async_trait]
impl Prompter for AutoPrompter {
    async fn confirm(&self, _message: &str) -> bool {
        self.answer
    }

    async fn wait_ready(&self, _message: &str) -> bool {
        self.answer
    }
}
