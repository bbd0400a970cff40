mod ai;
mod decision;
mod errors;
mod humanize;
mod ledger;
mod models;
mod orchestrator;
mod page;
mod profile;
mod prompt;
mod resolver;
mod strategy;
mod validator;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ai::{AiBackend, ChatBackend, RateLimiter};
use decision::DecisionEngine;
use humanize::Humanizer;
use ledger::SubmissionLedger;
use models::{FillOutcome, Job, JobState};
use orchestrator::FormFillOrchestrator;
use page::WebDriverPage;
use profile::Profile;
use prompt::{Prompter, StdinPrompter};
use strategy::StrategyResolver;

#[derive(Parser)]
#[command(name = "pounce")]
#[command(about = "Job application automation - navigate, fill, and submit ATS forms")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply to a batch of jobs
    Run {
        /// Directory of job JSON files (one posting per file)
        #[arg(long)]
        jobs: PathBuf,

        /// Path to the candidate profile JSON
        #[arg(long)]
        profile: PathBuf,

        /// Actually submit applications (default pauses for review)
        #[arg(long)]
        submit: bool,

        /// Maximum number of jobs to process
        #[arg(short, long)]
        limit: Option<usize>,

        /// WebDriver endpoint to drive the browser through
        #[arg(long, default_value = "http://localhost:9515")]
        webdriver: String,

        /// Per-job deadline in seconds
        #[arg(long, default_value = "600")]
        job_timeout: u64,

        /// Override the ledger location
        #[arg(long)]
        ledger: Option<PathBuf>,
    },

    /// Inspect the submission ledger
    Ledger {
        #[command(subcommand)]
        command: LedgerCommands,
    },
}

#[derive(Subcommand)]
enum LedgerCommands {
    /// Show submission counts
    Stats,

    /// List submitted applications
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "pounce=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            jobs,
            profile,
            submit,
            limit,
            webdriver,
            job_timeout,
            ledger,
        } => {
            run_batch(
                &jobs,
                &profile,
                submit,
                limit,
                &webdriver,
                job_timeout,
                ledger,
            )
            .await
        }

        Commands::Ledger { command } => {
            let ledger = SubmissionLedger::open_default()?;
            match command {
                LedgerCommands::Stats => {
                    let stats = ledger.stats();
                    println!("Ledger: {}", ledger.path().display());
                    println!("  Total:      {}", stats.total);
                    println!("  Submitted:  {}", stats.submitted);
                    println!("  Failed:     {}", stats.failed);
                    println!("  Success:    {:.1}%", stats.success_rate * 100.0);
                }
                LedgerCommands::List => {
                    let entries = ledger.submitted_entries();
                    if entries.is_empty() {
                        println!("No submitted applications yet.");
                    } else {
                        println!("{:<22} {:<30} {:<22}", "COMPANY", "TITLE", "SUBMITTED");
                        println!("{}", "-".repeat(76));
                        for entry in entries {
                            println!(
                                "{:<22} {:<30} {:<22}",
                                truncate(&entry.company, 20),
                                truncate(&entry.job_title, 28),
                                truncate(entry.submitted_at.as_deref().unwrap_or("-"), 20)
                            );
                        }
                    }
                }
            }
            Ok(())
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_batch(
    jobs_dir: &Path,
    profile_path: &Path,
    submit: bool,
    limit: Option<usize>,
    webdriver: &str,
    job_timeout: u64,
    ledger_path: Option<PathBuf>,
) -> Result<()> {
    let profile = Profile::load(profile_path)?;
    let ledger = match ledger_path {
        Some(path) => SubmissionLedger::open(path)?,
        None => SubmissionLedger::open_default()?,
    };

    let mut jobs = load_jobs(jobs_dir)?;
    if let Some(limit) = limit {
        jobs.truncate(limit);
    }
    if jobs.is_empty() {
        println!("No jobs found in {}", jobs_dir.display());
        return Ok(());
    }

    println!("Applying as {} to {} job(s)", profile.full_name(), jobs.len());
    println!(
        "Submit mode: {}",
        if submit { "AUTO-SUBMIT" } else { "review before submit" }
    );

    let human = Arc::new(Humanizer::new());
    let prompter: Arc<dyn Prompter> = Arc::new(StdinPrompter);
    let backend = ChatBackend::from_env().map(|b| Arc::new(b) as Arc<dyn AiBackend>);
    let engine = Arc::new(DecisionEngine::new(
        backend,
        Arc::new(RateLimiter::default_window()),
    ));
    let strategies = StrategyResolver::with_defaults(human.clone(), prompter.clone());

    let page = Arc::new(
        WebDriverPage::connect(webdriver)
            .await
            .with_context(|| format!("Failed to reach WebDriver at {}", webdriver))?,
    );

    let mut submitted = 0;
    let mut in_review = 0;
    let mut failed = 0;
    let mut skipped = 0;

    for (index, job) in jobs.iter().enumerate() {
        println!(
            "\n[{}/{}] {} - {}",
            index + 1,
            jobs.len(),
            job.company,
            job.title
        );

        if !ledger.should_apply(job) {
            println!("  Already submitted, skipping.");
            skipped += 1;
            continue;
        }

        let strategy = strategies.resolve(&job.apply_url);
        let orchestrator = FormFillOrchestrator::new(
            page.clone(),
            human.clone(),
            engine.clone(),
            prompter.clone(),
            submit,
        );

        // The deadline turns a wedged page into an orderly failure instead
        // of stalling the whole batch.
        let outcome = match tokio::time::timeout(
            Duration::from_secs(job_timeout),
            orchestrator.run(job, &profile, strategy.as_ref()),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(company = %job.company, "job hit the {}s deadline", job_timeout);
                FillOutcome::failed(format!("timed out after {}s", job_timeout))
            }
        };

        if let Some(report) = &outcome.report {
            println!(
                "  Validation: {}/{} fields correct ({:.1}%)",
                report.total_fields - report.error_count,
                report.total_fields,
                report.accuracy * 100.0
            );
            for mismatch in &report.mismatches {
                println!(
                    "    {}: expected '{}', got '{}'",
                    mismatch.field, mismatch.expected, mismatch.actual
                );
            }
        }

        match outcome.state {
            JobState::Submitted => {
                ledger.mark_submitted(job, outcome.evidence.as_deref())?;
                println!("  Submitted ({} fields filled).", outcome.fields_filled);
                submitted += 1;
            }
            JobState::ReadyForReview => {
                println!(
                    "  Filled {} field(s) ({} skipped), left in the browser for review.",
                    outcome.fields_filled, outcome.fields_skipped
                );
                in_review += 1;
            }
            _ => {
                let reason = outcome.error.as_deref().unwrap_or("unknown failure");
                ledger.mark_failed(job, reason)?;
                println!("  Failed: {}", reason);
                failed += 1;
            }
        }
    }

    println!("\nBatch complete:");
    println!("  Submitted:  {}", submitted);
    println!("  In review:  {}", in_review);
    println!("  Failed:     {}", failed);
    println!("  Skipped:    {}", skipped);

    let stats = ledger.stats();
    println!(
        "Ledger now tracks {} job(s), {} submitted.",
        stats.total, stats.submitted
    );

    if let Ok(page) = Arc::try_unwrap(page) {
        let _ = page.quit().await;
    }

    Ok(())
}

/// One JSON job record per file, processed in filename order. Malformed
/// files are reported and skipped rather than sinking the batch.
fn load_jobs(dir: &Path) -> Result<Vec<Job>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read jobs directory: {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut jobs = Vec::new();
    for path in paths {
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read job file: {}", path.display()))?;
        match serde_json::from_str::<Job>(&raw) {
            Ok(job) => jobs.push(job),
            Err(e) => {
                eprintln!("Skipping malformed job file {}: {}", path.display(), e);
            }
        }
    }
    Ok(jobs)
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}...", &s[..max.saturating_sub(3)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_jobs_skips_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("01_acme.json"),
            r#"{"url":"https://a/1","apply_url":"https://a/1/apply",
                "title":"Engineer","company":"Acme"}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("02_bad.json"), "{ not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let jobs = load_jobs(dir.path()).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].company, "Acme");
    }

    #[test]
    fn test_load_jobs_ordered_by_filename() {
        let dir = tempfile::tempdir().unwrap();
        for (name, company) in [("b.json", "Beta"), ("a.json", "Alpha")] {
            std::fs::write(
                dir.path().join(name),
                format!(
                    r#"{{"url":"https://x/1","apply_url":"https://x/1/apply",
                        "title":"Engineer","company":"{}"}}"#,
                    company
                ),
            )
            .unwrap();
        }

        let jobs = load_jobs(dir.path()).unwrap();
        assert_eq!(jobs[0].company, "Alpha");
        assert_eq!(jobs[1].company, "Beta");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a very long string", 10), "a very ...");
    }
}
