//! Command-line interface and pipeline orchestration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DispositionPolicy;

#[derive(Parser, Debug)]
#[command(name = "gmail-unsub")]
#[command(version)]
#[command(about = "Finds and executes unsubscribe actions across a Gmail mailbox", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Path to OAuth2 credentials file
    #[arg(long, default_value = "credentials.json")]
    pub credentials: PathBuf,

    /// Path to token cache file
    #[arg(long, default_value = ".gmail-unsubscriber/token.json")]
    pub token_cache: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Authenticate with the Gmail API
    Auth {
        /// Force re-authentication even if a token exists
        #[arg(long)]
        force: bool,
    },

    /// Scan the mailbox and process unsubscribe actions
    Run {
        /// Actually execute unsubscribes (default is a dry run)
        #[arg(long)]
        live: bool,

        /// Override the configured disposition for source messages
        #[arg(long, value_enum)]
        disposition: Option<DispositionPolicy>,

        /// Process each message on its own instead of grouping by sender
        #[arg(long)]
        individual: bool,

        /// Override the configured mailbox search query
        #[arg(long)]
        query: Option<String>,

        /// Override the configured maximum number of messages to scan
        #[arg(long)]
        max_messages: Option<usize>,

        /// Prompt for confirmation before the execute phase
        #[arg(long)]
        interactive: bool,

        /// Skip all confirmation prompts
        #[arg(short = 'y', long)]
        yes: bool,

        /// Write the markdown report to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Generate an example configuration file
    InitConfig {
        /// Path to create the config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress reporter using indicatif
pub struct ProgressReporter {
    multi: MultiProgress,
    spinner_style: ProgressStyle,
    bar_style: ProgressStyle,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        let bar_style = ProgressStyle::default_bar()
            .template("[{elapsed:>6}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
            .unwrap()
            .progress_chars("##-");

        Self {
            multi: MultiProgress::new(),
            spinner_style,
            bar_style,
        }
    }

    pub fn add_spinner(&self, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(self.spinner_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    pub fn add_progress_bar(&self, len: u64, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new(len));
        pb.set_style(self.bar_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Finish a spinner and clear it from the multi-progress display
    pub fn finish_spinner(&self, pb: &ProgressBar, msg: &str) {
        pb.finish_and_clear();
        println!("  ✓ {}", msg);
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

use crate::config::{Config, ExecutionMode};
use crate::disposition::DispositionApplier;
use crate::error::{Result, UnsubError};
use crate::executor::{describe_action, UnsubscribeExecutor};
use crate::extractor::UnsubscribeExtractor;
use crate::grouper::SenderGrouper;
use crate::models::{
    AppliedDisposition, CandidateKind, ExecutionOutcome, OutcomeKind, SenderGroup,
    UnsubscribeCandidate,
};
use crate::store::{MessageStore, ProgressCallback};
use chrono::Utc;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Shared cancellation flag, checked between sender groups
///
/// Wired to Ctrl-C by the binary. In-flight network calls are not
/// interrupted; they finish or time out before the flag is honored.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Pipeline phases, in order of a run's lifetime
///
/// A search/fetch failure in Fetching aborts the run before any action is
/// taken; failures from Executing onward are isolated per group and the
/// run always reaches Reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Fetching,
    Extracting,
    Grouping,
    Confirming,
    Executing,
    Disposing,
    Reporting,
}

/// One sender group's line in the final report
#[derive(Debug, Clone)]
pub struct GroupReport {
    pub sender_key: String,
    pub sender_name: String,
    pub kind: CandidateKind,
    pub target: String,
    pub outcome: OutcomeKind,
    pub status: Option<u16>,
    pub error: Option<String>,
    pub disposition: AppliedDisposition,
    pub message_count: usize,
}

/// Full report of one pipeline run
#[derive(Debug)]
pub struct Report {
    pub run_id: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: chrono::DateTime<chrono::Utc>,
    pub duration_seconds: i64,
    pub execution_mode: ExecutionMode,
    pub disposition_policy: DispositionPolicy,
    pub messages_scanned: usize,
    pub candidates_found: usize,
    pub malformed_dropped: usize,
    pub groups_processed: usize,
    pub successes: usize,
    pub failures: usize,
    pub skipped: usize,
    pub cancelled: bool,
    pub groups: Vec<GroupReport>,
}

impl Report {
    /// Generate a Markdown report
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        if self.execution_mode == ExecutionMode::DryRun {
            md.push_str("# Unsubscribe Report (DRY RUN)\n\n");
            md.push_str("> No unsubscribe was sent and no message was touched. This report shows what WOULD happen.\n\n");
        } else {
            md.push_str("# Unsubscribe Report\n\n");
        }

        md.push_str(&format!(
            "Generated: {}\n\n",
            self.completed_at.format("%Y-%m-%d %H:%M:%S")
        ));

        md.push_str("## Summary\n\n");
        md.push_str(&format!("- **Run ID:** {}\n", self.run_id));
        md.push_str(&format!("- **Mode:** {}\n", self.execution_mode.as_str()));
        md.push_str(&format!(
            "- **Disposition policy:** {}\n",
            self.disposition_policy.as_str()
        ));
        md.push_str(&format!(
            "- **Messages scanned:** {}\n",
            self.messages_scanned
        ));
        md.push_str(&format!(
            "- **Candidates found:** {} ({} malformed targets dropped)\n",
            self.candidates_found, self.malformed_dropped
        ));
        md.push_str(&format!(
            "- **Groups processed:** {} ({} successes, {} failures, {} skipped)\n",
            self.groups_processed, self.successes, self.failures, self.skipped
        ));
        md.push_str(&format!(
            "- **Processing time:** {} seconds\n",
            self.duration_seconds
        ));
        if self.cancelled {
            md.push_str("- **Run was cancelled before all groups were processed**\n");
        }
        md.push('\n');

        md.push_str("## Senders\n\n");
        if self.groups.is_empty() {
            md.push_str("_No unsubscribe candidates were found._\n");
        } else {
            md.push_str("| Sender | Action | Outcome | Disposition | Messages |\n");
            md.push_str("|--------|--------|---------|-------------|----------|\n");
            for group in &self.groups {
                let outcome = match (&group.outcome, group.status, &group.error) {
                    (OutcomeKind::Failed, Some(status), _) => {
                        format!("failed (HTTP {})", status)
                    }
                    (OutcomeKind::Failed, None, Some(error)) => {
                        format!("failed ({})", error.replace('|', "\\|"))
                    }
                    (kind, _, _) => kind.as_str().to_string(),
                };
                md.push_str(&format!(
                    "| {} | {} | {} | {} | {} |\n",
                    group.sender_key,
                    describe_action(group.kind, &group.target).replace('|', "\\|"),
                    outcome,
                    group.disposition.as_str(),
                    group.message_count,
                ));
            }
        }
        md.push('\n');

        if self.execution_mode == ExecutionMode::DryRun {
            md.push_str("---\n\n");
            md.push_str("_To execute these unsubscribes, run again with the `--live` flag._\n");
        }

        md
    }

    /// Save the report to a file
    pub async fn save(&self, path: &std::path::Path) -> std::io::Result<()> {
        let markdown = self.to_markdown();
        tokio::fs::write(path, markdown).await?;
        Ok(())
    }
}

/// Main orchestration function for one pipeline run
///
/// Sequences fetch → extract → group → (confirm) → execute → dispose →
/// report. Nothing survives the run: messages, candidates, groups and
/// outcomes are all discarded once the report is built.
pub async fn run_pipeline(
    store: &dyn MessageStore,
    config: &Config,
    cancel: &CancelFlag,
    interactive: bool,
) -> Result<Report> {
    let reporter = ProgressReporter::new();
    let started_at = Utc::now();
    let run_id = uuid::Uuid::new_v4().to_string();

    info!(run_id = %run_id, mode = config.run.execution.as_str(), "starting run");

    // Phase 1: fetch. A failure here aborts the run outright; nothing has
    // been sent or mutated yet.
    info!(phase = ?RunPhase::Fetching, "entering phase");
    let search_spinner = reporter.add_spinner("Searching mailbox...");
    let message_ids = store
        .search(&config.search.query, config.search.max_messages)
        .await?;
    reporter.finish_spinner(
        &search_spinner,
        &format!(
            "Found {} messages for query {:?}",
            message_ids.len(),
            config.search.query
        ),
    );

    let fetch_bar = reporter.add_progress_bar(message_ids.len() as u64, "Fetching messages...");
    let fetch_bar_clone = fetch_bar.clone();
    let progress_callback: ProgressCallback = Arc::new(move || {
        fetch_bar_clone.inc(1);
    });

    let messages = store.fetch_batch(message_ids, progress_callback).await?;
    fetch_bar.finish_with_message(format!("Fetched {} messages", messages.len()));

    // Phase 2: extract. Never fatal; malformed targets are dropped and
    // counted.
    info!(phase = ?RunPhase::Extracting, "entering phase");
    let extractor = UnsubscribeExtractor::new();
    let mut candidates: Vec<UnsubscribeCandidate> = Vec::new();
    let mut malformed_dropped = 0;
    for message in &messages {
        let extraction = extractor.extract(message);
        candidates.extend(extraction.candidates);
        malformed_dropped += extraction.malformed;
    }
    info!(
        candidates = candidates.len(),
        dropped = malformed_dropped,
        "extraction complete"
    );

    // Phase 3: group by sender
    info!(phase = ?RunPhase::Grouping, "entering phase");
    let grouper = SenderGrouper::new();
    let groups = grouper.group(&messages, &candidates, config.run.processing);
    info!(groups = groups.len(), "grouping complete");

    // Phase 4: confirm, when requested and there is something to confirm
    if interactive && !groups.is_empty() && config.run.execution == ExecutionMode::Live {
        info!(phase = ?RunPhase::Confirming, "entering phase");
        println!("\nAbout to process {} senders:", groups.len());
        for group in &groups {
            println!(
                "  - {} ({} messages): {}",
                group.sender_key,
                group.message_ids.len(),
                describe_action(group.representative.kind, &group.representative.target)
            );
        }
        if !confirm_action("Proceed with unsubscribe execution?")? {
            return Err(UnsubError::Cancelled(
                "user declined execution".to_string(),
            ));
        }
    }

    // Phases 5 and 6: execute and dispose, group by group. Failures here
    // are isolated per group; the run always reaches reporting.
    info!(phase = ?RunPhase::Executing, "entering phase");
    let executor = UnsubscribeExecutor::new(store, config.run.execution, &config.http)?;
    let applier = DispositionApplier::new(store, config.run.disposition);

    let execute_bar = reporter.add_progress_bar(groups.len() as u64, "Processing senders...");
    let mut group_reports: Vec<GroupReport> = Vec::new();
    let mut cancelled = false;

    for group in &groups {
        if cancel.is_cancelled() {
            warn!("cancellation requested, stopping before next group");
            cancelled = true;
            break;
        }

        let outcome = executor.execute(group).await;
        let disposition = apply_disposition(&applier, &outcome, group).await;

        group_reports.push(GroupReport {
            sender_key: group.sender_key.clone(),
            sender_name: group.sender_name.clone(),
            kind: group.representative.kind,
            target: group.representative.target.clone(),
            outcome: outcome.kind,
            status: outcome.status,
            error: outcome.error,
            disposition,
            message_count: group.message_ids.len(),
        });
        execute_bar.inc(1);
    }
    execute_bar.finish_with_message(format!("Processed {} senders", group_reports.len()));

    // Phase 7: report
    info!(phase = ?RunPhase::Reporting, "entering phase");
    let completed_at = Utc::now();
    let successes = group_reports
        .iter()
        .filter(|g| g.outcome == OutcomeKind::Success)
        .count();
    let failures = group_reports
        .iter()
        .filter(|g| g.outcome == OutcomeKind::Failed)
        .count();
    let skipped = group_reports
        .iter()
        .filter(|g| g.outcome == OutcomeKind::SkippedDryRun)
        .count();

    Ok(Report {
        run_id,
        started_at,
        completed_at,
        duration_seconds: (completed_at - started_at).num_seconds(),
        execution_mode: config.run.execution,
        disposition_policy: config.run.disposition,
        messages_scanned: messages.len(),
        candidates_found: candidates.len(),
        malformed_dropped,
        groups_processed: group_reports.len(),
        successes,
        failures,
        skipped,
        cancelled,
        groups: group_reports,
    })
}

/// Apply the disposition for one group, isolating mailbox failures
async fn apply_disposition(
    applier: &DispositionApplier<'_>,
    outcome: &ExecutionOutcome,
    group: &SenderGroup,
) -> AppliedDisposition {
    match applier.apply(outcome, &group.message_ids).await {
        Ok(applied) => applied,
        Err(e) => {
            warn!(
                sender = %group.sender_key,
                error = %e,
                "disposition failed for group, continuing with remaining groups"
            );
            AppliedDisposition::None
        }
    }
}

/// Ask a yes/no question on stdin, defaulting to no
pub fn confirm_action(prompt: &str) -> Result<bool> {
    print!("{} [y/N]: ", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    Ok(input.trim().eq_ignore_ascii_case("y"))
}
