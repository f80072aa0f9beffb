//! Gmail Unsubscriber
//!
//! Scans a Gmail mailbox for messages carrying a machine- or
//! human-actionable unsubscribe mechanism, executes that mechanism on the
//! user's behalf, and optionally cleans up the originating messages.
//!
//! # Overview
//!
//! The pipeline runs in phases:
//! - **Fetching**: search and fetch candidate messages (concurrent, rate limited)
//! - **Extracting**: pull unsubscribe candidates from List-Unsubscribe
//!   headers (RFC 8058 one-click aware) with an HTML body-scan fallback
//! - **Grouping**: deduplicate candidates by normalized sender, choosing
//!   one representative action per sender
//! - **Executing**: perform the action (one-click POST, GET, or a mail
//!   sent from the user's account) with bounded timeout and a single
//!   retry on transient failure, or skip everything in dry-run mode
//! - **Disposing**: keep, trash or delete the source messages, only after
//!   a successful unsubscribe
//! - **Reporting**: per-sender outcomes plus run totals
//!
//! # Example Usage
//!
//! ```no_run
//! use gmail_unsubscriber::{auth, cli::{self, CancelFlag}, config::Config, store::GmailStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml".as_ref()).await?;
//!
//!     let hub = auth::initialize_gmail_hub(
//!         "credentials.json".as_ref(),
//!         ".gmail-unsubscriber/token.json".as_ref(),
//!     )
//!     .await?;
//!
//!     let store = GmailStore::new(hub, config.search.max_concurrent_fetches);
//!     let report = cli::run_pipeline(&store, &config, &CancelFlag::new(), false).await?;
//!     println!("{}", report.to_markdown());
//!
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`auth`] - OAuth2 authentication and Gmail API initialization
//! - [`cli`] - Command-line interface and pipeline orchestration
//! - [`config`] - Configuration management
//! - [`disposition`] - Post-unsubscribe message disposition
//! - [`error`] - Error types and result aliases
//! - [`executor`] - Unsubscribe execution (HTTP and mail)
//! - [`extractor`] - Candidate extraction from headers and bodies
//! - [`grouper`] - Sender grouping and representative selection
//! - [`models`] - Core data structures
//! - [`store`] - Mailbox access behind the `MessageStore` trait

pub mod auth;
pub mod cli;
pub mod config;
pub mod disposition;
pub mod error;
pub mod executor;
pub mod extractor;
pub mod grouper;
pub mod models;
pub mod store;

// Re-export commonly used types for convenience
pub use error::{Result, UnsubError};

// Core data models
pub use models::{
    AppliedDisposition, CandidateKind, CandidateOrigin, ExecutionOutcome, Headers, Message,
    OutcomeKind, SenderGroup, UnsubscribeCandidate,
};

// Pipeline components
pub use disposition::DispositionApplier;
pub use executor::UnsubscribeExecutor;
pub use extractor::{Extraction, UnsubscribeExtractor};
pub use grouper::{sender_key, SenderGrouper};

// Config types
pub use config::{Config, DispositionPolicy, ExecutionMode, ProcessingMode, RunConfig};

// Store types
pub use store::{GmailStore, MessageStore, ProgressCallback};

// CLI types (for binary usage)
pub use cli::{CancelFlag, Cli, Commands, GroupReport, ProgressReporter, Report, RunPhase};
