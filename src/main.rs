use anyhow::Result;
use clap::Parser;
use gmail_unsubscriber::cli::{self, CancelFlag, Cli, Commands};
use gmail_unsubscriber::config::{Config, DispositionPolicy, ExecutionMode, ProcessingMode};
use gmail_unsubscriber::error::UnsubError;
use gmail_unsubscriber::store::GmailStore;
use std::process;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Exit with proper code on error
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        eprintln!("\nFor help, run: gmail-unsub --help");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Install default crypto provider for rustls
    // This is necessary because multiple dependencies use different crypto providers
    // On non-Windows platforms, use aws-lc-rs (better performance, FIPS support)
    // On Windows, use ring (better compatibility, no NASM/CMake required)
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    // Initialize tracing with level based on verbose flag
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_unsubscriber=debug,info"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_unsubscriber=info,warn,error"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    tracing::info!("Gmail unsubscriber starting...");

    // Ensure the working directory for token cache exists
    tokio::fs::create_dir_all(".gmail-unsubscriber").await?;

    match cli.command {
        Commands::Auth { force } => {
            tracing::info!("Authenticating with Gmail API...");

            if let Some(parent) = cli.token_cache.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            // Delete existing token if force flag is set
            if force && cli.token_cache.exists() {
                tokio::fs::remove_file(&cli.token_cache).await?;
                tracing::info!("Removed existing token cache");
            }

            // Initialize Gmail hub (will trigger OAuth flow if needed)
            let hub = gmail_unsubscriber::auth::initialize_gmail_hub(
                &cli.credentials,
                &cli.token_cache,
            )
            .await?;

            gmail_unsubscriber::auth::secure_token_file(&cli.token_cache).await?;

            println!("Successfully authenticated with Gmail API");
            println!("Token cached at: {:?}", cli.token_cache);

            // Test the connection - must specify scope to avoid triggering
            // an additional OAuth flow
            let (_, profile) = hub
                .users()
                .get_profile("me")
                .add_scope("https://www.googleapis.com/auth/gmail.modify")
                .doit()
                .await
                .map_err(UnsubError::from)?;
            println!(
                "Connected to account: {}",
                profile.email_address.unwrap_or_default()
            );

            Ok(())
        }

        Commands::Run {
            live,
            disposition,
            individual,
            query,
            max_messages,
            interactive,
            yes,
            report,
        } => {
            // Load configuration and fold in the CLI overrides
            let mut config = Config::load(&cli.config).await?;
            if live {
                config.run.execution = ExecutionMode::Live;
            }
            if let Some(disposition) = disposition {
                config.run.disposition = disposition;
            }
            if individual {
                config.run.processing = ProcessingMode::Individual;
            }
            if let Some(query) = query {
                config.search.query = query;
            }
            if let Some(max_messages) = max_messages {
                config.search.max_messages = max_messages;
            }
            config.validate()?;

            if config.run.execution == ExecutionMode::DryRun {
                println!("Running in DRY RUN mode - nothing will be sent or modified");
            }

            // Permanent deletion is irreversible; always confirm unless
            // explicitly waived
            if config.run.execution == ExecutionMode::Live
                && config.run.disposition == DispositionPolicy::Delete
                && !yes
            {
                println!("⚠️  Messages from successfully unsubscribed senders will be PERMANENTLY DELETED.");
                if !cli::confirm_action("This cannot be undone. Continue?")? {
                    println!("Aborted.");
                    return Ok(());
                }
            }

            tracing::info!(
                mode = config.run.execution.as_str(),
                disposition = config.run.disposition.as_str(),
                processing = config.run.processing.as_str(),
                "starting pipeline run"
            );

            // Authenticate and build the rate-limited store
            let hub = gmail_unsubscriber::auth::initialize_gmail_hub(
                &cli.credentials,
                &cli.token_cache,
            )
            .await?;
            let store = GmailStore::new(hub, config.search.max_concurrent_fetches);

            // Ctrl-C stops the run between sender groups; in-flight calls
            // are allowed to finish or time out
            let cancel = CancelFlag::new();
            let cancel_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("\nCancellation requested, finishing current group...");
                    cancel_signal.cancel();
                }
            });

            let run_report = cli::run_pipeline(&store, &config, &cancel, interactive).await?;

            // Display summary
            println!("\n========================================");
            println!("Unsubscribe Run Summary");
            println!("========================================");
            println!("Run ID: {}", run_report.run_id);
            println!("Mode: {}", run_report.execution_mode.as_str());
            println!("Duration: {} seconds", run_report.duration_seconds);
            println!("Messages scanned: {}", run_report.messages_scanned);
            println!(
                "Candidates found: {} ({} malformed dropped)",
                run_report.candidates_found, run_report.malformed_dropped
            );
            println!("Groups processed: {}", run_report.groups_processed);
            println!("Successes: {}", run_report.successes);
            println!("Failures: {}", run_report.failures);
            println!("Skipped (dry run): {}", run_report.skipped);
            if run_report.cancelled {
                println!("Run was CANCELLED before all groups were processed");
            }
            println!("========================================");

            if let Some(report_path) = report {
                run_report.save(&report_path).await?;
                println!("Report written to {:?}", report_path);
            }

            Ok(())
        }

        Commands::InitConfig { output, force } => {
            tracing::info!("Generating example configuration file");

            if output.exists() && !force {
                return Err(UnsubError::Config(format!(
                    "Configuration file already exists at {:?}. Use --force to overwrite.",
                    output
                ))
                .into());
            }

            Config::create_example(&output).await?;

            println!("Created example configuration file at: {:?}", output);
            println!("\nKey settings to review:");
            println!("  - run.execution: 'dry-run' (default) or 'live'");
            println!("  - run.disposition: what happens to messages after a successful unsubscribe");
            println!("  - search.query: the mailbox query used to find candidate messages");

            Ok(())
        }
    }
}
