use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use sheetmail::compose::Composer;
use sheetmail::config::AppConfig;
use sheetmail::dispatch::{DispatchController, DryRunGateway, EmailGateway, SmtpGateway};
use sheetmail::source::{CsvSource, TabularSource};
use sheetmail::template::{FileTemplateStore, TemplateEngine};
use sheetmail::workflow::{
    AlwaysConfirm, BatchPreview, ConfirmationGate, RunOutcome, WorkflowCoordinator,
};

#[derive(Parser)]
#[command(name = "sheetmail", about = "Spreadsheet-driven mail merge", version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "sheetmail.toml")]
    config: PathBuf,

    /// Log composed messages instead of sending them.
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full send workflow over every row marked to send.
    Run {
        /// Skip the interactive confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
    /// Send one row by absolute 1-based number (may sit above the header
    /// row). Touches no campaign state.
    TestRow { row: u32 },
}

/// Interactive y/N confirmation on stdin.
struct StdinGate;

#[async_trait::async_trait]
impl ConfirmationGate for StdinGate {
    async fn confirm(&self, preview: &BatchPreview) -> bool {
        println!(
            "About to send {} message(s) from {} ({}-{}s between sends).",
            preview.candidate_count,
            preview.source_id,
            preview.throttle.seconds_min,
            preview.throttle.seconds_max
        );
        print!("Proceed? [y/N] ");
        let _ = std::io::stdout().flush();

        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).is_err() {
            return false;
        }
        matches!(line.trim().to_lowercase().as_str(), "y" | "yes")
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)?;
    let settings = config.campaign_settings();
    let merge = config.merge.clone();

    let source: Arc<dyn TabularSource> =
        Arc::new(CsvSource::open(&config.sheet.path, config.sheet.header_row)?);

    let gateway: Arc<dyn EmailGateway> = if cli.dry_run {
        Arc::new(DryRunGateway)
    } else {
        let smtp = config.smtp.clone().ok_or_else(|| {
            anyhow::anyhow!(
                "No [smtp] section in {}; configure SMTP or pass --dry-run",
                cli.config.display()
            )
        })?;
        Arc::new(SmtpGateway::new(smtp)?)
    };

    let store = Arc::new(FileTemplateStore::new(&config.campaign.templates_dir));
    let engine = TemplateEngine::new(store, merge.marker);
    let composer = Composer::new(merge.clone());
    let controller =
        DispatchController::new(Arc::clone(&gateway), Arc::clone(&source), merge.clone());

    match cli.command {
        Command::Run { yes } => {
            let gate: Arc<dyn ConfirmationGate> = if yes {
                Arc::new(AlwaysConfirm)
            } else {
                Arc::new(StdinGate)
            };
            let coordinator =
                WorkflowCoordinator::new(source, composer, engine, controller, gate, merge.clone());
            match coordinator.run(&settings).await? {
                RunOutcome::Blocked(message) => {
                    eprintln!("{message}");
                    std::process::exit(2);
                }
                RunOutcome::Cancelled => {
                    println!("Cancelled. Nothing was sent.");
                }
                RunOutcome::Completed(summary) => {
                    println!("{}", summary.report(merge.max_listed_rows));
                    if !summary.failures.is_empty() {
                        std::process::exit(1);
                    }
                }
            }
        }
        Command::TestRow { row } => {
            let coordinator = WorkflowCoordinator::new(
                source,
                composer,
                engine,
                controller,
                Arc::new(AlwaysConfirm),
                merge,
            );
            match coordinator.send_test_row(row, &settings).await {
                Ok(()) => println!("Test message for row {row} sent."),
                Err(e) => {
                    eprintln!("Test send failed: {e}");
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
