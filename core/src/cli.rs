use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::application::InitOptions;
use crate::services::SliceOutcome;

#[derive(Parser, Debug)]
#[command(name = "pagesweep")]
#[command(
    about = "Pagesweep - resumable, time-boxed batch processing of wiki pages",
    long_about = None
)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Database URL (overrides config file and env vars)
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Per-slice time limit in seconds (overrides config)
    #[arg(long, global = true)]
    pub time_limit: Option<f64>,

    /// Wiki namespace to sweep (overrides config)
    #[arg(long, global = true)]
    pub namespace: Option<i32>,

    /// Only log visited pages, don't touch them
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Count the pages a new pass would cover
    Count,

    /// Run a single slice and print the token to continue with
    Slice {
        /// Resume token, e.g. "offset=2&total=5&reloadCount=1" (omit to start a new pass)
        token: Option<String>,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run slices back to back until the pass completes
    Run {
        /// Resume token (omit to start a new pass)
        token: Option<String>,

        /// Stop after this many slices and print the token to resume with
        #[arg(long)]
        max_slices: Option<u64>,

        /// Print each outcome as a JSON line
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    fn init_options(&self) -> InitOptions {
        InitOptions {
            database_url: self.database_url.clone(),
            config_path: self.config.clone(),
            time_limit_secs: self.time_limit,
            namespace: self.namespace,
            dry_run: self.dry_run,
        }
    }
}

/// Run the CLI by parsing process arguments
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli).await
}

/// Run the CLI with explicit arguments
pub async fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli).await
}

async fn run_cli_with_args(cli: Cli) -> Result<()> {
    // Config errors surface here, before any command output.
    let app = crate::application::initialize(cli.init_options()).await?;
    let service = &app.sweep_service;

    match cli.command {
        Commands::Count => {
            let total = service.count().await?;
            println!("{}", total);
        }

        Commands::Slice { token, json } => {
            let outcome = service.run_token(token.as_deref()).await?;
            print_outcome(&outcome, json)?;
        }

        Commands::Run {
            token,
            max_slices,
            json,
        } => {
            let mut print_error = None;
            let outcome = service
                .run_until_complete(token.as_deref(), max_slices, |outcome| {
                    if json {
                        if let Err(err) = print_json(outcome) {
                            print_error.get_or_insert(err);
                        }
                    } else {
                        println!("{}", outcome.progress());
                    }
                })
                .await?;

            if let Some(err) = print_error {
                return Err(err);
            }
            if !json {
                print_final(&outcome);
            }
        }
    }

    Ok(())
}

fn print_outcome(outcome: &SliceOutcome, json: bool) -> Result<()> {
    if json {
        return print_json(outcome);
    }

    println!("{}", outcome.progress());
    print_final(outcome);
    Ok(())
}

fn print_final(outcome: &SliceOutcome) {
    match outcome {
        SliceOutcome::Suspended { token, .. } => println!("next: {}", token),
        SliceOutcome::Complete { report, .. } => println!("{}", report),
    }
}

fn print_json(outcome: &SliceOutcome) -> Result<()> {
    println!("{}", serde_json::to_string(outcome)?);
    Ok(())
}
