use crate::demo::{run_demo, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use report_triage::config::ConfigError;
use report_triage::error::AppError;
use report_triage::workflows::reports::ScoringPolicy;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Report Triage Engine",
    about = "Score, corroborate and route citizen incident reports",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Run a scripted triage session against in-memory storage
    Demo(DemoArgs),
    /// Print the effective scoring policy as JSON
    Policy(PolicyArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct PolicyArgs {
    /// Policy file to validate instead of the built-in defaults
    #[arg(long)]
    pub(crate) path: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args),
        Command::Policy(args) => print_policy(args),
    }
}

fn print_policy(args: PolicyArgs) -> Result<(), AppError> {
    let policy = match args.path {
        Some(path) => ScoringPolicy::from_json_file(&path).map_err(ConfigError::from)?,
        None => ScoringPolicy::default(),
    };

    match serde_json::to_string_pretty(&policy) {
        Ok(json) => println!("{json}"),
        Err(err) => println!("Scoring policy unavailable: {err}"),
    }
    Ok(())
}
