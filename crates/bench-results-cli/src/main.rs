// crates/bench-results-cli/src/main.rs
// ============================================================================
// Module: Bench Results CLI Entry Point
// Description: Command dispatcher for the benchmark results service.
// Purpose: Start the HTTP server, validate configuration, and prepare stores.
// Dependencies: bench-results-api, bench-results-config, clap, thiserror, tokio
// ============================================================================

//! ## Overview
//! The `bench-results` binary loads `bench-results.toml` (from `--config`,
//! `BENCH_RESULTS_CONFIG`, or the working directory) and then serves the API,
//! checks the configuration, or creates the store schema. Store setup blocks,
//! so it always runs on a blocking worker.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use bench_results_api::ApiServer;
use bench_results_api::StoreHandle;
use bench_results_config::BenchResultsConfig;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use thiserror::Error;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "bench-results", version, disable_help_subcommand = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the results HTTP server.
    Serve(ConfigArgs),
    /// Validate a configuration file without starting the server.
    CheckConfig(ConfigArgs),
    /// Create or migrate the configured store schema.
    InitStore(ConfigArgs),
}

/// Shared config file selection.
#[derive(Args, Debug)]
struct ConfigArgs {
    /// Path to `bench-results.toml`.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper carrying a user-facing message.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(args) => command_serve(args).await,
        Commands::CheckConfig(args) => command_check_config(&args),
        Commands::InitStore(args) => command_init_store(args).await,
    }
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Executes the `serve` command.
async fn command_serve(args: ConfigArgs) -> CliResult<ExitCode> {
    let config = load_config(&args)?;
    let server = tokio::task::spawn_blocking(move || ApiServer::from_config(&config))
        .await
        .map_err(|err| CliError::new(format!("Failed to initialize server: init join failed: {err}")))?
        .map_err(|err| CliError::new(format!("Failed to initialize server: {err}")))?;
    write_stderr_line(&format!("bench-results listening on {}", server.bind_addr()))
        .map_err(|err| CliError::new(output_error("stderr", &err)))?;
    server.serve().await.map_err(|err| CliError::new(format!("Server failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes the `check-config` command.
fn command_check_config(args: &ConfigArgs) -> CliResult<ExitCode> {
    let config = load_config(args)?;
    config
        .auth
        .resolve_token()
        .map_err(|err| CliError::new(format!("Failed to load config: {err}")))?;
    write_stdout_line("Config valid.").map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes the `init-store` command.
async fn command_init_store(args: ConfigArgs) -> CliResult<ExitCode> {
    let config = load_config(&args)?;
    let handle = tokio::task::spawn_blocking(move || StoreHandle::open(&config.store))
        .await
        .map_err(|err| CliError::new(format!("Failed to open store: init join failed: {err}")))?
        .map_err(|err| CliError::new(format!("Failed to open store: {err}")))?;
    write_stdout_line(&format!("Store ready ({}).", handle.label()))
        .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Loads and validates the selected configuration file.
fn load_config(args: &ConfigArgs) -> CliResult<BenchResultsConfig> {
    BenchResultsConfig::load(args.config.as_deref())
        .map_err(|err| CliError::new(format!("Failed to load config: {err}")))
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output stream failure.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("Failed to write to {stream}: {error}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
