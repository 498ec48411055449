use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tokio::runtime::Runtime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aipod_gateway::GatewayMode;
use aipod_gateway::cli::Output;
use aipod_gateway::cli::commands::call::CallArgs;

#[derive(Parser)]
#[command(name = "aipod-gateway")]
#[command(
    version,
    about = "Resilient AI call gateway with circuit breaking, retries and model fallback"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    verbose: bool,

    #[arg(long, short, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one AI call and print the result as JSON
    Call {
        #[arg(long, short, help = "Task label for telemetry")]
        task: String,
        #[arg(long, short, help = "System prompt")]
        system: Option<String>,
        #[arg(long, short, help = "User prompt")]
        user: Option<String>,
        #[arg(long, help = "Raw JSON payload sent instead of the prompts")]
        raw: Option<String>,
        #[arg(long, help = "JSON generation config")]
        generation_config: Option<String>,
        #[arg(long, short, help = "Requested model (model or provider:model)")]
        model: Option<String>,
        #[arg(
            long,
            value_delimiter = ',',
            help = "Explicit fallback targets, comma separated"
        )]
        fallback: Vec<String>,
        #[arg(long, help = "Per-attempt deadline in milliseconds")]
        timeout_ms: Option<u64>,
        #[arg(long, help = "Transport endpoint override")]
        base_url: Option<String>,
        #[arg(long, help = "Gateway mode: auto, live, mock")]
        mode: Option<GatewayMode>,
        #[arg(long, help = "Include attempt records in the output")]
        attempts: bool,
        #[arg(long, help = "Print breaker and metrics summary")]
        stats: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (merged from all sources)
    Show {
        #[arg(long, help = "Output as JSON instead of TOML")]
        json: bool,
    },
    /// Show configuration file paths
    Path,
    /// Initialize configuration
    Init {
        #[arg(long, short, help = "Initialize global config")]
        global: bool,
        #[arg(long, help = "Overwrite existing config")]
        force: bool,
    },
}

/// Set up panic handler for graceful error reporting
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("\n\x1b[1;31m━━━ PANIC ━━━\x1b[0m");
        eprintln!("\x1b[31maipod-gateway encountered an unexpected error:\x1b[0m");
        eprintln!("  {}", message);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "\x1b[90mLocation: {}:{}:{}\x1b[0m",
                location.file(),
                location.line(),
                location.column()
            );
        }
        eprintln!();

        // Call default hook for backtrace (if RUST_BACKTRACE=1)
        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            Output::new().error(&format!("Error: {:#}", e));
            ExitCode::FAILURE
        }
    }
}

/// Returns whether the command succeeded
fn run_cli() -> anyhow::Result<bool> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    // Logs go to stderr; stdout carries command output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Call {
            task,
            system,
            user,
            raw,
            generation_config,
            model,
            fallback,
            timeout_ms,
            base_url,
            mode,
            attempts,
            stats,
        } => {
            let rt = Runtime::new()?;
            let ok = rt.block_on(aipod_gateway::cli::commands::call::run(CallArgs {
                task,
                system,
                user,
                raw,
                generation_config,
                model,
                fallback,
                timeout_ms,
                base_url,
                mode,
                attempts,
                stats,
            }))?;
            return Ok(ok);
        }
        Commands::Config { action } => match action {
            ConfigAction::Show { json } => {
                aipod_gateway::cli::commands::config::show(json)?;
            }
            ConfigAction::Path => {
                aipod_gateway::cli::commands::config::path()?;
            }
            ConfigAction::Init { global, force } => {
                aipod_gateway::cli::commands::config::init(global, force)?;
            }
        },
    }

    Ok(true)
}
