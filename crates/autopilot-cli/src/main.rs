mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{automation::AutomationSubcommand, config::ConfigSubcommand, logs::LogsSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "autopilot",
    about = "Execution pipeline for commands and automations — plans, retries, traces, statistics",
    version,
    propagate_version = true
)]
struct Cli {
    /// Workspace root (default: auto-detect from .autopilot/)
    #[arg(long, global = true, env = "AUTOPILOT_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize an autopilot workspace in the current directory
    Init,

    /// Execute an ad-hoc plan (estimates impact and dry-runs first)
    Run {
        /// Plan file (YAML or JSON)
        #[arg(long, conflicts_with = "command")]
        plan: Option<PathBuf>,

        /// Natural-language command, interpreted via AUTOPILOT_INTENT_URL
        #[arg(long)]
        command: Option<String>,

        /// Sandbox only: never touch a mutating executor entry point
        #[arg(long)]
        test: bool,

        /// Skip the confirmation prompt and execute immediately
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Manage stored automations
    Automation {
        #[command(subcommand)]
        subcommand: AutomationSubcommand,
    },

    /// Inspect execution logs and traces
    Logs {
        #[command(subcommand)]
        subcommand: LogsSubcommand,
    },

    /// Show per-automation run statistics
    Stats { slug: String },

    /// Validate the workspace configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Start the HTTP API server
    Serve {
        /// Port to listen on (0 = OS-assigned)
        #[arg(long, default_value = "4180")]
        port: u16,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Run {
            plan,
            command,
            test,
            yes,
        } => cmd::run::run(&root, plan.as_deref(), command.as_deref(), test, yes, cli.json),
        Commands::Automation { subcommand } => cmd::automation::run(&root, subcommand, cli.json),
        Commands::Logs { subcommand } => cmd::logs::run(&root, subcommand, cli.json),
        Commands::Stats { slug } => cmd::stats::run(&root, &slug, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
        Commands::Serve { port } => cmd::serve::run(&root, port),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
