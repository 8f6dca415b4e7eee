mod app_config;
mod commands;
mod context;
mod tools;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::context::CliContext;
use crate::tools::terminal::Terminal;

#[derive(Parser)]
#[command(
    name = "gridtrain",
    version,
    about = "Launch distributed GPT pretraining on a SLURM cluster and deploy trained checkpoints"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a job config and render its sbatch submission script
    Script(commands::script::ScriptArgs),
    /// Render a job script and submit it to the scheduler
    Submit(commands::submit::SubmitArgs),
    /// Show the scheduler queue for the current user
    Queue(commands::queue::QueueArgs),
    /// Cancel all queued jobs for the current user
    Cancel(commands::cancel::CancelArgs),
    /// Search a training log for a status marker
    Logs(commands::logs::LogsArgs),
    /// Remove checkpoint artifacts between experiments
    Clean(commands::clean::CleanArgs),
    /// Convert a checkpoint, launch the inference server, send requests
    Deploy(commands::deploy::DeployArgs),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let context = CliContext::new(Terminal::new()).init();

    match cli.command {
        Commands::Script(args) => commands::script::handle_command(args, context),
        Commands::Submit(args) => commands::submit::handle_command(args, context),
        Commands::Queue(args) => commands::queue::handle_command(args, context),
        Commands::Cancel(args) => commands::cancel::handle_command(args, context),
        Commands::Logs(args) => commands::logs::handle_command(args, context),
        Commands::Clean(args) => commands::clean::handle_command(args, context),
        Commands::Deploy(args) => commands::deploy::handle_command(args, context),
    }
}
