use clap::Args;
use colored::Colorize;

use crate::context::CliContext;

#[derive(Args, Debug)]
pub struct QueueArgs {
    /// Query a different user than the configured one
    #[arg(long)]
    pub user: Option<String>,
}

pub(crate) fn handle_command(args: QueueArgs, context: CliContext) -> anyhow::Result<()> {
    let terminal = context.terminal();
    terminal.command_title("Queue");

    let user = match args.user {
        Some(user) => user,
        None => context.settings().resolve_user()?,
    };

    let entries = context.slurm().queue(&user)?;

    if entries.is_empty() {
        terminal.finalize(&format!("No jobs queued for {}.", user));
        return Ok(());
    }

    for entry in &entries {
        terminal.print(&format!(
            "{}  {}  {}  {}  {}",
            entry.id.to_string().bold(),
            entry.name,
            entry.state,
            entry.elapsed,
            entry.nodes_or_reason.dimmed()
        ));
    }

    terminal.finalize(&format!(
        "{} job(s) queued for {}.",
        entries.len(),
        user
    ));

    Ok(())
}
