use clap::Args;

use crate::context::CliContext;

#[derive(Args, Debug)]
pub struct CancelArgs {
    /// Cancel jobs of a different user than the configured one
    #[arg(long)]
    pub user: Option<String>,
    /// Skip the confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,
}

pub(crate) fn handle_command(args: CancelArgs, context: CliContext) -> anyhow::Result<()> {
    let terminal = context.terminal();
    terminal.command_title("Cancel jobs");

    let user = match args.user {
        Some(user) => user,
        None => context.settings().resolve_user()?,
    };

    if !args.yes {
        let confirmed = terminal.confirm(&format!("Cancel every queued job for {}?", user))?;
        if !confirmed {
            terminal.cancel_finalize("Nothing cancelled.");
            return Ok(());
        }
    }

    context.slurm().cancel_user(&user)?;
    terminal.finalize(&format!("Cancelled all queued jobs for {}.", user));

    Ok(())
}
