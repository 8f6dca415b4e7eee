use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, ValueHint};
use gridtrain_cluster::cleanup::{CheckpointStore, format_bytes};
use gridtrain_cluster::job::JobConfig;

use crate::context::CliContext;

#[derive(Args, Debug)]
pub struct CleanArgs {
    /// Job config whose checkpoint directory should be purged
    #[arg(long, value_hint = ValueHint::FilePath, conflicts_with = "dir")]
    pub config: Option<PathBuf>,
    /// Checkpoint directory to purge directly
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub dir: Option<PathBuf>,
}

pub(crate) fn handle_command(args: CleanArgs, context: CliContext) -> anyhow::Result<()> {
    let terminal = context.terminal();
    terminal.command_title("Clean checkpoints");

    let root = match (args.dir, args.config) {
        (Some(dir), _) => dir,
        (None, Some(config_path)) => {
            let config = JobConfig::load(&config_path).with_context(|| {
                format!("job config at {} was rejected", config_path.display())
            })?;
            PathBuf::from(config.paths.checkpoint_dir)
        }
        (None, None) => anyhow::bail!("pass either --config or --dir"),
    };

    let store = CheckpointStore::new(&root);

    let spinner = terminal.spinner();
    spinner.start("Calculating space usage...");
    let usage = store.usage().unwrap_or(0);

    if usage == 0 {
        spinner.stop("Nothing to clean.");
        terminal.finalize("Clean completed.");
        return Ok(());
    }

    spinner.set_message("Removing checkpoint artifacts...");
    let report = store
        .purge()
        .with_context(|| format!("failed to purge {}", root.display()))?;

    spinner.stop(format!(
        "Removed {} entr{}, freed {}",
        report.removed_entries,
        if report.removed_entries == 1 { "y" } else { "ies" },
        format_bytes(report.freed_bytes)
    ));
    terminal.finalize("Clean completed successfully.");

    Ok(())
}
