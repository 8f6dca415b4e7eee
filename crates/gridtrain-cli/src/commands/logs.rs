use std::path::PathBuf;
use std::str::FromStr;

use clap::{Args, ValueHint};
use colored::Colorize;
use gridtrain_cluster::logs::{LogQuery, Marker};

use crate::context::CliContext;

#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Training log file to search
    #[arg(value_hint = ValueHint::FilePath)]
    pub file: PathBuf,
    /// Preset marker name (iteration, world-size, runtime-error, nccl) or a
    /// literal substring to search for
    pub marker: String,
}

/// Preset names resolve to the exact pattern the walkthrough greps for;
/// anything else is searched verbatim.
fn resolve_pattern(marker: &str) -> &str {
    match Marker::from_str(marker) {
        Ok(preset) => preset.pattern(),
        Err(_) => marker,
    }
}

pub(crate) fn handle_command(args: LogsArgs, context: CliContext) -> anyhow::Result<()> {
    let terminal = context.terminal();
    let pattern = resolve_pattern(&args.marker);

    let query = LogQuery::new(&args.file);
    let mut count = 0usize;
    for line in query.matching(pattern)? {
        println!("{line}");
        count += 1;
    }

    if count == 0 {
        terminal.print(&format!(
            "No lines matching {} in {}",
            pattern.bold(),
            args.file.display()
        ));
    }

    Ok(())
}
