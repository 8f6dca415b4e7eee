use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, ValueHint};
use gridtrain_cluster::job::{JobConfig, script};

use crate::context::CliContext;

#[derive(Args, Debug)]
pub struct ScriptArgs {
    /// Path to the job config TOML
    #[arg(value_hint = ValueHint::FilePath)]
    pub config: PathBuf,
    /// Where to write the rendered script (default: <run_name>.sh next to the config)
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    pub output: Option<PathBuf>,
    /// Print the script to stdout instead of writing a file
    #[arg(long)]
    pub stdout: bool,
}

/// Default script location for a config file: sibling `<run_name>.sh`.
pub fn default_script_path(config_path: &std::path::Path, config: &JobConfig) -> PathBuf {
    let dir = config_path.parent().unwrap_or_else(|| std::path::Path::new("."));
    dir.join(format!("{}.sh", config.run_name))
}

pub(crate) fn handle_command(args: ScriptArgs, context: CliContext) -> anyhow::Result<()> {
    let terminal = context.terminal();
    terminal.command_title("Render job script");

    let config = JobConfig::load(&args.config)
        .with_context(|| format!("job config at {} was rejected", args.config.display()))?;

    let data_parallel = config.data_parallel_size()?;
    terminal.print(&format!(
        "{}: {} total GPU(s), data-parallel size {}",
        config,
        config.total_gpus(),
        data_parallel
    ));

    let rendered = script::render(&config)?;

    if args.stdout {
        print!("{rendered}");
        return Ok(());
    }

    let output = args
        .output
        .unwrap_or_else(|| default_script_path(&args.config, &config));
    std::fs::write(&output, &rendered)
        .with_context(|| format!("failed to write script to {}", output.display()))?;

    terminal.print_success(&format!("Wrote {}", output.display()));
    terminal.finalize(&format!("Submit with: gridtrain submit {}", args.config.display()));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_script_path_uses_run_name() {
        let text = r#"
run_name = "log_2GPU"
nodes = 1
gpus_per_node = 2
tensor_parallel = 1
pipeline_parallel = 1
micro_batch_size = 2
global_batch_size = 16

[model]
num_layers = 12
hidden_size = 768
num_heads = 32
seq_length = 1024
vocab_size = 50257

[paths]
vocab_file = "v"
merge_file = "m"
data_path = "d"
checkpoint_dir = "c"
tensorboard_dir = "t"
log_dir = "l"
"#;
        let config = JobConfig::from_toml(text).unwrap();
        let path = default_script_path(std::path::Path::new("/dli/code/job.toml"), &config);
        assert_eq!(path, PathBuf::from("/dli/code/log_2GPU.sh"));
    }
}
