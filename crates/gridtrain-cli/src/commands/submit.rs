use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, ValueHint};
use colored::Colorize;
use gridtrain_cluster::job::{JobConfig, script};
use gridtrain_cluster::logs::{LogQuery, Marker};
use gridtrain_cluster::progress::{CancelFlag, Reporter};
use gridtrain_cluster::scheduler::{PollEvent, WaitOutcome, WatchOptions};

use crate::commands::script::default_script_path;
use crate::context::CliContext;
use crate::tools::time::format_elapsed;

#[derive(Args, Debug)]
pub struct SubmitArgs {
    /// Path to the job config TOML
    #[arg(value_hint = ValueHint::FilePath)]
    pub config: PathBuf,
    /// Where to write the rendered script before submission
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    pub script: Option<PathBuf>,
    /// Stay attached and poll the queue until the job leaves it
    #[arg(long)]
    pub watch: bool,
    /// Seconds between queue polls while watching
    #[arg(long, default_value_t = 10)]
    pub poll_secs: u64,
    /// Give up watching after this many minutes (the job keeps running)
    #[arg(long)]
    pub timeout_mins: Option<u64>,
}

struct WatchReporter {
    spinner: cliclack::ProgressBar,
    job: String,
}

impl Reporter<PollEvent> for WatchReporter {
    fn report(&self, event: PollEvent) {
        let state = match &event.state {
            Some(state) => state.to_string(),
            None => "gone from queue".to_string(),
        };
        self.spinner.set_message(format!(
            "Job {} {} [{}]",
            self.job.bold(),
            state,
            format_elapsed(event.elapsed).dimmed()
        ));
    }
}

pub(crate) fn handle_command(args: SubmitArgs, context: CliContext) -> anyhow::Result<()> {
    let terminal = context.terminal();
    terminal.command_title("Submit pretraining job");

    let config = JobConfig::load(&args.config)
        .with_context(|| format!("job config at {} was rejected", args.config.display()))?;
    let data_parallel = config.data_parallel_size()?;
    terminal.print(&format!(
        "{}: data-parallel size {}, global batch {}",
        config, data_parallel, config.global_batch_size
    ));

    let rendered = script::render(&config)?;
    let script_path = args
        .script
        .unwrap_or_else(|| default_script_path(&args.config, &config));
    std::fs::write(&script_path, &rendered)
        .with_context(|| format!("failed to write script to {}", script_path.display()))?;

    let slurm = context.slurm();
    let id = slurm
        .submit(&script_path)
        .context("scheduler rejected the submission")?;
    terminal.print_success(&format!("Submitted batch job {}", id.to_string().bold()));

    if !args.watch {
        terminal.finalize(&format!(
            "Follow progress with: gridtrain logs {} iteration",
            config.log_file().display()
        ));
        return Ok(());
    }

    let cancel = CancelFlag::new();
    let handler_flag = cancel.clone();
    ctrlc::set_handler(move || handler_flag.cancel())
        .context("failed to install Ctrl-C handler")?;

    let spinner = terminal.spinner();
    spinner.start(format!("Watching job {}...", id));
    let reporter = Arc::new(WatchReporter {
        spinner: spinner.clone(),
        job: id.to_string(),
    });

    let options = WatchOptions {
        poll_interval: Duration::from_secs(args.poll_secs.max(1)),
        deadline: args.timeout_mins.map(|mins| Duration::from_secs(mins * 60)),
    };
    let user = context.settings().resolve_user()?;
    let outcome = slurm
        .watch(&user, id, &options, &cancel, Some(reporter))
        .context("queue polling failed")?;

    match outcome {
        WaitOutcome::Finished => {
            spinner.stop(format!("Job {} left the queue", id));
            inspect_finished_run(&config, &context)
        }
        WaitOutcome::TimedOut => {
            spinner.stop(format!("Job {} still queued after the timeout", id));
            terminal.finalize("Check the queue later with: gridtrain queue");
            Ok(())
        }
        WaitOutcome::Interrupted => {
            spinner.cancel("Watch interrupted");
            terminal.cancel_finalize(&format!(
                "Job {} keeps running; cancel it with: gridtrain cancel",
                id
            ));
            Ok(())
        }
    }
}

/// Once the job has left the queue only its log file tells success from
/// failure. A found error marker is reported for the operator to act on;
/// nothing is retried automatically.
fn inspect_finished_run(config: &JobConfig, context: &CliContext) -> anyhow::Result<()> {
    let terminal = context.terminal();
    let query = LogQuery::new(config.log_file());

    let errors: Vec<String> = match query.matching_marker(Marker::RuntimeError) {
        Ok(lines) => lines.take(5).collect(),
        Err(e) => {
            terminal.print_warning(&format!(
                "Could not read log {}: {}",
                query.path().display(),
                e
            ));
            terminal.finalize("Inspect the scheduler logs directly.");
            return Ok(());
        }
    };

    if !errors.is_empty() {
        for line in &errors {
            terminal.print_err(line);
        }
        terminal.cancel_finalize("Training run reported a runtime error.");
        anyhow::bail!("runtime error found in {}", query.path().display());
    }

    let last_iteration = query
        .matching_marker(Marker::Iteration)
        .ok()
        .and_then(|lines| lines.last());
    if let Some(line) = last_iteration {
        terminal.print(&line);
    }

    terminal.finalize("Training job finished.");
    Ok(())
}
