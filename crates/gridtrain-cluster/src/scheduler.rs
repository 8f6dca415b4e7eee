//! SLURM scheduler wrappers
//!
//! Thin shells around the `sbatch`, `squeue` and `scancel` binaries. The
//! scheduler stays an opaque collaborator: submission hands over a script
//! path and yields a job id, queue state is polled, cancellation is
//! delegated wholesale. Scheduler failures are kept distinct from anything
//! the training process itself does (those only ever surface in log files).

use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use strum::{Display, EnumString};

use crate::progress::{CancelFlag, Reporter};

#[derive(thiserror::Error, Debug)]
pub enum SchedulerError {
    #[error("failed to run `{tool}`: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("`{tool}` exited with status {code:?}: {stderr}")]
    CommandFailed {
        tool: &'static str,
        code: Option<i32>,
        stderr: String,
    },

    #[error("could not parse job id from sbatch output: {0:?}")]
    UnparseableJobId(String),

    #[error("could not parse squeue line: {0:?}")]
    UnparseableQueueLine(String),
}

/// Identifier assigned by the scheduler at submission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(pub u64);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Queue state codes as squeue reports them.
#[derive(Debug, Clone, PartialEq, Eq, Display, EnumString)]
pub enum JobState {
    #[strum(serialize = "PD")]
    Pending,
    #[strum(serialize = "R")]
    Running,
    #[strum(serialize = "CG")]
    Completing,
    #[strum(default)]
    Other(String),
}

/// One row of squeue output for the current user.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub id: JobId,
    pub name: String,
    pub state: JobState,
    pub elapsed: String,
    pub nodes_or_reason: String,
}

/// Emitted on every poll of the watch loop.
#[derive(Debug, Clone)]
pub struct PollEvent {
    pub elapsed: Duration,
    pub state: Option<JobState>,
}

/// How the watch loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome {
    /// The job left the queue (completed or failed; the log file tells which).
    Finished,
    TimedOut,
    Interrupted,
}

/// Options for the queue watch loop. No retry policy: one submission, one
/// watch, and the operator decides what happens next.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub poll_interval: Duration,
    pub deadline: Option<Duration>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            deadline: None,
        }
    }
}

/// Handle on the cluster scheduler CLI.
#[derive(Debug, Clone)]
pub struct Slurm {
    sbatch: String,
    squeue: String,
    scancel: String,
}

impl Default for Slurm {
    fn default() -> Self {
        Self {
            sbatch: "sbatch".to_string(),
            squeue: "squeue".to_string(),
            scancel: "scancel".to_string(),
        }
    }
}

impl Slurm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the scheduler binaries, e.g. to point at a wrapper script.
    pub fn with_binaries(sbatch: String, squeue: String, scancel: String) -> Self {
        Self {
            sbatch,
            squeue,
            scancel,
        }
    }

    /// Submit a rendered job script. Returns the scheduler-assigned job id.
    pub fn submit(&self, script: &Path) -> Result<JobId, SchedulerError> {
        let output = run_captured(Command::new(&self.sbatch).arg(script), "sbatch")?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        tracing::debug!(script = %script.display(), output = %stdout.trim(), "sbatch finished");
        parse_sbatch_output(&stdout)
    }

    /// Current queue for one user, one entry per job.
    pub fn queue(&self, user: &str) -> Result<Vec<QueueEntry>, SchedulerError> {
        let output = run_captured(
            Command::new(&self.squeue)
                .args(["--noheader", "-u", user, "-o", "%i %j %t %M %R"]),
            "squeue",
        )?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(parse_queue_line)
            .collect()
    }

    /// Whether a job is still known to the queue.
    pub fn is_queued(&self, user: &str, id: JobId) -> Result<bool, SchedulerError> {
        Ok(self.queue(user)?.iter().any(|entry| entry.id == id))
    }

    /// Cancel every job of the given user, the classroom `scancel -u $USER`.
    pub fn cancel_user(&self, user: &str) -> Result<(), SchedulerError> {
        run_captured(Command::new(&self.scancel).args(["-u", user]), "scancel")?;
        tracing::info!(user, "cancelled all queued jobs");
        Ok(())
    }

    /// Poll the queue until the job disappears, the deadline passes, or the
    /// operator cancels. Sleeps `poll_interval` between queries.
    pub fn watch(
        &self,
        user: &str,
        id: JobId,
        options: &WatchOptions,
        cancel: &CancelFlag,
        reporter: Option<Arc<dyn Reporter<PollEvent>>>,
    ) -> Result<WaitOutcome, SchedulerError> {
        let started = Instant::now();
        loop {
            if cancel.is_cancelled() {
                return Ok(WaitOutcome::Interrupted);
            }

            let state = self
                .queue(user)?
                .into_iter()
                .find(|entry| entry.id == id)
                .map(|entry| entry.state);

            if let Some(ref reporter) = reporter {
                reporter.report(PollEvent {
                    elapsed: started.elapsed(),
                    state: state.clone(),
                });
            }

            if state.is_none() {
                return Ok(WaitOutcome::Finished);
            }

            if let Some(deadline) = options.deadline {
                if started.elapsed() >= deadline {
                    return Ok(WaitOutcome::TimedOut);
                }
            }

            // Sleep in short slices so Ctrl-C is picked up promptly.
            let slice = options.poll_interval.min(Duration::from_millis(200));
            let sleep_until = Instant::now() + options.poll_interval;
            while Instant::now() < sleep_until {
                if cancel.is_cancelled() {
                    return Ok(WaitOutcome::Interrupted);
                }
                std::thread::sleep(slice);
            }
        }
    }
}

fn run_captured(command: &mut Command, tool: &'static str) -> Result<Output, SchedulerError> {
    let output = command
        .stdin(Stdio::null())
        .output()
        .map_err(|source| SchedulerError::Spawn { tool, source })?;

    if !output.status.success() {
        return Err(SchedulerError::CommandFailed {
            tool,
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(output)
}

fn parse_sbatch_output(stdout: &str) -> Result<JobId, SchedulerError> {
    // sbatch prints "Submitted batch job <id>" on success.
    stdout
        .lines()
        .find_map(|line| line.trim().strip_prefix("Submitted batch job "))
        .and_then(|id| id.trim().parse::<u64>().ok())
        .map(JobId)
        .ok_or_else(|| SchedulerError::UnparseableJobId(stdout.trim().to_string()))
}

fn parse_queue_line(line: &str) -> Result<QueueEntry, SchedulerError> {
    let mut fields = line.split_whitespace();
    let entry = (|| {
        let id = JobId(fields.next()?.parse::<u64>().ok()?);
        let name = fields.next()?.to_string();
        let state = JobState::from_str(fields.next()?).ok()?;
        let elapsed = fields.next()?.to_string();
        let nodes_or_reason = fields.collect::<Vec<_>>().join(" ");
        Some(QueueEntry {
            id,
            name,
            state,
            elapsed,
            nodes_or_reason,
        })
    })();
    entry.ok_or_else(|| SchedulerError::UnparseableQueueLine(line.to_string()))
}
