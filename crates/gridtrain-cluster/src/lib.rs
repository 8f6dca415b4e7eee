pub mod cleanup;
pub mod deploy;
pub mod job;
pub mod logs;
pub mod progress;
pub mod scheduler;

pub use job::{JobConfig, JobConfigError};
pub use scheduler::{JobId, Slurm};

pub type Result<T> = anyhow::Result<T>;
