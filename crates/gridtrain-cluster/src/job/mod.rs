//! Pretraining job configuration
//!
//! A [`JobConfig`] is the single structured entity of the system: a flat
//! record of everything a submission script needs. It is parsed from TOML,
//! validated against the constraints the training framework would otherwise
//! reject at launch time, and rendered once into an sbatch script.

pub mod script;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Error raised when a job configuration cannot be accepted for submission.
///
/// Classroom configs intentionally ship with blank fields for the learner to
/// fill in; those surface here instead of producing a broken script.
#[derive(thiserror::Error, Debug)]
pub enum JobConfigError {
    #[error("required field `{0}` is missing or empty")]
    MissingField(&'static str),

    #[error("field `{0}` must be a positive value")]
    NonPositive(&'static str),

    #[error("field `{field}` must lie in (0, 1), got {value}")]
    OutOfRange { field: &'static str, value: f64 },

    #[error(
        "tensor-parallel size {tensor} x pipeline-parallel size {pipeline} does not evenly divide {total_gpus} total GPUs"
    )]
    GpuSplit {
        total_gpus: u32,
        tensor: u32,
        pipeline: u32,
    },

    #[error(
        "global batch size {global} is not a multiple of micro batch size {micro} x data-parallel size {data_parallel}"
    )]
    BatchSplit {
        global: u32,
        micro: u32,
        data_parallel: u32,
    },

    #[error("failed to read job config at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse job config: {0}")]
    Parse(#[from] Box<toml::de::Error>),
}

/// Learning-rate decay schedule passed through to the trainer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LrDecayStyle {
    Constant,
    Linear,
    Cosine,
}

/// Optimizer hyperparameters. Defaults match the values the classroom
/// scripts never vary between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub lr: f64,
    pub min_lr: f64,
    pub adam_beta1: f64,
    pub adam_beta2: f64,
    pub adam_eps: f64,
    pub lr_decay_style: LrDecayStyle,
    pub lr_decay_iters: u32,
    pub lr_warmup_fraction: f64,
    pub clip_grad: f64,
    pub weight_decay: f64,
    pub exit_duration_mins: u32,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            lr: 6e-5,
            min_lr: 6e-6,
            adam_beta1: 0.9,
            adam_beta2: 0.95,
            adam_eps: 1e-8,
            lr_decay_style: LrDecayStyle::Cosine,
            lr_decay_iters: 800,
            lr_warmup_fraction: 0.01,
            clip_grad: 1.0,
            weight_decay: 0.1,
            exit_duration_mins: 1190,
        }
    }
}

/// Model architecture sizes forwarded to the trainer unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub num_layers: u32,
    pub hidden_size: u32,
    pub num_heads: u32,
    pub seq_length: u32,
    pub vocab_size: u32,
}

/// File layout consumed and produced by the external frameworks. All paths
/// are opaque and passed through as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPaths {
    pub vocab_file: String,
    pub merge_file: String,
    pub data_path: String,
    pub checkpoint_dir: String,
    pub tensorboard_dir: String,
    pub log_dir: String,
}

/// Logging and evaluation cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub log_interval: u32,
    pub save_interval: u32,
    pub eval_interval: u32,
    pub eval_iters: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            log_interval: 10,
            save_interval: 300,
            eval_interval: 1000,
            eval_iters: 10,
        }
    }
}

fn default_cpus_per_task() -> u32 {
    32
}

fn default_master_port() -> u16 {
    6000
}

fn default_train_iters() -> u32 {
    100
}

/// Flat description of one distributed pretraining run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Run name, also the basename of the combined log file.
    pub run_name: String,
    pub nodes: u32,
    pub gpus_per_node: u32,
    #[serde(default = "default_cpus_per_task")]
    pub cpus_per_task: u32,
    pub tensor_parallel: u32,
    pub pipeline_parallel: u32,
    pub micro_batch_size: u32,
    pub global_batch_size: u32,
    #[serde(default = "default_train_iters")]
    pub train_iters: u32,
    #[serde(default = "default_master_port")]
    pub master_port: u16,
    pub model: ModelConfig,
    pub paths: DataPaths,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl JobConfig {
    /// Load and validate a job config from a TOML file.
    pub fn load(path: &Path) -> Result<Self, JobConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| JobConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a job config from TOML text without validating it.
    pub fn from_toml(text: &str) -> Result<Self, JobConfigError> {
        toml::from_str(text).map_err(|e| JobConfigError::Parse(Box::new(e)))
    }

    pub fn total_gpus(&self) -> u32 {
        self.nodes * self.gpus_per_node
    }

    /// Data-parallel size derived from the GPU split. Errors if the tensor
    /// and pipeline sizes do not evenly divide the total GPU count.
    pub fn data_parallel_size(&self) -> Result<u32, JobConfigError> {
        let total = self.total_gpus();
        let model_parallel = self.tensor_parallel * self.pipeline_parallel;
        if model_parallel == 0 || total % model_parallel != 0 || total / model_parallel == 0 {
            return Err(JobConfigError::GpuSplit {
                total_gpus: total,
                tensor: self.tensor_parallel,
                pipeline: self.pipeline_parallel,
            });
        }
        Ok(total / model_parallel)
    }

    /// Check every invariant the external trainer would enforce, so a bad
    /// config fails here instead of minutes into a queued job.
    pub fn validate(&self) -> Result<(), JobConfigError> {
        if self.run_name.trim().is_empty() {
            return Err(JobConfigError::MissingField("run_name"));
        }

        let counts: [(&'static str, u32); 13] = [
            ("nodes", self.nodes),
            ("gpus_per_node", self.gpus_per_node),
            ("cpus_per_task", self.cpus_per_task),
            ("tensor_parallel", self.tensor_parallel),
            ("pipeline_parallel", self.pipeline_parallel),
            ("micro_batch_size", self.micro_batch_size),
            ("global_batch_size", self.global_batch_size),
            ("train_iters", self.train_iters),
            ("model.num_layers", self.model.num_layers),
            ("model.hidden_size", self.model.hidden_size),
            ("model.num_heads", self.model.num_heads),
            ("model.seq_length", self.model.seq_length),
            ("model.vocab_size", self.model.vocab_size),
        ];
        for (field, value) in counts {
            if value == 0 {
                return Err(JobConfigError::NonPositive(field));
            }
        }
        if self.master_port == 0 {
            return Err(JobConfigError::NonPositive("master_port"));
        }

        self.validate_paths()?;
        self.optimizer.validate()?;

        let data_parallel = self.data_parallel_size()?;
        let replica_batch = self.micro_batch_size * data_parallel;
        if self.global_batch_size % replica_batch != 0 {
            return Err(JobConfigError::BatchSplit {
                global: self.global_batch_size,
                micro: self.micro_batch_size,
                data_parallel,
            });
        }

        Ok(())
    }

    fn validate_paths(&self) -> Result<(), JobConfigError> {
        let paths: [(&'static str, &str); 6] = [
            ("paths.vocab_file", &self.paths.vocab_file),
            ("paths.merge_file", &self.paths.merge_file),
            ("paths.data_path", &self.paths.data_path),
            ("paths.checkpoint_dir", &self.paths.checkpoint_dir),
            ("paths.tensorboard_dir", &self.paths.tensorboard_dir),
            ("paths.log_dir", &self.paths.log_dir),
        ];
        for (field, value) in paths {
            if value.trim().is_empty() {
                return Err(JobConfigError::MissingField(field));
            }
        }
        Ok(())
    }

    /// Path of the combined stdout/stderr log the launched job appends to.
    pub fn log_file(&self) -> PathBuf {
        Path::new(&self.paths.log_dir).join(format!("{}.txt", self.run_name))
    }
}

impl OptimizerConfig {
    fn validate(&self) -> Result<(), JobConfigError> {
        let positives: [(&'static str, f64); 5] = [
            ("optimizer.lr", self.lr),
            ("optimizer.min_lr", self.min_lr),
            ("optimizer.adam_eps", self.adam_eps),
            ("optimizer.clip_grad", self.clip_grad),
            ("optimizer.weight_decay", self.weight_decay),
        ];
        for (field, value) in positives {
            if !(value > 0.0) {
                return Err(JobConfigError::NonPositive(field));
            }
        }

        let fractions: [(&'static str, f64); 3] = [
            ("optimizer.adam_beta1", self.adam_beta1),
            ("optimizer.adam_beta2", self.adam_beta2),
            ("optimizer.lr_warmup_fraction", self.lr_warmup_fraction),
        ];
        for (field, value) in fractions {
            if !(value > 0.0 && value < 1.0) {
                return Err(JobConfigError::OutOfRange { field, value });
            }
        }

        if self.lr_decay_iters == 0 {
            return Err(JobConfigError::NonPositive("optimizer.lr_decay_iters"));
        }

        Ok(())
    }
}

impl fmt::Display for JobConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} node(s) x {} GPU(s), TP={} PP={})",
            self.run_name, self.nodes, self.gpus_per_node, self.tensor_parallel, self.pipeline_parallel
        )
    }
}
