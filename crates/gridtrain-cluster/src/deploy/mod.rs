//! Deployment of a trained checkpoint
//!
//! Three external collaborators, all opaque: the checkpoint converter CLI
//! (re-lays weights out for a given inference parallelism degree), the
//! inference server binary, and the server's HTTP infer endpoint.

pub mod client;

pub use client::{Generation, GenerationParams, InferenceClient};

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

#[derive(thiserror::Error, Debug)]
pub enum DeployError {
    #[error("failed to run `{tool}`: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{tool}` exited with status {code:?}: {stderr}")]
    ToolFailed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("inference request failed: {0}")]
    Http(#[from] Box<ureq::Error>),

    #[error("unexpected inference response: {0}")]
    BadResponse(String),

    #[error("target GPU count must be positive")]
    ZeroGpus,
}

/// Wrapper around the checkpoint conversion CLI.
#[derive(Debug, Clone)]
pub struct CheckpointConverter {
    binary: PathBuf,
}

impl CheckpointConverter {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Convert a training checkpoint into a layout for `n_inference_gpus`
    /// devices. The converter owns the format; we only pass paths through.
    pub fn convert(
        &self,
        checkpoint_dir: &Path,
        output_dir: &Path,
        n_inference_gpus: u32,
    ) -> Result<(), DeployError> {
        if n_inference_gpus == 0 {
            return Err(DeployError::ZeroGpus);
        }

        let tool = self.binary.display().to_string();
        tracing::info!(
            %tool,
            checkpoint = %checkpoint_dir.display(),
            output = %output_dir.display(),
            n_inference_gpus,
            "converting checkpoint"
        );

        let output = Command::new(&self.binary)
            .arg("--ckpt-dir")
            .arg(checkpoint_dir)
            .arg("--output-dir")
            .arg(output_dir)
            .arg("--n-inference-gpus")
            .arg(n_inference_gpus.to_string())
            .stdin(Stdio::null())
            .output()
            .map_err(|source| DeployError::Spawn {
                tool: tool.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(DeployError::ToolFailed {
                tool,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}

/// Running inference server process. Fire-and-forget: the classroom flow
/// backgrounds the server and leaves it up for the duration of the session.
#[derive(Debug)]
pub struct ServerHandle {
    child: Child,
}

impl ServerHandle {
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Kill the server process. Errors if it already exited.
    pub fn shutdown(mut self) -> std::io::Result<()> {
        self.child.kill()?;
        self.child.wait()?;
        Ok(())
    }
}

/// Launches the inference server binary against a model repository.
#[derive(Debug, Clone)]
pub struct ServerLauncher {
    binary: PathBuf,
}

impl ServerLauncher {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn launch(&self, model_repository: &Path) -> Result<ServerHandle, DeployError> {
        let tool = self.binary.display().to_string();
        let child = Command::new(&self.binary)
            .arg(format!("--model-repository={}", model_repository.display()))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| DeployError::Spawn { tool, source })?;

        tracing::info!(
            pid = child.id(),
            repository = %model_repository.display(),
            "inference server started"
        );

        Ok(ServerHandle { child })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_rejects_zero_gpus() {
        let converter = CheckpointConverter::new("/opt/ft/ckpt_convert");
        let err = converter
            .convert(Path::new("/ckpt"), Path::new("/out"), 0)
            .unwrap_err();
        assert!(matches!(err, DeployError::ZeroGpus));
    }

    #[test]
    fn test_convert_surfaces_spawn_failure() {
        let converter = CheckpointConverter::new("/nonexistent/ckpt_convert");
        let err = converter
            .convert(Path::new("/ckpt"), Path::new("/out"), 2)
            .unwrap_err();
        assert!(matches!(err, DeployError::Spawn { .. }));
    }

    #[test]
    fn test_launch_surfaces_spawn_failure() {
        let launcher = ServerLauncher::new("/nonexistent/tritonserver");
        let err = launcher.launch(Path::new("/models")).unwrap_err();
        assert!(matches!(err, DeployError::Spawn { .. }));
    }
}
