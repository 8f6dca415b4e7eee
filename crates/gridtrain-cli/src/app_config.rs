//! Per-user CLI settings
//!
//! Cluster-specific knobs (tool paths, the inference endpoint, the SLURM
//! user) live in a small TOML file under the user's config directory so the
//! walkthrough commands stay short. Every field has a working default for
//! the classroom cluster layout.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSettings {
    /// SLURM user for queue queries and cancellation. Falls back to $USER.
    pub user: Option<String>,
    pub sbatch: String,
    pub squeue: String,
    pub scancel: String,
    /// Checkpoint conversion CLI.
    pub converter: String,
    /// Inference server binary.
    pub server: String,
    /// Inference server HTTP endpoint.
    pub endpoint: String,
    /// Model name served at the endpoint.
    pub model: String,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            user: None,
            sbatch: "sbatch".to_string(),
            squeue: "squeue".to_string(),
            scancel: "scancel".to_string(),
            converter: "gptj_ckpt_convert".to_string(),
            server: "tritonserver".to_string(),
            endpoint: "http://localhost:8000".to_string(),
            model: "ensemble".to_string(),
        }
    }
}

impl ClusterSettings {
    pub fn settings_path() -> Option<PathBuf> {
        let dirs = directories::ProjectDirs::from("dev", "gridtrain", "gridtrain")?;
        Some(dirs.config_dir().join("settings.toml"))
    }

    /// Load the settings file if it exists, defaults otherwise. A malformed
    /// file is reported and ignored rather than blocking every command.
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else {
            return Self::default();
        };
        let Ok(text) = fs::read_to_string(&path) else {
            return Self::default();
        };
        match toml::from_str(&text) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring malformed settings file");
                Self::default()
            }
        }
    }

    /// The SLURM user to operate as.
    pub fn resolve_user(&self) -> anyhow::Result<String> {
        if let Some(user) = &self.user {
            return Ok(user.clone());
        }
        std::env::var("USER")
            .map_err(|_| anyhow::anyhow!("no `user` in settings and $USER is not set"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_target_the_classroom_layout() {
        let settings = ClusterSettings::default();
        assert_eq!(settings.sbatch, "sbatch");
        assert_eq!(settings.endpoint, "http://localhost:8000");
        assert_eq!(settings.model, "ensemble");
    }

    #[test]
    fn test_partial_settings_file_keeps_defaults() {
        let settings: ClusterSettings =
            toml::from_str("user = \"student\"\nendpoint = \"http://head-node:8000\"").unwrap();
        assert_eq!(settings.user.as_deref(), Some("student"));
        assert_eq!(settings.endpoint, "http://head-node:8000");
        assert_eq!(settings.squeue, "squeue");
    }

    #[test]
    fn test_explicit_user_wins_over_env() {
        let settings = ClusterSettings {
            user: Some("student".to_string()),
            ..Default::default()
        };
        assert_eq!(settings.resolve_user().unwrap(), "student");
    }
}
