use gridtrain_cluster::Slurm;
use gridtrain_cluster::deploy::{CheckpointConverter, InferenceClient, ServerLauncher};

use crate::app_config::ClusterSettings;
use crate::tools::terminal::Terminal;

/// CLI-wide context: terminal frontend plus the cluster settings every
/// command reads its tool paths from.
pub struct CliContext {
    terminal: Terminal,
    settings: ClusterSettings,
}

impl CliContext {
    pub fn new(terminal: Terminal) -> Self {
        Self {
            terminal,
            settings: ClusterSettings::default(),
        }
    }

    pub fn init(mut self) -> Self {
        self.settings = ClusterSettings::load();
        self
    }

    pub fn terminal(&self) -> &Terminal {
        &self.terminal
    }

    pub fn settings(&self) -> &ClusterSettings {
        &self.settings
    }

    pub fn slurm(&self) -> Slurm {
        Slurm::with_binaries(
            self.settings.sbatch.clone(),
            self.settings.squeue.clone(),
            self.settings.scancel.clone(),
        )
    }

    pub fn converter(&self) -> CheckpointConverter {
        CheckpointConverter::new(&self.settings.converter)
    }

    pub fn server_launcher(&self) -> ServerLauncher {
        ServerLauncher::new(&self.settings.server)
    }

    pub fn inference_client(&self) -> InferenceClient {
        InferenceClient::new(&self.settings.endpoint, &self.settings.model)
    }
}
