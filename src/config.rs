//! Configuration management for the saga orchestrator

use serde::{Deserialize, Serialize};

/// Main configuration for the saga orchestrator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Workflow submission settings
    #[serde(default)]
    pub workflow: WorkflowSettings,

    /// Messaging settings
    #[serde(default)]
    pub messaging: MessagingSettings,
}

/// Workflow submission settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSettings {
    /// Task queue the host schedules user-update workflows on
    pub task_queue: String,

    /// Deadline for the payment verification response, in milliseconds
    pub verification_timeout_ms: u64,
}

/// Messaging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingSettings {
    /// Buffer size of each in-memory broker channel
    pub channel_capacity: usize,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            task_queue: "USER_UPDATION".to_string(),
            verification_timeout_ms: 5_000,
        }
    }
}

impl Default for MessagingSettings {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from a file
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        let config = match path.as_ref().extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            Some("toml") => toml::from_str(&content)?,
            Some("yaml") | Some("yml") => serde_yml::from_str(&content)?,
            _ => return Err(anyhow::anyhow!("Unsupported config file format")),
        };
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file<P: AsRef<std::path::Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = match path.as_ref().extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::to_string_pretty(self)?,
            Some("toml") => toml::to_string(self)?,
            Some("yaml") | Some("yml") => serde_yml::to_string(self)?,
            _ => return Err(anyhow::anyhow!("Unsupported config file format")),
        };
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.workflow.task_queue.is_empty() {
            return Err(anyhow::anyhow!("Task queue name cannot be empty"));
        }

        if self.workflow.verification_timeout_ms == 0 {
            return Err(anyhow::anyhow!(
                "Verification timeout must be greater than 0"
            ));
        }

        if self.messaging.channel_capacity == 0 {
            return Err(anyhow::anyhow!("Channel capacity must be greater than 0"));
        }

        Ok(())
    }
}
