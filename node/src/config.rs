//! The per-instance configuration document.

use std::path::Path;

use anyhow::{Context, Result, bail};
use haforward_apply::{ApplyConfig, AutoReindexConfig};
use haforward_transport::ForwarderConfig;
use haforward_types::InstanceId;
use serde::{Deserialize, Serialize};

/// Everything one instance needs, loaded from a single JSON file.
///
/// Sections left out of the document take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HaConfig {
    /// Stable id of this instance. A fresh one is generated when absent,
    /// which is fine for HTTP and group delivery but breaks pub/sub
    /// self-exclusion across restarts.
    pub instance_id: Option<InstanceId>,
    pub forwarder: ForwarderConfig,
    pub apply: ApplyConfig,
    pub auto_reindex: AutoReindexConfig,
}

impl HaConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Invalid configuration document")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("Failed to load {}", path.display()))
    }

    /// The configured instance id, or a fresh one.
    pub fn instance_id(&self) -> InstanceId {
        self.instance_id.unwrap_or_default()
    }

    pub fn validate(&self) -> Result<()> {
        self.forwarder.validate().context("forwarder")?;

        if self.apply.index.max_tries == 0 {
            bail!("apply.index.max_tries must be at least 1");
        }
        if self.apply.threads == 0 || self.apply.batch_threads == 0 || self.apply.cache_threads == 0
        {
            bail!("apply thread pools must have at least 1 thread");
        }

        if self.auto_reindex.enabled {
            if self.auto_reindex.threads == 0 {
                bail!("auto_reindex.threads must be at least 1");
            }
            if self.auto_reindex.kinds.is_empty() {
                bail!("auto_reindex.kinds must name at least one entity kind");
            }
            if self.auto_reindex.data_dir.as_os_str().is_empty() {
                bail!("auto_reindex.data_dir must not be empty");
            }
        }
        Ok(())
    }
}
