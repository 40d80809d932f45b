use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::classify::ExtensionPlan;

use super::types::Config;

impl Config {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        debug!(path = %path.display(), "loading configuration");

        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        Self::from_yaml(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config =
            serde_yaml::from_str(yaml).context("failed to parse YAML configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.input.path.as_os_str().is_empty() {
            anyhow::bail!("input.path must be set");
        }
        if self.output.path.as_os_str().is_empty() {
            anyhow::bail!("output.path must be set");
        }

        // extension patterns must be well-formed before the run starts
        ExtensionPlan::from_patterns(&self.extensions.ranges)
            .context("invalid extensions.ranges")?;

        for number in &self.routing.numbers {
            if number.trim().is_empty() {
                anyhow::bail!("routing.numbers must not contain empty entries");
            }
        }

        info!("configuration validated successfully");
        Ok(())
    }
}
