use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, HarnessResult};
use crate::supervisor::SupervisorConfig;

pub(crate) const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub(crate) const EXEC_BIN_NAME: &str = "harness-exec";

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    pub timeout_ms: u64,
    /// Execution binary. Defaults to `harness-exec` next to the running
    /// executable; bare names are looked up on `PATH`.
    pub exec_bin: Option<PathBuf>,
    pub exec_args: Vec<String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            exec_bin: None,
            exec_args: Vec::new(),
        }
    }
}

/// Load and validate a harness config from a YAML file.
///
/// A relative `exec_bin` containing a path separator is resolved against the
/// config file's parent directory.
pub async fn load(path: &Path) -> HarnessResult<HarnessConfig> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| HarnessError::Config(format!("read {}: {e}", path.display())))?;
    let mut config: HarnessConfig = if content.trim().is_empty() {
        HarnessConfig::default()
    } else {
        serde_yaml_ng::from_str(&content)
            .map_err(|e| HarnessError::Config(format!("parse {}: {e}", path.display())))?
    };
    if let Some(config_dir) = path.parent() {
        config.resolve_relative_paths(config_dir);
    }
    config.validate()?;
    Ok(config)
}

impl HarnessConfig {
    fn resolve_relative_paths(&mut self, config_dir: &Path) {
        if let Some(bin) = &mut self.exec_bin
            && bin.is_relative()
            && bin.components().count() > 1
        {
            *bin = config_dir.join(&*bin);
        }
    }

    pub fn validate(&self) -> HarnessResult<()> {
        if self.timeout_ms == 0 {
            return Err(HarnessError::Config(
                "timeout_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Locate the execution binary and build the supervisor settings.
    pub fn supervisor_config(&self) -> HarnessResult<SupervisorConfig> {
        self.validate()?;
        let requested = match &self.exec_bin {
            Some(bin) => bin.clone(),
            None => default_exec_bin()?,
        };
        let exec_bin = which::which(&requested).map_err(|e| {
            HarnessError::Config(format!("exec_bin {}: {e}", requested.display()))
        })?;
        Ok(SupervisorConfig {
            exec_bin,
            exec_args: self.exec_args.clone(),
            timeout: self.timeout(),
        })
    }
}

fn default_exec_bin() -> HarnessResult<PathBuf> {
    let current = std::env::current_exe()?;
    Ok(current.with_file_name(EXEC_BIN_NAME))
}
