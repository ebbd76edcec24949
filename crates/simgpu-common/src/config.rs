//! ---
//! simgpu_section: "01-core-functionality"
//! simgpu_subsection: "module"
//! simgpu_type: "source"
//! simgpu_scope: "code"
//! simgpu_description: "Shared primitives and utilities for the device harness."
//! simgpu_version: "v0.0.0-prealpha"
//! simgpu_owner: "tbd"
//! ---
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use tracing::debug;

use crate::logging::LogFormat;

pub const PAGE_SIZE_4K: u64 = 4 << 10;
pub const PAGE_SIZE_64K: u64 = 64 << 10;
pub const PAGE_SIZE_2M: u64 = 2 << 20;

fn default_device_name() -> String {
    "mock".to_owned()
}

fn default_engines() -> Vec<EngineConfig> {
    vec![EngineConfig {
        name: "rcs0".to_owned(),
    }]
}

fn default_workqueue_name() -> String {
    "mock".to_owned()
}

fn default_priority_levels() -> u32 {
    3
}

fn default_regions() -> Vec<String> {
    vec!["smem".to_owned()]
}

fn default_page_sizes() -> Vec<u64> {
    vec![PAGE_SIZE_4K, PAGE_SIZE_64K, PAGE_SIZE_2M]
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

fn default_workload_requests() -> usize {
    64
}

fn default_workload_producers() -> usize {
    2
}

fn default_workload_max_delay() -> Duration {
    Duration::from_millis(2)
}

fn default_workload_seed() -> u64 {
    0x5EED_u64
}

/// Primary configuration object for a simulated device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "default_device_name")]
    pub name: String,
    #[serde(default = "default_engines")]
    pub engines: Vec<EngineConfig>,
    #[serde(default)]
    pub workqueue: WorkqueueConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub flush: FlushConfig,
    #[serde(default)]
    pub faults: FaultConfig,
    #[serde(default)]
    pub workload: WorkloadConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metadata describing where a [`DeviceConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedDeviceConfig {
    pub config: DeviceConfig,
    pub source: PathBuf,
}

impl DeviceConfig {
    pub const ENV_CONFIG_PATH: &'static str = "SIMGPU_CONFIG";

    /// Load configuration from disk, respecting the `SIMGPU_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedDeviceConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedDeviceConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedDeviceConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    /// Parse and validate a single configuration file.
    pub fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<DeviceConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(anyhow!("device name must not be empty"));
        }
        if self.engines.is_empty() {
            return Err(anyhow!("configuration must declare at least one engine"));
        }
        let mut seen = HashSet::new();
        for engine in &self.engines {
            if engine.name.trim().is_empty() {
                return Err(anyhow!("engine names must not be empty"));
            }
            if !seen.insert(engine.name.as_str()) {
                return Err(anyhow!("engine '{}' declared more than once", engine.name));
            }
        }
        if self.scheduler.priority_levels == 0 {
            return Err(anyhow!("scheduler.priority_levels must be at least 1"));
        }
        if self.memory.regions.is_empty() {
            return Err(anyhow!("memory.regions must name at least one region"));
        }
        if let Some(size) = self
            .memory
            .page_sizes
            .iter()
            .find(|size| !size.is_power_of_two())
        {
            return Err(anyhow!("page size {} is not a power of two", size));
        }
        self.faults.validate()?;
        Ok(())
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: default_device_name(),
            engines: default_engines(),
            workqueue: WorkqueueConfig::default(),
            scheduler: SchedulerConfig::default(),
            memory: MemoryConfig::default(),
            flush: FlushConfig::default(),
            faults: FaultConfig::default(),
            workload: WorkloadConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl std::str::FromStr for DeviceConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: DeviceConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkqueueConfig {
    #[serde(default = "default_workqueue_name")]
    pub name: String,
}

impl Default for WorkqueueConfig {
    fn default() -> Self {
        Self {
            name: default_workqueue_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_priority_levels")]
    pub priority_levels: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            priority_levels: default_priority_levels(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_regions")]
    pub regions: Vec<String>,
    #[serde(default = "default_page_sizes")]
    pub page_sizes: Vec<u64>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            regions: default_regions(),
            page_sizes: default_page_sizes(),
        }
    }
}

/// Flush budgets. `None` means wait as long as needed.
#[serde_as]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlushConfig {
    #[serde(default, rename = "timeout_ms")]
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    pub timeout: Option<Duration>,
    #[serde(default, rename = "teardown_timeout_ms")]
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    pub teardown_timeout: Option<Duration>,
}

/// Fault injection knobs used by tests and the fault sweep.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FaultConfig {
    #[serde(default)]
    pub fail_stage: Option<String>,
    #[serde(default)]
    pub fail_release: Option<String>,
}

impl FaultConfig {
    fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("faults.fail_stage", &self.fail_stage),
            ("faults.fail_release", &self.fail_release),
        ] {
            if matches!(value, Some(stage) if stage.trim().is_empty()) {
                return Err(anyhow!("{} must name a stage when set", key));
            }
        }
        Ok(())
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadConfig {
    #[serde(default = "default_workload_requests")]
    pub requests: usize,
    #[serde(default = "default_workload_producers")]
    pub producers: usize,
    #[serde(default = "default_workload_max_delay", rename = "max_delay_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub max_delay: Duration,
    #[serde(default = "default_workload_seed")]
    pub seed: u64,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            requests: default_workload_requests(),
            producers: default_workload_producers(),
            max_delay: default_workload_max_delay(),
            seed: default_workload_seed(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}
