use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::kernel::KernelError;

/// Number of cycles a process may run before it is placed at the back of the ready queue.
pub const ROUND_ROBIN_CYCLE_LIMIT: u64 = 30;

/// First pid handed out to a userspace process.
pub const INITIAL_USERSPACE_PID: u32 = 10;

/// Pid reported while the CPU runs the kernel idle process.
pub const IDLE_PID: u32 = 0;

pub const REGISTER_COUNT: usize = 16;

pub const DEFAULT_MEMORY_SIZE: usize = 256_000;

/// Rule used by the allocator to choose among candidate free intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FitPolicy {
    #[default]
    FirstFit,
    BestFit,
    WorstFit,
}

impl fmt::Display for FitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FitPolicy::FirstFit => write!(f, "first-fit"),
            FitPolicy::BestFit => write!(f, "best-fit"),
            FitPolicy::WorstFit => write!(f, "worst-fit"),
        }
    }
}

impl FromStr for FitPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first-fit" | "first" => Ok(FitPolicy::FirstFit),
            "best-fit" | "best" => Ok(FitPolicy::BestFit),
            "worst-fit" | "worst" => Ok(FitPolicy::WorstFit),
            other => Err(format!("unknown fit policy: {}", other)),
        }
    }
}

/// Construction parameters for the simulated machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub memory_size: usize,
    pub round_robin_cycle_limit: u64,
    pub fit_policy: FitPolicy,
}

impl Default for KernelConfig {
    fn default() -> Self {
        KernelConfig {
            memory_size: DEFAULT_MEMORY_SIZE,
            round_robin_cycle_limit: ROUND_ROBIN_CYCLE_LIMIT,
            fit_policy: FitPolicy::FirstFit,
        }
    }
}

impl KernelConfig {
    pub fn with_memory_size(memory_size: usize) -> KernelConfig {
        KernelConfig {
            memory_size,
            ..KernelConfig::default()
        }
    }

    /// Parses a JSON configuration. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<KernelConfig> {
        let config: KernelConfig = serde_json::from_str(json).context("Malformed kernel configuration")?;
        config.validate()?;

        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<KernelConfig> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read kernel configuration {}", path.display()))?;

        KernelConfig::from_json(&json).with_context(|| format!("Failed to load {}", path.display()))
    }

    pub fn validate(&self) -> std::result::Result<(), KernelError> {
        if self.memory_size == 0 {
            return Err(KernelError::InvalidConfig("memory size must be non-zero"));
        }
        if self.round_robin_cycle_limit == 0 {
            return Err(KernelError::InvalidConfig("round robin cycle limit must be non-zero"));
        }

        Ok(())
    }
}
