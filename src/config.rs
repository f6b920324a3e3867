//! Run configuration: scheduler tuning and benchmark descriptions.

use crate::blocks::DEFAULT_MEASURE_EVERY;
use crate::error::ConfigError;
use serde::Deserialize;
use std::time::Duration;

/// Scheduler tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Requested items per connection buffer, before quantum rounding.
    pub buffer_capacity: usize,
    /// Idle rounds a worker yields before it starts sleeping.
    pub spin_rounds: u32,
    /// Sleep between idle rounds once spinning gave up.
    pub idle_sleep: Duration,
    /// Pin job-list worker `i` to CPU core `i`.
    pub pin_cores: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 32_768,
            spin_rounds: 64,
            idle_sleep: Duration::from_micros(50),
            pin_cores: false,
        }
    }
}

impl SchedulerConfig {
    /// Same defaults with a different buffer size.
    pub fn with_buffer_capacity(buffer_capacity: usize) -> Self {
        Self {
            buffer_capacity,
            ..Self::default()
        }
    }

    /// Same settings with job-list workers pinned to cores.
    pub fn pinned(self) -> Self {
        Self {
            pin_cores: true,
            ..self
        }
    }
}

/// Benchmark topology and placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BenchMode {
    /// Whole chain on one worker.
    SingleCore,
    /// Chain split into contiguous runs, one job list per core.
    MultiKernel,
    /// Chain scheduled by a pool of `num_cpus` threads.
    MultiKernelSimple,
}

/// Benchmark description, usually read from TOML.
///
/// ```toml
/// mode = "multi-kernel"
/// num_kernels = 8
/// num_cpus = 4
/// limit = 100000000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BenchConfig {
    /// Topology and placement.
    pub mode: BenchMode,
    /// Saxpy stages in the chain.
    pub num_kernels: usize,
    /// Workers for the multi-kernel modes.
    pub num_cpus: usize,
    /// Requested items per connection buffer.
    pub buffer_capacity: usize,
    /// Items between throughput reports.
    pub measure_every: u64,
    /// Stop after this many items; runs forever when absent.
    pub limit: Option<u64>,
    /// Seed for the random coefficients; drawn from the OS when absent.
    pub seed: Option<u64>,
    /// Pin each multi-kernel job list to its own core.
    pub pin_cores: bool,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            mode: BenchMode::SingleCore,
            num_kernels: 1,
            num_cpus: 1,
            buffer_capacity: SchedulerConfig::default().buffer_capacity,
            measure_every: DEFAULT_MEASURE_EVERY,
            limit: None,
            seed: None,
            pin_cores: true,
        }
    }
}

impl BenchConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations that cannot be built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_kernels == 0 {
            return Err(ConfigError::Invalid("num_kernels must be at least 1".into()));
        }
        if self.num_cpus == 0 {
            return Err(ConfigError::Invalid("num_cpus must be at least 1".into()));
        }
        if self.buffer_capacity == 0 {
            return Err(ConfigError::Invalid(
                "buffer_capacity must be at least 1".into(),
            ));
        }
        if self.measure_every == 0 {
            return Err(ConfigError::Invalid("measure_every must be at least 1".into()));
        }
        Ok(())
    }

    /// Scheduler settings implied by this benchmark.
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig::with_buffer_capacity(self.buffer_capacity)
    }
}
