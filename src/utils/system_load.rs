//! System load sampling for adaptive concurrency
//!
//! The concurrency controller only needs two numbers per sample: how full
//! system memory is and how busy the CPUs are. [`SystemLoadSampler`] reads
//! them through sysinfo; tests substitute their own [`LoadSampler`].

use async_trait::async_trait;
use std::sync::Arc;
use sysinfo::System;
use tokio::sync::RwLock;
use tracing::trace;

/// One observation of system resource usage
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadSample {
    /// System memory usage percentage (0-100)
    pub memory_percent: f64,
    /// Global CPU usage percentage (0-100)
    pub cpu_percent: f64,
}

impl LoadSample {
    pub fn new(memory_percent: f64, cpu_percent: f64) -> Self {
        Self {
            memory_percent,
            cpu_percent,
        }
    }

    /// True when either reading is above its threshold
    pub fn exceeds(&self, memory_threshold: f64, cpu_threshold: f64) -> bool {
        self.memory_percent > memory_threshold || self.cpu_percent > cpu_threshold
    }
}

/// Source of load samples
#[async_trait]
pub trait LoadSampler: Send + Sync {
    async fn sample(&self) -> LoadSample;
}

/// Load sampler backed by a shared sysinfo [`System`]
#[derive(Clone)]
pub struct SystemLoadSampler {
    system: Arc<RwLock<System>>,
}

impl SystemLoadSampler {
    pub fn new() -> Self {
        Self::with_system(Arc::new(RwLock::new(System::new())))
    }

    /// Share an existing system instance to avoid duplicate refresh work
    pub fn with_system(system: Arc<RwLock<System>>) -> Self {
        Self { system }
    }
}

impl Default for SystemLoadSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SystemLoadSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemLoadSampler").finish_non_exhaustive()
    }
}

#[async_trait]
impl LoadSampler for SystemLoadSampler {
    async fn sample(&self) -> LoadSample {
        let mut system = self.system.write().await;
        system.refresh_memory();
        system.refresh_cpu_usage();

        let total_memory = system.total_memory() as f64;
        let memory_percent = if total_memory > 0.0 {
            (system.used_memory() as f64 / total_memory) * 100.0
        } else {
            0.0
        };
        let cpu_percent = system.global_cpu_usage() as f64;

        trace!(
            "System load sampled: memory {:.1}%, cpu {:.1}%",
            memory_percent, cpu_percent
        );

        LoadSample::new(memory_percent, cpu_percent)
    }
}
