//! Host capability probes feeding hash parameter tuning.

use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use tracing::trace;

/// What the machine can afford for password hashing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HostCapabilities {
    pub physical_cores: u32,
    pub total_memory_mb: u64,
    pub cpu_freq_mhz: f64,
}

/// Source of [`HostCapabilities`].
pub trait HostProbe: Send + Sync + std::fmt::Debug {
    fn probe(&self) -> HostCapabilities;
}

/// Fixed capabilities, for tests and for callers that probe elsewhere.
#[derive(Debug, Clone, Copy)]
pub struct StaticHostProbe(pub HostCapabilities);

impl StaticHostProbe {
    pub fn new(physical_cores: u32, total_memory_mb: u64, cpu_freq_mhz: f64) -> Self {
        StaticHostProbe(HostCapabilities {
            physical_cores,
            total_memory_mb,
            cpu_freq_mhz,
        })
    }
}

impl HostProbe for StaticHostProbe {
    fn probe(&self) -> HostCapabilities {
        self.0
    }
}

/// Reads `/proc` and `/sys`.
#[derive(Debug, Clone)]
pub struct ProcHostProbe {
    proc_root: PathBuf,
    sys_root: PathBuf,
}

impl Default for ProcHostProbe {
    fn default() -> Self {
        ProcHostProbe {
            proc_root: PathBuf::from("/proc"),
            sys_root: PathBuf::from("/sys"),
        }
    }
}

impl ProcHostProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe alternate roots (fixture trees in tests).
    pub fn with_roots(proc_root: impl Into<PathBuf>, sys_root: impl Into<PathBuf>) -> Self {
        ProcHostProbe {
            proc_root: proc_root.into(),
            sys_root: sys_root.into(),
        }
    }

    fn physical_cores(&self, cpuinfo: Option<&str>) -> u32 {
        if let Some(n) = cpuinfo.and_then(parse_physical_cores) {
            return n;
        }
        if let Some(n) = cpuinfo.map(count_processors).filter(|n| *n > 0) {
            return n;
        }
        std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(1)
    }

    fn cpu_freq_mhz(&self, cpuinfo: Option<&str>) -> f64 {
        let sysfs = self
            .sys_root
            .join("devices/system/cpu/cpu0/cpufreq/scaling_cur_freq");
        if let Some(khz) = fs::read_to_string(sysfs)
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
        {
            return khz as f64 / 1000.0;
        }
        cpuinfo.and_then(parse_cpu_mhz).unwrap_or(0.0)
    }
}

impl HostProbe for ProcHostProbe {
    fn probe(&self) -> HostCapabilities {
        let cpuinfo = fs::read_to_string(self.proc_root.join("cpuinfo")).ok();
        let meminfo = fs::read_to_string(self.proc_root.join("meminfo")).ok();

        let caps = HostCapabilities {
            physical_cores: self.physical_cores(cpuinfo.as_deref()),
            total_memory_mb: meminfo.as_deref().and_then(parse_mem_total_mb).unwrap_or(0),
            cpu_freq_mhz: self.cpu_freq_mhz(cpuinfo.as_deref()),
        };
        trace!(?caps, "probed host");
        caps
    }
}

/// Distinct (physical id, core id) pairs in `/proc/cpuinfo`.
pub fn parse_physical_cores(cpuinfo: &str) -> Option<u32> {
    let mut cores = HashSet::new();
    for block in cpuinfo.split("\n\n") {
        let mut physical = None;
        let mut core = None;
        for line in block.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            match key.trim() {
                "physical id" => physical = value.trim().parse::<u32>().ok(),
                "core id" => core = value.trim().parse::<u32>().ok(),
                _ => {}
            }
        }
        if let (Some(p), Some(c)) = (physical, core) {
            cores.insert((p, c));
        }
    }
    (!cores.is_empty()).then(|| cores.len() as u32)
}

fn count_processors(cpuinfo: &str) -> u32 {
    cpuinfo
        .lines()
        .filter(|line| line.starts_with("processor"))
        .count() as u32
}

/// Mean of the `cpu MHz` lines in `/proc/cpuinfo`.
pub fn parse_cpu_mhz(cpuinfo: &str) -> Option<f64> {
    let values: Vec<f64> = cpuinfo
        .lines()
        .filter(|line| line.starts_with("cpu MHz"))
        .filter_map(|line| line.split_once(':')?.1.trim().parse().ok())
        .collect();
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// `MemTotal` from `/proc/meminfo`, in MiB.
pub fn parse_mem_total_mb(meminfo: &str) -> Option<u64> {
    meminfo.lines().find_map(|line| {
        let rest = line.strip_prefix("MemTotal:")?;
        let kb: u64 = rest.split_whitespace().next()?.parse().ok()?;
        Some(kb / 1024)
    })
}
