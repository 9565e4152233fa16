//! Argon2 cost selection from host tiers and operator caps.

use super::probe::HostCapabilities;
use pw_common::{Error, Result};
use pw_config::HashCaps;
use serde::Serialize;

/// Memory cost tiers in KiB, by total memory.
pub const MEMORY_TIERS_KIB: [u32; 3] = [102_400, 256_000, 512_000];
/// Total memory (MiB) up to which the low and mid memory tiers apply.
pub const MEMORY_TIER_BOUNDS_MB: [u64; 2] = [4096, 8192];

/// Pass counts, by CPU frequency.
pub const TIME_TIERS: [u32; 3] = [1, 2, 3];
/// Frequency (MHz) up to which the low and mid time tiers apply.
pub const TIME_TIER_BOUNDS_MHZ: [f64; 2] = [1500.0, 2500.0];

/// Upper bound on lanes regardless of core count.
pub const MAX_PARALLELISM: u32 = 8;

/// Argon2 requires at least 8 KiB of memory per lane.
const MIN_KIB_PER_LANE: u32 = 8;

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HashParameters {
    /// Number of passes.
    pub time_cost: u32,
    /// Memory in KiB.
    pub memory_cost: u32,
    /// Number of lanes.
    pub parallelism: u32,
}

impl HashParameters {
    /// Pick parameters for `host`, never exceeding a non-zero cap.
    pub fn tune(host: &HostCapabilities, caps: &HashCaps) -> Self {
        let memory = if host.total_memory_mb <= MEMORY_TIER_BOUNDS_MB[0] {
            MEMORY_TIERS_KIB[0]
        } else if host.total_memory_mb <= MEMORY_TIER_BOUNDS_MB[1] {
            MEMORY_TIERS_KIB[1]
        } else {
            MEMORY_TIERS_KIB[2]
        };

        let time = if host.cpu_freq_mhz <= TIME_TIER_BOUNDS_MHZ[0] {
            TIME_TIERS[0]
        } else if host.cpu_freq_mhz <= TIME_TIER_BOUNDS_MHZ[1] {
            TIME_TIERS[1]
        } else {
            TIME_TIERS[2]
        };

        let lanes = host.physical_cores.clamp(1, MAX_PARALLELISM);

        let memory_cost = capped(memory, caps.memory_cost_cap);
        let time_cost = capped(time, caps.time_cost_cap);
        let mut parallelism = capped(lanes, caps.parallelism_cost_cap);

        // Meet Argon2's per-lane minimum by giving up lanes, not by raising memory.
        if memory_cost < MIN_KIB_PER_LANE * parallelism {
            parallelism = (memory_cost / MIN_KIB_PER_LANE).max(1);
        }

        HashParameters {
            time_cost,
            memory_cost,
            parallelism,
        }
    }

    pub fn to_argon2(self) -> Result<argon2::Params> {
        argon2::Params::new(self.memory_cost, self.time_cost, self.parallelism, None)
            .map_err(|e| Error::Hash(format!("invalid parameters {:?}: {}", self, e)))
    }
}

fn capped(value: u32, cap: u32) -> u32 {
    if cap == 0 {
        value
    } else {
        value.min(cap)
    }
}
