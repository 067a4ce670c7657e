//! Worker-count planning for trial execution.

use crate::codecs::{CodecSpec, HardwareVendor};

use serde::Serialize;
use std::fmt;

/// Why a requested worker count was reduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum CapReason {
    PhysicalCores { cores: usize },
    VendorSessionLimit { vendor: HardwareVendor, limit: usize },
}

impl fmt::Display for CapReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapReason::PhysicalCores { cores } => {
                write!(f, "limited to {cores} physical core(s)")
            }
            CapReason::VendorSessionLimit { vendor, limit } => {
                write!(f, "{vendor:?} encoders allow {limit} concurrent session(s)")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkerPlan {
    pub requested: usize,
    pub workers: usize,
    pub cap: Option<CapReason>,
}

impl WorkerPlan {
    pub fn is_capped(&self) -> bool {
        self.cap.is_some()
    }
}

/// Plans the trial worker count for `codec` on this machine.
pub fn plan_worker_count(requested: usize, codec: &CodecSpec) -> WorkerPlan {
    plan_worker_count_for(requested, num_cpus::get_physical(), codec)
}

/// Caps `requested` by `physical_cores` and by the codec vendor's session
/// limit, whichever is tighter. The cap is logged, never applied silently.
pub fn plan_worker_count_for(
    requested: usize,
    physical_cores: usize,
    codec: &CodecSpec,
) -> WorkerPlan {
    let requested = requested.max(1);
    let mut workers = requested;
    let mut cap = None;

    let cores = physical_cores.max(1);
    if workers > cores {
        workers = cores;
        cap = Some(CapReason::PhysicalCores { cores });
    }

    if let Some(vendor) = codec.hardware {
        if let Some(limit) = vendor.session_limit().filter(|limit| workers > *limit) {
            workers = limit;
            cap = Some(CapReason::VendorSessionLimit { vendor, limit });
        }
    }

    if let Some(reason) = cap {
        log::warn!(
            "Reducing parallel jobs for {} from {} to {}: {}",
            codec.name,
            requested,
            workers,
            reason
        );
    }

    WorkerPlan {
        requested,
        workers,
        cap,
    }
}
