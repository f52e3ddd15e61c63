use nix::sched::{sched_getaffinity, sched_setaffinity, CpuSet};
use nix::unistd::Pid;

use crate::error::{ChaSliceError, Result};

fn single_cpu_set(cpu: usize) -> Result<CpuSet> {
    let mut set = CpuSet::new();
    set.set(cpu).map_err(|e| {
        ChaSliceError::AffinityError(format!("Failed to set CPU {cpu} in set: {e}"))
    })?;
    Ok(set)
}

/// Pins the calling thread to one CPU and restores the previous mask on drop
pub struct AffinityGuard {
    old_affinity: CpuSet,
    cpu: usize,
}

impl AffinityGuard {
    pub fn new(cpu: usize) -> Result<Self> {
        let old_affinity = sched_getaffinity(Pid::from_raw(0))
            .map_err(|e| ChaSliceError::AffinityError(format!("Failed to get affinity: {e}")))?;

        pin_current_thread(cpu)?;

        Ok(Self { old_affinity, cpu })
    }

    pub fn cpu(&self) -> usize {
        self.cpu
    }
}

impl Drop for AffinityGuard {
    fn drop(&mut self) {
        if let Err(e) = sched_setaffinity(Pid::from_raw(0), &self.old_affinity) {
            tracing::warn!("Failed to restore affinity after CPU {}: {}", self.cpu, e);
        }
    }
}

/// Pin the calling thread to `cpu` until changed again
pub fn pin_current_thread(cpu: usize) -> Result<()> {
    let set = single_cpu_set(cpu)?;
    sched_setaffinity(Pid::from_raw(0), &set).map_err(|e| {
        ChaSliceError::AffinityError(format!("Failed to set affinity to CPU {cpu}: {e}"))
    })?;
    tracing::debug!("Pinned thread to CPU {}", cpu);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn current_cpus() -> Vec<usize> {
        let set = sched_getaffinity(Pid::from_raw(0)).unwrap();
        (0..CpuSet::count())
            .filter(|&cpu| set.is_set(cpu).unwrap_or(false))
            .collect()
    }

    #[test]
    fn test_guard_restores_mask() {
        let before = current_cpus();
        let cpu = before[0];
        {
            let guard = AffinityGuard::new(cpu).unwrap();
            assert_eq!(guard.cpu(), cpu);
            assert_eq!(current_cpus(), vec![cpu]);
        }
        assert_eq!(current_cpus(), before);
    }

    #[test]
    fn test_out_of_range_cpu_rejected() {
        let err = AffinityGuard::new(CpuSet::count()).err().unwrap();
        assert!(matches!(err, ChaSliceError::AffinityError(_)));
    }
}
