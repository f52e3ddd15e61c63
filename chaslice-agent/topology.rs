//! Socket core tables
//!
//! Each socket gets up to three designated cores: the primary core (MSR
//! handle and default measurement core), a secondary core, and an
//! orchestrator core the measurement loop runs on.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::common::AffinityGuard;
use crate::error::{ChaSliceError, Result};

named_enum! {
    pub enum CoreRole {
        Primary => "primary",
        Secondary => "secondary",
        Orchestrator => "orchestrator",
    }
}

/// Designated cores of one socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketCoreSet {
    pub socket: usize,
    pub primary: usize,
    pub secondary: Option<usize>,
    pub orchestrator: Option<usize>,
    /// Every online core of the socket, ascending
    pub cores: Vec<usize>,
}

impl SocketCoreSet {
    pub fn core(&self, role: CoreRole) -> Option<usize> {
        match role {
            CoreRole::Primary => Some(self.primary),
            CoreRole::Secondary => self.secondary,
            CoreRole::Orchestrator => self.orchestrator,
        }
    }

    fn from_cores<R: Rng + ?Sized>(socket: usize, cores: Vec<usize>, rng: &mut R) -> Option<Self> {
        let primary = *cores.first()?;
        let secondary = cores.get(1).copied();
        let orchestrator = if cores.len() > 2 {
            cores[2..].choose(rng).copied()
        } else {
            None
        };
        Some(Self {
            socket,
            primary,
            secondary,
            orchestrator,
            cores,
        })
    }
}

/// Core sets indexed by socket; `None` for sockets without online cores
#[derive(Debug, Clone, Default)]
pub struct SocketCores {
    sockets: Vec<Option<SocketCoreSet>>,
}

impl SocketCores {
    /// Enumerate `cpuN` entries under `sysfs_cpu_root` in ascending `N` and
    /// group them by `topology/physical_package_id`.
    pub fn discover<R: Rng + ?Sized>(
        sysfs_cpu_root: &Path,
        max_sockets: usize,
        rng: &mut R,
    ) -> Result<Self> {
        let entries = fs::read_dir(sysfs_cpu_root).map_err(|e| {
            ChaSliceError::TopologyError(format!(
                "cannot list {}: {e}",
                sysfs_cpu_root.display()
            ))
        })?;

        let mut cpus: Vec<usize> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .and_then(|name| name.strip_prefix("cpu"))
                    .and_then(|id| id.parse().ok())
            })
            .collect();
        cpus.sort_unstable();

        let mut by_socket: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for cpu in cpus {
            let path = sysfs_cpu_root.join(format!("cpu{cpu}/topology/physical_package_id"));
            let Some(socket) = fs::read_to_string(&path)
                .ok()
                .and_then(|s| s.trim().parse::<usize>().ok())
            else {
                tracing::debug!("CPU {} has no package id, skipped", cpu);
                continue;
            };

            if socket >= max_sockets {
                tracing::debug!("CPU {} on socket {} beyond supported sockets", cpu, socket);
                continue;
            }
            by_socket.entry(socket).or_default().push(cpu);
        }

        if by_socket.is_empty() {
            return Err(ChaSliceError::TopologyError(format!(
                "no socket found under {}",
                sysfs_cpu_root.display()
            )));
        }

        let mut sockets = vec![None; max_sockets];
        for (socket, cores) in by_socket {
            sockets[socket] = SocketCoreSet::from_cores(socket, cores, rng);
        }
        while matches!(sockets.last(), Some(None)) {
            sockets.pop();
        }

        let table = Self { sockets };
        table.log_table();
        Ok(table)
    }

    pub fn from_sets(sets: Vec<SocketCoreSet>) -> Self {
        let len = sets.iter().map(|s| s.socket + 1).max().unwrap_or(0);
        let mut sockets = vec![None; len];
        for set in sets {
            let socket = set.socket;
            sockets[socket] = Some(set);
        }
        Self { sockets }
    }

    /// Highest socket index plus one
    pub fn socket_count(&self) -> usize {
        self.sockets.len()
    }

    pub fn socket(&self, socket: usize) -> Option<&SocketCoreSet> {
        self.sockets.get(socket).and_then(Option::as_ref)
    }

    pub fn present(&self) -> impl Iterator<Item = &SocketCoreSet> {
        self.sockets.iter().flatten()
    }

    pub fn core(&self, socket: usize, role: CoreRole) -> Option<usize> {
        self.socket(socket).and_then(|set| set.core(role))
    }

    /// Primary core of every socket, in socket order. Sockets must be
    /// numbered without gaps so register handles line up with socket ids.
    pub fn primary_cores(&self) -> Result<Vec<usize>> {
        self.sockets
            .iter()
            .enumerate()
            .map(|(socket, set)| {
                set.as_ref().map(|s| s.primary).ok_or_else(|| {
                    ChaSliceError::TopologyError(format!("socket {socket} has no online core"))
                })
            })
            .collect()
    }

    /// Core the measurement loop runs on: socket 0's orchestrator, falling
    /// back to its secondary and then its primary core.
    pub fn orchestrator_core(&self) -> Option<usize> {
        let set = self.present().next()?;
        [CoreRole::Orchestrator, CoreRole::Secondary, CoreRole::Primary]
            .into_iter()
            .find_map(|role| set.core(role))
    }

    pub fn log_table(&self) {
        let fmt = |core: Option<usize>| core.map_or_else(|| "-".to_string(), |c| c.to_string());
        tracing::info!("+--------+---------------+----------------+-------------------+");
        tracing::info!("| Socket | Primary Core  | Secondary Core | Orchestrator Core |");
        tracing::info!("+--------+---------------+----------------+-------------------+");
        for set in self.present() {
            tracing::info!(
                "| {:<6} | {:<13} | {:<14} | {:<17} |",
                set.socket,
                set.primary,
                fmt(set.secondary),
                fmt(set.orchestrator)
            );
        }
        tracing::info!("+--------+---------------+----------------+-------------------+");
    }
}

/// Run `f` pinned to the `role` core of `socket`; the previous affinity is
/// restored when `f` returns.
pub fn execute_on_socket_core<T, F>(
    cores: &SocketCores,
    socket: usize,
    role: CoreRole,
    f: F,
) -> Result<T>
where
    F: FnOnce() -> T,
{
    let core = cores.core(socket, role).ok_or_else(|| {
        ChaSliceError::TopologyError(format!("no {role} core on socket {socket}"))
    })?;

    let _guard = AffinityGuard::new(core)?;
    Ok(f())
}
