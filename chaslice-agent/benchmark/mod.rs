//! Workloads measured by the pipeline
//!
//! A benchmark is three hooks around the measured region: `init` runs while
//! counters are programmed but frozen, `roi` runs with counters live, and
//! `cleanup` runs after the refreeze. Every hook sees the slice map, the
//! probe buffers and the core tables through [`BenchmarkContext`].

mod builtin;

use std::collections::BTreeMap;

pub use builtin::{AccessFlush, RemoteRead, RemoteReadCha, Template};

use crate::common::pin_current_thread;
use crate::counters::cha::AddressMap;
use crate::error::{ChaSliceError, Result};
use crate::memory::SocketBuffers;
use crate::topology::{CoreRole, SocketCores};

/// Everything a benchmark may touch
#[derive(Clone, Copy)]
pub struct BenchmarkContext<'a> {
    pub addresses: &'a AddressMap,
    pub buffers: &'a SocketBuffers,
    pub cores: &'a SocketCores,
}

impl<'a> BenchmarkContext<'a> {
    pub fn new(addresses: &'a AddressMap, buffers: &'a SocketBuffers, cores: &'a SocketCores) -> Self {
        Self {
            addresses,
            buffers,
            cores,
        }
    }

    /// The `index`-th line mapped to `cha` on `socket`
    pub fn line(&self, socket: usize, cha: usize, index: usize) -> Option<&'a u8> {
        let addresses: &'a AddressMap = self.addresses;
        let buffers: &'a SocketBuffers = self.buffers;
        let offset = *addresses.offsets(socket, cha).get(index)?;
        buffers.get(socket)?.byte(offset)
    }

    /// Every line mapped to `cha` on `socket`, in discovery order
    pub fn lines(&self, socket: usize, cha: usize) -> impl Iterator<Item = &'a u8> + 'a {
        let addresses: &'a AddressMap = self.addresses;
        let buffers: &'a SocketBuffers = self.buffers;
        let buffer = buffers.get(socket);
        addresses
            .offsets(socket, cha)
            .iter()
            .filter_map(move |&offset| buffer.and_then(|b| b.byte(offset)))
    }

    /// Every mapped line of `socket`, one box after another
    pub fn socket_lines(&self, socket: usize) -> impl Iterator<Item = &'a u8> + 'a {
        let ctx = *self;
        (0..self.addresses.boxes()).flat_map(move |cha| ctx.lines(socket, cha))
    }

    /// Highest socket that has both a probe buffer and cores
    pub fn farthest_socket(&self) -> Option<usize> {
        self.buffers
            .iter()
            .map(|(socket, _)| socket)
            .filter(|&socket| self.cores.socket(socket).is_some())
            .last()
    }

    /// Move the calling thread to the `role` core of `socket` until the next
    /// pin
    pub fn pin(&self, socket: usize, role: CoreRole) -> Result<usize> {
        let core = self.cores.core(socket, role).ok_or_else(|| {
            ChaSliceError::TopologyError(format!("no {role} core on socket {socket}"))
        })?;
        pin_current_thread(core)?;
        Ok(core)
    }

    /// Return the calling thread to the orchestrator core
    pub fn pin_home(&self) -> Result<()> {
        if let Some(core) = self.cores.orchestrator_core() {
            pin_current_thread(core)?;
        }
        Ok(())
    }
}

/// A measured workload
pub trait Benchmark {
    fn name(&self) -> &str;

    /// Prepare cache state; counters are frozen
    fn init(&self, ctx: &BenchmarkContext<'_>) -> Result<()>;

    /// Region of interest; counters are live
    fn roi(&self, ctx: &BenchmarkContext<'_>) -> Result<()>;

    /// Undo `init` after the counters are frozen again
    fn cleanup(&self, _ctx: &BenchmarkContext<'_>) -> Result<()> {
        Ok(())
    }
}

/// Benchmarks keyed by name
#[derive(Default)]
pub struct BenchmarkRegistry {
    benchmarks: BTreeMap<String, Box<dyn Benchmark>>,
}

impl BenchmarkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in benchmark
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        let builtins: Vec<Box<dyn Benchmark>> = vec![
            Box::new(Template),
            Box::new(AccessFlush),
            Box::new(RemoteRead),
            Box::new(RemoteReadCha::default()),
        ];
        for benchmark in builtins {
            if let Err(e) = registry.register(benchmark) {
                tracing::warn!("{}", e);
            }
        }
        registry
    }

    /// Add a benchmark; a name that is already taken is rejected
    pub fn register(&mut self, benchmark: Box<dyn Benchmark>) -> Result<()> {
        let name = benchmark.name().to_string();
        if self.benchmarks.contains_key(&name) {
            return Err(ChaSliceError::BenchmarkError(format!(
                "benchmark '{name}' is already registered"
            )));
        }
        tracing::debug!("Registered benchmark {}", name);
        self.benchmarks.insert(name, benchmark);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&dyn Benchmark> {
        self.benchmarks.get(name).map(|b| b.as_ref())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.benchmarks.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.benchmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.benchmarks.is_empty()
    }
}
