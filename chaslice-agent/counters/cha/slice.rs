//! CHA slice discovery
//!
//! An address is attributed to the CHA box whose LLC lookup counter jumps
//! while the line is repeatedly loaded and flushed. Walking a node-local
//! buffer line by line yields, per socket and box, a list of offsets that
//! benchmarks use to target a chosen slice.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use chaslice_raw::MsrAccess;

use crate::common::cache::access_flush;
use crate::config::{ProbeConfig, DEFAULT_DISCOVERY_EVENT};
use crate::counters::cha::{ChaMonitor, EventCatalog};
use crate::error::{ChaSliceError, Result};
use crate::memory::SocketBuffers;
use crate::metrics::cha::CountsTable;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoverySettings {
    /// Catalog name of the lookup event programmed into slot 0
    pub event: String,
    /// Access/flush rounds per candidate line
    pub iterations: usize,
    /// Minimum winning count for an attribution
    pub threshold: u64,
    /// Offsets recorded per box
    pub quota: usize,
    /// Walk stride (cache line size)
    pub stride: usize,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            event: DEFAULT_DISCOVERY_EVENT.to_string(),
            iterations: 20,
            threshold: 18,
            quota: 45,
            stride: 64,
        }
    }
}

impl DiscoverySettings {
    /// Fail unless the lookup event resolves in `catalog`
    pub fn check_catalog(&self, catalog: &EventCatalog) -> Result<()> {
        if catalog.select(&self.event).is_none() {
            return Err(ChaSliceError::CatalogError(format!(
                "discovery event {} is not in the catalog",
                self.event
            )));
        }
        Ok(())
    }
}

impl From<&ProbeConfig> for DiscoverySettings {
    fn from(config: &ProbeConfig) -> Self {
        Self {
            event: config.discovery_event.clone(),
            iterations: config.discovery_iterations,
            threshold: config.discovery_threshold,
            quota: config.addresses_per_box,
            stride: config.cache_line,
        }
    }
}

/// Box with the highest lookup count for one probed line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceHit {
    /// Socket whose box reported the maximum
    pub socket: usize,
    pub cha: usize,
    pub count: u64,
}

/// Scan slot 0 of every `(socket, box)` of `run` in socket-major order and
/// keep the first strictly greater maximum. `None` unless it reaches
/// `threshold`.
pub fn attribute_slice(table: &CountsTable, run: usize, threshold: u64) -> Option<SliceHit> {
    let shape = table.shape();
    let mut best: Option<SliceHit> = None;
    let mut max = 0;

    for socket in 0..shape.sockets {
        for cha in 0..shape.boxes {
            let count = table.get(run, socket, cha, 0).unwrap_or(0);
            if count > max {
                max = count;
                best = Some(SliceHit { socket, cha, count });
            }
        }
    }

    best.filter(|hit| hit.count >= threshold)
}

/// Offsets per socket and box, each box capped at a fixed quota
#[derive(Debug, Clone)]
pub struct AddressMap {
    quota: usize,
    boxes: usize,
    offsets: Vec<Vec<Vec<usize>>>,
    /// Offsets already recorded on each socket
    seen: Vec<HashSet<usize>>,
}

impl AddressMap {
    pub fn new(sockets: usize, boxes: usize, quota: usize) -> Self {
        let offsets = (0..sockets)
            .map(|_| (0..boxes).map(|_| Vec::with_capacity(quota)).collect())
            .collect();
        Self {
            quota,
            boxes,
            offsets,
            seen: vec![HashSet::new(); sockets],
        }
    }

    pub fn sockets(&self) -> usize {
        self.offsets.len()
    }

    pub fn boxes(&self) -> usize {
        self.boxes
    }

    pub fn quota(&self) -> usize {
        self.quota
    }

    /// Add `offset` under `(socket, cha)`. Returns `false` when the box is
    /// full, the coordinates are out of range or the offset is already
    /// recorded anywhere on the socket.
    pub fn record(&mut self, socket: usize, cha: usize, offset: usize) -> bool {
        let (Some(socket_boxes), Some(seen)) =
            (self.offsets.get_mut(socket), self.seen.get_mut(socket))
        else {
            return false;
        };
        if seen.contains(&offset) {
            return false;
        }
        match socket_boxes.get_mut(cha) {
            Some(list) if list.len() < self.quota => {
                list.push(offset);
                seen.insert(offset);
                true
            }
            _ => false,
        }
    }

    pub fn offsets(&self, socket: usize, cha: usize) -> &[usize] {
        self.offsets
            .get(socket)
            .and_then(|boxes| boxes.get(cha))
            .map_or(&[], Vec::as_slice)
    }

    pub fn is_full(&self, socket: usize, cha: usize) -> bool {
        self.offsets(socket, cha).len() >= self.quota
    }

    /// Every box of `socket` reached its quota
    pub fn socket_complete(&self, socket: usize) -> bool {
        (0..self.boxes).all(|cha| self.is_full(socket, cha))
    }

    pub fn found(&self, socket: usize) -> usize {
        (0..self.boxes).map(|cha| self.offsets(socket, cha).len()).sum()
    }
}

/// Plain-text slice map: one `CHA <b> on Socket <s>:` section per box
pub struct OffsetLog<W: Write> {
    writer: W,
}

impl OffsetLog<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|e| {
            ChaSliceError::ConfigError(format!("cannot create {}: {e}", path.display()))
        })?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> OffsetLog<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Append one box section and flush it
    pub fn write_box(&mut self, socket: usize, cha: usize, offsets: &[usize]) -> Result<()> {
        writeln!(self.writer, "CHA {cha} on Socket {socket}:")?;
        for offset in offsets {
            writeln!(self.writer, "Offset: {offset}")?;
        }
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Walk `len` bytes of `socket`'s buffer in `stride` steps, asking `probe`
/// for the owning box of each line, until every box reaches its quota.
///
/// Each box section is appended to `log` when the box fills; boxes still
/// short when the buffer is exhausted are written at the end.
pub fn fill_socket<W, F>(
    map: &mut AddressMap,
    socket: usize,
    len: usize,
    stride: usize,
    log: &mut OffsetLog<W>,
    mut probe: F,
) -> Result<()>
where
    W: Write,
    F: FnMut(usize) -> Result<Option<SliceHit>>,
{
    let total = map.boxes() * map.quota();
    let mut offset = 0;

    while offset + stride <= len {
        let line = offset;
        offset += stride;

        let Some(hit) = probe(line)? else {
            continue;
        };
        if hit.socket != socket {
            tracing::debug!(
                "Offset {} on socket {}: maximum reported by socket {} CHA {}",
                line,
                socket,
                hit.socket,
                hit.cha
            );
        }

        if !map.record(socket, hit.cha, line) {
            continue;
        }

        if map.is_full(socket, hit.cha) {
            log.write_box(socket, hit.cha, map.offsets(socket, hit.cha))?;
            tracing::info!(
                "CHA {} on socket {} mapped ({}/{} addresses)",
                hit.cha,
                socket,
                map.found(socket),
                total
            );
        }

        if map.socket_complete(socket) {
            tracing::info!("Socket {} fully mapped after {} bytes", socket, offset);
            return Ok(());
        }
    }

    for cha in 0..map.boxes() {
        if !map.is_full(socket, cha) {
            tracing::warn!(
                "CHA {} on socket {} has only {}/{} addresses",
                cha,
                socket,
                map.offsets(socket, cha).len(),
                map.quota()
            );
            log.write_box(socket, cha, map.offsets(socket, cha))?;
        }
    }
    Ok(())
}

/// Discovery driver bound to a monitor and catalog
pub struct SliceProbe<'a, A: MsrAccess> {
    monitor: &'a ChaMonitor<A>,
    catalog: &'a EventCatalog,
    settings: DiscoverySettings,
}

impl<'a, A: MsrAccess> SliceProbe<'a, A> {
    pub fn new(
        monitor: &'a ChaMonitor<A>,
        catalog: &'a EventCatalog,
        settings: DiscoverySettings,
    ) -> Result<Self> {
        settings.check_catalog(catalog)?;
        Ok(Self {
            monitor,
            catalog,
            settings,
        })
    }

    pub fn settings(&self) -> &DiscoverySettings {
        &self.settings
    }

    /// Box owning the line of `target`, or `None` when no box counted at
    /// least the threshold.
    pub fn find_cha_mapped_offset(&self, target: &u8) -> Result<Option<SliceHit>> {
        let events = [self.settings.event.clone()];

        self.monitor.freeze()?;
        self.monitor.program(self.catalog, &events)?;
        self.monitor.unfreeze()?;

        for _ in 0..self.settings.iterations {
            access_flush(target);
        }

        self.monitor.freeze()?;

        let profile = self.monitor.profile();
        let mut scratch = CountsTable::new(1, self.monitor.sockets(), profile.box_count(), 1);
        self.monitor.read_counters(0, 0, 1, &mut scratch);

        Ok(attribute_slice(&scratch, 0, self.settings.threshold))
    }

    /// Map every socket buffer to its boxes, persisting sections to `log`
    pub fn generate_cha_mapped_offsets<W: Write>(
        &self,
        buffers: &SocketBuffers,
        log: &mut OffsetLog<W>,
    ) -> Result<AddressMap> {
        let boxes = self.monitor.profile().box_count();
        let mut map = AddressMap::new(buffers.sockets(), boxes, self.settings.quota);

        for (socket, buffer) in buffers.iter() {
            tracing::info!(
                "Mapping {} MiB on socket {} to {} CHA boxes",
                buffer.len() >> 20,
                socket,
                boxes
            );
            fill_socket(
                &mut map,
                socket,
                buffer.len(),
                self.settings.stride,
                log,
                |offset| match buffer.byte(offset) {
                    Some(target) => self.find_cha_mapped_offset(target),
                    None => Ok(None),
                },
            )?;
        }

        Ok(map)
    }
}
