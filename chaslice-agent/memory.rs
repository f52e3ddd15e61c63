//! NUMA node-local probe buffers
//!
//! One large anonymous mapping per node, bound to that node with `mbind`,
//! aligned and pre-faulted so every cache line probed later is backed by a
//! physical page on the right socket.

use std::fs;
use std::ptr::{self, NonNull};

use libc::{c_int, c_ulong, c_void};

use crate::config::{parse_cpu_list, ProbeConfig};
use crate::error::{ChaSliceError, Result};

const MPOL_BIND: c_int = 2;

/// Bind `[addr, addr + len)` to `node`. Returns the raw errno on failure.
unsafe fn mbind_node(addr: *mut c_void, len: usize, node: usize) -> std::io::Result<()> {
    let bits = c_ulong::BITS as usize;
    let mut mask = vec![0 as c_ulong; node / bits + 1];
    mask[node / bits] |= 1 << (node % bits);
    // The kernel drops the last bit of maxnode.
    let maxnode = (mask.len() * bits + 1) as c_ulong;

    let rc = libc::syscall(
        libc::SYS_mbind,
        addr,
        len,
        MPOL_BIND,
        mask.as_ptr(),
        maxnode,
        0 as c_int,
    );
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

/// Node-local, aligned, pre-faulted buffer
#[derive(Debug)]
pub struct NodeBuffer {
    map: NonNull<u8>,
    map_len: usize,
    base: NonNull<u8>,
    len: usize,
    node: usize,
}

impl NodeBuffer {
    pub fn allocate(node: usize, len: usize, alignment: usize, page_size: usize) -> Result<Self> {
        if len == 0 || !alignment.is_power_of_two() || page_size == 0 {
            return Err(ChaSliceError::InvalidConfiguration(format!(
                "cannot allocate {len} bytes aligned to {alignment}"
            )));
        }

        let map_len = len + alignment;
        let raw = unsafe {
            libc::mmap(
                ptr::null_mut(),
                map_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if raw == libc::MAP_FAILED {
            return Err(ChaSliceError::MemoryError(format!(
                "mmap of {map_len} bytes for node {node} failed: {}",
                std::io::Error::last_os_error()
            )));
        }

        if let Err(e) = unsafe { mbind_node(raw, map_len, node) } {
            tracing::warn!("mbind to node {} failed, memory may be remote: {}", node, e);
        }

        let map = NonNull::new(raw.cast::<u8>()).ok_or_else(|| {
            ChaSliceError::MemoryError(format!("mmap returned null for node {node}"))
        })?;
        let padding = map.as_ptr().align_offset(alignment);
        // SAFETY: padding < alignment, so base..base+len lies inside the mapping.
        let base = unsafe { NonNull::new_unchecked(map.as_ptr().add(padding)) };

        for offset in (0..len).step_by(page_size) {
            unsafe { ptr::write_volatile(base.as_ptr().add(offset), 0) };
        }

        tracing::info!(
            "Allocated {} MiB on node {} at {:p}",
            len >> 20,
            node,
            base.as_ptr()
        );

        Ok(Self {
            map,
            map_len,
            base,
            len,
            node,
        })
    }

    pub fn node(&self) -> usize {
        self.node
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.base.as_ptr()
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.base.as_ptr(), self.len) }
    }

    /// Byte at `offset`, if inside the buffer
    pub fn byte(&self, offset: usize) -> Option<&u8> {
        self.as_slice().get(offset)
    }
}

impl Drop for NodeBuffer {
    fn drop(&mut self) {
        let rc = unsafe { libc::munmap(self.map.as_ptr().cast(), self.map_len) };
        if rc != 0 {
            tracing::warn!(
                "munmap of node {} buffer failed: {}",
                self.node,
                std::io::Error::last_os_error()
            );
        }
    }
}

/// Probe buffers indexed by socket (one NUMA node per socket)
#[derive(Debug, Default)]
pub struct SocketBuffers {
    buffers: Vec<Option<NodeBuffer>>,
}

impl SocketBuffers {
    /// Allocate one buffer per online NUMA node, up to `max_sockets` nodes.
    /// A node whose allocation fails is reported and left empty.
    pub fn allocate_per_socket(config: &ProbeConfig, max_sockets: usize) -> Result<Self> {
        let online = config.sysfs_node_root.join("online");
        let nodes = fs::read_to_string(&online)
            .ok()
            .and_then(|s| parse_cpu_list(&s))
            .ok_or_else(|| {
                ChaSliceError::TopologyError(format!(
                    "NUMA is not available: cannot read {}",
                    online.display()
                ))
            })?;

        let node_count = nodes.iter().max().map_or(0, |&n| n + 1).min(max_sockets);
        let mut buffers = Vec::with_capacity(node_count);
        for node in 0..node_count {
            if !nodes.contains(&node) {
                buffers.push(None);
                continue;
            }
            match NodeBuffer::allocate(node, config.buffer_size, config.alignment, config.page_size)
            {
                Ok(buffer) => buffers.push(Some(buffer)),
                Err(e) => {
                    tracing::error!("Memory allocation failed on socket {}: {}", node, e);
                    buffers.push(None);
                }
            }
        }

        Ok(Self { buffers })
    }

    pub fn from_buffers(buffers: Vec<Option<NodeBuffer>>) -> Self {
        Self { buffers }
    }

    pub fn get(&self, socket: usize) -> Option<&NodeBuffer> {
        self.buffers.get(socket).and_then(Option::as_ref)
    }

    pub fn sockets(&self) -> usize {
        self.buffers.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &NodeBuffer)> {
        self.buffers
            .iter()
            .enumerate()
            .filter_map(|(socket, buffer)| buffer.as_ref().map(|b| (socket, b)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: usize = 1 << 20;

    #[test]
    fn test_buffer_is_aligned_and_zeroed() {
        let buffer = NodeBuffer::allocate(0, 256 * 1024, 2 * MIB, 4096).unwrap();
        assert_eq!(buffer.as_ptr() as usize % (2 * MIB), 0);
        assert_eq!(buffer.len(), 256 * 1024);
        assert!(buffer.as_slice().iter().all(|&b| b == 0));
        assert!(buffer.byte(256 * 1024 - 1).is_some());
        assert!(buffer.byte(256 * 1024).is_none());
    }

    #[test]
    fn test_invalid_alignment_rejected() {
        let err = NodeBuffer::allocate(0, 4096, 3000, 4096).unwrap_err();
        assert!(matches!(err, ChaSliceError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_allocate_from_fake_node_list() {
        let sysfs = tempfile::tempdir().unwrap();
        fs::write(sysfs.path().join("online"), "0\n").unwrap();
        let config = ProbeConfig {
            buffer_size: 64 * 1024,
            alignment: 4096,
            sysfs_node_root: sysfs.path().to_path_buf(),
            ..Default::default()
        };

        let buffers = SocketBuffers::allocate_per_socket(&config, 4).unwrap();
        assert_eq!(buffers.sockets(), 1);
        assert_eq!(buffers.get(0).map(NodeBuffer::node), Some(0));
        assert_eq!(buffers.iter().count(), 1);
    }

    #[test]
    fn test_missing_numa_metadata() {
        let config = ProbeConfig {
            sysfs_node_root: "/nonexistent/node".into(),
            ..Default::default()
        };
        let err = SocketBuffers::allocate_per_socket(&config, 4).unwrap_err();
        assert!(matches!(err, ChaSliceError::TopologyError(_)));
    }
}
