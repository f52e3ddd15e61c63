//! MSR (Model-Specific Register) read/write primitives
//!
//! Registers are reached through `/dev/cpu/<cpu>/msr`. The kernel executes the
//! access on `<cpu>`, so one open handle per socket is enough to reach every
//! uncore register of that socket.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::{FileExt, OpenOptionsExt};

pub type Result<T> = std::result::Result<T, MsrError>;

/// Errors that can occur during MSR operations
#[derive(Debug, thiserror::Error)]
pub enum MsrError {
    #[error("Failed to open MSR device for CPU {cpu}: {source}")]
    OpenFailed { cpu: usize, source: std::io::Error },

    #[error("Failed to read MSR 0x{msr:X} on CPU {cpu}: {source}")]
    ReadFailed {
        cpu: usize,
        msr: u64,
        source: std::io::Error,
    },

    #[error("Failed to write MSR 0x{msr:X} on CPU {cpu}: {source}")]
    WriteFailed {
        cpu: usize,
        msr: u64,
        source: std::io::Error,
    },
}

/// 8-byte register access at an offset of a per-core handle.
///
/// A read or write either transfers all eight bytes or fails; there are no
/// partial-width semantics.
pub trait MsrAccess {
    /// CPU the handle is bound to (used in log messages).
    fn cpu(&self) -> usize;

    /// Read a 64-bit value from an MSR
    fn read(&self, msr: u64) -> Result<u64>;

    /// Write a 64-bit value to an MSR
    fn write(&self, msr: u64, value: u64) -> Result<()>;
}

/// An open `/dev/cpu/<cpu>/msr` handle.
///
/// The file stays open for the lifetime of the value; reads and writes are
/// positional (`pread`/`pwrite`) so the handle needs no seek state.
#[derive(Debug)]
pub struct MsrFile {
    file: File,
    cpu: usize,
}

impl MsrFile {
    /// Open the MSR device of `cpu` for reading and writing.
    ///
    /// # Errors
    ///
    /// Returns [`MsrError::OpenFailed`] if the `msr` kernel module is not
    /// loaded or the caller lacks `CAP_SYS_RAWIO`.
    pub fn open(cpu: usize) -> Result<Self> {
        let path = format!("/dev/cpu/{cpu}/msr");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(&path)
            .map_err(|e| MsrError::OpenFailed { cpu, source: e })?;

        Ok(Self { file, cpu })
    }
}

impl MsrAccess for MsrFile {
    fn cpu(&self) -> usize {
        self.cpu
    }

    fn read(&self, msr: u64) -> Result<u64> {
        let mut buffer = [0u8; 8];
        self.file
            .read_exact_at(&mut buffer, msr)
            .map_err(|e| MsrError::ReadFailed {
                cpu: self.cpu,
                msr,
                source: e,
            })?;

        Ok(u64::from_le_bytes(buffer))
    }

    fn write(&self, msr: u64, value: u64) -> Result<()> {
        self.file
            .write_all_at(&value.to_le_bytes(), msr)
            .map_err(|e| MsrError::WriteFailed {
                cpu: self.cpu,
                msr,
                source: e,
            })
    }
}
