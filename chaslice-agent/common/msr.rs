use chaslice_raw::{MsrAccess, MsrFile};

use crate::error::{ChaSliceError, Result};

/// One register handle per socket, indexed by socket number
///
/// Every handle is opened on the socket's primary core; uncore registers of
/// a socket are reachable from any of its cores.
pub struct SocketMsrs<A: MsrAccess = MsrFile> {
    handles: Vec<A>,
}

impl SocketMsrs<MsrFile> {
    /// Open `/dev/cpu/<core>/msr` for each socket's primary core
    pub fn open(primary_cores: &[usize]) -> Result<Self> {
        let handles = primary_cores
            .iter()
            .map(|&cpu| {
                let handle = MsrFile::open(cpu)?;
                tracing::info!("Opened MSR handle for core {}", cpu);
                Ok(handle)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { handles })
    }
}

impl<A: MsrAccess> SocketMsrs<A> {
    pub fn from_handles(handles: Vec<A>) -> Self {
        Self { handles }
    }

    pub fn sockets(&self) -> usize {
        self.handles.len()
    }

    pub fn get(&self, socket: usize) -> Option<&A> {
        self.handles.get(socket)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &A)> {
        self.handles.iter().enumerate()
    }

    /// Read with a debug trace of the value
    pub fn read(&self, socket: usize, msr: u64) -> Result<u64> {
        let handle = self.handle(socket)?;
        let value = handle.read(msr)?;
        tracing::debug!(
            "MSR read: CPU {} MSR 0x{:08x} = 0x{:016x}",
            handle.cpu(),
            msr,
            value
        );
        Ok(value)
    }

    /// Write with a debug trace of the value
    pub fn write(&self, socket: usize, msr: u64, value: u64) -> Result<()> {
        let handle = self.handle(socket)?;
        tracing::debug!(
            "MSR write: CPU {} MSR 0x{:08x} <- 0x{:016x}",
            handle.cpu(),
            msr,
            value
        );
        handle.write(msr, value)?;
        Ok(())
    }

    fn handle(&self, socket: usize) -> Result<&A> {
        self.handles.get(socket).ok_or_else(|| {
            ChaSliceError::TopologyError(format!("no MSR handle for socket {socket}"))
        })
    }
}
