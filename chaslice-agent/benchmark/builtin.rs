use crate::benchmark::{Benchmark, BenchmarkContext};
use crate::common::cache::{access_flush, flush, maccess, mfence};
use crate::error::{ChaSliceError, Result};
use crate::topology::{execute_on_socket_core, CoreRole};

/// Hooks that only announce themselves; the skeleton for new workloads
pub struct Template;

impl Benchmark for Template {
    fn name(&self) -> &str {
        "template"
    }

    fn init(&self, _ctx: &BenchmarkContext<'_>) -> Result<()> {
        tracing::info!("{}: initialization", self.name());
        Ok(())
    }

    fn roi(&self, _ctx: &BenchmarkContext<'_>) -> Result<()> {
        tracing::info!("{}: running region of interest", self.name());
        Ok(())
    }

    fn cleanup(&self, _ctx: &BenchmarkContext<'_>) -> Result<()> {
        tracing::info!("{}: cleanup", self.name());
        Ok(())
    }
}

/// One access/flush pair per mapped line of every socket, from the current
/// core. Each line should show up as a lookup in exactly its own box.
pub struct AccessFlush;

impl Benchmark for AccessFlush {
    fn name(&self) -> &str {
        "access_flush"
    }

    fn init(&self, ctx: &BenchmarkContext<'_>) -> Result<()> {
        for (socket, _) in ctx.buffers.iter() {
            ctx.socket_lines(socket).for_each(flush);
        }
        mfence();
        Ok(())
    }

    fn roi(&self, ctx: &BenchmarkContext<'_>) -> Result<()> {
        for (socket, _) in ctx.buffers.iter() {
            ctx.socket_lines(socket).for_each(access_flush);
        }
        Ok(())
    }
}

/// Lines of the farthest socket are flushed, pulled through the primary core
/// of every socket in between, then read from socket 0 inside the region of
/// interest.
fn remote_read_init(ctx: &BenchmarkContext<'_>, target: usize, boxes: &[usize]) -> Result<()> {
    for &cha in boxes {
        for line in ctx.lines(target, cha) {
            flush(line);
            mfence();
        }
    }

    let quota = ctx.addresses.quota();
    for socket in 1..target {
        execute_on_socket_core(ctx.cores, socket, CoreRole::Primary, || {
            for index in 0..quota {
                for &cha in boxes {
                    if let Some(line) = ctx.line(target, cha, index) {
                        maccess(line);
                        mfence();
                    }
                }
            }
        })?;
    }

    // The region of interest reads from socket 0; cleanup moves back home
    ctx.pin(0, CoreRole::Primary)?;
    Ok(())
}

fn remote_read_roi(ctx: &BenchmarkContext<'_>, target: usize, boxes: &[usize]) {
    for &cha in boxes {
        for line in ctx.lines(target, cha) {
            maccess(line);
            mfence();
        }
    }
}

fn remote_read_cleanup(ctx: &BenchmarkContext<'_>, target: usize, boxes: &[usize]) -> Result<()> {
    for &cha in boxes {
        for line in ctx.lines(target, cha) {
            flush(line);
            mfence();
        }
    }
    ctx.pin_home()
}

fn target_socket(name: &str, ctx: &BenchmarkContext<'_>) -> Result<usize> {
    let target = ctx.farthest_socket().ok_or_else(|| {
        ChaSliceError::BenchmarkError(format!("{name}: no socket has mapped memory"))
    })?;
    if target == 0 {
        tracing::warn!("{}: single socket, reads are local", name);
    }
    Ok(target)
}

/// Remote read of every box of the farthest socket
pub struct RemoteRead;

impl RemoteRead {
    fn boxes(ctx: &BenchmarkContext<'_>) -> Vec<usize> {
        (0..ctx.addresses.boxes()).collect()
    }
}

impl Benchmark for RemoteRead {
    fn name(&self) -> &str {
        "remote_read"
    }

    fn init(&self, ctx: &BenchmarkContext<'_>) -> Result<()> {
        let target = target_socket(self.name(), ctx)?;
        remote_read_init(ctx, target, &Self::boxes(ctx))
    }

    fn roi(&self, ctx: &BenchmarkContext<'_>) -> Result<()> {
        let target = target_socket(self.name(), ctx)?;
        remote_read_roi(ctx, target, &Self::boxes(ctx));
        Ok(())
    }

    fn cleanup(&self, ctx: &BenchmarkContext<'_>) -> Result<()> {
        let target = target_socket(self.name(), ctx)?;
        remote_read_cleanup(ctx, target, &Self::boxes(ctx))
    }
}

/// Remote read restricted to a single box of the farthest socket
pub struct RemoteReadCha {
    pub cha: usize,
}

impl Default for RemoteReadCha {
    fn default() -> Self {
        Self { cha: 13 }
    }
}

impl RemoteReadCha {
    fn checked(&self, ctx: &BenchmarkContext<'_>) -> Result<usize> {
        if self.cha >= ctx.addresses.boxes() {
            return Err(ChaSliceError::BenchmarkError(format!(
                "{}: CHA {} out of range ({} boxes)",
                self.name(),
                self.cha,
                ctx.addresses.boxes()
            )));
        }
        target_socket(self.name(), ctx)
    }
}

impl Benchmark for RemoteReadCha {
    fn name(&self) -> &str {
        "remote_read_cha"
    }

    fn init(&self, ctx: &BenchmarkContext<'_>) -> Result<()> {
        let target = self.checked(ctx)?;
        remote_read_init(ctx, target, &[self.cha])
    }

    fn roi(&self, ctx: &BenchmarkContext<'_>) -> Result<()> {
        let target = self.checked(ctx)?;
        remote_read_roi(ctx, target, &[self.cha]);
        Ok(())
    }

    fn cleanup(&self, ctx: &BenchmarkContext<'_>) -> Result<()> {
        let target = self.checked(ctx)?;
        remote_read_cleanup(ctx, target, &[self.cha])
    }
}
