// Batched measurement loop around a benchmark's region of interest

use chaslice_raw::{MsrAccess, MsrFile};

use crate::benchmark::{Benchmark, BenchmarkContext};
use crate::counters::cha::{ChaMonitor, EventCatalog};
use crate::error::Result;
use crate::metrics::cha::CountsTable;

/// Contiguous slice of the event list programmed together
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batch {
    pub index: usize,
    /// Position of the first event in the full list (table event axis)
    pub start: usize,
    pub len: usize,
}

impl Batch {
    pub fn range(&self) -> std::ops::Range<usize> {
        self.start..self.start + self.len
    }
}

/// Cut `total` events into batches of at most `per_box`
pub fn plan_batches(total: usize, per_box: usize) -> Vec<Batch> {
    if per_box == 0 {
        return Vec::new();
    }
    (0..total)
        .step_by(per_box)
        .enumerate()
        .map(|(index, start)| Batch {
            index,
            start,
            len: per_box.min(total - start),
        })
        .collect()
}

pub struct MeasurementPipeline<'a, A: MsrAccess = MsrFile> {
    monitor: &'a ChaMonitor<A>,
    catalog: &'a EventCatalog,
    runs: usize,
}

impl<'a, A: MsrAccess> MeasurementPipeline<'a, A> {
    pub fn new(monitor: &'a ChaMonitor<A>, catalog: &'a EventCatalog, runs: usize) -> Self {
        Self {
            monitor,
            catalog,
            runs,
        }
    }

    /// Measure `events` around `benchmark`, `runs` times per batch.
    ///
    /// Returns `[run][socket][box][event]` with the event axis following
    /// `events`.
    pub fn run(
        &self,
        events: &[String],
        benchmark: &dyn Benchmark,
        ctx: &BenchmarkContext<'_>,
    ) -> Result<CountsTable> {
        let profile = self.monitor.profile();
        let batches = plan_batches(events.len(), profile.counters_per_box());
        let mut table = CountsTable::new(
            self.runs,
            self.monitor.sockets(),
            profile.box_count(),
            events.len(),
        );

        tracing::info!(
            "Monitoring {} events in {} batches with {}",
            events.len(),
            batches.len(),
            benchmark.name()
        );

        for batch in &batches {
            let group = &events[batch.range()];
            tracing::info!(
                "Monitoring session {}/{}: {}",
                batch.index + 1,
                batches.len(),
                group.join(" ")
            );

            self.monitor.freeze()?;
            for run in 0..self.runs {
                self.measure_once(run, batch, group, benchmark, ctx, &mut table)?;
            }
        }

        Ok(table)
    }

    fn measure_once(
        &self,
        run: usize,
        batch: &Batch,
        group: &[String],
        benchmark: &dyn Benchmark,
        ctx: &BenchmarkContext<'_>,
        table: &mut CountsTable,
    ) -> Result<()> {
        self.monitor.program(self.catalog, group)?;
        benchmark.init(ctx)?;

        self.monitor.unfreeze()?;
        let roi = benchmark.roi(ctx);
        self.monitor.freeze()?;
        roi?;

        benchmark.cleanup(ctx)?;
        self.monitor.read_counters(run, batch.start, batch.len, table);
        tracing::debug!("Run {} of batch {} complete", run, batch.index);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::msr::fake;
    use crate::common::SocketMsrs;
    use crate::counters::cha::AddressMap;
    use crate::error::ChaSliceError;
    use crate::memory::SocketBuffers;
    use crate::topology::SocketCores;
    use chaslice_raw::Generation;

    const MARKER_CPU: usize = 9999;
    const INIT: u64 = 1;
    const ROI: u64 = 2;
    const CLEANUP: u64 = 3;

    /// Benchmark that stamps its hooks into the register write log
    struct Recorder {
        log: fake::WriteLog,
        fail_roi: bool,
    }

    impl Recorder {
        fn mark(&self, hook: u64) {
            self.log.borrow_mut().push((MARKER_CPU, 0, hook));
        }
    }

    impl Benchmark for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn init(&self, _ctx: &BenchmarkContext<'_>) -> Result<()> {
            self.mark(INIT);
            Ok(())
        }

        fn roi(&self, _ctx: &BenchmarkContext<'_>) -> Result<()> {
            self.mark(ROI);
            if self.fail_roi {
                return Err(ChaSliceError::BenchmarkError("roi".into()));
            }
            Ok(())
        }

        fn cleanup(&self, _ctx: &BenchmarkContext<'_>) -> Result<()> {
            self.mark(CLEANUP);
            Ok(())
        }
    }

    const CATALOG: &str = r#"[
        { "EventName": "E0", "EventCode": "0x34", "UMask": "0x01" },
        { "EventName": "E1", "EventCode": "0x35", "UMask": "0x01" },
        { "EventName": "E2", "EventCode": "0x36", "UMask": "0x01" },
        { "EventName": "E3", "EventCode": "0x37", "UMask": "0x01" },
        { "EventName": "E4", "EventCode": "0x38", "UMask": "0x01" },
        { "EventName": "E5", "EventCode": "0x39", "UMask": "0x01" }
    ]"#;

    fn events(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("E{i}")).collect()
    }

    #[test]
    fn test_plan_batches() {
        let batches = plan_batches(10, 4);
        assert_eq!(
            batches,
            vec![
                Batch { index: 0, start: 0, len: 4 },
                Batch { index: 1, start: 4, len: 4 },
                Batch { index: 2, start: 8, len: 2 },
            ]
        );
        assert_eq!(batches[2].range(), 8..10);
        assert_eq!(plan_batches(4, 4).len(), 1);
        assert!(plan_batches(0, 4).is_empty());
        assert!(plan_batches(3, 0).is_empty());
    }

    #[test]
    fn test_run_orders_hooks_around_global_control() {
        let profile = Generation::Skylake.profile();
        let (handles, log) = fake::sockets(1);
        let monitor = ChaMonitor::new(profile, SocketMsrs::from_handles(handles));
        let catalog = EventCatalog::parse(CATALOG).unwrap();
        let pipeline = MeasurementPipeline::new(&monitor, &catalog, 2);

        let map = AddressMap::new(1, profile.box_count(), 1);
        let buffers = SocketBuffers::default();
        let cores = SocketCores::default();
        let ctx = BenchmarkContext::new(&map, &buffers, &cores);
        let recorder = Recorder {
            log: log.clone(),
            fail_roi: false,
        };

        pipeline.run(&events(2), &recorder, &ctx).unwrap();

        let global = profile.global_control();
        let freeze = (0, global.control, global.freeze);
        let unfreeze = (0, global.control, global.unfreeze);
        let init = (MARKER_CPU, 0, INIT);
        let roi = (MARKER_CPU, 0, ROI);
        let cleanup = (MARKER_CPU, 0, CLEANUP);

        let trace: Vec<_> = log
            .borrow()
            .iter()
            .copied()
            .filter(|&(cpu, msr, _)| cpu == MARKER_CPU || msr == global.control)
            .collect();
        assert_eq!(
            trace,
            vec![
                freeze, init, unfreeze, roi, freeze, cleanup, init, unfreeze, roi, freeze,
                cleanup
            ]
        );
    }

    #[test]
    fn test_run_fills_event_axis_per_batch() {
        let profile = Generation::IceLake.profile();
        let (handles, _log) = fake::sockets(2);
        handles[1].set(profile.counter_value(7, 1), 9);
        handles[0].set(profile.counter_value(0, 0), 4);
        let monitor = ChaMonitor::new(profile, SocketMsrs::from_handles(handles));
        let catalog = EventCatalog::parse(CATALOG).unwrap();
        let pipeline = MeasurementPipeline::new(&monitor, &catalog, 3);

        let map = AddressMap::new(2, profile.box_count(), 1);
        let buffers = SocketBuffers::default();
        let cores = SocketCores::default();
        let ctx = BenchmarkContext::new(&map, &buffers, &cores);

        let table = pipeline
            .run(&events(6), &crate::benchmark::Template, &ctx)
            .unwrap();

        assert_eq!(table.shape().events, 6);
        assert_eq!(table.shape().runs, 3);
        for run in 0..3 {
            // slot 1 of both batches
            assert_eq!(table.get(run, 1, 7, 1), Some(9));
            assert_eq!(table.get(run, 1, 7, 5), Some(9));
            // slot 0 of both batches
            assert_eq!(table.get(run, 0, 0, 0), Some(4));
            assert_eq!(table.get(run, 0, 0, 4), Some(4));
            assert_eq!(table.get(run, 1, 7, 2), Some(0));
        }
    }

    #[test]
    fn test_failed_roi_still_freezes() {
        let profile = Generation::SapphireRapids.profile();
        let (handles, log) = fake::sockets(1);
        let monitor = ChaMonitor::new(profile, SocketMsrs::from_handles(handles));
        let catalog = EventCatalog::parse(CATALOG).unwrap();
        let pipeline = MeasurementPipeline::new(&monitor, &catalog, 1);

        let map = AddressMap::new(1, profile.box_count(), 1);
        let buffers = SocketBuffers::default();
        let cores = SocketCores::default();
        let ctx = BenchmarkContext::new(&map, &buffers, &cores);
        let recorder = Recorder {
            log: log.clone(),
            fail_roi: true,
        };

        assert!(pipeline.run(&events(1), &recorder, &ctx).is_err());
        let global = profile.global_control();
        let log = log.borrow();
        assert_eq!(log.last(), Some(&(0, global.control, global.freeze)));
        assert!(!log.contains(&(MARKER_CPU, 0, CLEANUP)));
    }
}
