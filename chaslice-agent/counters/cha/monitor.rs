// CHA monitor: global freeze control, per-box programming and counter reads

use chaslice_raw::arch::cha::prefetch;
use chaslice_raw::{ChaProfile, MsrAccess, MsrFile, Register};

use crate::common::cache::mfence;
use crate::common::SocketMsrs;
use crate::counters::cha::{EventCatalog, EventSelect};
use crate::error::{ChaSliceError, Result};
use crate::metrics::cha::CountsTable;

enum_with_data! {
    /// Core prefetchers controlled through `MSR_MISC_FEATURE_CONTROL`
    pub enum Prefetcher: u32 {
        L2Hardware => ("L2 hardware", prefetch::L2_HARDWARE_DISABLE),
        L2Adjacent => ("L2 adjacent line", prefetch::L2_ADJACENT_DISABLE),
        DcuStreamer => ("DCU streamer", prefetch::DCU_STREAMER_DISABLE),
        DcuIp => ("DCU IP", prefetch::DCU_IP_DISABLE),
    }
    impl disable_bit -> u32
}

impl Prefetcher {
    /// Value that turns every prefetcher off
    pub fn all_disabled_mask() -> u64 {
        Prefetcher::all()
            .iter()
            .fold(0, |mask, p| mask | (1 << p.disable_bit()))
    }
}

/// Drives the CHA boxes of every socket through one register handle per
/// socket.
pub struct ChaMonitor<A: MsrAccess = MsrFile> {
    profile: &'static dyn ChaProfile,
    msrs: SocketMsrs<A>,
}

impl<A: MsrAccess> ChaMonitor<A> {
    pub fn new(profile: &'static dyn ChaProfile, msrs: SocketMsrs<A>) -> Self {
        tracing::info!(
            "Initializing CHA monitor for {} sockets with {} CHA boxes ({})",
            msrs.sockets(),
            profile.box_count(),
            profile.generation()
        );
        Self { profile, msrs }
    }

    pub fn profile(&self) -> &'static dyn ChaProfile {
        self.profile
    }

    pub fn sockets(&self) -> usize {
        self.msrs.sockets()
    }

    /// Stop every uncore counter on every socket
    pub fn freeze(&self) -> Result<()> {
        mfence();
        self.write_global(self.profile.global_control().freeze, "freeze")
    }

    /// Restart every uncore counter on every socket
    pub fn unfreeze(&self) -> Result<()> {
        mfence();
        self.write_global(self.profile.global_control().unfreeze, "unfreeze")
    }

    fn write_global(&self, value: u64, action: &str) -> Result<()> {
        let control = self.profile.global_control().control;
        for socket in 0..self.msrs.sockets() {
            self.msrs.write(socket, control, value).map_err(|e| {
                tracing::error!("Failed to {} counters on socket {}: {}", action, socket, e);
                ChaSliceError::Fatal(format!("{action} on socket {socket}: {e}"))
            })?;
        }
        Ok(())
    }

    /// Turn off the core prefetchers of each socket's handle core
    pub fn disable_prefetch(&self) -> Result<()> {
        let mask = Prefetcher::all_disabled_mask();
        for socket in 0..self.msrs.sockets() {
            self.msrs
                .write(socket, prefetch::MSR_PREFETCH_CONTROL, mask)
                .map_err(|e| {
                    tracing::error!("Failed to disable prefetch on socket {}: {}", socket, e);
                    ChaSliceError::Fatal(format!("disable prefetch on socket {socket}: {e}"))
                })?;
        }
        tracing::info!("Disabled hardware prefetchers (mask 0x{:X})", mask);
        Ok(())
    }

    /// Reset every box and program `events` into counter slots 0..n.
    ///
    /// More events than counters per box is fatal and nothing is written.
    /// Register failures and unknown events only skip the affected box or
    /// slot.
    pub fn program(&self, catalog: &EventCatalog, events: &[String]) -> Result<()> {
        let slots = self.profile.counters_per_box();
        if events.len() > slots {
            tracing::error!(
                "Cannot program {} events into {} counters per box",
                events.len(),
                slots
            );
            return Err(ChaSliceError::Fatal(format!(
                "{} events exceed {} counters per box",
                events.len(),
                slots
            )));
        }

        let selects: Vec<Option<EventSelect>> = events
            .iter()
            .map(|name| {
                let select = catalog.select(name);
                if select.is_none() {
                    tracing::warn!("Event '{}' not found in catalog, slot skipped", name);
                }
                select
            })
            .collect();

        let reset = self.profile.unit_reset().pattern();
        for socket in 0..self.msrs.sockets() {
            for cha in 0..self.profile.box_count() {
                if let Err(e) = self.msrs.write(socket, self.profile.box_ctl(cha), reset) {
                    tracing::warn!("Reset of CHA {} on socket {} failed: {}", cha, socket, e);
                    continue;
                }

                for (slot, select) in selects.iter().enumerate() {
                    if let Some(select) = select {
                        self.program_slot(socket, cha, slot, *select);
                    }
                }
            }
        }

        tracing::debug!("Programmed {} events on every CHA box", events.len());
        Ok(())
    }

    fn program_slot(&self, socket: usize, cha: usize, slot: usize, select: EventSelect) {
        let control = Register::new(
            self.profile.counter_ctl(cha, slot),
            self.profile.encode_control(select.code, select.umask),
        );
        if let Err(reason) = control.validate() {
            tracing::warn!("Invalid control for event 0x{:X}: {}", select.code, reason);
            return;
        }

        if let Err(e) = self
            .msrs
            .write(socket, control.address, control.to_msr_value())
        {
            tracing::warn!(
                "Programming slot {} of CHA {} on socket {} failed: {}",
                slot,
                cha,
                socket,
                e
            );
        }

        if let Some(filter) = self.profile.state_filter() {
            let value = filter.value_for(select.code);
            if let Err(e) = self.msrs.write(socket, self.profile.filter0(cha), value) {
                tracing::warn!("State filter of CHA {} on socket {} failed: {}", cha, socket, e);
            }
        }
    }

    /// Read slots `0..slots` of every box into
    /// `table[run][socket][cha][event_base + slot]`. Failed reads leave the
    /// cell untouched.
    pub fn read_counters(
        &self,
        run: usize,
        event_base: usize,
        slots: usize,
        table: &mut CountsTable,
    ) {
        mfence();
        for socket in 0..self.msrs.sockets() {
            for cha in 0..self.profile.box_count() {
                for slot in 0..slots.min(self.profile.counters_per_box()) {
                    let address = self.profile.counter_value(cha, slot);
                    match self.msrs.read(socket, address) {
                        Ok(value) => {
                            if !table.set(run, socket, cha, event_base + slot, value) {
                                tracing::warn!(
                                    "Count of CHA {} slot {} on socket {} outside table",
                                    cha,
                                    slot,
                                    socket
                                );
                            }
                        }
                        Err(e) => tracing::warn!(
                            "Reading CHA {} slot {} on socket {} failed: {}",
                            cha,
                            slot,
                            socket,
                            e
                        ),
                    }
                }
            }
        }
    }

    /// Clear counters and controls of every box without reprogramming
    pub fn reset_counters(&self) {
        let reset = self.profile.unit_reset().pattern();
        for socket in 0..self.msrs.sockets() {
            for cha in 0..self.profile.box_count() {
                if let Err(e) = self.msrs.write(socket, self.profile.box_ctl(cha), reset) {
                    tracing::warn!("Reset of CHA {} on socket {} failed: {}", cha, socket, e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::msr::fake::{self, FakeMsr};
    use chaslice_raw::Generation;

    const CATALOG: &str = r#"[
        { "EventName": "LOOKUP", "EventCode": "0x34", "UMask": "0x11" },
        { "EventName": "INSERTS", "EventCode": "0x35", "UMask": "0x01" },
        { "EventName": "NO_UMASK", "EventCode": "0x00" }
    ]"#;

    fn monitor(generation: Generation, sockets: usize) -> (ChaMonitor<FakeMsr>, fake::WriteLog) {
        let (handles, log) = fake::sockets(sockets);
        let monitor = ChaMonitor::new(generation.profile(), SocketMsrs::from_handles(handles));
        (monitor, log)
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_prefetch_mask() {
        assert_eq!(Prefetcher::all_disabled_mask(), 0xF);
        assert_eq!(Prefetcher::DcuIp.name(), "DCU IP");
    }

    #[test]
    fn test_freeze_unfreeze_touch_only_global_control() {
        let (monitor, log) = monitor(Generation::Skylake, 2);
        monitor.freeze().unwrap();
        monitor.unfreeze().unwrap();

        assert_eq!(
            log.borrow().as_slice(),
            &[
                (0, 0x700, 1 << 63),
                (100, 0x700, 1 << 63),
                (0, 0x700, 1 << 61),
                (100, 0x700, 1 << 61),
            ]
        );
    }

    #[test]
    fn test_freeze_failure_is_fatal() {
        let (mut handles, _log) = fake::sockets(2);
        handles[1].failing.insert(0x2FF0);
        let monitor = ChaMonitor::new(
            Generation::SapphireRapids.profile(),
            SocketMsrs::from_handles(handles),
        );
        assert!(matches!(monitor.freeze(), Err(ChaSliceError::Fatal(_))));
    }

    #[test]
    fn test_too_many_events_writes_nothing() {
        let (monitor, log) = monitor(Generation::IceLake, 1);
        let catalog = EventCatalog::parse(CATALOG).unwrap();
        let events = names(&["LOOKUP", "LOOKUP", "LOOKUP", "LOOKUP", "LOOKUP"]);

        assert!(matches!(
            monitor.program(&catalog, &events),
            Err(ChaSliceError::Fatal(_))
        ));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_program_box_sequence() {
        let (monitor, log) = monitor(Generation::Skylake, 1);
        let catalog = EventCatalog::parse(CATALOG).unwrap();
        monitor
            .program(&catalog, &names(&["LOOKUP", "MISSING", "INSERTS", "NO_UMASK"]))
            .unwrap();

        let log = log.borrow();
        // reset, slot 0 + filter, slot 2 + filter per box
        assert_eq!(log.len(), 24 * 5);
        assert_eq!(
            &log[..5],
            &[
                (0, 0xE00, 0x3),
                (0, 0xE01, 0x0040_1134),
                (0, 0xE05, 0x01E2_0000),
                (0, 0xE03, 0x0040_0135),
                (0, 0xE05, 0x200),
            ]
        );
    }

    #[test]
    fn test_failed_reset_skips_box() {
        let (mut handles, log) = fake::sockets(1);
        handles[0].failing.insert(0x2010);
        let monitor = ChaMonitor::new(
            Generation::SapphireRapids.profile(),
            SocketMsrs::from_handles(handles),
        );
        let catalog = EventCatalog::parse(CATALOG).unwrap();
        monitor.program(&catalog, &names(&["INSERTS"])).unwrap();

        let log = log.borrow();
        assert_eq!(log.len(), 27 * 2);
        assert!(log.iter().all(|&(_, msr, _)| !(0x2010..0x2020).contains(&msr)));
        assert!(log.contains(&(0, 0x2002, 0x0000_0135)));
    }

    #[test]
    fn test_read_counters_fills_batch_offset() {
        let (mut handles, _log) = fake::sockets(2);
        let profile = Generation::CascadeLake.profile();
        handles[1].set(profile.counter_value(3, 1), 77);
        handles[0].failing.insert(profile.counter_value(0, 0));
        let monitor = ChaMonitor::new(profile, SocketMsrs::from_handles(handles));

        let mut table = CountsTable::new(2, 2, profile.box_count(), 10);
        table.set(1, 0, 0, 8, 5);
        monitor.read_counters(1, 8, 2, &mut table);

        assert_eq!(table.get(1, 1, 3, 9), Some(77));
        assert_eq!(table.get(1, 0, 0, 8), Some(5));
        assert_eq!(table.get(0, 1, 3, 9), Some(0));
    }

    #[test]
    fn test_reset_counters_only_touches_box_control() {
        let (monitor, log) = monitor(Generation::IceLake, 1);
        monitor.reset_counters();
        let log = log.borrow();
        assert_eq!(log.len(), 40);
        assert!(log.iter().all(|&(_, _, value)| value == 0x3));
        assert_eq!(log[34].1, 0xB60);
    }
}
