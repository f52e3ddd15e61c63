//! Register layouts shared by every CHA generation
//!
//! The generations differ in *where* registers live and in which bits of the
//! counter control word they use, not in the shape of the words themselves.
//! The per-generation modules fill these structures with their constants.

use crate::register::RegisterLayout;

/// Number of programmable counters per CHA box on every supported generation
pub const COUNTERS_PER_BOX: usize = 4;

/// Event code of `UNC_CHA_LLC_LOOKUP.*`
pub const LLC_LOOKUP_EVENT: u32 = 0x34;

/// Global uncore PMON control register and its freeze/unfreeze patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalControl {
    /// Global control MSR (`U_MSR_PMON_GLOBAL_CTL`)
    pub control: u64,
    /// Global status MSR (overflow bits)
    pub status: u64,
    /// Value that stops every uncore counter of the socket
    pub freeze: u64,
    /// Value that restarts every uncore counter of the socket
    pub unfreeze: u64,
}

/// Register offsets relative to a box's base (unit control) register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxOffsets {
    pub status: u64,
    /// First counter control register; slots follow contiguously
    pub ctl0: u64,
    /// First counter data register; slots follow contiguously
    pub ctr0: u64,
    pub filter0: u64,
    pub filter1: u64,
}

/// Unit control reset bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitReset {
    /// Resets the counter control registers of the box
    pub control_bit: u32,
    /// Resets the counter data registers of the box
    pub counters_bit: u32,
}

impl UnitReset {
    /// Combined hard reset (control | counters)
    pub const fn pattern(&self) -> u64 {
        (1 << self.control_bit) | (1 << self.counters_bit)
    }
}

/// Coherence-state filter exposed by some generations through filter 0
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateFilter {
    /// Event code that gets the all-states pattern
    pub trigger_event: u32,
    /// Track every coherence state (F, M, E, S, I)
    pub all_states: u64,
    /// Pattern written for every other event
    pub clear: u64,
}

impl StateFilter {
    /// Filter value to program alongside `event_code`
    pub const fn value_for(&self, event_code: u32) -> u64 {
        if event_code == self.trigger_event {
            self.all_states
        } else {
            self.clear
        }
    }
}

/// CHA Unit Counter Control Register layout
///
/// ## Register Format
///
/// | Bits   | Field          | Description                                   |
/// |--------|----------------|-----------------------------------------------|
/// | 0-7    | event_select   | Event code to count                           |
/// | 8-15   | unit_mask      | Event sub-select (umask)                      |
/// | 18     | edge_detect    | Count rising edges vs level                   |
/// | 22     | enable         | Enable counter (absent on Sapphire Rapids)    |
/// | 23     | invert         | Invert threshold comparison                   |
/// | 24-29  | threshold      | Threshold for filtering (6 bits)              |
/// | 32-57  | unit_mask_ext  | Extended umask / opcode match (26 bits)       |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChaCounterControl {
    /// Event select code (bits 0-7)
    pub event_select: u8,

    /// Unit mask / event sub-select (bits 8-15)
    pub unit_mask: u8,

    /// Edge detection mode (bit 18)
    pub edge_detect: bool,

    /// Enable counter (bit 22)
    pub enable: bool,

    /// Invert threshold comparison (bit 23)
    pub invert: bool,

    /// Threshold value (bits 24-29, 6 bits)
    pub threshold: u8,

    /// Extended unit mask (bits 32-57, 26 bits)
    pub unit_mask_ext: u32,
}

const UNIT_MASK_EXT_MAX: u32 = (1 << 26) - 1;

impl RegisterLayout for ChaCounterControl {
    fn to_msr_value(&self) -> u64 {
        (self.event_select as u64)
            | ((self.unit_mask as u64) << 8)
            | (if self.edge_detect { 1 << 18 } else { 0 })
            | (if self.enable { 1 << 22 } else { 0 })
            | (if self.invert { 1 << 23 } else { 0 })
            | ((self.threshold as u64 & 0x3F) << 24)
            | ((self.unit_mask_ext as u64 & UNIT_MASK_EXT_MAX as u64) << 32)
    }

    fn from_msr_value(value: u64) -> Self {
        Self {
            event_select: (value & 0xFF) as u8,
            unit_mask: ((value >> 8) & 0xFF) as u8,
            edge_detect: (value & (1 << 18)) != 0,
            enable: (value & (1 << 22)) != 0,
            invert: (value & (1 << 23)) != 0,
            threshold: ((value >> 24) & 0x3F) as u8,
            unit_mask_ext: ((value >> 32) & UNIT_MASK_EXT_MAX as u64) as u32,
        }
    }

    fn validate(&self) -> Result<(), &'static str> {
        if self.threshold > 63 {
            return Err("Threshold must be <= 63 (6 bits)");
        }
        if self.unit_mask_ext > UNIT_MASK_EXT_MAX {
            return Err("Extended umask must fit in 26 bits");
        }
        Ok(())
    }
}

/// Core prefetcher control (`MSR_MISC_FEATURE_CONTROL`)
pub mod prefetch {
    /// Prefetch control MSR
    pub const MSR_PREFETCH_CONTROL: u64 = 0x1A4;

    /// L2 hardware prefetcher disable bit
    pub const L2_HARDWARE_DISABLE: u32 = 0;

    /// L2 adjacent cache line prefetcher disable bit
    pub const L2_ADJACENT_DISABLE: u32 = 1;

    /// DCU streamer prefetcher disable bit
    pub const DCU_STREAMER_DISABLE: u32 = 2;

    /// DCU IP prefetcher disable bit
    pub const DCU_IP_DISABLE: u32 = 3;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_control_encoding() {
        let ctrl = ChaCounterControl {
            event_select: 0x34,
            unit_mask: 0x11,
            enable: true,
            ..Default::default()
        };
        assert_eq!(ctrl.to_msr_value(), 0x0040_1134);

        let ctrl = ChaCounterControl {
            event_select: 0x34,
            unit_mask: 0xFF,
            unit_mask_ext: 0x1BC1,
            ..Default::default()
        };
        assert_eq!(ctrl.to_msr_value(), 0x0000_1BC1_0000_FF34);
    }

    #[test]
    fn test_counter_control_decodes_written_word() {
        let decoded = ChaCounterControl::from_msr_value(0x0000_1BC1_0540_1134 | (1 << 18));
        assert_eq!(decoded.event_select, 0x34);
        assert_eq!(decoded.unit_mask, 0x11);
        assert!(decoded.enable);
        assert!(decoded.edge_detect);
        assert_eq!(decoded.threshold, 0x05);
        assert_eq!(decoded.unit_mask_ext, 0x1BC1);
    }

    #[test]
    fn test_counter_control_validation() {
        let mut ctrl = ChaCounterControl::default();
        assert!(ctrl.validate().is_ok());

        ctrl.threshold = 64;
        assert!(ctrl.validate().is_err());

        ctrl.threshold = 63;
        ctrl.unit_mask_ext = 1 << 26;
        assert!(ctrl.validate().is_err());
    }

    #[test]
    fn test_state_filter_selection() {
        let filter = StateFilter {
            trigger_event: LLC_LOOKUP_EVENT,
            all_states: 0x01E2_0000,
            clear: 0x200,
        };
        assert_eq!(filter.value_for(0x34), 0x01E2_0000);
        assert_eq!(filter.value_for(0x35), 0x200);
    }

    #[test]
    fn test_unit_reset_pattern() {
        let reset = UnitReset {
            control_bit: 8,
            counters_bit: 9,
        };
        assert_eq!(reset.pattern(), 0x300);
    }
}
