//! Closed enumerations of PMON register offsets, Uncore event selectors, and
//! the IMC/Ubox PCI device IDs for Skylake-class Xeon Scalable platforms.

use std::fmt::{Display, Formatter, Result as FmtResult};

use strum::IntoEnumIterator;

/// Intel vendor ID, as reported in PCI config space offset 0x00.
pub const INTEL_VENDOR_ID: u16 = 0x8086;

/// Ubox device ID; exposes the node-ID mapping registers used by
/// [`crate::pmon::SocketMap`].
pub const UBOX_DEVICE_ID: u16 = 0x2014;

/// IMC channel device IDs, 1LMS variant (scheduler-side).
pub const IMC_1LMS_DEVICE_IDS: [u16; 3] = [0x2042, 0x2046, 0x204A];

/// IMC channel device IDs, 1LMDP variant (data-path side).
pub const IMC_1LMDP_DEVICE_IDS: [u16; 3] = [0x2043, 0x2047, 0x204B];

/// A named PMON/config-space register, carrying its byte offset inside a
/// device's 4 KiB PCI configuration space.
#[repr(u16)]
#[derive(Clone, Copy, Debug, Display, EnumIter, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub enum Register {
    VendorId = 0x00,
    MemThermalTempReport = 0x60,

    PmonCounter0 = 0xA0,
    PmonCounter1 = 0xA8,
    PmonCounter2 = 0xB0,
    PmonCounter3 = 0xB8,
    PmonCounter4 = 0xC0,

    PmonCounterCfg0 = 0xD8,
    PmonCounterCfg1 = 0xDC,
    PmonCounterCfg2 = 0xE0,
    PmonCounterCfg3 = 0xE4,
    PmonCounterCfg4 = 0xE8,

    CorrErrCount0 = 0x104,
    CorrErrCount1 = 0x108,
    CorrErrCount2 = 0x10C,
    CorrErrCount3 = 0x110,

    CorrErrThreshold0 = 0x11C,
    CorrErrThreshold1 = 0x120,
    CorrErrThreshold2 = 0x124,
    CorrErrThreshold3 = 0x128,

    CorrErrorStatus = 0x134,

    ScrubAddressLo = 0x90C,
    ScrubAddressHi = 0x910,
    ScrubCtl = 0x914,
    SmiSpareCtl = 0x924,
    ScrubAddress2Lo = 0x950,
    ScrubAddress2Hi = 0x954,
    ScrubMask = 0x96C,
}

/// Registers inside the *Ubox* device's config space, used to resolve
/// socket identity (see [`crate::pmon::SocketMap`]). Kept out of
/// [`Register`] because their offsets collide with IMC register offsets
/// (different devices, same byte offsets) and a `#[repr(u16)]` enum cannot
/// carry two variants with the same discriminant.
#[repr(u16)]
#[derive(Clone, Copy, Debug, Display, EnumIter, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub enum UboxRegister {
    /// Local node ID, used to resolve socket identity.
    UboxLnid = 0xC0,
    /// Group ID, used alongside [`UboxRegister::UboxLnid`].
    UboxGid = 0xD4,
}

impl UboxRegister {
    pub fn offset(self) -> u16 {
        self as u16
    }
}

impl Register {
    pub fn offset(self) -> u16 {
        self as u16
    }

    /// The counter/config-register pair for a given PMON counter slot
    /// `0..=4`.
    pub fn pmon_pair(slot: u8) -> Option<(Register, Register)> {
        let counters = [
            Register::PmonCounter0,
            Register::PmonCounter1,
            Register::PmonCounter2,
            Register::PmonCounter3,
            Register::PmonCounter4,
        ];
        let configs = [
            Register::PmonCounterCfg0,
            Register::PmonCounterCfg1,
            Register::PmonCounterCfg2,
            Register::PmonCounterCfg3,
            Register::PmonCounterCfg4,
        ];
        let idx = slot as usize;
        if idx >= counters.len() {
            return None;
        }
        Some((counters[idx], configs[idx]))
    }

    pub fn corr_err_count(slot: u8) -> Option<Register> {
        [
            Register::CorrErrCount0,
            Register::CorrErrCount1,
            Register::CorrErrCount2,
            Register::CorrErrCount3,
        ]
        .get(slot as usize)
        .copied()
    }

    pub fn corr_err_threshold(slot: u8) -> Option<Register> {
        [
            Register::CorrErrThreshold0,
            Register::CorrErrThreshold1,
            Register::CorrErrThreshold2,
            Register::CorrErrThreshold3,
        ]
        .get(slot as usize)
        .copied()
    }

    /// Every register, in declaration order; used by `read_pcicfg`'s
    /// "all registers" sweep.
    pub fn all() -> Vec<Register> {
        Register::iter().collect()
    }
}

/// An 8-bit umask paired with an 8-bit event-select code, as consumed by a
/// PMON counter-config register (see [`crate::pmon::encode_control_word`]).
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct EventSelector {
    pub umask: u8,
    pub ev_sel: u8,
}

impl EventSelector {
    pub const fn new(umask: u8, ev_sel: u8) -> Self {
        EventSelector { umask, ev_sel }
    }
}

/// Named Uncore PMON events for the IMC.
#[derive(Clone, Copy, Debug, Display, EnumIter, Eq, PartialEq, PartialOrd, Ord)]
pub enum Event {
    /// DRAM read column-access-strobes; multiply by 64 for bytes transferred.
    CasCountRd,
    /// DRAM write column-access-strobes; multiply by 64 for bytes transferred.
    CasCountWr,
    /// Corrected ECC error count.
    EccCorrectableErrors,
    /// Read CAS count for a specific DIMM rank, `0..=7`.
    RdCasRank(u8),
    /// Write CAS count for a specific DIMM rank, `0..=7`.
    WrCasRank(u8),
}

impl Event {
    pub fn selector(self) -> EventSelector {
        match self {
            Event::CasCountRd => EventSelector::new(0b0000_0011, 0x04),
            Event::CasCountWr => EventSelector::new(0b0000_1100, 0x04),
            Event::EccCorrectableErrors => EventSelector::new(0, 0x09),
            Event::RdCasRank(rank) => EventSelector::new(0x10, 0xB0 + rank),
            Event::WrCasRank(rank) => EventSelector::new(0x10, 0xB8 + rank),
        }
    }
}

impl Display for EventSelector {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "umask={:#04x} ev_sel={:#04x}", self.umask, self.ev_sel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_offsets_match_catalog() {
        assert_eq!(Register::VendorId.offset(), 0x00);
        assert_eq!(Register::MemThermalTempReport.offset(), 0x60);
        assert_eq!(Register::ScrubAddressLo.offset(), 0x90C);
        assert_eq!(Register::CorrErrorStatus.offset(), 0x134);
    }

    #[test]
    fn cas_count_rd_selector() {
        let sel = Event::CasCountRd.selector();
        assert_eq!(sel.umask, 0b0000_0011);
        assert_eq!(sel.ev_sel, 0x04);
    }

    #[test]
    fn rank_events_span_eight_ranks() {
        for rank in 0..8u8 {
            let sel = Event::RdCasRank(rank).selector();
            assert_eq!(sel.ev_sel, 0xB0 + rank);
        }
    }

    #[test]
    fn pmon_pair_out_of_range_is_none() {
        assert!(Register::pmon_pair(5).is_none());
        assert!(Register::pmon_pair(4).is_some());
    }

    #[test]
    fn ubox_registers_share_offsets_with_imc_registers_in_a_different_device() {
        // Legitimate at the hardware level: the Ubox and the IMC are
        // different devices, so their config spaces don't actually overlap.
        assert_eq!(UboxRegister::UboxLnid.offset(), Register::PmonCounter4.offset());
        assert_eq!(UboxRegister::UboxGid.offset(), 0xD4);
    }
}
