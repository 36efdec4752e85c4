//! PMON accessor facade: dispatches register operations to the selected
//! driver and encodes Uncore PMON control-register bitfields.

use std::collections::HashMap;
use std::sync::Arc;

use crate::catalog::{EventSelector, Register, UBOX_DEVICE_ID};
use crate::driver::{AccessWidth, Driver, PciAddress};
use crate::error::Result;

/// Encodes a 32-bit PMON control word.
///
/// Layout (MSB to LSB): thresh\[8\]=0, invert\[1\]=0, en\[1\], rsv\[1\]=0,
/// ov_en\[1\]=0, rsv\[1\]=0, edge_det\[1\]=0, rst\[1\], rsv\[1\]=0,
/// umask\[8\], ev_sel\[8\].
pub fn encode_control_word(sel: EventSelector, enable: bool, reset: bool) -> u32 {
    let en: u32 = if enable { 1 } else { 0 };
    let rst: u32 = if reset { 1 } else { 0 };
    (en << 22) | (rst << 17) | ((sel.umask as u32) << 8) | sel.ev_sel as u32
}

pub fn get_bitfield(value: u64, start: u32, end: u32) -> u64 {
    let width = end - start + 1;
    let mask = if width >= 64 { u64::MAX } else { (1u64 << width) - 1 };
    (value >> start) & mask
}

/// A value object bound to a specific driver, node, and register; replaces
/// the dynamic per-register accessor of the original implementation with a
/// plain constructor.
pub struct RegisterAccess<'a> {
    driver: &'a dyn Driver,
    node: PciAddress,
    reg: Register,
}

impl<'a> RegisterAccess<'a> {
    pub fn new(driver: &'a dyn Driver, node: PciAddress, reg: Register) -> Self {
        RegisterAccess { driver, node, reg }
    }

    pub fn get(&self, width: AccessWidth) -> Result<u64> {
        crate::driver::read_register(self.driver, self.node, self.reg, width)
    }

    pub fn set(&self, value: u32) -> Result<()> {
        self.driver.write(self.node, self.reg.offset(), value)
    }

    pub fn set_event(&self, sel: EventSelector, enable: bool, reset: bool) -> Result<()> {
        self.set(encode_control_word(sel, enable, reset))
    }
}

/// Resolves a PCI bus number to a socket id by scanning Ubox devices and
/// reading their LNID/GID mapping registers.
///
/// Grounded on the original's `Dev2SocketID` helper; guards the off-by-one
/// the original carries (a sentinel-terminated range list indexed one past
/// its last real entry) with an explicit bound check instead of trusting
/// the sentinel arithmetic.
pub struct SocketMap {
    /// Bus number ranges in ascending order; `ranges[i]` is the first bus
    /// number belonging to socket `i`. The implicit upper bound for the
    /// last socket is `0x100` (PCI bus numbers are a single byte).
    ranges: Vec<u8>,
}

impl SocketMap {
    pub fn from_driver(driver: &dyn Driver) -> Result<Self> {
        let devices = driver.scan(&std::iter::once(crate::driver::VENDOR_INTEL).collect(), &std::iter::once(UBOX_DEVICE_ID).collect())?;

        let mut buses: Vec<u8> = devices.iter().map(|d| d.path.bus).collect();
        buses.sort_unstable();
        buses.dedup();

        Ok(SocketMap { ranges: buses })
    }

    /// Returns the socket id owning `bus`, or `None` if `bus` falls outside
    /// every known range (the bound this method exists to enforce).
    pub fn socket_for_bus(&self, bus: u8) -> Option<usize> {
        if self.ranges.is_empty() {
            return None;
        }
        // ranges[i] is the start of socket i's bus range; find the last
        // start <= bus.
        let mut socket = None;
        for (idx, &start) in self.ranges.iter().enumerate() {
            if bus >= start {
                socket = Some(idx);
            } else {
                break;
            }
        }
        socket
    }
}

/// The PMON facade: a driver plus a cache of node-path parses.
pub struct Pmon {
    driver: Arc<dyn Driver>,
    paths: HashMap<String, PciAddress>,
}

impl Pmon {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Pmon {
            driver,
            paths: HashMap::new(),
        }
    }

    /// Parses a device path, memoizing the parse, and returns a
    /// [`RegisterAccess`] for the named register.
    pub fn reg(&mut self, path: &str, reg: Register) -> Result<RegisterAccess<'_>> {
        let node = if let Some(n) = self.paths.get(path) {
            *n
        } else {
            let n = PciAddress::parse(path)?;
            self.paths.insert(path.to_string(), n);
            n
        };
        Ok(RegisterAccess::new(self.driver.as_ref(), node, reg))
    }

    pub fn driver(&self) -> &dyn Driver {
        self.driver.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Event;

    #[test]
    fn control_word_matches_literal_example() {
        let sel = Event::CasCountRd.selector();
        let word = encode_control_word(sel, true, true);
        // bit22 (en) | bit17 (rst) | umask[15:8]=0x03 | ev_sel[7:0]=0x04
        assert_eq!(word, 0x0042_0304);
        assert_eq!(word, 4_326_148);
    }

    #[test]
    fn get_bitfield_extracts_inclusive_range() {
        assert_eq!(get_bitfield(0b1111_0000, 4, 7), 0b1111);
        assert_eq!(get_bitfield(0x4B3C2D1E, 0, 7), 0x1E);
        assert_eq!(get_bitfield(0x4B3C2D1E, 24, 31), 0x4B);
    }

    #[test]
    fn socket_map_assigns_bus_to_nearest_range_start() {
        let map = SocketMap { ranges: vec![0x00, 0x80] };
        assert_eq!(map.socket_for_bus(0x00), Some(0));
        assert_eq!(map.socket_for_bus(0x7f), Some(0));
        assert_eq!(map.socket_for_bus(0x80), Some(1));
        assert_eq!(map.socket_for_bus(0xff), Some(1));
    }

    #[test]
    fn socket_map_returns_none_below_first_range() {
        let map = SocketMap { ranges: vec![0x10] };
        assert_eq!(map.socket_for_bus(0x00), None);
    }
}
