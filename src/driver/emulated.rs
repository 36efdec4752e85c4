//! Emulated backend: parses an `lspci -xxxx -D` style text dump into an
//! in-memory keyed byte-array store and serves reads/writes from it.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use super::{AccessWidth, CpuInfo, DeviceDescriptor, Driver, PciAddress, CONFIG_SPACE_SIZE, VENDOR_INTEL};
use crate::error::{HwError, Result};

/// Mapping from canonical PCI path string to that device's config-space
/// bytes (always `CONFIG_SPACE_SIZE` long).
pub type DumpStore = HashMap<PciAddress, Vec<u8>>;

pub struct EmulatedDriver {
    store: Mutex<DumpStore>,
}

impl EmulatedDriver {
    pub fn from_store(store: DumpStore) -> Self {
        EmulatedDriver {
            store: Mutex::new(store),
        }
    }

    /// Parses a dump file's text. A new device record starts on any line
    /// whose first whitespace-delimited token is a 12-character PCI path
    /// (`"SSSS:BB:DD.F"`); subsequent `"NN: <16 hex bytes>"` lines append to
    /// that device's byte array. The final record commits at EOF.
    pub fn parse_dump(text: &str) -> Result<DumpStore> {
        let mut store = DumpStore::new();
        let mut current: Option<(PciAddress, Vec<u8>)> = None;

        for (lineno, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim_end();
            if line.is_empty() {
                continue;
            }
            let first_token = line.split_whitespace().next().unwrap_or("");

            if first_token.len() == 12 && first_token.contains(':') {
                if let Ok(addr) = PciAddress::parse(first_token) {
                    if let Some((prev_addr, bytes)) = current.take() {
                        store.insert(prev_addr, bytes);
                    }
                    current = Some((addr, vec![0u8; CONFIG_SPACE_SIZE as usize]));
                    continue;
                }
            }

            if let Some(offset_str) = first_token.strip_suffix(':') {
                let offset = u16::from_str_radix(offset_str, 16).map_err(|_| HwError::MalformedDump {
                    line: lineno + 1,
                    reason: format!("bad offset token {:?}", first_token),
                })?;
                let (_, bytes) = current.as_mut().ok_or_else(|| HwError::MalformedDump {
                    line: lineno + 1,
                    reason: "data line before any device header".to_string(),
                })?;

                for (i, tok) in line.split_whitespace().skip(1).enumerate() {
                    let byte = u8::from_str_radix(tok, 16).map_err(|_| HwError::MalformedDump {
                        line: lineno + 1,
                        reason: format!("bad byte token {:?}", tok),
                    })?;
                    let idx = offset as usize + i;
                    if idx < bytes.len() {
                        bytes[idx] = byte;
                    }
                }
            }
        }

        if let Some((addr, bytes)) = current.take() {
            store.insert(addr, bytes);
        }

        Ok(store)
    }

    /// Renders a store back into dump-file text (round-trips with
    /// [`EmulatedDriver::parse_dump`] for stores whose device records are
    /// each a multiple of 16 bytes).
    pub fn format_dump(store: &DumpStore) -> String {
        let mut addrs: Vec<_> = store.keys().copied().collect();
        addrs.sort();

        let mut out = String::new();
        for addr in addrs {
            let bytes = &store[&addr];
            out.push_str(&format!("{} Memory Controller\n", addr));
            for (row, chunk) in bytes.chunks(16).enumerate() {
                out.push_str(&format!("{:02x}:", row * 16));
                for b in chunk {
                    out.push_str(&format!(" {:02x}", b));
                }
                out.push('\n');
            }
        }
        out
    }
}

impl Driver for EmulatedDriver {
    fn read(&self, node: PciAddress, offset: u16, width: AccessWidth) -> Result<u64> {
        let store = self.store.lock().unwrap();
        let bytes = store
            .get(&node)
            .ok_or_else(|| HwError::not_present(node.to_string()))?;

        match width {
            AccessWidth::Counter => {
                let low = u32::from_le_bytes([
                    bytes[offset as usize],
                    bytes[offset as usize + 1],
                    bytes[offset as usize + 2],
                    bytes[offset as usize + 3],
                ]) as u64;
                let high = u16::from_le_bytes([bytes[offset as usize + 4], bytes[offset as usize + 5]]) as u64;
                Ok((high << 32) | low)
            }
            _ => {
                let len = width.bytes() as usize;
                let mut value: u64 = 0;
                for i in (0..len).rev() {
                    value = (value << 8) | bytes[offset as usize + i] as u64;
                }
                Ok(value)
            }
        }
    }

    fn write(&self, node: PciAddress, offset: u16, value: u32) -> Result<()> {
        let mut store = self.store.lock().unwrap();
        let bytes = store
            .get_mut(&node)
            .ok_or_else(|| HwError::not_present(node.to_string()))?;
        let le = value.to_le_bytes();
        bytes[offset as usize..offset as usize + 4].copy_from_slice(&le);
        Ok(())
    }

    fn read_msr(&self, _cpu: u32, _addr: u32) -> Result<u64> {
        Err(HwError::not_present("msr (emulated backend has no MSR plane)".to_string()))
    }

    fn write_msr(&self, _cpu: u32, _addr: u32, _value: u64) -> Result<()> {
        Err(HwError::not_present("msr (emulated backend has no MSR plane)".to_string()))
    }

    fn scan(&self, vendor_ids: &HashSet<u16>, device_ids: &HashSet<u16>) -> Result<Vec<DeviceDescriptor>> {
        let store = self.store.lock().unwrap();
        let mut found = Vec::new();
        let mut addrs: Vec<_> = store.keys().copied().collect();
        addrs.sort();

        for addr in addrs {
            let bytes = &store[&addr];
            let vendor_id = u16::from_le_bytes([bytes[0], bytes[1]]);
            let device_id = u16::from_le_bytes([bytes[2], bytes[3]]);
            if !vendor_ids.is_empty() && !vendor_ids.contains(&vendor_id) {
                continue;
            }
            if !device_ids.is_empty() && !device_ids.contains(&device_id) {
                continue;
            }
            found.push(DeviceDescriptor {
                path: addr,
                vendor_id,
                device_id,
            });
        }
        Ok(found)
    }

    fn cpu_info(&self) -> Result<CpuInfo> {
        Ok(CpuInfo {
            vendor_id: VENDOR_INTEL,
            family: 6,
            model: 0x55,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = "0000:7f:0a.0 Memory Controller: Intel Corporation Device 2042\n\
00: 86 80 42 20 06 04 10 00 00 00 80 05 00 00 00 00\n\
10: 00 00 00 00 00 00 00 00 00 00 00 00 00 00 00 00\n";

    #[test]
    fn parses_vendor_and_device_id_from_header_line() {
        let store = EmulatedDriver::parse_dump(DUMP).unwrap();
        let addr = PciAddress::new(0, 0x7f, 0x0a, 0);
        let bytes = &store[&addr];
        assert_eq!(u16::from_le_bytes([bytes[0], bytes[1]]), 0x8086);
        assert_eq!(u16::from_le_bytes([bytes[2], bytes[3]]), 0x2042);
    }

    #[test]
    fn scan_filters_by_vendor_and_device() {
        let store = EmulatedDriver::parse_dump(DUMP).unwrap();
        let driver = EmulatedDriver::from_store(store);

        let mut vendors = HashSet::new();
        vendors.insert(0x8086u16);
        let mut devices = HashSet::new();
        devices.insert(0x2042u16);
        assert_eq!(driver.scan(&vendors, &devices).unwrap().len(), 1);

        let mut other_vendors = HashSet::new();
        other_vendors.insert(0x1002u16);
        assert_eq!(driver.scan(&other_vendors, &devices).unwrap().len(), 0);
    }

    #[test]
    fn write_then_read_round_trips() {
        let store = EmulatedDriver::parse_dump(DUMP).unwrap();
        let driver = EmulatedDriver::from_store(store);
        let addr = PciAddress::new(0, 0x7f, 0x0a, 0);

        driver.write(addr, 0x20, 0xDEAD_BEEF).unwrap();
        let v = driver.read(addr, 0x20, AccessWidth::Dword).unwrap();
        assert_eq!(v, 0xDEAD_BEEF);
    }

    #[test]
    fn counter_composes_16_bit_high() {
        let store = EmulatedDriver::parse_dump(DUMP).unwrap();
        let driver = EmulatedDriver::from_store(store);
        let addr = PciAddress::new(0, 0x7f, 0x0a, 0);

        driver.write(addr, 0x00, 0x4433_2211).unwrap();
        {
            let mut s = driver.store.lock().unwrap();
            let bytes = s.get_mut(&addr).unwrap();
            bytes[0x04] = 0x55;
            bytes[0x05] = 0x66;
        }
        let v = driver.read(addr, 0x00, AccessWidth::Counter).unwrap();
        assert_eq!(v, 112_585_078_694_417);
    }
}
