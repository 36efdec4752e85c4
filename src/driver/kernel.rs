//! Linux kernel backend: PCI config space over sysfs, MSRs over
//! `/dev/cpu/N/msr`.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::FileExt;
use std::path::PathBuf;

use log::debug;

use super::{AccessWidth, CpuInfo, DeviceDescriptor, Driver, PciAddress, VENDOR_AMD, VENDOR_INTEL, VENDOR_UNKNOWN};
use crate::error::{HwError, Result};

const PCI_DEVICES_ROOT: &str = "/sys/bus/pci/devices";
const CPUINFO_PATH: &str = "/proc/cpuinfo";

pub struct KernelDriver {
    pci_root: PathBuf,
    cpuinfo_path: PathBuf,
}

impl Default for KernelDriver {
    fn default() -> Self {
        KernelDriver {
            pci_root: PathBuf::from(PCI_DEVICES_ROOT),
            cpuinfo_path: PathBuf::from(CPUINFO_PATH),
        }
    }
}

impl KernelDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn config_path(&self, node: PciAddress) -> PathBuf {
        self.pci_root.join(node.to_string()).join("config")
    }

    fn read_hex_sibling(&self, node: PciAddress, name: &str) -> Result<u16> {
        let path = self.pci_root.join(node.to_string()).join(name);
        let text = fs::read_to_string(&path)
            .map_err(|_| HwError::not_present(path.display().to_string()))?;
        let trimmed = text.trim().trim_start_matches("0x");
        u16::from_str_radix(trimmed, 16)
            .map_err(|e| HwError::transport(node.to_string(), 0, e))
    }
}

impl Driver for KernelDriver {
    fn read(&self, node: PciAddress, offset: u16, width: AccessWidth) -> Result<u64> {
        let path = self.config_path(node);
        let mut file = File::open(&path).map_err(|_| HwError::not_present(path.display().to_string()))?;

        match width {
            AccessWidth::Counter => {
                let mut low = [0u8; 4];
                let mut high = [0u8; 2];
                file.seek(SeekFrom::Start(offset as u64))
                    .map_err(|e| HwError::transport(node.to_string(), offset as u32, e))?;
                file.read_exact(&mut low)
                    .map_err(|e| HwError::transport(node.to_string(), offset as u32, e))?;
                file.seek(SeekFrom::Start(offset as u64 + 4))
                    .map_err(|e| HwError::transport(node.to_string(), offset as u32, e))?;
                file.read_exact(&mut high)
                    .map_err(|e| HwError::transport(node.to_string(), offset as u32, e))?;
                let low = u32::from_le_bytes(low) as u64;
                let high = u16::from_le_bytes(high) as u64;
                Ok((high << 32) | low)
            }
            _ => {
                let len = width.bytes() as usize;
                let mut buf = [0u8; 4];
                file.seek(SeekFrom::Start(offset as u64))
                    .map_err(|e| HwError::transport(node.to_string(), offset as u32, e))?;
                file.read_exact(&mut buf[..len])
                    .map_err(|e| HwError::transport(node.to_string(), offset as u32, e))?;
                let mut value: u64 = 0;
                for i in (0..len).rev() {
                    value = (value << 8) | buf[i] as u64;
                }
                Ok(value)
            }
        }
    }

    fn write(&self, node: PciAddress, offset: u16, value: u32) -> Result<()> {
        let path = self.config_path(node);
        let mut file = OpenOptions::new()
            .write(true)
            .open(&path)
            .map_err(|_| HwError::not_present(path.display().to_string()))?;
        file.seek(SeekFrom::Start(offset as u64))
            .map_err(|e| HwError::transport(node.to_string(), offset as u32, e))?;
        file.write_all(&value.to_le_bytes())
            .map_err(|e| HwError::transport(node.to_string(), offset as u32, e))?;
        Ok(())
    }

    fn read_msr(&self, cpu: u32, addr: u32) -> Result<u64> {
        let path = format!("/dev/cpu/{}/msr", cpu);
        let file = File::open(&path).map_err(|_| HwError::not_present(path.clone()))?;
        let mut buf = [0u8; 8];
        file.read_exact_at(&mut buf, addr as u64)
            .map_err(|e| HwError::transport(path, addr, e))?;
        Ok(u64::from_le_bytes(buf))
    }

    fn write_msr(&self, cpu: u32, addr: u32, value: u64) -> Result<()> {
        let path = format!("/dev/cpu/{}/msr", cpu);
        let file = OpenOptions::new()
            .write(true)
            .open(&path)
            .map_err(|_| HwError::not_present(path.clone()))?;
        file.write_all_at(&value.to_le_bytes(), addr as u64)
            .map_err(|e| HwError::transport(path, addr, e))?;
        Ok(())
    }

    fn scan(&self, vendor_ids: &HashSet<u16>, device_ids: &HashSet<u16>) -> Result<Vec<DeviceDescriptor>> {
        let mut entries: Vec<_> = match fs::read_dir(&self.pci_root) {
            Ok(dir) => dir.filter_map(|e| e.ok()).collect(),
            Err(_) => {
                debug!("pci root {} absent, returning empty scan", self.pci_root.display());
                return Ok(Vec::new());
            }
        };
        entries.sort_by_key(|e| e.file_name());

        let mut found = Vec::new();
        for entry in entries {
            let name = entry.file_name();
            let name = match name.to_str() {
                Some(n) => n,
                None => continue,
            };
            let node = match PciAddress::parse(name) {
                Ok(n) => n,
                Err(_) => continue,
            };
            let vendor_id = match self.read_hex_sibling(node, "vendor") {
                Ok(v) => v,
                Err(_) => continue,
            };
            let device_id = match self.read_hex_sibling(node, "device") {
                Ok(v) => v,
                Err(_) => continue,
            };
            if !vendor_ids.is_empty() && !vendor_ids.contains(&vendor_id) {
                continue;
            }
            if !device_ids.is_empty() && !device_ids.contains(&device_id) {
                continue;
            }
            found.push(DeviceDescriptor {
                path: node,
                vendor_id,
                device_id,
            });
        }
        Ok(found)
    }

    fn cpu_info(&self) -> Result<CpuInfo> {
        let text = fs::read_to_string(&self.cpuinfo_path)
            .map_err(|_| HwError::not_present(self.cpuinfo_path.display().to_string()))?;

        let mut vendor_id_str = None;
        let mut model = None;
        let mut family = None;

        for line in text.lines().take(21) {
            if let Some((key, value)) = line.split_once("\t: ") {
                match key {
                    "vendor_id" => vendor_id_str = Some(value.trim().to_string()),
                    "model" => model = value.trim().parse::<u8>().ok(),
                    "cpu family" => family = value.trim().parse::<u8>().ok(),
                    _ => {}
                }
            }
        }

        let vendor_id = match vendor_id_str.as_deref() {
            Some("GenuineIntel") => VENDOR_INTEL,
            Some("AuthenticAMD") => VENDOR_AMD,
            _ => VENDOR_UNKNOWN,
        };

        Ok(CpuInfo {
            vendor_id,
            model: model.unwrap_or(0),
            family: family.unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_uses_canonical_pci_string() {
        let drv = KernelDriver::new();
        let node = PciAddress::new(0, 0x7f, 0x10, 1);
        assert_eq!(
            drv.config_path(node),
            PathBuf::from("/sys/bus/pci/devices/0000:7f:10.1/config")
        );
    }
}
