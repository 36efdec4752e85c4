//! Hypervisor VSI backend: reads/writes route through a `get`/`set`
//! primitive over a sysinfo node tree rather than raw files.

use std::collections::HashSet;

use log::debug;

use super::{AccessWidth, CpuInfo, DeviceDescriptor, Driver, PciAddress, VENDOR_UNKNOWN};
use crate::error::{HwError, Result};

/// The host `vsi.get`/`vsi.set` primitive. A real deployment wires this to
/// the hypervisor's sysinfo accessor; tests substitute an in-memory fake.
pub trait VsiTransport: Send + Sync {
    fn get(&self, path: &str) -> Result<u64>;
    fn set(&self, path: &str, value: u64) -> Result<()>;
    /// Lists immediate child node names under `path`, as produced by a
    /// directory-like sysinfo node (used for `scan`'s device enumeration).
    fn list(&self, path: &str) -> Result<Vec<String>>;
}

pub struct VsiDriver<T: VsiTransport> {
    transport: T,
}

impl<T: VsiTransport> VsiDriver<T> {
    pub fn new(transport: T) -> Self {
        VsiDriver { transport }
    }

    fn config_node(node: PciAddress, offset: u16, size: u16) -> String {
        format!(
            "/hardware/pci/seg/{:#x}/bus/{:#x}/slot/{:#x}/func/{:#x}/pciConfigReg/size/{}/addr/{:#x}",
            node.seg, node.bus, node.dev, node.func, size, offset
        )
    }

    fn msr_node(cpu: u32, addr: u32) -> String {
        format!("/hardware/msr/pcpu/{}/addr/{:#x}", cpu, addr)
    }
}

impl<T: VsiTransport> Driver for VsiDriver<T> {
    fn read(&self, node: PciAddress, offset: u16, width: AccessWidth) -> Result<u64> {
        match width {
            AccessWidth::Counter => {
                let low = self
                    .transport
                    .get(&Self::config_node(node, offset, 4))
                    .map_err(|_| HwError::transport(node.to_string(), offset as u32, "vsi get failed"))?;
                let high = self
                    .transport
                    .get(&Self::config_node(node, offset + 4, 2))
                    .map_err(|_| HwError::transport(node.to_string(), offset as u32, "vsi get failed"))?;
                Ok(((high & 0xFFFF) << 32) | (low & 0xFFFF_FFFF))
            }
            _ => {
                let size = width.bytes();
                self.transport
                    .get(&Self::config_node(node, offset, size))
                    .map_err(|_| HwError::transport(node.to_string(), offset as u32, "vsi get failed"))
            }
        }
    }

    fn write(&self, node: PciAddress, offset: u16, value: u32) -> Result<()> {
        self.transport
            .set(&Self::config_node(node, offset, 4), value as u64)
            .map_err(|_| HwError::transport(node.to_string(), offset as u32, "vsi set failed"))
    }

    fn read_msr(&self, cpu: u32, addr: u32) -> Result<u64> {
        self.transport
            .get(&Self::msr_node(cpu, addr))
            .map_err(|_| HwError::transport(format!("cpu{}", cpu), addr, "vsi get failed"))
    }

    fn write_msr(&self, cpu: u32, addr: u32, value: u64) -> Result<()> {
        self.transport
            .set(&Self::msr_node(cpu, addr), value)
            .map_err(|_| HwError::transport(format!("cpu{}", cpu), addr, "vsi set failed"))
    }

    fn scan(&self, vendor_ids: &HashSet<u16>, device_ids: &HashSet<u16>) -> Result<Vec<DeviceDescriptor>> {
        let root = "/hardware/pci/devices";
        let names = match self.transport.list(root) {
            Ok(n) => n,
            Err(_) => {
                debug!("vsi root {} absent, returning empty scan", root);
                return Ok(Vec::new());
            }
        };

        let mut found = Vec::new();
        for name in names {
            let node = match PciAddress::parse(&name) {
                Ok(n) => n,
                Err(_) => continue,
            };
            let header = match self.transport.get(&format!("{}/{}/pciConfigHeader", root, name)) {
                Ok(h) => h,
                Err(_) => continue,
            };
            let vendor_id = (header & 0xFFFF) as u16;
            let device_id = ((header >> 16) & 0xFFFF) as u16;
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
        // The hypervisor tree does not expose /proc/cpuinfo; VSI deployments
        // are expected to consult the kernel backend for this instead.
        Ok(CpuInfo {
            vendor_id: VENDOR_UNKNOWN,
            family: 0,
            model: 0,
        })
    }
}
