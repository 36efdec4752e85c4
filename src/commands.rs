//! Command-entry procedures: the concrete measurement routines the
//! scheduler resolves by name through the native call map.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use log::{error, warn};

use crate::catalog::{Event, Register, INTEL_VENDOR_ID, IMC_1LMS_DEVICE_IDS};
use crate::driver::{AccessWidth, Driver};
use crate::error::HwError;
use crate::hwmon::{socket_sensor, HwmonReader};
use crate::measure::{count_bw, measure};
use crate::metrics::{
    BandwidthSample, CorrErrSample, DimmMaxTempSample, HwmonTempSample, MetricMeta, MetricRecord,
    MetricValue, PciCfgDump, PciDeviceDump, PmonCounterSample, ScrubAddressSample,
};
use crate::pmon::{get_bitfield, Pmon};
use crate::sink::DataSink;

/// Shared handles every command-entry procedure needs: the active driver
/// backend and the hwmon reader.
pub struct Context {
    pub driver: Arc<dyn Driver>,
    pub hwmon: HwmonReader,
}

impl Context {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Context {
            driver,
            hwmon: HwmonReader::new(),
        }
    }

    fn pmon(&self) -> Pmon {
        Pmon::new(self.driver.clone())
    }
}

fn parse_hex_ids(argv: &[String]) -> Result<HashSet<u16>, HwError> {
    argv.iter()
        .map(|s| {
            let trimmed = s.trim_start_matches("0x").trim_start_matches("0X");
            u16::from_str_radix(trimmed, 16).map_err(|_| HwError::BadArguments {
                reason: format!("not a hex device id: {}", s),
            })
        })
        .collect()
}

pub async fn read_scrubaddress(ctx: &Context, sink: &dyn DataSink, argv: &[String]) {
    let node = match argv.first() {
        Some(n) => n.clone(),
        None => {
            warn!("read_scrubaddress: missing node argument");
            return;
        }
    };

    tokio::time::sleep(Duration::from_secs(1)).await;

    let mut pmon = ctx.pmon();
    let result = (|| -> Result<ScrubAddressSample, HwError> {
        let lo = pmon.reg(&node, Register::ScrubAddressLo)?.get(AccessWidth::Dword)?;
        let hi = pmon.reg(&node, Register::ScrubAddressHi)?.get(AccessWidth::Dword)?;
        Ok(ScrubAddressSample { node: node.clone(), lo, hi })
    })();

    match result {
        Ok(sample) => {
            sink.write(&[MetricRecord {
                meta: MetricMeta::now("read_scrubaddress"),
                value: MetricValue::ScrubAddress(sample),
            }]);
        }
        Err(e) => error!("read_scrubaddress({}): {}", node, e),
    }
}

pub async fn read_pmoncntr(ctx: &Context, sink: &dyn DataSink, argv: &[String]) {
    let (node, seconds) = match (argv.get(0), argv.get(1).and_then(|s| s.parse::<f64>().ok())) {
        (Some(n), Some(s)) => (n.clone(), s),
        _ => {
            warn!("read_pmoncntr: expected [node, seconds]");
            return;
        }
    };

    let mut pmon = ctx.pmon();
    let result = async {
        let ctrl = pmon.reg(&node, Register::PmonCounterCfg0)?;
        let ctr = pmon.reg(&node, Register::PmonCounter0)?;
        let event = Event::CasCountRd;
        let value = measure(&ctrl, &ctr, event.selector(), Duration::from_secs_f64(seconds)).await?;
        Ok::<_, HwError>(PmonCounterSample {
            node: node.clone(),
            event_name: event.to_string(),
            counter: value,
            period_s: seconds,
        })
    }
    .await;

    match result {
        Ok(sample) => {
            sink.write(&[MetricRecord {
                meta: MetricMeta::now("read_pmoncntr"),
                value: MetricValue::PmonCounter(sample),
            }]);
        }
        Err(e) => error!("read_pmoncntr({}): {}", node, e),
    }
}

pub async fn read_bw(ctx: &Context, sink: &dyn DataSink, argv: &[String]) {
    let seconds: f64 = match argv.first().and_then(|s| s.parse().ok()) {
        Some(s) => s,
        None => {
            warn!("read_bw: expected [seconds]");
            return;
        }
    };

    let device_ids: HashSet<u16> = IMC_1LMS_DEVICE_IDS.iter().copied().collect();
    let vendor_ids: HashSet<u16> = [INTEL_VENDOR_ID].into_iter().collect();

    let devices = match ctx.driver.scan(&vendor_ids, &device_ids) {
        Ok(devices) => devices,
        Err(e) => {
            error!("read_bw: scan failed: {}", e);
            return;
        }
    };

    let mut records = Vec::new();
    for device in devices {
        let node = device.path.to_string();
        let mut pmon = ctx.pmon();
        let result = async {
            let rd_ctrl = pmon.reg(&node, Register::PmonCounterCfg0)?;
            let rd_ctr = pmon.reg(&node, Register::PmonCounter0)?;
            let wr_ctrl = pmon.reg(&node, Register::PmonCounterCfg1)?;
            let wr_ctr = pmon.reg(&node, Register::PmonCounter1)?;

            let duration = Duration::from_secs_f64(seconds);
            let (cas_rd, cas_wr) = futures::try_join!(
                measure(&rd_ctrl, &rd_ctr, Event::CasCountRd.selector(), duration),
                measure(&wr_ctrl, &wr_ctr, Event::CasCountWr.selector(), duration),
            )?;

            let (rd, wr, total) = count_bw(cas_rd, cas_wr);
            Ok::<_, HwError>(BandwidthSample {
                node: node.clone(),
                bw_rd_bytes_per_s: rd,
                bw_wr_bytes_per_s: wr,
                bw_total_bytes_per_s: total,
                period_s: seconds,
            })
        }
        .await;

        match result {
            Ok(sample) => records.push(MetricRecord {
                meta: MetricMeta::now("read_bw"),
                value: MetricValue::Bandwidth(sample),
            }),
            Err(e) => error!("read_bw({}): {}", node, e),
        }
    }

    sink.write(&records);
}

pub async fn read_correrrcnt(ctx: &Context, sink: &dyn DataSink, argv: &[String]) {
    let device_ids = match parse_hex_ids(argv) {
        Ok(ids) => ids,
        Err(e) => {
            warn!("read_correrrcnt: {}", e);
            return;
        }
    };
    let vendor_ids: HashSet<u16> = [INTEL_VENDOR_ID].into_iter().collect();

    let devices = match ctx.driver.scan(&vendor_ids, &device_ids) {
        Ok(devices) => devices,
        Err(e) => {
            error!("read_correrrcnt: scan failed: {}", e);
            return;
        }
    };

    let mut records = Vec::new();
    for device in devices {
        let node = device.path.to_string();
        let mut pmon = ctx.pmon();
        let result = (|| -> Result<CorrErrSample, HwError> {
            let mut correrrcnt = [0u32; 4];
            let mut correrrthrshld = [0u32; 4];
            for slot in 0..4u8 {
                let cnt_reg = Register::corr_err_count(slot).unwrap();
                let thr_reg = Register::corr_err_threshold(slot).unwrap();
                correrrcnt[slot as usize] = pmon.reg(&node, cnt_reg)?.get(AccessWidth::Dword)? as u32;
                correrrthrshld[slot as usize] = pmon.reg(&node, thr_reg)?.get(AccessWidth::Dword)? as u32;
            }
            let correrrorstatus = pmon.reg(&node, Register::CorrErrorStatus)?.get(AccessWidth::Dword)? as u32;

            Ok(CorrErrSample {
                node: node.clone(),
                correrrcnt,
                correrrthrshld,
                correrrorstatus,
            })
        })();

        match result {
            Ok(sample) => records.push(MetricRecord {
                meta: MetricMeta::now("read_correrrcnt"),
                value: MetricValue::CorrErr(sample),
            }),
            Err(e) => error!("read_correrrcnt({}): {}", node, e),
        }
    }

    sink.write(&records);
}

pub async fn read_dimm_temp(ctx: &Context, sink: &dyn DataSink, argv: &[String]) {
    let device_ids = match parse_hex_ids(argv) {
        Ok(ids) => ids,
        Err(e) => {
            warn!("read_dimm_temp: {}", e);
            return;
        }
    };
    let vendor_ids: HashSet<u16> = [INTEL_VENDOR_ID].into_iter().collect();

    let devices = match ctx.driver.scan(&vendor_ids, &device_ids) {
        Ok(devices) => devices,
        Err(e) => {
            error!("read_dimm_temp: scan failed: {}", e);
            return;
        }
    };

    let mut records = Vec::new();
    for device in devices {
        let node = device.path.to_string();
        let mut pmon = ctx.pmon();
        let result = (|| -> Result<DimmMaxTempSample, HwError> {
            let raw = pmon.reg(&node, Register::MemThermalTempReport)?.get(AccessWidth::Dword)?;
            let channel_max_temp = [
                get_bitfield(raw, 0, 7) as u8,
                get_bitfield(raw, 8, 15) as u8,
                get_bitfield(raw, 16, 23) as u8,
                get_bitfield(raw, 24, 31) as u8,
            ];
            Ok(DimmMaxTempSample { node: node.clone(), channel_max_temp })
        })();

        match result {
            Ok(sample) => records.push(MetricRecord {
                meta: MetricMeta::now("read_dimm_temp"),
                value: MetricValue::DimmMaxTemp(sample),
            }),
            Err(e) => error!("read_dimm_temp({}): {}", node, e),
        }
    }

    sink.write(&records);
}

pub async fn read_hwmon_temp(ctx: &Context, sink: &dyn DataSink, _argv: &[String]) {
    let records = match ctx.hwmon.read_all() {
        Ok(samples) => samples
            .into_iter()
            .map(|s| MetricRecord {
                meta: MetricMeta::now("read_hwmon_temp"),
                value: MetricValue::HwmonTemp(HwmonTempSample {
                    socket: s.socket,
                    sensor: s.sensor,
                    socket_sensor: socket_sensor(s.socket, s.sensor),
                    input: s.input,
                    max: s.max,
                    crit: s.crit,
                    label: s.label,
                }),
            })
            .collect(),
        Err(e) => {
            error!("read_hwmon_temp: {}", e);
            Vec::new()
        }
    };

    sink.write(&records);
}

pub async fn read_pcicfg(ctx: &Context, sink: &dyn DataSink, argv: &[String]) {
    let all_devs = argv.first().map(|s| s == "1" || s.eq_ignore_ascii_case("true")).unwrap_or(false);
    let all_regs = argv.get(1).map(|s| s == "1" || s.eq_ignore_ascii_case("true")).unwrap_or(false);

    let (vendor_ids, device_ids): (HashSet<u16>, HashSet<u16>) = if all_devs {
        (HashSet::new(), HashSet::new())
    } else {
        (
            [INTEL_VENDOR_ID].into_iter().collect(),
            IMC_1LMS_DEVICE_IDS.iter().copied().collect(),
        )
    };

    let devices = match ctx.driver.scan(&vendor_ids, &device_ids) {
        Ok(devices) => devices,
        Err(e) => {
            error!("read_pcicfg: scan failed: {}", e);
            return;
        }
    };

    let registers: Vec<Register> = if all_regs {
        Register::all()
    } else {
        vec![
            Register::VendorId,
            Register::MemThermalTempReport,
            Register::PmonCounter0,
            Register::PmonCounter1,
            Register::PmonCounter2,
            Register::PmonCounter3,
            Register::PmonCounter4,
        ]
    };

    let mut dumps = Vec::new();
    for device in devices {
        let node = device.path.to_string();
        let mut pmon = ctx.pmon();
        let mut regs = Vec::new();
        for reg in &registers {
            match pmon.reg(&node, *reg).and_then(|r| r.get(AccessWidth::Dword)) {
                Ok(value) => regs.push((format!("{:?}", reg), value as u32)),
                Err(e) => {
                    warn!("read_pcicfg({}): {:?}: {}", node, reg, e);
                }
            }
        }
        dumps.push(PciDeviceDump {
            path: node,
            seg: device.path.seg,
            bus: device.path.bus,
            dev: device.path.dev,
            func: device.path.func,
            regs,
        });
    }

    sink.write(&[MetricRecord {
        meta: MetricMeta::now("read_pcicfg"),
        value: MetricValue::PciCfgDump(PciCfgDump { devices: dumps }),
    }]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hex_ids_accepts_0x_prefix() {
        let argv = vec!["0x6fb2".to_string(), "6fb3".to_string()];
        let ids = parse_hex_ids(&argv).unwrap();
        assert!(ids.contains(&0x6fb2));
        assert!(ids.contains(&0x6fb3));
    }

    #[test]
    fn parse_hex_ids_rejects_garbage() {
        let argv = vec!["not-hex".to_string()];
        assert!(parse_hex_ids(&argv).is_err());
    }
}
