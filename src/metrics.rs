//! The typed metric value model shared by every command-entry procedure.

use std::fs;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use serde_derive::Serialize;

const DMI_PRODUCT_SERIAL: &str = "/sys/devices/virtual/dmi/id/product_serial";

static HOST_ID: OnceLock<String> = OnceLock::new();

/// Resolves the stable per-host identifier: the DMI product serial if
/// present, else the POSIX hostname. Memoized for the process lifetime.
pub fn host_id() -> &'static str {
    HOST_ID.get_or_init(|| {
        if let Ok(serial) = fs::read_to_string(DMI_PRODUCT_SERIAL) {
            let trimmed = serial.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
        nix::unistd::gethostname()
            .ok()
            .and_then(|s| s.into_string().ok())
            .unwrap_or_else(|| "unknown-host".to_string())
    })
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetricMeta {
    pub tool: String,
    pub creation_timestamp: DateTime<Utc>,
    pub hostname: String,
}

impl MetricMeta {
    pub fn now(tool: impl Into<String>) -> Self {
        MetricMeta {
            tool: tool.into(),
            creation_timestamp: Utc::now(),
            hostname: host_id().to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BandwidthSample {
    pub node: String,
    pub bw_rd_bytes_per_s: u64,
    pub bw_wr_bytes_per_s: u64,
    pub bw_total_bytes_per_s: u64,
    pub period_s: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScrubAddressSample {
    pub node: String,
    pub lo: u64,
    pub hi: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PmonCounterSample {
    pub node: String,
    pub event_name: String,
    pub counter: u64,
    pub period_s: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CorrErrSample {
    pub node: String,
    pub correrrcnt: [u32; 4],
    pub correrrthrshld: [u32; 4],
    pub correrrorstatus: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DimmMaxTempSample {
    pub node: String,
    pub channel_max_temp: [u8; 4],
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HwmonTempSample {
    pub socket: u32,
    pub sensor: u32,
    pub socket_sensor: u32,
    pub input: f64,
    pub max: Option<f64>,
    pub crit: Option<f64>,
    pub label: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PciDeviceDump {
    pub path: String,
    pub seg: u16,
    pub bus: u8,
    pub dev: u8,
    pub func: u8,
    pub regs: Vec<(String, u32)>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PciCfgDump {
    pub devices: Vec<PciDeviceDump>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Bandwidth(BandwidthSample),
    ScrubAddress(ScrubAddressSample),
    PmonCounter(PmonCounterSample),
    CorrErr(CorrErrSample),
    DimmMaxTemp(DimmMaxTempSample),
    HwmonTemp(HwmonTempSample),
    PciCfgDump(PciCfgDump),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetricRecord {
    pub meta: MetricMeta,
    pub value: MetricValue,
}

/// `(tool_name, primary_identifier)`; governs dedup suppression in the sink.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct DedupKey(pub String, pub String);

impl MetricValue {
    /// The ordered field values this metric contributes to a CSV line,
    /// after the shared `creation_timestamp;tool;hostname;` prefix.
    pub fn csv_fields(&self) -> Vec<String> {
        match self {
            MetricValue::Bandwidth(b) => vec![
                b.node.clone(),
                b.bw_rd_bytes_per_s.to_string(),
                b.bw_wr_bytes_per_s.to_string(),
                b.bw_total_bytes_per_s.to_string(),
            ],
            MetricValue::ScrubAddress(s) => vec![s.node.clone(), s.lo.to_string(), s.hi.to_string()],
            MetricValue::PmonCounter(p) => vec![
                p.node.clone(),
                p.event_name.clone(),
                p.counter.to_string(),
                p.period_s.to_string(),
            ],
            MetricValue::CorrErr(c) => {
                let mut fields = vec![c.node.clone()];
                fields.extend(c.correrrcnt.iter().map(|v| v.to_string()));
                fields.extend(c.correrrthrshld.iter().map(|v| v.to_string()));
                fields.push(c.correrrorstatus.to_string());
                fields
            }
            MetricValue::DimmMaxTemp(d) => {
                let mut fields = vec![d.node.clone()];
                fields.extend(d.channel_max_temp.iter().map(|v| v.to_string()));
                fields
            }
            MetricValue::HwmonTemp(h) => vec![
                h.label.clone(),
                h.socket_sensor.to_string(),
                h.input.to_string(),
                h.crit.map(|v| v.to_string()).unwrap_or_default(),
                h.max.map(|v| v.to_string()).unwrap_or_default(),
            ],
            MetricValue::PciCfgDump(_) => Vec::new(),
        }
    }

    /// The primary identifier used as the second half of the dedup key.
    pub fn primary_id(&self) -> String {
        match self {
            MetricValue::Bandwidth(b) => b.node.clone(),
            MetricValue::ScrubAddress(s) => s.node.clone(),
            MetricValue::PmonCounter(p) => p.node.clone(),
            MetricValue::CorrErr(c) => c.node.clone(),
            MetricValue::DimmMaxTemp(d) => d.node.clone(),
            MetricValue::HwmonTemp(h) => h.socket_sensor.to_string(),
            MetricValue::PciCfgDump(_) => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hwmon_csv_fields_are_ordered_per_spec() {
        let sample = HwmonTempSample {
            socket: 0,
            sensor: 1,
            socket_sensor: 1,
            input: 42.0,
            max: Some(95.0),
            crit: Some(105.0),
            label: "Package id 0".to_string(),
        };
        let fields = MetricValue::HwmonTemp(sample).csv_fields();
        assert_eq!(fields, vec!["Package id 0", "1", "42", "105", "95"]);
    }

    #[test]
    fn dimm_temp_decode_matches_literal_example() {
        let value: u32 = 0x4B3C2D1E;
        let channels = [
            (value & 0xFF) as u8,
            ((value >> 8) & 0xFF) as u8,
            ((value >> 16) & 0xFF) as u8,
            ((value >> 24) & 0xFF) as u8,
        ];
        assert_eq!(channels, [30, 45, 60, 75]);
    }
}
