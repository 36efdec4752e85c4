//! hwmon sysfs reader: enumerates `/sys/class/hwmon/hwmonN/tempM_*` sensors.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

#[derive(Clone, Debug, PartialEq)]
pub struct HwmonTempRecord {
    pub socket: u32,
    pub sensor: u32,
    /// Degrees Celsius (sysfs reports milli-degrees; divided down here).
    pub input: f64,
    pub max: Option<f64>,
    pub crit: Option<f64>,
    pub label: String,
}

pub struct HwmonReader {
    root: PathBuf,
}

impl Default for HwmonReader {
    fn default() -> Self {
        HwmonReader {
            root: PathBuf::from("/sys/class/hwmon"),
        }
    }
}

impl HwmonReader {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn with_root(root: PathBuf) -> Self {
        HwmonReader { root }
    }

    pub fn read_all(&self) -> Result<Vec<HwmonTempRecord>> {
        let mut records = Vec::new();

        let mut hwmon_dirs: Vec<_> = match fs::read_dir(&self.root) {
            Ok(d) => d.filter_map(|e| e.ok()).collect(),
            Err(_) => return Ok(records),
        };
        hwmon_dirs.sort_by_key(|e| e.file_name());

        for entry in hwmon_dirs {
            let name = entry.file_name();
            let name = match name.to_str() {
                Some(n) if n.starts_with("hwmon") => n,
                _ => continue,
            };
            let socket: u32 = match name.trim_start_matches("hwmon").parse() {
                Ok(n) => n,
                Err(_) => continue,
            };

            for sensor in 1..=63u32 {
                if let Some(record) = Self::read_sensor(&entry.path(), socket, sensor) {
                    records.push(record);
                }
            }
        }

        Ok(records)
    }

    fn read_sensor(dir: &Path, socket: u32, sensor: u32) -> Option<HwmonTempRecord> {
        let input = read_milli_degrees(dir, sensor, "input")?;
        let max = read_milli_degrees(dir, sensor, "max");
        let crit = read_milli_degrees(dir, sensor, "crit");
        let label = read_label(dir, sensor).unwrap_or_else(|| format!("temp{}", sensor));

        Some(HwmonTempRecord {
            socket,
            sensor,
            input,
            max,
            crit,
            label,
        })
    }
}

fn read_milli_degrees(dir: &Path, sensor: u32, field: &str) -> Option<f64> {
    let path = dir.join(format!("temp{}_{}", sensor, field));
    let text = fs::read_to_string(path).ok()?;
    let milli: i64 = text.trim().parse().ok()?;
    Some(milli as f64 / 1000.0)
}

fn read_label(dir: &Path, sensor: u32) -> Option<String> {
    let path = dir.join(format!("temp{}_label", sensor));
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

/// `socket * 1024 + sensor`, the composite dedup/primary identifier used by
/// the CSV sink for hwmon records.
pub fn socket_sensor(socket: u32, sensor: u32) -> u32 {
    socket * 1024 + sensor
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs as stdfs;

    #[test]
    fn socket_sensor_packs_as_specified() {
        assert_eq!(socket_sensor(0, 1), 1);
        assert_eq!(socket_sensor(2, 5), 2053);
    }

    #[test]
    fn reads_sensor_with_label_and_divides_milli_degrees() {
        let tmp = std::env::temp_dir().join(format!("hwmon-test-{}", std::process::id()));
        let hwmon0 = tmp.join("hwmon0");
        stdfs::create_dir_all(&hwmon0).unwrap();
        stdfs::write(hwmon0.join("temp1_input"), "42000\n").unwrap();
        stdfs::write(hwmon0.join("temp1_max"), "95000\n").unwrap();
        stdfs::write(hwmon0.join("temp1_crit"), "105000\n").unwrap();
        stdfs::write(hwmon0.join("temp1_label"), "Package id 0\n").unwrap();

        let reader = HwmonReader::with_root(tmp.clone());
        let records = reader.read_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].socket, 0);
        assert_eq!(records[0].sensor, 1);
        assert_eq!(records[0].input, 42.0);
        assert_eq!(records[0].max, Some(95.0));
        assert_eq!(records[0].label, "Package id 0");

        stdfs::remove_dir_all(&tmp).ok();
    }

    #[test]
    fn missing_input_skips_sensor() {
        let tmp = std::env::temp_dir().join(format!("hwmon-test2-{}", std::process::id()));
        let hwmon0 = tmp.join("hwmon0");
        stdfs::create_dir_all(&hwmon0).unwrap();
        stdfs::write(hwmon0.join("temp2_max"), "95000\n").unwrap();

        let reader = HwmonReader::with_root(tmp.clone());
        let records = reader.read_all().unwrap();
        assert!(records.is_empty());

        stdfs::remove_dir_all(&tmp).ok();
    }
}
