//! Measurement primitives: arm-sleep-read counter sampling, bandwidth
//! arithmetic, and byte-rate formatting.

use std::time::Duration;

use crate::catalog::EventSelector;
use crate::driver::AccessWidth;
use crate::error::Result;
use crate::pmon::RegisterAccess;

/// DRAM CAS line size in bytes; a CAS count multiplied by this is bytes
/// transferred.
pub const CAS_LINE_BYTES: u64 = 64;

/// Arms `ctrl_reg` with `event`, waits `duration`, freezes the counter, and
/// returns the raw 48-bit count from `ctr_reg`. Leaves the counter armed
/// with reset held (disarmed) on return.
pub async fn measure(
    ctrl_reg: &RegisterAccess<'_>,
    ctr_reg: &RegisterAccess<'_>,
    event: EventSelector,
    duration: Duration,
) -> Result<u64> {
    ctrl_reg.set_event(event, true, true)?;
    tokio::time::sleep(duration).await;
    ctrl_reg.set_event(event, false, false)?;
    let value = ctr_reg.get(AccessWidth::Counter)?;
    ctrl_reg.set_event(event, false, true)?;
    Ok(value)
}

/// Converts a pair of CAS counters into (read, write, total) byte rates.
pub fn count_bw(cas_rd: u64, cas_wr: u64) -> (u64, u64, u64) {
    let rd = cas_rd * CAS_LINE_BYTES;
    let wr = cas_wr * CAS_LINE_BYTES;
    (rd, wr, rd + wr)
}

/// Formats a byte rate using binary multiples: B/s, KB/s, MB/s, GB/s, TB/s.
pub fn humanbytes(bytes_per_s: f64) -> String {
    const UNITS: [&str; 5] = ["B/s", "KB/s", "MB/s", "GB/s", "TB/s"];
    let mut value = bytes_per_s;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}
