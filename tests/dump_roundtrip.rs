//! Dump parser round-trip: `parse(format(store)) == store` for any store
//! whose device records are each a multiple of 16 bytes.

use std::collections::HashSet;

use pretty_assertions::assert_eq;

use imc_telemetry::driver::emulated::EmulatedDriver;
use imc_telemetry::driver::{AccessWidth, Driver, PciAddress};

const DUMP: &str = "\
0000:7f:0a.0 Memory Controller: Intel Corporation Device 2042
00: 86 80 42 20 06 04 10 00 00 00 80 05 00 00 00 00
10: 00 00 00 00 00 00 00 00 00 00 00 00 00 00 00 00
0000:7f:0a.2 Memory Controller: Intel Corporation Device 2046
00: 86 80 46 20 06 04 10 00 00 00 80 05 00 00 00 00
10: 00 00 00 00 00 00 00 00 00 00 00 00 00 00 00 00
";

#[test]
fn parse_then_format_then_parse_is_stable() {
    let store = EmulatedDriver::parse_dump(DUMP).unwrap();
    let rendered = EmulatedDriver::format_dump(&store);
    let reparsed = EmulatedDriver::parse_dump(&rendered).unwrap();
    assert_eq!(store, reparsed);
}

#[test]
fn parsed_store_serves_reads_through_the_driver() {
    let store = EmulatedDriver::parse_dump(DUMP).unwrap();
    let driver = EmulatedDriver::from_store(store);

    let a = PciAddress::new(0, 0x7f, 0x0a, 0);
    let b = PciAddress::new(0, 0x7f, 0x0a, 2);

    let vendor_a = driver.read(a, 0x00, AccessWidth::Word).unwrap();
    let device_a = driver.read(a, 0x02, AccessWidth::Word).unwrap();
    assert_eq!(vendor_a, 0x8086);
    assert_eq!(device_a, 0x2042);

    let device_b = driver.read(b, 0x02, AccessWidth::Word).unwrap();
    assert_eq!(device_b, 0x2046);
}

#[test]
fn scan_returns_both_devices_in_sorted_path_order() {
    let store = EmulatedDriver::parse_dump(DUMP).unwrap();
    let driver = EmulatedDriver::from_store(store);

    let vendor_ids: HashSet<u16> = [0x8086u16].into_iter().collect();
    let devices = driver.scan(&vendor_ids, &HashSet::new()).unwrap();

    assert_eq!(devices.len(), 2);
    assert!(devices[0].path.func < devices[1].path.func);
}

#[test]
fn malformed_dump_reports_the_offending_line() {
    let bad = "0000:7f:0a.0 header\n00: zz 80 42 20 06 04 10 00 00 00 80 05 00 00 00 00\n";
    let err = EmulatedDriver::parse_dump(bad).unwrap_err();
    assert!(err.to_string().contains("line 2"));
}
