//! CSV sink integration: format, dedup, and multi-kind record handling
//! exercised through the public `sink`/`metrics` API rather than a single
//! module's internals.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use chrono::Utc;

use imc_telemetry::metrics::{
    BandwidthSample, CorrErrSample, MetricMeta, MetricRecord, MetricValue,
};
use imc_telemetry::sink::{CsvSink, DataSink};

/// A `Write` handle that hands the sink a clone while keeping a second
/// handle here to read back what was written, since `CsvSink` owns its
/// writer and exposes no accessor.
#[derive(Clone)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    fn new() -> Self {
        SharedBuffer(Arc::new(Mutex::new(Vec::new())))
    }

    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn bw_record(node: &str, rd: u64) -> MetricRecord {
    MetricRecord {
        meta: MetricMeta {
            tool: "read_bw".to_string(),
            creation_timestamp: Utc::now(),
            hostname: "host-a".to_string(),
        },
        value: MetricValue::Bandwidth(BandwidthSample {
            node: node.to_string(),
            bw_rd_bytes_per_s: rd,
            bw_wr_bytes_per_s: 0,
            bw_total_bytes_per_s: rd,
            period_s: 1.0,
        }),
    }
}

fn corr_err_record(node: &str) -> MetricRecord {
    MetricRecord {
        meta: MetricMeta {
            tool: "read_correrrcnt".to_string(),
            creation_timestamp: Utc::now(),
            hostname: "host-a".to_string(),
        },
        value: MetricValue::CorrErr(CorrErrSample {
            node: node.to_string(),
            correrrcnt: [0, 0, 0, 0],
            correrrthrshld: [1, 1, 1, 1],
            correrrorstatus: 0,
        }),
    }
}

#[test]
fn distinct_tools_with_the_same_node_do_not_collide_in_dedup() {
    let buf = SharedBuffer::new();
    let sink = CsvSink::new(buf.clone());

    sink.write(&[bw_record("0000:7f:0a.0", 64_000_000)]);
    sink.write(&[corr_err_record("0000:7f:0a.0")]);
    sink.write(&[bw_record("0000:7f:0a.0", 64_000_000)]);

    assert_eq!(buf.contents().lines().count(), 2);
}

#[test]
fn a_batch_write_preserves_record_order() {
    let buf = SharedBuffer::new();
    let sink = CsvSink::new(buf.clone());
    sink.write(&[bw_record("0000:7f:0a.0", 1), bw_record("0000:7f:0a.2", 2)]);

    let text = buf.contents();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("0000:7f:0a.0"));
    assert!(lines[1].contains("0000:7f:0a.2"));
}

#[test]
fn every_field_is_quoted_and_semicolon_terminated() {
    let buf = SharedBuffer::new();
    let sink = CsvSink::new(buf.clone());
    sink.write(&[bw_record("0000:7f:0a.0", 64_000_000)]);

    let text = buf.contents();
    let line = text.lines().next().unwrap();

    assert!(line.ends_with("\";"));
    assert_eq!(line.matches('"').count() % 2, 0);
    assert!(line.contains("\"64000000\";"));
}
