//! `DataSink` interface and the bundled CSV-to-stdout implementation.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Mutex;

use log::warn;

use crate::metrics::{DedupKey, MetricRecord};

/// Downstream consumer of emitted metric records. Infallible from the
/// core's point of view; a sink that talks to a remote system is
/// responsible for its own transport errors.
pub trait DataSink: Send + Sync {
    fn write(&self, records: &[MetricRecord]);
}

/// Semicolon-delimited, double-quoted CSV sink with no header row.
/// Deduplicates by `(tool, primary_identifier)`: a record whose emitted
/// field tuple matches the previously retained tuple for its key is
/// suppressed.
pub struct CsvSink<W: Write + Send> {
    writer: Mutex<W>,
    seen: Mutex<HashMap<DedupKey, Vec<String>>>,
}

impl<W: Write + Send> CsvSink<W> {
    pub fn new(writer: W) -> Self {
        CsvSink {
            writer: Mutex::new(writer),
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the dedup key, the rendered CSV line, and the per-metric
    /// field tuple the dedup table compares against. `creation_timestamp`
    /// is part of the rendered line but deliberately excluded from the
    /// dedup tuple — it changes on every invocation, so including it would
    /// mean no record is ever suppressed.
    fn format_line(record: &MetricRecord) -> (DedupKey, String, Vec<String>) {
        let tool = record.meta.tool.clone();
        let primary = record.value.primary_id();
        let key = DedupKey(tool.clone(), primary);
        let dedup_fields = record.value.csv_fields();

        let mut line_fields = vec![
            record.meta.creation_timestamp.to_rfc3339(),
            tool,
            record.meta.hostname.clone(),
        ];
        line_fields.extend(dedup_fields.iter().cloned());

        let mut line = String::new();
        for field in &line_fields {
            line.push('"');
            line.push_str(field);
            line.push_str("\";");
        }

        (key, line, dedup_fields)
    }
}

impl<W: Write + Send> DataSink for CsvSink<W> {
    fn write(&self, records: &[MetricRecord]) {
        let mut seen = self.seen.lock().unwrap();
        let mut writer = self.writer.lock().unwrap();

        for record in records {
            let (key, line, dedup_fields) = Self::format_line(record);

            if seen.get(&key) == Some(&dedup_fields) {
                continue;
            }

            if let Err(e) = writeln!(writer, "{}", line) {
                warn!("failed to write metric record: {}", e);
                continue;
            }
            seen.insert(key, dedup_fields);
        }
    }
}
