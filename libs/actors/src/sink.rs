//! Event Log Sinks
//!
//! A sink receives one [`EventRecord`] per processed event. [`FileSink`]
//! appends human-readable lines to `<log_dir>/log_<id>.txt` and mirrors each
//! record as a `tracing` event; [`MemorySink`] keeps records for inspection.

use crate::error::{MachineError, Result};
use crate::events::EventRecord;
use chrono::Local;
use codec::ActorId;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{LineWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

pub trait EventSink: Send {
    fn record(&mut self, record: &EventRecord) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Per-machine log file, opened in append mode
pub struct FileSink {
    path: PathBuf,
    writer: LineWriter<File>,
}

impl FileSink {
    pub fn log_path(log_dir: &Path, actor_id: ActorId) -> PathBuf {
        log_dir.join(format!("log_{}.txt", actor_id))
    }

    /// Open the log and write its two header lines
    pub fn create(log_dir: &Path, actor_id: ActorId, tick_rate: u32) -> Result<Self> {
        fs::create_dir_all(log_dir).map_err(|e| MachineError::sink(log_dir, e))?;

        let path = Self::log_path(log_dir, actor_id);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| MachineError::sink(&path, e))?;

        let mut sink = Self {
            path,
            writer: LineWriter::new(file),
        };
        sink.write_line(&format!(
            "Machine {} log started at {}",
            actor_id,
            Local::now().format("%Y-%m-%d %H:%M:%S%.6f")
        ))?;
        sink.write_line(&format!("Clock rate: {} ticks per second", tick_rate))?;

        info!(machine = %actor_id, path = ?sink.path, "Event log opened");
        Ok(sink)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        writeln!(self.writer, "{}", line).map_err(|e| MachineError::sink(&self.path, e))
    }
}

impl EventSink for FileSink {
    fn record(&mut self, record: &EventRecord) -> Result<()> {
        info!(
            machine = %record.actor_id,
            kind = record.kind.as_str(),
            clock = record.clock,
            queue_len = record.queue_len,
            "{}",
            record.details()
        );
        self.write_line(&record.to_log_line())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| MachineError::sink(&self.path, e))
    }
}

/// Collects records in memory; clones share the same buffer
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<EventRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<EventRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl EventSink for MemorySink {
    fn record(&mut self, record: &EventRecord) -> Result<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use codec::Message;
    use tempfile::TempDir;

    #[test]
    fn test_file_sink_writes_header_and_lines() {
        let dir = TempDir::new().unwrap();
        let id = ActorId::new(1);

        let mut sink = FileSink::create(dir.path(), id, 4).unwrap();
        sink.record(&EventRecord::internal(id, 1, 0)).unwrap();
        sink.record(&EventRecord::receive(id, 7, 2, &Message::new(ActorId::new(3), 6)))
            .unwrap();
        sink.flush().unwrap();

        let contents = fs::read_to_string(dir.path().join("log_1.txt")).unwrap();
        let lines: Vec<&str> = contents.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Machine 1 log started at "));
        assert_eq!(lines[1], "Clock rate: 4 ticks per second");
        assert!(lines[2].ends_with("| INTERNAL | Clock: 1 | Queue: 0 | Internal event"));
        assert!(lines[3].contains("| RECEIVE | Clock: 7 | Queue: 2 |"));
    }

    #[test]
    fn test_file_sink_appends_across_runs() {
        let dir = TempDir::new().unwrap();
        let id = ActorId::new(2);

        FileSink::create(dir.path(), id, 1).unwrap();
        FileSink::create(dir.path(), id, 2).unwrap();

        let contents = fs::read_to_string(FileSink::log_path(dir.path(), id)).unwrap();
        assert_eq!(contents.matches("log started").count(), 2);
    }

    #[test]
    fn test_file_sink_creates_log_dir() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("logs").join("run1");

        let sink = FileSink::create(&nested, ActorId::new(5), 3).unwrap();
        assert!(sink.path().exists());
    }

    #[test]
    fn test_memory_sink_clones_share_records() {
        let sink = MemorySink::new();
        let mut writer = sink.clone();

        writer
            .record(&EventRecord::internal(ActorId::new(1), 1, 0))
            .unwrap();

        assert_eq!(sink.len(), 1);
        assert_eq!(sink.records()[0].kind, EventKind::Internal);
    }
}
