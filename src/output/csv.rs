//! CSV report of per-package crawl outcomes

use csv::Writer;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tracing::{debug, info};

use super::{OutputError, OutputResult, OutputWriter};

const DEFAULT_BUFFER_SIZE: usize = 8192; // 8KB buffer

/// One row of the outcome report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutcomeRecord {
    /// Package identifier
    pub package_name: String,
    /// `downloaded`, `dropped`, `abandoned_busy` or `unattempted`
    pub outcome: String,
    /// Last failure seen for the package, empty when downloaded
    pub reason: String,
}

/// CSV writer for crawl outcome reports
pub struct CsvOutcomeWriter {
    writer: Writer<BufWriter<File>>,
    records_written: u64,
}

impl CsvOutcomeWriter {
    /// Create a report at `path`, creating parent directories as needed
    pub fn new<P: AsRef<Path>>(path: P) -> OutputResult<Self> {
        let path = path.as_ref();
        info!("Creating outcome report: path={}", path.display());
        super::ensure_parent(path)?;

        let file = File::create(path)
            .map_err(|e| OutputError::IoError(format!("Failed to create file: {e}")))?;
        let buf_writer = BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, file);

        Ok(Self {
            writer: Writer::from_writer(buf_writer),
            records_written: 0,
        })
    }

    /// Append one record
    pub fn write_record(&mut self, record: &OutcomeRecord) -> OutputResult<()> {
        self.writer
            .serialize(record)
            .map_err(|e| OutputError::CsvError(format!("Failed to write record: {e}")))?;
        self.records_written += 1;
        Ok(())
    }

    /// Append all records
    pub fn write_records<'a, I>(&mut self, records: I) -> OutputResult<()>
    where
        I: IntoIterator<Item = &'a OutcomeRecord>,
    {
        for record in records {
            self.write_record(record)?;
        }
        Ok(())
    }

    /// Number of records written so far
    pub fn records_written(&self) -> u64 {
        self.records_written
    }
}

impl OutputWriter for CsvOutcomeWriter {
    fn flush(&mut self) -> OutputResult<()> {
        self.writer
            .flush()
            .map_err(|e| OutputError::FlushError(format!("Failed to flush: {e}")))
    }

    fn close(mut self) -> OutputResult<()> {
        self.flush()?;

        let buf_writer = self
            .writer
            .into_inner()
            .map_err(|e| OutputError::IoError(format!("Failed to get inner writer: {e}")))?;
        let file = buf_writer
            .into_inner()
            .map_err(|e| OutputError::IoError(format!("Failed to get file handle: {e}")))?;
        file.sync_all()
            .map_err(|e| OutputError::IoError(format!("Failed to sync file: {e}")))?;

        debug!("Outcome report closed: {} records", self.records_written);
        Ok(())
    }
}
