//! Streaming CSV reader for replay operations
//!
//! Iterator over validated operations from an ops CSV file. Rows stream one
//! at a time; a malformed row yields an `Err` item carrying its line number
//! and the iteration continues, so one bad row never sinks a replay.

use crate::io::csv_format::{convert_csv_record, CsvRecord, OpRecord};
use crate::types::EngineError;
use csv::{ReaderBuilder, Trim};
use std::fs::File;
use std::path::Path;

/// Streaming reader over an ops CSV file
#[derive(Debug)]
pub struct OpsReader {
    reader: csv::Reader<File>,
    line_num: u64,
}

impl OpsReader {
    /// Open an ops CSV file for streaming iteration
    ///
    /// Fields are whitespace-trimmed and trailing optional columns may be
    /// omitted.
    pub fn new(path: &Path) -> Result<Self, EngineError> {
        let file = File::open(path)?;
        let reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(file);
        Ok(OpsReader {
            reader,
            line_num: 1,
        })
    }
}

impl Iterator for OpsReader {
    type Item = Result<OpRecord, EngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        let raw = self.reader.deserialize::<CsvRecord>().next()?;
        self.line_num += 1;
        let line = self.line_num;

        let item = match raw {
            Err(e) => Err(EngineError::from(e)),
            Ok(record) => convert_csv_record(record).map_err(|e| match e {
                EngineError::ParseError { message, .. } => EngineError::ParseError {
                    line: Some(line),
                    message,
                },
                other => other,
            }),
        };
        Some(item)
    }
}
