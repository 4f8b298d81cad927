//! I/O for the replay binary
//!
//! # Components
//!
//! - `csv_format` - record shapes, validation, balance output
//! - `reader` - streaming reader over an ops CSV file

pub mod csv_format;
pub mod reader;

pub use csv_format::{convert_csv_record, write_balances_csv, CsvRecord, OpKind, OpRecord};
pub use reader::OpsReader;
