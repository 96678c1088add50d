//! Uploaded-file parsing
//!
//! Turns a CSV, spreadsheet or JSON upload into one uniform in-memory
//! [`Table`]: ordered column names plus row records.

mod csv_source;
mod json_source;
mod sheet_source;
mod table;

pub use table::{Row, Table};

use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("the uploaded file contains no rows")]
    EmptyFile,

    #[error("unsupported file type: {0:?} (expected .csv, .xlsx, .xls or .json)")]
    UnsupportedType(String),

    #[error("malformed content: {0}")]
    MalformedContent(String),
}

pub type Result<T> = std::result::Result<T, ParseError>;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Decoder selected from the declared file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Spreadsheet,
    Json,
}

impl SourceFormat {
    pub fn from_file_name(name: &str) -> Result<Self> {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match ext.as_str() {
            "csv" => Ok(Self::Csv),
            "xlsx" | "xls" => Ok(Self::Spreadsheet),
            "json" => Ok(Self::Json),
            _ => Err(ParseError::UnsupportedType(ext)),
        }
    }
}

/// Parse uploaded bytes. The extension of `declared_name` is trusted.
pub fn parse(bytes: &[u8], declared_name: &str) -> Result<Table> {
    let format = SourceFormat::from_file_name(declared_name)?;
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

    let table = match format {
        SourceFormat::Csv => csv_source::parse(bytes)?,
        SourceFormat::Spreadsheet => sheet_source::parse(bytes)?,
        SourceFormat::Json => json_source::parse(bytes)?,
    };

    if table.is_empty() {
        return Err(ParseError::EmptyFile);
    }
    Ok(table)
}

pub(crate) fn malformed(e: impl std::fmt::Display) -> ParseError {
    ParseError::MalformedContent(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_follows_extension_case_insensitively() {
        assert_eq!(SourceFormat::from_file_name("sales.CSV").unwrap(), SourceFormat::Csv);
        assert_eq!(SourceFormat::from_file_name("book.xlsx").unwrap(), SourceFormat::Spreadsheet);
        assert_eq!(SourceFormat::from_file_name("old.xls").unwrap(), SourceFormat::Spreadsheet);
        assert_eq!(SourceFormat::from_file_name("dump.Json").unwrap(), SourceFormat::Json);
    }

    #[test]
    fn unknown_extensions_are_rejected() {
        assert_eq!(
            SourceFormat::from_file_name("notes.txt"),
            Err(ParseError::UnsupportedType("txt".to_string()))
        );
        assert_eq!(
            SourceFormat::from_file_name("no_extension"),
            Err(ParseError::UnsupportedType(String::new()))
        );
    }

    #[test]
    fn byte_order_mark_is_ignored() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice(b"id,amount\n1,10\n");
        let table = parse(&bytes, "bom.csv").unwrap();
        assert_eq!(table.columns(), ["id", "amount"]);
    }
}
