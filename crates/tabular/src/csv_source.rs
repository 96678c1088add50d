use serde_json::Value;

use crate::{malformed, Result, Row, Table};

/// Header row names the columns; every later record becomes one row, even
/// one whose fields are all empty. Short records are padded with empty
/// strings, surplus fields dropped.
pub(crate) fn parse(bytes: &[u8]) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()
        .map_err(malformed)?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(malformed)?;

        let mut row = Row::new();
        for (i, name) in headers.iter().enumerate() {
            let cell = record.get(i).unwrap_or("");
            row.insert(name.clone(), Value::String(cell.to_string()));
        }
        rows.push(row);
    }

    Ok(Table::from_records(rows))
}
