use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::Timelike;
use serde_json::Value;

use crate::{malformed, ParseError, Result, Row, Table};

/// First worksheet only; its first row holds the column names.
/// Blank header cells drop their column and fully blank rows are skipped.
/// Whole-number cells come back as integers, as the same value would from
/// a CSV or JSON upload.
pub(crate) fn parse(bytes: &[u8]) -> Result<Table> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())).map_err(malformed)?;

    let range = match workbook.worksheet_range_at(0) {
        Some(range) => range.map_err(malformed)?,
        None => return Err(ParseError::EmptyFile),
    };

    let mut grid = range.rows();
    let Some(header) = grid.next() else {
        return Err(ParseError::EmptyFile);
    };
    let headers: Vec<Option<String>> = header
        .iter()
        .map(|cell| match cell {
            Data::Empty => None,
            other => Some(other.to_string().trim().to_string()),
        })
        .collect();

    let mut rows = Vec::new();
    for cells in grid {
        if cells.iter().all(|c| matches!(c, Data::Empty)) {
            continue;
        }

        let mut row = Row::new();
        for (i, name) in headers.iter().enumerate() {
            let Some(name) = name else { continue };
            let value = cells.get(i).map(cell_value).unwrap_or(Value::Null);
            row.insert(name.clone(), value);
        }
        rows.push(row);
    }

    Ok(Table::from_records(rows))
}

// Largest float below which every integer is representable.
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Int(i) => Value::from(*i),
        Data::Float(f) if f.fract() == 0.0 && f.abs() <= MAX_EXACT_INT => Value::from(*f as i64),
        Data::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Data::String(s) => Value::String(s.clone()),
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ts) if ts.num_seconds_from_midnight() == 0 => {
                Value::String(ts.format("%Y-%m-%d").to_string())
            }
            Some(ts) => Value::String(ts.format("%Y-%m-%dT%H:%M:%S").to_string()),
            None => Value::Null,
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => Value::String(s.clone()),
        Data::Error(_) | Data::Empty => Value::Null,
    }
}
