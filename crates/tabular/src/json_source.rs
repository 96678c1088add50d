use serde_json::Value;

use crate::{malformed, ParseError, Result, Table};

/// Top-level array of objects; a bare object becomes a single row.
pub(crate) fn parse(bytes: &[u8]) -> Result<Table> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(ParseError::EmptyFile);
    }

    let value: Value = serde_json::from_slice(bytes).map_err(malformed)?;
    let records = match value {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Object(map) => Ok(map),
                _ => Err(ParseError::MalformedContent(format!(
                    "array element {i} is not an object"
                ))),
            })
            .collect::<Result<Vec<_>>>()?,
        Value::Object(map) => vec![map],
        _ => {
            return Err(ParseError::MalformedContent(
                "expected an array of objects or a single object".to_string(),
            ))
        }
    };

    Ok(Table::from_records(records))
}
