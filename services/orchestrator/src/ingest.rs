use insights::FieldRoles;
use tabular::{ParseError, Table};

/// What one upload yields before it is stored.
#[derive(Clone, Debug)]
pub struct Ingested {
    pub table: Table,
    pub field_roles: FieldRoles,
    /// BLAKE3 of the raw bytes, hex.
    pub content_hash: String,
}

pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(blake3::hash(bytes).as_bytes())
}

/// Parse, hash and resolve field roles in one blocking pass.
pub fn ingest(bytes: &[u8], file_name: &str) -> Result<Ingested, ParseError> {
    let table = tabular::parse(bytes, file_name)?;
    let field_roles = FieldRoles::resolve(&table);
    Ok(Ingested {
        content_hash: content_hash(bytes),
        field_roles,
        table,
    })
}
