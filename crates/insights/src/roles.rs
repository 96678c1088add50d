use serde::{Deserialize, Serialize};
use tabular::Table;

/// Candidate column names per role, most preferred first. Column names are
/// normalized (lowercased, spaces and dashes to `_`) before comparison.
pub const MONETARY_CANDIDATES: &[&str] = &["amount", "total_amount", "revenue", "sales", "total", "price", "value"];
pub const IDENTITY_CANDIDATES: &[&str] = &["customer_id", "customer", "customer_name", "client_id", "client", "user_id"];
pub const DATE_CANDIDATES: &[&str] = &["sale_date", "order_date", "date", "invoice_date", "transaction_date", "created_at", "timestamp"];
pub const PRODUCT_CANDIDATES: &[&str] = &["product_name", "product", "product_id", "item", "item_name", "sku"];

/// Actual column names bound to each semantic role. Resolved once when a
/// dataset is saved and stored with its metadata.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRoles {
    pub monetary: Option<String>,
    pub identity: Option<String>,
    pub date: Option<String>,
    pub product: Option<String>,
}

impl FieldRoles {
    pub fn resolve(table: &Table) -> Self {
        Self::resolve_columns(table.columns())
    }

    pub fn resolve_columns(columns: &[String]) -> Self {
        let normalized: Vec<String> = columns.iter().map(|c| normalize(c)).collect();
        let pick = |candidates: &[&str]| {
            candidates.iter().find_map(|cand| {
                normalized
                    .iter()
                    .position(|n| n == cand)
                    .map(|i| columns[i].clone())
            })
        };

        Self {
            monetary: pick(MONETARY_CANDIDATES),
            identity: pick(IDENTITY_CANDIDATES),
            date: pick(DATE_CANDIDATES),
            product: pick(PRODUCT_CANDIDATES),
        }
    }
}

fn normalize(column: &str) -> String {
    column
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}
