use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use insights::FieldRoles;
use serde::{Deserialize, Serialize};
use tabular::Table;
use uuid::Uuid;

pub type TenantId = Uuid;
pub type DatasetId = Uuid;
pub type TurnId = i64;

/// Dataset without its payload, as listed to the UI.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub id: DatasetId,
    pub tenant_id: TenantId,
    pub name: String,
    pub description: Option<String>,
    pub file_name: String,
    pub file_path: Option<String>, // backing copy of the upload
    pub file_size: u64,
    pub content_type: Option<String>,
    pub content_hash: String, // BLAKE3 hex of the uploaded bytes
    pub row_count: usize,
    pub columns: Vec<String>,
    pub field_roles: FieldRoles,
    pub is_favorite: bool,
    pub active: bool,
    pub activated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DatasetMetadata {
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(flatten)]
    pub metadata: DatasetMetadata,
    pub table: Table,
}

/// Everything `save` needs; id, flags and timestamps are assigned by the store.
#[derive(Clone, Debug)]
pub struct NewDataset {
    pub name: String,
    pub description: Option<String>,
    pub file_name: String,
    pub file_path: Option<String>,
    pub file_size: u64,
    pub content_type: Option<String>,
    pub content_hash: String,
    pub field_roles: FieldRoles,
    pub table: Table,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DatasetPatch {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl DatasetPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Chart,
    Analytics,
    Troubleshooting,
    General,
}

impl Classification {
    pub fn as_str(self) -> &'static str {
        match self {
            Classification::Chart => "chart",
            Classification::Analytics => "analytics",
            Classification::Troubleshooting => "troubleshooting",
            Classification::General => "general",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Classification {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chart" => Ok(Classification::Chart),
            "analytics" => Ok(Classification::Analytics),
            "troubleshooting" => Ok(Classification::Troubleshooting),
            "general" => Ok(Classification::General),
            other => Err(format!("unknown classification {other:?}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewTurn {
    pub message: String,
    pub response: String,
    pub classification: Classification,
    pub payload: Option<serde_json::Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: TurnId,
    pub tenant_id: TenantId,
    pub message: String,
    pub response: String,
    pub classification: Classification,
    pub payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}
