//! Tenant-scoped persistence for datasets and conversation history.
//!
//! The [`DatasetStore`] and [`HistoryStore`] traits are the seam; the
//! in-memory implementations back tests and single-process runs, the
//! Postgres ones (feature `database`) back the service.

mod schema;
mod store;
pub mod memory;
#[cfg(feature = "database")]
pub mod postgres;

pub use schema::{
    Classification, ConversationTurn, Dataset, DatasetId, DatasetMetadata, DatasetPatch, NewDataset, NewTurn,
    TenantId, TurnId,
};
pub use store::{pick_active, retry_read, DatasetStore, HistoryStore, Result, StoreError};
pub use memory::{InMemoryDatasetStore, InMemoryHistoryStore};
#[cfg(feature = "database")]
pub use postgres::{PgDatasetStore, PgHistoryStore};
