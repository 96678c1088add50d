//! Schema-less analytics over uploaded tables.
//!
//! Nothing here assumes a fixed schema: columns are resolved to semantic
//! roles ([`FieldRoles`]) once per table, and every KPI or chart degrades
//! to "unknown" / "no chart" when a role it needs is missing.

pub mod chart;
pub mod kpi;
pub mod roles;
mod values;

pub use chart::{detect_intent, resolve_category, synthesize, ChartCategory, ChartConfig, ChartDescriptor, ChartType};
pub use kpi::{summarize, Bucket, CustomerRecency, KpiOptions, KpiSet, PeriodTotal, RecencyWindows};
pub use roles::FieldRoles;
pub use values::present_money;
