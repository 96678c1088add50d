use std::collections::{BTreeMap, HashMap};

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tabular::{Row, Table};

use crate::roles::FieldRoles;
use crate::values;

/// Any of these (case-insensitive substring) marks a chart request.
pub const CHART_KEYWORDS: &[&str] = &["chart", "graph", "plot", "trend", "visualize", "show me", "display"];

pub const SALES_KEYWORDS: &[&str] = &["sales", "revenue", "trend"];
pub const PRODUCT_KEYWORDS: &[&str] = &["product"];
pub const CUSTOMER_KEYWORDS: &[&str] = &["customer", "segment"];

const TREND_COLORS: &[&str] = &["#8884d8", "#82ca9d"];
const PRODUCT_COLORS: &[&str] = &["#8884d8"];
const SEGMENT_COLORS: &[&str] = &["#0088FE", "#00C49F", "#FFBB28"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Line,
    Bar,
    Pie,
}

impl ChartType {
    pub fn as_str(self) -> &'static str {
        match self {
            ChartType::Line => "line",
            ChartType::Bar => "bar",
            ChartType::Pie => "pie",
        }
    }
}

impl std::fmt::Display for ChartType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChartCategory {
    SalesTrend,
    TopProducts,
    CustomerSegments,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartDescriptor {
    #[serde(rename = "type")]
    pub chart_type: ChartType,
    pub title: String,
    pub data: Vec<Row>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_key: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub y_keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_key: Option<String>,
    pub colors: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl ChartDescriptor {
    /// `None` for an empty `data` list: a descriptor always has rows.
    fn new(chart_type: ChartType, title: String, data: Vec<Row>, colors: &[&str]) -> Option<Self> {
        if data.is_empty() {
            return None;
        }
        Some(Self {
            chart_type,
            title,
            data,
            x_key: None,
            y_keys: Vec::new(),
            name_key: None,
            value_key: None,
            colors: colors.iter().map(|c| c.to_string()).collect(),
            labels: BTreeMap::new(),
        })
    }

    fn axes(mut self, x: &str, ys: &[&str]) -> Self {
        self.x_key = Some(x.to_string());
        self.y_keys = ys.iter().map(|y| y.to_string()).collect();
        self
    }

    fn slices(mut self, name: &str, value: &str) -> Self {
        self.name_key = Some(name.to_string());
        self.value_key = Some(value.to_string());
        self
    }

    fn label(mut self, key: &str, text: &str) -> Self {
        self.labels.insert(key.to_string(), text.to_string());
        self
    }
}

/// Segmentation thresholds and window sizes. A customer whose total is
/// strictly above `premium_over` is Premium, above `regular_over` Regular,
/// otherwise New.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartConfig {
    pub premium_over: Decimal,
    pub regular_over: Decimal,
    pub trend_days: i64,
    pub top_products: usize,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            premium_over: Decimal::from(1000),
            regular_over: Decimal::from(500),
            trend_days: 30,
            top_products: 5,
        }
    }
}

pub fn detect_intent(message: &str) -> bool {
    contains_any(&message.to_lowercase(), CHART_KEYWORDS)
}

/// Sales keywords win over product keywords, which win over customer keywords.
pub fn resolve_category(message: &str) -> Option<ChartCategory> {
    let lower = message.to_lowercase();
    if contains_any(&lower, SALES_KEYWORDS) {
        Some(ChartCategory::SalesTrend)
    } else if contains_any(&lower, PRODUCT_KEYWORDS) {
        Some(ChartCategory::TopProducts)
    } else if contains_any(&lower, CUSTOMER_KEYWORDS) {
        Some(ChartCategory::CustomerSegments)
    } else {
        None
    }
}

fn contains_any(lower: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| lower.contains(k))
}

/// Build the chart for `category`, or `None` when the table lacks the
/// roles it needs or no row contributes data.
pub fn synthesize(category: ChartCategory, table: &Table, roles: &FieldRoles, cfg: &ChartConfig) -> Option<ChartDescriptor> {
    match category {
        ChartCategory::SalesTrend => sales_trend(table, roles, cfg),
        ChartCategory::TopProducts => top_products(table, roles, cfg),
        ChartCategory::CustomerSegments => customer_segments(table, roles, cfg),
    }
}

/// Daily count and revenue over the `trend_days` days ending at the
/// table's latest date.
fn sales_trend(table: &Table, roles: &FieldRoles, cfg: &ChartConfig) -> Option<ChartDescriptor> {
    let date_col = roles.date.as_deref()?;
    let amount_col = roles.monetary.as_deref()?;

    let points: Vec<(NaiveDate, Decimal)> = table
        .rows()
        .iter()
        .filter_map(|r| {
            let day = r.get(date_col).and_then(values::date)?;
            let amount = r.get(amount_col).and_then(values::decimal).unwrap_or(Decimal::ZERO);
            Some((day, amount))
        })
        .collect();

    let latest = points.iter().map(|(d, _)| *d).max()?;
    let from = u64::try_from(cfg.trend_days)
        .ok()
        .and_then(|n| latest.checked_sub_days(Days::new(n)))
        .unwrap_or(NaiveDate::MIN);

    let mut days: BTreeMap<NaiveDate, (usize, Decimal)> = BTreeMap::new();
    for (day, amount) in points.into_iter().filter(|(d, _)| *d >= from) {
        let slot = days.entry(day).or_insert((0, Decimal::ZERO));
        slot.0 += 1;
        values::accumulate(&mut slot.1, amount);
    }

    let data = days
        .into_iter()
        .map(|(day, (count, revenue))| {
            let mut row = Row::new();
            row.insert("date".into(), Value::String(day.format("%b %d").to_string()));
            row.insert("sales_count".into(), Value::from(count));
            row.insert("revenue".into(), values::money_json(revenue));
            row
        })
        .collect();

    let title = format!("Sales Trend (Last {} Days)", cfg.trend_days);
    Some(
        ChartDescriptor::new(ChartType::Line, title, data, TREND_COLORS)?
            .axes("date", &["sales_count", "revenue"])
            .label("sales_count", "Sales")
            .label("revenue", "Revenue"),
    )
}

fn top_products(table: &Table, roles: &FieldRoles, cfg: &ChartConfig) -> Option<ChartDescriptor> {
    let product_col = roles.product.as_deref()?;
    let amount_col = roles.monetary.as_deref()?;

    let mut totals: HashMap<String, (usize, Decimal)> = HashMap::new();
    for row in table.rows() {
        let Some(product) = row.get(product_col).and_then(values::text) else {
            continue;
        };
        let amount = row.get(amount_col).and_then(values::decimal).unwrap_or(Decimal::ZERO);
        let slot = totals.entry(product).or_insert((0, Decimal::ZERO));
        slot.0 += 1;
        values::accumulate(&mut slot.1, amount);
    }

    let mut ranked: Vec<_> = totals.into_iter().collect();
    ranked.sort_by(|a, b| b.1 .1.cmp(&a.1 .1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(cfg.top_products);

    let data = ranked
        .into_iter()
        .map(|(name, (count, revenue))| {
            let mut row = Row::new();
            row.insert("product_name".into(), Value::String(name));
            row.insert("sales_count".into(), Value::from(count));
            row.insert("revenue".into(), values::money_json(revenue));
            row
        })
        .collect();

    Some(
        ChartDescriptor::new(ChartType::Bar, "Top Products by Revenue".into(), data, PRODUCT_COLORS)?
            .axes("product_name", &["revenue"])
            .label("revenue", "Revenue"),
    )
}

fn customer_segments(table: &Table, roles: &FieldRoles, cfg: &ChartConfig) -> Option<ChartDescriptor> {
    let customer_col = roles.identity.as_deref()?;
    let amount_col = roles.monetary.as_deref()?;

    let mut spent: HashMap<String, Decimal> = HashMap::new();
    for row in table.rows() {
        let Some(customer) = row.get(customer_col).and_then(values::text) else {
            continue;
        };
        let amount = row.get(amount_col).and_then(values::decimal).unwrap_or(Decimal::ZERO);
        values::accumulate(spent.entry(customer).or_insert(Decimal::ZERO), amount);
    }

    // Premium, Regular, New
    let mut counts = [0usize; 3];
    for total in spent.values() {
        let idx = if *total > cfg.premium_over {
            0
        } else if *total > cfg.regular_over {
            1
        } else {
            2
        };
        counts[idx] += 1;
    }

    let data = ["Premium", "Regular", "New"]
        .iter()
        .zip(counts)
        .filter(|(_, n)| *n > 0)
        .map(|(segment, n)| {
            let mut row = Row::new();
            row.insert("segment".into(), Value::String(segment.to_string()));
            row.insert("count".into(), Value::from(n));
            row
        })
        .collect();

    Some(
        ChartDescriptor::new(ChartType::Pie, "Customer Segments".into(), data, SEGMENT_COLORS)?
            .slices("segment", "count"),
    )
}
