//! Templated KPI explanations. No model involved: every figure comes from
//! [`KpiSet`].

use insights::KpiSet;

use crate::classify::mentions;

pub const NO_ACTIVE_DATASET: &str = "You don't have an active dataset yet. Upload a file and apply it \
     to see revenue, order value and customer metrics.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Variant {
    Overview,
    KpiList,
    Summary,
}

impl Variant {
    pub fn select(message: &str) -> Variant {
        if mentions(message, &["dashboard", "overview"]) {
            Variant::Overview
        } else if mentions(message, &["kpi", "metrics"]) {
            Variant::KpiList
        } else {
            Variant::Summary
        }
    }
}

fn money(k: &KpiSet, v: String) -> String {
    if k.has_monetary() {
        format!("${v}")
    } else {
        "unknown (no amount-like column)".to_string()
    }
}

fn customers(k: &KpiSet) -> String {
    match k.identity_field {
        Some(_) => format!("{} customers", k.distinct_identities),
        None => "unknown (no customer column)".to_string(),
    }
}

pub fn explain(message: &str, dataset_name: &str, k: &KpiSet) -> String {
    let revenue = money(k, k.total_display());
    let aov = money(k, k.mean_display());

    match Variant::select(message) {
        Variant::Overview => {
            let mut out = format!(
                "Your dashboard for \"{dataset_name}\" shows:\n\n\
                 - **Total Sales**: {} records\n\
                 - **Total Revenue**: {revenue}\n\
                 - **Average Order Value**: {aov}\n\
                 - **Unique Customers**: {}\n",
                k.row_count,
                customers(k),
            );
            if let Some(r) = &k.recency {
                out.push_str(&format!(
                    "- **Customer Recency** (as of {}): {} active, {} at risk, {} lapsed\n",
                    r.as_of, r.active, r.at_risk, r.lapsed
                ));
            }
            out.push_str("\nThese metrics help you track business health and spot growth opportunities.");
            out
        }
        Variant::KpiList => format!(
            "Your Key Performance Indicators for \"{dataset_name}\":\n\n\
             1. **Revenue**: total income, currently {revenue}\n\
             2. **Average Order Value**: spending per transaction, {aov}\n\
             3. **Customer Count**: unique buyers, {}\n\
             4. **Sales Volume**: total transactions, {} sales\n\n\
             Track these over time to spot trends early.",
            customers(k),
            k.row_count,
        ),
        Variant::Summary => format!(
            "Your analytics show {} sales generating {revenue} in revenue. \
             What specific metric would you like me to explain?",
            k.row_count
        ),
    }
}
