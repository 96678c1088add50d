use std::collections::{BTreeMap, HashMap, HashSet};
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};
use tabular::Table;

use crate::roles::FieldRoles;
use crate::values;

/// Calendar period used for the time series.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    Day,
    Week,
    #[default]
    Month,
}

impl Bucket {
    fn start_of(self, d: NaiveDate) -> NaiveDate {
        match self {
            Bucket::Day => d,
            Bucket::Week => d - Duration::days(i64::from(d.weekday().num_days_from_monday())),
            Bucket::Month => d.with_day(1).unwrap_or(d),
        }
    }

    fn label(self, start: NaiveDate) -> String {
        match self {
            Bucket::Day => start.format("%Y-%m-%d").to_string(),
            Bucket::Week => {
                let w = start.iso_week();
                format!("{}-W{:02}", w.year(), w.week())
            }
            Bucket::Month => start.format("%Y-%m").to_string(),
        }
    }
}

impl FromStr for Bucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "day" | "daily" => Ok(Bucket::Day),
            "week" | "weekly" => Ok(Bucket::Week),
            "month" | "monthly" => Ok(Bucket::Month),
            other => Err(format!("unknown bucket {other:?} (expected day, week or month)")),
        }
    }
}

/// Day counts behind the customer recency KPI. `at_risk` and `lapsed`
/// are "no activity for more than N days", so lapsed customers are also
/// counted as at risk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecencyWindows {
    pub active_days: i64,
    pub at_risk_days: i64,
    pub lapsed_days: i64,
}

impl Default for RecencyWindows {
    fn default() -> Self {
        Self {
            active_days: 30,
            at_risk_days: 60,
            lapsed_days: 90,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KpiOptions {
    pub bucket: Bucket,
    pub recency: RecencyWindows,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PeriodTotal {
    pub period: String,
    pub start: NaiveDate,
    #[serde(serialize_with = "money")]
    pub total: Decimal,
    pub rows: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CustomerRecency {
    /// Latest date seen in the table; recency is measured against it.
    pub as_of: NaiveDate,
    pub active: usize,
    pub at_risk: usize,
    pub lapsed: usize,
}

/// Derived summaries of one table. A role that did not resolve leaves its
/// field name `None` and its figures at zero.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct KpiSet {
    pub row_count: usize,

    pub monetary_field: Option<String>,
    #[serde(serialize_with = "money")]
    pub total: Decimal,
    #[serde(serialize_with = "money")]
    pub mean: Decimal,
    /// Rows whose monetary cell parsed and was summed; the mean divides by this.
    pub valued_rows: usize,
    /// Parsed monetary cells left out because the running total would have
    /// left the exact decimal range.
    pub overflowed_rows: usize,

    pub identity_field: Option<String>,
    pub distinct_identities: usize,

    pub date_field: Option<String>,
    pub bucket: Bucket,
    pub series: Vec<PeriodTotal>,

    pub recency: Option<CustomerRecency>,
}

impl KpiSet {
    pub fn has_monetary(&self) -> bool {
        self.monetary_field.is_some()
    }

    pub fn total_display(&self) -> String {
        values::present_money(self.total)
    }

    pub fn mean_display(&self) -> String {
        values::present_money(self.mean)
    }
}

fn money<S: Serializer>(d: &Decimal, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&values::present_money(*d))
}

pub fn summarize(table: &Table, roles: &FieldRoles, opts: &KpiOptions) -> KpiSet {
    let monetary = roles.monetary.as_deref();
    let identity = roles.identity.as_deref();
    let date_col = roles.date.as_deref();

    let mut total = Decimal::ZERO;
    let mut valued_rows = 0usize;
    let mut overflowed_rows = 0usize;
    let mut identities = HashSet::new();
    let mut periods: BTreeMap<NaiveDate, (Decimal, usize)> = BTreeMap::new();
    let mut last_seen: HashMap<String, NaiveDate> = HashMap::new();
    let mut latest: Option<NaiveDate> = None;

    for row in table.rows() {
        let mut amount = monetary.and_then(|c| row.get(c)).and_then(values::decimal);
        if let Some(a) = amount {
            if values::accumulate(&mut total, a) {
                valued_rows += 1;
            } else {
                overflowed_rows += 1;
                amount = None;
            }
        }

        let who = identity.and_then(|c| row.get(c)).and_then(values::text);
        if let Some(w) = &who {
            identities.insert(w.clone());
        }

        let Some(day) = date_col.and_then(|c| row.get(c)).and_then(values::date) else {
            continue;
        };
        let slot = periods.entry(opts.bucket.start_of(day)).or_insert((Decimal::ZERO, 0));
        if let Some(a) = amount {
            values::accumulate(&mut slot.0, a);
        }
        slot.1 += 1;

        latest = Some(latest.map_or(day, |l| l.max(day)));
        if let Some(w) = who {
            last_seen
                .entry(w)
                .and_modify(|d| *d = (*d).max(day))
                .or_insert(day);
        }
    }

    let mean = if valued_rows == 0 {
        Decimal::ZERO
    } else {
        total
            .checked_div(Decimal::from(valued_rows))
            .unwrap_or(Decimal::ZERO)
    };

    let series = periods
        .into_iter()
        .map(|(start, (sum, rows))| PeriodTotal {
            period: opts.bucket.label(start),
            start,
            total: sum,
            rows,
        })
        .collect();

    let recency = match (latest, last_seen.is_empty()) {
        (Some(as_of), false) => Some(recency(as_of, &last_seen, &opts.recency)),
        _ => None,
    };

    KpiSet {
        row_count: table.row_count(),
        monetary_field: roles.monetary.clone(),
        total,
        mean,
        valued_rows,
        overflowed_rows,
        identity_field: roles.identity.clone(),
        distinct_identities: identities.len(),
        date_field: roles.date.clone(),
        bucket: opts.bucket,
        series,
        recency,
    }
}

fn recency(as_of: NaiveDate, last_seen: &HashMap<String, NaiveDate>, w: &RecencyWindows) -> CustomerRecency {
    let mut out = CustomerRecency {
        as_of,
        active: 0,
        at_risk: 0,
        lapsed: 0,
    };
    for last in last_seen.values() {
        let idle = (as_of - *last).num_days();
        if idle <= w.active_days {
            out.active += 1;
        }
        if idle > w.at_risk_days {
            out.at_risk += 1;
        }
        if idle > w.lapsed_days {
            out.lapsed += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tabular::Row;

    fn table(v: serde_json::Value) -> Table {
        let rows: Vec<Row> = v
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r.as_object().cloned().unwrap())
            .collect();
        Table::from_records(rows)
    }

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn two_row_totals() {
        let t = table(json!([{"id": "1", "amount": "10"}, {"id": "2", "amount": "20"}]));
        let k = summarize(&t, &FieldRoles::resolve(&t), &KpiOptions::default());
        assert_eq!(k.row_count, 2);
        assert_eq!(k.total_display(), "30.00");
        assert_eq!(k.mean_display(), "15.00");
    }

    #[test]
    fn no_monetary_field_reports_zero() {
        let t = table(json!([{"name": "a"}, {"name": "b"}]));
        let k = summarize(&t, &FieldRoles::resolve(&t), &KpiOptions::default());
        assert!(!k.has_monetary());
        assert_eq!(k.total, Decimal::ZERO);
        assert_eq!(k.mean, Decimal::ZERO);
        assert_eq!(k.distinct_identities, 0);
        assert!(k.series.is_empty());
        assert!(k.recency.is_none());
    }

    #[test]
    fn sums_stay_exact_over_many_rows() {
        let rows: Vec<_> = (0..10_000).map(|_| json!({"amount": 0.1})).collect();
        let t = table(json!(rows));
        let k = summarize(&t, &FieldRoles::resolve(&t), &KpiOptions::default());
        assert_eq!(k.total, dec("1000"));
        assert_eq!(k.mean, dec("0.1"));
    }

    #[test]
    fn unparsable_cells_are_skipped_not_zeroed() {
        let t = table(json!([{"amount": "10"}, {"amount": "n/a"}, {"amount": "20"}]));
        let k = summarize(&t, &FieldRoles::resolve(&t), &KpiOptions::default());
        assert_eq!(k.valued_rows, 2);
        assert_eq!(k.mean, dec("15"));
    }

    #[test]
    fn out_of_range_sums_drop_the_cell() {
        let max = Decimal::MAX.to_string();
        let t = table(json!([
            {"customer_id": "a", "order_date": "2024-01-01", "amount": max},
            {"customer_id": "a", "order_date": "2024-01-02", "amount": max},
            {"customer_id": "b", "order_date": "2024-01-03", "amount": "-5"}
        ]));
        let k = summarize(&t, &FieldRoles::resolve(&t), &KpiOptions::default());
        assert_eq!(k.row_count, 3);
        assert_eq!(k.valued_rows, 2);
        assert_eq!(k.overflowed_rows, 1);
        assert_eq!(k.total, Decimal::MAX - dec("5"));
        assert_eq!(k.series.len(), 1);
        assert_eq!(k.series[0].rows, 3);
        assert_eq!(k.series[0].total, k.total);
        assert_eq!(k.distinct_identities, 2);
    }

    #[test]
    fn distinct_customers() {
        let t = table(json!([
            {"customer_id": "c1", "amount": 5},
            {"customer_id": "c2", "amount": 5},
            {"customer_id": "c1", "amount": 5},
            {"customer_id": "", "amount": 5}
        ]));
        let k = summarize(&t, &FieldRoles::resolve(&t), &KpiOptions::default());
        assert_eq!(k.distinct_identities, 2);
    }

    #[test]
    fn monthly_and_weekly_series() {
        let t = table(json!([
            {"date": "2024-01-30", "amount": "1.50"},
            {"date": "2024-02-01", "amount": "2"},
            {"date": "2024-02-05", "amount": "3"},
            {"date": "garbage", "amount": "100"}
        ]));
        let roles = FieldRoles::resolve(&t);

        let monthly = summarize(&t, &roles, &KpiOptions::default());
        let labels: Vec<_> = monthly.series.iter().map(|p| p.period.as_str()).collect();
        assert_eq!(labels, ["2024-01", "2024-02"]);
        assert_eq!(monthly.series[1].total, dec("5"));
        assert_eq!(monthly.total, dec("106.50"));

        let weekly = summarize(&t, &roles, &KpiOptions { bucket: Bucket::Week, ..Default::default() });
        let labels: Vec<_> = weekly.series.iter().map(|p| p.period.as_str()).collect();
        assert_eq!(labels, ["2024-W05", "2024-W06"]);
        assert_eq!(weekly.series[0].rows, 2);
    }

    #[test]
    fn recency_counts_against_latest_date() {
        let t = table(json!([
            {"customer": "fresh", "order_date": "2024-06-30", "amount": 1},
            {"customer": "cooling", "order_date": "2024-05-10", "amount": 1},
            {"customer": "risky", "order_date": "2024-04-15", "amount": 1},
            {"customer": "gone", "order_date": "2024-01-01", "amount": 1},
            {"customer": "gone", "order_date": "2023-12-01", "amount": 1}
        ]));
        let k = summarize(&t, &FieldRoles::resolve(&t), &KpiOptions::default());
        let r = k.recency.unwrap();
        assert_eq!(r.as_of, NaiveDate::from_ymd_opt(2024, 6, 30).unwrap());
        assert_eq!(r.active, 1);
        assert_eq!(r.at_risk, 2);
        assert_eq!(r.lapsed, 1);
    }

    #[test]
    fn bucket_parsing() {
        assert_eq!("Week".parse::<Bucket>().unwrap(), Bucket::Week);
        assert_eq!("daily".parse::<Bucket>().unwrap(), Bucket::Day);
        assert!("year".parse::<Bucket>().is_err());
    }

    #[test]
    fn serialized_money_is_two_decimals() {
        let t = table(json!([{"amount": "10"}, {"amount": "20"}]));
        let k = summarize(&t, &FieldRoles::resolve(&t), &KpiOptions::default());
        let v = serde_json::to_value(&k).unwrap();
        assert_eq!(v["total"], json!("30.00"));
        assert_eq!(v["mean"], json!("15.00"));
    }
}
