//! Rollup aggregator: per-gift detail rows and the full (region, class) lattice.

use crate::ingestion::GiftLedger;
use crate::schema::{Commitment, FiscalPeriod, ReconciliationConfig};
use log::{debug, warn};
use serde::{Serialize, Serializer};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

pub const ROLLUP_COLUMNS: [&str; 5] = [
    "region",
    "class",
    "amount",
    "additions_earlier",
    "additions_current",
];

pub const TOTAL_LABEL: &str = "Total";

/// Appended to observed labels that would otherwise print as [`TOTAL_LABEL`].
pub const RESERVED_LABEL_SUFFIX: &str = " (named)";

/// A region or class value in the lattice. `Total` marks an aggregate over that dimension.
///
/// Both variants serialize as plain strings. [`build_lattice`] renames an observed
/// label spelled `Total` to `Total (named)`, so no two output rows print the same pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RollupLabel {
    Named(String),
    Total,
}

impl RollupLabel {
    pub fn named(label: impl Into<String>) -> Self {
        Self::Named(label.into())
    }

    pub fn is_total(&self) -> bool {
        matches!(self, Self::Total)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Named(label) => label,
            Self::Total => TOTAL_LABEL,
        }
    }

    /// Aggregates sort after every named value, named values sort lexically.
    fn sort_key(&self) -> (bool, &str) {
        (self.is_total(), self.as_str())
    }
}

impl Ord for RollupLabel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for RollupLabel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for RollupLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for RollupLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One row per (commitment, linked gift) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollupDetail {
    pub region: String,
    pub class: String,
    pub amount: f64,
    pub additions_earlier: f64,
    pub additions_current: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollupRow {
    pub region: RollupLabel,
    pub class: RollupLabel,
    pub amount: f64,
    pub additions_earlier: f64,
    pub additions_current: f64,
}

impl RollupRow {
    fn new(region: RollupLabel, class: RollupLabel, metrics: Metrics) -> Self {
        Self {
            region,
            class,
            amount: metrics.amount,
            additions_earlier: metrics.additions_earlier,
            additions_current: metrics.additions_current,
        }
    }

    pub fn is_detail(&self) -> bool {
        !self.region.is_total() && !self.class.is_total()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Metrics {
    amount: f64,
    additions_earlier: f64,
    additions_current: f64,
}

impl Metrics {
    fn add(&mut self, other: Metrics) {
        self.amount += other.amount;
        self.additions_earlier += other.additions_earlier;
        self.additions_current += other.additions_current;
    }
}

impl From<&RollupDetail> for Metrics {
    fn from(detail: &RollupDetail) -> Self {
        Self {
            amount: detail.amount,
            additions_earlier: detail.additions_earlier,
            additions_current: detail.additions_current,
        }
    }
}

/// Ordered rollup lattice. Serializes as a plain list of rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RollupTable {
    rows: Vec<RollupRow>,
}

impl RollupTable {
    pub fn columns() -> &'static [&'static str] {
        &ROLLUP_COLUMNS
    }

    pub fn rows(&self) -> &[RollupRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, region: &RollupLabel, class: &RollupLabel) -> Option<&RollupRow> {
        self.rows
            .iter()
            .find(|row| &row.region == region && &row.class == class)
    }

    /// Level-0 rows: one per observed (region, class) pair.
    pub fn detail_rows(&self) -> impl Iterator<Item = &RollupRow> {
        self.rows.iter().filter(|row| row.is_detail())
    }
}

pub struct RollupAggregator<'a> {
    ledger: &'a GiftLedger,
    unmapped_region: &'a str,
}

impl<'a> RollupAggregator<'a> {
    pub fn new(ledger: &'a GiftLedger, config: &'a ReconciliationConfig) -> Self {
        Self {
            ledger,
            unmapped_region: &config.unmapped_region,
        }
    }

    pub fn detail(&self, commitments: &[Commitment]) -> Vec<RollupDetail> {
        let mut rows = Vec::new();

        for commitment in commitments {
            let region = commitment.region_or(self.unmapped_region);
            for gid in &commitment.linked_gift_ids {
                let amount = self.ledger.amount(*gid);
                let period = self.ledger.period(*gid);
                rows.push(RollupDetail {
                    region: region.to_string(),
                    class: self.ledger.class(*gid).to_string(),
                    amount,
                    additions_earlier: if period == Some(FiscalPeriod::Earlier) {
                        amount
                    } else {
                        0.0
                    },
                    additions_current: if period == Some(FiscalPeriod::Current) {
                        amount
                    } else {
                        0.0
                    },
                });
            }
        }

        rows
    }

    pub fn summarize(&self, commitments: &[Commitment]) -> RollupTable {
        build_lattice(&self.detail(commitments))
    }
}

/// Escapes observed labels of the form `Total`, `Total (named)`, ... by one more suffix.
/// The mapping is injective, so distinct inputs stay distinct.
fn escape_reserved(label: &str) -> Cow<'_, str> {
    let mut stem = label;
    while let Some(rest) = stem.strip_suffix(RESERVED_LABEL_SUFFIX) {
        stem = rest;
    }
    if stem == TOTAL_LABEL {
        Cow::Owned(format!("{}{}", label, RESERVED_LABEL_SUFFIX))
    } else {
        Cow::Borrowed(label)
    }
}

/// Builds all four aggregation levels from detail rows and orders them.
pub fn build_lattice(detail: &[RollupDetail]) -> RollupTable {
    if detail.is_empty() {
        return RollupTable::default();
    }

    let mut escaped = 0usize;
    let mut by_region_class: BTreeMap<(Cow<'_, str>, Cow<'_, str>), Metrics> = BTreeMap::new();
    for row in detail {
        let region = escape_reserved(&row.region);
        let class = escape_reserved(&row.class);
        if matches!(region, Cow::Owned(_)) || matches!(class, Cow::Owned(_)) {
            escaped += 1;
        }
        by_region_class
            .entry((region, class))
            .or_default()
            .add(Metrics::from(row));
    }
    if escaped > 0 {
        warn!(
            "{} detail rows carry a region or class named '{}'; renamed with suffix '{}'",
            escaped, TOTAL_LABEL, RESERVED_LABEL_SUFFIX
        );
    }

    let mut by_region: BTreeMap<&str, Metrics> = BTreeMap::new();
    let mut by_class: BTreeMap<&str, Metrics> = BTreeMap::new();
    let mut grand_total = Metrics::default();
    for ((region, class), metrics) in &by_region_class {
        by_region.entry(&**region).or_default().add(*metrics);
        by_class.entry(&**class).or_default().add(*metrics);
        grand_total.add(*metrics);
    }

    let mut rows = Vec::with_capacity(by_region_class.len() + by_region.len() + by_class.len() + 1);
    rows.extend(by_region_class.iter().map(|((region, class), m)| {
        RollupRow::new(
            RollupLabel::named(region.to_string()),
            RollupLabel::named(class.to_string()),
            *m,
        )
    }));
    rows.extend(
        by_region
            .iter()
            .map(|(&region, m)| RollupRow::new(RollupLabel::named(region), RollupLabel::Total, *m)),
    );
    rows.extend(
        by_class
            .iter()
            .map(|(&class, m)| RollupRow::new(RollupLabel::Total, RollupLabel::named(class), *m)),
    );
    rows.push(RollupRow::new(
        RollupLabel::Total,
        RollupLabel::Total,
        grand_total,
    ));

    // Real regions first, then the Total region; classes ascending with Total last
    rows.sort_by(|a, b| (&a.region, &a.class).cmp(&(&b.region, &b.class)));

    debug!(
        "Built rollup lattice: {} detail rows -> {} rows ({} regions, {} classes)",
        detail.len(),
        rows.len(),
        by_region.len(),
        by_class.len()
    );

    RollupTable { rows }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail(region: &str, class: &str, earlier: f64, current: f64) -> RollupDetail {
        RollupDetail {
            region: region.to_string(),
            class: class.to_string(),
            amount: earlier + current,
            additions_earlier: earlier,
            additions_current: current,
        }
    }

    fn keys(table: &RollupTable) -> Vec<(String, String)> {
        table
            .rows()
            .iter()
            .map(|r| (r.region.to_string(), r.class.to_string()))
            .collect()
    }

    fn sample() -> Vec<RollupDetail> {
        vec![
            detail("Zambia", "Unrestricted", 0.0, 40.0),
            detail("Africa", "Restricted - Global Work", 10.0, 0.0),
            detail("Africa", "Unrestricted", 5.0, 15.0),
            detail("Africa", "Unrestricted", 0.0, 30.0),
            detail("Zambia", "", 7.0, 0.0),
        ]
    }

    #[test]
    fn test_lattice_order() {
        let table = build_lattice(&sample());

        let expected: Vec<(String, String)> = [
            ("Africa", "Restricted - Global Work"),
            ("Africa", "Unrestricted"),
            ("Africa", "Total"),
            ("Zambia", ""),
            ("Zambia", "Unrestricted"),
            ("Zambia", "Total"),
            ("Total", ""),
            ("Total", "Restricted - Global Work"),
            ("Total", "Unrestricted"),
            ("Total", "Total"),
        ]
        .iter()
        .map(|(r, c)| (r.to_string(), c.to_string()))
        .collect();

        assert_eq!(keys(&table), expected);
    }

    #[test]
    fn test_lattice_sums() {
        let table = build_lattice(&sample());

        let africa_unrestricted = table
            .get(&RollupLabel::named("Africa"), &RollupLabel::named("Unrestricted"))
            .unwrap();
        assert_eq!(africa_unrestricted.amount, 50.0);
        assert_eq!(africa_unrestricted.additions_earlier, 5.0);
        assert_eq!(africa_unrestricted.additions_current, 45.0);

        let africa_total = table
            .get(&RollupLabel::named("Africa"), &RollupLabel::Total)
            .unwrap();
        assert_eq!(africa_total.amount, 60.0);

        let unrestricted_total = table
            .get(&RollupLabel::Total, &RollupLabel::named("Unrestricted"))
            .unwrap();
        assert_eq!(unrestricted_total.amount, 90.0);
        assert_eq!(unrestricted_total.additions_current, 85.0);

        let grand = table.get(&RollupLabel::Total, &RollupLabel::Total).unwrap();
        let detail_sum: f64 = sample().iter().map(|d| d.amount).sum();
        assert_eq!(grand.amount, detail_sum);
        assert_eq!(grand.additions_earlier, 22.0);
        assert_eq!(grand.additions_current, 85.0);
    }

    #[test]
    fn test_lattice_completeness() {
        let rows = sample();
        let table = build_lattice(&rows);

        for d in &rows {
            let region = RollupLabel::named(d.region.clone());
            let class = RollupLabel::named(d.class.clone());
            assert!(table.get(&region, &class).is_some());
            assert!(table.get(&region, &RollupLabel::Total).is_some());
            assert!(table.get(&RollupLabel::Total, &class).is_some());
        }
        assert!(table.get(&RollupLabel::Total, &RollupLabel::Total).is_some());

        // No duplicate keys
        let mut all = keys(&table);
        let before = all.len();
        all.dedup();
        assert_eq!(all.len(), before);
        assert_eq!(table.detail_rows().count(), 4);
    }

    #[test]
    fn test_ordering_is_deterministic_regardless_of_input_order() {
        let forward = build_lattice(&sample());
        let mut reversed_input = sample();
        reversed_input.reverse();
        let reversed = build_lattice(&reversed_input);

        assert_eq!(keys(&forward), keys(&reversed));
        assert_eq!(
            serde_json::to_string(&forward).unwrap(),
            serde_json::to_string(&build_lattice(&sample())).unwrap()
        );
    }

    #[test]
    fn test_empty_detail_yields_empty_table() {
        let table = build_lattice(&[]);
        assert!(table.is_empty());
        assert_eq!(RollupTable::columns(), &ROLLUP_COLUMNS);
        assert_eq!(serde_json::to_string(&table).unwrap(), "[]");
    }

    #[test]
    fn test_total_label_ordering() {
        let mut labels = vec![
            RollupLabel::Total,
            RollupLabel::named("Zulu"),
            RollupLabel::named("Alpha"),
            RollupLabel::named("Total"),
        ];
        labels.sort();
        assert_eq!(labels.last(), Some(&RollupLabel::Total));
        assert_eq!(labels[0], RollupLabel::named("Alpha"));
    }

    #[test]
    fn test_row_serialization_uses_flat_labels() {
        let table = build_lattice(&[detail("R1", "Unrestricted", 0.0, 10.0)]);
        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(json[0]["region"], "R1");
        assert_eq!(json[0]["class"], "Unrestricted");
        assert_eq!(json[1]["class"], "Total");
        assert_eq!(json[3]["region"], "Total");
        assert_eq!(json[3]["class"], "Total");
    }

    #[test]
    fn test_observed_total_labels_do_not_collide_with_aggregates() {
        let table = build_lattice(&[
            detail("Total", "Unrestricted", 0.0, 10.0),
            detail("Africa", "Total", 5.0, 0.0),
            detail("Africa", "Total (named)", 0.0, 1.0),
        ]);

        let json = serde_json::to_value(&table).unwrap();
        let mut printed: Vec<(String, String)> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|row| {
                (
                    row["region"].as_str().unwrap().to_string(),
                    row["class"].as_str().unwrap().to_string(),
                )
            })
            .collect();
        let before = printed.len();
        printed.sort();
        printed.dedup();
        assert_eq!(printed.len(), before);

        let renamed = table
            .get(&RollupLabel::named("Total (named)"), &RollupLabel::named("Unrestricted"))
            .unwrap();
        assert_eq!(renamed.amount, 10.0);
        assert!(table
            .get(&RollupLabel::named("Africa"), &RollupLabel::named("Total (named) (named)"))
            .is_some());

        let grand = table.get(&RollupLabel::Total, &RollupLabel::Total).unwrap();
        assert_eq!(grand.amount, 16.0);
        assert_eq!(table.rows().last().map(|r| r.region.is_total()), Some(true));
    }

    #[test]
    fn test_aggregator_detail_attribution() {
        use crate::schema::{CommitmentKind, Gift};

        let gifts = vec![
            Gift {
                id: 1,
                amount: 100.0,
                period: Some(FiscalPeriod::Earlier),
                class: "Unrestricted".to_string(),
                received_on: None,
            },
            Gift {
                id: 2,
                amount: 40.0,
                period: None,
                class: String::new(),
                received_on: None,
            },
        ];
        let commitments = vec![Commitment {
            id: 1,
            region: None,
            kind: CommitmentKind::OneTime,
            total_pledged: 500.0,
            origin: Some(FiscalPeriod::Earlier),
            linked_gift_ids: vec![1, 2, 3],
        }];

        let config = ReconciliationConfig::default();
        let ledger = GiftLedger::new(&gifts);
        let aggregator = RollupAggregator::new(&ledger, &config);
        let rows = aggregator.detail(&commitments);

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].region, "Unmapped");
        assert_eq!(rows[0].additions_earlier, 100.0);
        assert_eq!(rows[0].additions_current, 0.0);
        assert_eq!(rows[1].amount, 40.0);
        assert_eq!(rows[1].additions_earlier, 0.0);
        assert_eq!(rows[1].additions_current, 0.0);
        // Unknown gift id still produces a zero detail row
        assert_eq!(rows[2].amount, 0.0);
        assert_eq!(rows[2].class, "");

        let table = aggregator.summarize(&commitments);
        let grand = table.get(&RollupLabel::Total, &RollupLabel::Total).unwrap();
        assert_eq!(grand.amount, 140.0);
    }
}
