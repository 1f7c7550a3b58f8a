use crate::allocation::RegionBalance;
use crate::error::{ReconciliationError, Result};
use crate::rollup::RollupTable;
use crate::schema::FiscalPeriod;
use crate::utils::safe_number;
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

pub const DEFAULT_REGION_ORDER: [&str; 7] = [
    "Africa",
    "Latin America",
    "Central Asia",
    "South Asia",
    "Middle East",
    "Greatest Need",
    "New Regions",
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BalanceField {
    Earlier,
    Current,
    Total,
    EarlierRestricted,
    EarlierUnrestricted,
    CurrentRestricted,
    CurrentUnrestricted,
    TotalRestricted,
    TotalUnrestricted,
}

impl BalanceField {
    pub fn value(&self, balance: &RegionBalance) -> f64 {
        match self {
            Self::Earlier => balance.balance_earlier,
            Self::Current => balance.balance_current,
            Self::Total => balance.balance_total,
            Self::EarlierRestricted => balance.balance_earlier_restricted,
            Self::EarlierUnrestricted => balance.balance_earlier_unrestricted,
            Self::CurrentRestricted => balance.balance_current_restricted,
            Self::CurrentUnrestricted => balance.balance_current_unrestricted,
            Self::TotalRestricted => balance.balance_total_restricted,
            Self::TotalUnrestricted => balance.balance_total_unrestricted,
        }
    }
}

/// Where a pivot row takes its per-region values from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum PivotMetric {
    #[schemars(description = "Gift additions realized in `period` for one fund class, from the rollup detail rows.")]
    ClassAdditions { class: String, period: FiscalPeriod },

    #[schemars(description = "Raw gift amount for one fund class, from the rollup detail rows.")]
    ClassAmount { class: String },

    #[schemars(description = "One of the regional outstanding balance metrics.")]
    Balance { field: BalanceField },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct PivotRowSpec {
    pub label: String,
    pub metric: PivotMetric,
}

impl PivotRowSpec {
    pub fn new(label: impl Into<String>, metric: PivotMetric) -> Self {
        Self {
            label: label.into(),
            metric,
        }
    }
}

/// Caller-declared shape of the pivot: ordered metric rows and ordered region columns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct PivotLayout {
    pub rows: Vec<PivotRowSpec>,
    pub columns: Vec<String>,
}

impl PivotLayout {
    pub fn new(rows: Vec<PivotRowSpec>, columns: Vec<String>) -> Result<Self> {
        let layout = Self { rows, columns };
        layout.validate()?;
        Ok(layout)
    }

    /// The regional revenue snapshot: three class additions for the current period
    /// plus the outstanding pledged balance, across the standard region order.
    pub fn regional_snapshot(current_label: &str) -> Self {
        let additions = |class: &str| PivotMetric::ClassAdditions {
            class: class.to_string(),
            period: FiscalPeriod::Current,
        };

        Self {
            rows: vec![
                PivotRowSpec::new(
                    format!("Addition Scholars ({})", current_label),
                    additions("Restricted - MD Scholars"),
                ),
                PivotRowSpec::new(
                    format!("Addition Global ({})", current_label),
                    additions("Restricted - Global Work"),
                ),
                PivotRowSpec::new(
                    "Pledged but not received",
                    PivotMetric::Balance {
                        field: BalanceField::Total,
                    },
                ),
                PivotRowSpec::new(
                    format!("Addition Unrestricted ({})", current_label),
                    additions("Unrestricted"),
                ),
            ],
            columns: DEFAULT_REGION_ORDER.iter().map(|r| r.to_string()).collect(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.rows.is_empty() {
            return Err(ReconciliationError::EmptyPivotRows);
        }
        if self.columns.is_empty() {
            return Err(ReconciliationError::EmptyPivotColumns);
        }
        check_unique("row", self.rows.iter().map(|r| r.label.as_str()))?;
        check_unique("column", self.columns.iter().map(String::as_str))
    }

    pub fn row_labels(&self) -> Vec<String> {
        self.rows.iter().map(|r| r.label.clone()).collect()
    }
}

fn check_unique<'a>(axis: &'static str, labels: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for label in labels {
        if !seen.insert(label) {
            return Err(ReconciliationError::DuplicatePivotLabel {
                axis,
                label: label.to_string(),
            });
        }
    }
    Ok(())
}

/// Fixed-shape matrix of finite values, indexed by the layout's row and column labels.
/// Only [`PivotAssembler::assemble`] builds one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotTable {
    row_labels: Vec<String>,
    column_labels: Vec<String>,
    /// Row-major cells, `cells[row][column]`
    cells: Vec<Vec<f64>>,
}

impl PivotTable {
    pub fn row_labels(&self) -> &[String] {
        &self.row_labels
    }

    pub fn column_labels(&self) -> &[String] {
        &self.column_labels
    }

    /// Row-major cells, one inner slice per row label.
    pub fn cells(&self) -> &[Vec<f64>] {
        &self.cells
    }

    pub fn get(&self, row: &str, column: &str) -> Option<f64> {
        let c = self.column_labels.iter().position(|l| l == column)?;
        self.row(row)?.get(c).copied()
    }

    pub fn row(&self, label: &str) -> Option<&[f64]> {
        let r = self.row_labels.iter().position(|l| l == label)?;
        self.cells.get(r).map(Vec::as_slice)
    }

    /// Every cell as ((row label, column label), value), row-major.
    pub fn iter(&self) -> impl Iterator<Item = ((&str, &str), f64)> + '_ {
        self.row_labels
            .iter()
            .zip(&self.cells)
            .flat_map(move |(row, values)| {
                self.column_labels
                    .iter()
                    .zip(values)
                    .map(move |(column, value)| ((row.as_str(), column.as_str()), *value))
            })
    }

    pub fn to_map(&self) -> BTreeMap<(String, String), f64> {
        self.iter()
            .map(|((r, c), v)| ((r.to_string(), c.to_string()), v))
            .collect()
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

pub struct PivotAssembler<'a> {
    rollup: &'a RollupTable,
    balances: &'a [RegionBalance],
}

impl<'a> PivotAssembler<'a> {
    pub fn new(rollup: &'a RollupTable, balances: &'a [RegionBalance]) -> Self {
        Self { rollup, balances }
    }

    /// Resolves a metric into values keyed by region.
    pub fn series(&self, metric: &PivotMetric) -> BTreeMap<&'a str, f64> {
        let mut series: BTreeMap<&'a str, f64> = BTreeMap::new();

        match metric {
            PivotMetric::ClassAdditions { class, period } => {
                for row in self.rollup.detail_rows().filter(|r| r.class.as_str() == class.as_str()) {
                    let value = match period {
                        FiscalPeriod::Earlier => row.additions_earlier,
                        FiscalPeriod::Current => row.additions_current,
                    };
                    *series.entry(row.region.as_str()).or_default() += value;
                }
            }
            PivotMetric::ClassAmount { class } => {
                for row in self.rollup.detail_rows().filter(|r| r.class.as_str() == class.as_str()) {
                    *series.entry(row.region.as_str()).or_default() += row.amount;
                }
            }
            PivotMetric::Balance { field } => {
                for balance in self.balances {
                    *series.entry(balance.region.as_str()).or_default() += field.value(balance);
                }
            }
        }

        series
    }

    pub fn assemble(&self, layout: &PivotLayout) -> Result<PivotTable> {
        layout.validate()?;

        let cells: Vec<Vec<f64>> = layout
            .rows
            .iter()
            .map(|spec| {
                let series = self.series(&spec.metric);
                layout
                    .columns
                    .iter()
                    .map(|region| safe_number(series.get(region.as_str()).copied().unwrap_or(0.0)))
                    .collect()
            })
            .collect();

        debug!(
            "Assembled pivot with {} rows x {} columns",
            layout.rows.len(),
            layout.columns.len()
        );

        Ok(PivotTable {
            row_labels: layout.row_labels(),
            column_labels: layout.columns.clone(),
            cells,
        })
    }
}
