//! # Pledge Reconciliation
//!
//! Reconciles pledged commitments against realized gifts across two adjacent fiscal
//! periods and summarizes the result by region and fund class.
//!
//! ## Core Concepts
//!
//! - **Commitment**: A pledge tied to a region. One-time pledges are owed once; multi-year
//!   pledges owe an equal portion in every period they span
//! - **Gift**: A realized payment with a fiscal period and a fund class, linked to a commitment
//! - **Waterfall**: Earlier-period gifts settle the earlier obligation, then current-period
//!   gifts spill backward into whatever is still owed before counting toward the current one
//! - **Rollup lattice**: (region, class) sums plus per-region, per-class and grand totals,
//!   with `Total` always ordered last
//! - **Pivot**: A fixed grid of named metric rows over an ordered list of regions, zero-filled
//!
//! ## Example
//!
//! ```rust,ignore
//! use pledge_reconciliation::*;
//!
//! let config = ReconciliationConfig::default();
//! let input = ReconciliationInput {
//!     commitments: vec![Commitment {
//!         id: 1,
//!         region: Some("Africa".to_string()),
//!         kind: CommitmentKind::MultiYear { term: 3 },
//!         total_pledged: 300.0,
//!         origin: Some(FiscalPeriod::Earlier),
//!         linked_gift_ids: vec![10],
//!     }],
//!     gifts: vec![Gift {
//!         id: 10,
//!         amount: 150.0,
//!         period: Some(FiscalPeriod::Current),
//!         class: "Unrestricted".to_string(),
//!         received_on: None,
//!     }],
//! };
//!
//! let layout = PivotLayout::regional_snapshot(&config.periods.current);
//! let report = reconcile(&config, &input, &layout).unwrap();
//! assert_eq!(report.pivot.get("Pledged but not received", "Africa"), Some(150.0));
//! ```

pub mod allocation;
pub mod error;
pub mod ingestion;
pub mod pivot;
pub mod rollup;
pub mod schema;
pub mod utils;

pub use allocation::{
    summarize_by_region, AllocationEngine, CommitmentBalance, PeriodCommitments, RegionBalance,
    REGION_BALANCE_COLUMNS,
};
pub use error::{ReconciliationError, Result};
pub use ingestion::*;
pub use pivot::*;
pub use rollup::{
    build_lattice, RollupAggregator, RollupDetail, RollupLabel, RollupRow, RollupTable,
    RESERVED_LABEL_SUFFIX, ROLLUP_COLUMNS, TOTAL_LABEL,
};
pub use schema::*;
pub use utils::*;

use log::{debug, info, warn};
use serde::Serialize;

/// Everything one reconciliation run produces.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub region_balances: Vec<RegionBalance>,
    pub commitment_balances: Vec<CommitmentBalance>,
    pub rollup: RollupTable,
    pub pivot: PivotTable,
}

impl ReconciliationReport {
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

pub struct ReconciliationProcessor;

impl ReconciliationProcessor {
    pub fn process(
        config: &ReconciliationConfig,
        input: &ReconciliationInput,
        layout: &PivotLayout,
    ) -> Result<ReconciliationReport> {
        config.validate()?;
        layout.validate()?;

        info!(
            "Reconciling {} commitments against {} gifts ({} -> {})",
            input.commitments.len(),
            input.gifts.len(),
            config.periods.earlier,
            config.periods.current
        );

        let ledger = GiftLedger::new(&input.gifts);

        let shared = GiftLedger::multiply_linked_gift_ids(&input.commitments);
        if !shared.is_empty() {
            warn!(
                "{} gifts are linked more than once and will be counted per link: {:?}",
                shared.len(),
                shared
            );
        }

        let commitment_balances =
            AllocationEngine::new(&ledger, config)?.allocate_all(&input.commitments);
        let region_balances = summarize_by_region(&commitment_balances, config.split);

        let rollup = RollupAggregator::new(&ledger, config).summarize(&input.commitments);

        let pivot = PivotAssembler::new(&rollup, &region_balances).assemble(layout)?;

        debug!(
            "Produced {} region balances, {} rollup rows, {}x{} pivot",
            region_balances.len(),
            rollup.len(),
            pivot.row_labels().len(),
            pivot.column_labels().len()
        );

        Ok(ReconciliationReport {
            region_balances,
            commitment_balances,
            rollup,
            pivot,
        })
    }

    /// Normalizes raw records first, then runs [`ReconciliationProcessor::process`].
    pub fn process_raw(
        config: &ReconciliationConfig,
        raw: &RawReconciliationInput,
        layout: &PivotLayout,
    ) -> Result<ReconciliationReport> {
        config.validate()?;
        let input = Normalizer::new(config).normalize(raw);
        Self::process(config, &input, layout)
    }
}

pub fn reconcile(
    config: &ReconciliationConfig,
    input: &ReconciliationInput,
    layout: &PivotLayout,
) -> Result<ReconciliationReport> {
    ReconciliationProcessor::process(config, input, layout)
}

pub fn reconcile_raw(
    config: &ReconciliationConfig,
    raw: &RawReconciliationInput,
    layout: &PivotLayout,
) -> Result<ReconciliationReport> {
    ReconciliationProcessor::process_raw(config, raw, layout)
}
