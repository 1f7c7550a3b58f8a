//! Allocation engine: splits each pledge across the two fiscal periods and applies
//! linked gifts to the period balances with a waterfall.
//!
//! Earlier-period gifts settle the earlier-period obligation first. Current-period
//! gifts then spill backward into whatever is still owed for the earlier period, and
//! only the remainder counts against the current-period obligation. The total balance
//! ignores the waterfall entirely and is simply pledged minus received.

use crate::error::Result;
use crate::ingestion::GiftLedger;
use crate::schema::{
    Commitment, CommitmentId, CommitmentKind, FiscalPeriod, ReconciliationConfig, SplitRatio,
};
use crate::utils::sanitize_amount;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const REGION_BALANCE_COLUMNS: [&str; 10] = [
    "region",
    "balance_earlier",
    "balance_current",
    "balance_total",
    "balance_earlier_restricted",
    "balance_earlier_unrestricted",
    "balance_current_restricted",
    "balance_current_unrestricted",
    "balance_total_restricted",
    "balance_total_unrestricted",
];

/// Waterfall result for a single commitment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitmentBalance {
    pub commitment_id: CommitmentId,
    pub region: String,
    pub earlier_commitment: f64,
    pub current_commitment: f64,
    pub total_commitment: f64,
    pub earlier_gifts: f64,
    pub current_gifts: f64,
    pub all_gifts: f64,
    /// Current-period gifts applied to the earlier-period obligation
    pub spill: f64,
    pub earlier_balance: f64,
    pub current_balance: f64,
    pub total_balance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionBalance {
    pub region: String,
    pub balance_earlier: f64,
    pub balance_current: f64,
    pub balance_total: f64,
    pub balance_earlier_restricted: f64,
    pub balance_earlier_unrestricted: f64,
    pub balance_current_restricted: f64,
    pub balance_current_unrestricted: f64,
    pub balance_total_restricted: f64,
    pub balance_total_unrestricted: f64,
}

impl RegionBalance {
    fn from_sums(region: String, sums: [f64; 3], split: SplitRatio) -> Self {
        let [earlier, current, total] = sums;
        let restricted = split.restricted;
        let unrestricted = split.unrestricted();
        Self {
            region,
            balance_earlier: earlier,
            balance_current: current,
            balance_total: total,
            balance_earlier_restricted: earlier * restricted,
            balance_earlier_unrestricted: earlier * unrestricted,
            balance_current_restricted: current * restricted,
            balance_current_unrestricted: current * unrestricted,
            balance_total_restricted: total * restricted,
            balance_total_unrestricted: total * unrestricted,
        }
    }
}

/// Period obligations derived from a pledge before any gifts are applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodCommitments {
    pub earlier: f64,
    pub current: f64,
    pub total: f64,
}

impl PeriodCommitments {
    pub fn for_commitment(commitment: &Commitment) -> Self {
        let total = sanitize_amount(commitment.total_pledged);
        let portion = commitment.kind.annual_portion(total);
        let originated_earlier = commitment.origin == Some(FiscalPeriod::Earlier);

        let earlier = if originated_earlier { portion } else { 0.0 };
        // A one-time pledge from the earlier period does not recur
        let current = if originated_earlier && commitment.kind == CommitmentKind::OneTime {
            0.0
        } else {
            portion
        };

        Self {
            earlier,
            current,
            total,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Waterfall {
    spill: f64,
    earlier_balance: f64,
    current_balance: f64,
}

fn waterfall(
    earlier_commitment: f64,
    current_commitment: f64,
    earlier_gifts: f64,
    current_gifts: f64,
) -> Waterfall {
    let remaining_earlier = (earlier_commitment - earlier_gifts).max(0.0);
    let spill = current_gifts.min(remaining_earlier);

    Waterfall {
        spill,
        earlier_balance: (earlier_commitment - (earlier_gifts + spill)).max(0.0),
        current_balance: (current_commitment - (current_gifts - spill)).max(0.0),
    }
}

pub struct AllocationEngine<'a> {
    ledger: &'a GiftLedger,
    split: SplitRatio,
    unmapped_region: &'a str,
}

impl<'a> AllocationEngine<'a> {
    /// Fails when the configured split ratio lies outside [0, 1].
    pub fn new(ledger: &'a GiftLedger, config: &'a ReconciliationConfig) -> Result<Self> {
        config.split.validate()?;
        Ok(Self {
            ledger,
            split: config.split,
            unmapped_region: &config.unmapped_region,
        })
    }

    pub fn allocate(&self, commitment: &Commitment) -> CommitmentBalance {
        let commitments = PeriodCommitments::for_commitment(commitment);

        let mut earlier_gifts = 0.0;
        let mut current_gifts = 0.0;
        let mut all_gifts = 0.0;
        for gid in &commitment.linked_gift_ids {
            let amount = self.ledger.amount(*gid);
            all_gifts += amount;
            match self.ledger.period(*gid) {
                Some(FiscalPeriod::Earlier) => earlier_gifts += amount,
                Some(FiscalPeriod::Current) => current_gifts += amount,
                None => {}
            }
        }

        let flow = waterfall(
            commitments.earlier,
            commitments.current,
            earlier_gifts,
            current_gifts,
        );

        CommitmentBalance {
            commitment_id: commitment.id,
            region: commitment.region_or(self.unmapped_region).to_string(),
            earlier_commitment: commitments.earlier,
            current_commitment: commitments.current,
            total_commitment: commitments.total,
            earlier_gifts,
            current_gifts,
            all_gifts,
            spill: flow.spill,
            earlier_balance: flow.earlier_balance,
            current_balance: flow.current_balance,
            total_balance: (commitments.total - all_gifts).max(0.0),
        }
    }

    pub fn allocate_all(&self, commitments: &[Commitment]) -> Vec<CommitmentBalance> {
        commitments.iter().map(|c| self.allocate(c)).collect()
    }

    pub fn balances_by_region(&self, commitments: &[Commitment]) -> Vec<RegionBalance> {
        let balances = self.allocate_all(commitments);
        summarize_by_region(&balances, self.split)
    }
}

/// Sums per-commitment balances by region, ordered by region label.
pub fn summarize_by_region(balances: &[CommitmentBalance], split: SplitRatio) -> Vec<RegionBalance> {
    let mut sums: BTreeMap<&str, [f64; 3]> = BTreeMap::new();

    for balance in balances {
        let entry = sums.entry(balance.region.as_str()).or_insert([0.0; 3]);
        entry[0] += balance.earlier_balance;
        entry[1] += balance.current_balance;
        entry[2] += balance.total_balance;
    }

    debug!(
        "Summarized {} commitment balances into {} regions",
        balances.len(),
        sums.len()
    );

    sums.into_iter()
        .map(|(region, totals)| RegionBalance::from_sums(region.to_string(), totals, split))
        .collect()
}
