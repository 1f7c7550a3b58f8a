use crate::schema::{
    Commitment, CommitmentId, CommitmentKind, FiscalPeriod, Gift, GiftId, ReconciliationConfig,
};
use crate::utils::{coerce_amount, parse_amount, sanitize_amount};
use chrono::NaiveDate;
use log::{debug, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A pledge as handed over by the ingestion collaborator, before any normalization.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RawCommitment {
    pub id: CommitmentId,

    #[serde(default)]
    #[schemars(description = "Region dropdown text. Missing or blank means unmapped.")]
    pub region: Option<String>,

    #[serde(default)]
    #[schemars(description = "Commitment type status text, e.g. 'One-time' or '3-Year Pledge'.")]
    pub commitment_type: Option<String>,

    #[serde(default)]
    #[schemars(description = "Total pledged amount. Numbers or numeric strings; anything else counts as 0.")]
    pub total_commitment: Value,

    #[serde(default)]
    #[schemars(description = "Group title naming the fiscal period the pledge was made in, e.g. '2024'.")]
    pub group: Option<String>,

    #[serde(default)]
    pub linked_gift_ids: Vec<GiftId>,
}

/// A gift as handed over by the ingestion collaborator, before any normalization.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RawGift {
    pub id: GiftId,

    #[serde(default)]
    #[schemars(description = "Gift amount. Numbers or numeric strings; anything else counts as 0.")]
    pub amount: Value,

    #[serde(default)]
    #[schemars(description = "Group title naming the realized period, e.g. '2025 Gifts'.")]
    pub group: Option<String>,

    #[serde(default)]
    #[schemars(description = "Mapped fund class, e.g. 'Restricted - Global Work'.")]
    pub mapped_class: Option<String>,

    #[serde(default)]
    #[schemars(
        description = "Date received in YYYY-MM-DD format. Informational only; the period comes from the group."
    )]
    pub received_on: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RawReconciliationInput {
    #[serde(default)]
    pub commitments: Vec<RawCommitment>,

    #[serde(default)]
    pub gifts: Vec<RawGift>,
}

impl RawReconciliationInput {
    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(RawReconciliationInput)
    }

    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

/// Fully normalized input for one reconciliation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconciliationInput {
    pub commitments: Vec<Commitment>,
    pub gifts: Vec<Gift>,
}

/// Converts raw records into typed ones, applying every default exactly once.
pub struct Normalizer<'a> {
    config: &'a ReconciliationConfig,
}

impl<'a> Normalizer<'a> {
    pub fn new(config: &'a ReconciliationConfig) -> Self {
        Self { config }
    }

    pub fn normalize(&self, raw: &RawReconciliationInput) -> ReconciliationInput {
        let input = ReconciliationInput {
            commitments: raw
                .commitments
                .iter()
                .map(|c| self.normalize_commitment(c))
                .collect(),
            gifts: raw.gifts.iter().map(|g| self.normalize_gift(g)).collect(),
        };

        debug!(
            "Normalized {} commitments and {} gifts",
            input.commitments.len(),
            input.gifts.len()
        );

        input
    }

    pub fn normalize_commitment(&self, raw: &RawCommitment) -> Commitment {
        Commitment {
            id: raw.id,
            region: non_blank(raw.region.as_deref()),
            kind: raw
                .commitment_type
                .as_deref()
                .map(CommitmentKind::from_label)
                .unwrap_or_default(),
            total_pledged: lenient_amount("commitment", raw.id, &raw.total_commitment),
            origin: raw
                .group
                .as_deref()
                .and_then(|g| self.config.periods.commitment_period(g)),
            linked_gift_ids: raw.linked_gift_ids.clone(),
        }
    }

    pub fn normalize_gift(&self, raw: &RawGift) -> Gift {
        let received_on = raw
            .received_on
            .as_deref()
            .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok());

        Gift {
            id: raw.id,
            amount: lenient_amount("gift", raw.id, &raw.amount),
            period: raw
                .group
                .as_deref()
                .and_then(|g| self.config.periods.gift_period(g)),
            class: raw
                .mapped_class
                .as_deref()
                .map(|c| c.trim().to_string())
                .unwrap_or_default(),
            received_on,
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn lenient_amount(record: &str, id: u64, value: &Value) -> f64 {
    match parse_amount(value) {
        Some(v) if v < 0.0 => {
            warn!("Negative amount {} on {} {} clamped to 0", v, record, id);
        }
        None if !value.is_null() => {
            debug!("Unparsable amount {} on {} {} treated as 0", value, record, id);
        }
        _ => {}
    }
    coerce_amount(value)
}

/// Read-only gift lookup built once per run.
#[derive(Debug, Clone, Default)]
pub struct GiftLedger {
    gifts: BTreeMap<GiftId, Gift>,
}

impl GiftLedger {
    /// Builds the lookup. Amounts are clamped to finite non-negative values here,
    /// so gifts constructed directly (bypassing [`Normalizer`]) count as 0 when bad.
    pub fn new(gifts: &[Gift]) -> Self {
        // Later records win on duplicate ids
        let gifts = gifts
            .iter()
            .map(|g| {
                let amount = sanitize_amount(g.amount);
                if amount != g.amount {
                    debug!("Gift {} amount {} treated as {}", g.id, g.amount, amount);
                }
                (g.id, Gift { amount, ..g.clone() })
            })
            .collect();
        Self { gifts }
    }

    pub fn get(&self, id: GiftId) -> Option<&Gift> {
        self.gifts.get(&id)
    }

    pub fn amount(&self, id: GiftId) -> f64 {
        self.get(id).map(|g| g.amount).unwrap_or(0.0)
    }

    pub fn period(&self, id: GiftId) -> Option<FiscalPeriod> {
        self.get(id).and_then(|g| g.period)
    }

    pub fn class(&self, id: GiftId) -> &str {
        self.get(id).map(|g| g.class.as_str()).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.gifts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gifts.is_empty()
    }

    /// Gift ids linked more than once across all commitments.
    pub fn multiply_linked_gift_ids(commitments: &[Commitment]) -> Vec<GiftId> {
        let mut counts: BTreeMap<GiftId, usize> = BTreeMap::new();
        for commitment in commitments {
            for gid in &commitment.linked_gift_ids {
                *counts.entry(*gid).or_default() += 1;
            }
        }
        counts
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(gid, _)| gid)
            .collect()
    }
}
