use crate::error::{ReconciliationError, Result};
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub type CommitmentId = u64;
pub type GiftId = u64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FiscalPeriod {
    #[schemars(description = "The earlier of the two reconciled fiscal periods (e.g. FY2024)")]
    Earlier,

    #[schemars(description = "The current fiscal period (e.g. FY2025)")]
    Current,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum CommitmentKind {
    #[schemars(description = "A single payment obligation that does not recur into later periods.")]
    OneTime,

    #[schemars(
        description = "An obligation spread evenly over `term` fiscal periods. Each period owes total / term."
    )]
    MultiYear {
        #[schemars(description = "Number of fiscal periods the pledge spans (e.g. 3)")]
        term: u32,
    },

    #[schemars(
        description = "Any other commitment type. Treated as the full amount owed in each recognized period."
    )]
    Unspecified,
}

impl Default for CommitmentKind {
    fn default() -> Self {
        Self::Unspecified
    }
}

impl CommitmentKind {
    /// Parses an upstream commitment type label such as `"One-time"` or `"3-Year Pledge"`.
    pub fn from_label(label: &str) -> Self {
        let trimmed = label.trim();
        if trimmed.eq_ignore_ascii_case("one-time") {
            return Self::OneTime;
        }
        match parse_term(trimmed) {
            Some(term) => Self::MultiYear { term },
            None => Self::Unspecified,
        }
    }

    /// The amount owed in a single period for a pledge of `total`.
    pub fn annual_portion(&self, total: f64) -> f64 {
        match self {
            Self::MultiYear { term } if *term > 0 => total / f64::from(*term),
            _ => total,
        }
    }
}

/// Finds `<N>-year` or `<N> year` in a label.
fn parse_term(label: &str) -> Option<u32> {
    let lower = label.to_lowercase();
    for (idx, _) in lower.match_indices("year") {
        let head = &lower[..idx];
        let Some(head) = head.strip_suffix('-').or_else(|| head.strip_suffix(' ')) else {
            continue;
        };
        let digit_count = head.chars().rev().take_while(|c| c.is_ascii_digit()).count();
        let digits = &head[head.len() - digit_count..];
        if let Ok(term) = digits.parse::<u32>() {
            if term >= 1 {
                return Some(term);
            }
        }
    }
    None
}

/// A pledged obligation, normalized and immutable for the duration of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct Commitment {
    pub id: CommitmentId,

    #[schemars(description = "Region label. None when the pledge has no region mapping.")]
    pub region: Option<String>,

    pub kind: CommitmentKind,

    #[schemars(description = "Total pledged amount across all periods. Never negative.")]
    pub total_pledged: f64,

    #[schemars(description = "Fiscal period the pledge was made in. None when unrecognized.")]
    pub origin: Option<FiscalPeriod>,

    #[serde(default)]
    pub linked_gift_ids: Vec<GiftId>,
}

impl Commitment {
    pub fn region_or<'a>(&'a self, unmapped: &'a str) -> &'a str {
        self.region.as_deref().unwrap_or(unmapped)
    }
}

/// A realized payment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct Gift {
    pub id: GiftId,

    #[schemars(description = "Realized amount. Never negative.")]
    pub amount: f64,

    #[schemars(description = "Fiscal period the gift was realized in. None when unrecognized.")]
    pub period: Option<FiscalPeriod>,

    #[serde(default)]
    #[schemars(description = "Fund class (e.g. 'Unrestricted'). Empty when unknown.")]
    pub class: String,

    #[serde(default)]
    #[schemars(description = "Date received, when known. Carried for reporting; never used to pick the period.")]
    pub received_on: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct FiscalPeriods {
    #[schemars(description = "Label of the earlier period as it appears upstream (e.g. '2024').")]
    pub earlier: String,

    #[schemars(description = "Label of the current period as it appears upstream (e.g. '2025').")]
    pub current: String,
}

impl Default for FiscalPeriods {
    fn default() -> Self {
        Self {
            earlier: "2024".to_string(),
            current: "2025".to_string(),
        }
    }
}

impl FiscalPeriods {
    pub fn label(&self, period: FiscalPeriod) -> &str {
        match period {
            FiscalPeriod::Earlier => &self.earlier,
            FiscalPeriod::Current => &self.current,
        }
    }

    /// Gift boards group realized gifts as "<label> Gifts".
    pub fn gift_group_label(&self, period: FiscalPeriod) -> String {
        format!("{} Gifts", self.label(period))
    }

    pub fn commitment_period(&self, group: &str) -> Option<FiscalPeriod> {
        let group = group.trim();
        [FiscalPeriod::Earlier, FiscalPeriod::Current]
            .into_iter()
            .find(|p| self.label(*p) == group)
    }

    pub fn gift_period(&self, group: &str) -> Option<FiscalPeriod> {
        let group = group.trim();
        [FiscalPeriod::Earlier, FiscalPeriod::Current]
            .into_iter()
            .find(|p| self.gift_group_label(*p) == group || self.label(*p) == group)
    }

    fn validate(&self) -> Result<()> {
        let earlier = self.earlier.trim();
        let current = self.current.trim();
        if earlier.is_empty() || current.is_empty() {
            return Err(ReconciliationError::InvalidFiscalPeriods(
                "period labels must not be empty".to_string(),
            ));
        }
        if earlier == current {
            return Err(ReconciliationError::InvalidFiscalPeriods(format!(
                "earlier and current periods share the label '{}'",
                earlier
            )));
        }
        Ok(())
    }
}

/// Share of every outstanding balance attributed to restricted funds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct SplitRatio {
    #[schemars(description = "Restricted share between 0.0 and 1.0. The remainder is unrestricted.")]
    pub restricted: f64,
}

impl Default for SplitRatio {
    fn default() -> Self {
        Self { restricted: 0.70 }
    }
}

impl SplitRatio {
    pub fn new(restricted: f64) -> Result<Self> {
        let ratio = Self { restricted };
        ratio.validate()?;
        Ok(ratio)
    }

    pub fn unrestricted(&self) -> f64 {
        1.0 - self.restricted
    }

    pub fn validate(&self) -> Result<()> {
        if !self.restricted.is_finite() || !(0.0..=1.0).contains(&self.restricted) {
            return Err(ReconciliationError::InvalidSplitRatio(self.restricted));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ReconciliationConfig {
    #[serde(default)]
    #[schemars(description = "Labels of the two adjacent fiscal periods being reconciled.")]
    pub periods: FiscalPeriods,

    #[serde(default)]
    #[schemars(description = "Restricted/unrestricted split applied to regional balances. Defaults to 70/30.")]
    pub split: SplitRatio,

    #[serde(default = "default_unmapped_region")]
    #[schemars(description = "Region label used for commitments without a region.")]
    pub unmapped_region: String,
}

fn default_unmapped_region() -> String {
    "Unmapped".to_string()
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            periods: FiscalPeriods::default(),
            split: SplitRatio::default(),
            unmapped_region: default_unmapped_region(),
        }
    }
}

impl ReconciliationConfig {
    pub fn validate(&self) -> Result<()> {
        self.split.validate()?;
        self.periods.validate()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ReconciliationConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commitment_kind_from_label() {
        assert_eq!(CommitmentKind::from_label("One-time"), CommitmentKind::OneTime);
        assert_eq!(CommitmentKind::from_label("  one-time "), CommitmentKind::OneTime);
        assert_eq!(
            CommitmentKind::from_label("3-Year Pledge"),
            CommitmentKind::MultiYear { term: 3 }
        );
        assert_eq!(
            CommitmentKind::from_label("5 year"),
            CommitmentKind::MultiYear { term: 5 }
        );
        assert_eq!(CommitmentKind::from_label("Recurring"), CommitmentKind::Unspecified);
        assert_eq!(CommitmentKind::from_label(""), CommitmentKind::Unspecified);
        assert_eq!(CommitmentKind::from_label("0-year"), CommitmentKind::Unspecified);
        assert_eq!(CommitmentKind::from_label("yearly"), CommitmentKind::Unspecified);
    }

    #[test]
    fn test_annual_portion() {
        assert!((CommitmentKind::MultiYear { term: 3 }.annual_portion(300.0) - 100.0).abs() < 1e-9);
        assert_eq!(CommitmentKind::OneTime.annual_portion(300.0), 300.0);
        assert_eq!(CommitmentKind::Unspecified.annual_portion(300.0), 300.0);
        assert_eq!(CommitmentKind::MultiYear { term: 0 }.annual_portion(300.0), 300.0);
    }

    #[test]
    fn test_period_labels() {
        let periods = FiscalPeriods::default();
        assert_eq!(periods.commitment_period("2024"), Some(FiscalPeriod::Earlier));
        assert_eq!(periods.commitment_period(" 2025 "), Some(FiscalPeriod::Current));
        assert_eq!(periods.commitment_period("2023"), None);
        assert_eq!(periods.gift_period("2024 Gifts"), Some(FiscalPeriod::Earlier));
        assert_eq!(periods.gift_period("2025 Gifts"), Some(FiscalPeriod::Current));
        assert_eq!(periods.gift_period("2012-24 Gifts"), None);
        assert_eq!(periods.gift_period("2025"), Some(FiscalPeriod::Current));
    }

    #[test]
    fn test_split_ratio_validation() {
        assert!(SplitRatio::new(0.0).is_ok());
        assert!(SplitRatio::new(1.0).is_ok());
        assert!(matches!(
            SplitRatio::new(1.2),
            Err(ReconciliationError::InvalidSplitRatio(_))
        ));
        assert!(SplitRatio::new(-0.1).is_err());
        assert!(SplitRatio::new(f64::NAN).is_err());
        assert!((SplitRatio::default().unrestricted() - 0.30).abs() < 1e-12);
    }

    #[test]
    fn test_config_defaults_from_json() {
        let config = ReconciliationConfig::from_json("{}").unwrap();
        assert_eq!(config, ReconciliationConfig::default());
        assert_eq!(config.unmapped_region, "Unmapped");

        let config = ReconciliationConfig::from_json(
            r#"{"split": {"restricted": 0.6}, "unmapped_region": "Other"}"#,
        )
        .unwrap();
        assert!((config.split.restricted - 0.6).abs() < 1e-12);
        assert_eq!(config.unmapped_region, "Other");
    }

    #[test]
    fn test_config_validation_errors() {
        assert!(ReconciliationConfig::from_json(r#"{"split": {"restricted": 2.0}}"#).is_err());
        assert!(ReconciliationConfig::from_json(r#"{"split": {"restricted": -0.5}}"#).is_err());
        assert!(matches!(
            ReconciliationConfig::from_json(r#"{"periods": {"earlier": "2025", "current": "2025"}}"#),
            Err(ReconciliationError::InvalidFiscalPeriods(_))
        ));
        assert!(matches!(
            ReconciliationConfig::from_json("not json"),
            Err(ReconciliationError::SerializationError(_))
        ));
    }

    #[test]
    fn test_schema_generation() {
        let schema_json = ReconciliationConfig::schema_as_json().unwrap();
        assert!(schema_json.contains("periods"));
        assert!(schema_json.contains("split"));
        assert!(schema_json.contains("unmapped_region"));
    }
}
