use crate::domain::creative::AdCreativeRecord;
use anyhow::ensure;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Thresholds deciding which creatives count as winners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinRuleConfig {
    pub min_roas: Decimal,
    pub min_spend: Decimal,
}

impl Default for WinRuleConfig {
    fn default() -> Self {
        Self {
            min_roas: Decimal::new(20, 1),
            min_spend: Decimal::new(1000, 1),
        }
    }
}

impl WinRuleConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            !self.min_roas.is_sign_negative(),
            "min_roas must be >= 0 (got {})",
            self.min_roas
        );
        ensure!(
            !self.min_spend.is_sign_negative(),
            "min_spend must be >= 0 (got {})",
            self.min_spend
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    /// `None` when spend is zero.
    pub roas: Option<Decimal>,
    pub is_qualified: bool,
    pub is_winner: bool,
}

/// A record together with the flags derived from one `WinRuleConfig`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluatedCreative {
    #[serde(flatten)]
    pub record: AdCreativeRecord,
    pub roas: Option<Decimal>,
    pub is_qualified: bool,
    pub is_winner: bool,
}

pub fn roas(spend: Decimal, revenue: Decimal) -> Option<Decimal> {
    if spend > Decimal::ZERO {
        revenue.checked_div(spend)
    } else {
        None
    }
}

pub fn evaluate(record: &AdCreativeRecord, config: &WinRuleConfig) -> Evaluation {
    let roas = roas(record.spend, record.revenue);
    let is_qualified = record.spend >= config.min_spend;
    let is_winner = is_qualified && roas.is_some_and(|r| r >= config.min_roas);
    Evaluation {
        roas,
        is_qualified,
        is_winner,
    }
}

pub fn apply_win_rules(
    records: &[AdCreativeRecord],
    config: &WinRuleConfig,
) -> Vec<EvaluatedCreative> {
    records
        .iter()
        .map(|record| {
            let eval = evaluate(record, config);
            EvaluatedCreative {
                record: record.clone(),
                roas: eval.roas,
                is_qualified: eval.is_qualified,
                is_winner: eval.is_winner,
            }
        })
        .collect()
}
