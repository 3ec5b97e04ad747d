use crate::domain::rules::EvaluatedCreative;
use anyhow::bail;
use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;

/// Where one creative landed under the win rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Win,
    Loss,
    /// Below the spend threshold, so not judged yet.
    Learning,
}

impl Outcome {
    pub fn of(item: &EvaluatedCreative) -> Self {
        if item.is_winner {
            Outcome::Win
        } else if item.is_qualified {
            Outcome::Loss
        } else {
            Outcome::Learning
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Outcome::Win => "WIN",
            Outcome::Loss => "LOSS",
            Outcome::Learning => "LEARNING",
        }
    }
}

impl FromStr for Outcome {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "win" | "wins" | "winner" | "winners" => Ok(Outcome::Win),
            "loss" | "losses" | "loser" | "losers" => Ok(Outcome::Loss),
            "learning" => Ok(Outcome::Learning),
            other => bail!("unknown result {other:?} (expected win, loss or learning)"),
        }
    }
}

/// Narrowing applied before any table is built. Empty, `None` or "All" leave a field open.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CreativeFilter {
    pub funnel: Option<String>,
    pub format: Option<String>,
    pub angle: Option<String>,
    pub creator: Option<String>,
    pub min_spend: Option<Decimal>,
    pub max_spend: Option<Decimal>,
    pub result: Option<Outcome>,
}

impl CreativeFilter {
    /// The winners gallery: only creatives that passed both thresholds.
    pub fn winners() -> Self {
        Self {
            result: Some(Outcome::Win),
            ..Default::default()
        }
    }

    pub fn matches(&self, item: &EvaluatedCreative) -> bool {
        let record = &item.record;
        label_matches(&self.funnel, record.funnel_stage.label())
            && label_matches(&self.format, record.format.label())
            && label_matches(&self.angle, record.angle_label())
            && label_matches(&self.creator, &record.creator_label())
            && self.min_spend.map_or(true, |min| record.spend >= min)
            && self.max_spend.map_or(true, |max| record.spend <= max)
            && self.result.map_or(true, |want| Outcome::of(item) == want)
    }

    pub fn apply(&self, evaluated: &[EvaluatedCreative]) -> Vec<EvaluatedCreative> {
        evaluated
            .iter()
            .filter(|item| self.matches(item))
            .cloned()
            .collect()
    }

    pub fn is_open(&self) -> bool {
        [&self.funnel, &self.format, &self.angle, &self.creator]
            .into_iter()
            .all(|f| wanted(f).is_none())
            && self.min_spend.is_none()
            && self.max_spend.is_none()
            && self.result.is_none()
    }
}

fn wanted(field: &Option<String>) -> Option<&str> {
    field
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("all"))
}

fn label_matches(field: &Option<String>, actual: &str) -> bool {
    wanted(field).map_or(true, |want| want.eq_ignore_ascii_case(actual))
}
