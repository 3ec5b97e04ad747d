pub mod filter;
pub mod insights;

use crate::domain::rules::{self, EvaluatedCreative};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub use filter::{CreativeFilter, Outcome};
pub use insights::{fatigue_alerts, insights, rising_stars, top_creators, InsightThresholds, Insights};

/// Headline numbers for one evaluated set of creatives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OverviewMetrics {
    pub total_ads: usize,
    pub qualified_ads: usize,
    pub total_winners: usize,
    /// Percent of qualified ads that won, 1 dp.
    pub win_rate: Decimal,
    pub tier: WinRateTier,
    /// Σrevenue / Σspend, 2 dp. `None` when nothing was spent.
    pub blended_roas: Option<Decimal>,
    pub total_spend: Decimal,
    pub total_revenue: Decimal,
}

pub fn overview(evaluated: &[EvaluatedCreative]) -> OverviewMetrics {
    let totals = Totals::sum(evaluated.iter());
    let win_rate = win_rate_pct(totals.winners, totals.qualified);

    OverviewMetrics {
        total_ads: totals.ads,
        qualified_ads: totals.qualified,
        total_winners: totals.winners,
        win_rate,
        tier: WinRateTier::from_win_rate(win_rate),
        blended_roas: rules::roas(totals.spend, totals.revenue).map(round_roas),
        total_spend: totals.spend,
        total_revenue: totals.revenue,
    }
}

/// Grouping key for breakdown tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Funnel,
    Format,
    Angle,
    Creator,
    /// The concept segment of `YYYYMMDD_CREATOR_CONCEPT_FORMAT`.
    Concept,
    Month,
}

impl Dimension {
    pub const ALL: [Dimension; 6] = [
        Dimension::Funnel,
        Dimension::Format,
        Dimension::Angle,
        Dimension::Creator,
        Dimension::Concept,
        Dimension::Month,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Self::Funnel => "Funnel Stage",
            Self::Format => "Format",
            Self::Angle => "Angle",
            Self::Creator => "Creator",
            Self::Concept => "Concept",
            Self::Month => "Launch Month",
        }
    }

    fn key(self, item: &EvaluatedCreative) -> String {
        let record = &item.record;
        match self {
            Self::Funnel => record.funnel_stage.label().to_string(),
            Self::Format => record.format.label().to_string(),
            Self::Angle => record.angle_label().to_string(),
            Self::Creator => record.creator_label(),
            Self::Concept => record.concept_label(),
            Self::Month => record.launch_month(),
        }
    }
}

impl FromStr for Dimension {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "funnel" | "funnel_stage" | "stage" => Ok(Self::Funnel),
            "format" => Ok(Self::Format),
            "angle" => Ok(Self::Angle),
            "creator" => Ok(Self::Creator),
            "concept" => Ok(Self::Concept),
            "month" | "launch_month" => Ok(Self::Month),
            other => anyhow::bail!(
                "unknown dimension {other:?} (expected funnel, format, angle, creator, concept or month)"
            ),
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Funnel => "funnel",
            Self::Format => "format",
            Self::Angle => "angle",
            Self::Creator => "creator",
            Self::Concept => "concept",
            Self::Month => "month",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakdownRow {
    pub name: String,
    pub total_ads: usize,
    pub winners: usize,
    pub qualified: usize,
    pub win_rate: Decimal,
    pub tier: WinRateTier,
    pub spend: Decimal,
    pub revenue: Decimal,
    pub roas: Option<Decimal>,
}

/// Aggregates creatives per group. Highest win rate first, ties by name.
pub fn breakdown(evaluated: &[EvaluatedCreative], dimension: Dimension) -> Vec<BreakdownRow> {
    let mut groups: BTreeMap<String, Vec<&EvaluatedCreative>> = BTreeMap::new();
    for item in evaluated {
        groups.entry(dimension.key(item)).or_default().push(item);
    }

    let mut rows: Vec<BreakdownRow> = groups
        .into_iter()
        .map(|(name, items)| {
            let totals = Totals::sum(items.into_iter());
            let win_rate = win_rate_pct(totals.winners, totals.qualified);
            BreakdownRow {
                name,
                total_ads: totals.ads,
                winners: totals.winners,
                qualified: totals.qualified,
                win_rate,
                tier: WinRateTier::from_win_rate(win_rate),
                spend: totals.spend,
                revenue: totals.revenue,
                roas: rules::roas(totals.spend, totals.revenue).map(round_roas),
            }
        })
        .collect();

    rows.sort_by(|a, b| b.win_rate.cmp(&a.win_rate).then_with(|| a.name.cmp(&b.name)));
    rows
}

/// Coarse grading of a win rate, used to colour dashboards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum WinRateTier {
    Strong,
    Average,
    #[default]
    Weak,
}

impl WinRateTier {
    pub fn from_win_rate(win_rate_pct: Decimal) -> Self {
        if win_rate_pct >= Decimal::from(35) {
            Self::Strong
        } else if win_rate_pct >= Decimal::from(25) {
            Self::Average
        } else {
            Self::Weak
        }
    }
}

impl fmt::Display for WinRateTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Strong => "Strong",
            Self::Average => "Average",
            Self::Weak => "Weak",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Default)]
struct Totals {
    ads: usize,
    qualified: usize,
    winners: usize,
    spend: Decimal,
    revenue: Decimal,
}

impl Totals {
    fn sum<'a>(items: impl Iterator<Item = &'a EvaluatedCreative>) -> Self {
        let mut t = Self::default();
        for item in items {
            t.ads += 1;
            t.qualified += usize::from(item.is_qualified);
            t.winners += usize::from(item.is_winner);
            t.spend = t.spend.saturating_add(item.record.spend);
            t.revenue = t.revenue.saturating_add(item.record.revenue);
        }
        t
    }
}

fn win_rate_pct(winners: usize, qualified: usize) -> Decimal {
    if qualified == 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(winners) * Decimal::ONE_HUNDRED / Decimal::from(qualified))
        .round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero)
}

pub(crate) fn round_roas(roas: Decimal) -> Decimal {
    roas.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
