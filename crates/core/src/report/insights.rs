use crate::domain::rules::{self, EvaluatedCreative};
use crate::report::round_roas;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const ALERT_LIMIT: usize = 10;

/// Cut-offs for the scale/pause shortlists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsightThresholds {
    /// Rising stars: spend strictly below this...
    pub rising_max_spend: Decimal,
    /// ...and ROAS strictly above this.
    pub rising_min_roas: Decimal,
    /// Fatigue: spend at or above this...
    pub fatigue_min_spend: Decimal,
    /// ...and ROAS strictly below this.
    pub fatigue_max_roas: Decimal,
    pub top_creators: usize,
}

impl Default for InsightThresholds {
    fn default() -> Self {
        Self {
            rising_max_spend: Decimal::from(1000),
            rising_min_roas: Decimal::from(4),
            fatigue_min_spend: Decimal::from(5000),
            fatigue_max_roas: Decimal::new(15, 1),
            top_creators: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatorStanding {
    pub creator: String,
    pub winning_ads: usize,
    pub spend: Decimal,
    pub revenue: Decimal,
    pub roas: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insights {
    pub thresholds: InsightThresholds,
    pub top_creators: Vec<CreatorStanding>,
    pub rising_stars: Vec<EvaluatedCreative>,
    pub fatigue_alerts: Vec<EvaluatedCreative>,
}

pub fn insights(evaluated: &[EvaluatedCreative], thresholds: &InsightThresholds) -> Insights {
    Insights {
        thresholds: *thresholds,
        top_creators: top_creators(evaluated, thresholds.top_creators),
        rising_stars: rising_stars(
            evaluated,
            thresholds.rising_max_spend,
            thresholds.rising_min_roas,
        ),
        fatigue_alerts: fatigue_alerts(
            evaluated,
            thresholds.fatigue_min_spend,
            thresholds.fatigue_max_roas,
        ),
    }
}

/// Creators ranked by how much spend went to their winning ads.
pub fn top_creators(evaluated: &[EvaluatedCreative], n: usize) -> Vec<CreatorStanding> {
    let mut by_creator: BTreeMap<String, CreatorStanding> = BTreeMap::new();
    for item in evaluated.iter().filter(|i| i.is_winner) {
        let creator = item.record.creator_label();
        let entry = by_creator
            .entry(creator.clone())
            .or_insert_with(|| CreatorStanding {
                creator,
                winning_ads: 0,
                spend: Decimal::ZERO,
                revenue: Decimal::ZERO,
                roas: None,
            });
        entry.winning_ads += 1;
        entry.spend = entry.spend.saturating_add(item.record.spend);
        entry.revenue = entry.revenue.saturating_add(item.record.revenue);
    }

    let mut standings: Vec<CreatorStanding> = by_creator
        .into_values()
        .map(|mut s| {
            s.roas = rules::roas(s.spend, s.revenue).map(round_roas);
            s
        })
        .collect();
    standings.sort_by(|a, b| b.spend.cmp(&a.spend).then_with(|| a.creator.cmp(&b.creator)));
    standings.truncate(n);
    standings
}

/// Cheap ads already returning well; candidates for more budget.
pub fn rising_stars(
    evaluated: &[EvaluatedCreative],
    max_spend: Decimal,
    min_roas: Decimal,
) -> Vec<EvaluatedCreative> {
    let mut stars: Vec<&EvaluatedCreative> = evaluated
        .iter()
        .filter(|i| i.record.spend < max_spend && i.roas.is_some_and(|r| r > min_roas))
        .collect();
    stars.sort_by(|a, b| {
        b.roas
            .cmp(&a.roas)
            .then_with(|| a.record.ad_id.cmp(&b.record.ad_id))
    });
    stars.into_iter().take(ALERT_LIMIT).cloned().collect()
}

/// Heavy spenders that no longer pay back; candidates for pausing.
pub fn fatigue_alerts(
    evaluated: &[EvaluatedCreative],
    min_spend: Decimal,
    max_roas: Decimal,
) -> Vec<EvaluatedCreative> {
    let mut fatigued: Vec<&EvaluatedCreative> = evaluated
        .iter()
        .filter(|i| i.record.spend >= min_spend && i.roas.is_some_and(|r| r < max_roas))
        .collect();
    fatigued.sort_by(|a, b| {
        b.record
            .spend
            .cmp(&a.record.spend)
            .then_with(|| a.record.ad_id.cmp(&b.record.ad_id))
    });
    fatigued.into_iter().take(ALERT_LIMIT).cloned().collect()
}
