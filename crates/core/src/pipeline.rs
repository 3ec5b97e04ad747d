use crate::config::{DataMode, Settings};
use crate::domain::rules::{apply_win_rules, EvaluatedCreative, WinRuleConfig};
use crate::ingest::fixture::FixtureSource;
use crate::ingest::meta::MetaAdsClient;
use crate::ingest::provider::{load_records, RecordSource};
use crate::ingest::types::ReportingPeriod;
use crate::llm::{label_creatives, AngleLabeler, LabelReport};
use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;

/// One dashboard refresh: where the rows come from and how they are judged.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub mode: DataMode,
    /// Live mode only; falls back to the first configured account.
    pub ad_account_id: Option<String>,
    /// Demo mode only; replaces the generated rows.
    pub fixture_path: Option<PathBuf>,
    pub period: ReportingPeriod,
    pub win_rules: WinRuleConfig,
    pub label_concurrency: usize,
    pub relabel: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardData {
    pub source: &'static str,
    pub mode: DataMode,
    pub period: ReportingPeriod,
    pub win_rules: WinRuleConfig,
    pub defaulted: usize,
    pub skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<LabelReport>,
    pub creatives: Vec<EvaluatedCreative>,
}

pub fn record_source(settings: &Settings, opts: &RunOptions) -> Result<Box<dyn RecordSource>> {
    match opts.mode {
        DataMode::Demo => Ok(match &opts.fixture_path {
            Some(path) => Box::new(FixtureSource::from_json_file(path.clone())),
            None => Box::new(FixtureSource::default()),
        }),
        DataMode::Live => Ok(Box::new(MetaAdsClient::from_settings(
            settings,
            opts.ad_account_id.as_deref(),
        )?)),
    }
}

/// Loads, optionally labels, then evaluates. Data only ever flows forward.
pub async fn run(
    source: &dyn RecordSource,
    opts: &RunOptions,
    labeler: Option<&dyn AngleLabeler>,
) -> Result<DashboardData> {
    opts.win_rules.validate()?;

    let mut batch = load_records(source, &opts.period).await?;

    let labels = match labeler {
        Some(labeler) => Some(
            label_creatives(
                labeler,
                &mut batch.records,
                opts.label_concurrency,
                opts.relabel,
            )
            .await,
        ),
        None => None,
    };

    let creatives = apply_win_rules(&batch.records, &opts.win_rules);

    tracing::info!(
        source = batch.source,
        mode = ?opts.mode,
        creatives = creatives.len(),
        winners = creatives.iter().filter(|c| c.is_winner).count(),
        min_roas = %opts.win_rules.min_roas,
        min_spend = %opts.win_rules.min_spend,
        "dashboard data ready"
    );

    Ok(DashboardData {
        source: batch.source,
        mode: opts.mode,
        period: batch.period,
        win_rules: opts.win_rules,
        defaulted: batch.defaulted,
        skipped: batch.skipped,
        labels,
        creatives,
    })
}
