pub mod anthropic;
pub mod error;
pub mod json;

use crate::domain::contract::AngleAnalysis;
use crate::domain::creative::AdCreativeRecord;
use crate::llm::error::LlmDiagnosticsError;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::BTreeMap;

/// The creative copy and imagery a classifier looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreativeText {
    pub creative_id: String,
    pub primary_text: String,
    pub headline: String,
    /// Image or video thumbnail, whichever the creative has.
    pub image_url: Option<String>,
}

impl CreativeText {
    pub fn from_record(record: &AdCreativeRecord) -> Self {
        let image_url = [&record.image_url, &record.thumbnail_url]
            .into_iter()
            .map(|u| u.trim())
            .find(|u| !u.is_empty())
            .map(str::to_string);

        Self {
            creative_id: record.creative_id.clone(),
            primary_text: record.primary_text.clone(),
            headline: record.headline.clone(),
            image_url,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Provider {
    Anthropic,
}

#[async_trait::async_trait]
pub trait AngleLabeler: Send + Sync {
    fn provider(&self) -> Provider;

    async fn classify(&self, creative: &CreativeText) -> anyhow::Result<AngleAnalysis>;
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LabelReport {
    /// Distinct creatives sent to the labeler.
    pub requested: usize,
    pub labeled: usize,
    pub failed: usize,
    /// Records left alone because they already carried an angle.
    pub kept_existing: usize,
    pub analyses: BTreeMap<String, AngleAnalysis>,
}

/// Labels every record's creative, running at most `concurrency` calls at a time.
///
/// Calls are independent: each result lands only on the records sharing its `creative_id`, and a
/// failed call leaves those records unlabeled without stopping the others.
pub async fn label_creatives(
    labeler: &dyn AngleLabeler,
    records: &mut [AdCreativeRecord],
    concurrency: usize,
    relabel: bool,
) -> LabelReport {
    let mut report = LabelReport::default();

    let mut pending: BTreeMap<String, CreativeText> = BTreeMap::new();
    for record in records.iter() {
        if record.angle.is_some() && !relabel {
            report.kept_existing += 1;
            continue;
        }
        pending
            .entry(record.creative_id.clone())
            .or_insert_with(|| CreativeText::from_record(record));
    }
    report.requested = pending.len();

    let results: Vec<(String, anyhow::Result<AngleAnalysis>)> = stream::iter(pending.into_values())
        .map(|creative| async move {
            let res = labeler.classify(&creative).await;
            (creative.creative_id, res)
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    for (creative_id, res) in results {
        match res {
            Ok(analysis) => {
                report.labeled += 1;
                report.analyses.insert(creative_id, analysis);
            }
            Err(err) => {
                report.failed += 1;
                tracing::warn!(
                    %creative_id,
                    provider = ?labeler.provider(),
                    error = %format!("{err:#}"),
                    "angle classification failed; leaving creative unlabeled"
                );
                if let Some(diag) = err.downcast_ref::<LlmDiagnosticsError>() {
                    tracing::debug!(
                        %creative_id,
                        stage = diag.stage,
                        raw_output = ?diag.raw_output,
                        raw_response_json = ?diag.raw_response_json,
                        "raw model output for failed classification"
                    );
                }
            }
        }
    }

    for record in records.iter_mut() {
        if record.angle.is_some() && !relabel {
            continue;
        }
        if let Some(analysis) = report.analyses.get(&record.creative_id) {
            record.angle = Some(analysis.angle);
        }
    }

    tracing::info!(
        requested = report.requested,
        labeled = report.labeled,
        failed = report.failed,
        kept_existing = report.kept_existing,
        "angle labeling finished"
    );
    report
}
