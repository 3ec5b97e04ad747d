use crate::ingest::types::{normalize_row, IngestBatch, RawAdRow, ReportingPeriod};
use anyhow::{Context, Result};

/// Anything that can hand over ad rows for a reporting period.
#[async_trait::async_trait]
pub trait RecordSource: Send + Sync {
    fn source_name(&self) -> &'static str;

    async fn fetch_rows(&self, period: &ReportingPeriod) -> Result<Vec<RawAdRow>>;
}

/// Fetches rows from `source` and normalizes them.
///
/// All providers go through here, so two sources returning the same values produce the same
/// records. Malformed rows are skipped and counted instead of failing the run.
pub async fn load_records(source: &dyn RecordSource, period: &ReportingPeriod) -> Result<IngestBatch> {
    let rows = source
        .fetch_rows(period)
        .await
        .with_context(|| format!("{} fetch failed", source.source_name()))?;

    let total = rows.len();
    let mut records = Vec::with_capacity(total);
    let mut defaulted: usize = 0;
    let mut skipped: usize = 0;
    let mut logged_skips: usize = 0;

    for (idx, raw) in rows.into_iter().enumerate() {
        match normalize_row(raw) {
            Ok(row) => {
                if !row.defaulted_fields.is_empty() {
                    defaulted += 1;
                    tracing::debug!(
                        idx,
                        ad_id = %row.record.ad_id,
                        fields = ?row.defaulted_fields,
                        "missing numeric fields defaulted to zero"
                    );
                }
                records.push(row.record);
            }
            Err(err) => {
                skipped += 1;
                if logged_skips < 10 {
                    tracing::warn!(idx, error = %format!("{err:#}"), "skipping malformed ad row");
                    logged_skips += 1;
                }
            }
        }
    }

    tracing::info!(
        source = source.source_name(),
        since = %period.since,
        until = %period.until,
        total,
        records = records.len(),
        defaulted,
        skipped,
        "ad rows loaded"
    );

    Ok(IngestBatch {
        source: source.source_name(),
        period: *period,
        records,
        defaulted,
        skipped,
    })
}
