use crate::domain::creative::{AdCreativeRecord, Angle, CreativeFormat, FunnelStage};
use anyhow::{bail, ensure, Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// Longest period `last_days` accepts, about ten years.
pub const MAX_PERIOD_DAYS: u32 = 3650;

/// Upper bound for a single spend or revenue amount. Keeps every aggregate far from
/// `Decimal::MAX`.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0xA4C6_8000, 0x0003_8D7E, 0, false, 0);

/// Inclusive date range the insights are aggregated over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportingPeriod {
    pub since: NaiveDate,
    pub until: NaiveDate,
}

impl ReportingPeriod {
    pub fn new(since: NaiveDate, until: NaiveDate) -> Result<Self> {
        ensure!(
            since <= until,
            "reporting period starts after it ends ({since} > {until})"
        );
        Ok(Self { since, until })
    }

    pub fn last_days(until: NaiveDate, days: u32) -> Result<Self> {
        ensure!(
            days <= MAX_PERIOD_DAYS,
            "reporting period of {days} days is too long (max {MAX_PERIOD_DAYS})"
        );
        let since = until
            .checked_sub_signed(Duration::days(i64::from(days.max(1)) - 1))
            .with_context(|| format!("{days} days before {until} is out of range"))?;
        Ok(Self { since, until })
    }
}

/// One ad row as a provider delivers it, before validation.
///
/// Numeric fields stay as raw JSON so that both `"12.50"` (Graph API style) and `12.5` are
/// accepted. Everything is optional; `normalize_row` decides what to default and what to reject.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawAdRow {
    pub ad_id: Option<String>,
    pub ad_name: Option<String>,
    pub campaign_id: Option<String>,
    pub campaign_name: Option<String>,
    pub objective: Option<String>,
    pub creative_id: Option<String>,
    pub creative_type: Option<String>,
    pub primary_text: Option<String>,
    pub headline: Option<String>,
    pub image_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub status: Option<String>,
    pub created_time: Option<String>,
    pub spend: Option<Value>,
    pub revenue: Option<Value>,
    pub impressions: Option<Value>,
    pub clicks: Option<Value>,
    pub conversions: Option<Value>,
    pub creator: Option<String>,
    pub angle: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestBatch {
    pub source: &'static str,
    pub period: ReportingPeriod,
    pub records: Vec<AdCreativeRecord>,
    /// Rows kept with at least one missing numeric field set to zero.
    pub defaulted: usize,
    /// Rows dropped because a required field was missing or malformed.
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    pub record: AdCreativeRecord,
    pub defaulted_fields: Vec<&'static str>,
}

pub fn normalize_row(raw: RawAdRow) -> Result<NormalizedRow> {
    let ad_id = non_empty(raw.ad_id).context("ad_id is missing")?;
    let mut defaulted_fields = Vec::new();

    let spend = amount_field("spend", raw.spend.as_ref(), &mut defaulted_fields)
        .with_context(|| format!("ad {ad_id}"))?;
    let revenue = amount_field("revenue", raw.revenue.as_ref(), &mut defaulted_fields)
        .with_context(|| format!("ad {ad_id}"))?;
    let impressions = count_field("impressions", raw.impressions.as_ref(), &mut defaulted_fields)
        .with_context(|| format!("ad {ad_id}"))?;
    let clicks = count_field("clicks", raw.clicks.as_ref(), &mut defaulted_fields)
        .with_context(|| format!("ad {ad_id}"))?;
    let conversions = count_field("conversions", raw.conversions.as_ref(), &mut defaulted_fields)
        .with_context(|| format!("ad {ad_id}"))?;

    let objective = raw.objective.unwrap_or_default();
    let creative_type = raw.creative_type.unwrap_or_default();

    let record = AdCreativeRecord {
        ad_name: non_empty(raw.ad_name).unwrap_or_else(|| ad_id.clone()),
        campaign_id: raw.campaign_id.unwrap_or_default(),
        campaign_name: raw.campaign_name.unwrap_or_default(),
        funnel_stage: FunnelStage::from_objective(&objective),
        objective,
        format: CreativeFormat::from_creative_type(&creative_type),
        creative_id: non_empty(raw.creative_id).unwrap_or_else(|| ad_id.clone()),
        primary_text: raw.primary_text.unwrap_or_default(),
        headline: raw.headline.unwrap_or_default(),
        image_url: raw.image_url.unwrap_or_default(),
        thumbnail_url: raw.thumbnail_url.unwrap_or_default(),
        status: raw.status.unwrap_or_default(),
        created_time: raw.created_time.as_deref().and_then(parse_created_time),
        spend,
        revenue,
        impressions,
        clicks,
        conversions,
        creator: non_empty(raw.creator),
        angle: non_empty(raw.angle).map(|a| Angle::normalize(&a)),
        ad_id,
    };

    Ok(NormalizedRow {
        record,
        defaulted_fields,
    })
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn amount_field(
    name: &'static str,
    v: Option<&Value>,
    defaulted: &mut Vec<&'static str>,
) -> Result<Decimal> {
    let amount = match v {
        None | Some(Value::Null) => {
            defaulted.push(name);
            return Ok(Decimal::ZERO);
        }
        Some(Value::String(s)) if s.trim().is_empty() => {
            defaulted.push(name);
            return Ok(Decimal::ZERO);
        }
        Some(Value::String(s)) => Decimal::from_str(s.trim())
            .with_context(|| format!("{name} is not a decimal: {s:?}"))?,
        Some(Value::Number(n)) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .with_context(|| format!("{name} is not a decimal: {n}"))?,
        Some(other) => bail!("{name} has unexpected JSON type: {other}"),
    };

    ensure!(
        !amount.is_sign_negative() || amount.is_zero(),
        "{name} must not be negative (got {amount})"
    );
    ensure!(
        amount <= MAX_AMOUNT,
        "{name} is implausibly large (got {amount}, max {MAX_AMOUNT})"
    );
    Ok(amount)
}

fn count_field(
    name: &'static str,
    v: Option<&Value>,
    defaulted: &mut Vec<&'static str>,
) -> Result<u64> {
    match v {
        None | Some(Value::Null) => {
            defaulted.push(name);
            Ok(0)
        }
        Some(Value::String(s)) if s.trim().is_empty() => {
            defaulted.push(name);
            Ok(0)
        }
        Some(Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .with_context(|| format!("{name} is not a non-negative integer: {s:?}")),
        Some(Value::Number(n)) => n
            .as_u64()
            .with_context(|| format!("{name} is not a non-negative integer: {n}")),
        Some(other) => bail!("{name} has unexpected JSON type: {other}"),
    }
}

fn parse_created_time(s: &str) -> Option<DateTime<Utc>> {
    let t = s.trim();
    if t.is_empty() {
        return None;
    }

    // Graph API emits offsets without a colon ("2026-01-05T10:30:00+0000").
    DateTime::parse_from_rfc3339(t)
        .or_else(|_| DateTime::parse_from_str(t, "%Y-%m-%dT%H:%M:%S%z"))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(t, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone};
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn raw(v: Value) -> RawAdRow {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn accepts_string_and_number_amounts() {
        let row = normalize_row(raw(json!({
            "ad_id": "1",
            "spend": "120.55",
            "revenue": 300.1,
            "impressions": "1000",
            "clicks": 12,
            "conversions": 3,
            "objective": "OUTCOME_SALES",
            "creative_type": "VIDEO",
        })))
        .unwrap();

        assert_eq!(row.record.spend, dec!(120.55));
        assert_eq!(row.record.revenue, dec!(300.1));
        assert_eq!(row.record.impressions, 1000);
        assert_eq!(row.record.funnel_stage, FunnelStage::Bof);
        assert_eq!(row.record.format, CreativeFormat::Video);
        assert!(row.defaulted_fields.is_empty());
    }

    #[test]
    fn missing_numbers_default_to_zero() {
        let row = normalize_row(raw(json!({"ad_id": "1", "spend": "50"}))).unwrap();
        assert_eq!(row.record.revenue, Decimal::ZERO);
        assert_eq!(
            row.defaulted_fields,
            vec!["revenue", "impressions", "clicks", "conversions"]
        );
        assert_eq!(row.record.ad_name, "1");
        assert_eq!(row.record.creative_id, "1");
    }

    #[test]
    fn rejects_negative_or_malformed_amounts() {
        assert!(normalize_row(raw(json!({"ad_id": "1", "spend": "-5"}))).is_err());
        assert!(normalize_row(raw(json!({"ad_id": "1", "revenue": "abc"}))).is_err());
        assert!(normalize_row(raw(json!({"ad_id": "1", "clicks": -1}))).is_err());
        assert!(normalize_row(raw(json!({"ad_id": "1", "spend": [1]}))).is_err());
        assert!(normalize_row(raw(json!({"spend": "5"}))).is_err());
        assert!(normalize_row(raw(json!({"ad_id": "  "}))).is_err());
    }

    #[test]
    fn parses_graph_api_timestamps() {
        let t = parse_created_time("2026-01-05T10:30:00+0000").unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2026, 1, 5, 10, 30, 0).unwrap());
        let t = parse_created_time("2025-12-01T08:00:00Z").unwrap();
        assert_eq!(t.month(), 12);
        assert!(parse_created_time("2025-12-01").is_some());
        assert!(parse_created_time("yesterday").is_none());
    }

    #[test]
    fn normalizes_fixture_angle_and_creator() {
        let row = normalize_row(raw(json!({
            "ad_id": "1",
            "angle": "social proof",
            "creator": " Sarah ",
        })))
        .unwrap();
        assert_eq!(row.record.angle, Some(Angle::SocialProof));
        assert_eq!(row.record.creator.as_deref(), Some("Sarah"));
    }

    #[test]
    fn reporting_period_bounds() {
        let until = NaiveDate::from_ymd_opt(2026, 1, 30).unwrap();
        let p = ReportingPeriod::last_days(until, 30).unwrap();
        assert_eq!(p.since, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        assert!(ReportingPeriod::new(until, p.since).is_err());
    }

    #[test]
    fn huge_day_counts_are_rejected_not_panicking() {
        let until = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
        assert!(ReportingPeriod::last_days(until, u32::MAX).is_err());
        assert!(ReportingPeriod::last_days(until, MAX_PERIOD_DAYS + 1).is_err());
        let p = ReportingPeriod::last_days(until, MAX_PERIOD_DAYS).unwrap();
        assert!(p.since < until);
        // Near the calendar's lower edge the subtraction itself overflows.
        assert!(ReportingPeriod::last_days(NaiveDate::MIN, 2).is_err());
    }

    #[test]
    fn oversized_amounts_are_rejected() {
        assert_eq!(MAX_AMOUNT, Decimal::from(1_000_000_000_000_000_i64));
        assert!(normalize_row(raw(json!({"ad_id": "1", "spend": "1000000000000000"}))).is_ok());
        assert!(
            normalize_row(raw(json!({"ad_id": "1", "spend": "50000000000000000000000000000"})))
                .is_err()
        );
        assert!(normalize_row(raw(json!({"ad_id": "1", "revenue": 1e20}))).is_err());
    }
}
