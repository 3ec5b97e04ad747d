use crate::domain::creative::Angle;
use crate::ingest::provider::RecordSource;
use crate::ingest::types::{RawAdRow, ReportingPeriod};
use anyhow::{Context, Result};
use chrono::{Duration, NaiveTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::Value;
use std::path::PathBuf;

const DEFAULT_ROWS: usize = 50;
const DEFAULT_SEED: u64 = 42;

const CREATORS: [&str; 6] = ["JD", "MK", "AS", "TR", "Sarah", "Agency"];
const CONCEPTS: [(&str, Angle); 8] = [
    ("Problem-Solution", Angle::ProblemSolution),
    ("UGC-Hook", Angle::UgcStyle),
    ("UGC-Testimonial", Angle::UgcStyle),
    ("Social-Proof", Angle::SocialProof),
    ("Review", Angle::SocialProof),
    ("Demo", Angle::ProductDemo),
    ("Before-After", Angle::BeforeAfter),
    ("Lifestyle", Angle::Other),
];
const FORMATS: [(&str, &str); 3] = [("VIDEO", "Video"), ("IMAGE", "Image"), ("CAROUSEL", "Carousel")];
const OBJECTIVES: [&str; 3] = ["OUTCOME_SALES", "OUTCOME_TRAFFIC", "OUTCOME_AWARENESS"];

#[derive(Debug, Clone)]
enum FixtureRows {
    Generated { count: usize, seed: u64 },
    File(PathBuf),
}

/// Demo data: either a seeded synthetic account or rows read from a JSON file.
#[derive(Debug, Clone)]
pub struct FixtureSource {
    rows: FixtureRows,
}

impl Default for FixtureSource {
    fn default() -> Self {
        Self::generated(DEFAULT_ROWS, DEFAULT_SEED)
    }
}

impl FixtureSource {
    pub fn generated(count: usize, seed: u64) -> Self {
        Self {
            rows: FixtureRows::Generated { count, seed },
        }
    }

    /// Reads a JSON array of `RawAdRow` objects on every fetch.
    pub fn from_json_file(path: impl Into<PathBuf>) -> Self {
        Self {
            rows: FixtureRows::File(path.into()),
        }
    }
}

#[async_trait::async_trait]
impl RecordSource for FixtureSource {
    fn source_name(&self) -> &'static str {
        "fixture"
    }

    async fn fetch_rows(&self, period: &ReportingPeriod) -> Result<Vec<RawAdRow>> {
        match &self.rows {
            FixtureRows::Generated { count, seed } => Ok(generate_rows(*count, *seed, period)),
            FixtureRows::File(path) => {
                let text = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("failed to read fixture file {}", path.display()))?;
                serde_json::from_str::<Vec<RawAdRow>>(&text)
                    .with_context(|| format!("fixture file {} is not a JSON array of ad rows", path.display()))
            }
        }
    }
}

fn money(cents: i64) -> Value {
    Value::String(Decimal::new(cents, 2).to_string())
}

/// Same `(count, seed, period)` always yields the same rows.
pub fn generate_rows(count: usize, seed: u64, period: &ReportingPeriod) -> Vec<RawAdRow> {
    let mut rng = StdRng::seed_from_u64(seed);
    let span_days = (period.until - period.since).num_days().max(0);

    let mut out = Vec::with_capacity(count);
    for i in 1..=count {
        let creator = CREATORS[rng.random_range(0..CREATORS.len())];
        let (concept, angle) = CONCEPTS[rng.random_range(0..CONCEPTS.len())];
        let (creative_type, format_name) = FORMATS[rng.random_range(0..FORMATS.len())];
        let objective = OBJECTIVES[rng.random_range(0..OBJECTIVES.len())];

        let launch = period
            .since
            .checked_sub_signed(Duration::days(rng.random_range(0..=span_days + 30)))
            .unwrap_or(period.since);
        let ad_name = format!("{}_{creator}_{concept}_{format_name}", launch.format("%Y%m%d"));

        // Every 17th ad never spent, to keep the zero-spend path visible in demos.
        let spend_cents: i64 = if i % 17 == 0 {
            0
        } else {
            rng.random_range(5_000..=500_000)
        };
        let roas_hundredths: i64 = rng.random_range(50..=600);
        let spend = Decimal::new(spend_cents, 2);
        let revenue = (spend * Decimal::new(roas_hundredths, 2))
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);

        let impressions = spend_cents * rng.random_range(5..=15) / 10;
        let clicks = impressions * rng.random_range(5..=50) / 1000;
        let conversions = (revenue / Decimal::new(rng.random_range(30..=100), 0))
            .trunc()
            .to_string();

        let created = launch
            .and_time(NaiveTime::MIN)
            .and_utc()
            .to_rfc3339();

        out.push(RawAdRow {
            ad_id: Some(format!("ad_{i}")),
            ad_name: Some(ad_name),
            campaign_id: Some(format!("camp_{}", (i % 5) + 1)),
            campaign_name: Some(format!("Campaign {}", (i % 5) + 1)),
            objective: Some(objective.to_string()),
            creative_id: Some(format!("creative_{i}")),
            creative_type: Some(creative_type.to_string()),
            primary_text: Some("Check out our amazing product! Limited time offer.".to_string()),
            headline: Some("Get 50% Off Today".to_string()),
            image_url: None,
            thumbnail_url: None,
            status: Some(if roas_hundredths < 150 { "PAUSED" } else { "ACTIVE" }.to_string()),
            created_time: Some(created),
            spend: Some(money(spend_cents)),
            revenue: Some(Value::String(revenue.to_string())),
            impressions: Some(Value::from(impressions)),
            clicks: Some(Value::from(clicks)),
            conversions: Some(Value::String(conversions)),
            creator: Some(creator.to_string()),
            angle: Some(angle.label().to_string()),
        });
    }

    out
}
