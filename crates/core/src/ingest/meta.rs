use crate::config::{MetaCredentials, Settings};
use crate::ingest::error::MetaApiError;
use crate::ingest::provider::RecordSource;
use crate::ingest::types::{RawAdRow, ReportingPeriod};
use anyhow::{Context, Result};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://graph.facebook.com";
const DEFAULT_API_VERSION: &str = "v21.0";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PAGE_SIZE: u32 = 100;
const DEFAULT_MAX_ROWS: usize = 500;

// Checked in order; the first action type present wins.
const PURCHASE_ACTION_TYPES: [&str; 3] = [
    "purchase",
    "omni_purchase",
    "offsite_conversion.fb_pixel_purchase",
];

/// Live `RecordSource` backed by the Meta Marketing (Graph) API.
#[derive(Debug, Clone)]
pub struct MetaAdsClient {
    http: reqwest::Client,
    base_url: String,
    api_version: String,
    access_token: String,
    appsecret_proof: String,
    ad_account_id: String,
    page_size: u32,
    max_rows: usize,
}

impl MetaAdsClient {
    pub fn from_settings(settings: &Settings, ad_account_id: Option<&str>) -> Result<Self> {
        let creds = settings.require_meta_credentials(ad_account_id)?;

        let base_url =
            std::env::var("META_API_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let api_version =
            std::env::var("META_API_VERSION").unwrap_or_else(|_| DEFAULT_API_VERSION.to_string());
        let timeout_secs = std::env::var("META_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        let max_rows = std::env::var("META_MAX_ADS")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(DEFAULT_MAX_ROWS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build Meta API http client")?;

        Ok(Self::new(http, creds, base_url, api_version)?.with_max_rows(max_rows))
    }

    pub fn new(
        http: reqwest::Client,
        creds: MetaCredentials,
        base_url: String,
        api_version: String,
    ) -> Result<Self> {
        Ok(Self {
            http,
            appsecret_proof: appsecret_proof(&creds.app_secret, &creds.access_token)?,
            access_token: creds.access_token,
            ad_account_id: normalize_account_id(&creds.ad_account_id),
            base_url,
            api_version,
            page_size: DEFAULT_PAGE_SIZE,
            max_rows: DEFAULT_MAX_ROWS,
        })
    }

    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows.max(1);
        self
    }

    pub fn ad_account_id(&self) -> &str {
        &self.ad_account_id
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.api_version.trim_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn auth_query(&self) -> [(&'static str, &str); 2] {
        [
            ("access_token", self.access_token.as_str()),
            ("appsecret_proof", self.appsecret_proof.as_str()),
        ]
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T> {
        let res = req.send().await.context("Meta API request failed")?;
        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Meta API response")?;

        if !status.is_success() {
            return Err(MetaApiError::from_response(status.as_u16(), &text).into());
        }

        serde_json::from_str::<T>(&text).context("failed to parse Meta API response")
    }
}

#[async_trait::async_trait]
impl RecordSource for MetaAdsClient {
    fn source_name(&self) -> &'static str {
        "meta_graph_api"
    }

    async fn fetch_rows(&self, period: &ReportingPeriod) -> Result<Vec<RawAdRow>> {
        let limit = self.page_size.to_string();
        let fields = ad_fields(period);
        let first = self
            .http
            .get(self.url(&format!("{}/ads", self.ad_account_id)))
            .query(&self.auth_query())
            .query(&[("fields", fields.as_str()), ("limit", limit.as_str())]);

        let mut page: AdsPage = self.get_json(first).await?;
        let mut out = Vec::new();
        let mut pages: usize = 1;

        loop {
            for ad in page.data {
                if out.len() >= self.max_rows {
                    break;
                }
                out.push(ad.into_raw_row());
            }

            let next = page.paging.and_then(|p| p.next);
            match next {
                Some(url) if out.len() < self.max_rows => {
                    pages += 1;
                    tracing::debug!(pages, rows = out.len(), "fetching next Meta ads page");
                    // `next` already carries the query string, token included.
                    page = self.get_json(self.http.get(url)).await?;
                }
                _ => break,
            }
        }

        tracing::info!(
            account = %self.ad_account_id,
            pages,
            rows = out.len(),
            "Meta ads fetched"
        );
        Ok(out)
    }
}

fn normalize_account_id(id: &str) -> String {
    let id = id.trim();
    if id.starts_with("act_") {
        id.to_string()
    } else {
        format!("act_{id}")
    }
}

/// `appsecret_proof` request parameter: HMAC-SHA256 of the token keyed by the app secret.
fn appsecret_proof(app_secret: &str, access_token: &str) -> Result<String> {
    type HmacSha256 = Hmac<Sha256>;

    let mut mac = HmacSha256::new_from_slice(app_secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("invalid META_APP_SECRET: {e}"))?;
    mac.update(access_token.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn ad_fields(period: &ReportingPeriod) -> String {
    format!(
        "id,name,status,created_time,\
         campaign{{id,name,objective}},\
         creative{{id,object_type,body,title,image_url,thumbnail_url}},\
         insights.time_range({{\"since\":\"{}\",\"until\":\"{}\"}}){{spend,impressions,clicks,actions,action_values}}",
        period.since.format("%Y-%m-%d"),
        period.until.format("%Y-%m-%d"),
    )
}

#[derive(Debug, Deserialize)]
struct AdsPage {
    #[serde(default)]
    data: Vec<GraphAd>,
    #[serde(default)]
    paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
struct Paging {
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphAd {
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    created_time: Option<String>,
    #[serde(default)]
    campaign: Option<GraphCampaign>,
    #[serde(default)]
    creative: Option<GraphCreative>,
    #[serde(default)]
    insights: Option<InsightsEdge>,
}

#[derive(Debug, Default, Deserialize)]
struct GraphCampaign {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    objective: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GraphCreative {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    object_type: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    thumbnail_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InsightsEdge {
    #[serde(default)]
    data: Vec<GraphInsight>,
}

#[derive(Debug, Deserialize)]
struct GraphInsight {
    #[serde(default)]
    spend: Option<Value>,
    #[serde(default)]
    impressions: Option<Value>,
    #[serde(default)]
    clicks: Option<Value>,
    #[serde(default)]
    actions: Vec<ActionStat>,
    #[serde(default)]
    action_values: Vec<ActionStat>,
}

#[derive(Debug, Deserialize)]
struct ActionStat {
    action_type: String,
    #[serde(default)]
    value: Option<Value>,
}

fn purchase_stat(stats: &[ActionStat]) -> Option<Value> {
    PURCHASE_ACTION_TYPES.iter().find_map(|wanted| {
        stats
            .iter()
            .find(|s| s.action_type == *wanted)
            .and_then(|s| s.value.clone())
    })
}

impl GraphAd {
    fn into_raw_row(self) -> RawAdRow {
        let campaign = self.campaign.unwrap_or_default();
        let creative = self.creative.unwrap_or_default();
        let insight = self.insights.and_then(|edge| edge.data.into_iter().next());

        let mut row = RawAdRow {
            ad_id: self.id,
            ad_name: self.name,
            campaign_id: campaign.id,
            campaign_name: campaign.name,
            objective: campaign.objective,
            creative_id: creative.id,
            creative_type: creative.object_type,
            primary_text: creative.body,
            headline: creative.title,
            image_url: creative.image_url,
            thumbnail_url: creative.thumbnail_url,
            status: self.status,
            created_time: self.created_time,
            ..RawAdRow::default()
        };

        if let Some(insight) = insight {
            row.revenue = purchase_stat(&insight.action_values);
            row.conversions = purchase_stat(&insight.actions);
            row.spend = insight.spend;
            row.impressions = insight.impressions;
            row.clicks = insight.clicks;
        }

        row
    }
}
