use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use adkpi_core::config::{DataMode, MissingCredentials, Settings};
use adkpi_core::domain::rules::{EvaluatedCreative, WinRuleConfig};
use adkpi_core::ingest::error::MetaApiError;
use adkpi_core::ingest::types::ReportingPeriod;
use adkpi_core::llm::anthropic::AnthropicClient;
use adkpi_core::llm::{AngleLabeler, LabelReport};
use adkpi_core::pipeline::{self, DashboardData, RunOptions};
use adkpi_core::report::{
    self, BreakdownRow, CreativeFilter, Dimension, InsightThresholds, Insights, OverviewMetrics,
    Outcome,
};

const DEFAULT_PERIOD_DAYS: u32 = 30;
const DEFAULT_LABEL_CONCURRENCY: usize = 4;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let labeler: Option<Arc<dyn AngleLabeler>> = match AnthropicClient::from_settings(&settings) {
        Ok(client) => Some(Arc::new(client) as Arc<dyn AngleLabeler>),
        Err(e) => {
            tracing::warn!(error = %e, "angle labeling disabled; starting API without a labeler");
            None
        }
    };

    tracing::info!(
        data_mode = ?settings.data_mode,
        accounts = settings.meta_ad_account_ids.len(),
        labeler = labeler.is_some(),
        "api configured"
    );

    let state = AppState {
        settings: Arc::new(settings),
        labeler,
    };

    let app = router(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/overview", get(get_overview))
        .route("/breakdown/:dimension", get(get_breakdown))
        .route("/creatives", get(get_creatives))
        .route("/insights", get(get_insights))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    settings: Arc<Settings>,
    labeler: Option<Arc<dyn AngleLabeler>>,
}

/// Query parameters shared by every dashboard route.
#[derive(Debug, Default, Deserialize)]
struct DashboardQuery {
    mode: Option<String>,
    account: Option<String>,
    since: Option<String>,
    until: Option<String>,
    days: Option<u32>,
    min_roas: Option<String>,
    min_spend: Option<String>,

    funnel: Option<String>,
    format: Option<String>,
    angle: Option<String>,
    creator: Option<String>,
    spend_min: Option<String>,
    spend_max: Option<String>,
    /// `win`, `loss` or `learning`; `win` gives the winners gallery.
    result: Option<String>,

    #[serde(default)]
    label: bool,
    #[serde(default)]
    relabel: bool,
}

impl DashboardQuery {
    fn run_options(&self, settings: &Settings, today: NaiveDate) -> Result<RunOptions, ApiError> {
        let mode = match self.mode.as_deref() {
            Some(m) => DataMode::from_str(m).map_err(ApiError::bad_request)?,
            None => settings.data_mode,
        };

        let mut win_rules: WinRuleConfig = settings.win_rules;
        if let Some(v) = parse_decimal("min_roas", self.min_roas.as_deref())? {
            win_rules.min_roas = v;
        }
        if let Some(v) = parse_decimal("min_spend", self.min_spend.as_deref())? {
            win_rules.min_spend = v;
        }
        win_rules.validate().map_err(ApiError::bad_request)?;

        Ok(RunOptions {
            mode,
            ad_account_id: self.account.clone().filter(|a| !a.trim().is_empty()),
            fixture_path: None,
            period: self.period(today)?,
            win_rules,
            label_concurrency: DEFAULT_LABEL_CONCURRENCY,
            relabel: self.relabel,
        })
    }

    fn period(&self, today: NaiveDate) -> Result<ReportingPeriod, ApiError> {
        let until = match self.until.as_deref() {
            Some(s) => parse_date("until", s)?,
            None => today,
        };
        match self.since.as_deref() {
            Some(s) => ReportingPeriod::new(parse_date("since", s)?, until)
                .map_err(ApiError::bad_request),
            None => ReportingPeriod::last_days(until, self.days.unwrap_or(DEFAULT_PERIOD_DAYS))
                .map_err(ApiError::bad_request),
        }
    }

    fn filter(&self) -> Result<CreativeFilter, ApiError> {
        Ok(CreativeFilter {
            funnel: self.funnel.clone(),
            format: self.format.clone(),
            angle: self.angle.clone(),
            creator: self.creator.clone(),
            min_spend: parse_decimal("spend_min", self.spend_min.as_deref())?,
            max_spend: parse_decimal("spend_max", self.spend_max.as_deref())?,
            result: match self.result.as_deref().map(str::trim) {
                None | Some("") => None,
                Some(r) if r.eq_ignore_ascii_case("all") => None,
                Some(r) => Some(Outcome::from_str(r).map_err(ApiError::bad_request)?),
            },
        })
    }
}

/// What was loaded, echoed with every payload so the client can show counts and thresholds.
#[derive(Debug, Serialize)]
struct RunMeta {
    source: &'static str,
    mode: DataMode,
    period: ReportingPeriod,
    win_rules: WinRuleConfig,
    defaulted: usize,
    skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    labels: Option<LabelSummary>,
}

#[derive(Debug, Serialize)]
struct LabelSummary {
    requested: usize,
    labeled: usize,
    failed: usize,
    kept_existing: usize,
}

impl From<&LabelReport> for LabelSummary {
    fn from(r: &LabelReport) -> Self {
        Self {
            requested: r.requested,
            labeled: r.labeled,
            failed: r.failed,
            kept_existing: r.kept_existing,
        }
    }
}

#[derive(Debug, Serialize)]
struct ApiResponse<T: Serialize> {
    meta: RunMeta,
    data: T,
}

async fn load(
    state: &AppState,
    query: &DashboardQuery,
) -> Result<(RunMeta, Vec<EvaluatedCreative>), ApiError> {
    let opts = query.run_options(&state.settings, Utc::now().date_naive())?;
    let filter = query.filter()?;

    let labeler = if query.label || query.relabel {
        match &state.labeler {
            Some(l) => Some(l.as_ref()),
            None => {
                return Err(ApiError {
                    status: StatusCode::BAD_REQUEST,
                    error: "angle labeling requested but no labeler is configured".to_string(),
                    remediation: Some(
                        "Set ANTHROPIC_API_KEY and restart the API, or drop the label parameter."
                            .to_string(),
                    ),
                })
            }
        }
    } else {
        None
    };

    let source = pipeline::record_source(&state.settings, &opts).map_err(ApiError::from_anyhow)?;
    let data: DashboardData = pipeline::run(source.as_ref(), &opts, labeler)
        .await
        .map_err(ApiError::from_anyhow)?;

    let meta = RunMeta {
        source: data.source,
        mode: data.mode,
        period: data.period,
        win_rules: data.win_rules,
        defaulted: data.defaulted,
        skipped: data.skipped,
        labels: data.labels.as_ref().map(LabelSummary::from),
    };
    Ok((meta, filter.apply(&data.creatives)))
}

async fn get_overview(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<ApiResponse<OverviewMetrics>>, ApiError> {
    let (meta, creatives) = load(&state, &query).await?;
    Ok(Json(ApiResponse {
        meta,
        data: report::overview(&creatives),
    }))
}

async fn get_breakdown(
    State(state): State<AppState>,
    Path(dimension): Path<String>,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<ApiResponse<Vec<BreakdownRow>>>, ApiError> {
    let dimension = Dimension::from_str(&dimension).map_err(|e| ApiError {
        status: StatusCode::NOT_FOUND,
        error: e.to_string(),
        remediation: None,
    })?;
    let (meta, creatives) = load(&state, &query).await?;
    Ok(Json(ApiResponse {
        meta,
        data: report::breakdown(&creatives, dimension),
    }))
}

async fn get_creatives(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<ApiResponse<Vec<EvaluatedCreative>>>, ApiError> {
    let (meta, mut creatives) = load(&state, &query).await?;
    creatives.sort_by(|a, b| {
        b.record
            .spend
            .cmp(&a.record.spend)
            .then_with(|| a.record.ad_id.cmp(&b.record.ad_id))
    });
    Ok(Json(ApiResponse {
        meta,
        data: creatives,
    }))
}

#[derive(Debug, Default, Deserialize)]
struct InsightQuery {
    rising_max_spend: Option<String>,
    rising_min_roas: Option<String>,
    fatigue_min_spend: Option<String>,
    fatigue_max_roas: Option<String>,
    top_creators: Option<usize>,
}

impl InsightQuery {
    fn thresholds(&self) -> Result<InsightThresholds, ApiError> {
        let mut t = InsightThresholds::default();
        if let Some(v) = parse_decimal("rising_max_spend", self.rising_max_spend.as_deref())? {
            t.rising_max_spend = v;
        }
        if let Some(v) = parse_decimal("rising_min_roas", self.rising_min_roas.as_deref())? {
            t.rising_min_roas = v;
        }
        if let Some(v) = parse_decimal("fatigue_min_spend", self.fatigue_min_spend.as_deref())? {
            t.fatigue_min_spend = v;
        }
        if let Some(v) = parse_decimal("fatigue_max_roas", self.fatigue_max_roas.as_deref())? {
            t.fatigue_max_roas = v;
        }
        if let Some(n) = self.top_creators {
            t.top_creators = n;
        }
        Ok(t)
    }
}

async fn get_insights(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
    Query(insight_query): Query<InsightQuery>,
) -> Result<Json<ApiResponse<Insights>>, ApiError> {
    let thresholds = insight_query.thresholds()?;
    let (meta, creatives) = load(&state, &query).await?;
    Ok(Json(ApiResponse {
        meta,
        data: report::insights(&creatives, &thresholds),
    }))
}

/// JSON error body: `{error, remediation}`.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    error: String,
    remediation: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    remediation: Option<String>,
}

impl ApiError {
    fn bad_request(err: impl std::fmt::Display) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: err.to_string(),
            remediation: None,
        }
    }

    fn from_anyhow(err: anyhow::Error) -> Self {
        if let Some(missing) = err.downcast_ref::<MissingCredentials>() {
            return Self {
                status: StatusCode::BAD_REQUEST,
                error: missing.to_string(),
                remediation: Some(missing.remediation().to_string()),
            };
        }

        if let Some(meta) = err.downcast_ref::<MetaApiError>() {
            tracing::warn!(
                kind = ?meta.kind,
                code = ?meta.code,
                fbtrace_id = ?meta.fbtrace_id,
                "Meta API request failed"
            );
            return Self {
                status: StatusCode::BAD_GATEWAY,
                error: meta.to_string(),
                remediation: Some(meta.remediation().to_string()),
            };
        }

        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = %format!("{err:#}"), "dashboard request failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: format!("{err:#}"),
            remediation: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.error,
            remediation: self.remediation,
        };
        (self.status, Json(body)).into_response()
    }
}

fn parse_decimal(name: &str, value: Option<&str>) -> Result<Option<Decimal>, ApiError> {
    let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    Decimal::from_str(raw)
        .map(Some)
        .map_err(|_| ApiError::bad_request(format!("{name} is not a decimal: {raw}")))
}

fn parse_date(name: &str, value: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::bad_request(format!("{name} must be YYYY-MM-DD: {value}")))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> AppState {
        AppState {
            settings: Arc::new(Settings::from_vars(|_| None).unwrap()),
            labeler: None,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 15).unwrap()
    }

    #[test]
    fn query_defaults_follow_settings() {
        let settings = Settings::from_vars(|k| (k == "WIN_MIN_ROAS").then(|| "3".to_string())).unwrap();
        let opts = DashboardQuery::default().run_options(&settings, today()).unwrap();
        assert_eq!(opts.mode, DataMode::Demo);
        assert_eq!(opts.win_rules.min_roas, Decimal::from(3));
        assert_eq!(opts.win_rules.min_spend, Decimal::from(100));
        assert_eq!(opts.period.until, today());
        assert_eq!(opts.period.since, NaiveDate::from_ymd_opt(2025, 12, 17).unwrap());
    }

    #[test]
    fn query_overrides_rules_and_period() {
        let q = DashboardQuery {
            mode: Some("live".to_string()),
            min_roas: Some("1.5".to_string()),
            min_spend: Some("50".to_string()),
            since: Some("2026-01-01".to_string()),
            until: Some("2026-01-10".to_string()),
            ..Default::default()
        };
        let opts = q.run_options(&state().settings, today()).unwrap();
        assert_eq!(opts.mode, DataMode::Live);
        assert_eq!(opts.win_rules.min_roas, Decimal::new(15, 1));
        assert_eq!(opts.period.since, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
    }

    #[test]
    fn bad_query_values_are_400s() {
        let settings = state().settings;
        for q in [
            DashboardQuery {
                min_roas: Some("lots".to_string()),
                ..Default::default()
            },
            DashboardQuery {
                min_spend: Some("-5".to_string()),
                ..Default::default()
            },
            DashboardQuery {
                since: Some("2026-02-01".to_string()),
                until: Some("2026-01-01".to_string()),
                ..Default::default()
            },
            DashboardQuery {
                mode: Some("staging".to_string()),
                ..Default::default()
            },
        ] {
            let err = q.run_options(&settings, today()).unwrap_err();
            assert_eq!(err.status, StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn huge_day_counts_are_400s() {
        let q = DashboardQuery {
            days: Some(4_000_000_000),
            ..Default::default()
        };
        let err = q.run_options(&state().settings, today()).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.error.contains("too long"));
    }

    #[test]
    fn result_param_narrows_to_an_outcome() {
        let q = DashboardQuery {
            result: Some("Win".to_string()),
            ..Default::default()
        };
        assert_eq!(q.filter().unwrap(), CreativeFilter::winners());

        let q = DashboardQuery {
            result: Some("all".to_string()),
            ..Default::default()
        };
        assert!(q.filter().unwrap().is_open());

        let q = DashboardQuery {
            result: Some("champion".to_string()),
            ..Default::default()
        };
        assert_eq!(q.filter().unwrap_err().status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn winners_gallery_by_concept() {
        let q = DashboardQuery {
            result: Some("win".to_string()),
            ..Default::default()
        };
        let Json(all) = get_overview(State(state()), Query(DashboardQuery::default()))
            .await
            .unwrap();
        let Json(res) = get_breakdown(State(state()), Path("concept".to_string()), Query(q))
            .await
            .unwrap();
        let listed: usize = res.data.iter().map(|r| r.total_ads).sum();
        assert_eq!(listed, all.data.total_winners);
        assert!(res.data.iter().all(|r| r.winners == r.total_ads));
    }

    #[test]
    fn meta_errors_map_to_bad_gateway_with_remediation() {
        let body = r#"{"error":{"message":"Session has expired","type":"OAuthException","code":190}}"#;
        let err = anyhow::Error::new(MetaApiError::from_response(400, body)).context("meta_graph_api fetch failed");
        let api = ApiError::from_anyhow(err);
        assert_eq!(api.status, StatusCode::BAD_GATEWAY);
        assert!(api.remediation.unwrap().contains("META_ACCESS_TOKEN"));
    }

    #[tokio::test]
    async fn live_mode_without_credentials_is_400() {
        let q = DashboardQuery {
            mode: Some("live".to_string()),
            ..Default::default()
        };
        let err = load(&state(), &q).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.error.contains("META_ACCESS_TOKEN"));
        assert!(err.remediation.is_some());
    }

    #[tokio::test]
    async fn label_without_labeler_is_400() {
        let q = DashboardQuery {
            label: true,
            ..Default::default()
        };
        let err = load(&state(), &q).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn demo_overview_and_filtered_breakdown() {
        let Json(res) = get_overview(State(state()), Query(DashboardQuery::default()))
            .await
            .unwrap();
        assert_eq!(res.meta.source, "fixture");
        assert_eq!(res.data.total_ads, 50);

        let q = DashboardQuery {
            funnel: Some("BOF".to_string()),
            ..Default::default()
        };
        let Json(res) = get_breakdown(State(state()), Path("funnel".to_string()), Query(q))
            .await
            .unwrap();
        assert!(res.data.len() <= 1);
        assert!(res.data.iter().all(|r| r.name == "BOF"));
    }

    #[tokio::test]
    async fn unknown_dimension_is_404() {
        let err = get_breakdown(
            State(state()),
            Path("campaign".to_string()),
            Query(DashboardQuery::default()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }
}
