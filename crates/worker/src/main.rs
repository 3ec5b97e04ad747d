use anyhow::Context;
use clap::Parser;
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use adkpi_core::config::{DataMode, MissingCredentials, Settings};
use adkpi_core::ingest::error::MetaApiError;
use adkpi_core::ingest::types::ReportingPeriod;
use adkpi_core::llm::anthropic::AnthropicClient;
use adkpi_core::llm::AngleLabeler;
use adkpi_core::pipeline::{self, DashboardData, RunOptions};
use adkpi_core::report::{
    self, BreakdownRow, CreativeFilter, Dimension, InsightThresholds, Insights, OverviewMetrics,
    Outcome,
};

mod render;

#[derive(Debug, Parser)]
#[command(name = "adkpi_worker", about = "Ad creative win-rate report")]
struct Args {
    /// Pull from the Meta Marketing API instead of demo data.
    #[arg(long)]
    live: bool,

    /// Ad account to report on (live mode). Defaults to the first configured account.
    #[arg(long)]
    account: Option<String>,

    /// JSON array of raw ad rows to use as demo data.
    #[arg(long, conflicts_with = "live")]
    fixture: Option<PathBuf>,

    /// First day of the reporting period (YYYY-MM-DD).
    #[arg(long)]
    since: Option<String>,

    /// Last day of the reporting period (YYYY-MM-DD). Defaults to today (UTC).
    #[arg(long)]
    until: Option<String>,

    /// Period length when --since is not given.
    #[arg(long, default_value_t = 30)]
    days: u32,

    /// Minimum ROAS for a qualified ad to count as a winner (overrides WIN_MIN_ROAS).
    #[arg(long)]
    min_roas: Option<Decimal>,

    /// Minimum spend for an ad to be judged at all (overrides WIN_MIN_SPEND).
    #[arg(long)]
    min_spend: Option<Decimal>,

    /// Classify creatives by marketing angle with the LLM labeler.
    #[arg(long)]
    label_angles: bool,

    /// Re-label creatives that already carry an angle.
    #[arg(long, requires = "label_angles")]
    relabel: bool,

    /// Maximum concurrent labeling calls.
    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    /// Breakdowns to print, comma separated.
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "funnel,format,angle,creator,concept,month"
    )]
    group_by: Vec<Dimension>,

    #[arg(long)]
    funnel: Option<String>,
    #[arg(long)]
    format: Option<String>,
    #[arg(long)]
    angle: Option<String>,
    #[arg(long)]
    creator: Option<String>,

    /// Only creatives that spent at least this much.
    #[arg(long)]
    spend_min: Option<Decimal>,

    /// Only creatives that spent at most this much.
    #[arg(long)]
    spend_max: Option<Decimal>,

    /// Winners gallery: keep only creatives that passed both thresholds.
    #[arg(long)]
    winners: bool,

    /// Also list every creative.
    #[arg(long)]
    list: bool,

    /// Print one JSON document instead of tables.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    match run(&settings, &args).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) => {
            report_failure(&err);
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run(settings: &Settings, args: &Args) -> anyhow::Result<()> {
    let opts = run_options(settings, args, chrono::Utc::now().date_naive())?;

    let labeler: Option<AnthropicClient> = if args.label_angles {
        Some(AnthropicClient::from_settings(settings)?)
    } else {
        None
    };

    let source = pipeline::record_source(settings, &opts)?;
    let data = pipeline::run(
        source.as_ref(),
        &opts,
        labeler.as_ref().map(|l| l as &dyn AngleLabeler),
    )
    .await?;

    let filter = creative_filter(args);
    let creatives = filter.apply(&data.creatives);

    let out = WorkerReport::build(&data, &creatives, &args.group_by);

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&out).context("failed to encode report as JSON")?
        );
        return Ok(());
    }

    println!("{}", render::summary_line(&data));
    if !filter.is_open() {
        println!("filtered to {} of {} creatives", creatives.len(), data.creatives.len());
    }
    println!("{}", render::overview_table(&out.overview));
    for (dimension, rows) in &out.breakdowns {
        println!("\nBy {}", dimension.title());
        println!("{}", render::breakdown_table(*dimension, rows));
    }

    println!("\nTop creators (spend on winning ads)");
    println!("{}", render::creators_table(&out.insights.top_creators));
    println!(
        "\nRising stars: spend < {}, ROAS > {}",
        render::money(out.insights.thresholds.rising_max_spend),
        out.insights.thresholds.rising_min_roas
    );
    println!("{}", render::creatives_table(&out.insights.rising_stars));
    println!(
        "\nFatigue alerts: spend >= {}, ROAS < {}",
        render::money(out.insights.thresholds.fatigue_min_spend),
        out.insights.thresholds.fatigue_max_roas
    );
    println!("{}", render::creatives_table(&out.insights.fatigue_alerts));

    if args.list {
        println!("\nAll creatives");
        println!("{}", render::creatives_table(&creatives));
    }
    Ok(())
}

fn run_options(settings: &Settings, args: &Args, today: chrono::NaiveDate) -> anyhow::Result<RunOptions> {
    let mode = if args.live {
        DataMode::Live
    } else if args.fixture.is_some() {
        DataMode::Demo
    } else {
        settings.data_mode
    };

    let mut win_rules = settings.win_rules;
    if let Some(v) = args.min_roas {
        win_rules.min_roas = v;
    }
    if let Some(v) = args.min_spend {
        win_rules.min_spend = v;
    }

    let until = match args.until.as_deref() {
        Some(s) => parse_date(s)?,
        None => today,
    };
    let period = match args.since.as_deref() {
        Some(s) => ReportingPeriod::new(parse_date(s)?, until)?,
        None => ReportingPeriod::last_days(until, args.days)?,
    };

    Ok(RunOptions {
        mode,
        ad_account_id: args.account.clone(),
        fixture_path: args.fixture.clone(),
        period,
        win_rules,
        label_concurrency: args.concurrency,
        relabel: args.relabel,
    })
}

fn creative_filter(args: &Args) -> CreativeFilter {
    CreativeFilter {
        funnel: args.funnel.clone(),
        format: args.format.clone(),
        angle: args.angle.clone(),
        creator: args.creator.clone(),
        min_spend: args.spend_min,
        max_spend: args.spend_max,
        result: args.winners.then_some(Outcome::Win),
    }
}

fn parse_date(s: &str) -> anyhow::Result<chrono::NaiveDate> {
    chrono::NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .with_context(|| format!("invalid date {s:?} (expected YYYY-MM-DD)"))
}

/// Everything printed by one run, in the shape `--json` emits.
#[derive(Debug, Serialize)]
struct WorkerReport<'a> {
    source: &'static str,
    mode: DataMode,
    period: ReportingPeriod,
    min_roas: Decimal,
    min_spend: Decimal,
    defaulted: usize,
    skipped: usize,
    overview: OverviewMetrics,
    breakdowns: Vec<(Dimension, Vec<BreakdownRow>)>,
    insights: Insights,
    #[serde(skip_serializing_if = "Option::is_none")]
    labels: Option<&'a adkpi_core::llm::LabelReport>,
}

impl<'a> WorkerReport<'a> {
    fn build(
        data: &'a DashboardData,
        creatives: &[adkpi_core::domain::rules::EvaluatedCreative],
        group_by: &[Dimension],
    ) -> Self {
        let mut dimensions: Vec<Dimension> = Vec::with_capacity(group_by.len());
        for d in group_by {
            if !dimensions.contains(d) {
                dimensions.push(*d);
            }
        }

        Self {
            source: data.source,
            mode: data.mode,
            period: data.period,
            min_roas: data.win_rules.min_roas,
            min_spend: data.win_rules.min_spend,
            defaulted: data.defaulted,
            skipped: data.skipped,
            overview: report::overview(creatives),
            breakdowns: dimensions
                .into_iter()
                .map(|d| (d, report::breakdown(creatives, d)))
                .collect(),
            insights: report::insights(creatives, &InsightThresholds::default()),
            labels: data.labels.as_ref(),
        }
    }
}

/// Prints the failure with what the user can do about it. Nothing is retried.
fn report_failure(err: &anyhow::Error) {
    let remediation = if let Some(missing) = err.downcast_ref::<MissingCredentials>() {
        Some(missing.remediation())
    } else if let Some(meta) = err.downcast_ref::<MetaApiError>() {
        Some(meta.remediation())
    } else {
        None
    };

    sentry_anyhow::capture_anyhow(err);
    tracing::error!(error = %format!("{err:#}"), "report run failed");

    eprintln!("error: {err:#}");
    if let Some(hint) = remediation {
        eprintln!("hint: {hint}");
    }
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
    use clap::CommandFactory;
    use rust_decimal_macros::dec;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("adkpi_worker").chain(argv.iter().copied())).unwrap()
    }

    fn today() -> chrono::NaiveDate {
        chrono::NaiveDate::from_ymd_opt(2026, 1, 15).unwrap()
    }

    #[test]
    fn cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn defaults_to_demo_with_every_breakdown() {
        let args = parse(&[]);
        let settings = Settings::from_vars(|_| None).unwrap();
        let opts = run_options(&settings, &args, today()).unwrap();
        assert_eq!(opts.mode, DataMode::Demo);
        assert_eq!(opts.win_rules.min_roas, dec!(2));
        assert_eq!(args.group_by, Dimension::ALL.to_vec());
        assert_eq!(opts.period.until, today());
    }

    #[test]
    fn flags_override_rules_and_period() {
        let args = parse(&[
            "--live",
            "--min-roas",
            "3.25",
            "--min-spend",
            "250",
            "--since",
            "2026-01-01",
            "--until",
            "2026-01-07",
            "--group-by",
            "angle,creator",
        ]);
        let settings = Settings::from_vars(|_| None).unwrap();
        let opts = run_options(&settings, &args, today()).unwrap();
        assert_eq!(opts.mode, DataMode::Live);
        assert_eq!(opts.win_rules.min_roas, dec!(3.25));
        assert_eq!(opts.win_rules.min_spend, dec!(250));
        assert_eq!(opts.period.since, chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        assert_eq!(args.group_by, vec![Dimension::Angle, Dimension::Creator]);
    }

    #[test]
    fn rejects_bad_flags() {
        let argv = |a: &[&str]| {
            Args::try_parse_from(std::iter::once("adkpi_worker").chain(a.iter().copied()))
        };
        assert!(argv(&["--group-by", "campaign"]).is_err());
        assert!(argv(&["--min-roas", "lots"]).is_err());
        assert!(argv(&["--relabel"]).is_err());
        assert!(argv(&["--live", "--fixture", "rows.json"]).is_err());
        assert!(argv(&["--spend-max", "a lot"]).is_err());
    }

    #[test]
    fn huge_day_counts_fail_cleanly() {
        let settings = Settings::from_vars(|_| None).unwrap();
        let args = parse(&["--days", "4000000000"]);
        let err = run_options(&settings, &args, today()).unwrap_err();
        assert!(err.to_string().contains("too long"));
    }

    #[test]
    fn spend_range_and_winners_flags_build_the_filter() {
        assert!(creative_filter(&parse(&[])).is_open());

        let args = parse(&["--spend-min", "100", "--spend-max", "2500.50", "--winners"]);
        let filter = creative_filter(&args);
        assert_eq!(filter.min_spend, Some(dec!(100)));
        assert_eq!(filter.max_spend, Some(dec!(2500.50)));
        assert_eq!(filter.result, Some(Outcome::Win));
    }

    #[tokio::test]
    async fn winners_flag_limits_report_to_winning_ads() {
        let settings = Settings::from_vars(|_| None).unwrap();
        let args = parse(&["--winners", "--group-by", "concept"]);
        let opts = run_options(&settings, &args, today()).unwrap();
        let source = pipeline::record_source(&settings, &opts).unwrap();
        let data = pipeline::run(source.as_ref(), &opts, None).await.unwrap();

        let creatives = creative_filter(&args).apply(&data.creatives);
        assert!(creatives.iter().all(|c| c.is_winner));
        let out = WorkerReport::build(&data, &creatives, &args.group_by);
        assert_eq!(out.overview.total_ads, out.overview.total_winners);
        assert_eq!(out.breakdowns[0].0, Dimension::Concept);
    }

    #[tokio::test]
    async fn json_report_dedupes_dimensions() {
        let settings = Settings::from_vars(|_| None).unwrap();
        let args = parse(&["--group-by", "funnel,funnel,month"]);
        let opts = run_options(&settings, &args, today()).unwrap();
        let source = pipeline::record_source(&settings, &opts).unwrap();
        let data = pipeline::run(source.as_ref(), &opts, None).await.unwrap();

        let out = WorkerReport::build(&data, &data.creatives, &args.group_by);
        assert_eq!(out.breakdowns.len(), 2);
        assert_eq!(out.overview.total_ads, 50);

        let v = serde_json::to_value(&out).unwrap();
        assert_eq!(v["breakdowns"][0][0], "funnel");
        assert!(v.get("labels").is_none());
    }
}
