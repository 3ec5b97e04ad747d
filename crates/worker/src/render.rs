use adkpi_core::domain::rules::EvaluatedCreative;
use adkpi_core::pipeline::DashboardData;
use adkpi_core::report::insights::CreatorStanding;
use adkpi_core::report::{BreakdownRow, Dimension, Outcome, OverviewMetrics, WinRateTier};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, CellAlignment, Color, ContentArrangement, Table};
use rust_decimal::{Decimal, RoundingStrategy};

const NOT_AVAILABLE: &str = "n/a";

fn table(header: Vec<&str>) -> Table {
    let mut t = Table::new();
    t.load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    t
}

fn num(s: impl Into<String>) -> Cell {
    Cell::new(s.into()).set_alignment(CellAlignment::Right)
}

pub fn summary_line(data: &DashboardData) -> String {
    let mut line = format!(
        "source={} period={}..{} min_roas={} min_spend={} rows={} defaulted={} skipped={}",
        data.source,
        data.period.since,
        data.period.until,
        data.win_rules.min_roas,
        money(data.win_rules.min_spend),
        data.creatives.len(),
        data.defaulted,
        data.skipped,
    );
    if let Some(labels) = &data.labels {
        line.push_str(&format!(
            " labeled={}/{} label_failures={}",
            labels.labeled, labels.requested, labels.failed
        ));
    }
    line
}

pub fn overview_table(o: &OverviewMetrics) -> Table {
    let mut t = table(vec!["Metric", "Value"]);
    t.add_row(vec![Cell::new("Total ads"), num(o.total_ads.to_string())]);
    t.add_row(vec![Cell::new("Qualified ads"), num(o.qualified_ads.to_string())]);
    t.add_row(vec![Cell::new("Winners"), num(o.total_winners.to_string())]);
    t.add_row(vec![
        Cell::new("Win rate"),
        num(format!("{}% ({})", o.win_rate, o.tier)).fg(tier_color(o.tier)),
    ]);
    t.add_row(vec![Cell::new("Blended ROAS"), num(roas(o.blended_roas))]);
    t.add_row(vec![Cell::new("Spend"), num(money(o.total_spend))]);
    t.add_row(vec![Cell::new("Revenue"), num(money(o.total_revenue))]);
    t
}

pub fn breakdown_table(dimension: Dimension, rows: &[BreakdownRow]) -> Table {
    let mut t = table(vec![
        dimension.title(),
        "Ads",
        "Qualified",
        "Winners",
        "Win rate",
        "Spend",
        "Revenue",
        "ROAS",
    ]);
    for r in rows {
        t.add_row(vec![
            Cell::new(&r.name),
            num(r.total_ads.to_string()),
            num(r.qualified.to_string()),
            num(r.winners.to_string()),
            num(format!("{}%", r.win_rate)).fg(tier_color(r.tier)),
            num(money(r.spend)),
            num(money(r.revenue)),
            num(roas(r.roas)),
        ]);
    }
    t
}

pub fn creatives_table(items: &[EvaluatedCreative]) -> Table {
    let mut t = table(vec![
        "Ad", "Funnel", "Format", "Angle", "Creator", "Spend", "ROAS", "Result",
    ]);
    for item in items {
        let r = &item.record;
        let outcome = Outcome::of(item);
        let color = match outcome {
            Outcome::Win => Color::Green,
            Outcome::Loss => Color::Red,
            Outcome::Learning => Color::DarkGrey,
        };
        t.add_row(vec![
            Cell::new(&r.ad_name),
            Cell::new(r.funnel_stage.label()),
            Cell::new(r.format.label()),
            Cell::new(r.angle_label()),
            Cell::new(r.creator_label()),
            num(money(r.spend)),
            num(roas(item.roas)),
            Cell::new(outcome.label()).fg(color),
        ]);
    }
    t
}

pub fn creators_table(standings: &[CreatorStanding]) -> Table {
    let mut t = table(vec!["Creator", "Winning ads", "Spend", "Revenue", "ROAS"]);
    for s in standings {
        t.add_row(vec![
            Cell::new(&s.creator),
            num(s.winning_ads.to_string()),
            num(money(s.spend)),
            num(money(s.revenue)),
            num(roas(s.roas)),
        ]);
    }
    t
}

fn tier_color(tier: WinRateTier) -> Color {
    match tier {
        WinRateTier::Strong => Color::Green,
        WinRateTier::Average => Color::Yellow,
        WinRateTier::Weak => Color::Red,
    }
}

pub fn roas(v: Option<Decimal>) -> String {
    match v {
        Some(r) => format!(
            "{}x",
            r.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        ),
        None => NOT_AVAILABLE.to_string(),
    }
}

/// `$950.00`, `$12.35K`, `$1.20M`.
pub fn money(v: Decimal) -> String {
    let thousand = Decimal::from(1_000);
    let million = Decimal::from(1_000_000);
    let (scaled, suffix) = if v.abs() >= million {
        (v / million, "M")
    } else if v.abs() >= thousand {
        (v / thousand, "K")
    } else {
        (v, "")
    };
    let mut scaled = scaled.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    scaled.rescale(2);
    format!("${scaled}{suffix}")
}
