//! Report output.
//!
//! Reports are written as pretty JSON, or as a plain-text summary meant for
//! a terminal. The text form is built section by section.

use crate::models::{
    DailyPoint, GrowthMetric, Metric, PeriodReport, Report, SnapshotReport, WindowReport,
    WorkingGroupReport,
};
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::io::Write;
use std::path::Path;

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).context("Failed to serialize report")
}

/// Generate the plain-text summary of any report.
pub fn generate_text_report(report: &Report) -> String {
    match report {
        Report::Snapshot(snapshot) => generate_snapshot_text(snapshot),
        Report::Window(window) => generate_window_text(window),
        Report::Period(period) => generate_period_text(period),
    }
}

/// Write report content to `path`, or stdout when `path` is `-`.
pub fn write_output(content: &str, path: &Path) -> Result<()> {
    if path == Path::new("-") {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        handle.write_all(content.as_bytes())?;
        handle.write_all(b"\n")?;
        return Ok(());
    }

    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write report to {}", path.display()))?;

    Ok(())
}

fn amount(value: Decimal) -> String {
    format!("{} JOY", value.round_dp(2).normalize())
}

fn percent(value: Option<Decimal>) -> String {
    match value {
        Some(p) => format!("{:+}%", p.round_dp(2).normalize()),
        None => "n/a".to_string(),
    }
}

fn metric<T, F: Fn(&T) -> String>(value: &Metric<T>, render: F) -> String {
    match value {
        Metric::Available { value } => render(value),
        Metric::Unavailable { reason } => format!("unavailable ({})", reason),
    }
}

fn growth_line(label: &str, growth: &GrowthMetric) -> String {
    format!(
        "   {:<22} {:>8} -> {:<8} {:+} ({})\n",
        label,
        growth.start_count,
        growth.end_count,
        growth.growth_count,
        percent(growth.growth_percent)
    )
}

fn series_line(label: &str, points: &[DailyPoint]) -> String {
    let counts: Vec<String> = points.iter().map(|p| p.count.to_string()).collect();
    format!("   {:<22} [{}]\n", label, counts.join(", "))
}

/// Generate the window header section.
fn generate_window_header(report: &WindowReport) -> String {
    let window = &report.window;
    let mut section = String::new();

    section.push_str(&format!(
        "📦 Blocks #{} .. #{}{}\n",
        window.start.number,
        window.end.number,
        if window.end_was_open { " (chain head)" } else { "" }
    ));
    section.push_str(&format!(
        "   {} .. {}\n\n",
        window.start.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
        window.end.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    section
}

/// Generate the treasury section.
fn generate_treasury_section(report: &WindowReport) -> String {
    let mut section = String::new();

    section.push_str("💰 Treasury\n");
    section.push_str(&format!(
        "   Issuance: {} -> {} ({})\n",
        amount(report.issuance.start),
        amount(report.issuance.end),
        amount(report.issuance.change)
    ));
    for account in &report.tracked_accounts {
        section.push_str(&format!(
            "   Account {}: {} -> {} ({})\n",
            account.account,
            amount(account.start),
            amount(account.end),
            amount(account.change)
        ));
    }
    section.push_str(&format!(
        "   Council budget: {} -> {} (refill {})\n",
        amount(report.council_budget.start),
        amount(report.council_budget.end),
        amount(report.council_budget.refill_increment)
    ));

    let spending = &report.dao_spending;
    section.push_str("   DAO spending:\n");
    section.push_str(&format!("     Council rewards: {}\n", amount(spending.council_rewards)));
    section.push_str(&format!("     Funding proposals: {}\n", amount(spending.funding_proposals)));
    section.push_str(&format!(
        "     Working groups: {}\n",
        amount(spending.working_group_spending)
    ));
    section.push_str(&format!(
        "     Creator payouts: {}\n",
        metric(&spending.creator_payouts, |v| amount(*v))
    ));
    section.push_str(&format!(
        "     Validator rewards: {}\n\n",
        metric(&spending.validator_rewards, |v| amount(*v))
    ));

    section
}

/// Generate the line for a single working group.
fn generate_group_block(id: &str, group: &WorkingGroupReport) -> String {
    let budget = &group.budget;
    let mut block = format!(
        "   {}: budget {} -> {}, refills {}, reductions {}, spending {}\n",
        id,
        amount(budget.start_budget),
        budget.end_budget.map_or_else(|| "none".to_string(), amount),
        amount(budget.refills),
        amount(budget.reductions),
        amount(budget.spending)
    );

    match &group.lead {
        Some(lead) => block.push_str(&format!("     Lead: {}\n", amount(lead.total))),
        None => block.push_str("     Lead: none\n"),
    }
    block.push_str(&format!(
        "     Workers ({}): {}\n",
        group.worker_count,
        amount(group.workers.total)
    ));

    block
}

/// Generate the working groups section.
fn generate_groups_section(report: &WindowReport) -> String {
    if report.working_groups.is_empty() {
        return String::new();
    }

    let mut section = String::from("👷 Working groups\n");
    for (id, group) in &report.working_groups {
        section.push_str(&generate_group_block(id, group));
    }
    section.push('\n');

    section
}

/// Generate the activity section.
fn generate_activity_section(report: &WindowReport) -> String {
    let mut section = String::from("📈 Activity\n");

    section.push_str(&growth_line("Videos", &report.content.videos));
    section.push_str(&growth_line("Channels (non-empty)", &report.content.channels));
    section.push_str(&growth_line("Video NFTs", &report.content.video_nfts));
    section.push_str(&growth_line("Memberships", &report.memberships));
    section.push_str(&growth_line("Forum threads", &report.forum.threads));
    section.push_str(&growth_line("Forum posts", &report.forum.posts));
    section.push_str(&growth_line("Openings", &report.hiring.openings));
    section.push_str(&growth_line("Applications", &report.hiring.applications));
    section.push_str(&format!(
        "   {:<22} {}\n",
        "Media storage",
        metric(&report.content.media_storage, |g| g.growth_count.to_string())
    ));

    section.push_str(&format!(
        "   Daily ({} .. {}, whole UTC days):\n",
        report.daily.covers_from.format("%Y-%m-%d %H:%M"),
        report.daily.covers_until.format("%Y-%m-%d %H:%M")
    ));
    section.push_str(&series_line("  videos", &report.daily.videos));
    section.push_str(&series_line("  channels", &report.daily.channels));
    section.push_str(&series_line("  memberships", &report.daily.memberships));
    section.push('\n');

    section
}

/// Generate the proposals section.
fn generate_proposals_section(report: &WindowReport) -> String {
    let summary = &report.proposals.summary;
    let mut section = String::from("🗳️  Proposals\n");

    section.push_str(&format!(
        "   Total: {} | ✅ Passed: {} | ❌ Rejected: {} | ⌛ Expired: {} | 🔍 Under review: {} | ↩️  Withdrawn: {}\n",
        summary.total,
        summary.passed,
        summary.rejected,
        summary.expired,
        summary.under_review,
        summary.withdrawn
    ));
    for proposal in &report.proposals.items {
        section.push_str(&format!(
            "   #{} {} [{}]\n",
            proposal.id, proposal.title, proposal.status
        ));
    }

    section
}

fn generate_window_text(report: &WindowReport) -> String {
    let mut output = String::from("📊 Window report\n\n");

    output.push_str(&generate_window_header(report));
    output.push_str(&generate_treasury_section(report));
    output.push_str(&generate_groups_section(report));
    output.push_str(&generate_activity_section(report));
    output.push_str(&generate_proposals_section(report));

    output
}

fn generate_period_text(report: &PeriodReport) -> String {
    let period = &report.period;
    let mut output = format!(
        "🏛️  Council period {} (elected at #{}, {})\n\n",
        period.id,
        period.elected_at_block,
        period
            .ended_at_block
            .map_or_else(|| "in office".to_string(), |b| format!("ended at #{}", b))
    );
    output.push_str(&generate_window_text(&report.report));
    output
}

fn generate_snapshot_text(report: &SnapshotReport) -> String {
    let mut output = format!(
        "📸 Snapshot at #{} ({})\n\n",
        report.block.number,
        report.block.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    );

    let supply = &report.supply;
    output.push_str("💰 Supply\n");
    output.push_str(&format!("   Total issuance: {}\n", amount(supply.total_issuance)));
    output.push_str(&format!(
        "   Minted since genesis: {} ({} of {})\n",
        amount(supply.minted_since_genesis),
        percent(supply.inflation_percent),
        amount(supply.initial_supply)
    ));
    output.push_str(&format!(
        "   Council: {} members, budget {}, reward {}/block\n",
        report.council_size,
        amount(report.council_budget),
        amount(report.councilor_reward_per_block)
    ));
    for (id, budget) in &report.working_group_budgets {
        output.push_str(&format!("   {}: {}\n", id, amount(*budget)));
    }
    for account in &report.tracked_accounts {
        output.push_str(&format!("   Account {}: {}\n", account.account, amount(account.balance)));
    }

    let totals = &report.totals;
    output.push_str("\n📈 Totals\n");
    output.push_str(&format!(
        "   Videos: {} | Channels: {} | NFTs: {} | Members: {} | Threads: {} | Posts: {}\n",
        totals.videos,
        totals.channels,
        totals.video_nfts,
        totals.memberships,
        totals.forum_threads,
        totals.forum_posts
    ));
    output.push_str(&format!(
        "   Storage used: {}\n",
        metric(&report.total_storage_used, |bytes| format!("{} bytes", bytes))
    ));

    output
}
