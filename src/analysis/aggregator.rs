//! Working-group budget and compensation aggregation.
//!
//! Every group is computed as its own task, and every worker inside a group
//! as its own task. Amounts stay raw until a group's record is assembled;
//! results are merged into the map only after all group tasks finish.

use crate::chain::ChainAdapter;
use crate::error::{ReportError, Result, SectionExt};
use crate::indexer::{FilterSpec, IndexerAdapter, QueryName, WorkerRecord, WorkingGroupRecord};
use crate::models::{GroupId, SalaryRecord, Window, WorkingGroupBudget, WorkingGroupReport};
use crate::units::{checked_sum, to_display_units, RawAmount};
use futures::future::try_join_all;
use std::collections::BTreeMap;
use tracing::debug;

/// Output of [`aggregate_working_groups`].
#[derive(Debug, Clone)]
pub struct GroupAggregation {
    pub groups: BTreeMap<GroupId, WorkingGroupReport>,
    /// Discretionary spending summed over every group, in raw units.
    pub total_spending: RawAmount,
}

/// Compensation components of one member (or a group's workers), in raw units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct RawSalary {
    base: RawAmount,
    proposal_payouts: RawAmount,
    discretionary_spending: RawAmount,
}

impl RawSalary {
    fn checked_add(self, other: RawSalary) -> Option<RawSalary> {
        Some(RawSalary {
            base: self.base.checked_add(other.base)?,
            proposal_payouts: self.proposal_payouts.checked_add(other.proposal_payouts)?,
            discretionary_spending: self
                .discretionary_spending
                .checked_add(other.discretionary_spending)?,
        })
    }

    fn to_record(self, decimals: u32) -> Option<SalaryRecord> {
        let total = checked_sum([self.base, self.proposal_payouts, self.discretionary_spending])?;
        Some(SalaryRecord {
            base: to_display_units(self.base, decimals),
            proposal_payouts: to_display_units(self.proposal_payouts, decimals),
            discretionary_spending: to_display_units(self.discretionary_spending, decimals),
            total: to_display_units(total, decimals),
        })
    }
}

fn overflow(what: &str) -> ReportError {
    ReportError::malformed("indexer", format!("{} overflows", what))
}

/// Salary of one member over the window.
async fn member_salary(
    indexer: &IndexerAdapter,
    in_window: &FilterSpec,
    member: &WorkerRecord,
    block_span: u64,
) -> Result<RawSalary> {
    let base = member
        .reward_per_block
        .checked_mul(RawAmount::from(block_span))
        .ok_or_else(|| overflow(&format!("base salary of worker {}", member.id)))?;

    if member.bound_accounts.is_empty() {
        return Ok(RawSalary {
            base,
            ..RawSalary::default()
        });
    }

    let to_member = in_window.clone().for_accounts(member.bound_accounts.clone());
    let (proposal_payouts, discretionary_spending) = futures::try_join!(
        indexer.sum_amounts(QueryName::FundingRequestsPaid, &to_member),
        indexer.sum_amounts(QueryName::BudgetSpending, &to_member)
    )?;

    Ok(RawSalary {
        base,
        proposal_payouts,
        discretionary_spending,
    })
}

struct GroupTotals {
    report: WorkingGroupReport,
    spending: RawAmount,
}

async fn group_report(
    chain: &ChainAdapter,
    indexer: &IndexerAdapter,
    window: &Window,
    group: &WorkingGroupRecord,
    decimals: u32,
) -> Result<GroupTotals> {
    let id = group.id.as_str();
    let in_window = FilterSpec::new()
        .created_from(window.start.timestamp)
        .created_until(window.end.timestamp);
    let in_group = in_window.clone().in_group(id);
    let span = window.block_span();
    let budget_section = format!("working-group budget for group {}", id);
    let salary_section = format!("working-group salaries for group {}", id);

    let budgets = async {
        let (at_start, at_end) = (chain.at(&window.start), chain.at(&window.end));
        let (start, end) = futures::try_join!(at_start.group_budget(id), at_end.group_budget(id))?;
        let (changes, spending) = futures::try_join!(
            indexer.budget_changes(&in_group),
            indexer.sum_amounts(QueryName::BudgetSpending, &in_group)
        )?;
        Ok::<_, ReportError>((start, end, changes, spending))
    };

    let lead = async {
        match &group.leader {
            Some(leader) => member_salary(indexer, &in_window, leader, span).await.map(Some),
            None => Ok(None),
        }
    };

    let workers: Vec<&WorkerRecord> = group.workers.iter().filter(|w| !w.is_lead).collect();
    let worker_salaries = try_join_all(
        workers
            .iter()
            .map(|worker| member_salary(indexer, &in_window, worker, span)),
    );

    let ((start, end, changes, spending), (lead, worker_salaries)) = futures::try_join!(
        async { budgets.await.section(budget_section.clone()) },
        async { futures::try_join!(lead, worker_salaries).section(salary_section.clone()) }
    )?;

    let workers_total = worker_salaries
        .into_iter()
        .try_fold(RawSalary::default(), RawSalary::checked_add)
        .ok_or_else(|| overflow(&salary_section))?;

    let lead = match lead {
        Some(salary) => Some(salary.to_record(decimals).ok_or_else(|| overflow(&salary_section))?),
        None => None,
    };
    let workers_record = workers_total
        .to_record(decimals)
        .ok_or_else(|| overflow(&salary_section))?;

    debug!(
        "group {}: {} workers, lead {}",
        id,
        workers.len(),
        if lead.is_some() { "present" } else { "absent" }
    );

    Ok(GroupTotals {
        report: WorkingGroupReport {
            budget: WorkingGroupBudget {
                group_id: group.id.clone(),
                start_budget: to_display_units(start.unwrap_or(0), decimals),
                end_budget: end.map(|amount| to_display_units(amount, decimals)),
                spending: to_display_units(spending, decimals),
                refills: to_display_units(changes.added, decimals),
                reductions: to_display_units(changes.removed, decimals),
            },
            lead,
            workers: workers_record,
            worker_count: workers.len(),
        },
        spending,
    })
}

/// Budget and compensation for every group in `groups` over `window`.
///
/// Every listed group gets an entry, zero-filled when it saw no activity.
pub async fn aggregate_working_groups(
    chain: &ChainAdapter,
    indexer: &IndexerAdapter,
    window: &Window,
    groups: &[WorkingGroupRecord],
    decimals: u32,
) -> Result<GroupAggregation> {
    let totals = try_join_all(
        groups
            .iter()
            .map(|group| group_report(chain, indexer, window, group, decimals)),
    )
    .await?;

    let total_spending = checked_sum(totals.iter().map(|t| t.spending))
        .ok_or_else(|| overflow("working-group spending"))?;

    let groups = totals
        .into_iter()
        .map(|t| (t.report.budget.group_id.clone(), t.report))
        .collect();

    Ok(GroupAggregation {
        groups,
        total_spending,
    })
}
