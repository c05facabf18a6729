//! Data models for the report engine.
//!
//! Every value here is built fresh for a single report run and never mutated
//! afterwards. Report shapes are plain serializable trees.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Opaque block hash as reported by the chain (hex string).
pub type BlockHash = String;

/// Stable working-group identifier (e.g. `"storageWorkingGroup"`).
pub type GroupId = String;

/// A resolved block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub number: u64,
    pub hash: BlockHash,
    pub timestamp: DateTime<Utc>,
}

/// Caller-side reference to a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockRef {
    Number(u64),
    Hash(BlockHash),
    Head,
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockRef::Number(n) => write!(f, "block #{}", n),
            BlockRef::Hash(h) => write!(f, "block {}", h),
            BlockRef::Head => write!(f, "chain head"),
        }
    }
}

/// Requested end of a window before resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEnd {
    /// Resolve to the chain head, once, at evaluation time.
    Open,
    At(u64),
}

impl From<Option<u64>> for WindowEnd {
    fn from(end: Option<u64>) -> Self {
        end.map_or(WindowEnd::Open, WindowEnd::At)
    }
}

/// A window whose end has been frozen for the rest of the report run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: Block,
    pub end: Block,
    /// True when the caller left the end open and it was pinned to the head.
    pub end_was_open: bool,
}

impl Window {
    /// Number of blocks produced inside the window.
    pub fn block_span(&self) -> u64 {
        self.end.number.saturating_sub(self.start.number)
    }
}

/// Start/end/delta of a count over a window, counted at the exact
/// timestamps of the window's start and end blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrowthMetric {
    pub start_count: u64,
    pub end_count: u64,
    pub growth_count: i64,
    /// `None` when the baseline is zero.
    pub growth_percent: Option<Decimal>,
}

/// One calendar day (UTC) of a delta series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyPoint {
    pub date: NaiveDate,
    pub count: i64,
}

/// A metric that is either computed or explicitly not available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Metric<T> {
    Available { value: T },
    Unavailable { reason: String },
}

impl<T> Metric<T> {
    pub fn unimplemented(reason: impl Into<String>) -> Self {
        Metric::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Metric::Available { .. })
    }
}

/// Treasury movement of one working group over a window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingGroupBudget {
    pub group_id: GroupId,
    pub start_budget: Decimal,
    /// `None` when the chain holds no budget entry for the group at the end block.
    pub end_budget: Option<Decimal>,
    pub spending: Decimal,
    /// Positive budget updates in the window.
    pub refills: Decimal,
    /// Magnitude of the negative budget updates in the window.
    pub reductions: Decimal,
}

/// Compensation reconciliation for one member, or the sum over a group's workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalaryRecord {
    pub base: Decimal,
    pub proposal_payouts: Decimal,
    pub discretionary_spending: Decimal,
    pub total: Decimal,
}

/// Everything the aggregator knows about one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingGroupReport {
    pub budget: WorkingGroupBudget,
    /// Absent when the group had no lead; distinct from zero compensation.
    pub lead: Option<SalaryRecord>,
    pub workers: SalaryRecord,
    pub worker_count: usize,
}

/// Proposal lifecycle states as exposed by the indexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProposalStatus {
    Deciding,
    Gracing,
    Dormant,
    Executed,
    ExecutionFailed,
    Vetoed,
    Slashed,
    Rejected,
    Expired,
    Cancelled,
    CanceledByRuntime,
}

/// Fixed classification buckets for the proposal summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalOutcome {
    Passed,
    Rejected,
    Expired,
    UnderReview,
    Withdrawn,
}

impl ProposalStatus {
    pub fn outcome(&self) -> ProposalOutcome {
        match self {
            ProposalStatus::Executed => ProposalOutcome::Passed,
            ProposalStatus::Rejected | ProposalStatus::Vetoed | ProposalStatus::Slashed => {
                ProposalOutcome::Rejected
            }
            ProposalStatus::Expired => ProposalOutcome::Expired,
            ProposalStatus::Deciding | ProposalStatus::Gracing | ProposalStatus::Dormant => {
                ProposalOutcome::UnderReview
            }
            ProposalStatus::ExecutionFailed
            | ProposalStatus::Cancelled
            | ProposalStatus::CanceledByRuntime => ProposalOutcome::Withdrawn,
        }
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProposalStatus::Deciding => "deciding",
            ProposalStatus::Gracing => "gracing",
            ProposalStatus::Dormant => "dormant",
            ProposalStatus::Executed => "executed",
            ProposalStatus::ExecutionFailed => "executionFailed",
            ProposalStatus::Vetoed => "vetoed",
            ProposalStatus::Slashed => "slashed",
            ProposalStatus::Rejected => "rejected",
            ProposalStatus::Expired => "expired",
            ProposalStatus::Cancelled => "cancelled",
            ProposalStatus::CanceledByRuntime => "canceledByRuntime",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: String,
    pub title: String,
    pub status: ProposalStatus,
    pub created_at: DateTime<Utc>,
    pub council_approvals: u32,
}

/// Proposal counts per outcome bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalSummary {
    pub total: usize,
    pub passed: usize,
    pub rejected: usize,
    pub expired: usize,
    pub under_review: usize,
    pub withdrawn: usize,
}

impl ProposalSummary {
    pub fn from_proposals(proposals: &[Proposal]) -> Self {
        let mut summary = Self {
            total: proposals.len(),
            ..Self::default()
        };

        for proposal in proposals {
            match proposal.status.outcome() {
                ProposalOutcome::Passed => summary.passed += 1,
                ProposalOutcome::Rejected => summary.rejected += 1,
                ProposalOutcome::Expired => summary.expired += 1,
                ProposalOutcome::UnderReview => summary.under_review += 1,
                ProposalOutcome::Withdrawn => summary.withdrawn += 1,
            }
        }

        summary
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalSection {
    pub summary: ProposalSummary,
    pub items: Vec<Proposal>,
}

/// One elected council term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouncilPeriod {
    pub id: String,
    pub elected_at_block: u64,
    /// `None` while the council is still in office.
    pub ended_at_block: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuanceSection {
    pub start: Decimal,
    pub end: Decimal,
    pub change: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalanceChange {
    pub account: String,
    pub start: Decimal,
    pub end: Decimal,
    pub change: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaoSpending {
    pub council_rewards: Decimal,
    pub funding_proposals: Decimal,
    pub working_group_spending: Decimal,
    pub creator_payouts: Metric<Decimal>,
    pub validator_rewards: Metric<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouncilBudget {
    pub start: Decimal,
    pub end: Decimal,
    /// Amount the council budget is refilled by each refill period.
    pub refill_increment: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForumActivity {
    pub threads: GrowthMetric,
    pub posts: GrowthMetric,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HiringActivity {
    pub openings: GrowthMetric,
    pub applications: GrowthMetric,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentActivity {
    pub videos: GrowthMetric,
    /// Channels that have published at least one video.
    pub channels: GrowthMetric,
    pub video_nfts: GrowthMetric,
    pub media_storage: Metric<GrowthMetric>,
}

/// Per-day deltas over whole UTC days.
///
/// The series spans `covers_from..covers_until`, which widens the window to
/// day boundaries, so its sum can differ from the matching growth metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySeries {
    pub covers_from: DateTime<Utc>,
    pub covers_until: DateTime<Utc>,
    pub videos: Vec<DailyPoint>,
    pub channels: Vec<DailyPoint>,
    pub memberships: Vec<DailyPoint>,
}

/// Report over an arbitrary start/end window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowReport {
    pub window: Window,
    pub issuance: IssuanceSection,
    pub tracked_accounts: Vec<AccountBalanceChange>,
    pub dao_spending: DaoSpending,
    pub council_budget: CouncilBudget,
    pub working_groups: BTreeMap<GroupId, WorkingGroupReport>,
    pub content: ContentActivity,
    pub memberships: GrowthMetric,
    pub forum: ForumActivity,
    pub hiring: HiringActivity,
    pub proposals: ProposalSection,
    pub daily: DailySeries,
}

/// Window report pinned to one council term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodReport {
    pub period: CouncilPeriod,
    pub report: WindowReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplySection {
    pub initial_supply: Decimal,
    pub total_issuance: Decimal,
    pub minted_since_genesis: Decimal,
    /// Issuance growth relative to the initial supply; `None` for a zero initial supply.
    pub inflation_percent: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityTotals {
    pub videos: u64,
    pub channels: u64,
    pub video_nfts: u64,
    pub memberships: u64,
    pub forum_threads: u64,
    pub forum_posts: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub account: String,
    pub balance: Decimal,
}

/// Point-in-time totals at a single block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotReport {
    pub block: Block,
    pub supply: SupplySection,
    pub council_budget: Decimal,
    pub council_size: usize,
    pub councilor_reward_per_block: Decimal,
    pub working_group_budgets: BTreeMap<GroupId, Decimal>,
    pub tracked_accounts: Vec<AccountBalance>,
    pub totals: ActivityTotals,
    pub total_storage_used: Metric<u64>,
    pub validator_rewards: Metric<Decimal>,
}

/// Any of the report shapes the engine produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Report {
    Snapshot(SnapshotReport),
    Window(WindowReport),
    Period(PeriodReport),
}
