//! Report composition.
//!
//! [`ReportEngine`] owns the two sources and the settings. Each report call
//! builds a fresh [`ReportContext`] with its own fetch pool, resolves the
//! window once, then fans out one task per report section and assembles the
//! results. Any section failing aborts the whole report.

use crate::analysis::{aggregate_working_groups, count_growth, daily_counts, day_bounds};
use crate::chain::{resolve_block, resolve_window, ChainAdapter, ChainSource};
use crate::error::{ReportError, Result, SectionExt};
use crate::indexer::{FilterSpec, IndexerAdapter, IndexerSource, NumericField, QueryName};
use crate::models::{
    AccountBalance, AccountBalanceChange, ActivityTotals, Block, BlockRef, ContentActivity,
    CouncilBudget, CouncilPeriod, DailySeries, DaoSpending, ForumActivity, HiringActivity,
    IssuanceSection, Metric, PeriodReport, ProposalSection, ProposalSummary, Report,
    SnapshotReport, SupplySection, Window, WindowEnd, WindowReport,
};
use crate::pool::FetchPool;
use crate::retry::RetryPolicy;
use crate::units::{delta_to_display_units, to_display_units, whole_units_to_raw, RawAmount, DEFAULT_DECIMALS};
use futures::future::try_join_all;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Default initial token supply, in whole display units.
pub const DEFAULT_INITIAL_SUPPLY: u64 = 1_000_000_000;

/// Knobs for one engine.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub decimals: u32,
    /// Supply at genesis, in whole display units; inflation is measured against it.
    pub initial_supply: u64,
    /// Accounts whose balances are reported (e.g. exchange wallets).
    pub tracked_accounts: Vec<String>,
    pub concurrency: usize,
    pub retry: RetryPolicy,
    pub page_size: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            decimals: DEFAULT_DECIMALS,
            initial_supply: DEFAULT_INITIAL_SUPPLY,
            tracked_accounts: Vec::new(),
            concurrency: 8,
            retry: RetryPolicy::default(),
            page_size: 1000,
        }
    }
}

/// What to generate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportRequest {
    Snapshot { block: u64 },
    Window { start: u64, end: Option<u64> },
    Period { id: String },
}

/// Everything one report run reads through.
struct ReportContext<'a> {
    chain: ChainAdapter,
    indexer: IndexerAdapter,
    settings: &'a EngineSettings,
}

fn non_empty_channels() -> FilterSpec {
    FilterSpec::new().with_threshold(NumericField::TotalVideosCreated, 0)
}

fn overflow(what: &str) -> ReportError {
    ReportError::malformed("chain", format!("{} overflows", what))
}

impl<'a> ReportContext<'a> {
    fn display(&self, raw: RawAmount) -> Decimal {
        to_display_units(raw, self.settings.decimals)
    }

    fn delta(&self, start: RawAmount, end: RawAmount) -> Decimal {
        delta_to_display_units(start, end, self.settings.decimals)
    }

    async fn issuance(&self, window: &Window) -> Result<IssuanceSection> {
        let (at_start, at_end) = (self.chain.at(&window.start), self.chain.at(&window.end));
        let (start, end) =
            futures::try_join!(at_start.total_issuance(), at_end.total_issuance())?;

        Ok(IssuanceSection {
            start: self.display(start),
            end: self.display(end),
            change: self.delta(start, end),
        })
    }

    async fn tracked_account_changes(&self, window: &Window) -> Result<Vec<AccountBalanceChange>> {
        try_join_all(self.settings.tracked_accounts.iter().map(|account| async move {
            let (at_start, at_end) = (self.chain.at(&window.start), self.chain.at(&window.end));
            let (start, end) = futures::try_join!(
                at_start.account_balance(account),
                at_end.account_balance(account)
            )
            .section(format!("tracked account {}", account))?;

            Ok::<_, ReportError>(AccountBalanceChange {
                account: account.clone(),
                start: self.display(start),
                end: self.display(end),
                change: self.delta(start, end),
            })
        }))
        .await
    }

    /// Council budget movement, and rewards paid to councilors over the window in raw units.
    async fn council(&self, window: &Window) -> Result<(CouncilBudget, RawAmount)> {
        let start = self.chain.at(&window.start);
        let end = self.chain.at(&window.end);

        let (start_budget, end_budget, increment, reward, members) = futures::try_join!(
            start.council_budget(),
            end.council_budget(),
            end.budget_increment(),
            end.councilor_reward(),
            end.council_members()
        )?;

        let rewards = reward
            .checked_mul(members.len() as RawAmount)
            .and_then(|r| r.checked_mul(RawAmount::from(window.block_span())))
            .ok_or_else(|| overflow("council rewards"))?;

        Ok((
            CouncilBudget {
                start: self.display(start_budget),
                end: self.display(end_budget),
                refill_increment: self.display(increment),
            },
            rewards,
        ))
    }

    fn in_window(window: &Window) -> FilterSpec {
        FilterSpec::new()
            .created_from(window.start.timestamp)
            .created_until(window.end.timestamp)
    }

    async fn content(&self, window: &Window) -> Result<ContentActivity> {
        let indexer = &self.indexer;
        let (videos, channels, video_nfts) = futures::try_join!(
            async {
                count_growth(indexer, QueryName::Videos, &FilterSpec::new(), window)
                    .await
                    .section("video growth")
            },
            async {
                count_growth(indexer, QueryName::Channels, &non_empty_channels(), window)
                    .await
                    .section("channel growth")
            },
            async {
                count_growth(indexer, QueryName::NftIssued, &FilterSpec::new(), window)
                    .await
                    .section("video NFT growth")
            }
        )?;

        Ok(ContentActivity {
            videos,
            channels,
            video_nfts,
            media_storage: Metric::unimplemented("storage bag sizes are not indexed"),
        })
    }

    async fn forum(&self, window: &Window) -> Result<ForumActivity> {
        let all = FilterSpec::new();
        let (threads, posts) = futures::try_join!(
            count_growth(&self.indexer, QueryName::ForumThreads, &all, window),
            count_growth(&self.indexer, QueryName::ForumPosts, &all, window)
        )?;
        Ok(ForumActivity { threads, posts })
    }

    async fn hiring(&self, window: &Window) -> Result<HiringActivity> {
        let all = FilterSpec::new();
        let (openings, applications) = futures::try_join!(
            count_growth(&self.indexer, QueryName::WorkingGroupOpenings, &all, window),
            count_growth(&self.indexer, QueryName::WorkingGroupApplications, &all, window)
        )?;
        Ok(HiringActivity {
            openings,
            applications,
        })
    }

    async fn proposals(&self, window: &Window) -> Result<ProposalSection> {
        let filter = FilterSpec::new()
            .created_after(window.start.timestamp)
            .created_before(window.end.timestamp);
        let items = self.indexer.proposals(&filter).await?;

        Ok(ProposalSection {
            summary: ProposalSummary::from_proposals(&items),
            items,
        })
    }

    async fn daily(&self, window: &Window) -> Result<DailySeries> {
        let indexer = &self.indexer;
        let (videos, channels, memberships) = futures::try_join!(
            async {
                daily_counts(indexer, QueryName::Videos, &FilterSpec::new(), window)
                    .await
                    .section("daily videos")
            },
            async {
                daily_counts(indexer, QueryName::Channels, &non_empty_channels(), window)
                    .await
                    .section("daily channels")
            },
            async {
                daily_counts(indexer, QueryName::Memberships, &FilterSpec::new(), window)
                    .await
                    .section("daily memberships")
            }
        )?;

        let (covers_from, covers_until) = day_bounds(window).section("daily series")?;
        Ok(DailySeries {
            covers_from,
            covers_until,
            videos,
            channels,
            memberships,
        })
    }

    async fn window_report(&self, start: u64, end: WindowEnd) -> Result<WindowReport> {
        let window = resolve_window(&self.chain, start, end).await.section("window")?;
        info!(
            "Window #{} ({}) .. #{} ({}){}",
            window.start.number,
            window.start.timestamp.format("%Y-%m-%d %H:%M"),
            window.end.number,
            window.end.timestamp.format("%Y-%m-%d %H:%M"),
            if window.end_was_open { " [head]" } else { "" }
        );
        let decimals = self.settings.decimals;
        let w = &window;

        let (
            issuance,
            tracked_accounts,
            (council_budget, council_rewards),
            funding_paid,
            groups,
            content,
            memberships,
            forum,
            hiring,
            proposals,
            daily,
        ) = futures::try_join!(
            async { self.issuance(w).await.section("issuance") },
            self.tracked_account_changes(w),
            async { self.council(w).await.section("council budget") },
            async {
                self.indexer
                    .sum_amounts(QueryName::FundingRequestsPaid, &Self::in_window(w))
                    .await
                    .section("funding proposals")
            },
            async {
                let groups = self.indexer.working_groups().await.section("working groups")?;
                aggregate_working_groups(&self.chain, &self.indexer, w, &groups, decimals).await
            },
            self.content(w),
            async {
                count_growth(&self.indexer, QueryName::Memberships, &FilterSpec::new(), w)
                    .await
                    .section("membership growth")
            },
            async { self.forum(w).await.section("forum activity") },
            async { self.hiring(w).await.section("hiring activity") },
            async { self.proposals(w).await.section("proposals") },
            self.daily(w)
        )?;
        debug!("All window sections complete");

        let dao_spending = DaoSpending {
            council_rewards: self.display(council_rewards),
            funding_proposals: self.display(funding_paid),
            working_group_spending: self.display(groups.total_spending),
            creator_payouts: Metric::unimplemented("creator payouts are not indexed"),
            validator_rewards: Metric::unimplemented("validator reward accrual is not indexed"),
        };

        Ok(WindowReport {
            window,
            issuance,
            tracked_accounts,
            dao_spending,
            council_budget,
            working_groups: groups.groups,
            content,
            memberships,
            forum,
            hiring,
            proposals,
            daily,
        })
    }

    async fn supply(&self, block: &Block) -> Result<SupplySection> {
        let total_issuance = self.chain.at(block).total_issuance().await?;
        let initial_raw = whole_units_to_raw(self.settings.initial_supply, self.settings.decimals);
        let minted = self.delta(initial_raw, total_issuance);
        let initial_supply = Decimal::from(self.settings.initial_supply);

        let inflation_percent = if self.settings.initial_supply == 0 {
            None
        } else {
            minted
                .checked_mul(Decimal::ONE_HUNDRED)
                .and_then(|scaled| scaled.checked_div(initial_supply))
        };

        Ok(SupplySection {
            initial_supply,
            total_issuance: self.display(total_issuance),
            minted_since_genesis: minted,
            inflation_percent,
        })
    }

    async fn group_budgets_at(&self, block: &Block) -> Result<BTreeMap<String, Decimal>> {
        let groups = self.indexer.working_groups().await?;
        let view = self.chain.at(block);

        let budgets = try_join_all(groups.iter().map(|group| {
            let view = &view;
            async move {
                let budget = view.group_budget(&group.id).await?.unwrap_or(0);
                Ok::<_, ReportError>((group.id.clone(), self.display(budget)))
            }
        }))
        .await?;

        Ok(budgets.into_iter().collect())
    }

    async fn totals_at(&self, block: &Block) -> Result<ActivityTotals> {
        let until = FilterSpec::new().created_until(block.timestamp);
        let non_empty = non_empty_channels().created_until(block.timestamp);
        let indexer = &self.indexer;

        let (videos, channels, video_nfts, memberships, forum_threads, forum_posts) = futures::try_join!(
            indexer.count(QueryName::Videos, &until),
            indexer.count(QueryName::Channels, &non_empty),
            indexer.count(QueryName::NftIssued, &until),
            indexer.count(QueryName::Memberships, &until),
            indexer.count(QueryName::ForumThreads, &until),
            indexer.count(QueryName::ForumPosts, &until)
        )?;

        Ok(ActivityTotals {
            videos,
            channels,
            video_nfts,
            memberships,
            forum_threads,
            forum_posts,
        })
    }

    async fn snapshot_report(&self, number: u64) -> Result<SnapshotReport> {
        let block = resolve_block(&self.chain, &BlockRef::Number(number))
            .await
            .section("block")?;
        info!("Snapshot at #{} ({})", block.number, block.timestamp);
        let view = self.chain.at(&block);
        let b = &block;

        let (supply, (council_budget, members, reward), working_group_budgets, tracked_accounts, totals) =
            futures::try_join!(
                async { self.supply(b).await.section("supply") },
                async {
                    futures::try_join!(
                        view.council_budget(),
                        view.council_members(),
                        view.councilor_reward()
                    )
                    .section("council")
                },
                async { self.group_budgets_at(b).await.section("working-group budgets") },
                try_join_all(self.settings.tracked_accounts.iter().map(|account| {
                    let view = &view;
                    async move {
                        let balance = view
                            .account_balance(account)
                            .await
                            .section(format!("tracked account {}", account))?;
                        Ok::<_, ReportError>(AccountBalance {
                            account: account.clone(),
                            balance: self.display(balance),
                        })
                    }
                })),
                async { self.totals_at(b).await.section("activity totals") }
            )?;

        Ok(SnapshotReport {
            block,
            supply,
            council_budget: self.display(council_budget),
            council_size: members.len(),
            councilor_reward_per_block: self.display(reward),
            working_group_budgets,
            tracked_accounts,
            totals,
            total_storage_used: Metric::unimplemented("storage bag sizes are not indexed"),
            validator_rewards: Metric::unimplemented("validator reward accrual is not indexed"),
        })
    }
}

/// Composes reports from a chain source and an indexer source.
pub struct ReportEngine {
    chain: Arc<dyn ChainSource>,
    indexer: Arc<dyn IndexerSource>,
    settings: EngineSettings,
}

impl ReportEngine {
    pub fn new(
        chain: Arc<dyn ChainSource>,
        indexer: Arc<dyn IndexerSource>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            chain,
            indexer,
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Fresh adapters over a fresh pool; nothing is shared between runs.
    fn context(&self) -> ReportContext<'_> {
        let pool = FetchPool::new(self.settings.concurrency, self.settings.retry.clone());
        ReportContext {
            chain: ChainAdapter::new(self.chain.clone(), pool.clone()),
            indexer: IndexerAdapter::new(self.indexer.clone(), pool, self.settings.page_size),
            settings: &self.settings,
        }
    }

    /// Point-in-time totals at `block`.
    pub async fn generate_snapshot_report(&self, block: u64) -> Result<SnapshotReport> {
        self.context().snapshot_report(block).await
    }

    /// Report over `start..end`; `None` pins the end to the current head.
    pub async fn generate_window_report(&self, start: u64, end: Option<u64>) -> Result<WindowReport> {
        self.context().window_report(start, end.into()).await
    }

    /// Report over one council term. A term still in office runs to the head.
    pub async fn generate_period_report(&self, period_id: &str) -> Result<PeriodReport> {
        let ctx = self.context();
        let period = ctx
            .indexer
            .council_period(period_id)
            .await
            .section("council period")?;
        let report = ctx
            .window_report(period.elected_at_block, period.ended_at_block.into())
            .await?;

        Ok(PeriodReport { period, report })
    }

    /// Known council terms, oldest first.
    pub async fn list_periods(&self) -> Result<Vec<CouncilPeriod>> {
        let mut periods = self
            .context()
            .indexer
            .council_periods()
            .await
            .section("council periods")?;
        periods.sort_by_key(|p| p.elected_at_block);
        Ok(periods)
    }

    pub async fn generate(&self, request: &ReportRequest) -> Result<Report> {
        Ok(match request {
            ReportRequest::Snapshot { block } => {
                Report::Snapshot(self.generate_snapshot_report(*block).await?)
            }
            ReportRequest::Window { start, end } => {
                Report::Window(self.generate_window_report(*start, *end).await?)
            }
            ReportRequest::Period { id } => Report::Period(self.generate_period_report(id).await?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{QueryPath, Value};
    use crate::fixture::{Dataset, FixtureSource};
    use crate::indexer::IndexerResponse;
    use crate::models::{BlockHash, ProposalStatus};
    use async_trait::async_trait;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const DATASET: &str = r#"{
        "blocks": [
            { "number": 1000, "hash": "0x3e8", "timestamp": "2024-01-01T12:00:00Z",
              "totalIssuance": 10000000000000000000,
              "councilBudget": 1000000000000, "budgetIncrement": 100000000000,
              "councilorReward": 10000000000, "councilMembers": ["5C1", "5C2", "5C3"],
              "groupBudgets": { "storageWorkingGroup": 5000000000000 },
              "balances": { "5Mexc": 20000000000 } },
            { "number": 2000, "hash": "0x7d0", "timestamp": "2024-01-03T12:00:00Z",
              "totalIssuance": 10050000000000000000,
              "councilBudget": 700000000000, "budgetIncrement": 100000000000,
              "councilorReward": 10000000000, "councilMembers": ["5C1", "5C2", "5C3"],
              "groupBudgets": { "storageWorkingGroup": 4000000000000, "contentWorkingGroup": 1000000000000 },
              "balances": { "5Mexc": 50000000000 } }
        ],
        "indexer": {
            "videos": [
                { "id": "1", "createdAt": "2024-01-01T06:00:00Z" },
                { "id": "2", "createdAt": "2024-01-01T13:00:00Z" },
                { "id": "3", "createdAt": "2024-01-01T20:00:00Z" },
                { "id": "4", "createdAt": "2024-01-03T08:00:00Z" }
            ],
            "channels": [
                { "id": "1", "createdAt": "2023-12-31T00:00:00Z", "totalVideosCreated": 2 },
                { "id": "2", "createdAt": "2024-01-02T00:00:00Z", "totalVideosCreated": 1 },
                { "id": "3", "createdAt": "2024-01-02T01:00:00Z", "totalVideosCreated": 0 }
            ],
            "memberships": [
                { "id": "1", "createdAt": "2023-12-01T00:00:00Z" },
                { "id": "2", "createdAt": "2023-12-02T00:00:00Z" },
                { "id": "3", "createdAt": "2024-01-02T00:00:00Z" },
                { "id": "4", "createdAt": "2024-01-02T05:00:00Z" }
            ],
            "forumThreads": [ { "id": "1", "createdAt": "2024-01-02T00:00:00Z" } ],
            "workingGroups": [
                { "id": "storageWorkingGroup",
                  "leader": { "id": "1", "isLead": true, "rewardPerBlock": "20000000000", "boundAccounts": ["5Lead"] },
                  "workers": [] },
                { "id": "contentWorkingGroup", "leader": null, "workers": [] }
            ],
            "budgetSpending": [
                { "amount": "1000000000000", "createdAt": "2024-01-02T00:00:00Z",
                  "groupId": "storageWorkingGroup", "account": "5Vendor" }
            ],
            "fundingRequestsPaid": [
                { "amount": "30000000000", "createdAt": "2024-01-02T10:00:00Z", "account": "5Lead" }
            ],
            "proposals": [
                { "id": "1", "title": "Fund storage", "status": "executed",
                  "createdAt": "2024-01-02T00:00:00Z", "councilApprovals": 1 },
                { "id": "2", "title": "Signal", "status": "deciding",
                  "createdAt": "2024-01-03T00:00:00Z" },
                { "id": "3", "title": "Old", "status": "rejected",
                  "createdAt": "2023-12-01T00:00:00Z" }
            ],
            "electedCouncils": [
                { "id": "2", "electedAtBlock": 2000, "endedAtBlock": null },
                { "id": "1", "electedAtBlock": 1000, "endedAtBlock": 2000 }
            ]
        }
    }"#;

    fn fixture() -> Arc<FixtureSource> {
        Arc::new(FixtureSource::new(Dataset::from_json(DATASET).unwrap()))
    }

    fn settings() -> EngineSettings {
        EngineSettings {
            tracked_accounts: vec!["5Mexc".to_string()],
            concurrency: 3,
            retry: RetryPolicy::none(),
            ..EngineSettings::default()
        }
    }

    fn engine() -> ReportEngine {
        let source = fixture();
        ReportEngine::new(source.clone(), source, settings())
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    /// Records every chain read so tests can check which blocks were used.
    struct RecordingChain {
        inner: Arc<FixtureSource>,
        head_reads: AtomicUsize,
        reads_at: Mutex<Vec<BlockHash>>,
    }

    #[async_trait]
    impl ChainSource for RecordingChain {
        async fn block_hash(&self, number: u64) -> Result<Option<BlockHash>> {
            self.inner.block_hash(number).await
        }

        async fn block_number(&self, hash: &BlockHash) -> Result<Option<u64>> {
            self.inner.block_number(hash).await
        }

        async fn get(&self, at: Option<&BlockHash>, path: &QueryPath) -> Result<Value> {
            if *path == QueryPath::CurrentHead {
                self.head_reads.fetch_add(1, Ordering::SeqCst);
            }
            if let Some(hash) = at {
                self.reads_at.lock().unwrap().push(hash.clone());
            }
            self.inner.get(at, path).await
        }
    }

    /// Fails one query with a malformed response.
    struct BrokenQuery {
        inner: Arc<FixtureSource>,
        broken: QueryName,
    }

    #[async_trait]
    impl IndexerSource for BrokenQuery {
        async fn execute(&self, query: QueryName, filter: &FilterSpec) -> Result<IndexerResponse> {
            if query == self.broken {
                return Err(ReportError::malformed("indexer", "unexpected field"));
            }
            self.inner.execute(query, filter).await
        }
    }

    #[tokio::test]
    async fn test_window_report() {
        let report = engine().generate_window_report(1000, Some(2000)).await.unwrap();

        assert_eq!(report.window.block_span(), 1000);
        assert!(!report.window.end_was_open);

        assert_eq!(report.issuance.change, Decimal::from(5_000_000));
        assert_eq!(report.tracked_accounts[0].change, Decimal::from(3));

        assert_eq!(report.council_budget.start, Decimal::from(100));
        assert_eq!(report.council_budget.end, Decimal::from(70));
        assert_eq!(report.council_budget.refill_increment, Decimal::from(10));

        // 1 per block, 3 councilors, 1000 blocks.
        assert_eq!(report.dao_spending.council_rewards, Decimal::from(3000));
        assert_eq!(report.dao_spending.funding_proposals, Decimal::from(3));
        assert_eq!(report.dao_spending.working_group_spending, Decimal::from(100));
        assert!(!report.dao_spending.creator_payouts.is_available());
        assert!(!report.dao_spending.validator_rewards.is_available());

        let storage = &report.working_groups["storageWorkingGroup"];
        assert_eq!(storage.lead.as_ref().unwrap().total, Decimal::from(2003));
        assert!(report.working_groups["contentWorkingGroup"].lead.is_none());

        assert_eq!(report.content.videos.start_count, 1);
        assert_eq!(report.content.videos.end_count, 4);
        assert_eq!(report.content.videos.growth_percent, Some(Decimal::from(300)));
        assert_eq!(report.content.channels.growth_count, 1);
        assert_eq!(report.content.video_nfts.growth_percent, None);
        assert!(!report.content.media_storage.is_available());
        assert_eq!(report.memberships.growth_percent, Some(Decimal::from(100)));
        assert_eq!(report.forum.threads.growth_count, 1);

        assert_eq!(report.proposals.summary.total, 2);
        assert_eq!(report.proposals.summary.passed, 1);
        assert_eq!(report.proposals.summary.under_review, 1);
        assert_eq!(report.proposals.items[0].status, ProposalStatus::Executed);

        let videos: Vec<i64> = report.daily.videos.iter().map(|p| p.count).collect();
        assert_eq!(videos, vec![3, 0, 1]);

        // The series widens the window to whole days, so it also counts the
        // video created before the start block on the first day.
        assert_eq!(report.daily.covers_from.to_rfc3339(), "2024-01-01T00:00:00+00:00");
        assert_eq!(report.daily.covers_until.to_rfc3339(), "2024-01-04T00:00:00+00:00");
        assert_eq!(videos.iter().sum::<i64>(), 4);
        assert_eq!(report.content.videos.growth_count, 3);
        let memberships: Vec<i64> = report.daily.memberships.iter().map(|p| p.count).collect();
        assert_eq!(memberships, vec![0, 2, 0]);
    }

    #[tokio::test]
    async fn test_pruned_start_block_fails_whole_report() {
        let err = engine().generate_window_report(500, Some(2000)).await.unwrap_err();

        assert!(matches!(err.root(), ReportError::NotFound { .. }));
        assert_eq!(err.section(), Some("window"));
        assert!(err.is_caller_error());
    }

    #[tokio::test]
    async fn test_end_before_start_is_rejected() {
        let err = engine().generate_window_report(2000, Some(1000)).await.unwrap_err();
        assert!(matches!(err.root(), ReportError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_open_end_is_resolved_once() {
        let chain = Arc::new(RecordingChain {
            inner: fixture(),
            head_reads: AtomicUsize::new(0),
            reads_at: Mutex::new(Vec::new()),
        });
        let engine = ReportEngine::new(chain.clone(), fixture(), settings());

        let report = engine.generate_window_report(1000, None).await.unwrap();

        assert!(report.window.end_was_open);
        assert_eq!(report.window.end.number, 2000);
        assert_eq!(chain.head_reads.load(Ordering::SeqCst), 1);

        let reads = chain.reads_at.lock().unwrap();
        assert!(!reads.is_empty());
        assert!(reads.iter().all(|h| h == "0x3e8" || h == "0x7d0"));
    }

    #[tokio::test]
    async fn test_section_annotation() {
        let source = fixture();
        let indexer = Arc::new(BrokenQuery {
            inner: source.clone(),
            broken: QueryName::Proposals,
        });
        let engine = ReportEngine::new(source, indexer, settings());

        let err = engine.generate_window_report(1000, Some(2000)).await.unwrap_err();
        assert_eq!(err.section(), Some("proposals"));
        assert!(matches!(err.root(), ReportError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_snapshot_report() {
        let report = engine().generate_snapshot_report(2000).await.unwrap();

        assert_eq!(report.supply.initial_supply, Decimal::from(1_000_000_000));
        assert_eq!(report.supply.minted_since_genesis, Decimal::from(5_000_000));
        assert_eq!(report.supply.inflation_percent, Some(dec("0.5")));
        assert_eq!(report.council_size, 3);
        assert_eq!(report.councilor_reward_per_block, Decimal::from(1));
        assert_eq!(report.working_group_budgets["storageWorkingGroup"], Decimal::from(400));
        assert_eq!(report.working_group_budgets["contentWorkingGroup"], Decimal::from(100));
        assert_eq!(report.tracked_accounts[0].balance, Decimal::from(5));
        assert_eq!(report.totals.videos, 4);
        assert_eq!(report.totals.channels, 2);
        assert_eq!(report.totals.memberships, 4);
        assert!(!report.total_storage_used.is_available());
    }

    #[tokio::test]
    async fn test_period_reports() {
        let engine = engine();

        let periods = engine.list_periods().await.unwrap();
        let ids: Vec<&str> = periods.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);

        let closed = engine.generate_period_report("1").await.unwrap();
        assert_eq!(closed.report.window.start.number, 1000);
        assert_eq!(closed.report.window.end.number, 2000);

        let sitting = engine.generate_period_report("2").await.unwrap();
        assert!(sitting.report.window.end_was_open);
        assert_eq!(sitting.report.window.block_span(), 0);

        let err = engine.generate_period_report("99").await.unwrap_err();
        assert!(matches!(err.root(), ReportError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_generate_dispatches_on_request() {
        let report = engine()
            .generate(&ReportRequest::Snapshot { block: 1000 })
            .await
            .unwrap();
        assert!(matches!(report, Report::Snapshot(_)));
    }

    #[tokio::test]
    async fn test_sample_dataset() {
        let dataset =
            Dataset::from_json(include_str!("../../fixtures/sample-chain.json")).unwrap();
        let source = Arc::new(FixtureSource::new(dataset));
        let engine = ReportEngine::new(source.clone(), source, settings());

        let report = engine.generate_window_report(1000, None).await.unwrap();
        assert_eq!(report.window.end.number, 3000);
        assert_eq!(report.issuance.change, Decimal::from(900_000));
        assert_eq!(report.working_groups.len(), 3);
        let content = &report.working_groups["contentWorkingGroup"].budget;
        assert_eq!(content.refills, Decimal::ZERO);
        assert_eq!(content.reductions, Decimal::from(5_000));
        assert_eq!(
            report.working_groups["storageWorkingGroup"].budget.refills,
            Decimal::from(20_000)
        );
        assert_eq!(report.content.videos.start_count, 1);
        assert_eq!(report.content.videos.end_count, 6);
        assert_eq!(report.proposals.summary.total, 4);
        assert_eq!(report.proposals.summary.under_review, 2);

        let periods = engine.list_periods().await.unwrap();
        assert_eq!(periods.len(), 2);
        assert!(periods[1].ended_at_block.is_none());
    }
}
