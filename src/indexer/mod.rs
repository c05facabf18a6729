//! Event-indexer access.
//!
//! Sources answer a [`QueryName`] + [`FilterSpec`] with either a total count
//! or a page of JSON items. [`IndexerAdapter`] validates every item against
//! the typed record for that query, so nothing past this module handles
//! untyped shapes.

pub mod graphql;

pub use graphql::GraphQlIndexer;

use crate::error::{ReportError, Result};
use crate::models::{CouncilPeriod, GroupId, Proposal, ProposalStatus};
use crate::pool::FetchPool;
use crate::units::{checked_sum, RawAmount};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

const SOURCE: &str = "indexer";

/// Whether a query answers with a count or with items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryShape {
    Count,
    List,
}

/// The fixed set of indexer queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryName {
    Videos,
    Channels,
    Memberships,
    NftIssued,
    ForumThreads,
    ForumPosts,
    WorkingGroupOpenings,
    WorkingGroupApplications,
    BudgetSpending,
    BudgetRefills,
    FundingRequestsPaid,
    Proposals,
    WorkingGroups,
    ElectedCouncils,
}

impl QueryName {
    pub fn shape(&self) -> QueryShape {
        match self {
            QueryName::Videos
            | QueryName::Channels
            | QueryName::Memberships
            | QueryName::NftIssued
            | QueryName::ForumThreads
            | QueryName::ForumPosts
            | QueryName::WorkingGroupOpenings
            | QueryName::WorkingGroupApplications => QueryShape::Count,
            QueryName::BudgetSpending
            | QueryName::BudgetRefills
            | QueryName::FundingRequestsPaid
            | QueryName::Proposals
            | QueryName::WorkingGroups
            | QueryName::ElectedCouncils => QueryShape::List,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryName::Videos => "videos",
            QueryName::Channels => "channels",
            QueryName::Memberships => "memberships",
            QueryName::NftIssued => "nftIssued",
            QueryName::ForumThreads => "forumThreads",
            QueryName::ForumPosts => "forumPosts",
            QueryName::WorkingGroupOpenings => "workingGroupOpenings",
            QueryName::WorkingGroupApplications => "workingGroupApplications",
            QueryName::BudgetSpending => "budgetSpending",
            QueryName::BudgetRefills => "budgetRefills",
            QueryName::FundingRequestsPaid => "fundingRequestsPaid",
            QueryName::Proposals => "proposals",
            QueryName::WorkingGroups => "workingGroups",
            QueryName::ElectedCouncils => "electedCouncils",
        }
    }
}

impl fmt::Display for QueryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One side of a creation-time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBound {
    pub at: DateTime<Utc>,
    pub inclusive: bool,
}

/// Numeric columns that support threshold predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericField {
    TotalVideosCreated,
}

/// `field > greater_than`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Threshold {
    pub field: NumericField,
    pub greater_than: u64,
}

/// Filter applied to an indexer query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSpec {
    pub lower: Option<TimeBound>,
    pub upper: Option<TimeBound>,
    pub id: Option<String>,
    pub group_id: Option<GroupId>,
    /// Recipient/beneficiary account must be one of these.
    pub accounts: Option<Vec<String>>,
    pub thresholds: Vec<Threshold>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// `createdAt >= at`
    pub fn created_from(mut self, at: DateTime<Utc>) -> Self {
        self.lower = Some(TimeBound { at, inclusive: true });
        self
    }

    /// `createdAt > at`
    pub fn created_after(mut self, at: DateTime<Utc>) -> Self {
        self.lower = Some(TimeBound { at, inclusive: false });
        self
    }

    /// `createdAt <= at`
    pub fn created_until(mut self, at: DateTime<Utc>) -> Self {
        self.upper = Some(TimeBound { at, inclusive: true });
        self
    }

    /// `createdAt < at`
    pub fn created_before(mut self, at: DateTime<Utc>) -> Self {
        self.upper = Some(TimeBound { at, inclusive: false });
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn in_group(mut self, group_id: impl Into<GroupId>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    pub fn for_accounts(mut self, accounts: Vec<String>) -> Self {
        self.accounts = Some(accounts);
        self
    }

    pub fn with_threshold(mut self, field: NumericField, greater_than: u64) -> Self {
        self.thresholds.push(Threshold {
            field,
            greater_than,
        });
        self
    }

    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = Some(offset);
        self.limit = Some(limit);
        self
    }

    /// Whether `created_at` falls inside the lower/upper bounds.
    pub fn admits_time(&self, created_at: DateTime<Utc>) -> bool {
        let above = self.lower.map_or(true, |b| {
            if b.inclusive {
                created_at >= b.at
            } else {
                created_at > b.at
            }
        });
        let below = self.upper.map_or(true, |b| {
            if b.inclusive {
                created_at <= b.at
            } else {
                created_at < b.at
            }
        });
        above && below
    }
}

/// What a source returns for one query.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexerResponse {
    Count { total_count: u64 },
    List { items: Vec<serde_json::Value> },
}

/// Read-only access to the event index.
#[async_trait]
pub trait IndexerSource: Send + Sync {
    async fn execute(&self, query: QueryName, filter: &FilterSpec) -> Result<IndexerResponse>;
}

/// Accept raw amounts as either JSON strings or numbers.
fn de_raw_amount<'de, D>(deserializer: D) -> std::result::Result<RawAmount, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Number(u64),
    }

    match Repr::deserialize(deserializer)? {
        Repr::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
        Repr::Number(n) => Ok(RawAmount::from(n)),
    }
}

/// Accept signed amounts as either JSON strings or numbers.
fn de_signed_amount<'de, D>(deserializer: D) -> std::result::Result<i128, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Number(i64),
    }

    match Repr::deserialize(deserializer)? {
        Repr::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
        Repr::Number(n) => Ok(i128::from(n)),
    }
}

/// Contract for budget-spending and funding-paid events.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmountEvent {
    #[serde(deserialize_with = "de_raw_amount")]
    pub amount: RawAmount,
    pub created_at: DateTime<Utc>,
}

/// Contract for a budget-updated event. The change is negative when the
/// budget was cut.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetChangeEvent {
    #[serde(deserialize_with = "de_signed_amount")]
    pub amount: i128,
    pub created_at: DateTime<Utc>,
}

/// Budget-updated events split by direction, in raw units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BudgetChanges {
    /// Sum of the positive changes.
    pub added: RawAmount,
    /// Sum of the magnitudes of the negative changes.
    pub removed: RawAmount,
}

impl BudgetChanges {
    fn checked_push(self, change: i128) -> Option<Self> {
        let magnitude = change.unsigned_abs();
        Some(if change >= 0 {
            Self {
                added: self.added.checked_add(magnitude)?,
                ..self
            }
        } else {
            Self {
                removed: self.removed.checked_add(magnitude)?,
                ..self
            }
        })
    }
}

/// Contract for a worker (or lead) entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRecord {
    pub id: String,
    #[serde(default)]
    pub is_lead: bool,
    #[serde(deserialize_with = "de_raw_amount")]
    pub reward_per_block: RawAmount,
    #[serde(default)]
    pub bound_accounts: Vec<String>,
}

/// Contract for a working group entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkingGroupRecord {
    pub id: GroupId,
    #[serde(default)]
    pub leader: Option<WorkerRecord>,
    #[serde(default)]
    pub workers: Vec<WorkerRecord>,
}

/// Contract for a proposal entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalRecord {
    pub id: String,
    pub title: String,
    pub status: ProposalStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub council_approvals: u32,
}

impl From<ProposalRecord> for Proposal {
    fn from(record: ProposalRecord) -> Self {
        Proposal {
            id: record.id,
            title: record.title,
            status: record.status,
            created_at: record.created_at,
            council_approvals: record.council_approvals,
        }
    }
}

/// Contract for an elected council entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouncilRecord {
    pub id: String,
    pub elected_at_block: u64,
    #[serde(default)]
    pub ended_at_block: Option<u64>,
}

impl From<CouncilRecord> for CouncilPeriod {
    fn from(record: CouncilRecord) -> Self {
        CouncilPeriod {
            id: record.id,
            elected_at_block: record.elected_at_block,
            ended_at_block: record.ended_at_block,
        }
    }
}

/// Pooled, validated access to an [`IndexerSource`].
#[derive(Clone)]
pub struct IndexerAdapter {
    source: Arc<dyn IndexerSource>,
    pool: FetchPool,
    page_size: usize,
}

impl IndexerAdapter {
    pub fn new(source: Arc<dyn IndexerSource>, pool: FetchPool, page_size: usize) -> Self {
        Self {
            source,
            pool,
            page_size: page_size.max(1),
        }
    }

    async fn execute(&self, query: QueryName, filter: &FilterSpec) -> Result<IndexerResponse> {
        let source = &self.source;
        self.pool
            .run(&format!("indexer {}", query), || source.execute(query, filter))
            .await
    }

    /// `totalCount` of a count-shaped query.
    pub async fn count(&self, query: QueryName, filter: &FilterSpec) -> Result<u64> {
        if query.shape() != QueryShape::Count {
            return Err(ReportError::InvalidArgument(format!(
                "{} is not a count query",
                query
            )));
        }

        match self.execute(query, filter).await? {
            IndexerResponse::Count { total_count } => Ok(total_count),
            IndexerResponse::List { .. } => Err(ReportError::malformed(
                SOURCE,
                format!("{} returned a list, expected totalCount", query),
            )),
        }
    }

    /// All items of a list-shaped query, paged with offset/limit.
    ///
    /// A `limit` on the filter caps the total number of items returned.
    pub async fn list<T: DeserializeOwned>(
        &self,
        query: QueryName,
        filter: &FilterSpec,
    ) -> Result<Vec<T>> {
        if query.shape() != QueryShape::List {
            return Err(ReportError::InvalidArgument(format!(
                "{} is not a list query",
                query
            )));
        }

        let mut offset = filter.offset.unwrap_or(0);
        let cap = filter.limit;
        let mut records = Vec::new();

        loop {
            let remaining = cap.map_or(self.page_size, |cap| cap.saturating_sub(records.len()));
            if remaining == 0 {
                break;
            }
            let page_len = remaining.min(self.page_size);
            let page_filter = filter.clone().page(offset, page_len);

            let items = match self.execute(query, &page_filter).await? {
                IndexerResponse::List { items } => items,
                IndexerResponse::Count { .. } => {
                    return Err(ReportError::malformed(
                        SOURCE,
                        format!("{} returned a count, expected items", query),
                    ))
                }
            };

            let fetched = items.len();
            for item in items {
                let record = serde_json::from_value(item).map_err(|e| {
                    ReportError::malformed(SOURCE, format!("{} item: {}", query, e))
                })?;
                records.push(record);
            }

            debug!("{} page at offset {}: {} items", query, offset, fetched);
            if fetched < page_len {
                break;
            }
            offset += fetched;
        }

        Ok(records)
    }

    /// Sum of `amount` over an amount-event query, in raw units.
    pub async fn sum_amounts(&self, query: QueryName, filter: &FilterSpec) -> Result<RawAmount> {
        let events: Vec<AmountEvent> = self.list(query, filter).await?;
        checked_sum(events.into_iter().map(|e| e.amount))
            .ok_or_else(|| ReportError::malformed(SOURCE, format!("{} amounts overflow", query)))
    }

    /// Budget-updated events of a `BudgetRefills` query, split by sign.
    pub async fn budget_changes(&self, filter: &FilterSpec) -> Result<BudgetChanges> {
        let events: Vec<BudgetChangeEvent> = self.list(QueryName::BudgetRefills, filter).await?;
        events
            .into_iter()
            .try_fold(BudgetChanges::default(), |acc, e| acc.checked_push(e.amount))
            .ok_or_else(|| ReportError::malformed(SOURCE, "budget change amounts overflow"))
    }

    pub async fn working_groups(&self) -> Result<Vec<WorkingGroupRecord>> {
        self.list(QueryName::WorkingGroups, &FilterSpec::new()).await
    }

    pub async fn proposals(&self, filter: &FilterSpec) -> Result<Vec<Proposal>> {
        let records: Vec<ProposalRecord> = self.list(QueryName::Proposals, filter).await?;
        Ok(records.into_iter().map(Proposal::from).collect())
    }

    pub async fn council_periods(&self) -> Result<Vec<CouncilPeriod>> {
        let records: Vec<CouncilRecord> =
            self.list(QueryName::ElectedCouncils, &FilterSpec::new()).await?;
        Ok(records.into_iter().map(CouncilPeriod::from).collect())
    }

    /// Look one council period up by id.
    pub async fn council_period(&self, id: &str) -> Result<CouncilPeriod> {
        let filter = FilterSpec::new().with_id(id);
        let mut records: Vec<CouncilRecord> = self.list(QueryName::ElectedCouncils, &filter).await?;
        match records.len() {
            0 => Err(ReportError::not_found(format!("council period {}", id))),
            1 => Ok(records.remove(0).into()),
            n => Err(ReportError::malformed(
                SOURCE,
                format!("{} councils match id {}", n, id),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::Mutex;

    /// Serves `total` numbered amount events and records every page request.
    struct Paged {
        total: usize,
        requests: Mutex<Vec<(usize, usize)>>,
    }

    #[async_trait]
    impl IndexerSource for Paged {
        async fn execute(&self, query: QueryName, filter: &FilterSpec) -> Result<IndexerResponse> {
            if query.shape() == QueryShape::Count {
                return Ok(IndexerResponse::List { items: vec![] });
            }
            let offset = filter.offset.unwrap_or(0);
            let limit = filter.limit.unwrap_or(usize::MAX);
            self.requests.lock().unwrap().push((offset, limit));
            let items = (offset..self.total.min(offset.saturating_add(limit)))
                .map(|i| json!({"amount": (i + 1).to_string(), "createdAt": "2024-01-01T00:00:00Z"}))
                .collect();
            Ok(IndexerResponse::List { items })
        }
    }

    fn adapter(total: usize, page_size: usize) -> (IndexerAdapter, Arc<Paged>) {
        let source = Arc::new(Paged {
            total,
            requests: Mutex::new(Vec::new()),
        });
        let adapter = IndexerAdapter::new(
            source.clone(),
            FetchPool::new(2, RetryPolicy::none()),
            page_size,
        );
        (adapter, source)
    }

    #[tokio::test]
    async fn test_list_pages_until_short_page() {
        let (adapter, source) = adapter(7, 3);
        let sum = adapter
            .sum_amounts(QueryName::BudgetSpending, &FilterSpec::new())
            .await
            .unwrap();

        assert_eq!(sum, 28);
        assert_eq!(
            *source.requests.lock().unwrap(),
            vec![(0, 3), (3, 3), (6, 3)]
        );
    }

    #[tokio::test]
    async fn test_list_respects_limit() {
        let (adapter, _) = adapter(50, 4);
        let events: Vec<AmountEvent> = adapter
            .list(QueryName::BudgetRefills, &FilterSpec::new().page(10, 6))
            .await
            .unwrap();

        assert_eq!(events.len(), 6);
        assert_eq!(events[0].amount, 11);
    }

    #[tokio::test]
    async fn test_shape_mismatch_is_malformed() {
        let (adapter, _) = adapter(0, 10);
        let err = adapter
            .count(QueryName::Videos, &FilterSpec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::MalformedResponse { .. }));
    }

    #[test]
    fn test_record_contracts() {
        let event: AmountEvent =
            serde_json::from_value(json!({"amount": 15, "createdAt": "2024-01-02T10:00:00Z"}))
                .unwrap();
        assert_eq!(event.amount, 15);

        let group: WorkingGroupRecord = serde_json::from_value(json!({
            "id": "storageWorkingGroup",
            "leader": null,
            "workers": [{"id": "w1", "rewardPerBlock": "120", "boundAccounts": ["5Fa"]}]
        }))
        .unwrap();
        assert!(group.leader.is_none());
        assert_eq!(group.workers[0].reward_per_block, 120);

        let bad = serde_json::from_value::<AmountEvent>(json!({"amount": "-4", "createdAt": "2024-01-02T10:00:00Z"}));
        assert!(bad.is_err());

        let cut: BudgetChangeEvent =
            serde_json::from_value(json!({"amount": "-4", "createdAt": "2024-01-02T10:00:00Z"}))
                .unwrap();
        assert_eq!(cut.amount, -4);
        let top_up: BudgetChangeEvent =
            serde_json::from_value(json!({"amount": 9, "createdAt": "2024-01-02T10:00:00Z"}))
                .unwrap();
        assert_eq!(top_up.amount, 9);
    }

    /// Serves a fixed list of budget-updated events.
    struct Refills(Vec<serde_json::Value>);

    #[async_trait]
    impl IndexerSource for Refills {
        async fn execute(&self, _query: QueryName, _filter: &FilterSpec) -> Result<IndexerResponse> {
            Ok(IndexerResponse::List {
                items: self.0.clone(),
            })
        }
    }

    #[tokio::test]
    async fn test_budget_changes_split_by_sign() {
        let at = "2024-01-02T10:00:00Z";
        let source = Refills(vec![
            json!({"amount": "700", "createdAt": at}),
            json!({"amount": "-250", "createdAt": at}),
            json!({"amount": 50, "createdAt": at}),
            json!({"amount": "-5", "createdAt": at}),
        ]);
        let pool = FetchPool::new(2, RetryPolicy::none());
        let adapter = IndexerAdapter::new(Arc::new(source), pool, 100);

        let changes = adapter.budget_changes(&FilterSpec::new()).await.unwrap();
        assert_eq!(changes, BudgetChanges { added: 750, removed: 255 });
    }

    #[test]
    fn test_admits_time_bounds() {
        let t = |d| Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap();
        let inclusive = FilterSpec::new().created_from(t(1)).created_until(t(3));
        assert!(inclusive.admits_time(t(1)));
        assert!(inclusive.admits_time(t(3)));
        assert!(!inclusive.admits_time(t(4)));

        let exclusive = FilterSpec::new().created_after(t(1)).created_before(t(3));
        assert!(!exclusive.admits_time(t(1)));
        assert!(exclusive.admits_time(t(2)));
        assert!(!exclusive.admits_time(t(3)));
    }
}
