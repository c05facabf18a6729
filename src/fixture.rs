//! In-memory data source backed by a JSON dataset.
//!
//! One [`FixtureSource`] serves both boundaries: sparse per-block chain state,
//! and indexer entity lists keyed by query name. Indexer items are filtered on
//! the conventional fields `createdAt`, `id`, `groupId`, `account` and
//! `totalVideosCreated`.
//!
//! ```json
//! {
//!   "head": 120,
//!   "blocks": [
//!     { "number": 100, "hash": "0x64", "timestamp": "2024-01-01T00:00:00Z",
//!       "totalIssuance": 10000000000000000000, "councilBudget": 0,
//!       "groupBudgets": { "storageWorkingGroup": 5000000000000 } }
//!   ],
//!   "indexer": {
//!     "videos": [ { "id": "1", "createdAt": "2024-01-01T08:00:00Z" } ]
//!   }
//! }
//! ```

use crate::chain::{ChainSource, QueryPath, Treasury, Value};
use crate::error::{ReportError, Result};
use crate::indexer::{FilterSpec, IndexerResponse, IndexerSource, NumericField, QueryName, QueryShape};
use crate::models::{BlockHash, GroupId};
use crate::units::RawAmount;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

const SOURCE: &str = "fixture";

/// One recorded block and the chain state at it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureBlock {
    pub number: u64,
    pub hash: BlockHash,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub total_issuance: RawAmount,
    #[serde(default)]
    pub council_budget: RawAmount,
    #[serde(default)]
    pub budget_increment: RawAmount,
    #[serde(default)]
    pub councilor_reward: RawAmount,
    #[serde(default)]
    pub council_members: Vec<String>,
    #[serde(default)]
    pub group_budgets: BTreeMap<GroupId, RawAmount>,
    #[serde(default)]
    pub balances: BTreeMap<String, RawAmount>,
}

/// A complete offline dataset.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Dataset {
    /// Best block; defaults to the highest recorded block.
    pub head: Option<u64>,
    /// Blocks absent from this list are treated as pruned.
    pub blocks: Vec<FixtureBlock>,
    /// Indexer items keyed by query name (e.g. `"budgetSpending"`).
    pub indexer: BTreeMap<String, Vec<serde_json::Value>>,
}

impl Dataset {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ReportError::malformed(SOURCE, format!("invalid dataset: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ReportError::InvalidArgument(format!("cannot read dataset {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    fn head(&self) -> Option<u64> {
        self.head
            .or_else(|| self.blocks.iter().map(|b| b.number).max())
    }
}

/// Serves a [`Dataset`] through both source traits.
pub struct FixtureSource {
    dataset: Dataset,
}

impl FixtureSource {
    pub fn new(dataset: Dataset) -> Self {
        Self { dataset }
    }

    fn block_by_hash(&self, hash: &str) -> Result<&FixtureBlock> {
        self.dataset
            .blocks
            .iter()
            .find(|b| b.hash == hash)
            .ok_or_else(|| ReportError::not_found(format!("block {}", hash)))
    }

    fn head_block(&self) -> Result<&FixtureBlock> {
        let head = self
            .dataset
            .head()
            .ok_or_else(|| ReportError::not_found("chain head"))?;
        self.dataset
            .blocks
            .iter()
            .find(|b| b.number == head)
            .ok_or_else(|| ReportError::not_found(format!("block #{}", head)))
    }
}

#[async_trait]
impl ChainSource for FixtureSource {
    async fn block_hash(&self, number: u64) -> Result<Option<BlockHash>> {
        if self.dataset.head().map_or(true, |head| number > head) {
            return Ok(None);
        }
        Ok(self
            .dataset
            .blocks
            .iter()
            .find(|b| b.number == number)
            .map(|b| b.hash.clone()))
    }

    async fn block_number(&self, hash: &BlockHash) -> Result<Option<u64>> {
        Ok(self
            .dataset
            .blocks
            .iter()
            .find(|b| &b.hash == hash)
            .map(|b| b.number))
    }

    async fn get(&self, at: Option<&BlockHash>, path: &QueryPath) -> Result<Value> {
        let block = match at {
            Some(hash) => self.block_by_hash(hash),
            None => self.head_block(),
        };

        Ok(match path {
            QueryPath::CurrentHead => Value::BlockNumber(
                self.dataset
                    .head()
                    .ok_or_else(|| ReportError::not_found("chain head"))?,
            ),
            QueryPath::TotalIssuance => Value::Balance(block?.total_issuance),
            QueryPath::TreasuryBudget(Treasury::Council) => Value::Balance(block?.council_budget),
            QueryPath::TreasuryBudget(Treasury::WorkingGroup(id)) => block?
                .group_budgets
                .get(id)
                .copied()
                .map_or(Value::Empty, Value::Balance),
            QueryPath::TreasuryBudgetIncrement => Value::Balance(block?.budget_increment),
            QueryPath::AccountBalance(account) => block?
                .balances
                .get(account)
                .copied()
                .map_or(Value::Empty, Value::Balance),
            QueryPath::CouncilMembers => Value::Accounts(block?.council_members.clone()),
            QueryPath::CouncilorRewardRate => Value::Balance(block?.councilor_reward),
            QueryPath::BlockTimestamp => Value::Moment(block?.timestamp.timestamp_millis()),
        })
    }
}

fn text<'a>(item: &'a serde_json::Value, field: &str) -> Option<&'a str> {
    item.get(field).and_then(serde_json::Value::as_str)
}

/// Whether `item` satisfies every predicate of `filter` except paging.
fn admits(query: QueryName, item: &serde_json::Value, filter: &FilterSpec) -> Result<bool> {
    if filter.lower.is_some() || filter.upper.is_some() {
        let created_at: DateTime<Utc> = text(item, "createdAt")
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| ReportError::malformed(SOURCE, format!("{} item without createdAt", query)))?;
        if !filter.admits_time(created_at) {
            return Ok(false);
        }
    }

    if let Some(id) = &filter.id {
        if text(item, "id") != Some(id.as_str()) {
            return Ok(false);
        }
    }

    if let Some(group_id) = &filter.group_id {
        if text(item, "groupId") != Some(group_id.as_str()) {
            return Ok(false);
        }
    }

    if let Some(accounts) = &filter.accounts {
        match text(item, "account") {
            Some(account) if accounts.iter().any(|a| a == account) => {}
            _ => return Ok(false),
        }
    }

    for threshold in &filter.thresholds {
        let field = match threshold.field {
            NumericField::TotalVideosCreated => "totalVideosCreated",
        };
        let value = item.get(field).and_then(serde_json::Value::as_u64).unwrap_or(0);
        if value <= threshold.greater_than {
            return Ok(false);
        }
    }

    Ok(true)
}

#[async_trait]
impl IndexerSource for FixtureSource {
    async fn execute(&self, query: QueryName, filter: &FilterSpec) -> Result<IndexerResponse> {
        let items = self
            .dataset
            .indexer
            .get(query.as_str())
            .map(Vec::as_slice)
            .unwrap_or_default();

        let mut matching = Vec::new();
        for item in items {
            if admits(query, item, filter)? {
                matching.push(item);
            }
        }

        Ok(match query.shape() {
            QueryShape::Count => IndexerResponse::Count {
                total_count: matching.len() as u64,
            },
            QueryShape::List => IndexerResponse::List {
                items: matching
                    .into_iter()
                    .skip(filter.offset.unwrap_or(0))
                    .take(filter.limit.unwrap_or(usize::MAX))
                    .cloned()
                    .collect(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;

    const DATASET: &str = r#"{
        "head": 20,
        "blocks": [
            { "number": 10, "hash": "0x0a", "timestamp": "2024-01-01T00:00:00Z",
              "totalIssuance": 18000000000000000000, "balances": { "5Mexc": 7 } },
            { "number": 20, "hash": "0x14", "timestamp": "2024-01-01T00:01:00Z" },
            { "number": 30, "hash": "0x1e", "timestamp": "2024-01-01T00:02:00Z" }
        ],
        "indexer": {
            "channels": [
                { "id": "1", "createdAt": "2024-01-01T00:00:00Z", "totalVideosCreated": 3 },
                { "id": "2", "createdAt": "2024-01-02T00:00:00Z", "totalVideosCreated": 0 },
                { "id": "3", "createdAt": "2024-01-03T00:00:00Z" }
            ]
        }
    }"#;

    fn source() -> FixtureSource {
        FixtureSource::new(Dataset::from_json(DATASET).unwrap())
    }

    #[tokio::test]
    async fn test_chain_reads() {
        let source = source();
        let at = "0x0a".to_string();

        assert_eq!(
            source.get(Some(&at), &QueryPath::TotalIssuance).await.unwrap(),
            Value::Balance(18_000_000_000_000_000_000)
        );
        assert_eq!(
            source
                .get(Some(&at), &QueryPath::AccountBalance("5Mexc".into()))
                .await
                .unwrap(),
            Value::Balance(7)
        );
        assert_eq!(
            source
                .get(Some(&at), &QueryPath::AccountBalance("5Other".into()))
                .await
                .unwrap(),
            Value::Empty
        );
        assert_eq!(
            source.get(None, &QueryPath::CurrentHead).await.unwrap(),
            Value::BlockNumber(20)
        );
    }

    #[tokio::test]
    async fn test_blocks_past_head_or_missing_are_unknown() {
        let source = source();
        assert_eq!(source.block_hash(10).await.unwrap(), Some("0x0a".into()));
        assert_eq!(source.block_hash(15).await.unwrap(), None);
        assert_eq!(source.block_hash(30).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_indexer_filters() {
        let source = source();
        let until_second_day = FilterSpec::new()
            .created_until(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());
        assert_eq!(
            source.execute(QueryName::Channels, &until_second_day).await.unwrap(),
            IndexerResponse::Count { total_count: 2 }
        );

        let non_empty = FilterSpec::new().with_threshold(NumericField::TotalVideosCreated, 0);
        assert_eq!(
            source.execute(QueryName::Channels, &non_empty).await.unwrap(),
            IndexerResponse::Count { total_count: 1 }
        );

        assert_eq!(
            source.execute(QueryName::Videos, &FilterSpec::new()).await.unwrap(),
            IndexerResponse::Count { total_count: 0 }
        );
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(DATASET.as_bytes()).unwrap();

        let dataset = Dataset::load(file.path()).unwrap();
        assert_eq!(dataset.blocks.len(), 3);

        let missing = Dataset::load(Path::new("/nonexistent/dataset.json")).unwrap_err();
        assert!(matches!(missing, ReportError::InvalidArgument(_)));
    }
}
