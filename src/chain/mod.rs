//! Chain state access.
//!
//! The engine only sees the narrow [`ChainSource`] boundary. [`ChainAdapter`]
//! puts every read under the report's fetch pool and turns the loosely typed
//! [`Value`] into the concrete type each query path promises.

pub mod resolver;
pub mod rpc;

pub use resolver::{resolve_block, resolve_window};
pub use rpc::RpcChain;

use crate::error::{ReportError, Result};
use crate::models::{Block, BlockHash, GroupId};
use crate::pool::FetchPool;
use crate::units::RawAmount;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

const SOURCE: &str = "chain";

/// Which treasury a budget query addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Treasury {
    Council,
    WorkingGroup(GroupId),
}

/// The fixed set of point-in-time state reads the engine performs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryPath {
    TreasuryBudget(Treasury),
    TreasuryBudgetIncrement,
    TotalIssuance,
    AccountBalance(String),
    CouncilMembers,
    CouncilorRewardRate,
    CurrentHead,
    BlockTimestamp,
}

impl fmt::Display for QueryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryPath::TreasuryBudget(Treasury::Council) => write!(f, "council.budget"),
            QueryPath::TreasuryBudget(Treasury::WorkingGroup(id)) => {
                write!(f, "{}.budget", id)
            }
            QueryPath::TreasuryBudgetIncrement => write!(f, "council.budgetIncrement"),
            QueryPath::TotalIssuance => write!(f, "balances.totalIssuance"),
            QueryPath::AccountBalance(account) => write!(f, "system.account({})", account),
            QueryPath::CouncilMembers => write!(f, "council.councilMembers"),
            QueryPath::CouncilorRewardRate => write!(f, "council.councilorReward"),
            QueryPath::CurrentHead => write!(f, "chain.header"),
            QueryPath::BlockTimestamp => write!(f, "timestamp.now"),
        }
    }
}

/// Raw value returned by a [`ChainSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Balance(RawAmount),
    Accounts(Vec<String>),
    BlockNumber(u64),
    /// Unix milliseconds.
    Moment(i64),
    /// The storage entry does not exist at this block.
    Empty,
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Balance(_) => "balance",
            Value::Accounts(_) => "account list",
            Value::BlockNumber(_) => "block number",
            Value::Moment(_) => "moment",
            Value::Empty => "empty entry",
        }
    }

    fn mismatch(&self, path: &QueryPath, expected: &str) -> ReportError {
        ReportError::malformed(
            SOURCE,
            format!("{} returned {}, expected {}", path, self.kind(), expected),
        )
    }
}

/// Read-only access to versioned chain state.
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Hash of the canonical block at `number`, or `None` if it is unknown or pruned.
    async fn block_hash(&self, number: u64) -> Result<Option<BlockHash>>;

    /// Number of the block with `hash`, or `None` if unknown.
    async fn block_number(&self, hash: &BlockHash) -> Result<Option<u64>>;

    /// Read `path` at block `at`; `None` reads at the current best block.
    async fn get(&self, at: Option<&BlockHash>, path: &QueryPath) -> Result<Value>;
}

/// Pooled, typed access to a [`ChainSource`].
#[derive(Clone)]
pub struct ChainAdapter {
    source: Arc<dyn ChainSource>,
    pool: FetchPool,
}

impl ChainAdapter {
    pub fn new(source: Arc<dyn ChainSource>, pool: FetchPool) -> Self {
        Self { source, pool }
    }

    /// A view of the state as of `block`.
    pub fn at<'a>(&'a self, block: &'a Block) -> StateView<'a> {
        StateView {
            adapter: self,
            block,
        }
    }

    pub async fn block_hash(&self, number: u64) -> Result<BlockHash> {
        let source = &self.source;
        self.pool
            .run(&format!("chain block_hash({})", number), || {
                source.block_hash(number)
            })
            .await?
            .ok_or_else(|| ReportError::not_found(format!("block #{}", number)))
    }

    pub async fn block_number(&self, hash: &BlockHash) -> Result<u64> {
        let source = &self.source;
        self.pool
            .run(&format!("chain block_number({})", hash), || {
                source.block_number(hash)
            })
            .await?
            .ok_or_else(|| ReportError::not_found(format!("block {}", hash)))
    }

    /// Current best block number.
    pub async fn head_number(&self) -> Result<u64> {
        match self.query(None, &QueryPath::CurrentHead).await? {
            Value::BlockNumber(n) => Ok(n),
            other => Err(other.mismatch(&QueryPath::CurrentHead, "block number")),
        }
    }

    /// Timestamp recorded in the block with `hash`.
    pub async fn timestamp_at(&self, hash: &BlockHash) -> Result<DateTime<Utc>> {
        let path = QueryPath::BlockTimestamp;
        match self.query(Some(hash), &path).await? {
            Value::Moment(ms) => Utc.timestamp_millis_opt(ms).single().ok_or_else(|| {
                ReportError::malformed(SOURCE, format!("timestamp {} out of range", ms))
            }),
            other => Err(other.mismatch(&path, "moment")),
        }
    }

    async fn query(&self, at: Option<&BlockHash>, path: &QueryPath) -> Result<Value> {
        debug!("chain query {} at {}", path, at.map_or("head", String::as_str));
        let source = &self.source;
        self.pool
            .run(&format!("chain {}", path), || source.get(at, path))
            .await
    }
}

/// Chain state pinned to one resolved block.
pub struct StateView<'a> {
    adapter: &'a ChainAdapter,
    block: &'a Block,
}

impl<'a> StateView<'a> {
    pub fn block(&self) -> &Block {
        self.block
    }

    pub async fn get(&self, path: &QueryPath) -> Result<Value> {
        self.adapter.query(Some(&self.block.hash), path).await
    }

    async fn balance(&self, path: QueryPath) -> Result<RawAmount> {
        match self.get(&path).await? {
            Value::Balance(amount) => Ok(amount),
            other => Err(other.mismatch(&path, "balance")),
        }
    }

    pub async fn total_issuance(&self) -> Result<RawAmount> {
        self.balance(QueryPath::TotalIssuance).await
    }

    pub async fn council_budget(&self) -> Result<RawAmount> {
        self.balance(QueryPath::TreasuryBudget(Treasury::Council)).await
    }

    pub async fn budget_increment(&self) -> Result<RawAmount> {
        self.balance(QueryPath::TreasuryBudgetIncrement).await
    }

    pub async fn councilor_reward(&self) -> Result<RawAmount> {
        self.balance(QueryPath::CouncilorRewardRate).await
    }

    /// Free balance of `account`; accounts never seen on chain hold zero.
    pub async fn account_balance(&self, account: &str) -> Result<RawAmount> {
        let path = QueryPath::AccountBalance(account.to_string());
        match self.get(&path).await? {
            Value::Balance(amount) => Ok(amount),
            Value::Empty => Ok(0),
            other => Err(other.mismatch(&path, "balance")),
        }
    }

    /// Budget of a working group, `None` when the group has no entry at this block.
    pub async fn group_budget(&self, group_id: &str) -> Result<Option<RawAmount>> {
        let path = QueryPath::TreasuryBudget(Treasury::WorkingGroup(group_id.to_string()));
        match self.get(&path).await? {
            Value::Balance(amount) => Ok(Some(amount)),
            Value::Empty => Ok(None),
            other => Err(other.mismatch(&path, "balance")),
        }
    }

    pub async fn council_members(&self) -> Result<Vec<String>> {
        let path = QueryPath::CouncilMembers;
        match self.get(&path).await? {
            Value::Accounts(members) => Ok(members),
            other => Err(other.mismatch(&path, "account list")),
        }
    }
}
