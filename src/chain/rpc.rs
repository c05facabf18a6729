//! Live chain access over Substrate JSON-RPC.
//!
//! Only four methods are used: `chain_getBlockHash`, `chain_getHeader`
//! (with and without a hash) and `state_getStorage`. Storage keys are built
//! from the pallet and item names; values are SCALE-decoded for the handful
//! of layouts the engine reads.

use super::{ChainSource, QueryPath, Treasury, Value};
use crate::error::{ReportError, Result};
use crate::models::BlockHash;
use crate::retry::{classify_transport_error, is_retryable_status};
use crate::units::RawAmount;
use async_trait::async_trait;
use blake2::digest::consts::{U16, U64};
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};
use std::hash::Hasher;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;
use twox_hash::XxHash64;

const SOURCE: &str = "chain";

/// Encoded size of one council member entry: staking and reward accounts,
/// member id, stake, last payment block, unpaid reward.
const COUNCIL_MEMBER_LEN: usize = 32 + 32 + 8 + 16 + 4 + 16;

/// `AccountInfo` prefix before `data.free`: nonce, consumers, providers, sufficients.
const ACCOUNT_INFO_FREE_OFFSET: usize = 16;

fn twox_128(data: &[u8]) -> [u8; 16] {
    let mut out = [0u8; 16];
    for (seed, chunk) in out.chunks_exact_mut(8).enumerate() {
        let mut hasher = XxHash64::with_seed(seed as u64);
        hasher.write(data);
        chunk.copy_from_slice(&hasher.finish().to_le_bytes());
    }
    out
}

fn blake2_128(data: &[u8]) -> Vec<u8> {
    Blake2b::<U16>::digest(data).to_vec()
}

/// `twox128(pallet) ++ twox128(item)`.
pub fn storage_prefix(pallet: &str, item: &str) -> Vec<u8> {
    let mut key = twox_128(pallet.as_bytes()).to_vec();
    key.extend_from_slice(&twox_128(item.as_bytes()));
    key
}

/// Runtime pallet name of a working group (`storageWorkingGroup` → `StorageWorkingGroup`).
fn group_pallet(group_id: &str) -> String {
    let mut chars = group_id.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Public key of an account given as SS58 or as 32-byte hex.
pub fn account_id(address: &str) -> Result<[u8; 32]> {
    let invalid = |why: &str| ReportError::InvalidArgument(format!("account {}: {}", address, why));

    if let Some(stripped) = address.strip_prefix("0x") {
        let bytes = hex::decode(stripped).map_err(|e| invalid(&e.to_string()))?;
        return bytes.try_into().map_err(|_| invalid("expected 32 bytes"));
    }

    let raw = bs58::decode(address)
        .into_vec()
        .map_err(|e| invalid(&e.to_string()))?;
    let prefix_len = match raw.first().copied() {
        Some(0..=63) => 1,
        Some(64..=127) => 2,
        _ => return Err(invalid("unsupported SS58 prefix")),
    };
    if raw.len() != prefix_len + 32 + 2 {
        return Err(invalid("unexpected SS58 length"));
    }

    let (body, checksum) = raw.split_at(prefix_len + 32);
    let mut hasher = Blake2b::<U64>::new();
    hasher.update(b"SS58PRE");
    hasher.update(body);
    if hasher.finalize()[..2] != *checksum {
        return Err(invalid("bad SS58 checksum"));
    }

    body[prefix_len..]
        .try_into()
        .map_err(|_| invalid("expected 32 bytes"))
}

/// Storage key for `path`; `None` for paths that are not storage reads.
pub fn storage_key(path: &QueryPath) -> Result<Option<Vec<u8>>> {
    Ok(Some(match path {
        QueryPath::TotalIssuance => storage_prefix("Balances", "TotalIssuance"),
        QueryPath::TreasuryBudget(Treasury::Council) => storage_prefix("Council", "Budget"),
        QueryPath::TreasuryBudget(Treasury::WorkingGroup(id)) => {
            storage_prefix(&group_pallet(id), "Budget")
        }
        QueryPath::TreasuryBudgetIncrement => storage_prefix("Council", "BudgetIncrement"),
        QueryPath::CouncilorRewardRate => storage_prefix("Council", "CouncilorReward"),
        QueryPath::CouncilMembers => storage_prefix("Council", "CouncilMembers"),
        QueryPath::BlockTimestamp => storage_prefix("Timestamp", "Now"),
        QueryPath::AccountBalance(address) => {
            let account = account_id(address)?;
            let mut key = storage_prefix("System", "Account");
            key.extend_from_slice(&blake2_128(&account));
            key.extend_from_slice(&account);
            key
        }
        QueryPath::CurrentHead => return Ok(None),
    }))
}

fn malformed(path: &QueryPath, why: impl std::fmt::Display) -> ReportError {
    ReportError::malformed(SOURCE, format!("{}: {}", path, why))
}

fn read_u128(path: &QueryPath, bytes: &[u8]) -> Result<RawAmount> {
    let raw: [u8; 16] = bytes
        .get(..16)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| malformed(path, format!("{} bytes, expected a u128", bytes.len())))?;
    Ok(RawAmount::from_le_bytes(raw))
}

/// SCALE compact length prefix: `(value, bytes consumed)`.
fn read_compact(path: &QueryPath, bytes: &[u8]) -> Result<(usize, usize)> {
    let short = || malformed(path, "truncated compact length");
    let first = *bytes.first().ok_or_else(short)?;
    match first & 0b11 {
        0 => Ok(((first >> 2) as usize, 1)),
        1 => {
            let raw: [u8; 2] = bytes.get(..2).and_then(|b| b.try_into().ok()).ok_or_else(short)?;
            Ok(((u16::from_le_bytes(raw) >> 2) as usize, 2))
        }
        2 => {
            let raw: [u8; 4] = bytes.get(..4).and_then(|b| b.try_into().ok()).ok_or_else(short)?;
            Ok(((u32::from_le_bytes(raw) >> 2) as usize, 4))
        }
        _ => Err(malformed(path, "compact length too large")),
    }
}

/// Decode a `state_getStorage` result for `path`. `None` means the entry is unset.
pub fn decode(path: &QueryPath, bytes: Option<&[u8]>) -> Result<Value> {
    let Some(bytes) = bytes else {
        // Value-query items read as their default when unset.
        return Ok(match path {
            QueryPath::TotalIssuance
            | QueryPath::TreasuryBudget(Treasury::Council)
            | QueryPath::TreasuryBudgetIncrement
            | QueryPath::CouncilorRewardRate => Value::Balance(0),
            QueryPath::CouncilMembers => Value::Accounts(Vec::new()),
            _ => Value::Empty,
        });
    };

    Ok(match path {
        QueryPath::TotalIssuance
        | QueryPath::TreasuryBudget(_)
        | QueryPath::TreasuryBudgetIncrement
        | QueryPath::CouncilorRewardRate => Value::Balance(read_u128(path, bytes)?),
        QueryPath::AccountBalance(_) => {
            let data = bytes
                .get(ACCOUNT_INFO_FREE_OFFSET..)
                .ok_or_else(|| malformed(path, "truncated account info"))?;
            Value::Balance(read_u128(path, data)?)
        }
        QueryPath::BlockTimestamp => {
            let raw: [u8; 8] = bytes
                .get(..8)
                .and_then(|b| b.try_into().ok())
                .ok_or_else(|| malformed(path, "expected a u64 moment"))?;
            let millis = i64::try_from(u64::from_le_bytes(raw))
                .map_err(|_| malformed(path, "moment out of range"))?;
            Value::Moment(millis)
        }
        QueryPath::CouncilMembers => {
            let (count, offset) = read_compact(path, bytes)?;
            let entries = &bytes[offset..];
            if entries.len() != count * COUNCIL_MEMBER_LEN {
                return Err(malformed(
                    path,
                    format!("{} bytes for {} members", entries.len(), count),
                ));
            }
            Value::Accounts(
                entries
                    .chunks_exact(COUNCIL_MEMBER_LEN)
                    .map(|member| format!("0x{}", hex::encode(&member[..32])))
                    .collect(),
            )
        }
        QueryPath::CurrentHead => return Err(malformed(path, "not a storage item")),
    })
}

fn parse_hex_number(value: &Json) -> Result<u64> {
    let text = value
        .as_str()
        .ok_or_else(|| ReportError::malformed(SOURCE, "header number is not a string"))?;
    u64::from_str_radix(text.trim_start_matches("0x"), 16)
        .map_err(|e| ReportError::malformed(SOURCE, format!("header number {}: {}", text, e)))
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Json,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    result: Option<Json>,
    #[serde(default)]
    error: Option<RpcError>,
}

/// Turn a JSON-RPC response body into its `result`.
fn unwrap_envelope(method: &str, envelope: RpcEnvelope) -> Result<Json> {
    if let Some(error) = envelope.error {
        let message = format!("{} failed ({}): {}", method, error.code, error.message);
        let lower = error.message.to_lowercase();
        return Err(
            if lower.contains("discarded") || lower.contains("pruned") || lower.contains("unknown block") {
                ReportError::not_found(format!("state for {}", method))
            } else {
                ReportError::malformed(SOURCE, message)
            },
        );
    }
    Ok(envelope.result.unwrap_or(Json::Null))
}

/// Chain source backed by a node's HTTP JSON-RPC endpoint.
pub struct RpcChain {
    url: String,
    http_client: reqwest::Client,
    next_id: AtomicU64,
}

impl RpcChain {
    pub fn new(url: impl Into<String>, timeout_seconds: u64) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| {
                ReportError::InvalidArgument(format!("cannot build HTTP client: {}", e))
            })?;

        Ok(Self {
            url: url.into(),
            http_client,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call(&self, method: &str, params: Json) -> Result<Json> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        debug!("POST {} {} {}", self.url, method, request.params);

        let response = self
            .http_client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_transport_error(SOURCE, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("HTTP {}: {}", status, body);
            return Err(if is_retryable_status(status.as_u16()) {
                ReportError::unavailable(SOURCE, message)
            } else {
                ReportError::malformed(SOURCE, message)
            });
        }

        let envelope: RpcEnvelope = response
            .json()
            .await
            .map_err(|e| classify_transport_error(SOURCE, &e))?;
        unwrap_envelope(method, envelope)
    }

    async fn header_number(&self, params: Json) -> Result<Option<u64>> {
        match self.call("chain_getHeader", params).await? {
            Json::Null => Ok(None),
            header => parse_hex_number(&header["number"]).map(Some),
        }
    }
}

#[async_trait]
impl ChainSource for RpcChain {
    async fn block_hash(&self, number: u64) -> Result<Option<BlockHash>> {
        match self.call("chain_getBlockHash", json!([number])).await? {
            Json::Null => Ok(None),
            Json::String(hash) => Ok(Some(hash)),
            other => Err(ReportError::malformed(
                SOURCE,
                format!("chain_getBlockHash returned {}", other),
            )),
        }
    }

    async fn block_number(&self, hash: &BlockHash) -> Result<Option<u64>> {
        self.header_number(json!([hash])).await
    }

    async fn get(&self, at: Option<&BlockHash>, path: &QueryPath) -> Result<Value> {
        let Some(key) = storage_key(path)? else {
            return self
                .header_number(json!([]))
                .await?
                .map(Value::BlockNumber)
                .ok_or_else(|| ReportError::malformed(SOURCE, "node returned no best header"));
        };

        let key = format!("0x{}", hex::encode(key));
        let params = match at {
            Some(hash) => json!([key, hash]),
            None => json!([key]),
        };

        let bytes = match self.call("state_getStorage", params).await? {
            Json::Null => None,
            Json::String(data) => Some(
                hex::decode(data.trim_start_matches("0x"))
                    .map_err(|e| malformed(path, format!("bad hex: {}", e)))?,
            ),
            other => return Err(malformed(path, format!("unexpected result {}", other))),
        };
        decode(path, bytes.as_deref())
    }
}
