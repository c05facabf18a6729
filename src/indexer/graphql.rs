//! GraphQL query-node client.
//!
//! Translates a [`QueryName`] + [`FilterSpec`] into a query-node document and
//! `where` input, and reshapes the answer into the record contracts defined in
//! the parent module.

use super::{FilterSpec, IndexerResponse, IndexerSource, NumericField, QueryName, QueryShape, TimeBound};
use crate::error::{ReportError, Result};
use crate::retry::{classify_transport_error, is_retryable_status};
use async_trait::async_trait;
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::debug;

const SOURCE: &str = "indexer";

/// Root field and `where` input type of each query.
fn schema(query: QueryName) -> (&'static str, &'static str) {
    match query {
        QueryName::Videos => ("videosConnection", "VideoWhereInput"),
        QueryName::Channels => ("channelsConnection", "ChannelWhereInput"),
        QueryName::Memberships => ("membershipsConnection", "MembershipWhereInput"),
        QueryName::NftIssued => ("nftIssuedEventsConnection", "NftIssuedEventWhereInput"),
        QueryName::ForumThreads => ("forumThreadsConnection", "ForumThreadWhereInput"),
        QueryName::ForumPosts => ("forumPostsConnection", "ForumPostWhereInput"),
        QueryName::WorkingGroupOpenings => (
            "workingGroupOpeningsConnection",
            "WorkingGroupOpeningWhereInput",
        ),
        QueryName::WorkingGroupApplications => (
            "workingGroupApplicationsConnection",
            "WorkingGroupApplicationWhereInput",
        ),
        QueryName::BudgetSpending => ("budgetSpendingEvents", "BudgetSpendingEventWhereInput"),
        QueryName::BudgetRefills => ("budgetUpdatedEvents", "BudgetUpdatedEventWhereInput"),
        QueryName::FundingRequestsPaid => ("requestFundedEvents", "RequestFundedEventWhereInput"),
        QueryName::Proposals => ("proposals", "ProposalWhereInput"),
        QueryName::WorkingGroups => ("workingGroups", "WorkingGroupWhereInput"),
        QueryName::ElectedCouncils => ("electedCouncils", "ElectedCouncilWhereInput"),
    }
}

const WORKER_FIELDS: &str = "id isLead rewardPerBlock membership { boundAccounts }";

/// Selection set for list queries.
fn selection(query: QueryName) -> String {
    match query {
        QueryName::BudgetSpending | QueryName::FundingRequestsPaid => "amount createdAt".to_string(),
        QueryName::BudgetRefills => "budgetChangeAmount createdAt".to_string(),
        QueryName::Proposals => {
            "id title status { __typename } createdAt councilApprovals".to_string()
        }
        QueryName::WorkingGroups => format!(
            "id leader {{ {w} }} workers(where: {{ status_json: {{ isTypeOf_eq: \"WorkerStatusActive\" }} }}) {{ {w} }}",
            w = WORKER_FIELDS
        ),
        QueryName::ElectedCouncils => "id electedAtBlock endedAtBlock".to_string(),
        _ => String::new(),
    }
}

/// Build the GraphQL document for `query`.
pub fn document(query: QueryName) -> String {
    let (root, where_type) = schema(query);
    match query.shape() {
        QueryShape::Count => format!(
            "query Count($where: {}) {{ {}(where: $where, orderBy: [id_ASC]) {{ totalCount }} }}",
            where_type, root
        ),
        QueryShape::List => format!(
            "query List($where: {}, $offset: Int, $limit: Int) {{ {}(where: $where, offset: $offset, limit: $limit, orderBy: [createdAt_ASC]) {{ {} }} }}",
            where_type,
            root,
            selection(query)
        ),
    }
}

fn timestamp(bound: &TimeBound) -> Value {
    Value::String(bound.at.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Build the `where` input for `filter`.
pub fn where_clause(query: QueryName, filter: &FilterSpec) -> Value {
    let mut clause = Map::new();

    if let Some(lower) = &filter.lower {
        let key = if lower.inclusive { "createdAt_gte" } else { "createdAt_gt" };
        clause.insert(key.to_string(), timestamp(lower));
    }
    if let Some(upper) = &filter.upper {
        let key = if upper.inclusive { "createdAt_lte" } else { "createdAt_lt" };
        clause.insert(key.to_string(), timestamp(upper));
    }
    if let Some(id) = &filter.id {
        clause.insert("id_eq".to_string(), json!(id));
    }
    if let Some(group_id) = &filter.group_id {
        clause.insert("group".to_string(), json!({ "id_eq": group_id }));
    }
    if let Some(accounts) = &filter.accounts {
        // The query node spells the spending recipient column "reciever".
        let key = match query {
            QueryName::BudgetSpending => "reciever_in",
            _ => "account_in",
        };
        clause.insert(key.to_string(), json!(accounts));
    }
    for threshold in &filter.thresholds {
        let key = match threshold.field {
            NumericField::TotalVideosCreated => "totalVideosCreated_gt",
        };
        clause.insert(key.to_string(), json!(threshold.greater_than));
    }

    Value::Object(clause)
}

#[derive(Debug, Serialize)]
struct GraphQlRequest {
    query: String,
    variables: Value,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

/// `ProposalStatusExecutionFailed` -> `executionFailed`
fn status_name(typename: &str) -> String {
    let bare = typename.trim_start_matches("ProposalStatus");
    let mut chars = bare.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn reshape_worker(worker: &Value) -> Value {
    json!({
        "id": worker["id"],
        "isLead": worker["isLead"],
        "rewardPerBlock": worker["rewardPerBlock"],
        "boundAccounts": worker["membership"]["boundAccounts"],
    })
}

/// Map one query-node item onto the record contract for `query`.
fn reshape(query: QueryName, item: Value) -> Value {
    match query {
        QueryName::BudgetRefills => json!({
            "amount": item["budgetChangeAmount"],
            "createdAt": item["createdAt"],
        }),
        QueryName::Proposals => json!({
            "id": item["id"],
            "title": item["title"],
            "status": item["status"]["__typename"].as_str().map(status_name),
            "createdAt": item["createdAt"],
            "councilApprovals": item["councilApprovals"],
        }),
        QueryName::WorkingGroups => {
            let leader = match &item["leader"] {
                Value::Null => Value::Null,
                lead => reshape_worker(lead),
            };
            let workers: Vec<Value> = item["workers"]
                .as_array()
                .map(|ws| ws.iter().map(reshape_worker).collect())
                .unwrap_or_default();
            json!({ "id": item["id"], "leader": leader, "workers": workers })
        }
        _ => item,
    }
}

/// Indexer backed by a GraphQL query node over HTTP.
pub struct GraphQlIndexer {
    url: String,
    http_client: reqwest::Client,
}

impl GraphQlIndexer {
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
        })
    }

    async fn post(&self, request: &GraphQlRequest) -> Result<Value> {
        let response = self
            .http_client
            .post(&self.url)
            .json(request)
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

        let parsed: GraphQlResponse = response
            .json()
            .await
            .map_err(|e| classify_transport_error(SOURCE, &e))?;

        if let Some(errors) = parsed.errors.filter(|errors| !errors.is_empty()) {
            let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            return Err(ReportError::malformed(SOURCE, messages.join("; ")));
        }

        parsed
            .data
            .ok_or_else(|| ReportError::malformed(SOURCE, "response has no data"))
    }
}

/// Pull the count or item list for `query` out of a `data` object.
pub fn extract(query: QueryName, data: &Value) -> Result<IndexerResponse> {
    let (root, _) = schema(query);
    let node = &data[root];

    match query.shape() {
        QueryShape::Count => node["totalCount"]
            .as_u64()
            .map(|total_count| IndexerResponse::Count { total_count })
            .ok_or_else(|| {
                ReportError::malformed(SOURCE, format!("{}.totalCount missing", root))
            }),
        QueryShape::List => {
            let items = node
                .as_array()
                .ok_or_else(|| ReportError::malformed(SOURCE, format!("{} is not a list", root)))?;
            Ok(IndexerResponse::List {
                items: items.iter().cloned().map(|item| reshape(query, item)).collect(),
            })
        }
    }
}

#[async_trait]
impl IndexerSource for GraphQlIndexer {
    async fn execute(&self, query: QueryName, filter: &FilterSpec) -> Result<IndexerResponse> {
        let mut variables = json!({ "where": where_clause(query, filter) });
        if query.shape() == QueryShape::List {
            variables["offset"] = json!(filter.offset);
            variables["limit"] = json!(filter.limit);
        }

        debug!("POST {} {} {}", self.url, query, variables);
        let request = GraphQlRequest {
            query: document(query),
            variables,
        };

        let data = self.post(&request).await?;
        extract(query, &data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::{BudgetChangeEvent, ProposalRecord, WorkingGroupRecord};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_where_clause_mapping() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap();
        let filter = FilterSpec::new()
            .created_from(start)
            .created_before(end)
            .for_accounts(vec!["5Abc".into()])
            .in_group("storageWorkingGroup");

        let clause = where_clause(QueryName::BudgetSpending, &filter);
        assert_eq!(clause["createdAt_gte"], "2024-01-01T00:00:00.000Z");
        assert_eq!(clause["createdAt_lt"], "2024-01-08T00:00:00.000Z");
        assert_eq!(clause["reciever_in"], json!(["5Abc"]));
        assert_eq!(clause["group"]["id_eq"], "storageWorkingGroup");

        let funded = where_clause(QueryName::FundingRequestsPaid, &filter);
        assert_eq!(funded["account_in"], json!(["5Abc"]));
    }

    #[test]
    fn test_threshold_mapping() {
        let filter = FilterSpec::new().with_threshold(NumericField::TotalVideosCreated, 0);
        let clause = where_clause(QueryName::Channels, &filter);
        assert_eq!(clause["totalVideosCreated_gt"], 0);
    }

    #[test]
    fn test_documents() {
        let count = document(QueryName::Videos);
        assert!(count.contains("videosConnection(where: $where"));
        assert!(count.contains("totalCount"));

        let list = document(QueryName::BudgetRefills);
        assert!(list.contains("budgetUpdatedEvents("));
        assert!(list.contains("budgetChangeAmount"));
        assert!(list.contains("$limit: Int"));
    }

    #[test]
    fn test_extract_count() {
        let data = json!({ "membershipsConnection": { "totalCount": 812 } });
        assert_eq!(
            extract(QueryName::Memberships, &data).unwrap(),
            IndexerResponse::Count { total_count: 812 }
        );

        let err = extract(QueryName::Videos, &data).unwrap_err();
        assert!(matches!(err, ReportError::MalformedResponse { .. }));
    }

    #[test]
    fn test_extract_reshapes_into_contracts() {
        let data = json!({
            "proposals": [{
                "id": "12",
                "title": "Fund the forum",
                "status": { "__typename": "ProposalStatusExecutionFailed" },
                "createdAt": "2024-01-03T12:00:00.000Z",
                "councilApprovals": 2
            }],
            "budgetUpdatedEvents": [
                { "budgetChangeAmount": "5000", "createdAt": "2024-01-03T12:00:00.000Z" },
                { "budgetChangeAmount": "-5000", "createdAt": "2024-01-04T12:00:00.000Z" }
            ],
            "workingGroups": [{
                "id": "contentWorkingGroup",
                "leader": { "id": "l", "isLead": true, "rewardPerBlock": "10", "membership": { "boundAccounts": ["5L"] } },
                "workers": [{ "id": "w", "isLead": false, "rewardPerBlock": "3", "membership": { "boundAccounts": [] } }]
            }]
        });

        let IndexerResponse::List { items } = extract(QueryName::Proposals, &data).unwrap() else {
            panic!("expected list");
        };
        let proposal: ProposalRecord = serde_json::from_value(items[0].clone()).unwrap();
        assert_eq!(proposal.status.to_string(), "executionFailed");

        let IndexerResponse::List { items } = extract(QueryName::BudgetRefills, &data).unwrap() else {
            panic!("expected list");
        };
        let refill: BudgetChangeEvent = serde_json::from_value(items[0].clone()).unwrap();
        assert_eq!(refill.amount, 5000);
        let cut: BudgetChangeEvent = serde_json::from_value(items[1].clone()).unwrap();
        assert_eq!(cut.amount, -5000);

        let IndexerResponse::List { items } = extract(QueryName::WorkingGroups, &data).unwrap() else {
            panic!("expected list");
        };
        let group: WorkingGroupRecord = serde_json::from_value(items[0].clone()).unwrap();
        assert_eq!(group.leader.unwrap().bound_accounts, vec!["5L".to_string()]);
        assert_eq!(group.workers[0].reward_per_block, 3);
    }

    #[test]
    fn test_status_name() {
        assert_eq!(status_name("ProposalStatusDeciding"), "deciding");
        assert_eq!(status_name("ProposalStatusCanceledByRuntime"), "canceledByRuntime");
    }
}
