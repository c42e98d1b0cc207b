//! GraphQL client for subgraphs served through the Playgrounds proxy.
//!
//! Each session builds its own HTTP client, discovers the `Swap` type's fields
//! with an introspection query, and pages through results with an `id_gt`
//! cursor. Transport failures are retried with exponential backoff (or the
//! server's `Retry-After`). A request that is still failing once its retries
//! are spent counts as one failure against the shared circuit breaker.

use super::circuit_breaker::CircuitBreaker;
use super::provider::{DataError, SubgraphClient, SubgraphSession};
use super::query::{SwapQuery, SWAP_ENTITY, SWAP_TYPE};
use super::table::SwapTable;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const PLAYGROUNDS_PROXY_URL: &str = "https://api.playgrounds.network/v1/proxy/deployments/id";

/// Uniswap V3 (Arbitrum One) deployment.
pub const DEFAULT_DEPLOYMENT_ID: &str = "QmQJovmQLigEwkMWGjMT8GbeS2gjDytqWCGL58BEhLu9Ag";

pub const API_KEY_HEADER: &str = "Playgrounds-Api-Key";

/// Largest page the hosted graph-node serves.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Where and how to reach a subgraph.
#[derive(Debug, Clone, PartialEq)]
pub struct SubgraphEndpoint {
    pub url: String,
    pub api_key: Option<String>,
}

impl SubgraphEndpoint {
    pub fn playgrounds(deployment_id: &str, api_key: Option<String>) -> Self {
        Self {
            url: format!("{PLAYGROUNDS_PROXY_URL}/{deployment_id}"),
            api_key,
        }
    }
}

/// Retry and paging knobs for a `PlaygroundsClient`.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub page_size: usize,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Upper bound on a server-requested `Retry-After` wait.
    pub max_retry_after: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            request_timeout: Duration::from_secs(60),
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_retry_after: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Serialize)]
struct GraphqlRequest<'a> {
    query: &'a str,
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    data: Option<Value>,
    errors: Option<Vec<GraphqlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct TypeIntrospection {
    #[serde(rename = "__type")]
    type_info: Option<IntrospectedType>,
}

#[derive(Debug, Deserialize)]
struct IntrospectedType {
    fields: Option<Vec<IntrospectedField>>,
}

#[derive(Debug, Deserialize)]
struct IntrospectedField {
    name: String,
}

/// Fields an entity type exposes, as reported by the subgraph.
#[derive(Debug, Clone)]
pub struct EntitySchema {
    pub type_name: String,
    pub fields: HashSet<String>,
}

impl EntitySchema {
    /// Reject queries that select a root field the entity doesn't define.
    pub fn check(&self, query: &SwapQuery) -> Result<(), DataError> {
        match query.fields.iter().find(|f| !self.fields.contains(f.root())) {
            Some(field) => Err(DataError::UnknownField {
                type_name: self.type_name.clone(),
                field: field.root().to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// Subgraph client for the Playgrounds GraphQL proxy.
pub struct PlaygroundsClient {
    endpoint: SubgraphEndpoint,
    circuit_breaker: Arc<CircuitBreaker>,
    options: ClientOptions,
}

impl PlaygroundsClient {
    pub fn new(
        endpoint: SubgraphEndpoint,
        circuit_breaker: Arc<CircuitBreaker>,
        options: ClientOptions,
    ) -> Self {
        Self {
            endpoint,
            circuit_breaker,
            options,
        }
    }

    pub fn endpoint(&self) -> &SubgraphEndpoint {
        &self.endpoint
    }
}

#[async_trait]
impl SubgraphClient for PlaygroundsClient {
    fn name(&self) -> &str {
        "playgrounds"
    }

    async fn open_session(&self) -> Result<Box<dyn SubgraphSession>, DataError> {
        let http = reqwest::Client::builder()
            .timeout(self.options.request_timeout)
            .build()
            .map_err(|e| DataError::NetworkUnreachable(format!("HTTP client: {e}")))?;

        let transport = GraphqlTransport {
            http,
            endpoint: self.endpoint.clone(),
            circuit_breaker: Arc::clone(&self.circuit_breaker),
            max_retries: self.options.max_retries,
            base_delay: self.options.base_delay,
            max_retry_after: self.options.max_retry_after,
        };
        let schema = transport.discover(SWAP_TYPE).await?;
        debug!(fields = schema.fields.len(), "discovered {SWAP_TYPE} schema");

        Ok(Box::new(PlaygroundsSession {
            transport,
            schema,
            page_size: self.options.page_size.max(1),
        }))
    }

    fn is_available(&self) -> bool {
        self.circuit_breaker.is_allowed()
    }
}

struct GraphqlTransport {
    http: reqwest::Client,
    endpoint: SubgraphEndpoint,
    circuit_breaker: Arc<CircuitBreaker>,
    max_retries: u32,
    base_delay: Duration,
    max_retry_after: Duration,
}

impl GraphqlTransport {
    async fn discover(&self, type_name: &str) -> Result<EntitySchema, DataError> {
        let query = format!("query {{ __type(name: \"{type_name}\") {{ fields {{ name }} }} }}");
        let data = self.execute(&query).await?;
        let introspection: TypeIntrospection = serde_json::from_value(data).map_err(|e| {
            DataError::ResponseFormatChanged(format!("introspection response: {e}"))
        })?;

        let fields = introspection
            .type_info
            .and_then(|t| t.fields)
            .ok_or_else(|| {
                DataError::ResponseFormatChanged(format!(
                    "type '{type_name}' not found in subgraph schema"
                ))
            })?;

        Ok(EntitySchema {
            type_name: type_name.to_string(),
            fields: fields.into_iter().map(|f| f.name).collect(),
        })
    }

    /// POST one GraphQL document and return its `data` member.
    ///
    /// Retries do not touch the breaker; only the request's final outcome is
    /// recorded.
    async fn execute(&self, query: &str) -> Result<Value, DataError> {
        if !self.circuit_breaker.is_allowed() {
            return Err(DataError::CircuitBreakerTripped);
        }

        let mut last_error: Option<DataError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = retry_delay(
                    self.base_delay,
                    self.max_retry_after,
                    attempt,
                    last_error.as_ref(),
                );
                tokio::time::sleep(delay).await;
                if !self.circuit_breaker.is_allowed() {
                    return Err(last_error.unwrap_or(DataError::CircuitBreakerTripped));
                }
            }

            match self.send(query).await {
                Ok(data) => {
                    self.circuit_breaker.record_success();
                    return Ok(data);
                }
                Err(e) if e.is_transient() => {
                    debug!(attempt, error = %e, "subgraph request failed, will retry");
                    last_error = Some(e);
                }
                Err(e @ DataError::AuthenticationRequired(_)) => {
                    self.circuit_breaker.trip();
                    return Err(e);
                }
                Err(e) => return Err(e),
            }
        }

        self.circuit_breaker.record_failure();
        Err(last_error.unwrap_or_else(|| DataError::NetworkUnreachable("max retries exceeded".into())))
    }

    async fn send(&self, query: &str) -> Result<Value, DataError> {
        let mut request = self
            .http
            .post(&self.endpoint.url)
            .json(&GraphqlRequest { query });
        if let Some(key) = &self.endpoint.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let resp = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DataError::NetworkUnreachable(format!("request timed out: {e}"))
            } else {
                DataError::NetworkUnreachable(e.to_string())
            }
        })?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(DataError::AuthenticationRequired(format!(
                "HTTP {status}: set PLAYGROUNDS_API_KEY or subgraph.api_key"
            )));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(DataError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            return Err(DataError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let body: GraphqlResponse = resp
            .json()
            .await
            .map_err(|e| DataError::ResponseFormatChanged(format!("GraphQL response body: {e}")))?;
        unwrap_data(body)
    }
}

/// Wait before retry `attempt` (1-based). A rate-limited response waits for
/// the server's `Retry-After`, capped at `max_retry_after`, but never less
/// than the backoff.
fn retry_delay(
    base: Duration,
    max_retry_after: Duration,
    attempt: u32,
    last_error: Option<&DataError>,
) -> Duration {
    let backoff = base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
    match last_error {
        Some(DataError::RateLimited { retry_after_secs }) => Duration::from_secs(*retry_after_secs)
            .min(max_retry_after)
            .max(backoff),
        _ => backoff,
    }
}

fn unwrap_data(body: GraphqlResponse) -> Result<Value, DataError> {
    if let Some(errors) = body.errors.filter(|errs| !errs.is_empty()) {
        let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
        return Err(DataError::Query(messages.join("; ")));
    }
    body.data
        .ok_or_else(|| DataError::ResponseFormatChanged("response has neither data nor errors".into()))
}

struct PlaygroundsSession {
    transport: GraphqlTransport,
    schema: EntitySchema,
    page_size: usize,
}

#[async_trait]
impl SubgraphSession for PlaygroundsSession {
    async fn query_swaps(&mut self, query: &SwapQuery) -> Result<SwapTable, DataError> {
        self.schema.check(query)?;

        let mut table = SwapTable::new(query.columns());
        let mut cursor: Option<String> = None;

        loop {
            // One row past the cap tells a full day apart from a truncated one.
            let remaining = query.first - table.len();
            let page_size = self.page_size.min(remaining.saturating_add(1));
            let document = query.render_page(cursor.as_deref(), page_size);
            let data = self.transport.execute(&document).await?;
            let records = page_records(&data)?;

            let (kept, truncated) = within_cap(records, remaining);
            table.extend_from_records(query, kept)?;
            if truncated {
                warn!(
                    rows = table.len(),
                    from = query.timestamp_gte,
                    to = query.timestamp_lte,
                    "row cap reached, later swaps in this window are missing"
                );
                return Ok(table);
            }
            if records.len() < page_size {
                return Ok(table);
            }
            cursor = Some(last_id(records)?);
        }
    }
}

/// Records that fit under the remaining row budget, and whether any were cut.
fn within_cap(records: &[Value], remaining: usize) -> (&[Value], bool) {
    if records.len() > remaining {
        (&records[..remaining], true)
    } else {
        (records, false)
    }
}

fn page_records(data: &Value) -> Result<&[Value], DataError> {
    data.get(SWAP_ENTITY)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .ok_or_else(|| DataError::ResponseFormatChanged(format!("'{SWAP_ENTITY}' is not a list")))
}

fn last_id(records: &[Value]) -> Result<String, DataError> {
    records
        .last()
        .and_then(|r| r.get("id"))
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| DataError::ResponseFormatChanged("record without string 'id'".into()))
}
