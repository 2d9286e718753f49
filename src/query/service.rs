//! Mock query service
//!
//! Answers query-style requests with canned results. Recognised statements:
//!
//! - `prepare select mockrow`  a plan bound to the current index token
//! - `select mockrow`          one row, `{"row":"value"}`
//! - `select emptyrow`         no rows
//!
//! Anything else is "keyspace not found". A request without a statement is
//! prepared and must carry `prepared` and `encoded_plan`; the plan stays
//! valid until the index state is reset.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use parking_lot::RwLock;
use serde_json::{json, Map, Value};

use crate::error::Result;

use super::error_state::{ErrorState, ErrorStateConfig, STATEMENT_FIELD};

pub const HTTP_OK: u16 = 200;
pub const HTTP_BAD_REQUEST: u16 = 400;

pub const CODE_KEYSPACE_NOT_FOUND: i64 = 12003;
pub const CODE_MISSING_FIELD: i64 = 4040;
pub const CODE_BAD_PLAN: i64 = 4070;
pub const CODE_INDEX_NOT_FOUND: i64 = 5000;

/// What the service answers: an HTTP status and a JSON body
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResponse {
    pub status: u16,
    pub body: Value,
}

impl QueryResponse {
    fn rows(rows: Vec<Value>) -> Self {
        Self {
            status: HTTP_OK,
            body: json!({ "status": "success", "results": rows }),
        }
    }

    fn error(message: &str, code: i64) -> Self {
        Self {
            status: HTTP_OK,
            body: json!({ "errors": [{ "msg": message, "code": code }] }),
        }
    }

    fn bad_request(reason: String) -> Self {
        Self {
            status: HTTP_BAD_REQUEST,
            body: json!({ "errors": [{ "msg": reason }] }),
        }
    }

    /// The `errors` array, if the body has one
    pub fn errors(&self) -> Option<&Vec<Value>> {
        self.body.get("errors").and_then(Value::as_array)
    }

    /// The `results` array, if the body has one
    pub fn results(&self) -> Option<&Vec<Value>> {
        self.body.get("results").and_then(Value::as_array)
    }
}

/// Query endpoint of the mock
pub struct QueryService {
    /// Installed fault, shared read-only with in-flight requests
    error_state: RwLock<Option<Arc<ErrorState>>>,

    /// Stand-in for index identity; prepared plans embed it
    index_token: AtomicI32,
}

impl QueryService {
    pub fn new() -> Self {
        Self {
            error_state: RwLock::new(None),
            index_token: AtomicI32::new(rand::random()),
        }
    }

    // =========================================================================
    // Fault configuration
    // =========================================================================

    /// Install a fault, or clear it with `None`
    pub fn set_error_state(&self, state: Option<ErrorState>) {
        match &state {
            Some(s) => tracing::debug!(
                "Query fault installed: code={} regular={} prepared={}",
                s.code(),
                s.fail_regular(),
                s.fail_prepared()
            ),
            None => tracing::debug!("Query fault cleared"),
        }
        *self.error_state.write() = state.map(Arc::new);
    }

    pub fn error_state(&self) -> Option<Arc<ErrorState>> {
        self.error_state.read().clone()
    }

    /// Apply an administrative payload. Returns whether a fault is now
    /// installed.
    pub fn configure_error_state(&self, payload: &Value) -> Result<bool> {
        let config: ErrorStateConfig = serde_json::from_value(payload.clone())?;
        let state = config.into_state();
        let installed = state.is_some();
        self.set_error_state(state);
        Ok(installed)
    }

    /// Drop the simulated indexes; every prepared plan goes stale
    pub fn reset_index_state(&self) {
        let mut next: i32 = rand::random();
        let current = self.index_token.load(Ordering::Acquire);
        while next == current {
            next = rand::random();
        }
        self.index_token.store(next, Ordering::Release);
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Answer one request body
    pub fn handle(&self, body: &[u8]) -> QueryResponse {
        let request: Map<String, Value> = match serde_json::from_slice(body) {
            Ok(request) => request,
            Err(e) => {
                return QueryResponse::bad_request(format!("body is not a JSON object: {}", e))
            }
        };

        // The fault gate runs before anything else looks at the request
        if let Some(state) = self.error_state() {
            if state.should_return_error(&request) {
                tracing::trace!("Injecting query fault {}", state.code());
                return QueryResponse::error(state.message(), state.code());
            }
        }

        match request.get(STATEMENT_FIELD) {
            Some(Value::String(statement)) => self.handle_statement(statement),
            Some(other) => {
                QueryResponse::bad_request(format!("statement must be a string, got {}", other))
            }
            None => self.handle_prepared(&request),
        }
    }

    fn handle_statement(&self, statement: &str) -> QueryResponse {
        match statement.to_lowercase().as_str() {
            "prepare select mockrow" => {
                let token = self.index_token.load(Ordering::Acquire);
                let plan = json!({ "randomNumber": token }).to_string();
                let row = json!({
                    "randomNumber": token,
                    "encoded_plan": BASE64.encode(plan),
                    "name": format!("kvmock-plan-{}", rand::random::<u64>()),
                });
                QueryResponse::rows(vec![row])
            }
            "select mockrow" => QueryResponse::rows(vec![mock_row()]),
            "select emptyrow" => QueryResponse::rows(Vec::new()),
            _ => QueryResponse::error("keyspace not found", CODE_KEYSPACE_NOT_FOUND),
        }
    }

    fn handle_prepared(&self, request: &Map<String, Value>) -> QueryResponse {
        let name = request.get("prepared").and_then(Value::as_str);
        let encoded = request.get("encoded_plan").and_then(Value::as_str);
        let encoded = match (name, encoded) {
            (Some(_), Some(encoded)) => encoded,
            _ => return QueryResponse::error("missing field", CODE_MISSING_FIELD),
        };

        let token = BASE64
            .decode(encoded)
            .ok()
            .filter(|decoded| !decoded.is_empty())
            .and_then(|decoded| serde_json::from_slice::<Value>(&decoded).ok())
            .and_then(|plan| plan.get("randomNumber").and_then(Value::as_i64));

        match token {
            None => QueryResponse::error("could not decode base64", CODE_BAD_PLAN),
            Some(token) if token == i64::from(self.index_token.load(Ordering::Acquire)) => {
                QueryResponse::rows(vec![mock_row()])
            }
            Some(_) => QueryResponse::error(
                "index deleted or node hosting the index is down - cause: queryport.indexNotFound",
                CODE_INDEX_NOT_FOUND,
            ),
        }
    }
}

impl Default for QueryService {
    fn default() -> Self {
        Self::new()
    }
}

fn mock_row() -> Value {
    json!({ "row": "value" })
}
