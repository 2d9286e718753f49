//! Fault-injection policy
//!
//! Decides, per query request, whether to answer with a synthetic error
//! instead of running the request. The decision depends on one fact about
//! the request: whether it carries a `statement` field.
//!
//! ```text
//! statement present  ──►  regular   ──►  fail_regular
//! statement absent   ──►  prepared  ──►  fail_prepared
//! ```

use serde::Deserialize;
use serde_json::{Map, Value};

/// Field whose presence marks a regular (non-prepared) request
pub const STATEMENT_FIELD: &str = "statement";

/// The one fact about a request the policy looks at
pub trait RequestShape {
    fn has_statement(&self) -> bool;
}

impl RequestShape for Map<String, Value> {
    fn has_statement(&self) -> bool {
        self.contains_key(STATEMENT_FIELD)
    }
}

impl RequestShape for Value {
    fn has_statement(&self) -> bool {
        self.as_object().is_some_and(|m| m.has_statement())
    }
}

/// An installed fault. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorState {
    message: String,
    code: i64,
    fail_regular: bool,
    fail_prepared: bool,
}

impl ErrorState {
    pub fn new(
        message: impl Into<String>,
        code: i64,
        fail_regular: bool,
        fail_prepared: bool,
    ) -> Self {
        Self {
            message: message.into(),
            code,
            fail_regular,
            fail_prepared,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn code(&self) -> i64 {
        self.code
    }

    pub fn fail_regular(&self) -> bool {
        self.fail_regular
    }

    pub fn fail_prepared(&self) -> bool {
        self.fail_prepared
    }

    /// Whether `request` gets the synthetic error
    pub fn should_return_error<R: RequestShape + ?Sized>(&self, request: &R) -> bool {
        if request.has_statement() {
            self.fail_regular
        } else {
            self.fail_prepared
        }
    }
}

fn default_true() -> bool {
    true
}

/// Administrative payload that installs or clears a fault
///
/// Without both `message` and `code` the payload clears the policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ErrorStateConfig {
    pub message: Option<String>,
    pub code: Option<i64>,

    #[serde(default = "default_true")]
    pub fail_regular: bool,

    #[serde(default = "default_true")]
    pub fail_prepared: bool,
}

impl ErrorStateConfig {
    /// The state this payload installs, or `None` for a reset
    pub fn into_state(self) -> Option<ErrorState> {
        match (self.message, self.code) {
            (Some(message), Some(code)) => Some(ErrorState::new(
                message,
                code,
                self.fail_regular,
                self.fail_prepared,
            )),
            _ => None,
        }
    }
}
