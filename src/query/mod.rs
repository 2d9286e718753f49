//! Query Module
//!
//! A mock query service and the fault-injection policy that gates it.
//!
//! ## Flow
//! ```text
//! request body ──► parse ──► ErrorState gate ──► statement / prepared
//!                              │ (fails)
//!                              ▼
//!                      {"errors":[{"msg","code"}]}
//! ```
//! When the gate fires, nothing behind it runs for that request.

mod error_state;
mod service;

pub use error_state::{ErrorState, ErrorStateConfig, RequestShape, STATEMENT_FIELD};
pub use service::{
    QueryResponse, QueryService, CODE_BAD_PLAN, CODE_INDEX_NOT_FOUND, CODE_KEYSPACE_NOT_FOUND,
    CODE_MISSING_FIELD, HTTP_BAD_REQUEST, HTTP_OK,
};
