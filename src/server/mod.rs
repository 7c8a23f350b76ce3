// src/server/mod.rs

//! Server-side components for Keyward.
//!
//! This module contains:
//! - `database`  → SQL-backed `LicenseStore` over SQLite/Postgres
//! - `handlers`  → Axum HTTP handlers for the check and admin endpoints
//! - `routes`    → Router builder
//! - `api_error` → Fault responses (5xx, unreadable admin bodies)
//! - `logging`   → Request logging middleware and health payload

pub mod api_error;
pub mod database;
pub mod handlers;
pub mod logging;
pub mod routes;

pub use api_error::{ApiError, ErrorCode};
pub use database::Database;
pub use handlers::{
    check_handler, health_handler, issue_handler, list_handler, revoke_handler, AdminCredential,
    AppState, CheckRequest, IssueRequest, StatusResponse,
};
pub use logging::{request_logging_middleware, HealthResponse, REQUEST_ID_HEADER};
pub use routes::build_router;
