//! Keyward - license validation and issuance with first-machine binding
//!
//! A license is a key with an expiry. The first machine to check a license
//! claims it; every later check must come from the same machine.
//!
//! # Features
//!
//! - `server` - HTTP surface and SQL-backed store. Enabled by default.
//! - `sqlite` - SQLite database backend. Enabled by default.
//! - `postgres` - PostgreSQL database backend.
//!
//! # Example
//!
//! ```toml
//! # Use defaults (server + sqlite)
//! keyward = "0.1"
//!
//! # Core only: authority, in-memory store, no HTTP
//! keyward = { version = "0.1", default-features = false }
//!
//! # Server with PostgreSQL
//! keyward = { version = "0.1", features = ["server", "postgres"] }
//! ```

// Core modules (always available)
pub mod authority;
pub mod clock;
pub mod config;
pub mod credential;
pub mod errors;
pub mod events;
pub mod license;
pub mod store;
pub mod validation;

// Server-related modules (requires "server" feature)
#[cfg(feature = "server")]
#[path = "server/mod.rs"]
pub mod server;

pub use authority::{
    Admin, AdminAccess, Authority, IssueOutcome, RevokeOutcome, ValidationOutcome,
};
pub use clock::{Clock, SystemClock};
pub use credential::AdminSecret;
pub use errors::{LicenseError, LicenseResult};
pub use license::License;
pub use store::{BindOutcome, LicenseStore, MemoryStore};
