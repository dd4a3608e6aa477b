//! # Oracle Shared Library
//!
//! Types and services shared by the Oracle API server and the generation
//! pipeline.
//!
//! ## Module Organization
//!
//! - `models`: accounts and artifacts, with their SQL
//! - `store`: storage traits plus PostgreSQL and in-memory backends
//! - `quota`: monthly generation limits and reservations
//! - `crypto`: at-rest encryption of artifact content
//! - `auth`: password hashing and sessions
//! - `db`: connection pool and migrations
//! - `redis`: optional Redis client for sessions and rate limiting

pub mod auth;
pub mod crypto;
pub mod db;
pub mod models;
pub mod quota;
pub mod redis;
pub mod store;

/// Current version of the Oracle shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
