/// Database models for Oracle
///
/// - `account`: login identities, tiers and the monthly generation counter
/// - `artifact`: generated content, owned by one account
///
/// Each model carries its own queries as associated functions taking a
/// `&PgPool`; the [`store`](crate::store) traits wrap them for callers that
/// must also run against the in-memory backend.

pub mod account;
pub mod artifact;
