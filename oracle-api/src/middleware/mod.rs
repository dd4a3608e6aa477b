/// Middleware modules for the API server
///
/// - `session`: session gate and cookie helpers
/// - `rate_limit`: per-IP token buckets
/// - `security`: security headers
/// - `errors`: 5xx logging and HTML error pages

pub mod errors;
pub mod rate_limit;
pub mod security;
pub mod session;
