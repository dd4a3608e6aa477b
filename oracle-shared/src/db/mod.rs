/// Database layer for Oracle
///
/// - `pool`: PostgreSQL connection pool with a startup health probe
/// - `migrations`: embedded schema migrations for accounts and artifacts
///
/// Row types and their queries live in the `models` module; the storage
/// traits the rest of the system depends on live in `store`.

pub mod migrations;
pub mod pool;
