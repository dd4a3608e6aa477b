/// Model-call timeout policy
///
/// Every generation bounds the model phase (the buffered call, or the whole
/// stream until its last fragment) by one deadline. Configured values are
/// clamped into [`MIN_MODEL_TIMEOUT`, `MAX_MODEL_TIMEOUT`].

use std::time::Duration;

/// Used when nothing is configured (2 minutes)
pub const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(120);

pub const MIN_MODEL_TIMEOUT: Duration = Duration::from_secs(5);

/// 10 minutes
pub const MAX_MODEL_TIMEOUT: Duration = Duration::from_secs(600);

/// Converts a configured number of seconds into a usable timeout
pub fn model_timeout_from_secs(secs: Option<u64>) -> Duration {
    match secs {
        Some(secs) => Duration::from_secs(secs).clamp(MIN_MODEL_TIMEOUT, MAX_MODEL_TIMEOUT),
        None => DEFAULT_MODEL_TIMEOUT,
    }
}
