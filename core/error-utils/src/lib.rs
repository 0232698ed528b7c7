use core::fmt;
use std::panic::Location;

use anyhow::anyhow;

/// Build an error carrying the caller location and log it at error level.
#[track_caller]
pub fn anyhow_error_and_log<S: AsRef<str> + fmt::Display>(msg: S) -> anyhow::Error {
    tracing::error!("Error in {}: {}", Location::caller(), msg);
    anyhow!("Error in {}: {}", Location::caller(), msg)
}

/// Same as [anyhow_error_and_log] but logged at warn level, for failures the caller recovers from.
#[track_caller]
pub fn anyhow_error_and_warn_log<S: AsRef<str> + fmt::Display>(msg: S) -> anyhow::Error {
    tracing::warn!("Warning in {}: {}", Location::caller(), msg);
    anyhow!("Warning in {}: {}", Location::caller(), msg)
}

/// Turn a best-effort result into an [Option].
///
/// The error is logged at warn level together with `context` and then dropped.
/// Used on paths where a failure must degrade to "nothing available"
/// instead of aborting the caller, e.g. cache reads and writes.
#[track_caller]
pub fn log_and_discard<T, E: fmt::Display>(res: Result<T, E>, context: &str) -> Option<T> {
    match res {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!("{context} ({}): {e}", Location::caller());
            None
        }
    }
}
