//! One structured event per service operation.
//!
//! Every event carries `operation`, `key` and `outcome`; failures add
//! `error_kind` and `error`. Client errors log at `warn`, system errors at
//! `error`.

use core::fmt::Display;

use forgepay_core::DomainResult;

/// Emit the outcome of `operation` on the record identified by `key`.
pub fn record_outcome<T>(operation: &'static str, key: &dyn Display, result: &DomainResult<T>) {
    match result {
        Ok(_) => tracing::info!(operation, key = %key, outcome = "ok", "operation completed"),
        Err(err) if err.is_client_error() => tracing::warn!(
            operation,
            key = %key,
            outcome = "rejected",
            error_kind = err.kind(),
            error = %err,
            "operation rejected"
        ),
        Err(err) => tracing::error!(
            operation,
            key = %key,
            outcome = "failed",
            error_kind = err.kind(),
            error = %err,
            "operation failed"
        ),
    }
}
