//! Per-call cancellation.
//!
//! A call's token is a child of the service shutdown token and, when the
//! client sent a `grpc-timeout` header, is also cancelled once that deadline
//! elapses. The returned [`DropGuard`] cancels the token when the call ends,
//! which also retires its deadline timer.

use core::time::Duration;
use tokio_util::sync::{CancellationToken, DropGuard};
use tonic::metadata::MetadataMap;

const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";

/// Parses a `grpc-timeout` value: at most eight ASCII digits followed by one
/// of the units `H`, `M`, `S`, `m`, `u` or `n`.
pub fn parse_grpc_timeout(value: &str) -> Option<Duration> {
    if value.len() < 2 {
        return None;
    }
    let (digits, unit) = value.split_at(value.len() - 1);
    if digits.len() > 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: u64 = digits.parse().ok()?;

    match unit {
        "H" => Some(Duration::from_secs(amount * 60 * 60)),
        "M" => Some(Duration::from_secs(amount * 60)),
        "S" => Some(Duration::from_secs(amount)),
        "m" => Some(Duration::from_millis(amount)),
        "u" => Some(Duration::from_micros(amount)),
        "n" => Some(Duration::from_nanos(amount)),
        _ => None,
    }
}

/// Reads the client deadline from request metadata, if any.
pub fn request_deadline(metadata: &MetadataMap) -> Option<Duration> {
    metadata
        .get(GRPC_TIMEOUT_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_grpc_timeout)
}

/// Derives the cancellation token for one call.
///
/// Must be called from within a Tokio runtime when `deadline` is set.
pub fn call_token(
    parent: CancellationToken,
    deadline: Option<Duration>,
) -> (CancellationToken, DropGuard) {
    let token = parent.child_token();

    if let Some(deadline) = deadline {
        let timer = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = timer.cancelled() => {}
                () = tokio::time::sleep(deadline) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Call deadline of {deadline:?} elapsed");
                    timer.cancel();
                }
            }
        });
    }

    let guard = token.clone().drop_guard();
    (token, guard)
}
