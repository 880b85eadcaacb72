//! A three-way wrapper over [`tokio::time::timeout`] so callers never have
//! to nest `Result<Result<T, E>, Elapsed>`.

use std::future::Future;
use std::time::Duration;

/// Outcome of racing a future against a deadline.
pub enum Timed<T, E> {
    Value(T),
    Err(E),
    TimedOut,
}

/// Run `fut` and report whether it finished within `duration`, finished
/// with an error, or timed out.
pub async fn timeout<T, E>(
    duration: Duration,
    fut: impl Future<Output = Result<T, E>>,
) -> Timed<T, E> {
    match tokio::time::timeout(duration, fut).await {
        Ok(Ok(value)) => Timed::Value(value),
        Ok(Err(err)) => Timed::Err(err),
        Err(_elapsed) => Timed::TimedOut,
    }
}
