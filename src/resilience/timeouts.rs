//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap counter-store and backing-store calls with a deadline
//! - Cancel the wrapped future cleanly when the deadline passes
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - A missing deadline means "wait as long as the call takes"
//! - Callers decide what an elapsed deadline means (breaker failure, store error)

use std::future::Future;
use std::time::Duration;

/// Marker returned when a deadline elapsed before the call finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elapsed(pub Duration);

/// Await `fut`, giving up after `after` when a deadline is set.
pub async fn within<F>(after: Option<Duration>, fut: F) -> Result<F::Output, Elapsed>
where
    F: Future,
{
    match after {
        Some(after) => tokio::time::timeout(after, fut).await.map_err(|_| Elapsed(after)),
        None => Ok(fut.await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deadline_elapses() {
        let result = within(Some(Duration::from_millis(10)), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            1
        })
        .await;
        assert_eq!(result, Err(Elapsed(Duration::from_millis(10))));
    }

    #[tokio::test]
    async fn test_no_deadline_waits() {
        let result = within(None, async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            7
        })
        .await;
        assert_eq!(result, Ok(7));
    }
}
