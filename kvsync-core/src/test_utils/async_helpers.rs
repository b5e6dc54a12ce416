//! Async test helpers

use std::fmt;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvTimeoutError {
    Timeout,
    Closed,
}

impl fmt::Display for RecvTimeoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecvTimeoutError::Timeout => write!(f, "receive operation timed out"),
            RecvTimeoutError::Closed => write!(f, "channel closed"),
        }
    }
}

impl std::error::Error for RecvTimeoutError {}

/// Receive from an unbounded channel with a timeout
pub async fn recv_timeout<T>(
    rx: &mut mpsc::UnboundedReceiver<T>,
    duration: Duration,
) -> Result<T, RecvTimeoutError> {
    timeout(duration, rx.recv())
        .await
        .map_err(|_| RecvTimeoutError::Timeout)?
        .ok_or(RecvTimeoutError::Closed)
}

/// Poll `condition` until it holds, panicking after `limit`
pub async fn wait_for(condition: impl Fn() -> bool, limit: Duration) {
    let deadline = Instant::now() + limit;
    while !condition() {
        if Instant::now() >= deadline {
            panic!("condition not met within {:?}", limit);
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recv_timeout() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(7).unwrap();
        assert_eq!(recv_timeout(&mut rx, Duration::from_millis(50)).await, Ok(7));
        assert_eq!(
            recv_timeout(&mut rx, Duration::from_millis(10)).await,
            Err(RecvTimeoutError::Timeout)
        );

        drop(tx);
        assert_eq!(recv_timeout(&mut rx, Duration::from_millis(10)).await, Err(RecvTimeoutError::Closed));
    }

    #[tokio::test]
    async fn test_wait_for_returns_when_true() {
        wait_for(|| true, Duration::from_millis(10)).await;
    }
}
