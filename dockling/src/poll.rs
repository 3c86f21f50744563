//! Cancellable naps between polling attempts.

use dockling_shared::{DocklingError, DocklingResult};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Sleep for `duration`, returning early with [`DocklingError::Cancelled`]
/// when `cancel` fires first.
pub async fn sleep(cancel: &CancellationToken, duration: Duration) -> DocklingResult<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DocklingError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn sleeps_when_not_cancelled() {
        let cancel = CancellationToken::new();
        let start = Instant::now();
        sleep(&cancel, Duration::from_millis(20)).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn returns_early_when_cancelled() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let err = sleep(&cancel, Duration::from_secs(30)).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn already_cancelled_token_wins() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(sleep(&cancel, Duration::from_secs(30)).await.is_err());
    }
}
