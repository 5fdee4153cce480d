use std::{fmt::Display, time::Duration};

use futures::Future;
use thiserror::Error;
use tokio::{select, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("wait was cancelled")]
pub struct Cancelled;

/// Runs `op` up to `times` times, waiting `spacing` between failed attempts.
/// Returns the first success or the last error.
pub async fn retry_async<F, Fut, T, E>(
    times: usize,
    spacing: Option<Duration>,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let times = times.max(1);
    let mut tries = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if tries < times => {
                warn!("attempt {tries}/{times} failed: {err}");

                if let Some(spacing) = spacing {
                    tokio::time::sleep(spacing).await;
                }

                tries += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Sleeps for `duration` unless `cancel` fires first.
pub async fn sleep_or_cancel(
    duration: Duration,
    cancel: &CancellationToken,
) -> Result<(), Cancelled> {
    sleep_until_or_cancel(Instant::now() + duration, cancel).await
}

/// Sleeps until `deadline` unless `cancel` fires first. A deadline in the past
/// returns immediately, but a token that is already cancelled always wins.
pub async fn sleep_until_or_cancel(
    deadline: Instant,
    cancel: &CancellationToken,
) -> Result<(), Cancelled> {
    if cancel.is_cancelled() {
        return Err(Cancelled);
    }

    select! {
        biased;
        _ = cancel.cancelled() => Err(Cancelled),
        _ = tokio::time::sleep_until(deadline) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sleep_runs_to_completion_without_cancel() {
        let cancel = CancellationToken::new();
        let start = Instant::now();

        assert_eq!(sleep_or_cancel(Duration::from_secs(3), &cancel).await, Ok(()));
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_stops_early_when_cancelled() {
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        assert_eq!(
            sleep_or_cancel(Duration::from_secs(30), &cancel).await,
            Err(Cancelled)
        );
        assert!(start.elapsed() < Duration::from_secs(30));
    }

    #[tokio::test]
    async fn cancelled_token_beats_elapsed_deadline() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let past = Instant::now() - Duration::from_millis(5);
        assert_eq!(sleep_until_or_cancel(past, &cancel).await, Err(Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_stops_at_first_success() {
        let attempts = AtomicUsize::new(0);
        let attempts = &attempts;

        let result: Result<usize, String> = retry_async(5, Some(Duration::from_secs(1)), move || async move {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(format!("attempt {n} failed"))
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_returns_last_error() {
        let attempts = AtomicUsize::new(0);
        let attempts = &attempts;

        let result: Result<(), String> = retry_async(2, None, move || async move {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            Err(format!("attempt {n} failed"))
        })
        .await;

        assert_eq!(result, Err("attempt 2 failed".to_string()));
    }
}
