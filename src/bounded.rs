use std::{future::Future, time::Duration};

use tokio_util::sync::CancellationToken;

/// Why an external call did not run to completion.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Interrupted {
    #[error("{step} timed out after {limit:?}")]
    TimedOut { step: &'static str, limit: Duration },

    #[error("{step} cancelled by shutdown")]
    Cancelled { step: &'static str },
}

/// Drive `fut` until it finishes, `limit` elapses or `cancel` fires, whichever comes first.
pub async fn bounded<F>(
    cancel: &CancellationToken,
    step: &'static str,
    limit: Duration,
    fut: F,
) -> Result<F::Output, Interrupted>
where
    F: Future,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Interrupted::Cancelled { step }),
        res = tokio::time::timeout(limit, fut) => {
            res.map_err(|_| Interrupted::TimedOut { step, limit })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn passes_through_the_output() {
        let cancel = CancellationToken::new();
        let out = bounded(&cancel, "noop", Duration::from_secs(1), async { 7 }).await;
        assert_eq!(out, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_slow_calls() {
        let cancel = CancellationToken::new();
        let limit = Duration::from_millis(50);
        let out = bounded(&cancel, "sleep", limit, tokio::time::sleep(Duration::from_secs(5))).await;
        assert_eq!(out, Err(Interrupted::TimedOut { step: "sleep", limit }));
    }

    #[tokio::test]
    async fn cancelled_token_wins() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let out = bounded(&cancel, "open", Duration::from_secs(5), std::future::pending::<()>()).await;
        assert_eq!(out, Err(Interrupted::Cancelled { step: "open" }));
    }
}
