use tokio::task::AbortHandle;

/// Scheduling handle of one streaming stream.
///
/// Holds the recurring ticker task. Every in-flight part runs inside the
/// ticker's `JoinSet` together with its watchdog, so aborting the ticker
/// cancels the recurring trigger and all watchdogs at once. Dropping the
/// handle aborts as well.
pub struct StreamTimers {
    ticker: AbortHandle,
}

impl StreamTimers {
    pub(crate) fn new(ticker: AbortHandle) -> Self {
        Self { ticker }
    }

    pub fn cancel(&self) {
        self.ticker.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.ticker.is_finished()
    }
}

impl Drop for StreamTimers {
    fn drop(&mut self) {
        self.ticker.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_drop_aborts_ticker() {
        let task = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        let timers = StreamTimers::new(task.abort_handle());
        assert!(!timers.is_finished());

        drop(timers);
        let err = task.await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
