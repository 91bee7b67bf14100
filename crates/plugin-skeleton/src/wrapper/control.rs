use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// What woke the supervisor loop up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Signal {
    Stop,
    Restart,
}

/// Stop and restart requests consumed by the supervisor loop.
///
/// Stop is one-shot and idempotent. Restart requests issued while the loop is
/// busy collapse into a single pending request; after a stop they are
/// rejected.
#[derive(Debug, Clone, Default)]
pub(crate) struct ControlSignals {
    stop: CancellationToken,
    restart: Arc<Notify>,
}

impl ControlSignals {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the wrapper is already stopped.
    pub(crate) fn request_restart(&self) -> bool {
        if self.stop.is_cancelled() {
            return false;
        }
        self.restart.notify_one();
        true
    }

    pub(crate) fn request_stop(&self) {
        self.stop.cancel();
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Waits for the next signal; stop wins when both are pending.
    pub(crate) async fn wait(&self) -> Signal {
        tokio::select! {
            biased;
            _ = self.stop.cancelled() => Signal::Stop,
            _ = self.restart.notified() => Signal::Restart,
        }
    }

    /// Sleeps for `duration`, returning `false` if a stop arrived meanwhile.
    pub(crate) async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.stop.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[tokio::test]
    async fn restarts_coalesce_into_one() {
        let control = ControlSignals::new();
        assert!(control.request_restart());
        assert!(control.request_restart());
        assert!(control.request_restart());

        assert_eq!(control.wait().await, Signal::Restart);
        let second = tokio::time::timeout(Duration::from_millis(50), control.wait()).await;
        assert!(second.is_err(), "only one restart should be pending");
    }

    #[tokio::test]
    async fn stop_wins_and_rejects_restart() {
        let control = ControlSignals::new();
        assert!(control.request_restart());
        control.request_stop();
        control.request_stop();

        assert!(control.is_stopped());
        assert_eq!(control.wait().await, Signal::Stop);
        assert!(!control.request_restart());
    }

    #[tokio::test]
    async fn sleep_is_cut_short_by_stop() {
        let control = ControlSignals::new();
        let stopper = control.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            stopper.request_stop();
        });

        let finished = tokio::time::timeout(
            Duration::from_secs(5),
            control.sleep(Duration::from_secs(60)),
        )
        .await
        .expect("stop interrupts the sleep");
        assert!(!finished);
        assert!(!control.sleep(Duration::from_millis(1)).await);
    }
}
