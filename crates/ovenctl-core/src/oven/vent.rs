//! Vent follow-up timer
//!
//! Moving the vent powers its compressor for a fixed time. The timer owns
//! the single pending "switch it off" action: scheduling a new one cancels
//! the previous one, and dropping the timer cancels whatever is pending.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::OvenError;

/// Time the vent compressor runs after an open/close command
pub const DEFAULT_VENT_ACTION_DELAY: Duration = Duration::from_secs(10);

struct Pending {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Single-slot cancellable delayed action
pub struct VentTimer {
    delay: Duration,
    pending: Option<Pending>,
}

impl VentTimer {
    /// Create a timer firing `delay` after each [`VentTimer::schedule`]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    /// Delay between scheduling and running the action
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `action` after the delay, replacing any pending action.
    ///
    /// Needs a tokio runtime; outside one the action cannot be scheduled and
    /// an actuator error is returned.
    pub fn schedule<F>(&mut self, action: F) -> Result<(), OvenError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.cancel();

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| OvenError::Actuator(format!("cannot schedule vent action: {e}")))?;

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let delay = self.delay;
        let handle = runtime.spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = tokio::time::sleep(delay) => action(),
            }
        });

        self.pending = Some(Pending { token, handle });
        Ok(())
    }

    /// Cancel the pending action, if any
    pub fn cancel(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.token.cancel();
        }
    }

    /// Whether an action is scheduled and has not run yet
    pub fn is_pending(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|p| !p.token.is_cancelled() && !p.handle.is_finished())
    }
}

impl Default for VentTimer {
    fn default() -> Self {
        Self::new(DEFAULT_VENT_ACTION_DELAY)
    }
}

impl Drop for VentTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
