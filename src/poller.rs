//! Generic "wait until a condition holds" primitive.
//!
//! A [`Poller`] evaluates a probe immediately, then once per interval, until the
//! probe reports [`Probe::Done`], fails, or the budget runs out. Sleeps are fixed
//! (no backoff, no jitter) and race against an optional cancellation token.
//!
//! # Example
//!
//! ```ignore
//! let poller = Poller::new(PollConfig::from_secs(10, 1800)?);
//! let state = poller
//!     .wait("instance 1234", || async {
//!         let state = fetch_instance().await?;
//!         if state["ready"] == true {
//!             Ok(Probe::Done(state))
//!         } else {
//!             Ok(Probe::Pending(format!("ready={}", state["ready"])))
//!         }
//!     })
//!     .await?;
//! ```

use std::future::Future;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::PollConfig;
use crate::error::ProviderError;

/// Result of a single probe evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Probe<T> {
    /// The condition holds; stop waiting.
    Done(T),
    /// Not yet. Carries a description of what was observed, reported on timeout.
    Pending(String),
}

/// Waits for a probe to succeed within a [`PollConfig`] budget.
#[derive(Debug, Clone)]
pub struct Poller {
    config: PollConfig,
    cancel: CancellationToken,
}

impl Poller {
    /// Create a poller that is never cancelled externally.
    pub fn new(config: PollConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort waits when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// The poll configuration in use.
    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// The cancellation token observed by this poller.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Evaluate `probe` until it is done.
    ///
    /// # Returns
    /// * `Ok(T)` - the value carried by [`Probe::Done`]
    /// * `Err(ProviderError::Timeout)` - the budget ran out; carries the last observation
    /// * `Err(ProviderError::Cancelled)` - the cancellation token fired
    /// * `Err(e)` - the probe itself failed; no further evaluations happen
    pub async fn wait<T, F, Fut>(&self, label: &str, mut probe: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Probe<T>, ProviderError>>,
    {
        let start = Instant::now();
        let mut attempts = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                debug!(resource = %label, attempts, "Wait cancelled");
                return Err(ProviderError::Cancelled);
            }

            attempts += 1;
            match probe().await {
                Ok(Probe::Done(value)) => {
                    debug!(resource = %label, attempts, "Condition met");
                    return Ok(value);
                }
                Ok(Probe::Pending(observed)) => {
                    let waited = start.elapsed();
                    if waited >= self.config.timeout() {
                        warn!(
                            resource = %label,
                            attempts,
                            waited = ?waited,
                            last_observed = %observed,
                            "Wait timed out, outcome unknown"
                        );
                        return Err(ProviderError::Timeout {
                            waited,
                            last_observed: observed,
                        });
                    }

                    debug!(
                        resource = %label,
                        attempt = attempts,
                        observed = %observed,
                        "Condition not met, retrying"
                    );

                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => {
                            debug!(resource = %label, attempts, "Wait cancelled");
                            return Err(ProviderError::Cancelled);
                        }
                        _ = tokio::time::sleep(self.config.interval()) => {}
                    }
                }
                Err(e) => {
                    warn!(resource = %label, attempts, error = %e, "Probe failed");
                    return Err(e);
                }
            }
        }
    }
}
