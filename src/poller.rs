//! Read-after-write wait for freshly created runs.
//!
//! Runs are persisted asynchronously after the stream completes, so a fetch
//! right after creation commonly returns 404. The poller retries *only* that
//! case; any other error, or a successful read, ends the loop at once.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::api::PlaygroundBackend;
use crate::clock::Sleeper;
use crate::error::ApiError;
use crate::types::{Run, TaskRef};

/// Default number of lookups before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
/// Default delay unit.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Bounds of the wait loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl PollerConfig {
    /// Delay slept after the 0-indexed `attempt` missed.
    ///
    /// The schedule grows every second attempt by half the base delay, with a
    /// 1ms floor: `1, 1, 250, 250, 500, 500, ...` for a 500ms base.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let step = self.base_delay / 2;
        (step * (attempt / 2)).max(Duration::from_millis(1))
    }
}

/// Result of waiting for a run.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Created(Run),
    /// The run never became readable. Its id is still valid.
    TimedOut,
}

/// Fetches a run until it stops 404-ing.
pub struct RunPoller {
    backend: Arc<dyn PlaygroundBackend>,
    sleeper: Arc<dyn Sleeper>,
    config: PollerConfig,
}

impl RunPoller {
    pub fn new(
        backend: Arc<dyn PlaygroundBackend>,
        sleeper: Arc<dyn Sleeper>,
        config: PollerConfig,
    ) -> Self {
        Self {
            backend,
            sleeper,
            config,
        }
    }

    pub fn config(&self) -> PollerConfig {
        self.config
    }

    pub async fn wait_until_created(
        &self,
        task: &TaskRef,
        run_id: &str,
    ) -> Result<PollOutcome, ApiError> {
        for attempt in 0..self.config.max_attempts {
            if let Some(run) = self.backend.fetch_run(task, run_id).await? {
                debug!(run_id, attempt, "run materialized");
                return Ok(PollOutcome::Created(run));
            }
            let delay = self.config.delay_for(attempt);
            debug!(run_id, attempt, delay_ms = delay.as_millis() as u64, "run not readable yet");
            self.sleeper.sleep(delay).await;
        }
        warn!(
            run_id,
            attempts = self.config.max_attempts,
            "run still not readable, continuing unconfirmed"
        );
        Ok(PollOutcome::TimedOut)
    }
}
