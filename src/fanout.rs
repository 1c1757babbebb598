// src/fanout.rs
// Runs one query against many targets concurrently and keeps every outcome

use futures::stream::{self, StreamExt};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::FanOutConfig;
use crate::errors::ApiError;
use crate::inventory::Target;

#[derive(Debug, Clone, PartialEq)]
pub struct TargetFailure {
    pub target: Target,
    pub error: ApiError,
}

/// Outcome of one fan-out. Every target handed to [`FanOut::query`] lands in
/// exactly one of the two lists, both ordered by target.
#[derive(Debug)]
pub struct FanOutResult<T> {
    pub succeeded: Vec<(Target, T)>,
    pub failed: Vec<TargetFailure>,
}

impl<T> FanOutResult<T> {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// True when there were targets and none of them answered.
    pub fn all_failed(&self) -> bool {
        self.succeeded.is_empty() && !self.failed.is_empty()
    }

    pub fn failure_summary(&self) -> String {
        self.failed
            .iter()
            .map(|failure| format!("{}: {}", failure.target, failure.error))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn into_values(self) -> impl Iterator<Item = T> {
        self.succeeded.into_iter().map(|(_, value)| value)
    }
}

#[derive(Debug, Clone)]
pub struct FanOut {
    max_concurrency: usize,
    target_timeout: Duration,
}

impl FanOut {
    pub fn new(max_concurrency: usize, target_timeout: Duration) -> Self {
        FanOut {
            max_concurrency: max_concurrency.max(1),
            target_timeout,
        }
    }

    pub fn from_config(config: &FanOutConfig) -> Self {
        FanOut::new(config.max_concurrency, Duration::from_millis(config.target_timeout_ms))
    }

    /// Queries every target with at most `max_concurrency` requests in flight.
    /// A failing or timed-out target is recorded and never cancels its
    /// siblings. Each task owns its own result slot; slots are put back in
    /// target order after all of them finished.
    pub async fn query<T, F, Fut>(&self, mut targets: Vec<Target>, fetch: F) -> FanOutResult<T>
    where
        F: Fn(Target) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        targets.sort();
        let target_count = targets.len();
        let timeout = self.target_timeout;
        let fetch = &fetch;

        let mut slots: Vec<(usize, Target, Result<T, ApiError>)> = stream::iter(targets.into_iter().enumerate())
            .map(|(slot, target)| async move {
                let outcome = match tokio::time::timeout(timeout, fetch(target.clone())).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(ApiError::Timeout {
                        target: target.to_string(),
                        timeout_ms: timeout.as_millis() as u64,
                    }),
                };
                (slot, target, outcome)
            })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;
        slots.sort_by_key(|(slot, _, _)| *slot);

        let mut result = FanOutResult {
            succeeded: Vec::with_capacity(target_count),
            failed: Vec::new(),
        };
        for (_, target, outcome) in slots {
            match outcome {
                Ok(value) => result.succeeded.push((target, value)),
                Err(error) => {
                    warn!("{} did not answer: {}", target, error);
                    result.failed.push(TargetFailure { target, error });
                }
            }
        }
        debug!(
            "Fan-out over {} targets: {} answered, {} failed",
            result.total(),
            result.succeeded.len(),
            result.failed.len()
        );
        result
    }
}
