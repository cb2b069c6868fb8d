//! Bounded retry around a listing fetch.
//!
//! `Idle → Attempting → {Success, Retrying, Failed}`; `Retrying` sleeps
//! `attempt × base_delay` and returns to `Attempting`.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::FetchError;
use crate::extract::{Extractor, FieldSchema, RawRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Malformed payloads rarely fix themselves, so they end the run unless set.
    pub retry_parse_failures: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
            retry_parse_failures: false,
        }
    }
}

impl RetryPolicy {
    /// Linear backoff after the given 1-based attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    pub fn is_retryable(&self, err: &FetchError) -> bool {
        match err {
            FetchError::Network(_) | FetchError::EmptyExtraction => true,
            FetchError::Parse(_) => self.retry_parse_failures,
        }
    }
}

/// Injected so backoff can be observed without waiting.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug)]
pub enum RetryState {
    Idle,
    Attempting { attempt: u32 },
    Retrying { attempt: u32, delay: Duration },
    Success { attempts: u32, records: Vec<RawRecord> },
    Failed { attempts: u32, error: FetchError },
}

#[derive(Debug)]
pub enum RetryOutcome {
    Success { attempts: u32, records: Vec<RawRecord> },
    Failed { attempts: u32, error: FetchError },
}

impl RetryOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Success { attempts, .. } | RetryOutcome::Failed { attempts, .. } => {
                *attempts
            }
        }
    }

    /// Failure is an absent result, never an error for the caller to propagate.
    pub fn into_records(self) -> Option<Vec<RawRecord>> {
        match self {
            RetryOutcome::Success { records, .. } => Some(records),
            RetryOutcome::Failed { .. } => None,
        }
    }
}

pub struct RetryController<'a> {
    policy: &'a RetryPolicy,
    sleeper: &'a dyn Sleeper,
}

impl<'a> RetryController<'a> {
    pub fn new(policy: &'a RetryPolicy, sleeper: &'a dyn Sleeper) -> Self {
        RetryController { policy, sleeper }
    }

    pub async fn fetch(
        &self,
        extractor: &dyn Extractor,
        label: &str,
        url: &str,
        schema: &FieldSchema,
    ) -> RetryOutcome {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut state = RetryState::Idle;

        loop {
            state = match state {
                RetryState::Idle => RetryState::Attempting { attempt: 1 },
                RetryState::Attempting { attempt } => {
                    info!(target: "retry", unit = label, attempt, max_attempts, "attempting fetch");
                    let result = match extractor.fetch_listing(url, schema).await {
                        Ok(records) if records.is_empty() => Err(FetchError::EmptyExtraction),
                        other => other,
                    };
                    match result {
                        Ok(records) => RetryState::Success {
                            attempts: attempt,
                            records,
                        },
                        Err(error) if attempt < max_attempts && self.policy.is_retryable(&error) => {
                            let delay = self.policy.delay_after(attempt);
                            warn!(
                                target: "retry",
                                unit = label,
                                attempt,
                                reason = error.kind(),
                                error = %error,
                                delay_secs = delay.as_secs_f64(),
                                "fetch failed, retrying"
                            );
                            RetryState::Retrying { attempt, delay }
                        }
                        Err(error) => RetryState::Failed {
                            attempts: attempt,
                            error,
                        },
                    }
                }
                RetryState::Retrying { attempt, delay } => {
                    self.sleeper.sleep(delay).await;
                    RetryState::Attempting {
                        attempt: attempt + 1,
                    }
                }
                RetryState::Success { attempts, records } => {
                    info!(target: "retry", unit = label, attempts, records = records.len(), "fetch succeeded");
                    return RetryOutcome::Success { attempts, records };
                }
                RetryState::Failed { attempts, error } => {
                    warn!(
                        target: "retry",
                        unit = label,
                        attempts,
                        reason = error.kind(),
                        error = %error,
                        "fetch failed, giving up"
                    );
                    return RetryOutcome::Failed { attempts, error };
                }
            };
        }
    }
}
