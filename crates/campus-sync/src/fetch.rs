//! Per-partition fetching with escalating timeouts and backoff.
//!
//! Attempt `n` is bounded by `base_timeout * n`. A dropped connection waits
//! the fixed reset pause before the next attempt; any other fault waits
//! `backoff_step * n`. After `max_retries` retries the partition is given up.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::http::FetchFault;
use crate::portal::Portal;
use crate::types::{Partition, SyncError, SyncResult};

/// Retry limits for a single partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Timeout of the first attempt.
    pub base_timeout: Duration,
    /// Pause after a connection reset.
    pub reset_wait: Duration,
    /// Pause multiplier for every other fault.
    pub backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_timeout: Duration::from_secs(60),
            reset_wait: Duration::from_secs(15),
            backoff_step: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Total attempts before giving up.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Timeout for a 1-based attempt number.
    pub fn timeout_for(&self, attempt: u32) -> Duration {
        self.base_timeout.saturating_mul(attempt.max(1))
    }

    /// Pause after `fault` ended the given attempt.
    pub fn wait_after(&self, fault: &FetchFault, attempt: u32) -> Duration {
        if fault.is_connection_reset() {
            self.reset_wait
        } else {
            self.backoff_step.saturating_mul(attempt.max(1))
        }
    }
}

/// Drives `Portal::submit` under a [`RetryPolicy`].
#[derive(Debug, Clone, Default)]
pub struct PartitionFetcher {
    policy: RetryPolicy,
}

impl PartitionFetcher {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetch one partition's markup, retrying transient faults.
    ///
    /// Fails with [`SyncError::FetchExhausted`] once every attempt has failed.
    pub async fn fetch<P>(&self, portal: &mut P, partition: &Partition) -> SyncResult<String>
    where
        P: Portal + ?Sized,
    {
        let mut attempt: u32 = 1;

        loop {
            let timeout = self.policy.timeout_for(attempt);
            debug!(
                partition = %partition,
                attempt,
                timeout_ms = timeout.as_millis() as u64,
                "fetching partition"
            );

            match portal.submit(partition, timeout).await {
                Ok(markup) => {
                    if attempt > 1 {
                        info!(partition = %partition, attempt, "fetch recovered");
                    }
                    return Ok(markup);
                }
                Err(fault) if attempt <= self.policy.max_retries => {
                    let wait = self.policy.wait_after(&fault, attempt);
                    warn!(
                        partition = %partition,
                        attempt,
                        max_attempts = self.policy.max_attempts(),
                        wait_ms = wait.as_millis() as u64,
                        "fetch failed, retrying: {fault}"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(fault) => {
                    return Err(SyncError::FetchExhausted {
                        partition: partition.label.clone(),
                        attempts: attempt,
                        last_fault: fault,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;

    /// Portal whose submit results are scripted up front.
    struct ScriptedPortal {
        script: VecDeque<Result<String, FetchFault>>,
        timeouts: Vec<Duration>,
    }

    impl ScriptedPortal {
        fn new(script: Vec<Result<String, FetchFault>>) -> Self {
            Self {
                script: script.into(),
                timeouts: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl Portal for ScriptedPortal {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn open(&mut self) -> SyncResult<Vec<Partition>> {
            Ok(vec![])
        }

        async fn submit(
            &mut self,
            _partition: &Partition,
            timeout: Duration,
        ) -> Result<String, FetchFault> {
            self.timeouts.push(timeout);
            self.script
                .pop_front()
                .unwrap_or_else(|| Err(FetchFault::Other("script exhausted".into())))
        }

        async fn close(&mut self) {}
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_timeout: Duration::from_millis(10),
            reset_wait: Duration::ZERO,
            backoff_step: Duration::ZERO,
        }
    }

    #[test]
    fn test_default_policy_constants() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 6);
        assert_eq!(policy.timeout_for(1), Duration::from_secs(60));
        assert_eq!(policy.timeout_for(3), Duration::from_secs(180));
    }

    #[test]
    fn test_wait_depends_on_fault_class() {
        let policy = RetryPolicy::default();
        let reset = FetchFault::ConnectionReset("socket hang up".into());
        let timeout = FetchFault::Timeout(Duration::from_secs(60));

        assert_eq!(policy.wait_after(&reset, 1), Duration::from_secs(15));
        assert_eq!(policy.wait_after(&reset, 4), Duration::from_secs(15));
        assert_eq!(policy.wait_after(&timeout, 1), Duration::from_secs(5));
        assert_eq!(policy.wait_after(&timeout, 3), Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_recovers_after_transient_faults() {
        let mut portal = ScriptedPortal::new(vec![
            Err(FetchFault::ConnectionReset("reset by peer".into())),
            Err(FetchFault::Timeout(Duration::from_millis(20))),
            Ok("<table></table>".into()),
        ]);
        let fetcher = PartitionFetcher::new(fast_policy(5));

        let markup = fetcher
            .fetch(&mut portal, &Partition::new("1", "A-101"))
            .await
            .unwrap();

        assert_eq!(markup, "<table></table>");
        assert_eq!(portal.timeouts.len(), 3);
    }

    #[tokio::test]
    async fn test_exhausts_after_max_retries_plus_one() {
        let mut portal = ScriptedPortal::new(Vec::new());
        let fetcher = PartitionFetcher::new(fast_policy(5));

        let err = fetcher
            .fetch(&mut portal, &Partition::new("CENG", "CENG"))
            .await
            .unwrap_err();

        match err {
            SyncError::FetchExhausted {
                partition,
                attempts,
                ..
            } => {
                assert_eq!(partition, "CENG");
                assert_eq!(attempts, 6);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(portal.timeouts.len(), 6);
        assert!(portal.timeouts.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(portal.timeouts[5], Duration::from_millis(60));
    }

    #[tokio::test]
    async fn test_zero_retries_means_single_attempt() {
        let mut portal = ScriptedPortal::new(vec![Err(FetchFault::Status(500))]);
        let fetcher = PartitionFetcher::new(fast_policy(0));

        let err = fetcher
            .fetch(&mut portal, &Partition::new("x", "x"))
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::FetchExhausted { attempts: 1, .. }));
        assert_eq!(portal.timeouts.len(), 1);
    }
}
