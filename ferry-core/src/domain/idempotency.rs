//! Idempotency tokens
//!
//! Queue delivery is at-least-once, so the same job can reach the launcher
//! more than once. A token derived only from the job and the time window it
//! was submitted in lets a deduplicating launcher collapse those repeats.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use super::job::JobDescriptor;

/// Namespace for name-based (v5) token UUIDs
const TOKEN_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a9e_4b3d_5e8f_9a07_c1d2_e3f4_a5b6);

/// Deterministic key identifying one logical launch
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyToken(String);

impl IdempotencyToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdempotencyToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives tokens by bucketing submission time into fixed windows.
///
/// Two submissions of the same object inside one window share a token. The
/// token is a 36 character UUID, short enough for launchers that cap client
/// tokens at 64 characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdempotencyPolicy {
    window: Duration,
}

impl IdempotencyPolicy {
    /// Creates a policy; a zero window is raised to one second
    pub fn new(window: Duration) -> Self {
        Self {
            window: window.max(Duration::from_secs(1)),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Index of the window containing `at`
    pub fn epoch_bucket(&self, at: DateTime<Utc>) -> i64 {
        let window = i64::try_from(self.window.as_secs()).unwrap_or(i64::MAX);
        at.timestamp().div_euclid(window)
    }

    /// Derives the token for a job. Without a timestamp the token depends on
    /// the job alone.
    pub fn token_for(
        &self,
        job: &JobDescriptor,
        submitted_at: Option<DateTime<Utc>>,
    ) -> IdempotencyToken {
        let bucket = submitted_at
            .map(|at| self.epoch_bucket(at).to_string())
            .unwrap_or_default();

        // Length-prefix each part so ("a/b", "c") and ("a", "b/c") never collide
        let name = format!(
            "{}:{}|{}:{}|{}",
            job.source_location().len(),
            job.source_location(),
            job.object_key().len(),
            job.object_key(),
            bucket
        );

        IdempotencyToken(Uuid::new_v5(&TOKEN_NAMESPACE, name.as_bytes()).to_string())
    }
}

impl Default for IdempotencyPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn job(bucket: &str, key: &str) -> JobDescriptor {
        JobDescriptor::new(bucket, key).unwrap()
    }

    #[test]
    fn test_same_job_same_window_same_token() {
        let policy = IdempotencyPolicy::default();
        let t1 = Utc.with_ymd_and_hms(2026, 3, 1, 10, 5, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2026, 3, 1, 10, 55, 0).unwrap();

        let a = policy.token_for(&job("my-bucket", "sample.pdf"), Some(t1));
        let b = policy.token_for(&job("my-bucket", "sample.pdf"), Some(t2));
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn test_next_window_changes_token() {
        let policy = IdempotencyPolicy::default();
        let t1 = Utc.with_ymd_and_hms(2026, 3, 1, 10, 59, 59).unwrap();
        let t2 = Utc.with_ymd_and_hms(2026, 3, 1, 11, 0, 0).unwrap();

        let a = policy.token_for(&job("my-bucket", "sample.pdf"), Some(t1));
        let b = policy.token_for(&job("my-bucket", "sample.pdf"), Some(t2));
        assert_ne!(a, b);
    }

    #[test]
    fn test_different_jobs_differ() {
        let policy = IdempotencyPolicy::default();
        let at = Some(Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap());

        let a = policy.token_for(&job("a/b", "c"), at);
        let b = policy.token_for(&job("a", "b/c"), at);
        let c = policy.token_for(&job("a/b", "d"), at);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_token_without_timestamp_is_stable() {
        let policy = IdempotencyPolicy::new(Duration::from_secs(60));
        let a = policy.token_for(&job("my-bucket", "sample.pdf"), None);
        let b = policy.token_for(&job("my-bucket", "sample.pdf"), None);
        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_window_is_clamped() {
        let policy = IdempotencyPolicy::new(Duration::ZERO);
        assert_eq!(policy.window(), Duration::from_secs(1));
        let at = Utc.with_ymd_and_hms(1969, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(policy.epoch_bucket(at), -1);
    }
}
