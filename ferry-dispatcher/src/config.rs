//! Dispatcher configuration
//!
//! Every setting comes from an environment variable. Required settings have
//! no defaults: a dispatcher that cannot tell which cluster, task or network
//! to launch into refuses to start rather than failing message by message.

use anyhow::{Context, Result, anyhow, bail};
use ferry_core::domain::launch::{AssignPublicIp, LaunchTemplate, LaunchType, NetworkPlacement};
use std::str::FromStr;
use std::time::Duration;

/// SQS limits: at most 10 messages per receive, at most 20 s of long polling
const MAX_BATCH_SIZE: usize = 10;
const MAX_WAIT_TIME: Duration = Duration::from_secs(20);

/// SQS caps a visibility timeout at 12 hours
const MAX_RETRY_DELAY: Duration = Duration::from_secs(43_200);

/// Upper bound on the queue and launch call timeouts
const MAX_CALL_TIMEOUT: Duration = Duration::from_secs(3_600);

const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Queue the jobs are read from
    pub queue_url: String,

    /// Where undecodable or unlaunchable messages are forwarded, if anywhere
    pub dead_letter_queue_url: Option<String>,

    /// Static description of the task started for every job
    pub launch: LaunchTemplate,

    /// Number of independent receive/dispatch loops
    pub worker_count: usize,

    /// Maximum messages per receive
    pub batch_size: usize,

    /// Long-poll duration of one receive
    pub wait_time: Duration,

    /// Bound on acknowledge / return / dead-letter calls, and on a receive
    /// beyond its long-poll wait
    pub queue_timeout: Duration,

    /// Bound on one start-task call
    pub launch_timeout: Duration,

    /// Visibility delay applied when a message is returned for retry
    pub retry_delay: Duration,

    /// Width of the submission-time windows used for idempotency tokens
    pub idempotency_window: Duration,

    /// Consecutive failed receives after which the worker gives up
    pub max_receive_failures: u32,

    /// Accept version-less message bodies
    pub allow_unversioned: bool,

    /// Address of the health endpoint; disabled when unset
    pub health_bind_addr: Option<String>,
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Required environment variables:
    /// - QUEUE_URL
    /// - CLUSTER_NAME
    /// - TASK_DEFINITION
    /// - SUBNETS (comma separated)
    /// - SECURITY_GROUPS (comma separated)
    /// - ASSIGN_PUBLIC_IP (ENABLED or DISABLED)
    ///
    /// Optional environment variables:
    /// - LAUNCH_TYPE (default: FARGATE)
    /// - CONTAINER_NAME (container receiving SOURCE_BUCKET / OBJECT_KEY)
    /// - DEAD_LETTER_QUEUE_URL
    /// - WORKER_COUNT (default: 1)
    /// - BATCH_SIZE (default: 10)
    /// - WAIT_TIME (seconds, default: 20)
    /// - QUEUE_TIMEOUT (seconds, default: 5)
    /// - LAUNCH_TIMEOUT (seconds, default: 30)
    /// - RETRY_DELAY (seconds, default: 30, at most 43200)
    /// - IDEMPOTENCY_WINDOW (seconds, default: 3600)
    /// - MAX_RECEIVE_FAILURES (default: 10)
    /// - ALLOW_UNVERSIONED (default: false)
    /// - HEALTH_BIND_ADDR (e.g. 0.0.0.0:8080)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Creates configuration from an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let vars = Vars(&lookup);

        let launch = LaunchTemplate {
            cluster: vars.required("CLUSTER_NAME")?,
            task_definition: vars.required("TASK_DEFINITION")?,
            launch_type: vars.parsed("LAUNCH_TYPE", LaunchType::Fargate)?,
            network: NetworkPlacement {
                subnets: vars.list("SUBNETS")?,
                security_groups: vars.list("SECURITY_GROUPS")?,
                assign_public_ip: vars
                    .required("ASSIGN_PUBLIC_IP")?
                    .parse::<AssignPublicIp>()
                    .map_err(|e| anyhow!("ASSIGN_PUBLIC_IP: {}", e))?,
            },
            container_name: vars.optional("CONTAINER_NAME"),
        };

        Ok(Self {
            queue_url: vars.required("QUEUE_URL")?,
            dead_letter_queue_url: vars.optional("DEAD_LETTER_QUEUE_URL"),
            launch,
            worker_count: vars.parsed("WORKER_COUNT", 1)?,
            batch_size: vars.parsed("BATCH_SIZE", MAX_BATCH_SIZE)?,
            wait_time: vars.seconds("WAIT_TIME", MAX_WAIT_TIME)?,
            queue_timeout: vars.seconds("QUEUE_TIMEOUT", Duration::from_secs(5))?,
            launch_timeout: vars.seconds("LAUNCH_TIMEOUT", Duration::from_secs(30))?,
            retry_delay: vars.seconds("RETRY_DELAY", DEFAULT_RETRY_DELAY)?,
            idempotency_window: vars.seconds("IDEMPOTENCY_WINDOW", Duration::from_secs(3600))?,
            max_receive_failures: vars.parsed("MAX_RECEIVE_FAILURES", 10)?,
            allow_unversioned: vars.parsed("ALLOW_UNVERSIONED", false)?,
            health_bind_addr: vars.optional("HEALTH_BIND_ADDR"),
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if !self.queue_url.starts_with("http://") && !self.queue_url.starts_with("https://") {
            bail!("queue_url must start with http:// or https://");
        }

        if let Some(url) = &self.dead_letter_queue_url {
            if url == &self.queue_url {
                bail!("dead_letter_queue_url must differ from queue_url");
            }
        }

        if self.worker_count == 0 {
            bail!("worker_count must be greater than 0");
        }

        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            bail!("batch_size must be between 1 and {}", MAX_BATCH_SIZE);
        }

        if self.wait_time > MAX_WAIT_TIME {
            bail!("wait_time must be at most {:?}", MAX_WAIT_TIME);
        }

        if self.queue_timeout.is_zero() || self.queue_timeout > MAX_CALL_TIMEOUT {
            bail!("queue_timeout must be between 1s and {:?}", MAX_CALL_TIMEOUT);
        }

        if self.launch_timeout.is_zero() || self.launch_timeout > MAX_CALL_TIMEOUT {
            bail!("launch_timeout must be between 1s and {:?}", MAX_CALL_TIMEOUT);
        }

        if self.retry_delay > MAX_RETRY_DELAY {
            bail!("retry_delay must be at most {:?}", MAX_RETRY_DELAY);
        }

        if self.idempotency_window.is_zero() {
            bail!("idempotency_window must be greater than 0");
        }

        if self.max_receive_failures == 0 {
            bail!("max_receive_failures must be greater than 0");
        }

        Ok(())
    }

    /// Upper bound on one receive call: the long poll plus the queue timeout
    pub fn receive_timeout(&self) -> Duration {
        self.wait_time.saturating_add(self.queue_timeout)
    }
}

/// Typed access to a variable lookup
struct Vars<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Vars<'_, F> {
    /// Set and non-blank
    fn optional(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, name: &str) -> Result<String> {
        self.optional(name)
            .ok_or_else(|| anyhow!("{} environment variable not set", name))
    }

    /// Comma separated, at least one non-blank entry
    fn list(&self, name: &str) -> Result<Vec<String>> {
        let items: Vec<String> = self
            .required(name)?
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect();

        if items.is_empty() {
            bail!("{} must list at least one value", name);
        }
        Ok(items)
    }

    fn parsed<T>(&self, name: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(name) {
            Some(raw) => raw
                .parse::<T>()
                .map_err(|e| anyhow!("{}", e))
                .with_context(|| format!("invalid value '{}' for {}", raw, name)),
            None => Ok(default),
        }
    }

    fn seconds(&self, name: &str, default: Duration) -> Result<Duration> {
        self.parsed(name, default.as_secs())
            .map(Duration::from_secs)
    }
}
