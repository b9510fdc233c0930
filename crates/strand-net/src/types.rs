use std::time::Duration;

/// Network configuration for [`HttpClient`](crate::HttpClient) and the
/// retry combinator.
#[derive(Clone, Debug)]
pub struct NetOptions {
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Timeout for reading the response (headers and body chunks).
    pub read_timeout: Duration,
    /// Maximum attempts for one logical fetch.
    pub max_retries: u32,
    /// Base delay for exponential backoff.
    pub retry_base_delay: Duration,
    /// Upper bound on a single backoff delay.
    pub max_retry_delay: Duration,
}

impl Default for NetOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(10),
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(30),
        }
    }
}

impl NetOptions {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Retry policy derived from these options.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: self.retry_base_delay,
            max_delay: self.max_retry_delay,
        }
    }
}

/// Exponential backoff policy for transient fetch faults.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Maximum attempts (first try included).
    pub max_retries: u32,
    /// Base delay; attempt `k` waits `base * 2^k`.
    pub base_delay: Duration,
    /// Cap applied to the computed delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry attempt `attempt` (1-based): `base * 2^attempt`,
    /// capped at `max_delay`. With the default 1 s base this yields 2 s
    /// then 4 s.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponential = self.base_delay * 2_u32.saturating_pow(attempt);
        exponential.min(self.max_delay)
    }
}
