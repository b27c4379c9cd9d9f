use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";
const USER_AGENT: &str = "furnish-admin-core/0.1";

/// Connection settings for [`HttpTransport`](crate::transport::HttpTransport).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: USER_AGENT.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }
}

/// Timing of a resource controller.
///
/// The defaults match a backend whose rate limiter rejects bursts of reads
/// closer than half a second apart. Tune them to whatever backend the
/// controller talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Minimum time between the starts of two fetches on one binding.
    pub fetch_spacing: Duration,
    /// Delay before the refetch that follows a successful mutation.
    pub refetch_delay: Duration,
    /// How long a success message stays visible.
    pub success_ttl: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            fetch_spacing: Duration::from_millis(500),
            refetch_delay: Duration::from_millis(500),
            success_ttl: Duration::from_secs(3),
        }
    }
}
