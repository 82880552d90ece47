use std::num::NonZeroU32;
use std::time::Duration;

use nonzero_ext::nonzero;

pub const DATAWARS_V1_URL: &str = "https://api.datawars2.ie/gw2/v1";
pub const DATAWARS_V2_URL: &str = "https://api.datawars2.ie/gw2/v2";

/// Connection settings for [`crate::DatawarsClient`].
#[derive(Debug, Clone)]
pub struct DatawarsConfig {
    /// Base of the items catalog endpoint.
    pub v1_base_url: String,
    /// Base of the history endpoints.
    pub v2_base_url: String,
    /// Shared across every request the client makes.
    pub requests_per_second: NonZeroU32,
    /// Deadline for a single attempt.
    pub request_timeout: Duration,
    /// Attempts per request, including the first one.
    pub max_attempts: u32,
    /// Multiplied by the attempt number between retries.
    pub retry_backoff: Duration,
}

impl Default for DatawarsConfig {
    fn default() -> Self {
        Self {
            v1_base_url: DATAWARS_V1_URL.to_string(),
            v2_base_url: DATAWARS_V2_URL.to_string(),
            requests_per_second: nonzero!(1u32),
            request_timeout: Duration::from_secs(5),
            max_attempts: 3,
            retry_backoff: Duration::from_secs(2),
        }
    }
}

impl DatawarsConfig {
    /// Points both API versions at one server. Used against local mocks.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.v1_base_url = url.clone();
        self.v2_base_url = url;
        self
    }
}
