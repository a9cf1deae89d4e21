//! Shared transport settings for every SDK client

use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use std::time::Duration;

/// Connection settings applied to all clients of one run.
///
/// The SDK keeps connections alive and pools them per client; the values here
/// bound how long a single call may take and how often the SDK itself retries
/// throttling and transient network errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub region: String,
    /// Named profile of the shared credentials file
    pub profile: Option<String>,
    pub connect_timeout: Duration,
    pub operation_timeout: Duration,
    pub max_attempts: u32,
}

impl TransportConfig {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            profile: None,
            connect_timeout: Duration::from_secs(10),
            // Code uploads of large archives take a while
            operation_timeout: Duration::from_secs(300),
            max_attempts: 3,
        }
    }

    pub fn with_profile(mut self, profile: Option<String>) -> Self {
        self.profile = profile;
        self
    }

    pub async fn load(&self) -> SdkConfig {
        let timeouts = TimeoutConfig::builder()
            .connect_timeout(self.connect_timeout)
            .operation_timeout(self.operation_timeout)
            .build();

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(self.region.clone()))
            .timeout_config(timeouts)
            .retry_config(RetryConfig::standard().with_max_attempts(self.max_attempts));

        if let Some(profile) = &self.profile {
            tracing::debug!("Using AWS profile {}", profile);
            loader = loader.profile_name(profile);
        }

        loader.load().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let transport = TransportConfig::new("eu-west-1");
        assert_eq!(transport.region, "eu-west-1");
        assert!(transport.profile.is_none());
        assert_eq!(transport.max_attempts, 3);
        assert!(transport.operation_timeout > transport.connect_timeout);

        let with_profile = transport.with_profile(Some("staging".to_string()));
        assert_eq!(with_profile.profile.as_deref(), Some("staging"));
    }
}
