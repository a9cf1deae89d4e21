//! AWS control plane for LambdaFlow
//!
//! Implements the `lambdaflow-cloud` traits on the AWS SDK:
//!
//! - [`IamIdentity`]: execution and meta roles
//! - [`LambdaFunctions`]: functions, aliases and provisioned concurrency
//! - [`StsTokens`]: assuming the meta role
//! - [`CloudWatchMetrics`]: metrics read with the assumed credentials

pub mod cloudwatch;
mod error;
pub mod iam;
pub mod lambda;
pub mod sts;
pub mod transport;

pub use cloudwatch::CloudWatchMetrics;
pub use iam::IamIdentity;
pub use lambda::LambdaFunctions;
pub use sts::StsTokens;
pub use transport::TransportConfig;

use aws_sdk_lambda::primitives::DateTime;
use lambdaflow_cloud::ControlPlane;
use std::sync::Arc;

/// Connect every client with one transport configuration
pub async fn connect(transport: &TransportConfig) -> ControlPlane {
    let sdk_config = transport.load().await;
    tracing::debug!("AWS clients configured for {}", transport.region);

    ControlPlane {
        identity: Arc::new(IamIdentity::new(aws_sdk_iam::Client::new(&sdk_config))),
        functions: Arc::new(LambdaFunctions::new(aws_sdk_lambda::Client::new(&sdk_config))),
        tokens: Arc::new(StsTokens::new(aws_sdk_sts::Client::new(&sdk_config))),
        metrics: Arc::new(CloudWatchMetrics::new(sdk_config)),
    }
}

pub(crate) fn to_chrono(time: &DateTime) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::from_timestamp(time.secs(), time.subsec_nanos())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_chrono() {
        let converted = to_chrono(&DateTime::from_secs(1_704_067_200)).unwrap();
        assert_eq!(converted.to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }
}
