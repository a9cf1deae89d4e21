//! Metrics fetching through the meta role

use crate::api::{MetricsApi, TokenApi};
use crate::error::{ProvisionError, Result};
use crate::model::{MetricSpec, MetricStat, MetricsQuery, MetricsReport};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Session length of the assumed meta role
pub const META_ROLE_SESSION: Duration = Duration::from_secs(15 * 60);

const SESSION_NAME: &str = "lambdaflow-metrics";
const MAX_DATAPOINTS: i64 = 1440;
const MIN_PERIOD_SECS: i64 = 60;

/// Metrics reported for every function
pub fn function_metrics() -> Vec<MetricSpec> {
    [
        ("invocations", "Invocations", MetricStat::Sum),
        ("errors", "Errors", MetricStat::Sum),
        ("throttles", "Throttles", MetricStat::Sum),
        ("duration", "Duration", MetricStat::Average),
    ]
    .into_iter()
    .map(|(id, metric_name, stat)| MetricSpec {
        id: id.to_string(),
        metric_name: metric_name.to_string(),
        stat,
    })
    .collect()
}

/// Smallest multiple of a minute that keeps each series within the datapoint limit
pub fn period_for(start: DateTime<Utc>, end: DateTime<Utc>) -> i32 {
    let range = (end - start).num_seconds().max(1);
    let window = MIN_PERIOD_SECS * MAX_DATAPOINTS;
    let minutes = (range + window - 1) / window;
    (minutes.max(1) * MIN_PERIOD_SECS) as i32
}

pub struct MetricsFetcher {
    tokens: Arc<dyn TokenApi>,
    metrics: Arc<dyn MetricsApi>,
}

impl MetricsFetcher {
    pub fn new(tokens: Arc<dyn TokenApi>, metrics: Arc<dyn MetricsApi>) -> Self {
        Self { tokens, metrics }
    }

    /// Assume the meta role and query the function's metrics over `[start, end)`.
    ///
    /// Credentials are not cached; every call assumes the role again.
    pub async fn fetch(
        &self,
        region: &str,
        meta_role_arn: &str,
        function_name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<MetricsReport> {
        if start >= end {
            return Err(ProvisionError::InvalidInput(format!(
                "metrics range start {} is not before end {}",
                start, end
            )));
        }

        let credentials = self
            .tokens
            .assume_role(meta_role_arn, SESSION_NAME, META_ROLE_SESSION)
            .await?;
        tracing::debug!("Assumed {} for metrics", meta_role_arn);

        let query = MetricsQuery {
            function_name: function_name.to_string(),
            start,
            end,
            period_secs: period_for(start, end),
            metrics: function_metrics(),
        };
        self.metrics.get_metrics(region, &credentials, &query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeMetrics, FakeTokens};
    use chrono::Duration as ChronoDuration;

    #[test]
    fn test_period_for() {
        let end = Utc::now();
        assert_eq!(period_for(end - ChronoDuration::hours(1), end), 60);
        assert_eq!(period_for(end - ChronoDuration::hours(24), end), 60);
        assert_eq!(period_for(end - ChronoDuration::hours(48), end), 120);
        assert_eq!(period_for(end - ChronoDuration::days(30), end), 1800);
    }

    #[tokio::test]
    async fn test_fetch_assumes_role_every_call() {
        let tokens = Arc::new(FakeTokens::new());
        let metrics = Arc::new(FakeMetrics::new());
        let fetcher = MetricsFetcher::new(tokens.clone(), metrics.clone());
        let end = Utc::now();
        let start = end - ChronoDuration::hours(1);
        let role = "arn:aws:iam::123456789012:role/fn1-meta-role";

        let report = fetcher
            .fetch("us-east-1", role, "fn1", start, end)
            .await
            .unwrap();
        fetcher
            .fetch("us-east-1", role, "fn1", start, end)
            .await
            .unwrap();

        assert_eq!(report.function_name, "fn1");
        assert_eq!(report.period_secs, 60);
        assert!(report.series("invocations").is_some());
        let expected = vec![(role.to_string(), META_ROLE_SESSION); 2];
        assert_eq!(tokens.assumed(), expected);
        assert_eq!(metrics.queries().len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_propagates_assume_role_failure() {
        let tokens = Arc::new(FakeTokens::new());
        tokens.deny();
        let metrics = Arc::new(FakeMetrics::new());
        let fetcher = MetricsFetcher::new(tokens, metrics.clone());
        let end = Utc::now();
        let start = end - ChronoDuration::hours(1);

        let result = fetcher
            .fetch("us-east-1", "arn:aws:iam::1:role/x", "fn1", start, end)
            .await;

        assert!(matches!(result, Err(ProvisionError::Remote { .. })));
        assert!(metrics.queries().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_rejects_empty_range() {
        let tokens = Arc::new(FakeTokens::new());
        let fetcher = MetricsFetcher::new(tokens, Arc::new(FakeMetrics::new()));
        let now = Utc::now();

        let result = fetcher.fetch("us-east-1", "arn", "fn1", now, now).await;
        assert!(matches!(result, Err(ProvisionError::InvalidInput(_))));
    }
}
