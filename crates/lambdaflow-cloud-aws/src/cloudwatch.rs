//! CloudWatch implementation of [`MetricsApi`]
//!
//! Queries run with the assumed meta role, so a client is built per call from
//! the shared transport settings and the temporary credentials.

use crate::error::classify;
use crate::to_chrono;
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_credential_types::Credentials;
use aws_sdk_cloudwatch::Client;
use aws_sdk_cloudwatch::config::Region;
use aws_sdk_cloudwatch::primitives::DateTime;
use aws_sdk_cloudwatch::types::{
    Dimension, Metric, MetricDataQuery, MetricDataResult, MetricStat, ScanBy,
};
use lambdaflow_cloud::{
    MetricPoint, MetricSeries, MetricsApi, MetricsQuery, MetricsReport, Result,
    TemporaryCredentials,
};
use std::collections::BTreeMap;
use std::time::{Duration, UNIX_EPOCH};

const NAMESPACE: &str = "AWS/Lambda";
const DIMENSION: &str = "FunctionName";
const PROVIDER_NAME: &str = "lambdaflow-meta-role";

pub struct CloudWatchMetrics {
    base: SdkConfig,
}

impl CloudWatchMetrics {
    pub fn new(base: SdkConfig) -> Self {
        Self { base }
    }

    fn client(&self, region: &str, credentials: &TemporaryCredentials) -> Client {
        let expiry = credentials
            .expiration
            .and_then(|at| u64::try_from(at.timestamp()).ok())
            .map(|secs| UNIX_EPOCH + Duration::from_secs(secs));
        let credentials = Credentials::new(
            &credentials.access_key_id,
            &credentials.secret_access_key,
            Some(credentials.session_token.clone()),
            expiry,
            PROVIDER_NAME,
        );

        let config = aws_sdk_cloudwatch::config::Builder::from(&self.base)
            .region(Region::new(region.to_string()))
            .credentials_provider(credentials)
            .build();
        Client::from_conf(config)
    }
}

fn data_queries(query: &MetricsQuery) -> Vec<MetricDataQuery> {
    query
        .metrics
        .iter()
        .map(|spec| {
            let dimension = Dimension::builder()
                .name(DIMENSION)
                .value(&query.function_name)
                .build();
            let metric = Metric::builder()
                .namespace(NAMESPACE)
                .metric_name(&spec.metric_name)
                .dimensions(dimension)
                .build();
            let stat = MetricStat::builder()
                .metric(metric)
                .period(query.period_secs)
                .stat(spec.stat.as_str())
                .build();

            MetricDataQuery::builder()
                .id(&spec.id)
                .label(&spec.metric_name)
                .metric_stat(stat)
                .return_data(true)
                .build()
        })
        .collect()
}

/// Fold paged results into one series per query id, keeping query order
fn merge_results(query: &MetricsQuery, results: Vec<MetricDataResult>) -> Vec<MetricSeries> {
    let mut points: BTreeMap<String, Vec<MetricPoint>> = BTreeMap::new();
    for result in results {
        let Some(id) = result.id() else { continue };
        let entry = points.entry(id.to_string()).or_default();
        for (timestamp, value) in result
            .timestamps()
            .iter()
            .zip(result.values())
        {
            if let Some(timestamp) = to_chrono(timestamp) {
                entry.push(MetricPoint {
                    timestamp,
                    value: *value,
                });
            }
        }
    }

    query
        .metrics
        .iter()
        .map(|spec| {
            let mut series_points = points.remove(&spec.id).unwrap_or_default();
            series_points.sort_by_key(|p| p.timestamp);
            MetricSeries {
                id: spec.id.clone(),
                label: spec.metric_name.clone(),
                points: series_points,
            }
        })
        .collect()
}

#[async_trait]
impl MetricsApi for CloudWatchMetrics {
    async fn get_metrics(
        &self,
        region: &str,
        credentials: &TemporaryCredentials,
        query: &MetricsQuery,
    ) -> Result<MetricsReport> {
        let client = self.client(region, credentials);

        let mut pages = client
            .get_metric_data()
            .set_metric_data_queries(Some(data_queries(query)))
            .start_time(DateTime::from_secs(query.start.timestamp()))
            .end_time(DateTime::from_secs(query.end.timestamp()))
            .scan_by(ScanBy::TimestampAscending)
            .into_paginator()
            .send();

        let mut results = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| classify("GetMetricData", e))?;
            results.extend(page.metric_data_results().iter().cloned());
        }
        tracing::debug!(
            "Fetched {} metric results for {}",
            results.len(),
            query.function_name
        );

        Ok(MetricsReport {
            function_name: query.function_name.clone(),
            start: query.start,
            end: query.end,
            period_secs: query.period_secs,
            series: merge_results(query, results),
        })
    }
}
