//! Read models returned by the control-plane traits

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Deployed function as reported by the control plane
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    pub name: String,
    pub arn: String,
    pub description: String,
    pub runtime: String,
    pub role_arn: String,
    pub handler: String,
    pub memory: i32,
    pub timeout: i32,
    pub env: BTreeMap<String, String>,
    /// Content checksum of the code package (base64 SHA-256)
    pub hash: String,
    /// Published version; `$LATEST` on plain reads
    pub version: Option<String>,
    pub layers: Vec<String>,
    pub security_group_ids: Vec<String>,
    pub subnet_ids: Vec<String>,
}

/// Named pointer to a function version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasDescriptor {
    pub name: String,
    pub arn: String,
    pub function_version: String,
    /// Additional version weights of the routing configuration
    pub routing: BTreeMap<String, f64>,
}

/// Result of setting provisioned concurrency on an alias.
///
/// `allocated` trails `requested` while capacity is being warmed up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcurrencyDescriptor {
    pub requested: i32,
    pub allocated: i32,
    pub status: Option<String>,
}

impl ConcurrencyDescriptor {
    pub fn is_converged(&self) -> bool {
        self.requested == self.allocated
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDescriptor {
    pub name: String,
    pub arn: String,
}

/// Desired shape of a role for create-or-update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleSpec {
    pub name: String,
    pub description: String,
    pub trust_policy: serde_json::Value,
    pub managed_policy_arns: Vec<String>,
    /// Inline policies as (policy name, document)
    pub inline_policies: Vec<(String, serde_json::Value)>,
}

/// Short-lived credentials from assuming a role
#[derive(Clone, Serialize, Deserialize)]
pub struct TemporaryCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for TemporaryCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemporaryCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &"** redacted **")
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// Statistic applied to a metric series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricStat {
    Sum,
    Average,
}

impl MetricStat {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricStat::Sum => "Sum",
            MetricStat::Average => "Average",
        }
    }
}

/// One metric of the function to query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSpec {
    /// Query id, lowercase
    pub id: String,
    pub metric_name: String,
    pub stat: MetricStat,
}

/// Aggregated metrics query scoped to one function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsQuery {
    pub function_name: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub period_secs: i32,
    pub metrics: Vec<MetricSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    pub id: String,
    pub label: String,
    pub points: Vec<MetricPoint>,
}

impl MetricSeries {
    pub fn total(&self) -> f64 {
        self.points.iter().map(|p| p.value).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub function_name: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub period_secs: i32,
    pub series: Vec<MetricSeries>,
}

impl MetricsReport {
    pub fn series(&self, id: &str) -> Option<&MetricSeries> {
        self.series.iter().find(|s| s.id == id)
    }
}
