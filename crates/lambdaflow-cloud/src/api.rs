//! Control-plane traits
//!
//! One trait per external API. `lambdaflow-cloud-aws` implements them on the
//! AWS SDK; [`crate::testing`] provides in-memory fakes.
//!
//! Implementations classify failures into [`crate::ProvisionError`]:
//! absent resources are reported as `NotFound`, the role propagation race as
//! `RolePropagation`, anything else as `Remote`.

use crate::config::FunctionConfig;
use crate::error::Result;
use crate::model::{
    AliasDescriptor, ConcurrencyDescriptor, FunctionDescriptor, MetricsQuery, MetricsReport,
    RoleDescriptor, RoleSpec, TemporaryCredentials,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// The set of APIs a deployer talks to
#[derive(Clone)]
pub struct ControlPlane {
    pub identity: Arc<dyn IdentityApi>,
    pub functions: Arc<dyn FunctionApi>,
    pub tokens: Arc<dyn TokenApi>,
    pub metrics: Arc<dyn MetricsApi>,
}

/// Identity API (roles and their policies)
#[async_trait]
pub trait IdentityApi: Send + Sync {
    async fn get_role(&self, name: &str) -> Result<RoleDescriptor>;

    /// Create the role, or bring an existing one in line with `spec`
    async fn put_role(&self, spec: &RoleSpec) -> Result<RoleDescriptor>;

    /// Delete the role together with its attached and inline policies
    async fn delete_role(&self, name: &str) -> Result<()>;
}

/// Compute-function API
#[async_trait]
pub trait FunctionApi: Send + Sync {
    /// Create the function and publish version 1
    async fn create_function(
        &self,
        config: &FunctionConfig,
        role_arn: &str,
        code: Vec<u8>,
    ) -> Result<FunctionDescriptor>;

    async fn update_function_configuration(
        &self,
        config: &FunctionConfig,
        role_arn: &str,
    ) -> Result<FunctionDescriptor>;

    /// Maximum retry attempts for asynchronous invocations
    async fn put_function_event_invoke_config(
        &self,
        function_name: &str,
        max_retry_attempts: i32,
    ) -> Result<()>;

    /// Replace the code and publish a new version
    async fn update_function_code(&self, function_name: &str, code: Vec<u8>)
    -> Result<FunctionDescriptor>;

    async fn get_function_configuration(&self, function_name: &str) -> Result<FunctionDescriptor>;

    async fn delete_function(&self, function_name: &str) -> Result<()>;

    async fn get_alias(&self, function_name: &str, alias: &str) -> Result<AliasDescriptor>;

    async fn create_alias(
        &self,
        function_name: &str,
        alias: &str,
        version: &str,
    ) -> Result<AliasDescriptor>;

    async fn update_alias(
        &self,
        function_name: &str,
        alias: &str,
        version: &str,
    ) -> Result<AliasDescriptor>;

    /// Deleting an alias also drops its provisioned concurrency
    async fn delete_alias(&self, function_name: &str, alias: &str) -> Result<()>;

    async fn put_provisioned_concurrency_config(
        &self,
        function_name: &str,
        qualifier: &str,
        executions: i32,
    ) -> Result<ConcurrencyDescriptor>;
}

/// Security-token API
#[async_trait]
pub trait TokenApi: Send + Sync {
    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
        duration: Duration,
    ) -> Result<TemporaryCredentials>;
}

/// Metrics API, called with the credentials of an assumed role
#[async_trait]
pub trait MetricsApi: Send + Sync {
    async fn get_metrics(
        &self,
        region: &str,
        credentials: &TemporaryCredentials,
        query: &MetricsQuery,
    ) -> Result<MetricsReport>;
}
