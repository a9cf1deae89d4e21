//! In-memory fakes of the control-plane traits
//!
//! The fakes keep just enough state to behave like the real APIs for the
//! deployer: absent resources are `NotFound`, creating an existing resource
//! is a conflict, and deleting an alias drops its provisioned concurrency.

use crate::api::{ControlPlane, FunctionApi, IdentityApi, MetricsApi, TokenApi};
use crate::config::FunctionConfig;
use crate::error::{ProvisionError, Result};
use crate::function::code_hash;
use crate::model::{
    AliasDescriptor, ConcurrencyDescriptor, FunctionDescriptor, MetricPoint, MetricSeries,
    MetricsQuery, MetricsReport, RoleDescriptor, RoleSpec, TemporaryCredentials,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Account id used in every ARN the fakes hand out
pub const FAKE_ACCOUNT_ID: &str = "123456789012";

const FAKE_REGION: &str = "us-east-1";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Fakes wired into a [`ControlPlane`]
pub struct FakeControlPlane {
    pub identity: Arc<FakeIdentity>,
    pub functions: Arc<FakeFunctions>,
    pub tokens: Arc<FakeTokens>,
    pub metrics: Arc<FakeMetrics>,
}

impl FakeControlPlane {
    pub fn new() -> Self {
        Self {
            identity: Arc::new(FakeIdentity::new()),
            functions: Arc::new(FakeFunctions::new()),
            tokens: Arc::new(FakeTokens::new()),
            metrics: Arc::new(FakeMetrics::new()),
        }
    }

    pub fn control_plane(&self) -> ControlPlane {
        ControlPlane {
            identity: self.identity.clone(),
            functions: self.functions.clone(),
            tokens: self.tokens.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl Default for FakeControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Identity
// ============================================================================

#[derive(Default)]
pub struct FakeIdentity {
    roles: Mutex<BTreeMap<String, (RoleDescriptor, Option<RoleSpec>)>>,
}

impl FakeIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a role that exists outside of any deployment
    pub fn insert_role(&self, name: &str, arn: &str) {
        let descriptor = RoleDescriptor {
            name: name.to_string(),
            arn: arn.to_string(),
        };
        lock(&self.roles).insert(name.to_string(), (descriptor, None));
    }

    /// Names of all existing roles, sorted
    pub fn role_names(&self) -> Vec<String> {
        lock(&self.roles).keys().cloned().collect()
    }

    /// Spec of the last `put_role` for this name
    pub fn role_spec(&self, name: &str) -> Option<RoleSpec> {
        lock(&self.roles)
            .get(name)
            .and_then(|(_, spec)| spec.clone())
    }
}

#[async_trait]
impl IdentityApi for FakeIdentity {
    async fn get_role(&self, name: &str) -> Result<RoleDescriptor> {
        lock(&self.roles)
            .get(name)
            .map(|(descriptor, _)| descriptor.clone())
            .ok_or_else(|| ProvisionError::NotFound(format!("role {}", name)))
    }

    async fn put_role(&self, spec: &RoleSpec) -> Result<RoleDescriptor> {
        let mut roles = lock(&self.roles);
        let descriptor = roles
            .get(&spec.name)
            .map(|(descriptor, _)| descriptor.clone())
            .unwrap_or_else(|| RoleDescriptor {
                name: spec.name.clone(),
                arn: format!("arn:aws:iam::{}:role/{}", FAKE_ACCOUNT_ID, spec.name),
            });
        roles.insert(spec.name.clone(), (descriptor.clone(), Some(spec.clone())));
        Ok(descriptor)
    }

    async fn delete_role(&self, name: &str) -> Result<()> {
        lock(&self.roles)
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ProvisionError::NotFound(format!("role {}", name)))
    }
}

// ============================================================================
// Functions
// ============================================================================

/// A mutating call received by [`FakeFunctions`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionCall {
    CreateFunction {
        function: String,
    },
    UpdateConfiguration {
        function: String,
    },
    PutEventInvokeConfig {
        function: String,
        max_retry_attempts: i32,
    },
    UpdateCode {
        function: String,
    },
    DeleteFunction {
        function: String,
    },
    CreateAlias {
        function: String,
        alias: String,
        version: String,
    },
    UpdateAlias {
        function: String,
        alias: String,
        version: String,
    },
    DeleteAlias {
        function: String,
        alias: String,
    },
    PutProvisionedConcurrency {
        function: String,
        alias: String,
        executions: i32,
    },
}

struct FunctionRecord {
    descriptor: FunctionDescriptor,
    published: u32,
}

#[derive(Default)]
struct FunctionsInner {
    functions: HashMap<String, FunctionRecord>,
    aliases: HashMap<(String, String), AliasDescriptor>,
    concurrency: HashMap<(String, String), i32>,
    propagation_failures: u32,
    event_invoke_failures: u32,
    create_attempts: Vec<tokio::time::Instant>,
    calls: Vec<FunctionCall>,
}

#[derive(Default)]
pub struct FakeFunctions {
    inner: Mutex<FunctionsInner>,
}

fn function_arn(name: &str) -> String {
    format!(
        "arn:aws:lambda:{}:{}:function:{}",
        FAKE_REGION, FAKE_ACCOUNT_ID, name
    )
}

fn apply_config(descriptor: &mut FunctionDescriptor, config: &FunctionConfig, role_arn: &str) {
    descriptor.description = config.description.clone();
    descriptor.runtime = config.runtime.clone();
    descriptor.role_arn = role_arn.to_string();
    descriptor.handler = config.handler.clone();
    descriptor.memory = config.memory;
    descriptor.timeout = config.timeout;
    descriptor.env = config.env.clone();
    descriptor.layers = config.layers.clone();
    descriptor.security_group_ids = config.security_group_ids.clone();
    descriptor.subnet_ids = config.subnet_ids.clone();
}

fn function_not_found(name: &str) -> ProvisionError {
    ProvisionError::NotFound(format!("function {}", name))
}

fn alias_not_found(function_name: &str, alias: &str) -> ProvisionError {
    ProvisionError::NotFound(format!("alias {}:{}", function_name, alias))
}

impl FakeFunctions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` create attempts fail with a role propagation error
    pub fn fail_create_with_propagation(&self, n: u32) {
        lock(&self.inner).propagation_failures = n;
    }

    /// Make the next `n` retry count updates fail after being recorded
    pub fn fail_event_invoke_config(&self, n: u32) {
        lock(&self.inner).event_invoke_failures = n;
    }

    /// Instants of every create attempt, failed ones included
    pub fn create_attempts(&self) -> Vec<tokio::time::Instant> {
        lock(&self.inner).create_attempts.clone()
    }

    pub fn calls(&self) -> Vec<FunctionCall> {
        lock(&self.inner).calls.clone()
    }

    /// Seed a function with `published_versions` versions already published
    pub fn insert_function(&self, name: &str, published_versions: u32) {
        let descriptor = FunctionDescriptor {
            name: name.to_string(),
            arn: function_arn(name),
            version: Some("$LATEST".to_string()),
            hash: code_hash(name.as_bytes()),
            ..Default::default()
        };
        lock(&self.inner).functions.insert(
            name.to_string(),
            FunctionRecord {
                descriptor,
                published: published_versions,
            },
        );
    }

    pub fn function(&self, name: &str) -> Option<FunctionDescriptor> {
        lock(&self.inner)
            .functions
            .get(name)
            .map(|record| record.descriptor.clone())
    }

    pub fn alias_count(&self, function_name: &str) -> usize {
        lock(&self.inner)
            .aliases
            .keys()
            .filter(|(function, _)| function == function_name)
            .count()
    }

    pub fn provisioned_concurrency(&self, function_name: &str, alias: &str) -> Option<i32> {
        lock(&self.inner)
            .concurrency
            .get(&(function_name.to_string(), alias.to_string()))
            .copied()
    }
}

#[async_trait]
impl FunctionApi for FakeFunctions {
    async fn create_function(
        &self,
        config: &FunctionConfig,
        role_arn: &str,
        code: Vec<u8>,
    ) -> Result<FunctionDescriptor> {
        let mut inner = lock(&self.inner);
        inner.create_attempts.push(tokio::time::Instant::now());
        inner.calls.push(FunctionCall::CreateFunction {
            function: config.name.clone(),
        });

        if inner.propagation_failures > 0 {
            inner.propagation_failures -= 1;
            return Err(ProvisionError::RolePropagation(format!(
                "The role defined for the function cannot be assumed by Lambda: {}",
                role_arn
            )));
        }
        if inner.functions.contains_key(&config.name) {
            return Err(ProvisionError::remote(
                "CreateFunction",
                format!("Function already exist: {}", config.name),
            ));
        }

        let mut descriptor = FunctionDescriptor {
            name: config.name.clone(),
            arn: function_arn(&config.name),
            hash: code_hash(&code),
            version: Some("$LATEST".to_string()),
            ..Default::default()
        };
        apply_config(&mut descriptor, config, role_arn);
        inner.functions.insert(
            config.name.clone(),
            FunctionRecord {
                descriptor: descriptor.clone(),
                published: 1,
            },
        );

        descriptor.version = Some("1".to_string());
        Ok(descriptor)
    }

    async fn update_function_configuration(
        &self,
        config: &FunctionConfig,
        role_arn: &str,
    ) -> Result<FunctionDescriptor> {
        let mut inner = lock(&self.inner);
        inner.calls.push(FunctionCall::UpdateConfiguration {
            function: config.name.clone(),
        });
        let record = inner
            .functions
            .get_mut(&config.name)
            .ok_or_else(|| function_not_found(&config.name))?;
        apply_config(&mut record.descriptor, config, role_arn);
        Ok(record.descriptor.clone())
    }

    async fn put_function_event_invoke_config(
        &self,
        function_name: &str,
        max_retry_attempts: i32,
    ) -> Result<()> {
        let mut inner = lock(&self.inner);
        inner.calls.push(FunctionCall::PutEventInvokeConfig {
            function: function_name.to_string(),
            max_retry_attempts,
        });
        if inner.event_invoke_failures > 0 {
            inner.event_invoke_failures -= 1;
            return Err(ProvisionError::remote(
                "PutFunctionEventInvokeConfig",
                "Rate exceeded",
            ));
        }
        if !inner.functions.contains_key(function_name) {
            return Err(function_not_found(function_name));
        }
        Ok(())
    }

    async fn update_function_code(
        &self,
        function_name: &str,
        code: Vec<u8>,
    ) -> Result<FunctionDescriptor> {
        let mut inner = lock(&self.inner);
        inner.calls.push(FunctionCall::UpdateCode {
            function: function_name.to_string(),
        });
        let record = inner
            .functions
            .get_mut(function_name)
            .ok_or_else(|| function_not_found(function_name))?;
        record.published += 1;
        record.descriptor.hash = code_hash(&code);

        let mut descriptor = record.descriptor.clone();
        descriptor.version = Some(record.published.to_string());
        Ok(descriptor)
    }

    async fn get_function_configuration(&self, function_name: &str) -> Result<FunctionDescriptor> {
        lock(&self.inner)
            .functions
            .get(function_name)
            .map(|record| record.descriptor.clone())
            .ok_or_else(|| function_not_found(function_name))
    }

    async fn delete_function(&self, function_name: &str) -> Result<()> {
        let mut inner = lock(&self.inner);
        inner.calls.push(FunctionCall::DeleteFunction {
            function: function_name.to_string(),
        });
        if inner.functions.remove(function_name).is_none() {
            return Err(function_not_found(function_name));
        }
        inner.aliases.retain(|(f, _), _| f != function_name);
        inner.concurrency.retain(|(f, _), _| f != function_name);
        Ok(())
    }

    async fn get_alias(&self, function_name: &str, alias: &str) -> Result<AliasDescriptor> {
        lock(&self.inner)
            .aliases
            .get(&(function_name.to_string(), alias.to_string()))
            .cloned()
            .ok_or_else(|| alias_not_found(function_name, alias))
    }

    async fn create_alias(
        &self,
        function_name: &str,
        alias: &str,
        version: &str,
    ) -> Result<AliasDescriptor> {
        let mut inner = lock(&self.inner);
        inner.calls.push(FunctionCall::CreateAlias {
            function: function_name.to_string(),
            alias: alias.to_string(),
            version: version.to_string(),
        });
        if !inner.functions.contains_key(function_name) {
            return Err(function_not_found(function_name));
        }
        let key = (function_name.to_string(), alias.to_string());
        if inner.aliases.contains_key(&key) {
            return Err(ProvisionError::remote(
                "CreateAlias",
                format!("Alias already exists: {}:{}", function_name, alias),
            ));
        }

        let descriptor = AliasDescriptor {
            name: alias.to_string(),
            arn: format!("{}:{}", function_arn(function_name), alias),
            function_version: version.to_string(),
            routing: BTreeMap::new(),
        };
        inner.aliases.insert(key, descriptor.clone());
        Ok(descriptor)
    }

    async fn update_alias(
        &self,
        function_name: &str,
        alias: &str,
        version: &str,
    ) -> Result<AliasDescriptor> {
        let mut inner = lock(&self.inner);
        inner.calls.push(FunctionCall::UpdateAlias {
            function: function_name.to_string(),
            alias: alias.to_string(),
            version: version.to_string(),
        });
        let descriptor = inner
            .aliases
            .get_mut(&(function_name.to_string(), alias.to_string()))
            .ok_or_else(|| alias_not_found(function_name, alias))?;
        descriptor.function_version = version.to_string();
        Ok(descriptor.clone())
    }

    async fn delete_alias(&self, function_name: &str, alias: &str) -> Result<()> {
        let mut inner = lock(&self.inner);
        inner.calls.push(FunctionCall::DeleteAlias {
            function: function_name.to_string(),
            alias: alias.to_string(),
        });
        let key = (function_name.to_string(), alias.to_string());
        if inner.aliases.remove(&key).is_none() {
            return Err(alias_not_found(function_name, alias));
        }
        inner.concurrency.remove(&key);
        Ok(())
    }

    async fn put_provisioned_concurrency_config(
        &self,
        function_name: &str,
        qualifier: &str,
        executions: i32,
    ) -> Result<ConcurrencyDescriptor> {
        let mut inner = lock(&self.inner);
        inner.calls.push(FunctionCall::PutProvisionedConcurrency {
            function: function_name.to_string(),
            alias: qualifier.to_string(),
            executions,
        });
        let key = (function_name.to_string(), qualifier.to_string());
        if !inner.aliases.contains_key(&key) {
            return Err(alias_not_found(function_name, qualifier));
        }
        inner.concurrency.insert(key, executions);

        Ok(ConcurrencyDescriptor {
            requested: executions,
            allocated: 0,
            status: Some("IN_PROGRESS".to_string()),
        })
    }
}

// ============================================================================
// Tokens and metrics
// ============================================================================

#[derive(Default)]
struct TokensInner {
    denied: bool,
    assumed: Vec<(String, Duration)>,
}

#[derive(Default)]
pub struct FakeTokens {
    inner: Mutex<TokensInner>,
}

impl FakeTokens {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every further assume-role call
    pub fn deny(&self) {
        lock(&self.inner).denied = true;
    }

    /// (role ARN, session duration) of every successful assume-role call
    pub fn assumed(&self) -> Vec<(String, Duration)> {
        lock(&self.inner).assumed.clone()
    }
}

#[async_trait]
impl TokenApi for FakeTokens {
    async fn assume_role(
        &self,
        role_arn: &str,
        _session_name: &str,
        duration: Duration,
    ) -> Result<TemporaryCredentials> {
        let mut inner = lock(&self.inner);
        if inner.denied {
            return Err(ProvisionError::remote(
                "AssumeRole",
                format!("AccessDenied: not authorized to assume {}", role_arn),
            ));
        }
        inner.assumed.push((role_arn.to_string(), duration));

        Ok(TemporaryCredentials {
            access_key_id: "ASIAFAKEACCESSKEY".to_string(),
            secret_access_key: "fake-secret".to_string(),
            session_token: "fake-token".to_string(),
            expiration: None,
        })
    }
}

#[derive(Default)]
pub struct FakeMetrics {
    queries: Mutex<Vec<MetricsQuery>>,
}

impl FakeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queries(&self) -> Vec<MetricsQuery> {
        lock(&self.queries).clone()
    }
}

#[async_trait]
impl MetricsApi for FakeMetrics {
    async fn get_metrics(
        &self,
        _region: &str,
        _credentials: &TemporaryCredentials,
        query: &MetricsQuery,
    ) -> Result<MetricsReport> {
        lock(&self.queries).push(query.clone());

        let series = query
            .metrics
            .iter()
            .map(|metric| MetricSeries {
                id: metric.id.clone(),
                label: metric.metric_name.clone(),
                points: vec![MetricPoint {
                    timestamp: query.start,
                    value: 1.0,
                }],
            })
            .collect();

        Ok(MetricsReport {
            function_name: query.function_name.clone(),
            start: query.start,
            end: query.end,
            period_secs: query.period_secs,
            series,
        })
    }
}
