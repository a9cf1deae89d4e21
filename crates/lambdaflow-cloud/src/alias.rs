//! Alias and provisioned concurrency management
//!
//! An alias keyed by (function, alias name) is either absent or points at one
//! published version. Provisioned concurrency is attached to the alias and
//! goes away with it.

use crate::api::FunctionApi;
use crate::error::{ProvisionError, Result};
use crate::model::{AliasDescriptor, ConcurrencyDescriptor};
use std::sync::Arc;

pub struct AliasManager {
    api: Arc<dyn FunctionApi>,
}

impl AliasManager {
    pub fn new(api: Arc<dyn FunctionApi>) -> Self {
        Self { api }
    }

    /// Absent aliases are `None`, not an error
    pub async fn get(&self, function_name: &str, alias: &str) -> Result<Option<AliasDescriptor>> {
        match self.api.get_alias(function_name, alias).await {
            Ok(descriptor) => Ok(Some(descriptor)),
            Err(ProvisionError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn create(
        &self,
        function_name: &str,
        alias: &str,
        version: &str,
    ) -> Result<AliasDescriptor> {
        tracing::info!("Creating alias {}:{} -> {}", function_name, alias, version);
        self.api.create_alias(function_name, alias, version).await
    }

    pub async fn update(
        &self,
        function_name: &str,
        alias: &str,
        version: &str,
    ) -> Result<AliasDescriptor> {
        tracing::info!("Pointing alias {}:{} at {}", function_name, alias, version);
        self.api.update_alias(function_name, alias, version).await
    }

    pub async fn delete(&self, function_name: &str, alias: &str) -> Result<()> {
        tracing::info!("Deleting alias {}:{}", function_name, alias);
        self.api.delete_alias(function_name, alias).await
    }

    /// Create the alias or repoint it so that it targets `version`
    pub async fn ensure(
        &self,
        function_name: &str,
        alias: &str,
        version: &str,
    ) -> Result<AliasDescriptor> {
        match self.get(function_name, alias).await? {
            None => self.create(function_name, alias, version).await,
            Some(existing) if existing.function_version == version => {
                tracing::debug!("Alias {}:{} already at {}", function_name, alias, version);
                Ok(existing)
            }
            Some(_) => self.update(function_name, alias, version).await,
        }
    }

    /// Set provisioned concurrency on an existing alias.
    ///
    /// Allocation may still lag behind the request when this returns.
    pub async fn put_provisioned_concurrency(
        &self,
        function_name: &str,
        alias: &str,
        executions: i32,
    ) -> Result<ConcurrencyDescriptor> {
        let descriptor = self
            .api
            .put_provisioned_concurrency_config(function_name, alias, executions)
            .await?;
        if !descriptor.is_converged() {
            tracing::info!(
                "Provisioned concurrency of {}:{} is warming up ({}/{})",
                function_name,
                alias,
                descriptor.allocated,
                descriptor.requested
            );
        }
        Ok(descriptor)
    }
}
