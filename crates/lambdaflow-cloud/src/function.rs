//! Function lifecycle: create, update, read and delete

use crate::api::FunctionApi;
use crate::config::FunctionConfig;
use crate::error::{ProvisionError, Result};
use crate::model::FunctionDescriptor;
use crate::retry::RetryPolicy;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;

/// Checksum in the format the control plane reports as the code hash
pub fn code_hash(code: &[u8]) -> String {
    STANDARD.encode(Sha256::digest(code))
}

/// Read the source archive named by the configuration
pub async fn read_archive(config: &FunctionConfig) -> Result<Vec<u8>> {
    let path = config.src.as_deref().ok_or_else(|| {
        ProvisionError::InvalidInput(format!("src is required to deploy {}", config.name))
    })?;
    read_archive_at(path).await
}

async fn read_archive_at(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|source| ProvisionError::Archive {
            path: path.to_path_buf(),
            source,
        })
}

pub struct FunctionManager {
    api: Arc<dyn FunctionApi>,
    retry: RetryPolicy,
}

impl FunctionManager {
    pub fn new(api: Arc<dyn FunctionApi>, retry: RetryPolicy) -> Self {
        Self { api, retry }
    }

    /// Create the function, retrying while the fresh role is not assumable yet
    pub async fn create(
        &self,
        config: &FunctionConfig,
        role_arn: &str,
    ) -> Result<FunctionDescriptor> {
        let code = read_archive(config).await?;
        tracing::info!("Creating function {} ({} bytes)", config.name, code.len());

        let api = &self.api;
        let created = self
            .retry
            .run("CreateFunction", move || {
                let code = code.clone();
                async move { api.create_function(config, role_arn, code).await }
            })
            .await?;

        tracing::info!(
            "Created function {} version {}",
            created.arn,
            created.version.as_deref().unwrap_or("-")
        );
        Ok(created)
    }

    /// Update configuration, then the async-invoke retry count.
    ///
    /// The two calls are not atomic: if the second one fails the first stays
    /// applied and the error is returned.
    pub async fn update_configuration(
        &self,
        config: &FunctionConfig,
        role_arn: &str,
    ) -> Result<FunctionDescriptor> {
        tracing::info!("Updating configuration of {}", config.name);
        let updated = self
            .api
            .update_function_configuration(config, role_arn)
            .await?;
        self.put_retry_attempts(&config.name, config.retry).await?;
        Ok(updated)
    }

    /// Retry count for asynchronous invocations
    pub async fn put_retry_attempts(&self, function_name: &str, attempts: i32) -> Result<()> {
        tracing::debug!(
            "Setting async retry attempts of {} to {}",
            function_name,
            attempts
        );
        self.api
            .put_function_event_invoke_config(function_name, attempts)
            .await
    }

    /// Upload the archive again and publish a new version
    pub async fn update_code(&self, config: &FunctionConfig) -> Result<FunctionDescriptor> {
        let code = read_archive(config).await?;
        tracing::info!("Updating code of {} ({} bytes)", config.name, code.len());
        self.api.update_function_code(&config.name, code).await
    }

    pub async fn get(&self, function_name: &str) -> Result<Option<FunctionDescriptor>> {
        match self
            .api
            .get_function_configuration(function_name)
            .await
        {
            Ok(descriptor) => Ok(Some(descriptor)),
            Err(ProvisionError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Delete the function; an already deleted function is not an error
    pub async fn delete(&self, function_name: &str) -> Result<()> {
        match self.api.delete_function(function_name).await {
            Ok(()) => {
                tracing::info!("Deleted function {}", function_name);
                Ok(())
            }
            Err(ProvisionError::NotFound(_)) => {
                tracing::warn!("Function {} was already deleted", function_name);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
