//! Lambda implementation of [`FunctionApi`]

use crate::error::classify;
use async_trait::async_trait;
use aws_sdk_lambda::Client;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::{Environment, FunctionCode, Runtime, VpcConfig};
use lambdaflow_cloud::{
    AliasDescriptor, ConcurrencyDescriptor, FunctionApi, FunctionConfig, FunctionDescriptor,
    Result,
};

/// The create, update and get outputs share the function configuration shape
macro_rules! function_descriptor {
    ($out:expr) => {{
        let out = $out;
        FunctionDescriptor {
            name: out.function_name().unwrap_or_default().to_string(),
            arn: out.function_arn().unwrap_or_default().to_string(),
            description: out.description().unwrap_or_default().to_string(),
            runtime: out
                .runtime()
                .map(|r| r.as_str().to_string())
                .unwrap_or_default(),
            role_arn: out.role().unwrap_or_default().to_string(),
            handler: out.handler().unwrap_or_default().to_string(),
            memory: out.memory_size().unwrap_or_default(),
            timeout: out.timeout().unwrap_or_default(),
            env: out
                .environment()
                .and_then(|e| e.variables())
                .map(|vars| vars.clone().into_iter().collect())
                .unwrap_or_default(),
            hash: out.code_sha256().unwrap_or_default().to_string(),
            version: out.version().map(str::to_string),
            layers: out
                .layers()
                .iter()
                .filter_map(|l| l.arn())
                .map(str::to_string)
                .collect(),
            security_group_ids: out
                .vpc_config()
                .map(|v| v.security_group_ids().to_vec())
                .unwrap_or_default(),
            subnet_ids: out
                .vpc_config()
                .map(|v| v.subnet_ids().to_vec())
                .unwrap_or_default(),
        }
    }};
}

macro_rules! alias_descriptor {
    ($out:expr) => {{
        let out = $out;
        AliasDescriptor {
            name: out.name().unwrap_or_default().to_string(),
            arn: out.alias_arn().unwrap_or_default().to_string(),
            function_version: out.function_version().unwrap_or_default().to_string(),
            routing: out
                .routing_config()
                .and_then(|r| r.additional_version_weights())
                .map(|w| w.iter().map(|(k, v)| (k.clone(), *v)).collect())
                .unwrap_or_default(),
        }
    }};
}

pub struct LambdaFunctions {
    client: Client,
}

impl LambdaFunctions {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn environment(config: &FunctionConfig) -> Environment {
    Environment::builder()
        .set_variables(Some(config.env.clone().into_iter().collect()))
        .build()
}

/// Empty lists detach the function from its VPC
fn vpc_config(config: &FunctionConfig) -> VpcConfig {
    VpcConfig::builder()
        .set_security_group_ids(Some(config.security_group_ids.clone()))
        .set_subnet_ids(Some(config.subnet_ids.clone()))
        .build()
}

#[async_trait]
impl FunctionApi for LambdaFunctions {
    async fn create_function(
        &self,
        config: &FunctionConfig,
        role_arn: &str,
        code: Vec<u8>,
    ) -> Result<FunctionDescriptor> {
        let mut request = self
            .client
            .create_function()
            .function_name(&config.name)
            .description(&config.description)
            .handler(&config.handler)
            .runtime(Runtime::from(config.runtime.as_str()))
            .role(role_arn)
            .memory_size(config.memory)
            .timeout(config.timeout)
            .environment(environment(config))
            .set_layers(Some(config.layers.clone()))
            .code(FunctionCode::builder().zip_file(Blob::new(code)).build())
            .publish(true);

        if config.has_vpc() {
            request = request.vpc_config(vpc_config(config));
        }

        let out = request
            .send()
            .await
            .map_err(|e| classify("CreateFunction", e))?;
        Ok(function_descriptor!(&out))
    }

    async fn update_function_configuration(
        &self,
        config: &FunctionConfig,
        role_arn: &str,
    ) -> Result<FunctionDescriptor> {
        let out = self
            .client
            .update_function_configuration()
            .function_name(&config.name)
            .description(&config.description)
            .handler(&config.handler)
            .runtime(Runtime::from(config.runtime.as_str()))
            .role(role_arn)
            .memory_size(config.memory)
            .timeout(config.timeout)
            .environment(environment(config))
            .set_layers(Some(config.layers.clone()))
            .vpc_config(vpc_config(config))
            .send()
            .await
            .map_err(|e| classify("UpdateFunctionConfiguration", e))?;
        Ok(function_descriptor!(&out))
    }

    async fn put_function_event_invoke_config(
        &self,
        function_name: &str,
        max_retry_attempts: i32,
    ) -> Result<()> {
        self.client
            .put_function_event_invoke_config()
            .function_name(function_name)
            .maximum_retry_attempts(max_retry_attempts)
            .send()
            .await
            .map_err(|e| classify("PutFunctionEventInvokeConfig", e))?;
        Ok(())
    }

    async fn update_function_code(
        &self,
        function_name: &str,
        code: Vec<u8>,
    ) -> Result<FunctionDescriptor> {
        let out = self
            .client
            .update_function_code()
            .function_name(function_name)
            .zip_file(Blob::new(code))
            .publish(true)
            .send()
            .await
            .map_err(|e| classify("UpdateFunctionCode", e))?;
        Ok(function_descriptor!(&out))
    }

    async fn get_function_configuration(&self, function_name: &str) -> Result<FunctionDescriptor> {
        let out = self
            .client
            .get_function_configuration()
            .function_name(function_name)
            .send()
            .await
            .map_err(|e| classify("GetFunctionConfiguration", e))?;
        Ok(function_descriptor!(&out))
    }

    async fn delete_function(&self, function_name: &str) -> Result<()> {
        self.client
            .delete_function()
            .function_name(function_name)
            .send()
            .await
            .map_err(|e| classify("DeleteFunction", e))?;
        Ok(())
    }

    async fn get_alias(&self, function_name: &str, alias: &str) -> Result<AliasDescriptor> {
        let out = self
            .client
            .get_alias()
            .function_name(function_name)
            .name(alias)
            .send()
            .await
            .map_err(|e| classify("GetAlias", e))?;
        Ok(alias_descriptor!(&out))
    }

    async fn create_alias(
        &self,
        function_name: &str,
        alias: &str,
        version: &str,
    ) -> Result<AliasDescriptor> {
        let out = self
            .client
            .create_alias()
            .function_name(function_name)
            .name(alias)
            .function_version(version)
            .send()
            .await
            .map_err(|e| classify("CreateAlias", e))?;
        Ok(alias_descriptor!(&out))
    }

    async fn update_alias(
        &self,
        function_name: &str,
        alias: &str,
        version: &str,
    ) -> Result<AliasDescriptor> {
        let out = self
            .client
            .update_alias()
            .function_name(function_name)
            .name(alias)
            .function_version(version)
            .send()
            .await
            .map_err(|e| classify("UpdateAlias", e))?;
        Ok(alias_descriptor!(&out))
    }

    async fn delete_alias(&self, function_name: &str, alias: &str) -> Result<()> {
        self.client
            .delete_alias()
            .function_name(function_name)
            .name(alias)
            .send()
            .await
            .map_err(|e| classify("DeleteAlias", e))?;
        Ok(())
    }

    async fn put_provisioned_concurrency_config(
        &self,
        function_name: &str,
        qualifier: &str,
        executions: i32,
    ) -> Result<ConcurrencyDescriptor> {
        let out = self
            .client
            .put_provisioned_concurrency_config()
            .function_name(function_name)
            .qualifier(qualifier)
            .provisioned_concurrent_executions(executions)
            .send()
            .await
            .map_err(|e| classify("PutProvisionedConcurrencyConfig", e))?;

        Ok(ConcurrencyDescriptor {
            requested: out
                .requested_provisioned_concurrent_executions()
                .unwrap_or(executions),
            allocated: out
                .allocated_provisioned_concurrent_executions()
                .unwrap_or_default(),
            status: out.status().map(|s| s.as_str().to_string()),
        })
    }
}
