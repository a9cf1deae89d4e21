//! Function input and its normalized configuration record
//!
//! User input arrives with every field optional. [`normalize`] merges it with
//! the stored [`DeploymentState`] and the defaults below into a complete
//! [`FunctionConfig`] that the rest of an operation treats as immutable.

use crate::state::DeploymentState;
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const DEFAULT_ALIAS_NAME: &str = "provisioned";
pub const DEFAULT_HANDLER: &str = "handler.handler";
pub const DEFAULT_MEMORY: i32 = 1028;
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_RUNTIME: &str = "nodejs12.x";
pub const DEFAULT_TIMEOUT: i32 = 10;
pub const DEFAULT_RETRY: i32 = 0;

const NAME_SUFFIX_LEN: usize = 8;

/// Identity of one deployment: the instance name and the stage it runs in
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeploymentId {
    pub instance: String,
    pub stage: String,
}

impl DeploymentId {
    pub fn new(instance: impl Into<String>, stage: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            stage: stage.into(),
        }
    }

    /// Key used in the state file (`instance:stage`)
    pub fn key(&self) -> String {
        format!("{}:{}", self.instance, self.stage)
    }
}

impl std::fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.instance, self.stage)
    }
}

/// Network placement of the function
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VpcConfigInput {
    pub security_group_ids: Vec<String>,
    pub subnet_ids: Vec<String>,
}

/// Raw user input as written in the project file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FunctionInput {
    pub name: Option<String>,
    pub role_name: Option<String>,
    pub description: Option<String>,
    pub handler: Option<String>,
    pub runtime: Option<String>,
    pub memory: Option<i32>,
    pub timeout: Option<i32>,
    pub src: Option<PathBuf>,
    pub env: Option<BTreeMap<String, String>>,
    pub region: Option<String>,
    pub layers: Option<Vec<String>>,
    pub vpc_config: Option<VpcConfigInput>,
    pub retry: Option<i32>,
    pub alias_name: Option<String>,
    pub provisioned_concurrency: Option<i32>,
    pub monitoring: Option<bool>,
}

/// Normalized function configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionConfig {
    pub name: String,
    /// Explicit execution role; `None` means the default role is managed
    pub role_name: Option<String>,
    pub description: String,
    pub handler: String,
    pub runtime: String,
    pub memory: i32,
    pub timeout: i32,
    pub src: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub region: String,
    pub layers: Vec<String>,
    pub security_group_ids: Vec<String>,
    pub subnet_ids: Vec<String>,
    pub retry: i32,
    pub alias_name: String,
    pub provisioned_concurrency: i32,
    pub monitoring: bool,
}

impl FunctionConfig {
    pub fn has_vpc(&self) -> bool {
        !self.security_group_ids.is_empty() || !self.subnet_ids.is_empty()
    }
}

/// Region resolution shared with the CLI, which needs it before any client exists
pub fn resolve_region(input: &FunctionInput, state: &DeploymentState) -> String {
    input
        .region
        .clone()
        .or_else(|| state.region.clone())
        .unwrap_or_else(|| DEFAULT_REGION.to_string())
}

pub fn default_description(id: &DeploymentId) -> String {
    format!(
        "An AWS Lambda function from the AWS Lambda LambdaFlow Component.  Name: \"{}\" Stage: \"{}\"",
        id.instance, id.stage
    )
}

/// Lowercase alphanumeric suffix for generated function names
pub fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NAME_SUFFIX_LEN)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect()
}

/// Build the configuration record for one operation
pub fn normalize(
    input: &FunctionInput,
    id: &DeploymentId,
    state: &DeploymentState,
) -> FunctionConfig {
    normalize_with(input, id, state, random_suffix)
}

/// [`normalize`] with an injectable name suffix source
pub fn normalize_with(
    input: &FunctionInput,
    id: &DeploymentId,
    state: &DeploymentState,
    suffix: impl FnOnce() -> String,
) -> FunctionConfig {
    let name = input
        .name
        .clone()
        .or_else(|| state.name.clone())
        .unwrap_or_else(|| format!("{}-{}-{}", id.instance, id.stage, suffix()));

    let vpc = input.vpc_config.clone().unwrap_or_default();

    FunctionConfig {
        name,
        role_name: input.role_name.clone(),
        description: input
            .description
            .clone()
            .unwrap_or_else(|| default_description(id)),
        handler: input
            .handler
            .clone()
            .unwrap_or_else(|| DEFAULT_HANDLER.to_string()),
        runtime: input
            .runtime
            .clone()
            .unwrap_or_else(|| DEFAULT_RUNTIME.to_string()),
        memory: input.memory.unwrap_or(DEFAULT_MEMORY),
        timeout: input.timeout.unwrap_or(DEFAULT_TIMEOUT),
        src: input.src.clone(),
        env: input.env.clone().unwrap_or_default(),
        region: resolve_region(input, state),
        layers: input.layers.clone().unwrap_or_default(),
        security_group_ids: vpc.security_group_ids,
        subnet_ids: vpc.subnet_ids,
        retry: input.retry.unwrap_or(DEFAULT_RETRY),
        alias_name: input
            .alias_name
            .clone()
            .unwrap_or_else(|| DEFAULT_ALIAS_NAME.to_string()),
        provisioned_concurrency: input.provisioned_concurrency.unwrap_or(0),
        monitoring: input.monitoring.unwrap_or(true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> DeploymentId {
        DeploymentId::new("api", "dev")
    }

    fn full_input() -> FunctionInput {
        FunctionInput {
            name: Some("orders".to_string()),
            role_name: Some("orders-role".to_string()),
            description: Some("Order processing".to_string()),
            handler: Some("index.main".to_string()),
            runtime: Some("nodejs18.x".to_string()),
            memory: Some(512),
            timeout: Some(30),
            src: Some(PathBuf::from("./dist/orders.zip")),
            env: Some(BTreeMap::from([("TABLE".into(), "orders".into())])),
            region: Some("eu-west-1".to_string()),
            layers: Some(vec![
                "arn:aws:lambda:eu-west-1:123456789012:layer:a:1".to_string(),
                "arn:aws:lambda:eu-west-1:123456789012:layer:b:4".to_string(),
            ]),
            vpc_config: Some(VpcConfigInput {
                security_group_ids: vec!["sg-1".to_string()],
                subnet_ids: vec!["subnet-1".to_string(), "subnet-2".to_string()],
            }),
            retry: Some(2),
            alias_name: Some("live".to_string()),
            provisioned_concurrency: Some(5),
            monitoring: Some(false),
        }
    }

    #[test]
    fn test_defaults() {
        let state = DeploymentState::default();
        let suffix = || "abc123xy".to_string();
        let config = normalize_with(&FunctionInput::default(), &id(), &state, suffix);

        assert_eq!(config.name, "api-dev-abc123xy");
        assert_eq!(config.alias_name, "provisioned");
        assert_eq!(config.handler, "handler.handler");
        assert_eq!(config.memory, 1028);
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.runtime, "nodejs12.x");
        assert_eq!(config.timeout, 10);
        assert_eq!(config.retry, 0);
        assert_eq!(config.provisioned_concurrency, 0);
        assert!(config.monitoring);
        assert!(config.env.is_empty());
        assert!(config.layers.is_empty());
        assert!(!config.has_vpc());
        assert!(config.description.contains("Name: \"api\" Stage: \"dev\""));
    }

    #[test]
    fn test_generated_name_contains_instance_and_stage() {
        let state = DeploymentState::default();
        for _ in 0..20 {
            let config = normalize(&FunctionInput::default(), &id(), &state);
            assert!(!config.name.is_empty());
            assert!(config.name.contains("api"));
            assert!(config.name.contains("dev"));
            assert_eq!(config.name.len(), "api-dev-".len() + NAME_SUFFIX_LEN);
        }
    }

    #[test]
    fn test_name_resolution_order() {
        let state = DeploymentState {
            name: Some("stored-name".to_string()),
            ..Default::default()
        };

        let from_state = normalize(&FunctionInput::default(), &id(), &state);
        assert_eq!(from_state.name, "stored-name");

        let input = FunctionInput {
            name: Some("explicit".to_string()),
            ..Default::default()
        };
        assert_eq!(normalize(&input, &id(), &state).name, "explicit");
    }

    #[test]
    fn test_full_input_is_kept_verbatim() {
        let input = full_input();
        let config = normalize(&input, &id(), &DeploymentState::default());
        let vpc = input.vpc_config.clone().unwrap();

        assert_eq!(Some(config.name), input.name);
        assert_eq!(config.role_name, input.role_name);
        assert_eq!(Some(config.description), input.description);
        assert_eq!(Some(config.handler), input.handler);
        assert_eq!(Some(config.runtime), input.runtime);
        assert_eq!(Some(config.memory), input.memory);
        assert_eq!(Some(config.timeout), input.timeout);
        assert_eq!(config.src, input.src);
        assert_eq!(Some(config.env), input.env);
        assert_eq!(Some(config.region), input.region);
        assert_eq!(Some(config.layers), input.layers);
        assert_eq!(config.security_group_ids, vpc.security_group_ids);
        assert_eq!(config.subnet_ids, vpc.subnet_ids);
        assert_eq!(Some(config.retry), input.retry);
        assert_eq!(Some(config.alias_name), input.alias_name);
        assert_eq!(
            Some(config.provisioned_concurrency),
            input.provisioned_concurrency
        );
        assert_eq!(Some(config.monitoring), input.monitoring);
    }

    #[test]
    fn test_region_falls_back_to_state() {
        let state = DeploymentState {
            region: Some("ap-northeast-1".to_string()),
            ..Default::default()
        };
        assert_eq!(
            resolve_region(&FunctionInput::default(), &state),
            "ap-northeast-1"
        );
    }

    #[test]
    fn test_input_from_yaml_style_json() {
        let input: FunctionInput = serde_json::from_value(serde_json::json!({
            "name": "fn1",
            "src": "./code.zip",
            "vpcConfig": { "securityGroupIds": ["sg-1"] },
            "provisionedConcurrency": 2
        }))
        .unwrap();

        assert_eq!(input.name.as_deref(), Some("fn1"));
        assert_eq!(input.vpc_config.unwrap().security_group_ids, vec!["sg-1"]);
        assert!(input.memory.is_none());
        assert_eq!(input.provisioned_concurrency, Some(2));
    }
}
