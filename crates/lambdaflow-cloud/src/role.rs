//! Execution role and monitoring meta role management

use crate::api::IdentityApi;
use crate::config::FunctionConfig;
use crate::error::{ProvisionError, Result};
use crate::model::{RoleDescriptor, RoleSpec};
use crate::state::{DeploymentState, FunctionRole, MetaRole};
use serde_json::json;
use std::sync::Arc;

pub const LAMBDA_BASIC_EXECUTION_POLICY: &str =
    "arn:aws:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole";

/// Account that reads metrics and logs through the meta role
pub const DEFAULT_MONITORING_ACCOUNT: &str = "802587217904";

const META_POLICY_NAME: &str = "lambdaflow-meta-read";

pub fn default_role_name(function_name: &str) -> String {
    format!("{}-lambda-role", function_name)
}

pub fn meta_role_name(function_name: &str) -> String {
    format!("{}-meta-role", function_name)
}

/// Ensures the roles a deployment depends on
pub struct RoleManager {
    identity: Arc<dyn IdentityApi>,
    monitoring_account: String,
}

impl RoleManager {
    pub fn new(identity: Arc<dyn IdentityApi>) -> Self {
        Self {
            identity,
            monitoring_account: DEFAULT_MONITORING_ACCOUNT.to_string(),
        }
    }

    pub fn with_monitoring_account(mut self, account: impl Into<String>) -> Self {
        self.monitoring_account = account.into();
        self
    }

    pub async fn lookup(&self, name: &str) -> Result<Option<RoleDescriptor>> {
        match self.identity.get_role(name).await {
            Ok(role) => Ok(Some(role)),
            Err(ProvisionError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Resolve the role the function executes as and record it in `state`.
    ///
    /// An explicit role must already exist; otherwise the default role
    /// `{name}-lambda-role` is created or updated.
    pub async fn ensure_function_role(
        &self,
        config: &FunctionConfig,
        state: &mut DeploymentState,
    ) -> Result<FunctionRole> {
        let role = match &config.role_name {
            Some(role_name) => {
                let Some(role) = self.lookup(role_name).await? else {
                    return Err(ProvisionError::NotFound(format!("role {}", role_name)));
                };
                tracing::info!("Using execution role {}", role.arn);
                FunctionRole::User { arn: role.arn }
            }
            None => {
                let spec = default_role_spec(&config.name);
                let role = self.identity.put_role(&spec).await?;
                tracing::info!("Default execution role {} is ready", role.name);
                FunctionRole::Default {
                    name: role.name,
                    arn: role.arn,
                }
            }
        };

        state.set_role(role.clone());
        Ok(role)
    }

    /// Create or update the meta role when monitoring is enabled
    pub async fn ensure_meta_role(
        &self,
        config: &FunctionConfig,
        state: &mut DeploymentState,
    ) -> Result<Option<MetaRole>> {
        if !config.monitoring {
            tracing::debug!("Monitoring disabled, skipping meta role");
            return Ok(None);
        }

        let spec = self.meta_role_spec(&config.name, state.aws_account_id.as_deref());
        let RoleDescriptor { name, arn } = self.identity.put_role(&spec).await?;
        tracing::info!("Meta role {} is ready", name);

        let meta_role = MetaRole { name, arn };
        state.meta_role = Some(meta_role.clone());
        Ok(Some(meta_role))
    }

    /// Delete the roles owned by the deployment. User roles are left alone.
    pub async fn remove_roles(&self, state: &mut DeploymentState) -> Result<()> {
        if let Some(FunctionRole::Default { name, .. }) = &state.role {
            self.delete_ignoring_absent(name).await?;
        }
        state.role = None;

        if let Some(meta_role) = state.meta_role.take() {
            self.delete_ignoring_absent(&meta_role.name).await?;
        }
        Ok(())
    }

    async fn delete_ignoring_absent(&self, name: &str) -> Result<()> {
        match self.identity.delete_role(name).await {
            Ok(()) => {
                tracing::info!("Deleted role {}", name);
                Ok(())
            }
            Err(ProvisionError::NotFound(_)) => {
                tracing::warn!("Role {} was already deleted", name);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Trust the monitoring account, plus the deploying account so the
    /// `metrics` command can assume the role too
    pub fn meta_role_spec(&self, function_name: &str, own_account: Option<&str>) -> RoleSpec {
        let mut principals = vec![format!("arn:aws:iam::{}:root", self.monitoring_account)];
        if let Some(account) = own_account.filter(|a| *a != self.monitoring_account) {
            principals.push(format!("arn:aws:iam::{}:root", account));
        }

        RoleSpec {
            name: meta_role_name(function_name),
            description: format!("Read-only monitoring access to {}", function_name),
            trust_policy: json!({
                "Version": "2012-10-17",
                "Statement": [{
                    "Effect": "Allow",
                    "Principal": { "AWS": principals },
                    "Action": "sts:AssumeRole"
                }]
            }),
            managed_policy_arns: Vec::new(),
            inline_policies: vec![(
                META_POLICY_NAME.to_string(),
                json!({
                    "Version": "2012-10-17",
                    "Statement": [{
                        "Effect": "Allow",
                        "Action": [
                            "cloudwatch:Describe*",
                            "cloudwatch:Get*",
                            "cloudwatch:List*",
                            "logs:Describe*",
                            "logs:FilterLogEvents",
                            "logs:Get*",
                            "logs:List*",
                            "logs:StartQuery",
                            "logs:StopQuery",
                            "logs:TestMetricFilter"
                        ],
                        "Resource": "*"
                    }]
                }),
            )],
        }
    }
}

pub fn default_role_spec(function_name: &str) -> RoleSpec {
    RoleSpec {
        name: default_role_name(function_name),
        description: format!("Execution role of {}", function_name),
        trust_policy: json!({
            "Version": "2012-10-17",
            "Statement": [{
                "Effect": "Allow",
                "Principal": { "Service": ["lambda.amazonaws.com"] },
                "Action": "sts:AssumeRole"
            }]
        }),
        managed_policy_arns: vec![LAMBDA_BASIC_EXECUTION_POLICY.to_string()],
        inline_policies: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeploymentId, FunctionInput, normalize};
    use crate::testing::FakeIdentity;

    fn config(input: FunctionInput) -> FunctionConfig {
        let id = DeploymentId::new("api", "dev");
        normalize(&input, &id, &DeploymentState::default())
    }

    fn named(name: &str) -> FunctionInput {
        FunctionInput {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_missing_user_role_is_not_found_and_state_untouched() {
        let identity = Arc::new(FakeIdentity::new());
        let manager = RoleManager::new(identity.clone());
        let mut state = DeploymentState {
            name: Some("fn1".to_string()),
            ..Default::default()
        };
        let before = state.clone();

        let config = config(FunctionInput {
            role_name: Some("missing".to_string()),
            ..named("fn1")
        });
        let result = manager.ensure_function_role(&config, &mut state).await;

        assert!(matches!(result, Err(ProvisionError::NotFound(_))));
        assert_eq!(state, before);
    }

    #[tokio::test]
    async fn test_user_role_replaces_default_role() {
        let identity = Arc::new(FakeIdentity::new());
        identity.insert_role("custom", "arn:aws:iam::111111111111:role/custom");
        let manager = RoleManager::new(identity.clone());

        let mut state = DeploymentState::default();
        manager
            .ensure_function_role(&config(named("fn1")), &mut state)
            .await
            .unwrap();
        assert!(state.role.as_ref().unwrap().is_default());

        let role = manager
            .ensure_function_role(
                &config(FunctionInput {
                    role_name: Some("custom".to_string()),
                    ..named("fn1")
                }),
                &mut state,
            )
            .await
            .unwrap();

        assert_eq!(
            role,
            FunctionRole::User {
                arn: "arn:aws:iam::111111111111:role/custom".to_string()
            }
        );
        assert_eq!(state.role, Some(role));
        assert_eq!(state.aws_account_id.as_deref(), Some("111111111111"));
    }

    #[tokio::test]
    async fn test_default_role_is_idempotent() {
        let identity = Arc::new(FakeIdentity::new());
        let manager = RoleManager::new(identity.clone());
        let mut state = DeploymentState::default();
        let config = config(named("fn1"));

        let first = manager
            .ensure_function_role(&config, &mut state)
            .await
            .unwrap();
        let second = manager
            .ensure_function_role(&config, &mut state)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(identity.role_names(), vec!["fn1-lambda-role".to_string()]);
        let spec = identity.role_spec("fn1-lambda-role").unwrap();
        assert_eq!(
            spec.managed_policy_arns,
            vec![LAMBDA_BASIC_EXECUTION_POLICY]
        );
    }

    #[tokio::test]
    async fn test_meta_role_respects_monitoring_flag() {
        let identity = Arc::new(FakeIdentity::new());
        let manager = RoleManager::new(identity.clone());
        let mut state = DeploymentState::default();

        let disabled = config(FunctionInput {
            monitoring: Some(false),
            ..named("fn1")
        });
        let skipped = manager
            .ensure_meta_role(&disabled, &mut state)
            .await
            .unwrap();
        assert!(skipped.is_none());
        assert!(state.meta_role.is_none());

        let meta = manager
            .ensure_meta_role(&config(named("fn1")), &mut state)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(meta.name, "fn1-meta-role");
        assert_eq!(state.meta_role, Some(meta));
    }

    #[test]
    fn test_meta_role_trusts_monitoring_and_own_account() {
        let manager = RoleManager::new(Arc::new(FakeIdentity::new()));
        let spec = manager.meta_role_spec("fn1", Some("123456789012"));
        let principals = &spec.trust_policy["Statement"][0]["Principal"]["AWS"];

        assert_eq!(principals[0], "arn:aws:iam::802587217904:root");
        assert_eq!(principals[1], "arn:aws:iam::123456789012:root");
        let policy = spec.inline_policies[0].1.to_string();
        assert!(policy.contains("logs:StartQuery"));
    }

    #[tokio::test]
    async fn test_remove_roles_keeps_user_role() {
        let identity = Arc::new(FakeIdentity::new());
        identity.insert_role("custom", "arn:aws:iam::111111111111:role/custom");
        let manager = RoleManager::new(identity.clone());
        let mut state = DeploymentState::default();
        let config = config(FunctionInput {
            role_name: Some("custom".to_string()),
            ..named("fn1")
        });

        manager
            .ensure_function_role(&config, &mut state)
            .await
            .unwrap();
        manager.ensure_meta_role(&config, &mut state).await.unwrap();
        manager.remove_roles(&mut state).await.unwrap();

        assert!(state.role.is_none());
        assert!(state.meta_role.is_none());
        assert_eq!(identity.role_names(), vec!["custom".to_string()]);
    }
}
