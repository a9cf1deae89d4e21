//! IAM implementation of [`IdentityApi`]

use crate::error::classify;
use async_trait::async_trait;
use aws_sdk_iam::Client;
use lambdaflow_cloud::{IdentityApi, ProvisionError, Result, RoleDescriptor, RoleSpec};

pub struct IamIdentity {
    client: Client,
}

impl IamIdentity {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn create_role(&self, spec: &RoleSpec) -> Result<RoleDescriptor> {
        let out = self
            .client
            .create_role()
            .role_name(&spec.name)
            .description(&spec.description)
            .assume_role_policy_document(spec.trust_policy.to_string())
            .send()
            .await
            .map_err(|e| classify("CreateRole", e))?;
        tracing::debug!("Created role {}", spec.name);

        let role = out
            .role()
            .ok_or_else(|| ProvisionError::remote("CreateRole", "response carried no role"))?;
        Ok(RoleDescriptor {
            name: role.role_name().to_string(),
            arn: role.arn().to_string(),
        })
    }

    async fn update_trust_policy(&self, spec: &RoleSpec) -> Result<()> {
        self.client
            .update_assume_role_policy()
            .role_name(&spec.name)
            .policy_document(spec.trust_policy.to_string())
            .send()
            .await
            .map_err(|e| classify("UpdateAssumeRolePolicy", e))?;
        Ok(())
    }
}

#[async_trait]
impl IdentityApi for IamIdentity {
    async fn get_role(&self, name: &str) -> Result<RoleDescriptor> {
        let out = self
            .client
            .get_role()
            .role_name(name)
            .send()
            .await
            .map_err(|e| classify("GetRole", e))?;

        let role = out
            .role()
            .ok_or_else(|| ProvisionError::NotFound(format!("role {}", name)))?;
        Ok(RoleDescriptor {
            name: role.role_name().to_string(),
            arn: role.arn().to_string(),
        })
    }

    async fn put_role(&self, spec: &RoleSpec) -> Result<RoleDescriptor> {
        let role = match self.get_role(&spec.name).await {
            Ok(role) => {
                self.update_trust_policy(spec).await?;
                role
            }
            Err(ProvisionError::NotFound(_)) => self.create_role(spec).await?,
            Err(e) => return Err(e),
        };

        // Both calls are idempotent
        for policy_arn in &spec.managed_policy_arns {
            self.client
                .attach_role_policy()
                .role_name(&spec.name)
                .policy_arn(policy_arn)
                .send()
                .await
                .map_err(|e| classify("AttachRolePolicy", e))?;
        }
        for (policy_name, document) in &spec.inline_policies {
            self.client
                .put_role_policy()
                .role_name(&spec.name)
                .policy_name(policy_name)
                .policy_document(document.to_string())
                .send()
                .await
                .map_err(|e| classify("PutRolePolicy", e))?;
        }

        Ok(role)
    }

    async fn delete_role(&self, name: &str) -> Result<()> {
        let attached = self
            .client
            .list_attached_role_policies()
            .role_name(name)
            .send()
            .await
            .map_err(|e| classify("ListAttachedRolePolicies", e))?;
        for policy_arn in attached
            .attached_policies()
            .iter()
            .filter_map(|p| p.policy_arn())
        {
            self.client
                .detach_role_policy()
                .role_name(name)
                .policy_arn(policy_arn)
                .send()
                .await
                .map_err(|e| classify("DetachRolePolicy", e))?;
        }

        let inline = self
            .client
            .list_role_policies()
            .role_name(name)
            .send()
            .await
            .map_err(|e| classify("ListRolePolicies", e))?;
        for policy_name in inline.policy_names() {
            self.client
                .delete_role_policy()
                .role_name(name)
                .policy_name(policy_name)
                .send()
                .await
                .map_err(|e| classify("DeleteRolePolicy", e))?;
        }

        self.client
            .delete_role()
            .role_name(name)
            .send()
            .await
            .map_err(|e| classify("DeleteRole", e))?;
        Ok(())
    }
}
