//! STS implementation of [`TokenApi`]

use crate::error::classify;
use crate::to_chrono;
use async_trait::async_trait;
use aws_sdk_sts::Client;
use lambdaflow_cloud::{ProvisionError, Result, TemporaryCredentials, TokenApi};
use std::time::Duration;

pub struct StsTokens {
    client: Client,
}

impl StsTokens {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TokenApi for StsTokens {
    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
        duration: Duration,
    ) -> Result<TemporaryCredentials> {
        let out = self
            .client
            .assume_role()
            .role_arn(role_arn)
            .role_session_name(session_name)
            .duration_seconds(duration.as_secs() as i32)
            .send()
            .await
            .map_err(|e| classify("AssumeRole", e))?;

        let Some(credentials) = out.credentials() else {
            return Err(ProvisionError::remote(
                "AssumeRole",
                "response carried no credentials",
            ));
        };

        Ok(TemporaryCredentials {
            access_key_id: credentials.access_key_id().to_string(),
            secret_access_key: credentials.secret_access_key().to_string(),
            session_token: credentials.session_token().to_string(),
            expiration: to_chrono(credentials.expiration()),
        })
    }
}
