//! Change detection between the deployed function and the desired one

use crate::config::FunctionConfig;
use crate::model::FunctionDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The fixed field set compared to decide whether an update is needed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffFields {
    pub description: String,
    pub runtime: String,
    pub role_arn: String,
    pub handler: String,
    pub memory: i32,
    pub timeout: i32,
    pub env: BTreeMap<String, String>,
    pub hash: String,
    pub security_group_ids: Vec<String>,
    pub subnet_ids: Vec<String>,
    pub provisioned_concurrency: i32,
}

impl DiffFields {
    /// Fields of the deployed function. Provisioned concurrency lives on the
    /// alias, so the caller supplies the last applied value.
    pub fn from_descriptor(descriptor: &FunctionDescriptor, provisioned_concurrency: i32) -> Self {
        Self {
            description: descriptor.description.clone(),
            runtime: descriptor.runtime.clone(),
            role_arn: descriptor.role_arn.clone(),
            handler: descriptor.handler.clone(),
            memory: descriptor.memory,
            timeout: descriptor.timeout,
            env: descriptor.env.clone(),
            hash: descriptor.hash.clone(),
            security_group_ids: descriptor.security_group_ids.clone(),
            subnet_ids: descriptor.subnet_ids.clone(),
            provisioned_concurrency,
        }
    }

    /// Fields of the desired function
    pub fn from_config(config: &FunctionConfig, role_arn: &str, hash: &str) -> Self {
        Self {
            description: config.description.clone(),
            runtime: config.runtime.clone(),
            role_arn: role_arn.to_string(),
            handler: config.handler.clone(),
            memory: config.memory,
            timeout: config.timeout,
            env: config.env.clone(),
            hash: hash.to_string(),
            security_group_ids: config.security_group_ids.clone(),
            subnet_ids: config.subnet_ids.clone(),
            provisioned_concurrency: config.provisioned_concurrency,
        }
    }

    /// Whether anything besides the code hash and concurrency differs
    pub fn configuration_differs(&self, other: &Self) -> bool {
        let strip = |f: &Self| Self {
            hash: String::new(),
            provisioned_concurrency: 0,
            ..f.clone()
        };
        strip(self) != strip(other)
    }

    pub fn code_differs(&self, other: &Self) -> bool {
        self.hash != other.hash
    }
}

/// Binary changed/unchanged decision over the fixed field set
pub fn has_changed(previous: &DiffFields, current: &DiffFields) -> bool {
    previous != current
}
