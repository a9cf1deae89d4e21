//! LambdaFlow Cloud
//!
//! Provider-independent provisioning of one serverless function with its
//! execution role, monitoring meta role, alias and provisioned concurrency.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  LambdaFlow CLI                  │
//! │      (deploy / plan / info / remove / metrics)   │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               lambdaflow-cloud                   │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │               Deployer                    │   │
//! │  │  RoleManager  FunctionManager  Aliases    │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │ Normalize/Diff│  │  State Mgmt  │            │
//! │  └──────────────┘  └──────────────┘            │
//! └───────┬─────────────────────────────────────────┘
//!         │ trait IdentityApi / FunctionApi / ...
//! ┌───────▼──────────────┐
//! │ lambdaflow-cloud-aws │
//! └──────────────────────┘
//! ```

pub mod action;
pub mod alias;
pub mod api;
pub mod config;
pub mod deployer;
pub mod diff;
pub mod error;
pub mod function;
pub mod metrics;
pub mod model;
pub mod retry;
pub mod role;
pub mod state;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-exports
pub use action::{Action, ActionType, Plan, PlanSummary};
pub use api::{ControlPlane, FunctionApi, IdentityApi, MetricsApi, TokenApi};
pub use config::{DeploymentId, FunctionConfig, FunctionInput, VpcConfigInput, normalize};
pub use deployer::{DeployOptions, DeployOutputs, Deployer, FunctionInfo};
pub use diff::{DiffFields, has_changed};
pub use error::{ProvisionError, Result};
pub use model::{
    AliasDescriptor, ConcurrencyDescriptor, FunctionDescriptor, MetricPoint, MetricSeries,
    MetricSpec, MetricStat, MetricsQuery, MetricsReport, RoleDescriptor, RoleSpec,
    TemporaryCredentials,
};
pub use retry::RetryPolicy;
pub use state::{
    DeploymentState, FunctionRole, MetaRole, StateFile, StateLock, StateManager,
};
