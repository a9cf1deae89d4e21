//! Orchestration of the deploy, plan, info, remove and metrics operations
//!
//! Each operation runs sequentially against one [`DeploymentState`] that the
//! caller loads before and saves after. Steps write to the state as they
//! succeed; a failing step leaves the earlier writes in place.

use crate::action::{Action, ActionType, Plan};
use crate::alias::AliasManager;
use crate::api::ControlPlane;
use crate::config::{DEFAULT_REGION, DeploymentId, FunctionConfig, FunctionInput, normalize};
use crate::diff::{DiffFields, has_changed};
use crate::error::{ProvisionError, Result};
use crate::function::{FunctionManager, code_hash, read_archive};
use crate::metrics::MetricsFetcher;
use crate::model::{AliasDescriptor, ConcurrencyDescriptor, FunctionDescriptor, MetricsReport};
use crate::retry::RetryPolicy;
use crate::role::{DEFAULT_MONITORING_ACCOUNT, RoleManager, default_role_name, meta_role_name};
use crate::state::{DeploymentState, FunctionRole, MetaRole};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Tunables of the deployer
#[derive(Debug, Clone)]
pub struct DeployOptions {
    pub retry: RetryPolicy,
    pub monitoring_account: String,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            monitoring_account: DEFAULT_MONITORING_ACCOUNT.to_string(),
        }
    }
}

/// Result of a deploy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployOutputs {
    pub name: String,
    pub arn: String,
    pub version: Option<String>,
    pub role_arn: String,
    pub meta_role_arn: Option<String>,
    pub alias: Option<AliasDescriptor>,
    pub provisioned_concurrency: Option<ConcurrencyDescriptor>,
    pub security_group_ids: Vec<String>,
    pub subnet_ids: Vec<String>,
    /// Whether any function update call was issued
    pub changed: bool,
}

/// Current view of a deployed function
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionInfo {
    pub function: FunctionDescriptor,
    pub version: Option<String>,
    pub alias: Option<AliasDescriptor>,
    pub role: Option<FunctionRole>,
    pub meta_role: Option<MetaRole>,
}

pub struct Deployer {
    roles: RoleManager,
    functions: FunctionManager,
    aliases: AliasManager,
    metrics: MetricsFetcher,
}

impl Deployer {
    pub fn new(control_plane: ControlPlane) -> Self {
        Self::with_options(control_plane, DeployOptions::default())
    }

    pub fn with_options(control_plane: ControlPlane, options: DeployOptions) -> Self {
        let ControlPlane {
            identity,
            functions,
            tokens,
            metrics,
        } = control_plane;

        Self {
            roles: RoleManager::new(identity)
                .with_monitoring_account(options.monitoring_account),
            functions: FunctionManager::new(functions.clone(), options.retry),
            aliases: AliasManager::new(functions),
            metrics: MetricsFetcher::new(tokens, metrics),
        }
    }

    /// Create or update the function and everything around it
    pub async fn deploy(
        &self,
        id: &DeploymentId,
        input: &FunctionInput,
        state: &mut DeploymentState,
    ) -> Result<DeployOutputs> {
        let config = normalize(input, id, state);
        ensure_same_function(&config, state)?;
        tracing::info!("Deploying {} as function {}", id, config.name);

        let role = self.roles.ensure_function_role(&config, state).await?;
        state.region = Some(config.region.clone());
        let meta_role = self.roles.ensure_meta_role(&config, state).await?;

        let (descriptor, changed) = match self.functions.get(&config.name).await? {
            None => {
                let created = self.functions.create(&config, role.arn()).await?;
                state.name = Some(config.name.clone());
                state.arn = Some(created.arn.clone());
                state.version = created.version.clone();

                self.functions
                    .put_retry_attempts(&config.name, config.retry)
                    .await?;
                state.retry_attempts = Some(config.retry);
                (created, true)
            }
            Some(existing) => {
                self.update_existing(&config, role.arn(), existing, state)
                    .await?
            }
        };

        state.name = Some(config.name.clone());
        state.arn = Some(descriptor.arn.clone());

        let (alias, concurrency) = self.reconcile_alias(&config, state).await?;

        state.snapshot = Some(DiffFields::from_config(&config, role.arn(), &descriptor.hash));

        Ok(DeployOutputs {
            name: config.name,
            arn: descriptor.arn,
            version: state.version.clone(),
            role_arn: role.arn().to_string(),
            meta_role_arn: meta_role.map(|m| m.arn),
            alias,
            provisioned_concurrency: concurrency,
            security_group_ids: config.security_group_ids,
            subnet_ids: config.subnet_ids,
            changed,
        })
    }

    async fn update_existing(
        &self,
        config: &FunctionConfig,
        role_arn: &str,
        existing: FunctionDescriptor,
        state: &mut DeploymentState,
    ) -> Result<(FunctionDescriptor, bool)> {
        let previous = DiffFields::from_descriptor(&existing, applied_concurrency(state));
        let hash = local_hash(config, &existing).await?;
        let desired = DiffFields::from_config(config, role_arn, &hash);
        let retry_pending = state.retry_attempts != Some(config.retry);

        if !has_changed(&previous, &desired) && !retry_pending {
            tracing::info!("Function {} is up to date", config.name);
            return Ok((existing, false));
        }

        let mut latest = existing;
        let mut changed = false;

        if desired.configuration_differs(&previous) {
            latest = self.functions.update_configuration(config, role_arn).await?;
            state.retry_attempts = Some(config.retry);
            changed = true;
        } else if retry_pending {
            // An earlier configuration update stopped before the retry count
            self.functions
                .put_retry_attempts(&config.name, config.retry)
                .await?;
            state.retry_attempts = Some(config.retry);
            changed = true;
        }

        if desired.code_differs(&previous) {
            latest = self.functions.update_code(config).await?;
            state.version = latest.version.clone();
            changed = true;
        }

        Ok((latest, changed))
    }

    /// Keep provisioned concurrency on exactly one alias, or on none
    async fn reconcile_alias(
        &self,
        config: &FunctionConfig,
        state: &mut DeploymentState,
    ) -> Result<(Option<AliasDescriptor>, Option<ConcurrencyDescriptor>)> {
        if let Some(alias) = stale_alias(config, state) {
            if self.aliases.get(&config.name, &alias).await?.is_some() {
                self.aliases.delete(&config.name, &alias).await?;
            }
            state.alias = None;
        }

        if config.provisioned_concurrency <= 0 {
            return Ok((None, None));
        }

        let version = match &state.version {
            Some(version) => version.clone(),
            None => {
                // Nothing recorded: publish the current code to get a version
                let published = self.functions.update_code(config).await?;
                let version = published.version.ok_or_else(|| {
                    ProvisionError::remote("UpdateFunctionCode", "no version was published")
                })?;
                state.version = Some(version.clone());
                version
            }
        };

        let alias = self
            .aliases
            .ensure(&config.name, &config.alias_name, &version)
            .await?;
        state.alias = Some(alias.name.clone());

        let concurrency = self
            .aliases
            .put_provisioned_concurrency(&config.name, &alias.name, config.provisioned_concurrency)
            .await?;

        Ok((Some(alias), Some(concurrency)))
    }

    /// Work out what [`Deployer::deploy`] would do without changing anything
    pub async fn plan(
        &self,
        id: &DeploymentId,
        input: &FunctionInput,
        state: &DeploymentState,
    ) -> Result<Plan> {
        let config = normalize(input, id, state);
        ensure_same_function(&config, state)?;
        let mut actions = Vec::new();

        let role_arn = match &config.role_name {
            Some(role_name) => {
                let role = self
                    .roles
                    .lookup(role_name)
                    .await?
                    .ok_or_else(|| ProvisionError::NotFound(format!("role {}", role_name)))?;
                actions.push(Action::new(
                    ActionType::NoOp,
                    "role",
                    role_name.clone(),
                    format!("use existing role {}", role.arn),
                ));
                Some(role.arn)
            }
            None => {
                let role_name = default_role_name(&config.name);
                let existing = self.roles.lookup(&role_name).await?;
                actions.push(ensure_action("role", &role_name, existing.is_some()));
                existing.map(|r| r.arn)
            }
        };

        if config.monitoring {
            let meta_name = meta_role_name(&config.name);
            let existing = self.roles.lookup(&meta_name).await?;
            actions.push(ensure_action("meta-role", &meta_name, existing.is_some()));
        }

        let code_changed = match self.functions.get(&config.name).await? {
            None => {
                read_archive(&config).await?;
                actions.push(Action::new(
                    ActionType::Create,
                    "function",
                    config.name.clone(),
                    format!("create function {} ({})", config.name, config.runtime),
                ));
                true
            }
            Some(existing) => {
                let previous = DiffFields::from_descriptor(&existing, applied_concurrency(state));
                let hash = local_hash(&config, &existing).await?;
                let role_arn = role_arn.as_deref().unwrap_or_default();
                let desired = DiffFields::from_config(&config, role_arn, &hash);
                let code_changed = desired.code_differs(&previous);
                let config_changed = desired.configuration_differs(&previous)
                    || state.retry_attempts != Some(config.retry);

                let action_type = if code_changed || config_changed {
                    ActionType::Update
                } else {
                    ActionType::NoOp
                };
                let description = match action_type {
                    ActionType::NoOp => "up to date".to_string(),
                    _ => format!("update function {}", config.name),
                };
                actions.push(
                    Action::new(action_type, "function", config.name.clone(), description)
                        .with_detail("code", json!(code_changed))
                        .with_detail("configuration", json!(config_changed)),
                );
                code_changed
            }
        };

        if let Some(alias) = stale_alias(&config, state) {
            actions.push(Action::new(
                ActionType::Delete,
                "alias",
                alias.clone(),
                format!("delete alias {} and its provisioned concurrency", alias),
            ));
        }

        if config.provisioned_concurrency > 0 {
            let existing = match state.name {
                Some(_) => {
                    self.aliases
                        .get(&config.name, &config.alias_name)
                        .await?
                }
                None => None,
            };
            let action_type = match existing {
                None => ActionType::Create,
                Some(_) if code_changed => ActionType::Update,
                Some(_) if applied_concurrency(state) != config.provisioned_concurrency => {
                    ActionType::Update
                }
                Some(_) => ActionType::NoOp,
            };
            actions.push(
                Action::new(
                    action_type,
                    "alias",
                    config.alias_name.clone(),
                    format!(
                        "provisioned concurrency {} on alias {}",
                        config.provisioned_concurrency, config.alias_name
                    ),
                )
                .with_detail(
                    "provisioned_concurrency",
                    json!(config.provisioned_concurrency),
                ),
            );
        }

        Ok(Plan::new(actions))
    }

    /// Describe the deployed function, `None` when nothing is deployed
    pub async fn info(&self, state: &DeploymentState) -> Result<Option<FunctionInfo>> {
        let Some(name) = state.name.as_deref() else {
            return Ok(None);
        };
        let Some(function) = self.functions.get(name).await? else {
            return Ok(None);
        };
        let alias = match state.alias.as_deref() {
            Some(alias) => self.aliases.get(name, alias).await?,
            None => None,
        };

        Ok(Some(FunctionInfo {
            function,
            version: state.version.clone(),
            alias,
            role: state.role.clone(),
            meta_role: state.meta_role.clone(),
        }))
    }

    /// Tear down alias, function and owned roles, then clear the state
    pub async fn remove(&self, state: &mut DeploymentState) -> Result<()> {
        if let Some(name) = state.name.clone() {
            if let Some(alias) = state.alias.clone() {
                if self.aliases.get(&name, &alias).await?.is_some() {
                    self.aliases.delete(&name, &alias).await?;
                }
                state.alias = None;
            }
            self.functions.delete(&name).await?;
            state.arn = None;
            state.version = None;
            state.snapshot = None;
        }

        self.roles.remove_roles(state).await?;
        *state = DeploymentState::default();
        Ok(())
    }

    /// Metrics of the deployed function over `[start, end)`
    pub async fn metrics(
        &self,
        state: &DeploymentState,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<MetricsReport> {
        let Some(name) = state.name.as_deref() else {
            return Err(ProvisionError::InvalidInput(
                "no function is deployed".to_string(),
            ));
        };
        let meta_role = state.meta_role.as_ref().ok_or_else(|| {
            ProvisionError::InvalidInput(format!("monitoring is not enabled for {}", name))
        })?;
        let region = state.region.as_deref().unwrap_or(DEFAULT_REGION);

        self.metrics
            .fetch(region, &meta_role.arn, name, start, end)
            .await
    }
}

fn applied_concurrency(state: &DeploymentState) -> i32 {
    state
        .snapshot
        .as_ref()
        .map(|s| s.provisioned_concurrency)
        .unwrap_or(0)
}

/// Recorded alias that no longer carries concurrency under this config
fn stale_alias(config: &FunctionConfig, state: &DeploymentState) -> Option<String> {
    let alias = state.alias.clone()?;
    let carrying = config.provisioned_concurrency > 0 && alias == config.alias_name;
    (!carrying).then_some(alias)
}

/// A deployment owns one function; a new name would orphan the old one
fn ensure_same_function(config: &FunctionConfig, state: &DeploymentState) -> Result<()> {
    let Some(previous) = state.name.as_deref() else {
        return Ok(());
    };
    if previous != config.name {
        return Err(ProvisionError::InvalidInput(format!(
            "function name changed from {} to {}; remove the deployment first",
            previous, config.name
        )));
    }
    Ok(())
}

/// Hash of the local archive; without one the deployed code is kept
async fn local_hash(config: &FunctionConfig, existing: &FunctionDescriptor) -> Result<String> {
    if config.src.is_none() {
        return Ok(existing.hash.clone());
    }
    Ok(code_hash(&read_archive(config).await?))
}

fn ensure_action(resource_type: &str, name: &str, exists: bool) -> Action {
    if exists {
        Action::new(
            ActionType::NoOp,
            resource_type,
            name,
            format!("ensure {} policies", name),
        )
    } else {
        Action::new(
            ActionType::Create,
            resource_type,
            name,
            format!("create {}", name),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeControlPlane, FunctionCall};
    use chrono::Duration as ChronoDuration;
    use tempfile::TempDir;

    fn id() -> DeploymentId {
        DeploymentId::new("api", "dev")
    }

    fn setup() -> (TempDir, FunctionInput, FakeControlPlane, Deployer) {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("code.zip");
        std::fs::write(&src, b"v1").unwrap();
        let input = FunctionInput {
            name: Some("fn1".to_string()),
            src: Some(src),
            ..Default::default()
        };
        let fakes = FakeControlPlane::new();
        let deployer = Deployer::new(fakes.control_plane());
        (dir, input, fakes, deployer)
    }

    #[tokio::test]
    async fn test_plan_for_new_function() {
        let (_dir, input, fakes, deployer) = setup();

        let plan = deployer
            .plan(&id(), &input, &DeploymentState::default())
            .await
            .unwrap();

        assert!(plan.has_changes);
        for resource in ["role", "meta-role", "function"] {
            let action = plan.action_for(resource).unwrap();
            assert_eq!(action.action_type, ActionType::Create, "{}", resource);
        }
        assert!(plan.action_for("alias").is_none());
        assert!(fakes.functions.calls().is_empty());
        assert!(fakes.identity.role_names().is_empty());
    }

    #[tokio::test]
    async fn test_plan_after_deploy_is_noop_until_input_changes() {
        let (_dir, input, _fakes, deployer) = setup();
        let mut state = DeploymentState::default();
        deployer.deploy(&id(), &input, &mut state).await.unwrap();

        let plan = deployer.plan(&id(), &input, &state).await.unwrap();
        assert!(!plan.has_changes, "{}", plan.summary());

        let bigger = FunctionInput {
            memory: Some(2048),
            ..input.clone()
        };
        let plan = deployer.plan(&id(), &bigger, &state).await.unwrap();
        let function = plan.action_for("function").unwrap();
        assert_eq!(function.action_type, ActionType::Update);
        assert_eq!(function.details["configuration"], serde_json::json!(true));
        assert_eq!(function.details["code"], serde_json::json!(false));
    }

    #[tokio::test]
    async fn test_plan_requires_existing_user_role() {
        let (_dir, input, _fakes, deployer) = setup();
        let input = FunctionInput {
            role_name: Some("missing".to_string()),
            ..input
        };

        let result = deployer
            .plan(&id(), &input, &DeploymentState::default())
            .await;
        assert!(matches!(result, Err(ProvisionError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_missing_user_role_leaves_state_untouched() {
        let (_dir, input, fakes, deployer) = setup();
        let input = FunctionInput {
            role_name: Some("missing".to_string()),
            ..input
        };
        let mut state = DeploymentState::default();

        let result = deployer.deploy(&id(), &input, &mut state).await;

        assert!(matches!(result, Err(ProvisionError::NotFound(_))));
        assert!(state.is_empty());
        assert!(state.region.is_none());
        assert!(fakes.functions.calls().is_empty());
    }

    #[tokio::test]
    async fn test_renamed_function_is_refused() {
        let (_dir, input, fakes, deployer) = setup();
        let mut state = DeploymentState::default();
        deployer.deploy(&id(), &input, &mut state).await.unwrap();
        let before = fakes.functions.calls().len();

        let renamed = FunctionInput {
            name: Some("fn2".to_string()),
            ..input
        };
        let deployed = deployer.deploy(&id(), &renamed, &mut state).await;
        let planned = deployer.plan(&id(), &renamed, &state).await;

        assert!(matches!(deployed, Err(ProvisionError::InvalidInput(_))));
        assert!(matches!(planned, Err(ProvisionError::InvalidInput(_))));
        assert_eq!(fakes.functions.calls().len(), before);
        assert!(fakes.functions.function("fn2").is_none());
        assert_eq!(state.name.as_deref(), Some("fn1"));

        // The recorded function can still be removed along with its roles
        deployer.remove(&mut state).await.unwrap();
        assert!(fakes.functions.function("fn1").is_none());
        assert!(fakes.identity.role_names().is_empty());
    }

    #[tokio::test]
    async fn test_retry_count_reapplied_after_failed_update() {
        let (_dir, input, fakes, deployer) = setup();
        let mut state = DeploymentState::default();
        deployer.deploy(&id(), &input, &mut state).await.unwrap();

        let changed = FunctionInput {
            memory: Some(2048),
            retry: Some(2),
            ..input
        };
        fakes.functions.fail_event_invoke_config(1);
        let failed = deployer.deploy(&id(), &changed, &mut state).await;
        assert!(matches!(failed, Err(ProvisionError::Remote { .. })));
        assert_eq!(state.retry_attempts, Some(0));

        let before = fakes.functions.calls().len();
        let outputs = deployer.deploy(&id(), &changed, &mut state).await.unwrap();

        assert!(outputs.changed);
        assert_eq!(
            fakes.functions.calls()[before..],
            [FunctionCall::PutEventInvokeConfig {
                function: "fn1".to_string(),
                max_retry_attempts: 2,
            }]
        );
        assert_eq!(state.retry_attempts, Some(2));
        assert_eq!(fakes.functions.function("fn1").unwrap().memory, 2048);
    }

    #[tokio::test]
    async fn test_concurrency_change_touches_only_alias() {
        let (_dir, input, fakes, deployer) = setup();
        let mut state = DeploymentState::default();
        let input = FunctionInput {
            provisioned_concurrency: Some(2),
            ..input
        };
        deployer.deploy(&id(), &input, &mut state).await.unwrap();
        let before = fakes.functions.calls().len();

        let more = FunctionInput {
            provisioned_concurrency: Some(4),
            ..input
        };
        let outputs = deployer.deploy(&id(), &more, &mut state).await.unwrap();

        assert!(!outputs.changed);
        assert_eq!(
            fakes.functions.calls()[before..],
            [FunctionCall::PutProvisionedConcurrency {
                function: "fn1".to_string(),
                alias: "provisioned".to_string(),
                executions: 4,
            }]
        );
        assert_eq!(state.snapshot.unwrap().provisioned_concurrency, 4);
    }

    #[tokio::test]
    async fn test_info() {
        let (_dir, input, _fakes, deployer) = setup();
        let mut state = DeploymentState::default();
        assert!(deployer.info(&state).await.unwrap().is_none());

        deployer.deploy(&id(), &input, &mut state).await.unwrap();
        let info = deployer.info(&state).await.unwrap().unwrap();

        assert_eq!(info.function.name, "fn1");
        assert_eq!(info.version.as_deref(), Some("1"));
        assert!(info.alias.is_none());
        assert!(info.role.unwrap().is_default());
        assert_eq!(info.meta_role.unwrap().name, "fn1-meta-role");
    }

    #[tokio::test]
    async fn test_remove_clears_everything() {
        let (_dir, input, fakes, deployer) = setup();
        let mut state = DeploymentState::default();
        let input = FunctionInput {
            provisioned_concurrency: Some(1),
            ..input
        };
        deployer.deploy(&id(), &input, &mut state).await.unwrap();

        deployer.remove(&mut state).await.unwrap();

        assert!(state.is_empty());
        assert!(fakes.functions.function("fn1").is_none());
        assert_eq!(fakes.functions.alias_count("fn1"), 0);
        assert!(fakes.identity.role_names().is_empty());

        // Removing twice is harmless
        deployer.remove(&mut state).await.unwrap();
    }

    #[tokio::test]
    async fn test_metrics_use_meta_role() {
        let (_dir, input, fakes, deployer) = setup();
        let mut state = DeploymentState::default();
        deployer.deploy(&id(), &input, &mut state).await.unwrap();
        let end = Utc::now();

        let report = deployer
            .metrics(&state, end - ChronoDuration::hours(3), end)
            .await
            .unwrap();

        assert_eq!(report.function_name, "fn1");
        assert_eq!(report.series.len(), 4);
        let assumed = fakes.tokens.assumed();
        assert_eq!(assumed.len(), 1);
        assert!(assumed[0].0.ends_with(":role/fn1-meta-role"));
    }

    #[tokio::test]
    async fn test_metrics_require_monitoring() {
        let (_dir, input, _fakes, deployer) = setup();
        let mut state = DeploymentState::default();
        let input = FunctionInput {
            monitoring: Some(false),
            ..input
        };
        deployer.deploy(&id(), &input, &mut state).await.unwrap();
        let end = Utc::now();

        let start = end - ChronoDuration::hours(1);
        let result = deployer.metrics(&state, start, end).await;
        assert!(matches!(result, Err(ProvisionError::InvalidInput(_))));
    }
}
