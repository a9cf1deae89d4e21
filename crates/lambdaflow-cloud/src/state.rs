//! Persisted deployment state
//!
//! Manages the `.lambdaflow/state.json` file which records, per deployment,
//! the identifiers resolved by previous operations (roles, function ARN,
//! published version) and the snapshot the diff engine compares against.

use crate::diff::DiffFields;
use crate::error::{ProvisionError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".lambdaflow";
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const LOCK_FILE: &str = "lock.json";

/// Execution role of the function.
///
/// A deployment either borrows a role the user named or owns a default role;
/// never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FunctionRole {
    /// Role supplied by the user, verified but never modified or deleted
    User { arn: String },
    /// Role created and owned by this deployment
    Default { name: String, arn: String },
}

impl FunctionRole {
    pub fn arn(&self) -> &str {
        match self {
            FunctionRole::User { arn } | FunctionRole::Default { arn, .. } => arn,
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, FunctionRole::Default { .. })
    }
}

/// Role assumed by the monitoring account to read metrics and logs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaRole {
    pub name: String,
    pub arn: String,
}

/// State of a single deployment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentState {
    pub name: Option<String>,
    pub arn: Option<String>,
    pub region: Option<String>,
    pub role: Option<FunctionRole>,
    pub aws_account_id: Option<String>,
    pub meta_role: Option<MetaRole>,
    /// Last version published by create or code update
    pub version: Option<String>,
    /// Alias currently carrying provisioned concurrency
    pub alias: Option<String>,
    /// Async-invoke retry count last accepted by the control plane
    pub retry_attempts: Option<i32>,
    /// Fields applied by the last successful deploy
    pub snapshot: Option<DiffFields>,
}

impl DeploymentState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the execution role; replaces whichever variant was there
    pub fn set_role(&mut self, role: FunctionRole) {
        self.aws_account_id = account_id_from_arn(role.arn());
        self.role = Some(role);
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Account id is the fifth `:`-separated field of an ARN
pub fn account_id_from_arn(arn: &str) -> Option<String> {
    arn.split(':')
        .nth(4)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Contents of the state file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    /// State file version
    pub version: u32,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Deployments indexed by `instance:stage`
    pub deployments: HashMap<String, DeploymentState>,
}

impl Default for StateFile {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            deployments: HashMap::new(),
        }
    }
}

impl StateFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a copy of a deployment's state, empty if never deployed
    pub fn deployment(&self, key: &str) -> DeploymentState {
        self.deployments.get(key).cloned().unwrap_or_default()
    }

    /// Add or update a deployment; empty states are dropped
    pub fn set_deployment(&mut self, key: String, state: DeploymentState) {
        if state.is_empty() {
            self.deployments.remove(&key);
        } else {
            self.deployments.insert(key, state);
        }
        self.updated_at = Utc::now();
    }
}

/// State manager for reading/writing state files
pub struct StateManager {
    /// Project root directory
    project_root: PathBuf,
}

impl StateManager {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            project_root: project_root.as_ref().to_path_buf(),
        }
    }

    fn state_dir(&self) -> PathBuf {
        self.project_root.join(STATE_DIR)
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_dir().join(STATE_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.state_dir().join(STATE_BACKUP)
    }

    fn lock_path(&self) -> PathBuf {
        self.state_dir().join(LOCK_FILE)
    }

    async fn ensure_state_dir(&self) -> Result<()> {
        let dir = self.state_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::debug!("Created state directory: {}", dir.display());
        }
        Ok(())
    }

    /// Load the current state
    pub async fn load(&self) -> Result<StateFile> {
        let path = self.state_path();
        if !path.exists() {
            tracing::debug!("State file not found, returning empty state");
            return Ok(StateFile::new());
        }

        let content = fs::read_to_string(&path).await?;
        let state: StateFile = serde_json::from_str(&content)?;

        if state.version > STATE_VERSION {
            return Err(ProvisionError::StateError(format!(
                "State file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }

        tracing::debug!("Loaded state with {} deployments", state.deployments.len());
        Ok(state)
    }

    /// Save the state, keeping the previous file as a backup
    pub async fn save(&self, state: &StateFile) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        let backup = self.backup_path();

        if path.exists() {
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&path, &backup).await?;
            tracing::debug!("Created state backup");
        }

        let content = serde_json::to_string_pretty(state)?;
        fs::write(&path, content).await?;

        tracing::debug!("Saved state with {} deployments", state.deployments.len());
        Ok(())
    }

    /// Acquire a lock for exclusive access
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        self.ensure_state_dir().await?;

        let lock_path = self.lock_path();

        if lock_path.exists() {
            let content = fs::read_to_string(&lock_path).await?;
            let lock_info: LockInfo = serde_json::from_str(&content)?;

            // Locks older than an hour are considered stale
            let age = Utc::now().signed_duration_since(lock_info.acquired_at);
            if age.num_hours() < 1 {
                return Err(ProvisionError::LockError(format!(
                    "State is locked by {} since {}",
                    lock_info.holder, lock_info.acquired_at
                )));
            }

            tracing::warn!("Removing stale lock from {}", lock_info.holder);
        }

        let lock_info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            acquired_at: Utc::now(),
        };

        let content = serde_json::to_string_pretty(&lock_info)?;
        fs::write(&lock_path, content).await?;

        tracing::debug!("Acquired state lock");
        Ok(StateLock {
            lock_path,
            released: false,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for state lock
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    /// Release the lock
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("Released state lock");
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_state_save_load() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let mut deployment = DeploymentState::new();
        deployment.name = Some("fn1".to_string());
        deployment.set_role(FunctionRole::Default {
            name: "fn1-lambda-role".to_string(),
            arn: "arn:aws:iam::123456789012:role/fn1-lambda-role".to_string(),
        });

        let mut state = StateFile::new();
        state.set_deployment("api:dev".to_string(), deployment.clone());
        manager.save(&state).await.unwrap();

        let loaded = manager.load().await.unwrap();
        assert_eq!(loaded.deployments.len(), 1);
        assert_eq!(loaded.deployment("api:dev"), deployment);
    }

    #[tokio::test]
    async fn test_empty_state() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let state = manager.load().await.unwrap();
        assert!(state.deployments.is_empty());
        assert!(state.deployment("api:dev").is_empty());
    }

    #[tokio::test]
    async fn test_save_keeps_backup() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let mut state = StateFile::new();
        manager.save(&state).await.unwrap();
        state.set_deployment(
            "api:dev".to_string(),
            DeploymentState {
                name: Some("fn1".to_string()),
                ..Default::default()
            },
        );
        manager.save(&state).await.unwrap();

        let backup = temp_dir.path().join(".lambdaflow/state.json.backup");
        assert!(backup.exists());
    }

    #[tokio::test]
    async fn test_lock_is_exclusive() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let lock = manager.acquire_lock().await.unwrap();
        assert!(matches!(
            manager.acquire_lock().await,
            Err(ProvisionError::LockError(_))
        ));

        lock.release().await.unwrap();
        let again = manager.acquire_lock().await.unwrap();
        again.release().await.unwrap();
    }

    #[test]
    fn test_role_variants_are_exclusive() {
        let mut state = DeploymentState::new();
        state.set_role(FunctionRole::User {
            arn: "arn:aws:iam::111111111111:role/custom".to_string(),
        });
        assert_eq!(state.aws_account_id.as_deref(), Some("111111111111"));

        state.set_role(FunctionRole::Default {
            name: "fn1-lambda-role".to_string(),
            arn: "arn:aws:iam::222222222222:role/fn1-lambda-role".to_string(),
        });
        assert!(state.role.as_ref().unwrap().is_default());
        assert_eq!(state.aws_account_id.as_deref(), Some("222222222222"));
    }

    #[test]
    fn test_role_serialization_is_tagged() {
        let role = FunctionRole::User {
            arn: "arn:aws:iam::111111111111:role/custom".to_string(),
        };
        let json = serde_json::to_value(&role).unwrap();
        assert_eq!(json["kind"], "user");
    }

    #[test]
    fn test_account_id_from_arn() {
        assert_eq!(
            account_id_from_arn("arn:aws:iam::123456789012:role/x").as_deref(),
            Some("123456789012")
        );
        assert_eq!(account_id_from_arn("not-an-arn"), None);
    }

    #[test]
    fn test_empty_deployment_is_dropped() {
        let mut state = StateFile::new();
        state.set_deployment(
            "api:dev".to_string(),
            DeploymentState {
                name: Some("fn1".to_string()),
                ..Default::default()
            },
        );
        state.set_deployment("api:dev".to_string(), DeploymentState::default());
        assert!(state.deployments.is_empty());
    }
}
