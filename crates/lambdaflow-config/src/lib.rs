pub mod error;

pub use error::*;

use lambdaflow_cloud::{DeploymentId, FunctionInput};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_STAGE: &str = "dev";

const CANDIDATES: [&str; 2] = ["lambdaflow.local.yml", "lambdaflow.yml"];
const PROJECT_DIR: &str = ".lambdaflow";

/// lambdaflow.yml の内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectFile {
    /// インスタンス名 (デプロイメントの識別子)
    pub name: String,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub inputs: FunctionInput,
}

impl ProjectFile {
    /// ステージの解決: 引数 → ファイル → デフォルト
    pub fn deployment_id(&self, stage: Option<&str>) -> DeploymentId {
        let stage = stage
            .map(str::to_string)
            .or_else(|| self.stage.clone())
            .unwrap_or_else(|| DEFAULT_STAGE.to_string());
        DeploymentId::new(self.name.clone(), stage)
    }
}

/// プロジェクトのlambdaflow.ymlファイルを探す
///
/// 以下の優先順位で設定ファイルを検索:
/// 1. 環境変数 LAMBDAFLOW_CONFIG_PATH (直接パス指定)
/// 2. カレントディレクトリ: lambdaflow.local.yml, lambdaflow.yml
/// 3. ./.lambdaflow/ ディレクトリ内: 同様の順序
/// 4. ~/.config/lambdaflow/lambdaflow.yml (グローバル設定)
pub fn find_project_file() -> Result<PathBuf> {
    // 1. 環境変数で直接指定
    if let Ok(config_path) = std::env::var("LAMBDAFLOW_CONFIG_PATH") {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
    }

    let current_dir = std::env::current_dir()?;

    // 2. カレントディレクトリで検索
    for filename in &CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    // 3. ./.lambdaflow/ ディレクトリで検索
    let project_dir = current_dir.join(PROJECT_DIR);
    if project_dir.is_dir() {
        for filename in &CANDIDATES {
            let path = project_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    // 4. グローバル設定ファイル
    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("lambdaflow").join("lambdaflow.yml");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ProjectFileNotFound)
}

/// 設定ファイルを読み込む
///
/// `${env:NAME}` は環境変数の値に置換される。`inputs.src` の相対パスは
/// 設定ファイルのあるディレクトリを基準に解決する。
pub fn load_project_file(path: &Path) -> Result<ProjectFile> {
    let raw = std::fs::read_to_string(path)?;
    let content = expand_env(&raw)?;

    let mut project: ProjectFile =
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    validate_name(&project.name)?;
    if let Some(stage) = &project.stage {
        validate_name(stage)?;
    }

    if let (Some(src), Some(base)) = (project.inputs.src.as_mut(), path.parent()) {
        if src.is_relative() {
            *src = base.join(&*src);
        }
    }

    Ok(project)
}

/// 検索と読み込みをまとめて行う
pub fn load_project() -> Result<(PathBuf, ProjectFile)> {
    let path = find_project_file()?;
    let project = load_project_file(&path)?;
    Ok((path, project))
}

/// インスタンス名とステージは関数名の一部になるため英数字と `-` `_` のみ許可
pub fn validate_name(value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(ConfigError::Invalid("空の名前は指定できません".to_string()));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Invalid(format!(
            "'{}' には英数字と - _ のみ使用できます",
            value
        )));
    }
    Ok(())
}

fn expand_env(content: &str) -> Result<String> {
    const OPEN: &str = "${env:";

    let mut output = String::with_capacity(content.len());
    let mut rest = content;
    while let Some(start) = rest.find(OPEN) {
        output.push_str(&rest[..start]);
        let after = &rest[start + OPEN.len()..];
        let Some(end) = after.find('}') else {
            // 閉じ括弧がなければそのまま残す
            output.push_str(&rest[start..]);
            return Ok(output);
        };
        let name = after[..end].trim();
        let value =
            std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))?;
        output.push_str(&value);
        rest = &after[end + 1..];
    }
    output.push_str(rest);
    Ok(output)
}
