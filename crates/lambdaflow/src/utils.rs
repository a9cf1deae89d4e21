use anyhow::Context as _;
use colored::Colorize;
use lambdaflow_cloud::config::resolve_region;
use lambdaflow_cloud::{Deployer, DeploymentId, DeploymentState, StateManager};
use lambdaflow_cloud_aws::TransportConfig;
use lambdaflow_config::ProjectFile;
use std::path::PathBuf;

/// コマンド実行に必要な情報
pub struct Context {
    /// 状態ファイル (.lambdaflow/) を置くディレクトリ
    pub project_root: PathBuf,
    pub config_path: PathBuf,
    pub project: ProjectFile,
    pub id: DeploymentId,
    pub profile: Option<String>,
}

impl Context {
    pub fn state_manager(&self) -> StateManager {
        StateManager::new(&self.project_root)
    }
}

/// 設定ファイルを探して読み込み、ステージとリージョンを解決する
pub fn load_context(
    stage: Option<&str>,
    region: Option<String>,
    profile: Option<String>,
) -> anyhow::Result<Context> {
    let (config_path, mut project) = lambdaflow_config::load_project()?;
    if let Some(stage) = stage {
        lambdaflow_config::validate_name(stage)?;
    }
    if region.is_some() {
        project.inputs.region = region;
    }

    let id = project.deployment_id(stage);
    let project_root = std::env::current_dir().context("カレントディレクトリを取得できません")?;

    Ok(Context {
        project_root,
        config_path,
        project,
        id,
        profile,
    })
}

/// 状態に記録されたリージョンも考慮してAWSクライアントを作成する
pub async fn connect(ctx: &Context, state: &DeploymentState) -> Deployer {
    let region = resolve_region(&ctx.project.inputs, state);
    let transport = TransportConfig::new(region).with_profile(ctx.profile.clone());
    Deployer::new(lambdaflow_cloud_aws::connect(&transport).await)
}

/// 対象の表示
pub fn print_target(ctx: &Context) {
    println!(
        "📄 設定ファイル: {}",
        ctx.config_path.display().to_string().cyan()
    );
    println!("インスタンス: {}", ctx.id.instance.cyan());
    println!("ステージ: {}", ctx.id.stage.cyan());
}

/// `30m` `6h` `7d` 形式の期間を解析する
pub fn parse_since(value: &str) -> anyhow::Result<chrono::Duration> {
    let value = value.trim();
    let invalid = || anyhow::anyhow!("期間の形式が不正です: '{}' (例: 30m, 6h, 7d)", value);

    let (split, _) = value.char_indices().last().ok_or_else(invalid)?;
    let (amount, unit) = value.split_at(split);
    let amount: i64 = amount.parse().map_err(|_| invalid())?;
    if amount <= 0 {
        return Err(invalid());
    }

    let duration = match unit {
        "s" => chrono::Duration::try_seconds(amount),
        "m" => chrono::Duration::try_minutes(amount),
        "h" => chrono::Duration::try_hours(amount),
        "d" => chrono::Duration::try_days(amount),
        _ => None,
    };
    duration.ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_since() {
        assert_eq!(parse_since("30m").unwrap(), chrono::Duration::minutes(30));
        assert_eq!(parse_since("6h").unwrap(), chrono::Duration::hours(6));
        assert_eq!(parse_since(" 7d ").unwrap(), chrono::Duration::days(7));
        assert_eq!(parse_since("90s").unwrap(), chrono::Duration::seconds(90));
    }

    #[test]
    fn test_parse_since_rejects_garbage() {
        for value in ["", "h", "0h", "-1h", "10w", "ten-m"] {
            assert!(parse_since(value).is_err(), "{} should be rejected", value);
        }
    }
}
