use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "設定ファイルが見つかりません。以下の場所を確認してください:\n\
        - カレントディレクトリ: lambdaflow.local.yml, lambdaflow.yml\n\
        - ./.lambdaflow/ ディレクトリ\n\
        - ~/.config/lambdaflow/lambdaflow.yml\n\
        または LAMBDAFLOW_CONFIG_PATH 環境変数で直接指定できます"
    )]
    ProjectFileNotFound,

    #[error("設定ファイルの解析に失敗しました ({path}): {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("環境変数 {0} が設定されていません")]
    MissingEnvVar(String),

    #[error("不正な設定値: {0}")]
    Invalid(String),

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
