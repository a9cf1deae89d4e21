mod commands;
mod utils;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "lambdaflow")]
#[command(about = "書いたとおりに、関数が立ち上がる。", long_about = None)]
struct Cli {
    /// ステージ名 (LAMBDAFLOW_STAGE 環境変数、省略時は設定ファイルの stage または dev)
    #[arg(short = 's', long, env = "LAMBDAFLOW_STAGE", global = true)]
    stage: Option<String>,

    /// AWSリージョン (設定ファイルの region より優先)
    #[arg(long, global = true)]
    region: Option<String>,

    /// AWSプロファイル名
    #[arg(long, env = "AWS_PROFILE", global = true)]
    profile: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 関数をデプロイ（ロール・エイリアス・プロビジョニング済み同時実行を含む）
    Deploy,
    /// デプロイで行われる変更を表示（変更は行わない）
    Plan,
    /// デプロイ済みの関数の情報を表示
    Info {
        /// JSON形式で出力
        #[arg(long)]
        json: bool,
    },
    /// 関数と作成したロールを削除
    Remove {
        /// 確認なしで実行
        #[arg(short, long)]
        yes: bool,
    },
    /// 関数のメトリクスを表示
    Metrics {
        /// 集計期間 (例: 30m, 6h, 7d)
        #[arg(long, default_value = "24h")]
        since: String,
    },
    /// バージョン情報を表示
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ログはstderrに出力 (RUST_LOG で制御)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    // Versionコマンドは設定ファイル不要
    if matches!(cli.command, Commands::Version) {
        println!("lambdaflow {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let ctx = utils::load_context(cli.stage.as_deref(), cli.region, cli.profile)?;

    // コマンドディスパッチ
    match cli.command {
        Commands::Deploy => commands::deploy::handle(&ctx).await?,
        Commands::Plan => commands::plan::handle(&ctx).await?,
        Commands::Info { json } => commands::info::handle(&ctx, json).await?,
        Commands::Remove { yes } => commands::remove::handle(&ctx, yes).await?,
        Commands::Metrics { since } => commands::metrics::handle(&ctx, &since).await?,
        Commands::Version => {}
    }

    Ok(())
}
