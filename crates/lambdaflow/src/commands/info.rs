use crate::utils::{self, Context};
use colored::Colorize;

pub async fn handle(ctx: &Context, json: bool) -> anyhow::Result<()> {
    let state = ctx
        .state_manager()
        .load()
        .await?
        .deployment(&ctx.id.key());

    if state.name.is_none() {
        println!("{} はデプロイされていません", ctx.id.to_string().cyan());
        return Ok(());
    }

    let deployer = utils::connect(ctx, &state).await;
    let Some(info) = deployer.info(&state).await? else {
        println!(
            "{}",
            format!(
                "関数 {} が見つかりません (状態ファイルと実環境が一致していません)",
                state.name.as_deref().unwrap_or_default()
            )
            .yellow()
        );
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    let function = &info.function;
    println!("{}", function.name.cyan().bold());
    println!("  ARN:          {}", function.arn);
    println!("  説明:         {}", function.description);
    println!("  ランタイム:   {}", function.runtime);
    println!("  ハンドラ:     {}", function.handler);
    println!("  メモリ:       {} MB", function.memory);
    println!("  タイムアウト: {} 秒", function.timeout);
    println!("  コードハッシュ: {}", function.hash);
    println!(
        "  バージョン:   {}",
        info.version.as_deref().unwrap_or("-")
    );
    if let Some(role) = &info.role {
        let owner = if role.is_default() { "作成済み" } else { "指定" };
        println!("  ロール:       {} ({})", role.arn(), owner);
    }
    if let Some(meta_role) = &info.meta_role {
        println!("  メタロール:   {}", meta_role.arn);
    }
    if let Some(alias) = &info.alias {
        println!(
            "  エイリアス:   {} → {}",
            alias.name.cyan(),
            alias.function_version
        );
    }
    if !function.env.is_empty() {
        println!("  環境変数:");
        for key in function.env.keys() {
            println!("    • {}", key);
        }
    }
    if !function.layers.is_empty() {
        println!("  レイヤー:");
        for layer in &function.layers {
            println!("    • {}", layer);
        }
    }

    Ok(())
}
