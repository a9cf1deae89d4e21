use crate::utils::{self, Context};
use colored::Colorize;

pub async fn handle(ctx: &Context, yes: bool) -> anyhow::Result<()> {
    println!("{}", "削除を開始します...".blue().bold());
    utils::print_target(ctx);

    // 確認（--yesが指定されていない場合）
    if !yes {
        println!();
        println!(
            "{}",
            "警告: 関数・エイリアス・作成したロールを削除します。".yellow()
        );
        println!("実行するには --yes オプションを指定してください");
        return Ok(());
    }

    let manager = ctx.state_manager();
    let lock = manager.acquire_lock().await?;
    let mut state_file = manager.load().await?;
    let mut state = state_file.deployment(&ctx.id.key());

    if state.is_empty() {
        lock.release().await?;
        println!("{} はデプロイされていません", ctx.id.to_string().cyan());
        return Ok(());
    }

    let deployer = utils::connect(ctx, &state).await;
    let result = deployer.remove(&mut state).await;

    // 空になった状態はファイルから取り除かれる
    state_file.set_deployment(ctx.id.key(), state);
    manager.save(&state_file).await?;
    lock.release().await?;
    result?;

    println!();
    println!("{}", "✓ 削除が完了しました".green().bold());
    Ok(())
}
