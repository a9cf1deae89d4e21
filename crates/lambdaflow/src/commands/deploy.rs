use crate::utils::{self, Context};
use colored::Colorize;

pub async fn handle(ctx: &Context) -> anyhow::Result<()> {
    println!("{}", "デプロイを開始します...".blue().bold());
    utils::print_target(ctx);

    let manager = ctx.state_manager();
    let lock = manager.acquire_lock().await?;
    let mut state_file = manager.load().await?;
    let mut state = state_file.deployment(&ctx.id.key());

    let deployer = utils::connect(ctx, &state).await;
    let result = deployer
        .deploy(&ctx.id, &ctx.project.inputs, &mut state)
        .await;

    // 失敗しても作成済みのリソースは状態に残す
    state_file.set_deployment(ctx.id.key(), state);
    manager.save(&state_file).await?;
    lock.release().await?;

    let outputs = result?;

    println!();
    if outputs.changed {
        println!("{}", "✓ デプロイが完了しました".green().bold());
    } else {
        println!("{}", "✓ 変更はありません".green().bold());
    }
    println!();
    println!("  関数:       {}", outputs.name.cyan());
    println!("  ARN:        {}", outputs.arn);
    println!(
        "  バージョン: {}",
        outputs.version.as_deref().unwrap_or("-")
    );
    println!("  ロール:     {}", outputs.role_arn);
    if let Some(meta_role_arn) = &outputs.meta_role_arn {
        println!("  メタロール: {}", meta_role_arn);
    }
    if let Some(alias) = &outputs.alias {
        println!(
            "  エイリアス: {} → {}",
            alias.name.cyan(),
            alias.function_version
        );
    }
    if let Some(concurrency) = &outputs.provisioned_concurrency {
        let status = if concurrency.is_converged() {
            "割り当て済み".green()
        } else {
            "割り当て中".yellow()
        };
        println!(
            "  同時実行:   {}/{} ({})",
            concurrency.allocated, concurrency.requested, status
        );
    }
    if !outputs.security_group_ids.is_empty() || !outputs.subnet_ids.is_empty() {
        println!(
            "  VPC:        sg=[{}] subnet=[{}]",
            outputs.security_group_ids.join(", "),
            outputs.subnet_ids.join(", ")
        );
    }

    Ok(())
}
