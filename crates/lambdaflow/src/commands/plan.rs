use crate::utils::{self, Context};
use colored::Colorize;
use lambdaflow_cloud::ActionType;

pub async fn handle(ctx: &Context) -> anyhow::Result<()> {
    println!("{}", "変更内容を確認しています...".blue().bold());
    utils::print_target(ctx);

    let state = ctx
        .state_manager()
        .load()
        .await?
        .deployment(&ctx.id.key());
    let deployer = utils::connect(ctx, &state).await;
    let plan = deployer.plan(&ctx.id, &ctx.project.inputs, &state).await?;

    println!();
    for action in &plan.actions {
        let marker = match action.action_type {
            ActionType::Create => "+".green(),
            ActionType::Update => "~".yellow(),
            ActionType::Delete => "-".red(),
            ActionType::NoOp => "=".dimmed(),
        };
        println!(
            "  {} {} {}: {}",
            marker,
            action.resource_type.bold(),
            action.resource_id.cyan(),
            action.description
        );
    }

    println!();
    if plan.has_changes {
        println!("{}", plan.summary().to_string().yellow());
    } else {
        println!("{}", "変更はありません".green());
    }

    Ok(())
}
