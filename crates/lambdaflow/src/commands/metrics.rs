use crate::utils::{self, Context};
use colored::Colorize;
use lambdaflow_cloud::MetricSeries;

pub async fn handle(ctx: &Context, since: &str) -> anyhow::Result<()> {
    let range = utils::parse_since(since)?;
    let state = ctx
        .state_manager()
        .load()
        .await?
        .deployment(&ctx.id.key());

    let end = chrono::Utc::now();
    let start = end - range;

    let deployer = utils::connect(ctx, &state).await;
    let report = deployer.metrics(&state, start, end).await?;

    println!(
        "{} ({} 〜 {}, {}秒間隔)",
        report.function_name.cyan().bold(),
        report.start.format("%Y-%m-%d %H:%M"),
        report.end.format("%Y-%m-%d %H:%M"),
        report.period_secs
    );
    println!();
    for series in &report.series {
        println!("  {:<12} {}", series.label, summarize(series));
    }

    Ok(())
}

fn summarize(series: &MetricSeries) -> String {
    if series.points.is_empty() {
        return "データなし".dimmed().to_string();
    }
    // Duration は平均値の系列
    if series.id == "duration" {
        let average = series.total() / series.points.len() as f64;
        format!("平均 {:.1} ms", average)
    } else {
        format!("合計 {}", series.total())
    }
}
