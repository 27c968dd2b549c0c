//! Queue inspection, maintenance and alert commands.

use console::style;

use crate::cli::helpers::{format_age, print_json, task_line};
use crate::config::{Config, Settings};
use crate::models::{AlertQuery, AlertRule, AlertSeverity, TaskStatus, TaskStatusView, WebhookStatus};
use crate::services::ServiceContext;

pub async fn cmd_queue(
    settings: Settings,
    config: Config,
    status: Option<&str>,
    limit: usize,
    json: bool,
) -> anyhow::Result<()> {
    let status = match status {
        Some(s) => Some(
            TaskStatus::from_str(s).ok_or_else(|| anyhow::anyhow!("unknown status '{}'", s))?,
        ),
        None => None,
    };
    let ctx = ServiceContext::build(settings, config)?;
    let stats = ctx.store.queue_stats()?;
    let tasks: Vec<TaskStatusView> = ctx
        .store
        .list_tasks(limit.max(1), status)?
        .iter()
        .map(TaskStatusView::from)
        .collect();

    if json {
        return print_json(&serde_json::json!({ "stats": stats, "tasks": tasks }));
    }

    println!("{}", style("Queue").bold());
    println!(
        "  pending {}  running {}  retrying {}  done {}  failed {}",
        stats.pending, stats.running, stats.retrying, stats.done, stats.failed
    );
    let oldest = stats
        .oldest_active_age_sec
        .map(format_age)
        .unwrap_or_else(|| "-".to_string());
    println!("  backlog {} (oldest {})", stats.backlog, oldest);

    if tasks.is_empty() {
        println!("{} No tasks", style("!").yellow());
        return Ok(());
    }
    println!();
    for view in &tasks {
        println!("{}", task_line(view));
    }
    Ok(())
}

pub async fn cmd_metrics(settings: Settings, config: Config, hours: u32, json: bool) -> anyhow::Result<()> {
    let ctx = ServiceContext::build(settings, config)?;
    let metrics = ctx.store.metrics(hours.max(1))?;
    if json {
        return print_json(&metrics);
    }

    println!("{}", style(format!("Last {}h", metrics.hours)).bold());
    println!(
        "  {} finished: {} success, {} partial, {} error",
        metrics.total, metrics.success, metrics.partial, metrics.error
    );
    println!(
        "  success rate {:.1}%  error rate {:.1}%",
        metrics.success_rate * 100.0,
        metrics.error_rate * 100.0
    );
    if !metrics.by_provider.is_empty() {
        println!("  by provider:");
        for (provider, m) in &metrics.by_provider {
            println!(
                "    {:<14} {} total, {} success, {} partial, {} error",
                provider, m.total, m.success, m.partial, m.error
            );
        }
    }
    if !metrics.by_error_code.is_empty() {
        println!("  by error code:");
        for (code, count) in &metrics.by_error_code {
            println!("    {:<30} {}", code, count);
        }
    }
    Ok(())
}

pub async fn cmd_alerts_list(
    settings: Settings,
    config: Config,
    page: usize,
    page_size: usize,
    severity: Option<&str>,
    rule: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let query = AlertQuery {
        page: page.max(1),
        page_size: page_size.clamp(1, 200),
        severity: match severity {
            Some(s) => Some(
                AlertSeverity::from_str(s).ok_or_else(|| anyhow::anyhow!("unknown severity '{}'", s))?,
            ),
            None => None,
        },
        rule: match rule {
            Some(r) => Some(AlertRule::from_str(r).ok_or_else(|| anyhow::anyhow!("unknown rule '{}'", r))?),
            None => None,
        },
    };
    let ctx = ServiceContext::build(settings, config)?;
    let (alerts, total) = ctx.store.list_alerts(&query)?;
    if json {
        return print_json(&serde_json::json!({ "total": total, "alerts": alerts }));
    }

    if alerts.is_empty() {
        println!("{} No alerts", style("!").yellow());
        return Ok(());
    }
    println!(
        "{} (page {}, {} total)",
        style("Alerts").bold(),
        query.page,
        total
    );
    for alert in &alerts {
        let severity = match alert.severity {
            AlertSeverity::Error => style(alert.severity.as_str()).red(),
            AlertSeverity::Warning => style(alert.severity.as_str()).yellow(),
        };
        println!(
            "  #{:<5} {} {:<8} {:<16} {} (webhook {})",
            alert.id,
            style(alert.created_at.format("%Y-%m-%d %H:%M:%S")).dim(),
            severity,
            alert.rule.as_str(),
            alert.message,
            alert.webhook_status.as_str()
        );
    }
    Ok(())
}

/// Run one evaluation pass outside the server's loop.
pub async fn cmd_alerts_check(settings: Settings, config: Config) -> anyhow::Result<()> {
    let ctx = ServiceContext::build(settings, config)?;
    let alerts = ctx.alerts.evaluate().await?;
    if alerts.is_empty() {
        println!("{} All rules quiet (or in cooldown)", style("✓").green());
    }
    for alert in &alerts {
        println!(
            "{} {}: {} (webhook {})",
            style("!").yellow(),
            alert.rule.as_str(),
            alert.message,
            alert.webhook_status.as_str()
        );
    }
    Ok(())
}

pub async fn cmd_alerts_test(settings: Settings, config: Config) -> anyhow::Result<()> {
    let ctx = ServiceContext::build(settings, config)?;
    let outcome = ctx.alerts.send_test_webhook().await;
    match outcome.status {
        WebhookStatus::Sent => println!(
            "{} Webhook delivered after {} attempt(s)",
            style("✓").green(),
            outcome.attempts
        ),
        WebhookStatus::Skipped => println!(
            "{} Webhook disabled or no URL configured",
            style("!").yellow()
        ),
        _ => println!(
            "{} Webhook failed after {} attempt(s): {}",
            style("✗").red(),
            outcome.attempts,
            outcome.last_error.unwrap_or_default()
        ),
    }
    Ok(())
}

pub async fn cmd_prune(settings: Settings, config: Config) -> anyhow::Result<()> {
    let ctx = ServiceContext::build(settings, config)?;
    let days = ctx.download.config().retention_days;
    let count = ctx.download.prune()?;
    println!(
        "{} Pruned {} finished tasks older than {} days",
        style("✓").green(),
        count,
        days
    );
    Ok(())
}

pub async fn cmd_recover(settings: Settings, config: Config) -> anyhow::Result<()> {
    let ctx = ServiceContext::build(settings, config)?;
    let count = ctx.download.recover_stale()?;
    if count == 0 {
        println!("{} No stale tasks", style("✓").green());
    } else {
        println!(
            "{} Marked {} stale tasks as {}",
            style("!").yellow(),
            count,
            TaskStatus::Error.as_str()
        );
    }
    Ok(())
}
