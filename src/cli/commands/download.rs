//! Foreground download and task status commands.

use console::style;
use tokio::sync::mpsc;

use crate::cli::helpers::{print_json, styled_status, task_line};
use crate::config::{Config, Settings};
use crate::models::DownloadRequest;
use crate::services::{DownloadEvent, ServiceContext};

/// Queue a chapter and drive it to a terminal state, printing progress.
pub async fn cmd_download(settings: Settings, config: Config, request: DownloadRequest) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::channel(256);
    let ctx = ServiceContext::build_with_events(settings, config, Some(tx))?;

    let submitted = ctx.download.enqueue(&request)?;
    if submitted.status != "pending" {
        println!(
            "{} Chapter already queued as task {} ({})",
            style("!").yellow(),
            submitted.task_id,
            submitted.message
        );
        return Ok(());
    }

    let task_id = submitted.task_id;
    println!(
        "{} Task {} for {}/{}",
        style("→").cyan(),
        style(&task_id).dim(),
        request.manga.id,
        request.chapter.id
    );

    let mut driver = tokio::spawn(ctx.download.clone().drive_task(task_id.clone()));
    loop {
        tokio::select! {
            Some(event) = rx.recv() => print_event(&event),
            result = &mut driver => {
                if let Err(e) = result {
                    eprintln!("  {} Download task panicked: {}", style("✗").red(), e);
                }
                break;
            }
        }
    }
    while let Ok(event) = rx.try_recv() {
        print_event(&event);
    }

    let view = ctx.download.status(&task_id)?;
    println!("{}", task_line(&view));
    if let Some(report) = &view.report {
        println!(
            "  {} of {} images in {}",
            report.success_count, report.total, report.output_dir
        );
    }
    Ok(())
}

fn print_event(event: &DownloadEvent) {
    match event {
        DownloadEvent::Started { total, .. } => {
            println!("  {} {} images", style("↓").cyan(), total);
        }
        DownloadEvent::ImageSaved {
            index, path, reused, ..
        } => {
            let note = if *reused { " (existing)" } else { "" };
            println!(
                "  {} {:>3} {}{}",
                style("✓").green(),
                index,
                path.display(),
                style(note).dim()
            );
        }
        DownloadEvent::ImageFailed { index, url, error, .. } => {
            println!("  {} {:>3} {}: {}", style("✗").red(), index, url, error);
        }
        DownloadEvent::Finished { status, .. } => {
            println!("  {} run ended: {}", style("→").cyan(), styled_status(status.as_str()));
        }
    }
}

pub async fn cmd_status(settings: Settings, config: Config, task_id: &str, json: bool) -> anyhow::Result<()> {
    let ctx = ServiceContext::build(settings, config)?;
    let view = ctx.download.status(task_id)?;
    if json {
        return print_json(&view);
    }

    println!("{}", task_line(&view));
    println!("  created   {}", view.created_at.to_rfc3339());
    println!("  updated   {}", view.updated_at.to_rfc3339());
    println!("  retries   {}/{}", view.retry_count, view.max_retries);
    if let Some(next) = view.next_retry_at {
        println!("  next try  {}", next.to_rfc3339());
    }
    if let Some(err) = &view.last_error {
        println!("  error     {}", style(err).red());
    }
    if let Some(report) = &view.report {
        println!(
            "  images    {} ok, {} failed of {} in {}",
            report.success_count, report.failed_count, report.total, report.output_dir
        );
    }
    Ok(())
}
