//! Storage-state import and expiry inspection.

use std::path::Path;

use console::style;

use crate::config::{Config, Settings};
use crate::scrapers::cookies::{save_storage_state, state_path};
use crate::scrapers::ExpiryStatus;
use crate::services::ServiceContext;

pub async fn cmd_import(settings: Settings, config: Config, provider: &str, file: &Path) -> anyhow::Result<()> {
    let ctx = ServiceContext::build(settings, config)?;
    let provider = ctx
        .download
        .registry()
        .get(provider)
        .ok_or_else(|| anyhow::anyhow!("unknown provider '{}'", provider))?;

    let contents = tokio::fs::read_to_string(file).await?;
    let (path, count) =
        save_storage_state(&ctx.download.config().state_dir, provider.key(), &contents).await?;
    println!(
        "{} Stored {} cookies for {} at {}",
        style("✓").green(),
        count,
        provider.key(),
        path.display()
    );
    Ok(())
}

pub async fn cmd_show(settings: Settings, config: Config, provider: &str) -> anyhow::Result<()> {
    let ctx = ServiceContext::build(settings, config)?;
    let provider = ctx
        .download
        .registry()
        .get(provider)
        .ok_or_else(|| anyhow::anyhow!("unknown provider '{}'", provider))?;

    let path = state_path(&ctx.download.config().state_dir, provider.key());
    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        println!("{} No storage state for {}", style("!").yellow(), provider.key());
        return Ok(());
    }

    let expiry = ctx.download.cookies().expiry(&path).await?;
    let status = match expiry.status {
        ExpiryStatus::Valid => style("valid").green(),
        ExpiryStatus::Expiring => style("expiring").yellow(),
        ExpiryStatus::Expired => style("expired").red(),
        ExpiryStatus::Session => style("session").dim(),
    };
    println!("{} {}", style(provider.key()).bold(), status);
    println!("  cookies  {} ({} expired)", expiry.total, expiry.expired);
    if let Some(at) = expiry.earliest_expiry {
        println!("  expires  {}", at.to_rfc3339());
    }
    Ok(())
}
