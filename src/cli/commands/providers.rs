//! Provider listing.

use console::style;

use crate::cli::helpers::print_json;
use crate::config::{Config, Settings};
use crate::services::ServiceContext;

pub async fn cmd_providers(settings: Settings, config: Config, json: bool) -> anyhow::Result<()> {
    let ctx = ServiceContext::build(settings, config)?;
    let providers = ctx.download.registry().list();
    if json {
        return print_json(&providers);
    }

    for info in &providers {
        let hosts = if info.hosts.is_empty() {
            style("any host".to_string()).dim()
        } else {
            style(info.hosts.join(", "))
        };
        println!("{:<14} {:<20} {}", style(&info.key).bold(), info.label, hosts);
    }
    Ok(())
}
