//! Web server command.

use console::style;

use crate::config::{Config, Settings};
use crate::services::ServiceContext;

/// Start the web server.
pub async fn cmd_serve(settings: Settings, config: Config, bind: Option<&str>) -> anyhow::Result<()> {
    let (host, port) = match bind {
        Some(bind) => parse_bind_address(bind, config.server.port),
        None => (config.server.host.clone(), config.server.port),
    };

    println!(
        "{} Opening task store at {}",
        style("→").cyan(),
        settings.database_path().display()
    );
    let ctx = ServiceContext::build(settings, config)?;

    println!(
        "{} Starting scraper API at http://{}:{}",
        style("→").cyan(),
        host,
        port
    );
    println!("  Press Ctrl+C to stop");

    crate::server::serve(ctx, &host, port).await
}

/// Parse a bind address that can be:
/// - Just a port: "8787" -> 127.0.0.1:8787
/// - Just a host: "0.0.0.0" -> 0.0.0.0:{default_port}
/// - Host and port: "0.0.0.0:8787"
fn parse_bind_address(bind: &str, default_port: u16) -> (String, u16) {
    if let Ok(port) = bind.parse::<u16>() {
        return ("127.0.0.1".to_string(), port);
    }

    if let Some((host, port_str)) = bind.rsplit_once(':') {
        if let Ok(port) = port_str.parse::<u16>() {
            return (host.to_string(), port);
        }
    }

    (bind.to_string(), default_port)
}
