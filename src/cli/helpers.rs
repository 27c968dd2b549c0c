//! Shared formatting helpers for CLI commands.

use console::{style, StyledObject};
use serde::Serialize;

use crate::models::{TaskStatus, TaskStatusView};

/// Colour a task status for terminal output.
pub fn styled_status(status: &str) -> StyledObject<String> {
    let text = status.to_string();
    match TaskStatus::from_str(status) {
        Some(TaskStatus::Success) => style(text).green(),
        Some(TaskStatus::Partial) | Some(TaskStatus::Retrying) => style(text).yellow(),
        Some(TaskStatus::Error) => style(text).red(),
        Some(TaskStatus::Running) => style(text).cyan(),
        _ => style(text).dim(),
    }
}

/// Pretty-print a value as JSON.
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Parse a `name=value` cookie argument.
pub fn parse_cookie_pair(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected name=value, got '{}'", arg)),
    }
}

/// Compact human duration, e.g. `1h 05m` or `42s`.
pub fn format_age(seconds: i64) -> String {
    let seconds = seconds.max(0);
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {:02}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {:02}m", seconds / 3600, (seconds % 3600) / 60)
    }
}

/// One-line task summary.
pub fn task_line(view: &TaskStatusView) -> String {
    let progress = if view.progress_total > 0 {
        format!(" {}/{}", view.progress_completed, view.progress_total)
    } else {
        String::new()
    };
    let code = view
        .error_code
        .map(|c| format!(" [{}]", c.as_str()))
        .unwrap_or_default();
    format!(
        "{} {:<8}{} {} {}{}",
        style(&view.task_id).dim(),
        styled_status(&view.status),
        progress,
        style(&view.provider).bold(),
        view.message,
        code
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cookie_pair() {
        assert_eq!(
            parse_cookie_pair("cf_clearance=abc=def").unwrap(),
            ("cf_clearance".to_string(), "abc=def".to_string())
        );
        assert!(parse_cookie_pair("novalue").is_err());
        assert!(parse_cookie_pair("=x").is_err());
    }

    #[test]
    fn test_format_age() {
        assert_eq!(format_age(42), "42s");
        assert_eq!(format_age(125), "2m 05s");
        assert_eq!(format_age(3_900), "1h 05m");
    }
}
