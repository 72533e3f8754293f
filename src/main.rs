//! Risk Console
//!
//! Terminal front end over the market-risk API: periodically refreshed
//! CMDS/FRS/VP feeds with zone classification and freshness, plus governed
//! editing of the manual inputs.

use anyhow::Result;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use risk_console::config::ConsoleConfig;
use risk_console::console::render;
use risk_console::dashboard::{Composer, Dashboard};
use risk_console::events::{ConsoleEvent, EventBus};
use risk_console::feeds::{FeedKey, HttpRiskApi, RefreshScheduler};
use risk_console::manual::{UpdateCoordinator, UpdateError};
use risk_console::scoring::MaxPointsTable;
use risk_console::telemetry::{init_tracing, DEFAULT_FILTER};

// ──────────────────────────────────────────────────────────────────────────────
// COMMANDS
// ──────────────────────────────────────────────────────────────────────────────

enum Command {
    Show,
    Refresh,
    Fields,
    Set { field: String, value: String, as_of: Option<String> },
    Undo { field: String },
    Save,
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    let mut parts = line.split_whitespace();
    match parts.next()? {
        "show" => Some(Command::Show),
        "refresh" => Some(Command::Refresh),
        "fields" => Some(Command::Fields),
        "set" => {
            let field = parts.next()?.to_string();
            let value = parts.next()?.to_string();
            let as_of = parts.next().map(str::to_string);
            Some(Command::Set { field, value, as_of })
        }
        "undo" => Some(Command::Undo {
            field: parts.next()?.to_string(),
        }),
        "save" => Some(Command::Save),
        "quit" | "exit" => Some(Command::Quit),
        _ => None,
    }
}

async fn print_view(dashboard: &Dashboard) {
    let view = dashboard.view(chrono::Utc::now()).await;
    println!("\n{}", render(&view));
}

// ──────────────────────────────────────────────────────────────────────────────
// MAIN
// ──────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing(DEFAULT_FILTER)?;

    let config = ConsoleConfig::from_env()?;
    info!("Risk API at {}", config.api_base_url);

    let api = Arc::new(HttpRiskApi::from_config(&config)?);
    let events = Arc::new(EventBus::new());
    let dashboard = Arc::new(
        Dashboard::new(events.clone()).with_composer(Composer::new(MaxPointsTable::standard(), config.scheme_version)),
    );
    let coordinator = Arc::new(UpdateCoordinator::new(api.clone(), dashboard.clone()));
    let scheduler = RefreshScheduler::new(api, dashboard.clone(), coordinator.clone())
        .with_period(config.refresh_interval);

    println!("\n{}", "═".repeat(60));
    println!("Risk Console v{}", env!("CARGO_PKG_VERSION"));
    println!("{}", "═".repeat(60));
    println!("Commands: 'show' | 'refresh' | 'fields' | 'quit'");
    println!("Edits:    'set <field> <value> [YYYY-MM-DD]' | 'undo <field>' | 'save'\n");

    let mut updates = events.subscribe();
    scheduler.start().await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,

            event = updates.recv() => match event {
                Ok(ConsoleEvent::FeedUpdated { .. } | ConsoleEvent::FeedFailed { .. }) => print_view(&dashboard).await,
                Ok(ConsoleEvent::ManualInputRejected { fields, reason }) => {
                    println!("Update of {} rejected: {}", fields.join(", "), reason);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!("Console skipped {} events", skipped),
                Err(RecvError::Closed) => break,
            },

            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match parse_command(line) {
                    Some(Command::Show) => print_view(&dashboard).await,
                    Some(Command::Refresh) => {
                        scheduler.on_focus();
                        scheduler.trigger(FeedKey::ManualInputs);
                    }
                    Some(Command::Fields) => {
                        for field in coordinator.fields().await {
                            println!("  {:<32} {:>10}  [{} .. {}]", field.name, field.value, field.min, field.max);
                        }
                    }
                    Some(Command::Set { field, value, as_of }) => {
                        match coordinator.stage(&field, &value, as_of.as_deref()).await {
                            Ok(_) => println!("Staged {} (use 'save' to submit)", field),
                            Err(e) => println!("⚠️  {}", e),
                        }
                    }
                    Some(Command::Undo { field }) => {
                        coordinator.discard(&field).await;
                        println!("Discarded edit to {}", field);
                    }
                    Some(Command::Save) => {
                        // The submit and its refetch run off the input loop.
                        let coordinator = coordinator.clone();
                        tokio::spawn(async move {
                            match coordinator.apply_pending().await {
                                Ok(state) => println!("Saved manual inputs (version {})", state.version),
                                // Rejections arrive as ManualInputRejected events.
                                Err(UpdateError::Rejected(_) | UpdateError::Conflict(_)) => {}
                                Err(e) => println!("❌ {}", e),
                            }
                        });
                    }
                    Some(Command::Quit) => break,
                    None => println!("Unknown command: {}", line),
                }
            }
        }
    }

    scheduler.stop().await;
    dashboard.close();
    println!("\nGoodbye!\n");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_edit_commands() {
        match parse_command("set cre_office_vacancy 19.8 2025-06-01") {
            Some(Command::Set { field, value, as_of }) => {
                assert_eq!(field, "cre_office_vacancy");
                assert_eq!(value, "19.8");
                assert_eq!(as_of.as_deref(), Some("2025-06-01"));
            }
            _ => panic!("expected set"),
        }
        assert!(matches!(
            parse_command("undo cre_office_vacancy"),
            Some(Command::Undo { field }) if field == "cre_office_vacancy"
        ));
        assert!(matches!(parse_command("save"), Some(Command::Save)));
        assert!(parse_command("undo").is_none());
        assert!(parse_command("set cre_office_vacancy").is_none());
    }
}
