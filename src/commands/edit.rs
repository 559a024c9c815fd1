use std::path::Path;
use std::time::Duration;

use colored::Colorize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::cli::Cli;
use crate::config::Config;
use crate::dom::Document;
use crate::editor::channel::frame_link;
use crate::editor::protocol::{AgentNotification, OpApplied};
use crate::editor::{Agent, Coordinator};
use crate::error::{Result, VeditError};

const CONFIRM_TIMEOUT: Duration = Duration::from_secs(2);

/// Run one edit through the full editor loop: spawn the agent on the
/// parsed document, handshake, send the edit, await its confirmation, and
/// write the mutated document back out.
pub async fn run(
    cli: &Cli,
    file: &Path,
    addr: &str,
    text: Option<&str>,
    attr: Option<&str>,
    output: Option<&Path>,
) -> Result<()> {
    let config = Config::load()?;
    let html = std::fs::read_to_string(file)?;
    let doc = Document::parse(&html);

    let (host_end, agent_end) = frame_link();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let agent = Agent::new(doc, config.editor.clone(), agent_end);
    let agent_task = tokio::spawn(agent.run(event_rx));
    let mut coordinator = Coordinator::new(config.editor, host_end);

    match coordinator.process_next().await? {
        Some(AgentNotification::IframeReady) => {}
        _ => return Err(VeditError::ChannelClosed("frame")),
    }
    coordinator.establish_port()?;

    let op_id = match (text, attr) {
        (Some(text), None) => coordinator.edit_text(addr, text)?,
        (None, Some(attr)) => {
            let (name, value) = attr.split_once('=').unwrap_or((attr, ""));
            coordinator.edit_attribute(addr, name, value)?
        }
        _ => return Err(VeditError::MissingField("--text or --attr".to_string())),
    };

    // no confirmation means the address resolved to nothing
    let applied = timeout(CONFIRM_TIMEOUT, await_confirmation(&mut coordinator, &op_id))
        .await
        .map_err(|_| VeditError::AddressNotFound(addr.to_string()))??;

    // close both lanes so the agent's run loop winds down
    drop(coordinator);
    drop(event_tx);
    let agent = agent_task
        .await
        .map_err(|e| VeditError::Other(format!("editor task failed: {}", e)))?;

    let out_path = output.unwrap_or(file);
    std::fs::write(out_path, agent.into_document().to_html())?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "opId": applied.op_id,
                "address": applied.xpath,
                "prevValue": applied.prev_value,
                "newValue": applied.new_value,
                "output": out_path,
            }))?
        );
    } else {
        println!(
            "{} Applied edit to {} (was {:?})",
            "✓".green(),
            applied.xpath,
            applied.prev_value.as_deref().unwrap_or("")
        );
        println!("  wrote {}", out_path.display());
    }

    Ok(())
}

async fn await_confirmation(coordinator: &mut Coordinator, op_id: &str) -> Result<OpApplied> {
    loop {
        match coordinator.process_next().await? {
            Some(AgentNotification::OpApplied(applied)) if applied.op_id == op_id => {
                return Ok(applied);
            }
            Some(_) => continue,
            None => return Err(VeditError::ChannelClosed("frame")),
        }
    }
}
