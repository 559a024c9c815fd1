//! Host-side coordinator.
//!
//! Keeps the authoritative selection list, the edit-mode flag, and the
//! undo/redo history. The iframe reports clicks; the coordinator decides
//! what is selected and echoes `element-selected` back, so highlighting on
//! the agent side always follows a host decision.

use indexmap::IndexMap;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::EditorConfig;
use crate::editor::channel::{port_pair, BroadcastSender, BusMessage, HostEndpoint, Outbound};
use crate::editor::protocol::{
    self, AgentNotification, ClickPayload, EditKind, HostCommand, OpApplied,
};
use crate::error::{Result, VeditError};

/// One selected element as the host tracks it.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedElementRecord {
    pub id: String,
    pub tag_name: String,
    pub class_name: String,
    pub text_content: String,
    pub xpath: String,
    pub selector: String,
    pub attributes: IndexMap<String, String>,
}

/// A confirmed direct edit, kept for undo/redo.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedEdit {
    pub kind: EditKind,
    pub xpath: String,
    pub name: Option<String>,
    pub prev_value: String,
    pub new_value: String,
}

pub struct Coordinator {
    config: EditorConfig,
    bus_tx: mpsc::UnboundedSender<BusMessage>,
    bus_rx: mpsc::UnboundedReceiver<BusMessage>,
    outbound: Box<dyn Outbound>,
    port_rx: Option<mpsc::UnboundedReceiver<Value>>,
    edit_mode: bool,
    selected: Vec<SelectedElementRecord>,
    hovered: Option<String>,
    active: Option<String>,
    undo_stack: Vec<AppliedEdit>,
    redo_stack: Vec<AppliedEdit>,
}

impl Coordinator {
    pub fn new(config: EditorConfig, endpoint: HostEndpoint) -> Self {
        let HostEndpoint { to_agent, from_agent } = endpoint;
        Self {
            config,
            outbound: Box::new(BroadcastSender(to_agent.clone())),
            bus_tx: to_agent,
            bus_rx: from_agent,
            port_rx: None,
            edit_mode: false,
            selected: Vec::new(),
            hovered: None,
            active: None,
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
        }
    }

    pub fn selected(&self) -> &[SelectedElementRecord] {
        &self.selected
    }

    pub fn is_edit_mode(&self) -> bool {
        self.edit_mode
    }

    pub fn hovered(&self) -> Option<&str> {
        self.hovered.as_deref()
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    /// Transfer a dedicated port to the frame and bind to our end. All
    /// traffic in both directions moves off the broadcast lane.
    pub fn establish_port(&mut self) -> Result<()> {
        let (host_end, agent_end) = port_pair();
        self.bus_tx
            .send(BusMessage {
                value: json!({ "type": protocol::INIT_PORT_TYPE }),
                ports: vec![agent_end],
            })
            .map_err(|_| VeditError::ChannelClosed("broadcast lane"))?;
        let (sender, rx) = host_end.split();
        self.outbound = Box::new(sender);
        self.port_rx = Some(rx);
        Ok(())
    }

    pub fn enter_edit_mode(&mut self) -> Result<()> {
        if self.edit_mode {
            return Ok(());
        }
        self.edit_mode = true;
        self.send_command(&HostCommand::EnableEditMode)
    }

    pub fn exit_edit_mode(&mut self) -> Result<()> {
        if !self.edit_mode {
            return Ok(());
        }
        self.edit_mode = false;
        self.active = None;
        self.hovered = None;
        self.send_command(&HostCommand::DisableEditMode)?;
        for record in std::mem::take(&mut self.selected) {
            self.send_command(&HostCommand::ElementDeselected {
                xpath: record.xpath,
            })?;
        }
        Ok(())
    }

    /// Returns the new state.
    pub fn toggle_edit_mode(&mut self) -> Result<bool> {
        if self.edit_mode {
            self.exit_edit_mode()?;
        } else {
            self.enter_edit_mode()?;
        }
        Ok(self.edit_mode)
    }

    /// Deselect everything while staying in edit mode.
    pub fn clear_selection(&mut self) -> Result<()> {
        for record in std::mem::take(&mut self.selected) {
            self.send_command(&HostCommand::ElementDeselected {
                xpath: record.xpath,
            })?;
        }
        self.active = None;
        Ok(())
    }

    /// Drop one record by its id. Returns whether anything was removed.
    pub fn remove_selected(&mut self, id: &str) -> Result<bool> {
        let Some(ix) = self.selected.iter().position(|r| r.id == id) else {
            return Ok(false);
        };
        let record = self.selected.remove(ix);
        if self.active.as_deref() == Some(id) {
            self.active = None;
        }
        self.send_command(&HostCommand::ElementDeselected {
            xpath: record.xpath,
        })?;
        Ok(true)
    }

    /// Request a text edit; the returned op id matches the confirmation.
    pub fn edit_text(&mut self, xpath: &str, text: &str) -> Result<String> {
        let op_id = protocol::generate_op_id();
        self.send_command(&HostCommand::EditText {
            op_id: op_id.clone(),
            xpath: xpath.to_string(),
            text: text.to_string(),
        })?;
        Ok(op_id)
    }

    /// Request an attribute edit. An empty value means removal.
    pub fn edit_attribute(&mut self, xpath: &str, name: &str, value: &str) -> Result<String> {
        if name.is_empty() {
            return Err(VeditError::MissingField("attribute name".to_string()));
        }
        let op_id = protocol::generate_op_id();
        self.send_command(&HostCommand::EditAttribute {
            op_id: op_id.clone(),
            xpath: xpath.to_string(),
            name: name.to_string(),
            value: value.to_string(),
        })?;
        Ok(op_id)
    }

    /// Replay the most recent edit backwards. Returns whether there was
    /// anything to undo.
    pub fn undo(&mut self) -> Result<bool> {
        let Some(edit) = self.undo_stack.pop() else {
            return Ok(false);
        };
        let value = edit.prev_value.clone();
        self.send_replay(&edit, &value)?;
        self.redo_stack.push(edit);
        Ok(true)
    }

    pub fn redo(&mut self) -> Result<bool> {
        let Some(edit) = self.redo_stack.pop() else {
            return Ok(false);
        };
        let value = edit.new_value.clone();
        self.send_replay(&edit, &value)?;
        self.undo_stack.push(edit);
        Ok(true)
    }

    /// Await the next notification from the frame, fold it into host
    /// state, and hand it to the caller. `None` means the frame is gone.
    pub async fn process_next(&mut self) -> Result<Option<AgentNotification>> {
        loop {
            let value = if let Some(rx) = self.port_rx.as_mut() {
                // anything still queued on the broadcast lane goes first
                match self.bus_rx.try_recv() {
                    Ok(message) => message.value,
                    Err(_) => match rx.recv().await {
                        Some(value) => value,
                        None => {
                            self.port_rx = None;
                            self.outbound = Box::new(BroadcastSender(self.bus_tx.clone()));
                            continue;
                        }
                    },
                }
            } else {
                match self.bus_rx.recv().await {
                    Some(message) => message.value,
                    None => return Ok(None),
                }
            };
            match protocol::decode_notification(&value) {
                Some(notification) => {
                    self.handle_notification(&notification)?;
                    return Ok(Some(notification));
                }
                None => debug!("unrecognized message from the frame dropped"),
            }
        }
    }

    /// Non-blocking variant of [`process_next`](Self::process_next).
    pub fn try_process(&mut self) -> Result<Option<AgentNotification>> {
        loop {
            let value = match self.bus_rx.try_recv() {
                Ok(message) => message.value,
                Err(_) => match self.port_rx.as_mut().and_then(|rx| rx.try_recv().ok()) {
                    Some(value) => value,
                    None => return Ok(None),
                },
            };
            match protocol::decode_notification(&value) {
                Some(notification) => {
                    self.handle_notification(&notification)?;
                    return Ok(Some(notification));
                }
                None => debug!("unrecognized message from the frame dropped"),
            }
        }
    }

    pub fn handle_notification(&mut self, notification: &AgentNotification) -> Result<()> {
        match notification {
            AgentNotification::IframeReady => {
                // frame reloaded under us: restore its mode
                if self.edit_mode {
                    self.send_command(&HostCommand::EnableEditMode)?;
                }
            }
            AgentNotification::ElementHover { element_id } => {
                self.hovered = Some(element_id.clone());
            }
            AgentNotification::ElementHoverEnd => {
                self.hovered = None;
            }
            AgentNotification::ElementClick(payload) => self.handle_click(payload)?,
            AgentNotification::OpApplied(applied) => self.record_applied(applied),
        }
        Ok(())
    }

    /// Compose a prompt that carries the current selection as context.
    pub fn prompt_with_elements(&self, message: &str) -> String {
        if self.selected.is_empty() {
            return message.to_string();
        }
        let mut out = String::from(message);
        out.push_str("\n\nSelected elements:");
        for (ix, record) in self.selected.iter().enumerate() {
            out.push_str(&format!("\n{}. <{}>", ix + 1, record.tag_name));
            out.push_str(&format!("\n   class: {}", or_none(&record.class_name)));
            out.push_str(&format!("\n   text: {}", or_none(&record.text_content)));
            out.push_str(&format!("\n   selector: {}", record.selector));
            let attributes = record
                .attributes
                .iter()
                .map(|(k, v)| format!("{k}=\"{v}\""))
                .collect::<Vec<_>>()
                .join(" ");
            out.push_str(&format!("\n   attributes: {}", or_none(&attributes)));
        }
        out
    }

    fn handle_click(&mut self, payload: &ClickPayload) -> Result<()> {
        if !self.edit_mode {
            return Ok(());
        }
        let existing = self
            .selected
            .iter()
            .find(|r| r.xpath == payload.xpath)
            .map(|r| r.id.clone());
        let element_id = match existing {
            Some(id) => id,
            None => {
                let id = format!(
                    "{}_{}_{}",
                    payload.tag_name,
                    payload.xpath,
                    protocol::now_millis()
                );
                self.selected.push(SelectedElementRecord {
                    id: id.clone(),
                    tag_name: payload.tag_name.clone(),
                    class_name: payload.class_name.clone(),
                    text_content: truncate_chars(
                        &payload.text_content,
                        self.config.text_preview_limit,
                    ),
                    xpath: payload.xpath.clone(),
                    selector: selector_for(&payload.xpath),
                    attributes: payload.attributes.clone(),
                });
                id
            }
        };
        self.active = Some(element_id.clone());
        // always echoed, even for an already-selected element
        self.send_command(&HostCommand::ElementSelected {
            xpath: payload.xpath.clone(),
            element_id,
        })
    }

    fn record_applied(&mut self, applied: &OpApplied) {
        // a confirmation without a previous value is a replay of history
        let Some(prev_value) = applied.prev_value.clone() else {
            return;
        };
        self.undo_stack.push(AppliedEdit {
            kind: applied.kind,
            xpath: applied.xpath.clone(),
            name: applied.name.clone(),
            prev_value,
            new_value: applied.new_value.clone(),
        });
        self.redo_stack.clear();
    }

    fn send_replay(&mut self, edit: &AppliedEdit, value: &str) -> Result<()> {
        self.send_command(&HostCommand::ApplyOp {
            op_id: Some(protocol::generate_op_id()),
            xpath: edit.xpath.clone(),
            kind: edit.kind,
            text: (edit.kind == EditKind::Text).then(|| value.to_string()),
            name: edit.name.clone(),
            value: (edit.kind == EditKind::Attribute).then(|| value.to_string()),
        })
    }

    fn send_command(&mut self, command: &HostCommand) -> Result<()> {
        let value = protocol::encode_command(command)?;
        self.outbound.send(value)
    }
}

fn or_none(text: &str) -> &str {
    if text.is_empty() {
        "none"
    } else {
        text
    }
}

/// Best-effort CSS selector for an address, for display only.
pub fn selector_for(address: &str) -> String {
    if let Some(rest) = address.strip_prefix("//*[@id=\"") {
        if let Some(id) = rest.strip_suffix("\"]") {
            return format!("#{id}");
        }
    }
    let Some(path) = address.strip_prefix('/') else {
        return address.to_string();
    };
    let mut parts = Vec::new();
    for segment in path.split('/') {
        let (tag, ordinal) = match segment.find('[') {
            None => (segment, 1),
            Some(open) => {
                let ordinal = segment
                    .strip_suffix(']')
                    .and_then(|s| s[open + 1..].parse::<usize>().ok());
                match ordinal {
                    Some(n) => (&segment[..open], n),
                    None => return address.to_string(),
                }
            }
        };
        if tag.is_empty() {
            return address.to_string();
        }
        if ordinal > 1 {
            parts.push(format!("{tag}:nth-of-type({ordinal})"));
        } else {
            parts.push(tag.to_string());
        }
    }
    parts.join(" > ")
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}
