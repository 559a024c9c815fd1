//! Wire protocol between the host coordinator and the iframe agent.
//!
//! Every message is a JSON envelope `{ type, data?, source }`. The source
//! tag fixes the direction: commands carry `"visual-editor"`, notifications
//! carry `"visual-editor-iframe"`, and both ends drop anything whose tag
//! does not match the direction they expect.

use std::time::{SystemTime, UNIX_EPOCH};

use indexmap::IndexMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Source tag on host-origin commands.
pub const HOST_SOURCE: &str = "visual-editor";

/// Source tag on iframe-origin notifications.
pub const AGENT_SOURCE: &str = "visual-editor-iframe";

/// Type of the handshake message that transfers the dedicated port.
pub const INIT_PORT_TYPE: &str = "init-port";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditKind {
    #[serde(rename = "edit-text")]
    Text,
    #[serde(rename = "edit-attribute")]
    Attribute,
}

/// Commands the host sends into the iframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum HostCommand {
    EnableEditMode,
    DisableEditMode,
    ElementSelected {
        xpath: String,
        element_id: String,
    },
    ElementDeselected {
        xpath: String,
    },
    EditText {
        op_id: String,
        xpath: String,
        text: String,
    },
    EditAttribute {
        op_id: String,
        xpath: String,
        name: String,
        value: String,
    },
    /// Replay of a previously confirmed edit (undo/redo). The agent applies
    /// it without capturing a previous value.
    ApplyOp {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        op_id: Option<String>,
        xpath: String,
        kind: EditKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
}

/// Notifications the iframe sends back to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum AgentNotification {
    IframeReady,
    ElementHover { element_id: String },
    ElementHoverEnd,
    ElementClick(ClickPayload),
    OpApplied(OpApplied),
}

/// Everything captured from a clicked element. Selection policy stays with
/// the host, so the modifier flags ride along unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickPayload {
    pub tag_name: String,
    pub class_name: String,
    pub text_content: String,
    pub xpath: String,
    pub attributes: IndexMap<String, String>,
    pub meta_key: bool,
    pub ctrl_key: bool,
    pub shift_key: bool,
}

/// Confirmation of an executed edit. `prev_value` is `None` exactly when
/// the edit was a replay, which tells the host not to record it again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpApplied {
    pub op_id: String,
    pub kind: EditKind,
    pub xpath: String,
    pub name: Option<String>,
    pub prev_value: Option<String>,
    pub new_value: String,
}

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    #[serde(flatten)]
    msg: T,
    source: String,
}

pub fn encode_command(command: &HostCommand) -> Result<Value> {
    Ok(serde_json::to_value(Envelope {
        msg: command,
        source: HOST_SOURCE.to_string(),
    })?)
}

pub fn encode_notification(notification: &AgentNotification) -> Result<Value> {
    Ok(serde_json::to_value(Envelope {
        msg: notification,
        source: AGENT_SOURCE.to_string(),
    })?)
}

/// Decode a host command, rejecting untagged or mismatched-source messages.
pub fn decode_command(value: &Value) -> Option<HostCommand> {
    let envelope: Envelope<HostCommand> = serde_json::from_value(value.clone()).ok()?;
    (envelope.source == HOST_SOURCE).then_some(envelope.msg)
}

/// Decode an agent notification, rejecting untagged or mismatched-source
/// messages.
pub fn decode_notification(value: &Value) -> Option<AgentNotification> {
    let envelope: Envelope<AgentNotification> = serde_json::from_value(value.clone()).ok()?;
    (envelope.source == AGENT_SOURCE).then_some(envelope.msg)
}

/// Milliseconds since the Unix epoch, used for time-derived identifiers.
pub fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// Operation id: `op_` + timestamp + 4 random hex characters, so two edits
/// committed within the same millisecond stay distinguishable.
pub fn generate_op_id() -> String {
    let suffix: u16 = rand::thread_rng().gen();
    format!("op_{}_{:04x}", now_millis(), suffix)
}
