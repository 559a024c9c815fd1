//! Iframe-side agent.
//!
//! Owns the live document and reacts to pointer events and host commands.
//! The agent never decides selection policy itself: a click is reported to
//! the host with everything captured about the element, and highlighting
//! only follows the `element-selected` / `element-deselected` commands the
//! host sends back.

use std::collections::HashSet;

use ego_tree::NodeId;
use indexmap::IndexMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::{self, Duration, Instant};
use tracing::debug;

use crate::address;
use crate::config::EditorConfig;
use crate::dom::Document;
use crate::editor::channel::{AgentEndpoint, BroadcastSender, BusMessage, Outbound};
use crate::editor::highlight::{self, HighlightKind, INDICATOR_ID};
use crate::editor::protocol::{
    self, AgentNotification, ClickPayload, EditKind, HostCommand, OpApplied,
};

const INDICATOR_STYLE: &str = "position:fixed;top:12px;right:12px;background:#1e40af;\
color:#fff;padding:4px 10px;border-radius:4px;font:12px sans-serif;z-index:999999";

/// Modifier keys held during a click, passed through to the host unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub meta: bool,
    pub ctrl: bool,
    pub shift: bool,
}

/// Pointer activity inside the frame.
#[derive(Debug, Clone, Copy)]
pub enum PointerEvent {
    Over(NodeId),
    Out(NodeId),
    Click(NodeId, Modifiers),
}

struct PendingHover {
    target: NodeId,
    deadline: Instant,
}

pub struct Agent {
    doc: Document,
    config: EditorConfig,
    enabled: bool,
    selected: HashSet<NodeId>,
    hovered: Option<NodeId>,
    pending_hover: Option<PendingHover>,
    indicator: Option<NodeId>,
    outbound: Box<dyn Outbound>,
    bus_tx: mpsc::UnboundedSender<BusMessage>,
    bus_rx: Option<mpsc::UnboundedReceiver<BusMessage>>,
    port_rx: Option<mpsc::UnboundedReceiver<Value>>,
}

impl Agent {
    /// Bind to the iframe end of the link and announce readiness.
    pub fn new(doc: Document, config: EditorConfig, endpoint: AgentEndpoint) -> Self {
        let AgentEndpoint { to_host, from_host } = endpoint;
        let agent = Self {
            doc,
            config,
            enabled: false,
            selected: HashSet::new(),
            hovered: None,
            pending_hover: None,
            indicator: None,
            outbound: Box::new(BroadcastSender(to_host.clone())),
            bus_tx: to_host,
            bus_rx: Some(from_host),
            port_rx: None,
        };
        agent.notify(&AgentNotification::IframeReady);
        agent
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn into_document(self) -> Document {
        self.doc
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_selected(&self, id: NodeId) -> bool {
        self.selected.contains(&id)
    }

    pub fn selected_len(&self) -> usize {
        self.selected.len()
    }

    /// Enter edit mode and mount the indicator overlay.
    pub fn enable(&mut self) {
        if self.enabled {
            return;
        }
        self.enabled = true;
        let indicator = self.doc.append_element(self.doc.body(), "div");
        self.doc.set_attr(indicator, "id", INDICATOR_ID);
        self.doc.set_attr(indicator, "style", INDICATOR_STYLE);
        let label = self.config.indicator_label.clone();
        self.doc.set_text_content(indicator, &label);
        self.indicator = Some(indicator);
    }

    /// Leave edit mode: every marker, the indicator, and all transient
    /// state go, so the document carries no trace of the session.
    pub fn disable(&mut self) {
        self.enabled = false;
        self.pending_hover = None;
        self.hovered = None;
        self.selected.clear();
        highlight::clear_all(&mut self.doc);
        if let Some(indicator) = self.indicator.take() {
            self.doc.detach(indicator);
        }
    }

    /// Pointer entered an element. Highlight is immediate; the hover
    /// notification waits out the debounce window and only the last
    /// target within the window is announced.
    pub fn pointer_over(&mut self, target: NodeId) {
        if !self.enabled || self.is_ignorable(target) {
            return;
        }
        highlight::apply(&mut self.doc, target, HighlightKind::Hover);
        if self.hovered == Some(target) {
            return;
        }
        self.hovered = Some(target);
        self.pending_hover = Some(PendingHover {
            target,
            deadline: Instant::now() + Duration::from_millis(self.config.hover_debounce_ms),
        });
    }

    /// Pointer left an element. Hover-end is not debounced.
    pub fn pointer_out(&mut self, target: NodeId) {
        if !self.enabled || self.is_ignorable(target) {
            return;
        }
        if !self.doc.has_class(target, highlight::SELECTED_CLASS) {
            highlight::remove(&mut self.doc, target, HighlightKind::Hover);
        }
        if self.hovered == Some(target) {
            self.hovered = None;
            self.pending_hover = None;
            self.notify(&AgentNotification::ElementHoverEnd);
        }
    }

    /// A click inside the frame. Returns whether the event was consumed;
    /// the caller suppresses the page's own handlers when it was.
    pub fn handle_click(&mut self, target: NodeId, modifiers: Modifiers) -> bool {
        if !self.enabled {
            return false;
        }
        if self.is_ignorable(target) {
            return true;
        }
        let payload = ClickPayload {
            tag_name: self.doc.tag(target).unwrap_or_default().to_string(),
            class_name: highlight::own_classes(&self.doc, target),
            text_content: self.doc.text_content(target).trim().to_string(),
            xpath: address::compute(&self.doc, target),
            attributes: self.captured_attributes(target),
            meta_key: modifiers.meta,
            ctrl_key: modifiers.ctrl,
            shift_key: modifiers.shift,
        };
        self.notify(&AgentNotification::ElementClick(payload));
        true
    }

    pub fn handle_pointer(&mut self, event: PointerEvent) {
        match event {
            PointerEvent::Over(target) => self.pointer_over(target),
            PointerEvent::Out(target) => self.pointer_out(target),
            PointerEvent::Click(target, modifiers) => {
                self.handle_click(target, modifiers);
            }
        }
    }

    pub fn handle_command(&mut self, command: HostCommand) {
        match command {
            HostCommand::EnableEditMode => self.enable(),
            HostCommand::DisableEditMode => self.disable(),
            HostCommand::ElementSelected { xpath, .. } => self.select(&xpath),
            HostCommand::ElementDeselected { xpath } => self.deselect(&xpath),
            HostCommand::EditText { op_id, xpath, text } => self.edit_text(&op_id, &xpath, &text),
            HostCommand::EditAttribute {
                op_id,
                xpath,
                name,
                value,
            } => self.edit_attribute(&op_id, &xpath, &name, &value),
            HostCommand::ApplyOp {
                op_id,
                xpath,
                kind,
                text,
                name,
                value,
            } => self.apply_op(op_id, &xpath, kind, text, name, value),
        }
    }

    /// A raw broadcast message: either the port handshake or an enveloped
    /// command. Anything else on the bus is not ours and is dropped.
    pub fn handle_inbound(&mut self, message: BusMessage) {
        if message.value.get("type").and_then(Value::as_str) == Some(protocol::INIT_PORT_TYPE) {
            let Some(port) = message.ports.into_iter().next() else {
                debug!("init-port message carried no port");
                return;
            };
            let (sender, rx) = port.split();
            self.outbound = Box::new(sender);
            self.port_rx = Some(rx);
            return;
        }
        match protocol::decode_command(&message.value) {
            Some(command) => self.handle_command(command),
            None => debug!("unrecognized broadcast message dropped"),
        }
    }

    /// The debounce window elapsed: announce the still-hovered target.
    pub fn fire_hover_timer(&mut self) {
        let Some(pending) = self.pending_hover.take() else {
            return;
        };
        if !self.enabled {
            return;
        }
        let xpath = address::compute(&self.doc, pending.target);
        let element_id = format!(
            "{}_{}_{}",
            self.doc.tag(pending.target).unwrap_or_default(),
            xpath,
            protocol::now_millis()
        );
        self.notify(&AgentNotification::ElementHover { element_id });
    }

    /// Drive the agent until every inbound channel is gone. Returns the
    /// agent so the caller can take the edited document back.
    pub async fn run(mut self, events: mpsc::UnboundedReceiver<PointerEvent>) -> Self {
        let mut events = Some(events);
        loop {
            if events.is_none() && self.bus_rx.is_none() && self.port_rx.is_none() {
                break;
            }
            let deadline = self.pending_hover.as_ref().map(|p| p.deadline);
            let mut bus_rx = self.bus_rx.take();
            let mut port_rx = self.port_rx.take();
            let wake = tokio::select! {
                event = next_message(&mut events) => Wake::Event(event),
                message = next_message(&mut bus_rx) => Wake::Bus(message),
                value = next_message(&mut port_rx) => Wake::Port(value),
                _ = hover_elapsed(deadline) => Wake::Timer,
            };
            self.bus_rx = bus_rx;
            self.port_rx = port_rx;
            match wake {
                Wake::Event(Some(event)) => self.handle_pointer(event),
                Wake::Event(None) => events = None,
                Wake::Bus(Some(message)) => self.handle_inbound(message),
                Wake::Bus(None) => self.bus_rx = None,
                Wake::Port(Some(value)) => match protocol::decode_command(&value) {
                    Some(command) => self.handle_command(command),
                    None => debug!("unrecognized port message dropped"),
                },
                Wake::Port(None) => {
                    // port torn down: fall back to the broadcast lane
                    self.port_rx = None;
                    self.outbound = Box::new(BroadcastSender(self.bus_tx.clone()));
                }
                Wake::Timer => self.fire_hover_timer(),
            }
        }
        self
    }

    fn select(&mut self, xpath: &str) {
        let Some(id) = address::resolve(&self.doc, xpath) else {
            debug!(xpath, "select target not found");
            return;
        };
        highlight::apply(&mut self.doc, id, HighlightKind::Selected);
        self.selected.insert(id);
    }

    fn deselect(&mut self, xpath: &str) {
        let Some(id) = address::resolve(&self.doc, xpath) else {
            debug!(xpath, "deselect target not found");
            return;
        };
        highlight::remove(&mut self.doc, id, HighlightKind::Selected);
        self.selected.remove(&id);
    }

    fn edit_text(&mut self, op_id: &str, xpath: &str, text: &str) {
        let Some(id) = address::resolve(&self.doc, xpath) else {
            debug!(xpath, "edit-text target not found");
            return;
        };
        let prev = self.doc.text_content(id);
        self.doc.set_text_content(id, text);
        self.notify(&AgentNotification::OpApplied(OpApplied {
            op_id: op_id.to_string(),
            kind: EditKind::Text,
            xpath: xpath.to_string(),
            name: None,
            prev_value: Some(prev),
            new_value: text.to_string(),
        }));
    }

    fn edit_attribute(&mut self, op_id: &str, xpath: &str, name: &str, value: &str) {
        if name.is_empty() {
            debug!(xpath, "edit-attribute without a name dropped");
            return;
        }
        let Some(id) = address::resolve(&self.doc, xpath) else {
            debug!(xpath, "edit-attribute target not found");
            return;
        };
        let prev = self.doc.attr(id, name).unwrap_or_default().to_string();
        if value.is_empty() {
            self.doc.remove_attr(id, name);
        } else {
            self.doc.set_attr(id, name, value);
        }
        self.notify(&AgentNotification::OpApplied(OpApplied {
            op_id: op_id.to_string(),
            kind: EditKind::Attribute,
            xpath: xpath.to_string(),
            name: Some(name.to_string()),
            prev_value: Some(prev),
            new_value: value.to_string(),
        }));
    }

    /// Replay a previously confirmed edit. No previous value is captured,
    /// which marks the confirmation as a replay on the host side.
    fn apply_op(
        &mut self,
        op_id: Option<String>,
        xpath: &str,
        kind: EditKind,
        text: Option<String>,
        name: Option<String>,
        value: Option<String>,
    ) {
        let Some(id) = address::resolve(&self.doc, xpath) else {
            debug!(xpath, "apply-op target not found");
            return;
        };
        let op_id = op_id.unwrap_or_else(protocol::generate_op_id);
        let (name, new_value) = match kind {
            EditKind::Text => {
                let text = text.unwrap_or_default();
                self.doc.set_text_content(id, &text);
                (None, text)
            }
            EditKind::Attribute => {
                let Some(name) = name.filter(|n| !n.is_empty()) else {
                    debug!(xpath, "apply-op attribute without a name dropped");
                    return;
                };
                let value = value.unwrap_or_default();
                if value.is_empty() {
                    self.doc.remove_attr(id, &name);
                } else {
                    self.doc.set_attr(id, &name, &value);
                }
                (Some(name), value)
            }
        };
        self.notify(&AgentNotification::OpApplied(OpApplied {
            op_id,
            kind,
            xpath: xpath.to_string(),
            name,
            prev_value: None,
            new_value,
        }));
    }

    /// The body, the root, text nodes, and the indicator subtree never
    /// take hover or selection.
    fn is_ignorable(&self, id: NodeId) -> bool {
        if self.doc.tag(id).is_none() {
            return true;
        }
        if id == self.doc.root() || id == self.doc.body() {
            return true;
        }
        match self.indicator {
            Some(indicator) => id == indicator || self.doc.is_descendant_of(id, indicator),
            None => false,
        }
    }

    /// Attribute snapshot for a click payload, with our own markers
    /// filtered back out.
    fn captured_attributes(&self, id: NodeId) -> IndexMap<String, String> {
        let mut attrs = self.doc.attributes(id);
        attrs.shift_remove(highlight::INFO_ATTR);
        if attrs.contains_key("class") {
            let own = highlight::own_classes(&self.doc, id);
            if own.is_empty() {
                attrs.shift_remove("class");
            } else {
                attrs.insert("class".to_string(), own);
            }
        }
        attrs
    }

    fn notify(&self, notification: &AgentNotification) {
        match protocol::encode_notification(notification) {
            Ok(value) => {
                if let Err(err) = self.outbound.send(value) {
                    debug!(%err, "notification dropped");
                }
            }
            Err(err) => debug!(%err, "notification failed to encode"),
        }
    }
}

enum Wake {
    Event(Option<PointerEvent>),
    Bus(Option<BusMessage>),
    Port(Option<Value>),
    Timer,
}

async fn next_message<T>(rx: &mut Option<mpsc::UnboundedReceiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn hover_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::channel::{frame_link, port_pair, HostEndpoint};
    use crate::editor::protocol::decode_notification;

    const PAGE: &str = r#"<html><body>
        <div class="toolbar"><button class="open">Open</button><button class="save">Save</button></div>
        <p id="intro">Hello</p>
        <input disabled>
    </body></html>"#;

    fn setup() -> (Agent, HostEndpoint) {
        let (mut host, agent_end) = frame_link();
        let agent = Agent::new(Document::parse(PAGE), EditorConfig::default(), agent_end);
        let ready = host.try_recv().unwrap();
        assert_eq!(
            decode_notification(&ready.value),
            Some(AgentNotification::IframeReady)
        );
        (agent, host)
    }

    fn next(host: &mut HostEndpoint) -> AgentNotification {
        decode_notification(&host.try_recv().expect("a notification").value).unwrap()
    }

    fn save_button(agent: &Agent) -> NodeId {
        let toolbar = agent.doc.child_elements(agent.doc.body())[0];
        agent.doc.child_elements(toolbar)[1]
    }

    #[test]
    fn enable_mounts_indicator_and_disable_unmounts_it() {
        let (mut agent, _host) = setup();
        agent.enable();
        let indicator = agent.doc.find_by_id_attr(INDICATOR_ID).unwrap();
        assert_eq!(agent.doc.text_content(indicator), "Visual edit mode");

        agent.enable(); // no second indicator
        assert_eq!(
            agent
                .doc
                .elements()
                .iter()
                .filter(|&&id| agent.doc.attr(id, "id") == Some(INDICATOR_ID))
                .count(),
            1
        );

        agent.disable();
        assert!(agent.doc.find_by_id_attr(INDICATOR_ID).is_none());
    }

    #[test]
    fn disable_clears_every_marker_and_selection() {
        let (mut agent, _host) = setup();
        agent.enable();
        let save = save_button(&agent);
        agent.pointer_over(save);
        agent.handle_command(HostCommand::ElementSelected {
            xpath: "//*[@id=\"intro\"]".into(),
            element_id: "e1".into(),
        });
        assert_eq!(agent.selected_len(), 1);

        agent.disable();
        assert_eq!(agent.selected_len(), 0);
        for id in agent.doc.elements() {
            assert!(!agent.doc.has_class(id, highlight::HOVER_CLASS));
            assert!(!agent.doc.has_class(id, highlight::SELECTED_CLASS));
            assert_eq!(agent.doc.attr(id, highlight::INFO_ATTR), None);
        }
    }

    #[test]
    fn click_reports_the_element_without_selecting_it() {
        let (mut agent, mut host) = setup();
        agent.enable();
        let save = save_button(&agent);
        agent.pointer_over(save); // marker class present during the click

        let consumed = agent.handle_click(
            save,
            Modifiers {
                ctrl: true,
                ..Default::default()
            },
        );
        assert!(consumed);
        assert_eq!(agent.selected_len(), 0);

        // pointer_over announced nothing yet; the click is first out
        let AgentNotification::ElementClick(payload) = next(&mut host) else {
            panic!("expected element-click");
        };
        assert_eq!(payload.tag_name, "button");
        assert_eq!(payload.class_name, "save");
        assert_eq!(payload.text_content, "Save");
        assert!(payload.xpath.ends_with("/button[2]"));
        assert_eq!(payload.attributes.get("class"), Some(&"save".to_string()));
        assert!(!payload.attributes.contains_key(highlight::INFO_ATTR));
        assert!(payload.ctrl_key);
        assert!(!payload.meta_key);
    }

    #[test]
    fn clicks_are_ignored_when_disabled_and_consumed_on_the_indicator() {
        let (mut agent, mut host) = setup();
        let save = save_button(&agent);
        assert!(!agent.handle_click(save, Modifiers::default()));

        agent.enable();
        let indicator = agent.doc.find_by_id_attr(INDICATOR_ID).unwrap();
        assert!(agent.handle_click(indicator, Modifiers::default()));
        assert!(agent.handle_click(agent.doc.body(), Modifiers::default()));
        assert!(host.try_recv().is_none());
    }

    #[test]
    fn hover_announces_once_after_the_debounce_window() {
        let (mut agent, mut host) = setup();
        agent.enable();
        let toolbar = agent.doc.child_elements(agent.doc.body())[0];
        for target in agent.doc.child_elements(toolbar) {
            agent.pointer_over(target);
        }

        agent.fire_hover_timer();
        let AgentNotification::ElementHover { element_id } = next(&mut host) else {
            panic!("expected element-hover");
        };
        assert!(element_id.starts_with("button_"), "got {element_id}");
        assert!(element_id.contains("/button[2]"));

        agent.fire_hover_timer(); // nothing pending
        assert!(host.try_recv().is_none());
    }

    #[test]
    fn pointer_out_ends_hover_immediately() {
        let (mut agent, mut host) = setup();
        agent.enable();
        let save = save_button(&agent);
        agent.pointer_over(save);
        agent.pointer_out(save);

        assert_eq!(next(&mut host), AgentNotification::ElementHoverEnd);
        assert!(!agent.doc.has_class(save, highlight::HOVER_CLASS));

        // the debounced announcement was cancelled
        agent.fire_hover_timer();
        assert!(host.try_recv().is_none());
    }

    #[test]
    fn hover_marker_stays_on_selected_elements() {
        let (mut agent, mut host) = setup();
        agent.enable();
        let intro = agent.doc.find_by_id_attr("intro").unwrap();
        agent.handle_command(HostCommand::ElementSelected {
            xpath: "//*[@id=\"intro\"]".into(),
            element_id: "e1".into(),
        });
        agent.pointer_over(intro);
        agent.pointer_out(intro);

        assert!(agent.doc.has_class(intro, highlight::HOVER_CLASS));
        assert!(agent.doc.has_class(intro, highlight::SELECTED_CLASS));
        assert_eq!(next(&mut host), AgentNotification::ElementHoverEnd);
    }

    #[test]
    fn edit_text_confirms_with_the_previous_value() {
        let (mut agent, mut host) = setup();
        agent.edit_text("op_1", "//*[@id=\"intro\"]", "Goodbye");

        let intro = agent.doc.find_by_id_attr("intro").unwrap();
        assert_eq!(agent.doc.text_content(intro), "Goodbye");
        let AgentNotification::OpApplied(applied) = next(&mut host) else {
            panic!("expected op-applied");
        };
        assert_eq!(applied.op_id, "op_1");
        assert_eq!(applied.prev_value.as_deref(), Some("Hello"));
        assert_eq!(applied.new_value, "Goodbye");
    }

    #[test]
    fn empty_attribute_value_removes_the_attribute() {
        let (mut agent, mut host) = setup();
        let input = agent.doc.find_first("input").unwrap();
        let xpath = address::compute(agent.document(), input);
        agent.edit_attribute("op_2", &xpath, "disabled", "");

        assert_eq!(agent.doc.attr(input, "disabled"), None);
        let AgentNotification::OpApplied(applied) = next(&mut host) else {
            panic!("expected op-applied");
        };
        // the attribute was present with an empty value
        assert_eq!(applied.prev_value.as_deref(), Some(""));
        assert_eq!(applied.new_value, "");
        assert_eq!(applied.name.as_deref(), Some("disabled"));
    }

    #[test]
    fn stale_addresses_produce_no_confirmation() {
        let (mut agent, mut host) = setup();
        agent.edit_text("op_3", "/html/body/article[4]", "x");
        agent.edit_attribute("op_4", "//*[@id=\"gone\"]", "class", "y");
        agent.edit_attribute("op_5", "//*[@id=\"intro\"]", "", "y");
        assert!(host.try_recv().is_none());
    }

    #[test]
    fn broadcast_commands_still_apply_after_the_port_is_bound() {
        let (mut agent, mut host) = setup();
        let (host_end, agent_end) = port_pair();
        agent.handle_inbound(BusMessage {
            value: serde_json::json!({ "type": protocol::INIT_PORT_TYPE }),
            ports: vec![agent_end],
        });

        let enable = protocol::encode_command(&HostCommand::EnableEditMode).unwrap();
        agent.handle_inbound(BusMessage::data(enable));
        assert!(agent.is_enabled());

        // confirmations now ride the port, not the broadcast lane
        agent.handle_command(HostCommand::EditText {
            op_id: "op_9".into(),
            xpath: "//*[@id=\"intro\"]".into(),
            text: "x".into(),
        });
        assert!(host.try_recv().is_none());
        let (_to_agent, mut from_agent) = host_end.split();
        let value = from_agent.try_recv().unwrap();
        assert!(matches!(
            decode_notification(&value),
            Some(AgentNotification::OpApplied(_))
        ));
    }

    #[test]
    fn replayed_ops_confirm_without_a_previous_value() {
        let (mut agent, mut host) = setup();
        agent.handle_command(HostCommand::ApplyOp {
            op_id: None,
            xpath: "//*[@id=\"intro\"]".into(),
            kind: EditKind::Text,
            text: Some("Restored".into()),
            name: None,
            value: None,
        });

        let AgentNotification::OpApplied(applied) = next(&mut host) else {
            panic!("expected op-applied");
        };
        assert_eq!(applied.prev_value, None);
        assert_eq!(applied.new_value, "Restored");
        assert!(applied.op_id.starts_with("op_"));

        let intro = agent.doc.find_by_id_attr("intro").unwrap();
        assert_eq!(agent.doc.text_content(intro), "Restored");
    }
}
