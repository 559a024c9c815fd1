//! In-memory document model.
//!
//! A mutable arena tree standing in for the live page that the agent edits.
//! Parsing goes through `scraper`; the parsed page is converted into an
//! `ego_tree` arena so nodes can be referenced by stable ids and mutated
//! in place while the editor session runs.

use ego_tree::{NodeId, Tree};
use indexmap::IndexMap;
use scraper::Html;

/// One node in the document tree.
#[derive(Debug, Clone, PartialEq)]
pub enum DomNode {
    Element(ElementData),
    Text(String),
}

/// Tag name plus insertion-ordered attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementData {
    pub tag: String,
    pub attrs: IndexMap<String, String>,
}

impl ElementData {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: IndexMap::new(),
        }
    }
}

/// Elements that never have children and serialize without a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// A live document: an `html` root with a tracked `body`.
#[derive(Debug, Clone)]
pub struct Document {
    tree: Tree<DomNode>,
    body: NodeId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Empty `html > body` skeleton.
    pub fn new() -> Self {
        let mut tree = Tree::new(DomNode::Element(ElementData::new("html")));
        let body = tree
            .root_mut()
            .append(DomNode::Element(ElementData::new("body")))
            .id();
        Self { tree, body }
    }

    /// Parse an HTML document into a mutable tree.
    ///
    /// Comments and doctype nodes are dropped; fragments are wrapped in
    /// `html > body` the way a browser would.
    pub fn parse(html: &str) -> Self {
        let parsed = Html::parse_document(html);
        let root_el = parsed.root_element();
        let mut tree = Tree::new(DomNode::Element(convert_element(root_el.value())));
        let root_id = tree.root().id();
        copy_children(&mut tree, root_id, *root_el);

        let body = tree
            .root()
            .children()
            .find(|n| matches!(n.value(), DomNode::Element(el) if el.tag == "body"))
            .map(|n| n.id());
        let body = match body {
            Some(id) => id,
            None => tree
                .root_mut()
                .append(DomNode::Element(ElementData::new("body")))
                .id(),
        };

        Self { tree, body }
    }

    pub fn root(&self) -> NodeId {
        self.tree.root().id()
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    /// Append a child element and return its id.
    pub fn append_element(&mut self, parent: NodeId, tag: &str) -> NodeId {
        self.tree
            .get_mut(parent)
            .expect("parent node in arena")
            .append(DomNode::Element(ElementData::new(tag)))
            .id()
    }

    /// Append a text node.
    pub fn append_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        self.tree
            .get_mut(parent)
            .expect("parent node in arena")
            .append(DomNode::Text(text.to_string()))
            .id()
    }

    /// Detach a node (and its subtree) from the document.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(mut node) = self.tree.get_mut(id) {
            node.detach();
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.tree.get(id)?.parent().map(|p| p.id())
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match self.tree.get(id)?.value() {
            DomNode::Element(el) => Some(el.tag.as_str()),
            DomNode::Text(_) => None,
        }
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        match self.tree.get(id)?.value() {
            DomNode::Element(el) => el.attrs.get(name).map(String::as_str),
            DomNode::Text(_) => None,
        }
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        self.with_element_mut(id, |el| {
            el.attrs.insert(name.to_string(), value.to_string());
        });
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) {
        self.with_element_mut(id, |el| {
            el.attrs.shift_remove(name);
        });
    }

    /// Clone of the attribute map, in document insertion order.
    /// Empty for text nodes.
    pub fn attributes(&self, id: NodeId) -> IndexMap<String, String> {
        match self.tree.get(id).map(|n| n.value()) {
            Some(DomNode::Element(el)) => el.attrs.clone(),
            _ => IndexMap::new(),
        }
    }

    pub fn class_string(&self, id: NodeId) -> String {
        self.attr(id, "class").unwrap_or_default().to_string()
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.class_string(id).split_whitespace().any(|c| c == class)
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) {
        if self.has_class(id, class) {
            return;
        }
        let mut classes = self.class_string(id);
        if !classes.is_empty() {
            classes.push(' ');
        }
        classes.push_str(class);
        self.set_attr(id, "class", &classes);
    }

    pub fn remove_class(&mut self, id: NodeId, class: &str) {
        let remaining = self
            .class_string(id)
            .split_whitespace()
            .filter(|c| *c != class)
            .collect::<Vec<_>>()
            .join(" ");
        if remaining.is_empty() {
            self.remove_attr(id, "class");
        } else {
            self.set_attr(id, "class", &remaining);
        }
    }

    /// Concatenated text of every descendant text node, document order.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        if let Some(node) = self.tree.get(id) {
            for desc in node.descendants() {
                if let DomNode::Text(text) = desc.value() {
                    out.push_str(text);
                }
            }
        }
        out
    }

    /// Replace all children with a single text node (none when empty).
    pub fn set_text_content(&mut self, id: NodeId, text: &str) {
        let children: Vec<NodeId> = match self.tree.get(id) {
            Some(node) => node.children().map(|c| c.id()).collect(),
            None => return,
        };
        for child in children {
            if let Some(mut node) = self.tree.get_mut(child) {
                node.detach();
            }
        }
        if !text.is_empty() {
            if let Some(mut node) = self.tree.get_mut(id) {
                node.append(DomNode::Text(text.to_string()));
            }
        }
    }

    /// Element children of a node, in order.
    pub fn child_elements(&self, id: NodeId) -> Vec<NodeId> {
        match self.tree.get(id) {
            Some(node) => node
                .children()
                .filter(|c| matches!(c.value(), DomNode::Element(_)))
                .map(|c| c.id())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Every element in the document, in document order (root included).
    pub fn elements(&self) -> Vec<NodeId> {
        self.tree
            .root()
            .descendants()
            .filter(|n| matches!(n.value(), DomNode::Element(_)))
            .map(|n| n.id())
            .collect()
    }

    /// 1-based position among element siblings sharing the same tag.
    pub fn same_tag_ordinal(&self, id: NodeId) -> Option<usize> {
        let node = self.tree.get(id)?;
        let tag = match node.value() {
            DomNode::Element(el) => el.tag.as_str(),
            DomNode::Text(_) => return None,
        };
        let mut ordinal = 1;
        for sibling in node.prev_siblings() {
            if let DomNode::Element(el) = sibling.value() {
                if el.tag == tag {
                    ordinal += 1;
                }
            }
        }
        Some(ordinal)
    }

    pub fn is_descendant_of(&self, id: NodeId, ancestor: NodeId) -> bool {
        self.tree
            .get(id)
            .map(|n| n.ancestors().any(|a| a.id() == ancestor))
            .unwrap_or(false)
    }

    /// First element whose `id` attribute equals `value`.
    pub fn find_by_id_attr(&self, value: &str) -> Option<NodeId> {
        self.elements()
            .into_iter()
            .find(|&id| self.attr(id, "id") == Some(value))
    }

    /// First element with the given tag, document order.
    pub fn find_first(&self, tag: &str) -> Option<NodeId> {
        self.elements().into_iter().find(|&id| self.tag(id) == Some(tag))
    }

    /// Serialize back to HTML.
    pub fn to_html(&self) -> String {
        let mut out = String::from("<!DOCTYPE html>");
        write_node(self.tree.root(), &mut out);
        out
    }

    fn with_element_mut<R>(&mut self, id: NodeId, f: impl FnOnce(&mut ElementData) -> R) -> Option<R> {
        let mut node = self.tree.get_mut(id)?;
        match node.value() {
            DomNode::Element(el) => Some(f(el)),
            DomNode::Text(_) => None,
        }
    }
}

fn convert_element(el: &scraper::node::Element) -> ElementData {
    let mut data = ElementData::new(el.name());
    for (name, value) in el.attrs() {
        data.attrs.insert(name.to_string(), value.to_string());
    }
    data
}

fn copy_children(tree: &mut Tree<DomNode>, dest: NodeId, src: ego_tree::NodeRef<'_, scraper::Node>) {
    for child in src.children() {
        match child.value() {
            scraper::Node::Element(el) => {
                let id = tree
                    .get_mut(dest)
                    .expect("dest node in arena")
                    .append(DomNode::Element(convert_element(el)))
                    .id();
                copy_children(tree, id, child);
            }
            scraper::Node::Text(text) => {
                let text = text.text.to_string();
                if !text.is_empty() {
                    tree.get_mut(dest)
                        .expect("dest node in arena")
                        .append(DomNode::Text(text));
                }
            }
            _ => {}
        }
    }
}

fn write_node(node: ego_tree::NodeRef<'_, DomNode>, out: &mut String) {
    match node.value() {
        DomNode::Text(text) => out.push_str(&escape_text(text)),
        DomNode::Element(el) => {
            out.push('<');
            out.push_str(&el.tag);
            for (name, value) in &el.attrs {
                out.push(' ');
                out.push_str(name);
                if !value.is_empty() {
                    out.push_str("=\"");
                    out.push_str(&escape_attr(value));
                    out.push('"');
                }
            }
            out.push('>');
            if VOID_ELEMENTS.contains(&el.tag.as_str()) {
                return;
            }
            for child in node.children() {
                write_node(child, out);
            }
            out.push_str("</");
            out.push_str(&el.tag);
            out.push('>');
        }
    }
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}
