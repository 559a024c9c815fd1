//! Hover/selection highlight markers.
//!
//! Highlighting is expressed entirely through classes and one label
//! attribute on the target element, so the agent can strip every trace of
//! itself when edit mode exits. `hover` and `selected` are independent
//! states; the label stays as long as either remains.

use ego_tree::NodeId;

use crate::dom::Document;

pub const HOVER_CLASS: &str = "visual-editor-hover";
pub const SELECTED_CLASS: &str = "visual-editor-selected";
pub const INFO_ATTR: &str = "data-visual-editor-info";

/// Id of the fixed edit-mode indicator overlay.
pub const INDICATOR_ID: &str = "visual-editor-indicator";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HighlightKind {
    Hover,
    Selected,
}

impl HighlightKind {
    fn class(self) -> &'static str {
        match self {
            HighlightKind::Hover => HOVER_CLASS,
            HighlightKind::Selected => SELECTED_CLASS,
        }
    }
}

/// Apply one highlight state and refresh the label from current metadata.
pub fn apply(doc: &mut Document, id: NodeId, kind: HighlightKind) {
    let label = info_label(doc, id);
    doc.add_class(id, kind.class());
    doc.set_attr(id, INFO_ATTR, &label);
}

/// Remove one highlight state; the label goes only when neither remains.
pub fn remove(doc: &mut Document, id: NodeId, kind: HighlightKind) {
    doc.remove_class(id, kind.class());
    if !doc.has_class(id, HOVER_CLASS) && !doc.has_class(id, SELECTED_CLASS) {
        doc.remove_attr(id, INFO_ATTR);
    }
}

/// Strip every highlight marker in the document. Idempotent.
pub fn clear_all(doc: &mut Document) {
    for id in doc.elements() {
        if doc.has_class(id, HOVER_CLASS) || doc.has_class(id, SELECTED_CLASS) {
            doc.remove_class(id, HOVER_CLASS);
            doc.remove_class(id, SELECTED_CLASS);
            doc.remove_attr(id, INFO_ATTR);
        }
    }
}

/// The element's own classes, marker classes excluded.
pub fn own_classes(doc: &Document, id: NodeId) -> String {
    doc.class_string(id)
        .split_whitespace()
        .filter(|c| *c != HOVER_CLASS && *c != SELECTED_CLASS)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Label text: `tag` or `tag.firstOwnClass`.
pub fn info_label(doc: &Document, id: NodeId) -> String {
    let tag = doc.tag(id).unwrap_or_default().to_string();
    match own_classes(doc, id).split_whitespace().next() {
        Some(class) => format!("{tag}.{class}"),
        None => tag,
    }
}
