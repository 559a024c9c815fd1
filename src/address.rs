//! Deterministic element addressing.
//!
//! An address is the structural path both protocol sides agree on when they
//! talk about an element: `//*[@id="x"]` when the element carries a stable
//! id, the fixed `/html/body` for the body, otherwise the parent's address
//! plus `/tag[ordinal]` where the ordinal counts same-tag element siblings
//! from 1. Addresses hold for the lifetime of an unchanged tree shape;
//! sibling reordering invalidates them and callers must treat a failed
//! resolution as a stale address.

use ego_tree::NodeId;
use tracing::debug;

use crate::dom::Document;

/// Fixed address of the document body.
pub const BODY_ADDRESS: &str = "/html/body";

/// Compute the address of a node.
///
/// Returns an empty string for a parentless node that is not the body
/// (defensive default, not expected for attached nodes).
pub fn compute(doc: &Document, id: NodeId) -> String {
    if let Some(id_attr) = doc.attr(id, "id") {
        if !id_attr.is_empty() {
            return format!("//*[@id=\"{}\"]", id_attr);
        }
    }
    if id == doc.body() {
        return BODY_ADDRESS.to_string();
    }
    let tag = match doc.tag(id) {
        Some(tag) => tag,
        None => return String::new(),
    };
    match doc.parent(id) {
        Some(parent) => {
            let ordinal = doc.same_tag_ordinal(id).unwrap_or(1);
            format!("{}/{}[{}]", compute(doc, parent), tag, ordinal)
        }
        None => String::new(),
    }
}

/// Resolve an address against the live document.
///
/// Returns `None` for malformed addresses and for addresses that no longer
/// match anything; callers treat both as "stale, no-op the request".
pub fn resolve(doc: &Document, address: &str) -> Option<NodeId> {
    if address.is_empty() {
        return None;
    }

    // optional id prefix: the rest of the path walks from that element
    if let Some(rest) = address.strip_prefix("//*[@id=\"") {
        let Some(close) = rest.find("\"]") else {
            debug!(address, "malformed id address");
            return None;
        };
        let id_value = &rest[..close];
        if id_value.is_empty() {
            return None;
        }
        let start = doc.find_by_id_attr(id_value)?;
        let tail = &rest[close + 2..];
        if tail.is_empty() {
            return Some(start);
        }
        let Some(path) = tail.strip_prefix('/') else {
            debug!(address, "malformed tail after id prefix");
            return None;
        };
        return walk(doc, start, path, address);
    }

    let Some(path) = address.strip_prefix('/') else {
        debug!(address, "address is neither an id form nor a rooted path");
        return None;
    };

    let (first, tail) = match path.split_once('/') {
        Some((first, tail)) => (first, tail),
        None => (path, ""),
    };
    match parse_segment(first) {
        Some(("html", 1)) => {}
        Some(_) => return None,
        None => {
            debug!(address, "malformed address segment");
            return None;
        }
    }
    if tail.is_empty() {
        return Some(doc.root());
    }
    walk(doc, doc.root(), tail, address)
}

/// Walk `/`-separated `tag[ordinal]` segments down from `start`.
fn walk(doc: &Document, start: NodeId, path: &str, address: &str) -> Option<NodeId> {
    let mut current = start;
    for segment in path.split('/') {
        let Some((tag, ordinal)) = parse_segment(segment) else {
            debug!(address, segment, "malformed address segment");
            return None;
        };
        let mut seen = 0;
        let mut found = None;
        for child in doc.child_elements(current) {
            if doc.tag(child) == Some(tag) {
                seen += 1;
                if seen == ordinal {
                    found = Some(child);
                    break;
                }
            }
        }
        current = found?;
    }
    Some(current)
}

/// Split a path segment into `(tag, ordinal)`; a bare tag means ordinal 1.
fn parse_segment(segment: &str) -> Option<(&str, usize)> {
    if segment.is_empty() {
        return None;
    }
    match segment.find('[') {
        None => {
            if segment.contains(']') {
                return None;
            }
            Some((segment, 1))
        }
        Some(open) => {
            let inner = segment.strip_suffix(']')?;
            let tag = &segment[..open];
            let ordinal: usize = inner[open + 1..].parse().ok()?;
            if tag.is_empty() || ordinal == 0 {
                return None;
            }
            Some((tag, ordinal))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Document {
        Document::parse(
            r#"<html><body>
                <div class="toolbar"><button class="open">Open</button><button class="save">Save</button></div>
                <div id="content"><section><ul><li>a</li><li>b</li><li>c</li></ul></section></div>
            </body></html>"#,
        )
    }

    #[test]
    fn body_has_the_fixed_root_address() {
        let doc = fixture();
        assert_eq!(compute(&doc, doc.body()), BODY_ADDRESS);
        assert_eq!(resolve(&doc, BODY_ADDRESS), Some(doc.body()));
    }

    #[test]
    fn id_attribute_wins_over_position() {
        let doc = fixture();
        let content = doc.find_by_id_attr("content").unwrap();
        let address = compute(&doc, content);
        assert_eq!(address, "//*[@id=\"content\"]");
        assert_eq!(resolve(&doc, &address), Some(content));
    }

    #[test]
    fn sibling_ordinals_count_same_tag_only() {
        let doc = fixture();
        let toolbar = doc.child_elements(doc.body())[0];
        let save = doc.child_elements(toolbar)[1];
        let address = compute(&doc, save);
        assert!(address.ends_with("/button[2]"), "got {address}");
        assert_eq!(resolve(&doc, &address), Some(save));
    }

    #[test]
    fn descendants_of_id_elements_resolve_through_the_id() {
        let doc = fixture();
        let content = doc.find_by_id_attr("content").unwrap();
        let section = doc.child_elements(content)[0];
        let address = compute(&doc, section);
        assert_eq!(address, "//*[@id=\"content\"]/section[1]");
        assert_eq!(resolve(&doc, &address), Some(section));

        let ul = doc.child_elements(section)[0];
        let second_li = doc.child_elements(ul)[1];
        let address = compute(&doc, second_li);
        assert_eq!(address, "//*[@id=\"content\"]/section[1]/ul[1]/li[2]");
        assert_eq!(resolve(&doc, &address), Some(second_li));
    }

    #[test]
    fn round_trip_holds_at_depth_with_collisions() {
        let doc = fixture();
        for id in doc.elements() {
            if id == doc.root() || !doc.is_descendant_of(id, doc.root()) {
                continue;
            }
            // head-side elements are outside the addressable subtree
            if id != doc.body() && !doc.is_descendant_of(id, doc.body()) {
                continue;
            }
            let address = compute(&doc, id);
            assert_eq!(resolve(&doc, &address), Some(id), "address {address}");
        }
    }

    #[test]
    fn list_items_resolve_to_distinct_nodes() {
        let doc = fixture();
        let a = resolve(&doc, "//*[@id=\"content\"]").unwrap();
        let section = doc.child_elements(a)[0];
        let ul = doc.child_elements(section)[0];
        let items = doc.child_elements(ul);
        for (ix, item) in items.iter().enumerate() {
            let address = compute(&doc, *item);
            assert!(address.ends_with(&format!("/li[{}]", ix + 1)));
            assert_eq!(resolve(&doc, &address), Some(*item));
        }
    }

    #[test]
    fn malformed_addresses_resolve_to_none() {
        let doc = fixture();
        for bad in [
            "",
            "div[1]",
            "/html/body/div[x]",
            "/html/body/div[0]",
            "/html/body/[2]",
            "/html/body/div]1[",
            "//*[@id=\"unterminated",
            "//*[@id=\"\"]",
            "//*[@id=\"content\"]section[1]",
            "//*[@id=\"content\"]/[1]",
        ] {
            assert_eq!(resolve(&doc, bad), None, "address {bad:?}");
        }
    }

    #[test]
    fn stale_addresses_resolve_to_none() {
        let doc = fixture();
        assert_eq!(resolve(&doc, "/html/body/div[9]"), None);
        assert_eq!(resolve(&doc, "//*[@id=\"gone\"]"), None);
    }

    #[test]
    fn resolution_shifts_after_sibling_mutation() {
        let mut doc = fixture();
        let toolbar = doc.child_elements(doc.body())[0];
        let save = doc.child_elements(toolbar)[1];
        let address = compute(&doc, save);

        // removing the first button shifts the ordinal: accepted limitation
        let open = doc.child_elements(toolbar)[0];
        doc.detach(open);
        assert_ne!(resolve(&doc, &address), Some(save));
    }
}
