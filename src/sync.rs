//! Style replication: copy resolved styles and form-control state from a
//! source subtree onto its structural clone.
//!
//! Synchronization is best-effort, never fail-fast. A rejected property
//! or a structurally divergent subtree is logged and counted, and the
//! walk continues with the remaining siblings. The [`SyncReport`] is the
//! observable side channel for asserting on partial-failure scenarios.

use log::warn;
use serde::Serialize;

use crate::dom::{Namespace, NodeHandle};
use crate::style::StyleSource;
use crate::{Error, Result};

/// Counters describing one synchronization walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Element pairs visited, including the root pair
    pub elements_visited: usize,
    /// Declarations written onto clone inline styles
    pub properties_written: usize,
    /// Declarations rejected by the target grammar and skipped
    pub property_failures: usize,
    /// Subtrees abandoned after a structural mismatch
    pub subtree_failures: usize,
}

/// Replay every resolved style property of `source` onto `clone`, walking
/// both trees pairwise by child index and stopping at the shorter tree.
///
/// The clone ends up carrying the source's full computed style as explicit
/// inline declarations, so it renders identically when detached from the
/// stylesheet context. Form-control state that computed style cannot
/// express (values, checked flags) is special-cased per element type.
pub fn sync_subtree<S: StyleSource>(
    source: &NodeHandle,
    clone: &NodeHandle,
    styles: &S,
) -> SyncReport {
    let mut report = SyncReport::default();
    sync_pair(source, clone, styles, &mut report);
    report
}

fn sync_pair<S: StyleSource>(
    source: &NodeHandle,
    clone: &NodeHandle,
    styles: &S,
    report: &mut SyncReport,
) {
    if let Err(e) = sync_element(source, clone, styles, report) {
        warn!(
            "skipping subtree at <{}>: {}",
            source.tag().unwrap_or("#text"),
            e
        );
        report.subtree_failures += 1;
        return;
    }

    let source_children = source.element_children();
    let clone_children = clone.element_children();
    // Index-aligned recursion; a divergent child count silently truncates
    // the walk at the shorter list.
    for (source_child, clone_child) in source_children.iter().zip(clone_children.iter()) {
        sync_pair(source_child, clone_child, styles, report);
    }
}

fn sync_element<S: StyleSource>(
    source: &NodeHandle,
    clone: &NodeHandle,
    styles: &S,
    report: &mut SyncReport,
) -> Result<()> {
    let source_tag = source
        .tag()
        .ok_or_else(|| Error::SyncError("source node is not an element".to_string()))?;
    let clone_tag = clone
        .tag()
        .ok_or_else(|| Error::SyncError("clone node is not an element".to_string()))?;
    if source_tag != clone_tag {
        return Err(Error::SyncError(format!(
            "element mismatch: <{source_tag}> vs <{clone_tag}>"
        )));
    }

    report.elements_visited += 1;

    let snapshot = styles.computed_style(source);
    for entry in snapshot.iter() {
        match clone.set_style_property(&entry.name, &entry.value, entry.priority) {
            Ok(()) => report.properties_written += 1,
            Err(e) => {
                report.property_failures += 1;
                warn!("dropping style property on <{clone_tag}>: {e}");
            }
        }
    }

    // Identity attributes only matter for HTML elements; foreign nodes in
    // the embedding do not pick up styling from them.
    if clone.namespace() == Some(Namespace::Html) {
        for name in ["class", "id"] {
            if let Some(value) = source.attribute(name) {
                clone.set_attribute(name, &value);
            }
        }
    }

    match source_tag {
        "input" | "select" => {
            // The attribute form is what survives serialization; the live
            // value alone would be lost.
            let value = source.value().unwrap_or_default();
            clone.set_value(&value);
            clone.set_attribute("value", &value);
            let kind = source.attribute("type").unwrap_or_default();
            if kind == "checkbox" || kind == "radio" {
                clone.set_checked(source.checked().unwrap_or(false));
            }
        }
        "textarea" => {
            // A textarea serializes its value through content, not attributes.
            let value = source.value().unwrap_or_default();
            clone.set_value(&value);
            clone.set_text_content(&value);
        }
        _ => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::NodeHandle;
    use crate::style::{ComputedStyle, Priority, StyleTable};

    fn synced_clone<S: StyleSource>(source: &NodeHandle, styles: &S) -> (NodeHandle, SyncReport) {
        let clone = source.clone_subtree();
        let report = sync_subtree(source, &clone, styles);
        (clone, report)
    }

    #[test]
    fn replays_snapshot_as_inline_declarations() {
        let source = NodeHandle::parse("<div><span>x</span></div>").unwrap();
        let span = &source.element_children()[0];
        let mut table = StyleTable::new();
        table.insert_style(
            &source,
            ComputedStyle::from_pairs([("display", "flex"), ("color", "rgb(0, 0, 0)")]),
        );
        let mut span_style = ComputedStyle::new();
        span_style.push("font-weight", "700", Priority::Important);
        table.insert_style(span, span_style);

        let (clone, report) = synced_clone(&source, &table);
        assert_eq!(clone.style_value("display").as_deref(), Some("flex"));
        assert_eq!(
            clone.style_value("color").as_deref(),
            Some("rgb(0, 0, 0)")
        );
        let clone_span = &clone.element_children()[0];
        assert!(clone_span
            .style_text()
            .contains("font-weight: 700 !important;"));
        assert_eq!(report.elements_visited, 2);
        assert_eq!(report.properties_written, 3);
        assert_eq!(report.property_failures, 0);
    }

    #[test]
    fn rejected_properties_are_counted_not_fatal() {
        let source = NodeHandle::parse("<div></div>").unwrap();
        let mut bad = ComputedStyle::new();
        bad.push("color", "red", Priority::Normal);
        bad.push("not a name", "x", Priority::Normal);
        let mut table = StyleTable::new();
        table.insert_style(&source, bad);

        let (clone, report) = synced_clone(&source, &table);
        assert_eq!(clone.style_value("color").as_deref(), Some("red"));
        assert_eq!(report.property_failures, 1);
        assert_eq!(report.properties_written, 1);
        assert_eq!(report.subtree_failures, 0);
    }

    #[test]
    fn input_value_lands_in_property_and_attribute() {
        let source = NodeHandle::parse("<input type=\"text\">").unwrap();
        source.set_value("abc");
        let (clone, _) = synced_clone(&source, &StyleTable::new());
        assert_eq!(clone.value().as_deref(), Some("abc"));
        assert_eq!(clone.attribute("value").as_deref(), Some("abc"));
    }

    #[test]
    fn checkbox_state_is_copied() {
        let source = NodeHandle::parse("<input type=\"checkbox\">").unwrap();
        source.set_checked(true);
        let (clone, _) = synced_clone(&source, &StyleTable::new());
        assert_eq!(clone.checked(), Some(true));
    }

    #[test]
    fn textarea_value_is_mirrored_into_content() {
        let source = NodeHandle::parse("<textarea>old</textarea>").unwrap();
        source.set_value("edited text");
        let (clone, _) = synced_clone(&source, &StyleTable::new());
        assert_eq!(clone.value().as_deref(), Some("edited text"));
        assert_eq!(clone.text_content(), "edited text");
        assert!(clone.outer_html().contains(">edited text</textarea>"));
    }

    #[test]
    fn svg_elements_do_not_receive_identity_attributes() {
        let source =
            NodeHandle::parse("<div class=\"a\"><svg class=\"icon\"></svg></div>").unwrap();
        let clone = source.clone_subtree();
        let svg_clone = &clone.element_children()[0];
        let report = sync_subtree(&source, &clone, &StyleTable::new());
        assert_eq!(report.subtree_failures, 0);
        assert_eq!(clone.attribute("class").as_deref(), Some("a"));
        assert_eq!(svg_clone.namespace(), Some(crate::dom::Namespace::Svg));
    }

    #[test]
    fn walk_stops_at_shorter_tree() {
        let source = NodeHandle::parse("<div><p>1</p><p>2</p><p>3</p></div>").unwrap();
        let clone = NodeHandle::parse("<div><p>1</p></div>").unwrap();
        let mut table = StyleTable::new();
        for el in source.descendant_elements() {
            table.insert_style(&el, ComputedStyle::from_pairs([("margin", "0px")]));
        }
        let report = sync_subtree(&source, &clone, &table);
        // root + the single paired child
        assert_eq!(report.elements_visited, 2);
        assert_eq!(report.subtree_failures, 0);
    }

    #[test]
    fn mismatched_subtree_is_abandoned_but_siblings_continue() {
        let source = NodeHandle::parse("<div><p>1</p><em>2</em></div>").unwrap();
        let clone = NodeHandle::parse("<div><span>1</span><em>2</em></div>").unwrap();
        let mut table = StyleTable::new();
        for el in source.descendant_elements() {
            table.insert_style(&el, ComputedStyle::from_pairs([("color", "red")]));
        }
        let report = sync_subtree(&source, &clone, &table);
        assert_eq!(report.subtree_failures, 1);
        // root and the matching <em> sibling still synchronized
        assert_eq!(report.elements_visited, 2);
        let em = &clone.element_children()[1];
        assert_eq!(em.style_value("color").as_deref(), Some("red"));
    }
}
