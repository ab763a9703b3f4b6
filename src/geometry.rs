//! Height reconciliation for elements whose reported box under-counts
//! descendant content.
//!
//! Some layout engines report a clipped container height when children
//! escape the box via absolute positioning or negative margins. The
//! resolver walks the subtree and reserves space down to the furthest
//! descendant bottom edge instead of trusting the parent's own box.

use crate::dom::NodeHandle;
use crate::style::{parse_px, StyleSource};
use crate::CaptureConfig;

/// Height that must be reserved so no descendant's rendered content is
/// clipped, in CSS pixels.
///
/// A childless element's reported box height is authoritative. Otherwise
/// the result spans from the element's top edge to the lowest bottom edge
/// of any recursively resolved child. Content-box sizing re-adds the
/// bottom padding and border that the measured box excludes; border-box
/// sizing instead gets a small safety margin for sub-pixel rounding.
pub fn full_element_height<S: StyleSource>(
    element: &NodeHandle,
    styles: &S,
    config: &CaptureConfig,
) -> f64 {
    let rect = styles.bounding_box(element);
    let children = element.element_children();

    if children.is_empty() {
        return rect.height;
    }

    // Seed with the element's own bottom edge: children can only extend
    // the reserved height, never shrink it below the reported box.
    let mut max_child_bottom = rect.bottom();
    for child in &children {
        let child_height = full_element_height(child, styles, config);
        let child_rect = styles.bounding_box(child);
        max_child_bottom = max_child_bottom.max(child_rect.top + child_height);
    }

    let height = max_child_bottom - rect.top;

    let style = styles.computed_style(element);
    if style.get("box-sizing") == Some("content-box") {
        return height
            + parse_px(style.get("padding-bottom").unwrap_or("0"))
            + parse_px(style.get("border-bottom-width").unwrap_or("0"));
    }

    height + config.rounding_safety_px
}
