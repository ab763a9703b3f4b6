//! Detached element-tree model used for capture staging.
//!
//! A capture never mutates the host's live tree. Instead the source subtree
//! is deep-cloned into this reference-counted node model, styles and form
//! state are written onto the clone, and the clone is serialized. The model
//! is single-threaded by design (`Rc`-based) to match the cooperative
//! capture pipeline.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use scraper::{Html, Node as ScraperNode};
use tokio::sync::watch;

use crate::style::{Priority, StyleEntry};
use crate::{Error, Result};

/// Element namespace, as far as the embedding grammar cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Html,
    Svg,
}

const SVG_NS: &str = "http://www.w3.org/2000/svg";

/// Load state of an `<img>` element.
///
/// The host flips this via [`NodeHandle::mark_image_complete`] /
/// [`NodeHandle::mark_image_failed`]. Both terminal states count as
/// "ready" for capture purposes; a broken image never blocks a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageStatus {
    Loading,
    Complete,
    Broken,
}

#[derive(Debug)]
struct ImageSlot {
    tx: watch::Sender<ImageStatus>,
    rx: watch::Receiver<ImageStatus>,
}

impl ImageSlot {
    fn new(status: ImageStatus) -> Self {
        let (tx, rx) = watch::channel(status);
        Self { tx, rx }
    }

    fn status(&self) -> ImageStatus {
        *self.rx.borrow()
    }

    fn set(&self, status: ImageStatus) {
        let _ = self.tx.send(status);
    }
}

/// Inline style declarations attached to an element.
///
/// Order is preserved; re-setting a property updates it in place, matching
/// how declaration replay works in the replicator.
#[derive(Debug, Default, Clone)]
pub struct InlineStyle {
    entries: Vec<StyleEntry>,
}

impl InlineStyle {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.value.as_str())
    }

    /// Set a declaration, validating the property name against the target
    /// grammar. Invalid names and control characters are rejected so the
    /// replicator can count (and skip) properties the embedding cannot carry.
    pub fn set(&mut self, name: &str, value: &str, priority: Priority) -> Result<()> {
        let valid_name = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid_name {
            return Err(Error::PropertyError(name.to_string()));
        }
        if value.chars().any(|c| c.is_control()) {
            return Err(Error::PropertyError(format!("{name}: unserializable value")));
        }

        if let Some(entry) = self.entries.iter_mut().find(|e| e.name == name) {
            entry.value = value.to_string();
            entry.priority = priority;
        } else {
            self.entries.push(StyleEntry {
                name: name.to_string(),
                value: value.to_string(),
                priority,
            });
        }
        Ok(())
    }

    /// Serialize to a `style` attribute value.
    pub fn to_css(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(&entry.name);
            out.push_str(": ");
            out.push_str(&entry.value);
            if entry.priority == Priority::Important {
                out.push_str(" !important");
            }
            out.push(';');
        }
        out
    }

    fn parse_attribute(css: &str) -> Self {
        let mut style = Self::default();
        for decl in css.split(';') {
            let Some((name, value)) = decl.split_once(':') else {
                continue;
            };
            let name = name.trim();
            let mut value = value.trim();
            let mut priority = Priority::Normal;
            if let Some(stripped) = value.strip_suffix("!important") {
                value = stripped.trim_end();
                priority = Priority::Important;
            }
            let _ = style.set(name, value, priority);
        }
        style
    }
}

#[derive(Debug)]
struct ElementData {
    tag: String,
    namespace: Namespace,
    attributes: RefCell<Vec<(String, String)>>,
    style: RefCell<InlineStyle>,
    value: RefCell<Option<String>>,
    checked: Cell<Option<bool>>,
    image: Option<ImageSlot>,
}

#[derive(Debug)]
enum NodeKind {
    Element(ElementData),
    Text(RefCell<String>),
}

#[derive(Debug)]
struct Node {
    kind: NodeKind,
    children: RefCell<Vec<NodeHandle>>,
}

/// Cheaply cloneable handle to a node. `clone()` aliases the same node;
/// use [`NodeHandle::clone_subtree`] for a deep structural copy.
#[derive(Debug, Clone)]
pub struct NodeHandle(Rc<Node>);

impl NodeHandle {
    pub fn new_element(tag: &str, namespace: Namespace) -> Self {
        let tag = tag.to_ascii_lowercase();
        let image = if namespace == Namespace::Html && tag == "img" {
            Some(ImageSlot::new(ImageStatus::Complete))
        } else {
            None
        };
        Self(Rc::new(Node {
            kind: NodeKind::Element(ElementData {
                tag,
                namespace,
                attributes: RefCell::new(Vec::new()),
                style: RefCell::new(InlineStyle::default()),
                value: RefCell::new(None),
                checked: Cell::new(None),
                image,
            }),
            children: RefCell::new(Vec::new()),
        }))
    }

    pub fn new_text(text: &str) -> Self {
        Self(Rc::new(Node {
            kind: NodeKind::Text(RefCell::new(text.to_string())),
            children: RefCell::new(Vec::new()),
        }))
    }

    /// Parse an HTML fragment and return its first root element.
    pub fn parse(markup: &str) -> Result<Self> {
        let fragment = Html::parse_fragment(markup);
        let root = fragment
            .tree
            .root()
            .children()
            .find(|n| n.value().is_element())
            .ok_or_else(|| Error::Other("markup contains no root element".to_string()))?;
        // html5ever wraps fragments in a synthetic <html> element
        let first = root
            .children()
            .find(|n| n.value().is_element())
            .ok_or_else(|| Error::Other("markup contains no root element".to_string()))?;
        convert_scraper_node(&first)
            .ok_or_else(|| Error::Other("markup contains no root element".to_string()))
    }

    /// Stable identity for collaborator keying. Two handles to the same
    /// node report the same id; a clone of the subtree does not.
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    pub fn ptr_eq(&self, other: &NodeHandle) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn is_element(&self) -> bool {
        matches!(self.0.kind, NodeKind::Element(_))
    }

    pub fn tag(&self) -> Option<&str> {
        match &self.0.kind {
            NodeKind::Element(el) => Some(&el.tag),
            NodeKind::Text(_) => None,
        }
    }

    pub fn namespace(&self) -> Option<Namespace> {
        match &self.0.kind {
            NodeKind::Element(el) => Some(el.namespace),
            NodeKind::Text(_) => None,
        }
    }

    fn element(&self) -> Option<&ElementData> {
        match &self.0.kind {
            NodeKind::Element(el) => Some(el),
            NodeKind::Text(_) => None,
        }
    }

    pub fn append_child(&self, child: NodeHandle) {
        self.0.children.borrow_mut().push(child);
    }

    pub fn children(&self) -> Vec<NodeHandle> {
        self.0.children.borrow().clone()
    }

    pub fn element_children(&self) -> Vec<NodeHandle> {
        self.0
            .children
            .borrow()
            .iter()
            .filter(|c| c.is_element())
            .cloned()
            .collect()
    }

    /// All element nodes of this subtree in document order, self included.
    pub fn descendant_elements(&self) -> Vec<NodeHandle> {
        let mut out = Vec::new();
        collect_elements(self, &mut out);
        out
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        let el = self.element()?;
        el.attributes
            .borrow()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }

    pub fn set_attribute(&self, name: &str, value: &str) {
        if let Some(el) = self.element() {
            let mut attrs = el.attributes.borrow_mut();
            if let Some(entry) = attrs.iter_mut().find(|(n, _)| n == name) {
                entry.1 = value.to_string();
            } else {
                attrs.push((name.to_string(), value.to_string()));
            }
        }
    }

    pub fn set_style_property(&self, name: &str, value: &str, priority: Priority) -> Result<()> {
        match self.element() {
            Some(el) => el.style.borrow_mut().set(name, value, priority),
            None => Err(Error::PropertyError(format!(
                "{name}: not an element node"
            ))),
        }
    }

    pub fn style_value(&self, name: &str) -> Option<String> {
        self.element()?.style.borrow().get(name).map(str::to_string)
    }

    pub fn style_text(&self) -> String {
        self.element()
            .map(|el| el.style.borrow().to_css())
            .unwrap_or_default()
    }

    /// Live form-control value (not necessarily reflected in attributes).
    pub fn value(&self) -> Option<String> {
        self.element()?.value.borrow().clone()
    }

    pub fn set_value(&self, value: &str) {
        if let Some(el) = self.element() {
            *el.value.borrow_mut() = Some(value.to_string());
        }
    }

    pub fn checked(&self) -> Option<bool> {
        self.element()?.checked.get()
    }

    pub fn set_checked(&self, checked: bool) {
        if let Some(el) = self.element() {
            el.checked.set(Some(checked));
        }
    }

    pub fn text(&self) -> Option<String> {
        match &self.0.kind {
            NodeKind::Text(t) => Some(t.borrow().clone()),
            NodeKind::Element(_) => None,
        }
    }

    /// Concatenated text of this subtree.
    pub fn text_content(&self) -> String {
        match &self.0.kind {
            NodeKind::Text(t) => t.borrow().clone(),
            NodeKind::Element(_) => self
                .0
                .children
                .borrow()
                .iter()
                .map(|c| c.text_content())
                .collect(),
        }
    }

    /// Replace the subtree's children with a single text node.
    pub fn set_text_content(&self, text: &str) {
        let mut children = self.0.children.borrow_mut();
        children.clear();
        children.push(NodeHandle::new_text(text));
    }

    pub fn image_status(&self) -> Option<ImageStatus> {
        Some(self.element()?.image.as_ref()?.status())
    }

    pub fn mark_image_loading(&self) {
        self.set_image_status(ImageStatus::Loading);
    }

    pub fn mark_image_complete(&self) {
        self.set_image_status(ImageStatus::Complete);
    }

    pub fn mark_image_failed(&self) {
        self.set_image_status(ImageStatus::Broken);
    }

    fn set_image_status(&self, status: ImageStatus) {
        if let Some(slot) = self.element().and_then(|el| el.image.as_ref()) {
            slot.set(status);
        }
    }

    /// Resolves once the image has either loaded or failed. Non-image
    /// nodes and already-settled images resolve immediately. There is no
    /// timeout: an image that never settles keeps the caller suspended.
    pub async fn image_ready(&self) {
        let Some(slot) = self.element().and_then(|el| el.image.as_ref()) else {
            return;
        };
        let mut rx = slot.rx.clone();
        loop {
            if *rx.borrow() != ImageStatus::Loading {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Deep structural copy. Attributes, inline style, form state and the
    /// current image status are carried over; node identity is not.
    pub fn clone_subtree(&self) -> NodeHandle {
        let copy = match &self.0.kind {
            NodeKind::Text(t) => NodeHandle::new_text(&t.borrow()),
            NodeKind::Element(el) => {
                let clone = NodeHandle::new_element(&el.tag, el.namespace);
                if let Some(data) = clone.element() {
                    *data.attributes.borrow_mut() = el.attributes.borrow().clone();
                    *data.style.borrow_mut() = el.style.borrow().clone();
                    *data.value.borrow_mut() = el.value.borrow().clone();
                    data.checked.set(el.checked.get());
                    if let (Some(slot), Some(source)) = (data.image.as_ref(), el.image.as_ref()) {
                        slot.set(source.status());
                    }
                }
                clone
            }
        };
        for child in self.0.children.borrow().iter() {
            copy.append_child(child.clone_subtree());
        }
        copy
    }

    /// Serialize to permissive HTML (void elements unclosed, attribute
    /// values double-quoted). The markup packager repairs this into
    /// strict embeddable XML.
    pub fn outer_html(&self) -> String {
        let mut out = String::new();
        write_html(self, &mut out);
        out
    }
}

fn collect_elements(node: &NodeHandle, out: &mut Vec<NodeHandle>) {
    if node.is_element() {
        out.push(node.clone());
    }
    for child in node.0.children.borrow().iter() {
        collect_elements(child, out);
    }
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

fn is_void(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

fn write_html(node: &NodeHandle, out: &mut String) {
    match &node.0.kind {
        NodeKind::Text(t) => escape_text(&t.borrow(), out),
        NodeKind::Element(el) => {
            out.push('<');
            out.push_str(&el.tag);
            for (name, value) in el.attributes.borrow().iter() {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                escape_attr(value, out);
                out.push('"');
            }
            let style = el.style.borrow();
            if !style.is_empty() {
                out.push_str(" style=\"");
                escape_attr(&style.to_css(), out);
                out.push('"');
            }
            out.push('>');
            if is_void(&el.tag) {
                return;
            }
            for child in node.0.children.borrow().iter() {
                write_html(child, out);
            }
            out.push_str("</");
            out.push_str(&el.tag);
            out.push('>');
        }
    }
}

pub(crate) fn escape_text(input: &str, out: &mut String) {
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
}

pub(crate) fn escape_attr(input: &str, out: &mut String) {
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
}

fn convert_scraper_node(node: &ego_tree::NodeRef<'_, ScraperNode>) -> Option<NodeHandle> {
    match node.value() {
        ScraperNode::Text(t) => Some(NodeHandle::new_text(&t.text)),
        ScraperNode::Element(el) => {
            let namespace = if &*el.name.ns == SVG_NS {
                Namespace::Svg
            } else {
                Namespace::Html
            };
            let handle = NodeHandle::new_element(&el.name.local, namespace);
            for (name, value) in el.attrs() {
                if name == "style" {
                    if let Some(data) = handle.element() {
                        *data.style.borrow_mut() = InlineStyle::parse_attribute(value);
                    }
                } else {
                    handle.set_attribute(name, value);
                }
            }
            seed_form_state(&handle);
            for child in node.children() {
                if let Some(converted) = convert_scraper_node(&child) {
                    handle.append_child(converted);
                }
            }
            if handle.tag() == Some("textarea") && handle.value().is_none() {
                let content = handle.text_content();
                if !content.is_empty() {
                    handle.set_value(&content);
                }
            }
            Some(handle)
        }
        _ => None,
    }
}

fn seed_form_state(handle: &NodeHandle) {
    match handle.tag() {
        Some("input") => {
            if let Some(value) = handle.attribute("value") {
                handle.set_value(&value);
            }
            let kind = handle.attribute("type").unwrap_or_default();
            if kind == "checkbox" || kind == "radio" {
                handle.set_checked(handle.attribute("checked").is_some());
            }
        }
        Some("select") => {
            if let Some(value) = handle.attribute("value") {
                handle.set_value(&value);
            }
        }
        Some("img") => {
            // An image with a pending source starts out loading; the host
            // settles it via mark_image_complete / mark_image_failed.
            if handle.attribute("src").is_some() {
                handle.mark_image_loading();
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_builds_element_tree() {
        let root = NodeHandle::parse("<div id=\"a\"><span>hi</span><p>there</p></div>").unwrap();
        assert_eq!(root.tag(), Some("div"));
        assert_eq!(root.attribute("id").as_deref(), Some("a"));
        let children = root.element_children();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].tag(), Some("span"));
        assert_eq!(children[1].tag(), Some("p"));
        assert_eq!(root.text_content(), "hithere");
    }

    #[test]
    fn parse_detects_svg_namespace() {
        let root = NodeHandle::parse("<div><svg><circle r=\"4\"></circle></svg></div>").unwrap();
        let svg = &root.element_children()[0];
        assert_eq!(svg.namespace(), Some(Namespace::Svg));
        assert_eq!(root.namespace(), Some(Namespace::Html));
    }

    #[test]
    fn clone_subtree_mirrors_structure_and_order() {
        let root =
            NodeHandle::parse("<div><ul><li>1</li><li>2</li></ul><footer></footer></div>").unwrap();
        let clone = root.clone_subtree();
        let source_tags: Vec<_> = root
            .descendant_elements()
            .iter()
            .map(|n| n.tag().unwrap().to_string())
            .collect();
        let clone_tags: Vec<_> = clone
            .descendant_elements()
            .iter()
            .map(|n| n.tag().unwrap().to_string())
            .collect();
        assert_eq!(source_tags, clone_tags);
        assert!(!clone.ptr_eq(&root));
    }

    #[test]
    fn clone_subtree_carries_form_state() {
        let root = NodeHandle::parse("<input type=\"checkbox\" checked=\"\">").unwrap();
        root.set_checked(true);
        let clone = root.clone_subtree();
        assert_eq!(clone.checked(), Some(true));
    }

    #[test]
    fn inline_style_rejects_invalid_names() {
        let root = NodeHandle::parse("<div></div>").unwrap();
        assert!(root.set_style_property("color", "red", Priority::Normal).is_ok());
        assert!(root
            .set_style_property("not a property", "x", Priority::Normal)
            .is_err());
        assert!(root.set_style_property("", "x", Priority::Normal).is_err());
    }

    #[test]
    fn style_attribute_round_trips_importance() {
        let root = NodeHandle::parse("<div style=\"color: red !important; margin: 0px\"></div>")
            .unwrap();
        assert_eq!(root.style_value("color").as_deref(), Some("red"));
        assert!(root.style_text().contains("color: red !important;"));
        assert!(root.style_text().contains("margin: 0px;"));
    }

    #[test]
    fn outer_html_escapes_and_leaves_voids_unclosed() {
        let root = NodeHandle::parse("<div data-x=\"a&b\"><img src=\"x.png\"><p>1 &lt; 2</p></div>")
            .unwrap();
        let html = root.outer_html();
        assert!(html.contains("data-x=\"a&amp;b\""));
        assert!(html.contains("<img src=\"x.png\">"));
        assert!(!html.contains("</img>"));
        assert!(html.contains("1 &lt; 2"));
    }

    #[test]
    fn images_with_src_start_loading() {
        let img = NodeHandle::parse("<img src=\"x.png\">").unwrap();
        assert_eq!(img.image_status(), Some(ImageStatus::Loading));
        img.mark_image_complete();
        assert_eq!(img.image_status(), Some(ImageStatus::Complete));

        let bare = NodeHandle::new_element("img", Namespace::Html);
        assert_eq!(bare.image_status(), Some(ImageStatus::Complete));
    }

    #[tokio::test]
    async fn image_ready_resolves_for_broken_images() {
        let img = NodeHandle::parse("<img src=\"missing.png\">").unwrap();
        img.mark_image_failed();
        img.image_ready().await;
        assert_eq!(img.image_status(), Some(ImageStatus::Broken));
    }

    #[test]
    fn textarea_value_seeded_from_content() {
        let ta = NodeHandle::parse("<textarea>hello</textarea>").unwrap();
        assert_eq!(ta.value().as_deref(), Some("hello"));
    }
}
