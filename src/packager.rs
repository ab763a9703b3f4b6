//! Serialization of a styled clone into markup embeddable as SVG foreign
//! content.
//!
//! Permissive HTML is not well-formed XML: void elements are unclosed,
//! quoting is loose, and a document-type declaration may be present. The
//! packager round-trips the clone through a scratch document to pick up
//! the document-level scaffold, then re-serializes it as strict XML with
//! the XHTML namespace declared on the root.

use scraper::{Html, Node as ScraperNode};

use crate::dom::{escape_attr, escape_text, NodeHandle};
use crate::{Error, Result};

const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";

/// Serialize `clone` into a self-contained XHTML payload.
///
/// The payload has a single `<html>` root carrying the namespace
/// declaration, keeps the scratch document's `<head>`, and hoists the
/// fragment out of the implicit `<body>` wrapper so no body default
/// styling leaks into the embedding. The output never contains a
/// document-type declaration.
pub fn package_markup(clone: &NodeHandle) -> Result<String> {
    if !clone.is_element() {
        return Err(Error::PackageError(
            "clone root must be an element".to_string(),
        ));
    }

    let permissive = clone.outer_html();
    let scratch = Html::parse_document(&permissive);

    let root = scratch
        .tree
        .root()
        .children()
        .find(|n| n.value().is_element())
        .ok_or_else(|| Error::PackageError("scratch document has no root".to_string()))?;

    let mut out = String::with_capacity(permissive.len() + 128);
    out.push_str("<html xmlns=\"");
    out.push_str(XHTML_NS);
    out.push_str("\">");
    for child in root.children() {
        let is_body = child
            .value()
            .as_element()
            .is_some_and(|el| el.name.local.as_ref() == "body");
        if is_body {
            for grandchild in child.children() {
                write_xml(&grandchild, &mut out);
            }
        } else {
            write_xml(&child, &mut out);
        }
    }
    out.push_str("</html>");

    Ok(strip_doctype(&out))
}

// The scratch parse is permissive HTML; its serialization here must be
// well-formed XML. Empty elements self-close, text and attribute values
// are escaped, and comments, doctypes and processing instructions do not
// survive packaging.
fn write_xml(node: &ego_tree::NodeRef<'_, ScraperNode>, out: &mut String) {
    match node.value() {
        ScraperNode::Element(el) => {
            let tag = el.name.local.as_ref();
            out.push('<');
            out.push_str(tag);
            for (name, value) in el.attrs() {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                escape_attr(value, out);
                out.push('"');
            }
            if node.has_children() {
                out.push('>');
                for child in node.children() {
                    write_xml(&child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            } else {
                out.push_str("/>");
            }
        }
        ScraperNode::Text(t) => escape_text(&t.text, out),
        _ => {}
    }
}

/// Remove a leading document-type declaration, legal in permissive markup
/// but illegal inside an embedded fragment.
pub fn strip_doctype(markup: &str) -> String {
    let trimmed = markup.trim_start();
    if trimmed.len() >= 9 && trimmed[..9].eq_ignore_ascii_case("<!doctype") {
        if let Some(end) = trimmed.find('>') {
            return trimmed[end + 1..].trim_start().to_string();
        }
    }
    markup.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::NodeHandle;

    #[test]
    fn payload_has_single_namespaced_root() {
        let clone = NodeHandle::parse("<div><p>hello</p></div>").unwrap();
        let payload = package_markup(&clone).unwrap();
        assert!(payload.starts_with("<html xmlns=\"http://www.w3.org/1999/xhtml\">"));
        assert!(payload.ends_with("</html>"));
        assert!(payload.contains("<p>hello</p>"));
    }

    #[test]
    fn body_wrapper_is_elided_but_head_kept() {
        let clone = NodeHandle::parse("<div id=\"x\">content</div>").unwrap();
        let payload = package_markup(&clone).unwrap();
        assert!(!payload.contains("<body"));
        assert!(payload.contains("<head/>") || payload.contains("<head></head>"));
        assert!(payload.contains("<div id=\"x\">content</div>"));
    }

    #[test]
    fn void_elements_become_self_closing() {
        let clone = NodeHandle::parse("<div><img src=\"a.png\"><br><input value=\"1\"></div>")
            .unwrap();
        let payload = package_markup(&clone).unwrap();
        assert!(payload.contains("<img src=\"a.png\"/>"));
        assert!(payload.contains("<br/>"));
        assert!(payload.contains("<input value=\"1\"/>"));
    }

    #[test]
    fn output_never_contains_doctype() {
        let clones = [
            "<div>plain</div>",
            "<div>&lt;!DOCTYPE html&gt; quoted in text</div>",
            "<section><article>nested</article></section>",
        ];
        for markup in clones {
            let clone = NodeHandle::parse(markup).unwrap();
            let payload = package_markup(&clone).unwrap();
            assert!(
                !payload.contains("<!DOCTYPE") && !payload.contains("<!doctype"),
                "doctype leaked for {markup}: {payload}"
            );
        }
    }

    #[test]
    fn strip_doctype_removes_leading_declaration_only() {
        assert_eq!(strip_doctype("<!DOCTYPE html><html></html>"), "<html></html>");
        assert_eq!(strip_doctype("  <!doctype html>\n<p/>"), "<p/>");
        let untouched = "<p>keep <b>me</b></p>";
        assert_eq!(strip_doctype(untouched), untouched);
    }

    #[test]
    fn text_and_attributes_are_xml_escaped() {
        let clone = NodeHandle::parse("<div title=\"a&b\">1 &lt; 2 &amp; 3</div>").unwrap();
        let payload = package_markup(&clone).unwrap();
        assert!(payload.contains("title=\"a&amp;b\""));
        assert!(payload.contains("1 &lt; 2 &amp; 3"));
    }

    #[test]
    fn inline_styles_survive_packaging() {
        let clone = NodeHandle::parse("<div></div>").unwrap();
        clone
            .set_style_property("opacity", "0.3", crate::style::Priority::Normal)
            .unwrap();
        let payload = package_markup(&clone).unwrap();
        assert!(payload.contains("style=\"opacity: 0.3;\""));
    }
}
