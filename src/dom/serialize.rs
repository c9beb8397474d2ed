//! HTML serialization of the arena.

use super::{Document, NodeData, NodeId};
use std::borrow::Cow;

/// Elements with no content and no end tag.
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose text children are emitted verbatim.
const RAW_TEXT_ELEMENTS: &[&str] = &[
    "script", "style", "xmp", "iframe", "noembed", "noframes", "plaintext",
];

pub fn is_void(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

/// The whole document, doctype first.
pub fn serialize_document(doc: &Document) -> String {
    let mut out = String::from("<!DOCTYPE html>");
    write_children(doc, doc.root(), false, &mut out);
    out
}

pub fn inner_html(doc: &Document, id: NodeId) -> String {
    let mut out = String::new();
    let raw = doc.tag_name(id).is_some_and(|tag| RAW_TEXT_ELEMENTS.contains(&tag));
    write_children(doc, id, raw, &mut out);
    out
}

pub fn outer_html(doc: &Document, id: NodeId) -> String {
    let mut out = String::new();
    write_node(doc, id, false, &mut out);
    out
}

fn write_children(doc: &Document, id: NodeId, raw: bool, out: &mut String) {
    for &child in doc.children(id) {
        write_node(doc, child, raw, out);
    }
}

fn write_node(doc: &Document, id: NodeId, raw_parent: bool, out: &mut String) {
    let Some(data) = doc.data(id) else {
        return;
    };
    match data {
        NodeData::Document | NodeData::Fragment => write_children(doc, id, false, out),
        NodeData::Element { name, attrs } => {
            out.push('<');
            out.push_str(name);
            for attr in attrs {
                out.push(' ');
                out.push_str(&attr.name);
                out.push_str("=\"");
                out.push_str(&escape_attribute(&attr.value));
                out.push('"');
            }
            out.push('>');
            if is_void(name) {
                return;
            }
            let raw = RAW_TEXT_ELEMENTS.contains(&name.as_str());
            write_children(doc, id, raw, out);
            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
        NodeData::Text(text) if raw_parent => out.push_str(text),
        NodeData::Text(text) => out.push_str(&escape_text(text)),
        NodeData::Comment(text) => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
    }
}

pub fn escape_text(text: &str) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>', '\u{a0}']) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

pub fn escape_attribute(value: &str) -> Cow<'_, str> {
    if !value.contains(['&', '"']) {
        return Cow::Borrowed(value);
    }
    let mut out = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document() {
        let doc = Document::new();
        assert_eq!(
            serialize_document(&doc),
            "<!DOCTYPE html><html><head></head><body></body></html>"
        );
    }

    #[test]
    fn test_void_elements_have_no_end_tag() {
        let mut doc = Document::new();
        doc.set_inner_html(doc.body(), "<p>a<br>b<img src=\"x.png\"></p>").unwrap();
        assert_eq!(doc.inner_html(doc.body()), "<p>a<br>b<img src=\"x.png\"></p>");

        // Children appended by script to a void element are not emitted
        let br = doc.create_element("br");
        let text = doc.create_text("lost");
        doc.append_child(br, text).unwrap();
        assert_eq!(outer_html(&doc, br), "<br>");
    }

    #[test]
    fn test_attribute_escaping() {
        let mut doc = Document::new();
        let el = doc.create_element("my-card");
        doc.set_attribute(el, "title", "Tom & \"Jerry\" <3").unwrap();
        assert_eq!(
            outer_html(&doc, el),
            "<my-card title=\"Tom &amp; &quot;Jerry&quot; <3\"></my-card>"
        );
    }

    #[test]
    fn test_text_escaping_is_stable() {
        let mut doc = Document::new();
        let input = "<p>1 &lt; 2 &amp;&amp; a&nbsp;b</p>";
        doc.set_inner_html(doc.body(), input).unwrap();
        let once = doc.inner_html(doc.body());
        assert_eq!(once, input);

        doc.set_inner_html(doc.body(), &once).unwrap();
        assert_eq!(doc.inner_html(doc.body()), once);
    }

    #[test]
    fn test_raw_text_is_verbatim() {
        let mut doc = Document::new();
        let script = "<script>if (a < b && c) { x(\"</p>\"); }</script>";
        doc.set_inner_html(doc.body(), script).unwrap();
        assert_eq!(doc.inner_html(doc.body()), script);

        let node = doc.children(doc.body())[0];
        assert_eq!(inner_html(&doc, node), "if (a < b && c) { x(\"</p>\"); }");
    }

    #[test]
    fn test_comments() {
        let mut doc = Document::new();
        doc.set_inner_html(doc.body(), "<!-- keep -->x").unwrap();
        assert_eq!(doc.inner_html(doc.body()), "<!-- keep -->x");
    }
}
