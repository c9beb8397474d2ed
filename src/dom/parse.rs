//! HTML parsing into the arena.
//!
//! html5ever builds an `RcDom`, which is then copied into a [`Document`].
//! Fragments are parsed inside a synthetic body so the tree builder's
//! in-body rules apply to them.

use super::{Attribute, Document, DomError, NodeId};
use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData as RcNodeData, RcDom};

/// Parse `html` as body content. The returned nodes are detached and in
/// document order.
pub fn parse_fragment(doc: &mut Document, html: &str) -> Result<Vec<NodeId>, DomError> {
    let wrapped = format!("<!DOCTYPE html><html><head></head><body>{html}</body></html>");
    let dom = parse(&wrapped)?;

    let Some(body) = find_element(&dom.document, &["html", "body"]) else {
        return Ok(vec![]);
    };
    let mut nodes = Vec::new();
    for child in body.children.borrow().iter() {
        if let Some(id) = convert(doc, child) {
            nodes.push(id);
        }
    }
    Ok(nodes)
}

/// Attributes of the `<html>` and `<body>` start tags, given as raw tag text
/// such as `<html lang="en">`.
pub fn shell_attributes(
    html_tag: &str,
    body_tag: &str,
) -> Result<(Vec<Attribute>, Vec<Attribute>), DomError> {
    let dom = parse(&format!("<!DOCTYPE html>{html_tag}<head></head>{body_tag}</body></html>"))?;
    let html = find_element(&dom.document, &["html"])
        .map(|h| element_attributes(&h))
        .unwrap_or_default();
    let body = find_element(&dom.document, &["html", "body"])
        .map(|b| element_attributes(&b))
        .unwrap_or_default();
    Ok((html, body))
}

fn parse(html: &str) -> Result<RcDom, DomError> {
    parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut html.as_bytes())
        .map_err(|e| DomError::Parse(e.to_string()))
}

/// Follow a chain of element names down from `from`.
fn find_element(from: &Handle, path: &[&str]) -> Option<Handle> {
    let mut current = from.clone();
    for name in path {
        let next = current
            .children
            .borrow()
            .iter()
            .find(|child| matches!(&child.data, RcNodeData::Element { name: n, .. } if n.local.as_ref() == *name))
            .cloned()?;
        current = next;
    }
    Some(current)
}

fn element_attributes(handle: &Handle) -> Vec<Attribute> {
    match &handle.data {
        RcNodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .map(|attr| {
                let name = match &attr.name.prefix {
                    Some(prefix) => format!("{}:{}", prefix.as_ref(), attr.name.local.as_ref()),
                    None => attr.name.local.to_string(),
                };
                Attribute::new(name, attr.value.to_string())
            })
            .collect(),
        _ => vec![],
    }
}

fn convert(doc: &mut Document, handle: &Handle) -> Option<NodeId> {
    match &handle.data {
        RcNodeData::Text { contents } => Some(doc.create_text(&contents.borrow())),
        RcNodeData::Comment { contents } => Some(doc.create_comment(contents)),
        RcNodeData::Element {
            name,
            template_contents,
            ..
        } => {
            let id = doc.create_element_with_attrs(name.local.to_string(), element_attributes(handle));
            // Template content lives in a separate fragment; graft it back so
            // it serializes as ordinary children.
            let contents = template_contents.borrow();
            let children = match contents.as_ref() {
                Some(fragment) => fragment.children.borrow().clone(),
                None => handle.children.borrow().clone(),
            };
            for child in &children {
                if let Some(child_id) = convert(doc, child) {
                    doc.link(id, child_id);
                }
            }
            Some(id)
        }
        RcNodeData::Document | RcNodeData::Doctype { .. } | RcNodeData::ProcessingInstruction { .. } => None,
    }
}
