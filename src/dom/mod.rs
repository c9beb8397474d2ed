//! The realm's document tree.
//!
//! An arena of nodes addressed by [`NodeId`]. Nodes are never freed while
//! the document lives; detached nodes simply have no parent. The script side
//! only ever holds ids.

pub mod parse;
pub mod select;
pub mod serialize;

use serde::Serialize;
use thiserror::Error;

pub const ELEMENT_NODE: u32 = 1;
pub const TEXT_NODE: u32 = 3;
pub const COMMENT_NODE: u32 = 8;
pub const DOCUMENT_NODE: u32 = 9;
pub const DOCUMENT_FRAGMENT_NODE: u32 = 11;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomError {
    #[error("node {0} does not exist")]
    NoSuchNode(u32),

    #[error("hierarchy request error: {0}")]
    Hierarchy(&'static str),

    #[error("node {child} is not a child of node {parent}")]
    NotAChild { parent: u32, child: u32 },

    #[error("'{0}' is not a supported selector")]
    InvalidSelector(String),

    #[error("failed to parse markup: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn from_raw(raw: u32) -> Self {
        NodeId(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum NodeData {
    Document,
    Fragment,
    Element { name: String, attrs: Vec<Attribute> },
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    data: NodeData,
}

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
    html: NodeId,
    head: NodeId,
    body: NodeId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// An empty `#document > html > (head, body)` skeleton.
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: vec![],
            root: NodeId(0),
            html: NodeId(0),
            head: NodeId(0),
            body: NodeId(0),
        };
        doc.new_tree();
        doc
    }

    /// Start a fresh skeleton in the same arena.
    ///
    /// Ids handed out earlier stay valid and keep pointing at the same
    /// nodes; they are just no longer connected.
    pub fn new_tree(&mut self) {
        let root = self.push(NodeData::Document);
        let html = self.create_element("html");
        let head = self.create_element("head");
        let body = self.create_element("body");
        self.link(root, html);
        self.link(html, head);
        self.link(html, body);
        self.root = root;
        self.html = html;
        self.head = head;
        self.body = body;
    }

    /// The `#document` node of the current tree.
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn html(&self) -> NodeId {
        self.html
    }

    pub fn head(&self) -> NodeId {
        self.head
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn node(&self, id: NodeId) -> Result<&Node, DomError> {
        self.nodes.get(id.index()).ok_or(DomError::NoSuchNode(id.0))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, DomError> {
        self.nodes.get_mut(id.index()).ok_or(DomError::NoSuchNode(id.0))
    }

    pub fn data(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(id.index()).map(|n| &n.data)
    }

    /// DOM `nodeType`, or 0 for an unknown id.
    pub fn node_type(&self, id: NodeId) -> u32 {
        match self.data(id) {
            Some(NodeData::Element { .. }) => ELEMENT_NODE,
            Some(NodeData::Text(_)) => TEXT_NODE,
            Some(NodeData::Comment(_)) => COMMENT_NODE,
            Some(NodeData::Document) => DOCUMENT_NODE,
            Some(NodeData::Fragment) => DOCUMENT_FRAGMENT_NODE,
            None => 0,
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.data(id), Some(NodeData::Element { .. }))
    }

    /// Lowercase local name of an element.
    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        match self.data(id) {
            Some(NodeData::Element { name, .. }) => Some(name),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            parent: None,
            children: vec![],
            data,
        });
        id
    }

    pub fn create_element(&mut self, name: &str) -> NodeId {
        self.create_element_with_attrs(name.to_ascii_lowercase(), vec![])
    }

    /// Names are taken as given; the parser already normalizes them.
    pub(crate) fn create_element_with_attrs(&mut self, name: String, attrs: Vec<Attribute>) -> NodeId {
        self.push(NodeData::Element { name, attrs })
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeData::Text(text.to_string()))
    }

    pub fn create_comment(&mut self, text: &str) -> NodeId {
        self.push(NodeData::Comment(text.to_string()))
    }

    pub fn create_fragment(&mut self) -> NodeId {
        self.push(NodeData::Fragment)
    }

    /// Append without any checks; for freshly created, detached nodes.
    pub(crate) fn link(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child.index()].parent = Some(parent);
        self.nodes[parent.index()].children.push(child);
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.index()).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id.index())
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    /// Sibling `offset` positions away (`1` = next, `-1` = previous).
    pub fn sibling(&self, id: NodeId, offset: i32) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let siblings = self.children(parent);
        let index = siblings.iter().position(|&c| c == id)? as i64 + offset as i64;
        usize::try_from(index).ok().and_then(|i| siblings.get(i).copied())
    }

    pub fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    pub fn is_connected(&self, id: NodeId) -> bool {
        self.nodes.get(id.index()).is_some() && self.is_inclusive_ancestor(self.root, id)
    }

    /// All descendants of `id` in document order, `id` excluded.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    pub fn element_by_id(&self, scope: NodeId, value: &str) -> Option<NodeId> {
        self.descendants(scope)
            .into_iter()
            .find(|&id| self.is_element(id) && self.get_attribute(id, "id") == Some(value))
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.insert_before(parent, child, None)
    }

    /// Insert `child` (or a fragment's children) before `reference`, or at
    /// the end when `reference` is `None`.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<(), DomError> {
        match self.node(parent)?.data {
            NodeData::Document | NodeData::Fragment | NodeData::Element { .. } => {}
            _ => return Err(DomError::Hierarchy("parent cannot have children")),
        }
        match self.node(child)?.data {
            NodeData::Document => return Err(DomError::Hierarchy("a document cannot be inserted")),
            _ if self.is_inclusive_ancestor(child, parent) => {
                return Err(DomError::Hierarchy("a node cannot be inserted into itself"))
            }
            _ => {}
        }
        if let Some(reference) = reference {
            if self.parent(reference) != Some(parent) {
                return Err(DomError::NotAChild {
                    parent: parent.0,
                    child: reference.0,
                });
            }
        }

        let reference = match reference {
            Some(r) if r == child => self.sibling(child, 1),
            other => other,
        };

        let moving: Vec<NodeId> = if matches!(self.node(child)?.data, NodeData::Fragment) {
            std::mem::take(&mut self.node_mut(child)?.children)
        } else {
            self.detach(child);
            vec![child]
        };

        let index = match reference {
            Some(r) => self.children(parent).iter().position(|&c| c == r).unwrap_or(self.children(parent).len()),
            None => self.children(parent).len(),
        };

        for &node in &moving {
            self.nodes[node.index()].parent = Some(parent);
        }
        self.nodes[parent.index()]
            .children
            .splice(index..index, moving);
        Ok(())
    }

    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        if self.node(child)?.parent != Some(parent) {
            return Err(DomError::NotAChild {
                parent: parent.0,
                child: child.0,
            });
        }
        self.detach(child);
        Ok(())
    }

    /// Remove `id` from its parent, if any.
    pub fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.parent(id) else {
            return;
        };
        self.nodes[parent.index()].children.retain(|&c| c != id);
        self.nodes[id.index()].parent = None;
    }

    pub fn clear_children(&mut self, id: NodeId) -> Result<(), DomError> {
        let children = std::mem::take(&mut self.node_mut(id)?.children);
        for child in children {
            self.nodes[child.index()].parent = None;
        }
        Ok(())
    }

    pub fn replace_children(&mut self, parent: NodeId, children: Vec<NodeId>) -> Result<(), DomError> {
        self.clear_children(parent)?;
        for child in children {
            self.append_child(parent, child)?;
        }
        Ok(())
    }

    pub fn clone_node(&mut self, id: NodeId, deep: bool) -> Result<NodeId, DomError> {
        let data = self.node(id)?.data.clone();
        let copy = self.push(data);
        if deep {
            let children = self.children(id).to_vec();
            for child in children {
                let child_copy = self.clone_node(child, true)?;
                self.link(copy, child_copy);
            }
        }
        Ok(copy)
    }

    // ------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------

    pub fn attributes(&self, id: NodeId) -> &[Attribute] {
        match self.data(id) {
            Some(NodeData::Element { attrs, .. }) => attrs,
            _ => &[],
        }
    }

    pub fn get_attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attributes(id)
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .map(|a| a.value.as_str())
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        let NodeData::Element { attrs, .. } = &mut self.node_mut(id)?.data else {
            return Err(DomError::Hierarchy("only elements have attributes"));
        };
        match attrs.iter_mut().find(|a| a.name.eq_ignore_ascii_case(name)) {
            Some(attr) => attr.value = value.to_string(),
            None => attrs.push(Attribute::new(name.to_ascii_lowercase(), value)),
        }
        Ok(())
    }

    /// Replace the whole attribute list of an element.
    pub fn replace_attributes(&mut self, id: NodeId, attributes: Vec<Attribute>) -> Result<(), DomError> {
        let NodeData::Element { attrs, .. } = &mut self.node_mut(id)?.data else {
            return Err(DomError::Hierarchy("only elements have attributes"));
        };
        *attrs = attributes;
        Ok(())
    }

    /// Returns whether the attribute was present.
    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> Result<bool, DomError> {
        let NodeData::Element { attrs, .. } = &mut self.node_mut(id)?.data else {
            return Ok(false);
        };
        let before = attrs.len();
        attrs.retain(|a| !a.name.eq_ignore_ascii_case(name));
        Ok(attrs.len() != before)
    }

    // ------------------------------------------------------------------
    // Text and markup
    // ------------------------------------------------------------------

    pub fn text_content(&self, id: NodeId) -> String {
        match self.data(id) {
            Some(NodeData::Text(text)) | Some(NodeData::Comment(text)) => text.clone(),
            Some(_) => self
                .descendants(id)
                .into_iter()
                .filter_map(|d| match self.data(d) {
                    Some(NodeData::Text(text)) => Some(text.as_str()),
                    _ => None,
                })
                .collect(),
            None => String::new(),
        }
    }

    pub fn set_text_content(&mut self, id: NodeId, text: &str) -> Result<(), DomError> {
        match &mut self.node_mut(id)?.data {
            NodeData::Text(data) | NodeData::Comment(data) => {
                *data = text.to_string();
                Ok(())
            }
            NodeData::Document => Ok(()),
            _ => {
                self.clear_children(id)?;
                if !text.is_empty() {
                    let node = self.create_text(text);
                    self.link(id, node);
                }
                Ok(())
            }
        }
    }

    /// Parse `html` and make the result the children of `id`.
    pub fn set_inner_html(&mut self, id: NodeId, html: &str) -> Result<(), DomError> {
        match self.node(id)?.data {
            NodeData::Element { .. } | NodeData::Fragment => {}
            _ => return Err(DomError::Hierarchy("innerHTML needs an element")),
        }
        let nodes = parse::parse_fragment(self, html)?;
        self.clear_children(id)?;
        for node in nodes {
            self.link(id, node);
        }
        Ok(())
    }

    pub fn inner_html(&self, id: NodeId) -> String {
        serialize::inner_html(self, id)
    }

    pub fn outer_html(&self, id: NodeId) -> String {
        serialize::outer_html(self, id)
    }
}
