//! Owned, mutable XML tree.
//!
//! `roxmltree` gives a fast read-only view of a document. Editing a project
//! file needs to insert and detach nodes, so the parsed document is copied
//! into an arena of owned nodes here, mutated in place, and written back out
//! in full with `quick-xml`. There is no incremental patching: every save
//! rewrites the whole file, with whitespace-only text dropped on parse and
//! regenerated from the chosen [`Indent`] on save.

use std::borrow::Cow;
use std::io::Cursor;
use std::path::Path;

use quick_xml::Writer;
use quick_xml::escape::partial_escape;
use quick_xml::events::attributes::Attribute as XmlAttribute;
use quick_xml::events::{BytesDecl, BytesEnd, BytesPI, BytesStart, BytesText, Event};
use quick_xml::name::QName;
use tracing::debug;

use crate::error::{Result, VcxprojError};

/// Handle to a node inside one [`Document`]. Only meaningful for the
/// document that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Qualified name as written (`prefix:local` or `local`).
    pub name: String,
    /// Namespace declarations made on this element, `(prefix, uri)`.
    pub namespaces: Vec<(Option<String>, String)>,
    pub attributes: Vec<Attribute>,
}

impl Element {
    /// The name without any namespace prefix.
    pub fn local_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// The document node; parent of the root element.
    Root,
    Element(Element),
    Text(String),
    Comment(String),
    /// `<?target value?>`
    ProcessingInstruction { target: String, value: Option<String> },
}

#[derive(Debug, Clone)]
struct NodeData {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    kind: NodeKind,
}

/// Indentation used when a document is written out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Indent {
    ch: u8,
    size: usize,
}

impl Indent {
    pub fn spaces(size: usize) -> Self {
        Self { ch: b' ', size }
    }

    pub fn tabs(size: usize) -> Self {
        Self { ch: b'\t', size }
    }

    /// Everything on one line.
    pub fn none() -> Self {
        Self { ch: b' ', size: 0 }
    }
}

impl Default for Indent {
    fn default() -> Self {
        Self::spaces(2)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Document
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<NodeData>,
}

impl Document {
    /// Parse XML text into an owned tree.
    pub fn parse(source: &str) -> Result<Self> {
        let parsed = roxmltree::Document::parse(source)?;
        let mut doc = Self {
            nodes: vec![NodeData { parent: None, children: Vec::new(), kind: NodeKind::Root }],
        };
        let root = doc.root();
        for child in parsed.root().children() {
            doc.copy_from(root, child);
        }
        Ok(doc)
    }

    /// Read and parse a file. Parse errors carry the file name.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "parsing document");
        let source = std::fs::read_to_string(path).map_err(|e| VcxprojError::io(path, e))?;
        Self::parse(&source).map_err(|e| e.in_file(path))
    }

    fn copy_from(&mut self, parent: NodeId, node: roxmltree::Node) {
        let kind = match node.node_type() {
            roxmltree::NodeType::Element => NodeKind::Element(convert_element(node)),
            roxmltree::NodeType::Text => {
                let text = node.text().unwrap_or("");
                if text.trim().is_empty() {
                    return;
                }
                NodeKind::Text(text.to_string())
            }
            roxmltree::NodeType::Comment => NodeKind::Comment(node.text().unwrap_or("").to_string()),
            roxmltree::NodeType::PI => match node.pi() {
                Some(pi) => NodeKind::ProcessingInstruction {
                    target: pi.target.to_string(),
                    value: pi.value.map(String::from),
                },
                None => return,
            },
            roxmltree::NodeType::Root => return,
        };
        let id = self.push(parent, kind);
        for child in node.children() {
            self.copy_from(id, child);
        }
    }

    fn push(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData { parent: Some(parent), children: Vec::new(), kind });
        self.nodes[parent.0].children.push(id);
        id
    }

    // ─── Navigation ──────────────────────────────────────────────────────

    /// The document node.
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// The single top-level element, if the document has one.
    pub fn root_element(&self) -> Option<NodeId> {
        self.children(self.root()).find(|&id| self.element(id).is_some())
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes[id.0].kind {
            NodeKind::Element(e) => Some(e),
            _ => None,
        }
    }

    /// Local name of an element node.
    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(Element::local_name)
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id).and_then(|e| e.attribute(name))
    }

    /// The first text child of an element, like `<IntDir>this</IntDir>`.
    /// An element without text has the empty string as its text.
    pub fn text(&self, id: NodeId) -> Option<&str> {
        self.element(id)?;
        let text = self.children(id).find_map(|c| match self.kind(c) {
            NodeKind::Text(t) => Some(t.as_str()),
            _ => None,
        });
        Some(text.unwrap_or(""))
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[id.0].children.iter().copied()
    }

    /// `id` followed by everything below it, in document order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.nodes[next.0].children.iter().rev().copied());
        }
        out
    }

    /// Is `id` still reachable from the document node?
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            current = parent;
        }
        current == self.root()
    }

    // ─── Mutation ────────────────────────────────────────────────────────

    /// Append a new, empty element as the last child of `parent`.
    pub fn append_element(&mut self, parent: NodeId, name: &str) -> NodeId {
        self.push(
            parent,
            NodeKind::Element(Element {
                name: name.to_string(),
                namespaces: Vec::new(),
                attributes: Vec::new(),
            }),
        )
    }

    /// Set (or add) an attribute on an element. Returns `false` for
    /// non-element nodes.
    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> bool {
        let NodeKind::Element(element) = &mut self.nodes[id.0].kind else {
            return false;
        };
        match element.attributes.iter_mut().find(|a| a.name == name) {
            Some(attr) => attr.value = value.to_string(),
            None => element.attributes.push(Attribute {
                name: name.to_string(),
                value: value.to_string(),
            }),
        }
        true
    }

    /// Remove `id` (and its subtree) from its parent. Returns `false` if it
    /// was already detached or is the document node.
    pub fn detach(&mut self, id: NodeId) -> bool {
        let Some(parent) = self.nodes[id.0].parent.take() else {
            return false;
        };
        self.nodes[parent.0].children.retain(|&c| c != id);
        true
    }

    // ─── Serialization ───────────────────────────────────────────────────

    /// Serialize the whole document.
    pub fn to_xml(&self, indent: Indent) -> std::io::Result<String> {
        let mut writer = if indent.size == 0 {
            Writer::new(Cursor::new(Vec::new()))
        } else {
            Writer::new_with_indent(Cursor::new(Vec::new()), indent.ch, indent.size)
        };
        emit(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        for child in self.children(self.root()) {
            self.write_node(&mut writer, child)?;
        }
        let mut bytes = writer.into_inner().into_inner();
        bytes.push(b'\n');
        String::from_utf8(bytes).map_err(std::io::Error::other)
    }

    fn write_node(&self, writer: &mut Writer<Cursor<Vec<u8>>>, id: NodeId) -> std::io::Result<()> {
        match self.kind(id) {
            NodeKind::Root => Ok(()),
            NodeKind::Text(text) => emit(
                writer,
                Event::Text(BytesText::from_escaped(partial_escape(text.as_str()))),
            ),
            NodeKind::Comment(text) => emit(writer, Event::Comment(BytesText::from_escaped(text.as_str()))),
            NodeKind::ProcessingInstruction { target, value } => {
                let content = match value {
                    Some(value) if !value.is_empty() => format!("{target} {value}"),
                    _ => target.clone(),
                };
                emit(writer, Event::PI(BytesPI::new(content)))
            }
            NodeKind::Element(element) => {
                let mut start = BytesStart::new(element.name.as_str());
                for (prefix, uri) in &element.namespaces {
                    let key = match prefix {
                        Some(p) => format!("xmlns:{p}"),
                        None => "xmlns".to_string(),
                    };
                    start.push_attribute(attribute(&key, uri));
                }
                for attr in &element.attributes {
                    start.push_attribute(attribute(&attr.name, &attr.value));
                }

                if self.nodes[id.0].children.is_empty() {
                    return emit(writer, Event::Empty(start));
                }
                emit(writer, Event::Start(start))?;
                for child in self.children(id) {
                    self.write_node(writer, child)?;
                }
                emit(writer, Event::End(BytesEnd::new(element.name.as_str())))
            }
        }
    }

    /// Rewrite `path` with the whole document. Not atomic: if writing fails
    /// part way, the previous content is not guaranteed to survive.
    pub fn save(&self, path: impl AsRef<Path>, indent: Indent) -> Result<()> {
        let path = path.as_ref();
        let xml = self.to_xml(indent).map_err(|e| VcxprojError::persist(path, e))?;
        std::fs::write(path, xml).map_err(|e| VcxprojError::persist(path, e))?;
        debug!(path = %path.display(), "saved document");
        Ok(())
    }
}

fn emit(writer: &mut Writer<Cursor<Vec<u8>>>, event: Event<'_>) -> std::io::Result<()> {
    writer.write_event(event).map_err(std::io::Error::other)
}

/// Attribute values keep their apostrophes: conditions such as
/// `'$(Configuration)|$(Platform)'=='Debug|Win32'` are full of them.
fn attribute<'a>(key: &'a str, value: &str) -> XmlAttribute<'a> {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    XmlAttribute {
        key: QName(key.as_bytes()),
        value: Cow::Owned(escaped.into_bytes()),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  roxmltree → owned element
// ═══════════════════════════════════════════════════════════════════════════════

fn convert_element(node: roxmltree::Node) -> Element {
    // Only the declarations that are new relative to the parent element.
    let inherited: Vec<(Option<&str>, &str)> = node
        .parent_element()
        .map(|p| p.namespaces().map(|ns| (ns.name(), ns.uri())).collect())
        .unwrap_or_default();
    let namespaces = node
        .namespaces()
        .filter(|ns| ns.name() != Some("xml"))
        .filter(|ns| !inherited.contains(&(ns.name(), ns.uri())))
        .map(|ns| (ns.name().map(String::from), ns.uri().to_string()))
        .collect();

    let attributes = node
        .attributes()
        .map(|a| Attribute {
            name: qualify(node, a.namespace(), a.name()),
            value: a.value().to_string(),
        })
        .collect();

    let tag = node.tag_name();
    Element {
        name: qualify(node, tag.namespace(), tag.name()),
        namespaces,
        attributes,
    }
}

fn qualify(node: roxmltree::Node, namespace: Option<&str>, local: &str) -> String {
    match namespace.and_then(|uri| node.lookup_prefix(uri)) {
        Some(prefix) if !prefix.is_empty() => format!("{prefix}:{local}"),
        _ => local.to_string(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════
