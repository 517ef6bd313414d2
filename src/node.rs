//! Node identity types and the records the engine keeps for every known node.
//!
//! Ids are adapter-provided strings. Parent/child relations are stored as id references with a
//! parent back-reference (see [`crate::index::NodeIndex`]); no record ever holds another record.
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    ops::Deref,
    sync::Arc,
};

/// Display name of the root sentinel inside placeholder keys.
pub const ROOT_SENTINEL: &str = "__root__";

/// Opaque node identifier. Cloning is a reference count bump.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Arc<str>);

impl NodeId {
    pub fn new(id: impl AsRef<str>) -> Self {
        NodeId(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for NodeId {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        NodeId::new(id)
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        NodeId(Arc::from(id))
    }
}

/// The owner of a list of children: either the tree root or a node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ParentKey {
    Root,
    Node(NodeId),
}

impl ParentKey {
    pub fn node_id(&self) -> Option<&NodeId> {
        match self {
            ParentKey::Root => None,
            ParentKey::Node(id) => Some(id),
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self, ParentKey::Root)
    }
}

impl From<Option<NodeId>> for ParentKey {
    fn from(id: Option<NodeId>) -> Self {
        match id {
            Some(id) => ParentKey::Node(id),
            None => ParentKey::Root,
        }
    }
}

impl From<NodeId> for ParentKey {
    fn from(id: NodeId) -> Self {
        ParentKey::Node(id)
    }
}

impl Display for ParentKey {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            ParentKey::Root => write!(f, "{ROOT_SENTINEL}"),
            ParentKey::Node(id) => write!(f, "{id}"),
        }
    }
}

/// Stable identity of a projected row, used for focus tracking and host-side keyed rendering.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RowKey {
    Node(NodeId),
    Placeholder { parent: ParentKey, slot: usize },
}

impl RowKey {
    pub fn node_id(&self) -> Option<&NodeId> {
        match self {
            RowKey::Node(id) => Some(id),
            RowKey::Placeholder { .. } => None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, RowKey::Placeholder { .. })
    }
}

impl Display for RowKey {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            RowKey::Node(id) => write!(f, "{id}"),
            RowKey::Placeholder { parent, slot } => write!(f, "placeholder:{parent}:{slot}"),
        }
    }
}

/// A node as delivered by the adapter, either at INIT or inside a load completion.
///
/// The optional hints correspond to the adapter contract: `is_leaf` is an explicit override and
/// wins over every heuristic, `children` carries inline children (already loaded), and
/// `total_children` / `page_size` describe a page-aware parent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeInput {
    pub id: NodeId,
    pub label: String,
    pub search_text: Option<String>,
    pub data: serde_json::Value,
    pub is_leaf: Option<bool>,
    pub has_children: Option<bool>,
    pub total_children: Option<usize>,
    pub page_size: Option<usize>,
    pub children: Option<Vec<NodeInput>>,
    pub disabled: bool,
    /// Initial expansion, honored when the node is first inserted.
    pub expanded: bool,
}

impl Default for NodeId {
    fn default() -> Self {
        NodeId::new("")
    }
}

impl NodeInput {
    pub fn new(id: impl Into<NodeId>, label: impl Into<String>) -> Self {
        NodeInput {
            id: id.into(),
            label: label.into(),
            ..Default::default()
        }
    }

    pub fn leaf(id: impl Into<NodeId>, label: impl Into<String>) -> Self {
        NodeInput {
            is_leaf: Some(true),
            ..NodeInput::new(id, label)
        }
    }

    pub fn with_children(mut self, children: Vec<NodeInput>) -> Self {
        self.children = Some(children);
        self
    }

    pub fn with_total_children(mut self, total: usize) -> Self {
        self.total_children = Some(total);
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn expanded(mut self) -> Self {
        self.expanded = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    /// Leaf resolution order: adapter override, inline children, known child count, the
    /// `has_children` hint. Without any hint a node is assumed expandable.
    pub fn resolve_is_leaf(&self) -> bool {
        if let Some(is_leaf) = self.is_leaf {
            return is_leaf;
        }
        if let Some(children) = &self.children {
            return children.is_empty();
        }
        if let Some(total) = self.total_children {
            return total == 0;
        }
        if let Some(has_children) = self.has_children {
            return !has_children;
        }
        false
    }
}

/// The engine's normalized record of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    pub parent_id: Option<NodeId>,
    pub depth: usize,
    pub label: String,
    pub search_text: Option<String>,
    pub data: serde_json::Value,
    /// Loaded children in display order. For paged parents this mirrors the page slots.
    pub children_ids: Vec<NodeId>,
    pub total_children_count: Option<usize>,
    pub is_leaf: bool,
    pub children_loaded: bool,
    pub disabled: bool,
    pub page_size: Option<usize>,
}

impl NodeRecord {
    pub(crate) fn from_input(input: &NodeInput, parent_id: Option<NodeId>, depth: usize) -> Self {
        NodeRecord {
            id: input.id.clone(),
            parent_id,
            depth,
            label: input.label.clone(),
            search_text: input.search_text.clone(),
            data: input.data.clone(),
            children_ids: Vec::new(),
            total_children_count: input.total_children,
            is_leaf: input.resolve_is_leaf(),
            children_loaded: false,
            disabled: input.disabled,
            page_size: input.page_size,
        }
    }

    pub fn parent_key(&self) -> ParentKey {
        ParentKey::from(self.parent_id.clone())
    }

    /// Text the default matcher searches: the adapter's search text, else the label.
    pub fn search_text(&self) -> &str {
        self.search_text.as_deref().unwrap_or(&self.label)
    }
}

/// One hop of a resolved path from a root down to a navigation target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathStep {
    pub node_id: NodeId,
    /// Page of the step's parent that holds this node, when the adapter knows it.
    pub page_hint: Option<usize>,
}

impl PathStep {
    pub fn new(node_id: impl Into<NodeId>) -> Self {
        PathStep {
            node_id: node_id.into(),
            page_hint: None,
        }
    }

    pub fn with_page_hint(mut self, page: usize) -> Self {
        self.page_hint = Some(page);
        self
    }
}
