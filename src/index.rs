//! Normalized node index: the arena every other module reads from.
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::node::{NodeId, NodeInput, NodeRecord, ParentKey};

/// Where the root level comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RootSource {
    /// Roots were supplied inline at INIT.
    #[default]
    Static,
    /// Roots are fetched with one `LoadChildren(Root)` request.
    Lazy,
    /// Roots are fetched page by page.
    Paged,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeIndex {
    nodes: BTreeMap<NodeId, NodeRecord>,
    root_ids: Vec<NodeId>,
    root_source: RootSource,
    roots_loaded: bool,
}

impl NodeIndex {
    pub fn new(root_source: RootSource) -> Self {
        NodeIndex {
            root_source,
            roots_loaded: root_source == RootSource::Static,
            ..Default::default()
        }
    }

    pub fn get(&self, id: &NodeId) -> Option<&NodeRecord> {
        self.nodes.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &NodeId) -> Option<&mut NodeRecord> {
        self.nodes.get_mut(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &BTreeMap<NodeId, NodeRecord> {
        &self.nodes
    }

    pub fn root_ids(&self) -> &[NodeId] {
        &self.root_ids
    }

    pub fn root_source(&self) -> RootSource {
        self.root_source
    }

    pub fn roots_loaded(&self) -> bool {
        self.roots_loaded
    }

    /// Loaded children of a parent in display order.
    pub fn children_of(&self, parent: &ParentKey) -> &[NodeId] {
        match parent {
            ParentKey::Root => &self.root_ids,
            ParentKey::Node(id) => self
                .nodes
                .get(id)
                .map(|node| node.children_ids.as_slice())
                .unwrap_or(&[]),
        }
    }

    /// Whether the children of `parent` are completely known.
    pub fn children_loaded(&self, parent: &ParentKey) -> bool {
        match parent {
            ParentKey::Root => self.roots_loaded,
            ParentKey::Node(id) => self
                .nodes
                .get(id)
                .map(|node| node.children_loaded)
                .unwrap_or(false),
        }
    }

    pub fn depth_below(&self, parent: &ParentKey) -> usize {
        match parent {
            ParentKey::Root => 0,
            ParentKey::Node(id) => self.nodes.get(id).map(|n| n.depth + 1).unwrap_or(0),
        }
    }

    /// Ancestor ids of `id`, nearest first.
    pub fn ancestors(&self, id: &NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut current = self.nodes.get(id).and_then(|n| n.parent_id.clone());
        while let Some(parent_id) = current {
            current = self.nodes.get(&parent_id).and_then(|n| n.parent_id.clone());
            chain.push(parent_id);
        }
        chain
    }

    pub fn is_descendant_of(&self, id: &NodeId, ancestor: &NodeId) -> bool {
        let mut current = self.nodes.get(id).and_then(|n| n.parent_id.clone());
        while let Some(parent_id) = current {
            if &parent_id == ancestor {
                return true;
            }
            current = self.nodes.get(&parent_id).and_then(|n| n.parent_id.clone());
        }
        false
    }

    /// Insert (or refresh) one node and any inline children below it.
    ///
    /// An existing record keeps its loaded children and expansion-relevant state; only the
    /// adapter-facing fields are replaced. Returns the ids of every node that initially asks to
    /// be expanded.
    pub(crate) fn upsert(
        &mut self,
        input: &NodeInput,
        parent: &ParentKey,
        wants_expanded: &mut Vec<NodeId>,
    ) -> NodeId {
        let depth = self.depth_below(parent);
        let parent_id = parent.node_id().cloned();
        let old_depth = self.nodes.get(&input.id).map(|n| n.depth);
        if let Some(existing_parent) = self.nodes.get(&input.id).map(|n| n.parent_key()) {
            if &existing_parent != parent {
                tracing::debug!(
                    "Node {} moved from {} to {}; detaching from old parent",
                    input.id,
                    existing_parent,
                    parent
                );
                self.detach_from_parent(&input.id, &existing_parent);
            }
        }

        let record = match self.nodes.remove(&input.id) {
            Some(mut existing) => {
                existing.parent_id = parent_id;
                existing.depth = depth;
                existing.label = input.label.clone();
                existing.search_text = input.search_text.clone();
                existing.data = input.data.clone();
                existing.disabled = input.disabled;
                if input.page_size.is_some() {
                    existing.page_size = input.page_size;
                }
                if !existing.children_loaded {
                    existing.total_children_count = input.total_children;
                    existing.is_leaf = input.resolve_is_leaf();
                }
                existing
            }
            None => {
                if input.expanded {
                    wants_expanded.push(input.id.clone());
                }
                NodeRecord::from_input(input, parent_id, depth)
            }
        };
        let id = record.id.clone();
        self.nodes.insert(id.clone(), record);

        if let Some(children) = &input.children {
            let key = ParentKey::Node(id.clone());
            let child_ids = children
                .iter()
                .map(|child| self.upsert(child, &key, wants_expanded))
                .collect::<Vec<_>>();
            self.set_children(&key, child_ids);
        }
        if old_depth.is_some_and(|old| old != depth) {
            self.redepth_subtree(&id);
        }
        id
    }

    fn redepth_subtree(&mut self, id: &NodeId) {
        let mut stack = vec![id.clone()];
        while let Some(current) = stack.pop() {
            let Some(depth) = self.nodes.get(&current).map(|n| n.depth) else {
                continue;
            };
            let children = self.children_of(&ParentKey::Node(current)).to_vec();
            for child in children {
                if let Some(record) = self.nodes.get_mut(&child) {
                    record.depth = depth + 1;
                }
                stack.push(child);
            }
        }
    }

    fn detach_from_parent(&mut self, id: &NodeId, parent: &ParentKey) {
        match parent {
            ParentKey::Root => self.root_ids.retain(|r| r != id),
            ParentKey::Node(parent_id) => {
                if let Some(node) = self.nodes.get_mut(parent_id) {
                    node.children_ids.retain(|c| c != id);
                }
            }
        }
    }

    /// Replace the complete child list of `parent` and mark it loaded.
    pub(crate) fn set_children(&mut self, parent: &ParentKey, child_ids: Vec<NodeId>) {
        match parent {
            ParentKey::Root => {
                self.root_ids = child_ids;
                self.roots_loaded = true;
            }
            ParentKey::Node(id) => {
                if let Some(node) = self.nodes.get_mut(id) {
                    node.total_children_count = Some(child_ids.len());
                    node.children_loaded = true;
                    node.is_leaf = child_ids.is_empty();
                    node.children_ids = child_ids;
                }
            }
        }
    }

    /// Replace the loaded children of a paged parent without claiming it is complete.
    pub(crate) fn set_paged_children(
        &mut self,
        parent: &ParentKey,
        child_ids: Vec<NodeId>,
        total: usize,
    ) {
        match parent {
            ParentKey::Root => {
                self.root_ids = child_ids;
                self.roots_loaded = total == self.root_ids.len();
            }
            ParentKey::Node(id) => {
                if let Some(node) = self.nodes.get_mut(id) {
                    node.total_children_count = Some(total);
                    node.children_loaded = total == child_ids.len();
                    node.is_leaf = total == 0;
                    node.children_ids = child_ids;
                }
            }
        }
    }

    /// Detach `id` from its parent and remove it with all of its descendants.
    pub(crate) fn remove_subtree(&mut self, id: &NodeId) -> BTreeSet<NodeId> {
        let Some(parent) = self.nodes.get(id).map(|node| node.parent_key()) else {
            return BTreeSet::new();
        };
        self.detach_from_parent(id, &parent);
        let mut removed = BTreeSet::new();
        let mut stack = vec![id.clone()];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(&current) {
                stack.extend(node.children_ids);
                removed.insert(current);
            }
        }
        removed
    }

    /// Remove every descendant of `parent` and reset it to "children unknown".
    ///
    /// Returns the removed ids.
    pub(crate) fn clear_children(&mut self, parent: &ParentKey) -> BTreeSet<NodeId> {
        let mut removed = BTreeSet::new();
        let mut stack = self.children_of(parent).to_vec();
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.remove(&id) {
                stack.extend(node.children_ids);
                removed.insert(id);
            }
        }
        match parent {
            ParentKey::Root => {
                self.root_ids.clear();
                self.roots_loaded = false;
            }
            ParentKey::Node(id) => {
                if let Some(node) = self.nodes.get_mut(id) {
                    node.children_ids.clear();
                    node.children_loaded = false;
                }
            }
        }
        removed
    }
}
