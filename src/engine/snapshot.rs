use std::{collections::BTreeSet, ops::Range};

use crate::{
    config::TreeConfig,
    engine::state::{TreeState, Viewport},
    error::TreeLoadError,
    filter::FilterQuery,
    navigation::PendingNavigation,
    node::{NodeId, NodeRecord, ParentKey, RowKey},
    paging::{Epoch, PageState},
    projection::RowRef,
};

/// One projected row, valid for the lifetime of the snapshot it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedRow<'a> {
    pub key: RowKey,
    pub node_id: Option<&'a NodeId>,
    pub flat_index: usize,
    pub depth: usize,
    pub label: Option<&'a str>,
    pub data: Option<&'a serde_json::Value>,
    pub is_expanded: bool,
    pub is_selected: bool,
    pub is_leaf: bool,
    pub is_loading: bool,
    pub is_placeholder: bool,
    pub is_failed: bool,
    pub is_disabled: bool,
    pub is_matched_by_filter: bool,
    pub is_focused: bool,
}

/// Read-only selectors over engine state.
#[derive(Clone, Copy)]
pub struct TreeSnapshot<'a> {
    state: &'a TreeState,
    config: &'a TreeConfig,
}

impl<'a> TreeSnapshot<'a> {
    pub(crate) fn new(state: &'a TreeState, config: &'a TreeConfig) -> Self {
        TreeSnapshot { state, config }
    }

    pub fn state(&self) -> &'a TreeState {
        self.state
    }

    pub fn total_count(&self) -> usize {
        self.state.projection.total()
    }

    pub fn row_key_at(&self, index: usize) -> Option<RowKey> {
        self.state.projection.key_at(index)
    }

    pub fn index_of(&self, node_id: &NodeId) -> Option<usize> {
        self.state.projection.index_of(&RowKey::Node(node_id.clone()))
    }

    pub fn row_at(&self, index: usize) -> Option<ProjectedRow<'a>> {
        let row = self.state.projection.locate(index)?;
        Some(self.project(index, row))
    }

    /// Rows in `range`, clamped to the projection.
    pub fn rows(&self, range: Range<usize>) -> impl Iterator<Item = ProjectedRow<'a>> + 'a {
        let snapshot = *self;
        let end = range.end.min(self.total_count());
        (range.start.min(end)..end).filter_map(move |index| snapshot.row_at(index))
    }

    fn project(&self, flat_index: usize, row: RowRef<'a>) -> ProjectedRow<'a> {
        let state = self.state;
        let is_focused = state.focus.index() == Some(flat_index);
        match row {
            RowRef::Node { id, depth } => {
                let node = state.index.get(id);
                let key = ParentKey::Node(id.clone());
                let is_expanded = state.expanded.contains(id);
                let failed_first_page = state
                    .paging
                    .page_state(&key)
                    .is_some_and(|page_state| {
                        page_state.total_count.is_none() && page_state.is_page_failed(0)
                    });
                ProjectedRow {
                    key: RowKey::Node(id.clone()),
                    node_id: Some(id),
                    flat_index,
                    depth,
                    label: node.map(|node| node.label.as_str()),
                    data: node.map(|node| &node.data),
                    is_expanded,
                    is_selected: state.selection.is_selected(id),
                    is_leaf: node.is_some_and(|node| node.is_leaf),
                    is_loading: is_expanded && state.is_loading(&key),
                    is_placeholder: false,
                    is_failed: state.paging.children_failed(&key) || failed_first_page,
                    is_disabled: node.is_some_and(|node| node.disabled),
                    is_matched_by_filter: state.filter.is_match(id),
                    is_focused,
                }
            }
            RowRef::Placeholder {
                parent,
                slot,
                depth,
                ..
            } => {
                let page_state = state.paging.page_state(parent);
                let page = page_state.map(|page_state| page_state.page_of(slot));
                let flag = |check: fn(&PageState, usize) -> bool| {
                    page_state
                        .zip(page)
                        .is_some_and(|(page_state, page)| check(page_state, page))
                };
                ProjectedRow {
                    key: RowKey::Placeholder {
                        parent: parent.clone(),
                        slot,
                    },
                    node_id: None,
                    flat_index,
                    depth,
                    label: None,
                    data: None,
                    is_expanded: false,
                    is_selected: false,
                    is_leaf: true,
                    is_loading: flag(PageState::is_page_loading),
                    is_placeholder: true,
                    is_failed: flag(PageState::is_page_failed),
                    is_disabled: true,
                    is_matched_by_filter: false,
                    is_focused,
                }
            }
        }
    }

    pub fn node(&self, id: &NodeId) -> Option<&'a NodeRecord> {
        self.state.index.get(id)
    }

    pub fn focus_index(&self) -> Option<usize> {
        self.state.focus.index()
    }

    pub fn focused_key(&self) -> Option<&'a RowKey> {
        self.state.focus.key()
    }

    pub fn selected_ids(&self) -> &'a BTreeSet<NodeId> {
        self.state.selection.selected_ids()
    }

    pub fn expanded_ids(&self) -> &'a BTreeSet<NodeId> {
        &self.state.expanded
    }

    pub fn is_expanded(&self, id: &NodeId) -> bool {
        self.state.expanded.contains(id)
    }

    pub fn filter_query(&self) -> Option<&'a FilterQuery> {
        self.state.filter.query()
    }

    pub fn matched_ids(&self) -> &'a BTreeSet<NodeId> {
        self.state.filter.matched_ids()
    }

    pub fn page_state(&self, parent: &ParentKey) -> Option<&'a PageState> {
        self.state.paging.page_state(parent)
    }

    pub fn epoch(&self) -> Epoch {
        self.state.paging.epoch()
    }

    pub fn errors(&self) -> impl Iterator<Item = &'a TreeLoadError> {
        self.state.errors.iter()
    }

    pub fn pending_navigation(&self) -> Option<&'a PendingNavigation> {
        self.state.navigation.as_ref()
    }

    pub fn can_navigate(&self) -> bool {
        self.state.can_navigate()
    }

    pub fn viewport(&self) -> Option<Viewport> {
        self.state.viewport
    }

    /// Whether the host should render through a virtualized window.
    pub fn is_virtualized(&self) -> bool {
        self.config.virtualization.is_virtualized(self.total_count())
    }

    /// Pixel offset of a row under the fixed row height.
    pub fn offset_of(&self, index: usize) -> f64 {
        index as f64 * self.config.virtualization.item_size
    }

    pub fn total_height(&self) -> f64 {
        self.offset_of(self.total_count())
    }
}
