use std::{
    collections::{BTreeSet, VecDeque},
    sync::Arc,
};

use enumset::{EnumSet, EnumSetType};
use serde::{Deserialize, Serialize};

use crate::{
    config::TreeConfig,
    error::TreeLoadError,
    filter::{FilterState, NodeMatcher},
    index::{NodeIndex, RootSource},
    navigation::{FocusState, PendingNavigation, Typeahead},
    node::{NodeId, ParentKey},
    paging::{Epoch, Paging},
    projection::{Projection, ProjectionInput},
    selection::SelectionState,
};

/// Recorded load failures kept in state; older entries are dropped first.
pub const ERROR_HISTORY_LIMIT: usize = 64;

/// Derived data a dispatch has invalidated.
#[derive(EnumSetType, Debug)]
pub(crate) enum Dirty {
    /// The known node set changed while a query is active.
    Filter,
    /// The query itself changed.
    Query,
    Projection,
}

/// The last window the host reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub start: usize,
    pub end: usize,
    pub overscan: usize,
}

impl Viewport {
    pub fn contains(&self, index: usize) -> bool {
        (self.start..=self.end).contains(&index)
    }
}

/// Configuration and matcher: the fixed inputs of every transition.
#[derive(Clone)]
pub(crate) struct EngineContext {
    pub config: TreeConfig,
    pub matcher: Arc<dyn NodeMatcher>,
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Complete engine state. Everything the host can observe is derived from this value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TreeState {
    pub(crate) index: NodeIndex,
    pub(crate) expanded: BTreeSet<NodeId>,
    pub(crate) selection: SelectionState,
    pub(crate) filter: FilterState,
    pub(crate) paging: Paging,
    pub(crate) projection: Projection,
    pub(crate) focus: FocusState,
    pub(crate) viewport: Option<Viewport>,
    pub(crate) navigation: Option<PendingNavigation>,
    pub(crate) typeahead: Typeahead,
    pub(crate) errors: VecDeque<TreeLoadError>,
    pub(crate) dirty: EnumSet<Dirty>,
}

impl TreeState {
    pub fn index(&self) -> &NodeIndex {
        &self.index
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn expanded_ids(&self) -> &BTreeSet<NodeId> {
        &self.expanded
    }

    pub fn is_expanded(&self, id: &NodeId) -> bool {
        self.expanded.contains(id)
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn paging(&self) -> &Paging {
        &self.paging
    }

    pub fn epoch(&self) -> Epoch {
        self.paging.epoch()
    }

    pub fn focus(&self) -> &FocusState {
        &self.focus
    }

    pub fn viewport(&self) -> Option<Viewport> {
        self.viewport
    }

    pub fn pending_navigation(&self) -> Option<&PendingNavigation> {
        self.navigation.as_ref()
    }

    pub fn can_navigate(&self) -> bool {
        self.navigation.is_none()
    }

    pub fn errors(&self) -> impl Iterator<Item = &TreeLoadError> {
        self.errors.iter()
    }

    pub fn root_source(&self) -> RootSource {
        self.index.root_source()
    }

    pub(crate) fn record_error(&mut self, error: TreeLoadError) {
        tracing::warn!("{}", error);
        if self.errors.len() == ERROR_HISTORY_LIMIT {
            self.errors.pop_front();
        }
        self.errors.push_back(error);
    }

    /// Whether `parent`'s children are currently being fetched.
    pub fn is_loading(&self, parent: &ParentKey) -> bool {
        if self.paging.is_loading_children(parent) {
            return true;
        }
        self.paging.page_state(parent).is_some_and(|page_state| {
            page_state.total_count.is_none() && !page_state.loading_pages.is_empty()
        })
    }

    pub(crate) fn projection_input<'a>(&'a self, config: &TreeConfig) -> ProjectionInput<'a> {
        ProjectionInput {
            index: &self.index,
            expanded: &self.expanded,
            pages: self.paging.pages(),
            filter: &self.filter,
            display: config.filtering.mode,
            show_parents_of_matches: config.filtering.show_parents_of_matches,
        }
    }

    pub(crate) fn rebuild_projection(&mut self, config: &TreeConfig) {
        self.projection = Projection::build(&self.projection_input(config));
    }
}
