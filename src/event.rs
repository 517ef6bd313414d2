use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::{
    filter::FilterQuery,
    node::{NodeId, NodeInput, ParentKey, PathStep},
    paging::{Epoch, RequestId},
};

/// How the root level is populated at INIT.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RootInit {
    /// Roots supplied inline, with any inline children.
    Static(Vec<NodeInput>),
    /// Roots fetched with a single `LoadChildren(Root)`.
    Lazy,
    /// Roots fetched page by page. `page_size` defaults to the configured page size.
    Paged {
        page_size: Option<usize>,
        total_count: Option<usize>,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectIntent {
    #[default]
    Replace,
    Toggle,
    /// Select the rows between the anchor and the target.
    Range,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NavKey {
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    Home,
    End,
    PageUp { page_size: usize },
    PageDown { page_size: usize },
    Enter,
    Space,
}

/// Everything that can change engine state.
///
/// Load completions carry the request id and epoch of the command they answer; a completion
/// whose request is no longer registered is discarded without effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeEvent {
    Init {
        roots: RootInit,
    },
    ToggleExpand {
        node_id: NodeId,
    },
    Expand {
        node_id: NodeId,
    },
    Collapse {
        node_id: NodeId,
    },
    Select {
        node_id: NodeId,
        intent: SelectIntent,
    },
    SelectAll,
    DeselectAll,
    SetFilter {
        query: FilterQuery,
    },
    ClearFilter,
    /// Rows `[start, end]` are on screen; `overscan` rows either side are worth loading.
    ViewportRangeChanged {
        start: usize,
        end: usize,
        overscan: usize,
    },
    NavigateToNode {
        target_id: NodeId,
    },
    CancelNavigation,
    Key(NavKey),
    /// Typeahead input. `at_ms` is the host's timestamp for the key press.
    KeyChar {
        ch: char,
        at_ms: u64,
    },
    FocusNode {
        node_id: NodeId,
    },
    ChildrenLoaded {
        request_id: RequestId,
        epoch: Epoch,
        parent: ParentKey,
        items: Vec<NodeInput>,
    },
    PageLoaded {
        request_id: RequestId,
        epoch: Epoch,
        parent_id: NodeId,
        page_index: usize,
        items: Vec<NodeInput>,
        total_count: usize,
    },
    RootPageLoaded {
        request_id: RequestId,
        epoch: Epoch,
        page_index: usize,
        items: Vec<NodeInput>,
        total_count: usize,
    },
    LoadFailed {
        request_id: RequestId,
        epoch: Epoch,
        reason: String,
        timestamp_ms: u64,
    },
    PathResolved {
        request_id: RequestId,
        epoch: Epoch,
        steps: Vec<PathStep>,
    },
    PathResolutionFailed {
        request_id: RequestId,
        epoch: Epoch,
        reason: String,
        timestamp_ms: u64,
    },
    RetryFailedPage {
        parent: ParentKey,
        page_index: usize,
    },
    /// Invalidate the subtree below `node_id`, or everything when `None`.
    Refresh {
        node_id: Option<NodeId>,
    },
}

impl TreeEvent {
    /// Request id and epoch of a load completion.
    pub fn completion(&self) -> Option<(RequestId, Epoch)> {
        match self {
            TreeEvent::ChildrenLoaded {
                request_id, epoch, ..
            }
            | TreeEvent::PageLoaded {
                request_id, epoch, ..
            }
            | TreeEvent::RootPageLoaded {
                request_id, epoch, ..
            }
            | TreeEvent::LoadFailed {
                request_id, epoch, ..
            }
            | TreeEvent::PathResolved {
                request_id, epoch, ..
            }
            | TreeEvent::PathResolutionFailed {
                request_id, epoch, ..
            } => Some((*request_id, *epoch)),
            _ => None,
        }
    }
}

impl Display for TreeEvent {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            TreeEvent::Init { .. } => write!(f, "Init"),
            TreeEvent::ToggleExpand { node_id } => write!(f, "ToggleExpand({node_id})"),
            TreeEvent::Expand { node_id } => write!(f, "Expand({node_id})"),
            TreeEvent::Collapse { node_id } => write!(f, "Collapse({node_id})"),
            TreeEvent::Select { node_id, intent } => write!(f, "Select({node_id}, {intent:?})"),
            TreeEvent::SelectAll => write!(f, "SelectAll"),
            TreeEvent::DeselectAll => write!(f, "DeselectAll"),
            TreeEvent::SetFilter { query } => write!(f, "SetFilter({:?})", query.text),
            TreeEvent::ClearFilter => write!(f, "ClearFilter"),
            TreeEvent::ViewportRangeChanged {
                start,
                end,
                overscan,
            } => write!(f, "ViewportRangeChanged({start}..={end} +{overscan})"),
            TreeEvent::NavigateToNode { target_id } => write!(f, "NavigateToNode({target_id})"),
            TreeEvent::CancelNavigation => write!(f, "CancelNavigation"),
            TreeEvent::Key(key) => write!(f, "Key({key:?})"),
            TreeEvent::KeyChar { ch, .. } => write!(f, "KeyChar({ch:?})"),
            TreeEvent::FocusNode { node_id } => write!(f, "FocusNode({node_id})"),
            TreeEvent::ChildrenLoaded {
                request_id,
                parent,
                items,
                ..
            } => write!(f, "ChildrenLoaded({request_id}, {parent}, {} items)", items.len()),
            TreeEvent::PageLoaded {
                request_id,
                parent_id,
                page_index,
                ..
            } => write!(f, "PageLoaded({request_id}, {parent_id}, page {page_index})"),
            TreeEvent::RootPageLoaded {
                request_id,
                page_index,
                ..
            } => write!(f, "RootPageLoaded({request_id}, page {page_index})"),
            TreeEvent::LoadFailed { request_id, .. } => write!(f, "LoadFailed({request_id})"),
            TreeEvent::PathResolved { request_id, .. } => write!(f, "PathResolved({request_id})"),
            TreeEvent::PathResolutionFailed { request_id, .. } => {
                write!(f, "PathResolutionFailed({request_id})")
            }
            TreeEvent::RetryFailedPage { parent, page_index } => {
                write!(f, "RetryFailedPage({parent}, page {page_index})")
            }
            TreeEvent::Refresh { node_id } => match node_id {
                Some(id) => write!(f, "Refresh({id})"),
                None => write!(f, "Refresh(all)"),
            },
        }
    }
}
