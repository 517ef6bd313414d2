use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::{
    error::TreeLoadError,
    node::{NodeId, ParentKey},
    paging::{Epoch, RequestId},
};

/// How a pinned navigation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NavigationOutcome {
    /// The target is visible and focused at `index`.
    Succeeded { index: usize },
    Failed { reason: String },
    Cancelled,
    /// Another navigation was still pending.
    Busy,
}

/// Work the engine asks its host to perform. Loads are answered with completion events carrying
/// the same request id and epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeCommand {
    LoadChildren {
        request_id: RequestId,
        epoch: Epoch,
        parent: ParentKey,
    },
    LoadPage {
        request_id: RequestId,
        epoch: Epoch,
        parent_id: NodeId,
        page_index: usize,
        page_size: usize,
    },
    LoadRootPage {
        request_id: RequestId,
        epoch: Epoch,
        page_index: usize,
        page_size: usize,
    },
    ResolvePath {
        request_id: RequestId,
        epoch: Epoch,
        target_id: NodeId,
    },
    ScrollToIndex {
        index: usize,
        offset_px: f64,
    },
    /// The complete selected set after a change.
    EmitSelectionChange {
        selected: Vec<NodeId>,
    },
    EmitLoadError {
        error: TreeLoadError,
    },
    EmitNavigationResult {
        target_id: NodeId,
        outcome: NavigationOutcome,
    },
}

impl TreeCommand {
    pub fn is_load(&self) -> bool {
        matches!(
            self,
            TreeCommand::LoadChildren { .. }
                | TreeCommand::LoadPage { .. }
                | TreeCommand::LoadRootPage { .. }
                | TreeCommand::ResolvePath { .. }
        )
    }

    /// `(parent, page)` of a page load.
    pub fn page_key(&self) -> Option<(ParentKey, usize)> {
        match self {
            TreeCommand::LoadPage {
                parent_id,
                page_index,
                ..
            } => Some((ParentKey::Node(parent_id.clone()), *page_index)),
            TreeCommand::LoadRootPage { page_index, .. } => Some((ParentKey::Root, *page_index)),
            _ => None,
        }
    }

    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            TreeCommand::LoadChildren { request_id, .. }
            | TreeCommand::LoadPage { request_id, .. }
            | TreeCommand::LoadRootPage { request_id, .. }
            | TreeCommand::ResolvePath { request_id, .. } => Some(*request_id),
            _ => None,
        }
    }
}

impl Display for TreeCommand {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            TreeCommand::LoadChildren {
                request_id, parent, ..
            } => write!(f, "LoadChildren({request_id}, {parent})"),
            TreeCommand::LoadPage {
                request_id,
                parent_id,
                page_index,
                ..
            } => write!(f, "LoadPage({request_id}, {parent_id}, page {page_index})"),
            TreeCommand::LoadRootPage {
                request_id,
                page_index,
                ..
            } => write!(f, "LoadRootPage({request_id}, page {page_index})"),
            TreeCommand::ResolvePath {
                request_id,
                target_id,
                ..
            } => write!(f, "ResolvePath({request_id}, {target_id})"),
            TreeCommand::ScrollToIndex { index, .. } => write!(f, "ScrollToIndex({index})"),
            TreeCommand::EmitSelectionChange { selected } => {
                write!(f, "EmitSelectionChange({} selected)", selected.len())
            }
            TreeCommand::EmitLoadError { error } => write!(f, "EmitLoadError({error})"),
            TreeCommand::EmitNavigationResult { target_id, outcome } => {
                write!(f, "EmitNavigationResult({target_id}: {outcome:?})")
            }
        }
    }
}
