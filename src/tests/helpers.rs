//! Shared test utilities for engine testing

use crate::{
    commands::TreeCommand,
    config::TreeConfig,
    engine::TreeEngine,
    event::{RootInit, TreeEvent},
    node::{NodeId, NodeInput, ParentKey},
    paging::{Epoch, RequestId},
};

/// Initialize logging for tests
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

pub fn id(name: &str) -> NodeId {
    NodeId::new(name)
}

/// Engine initialized with static roots.
pub fn engine_with(config: TreeConfig, roots: Vec<NodeInput>) -> TreeEngine {
    init_logging();
    let mut engine = TreeEngine::new(config).expect("valid config");
    engine.dispatch(TreeEvent::Init {
        roots: RootInit::Static(roots),
    });
    engine
}

/// Leaf items `<prefix>-<n>` for slots `start..end`.
pub fn leaves(prefix: &str, range: std::ops::Range<usize>) -> Vec<NodeInput> {
    range
        .map(|n| NodeInput::leaf(format!("{prefix}-{n}"), format!("{prefix} item {n}")))
        .collect()
}

/// A static tree:
///
/// ```text
/// docs
///   guides
///     intro
///     setup
///   api
/// media (collapsed)
///   photo
/// ```
pub fn sample_tree() -> Vec<NodeInput> {
    vec![
        NodeInput::new("docs", "Docs").expanded().with_children(vec![
            NodeInput::new("guides", "Guides").expanded().with_children(vec![
                NodeInput::leaf("intro", "Introduction"),
                NodeInput::leaf("setup", "Setup"),
            ]),
            NodeInput::leaf("api", "API reference"),
        ]),
        NodeInput::new("media", "Media").with_children(vec![NodeInput::leaf("photo", "Photo")]),
    ]
}

pub fn visible_keys(engine: &TreeEngine) -> Vec<String> {
    let snapshot = engine.snapshot();
    snapshot
        .rows(0..snapshot.total_count())
        .map(|row| row.key.to_string())
        .collect()
}

/// `(request_id, epoch, parent, page)` of every page load in `commands`.
pub fn page_loads(commands: &[TreeCommand]) -> Vec<(RequestId, Epoch, ParentKey, usize)> {
    commands
        .iter()
        .filter_map(|command| match command {
            TreeCommand::LoadPage {
                request_id,
                epoch,
                parent_id,
                page_index,
                ..
            } => Some((*request_id, *epoch, ParentKey::Node(parent_id.clone()), *page_index)),
            TreeCommand::LoadRootPage {
                request_id,
                epoch,
                page_index,
                ..
            } => Some((*request_id, *epoch, ParentKey::Root, *page_index)),
            _ => None,
        })
        .collect()
}

/// `(request_id, epoch, parent)` of every children load in `commands`.
pub fn children_loads(commands: &[TreeCommand]) -> Vec<(RequestId, Epoch, ParentKey)> {
    commands
        .iter()
        .filter_map(|command| match command {
            TreeCommand::LoadChildren {
                request_id,
                epoch,
                parent,
            } => Some((*request_id, *epoch, parent.clone())),
            _ => None,
        })
        .collect()
}

/// Answer a page load for `parent` with leaves named after the parent.
pub fn page_loaded(
    request_id: RequestId,
    epoch: Epoch,
    parent: &ParentKey,
    page_index: usize,
    page_size: usize,
    total: usize,
) -> TreeEvent {
    let start = page_index * page_size;
    let end = (start + page_size).min(total);
    let items = leaves(&parent.to_string(), start..end);
    match parent {
        ParentKey::Root => TreeEvent::RootPageLoaded {
            request_id,
            epoch,
            page_index,
            items,
            total_count: total,
        },
        ParentKey::Node(parent_id) => TreeEvent::PageLoaded {
            request_id,
            epoch,
            parent_id: parent_id.clone(),
            page_index,
            items,
            total_count: total,
        },
    }
}
