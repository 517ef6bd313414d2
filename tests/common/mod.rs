//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use parking_lot::Mutex;
use sylva_core::{
    commands::TreeCommand,
    error::SylvaError,
    host::{ChildrenPage, TreeAdapter},
    node::{NodeId, NodeInput, ParentKey, PathStep},
    paging::{Epoch, RequestId},
};

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; later calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// An adapter over a synthetic two-level tree: `folders` roots named `f<i>`, each holding
/// `files` leaves named `f<i>/<j>`.
///
/// Pages listed in `fail_once` fail on their first request only. With `jitter` set, loads
/// sleep for a few milliseconds derived from their arguments, so completions arrive out of
/// request order.
#[allow(dead_code)]
pub struct MemoryAdapter {
    children: BTreeMap<ParentKey, Vec<NodeInput>>,
    parents: BTreeMap<NodeId, (ParentKey, usize)>,
    page_size: usize,
    fail_once: Mutex<BTreeSet<(ParentKey, usize)>>,
    jitter: bool,
    pub calls: AtomicUsize,
}

#[allow(dead_code)]
impl MemoryAdapter {
    pub fn new(folders: usize, files: usize, page_size: usize) -> Self {
        let mut children = BTreeMap::new();
        let mut parents = BTreeMap::new();
        let roots = (0..folders)
            .map(|i| {
                let folder = NodeId::new(format!("f{i}"));
                parents.insert(folder.clone(), (ParentKey::Root, i));
                let leaves = (0..files)
                    .map(|j| {
                        let file = NodeId::new(format!("f{i}/{j}"));
                        parents.insert(file.clone(), (ParentKey::Node(folder.clone()), j));
                        NodeInput::leaf(file, format!("File {i}.{j}"))
                    })
                    .collect();
                children.insert(ParentKey::Node(folder.clone()), leaves);
                NodeInput::new(folder, format!("Folder {i}")).with_total_children(files)
            })
            .collect();
        children.insert(ParentKey::Root, roots);
        MemoryAdapter {
            children,
            parents,
            page_size,
            fail_once: Mutex::new(BTreeSet::new()),
            jitter: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    pub fn fail_once(self, parent: ParentKey, page_index: usize) -> Self {
        self.fail_once.lock().insert((parent, page_index));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn pause(&self, parent: &ParentKey, page_index: usize) {
        if self.jitter {
            let millis = (parent.to_string().len() * 3 + page_index * 7) % 5;
            tokio::time::sleep(Duration::from_millis(millis as u64)).await;
        }
    }

    fn listing(&self, parent: &ParentKey) -> Result<&Vec<NodeInput>, SylvaError> {
        self.children
            .get(parent)
            .ok_or_else(|| SylvaError::NotFound(format!("no children for {parent}")))
    }
}

impl TreeAdapter for MemoryAdapter {
    async fn load_children(&self, parent: ParentKey) -> Result<ChildrenPage, SylvaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.pause(&parent, 0).await;
        let items = self.listing(&parent)?.clone();
        Ok(ChildrenPage {
            total_count: Some(items.len()),
            items,
        })
    }

    async fn load_page(
        &self,
        parent: ParentKey,
        page_index: usize,
        page_size: usize,
    ) -> Result<ChildrenPage, SylvaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.pause(&parent, page_index).await;
        if self.fail_once.lock().remove(&(parent.clone(), page_index)) {
            return Err(SylvaError::Adapter(format!(
                "injected failure for page {page_index} of {parent}"
            )));
        }
        let listing = self.listing(&parent)?;
        let start = (page_index * page_size).min(listing.len());
        let end = (start + page_size).min(listing.len());
        Ok(ChildrenPage {
            items: listing[start..end].to_vec(),
            total_count: Some(listing.len()),
        })
    }

    async fn resolve_path(&self, target: NodeId) -> Result<Vec<PathStep>, SylvaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut steps = Vec::new();
        let mut current = Some(target.clone());
        while let Some(id) = current {
            let (parent, slot) = self
                .parents
                .get(&id)
                .cloned()
                .ok_or_else(|| SylvaError::NotFound(format!("unknown node {target}")))?;
            steps.push(PathStep::new(id).with_page_hint(slot / self.page_size));
            current = parent.node_id().cloned();
        }
        steps.reverse();
        Ok(steps)
    }
}

/// `(request_id, epoch, parent, page)` of every page load in `commands`.
#[allow(dead_code)]
pub fn page_loads(commands: &[TreeCommand]) -> Vec<(RequestId, Epoch, ParentKey, usize)> {
    commands
        .iter()
        .filter_map(|command| {
            let (parent, page) = command.page_key()?;
            let request_id = command.request_id()?;
            let epoch = match command {
                TreeCommand::LoadPage { epoch, .. } | TreeCommand::LoadRootPage { epoch, .. } => *epoch,
                _ => return None,
            };
            Some((request_id, epoch, parent, page))
        })
        .collect()
}

/// Leaves `<prefix>-<n>` for `range`.
#[allow(dead_code)]
pub fn leaves(prefix: &str, range: std::ops::Range<usize>) -> Vec<NodeInput> {
    range
        .map(|n| NodeInput::leaf(format!("{prefix}-{n}"), format!("{prefix} item {n}")))
        .collect()
}
