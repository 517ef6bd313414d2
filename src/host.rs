//! A tokio driver that executes engine commands against an async adapter.
//!
//! The engine itself never awaits anything. [`TreeHost`] owns an engine, runs its load
//! commands concurrently (bounded by a semaphore), and dispatches each completion back into the
//! engine as soon as it arrives, in whatever order that is. Scroll and emit commands are
//! forwarded to a channel as [`HostNotification`]s.
use std::{
    future::Future,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use tokio::{
    sync::{
        mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
        Semaphore,
    },
    task::JoinSet,
};

use crate::{
    commands::{NavigationOutcome, TreeCommand},
    engine::TreeEngine,
    error::{SylvaError, TreeLoadError},
    event::TreeEvent,
    node::{NodeId, NodeInput, ParentKey, PathStep},
    paging::{Epoch, RequestId},
};

pub const DEFAULT_MAX_CONCURRENT_LOADS: usize = 6;

/// Children returned by an adapter. `total_count` is required for paged loads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChildrenPage {
    pub items: Vec<NodeInput>,
    pub total_count: Option<usize>,
}

/// The data source behind a tree.
pub trait TreeAdapter: Send + Sync + 'static {
    fn load_children(
        &self,
        parent: ParentKey,
    ) -> impl Future<Output = Result<ChildrenPage, SylvaError>> + Send;

    fn load_page(
        &self,
        parent: ParentKey,
        page_index: usize,
        page_size: usize,
    ) -> impl Future<Output = Result<ChildrenPage, SylvaError>> + Send;

    /// Path from a root down to `target`, target included.
    fn resolve_path(
        &self,
        target: NodeId,
    ) -> impl Future<Output = Result<Vec<PathStep>, SylvaError>> + Send {
        async move {
            Err(SylvaError::NotFound(format!(
                "path resolution is not supported for {target}"
            )))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HostNotification {
    ScrollToIndex { index: usize, offset_px: f64 },
    SelectionChanged(Vec<NodeId>),
    LoadError(TreeLoadError),
    NavigationResult {
        target_id: NodeId,
        outcome: NavigationOutcome,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostOptions {
    pub max_concurrent_loads: usize,
}

impl Default for HostOptions {
    fn default() -> Self {
        HostOptions {
            max_concurrent_loads: DEFAULT_MAX_CONCURRENT_LOADS,
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(millis)
        .unwrap_or(0)
}

/// Whole milliseconds, saturating at `u64::MAX`.
fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

pub struct TreeHost<A: TreeAdapter> {
    engine: TreeEngine,
    adapter: Arc<A>,
    limiter: Arc<Semaphore>,
    tasks: JoinSet<Option<TreeEvent>>,
    notifications: UnboundedSender<HostNotification>,
}

impl<A: TreeAdapter> TreeHost<A> {
    pub fn new(
        engine: TreeEngine,
        adapter: Arc<A>,
        options: HostOptions,
    ) -> (TreeHost<A>, UnboundedReceiver<HostNotification>) {
        let (tx, rx) = unbounded_channel();
        let host = TreeHost {
            engine,
            adapter,
            limiter: Arc::new(Semaphore::new(options.max_concurrent_loads.max(1))),
            tasks: JoinSet::new(),
            notifications: tx,
        };
        (host, rx)
    }

    pub fn engine(&self) -> &TreeEngine {
        &self.engine
    }

    pub fn into_engine(self) -> TreeEngine {
        self.engine
    }

    /// Loads currently running or queued behind the concurrency limit.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Dispatch an event and start executing the commands it produced.
    ///
    /// Must be called from within a tokio runtime.
    pub fn dispatch(&mut self, event: TreeEvent) {
        let commands = self.engine.dispatch(event);
        self.execute(commands);
    }

    fn execute(&mut self, commands: Vec<TreeCommand>) {
        for command in commands {
            let notification = match command {
                TreeCommand::ScrollToIndex { index, offset_px } => {
                    HostNotification::ScrollToIndex { index, offset_px }
                }
                TreeCommand::EmitSelectionChange { selected } => {
                    HostNotification::SelectionChanged(selected)
                }
                TreeCommand::EmitLoadError { error } => HostNotification::LoadError(error),
                TreeCommand::EmitNavigationResult { target_id, outcome } => {
                    HostNotification::NavigationResult { target_id, outcome }
                }
                load => {
                    self.spawn_load(load);
                    continue;
                }
            };
            // A dropped receiver means nobody is listening; the engine does not care.
            let _ = self.notifications.send(notification);
        }
    }

    fn spawn_load(&mut self, command: TreeCommand) {
        tracing::debug!("Spawning {}", command);
        let adapter = self.adapter.clone();
        let limiter = self.limiter.clone();
        self.tasks.spawn(async move {
            let _permit = limiter.acquire_owned().await.ok();
            run_load(adapter.as_ref(), command).await
        });
    }

    /// Wait for one load to finish and dispatch its completion. Returns `Ok(false)` when
    /// nothing was in flight.
    pub async fn next_completion(&mut self) -> Result<bool, SylvaError> {
        let Some(joined) = self.tasks.join_next().await else {
            return Ok(false);
        };
        let event = joined.map_err(|e| SylvaError::Adapter(format!("load task failed: {e}")))?;
        if let Some(event) = event {
            self.dispatch(event);
        }
        Ok(true)
    }

    /// Drive loads until none are left, including the ones that completions trigger.
    pub async fn settle(&mut self) -> Result<(), SylvaError> {
        while self.next_completion().await? {}
        Ok(())
    }
}

async fn run_load<A: TreeAdapter>(adapter: &A, command: TreeCommand) -> Option<TreeEvent> {
    let event = match command {
        TreeCommand::LoadChildren {
            request_id,
            epoch,
            parent,
        } => match adapter.load_children(parent.clone()).await {
            Ok(page) => TreeEvent::ChildrenLoaded {
                request_id,
                epoch,
                parent,
                items: page.items,
            },
            Err(e) => load_failed(request_id, epoch, e),
        },
        TreeCommand::LoadPage {
            request_id,
            epoch,
            parent_id,
            page_index,
            page_size,
        } => match adapter
            .load_page(ParentKey::Node(parent_id.clone()), page_index, page_size)
            .await
        {
            Ok(page) => {
                let total_count = page.total_count.unwrap_or(page_index * page_size + page.items.len());
                TreeEvent::PageLoaded {
                    request_id,
                    epoch,
                    parent_id,
                    page_index,
                    items: page.items,
                    total_count,
                }
            }
            Err(e) => load_failed(request_id, epoch, e),
        },
        TreeCommand::LoadRootPage {
            request_id,
            epoch,
            page_index,
            page_size,
        } => match adapter.load_page(ParentKey::Root, page_index, page_size).await {
            Ok(page) => {
                let total_count = page.total_count.unwrap_or(page_index * page_size + page.items.len());
                TreeEvent::RootPageLoaded {
                    request_id,
                    epoch,
                    page_index,
                    items: page.items,
                    total_count,
                }
            }
            Err(e) => load_failed(request_id, epoch, e),
        },
        TreeCommand::ResolvePath {
            request_id,
            epoch,
            target_id,
        } => match adapter.resolve_path(target_id).await {
            Ok(steps) => TreeEvent::PathResolved {
                request_id,
                epoch,
                steps,
            },
            Err(e) => {
                tracing::warn!("Path resolution for {} failed: {}", request_id, e);
                TreeEvent::PathResolutionFailed {
                    request_id,
                    epoch,
                    reason: e.to_string(),
                    timestamp_ms: now_ms(),
                }
            }
        },
        TreeCommand::ScrollToIndex { .. }
        | TreeCommand::EmitSelectionChange { .. }
        | TreeCommand::EmitLoadError { .. }
        | TreeCommand::EmitNavigationResult { .. } => return None,
    };
    Some(event)
}

fn load_failed(request_id: RequestId, epoch: Epoch, e: SylvaError) -> TreeEvent {
    tracing::warn!("Load for {} failed: {}", request_id, e);
    TreeEvent::LoadFailed {
        request_id,
        epoch,
        reason: e.to_string(),
        timestamp_ms: now_ms(),
    }
}
