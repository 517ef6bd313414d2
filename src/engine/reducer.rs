//! Event routing and the per-dispatch finalize pass.
use std::collections::BTreeSet;

use enumset::EnumSet;

use crate::{
    commands::TreeCommand,
    engine::state::{Dirty, EngineContext, TreeState, Viewport},
    error::{ErrorScope, TreeLoadError},
    event::{RootInit, TreeEvent},
    filter::FilterQuery,
    index::{NodeIndex, RootSource},
    node::{NodeId, NodeInput, ParentKey, RowKey},
    paging::{Epoch, InflightRequest, RequestId, RequestKind},
};

/// Result of applying one event.
#[derive(Debug, Default)]
pub(crate) struct Transition {
    pub commands: Vec<TreeCommand>,
    /// False when the event was discarded without touching state.
    pub applied: bool,
}

impl Transition {
    fn discarded() -> Self {
        Transition::default()
    }
}

impl TreeState {
    /// Apply one event: route it, then refilter, rebuild, repair focus, finish navigation, and
    /// reconcile loads.
    pub(crate) fn reduce(&mut self, ctx: &EngineContext, event: TreeEvent) -> Transition {
        tracing::debug!("[TreeState::reduce] {}", event);
        if let Some((request_id, epoch)) = event.completion() {
            if self.paging.fresh(request_id, epoch).is_none() {
                tracing::debug!(
                    "Discarding stale completion {} at epoch {} (current epoch {})",
                    request_id,
                    epoch,
                    self.paging.epoch()
                );
                return Transition::discarded();
            }
        }

        let selected_before = self.selection.selected_ids().clone();
        let mut commands = match event {
            TreeEvent::Init { roots } => self.on_init(ctx, roots),
            TreeEvent::ToggleExpand { node_id } => {
                if self.expanded.contains(&node_id) {
                    self.collapse_node(&node_id);
                } else {
                    self.expand_node(ctx, &node_id);
                }
                Vec::new()
            }
            TreeEvent::Expand { node_id } => {
                self.expand_node(ctx, &node_id);
                Vec::new()
            }
            TreeEvent::Collapse { node_id } => {
                self.collapse_node(&node_id);
                Vec::new()
            }
            TreeEvent::Select { node_id, intent } => {
                self.on_select(ctx, &node_id, intent);
                Vec::new()
            }
            TreeEvent::SelectAll => {
                self.on_select_all(ctx);
                Vec::new()
            }
            TreeEvent::DeselectAll => {
                self.on_deselect_all(ctx);
                Vec::new()
            }
            TreeEvent::SetFilter { query } => self.on_set_filter(Some(query)),
            TreeEvent::ClearFilter => self.on_set_filter(None),
            TreeEvent::ViewportRangeChanged {
                start,
                end,
                overscan,
            } => {
                self.viewport = Some(Viewport {
                    start: start.min(end),
                    end: start.max(end),
                    overscan,
                });
                Vec::new()
            }
            TreeEvent::NavigateToNode { target_id } => self.on_navigate(ctx, &target_id),
            TreeEvent::CancelNavigation => self.cancel_navigation(),
            TreeEvent::Key(key) => self.on_key(ctx, key),
            TreeEvent::KeyChar { ch, at_ms } => self.on_key_char(ctx, ch, at_ms),
            TreeEvent::FocusNode { node_id } => self.on_focus_node(ctx, &node_id),
            TreeEvent::ChildrenLoaded {
                request_id,
                epoch,
                parent,
                items,
            } => {
                match self.claim(request_id, epoch, |kind| {
                    matches!(kind, RequestKind::Children { parent: p } if *p == parent)
                }) {
                    Some(_) => self.on_children_loaded(ctx, request_id, &parent, items),
                    None => return Transition::discarded(),
                }
            }
            TreeEvent::PageLoaded {
                request_id,
                epoch,
                parent_id,
                page_index,
                items,
                total_count,
            } => {
                let parent = ParentKey::Node(parent_id);
                match self.claim(request_id, epoch, |kind| is_page(kind, &parent, page_index)) {
                    Some(_) => self.on_page_loaded(ctx, request_id, &parent, page_index, items, total_count),
                    None => return Transition::discarded(),
                }
            }
            TreeEvent::RootPageLoaded {
                request_id,
                epoch,
                page_index,
                items,
                total_count,
            } => {
                let parent = ParentKey::Root;
                match self.claim(request_id, epoch, |kind| is_page(kind, &parent, page_index)) {
                    Some(_) => self.on_page_loaded(ctx, request_id, &parent, page_index, items, total_count),
                    None => return Transition::discarded(),
                }
            }
            TreeEvent::LoadFailed {
                request_id,
                epoch,
                reason,
                timestamp_ms,
            } => match self.claim(request_id, epoch, |_| true) {
                Some(request) => self.on_load_failed(request, reason, timestamp_ms),
                None => return Transition::discarded(),
            },
            TreeEvent::PathResolved {
                request_id,
                epoch,
                steps,
            } => match self.claim(request_id, epoch, |kind| {
                matches!(kind, RequestKind::ResolvePath { .. })
            }) {
                Some(_) => self.on_path_resolved(ctx, request_id, steps),
                None => return Transition::discarded(),
            },
            TreeEvent::PathResolutionFailed {
                request_id,
                epoch,
                reason,
                timestamp_ms,
            } => match self.claim(request_id, epoch, |kind| {
                matches!(kind, RequestKind::ResolvePath { .. })
            }) {
                Some(_) => self.on_path_resolution_failed(request_id, reason, timestamp_ms),
                None => return Transition::discarded(),
            },
            TreeEvent::RetryFailedPage { parent, page_index } => {
                self.on_retry_failed_page(&parent, page_index)
            }
            TreeEvent::Refresh { node_id } => self.on_refresh(node_id),
        };

        commands.extend(self.finalize(ctx));
        if self.selection.selected_ids() != &selected_before {
            commands.push(TreeCommand::EmitSelectionChange {
                selected: self.selection.selected_ids().iter().cloned().collect(),
            });
        }
        Transition {
            commands,
            applied: true,
        }
    }

    /// Unregister a fresh request whose kind matches the completion.
    fn claim(
        &mut self,
        request_id: RequestId,
        epoch: Epoch,
        expected: impl Fn(&RequestKind) -> bool,
    ) -> Option<InflightRequest> {
        let matches = self
            .paging
            .fresh(request_id, epoch)
            .is_some_and(|request| expected(&request.kind));
        if !matches {
            tracing::warn!("Completion for {} does not match its request kind", request_id);
            return None;
        }
        self.paging.complete(request_id)
    }

    fn mark(&mut self, dirty: impl Into<EnumSet<Dirty>>) {
        self.dirty |= dirty.into();
    }

    fn bump_epoch(&mut self) -> Vec<TreeCommand> {
        self.paging.bump_epoch();
        self.cancel_navigation()
    }

    fn on_init(&mut self, ctx: &EngineContext, roots: RootInit) -> Vec<TreeCommand> {
        let mut commands = self.bump_epoch();
        let source = match &roots {
            RootInit::Static(_) => RootSource::Static,
            RootInit::Lazy => RootSource::Lazy,
            RootInit::Paged { .. } => RootSource::Paged,
        };
        self.index = NodeIndex::new(source);
        self.expanded.clear();
        self.selection.clear();
        self.paging.pages.clear();
        self.paging.failed_children.clear();
        self.errors.clear();
        self.typeahead = Default::default();
        self.focus = Default::default();

        match roots {
            RootInit::Static(items) => {
                let mut wants_expanded = Vec::new();
                let ids = items
                    .iter()
                    .map(|item| self.index.upsert(item, &ParentKey::Root, &mut wants_expanded))
                    .collect();
                self.index.set_children(&ParentKey::Root, ids);
                for id in wants_expanded {
                    self.expand_node(ctx, &id);
                }
            }
            RootInit::Lazy => {}
            RootInit::Paged {
                page_size,
                total_count,
            } => {
                let page_size = page_size.unwrap_or(ctx.config.page_aware.default_page_size);
                self.paging
                    .ensure_page_state(&ParentKey::Root, page_size, total_count);
            }
        }
        tracing::debug!(
            "Initialized {:?} tree with {} node(s)",
            source,
            self.index.len()
        );
        self.mark(Dirty::Filter | Dirty::Projection);
        commands
    }

    /// Expand a node. Page-aware parents get a page state on first expansion.
    pub(crate) fn expand_node(&mut self, ctx: &EngineContext, id: &NodeId) -> bool {
        let Some(node) = self.index.get(id) else {
            return false;
        };
        if node.is_leaf || self.expanded.contains(id) {
            return false;
        }
        let key = ParentKey::Node(id.clone());
        if ctx.config.page_aware.enabled
            && !node.children_loaded
            && self.paging.page_state(&key).is_none()
        {
            let page_size = node
                .page_size
                .unwrap_or(ctx.config.page_aware.default_page_size);
            let total = node.total_children_count;
            self.paging.ensure_page_state(&key, page_size, total);
        }
        self.paging.failed_children.remove(&key);
        self.expanded.insert(id.clone());
        self.mark(Dirty::Projection);
        true
    }

    /// Collapse a node. Focus inside the collapsed subtree moves to the node itself.
    pub(crate) fn collapse_node(&mut self, id: &NodeId) -> bool {
        if !self.expanded.remove(id) {
            return false;
        }
        let focus_inside = match self.focus.key() {
            Some(RowKey::Node(focused)) => self.index.is_descendant_of(focused, id),
            Some(RowKey::Placeholder { parent, .. }) => match parent.node_id() {
                Some(parent_id) => parent_id == id || self.index.is_descendant_of(parent_id, id),
                None => false,
            },
            None => false,
        };
        if focus_inside {
            self.focus.set_key(RowKey::Node(id.clone()));
        }
        self.mark(Dirty::Projection);
        true
    }

    fn on_set_filter(&mut self, query: Option<FilterQuery>) -> Vec<TreeCommand> {
        let query = query.filter(|query| !query.is_empty());
        if !self.filter.set_query(query) {
            return Vec::new();
        }
        self.mark(Dirty::Query | Dirty::Filter | Dirty::Projection);
        self.bump_epoch()
    }

    /// Insert loaded items under `parent`, detaching moved nodes from their old page slots.
    fn insert_items(&mut self, items: &[NodeInput], parent: &ParentKey) -> (Vec<NodeId>, Vec<NodeId>) {
        let mut wants_expanded = Vec::new();
        let ids = items
            .iter()
            .map(|item| {
                if let Some(old_parent) = self.index.get(&item.id).map(|node| node.parent_key()) {
                    if &old_parent != parent {
                        if let Some(page_state) = self.paging.pages.get_mut(&old_parent) {
                            page_state.remove_id(&item.id);
                        }
                    }
                }
                self.index.upsert(item, parent, &mut wants_expanded)
            })
            .collect();
        (ids, wants_expanded)
    }

    /// Remove nodes that are no longer children of anything, with their subtrees.
    fn remove_orphans(&mut self, candidates: Vec<NodeId>, parent: &ParentKey) {
        let mut removed = BTreeSet::new();
        for id in candidates {
            let still_here = self.index.get(&id).is_some_and(|node| {
                &node.parent_key() != parent || self.index.children_of(parent).contains(&id)
            });
            if still_here {
                continue;
            }
            removed.extend(self.index.remove_subtree(&id));
        }
        self.forget_removed(&removed);
    }

    fn forget_removed(&mut self, removed: &BTreeSet<NodeId>) {
        if removed.is_empty() {
            return;
        }
        self.paging.forget_nodes(removed);
        self.expanded.retain(|id| !removed.contains(id));
        self.selection.retain_known(&self.index);
    }

    fn is_removed_parent(&self, parent: &ParentKey) -> bool {
        let removed = parent.node_id().is_some_and(|id| !self.index.contains(id));
        if removed {
            tracing::debug!("Dropping children of {}: the parent is no longer known", parent);
        }
        removed
    }

    fn on_children_loaded(
        &mut self,
        ctx: &EngineContext,
        request_id: RequestId,
        parent: &ParentKey,
        mut items: Vec<NodeInput>,
    ) -> Vec<TreeCommand> {
        if self.is_removed_parent(parent) {
            return self.navigation_load_failed(request_id, "parent was removed");
        }
        let mut seen = BTreeSet::new();
        items.retain(|item| seen.insert(item.id.clone()));
        let previous = self.index.children_of(parent).to_vec();
        let (ids, wants_expanded) = self.insert_items(&items, parent);
        self.index.set_children(parent, ids);
        self.remove_orphans(previous, parent);
        self.paging.failed_children.remove(parent);
        for id in wants_expanded {
            self.expand_node(ctx, &id);
        }
        self.mark(Dirty::Filter | Dirty::Projection);
        self.resume_navigation(ctx, request_id)
    }

    fn on_page_loaded(
        &mut self,
        ctx: &EngineContext,
        request_id: RequestId,
        parent: &ParentKey,
        page_index: usize,
        mut items: Vec<NodeInput>,
        total_count: usize,
    ) -> Vec<TreeCommand> {
        if self.is_removed_parent(parent) {
            return self.navigation_load_failed(request_id, "parent was removed");
        }
        let page_size = self
            .paging
            .page_state(parent)
            .map(|page_state| page_state.page_size)
            .unwrap_or(ctx.config.page_aware.default_page_size);
        if items.len() > page_size {
            tracing::warn!(
                "Page {} of {} returned {} items for page size {}; extra items dropped",
                page_index,
                parent,
                items.len(),
                page_size
            );
            items.truncate(page_size);
        }

        let (ids, wants_expanded) = self.insert_items(&items, parent);
        let page_state = self
            .paging
            .ensure_page_state(parent, page_size, Some(total_count));
        let displaced = page_state.apply_page(page_index, ids, total_count);
        let children = page_state.child_ids();
        self.index.set_paged_children(parent, children, total_count);
        self.remove_orphans(displaced, parent);
        for id in wants_expanded {
            self.expand_node(ctx, &id);
        }
        self.mark(Dirty::Filter | Dirty::Projection);
        self.resume_navigation(ctx, request_id)
    }

    fn on_load_failed(
        &mut self,
        request: InflightRequest,
        reason: String,
        timestamp_ms: u64,
    ) -> Vec<TreeCommand> {
        let error = match &request.kind {
            RequestKind::Children { parent } => {
                self.paging.mark_children_failed(parent, &reason);
                TreeLoadError {
                    scope: if parent.is_root() {
                        ErrorScope::Root
                    } else {
                        ErrorScope::Children
                    },
                    node_id: parent.node_id().cloned(),
                    page_index: None,
                    reason: reason.clone(),
                    timestamp_ms,
                }
            }
            RequestKind::Page { parent, page_index } => {
                self.paging.mark_page_failed(parent, *page_index, &reason);
                TreeLoadError {
                    scope: if parent.is_root() {
                        ErrorScope::Root
                    } else {
                        ErrorScope::Page
                    },
                    node_id: parent.node_id().cloned(),
                    page_index: Some(*page_index),
                    reason: reason.clone(),
                    timestamp_ms,
                }
            }
            RequestKind::ResolvePath { .. } => {
                return self.on_path_resolution_failed(request.request_id, reason, timestamp_ms);
            }
        };
        self.record_error(error.clone());
        self.mark(Dirty::Projection);
        let mut commands = vec![TreeCommand::EmitLoadError { error }];
        commands.extend(self.navigation_load_failed(request.request_id, &reason));
        commands
    }

    fn on_retry_failed_page(&mut self, parent: &ParentKey, page_index: usize) -> Vec<TreeCommand> {
        let failed = self
            .paging
            .page_state(parent)
            .is_some_and(|page_state| page_state.is_page_failed(page_index));
        if !failed {
            return Vec::new();
        }
        self.mark(Dirty::Projection);
        vec![self.paging.request_page(parent, page_index)]
    }

    fn on_refresh(&mut self, node_id: Option<NodeId>) -> Vec<TreeCommand> {
        let commands = self.bump_epoch();
        match node_id {
            Some(id) => {
                if self.index.contains(&id) {
                    self.invalidate_children(&ParentKey::Node(id));
                }
            }
            None => match self.index.root_source() {
                RootSource::Static => {
                    for id in self.index.root_ids().to_vec() {
                        self.invalidate_children(&ParentKey::Node(id));
                    }
                }
                RootSource::Lazy | RootSource::Paged => {
                    self.invalidate_children(&ParentKey::Root);
                }
            },
        }
        self.mark(Dirty::Filter | Dirty::Projection);
        commands
    }

    /// Drop everything loaded below `parent` so it is fetched again.
    fn invalidate_children(&mut self, parent: &ParentKey) {
        let removed = self.index.clear_children(parent);
        let page_state = self.paging.pages.remove(parent);
        self.paging.failed_children.remove(parent);
        if let Some(page_state) = page_state {
            self.paging
                .ensure_page_state(parent, page_state.page_size, None);
        } else if let ParentKey::Node(id) = parent {
            if let Some(node) = self.index.get_mut(id) {
                node.total_children_count = None;
                node.is_leaf = false;
            }
        }
        self.forget_removed(&removed);
        tracing::debug!("Invalidated {} node(s) below {}", removed.len(), parent);
    }

    fn finalize(&mut self, ctx: &EngineContext) -> Vec<TreeCommand> {
        let dirty = std::mem::take(&mut self.dirty);
        if dirty.contains(Dirty::Filter) && self.filter.is_active() {
            self.filter.recompute(&self.index, ctx.matcher.as_ref());
            if dirty.contains(Dirty::Query) && ctx.config.filtering.auto_expand_matches {
                for id in self.filter.ancestor_ids().clone() {
                    self.expand_node(ctx, &id);
                }
            }
        }
        if !dirty.is_empty() || !self.dirty.is_empty() {
            self.expanded
                .retain(|id| self.index.get(id).is_some_and(|node| !node.is_leaf));
            self.selection.retain_known(&self.index);
            self.rebuild_projection(&ctx.config);
            self.dirty.clear();
        }
        self.focus.repair(&self.projection);

        let mut commands = self.finish_navigation(ctx);
        commands.extend(self.reconcile_loads());
        commands
    }

    /// Request children for visible pending containers and pages under the viewport.
    fn reconcile_loads(&mut self) -> Vec<TreeCommand> {
        let mut commands = Vec::new();
        for key in self.projection.pending_containers().to_vec() {
            match self.paging.page_state(&key) {
                Some(page_state) => {
                    if page_state.total_count.is_none() && !page_state.is_settled(0) {
                        commands.push(self.paging.request_page(&key, 0));
                    }
                }
                None => {
                    if !self.paging.is_loading_children(&key)
                        && !self.paging.children_failed(&key)
                        && !self.index.children_loaded(&key)
                    {
                        commands.push(self.paging.request_children(&key));
                    }
                }
            }
        }
        if let Some(viewport) = self.viewport {
            commands.extend(self.paging.compute_required_pages(
                &self.projection,
                viewport.start,
                viewport.end,
                viewport.overscan,
            ));
        }
        commands
    }
}

fn is_page(kind: &RequestKind, parent: &ParentKey, page: usize) -> bool {
    matches!(kind, RequestKind::Page { parent: p, page_index } if p == parent && *page_index == page)
}
