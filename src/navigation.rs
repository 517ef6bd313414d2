//! Keyboard focus, typeahead, and pinned navigation.
//!
//! Pinned navigation is a small state machine stored in engine state as a
//! [`PendingNavigation`]:
//!
//! - `ResolvingPath`: waiting for the host to resolve the path from a root to the target.
//! - `ExpandingAncestors`: walking the path, expanding each known ancestor.
//! - `LoadingBranch`: an ancestor's child list does not contain the next step yet; one load is
//!   awaited.
//!
//! When every step is known the reveal runs after the projection rebuild: the target gets focus
//! and a scroll command, or the navigation fails when an active filter hides it. Exactly one
//! [`NavigationOutcome`] is emitted per navigation.
use serde::{Deserialize, Serialize};

use crate::{
    commands::{NavigationOutcome, TreeCommand},
    engine::{EngineContext, TreeState},
    error::{ErrorScope, TreeLoadError},
    event::{NavKey, SelectIntent},
    node::{NodeId, ParentKey, PathStep, RowKey},
    paging::RequestId,
    projection::{Projection, RowRef},
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FocusState {
    key: Option<RowKey>,
    index: Option<usize>,
}

impl FocusState {
    pub fn key(&self) -> Option<&RowKey> {
        self.key.as_ref()
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub(crate) fn set(&mut self, key: RowKey, index: usize) {
        self.key = Some(key);
        self.index = Some(index);
    }

    pub(crate) fn set_key(&mut self, key: RowKey) {
        self.key = Some(key);
    }

    /// Keep focus on the same row when it is still visible, otherwise on the same index
    /// clamped to the new bounds. Focus is `None` iff the projection is empty.
    pub(crate) fn repair(&mut self, projection: &Projection) {
        let total = projection.total();
        if total == 0 {
            self.key = None;
            self.index = None;
            return;
        }
        if let Some(index) = self.key.as_ref().and_then(|key| projection.index_of(key)) {
            self.index = Some(index);
            return;
        }
        let index = self.index.map(|index| index.min(total - 1)).unwrap_or(0);
        self.index = Some(index);
        self.key = projection.key_at(index);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Typeahead {
    buffer: String,
    last_at_ms: Option<u64>,
}

impl Typeahead {
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    fn push(&mut self, ch: char, at_ms: u64, timeout_ms: u64) {
        let expired = self
            .last_at_ms
            .map_or(true, |last| at_ms.saturating_sub(last) > timeout_ms);
        if expired {
            self.buffer.clear();
        }
        self.buffer.extend(ch.to_lowercase());
        self.last_at_ms = Some(at_ms);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NavigationStatus {
    ResolvingPath,
    ExpandingAncestors,
    LoadingBranch { awaiting: RequestId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingNavigation {
    pub target_id: NodeId,
    /// The path resolution request, when one was needed.
    pub request_id: Option<RequestId>,
    pub status: NavigationStatus,
    pub remaining_steps: Vec<PathStep>,
    pub completed_steps: Vec<NodeId>,
}

impl PendingNavigation {
    pub fn awaited_request(&self) -> Option<RequestId> {
        match self.status {
            NavigationStatus::ResolvingPath => self.request_id,
            NavigationStatus::LoadingBranch { awaiting } => Some(awaiting),
            NavigationStatus::ExpandingAncestors => None,
        }
    }

    fn is_ready(&self) -> bool {
        self.status == NavigationStatus::ExpandingAncestors && self.remaining_steps.is_empty()
    }
}

enum Branch {
    Requested(RequestId, TreeCommand),
    Waiting(RequestId),
    Exhausted,
}

impl TreeState {
    fn scroll_command(&self, ctx: &EngineContext, index: usize) -> Option<TreeCommand> {
        let visible = self.viewport.is_some_and(|viewport| viewport.contains(index));
        (!visible).then(|| TreeCommand::ScrollToIndex {
            index,
            offset_px: index as f64 * ctx.config.virtualization.item_size,
        })
    }

    fn move_focus(&mut self, ctx: &EngineContext, index: usize) -> Vec<TreeCommand> {
        if self.focus.index() == Some(index) && self.focus.key().is_some() {
            return Vec::new();
        }
        let Some(key) = self.projection.key_at(index) else {
            return Vec::new();
        };
        self.focus.set(key, index);
        self.scroll_command(ctx, index).into_iter().collect()
    }

    pub(crate) fn focus_key_if_visible(&mut self, key: RowKey) {
        if let Some(index) = self.projection.index_of(&key) {
            self.focus.set(key, index);
        }
    }

    pub(crate) fn on_focus_node(&mut self, ctx: &EngineContext, node_id: &NodeId) -> Vec<TreeCommand> {
        match self.projection.index_of(&RowKey::Node(node_id.clone())) {
            Some(index) => self.move_focus(ctx, index),
            None => Vec::new(),
        }
    }

    fn is_child_row(&self, row: Option<RowRef>, parent: &NodeId) -> bool {
        match row {
            Some(RowRef::Node { id, .. }) => self
                .index
                .get(id)
                .is_some_and(|node| node.parent_id.as_ref() == Some(parent)),
            Some(RowRef::Placeholder { parent: key, .. }) => key.node_id() == Some(parent),
            None => false,
        }
    }

    pub(crate) fn on_key(&mut self, ctx: &EngineContext, key: NavKey) -> Vec<TreeCommand> {
        if !ctx.config.keyboard.enabled {
            return Vec::new();
        }
        let total = self.projection.total();
        if total == 0 {
            return Vec::new();
        }
        let current = self.focus.index().unwrap_or(0).min(total - 1);
        let last = total - 1;
        match key {
            NavKey::ArrowDown => self.move_focus(ctx, (current + 1).min(last)),
            NavKey::ArrowUp => self.move_focus(ctx, current.saturating_sub(1)),
            NavKey::Home => self.move_focus(ctx, 0),
            NavKey::End => self.move_focus(ctx, last),
            NavKey::PageDown { page_size } => {
                self.move_focus(ctx, current.saturating_add(page_size.max(1)).min(last))
            }
            NavKey::PageUp { page_size } => {
                self.move_focus(ctx, current.saturating_sub(page_size.max(1)))
            }
            NavKey::ArrowRight => {
                let Some(RowKey::Node(id)) = self.projection.key_at(current) else {
                    return Vec::new();
                };
                let Some(node) = self.index.get(&id) else {
                    return Vec::new();
                };
                if node.is_leaf {
                    Vec::new()
                } else if !self.expanded.contains(&id) {
                    self.focus.set(RowKey::Node(id.clone()), current);
                    self.expand_node(ctx, &id);
                    Vec::new()
                } else if current < last
                    && self.is_child_row(self.projection.locate(current + 1), &id)
                {
                    self.move_focus(ctx, current + 1)
                } else {
                    Vec::new()
                }
            }
            NavKey::ArrowLeft => {
                let parent = match self.projection.key_at(current) {
                    Some(RowKey::Node(id)) => {
                        if self.expanded.contains(&id) {
                            self.focus.set(RowKey::Node(id.clone()), current);
                            self.collapse_node(&id);
                            return Vec::new();
                        }
                        self.index.get(&id).and_then(|node| node.parent_id.clone())
                    }
                    Some(RowKey::Placeholder { parent, .. }) => parent.node_id().cloned(),
                    None => None,
                };
                match parent.and_then(|id| self.projection.index_of(&RowKey::Node(id))) {
                    Some(index) => self.move_focus(ctx, index),
                    None => Vec::new(),
                }
            }
            NavKey::Enter | NavKey::Space => {
                if let Some(RowKey::Node(id)) = self.projection.key_at(current) {
                    let intent = if key == NavKey::Enter {
                        SelectIntent::Replace
                    } else {
                        SelectIntent::Toggle
                    };
                    self.on_select(ctx, &id, intent);
                }
                Vec::new()
            }
        }
    }

    pub(crate) fn on_key_char(&mut self, ctx: &EngineContext, ch: char, at_ms: u64) -> Vec<TreeCommand> {
        let keyboard = &ctx.config.keyboard;
        if !keyboard.enabled || !keyboard.typeahead || ch.is_control() {
            return Vec::new();
        }
        self.typeahead.push(ch, at_ms, keyboard.typeahead_timeout_ms);
        let total = self.projection.total();
        if total == 0 {
            return Vec::new();
        }
        let current = self.focus.index().unwrap_or(0);
        // A fresh single character cycles to the next match; a longer buffer refines in place.
        let start = if self.typeahead.buffer().chars().count() == 1 {
            current + 1
        } else {
            current
        };
        let found = (0..total).map(|offset| (start + offset) % total).find(|index| {
            match self.projection.locate(*index) {
                Some(RowRef::Node { id, .. }) => self.index.get(id).is_some_and(|node| {
                    node.label.to_lowercase().starts_with(self.typeahead.buffer())
                }),
                _ => false,
            }
        });
        match found {
            Some(index) => self.move_focus(ctx, index),
            None => Vec::new(),
        }
    }

    pub(crate) fn on_navigate(&mut self, ctx: &EngineContext, target_id: &NodeId) -> Vec<TreeCommand> {
        if !ctx.config.pinned.enabled {
            return Vec::new();
        }
        if !self.can_navigate() {
            return vec![TreeCommand::EmitNavigationResult {
                target_id: target_id.clone(),
                outcome: NavigationOutcome::Busy,
            }];
        }
        if let Some(index) = self.projection.index_of(&RowKey::Node(target_id.clone())) {
            self.focus.set(RowKey::Node(target_id.clone()), index);
            return vec![
                TreeCommand::ScrollToIndex {
                    index,
                    offset_px: index as f64 * ctx.config.virtualization.item_size,
                },
                TreeCommand::EmitNavigationResult {
                    target_id: target_id.clone(),
                    outcome: NavigationOutcome::Succeeded { index },
                },
            ];
        }

        if self.index.contains(target_id) {
            let mut steps = self
                .index
                .ancestors(target_id)
                .into_iter()
                .rev()
                .map(PathStep::new)
                .collect::<Vec<_>>();
            steps.push(PathStep::new(target_id.clone()));
            self.navigation = Some(PendingNavigation {
                target_id: target_id.clone(),
                request_id: None,
                status: NavigationStatus::ExpandingAncestors,
                remaining_steps: steps,
                completed_steps: Vec::new(),
            });
            return self.advance_navigation(ctx);
        }

        let (request_id, command) = self.paging.request_path(target_id);
        self.navigation = Some(PendingNavigation {
            target_id: target_id.clone(),
            request_id: Some(request_id),
            status: NavigationStatus::ResolvingPath,
            remaining_steps: Vec::new(),
            completed_steps: Vec::new(),
        });
        vec![command]
    }

    pub(crate) fn on_path_resolved(
        &mut self,
        ctx: &EngineContext,
        request_id: RequestId,
        steps: Vec<PathStep>,
    ) -> Vec<TreeCommand> {
        let Some(navigation) = self.navigation.as_mut() else {
            return Vec::new();
        };
        if navigation.request_id != Some(request_id)
            || navigation.status != NavigationStatus::ResolvingPath
        {
            return Vec::new();
        }
        if steps.last().map(|step| &step.node_id) != Some(&navigation.target_id) {
            return self.fail_navigation("resolved path does not end at the target".to_string());
        }
        navigation.status = NavigationStatus::ExpandingAncestors;
        navigation.remaining_steps = steps;
        self.advance_navigation(ctx)
    }

    /// Continue a navigation that was waiting for `request_id`.
    pub(crate) fn resume_navigation(&mut self, ctx: &EngineContext, request_id: RequestId) -> Vec<TreeCommand> {
        match self.navigation.as_mut() {
            Some(navigation)
                if navigation.status == (NavigationStatus::LoadingBranch { awaiting: request_id }) =>
            {
                navigation.status = NavigationStatus::ExpandingAncestors;
                self.advance_navigation(ctx)
            }
            _ => Vec::new(),
        }
    }

    /// Fail the navigation if it was waiting for `request_id`.
    pub(crate) fn navigation_load_failed(&mut self, request_id: RequestId, reason: &str) -> Vec<TreeCommand> {
        let awaited = self
            .navigation
            .as_ref()
            .and_then(|navigation| navigation.awaited_request());
        if awaited == Some(request_id) {
            self.fail_navigation(format!("load failed: {reason}"))
        } else {
            Vec::new()
        }
    }

    fn advance_navigation(&mut self, ctx: &EngineContext) -> Vec<TreeCommand> {
        loop {
            let Some(navigation) = self.navigation.as_ref() else {
                return Vec::new();
            };
            let Some(step) = navigation.remaining_steps.first().cloned() else {
                return Vec::new();
            };
            let parent = ParentKey::from(navigation.completed_steps.last().cloned());

            if !self.index.contains(&step.node_id) {
                let status = match self.request_branch(&parent, step.page_hint) {
                    Branch::Requested(request_id, command) => {
                        self.set_navigation_status(NavigationStatus::LoadingBranch { awaiting: request_id });
                        return vec![command];
                    }
                    Branch::Waiting(request_id) => NavigationStatus::LoadingBranch { awaiting: request_id },
                    Branch::Exhausted => {
                        return self.fail_navigation(format!("{} not found under {}", step.node_id, parent));
                    }
                };
                self.set_navigation_status(status);
                return Vec::new();
            }

            let last_step = match self.navigation.as_mut() {
                Some(navigation) => {
                    navigation.remaining_steps.remove(0);
                    navigation.completed_steps.push(step.node_id.clone());
                    navigation.remaining_steps.is_empty()
                }
                None => return Vec::new(),
            };
            if !last_step {
                if self.index.get(&step.node_id).is_some_and(|node| node.is_leaf) {
                    return self.fail_navigation(format!("{} has no children", step.node_id));
                }
                self.expand_node(ctx, &step.node_id);
            }
        }
    }

    fn set_navigation_status(&mut self, status: NavigationStatus) {
        if let Some(navigation) = self.navigation.as_mut() {
            navigation.status = status;
        }
    }

    /// Load more of `parent` so the next path step can be found.
    fn request_branch(&mut self, parent: &ParentKey, page_hint: Option<usize>) -> Branch {
        if let Some(page_state) = self.paging.page_state(parent) {
            let hinted = page_hint.filter(|page| {
                !page_state.loaded_pages.contains(page)
                    && page_state.page_count().map_or(true, |count| *page < count)
            });
            let Some(page) = hinted.or_else(|| page_state.first_unloaded_page()) else {
                return Branch::Exhausted;
            };
            if let Some(request_id) = page_state.loading_pages.get(&page) {
                return Branch::Waiting(*request_id);
            }
            let command = self.paging.request_page(parent, page);
            return match command.request_id() {
                Some(request_id) => Branch::Requested(request_id, command),
                None => Branch::Exhausted,
            };
        }
        if self.index.children_loaded(parent) {
            return Branch::Exhausted;
        }
        if let Some(request_id) = self.paging.loading_children.get(parent) {
            return Branch::Waiting(*request_id);
        }
        let command = self.paging.request_children(parent);
        match command.request_id() {
            Some(request_id) => Branch::Requested(request_id, command),
            None => Branch::Exhausted,
        }
    }

    fn take_navigation(&mut self) -> Option<PendingNavigation> {
        let navigation = self.navigation.take()?;
        if navigation.status == NavigationStatus::ResolvingPath {
            if let Some(request_id) = navigation.request_id {
                self.paging.forget(request_id);
            }
        }
        Some(navigation)
    }

    pub(crate) fn fail_navigation(&mut self, reason: String) -> Vec<TreeCommand> {
        let Some(navigation) = self.take_navigation() else {
            return Vec::new();
        };
        tracing::debug!("Navigation to {} failed: {}", navigation.target_id, reason);
        vec![TreeCommand::EmitNavigationResult {
            target_id: navigation.target_id,
            outcome: NavigationOutcome::Failed { reason },
        }]
    }

    pub(crate) fn cancel_navigation(&mut self) -> Vec<TreeCommand> {
        let Some(navigation) = self.take_navigation() else {
            return Vec::new();
        };
        vec![TreeCommand::EmitNavigationResult {
            target_id: navigation.target_id,
            outcome: NavigationOutcome::Cancelled,
        }]
    }

    /// Record a failed path resolution and end the navigation.
    pub(crate) fn on_path_resolution_failed(
        &mut self,
        request_id: RequestId,
        reason: String,
        timestamp_ms: u64,
    ) -> Vec<TreeCommand> {
        let awaited = self
            .navigation
            .as_ref()
            .filter(|navigation| navigation.request_id == Some(request_id))
            .map(|navigation| navigation.target_id.clone());
        let Some(target_id) = awaited else {
            return Vec::new();
        };
        let error = TreeLoadError {
            scope: ErrorScope::Navigation,
            node_id: Some(target_id),
            page_index: None,
            reason: reason.clone(),
            timestamp_ms,
        };
        self.record_error(error.clone());
        let mut commands = vec![TreeCommand::EmitLoadError { error }];
        commands.extend(self.fail_navigation(format!("path resolution failed: {reason}")));
        commands
    }

    /// Reveal a navigation whose path is fully expanded. Runs after the projection rebuild.
    pub(crate) fn finish_navigation(&mut self, ctx: &EngineContext) -> Vec<TreeCommand> {
        if !self.navigation.as_ref().is_some_and(PendingNavigation::is_ready) {
            return Vec::new();
        }
        let Some(navigation) = self.take_navigation() else {
            return Vec::new();
        };
        let key = RowKey::Node(navigation.target_id.clone());
        match self.projection.index_of(&key) {
            Some(index) => {
                self.focus.set(key, index);
                vec![
                    TreeCommand::ScrollToIndex {
                        index,
                        offset_px: index as f64 * ctx.config.virtualization.item_size,
                    },
                    TreeCommand::EmitNavigationResult {
                        target_id: navigation.target_id,
                        outcome: NavigationOutcome::Succeeded { index },
                    },
                ]
            }
            None => vec![TreeCommand::EmitNavigationResult {
                target_id: navigation.target_id,
                outcome: NavigationOutcome::Failed {
                    reason: "target is hidden by the active filter".to_string(),
                },
            }],
        }
    }
}
