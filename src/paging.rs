//! Page-aware loading: page states, the in-flight registry, epochs, and the range loader that
//! turns a viewport window into page requests.
//!
//! Every request the engine issues is registered here under a fresh [`RequestId`] and the
//! current epoch. A completion is only applied while its request is still registered; bumping
//! the epoch drops every registration, which is how in-flight work is cancelled.
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::{
    commands::TreeCommand,
    node::{NodeId, ParentKey},
    projection::{Projection, RowRef},
};

pub type Epoch = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "req#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestKind {
    Children { parent: ParentKey },
    Page { parent: ParentKey, page_index: usize },
    ResolvePath { target_id: NodeId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InflightRequest {
    pub request_id: RequestId,
    pub kind: RequestKind,
    pub epoch: Epoch,
}

/// Paging bookkeeping for one parent (or the root).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageState {
    pub page_size: usize,
    /// Authoritative child count; unknown until the first page answers.
    pub total_count: Option<usize>,
    pub loaded_pages: BTreeSet<usize>,
    pub loading_pages: BTreeMap<usize, RequestId>,
    pub failed_pages: BTreeMap<usize, String>,
    /// Loaded children by slot index.
    pub slots: BTreeMap<usize, NodeId>,
}

impl PageState {
    pub fn new(page_size: usize, total_count: Option<usize>) -> Self {
        PageState {
            page_size: page_size.max(1),
            total_count,
            loaded_pages: BTreeSet::new(),
            loading_pages: BTreeMap::new(),
            failed_pages: BTreeMap::new(),
            slots: BTreeMap::new(),
        }
    }

    pub fn page_of(&self, slot: usize) -> usize {
        slot / self.page_size
    }

    pub fn page_count(&self) -> Option<usize> {
        self.total_count.map(|total| total.div_ceil(self.page_size))
    }

    /// Loaded, loading, or failed: the range loader leaves the page alone.
    pub fn is_settled(&self, page: usize) -> bool {
        self.loaded_pages.contains(&page)
            || self.loading_pages.contains_key(&page)
            || self.failed_pages.contains_key(&page)
    }

    pub fn is_page_loading(&self, page: usize) -> bool {
        self.loading_pages.contains_key(&page)
    }

    pub fn is_page_failed(&self, page: usize) -> bool {
        self.failed_pages.contains_key(&page)
    }

    /// Lowest page not yet loaded, bounded by the known page count.
    pub fn first_unloaded_page(&self) -> Option<usize> {
        let limit = self.page_count().unwrap_or(1);
        (0..limit).find(|page| !self.loaded_pages.contains(page))
    }

    /// Store one page of children.
    ///
    /// `total` is authoritative: slots and page bookkeeping past the new end are dropped.
    /// An id already held by a slot of another page moves here; that page is no longer
    /// complete and stops counting as loaded. Within the page only the first occurrence of
    /// an id is kept. Returns the ids that lost their slot.
    pub(crate) fn apply_page(
        &mut self,
        page_index: usize,
        ids: Vec<NodeId>,
        total: usize,
    ) -> Vec<NodeId> {
        let start = page_index * self.page_size;
        let end = start + self.page_size;
        let mut displaced: Vec<NodeId> = Vec::new();
        let stale_slots = self
            .slots
            .range(start..end)
            .map(|(slot, _)| *slot)
            .collect::<Vec<_>>();
        for slot in stale_slots {
            if let Some(id) = self.slots.remove(&slot) {
                displaced.push(id);
            }
        }

        let moved = {
            let incoming = ids.iter().collect::<BTreeSet<_>>();
            self.slots
                .iter()
                .filter(|(_, id)| incoming.contains(id))
                .map(|(slot, _)| *slot)
                .collect::<Vec<_>>()
        };
        for slot in moved {
            self.clear_slot(slot);
        }

        let mut seen = BTreeSet::new();
        for (offset, id) in ids.into_iter().enumerate() {
            if seen.insert(id.clone()) {
                self.slots.insert(start + offset, id);
            }
        }

        self.total_count = Some(total);
        let overflow = self.slots.split_off(&total);
        displaced.extend(overflow.into_values());

        let page_count = total.div_ceil(self.page_size);
        self.loading_pages.remove(&page_index);
        self.failed_pages.remove(&page_index);
        if page_index < page_count {
            self.loaded_pages.insert(page_index);
        }
        self.loaded_pages.retain(|page| *page < page_count);
        self.failed_pages.retain(|page, _| *page < page_count);

        let kept = self.slots.values().collect::<BTreeSet<_>>();
        displaced.retain(|id| !kept.contains(id));
        displaced
    }

    /// Empty every slot holding `id`. Their pages go back to unloaded.
    pub(crate) fn remove_id(&mut self, id: &NodeId) {
        let emptied = self
            .slots
            .iter()
            .filter(|(_, slot_id)| *slot_id == id)
            .map(|(slot, _)| *slot)
            .collect::<Vec<_>>();
        for slot in emptied {
            self.clear_slot(slot);
        }
    }

    fn clear_slot(&mut self, slot: usize) {
        if self.slots.remove(&slot).is_some() {
            let page = self.page_of(slot);
            self.loaded_pages.remove(&page);
        }
    }

    pub fn child_ids(&self) -> Vec<NodeId> {
        self.slots.values().cloned().collect()
    }
}

/// All request and page bookkeeping owned by the engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Paging {
    epoch: Epoch,
    next_request_id: u64,
    inflight: BTreeMap<RequestId, InflightRequest>,
    pub(crate) pages: BTreeMap<ParentKey, PageState>,
    pub(crate) loading_children: BTreeMap<ParentKey, RequestId>,
    pub(crate) failed_children: BTreeMap<ParentKey, String>,
}

impl Paging {
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn inflight(&self) -> &BTreeMap<RequestId, InflightRequest> {
        &self.inflight
    }

    pub fn page_state(&self, parent: &ParentKey) -> Option<&PageState> {
        self.pages.get(parent)
    }

    pub fn pages(&self) -> &BTreeMap<ParentKey, PageState> {
        &self.pages
    }

    pub fn is_loading_children(&self, parent: &ParentKey) -> bool {
        self.loading_children.contains_key(parent)
    }

    pub fn children_failed(&self, parent: &ParentKey) -> bool {
        self.failed_children.contains_key(parent)
    }

    /// Increment the epoch and forget every in-flight request.
    ///
    /// Loading markers are cleared with the registry so nothing points at a dead request.
    /// Returns the dropped requests.
    pub(crate) fn bump_epoch(&mut self) -> Vec<InflightRequest> {
        self.epoch += 1;
        for page_state in self.pages.values_mut() {
            page_state.loading_pages.clear();
        }
        self.loading_children.clear();
        let dropped = std::mem::take(&mut self.inflight);
        tracing::debug!(
            "Epoch bumped to {}; {} in-flight request(s) abandoned",
            self.epoch,
            dropped.len()
        );
        dropped.into_values().collect()
    }

    fn register(&mut self, kind: RequestKind) -> RequestId {
        self.next_request_id += 1;
        let request_id = RequestId(self.next_request_id);
        self.inflight.insert(
            request_id,
            InflightRequest {
                request_id,
                kind,
                epoch: self.epoch,
            },
        );
        request_id
    }

    /// The registered request, if a completion for `(request_id, epoch)` is still relevant.
    pub fn fresh(&self, request_id: RequestId, epoch: Epoch) -> Option<&InflightRequest> {
        if epoch != self.epoch {
            return None;
        }
        self.inflight
            .get(&request_id)
            .filter(|request| request.epoch == epoch)
    }

    /// Unregister a request and clear whatever loading marker pointed at it.
    pub(crate) fn complete(&mut self, request_id: RequestId) -> Option<InflightRequest> {
        let request = self.inflight.remove(&request_id)?;
        match &request.kind {
            RequestKind::Children { parent } => {
                if self.loading_children.get(parent) == Some(&request_id) {
                    self.loading_children.remove(parent);
                }
            }
            RequestKind::Page { parent, page_index } => {
                if let Some(page_state) = self.pages.get_mut(parent) {
                    if page_state.loading_pages.get(page_index) == Some(&request_id) {
                        page_state.loading_pages.remove(page_index);
                    }
                }
            }
            RequestKind::ResolvePath { .. } => {}
        }
        Some(request)
    }

    pub(crate) fn ensure_page_state(
        &mut self,
        parent: &ParentKey,
        page_size: usize,
        total_count: Option<usize>,
    ) -> &mut PageState {
        self.pages
            .entry(parent.clone())
            .or_insert_with(|| PageState::new(page_size, total_count))
    }

    /// Mark a page loading and build its load command.
    pub(crate) fn request_page(&mut self, parent: &ParentKey, page_index: usize) -> TreeCommand {
        let request_id = self.register(RequestKind::Page {
            parent: parent.clone(),
            page_index,
        });
        let epoch = self.epoch;
        let page_size = match self.pages.get_mut(parent) {
            Some(page_state) => {
                page_state.failed_pages.remove(&page_index);
                page_state.loading_pages.insert(page_index, request_id);
                page_state.page_size
            }
            None => {
                let page_state = self.ensure_page_state(parent, 1, None);
                page_state.loading_pages.insert(page_index, request_id);
                page_state.page_size
            }
        };
        match parent {
            ParentKey::Root => TreeCommand::LoadRootPage {
                request_id,
                epoch,
                page_index,
                page_size,
            },
            ParentKey::Node(parent_id) => TreeCommand::LoadPage {
                request_id,
                epoch,
                parent_id: parent_id.clone(),
                page_index,
                page_size,
            },
        }
    }

    pub(crate) fn request_children(&mut self, parent: &ParentKey) -> TreeCommand {
        let request_id = self.register(RequestKind::Children {
            parent: parent.clone(),
        });
        self.failed_children.remove(parent);
        self.loading_children.insert(parent.clone(), request_id);
        TreeCommand::LoadChildren {
            request_id,
            epoch: self.epoch,
            parent: parent.clone(),
        }
    }

    pub(crate) fn request_path(&mut self, target_id: &NodeId) -> (RequestId, TreeCommand) {
        let request_id = self.register(RequestKind::ResolvePath {
            target_id: target_id.clone(),
        });
        (
            request_id,
            TreeCommand::ResolvePath {
                request_id,
                epoch: self.epoch,
                target_id: target_id.clone(),
            },
        )
    }

    /// Drop a registration without applying anything, e.g. an abandoned path resolution.
    pub(crate) fn forget(&mut self, request_id: RequestId) {
        self.complete(request_id);
    }

    pub(crate) fn mark_page_failed(&mut self, parent: &ParentKey, page_index: usize, reason: &str) {
        if let Some(page_state) = self.pages.get_mut(parent) {
            page_state.loading_pages.remove(&page_index);
            page_state
                .failed_pages
                .insert(page_index, reason.to_string());
        }
    }

    pub(crate) fn mark_children_failed(&mut self, parent: &ParentKey, reason: &str) {
        self.loading_children.remove(parent);
        self.failed_children
            .insert(parent.clone(), reason.to_string());
    }

    /// Forget every paging record belonging to `removed` nodes.
    pub(crate) fn forget_nodes(&mut self, removed: &BTreeSet<NodeId>) {
        if removed.is_empty() {
            return;
        }
        let is_removed = |key: &ParentKey| key.node_id().is_some_and(|id| removed.contains(id));
        self.pages.retain(|key, _| !is_removed(key));
        self.loading_children.retain(|key, _| !is_removed(key));
        self.failed_children.retain(|key, _| !is_removed(key));
    }

    /// Pure planning step of the range loader: the unique `(parent, page)` keys under
    /// `[start, end]` widened by `overscan` that still need a request, in viewport order.
    pub fn plan_required_pages(
        &self,
        projection: &Projection,
        start: usize,
        end: usize,
        overscan: usize,
    ) -> Vec<(ParentKey, usize)> {
        let total = projection.total();
        if total == 0 {
            return Vec::new();
        }
        let low = start.saturating_sub(overscan);
        let high = end.saturating_add(overscan).min(total - 1);
        if low > high {
            return Vec::new();
        }

        let mut seen = BTreeSet::new();
        let mut required = Vec::new();
        let mut index = low;
        while index <= high {
            match projection.locate(index) {
                Some(RowRef::Placeholder {
                    parent,
                    slot,
                    run_remaining,
                    ..
                }) => {
                    let page_size = self
                        .pages
                        .get(parent)
                        .map(|page_state| page_state.page_size)
                        .unwrap_or(1);
                    let page = slot / page_size;
                    let settled = self
                        .pages
                        .get(parent)
                        .is_some_and(|page_state| page_state.is_settled(page));
                    if !settled && seen.insert((parent.clone(), page)) {
                        required.push((parent.clone(), page));
                    }
                    let to_page_end = (page + 1) * page_size - slot;
                    index += to_page_end.min(run_remaining).max(1);
                }
                Some(RowRef::Node { .. }) => index += 1,
                None => break,
            }
        }
        required
    }

    /// The range loader: plan, then register and emit one command per required page.
    pub fn compute_required_pages(
        &mut self,
        projection: &Projection,
        start: usize,
        end: usize,
        overscan: usize,
    ) -> Vec<TreeCommand> {
        self.plan_required_pages(projection, start, end, overscan)
            .into_iter()
            .map(|(parent, page)| self.request_page(&parent, page))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(range: std::ops::Range<usize>) -> Vec<NodeId> {
        range.map(|i| NodeId::new(format!("n{i}"))).collect()
    }

    #[test]
    fn exact_page_multiple_has_no_extra_page() {
        let page_state = PageState::new(50, Some(100));
        assert_eq!(page_state.page_count(), Some(2));
        assert_eq!(page_state.page_of(49), 0);
        assert_eq!(page_state.page_of(50), 1);
        assert_eq!(PageState::new(50, Some(50)).page_count(), Some(1));
        assert_eq!(PageState::new(50, Some(0)).page_count(), Some(0));
    }

    #[test]
    fn short_last_page_shrinks_total() {
        let mut page_state = PageState::new(10, Some(30));
        page_state.apply_page(0, ids(0..10), 30);
        page_state.loading_pages.insert(2, RequestId(9));
        let displaced = page_state.apply_page(1, ids(10..14), 14);
        assert!(displaced.is_empty());
        assert_eq!(page_state.total_count, Some(14));
        assert_eq!(page_state.page_count(), Some(2));
        assert_eq!(page_state.slots.len(), 14);
        assert!(page_state.loaded_pages.contains(&1));
    }

    #[test]
    fn reloaded_page_reports_displaced_ids() {
        let mut page_state = PageState::new(3, None);
        page_state.apply_page(0, ids(0..3), 3);
        let displaced = page_state.apply_page(0, vec![NodeId::new("n0"), NodeId::new("x")], 2);
        assert_eq!(displaced, vec![NodeId::new("n1"), NodeId::new("n2")]);
    }

    #[test]
    fn id_loaded_into_another_page_leaves_its_old_slot() {
        let mut page_state = PageState::new(10, Some(20));
        page_state.apply_page(0, ids(0..10), 20);
        let displaced = page_state.apply_page(1, ids(9..19), 20);
        assert!(displaced.is_empty());
        assert_eq!(page_state.slots.get(&9), None);
        assert_eq!(page_state.slots.get(&10), Some(&NodeId::new("n9")));
        assert_eq!(page_state.child_ids().len(), 19);
        assert_eq!(
            page_state.loaded_pages.iter().copied().collect::<Vec<_>>(),
            vec![1]
        );
    }

    #[test]
    fn repeated_id_within_a_page_keeps_the_first_slot() {
        let mut page_state = PageState::new(3, Some(3));
        let page = vec![NodeId::new("n0"), NodeId::new("n1"), NodeId::new("n0")];
        page_state.apply_page(0, page, 3);
        assert_eq!(page_state.child_ids(), ids(0..2));
        assert_eq!(page_state.slots.get(&2), None);
    }

    #[test]
    fn removed_id_returns_its_page_to_the_loader() {
        let mut page_state = PageState::new(10, Some(20));
        page_state.apply_page(0, ids(0..10), 20);
        page_state.apply_page(1, ids(10..20), 20);
        page_state.remove_id(&NodeId::new("n15"));
        assert_eq!(page_state.slots.len(), 19);
        assert!(page_state.is_settled(0));
        assert!(!page_state.is_settled(1));
    }

    #[test]
    fn epoch_bump_forgets_requests() {
        let mut paging = Paging::default();
        paging.ensure_page_state(&ParentKey::Root, 10, Some(100));
        let command = paging.request_page(&ParentKey::Root, 3);
        let TreeCommand::LoadRootPage {
            request_id, epoch, ..
        } = command
        else {
            panic!("expected a root page load, got {command:?}");
        };
        assert!(paging.fresh(request_id, epoch).is_some());

        let dropped = paging.bump_epoch();
        assert_eq!(dropped.len(), 1);
        assert!(paging.fresh(request_id, epoch).is_none());
        assert!(paging.fresh(request_id, paging.epoch()).is_none());
        assert!(paging.pages[&ParentKey::Root].loading_pages.is_empty());
    }

    #[test]
    fn request_ids_are_monotonic_across_epochs() {
        let mut paging = Paging::default();
        let first = paging.request_children(&ParentKey::Root);
        paging.bump_epoch();
        let second = paging.request_children(&ParentKey::Root);
        match (first, second) {
            (
                TreeCommand::LoadChildren { request_id: a, .. },
                TreeCommand::LoadChildren { request_id: b, .. },
            ) => assert!(b > a),
            other => panic!("unexpected commands {other:?}"),
        }
    }
}
