use std::collections::BTreeSet;

use crate::{
    engine::state::{EngineContext, TreeState},
    filter::compute_matches,
    navigation::NavigationStatus,
    node::{NodeId, ParentKey},
    paging::RequestKind,
    projection::Projection,
};

impl TreeState {
    /// Check the state's structural invariants and return one message per violation.
    ///
    /// `full` adds the checks that recompute derived data from scratch (projection and
    /// filter sets).
    pub(crate) fn built_in_test(&self, ctx: &EngineContext, full: bool) -> Vec<String> {
        let mut errors = Vec::new();
        self.check_index(&mut errors);
        self.check_registry(&mut errors);
        self.check_sets(&mut errors);

        let total = self.projection.total();
        match self.focus.index() {
            Some(index) if index >= total => errors.push(format!(
                "[TreeState::built_in_test invariant 5] focus index {index} outside 0..{total}"
            )),
            None if total > 0 => errors.push(
                "[TreeState::built_in_test invariant 5] no focus on a non-empty projection"
                    .to_string(),
            ),
            Some(_) if total == 0 => errors.push(
                "[TreeState::built_in_test invariant 5] focus set on an empty projection"
                    .to_string(),
            ),
            _ => {}
        }

        if !full {
            return errors;
        }

        let rebuilt = Projection::build(&self.projection_input(&ctx.config));
        if rebuilt != self.projection {
            errors.push(format!(
                "[TreeState::built_in_test invariant 1] stored projection ({} rows) differs from a rebuild ({} rows)",
                self.projection.total(),
                rebuilt.total()
            ));
        }
        if let Some(query) = self.filter.query() {
            let (matched, ancestors) = compute_matches(&self.index, query, ctx.matcher.as_ref());
            if &matched != self.filter.matched_ids() || &ancestors != self.filter.ancestor_ids() {
                errors.push(format!(
                    "[TreeState::built_in_test invariant 7] filter sets are stale for query {:?}",
                    query.text
                ));
            }
        }
        errors
    }

    fn check_index(&self, errors: &mut Vec<String>) {
        let index = &self.index;
        let check_child = |parent: &ParentKey, child: &NodeId, errors: &mut Vec<String>| {
            match index.get(child) {
                None => errors.push(format!(
                    "[TreeState::built_in_test invariant 3] child {child} of {parent} is unknown"
                )),
                Some(node) if &node.parent_key() != parent => errors.push(format!(
                    "[TreeState::built_in_test invariant 3] child {child} listed under {parent} points to {}",
                    node.parent_key()
                )),
                Some(_) => {}
            }
        };
        for id in index.root_ids() {
            check_child(&ParentKey::Root, id, errors);
        }
        check_unique(&ParentKey::Root, "root ids", index.root_ids(), errors);
        for node in index.nodes().values() {
            let key = ParentKey::Node(node.id.clone());
            for child in node.children_ids.iter() {
                check_child(&key, child, errors);
            }
            check_unique(&key, "children", &node.children_ids, errors);
        }
        for (parent, page_state) in self.paging.pages() {
            for id in page_state.slots.values() {
                check_child(parent, id, errors);
            }
            check_unique(parent, "page slots", page_state.slots.values(), errors);
        }
    }

    fn check_registry(&self, errors: &mut Vec<String>) {
        let epoch = self.paging.epoch();
        let inflight = self.paging.inflight();
        for request in inflight.values() {
            if request.epoch != epoch {
                errors.push(format!(
                    "[TreeState::built_in_test invariant 9] {} carries epoch {} at epoch {epoch}",
                    request.request_id, request.epoch
                ));
            }
        }
        for (parent, page_state) in self.paging.pages() {
            for (page, request_id) in page_state.loading_pages.iter() {
                let registered = inflight.get(request_id).is_some_and(|request| {
                    request.kind
                        == RequestKind::Page {
                            parent: parent.clone(),
                            page_index: *page,
                        }
                });
                if !registered {
                    errors.push(format!(
                        "[TreeState::built_in_test invariant 2] page {page} of {parent} is loading under unregistered {request_id}"
                    ));
                }
                if page_state.loaded_pages.contains(page) {
                    errors.push(format!(
                        "[TreeState::built_in_test invariant 6] page {page} of {parent} is both loaded and loading"
                    ));
                }
            }
        }
        for (parent, request_id) in self.paging.loading_children.iter() {
            let registered = inflight.get(request_id).is_some_and(|request| {
                request.kind
                    == RequestKind::Children {
                        parent: parent.clone(),
                    }
            });
            if !registered {
                errors.push(format!(
                    "[TreeState::built_in_test invariant 2] children of {parent} are loading under unregistered {request_id}"
                ));
            }
        }
        if let Some(navigation) = self.navigation.as_ref() {
            if let Some(request_id) = navigation.awaited_request() {
                if !inflight.contains_key(&request_id) {
                    errors.push(format!(
                        "[TreeState::built_in_test invariant 2] navigation to {} awaits unregistered {request_id}",
                        navigation.target_id
                    ));
                }
            }
            if navigation.status == NavigationStatus::ResolvingPath && navigation.request_id.is_none() {
                errors.push(format!(
                    "[TreeState::built_in_test invariant 2] navigation to {} resolves without a request",
                    navigation.target_id
                ));
            }
        }
    }

    fn check_sets(&self, errors: &mut Vec<String>) {
        let unknown_selected = self
            .selection
            .selected_ids()
            .iter()
            .filter(|id| !self.index.contains(id))
            .collect::<BTreeSet<_>>();
        if !unknown_selected.is_empty() {
            errors.push(format!(
                "[TreeState::built_in_test invariant 4] selected ids are not in the index: {unknown_selected:?}"
            ));
        }
        for id in self.expanded.iter() {
            match self.index.get(id) {
                None => errors.push(format!(
                    "[TreeState::built_in_test invariant 4] expanded id {id} is not in the index"
                )),
                Some(node) if node.is_leaf => errors.push(format!(
                    "[TreeState::built_in_test invariant 4] leaf {id} is marked expanded"
                )),
                Some(_) => {}
            }
        }
    }
}

fn check_unique<'a>(
    parent: &ParentKey,
    what: &str,
    ids: impl IntoIterator<Item = &'a NodeId>,
    errors: &mut Vec<String>,
) {
    let mut seen = BTreeSet::new();
    for id in ids {
        if !seen.insert(id) {
            errors.push(format!(
                "[TreeState::built_in_test invariant 3] {id} appears twice in the {what} of {parent}"
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_child_ids_are_reported() {
        let parent = ParentKey::Node(NodeId::new("big"));
        let ids = ["a", "b", "a"].map(NodeId::new);
        let mut errors = Vec::new();
        check_unique(&parent, "children", &ids, &mut errors);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("a appears twice in the children of big"));

        errors.clear();
        check_unique(&parent, "children", &ids[..2], &mut errors);
        assert!(errors.is_empty());
    }
}
