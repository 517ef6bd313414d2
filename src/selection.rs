//! Selection over the projection order.
use std::collections::BTreeSet;

use crate::{
    config::SelectionMode,
    engine::{EngineContext, TreeState},
    event::SelectIntent,
    index::NodeIndex,
    node::{NodeId, RowKey},
    projection::{Projection, RowRef},
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionState {
    selected: BTreeSet<NodeId>,
    /// Origin of range selections: the last row selected without `Range` intent.
    anchor: Option<NodeId>,
}

fn is_selectable(index: &NodeIndex, id: &NodeId) -> bool {
    index.get(id).is_some_and(|node| !node.disabled)
}

impl SelectionState {
    pub fn selected_ids(&self) -> &BTreeSet<NodeId> {
        &self.selected
    }

    pub fn is_selected(&self, id: &NodeId) -> bool {
        self.selected.contains(id)
    }

    pub fn anchor(&self) -> Option<&NodeId> {
        self.anchor.as_ref()
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// Apply one selection intent. Returns false when the target cannot be selected.
    ///
    /// Under `Single` every intent replaces the selection with the target.
    pub(crate) fn select(
        &mut self,
        mode: SelectionMode,
        target: &NodeId,
        intent: SelectIntent,
        projection: &Projection,
        index: &NodeIndex,
    ) -> bool {
        if mode == SelectionMode::None || !is_selectable(index, target) {
            return false;
        }
        match (mode, intent) {
            (SelectionMode::Multiple, SelectIntent::Toggle) => {
                if !self.selected.remove(target) {
                    self.selected.insert(target.clone());
                }
                self.anchor = Some(target.clone());
            }
            (SelectionMode::Multiple, SelectIntent::Range) => {
                let bounds = self.anchor.as_ref().and_then(|anchor| {
                    let from = projection.index_of(&RowKey::Node(anchor.clone()))?;
                    let to = projection.index_of(&RowKey::Node(target.clone()))?;
                    Some((from.min(to), from.max(to)))
                });
                match bounds {
                    Some((low, high)) => {
                        self.selected = projection
                            .rows(low..high + 1)
                            .filter_map(|row| match row {
                                RowRef::Node { id, .. } if is_selectable(index, id) => {
                                    Some(id.clone())
                                }
                                _ => None,
                            })
                            .collect();
                    }
                    None => {
                        self.replace_with(target);
                        self.anchor = Some(target.clone());
                    }
                }
            }
            _ => {
                self.replace_with(target);
                self.anchor = Some(target.clone());
            }
        }
        true
    }

    fn replace_with(&mut self, target: &NodeId) {
        self.selected.clear();
        self.selected.insert(target.clone());
    }

    pub(crate) fn select_all(&mut self, projection: &Projection, index: &NodeIndex) {
        self.selected = projection
            .rows(0..projection.total())
            .filter_map(|row| match row {
                RowRef::Node { id, .. } if is_selectable(index, id) => Some(id.clone()),
                _ => None,
            })
            .collect();
    }

    pub(crate) fn clear(&mut self) {
        self.selected.clear();
        self.anchor = None;
    }

    /// Drop ids the index no longer knows.
    pub(crate) fn retain_known(&mut self, index: &NodeIndex) {
        self.selected.retain(|id| index.contains(id));
        if self.anchor.as_ref().is_some_and(|id| !index.contains(id)) {
            self.anchor = None;
        }
    }
}

impl TreeState {
    pub(crate) fn on_select(&mut self, ctx: &EngineContext, node_id: &NodeId, intent: SelectIntent) {
        let selected = self.selection.select(
            ctx.config.selection.mode,
            node_id,
            intent,
            &self.projection,
            &self.index,
        );
        if selected {
            self.focus_key_if_visible(RowKey::Node(node_id.clone()));
        }
    }

    pub(crate) fn on_select_all(&mut self, ctx: &EngineContext) {
        if ctx.config.selection.mode == SelectionMode::Multiple {
            self.selection.select_all(&self.projection, &self.index);
        }
    }

    pub(crate) fn on_deselect_all(&mut self, ctx: &EngineContext) {
        if ctx.config.selection.mode != SelectionMode::None {
            self.selection.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::FilterDisplay,
        filter::FilterState,
        index::RootSource,
        node::{NodeInput, ParentKey},
        projection::ProjectionInput,
    };
    use std::collections::BTreeMap;

    fn flat(count: usize) -> (NodeIndex, Projection) {
        let mut index = NodeIndex::new(RootSource::Static);
        let mut wants = Vec::new();
        let ids = (0..count)
            .map(|i| {
                let mut input = NodeInput::leaf(format!("n{i}"), format!("Node {i}"));
                input.disabled = i == 2;
                index.upsert(&input, &ParentKey::Root, &mut wants)
            })
            .collect();
        index.set_children(&ParentKey::Root, ids);
        let projection = Projection::build(&ProjectionInput {
            index: &index,
            expanded: &BTreeSet::new(),
            pages: &BTreeMap::new(),
            filter: &FilterState::default(),
            display: FilterDisplay::Filter,
            show_parents_of_matches: true,
        });
        (index, projection)
    }

    fn id(name: &str) -> NodeId {
        NodeId::new(name)
    }

    #[test]
    fn single_mode_replaces() {
        let (index, projection) = flat(3);
        let mut selection = SelectionState::default();
        selection.select(SelectionMode::Single, &id("n0"), SelectIntent::Replace, &projection, &index);
        selection.select(SelectionMode::Single, &id("n1"), SelectIntent::Replace, &projection, &index);
        assert_eq!(selection.selected_ids(), &BTreeSet::from([id("n1")]));
        selection.select(SelectionMode::Single, &id("n1"), SelectIntent::Toggle, &projection, &index);
        assert_eq!(selection.selected_ids(), &BTreeSet::from([id("n1")]));
        selection.select(SelectionMode::Single, &id("n2"), SelectIntent::Toggle, &projection, &index);
        assert_eq!(selection.selected_ids(), &BTreeSet::from([id("n2")]));
        assert_eq!(selection.anchor(), Some(&id("n2")));
    }

    #[test]
    fn range_follows_projection_and_skips_disabled() {
        let (index, projection) = flat(5);
        let mut selection = SelectionState::default();
        selection.select(SelectionMode::Multiple, &id("n0"), SelectIntent::Replace, &projection, &index);
        selection.select(SelectionMode::Multiple, &id("n4"), SelectIntent::Range, &projection, &index);
        assert_eq!(
            selection.selected_ids(),
            &BTreeSet::from([id("n0"), id("n1"), id("n3"), id("n4")])
        );
        assert_eq!(selection.anchor(), Some(&id("n0")));
    }

    #[test]
    fn disabled_and_unknown_rows_are_ignored() {
        let (index, projection) = flat(3);
        let mut selection = SelectionState::default();
        assert!(!selection.select(SelectionMode::Multiple, &id("n2"), SelectIntent::Toggle, &projection, &index));
        assert!(!selection.select(SelectionMode::Multiple, &id("zz"), SelectIntent::Toggle, &projection, &index));
        assert!(!selection.select(SelectionMode::None, &id("n0"), SelectIntent::Replace, &projection, &index));
        assert!(selection.is_empty());
    }
}
