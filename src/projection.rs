//! Flattening of the expanded tree into index-addressable rows.
//!
//! The projection never stores a row list. Every visible container (the root, or an expanded
//! node) keeps a list of segments: either a node together with the rows its visible subtree
//! spans, or a run of placeholder slots. Each container also keeps cumulative segment ends, so
//! [`Projection::locate`] descends by binary search and [`Projection::index_of`] climbs parent
//! links. Memory is proportional to visible loaded nodes; placeholder runs cost one segment
//! regardless of their length.
use std::{
    collections::{BTreeMap, BTreeSet},
    ops::Range,
};

use crate::{
    config::FilterDisplay,
    filter::FilterState,
    index::NodeIndex,
    node::{NodeId, ParentKey, RowKey},
    paging::PageState,
};

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Node {
        id: NodeId,
        /// False for an ancestor-of-match whose own row is hidden.
        own_row: bool,
        span: usize,
    },
    Placeholders {
        first_slot: usize,
        len: usize,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Container {
    depth: usize,
    segments: Vec<Segment>,
    ends: Vec<usize>,
}

impl Container {
    fn start_of(&self, segment: usize) -> usize {
        if segment == 0 {
            0
        } else {
            self.ends[segment - 1]
        }
    }

    fn push(&mut self, segment: Segment, span: usize) {
        let end = self.ends.last().copied().unwrap_or(0) + span;
        self.segments.push(segment);
        self.ends.push(end);
    }

    fn len(&self) -> usize {
        self.ends.last().copied().unwrap_or(0)
    }
}

/// Everything a rebuild reads.
pub struct ProjectionInput<'a> {
    pub index: &'a NodeIndex,
    pub expanded: &'a BTreeSet<NodeId>,
    pub pages: &'a BTreeMap<ParentKey, PageState>,
    pub filter: &'a FilterState,
    pub display: FilterDisplay,
    pub show_parents_of_matches: bool,
}

impl ProjectionInput<'_> {
    fn hides_rows(&self) -> bool {
        self.filter.is_active() && self.display == FilterDisplay::Filter
    }

    fn needs_load(&self, key: &ParentKey) -> bool {
        match self.pages.get(key) {
            Some(page_state) => page_state.total_count.is_none(),
            None => !self.index.children_loaded(key),
        }
    }
}

/// A located row, borrowed from the projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RowRef<'a> {
    Node {
        id: &'a NodeId,
        depth: usize,
    },
    Placeholder {
        parent: &'a ParentKey,
        slot: usize,
        depth: usize,
        /// Placeholder rows left in this run, this one included.
        run_remaining: usize,
    },
}

impl RowRef<'_> {
    pub fn key(&self) -> RowKey {
        match self {
            RowRef::Node { id, .. } => RowKey::Node((*id).clone()),
            RowRef::Placeholder { parent, slot, .. } => RowKey::Placeholder {
                parent: (*parent).clone(),
                slot: *slot,
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    containers: BTreeMap<ParentKey, Container>,
    /// Container and segment of every visible node.
    positions: BTreeMap<NodeId, (ParentKey, usize)>,
    pending: Vec<ParentKey>,
    total: usize,
}

impl Projection {
    pub fn build(input: &ProjectionInput) -> Projection {
        let mut projection = Projection::default();
        if input.needs_load(&ParentKey::Root) {
            projection.pending.push(ParentKey::Root);
        }
        projection.total = projection.build_container(input, ParentKey::Root, 0);
        projection
    }

    fn build_container(&mut self, input: &ProjectionInput, key: ParentKey, depth: usize) -> usize {
        let hides = input.hides_rows();
        let mut container = Container {
            depth,
            ..Default::default()
        };

        match input.pages.get(&key) {
            Some(page_state) => {
                let total = page_state.total_count.unwrap_or(0);
                let mut next = 0;
                for (&slot, id) in page_state.slots.range(..total) {
                    if slot > next && !hides {
                        container.push(
                            Segment::Placeholders {
                                first_slot: next,
                                len: slot - next,
                            },
                            slot - next,
                        );
                    }
                    self.visit(input, &key, id, &mut container);
                    next = slot + 1;
                }
                if total > next && !hides {
                    container.push(
                        Segment::Placeholders {
                            first_slot: next,
                            len: total - next,
                        },
                        total - next,
                    );
                }
            }
            None => {
                for id in input.index.children_of(&key) {
                    self.visit(input, &key, id, &mut container);
                }
            }
        }

        let len = container.len();
        if !container.segments.is_empty() {
            self.containers.insert(key, container);
        }
        len
    }

    fn visit(
        &mut self,
        input: &ProjectionInput,
        key: &ParentKey,
        id: &NodeId,
        container: &mut Container,
    ) {
        let Some(node) = input.index.get(id) else {
            return;
        };
        let hides = input.hides_rows();
        let is_match = input.filter.is_match(id);
        if hides && !is_match && !input.filter.is_ancestor_of_match(id) {
            return;
        }
        let own_row = !hides || is_match || input.show_parents_of_matches;
        let mut span = usize::from(own_row);
        if !node.is_leaf && input.expanded.contains(id) {
            let child_key = ParentKey::Node(id.clone());
            if input.needs_load(&child_key) {
                self.pending.push(child_key.clone());
            }
            span += self.build_container(input, child_key, node.depth + 1);
        }
        if span == 0 {
            return;
        }
        self.positions
            .insert(id.clone(), (key.clone(), container.segments.len()));
        container.push(
            Segment::Node {
                id: id.clone(),
                own_row,
                span,
            },
            span,
        );
    }

    /// Number of rows.
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Visible expanded parents whose children are still unknown.
    pub fn pending_containers(&self) -> &[ParentKey] {
        &self.pending
    }

    pub fn is_visible(&self, id: &NodeId) -> bool {
        self.positions.contains_key(id)
    }

    /// Resolve a flat index to its row.
    pub fn locate(&self, index: usize) -> Option<RowRef<'_>> {
        if index >= self.total {
            return None;
        }
        let (mut key, _) = self.containers.get_key_value(&ParentKey::Root)?;
        let mut offset = index;
        loop {
            let container = self.containers.get(key)?;
            let segment = container.ends.partition_point(|end| *end <= offset);
            let start = container.start_of(segment);
            let within = offset - start;
            match container.segments.get(segment)? {
                Segment::Placeholders { first_slot, len } => {
                    return Some(RowRef::Placeholder {
                        parent: key,
                        slot: first_slot + within,
                        depth: container.depth,
                        run_remaining: len - within,
                    });
                }
                Segment::Node { id, own_row, .. } => {
                    if *own_row {
                        if within == 0 {
                            return Some(RowRef::Node {
                                id,
                                depth: container.depth,
                            });
                        }
                        offset = within - 1;
                    } else {
                        offset = within;
                    }
                    let (child_key, _) = self.containers.get_key_value(&ParentKey::Node(id.clone()))?;
                    key = child_key;
                }
            }
        }
    }

    pub fn key_at(&self, index: usize) -> Option<RowKey> {
        self.locate(index).map(|row| row.key())
    }

    /// Flat index of a row, or `None` when it is not visible.
    pub fn index_of(&self, key: &RowKey) -> Option<usize> {
        let (mut container_key, mut index) = match key {
            RowKey::Node(id) => {
                let (container_key, segment) = self.positions.get(id)?;
                let container = self.containers.get(container_key)?;
                match container.segments.get(*segment)? {
                    Segment::Node { own_row: true, .. } => {}
                    _ => return None,
                }
                (container_key, container.start_of(*segment))
            }
            RowKey::Placeholder { parent, slot } => {
                let (container_key, container) = self.containers.get_key_value(parent)?;
                let found = container.segments.iter().enumerate().find_map(|(i, segment)| {
                    match segment {
                        Segment::Placeholders { first_slot, len }
                            if (*first_slot..first_slot + len).contains(slot) =>
                        {
                            Some(container.start_of(i) + slot - first_slot)
                        }
                        _ => None,
                    }
                })?;
                (container_key, found)
            }
        };

        while let ParentKey::Node(parent_id) = container_key {
            let (outer_key, segment) = self.positions.get(parent_id)?;
            let outer = self.containers.get(outer_key)?;
            if let Segment::Node { own_row, .. } = outer.segments.get(*segment)? {
                index += outer.start_of(*segment) + usize::from(*own_row);
            }
            container_key = outer_key;
        }
        Some(index)
    }

    /// Rows in `range`, clamped to the projection.
    pub fn rows(&self, range: Range<usize>) -> impl Iterator<Item = RowRef<'_>> + '_ {
        let end = range.end.min(self.total);
        (range.start.min(end)..end).filter_map(move |index| self.locate(index))
    }
}
