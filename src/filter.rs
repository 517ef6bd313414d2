//! Query matching and the match / ancestor-of-match sets.
use std::{borrow::Cow, collections::BTreeSet};

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::{
    index::NodeIndex,
    node::{NodeId, NodeRecord},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    #[default]
    Contains,
    StartsWith,
    Exact,
    Regex,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterQuery {
    pub text: String,
    pub mode: MatchMode,
    pub case_sensitive: bool,
}

impl FilterQuery {
    pub fn contains(text: impl Into<String>) -> Self {
        FilterQuery {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_mode(mut self, mode: MatchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn case_sensitive(mut self) -> Self {
        self.case_sensitive = true;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

fn normalize(text: &str, case_sensitive: bool) -> Cow<'_, str> {
    if text.is_ascii() {
        if case_sensitive || !text.bytes().any(|b| b.is_ascii_uppercase()) {
            return Cow::Borrowed(text);
        }
        return Cow::Owned(text.to_ascii_lowercase());
    }
    let composed = text.nfkc().collect::<String>();
    if case_sensitive {
        Cow::Owned(composed)
    } else {
        Cow::Owned(composed.to_lowercase())
    }
}

#[derive(Debug, Clone)]
enum Pattern {
    Literal(String),
    Regex(Regex),
}

/// A query prepared once per filter pass.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    query: FilterQuery,
    pattern: Pattern,
}

impl CompiledQuery {
    pub fn new(query: &FilterQuery) -> Self {
        let pattern = match query.mode {
            MatchMode::Regex => match RegexBuilder::new(&query.text)
                .case_insensitive(!query.case_sensitive)
                .build()
            {
                Ok(regex) => Pattern::Regex(regex),
                Err(e) => {
                    tracing::warn!(
                        "Invalid filter regex {:?}, matching it literally: {}",
                        query.text,
                        e
                    );
                    Pattern::Literal(normalize(&query.text, query.case_sensitive).into_owned())
                }
            },
            _ => Pattern::Literal(normalize(&query.text, query.case_sensitive).into_owned()),
        };
        CompiledQuery {
            query: query.clone(),
            pattern,
        }
    }

    pub fn query(&self) -> &FilterQuery {
        &self.query
    }

    pub fn is_match(&self, text: &str) -> bool {
        match &self.pattern {
            Pattern::Regex(regex) => regex.is_match(&normalize(text, true)),
            Pattern::Literal(needle) => {
                let haystack = normalize(text, self.query.case_sensitive);
                match self.query.mode {
                    MatchMode::StartsWith => haystack.starts_with(needle.as_str()),
                    MatchMode::Exact => haystack == needle.as_str(),
                    MatchMode::Contains | MatchMode::Regex => haystack.contains(needle.as_str()),
                }
            }
        }
    }
}

/// Decides whether a node matches the active query.
pub trait NodeMatcher: Send + Sync {
    fn matches(&self, node: &NodeRecord, query: &CompiledQuery) -> bool;
}

/// Matches the node's search text, falling back to its label.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextMatcher;

impl NodeMatcher for TextMatcher {
    fn matches(&self, node: &NodeRecord, query: &CompiledQuery) -> bool {
        query.is_match(node.search_text())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    query: Option<FilterQuery>,
    matched: BTreeSet<NodeId>,
    ancestors: BTreeSet<NodeId>,
}

impl FilterState {
    pub fn query(&self) -> Option<&FilterQuery> {
        self.query.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.query.is_some()
    }

    pub fn matched_ids(&self) -> &BTreeSet<NodeId> {
        &self.matched
    }

    pub fn ancestor_ids(&self) -> &BTreeSet<NodeId> {
        &self.ancestors
    }

    pub fn is_match(&self, id: &NodeId) -> bool {
        self.matched.contains(id)
    }

    pub fn is_ancestor_of_match(&self, id: &NodeId) -> bool {
        self.ancestors.contains(id)
    }

    /// Replace the query. Returns false when nothing changed.
    pub(crate) fn set_query(&mut self, query: Option<FilterQuery>) -> bool {
        if self.query == query {
            return false;
        }
        self.query = query;
        if self.query.is_none() {
            self.matched.clear();
            self.ancestors.clear();
        }
        true
    }

    pub(crate) fn recompute(&mut self, index: &NodeIndex, matcher: &dyn NodeMatcher) {
        match &self.query {
            Some(query) => {
                let (matched, ancestors) = compute_matches(index, query, matcher);
                self.matched = matched;
                self.ancestors = ancestors;
            }
            None => {
                self.matched.clear();
                self.ancestors.clear();
            }
        }
    }
}

/// One pass over known nodes, then one climb per match that stops at the first ancestor
/// already recorded.
pub fn compute_matches(
    index: &NodeIndex,
    query: &FilterQuery,
    matcher: &dyn NodeMatcher,
) -> (BTreeSet<NodeId>, BTreeSet<NodeId>) {
    let compiled = CompiledQuery::new(query);
    let matched = index
        .nodes()
        .values()
        .filter(|node| matcher.matches(node, &compiled))
        .map(|node| node.id.clone())
        .collect::<BTreeSet<_>>();

    let mut ancestors = BTreeSet::new();
    for id in matched.iter() {
        let mut current = index.get(id).and_then(|node| node.parent_id.clone());
        while let Some(parent_id) = current {
            if !ancestors.insert(parent_id.clone()) {
                break;
            }
            current = index.get(&parent_id).and_then(|node| node.parent_id.clone());
        }
    }
    tracing::debug!(
        "Filter {:?} matched {} node(s) with {} ancestor(s)",
        query.text,
        matched.len(),
        ancestors.len()
    );
    (matched, ancestors)
}
