//! # sylva-core
//!
//! A deterministic, page-aware tree state machine for virtualized views over very large
//! hierarchies (hundreds of thousands of nodes).
//!
//! ## Overview
//!
//! The engine is a pure event reducer. The host feeds it [`TreeEvent`]s (user input, viewport
//! changes, load completions) and executes the [`TreeCommand`]s it returns (load requests,
//! scroll requests, notifications). Rendering reads index-addressable selectors from a
//! [`TreeSnapshot`](engine::TreeSnapshot); the flattened row list is never materialized, and
//! unloaded slots of paged parents appear as placeholder rows without costing memory.
//!
//! Every load request carries a request id and the engine's epoch. Filter changes, refreshes,
//! and re-initialization bump the epoch, so completions of superseded requests are discarded
//! no matter what order they arrive in.
//!
//! ## Architecture
//!
//! - **[`node`]** / **[`index`]**: node identity and the normalized node arena
//! - **[`projection`]**: flattening of the expanded tree into index-addressable rows
//! - **[`filter`]**: query matching and the match / ancestor-of-match sets
//! - **[`selection`]**: single, toggle, and range selection
//! - **[`paging`]**: page states, the in-flight registry, and the range loader
//! - **[`navigation`]**: keyboard focus, typeahead, and pinned navigation
//! - **[`engine`]**: the reducer facade with `dispatch`, `batch`, `subscribe`, `snapshot`
//! - **[`host`]**: a tokio driver that runs commands against an async [`host::TreeAdapter`]
//!
//! ## Quick Start
//!
//! ```rust
//! use sylva_core::{
//!     config::TreeConfig,
//!     engine::TreeEngine,
//!     event::{RootInit, TreeEvent},
//!     node::NodeInput,
//! };
//!
//! let mut engine = TreeEngine::new(TreeConfig::default().page_aware(50)).unwrap();
//! engine.dispatch(TreeEvent::Init {
//!     roots: RootInit::Static(vec![NodeInput::new("big", "Big folder").with_total_children(100)]),
//! });
//! engine.dispatch(TreeEvent::Expand { node_id: "big".into() });
//! let commands = engine.dispatch(TreeEvent::ViewportRangeChanged { start: 0, end: 60, overscan: 5 });
//! assert_eq!(commands.len(), 2); // pages 0 and 1
//! assert_eq!(engine.snapshot().total_count(), 101);
//! ```
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod filter;
#[cfg(not(target_arch = "wasm32"))]
pub mod host;
pub mod index;
pub mod navigation;
pub mod node;
pub mod paging;
pub mod projection;
pub mod selection;

pub use commands::TreeCommand;
pub use engine::{TreeEngine, TreeSnapshot};
pub use error::SylvaError;
pub use event::TreeEvent;

#[cfg(test)]
mod tests;
