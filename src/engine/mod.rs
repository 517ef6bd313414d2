//! The tree engine: a deterministic reducer over [`TreeState`].
//!
//! - `state`: the state value and its accessors
//! - `reducer`: event routing and the per-dispatch finalize pass
//! - `invariants`: the debug-build invariant checks
//! - `snapshot`: read-only selectors, including index-addressable rows
//! - `replay`: event logs and deterministic replay
//!
//! A dispatch never performs I/O. Loads are returned as [`TreeCommand`]s and come back as
//! completion events, in any order.
use std::{
    collections::BTreeMap,
    sync::{Arc, Weak},
};

use parking_lot::Mutex;

use crate::{
    commands::TreeCommand,
    config::TreeConfig,
    error::SylvaError,
    event::TreeEvent,
    filter::{NodeMatcher, TextMatcher},
};

mod invariants;
mod reducer;
pub mod replay;
pub mod snapshot;
pub mod state;

pub(crate) use state::EngineContext;
pub use replay::EventLog;
pub use snapshot::{ProjectedRow, TreeSnapshot};
pub use state::{TreeState, Viewport, ERROR_HISTORY_LIMIT};


type Listener = Arc<dyn Fn(&TreeSnapshot) + Send + Sync>;

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    listeners: BTreeMap<u64, Listener>,
}

/// Handle for a registered listener. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes its listener"]
pub struct Subscription {
    id: u64,
    subscribers: Weak<Mutex<Subscribers>>,
}

impl Subscription {
    /// Consume the handle; the listener is removed by `Drop`.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            subscribers.lock().listeners.remove(&self.id);
        }
    }
}

pub struct TreeEngine {
    ctx: EngineContext,
    state: TreeState,
    subscribers: Arc<Mutex<Subscribers>>,
    recording: Option<EventLog>,
}

impl std::fmt::Debug for TreeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeEngine")
            .field("ctx", &self.ctx)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl TreeEngine {
    pub fn new(config: TreeConfig) -> Result<TreeEngine, SylvaError> {
        TreeEngine::with_matcher(config, TextMatcher)
    }

    pub fn with_matcher(
        config: TreeConfig,
        matcher: impl NodeMatcher + 'static,
    ) -> Result<TreeEngine, SylvaError> {
        config.validate()?;
        Ok(TreeEngine {
            ctx: EngineContext {
                config,
                matcher: Arc::new(matcher),
            },
            state: TreeState::default(),
            subscribers: Arc::new(Mutex::new(Subscribers::default())),
            recording: None,
        })
    }

    pub fn config(&self) -> &TreeConfig {
        &self.ctx.config
    }

    pub fn state(&self) -> &TreeState {
        &self.state
    }

    pub fn snapshot(&self) -> TreeSnapshot<'_> {
        TreeSnapshot::new(&self.state, &self.ctx.config)
    }

    /// Apply one event and notify subscribers if it changed anything.
    pub fn dispatch(&mut self, event: TreeEvent) -> Vec<TreeCommand> {
        let (commands, applied) = self.apply(event);
        if applied {
            self.notify();
        }
        commands
    }

    /// Apply events in order, concatenating their commands. Subscribers are notified once.
    pub fn batch(&mut self, events: impl IntoIterator<Item = TreeEvent>) -> Vec<TreeCommand> {
        let mut commands = Vec::new();
        let mut applied_any = false;
        for event in events {
            let (event_commands, applied) = self.apply(event);
            commands.extend(event_commands);
            applied_any |= applied;
        }
        if applied_any {
            self.notify();
        }
        commands
    }

    fn apply(&mut self, event: TreeEvent) -> (Vec<TreeCommand>, bool) {
        if let Some(log) = self.recording.as_mut() {
            log.record(event.clone());
        }
        let transition = self.state.reduce(&self.ctx, event);
        #[cfg(debug_assertions)]
        if transition.applied {
            let errors = self.state.built_in_test(&self.ctx, true);
            debug_assert!(
                errors.is_empty(),
                "Tree engine invariants violated:\n{}",
                errors.join("\n")
            );
        }
        (transition.commands, transition.applied)
    }

    pub fn subscribe(&self, listener: impl Fn(&TreeSnapshot) + Send + Sync + 'static) -> Subscription {
        let mut subscribers = self.subscribers.lock();
        subscribers.next_id += 1;
        let id = subscribers.next_id;
        subscribers.listeners.insert(id, Arc::new(listener));
        Subscription {
            id,
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    fn notify(&self) {
        let listeners = self
            .subscribers
            .lock()
            .listeners
            .values()
            .cloned()
            .collect::<Vec<_>>();
        let snapshot = self.snapshot();
        for listener in listeners {
            listener(&snapshot);
        }
    }

    /// Run the invariant checks, including the ones that rebuild derived data.
    pub fn built_in_test(&self) -> Vec<String> {
        self.state.built_in_test(&self.ctx, true)
    }

    /// Start recording dispatched events, discarding any earlier recording.
    pub fn start_recording(&mut self) {
        self.recording = Some(EventLog::new());
    }

    pub fn take_recording(&mut self) -> Option<EventLog> {
        self.recording.take()
    }
}
