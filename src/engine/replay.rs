use serde::{Deserialize, Serialize};

use crate::{
    commands::TreeCommand,
    config::TreeConfig,
    engine::TreeEngine,
    error::SylvaError,
    event::TreeEvent,
};

/// An ordered record of dispatched events.
///
/// Replaying a log into a fresh engine with the same configuration reproduces the recorded
/// engine's state and every command list it returned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventLog {
    pub events: Vec<TreeEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        EventLog::default()
    }

    pub fn record(&mut self, event: TreeEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn to_json(&self) -> Result<String, SylvaError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<EventLog, SylvaError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Feed every event into `engine`, returning the command list of each dispatch.
    pub fn replay_into(&self, engine: &mut TreeEngine) -> Vec<Vec<TreeCommand>> {
        self.events
            .iter()
            .cloned()
            .map(|event| engine.dispatch(event))
            .collect()
    }

    /// Replay into a new engine built from `config` with the default matcher.
    pub fn replay(&self, config: TreeConfig) -> Result<(TreeEngine, Vec<Vec<TreeCommand>>), SylvaError> {
        let mut engine = TreeEngine::new(config)?;
        let commands = self.replay_into(&mut engine);
        Ok((engine, commands))
    }
}
