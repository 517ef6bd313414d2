//! Engine configuration.
//!
//! A [`TreeConfig`] is validated once when the engine is constructed and is immutable for the
//! engine's lifetime: there is no event that changes it. To change configuration, build a new
//! engine.
use crate::error::SylvaError;
use serde::{Deserialize, Serialize};
use std::{fs::read_to_string, path::Path};

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const DEFAULT_ITEM_SIZE: f64 = 28.0;
pub const DEFAULT_AUTO_THRESHOLD: usize = 200;
pub const DEFAULT_TYPEAHEAD_TIMEOUT_MS: u64 = 500;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    pub virtualization: VirtualizationConfig,
    pub page_aware: PageAwareConfig,
    pub selection: SelectionConfig,
    pub filtering: FilteringConfig,
    pub pinned: PinnedConfig,
    pub keyboard: KeyboardConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VirtualizationMode {
    Always,
    Never,
    #[default]
    Auto,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualizationConfig {
    pub enabled: bool,
    /// Fixed row height in pixels.
    pub item_size: f64,
    pub mode: VirtualizationMode,
    /// Row count above which `Auto` mode virtualizes.
    pub auto_threshold: usize,
}

impl Default for VirtualizationConfig {
    fn default() -> Self {
        VirtualizationConfig {
            enabled: true,
            item_size: DEFAULT_ITEM_SIZE,
            mode: VirtualizationMode::Auto,
            auto_threshold: DEFAULT_AUTO_THRESHOLD,
        }
    }
}

impl VirtualizationConfig {
    pub fn is_virtualized(&self, row_count: usize) -> bool {
        if !self.enabled {
            return false;
        }
        match self.mode {
            VirtualizationMode::Always => true,
            VirtualizationMode::Never => false,
            VirtualizationMode::Auto => row_count > self.auto_threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageAwareConfig {
    pub enabled: bool,
    pub default_page_size: usize,
}

impl Default for PageAwareConfig {
    fn default() -> Self {
        PageAwareConfig {
            enabled: false,
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    None,
    #[default]
    Single,
    Multiple,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    pub mode: SelectionMode,
    pub show_checkboxes: bool,
}

/// How an active query affects the projection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterDisplay {
    /// Rows that neither match nor lead to a match are removed.
    #[default]
    Filter,
    /// Every row stays; matches are only flagged.
    Highlight,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilteringConfig {
    pub mode: FilterDisplay,
    pub show_parents_of_matches: bool,
    pub auto_expand_matches: bool,
    /// Input debounce for the host; the engine itself never waits.
    pub debounce_ms: u64,
}

impl Default for FilteringConfig {
    fn default() -> Self {
        FilteringConfig {
            mode: FilterDisplay::Filter,
            show_parents_of_matches: true,
            auto_expand_matches: false,
            debounce_ms: 150,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PinnedConfig {
    pub enabled: bool,
    pub label: String,
}

impl Default for PinnedConfig {
    fn default() -> Self {
        PinnedConfig {
            enabled: true,
            label: "Pinned".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyboardConfig {
    pub enabled: bool,
    pub typeahead: bool,
    pub typeahead_timeout_ms: u64,
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        KeyboardConfig {
            enabled: true,
            typeahead: true,
            typeahead_timeout_ms: DEFAULT_TYPEAHEAD_TIMEOUT_MS,
        }
    }
}

impl TreeConfig {
    pub fn from_toml_str(content: &str) -> Result<TreeConfig, SylvaError> {
        let config: TreeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML config file. A missing file yields the defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<TreeConfig, SylvaError> {
        let path = path.as_ref();
        tracing::debug!("Attempting to read tree config from: {:?}", path);
        if !path.exists() {
            tracing::debug!("Config file not found, using defaults.");
            return Ok(TreeConfig::default());
        }
        let content = read_to_string(path)?;
        TreeConfig::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, SylvaError> {
        Ok(toml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), SylvaError> {
        if self.page_aware.default_page_size == 0 {
            return Err(SylvaError::Config(
                "page_aware.default_page_size must be at least 1".to_string(),
            ));
        }
        if !(self.virtualization.item_size.is_finite() && self.virtualization.item_size > 0.0) {
            return Err(SylvaError::Config(format!(
                "virtualization.item_size must be a positive number, got {}",
                self.virtualization.item_size
            )));
        }
        Ok(())
    }

    pub fn page_aware(mut self, default_page_size: usize) -> Self {
        self.page_aware.enabled = true;
        self.page_aware.default_page_size = default_page_size;
        self
    }

    pub fn with_selection(mut self, mode: SelectionMode) -> Self {
        self.selection.mode = mode;
        self
    }

    pub fn with_filter_display(mut self, mode: FilterDisplay) -> Self {
        self.filtering.mode = mode;
        self
    }
}
