//! Loading `TreeConfig` from TOML files on disk.

use std::fs;

use sylva_core::{
    config::{FilterDisplay, SelectionMode, TreeConfig, VirtualizationMode},
    engine::TreeEngine,
    SylvaError,
};
use tempfile::TempDir;
use test_log::test;

#[test]
fn test_missing_file_yields_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config = TreeConfig::load(temp_dir.path().join("sylva.toml")).unwrap();
    assert_eq!(config, TreeConfig::default());
}

#[test]
fn test_file_overrides_sections() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("sylva.toml");
    fs::write(
        &path,
        r#"
[virtualization]
mode = "always"
item_size = 32.0

[page_aware]
enabled = true
default_page_size = 200

[selection]
mode = "multiple"
show_checkboxes = true

[filtering]
mode = "highlight"
auto_expand_matches = true
"#,
    )
    .unwrap();

    let config = TreeConfig::load(&path).unwrap();
    assert_eq!(config.virtualization.mode, VirtualizationMode::Always);
    assert_eq!(config.virtualization.item_size, 32.0);
    assert_eq!(config.page_aware.default_page_size, 200);
    assert_eq!(config.selection.mode, SelectionMode::Multiple);
    assert!(config.selection.show_checkboxes);
    assert_eq!(config.filtering.mode, FilterDisplay::Highlight);
    assert!(config.filtering.show_parents_of_matches);
    assert!(config.keyboard.typeahead);

    let engine = TreeEngine::new(config.clone()).unwrap();
    assert_eq!(engine.config(), &config);
}

#[test]
fn test_written_config_loads_back() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("sylva.toml");
    let config = TreeConfig::default()
        .page_aware(75)
        .with_selection(SelectionMode::None);
    fs::write(&path, config.to_toml_string().unwrap()).unwrap();
    assert_eq!(TreeConfig::load(&path).unwrap(), config);
}

#[test]
fn test_invalid_files_are_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("sylva.toml");

    fs::write(&path, "[virtualization]\nitem_size = -1.0\n").unwrap();
    assert!(matches!(TreeConfig::load(&path), Err(SylvaError::Config(_))));

    fs::write(&path, "[selection]\nmode = \"sometimes\"\n").unwrap();
    assert!(matches!(
        TreeConfig::load(&path),
        Err(SylvaError::Serialization(_))
    ));
}
