//! sylva CLI tool
//!
//! Command-line interface for inspecting tree engine behavior.
//!
//! ## Commands
//!
//! - `replay <log>`: Replay a recorded JSON event log and print the resulting rows
//! - `simulate`: Drive a synthetic paged tree through the tokio host and report load activity
//! - `config [path]`: Print the effective configuration as TOML

use clap::{Parser, Subcommand};
use std::{path::PathBuf, sync::Arc};
use sylva_core::{
    config::TreeConfig,
    engine::{EventLog, TreeEngine, TreeSnapshot},
    event::{RootInit, TreeEvent},
    host::{ChildrenPage, HostNotification, HostOptions, TreeAdapter, TreeHost},
    node::{NodeId, NodeInput, ParentKey, PathStep},
    SylvaError,
};

#[derive(Parser)]
#[command(name = "sylva")]
#[command(author, version, about = "A tool for exercising the sylva tree engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON event log into a fresh engine
    Replay {
        /// Path to the event log
        log: PathBuf,

        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of rows to print
        #[arg(short, long, default_value_t = 20)]
        rows: usize,

        /// Print every command the replay produced
        #[arg(short, long)]
        verbose: bool,
    },

    /// Scroll through a synthetic paged tree served by an in-process adapter
    Simulate {
        /// Number of top-level folders
        #[arg(long, default_value_t = 500)]
        folders: usize,

        /// Number of files in each folder
        #[arg(long, default_value_t = 1000)]
        files: usize,

        /// Number of viewport steps
        #[arg(long, default_value_t = 20)]
        steps: usize,

        /// Node to navigate to after scrolling, e.g. `f42/917`
        #[arg(long)]
        navigate: Option<String>,

        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the effective configuration
    Config {
        /// Configuration file path
        path: Option<PathBuf>,
    },
}

/// Serves `folders` paged roots, each holding `files` paged leaves.
struct SyntheticAdapter {
    folders: usize,
    files: usize,
    page_size: usize,
}

impl SyntheticAdapter {
    fn listing(&self, parent: &ParentKey, start: usize, end: usize) -> Result<ChildrenPage, SylvaError> {
        let (total, items) = match parent {
            ParentKey::Root => {
                let end = end.min(self.folders);
                let items = (start.min(end)..end)
                    .map(|i| {
                        NodeInput::new(format!("f{i}"), format!("Folder {i}"))
                            .with_total_children(self.files)
                    })
                    .collect();
                (self.folders, items)
            }
            ParentKey::Node(id) => {
                let end = end.min(self.files);
                let items = (start.min(end)..end)
                    .map(|j| NodeInput::leaf(format!("{id}/{j}"), format!("File {id}.{j}")))
                    .collect();
                (self.files, items)
            }
        };
        Ok(ChildrenPage {
            items,
            total_count: Some(total),
        })
    }

    fn slot_of(&self, id: &str) -> Option<(Option<NodeId>, usize)> {
        match id.split_once('/') {
            Some((folder, file)) => {
                let file = file.parse::<usize>().ok().filter(|j| *j < self.files)?;
                self.slot_of(folder)?;
                Some((Some(NodeId::new(folder)), file))
            }
            None => {
                let folder = id.strip_prefix('f')?.parse::<usize>().ok()?;
                (folder < self.folders).then_some((None, folder))
            }
        }
    }
}

impl TreeAdapter for SyntheticAdapter {
    async fn load_children(&self, parent: ParentKey) -> Result<ChildrenPage, SylvaError> {
        self.listing(&parent, 0, usize::MAX)
    }

    async fn load_page(
        &self,
        parent: ParentKey,
        page_index: usize,
        page_size: usize,
    ) -> Result<ChildrenPage, SylvaError> {
        let start = page_index.saturating_mul(page_size);
        self.listing(&parent, start, start.saturating_add(page_size))
    }

    async fn resolve_path(&self, target: NodeId) -> Result<Vec<PathStep>, SylvaError> {
        let (folder, slot) = self
            .slot_of(&target)
            .ok_or_else(|| SylvaError::NotFound(format!("no node {target}")))?;
        let mut steps = Vec::new();
        if let Some(folder) = folder {
            let (_, folder_slot) = self
                .slot_of(&folder)
                .ok_or_else(|| SylvaError::NotFound(format!("no folder {folder}")))?;
            steps.push(PathStep::new(folder).with_page_hint(folder_slot / self.page_size));
        }
        steps.push(PathStep::new(target).with_page_hint(slot / self.page_size));
        Ok(steps)
    }
}

fn load_config(path: Option<PathBuf>) -> Result<TreeConfig, SylvaError> {
    match path {
        Some(path) => TreeConfig::load(path),
        None => Ok(TreeConfig::default().page_aware(sylva_core::config::DEFAULT_PAGE_SIZE)),
    }
}

fn print_rows(snapshot: &TreeSnapshot, start: usize, count: usize) {
    for row in snapshot.rows(start..start.saturating_add(count)) {
        let indent = "  ".repeat(row.depth);
        let marker = if row.is_placeholder {
            " "
        } else if row.is_leaf {
            "-"
        } else if row.is_expanded {
            "v"
        } else {
            ">"
        };
        let label = match row.label {
            Some(label) => label.to_string(),
            None if row.is_failed => "(failed)".to_string(),
            None if row.is_loading => "(loading)".to_string(),
            None => "(not loaded)".to_string(),
        };
        let focus = if row.is_focused { "*" } else { " " };
        println!("{focus}{:>8} {indent}{marker} {label}", row.flat_index);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            log,
            config,
            rows,
            verbose,
        } => {
            let config = load_config(config)?;
            let log = EventLog::from_json(&std::fs::read_to_string(&log)?)?;
            let mut engine = TreeEngine::new(config)?;
            let commands = log.replay_into(&mut engine);
            if verbose {
                for (event, commands) in log.events.iter().zip(commands.iter()) {
                    println!("{event}");
                    for command in commands {
                        println!("    -> {command}");
                    }
                }
            }

            let snapshot = engine.snapshot();
            println!("\n=== Replay Results ===");
            println!("Events: {}", log.len());
            println!("Commands: {}", commands.iter().map(Vec::len).sum::<usize>());
            println!("Epoch: {}", snapshot.epoch());
            println!("Rows: {}", snapshot.total_count());
            println!("Selected: {}", snapshot.selected_ids().len());
            println!("In flight: {}", snapshot.state().paging().inflight().len());
            println!();
            print_rows(&snapshot, 0, rows);

            let violations = engine.built_in_test();
            if !violations.is_empty() {
                return Err(SylvaError::Invariant(violations.join("; ")).into());
            }
            Ok(())
        }

        Commands::Simulate {
            folders,
            files,
            steps,
            navigate,
            config,
        } => {
            let config = load_config(config)?;
            let page_size = config.page_aware.default_page_size;
            let adapter = Arc::new(SyntheticAdapter {
                folders,
                files,
                page_size,
            });
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(async {
                let (mut host, mut rx) =
                    TreeHost::new(TreeEngine::new(config)?, adapter, HostOptions::default());
                host.dispatch(TreeEvent::Init {
                    roots: RootInit::Paged {
                        page_size: None,
                        total_count: None,
                    },
                });
                host.settle().await?;
                for i in 0..folders.min(3) {
                    host.dispatch(TreeEvent::Expand {
                        node_id: format!("f{i}").into(),
                    });
                }

                let window = 40;
                for step in 0..steps {
                    let total = host.engine().snapshot().total_count();
                    let start = (step * total / steps.max(1)).min(total.saturating_sub(1));
                    host.dispatch(TreeEvent::ViewportRangeChanged {
                        start,
                        end: start + window,
                        overscan: window / 2,
                    });
                    host.settle().await?;
                }
                if let Some(target) = navigate {
                    host.dispatch(TreeEvent::NavigateToNode {
                        target_id: target.into(),
                    });
                    host.settle().await?;
                }

                let mut errors = 0;
                while let Ok(notification) = rx.try_recv() {
                    match notification {
                        HostNotification::LoadError(error) => {
                            errors += 1;
                            println!("[Error] {error}");
                        }
                        HostNotification::NavigationResult { target_id, outcome } => {
                            println!("[Navigation] {target_id}: {outcome:?}");
                        }
                        _ => {}
                    }
                }

                let snapshot = host.engine().snapshot();
                println!("\n=== Simulation Results ===");
                println!("Rows: {}", snapshot.total_count());
                println!("Known nodes: {}", snapshot.state().index().len());
                println!("Load errors: {errors}");
                let focus = snapshot.focus_index().unwrap_or(0);
                println!();
                print_rows(&snapshot, focus.saturating_sub(5), 11);
                Ok::<(), SylvaError>(())
            })?;
            Ok(())
        }

        Commands::Config { path } => {
            let config = match path {
                Some(path) => TreeConfig::load(path)?,
                None => TreeConfig::default(),
            };
            println!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}
