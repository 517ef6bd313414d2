//! Drives a [`TreeHost`] against an in-memory adapter on a tokio runtime.
mod common;

use std::sync::Arc;

use common::{init_logging, MemoryAdapter};
use sylva_core::{
    commands::NavigationOutcome,
    config::TreeConfig,
    engine::TreeEngine,
    error::ErrorScope,
    event::{RootInit, TreeEvent},
    filter::FilterQuery,
    host::{HostNotification, HostOptions, TreeHost},
    node::{NodeId, ParentKey},
};
use tokio::sync::mpsc::UnboundedReceiver;

const PAGE_SIZE: usize = 10;

fn host(adapter: MemoryAdapter) -> (TreeHost<MemoryAdapter>, UnboundedReceiver<HostNotification>) {
    init_logging();
    let engine = TreeEngine::new(TreeConfig::default().page_aware(PAGE_SIZE)).unwrap();
    TreeHost::new(engine, Arc::new(adapter), HostOptions { max_concurrent_loads: 3 })
}

fn drain(rx: &mut UnboundedReceiver<HostNotification>) -> Vec<HostNotification> {
    let mut notifications = Vec::new();
    while let Ok(notification) = rx.try_recv() {
        notifications.push(notification);
    }
    notifications
}

#[tokio::test]
async fn test_paged_roots_load_under_the_viewport() {
    let (mut host, _rx) = host(MemoryAdapter::new(45, 5, PAGE_SIZE));
    host.dispatch(TreeEvent::Init {
        roots: RootInit::Paged {
            page_size: None,
            total_count: None,
        },
    });
    assert_eq!(host.in_flight(), 1);
    host.settle().await.unwrap();

    let snapshot = host.engine().snapshot();
    assert_eq!(snapshot.total_count(), 45);
    assert!(snapshot.row_at(0).unwrap().node_id.is_some());
    assert!(snapshot.row_at(10).unwrap().is_placeholder);

    host.dispatch(TreeEvent::ViewportRangeChanged {
        start: 0,
        end: 44,
        overscan: 0,
    });
    assert_eq!(host.in_flight(), 4);
    host.settle().await.unwrap();
    let snapshot = host.engine().snapshot();
    assert!(snapshot.rows(0..45).all(|row| !row.is_placeholder));
    assert_eq!(snapshot.index_of(&NodeId::new("f44")), Some(44));
}

#[tokio::test]
async fn test_out_of_order_completions_converge() {
    let (mut host, _rx) = host(MemoryAdapter::new(8, 60, PAGE_SIZE).with_jitter());
    host.dispatch(TreeEvent::Init {
        roots: RootInit::Paged {
            page_size: None,
            total_count: Some(8),
        },
    });
    host.dispatch(TreeEvent::ViewportRangeChanged {
        start: 0,
        end: 40,
        overscan: 10,
    });
    host.settle().await.unwrap();
    for i in 0..3 {
        host.dispatch(TreeEvent::Expand {
            node_id: format!("f{i}").into(),
        });
    }
    host.settle().await.unwrap();

    let snapshot = host.engine().snapshot();
    // Eight folder rows and 60 slots under each expanded folder. Only f0 is under the viewport.
    assert_eq!(snapshot.total_count(), 8 + 3 * 60);
    let loaded = snapshot
        .rows(0..51)
        .filter(|row| !row.is_placeholder)
        .count();
    assert_eq!(loaded, 51);
    assert!(host.engine().built_in_test().is_empty());
    assert!(host.engine().state().paging().inflight().is_empty());
}

#[tokio::test]
async fn test_filter_change_abandons_in_flight_loads() {
    let (mut host, _rx) = host(MemoryAdapter::new(30, 0, PAGE_SIZE).with_jitter());
    host.dispatch(TreeEvent::Init {
        roots: RootInit::Paged {
            page_size: None,
            total_count: Some(30),
        },
    });
    host.dispatch(TreeEvent::ViewportRangeChanged {
        start: 0,
        end: 29,
        overscan: 0,
    });
    assert_eq!(host.in_flight(), 3);
    let epoch = host.engine().snapshot().epoch();

    // Everything requested so far belongs to the old epoch.
    host.dispatch(TreeEvent::SetFilter {
        query: FilterQuery::contains("Folder 2"),
    });
    assert_eq!(host.engine().snapshot().epoch(), epoch + 1);
    host.settle().await.unwrap();

    let snapshot = host.engine().snapshot();
    // Unloaded slots are hidden while filtering, so nothing was fetched again.
    assert_eq!(snapshot.total_count(), 0);
    assert!(snapshot.state().index().is_empty());

    host.dispatch(TreeEvent::ClearFilter);
    host.settle().await.unwrap();
    assert_eq!(host.engine().snapshot().index_of(&NodeId::new("f29")), Some(29));
}

#[tokio::test]
async fn test_failed_page_is_reported_and_retried() {
    let adapter = MemoryAdapter::new(20, 0, PAGE_SIZE).fail_once(ParentKey::Root, 1);
    let (mut host, mut rx) = host(adapter);
    host.dispatch(TreeEvent::Init {
        roots: RootInit::Paged {
            page_size: None,
            total_count: Some(20),
        },
    });
    host.dispatch(TreeEvent::ViewportRangeChanged {
        start: 0,
        end: 19,
        overscan: 0,
    });
    host.settle().await.unwrap();

    let errors = drain(&mut rx)
        .into_iter()
        .filter_map(|notification| match notification {
            HostNotification::LoadError(error) => Some(error),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].scope, ErrorScope::Root);
    assert_eq!(errors[0].page_index, Some(1));
    assert!(host.engine().snapshot().row_at(15).unwrap().is_failed);

    host.dispatch(TreeEvent::RetryFailedPage {
        parent: ParentKey::Root,
        page_index: 1,
    });
    host.settle().await.unwrap();
    let snapshot = host.engine().snapshot();
    assert!(!snapshot.row_at(15).unwrap().is_placeholder);
    assert_eq!(snapshot.errors().count(), 1);
}

#[tokio::test]
async fn test_navigation_resolves_and_loads_the_branch() {
    let (mut host, mut rx) = host(MemoryAdapter::new(5, 200, PAGE_SIZE));
    host.dispatch(TreeEvent::Init {
        roots: RootInit::Paged {
            page_size: None,
            total_count: None,
        },
    });
    host.settle().await.unwrap();
    drain(&mut rx);

    host.dispatch(TreeEvent::NavigateToNode {
        target_id: NodeId::new("f3/137"),
    });
    host.settle().await.unwrap();

    let notifications = drain(&mut rx);
    let index = 4 + 137;
    assert!(notifications.contains(&HostNotification::NavigationResult {
        target_id: NodeId::new("f3/137"),
        outcome: NavigationOutcome::Succeeded { index },
    }));
    assert!(notifications
        .iter()
        .any(|notification| matches!(notification, HostNotification::ScrollToIndex { index: i, .. } if *i == index)));

    let snapshot = host.engine().snapshot();
    assert_eq!(snapshot.focus_index(), Some(index));
    assert!(snapshot.is_expanded(&NodeId::new("f3")));
    // Only the hinted page of f3 was fetched.
    let page_state = snapshot.page_state(&ParentKey::Node(NodeId::new("f3"))).unwrap();
    assert_eq!(page_state.loaded_pages.iter().copied().collect::<Vec<_>>(), vec![13]);
}

#[tokio::test]
async fn test_navigation_to_a_missing_node_fails() {
    let (mut host, mut rx) = host(MemoryAdapter::new(2, 2, PAGE_SIZE));
    host.dispatch(TreeEvent::Init {
        roots: RootInit::Paged {
            page_size: None,
            total_count: None,
        },
    });
    host.settle().await.unwrap();
    host.dispatch(TreeEvent::NavigateToNode {
        target_id: NodeId::new("nowhere"),
    });
    host.settle().await.unwrap();
    let failed = drain(&mut rx).into_iter().any(|notification| {
        matches!(
            notification,
            HostNotification::NavigationResult {
                outcome: NavigationOutcome::Failed { .. },
                ..
            }
        )
    });
    assert!(failed);
    assert!(host.engine().snapshot().can_navigate());
}

#[tokio::test]
async fn test_into_engine_keeps_state() {
    let (mut host, _rx) = host(MemoryAdapter::new(3, 0, PAGE_SIZE));
    host.dispatch(TreeEvent::Init {
        roots: RootInit::Lazy,
    });
    host.settle().await.unwrap();
    let engine = host.into_engine();
    assert_eq!(engine.snapshot().total_count(), 3);
}
