//! Integration tests for the adapter → manager → flattener cycle.
//!
//! Tests the full flow:
//! 1. Open a page through the registry (set_data)
//! 2. Flatten through the manager
//! 3. Issue loaders and actions (fenced add_data)
//! 4. Re-flatten and check the merged result

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use content_graph::{
    AdapterError, AdapterRegistry, CollapseStates, ContentManager, ContentSourceExt, FlatItem,
    Flattener, ForumBase, GraphConfig, InMemoryForum, ManagerConfig, PostContent, PostNode,
    TokenError,
};

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn build_forum(client_id: &str, reply_depth: usize) -> (InMemoryForum, ForumBase) {
    let forum = InMemoryForum::new(client_id, "Integration Forum").with_reply_depth(reply_depth);
    forum.add_community("rust", "Rust", Some("Systems programming".to_string()));
    let thread = forum.add_thread("rust", "ferris", "Lifetimes", "Ask anything").unwrap();

    let mut parent = thread.clone();
    for depth in 0..4 {
        parent = forum
            .add_comment(&parent, format!("user{}", depth), format!("level {}", depth))
            .unwrap();
    }
    forum.add_comment(&thread, "sam", "second top-level").unwrap();
    (forum, thread)
}

fn registry_with(forum: InMemoryForum) -> AdapterRegistry {
    let mut registry = AdapterRegistry::new();
    registry.register(Arc::new(forum));
    registry
}

fn bodies(items: &[FlatItem]) -> Vec<String> {
    items
        .iter()
        .filter_map(|item| match item {
            FlatItem::Post { node, .. } => match node.as_post().map(|p| &p.content) {
                Some(PostContent::Post(body)) => body.body.clone(),
                _ => None,
            },
            _ => None,
        })
        .collect()
}

fn first_loader(items: &[FlatItem]) -> Option<Arc<PostNode>> {
    items.iter().find_map(|item| match item {
        FlatItem::Loader { node, .. } => Some(Arc::clone(node)),
        _ => None,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// PAGE + LOADER TESTS
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_open_page_then_expand_loader() {
    let (forum, thread) = build_forum("forum", 2);
    let registry = registry_with(forum);
    let manager = ContentManager::default();

    let pivot = registry.open_page("forum", &thread.locator(), &manager).await.unwrap();
    let before = Flattener::default()
        .flatten(&pivot, &manager.read_view(), &CollapseStates::new())
        .unwrap();
    assert_eq!(bodies(&before), vec!["Ask anything", "level 0", "level 1", "second top-level"]);

    let loader = first_loader(&before).expect("depth limit must emit a loader");
    let report = registry.issue_loader(&loader, &manager).await.unwrap();
    assert!(report.written > 0);
    assert_eq!(report.skipped_stale, 0);

    let after = Flattener::default()
        .flatten(&pivot, &manager.read_view(), &CollapseStates::new())
        .unwrap();
    assert_eq!(
        bodies(&after),
        vec!["Ask anything", "level 0", "level 1", "level 2", "level 3", "second top-level"]
    );
    assert!(first_loader(&after).is_none());
}

#[tokio::test]
async fn test_new_page_clears_previous_page() {
    let (forum, thread) = build_forum("forum", 3);
    let registry = registry_with(forum);
    let manager = ContentManager::default();

    let thread_pivot = registry.open_page("forum", &thread.locator(), &manager).await.unwrap();
    registry.open_page("forum", "/", &manager).await.unwrap();

    assert!(manager.view(&thread_pivot).unwrap().is_some(), "thread is listed under the root page");
    let comment = ForumBase::Comment {
        community: "rust".to_string(),
        thread: 1,
        id: 4,
    };
    let comment_link = content_graph::BaseDescriptor::link(&comment).unwrap();
    assert!(manager.view(&comment_link).unwrap().is_none(), "deep comments are not on the root page");
}

#[tokio::test]
async fn test_unknown_client_and_locator() {
    let (forum, _) = build_forum("forum", 3);
    let registry = registry_with(forum);
    let manager = ContentManager::default();

    let unknown_client = registry.open_page("nobody", "/", &manager).await;
    assert!(matches!(unknown_client, Err(AdapterError::UnknownClient(_))));

    let unknown_locator = registry.open_page("forum", "/nowhere", &manager).await;
    assert!(matches!(unknown_locator, Err(AdapterError::UnknownLocator(_))));
    assert_eq!(manager.tracked_len(), 0);
}

#[tokio::test]
async fn test_missing_thread_fails_pivot() {
    let (forum, _) = build_forum("forum", 3);
    let registry = registry_with(forum);
    let manager = ContentManager::default();

    let pivot = registry.open_page("forum", "/c/rust/t/999", &manager).await.unwrap();
    let result = Flattener::default().flatten(&pivot, &manager.read_view(), &CollapseStates::new());
    assert!(matches!(result, Err(content_graph::FlattenError::PivotFailed { .. })));
}

// ─────────────────────────────────────────────────────────────────────────────
// ACTION TESTS
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_vote_action_updates_score_and_notifies() {
    let (forum, thread) = build_forum("forum", 3);
    let registry = registry_with(forum);
    let manager = ContentManager::default();
    let pivot = registry.open_page("forum", &thread.locator(), &manager).await.unwrap();

    let notified = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&notified);
    let _subscription = manager.subscribe(&pivot, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let node = manager.read_required(&pivot).unwrap().into_result().unwrap();
    let upvote = match &node.as_post().unwrap().content {
        PostContent::Post(body) => body.actions[0].action.clone(),
        other => panic!("unexpected content {:?}", other),
    };
    registry.issue_action("forum", &upvote, None, &manager).await.unwrap();

    let node = manager.read_required(&pivot).unwrap().into_result().unwrap();
    match &node.as_post().unwrap().content {
        PostContent::Post(body) => assert_eq!(body.actions[0].count, Some(1)),
        other => panic!("unexpected content {:?}", other),
    }
    assert_eq!(notified.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_token_from_other_adapter_is_rejected() {
    let (forum_a, thread_a) = build_forum("a", 3);
    let (forum_b, _) = build_forum("b", 3);
    let mut registry = AdapterRegistry::new();
    registry.register(Arc::new(forum_a));
    registry.register(Arc::new(forum_b));
    let manager = ContentManager::default();

    let pivot = registry.open_page("a", &thread_a.locator(), &manager).await.unwrap();
    let node = manager.read_required(&pivot).unwrap().into_result().unwrap();
    let reply = node.replies().unwrap().reply.clone().unwrap();

    let result = registry
        .issue_action("b", &reply.action, Some("hi".to_string()), &manager)
        .await;
    assert!(matches!(result, Err(AdapterError::Token(TokenError::BrandMismatch { .. }))));
}

// ─────────────────────────────────────────────────────────────────────────────
// FENCING TESTS
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_stale_loader_fragment_is_fenced() {
    let (forum, thread) = build_forum("forum", 1);
    let forum = Arc::new(forum);
    let manager = ContentManager::new(ManagerConfig { fence_stale_fetches: true });

    let page = content_graph::Adapter::get_page(forum.as_ref(), &thread.locator()).await.unwrap();
    manager.set_data(page.content);
    let loader = first_loader(
        &Flattener::default()
            .flatten(&page.pivot, &manager.read_view(), &CollapseStates::new())
            .unwrap(),
    )
    .unwrap();
    let token = &loader.as_loader().unwrap().token;

    let stale_ticket = manager.begin_fetch();
    let stale = content_graph::Adapter::loader(forum.as_ref(), token).await.unwrap();

    // A newer page load lands before the stale loader response.
    let fresh = content_graph::Adapter::get_page(forum.as_ref(), &thread.locator()).await.unwrap();
    manager.set_data(fresh.content);

    let report = manager.add_data_fenced(stale_ticket, stale.content);
    assert!(report.skipped_stale > 0);
}

#[test]
fn test_config_drives_forum_depth() {
    let config = GraphConfig::from_lookup(|name| match name {
        "CONTENT_GRAPH_REPLY_DEPTH" => Some("1".to_string()),
        _ => None,
    });
    let forum = InMemoryForum::with_config("forum", "Configured", &config);
    assert_eq!(forum.reply_depth(), 1);
}
