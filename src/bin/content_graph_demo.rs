//! Content Graph Demo Binary
//!
//! Builds a small in-memory forum, opens a page through the adapter
//! registry, prints the flattened render list, then issues the first loader
//! and prints the list again.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `CONTENT_GRAPH_REPLY_DEPTH`: reply levels filled per page (default: 3)
//! - `CONTENT_GRAPH_FENCE_STALE`: drop stale loader fragments (default: true)
//! - `RUST_LOG`: Log level filter (default: info)
//! - `LOG_FORMAT`: "json" for structured logs, "pretty" for development (default: json)
//!
//! ## Usage
//!
//! ```bash
//! LOG_FORMAT=pretty cargo run --bin content_graph_demo --features demo -- /c/rust/t/1
//! ```

use std::sync::Arc;

use tracing::{info, warn};

use content_graph::{
    flatten_fingerprint, init_tracing, AdapterRegistry, CollapseStates, ContentManager,
    ContentSourceExt, FlatItem, Flattener, ForumBase, GraphConfig, InMemoryForum, PostContent,
    PostLink, PostNode,
};

const CLIENT_ID: &str = "demo-forum";

fn seed_forum(config: &GraphConfig) -> Result<InMemoryForum, Box<dyn std::error::Error>> {
    let forum = InMemoryForum::with_config(CLIENT_ID, "Demo Forum", config);
    forum.add_community("rust", "Rust", Some("Systems programming".to_string()));
    forum.add_community("cooking", "Cooking", None);

    let thread = forum.add_thread("rust", "ferris", "Borrow checker tips", "Share what helped you.")?;
    let first = forum.add_comment(&thread, "ana", "Read the error messages twice.")?;
    let nested = forum.add_comment(&first, "ben", "And then read them once more.")?;
    let deeper = forum.add_comment(&nested, "cy", "Clippy helps too.")?;
    let deepest = forum.add_comment(&deeper, "dee", "cargo expand for macros.")?;
    forum.add_comment(&deepest, "eli", "Good thread.")?;

    let noisy = forum.add_comment(&thread, "troll", "Just use unsafe everywhere.")?;
    forum.vote(&noisy, -5);

    let removed = forum.add_comment(&thread, "gone", "[removed]")?;
    if let ForumBase::Comment { id, .. } = &removed {
        forum.delete_comment(*id);
    }

    forum.add_thread("cooking", "chef", "Bread", "Flour, water, salt, time.")?;
    Ok(forum)
}

fn describe(item: &FlatItem) -> String {
    let pad = "  ".repeat(item.depth());
    match item {
        FlatItem::Post { node, collapsed, .. } => {
            let text = match node.as_post().map(|p| &p.content) {
                Some(PostContent::Post(body)) => body
                    .title
                    .clone()
                    .or_else(|| body.body.clone())
                    .unwrap_or_default(),
                Some(PostContent::Page { title, .. }) => title.clone(),
                Some(PostContent::Client { name }) => name.clone(),
                Some(other) => format!("{:?}", other),
                None => String::new(),
            };
            let marker = if *collapsed { "[+]" } else { "[-]" };
            format!("{}{} {}", pad, marker, text)
        }
        FlatItem::Loader { node, .. } => {
            let count = node.as_loader().and_then(|l| l.load_count).unwrap_or(0);
            format!("{}... load {} more", pad, count)
        }
        FlatItem::Error { message, .. } => format!("{}(error: {})", pad, message),
        FlatItem::Todo { note } => format!("{}<{:?}>", pad, note),
        FlatItem::HorizontalLine => "----".to_string(),
        FlatItem::WrapperStart | FlatItem::WrapperEnd => String::new(),
    }
}

fn render(manager: &ContentManager, pivot: &PostLink) -> Result<Vec<FlatItem>, Box<dyn std::error::Error>> {
    let view = manager.read_view();
    let items = Flattener::default().flatten(pivot, &view, &CollapseStates::new())?;
    for line in items.iter().map(describe).filter(|line| !line.is_empty()) {
        println!("{}", line);
    }
    info!(items = items.len(), fingerprint = %flatten_fingerprint(&items)?, "rendered page");
    Ok(items)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = GraphConfig::from_env();
    init_tracing(config.log_format)?;

    let locator = std::env::args().nth(1).unwrap_or_else(|| "/c/rust/t/1".to_string());
    info!(locator = %locator, reply_depth = config.reply_depth, "starting content graph demo");

    let mut registry = AdapterRegistry::new();
    registry.register(Arc::new(seed_forum(&config)?));
    let manager = ContentManager::new(config.manager.clone());

    let pivot = registry.open_page(CLIENT_ID, &locator, &manager).await?;
    let items = render(&manager, &pivot)?;

    let loader: Option<Arc<PostNode>> = items.iter().find_map(|item| match item {
        FlatItem::Loader { node, .. } => Some(Arc::clone(node)),
        _ => None,
    });
    let Some(loader) = loader else {
        warn!("page has no loaders to expand");
        return Ok(());
    };

    let report = registry.issue_loader(&loader, &manager).await?;
    info!(written = report.written, "expanded first loader");
    println!();
    render(&manager, &pivot)?;

    if let Some(parent) = loader.parent() {
        let still_tracked = manager.read(parent)?.is_some();
        info!(parent = %parent, still_tracked, "loader parent refreshed");
    }
    Ok(())
}
