/// Recursive ContentDirectory walk
///
/// Containers are browsed one depth level at a time. Within a level the
/// Browse calls run concurrently under a semaphore; results are stored by
/// node index, and the snapshot is assembled afterwards in DFS pre-order so
/// that output order never depends on response arrival order.

use nas_catalog_core::{CatalogEntry, CatalogSnapshot, ContentBrowser, MediaItem, WalkReport};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkOptions {
    /// Concurrent Browse calls within one depth level
    pub concurrency: usize,
    /// Upper bound on containers browsed in one walk
    pub max_containers: usize,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_containers: 10_000,
        }
    }
}

struct Node {
    container_id: String,
    depth: usize,
    /// Container titles from below the root down to this node
    path: Vec<String>,
    entries: Vec<CatalogEntry>,
    children: Vec<usize>,
}

/// Walk the container tree below `root_container_id`.
///
/// The root sits at depth 0 and is browsed when `max_depth >= 1`; a
/// container found at depth `d + 1` is browsed only if `d + 1 < max_depth`.
/// Items are collected from every browsed container. A failed Browse ends
/// that branch only.
pub async fn walk<B>(
    browser: Arc<B>,
    root_container_id: &str,
    max_depth: usize,
    options: &WalkOptions,
) -> CatalogSnapshot
where
    B: ContentBrowser + ?Sized + 'static,
{
    let mut report = WalkReport::default();

    if max_depth == 0 {
        debug!("max_depth is 0, nothing to browse");
        return CatalogSnapshot {
            items: Vec::new(),
            report,
        };
    }

    info!(
        "Walking {} from container '{}' (max depth {})",
        browser.server_name(),
        root_container_id,
        max_depth
    );

    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let mut nodes = vec![Node {
        container_id: root_container_id.to_string(),
        depth: 0,
        path: Vec::new(),
        entries: Vec::new(),
        children: Vec::new(),
    }];
    let mut level = vec![0usize];

    while !level.is_empty() {
        let budget = options.max_containers.saturating_sub(report.containers_browsed);
        if level.len() > budget {
            let skipped = level.len() - budget;
            warn!(
                "Container cap of {} reached, skipping {} container(s) at depth {}",
                options.max_containers,
                skipped,
                nodes[level[0]].depth
            );
            report.containers_skipped += skipped;
            level.truncate(budget);
        }
        if level.is_empty() {
            break;
        }

        let results = browse_level(&browser, &semaphore, &nodes, &level).await;
        report.containers_browsed += level.len();

        let mut next_level = Vec::new();
        for (index, entries) in level.iter().copied().zip(results) {
            if entries.is_empty() {
                report.empty_containers += 1;
            }

            let child_depth = nodes[index].depth + 1;
            for entry in &entries {
                if let CatalogEntry::Container(container) = entry {
                    if child_depth < max_depth {
                        let mut path = nodes[index].path.clone();
                        path.push(container.title.clone());
                        let child = nodes.len();
                        nodes.push(Node {
                            container_id: container.id.clone(),
                            depth: child_depth,
                            path,
                            entries: Vec::new(),
                            children: Vec::new(),
                        });
                        nodes[index].children.push(child);
                        next_level.push(child);
                    }
                }
            }
            nodes[index].entries = entries;
        }

        level = next_level;
    }

    let items = assemble(nodes);

    info!(
        "Walk of {} finished: {} item(s), {} container(s) browsed, {} empty, {} skipped",
        browser.server_name(),
        items.len(),
        report.containers_browsed,
        report.empty_containers,
        report.containers_skipped
    );

    CatalogSnapshot { items, report }
}

/// Browse every node of one level; results come back in `level` order
async fn browse_level<B>(
    browser: &Arc<B>,
    semaphore: &Arc<Semaphore>,
    nodes: &[Node],
    level: &[usize],
) -> Vec<Vec<CatalogEntry>>
where
    B: ContentBrowser + ?Sized + 'static,
{
    let mut tasks = JoinSet::new();

    for (slot, &index) in level.iter().enumerate() {
        let browser = browser.clone();
        let semaphore = semaphore.clone();
        let container_id = nodes[index].container_id.clone();

        tasks.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return (slot, Vec::new());
            };
            (slot, browser.browse(&container_id).await)
        });
    }

    let mut results = vec![Vec::new(); level.len()];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((slot, entries)) => results[slot] = entries,
            Err(e) => warn!("Browse task failed: {}", e),
        }
    }
    results
}

/// DFS pre-order: a container's own items first, then each subcontainer in
/// server order
fn assemble(mut nodes: Vec<Node>) -> Vec<MediaItem> {
    let mut items = Vec::new();
    let mut stack = vec![0usize];

    while let Some(index) = stack.pop() {
        let entries = std::mem::take(&mut nodes[index].entries);
        for entry in entries {
            if let CatalogEntry::Item(mut item) = entry {
                item.container_path = nodes[index].path.clone();
                items.push(item);
            }
        }
        stack.extend(nodes[index].children.iter().rev().copied());
    }

    items
}
