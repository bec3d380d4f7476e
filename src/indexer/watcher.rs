//! File system watcher bridging notify callbacks into a tokio channel.
//!
//! One watch session produces one channel; the indexer consumes it with
//! a single task, so tearing the session down (dropping the watcher and
//! aborting the consumer) cleanly stops event delivery.

use anyhow::Result;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// File change event delivered by a watch session.
#[derive(Debug, Clone)]
pub enum FileChange {
    Created(PathBuf),
    Modified(PathBuf),
    Removed(PathBuf),
}

/// Start a recursive watch of `root`.
///
/// Returns the watcher handle (events stop when it is dropped) and the
/// receiving end of the change stream.
pub fn watch(root: &Path) -> Result<(RecommendedWatcher, mpsc::UnboundedReceiver<FileChange>)> {
    let (tx, rx) = mpsc::unbounded_channel();

    let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
        match res {
            Ok(event) => {
                for path in &event.paths {
                    let change = match &event.kind {
                        EventKind::Create(_) => FileChange::Created(path.clone()),
                        EventKind::Modify(_) => FileChange::Modified(path.clone()),
                        EventKind::Remove(_) => FileChange::Removed(path.clone()),
                        _ => continue,
                    };
                    let _ = tx.send(change);
                }
            }
            Err(e) => tracing::warn!("watch error: {}", e),
        }
    })?;

    watcher.watch(root, RecursiveMode::Recursive)?;
    tracing::info!("Watching directory: {:?}", root);

    Ok((watcher, rx))
}
