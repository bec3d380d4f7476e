//! Incremental folder indexer.
//!
//! Keeps the catalog congruent with the file tree under a configured
//! root: an initial recursive sweep followed by live filesystem events.
//! Per-file failures are logged and counted, never fatal to a batch.

pub mod discovery;
pub mod watcher;

use anyhow::{Context, Result};
use notify::RecommendedWatcher;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;

use crate::config::IndexerConfig;
use crate::db::assets::now_millis;
use crate::db::{AssetKind, Database};

pub use watcher::FileChange;

/// Indexer run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncStatus {
    #[default]
    Idle,
    Scanning,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Scanning => "scanning",
        }
    }
}

/// Running sync statistics. `stats()` hands out clones, never the live
/// value, so readers cannot observe torn updates.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    pub total_files: u64,
    pub processed_files: u64,
    pub failed_files: u64,
    pub status: SyncStatus,
    pub last_sync: Option<i64>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A live watch session. Dropping it stops the notify watcher and
/// aborts the consumer task; straggler events against an old root are
/// simply discarded.
struct WatchSession {
    _watcher: RecommendedWatcher,
    consumer: JoinHandle<()>,
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        self.consumer.abort();
    }
}

/// Everything the event consumer needs, detached from the service so a
/// torn-down session cannot keep the `Indexer` alive.
struct EventCtx {
    db: Arc<Database>,
    config: IndexerConfig,
    stats: Arc<Mutex<SyncStats>>,
    root: PathBuf,
}

impl EventCtx {
    /// Walk the tree once and upsert every qualifying file, then stamp
    /// the sync as complete.
    fn initial_sweep(&self) -> Result<()> {
        let files = discovery::collect_media(&self.root, &self.config)?;
        lock(&self.stats).total_files = files.len() as u64;

        for file in &files {
            let kind = match discovery::classify(file, &self.config) {
                Some(kind) => kind,
                None => continue,
            };
            match self.index_file(file, kind) {
                Ok(_) => lock(&self.stats).processed_files += 1,
                Err(e) => {
                    tracing::warn!("failed to index {:?}: {:#}", file, e);
                    lock(&self.stats).failed_files += 1;
                }
            }
        }

        let mut stats = lock(&self.stats);
        stats.status = SyncStatus::Idle;
        stats.last_sync = Some(now_millis());
        tracing::info!(
            total = stats.total_files,
            processed = stats.processed_files,
            failed = stats.failed_files,
            "initial scan complete"
        );
        Ok(())
    }

    /// Stat, probe and upsert one file. Returns whether the catalog row
    /// was newly inserted.
    fn index_file(&self, abs: &Path, kind: AssetKind) -> Result<bool> {
        let rel = abs
            .strip_prefix(&self.root)
            .context("path outside watch root")?;
        let rel_str = rel.to_string_lossy().to_string();

        let meta = std::fs::metadata(abs).with_context(|| format!("stat {:?}", abs))?;
        let created_at = meta
            .created()
            .or_else(|_| meta.modified())
            .map(|t| chrono::DateTime::<chrono::Utc>::from(t).timestamp_millis())
            .unwrap_or_else(|_| now_millis());

        let (width, height) = if kind == AssetKind::Image {
            match image::image_dimensions(abs) {
                Ok((w, h)) => (Some(w), Some(h)),
                Err(_) => (None, None),
            }
        } else {
            (None, None)
        };

        let (_, inserted) =
            self.db
                .upsert_file(&rel_str, kind, created_at, now_millis(), width, height)?;
        Ok(inserted)
    }

    /// Apply one filesystem event. Errors are absorbed here; the event
    /// loop never aborts.
    fn apply(&self, change: FileChange) {
        let result = match change {
            FileChange::Created(path) | FileChange::Modified(path) => self.apply_upsert(&path),
            FileChange::Removed(path) => self.apply_remove(&path),
        };
        if let Err(e) = result {
            lock(&self.stats).failed_files += 1;
            tracing::warn!("event handling failed: {:#}", e);
        }
    }

    fn apply_upsert(&self, path: &Path) -> Result<()> {
        let rel = match path.strip_prefix(&self.root) {
            Ok(rel) => rel,
            Err(_) => return Ok(()), // straggler from a previous root
        };
        if discovery::is_hidden(rel) {
            return Ok(());
        }
        if !path.exists() {
            // A rename surfaces as a name-change event for the vanished
            // path; identity is path-keyed, so treat it as removal.
            return self.apply_remove(path);
        }
        if !path.is_file() {
            return Ok(());
        }
        let kind = match discovery::classify(path, &self.config) {
            Some(kind) => kind,
            None => return Ok(()),
        };

        let inserted = self.index_file(path, kind)?;
        if inserted {
            let mut stats = lock(&self.stats);
            stats.total_files += 1;
            stats.processed_files += 1;
        }
        Ok(())
    }

    fn apply_remove(&self, path: &Path) -> Result<()> {
        let rel = match path.strip_prefix(&self.root) {
            Ok(rel) => rel,
            Err(_) => return Ok(()),
        };
        if discovery::is_hidden(rel) {
            return Ok(());
        }
        let rel_str = rel.to_string_lossy().to_string();

        let removed = if discovery::classify(path, &self.config).is_some() {
            usize::from(self.db.remove_asset_by_path(&rel_str)?)
        } else {
            // no media extension: possibly a directory, clear the subtree
            self.db.remove_assets_under(&rel_str)?
        };

        if removed > 0 {
            let mut stats = lock(&self.stats);
            stats.total_files = stats.total_files.saturating_sub(removed as u64);
            stats.processed_files = stats.processed_files.saturating_sub(removed as u64);
            tracing::debug!(path = %rel_str, removed, "removed vanished assets");
        }
        Ok(())
    }
}

/// The folder indexer service.
pub struct Indexer {
    db: Arc<Database>,
    config: IndexerConfig,
    stats: Arc<Mutex<SyncStats>>,
    root: Mutex<Option<PathBuf>>,
    session: Mutex<Option<WatchSession>>,
}

impl Indexer {
    pub fn new(db: Arc<Database>, config: IndexerConfig) -> Self {
        Self {
            db,
            config,
            stats: Arc::new(Mutex::new(SyncStats::default())),
            root: Mutex::new(None),
            session: Mutex::new(None),
        }
    }

    /// Start (or restart) watching a root directory.
    ///
    /// Any previous session is fully torn down first so events are never
    /// delivered twice. Statistics are reset, the initial sweep runs to
    /// completion, and a live watch session is left running.
    pub async fn set_root(&self, path: &Path) -> Result<()> {
        *lock(&self.session) = None;

        {
            let mut stats = lock(&self.stats);
            *stats = SyncStats {
                status: SyncStatus::Scanning,
                ..SyncStats::default()
            };
        }
        *lock(&self.root) = Some(path.to_path_buf());

        // The watcher starts before the sweep so changes made while
        // scanning are queued rather than lost.
        let (watcher_handle, mut rx) = watcher::watch(path)?;

        let ctx = Arc::new(EventCtx {
            db: self.db.clone(),
            config: self.config.clone(),
            stats: self.stats.clone(),
            root: path.to_path_buf(),
        });

        let sweep_ctx = ctx.clone();
        tokio::task::spawn_blocking(move || sweep_ctx.initial_sweep())
            .await
            .context("initial sweep task failed")??;

        let consumer = tokio::spawn(async move {
            while let Some(change) = rx.recv().await {
                let ctx = ctx.clone();
                let _ = tokio::task::spawn_blocking(move || ctx.apply(change)).await;
            }
        });

        *lock(&self.session) = Some(WatchSession {
            _watcher: watcher_handle,
            consumer,
        });
        Ok(())
    }

    /// Full rescan of the currently configured root.
    pub async fn resync(&self) -> Result<()> {
        let root = lock(&self.root).clone();
        match root {
            Some(root) => self.set_root(&root).await,
            None => anyhow::bail!("no root configured"),
        }
    }

    /// Immutable snapshot of the running statistics.
    pub fn stats(&self) -> SyncStats {
        lock(&self.stats).clone()
    }

    /// Tear down the active watch session, if any.
    pub fn stop(&self) {
        *lock(&self.session) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use tempfile::tempdir;

    fn test_db() -> Arc<Database> {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        Arc::new(db)
    }

    fn ctx_for(db: Arc<Database>, root: &Path) -> EventCtx {
        EventCtx {
            db,
            config: IndexerConfig::default(),
            stats: Arc::new(Mutex::new(SyncStats::default())),
            root: root.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn test_initial_scan_counts_only_media() {
        let dir = tempdir().unwrap();
        File::create(dir.path().join("a.png")).unwrap();
        File::create(dir.path().join("b.jpg")).unwrap();
        File::create(dir.path().join("c.webp")).unwrap();
        File::create(dir.path().join("readme.txt")).unwrap();

        let db = test_db();
        let indexer = Indexer::new(db.clone(), IndexerConfig::default());
        indexer.set_root(dir.path()).await.unwrap();

        let stats = indexer.stats();
        assert_eq!(stats.total_files, 3);
        assert_eq!(stats.processed_files, 3);
        assert_eq!(stats.status, SyncStatus::Idle);
        assert!(stats.last_sync.is_some());
        assert_eq!(db.count_assets().unwrap(), 3);

        indexer.stop();
    }

    #[tokio::test]
    async fn test_resync_is_idempotent() {
        let dir = tempdir().unwrap();
        File::create(dir.path().join("a.png")).unwrap();

        let db = test_db();
        let indexer = Indexer::new(db.clone(), IndexerConfig::default());
        indexer.set_root(dir.path()).await.unwrap();

        let first = db.get_asset_by_path("a.png").unwrap().unwrap();

        File::create(dir.path().join("b.png")).unwrap();
        indexer.resync().await.unwrap();

        assert_eq!(db.count_assets().unwrap(), 2);
        let second = db.get_asset_by_path("a.png").unwrap().unwrap();
        assert_eq!(first.id, second.id, "identity survives rescans");
        assert_eq!(first.created_at, second.created_at);

        indexer.stop();
    }

    #[test]
    fn test_apply_created_and_removed_events() {
        let dir = tempdir().unwrap();
        let db = test_db();
        let ctx = ctx_for(db.clone(), dir.path());

        let file = dir.path().join("new.png");
        File::create(&file).unwrap();
        ctx.apply(FileChange::Created(file.clone()));

        assert_eq!(db.count_assets().unwrap(), 1);
        assert_eq!(lock(&ctx.stats).total_files, 1);

        fs::remove_file(&file).unwrap();
        ctx.apply(FileChange::Removed(file));

        assert_eq!(db.count_assets().unwrap(), 0);
        assert_eq!(lock(&ctx.stats).total_files, 0);
    }

    #[test]
    fn test_apply_ignores_non_media_and_hidden() {
        let dir = tempdir().unwrap();
        let db = test_db();
        let ctx = ctx_for(db.clone(), dir.path());

        let doc = dir.path().join("notes.txt");
        File::create(&doc).unwrap();
        ctx.apply(FileChange::Created(doc));

        let hidden = dir.path().join(".thumb.png");
        File::create(&hidden).unwrap();
        ctx.apply(FileChange::Created(hidden));

        assert_eq!(db.count_assets().unwrap(), 0);
        assert_eq!(lock(&ctx.stats).total_files, 0);
    }

    #[test]
    fn test_modify_event_on_vanished_path_removes_row() {
        let dir = tempdir().unwrap();
        let db = test_db();
        let ctx = ctx_for(db.clone(), dir.path());

        let file = dir.path().join("moved.png");
        File::create(&file).unwrap();
        ctx.apply(FileChange::Created(file.clone()));
        assert_eq!(db.count_assets().unwrap(), 1);

        // rename observed as a modify event for a path that is gone
        fs::remove_file(&file).unwrap();
        ctx.apply(FileChange::Modified(file));
        assert_eq!(db.count_assets().unwrap(), 0);
    }

    #[test]
    fn test_directory_removal_clears_subtree() {
        let dir = tempdir().unwrap();
        let db = test_db();
        let ctx = ctx_for(db.clone(), dir.path());

        fs::create_dir(dir.path().join("batch")).unwrap();
        let a = dir.path().join("batch/a.png");
        let b = dir.path().join("batch/b.png");
        File::create(&a).unwrap();
        File::create(&b).unwrap();
        ctx.apply(FileChange::Created(a));
        ctx.apply(FileChange::Created(b));
        assert_eq!(db.count_assets().unwrap(), 2);

        fs::remove_dir_all(dir.path().join("batch")).unwrap();
        ctx.apply(FileChange::Removed(dir.path().join("batch")));
        assert_eq!(db.count_assets().unwrap(), 0);
    }

    #[test]
    fn test_change_event_refreshes_without_resetting_identity() {
        let dir = tempdir().unwrap();
        let db = test_db();
        let ctx = ctx_for(db.clone(), dir.path());

        let file = dir.path().join("a.png");
        File::create(&file).unwrap();
        ctx.apply(FileChange::Created(file.clone()));

        let asset = db.get_asset_by_path("a.png").unwrap().unwrap();
        db.set_status(asset.id, crate::db::AssetStatus::Approved)
            .unwrap();

        ctx.apply(FileChange::Modified(file));

        let after = db.get_asset_by_path("a.png").unwrap().unwrap();
        assert_eq!(after.id, asset.id);
        assert_eq!(after.status, crate::db::AssetStatus::Approved);
        assert_eq!(lock(&ctx.stats).total_files, 1, "updates do not inflate totals");
    }
}
