use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use notify_debouncer_full::{new_debouncer, DebounceEventResult, Debouncer, FileIdMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::taxonomy::{self, Taxonomy, TaxonomyError};

/// Owns the active taxonomy snapshot and swaps it wholesale on reload.
///
/// Readers clone the current `Arc` and release the lock immediately, so a
/// caller always works against one complete snapshot even while a reload
/// installs its successor.
#[derive(Debug)]
pub struct TaxonomySource {
    path: PathBuf,
    active: RwLock<Arc<Taxonomy>>,
}

impl TaxonomySource {
    /// Loads `path`; the initial load must succeed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, TaxonomyError> {
        let path = path.into();
        let initial = taxonomy::load(&path)?;
        Ok(Self {
            path,
            active: RwLock::new(Arc::new(initial)),
        })
    }

    /// Wraps an already-built snapshot. `reload` still reads from `path`.
    pub fn from_snapshot(path: impl Into<PathBuf>, snapshot: Taxonomy) -> Self {
        Self {
            path: path.into(),
            active: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> Arc<Taxonomy> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Re-reads the file and installs the result. On failure the previous
    /// snapshot stays active.
    pub fn reload(&self) -> Result<Arc<Taxonomy>, TaxonomyError> {
        match taxonomy::load(&self.path) {
            Ok(next) => Ok(self.replace(next)),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "taxonomy reload failed; keeping previous snapshot");
                Err(e)
            }
        }
    }

    /// Installs `next` as the active snapshot and returns it.
    pub fn replace(&self, next: Taxonomy) -> Arc<Taxonomy> {
        let next = Arc::new(next);
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&next);
        next
    }
}

/// Filesystem watcher returned by [`spawn_reload_watcher`]. Dropping it stops
/// watching.
pub type ReloadWatcher = Debouncer<RecommendedWatcher, FileIdMap>;

/// Spawn a debounced watcher that reloads `source` once its file settles
/// after being written, created or renamed into place.
///
/// A save usually arrives as several events (truncate, write, rename); the
/// debouncer folds everything inside `debounce` into a single reload, so a
/// half-written file is not parsed. The parent directory is watched rather
/// than the file itself because most editors save by replacing the file.
pub fn spawn_reload_watcher(
    source: Arc<TaxonomySource>,
    debounce: Duration,
) -> notify::Result<ReloadWatcher> {
    let file_name = source.path().file_name().map(|n| n.to_os_string());
    let watch_dir = match source.path().parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let watched = Arc::clone(&source);
    let mut debouncer = new_debouncer(debounce, None, move |result: DebounceEventResult| {
        let events = match result {
            Ok(events) => events,
            Err(errors) => {
                for e in errors {
                    tracing::warn!("taxonomy watcher error: {e}");
                }
                return;
            }
        };
        let touches_taxonomy = events
            .iter()
            .filter(|e| matches!(e.event.kind, EventKind::Create(_) | EventKind::Modify(_)))
            .flat_map(|e| e.event.paths.iter())
            .any(|p| p.file_name() == file_name.as_deref());
        if touches_taxonomy {
            // Errors are logged by `reload`.
            if let Ok(snapshot) = watched.reload() {
                tracing::info!(categories = snapshot.len(), "taxonomy hot-reloaded");
            }
        }
    })?;

    debouncer
        .watcher()
        .watch(&watch_dir, RecursiveMode::NonRecursive)?;
    tracing::info!(
        dir = %watch_dir.display(),
        debounce_ms = debounce.as_millis() as u64,
        "watching taxonomy for changes"
    );
    Ok(debouncer)
}
