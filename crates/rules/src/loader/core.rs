//! Core [`TriggerLoader`] struct: filesystem-backed trigger loading with optional hot-reload.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use crate::schema::{Trigger, TriggerDocument};

use super::error::{LoadResult, LoadStatus, LoaderError, Result};
use super::watcher::handle_fs_event;

/// Live event-name → trigger table shared with evaluators.
pub type TriggerTable = Arc<RwLock<HashMap<String, Trigger>>>;

/// A parsed document and the order it was loaded in.
#[derive(Debug)]
struct LoadedFile {
    seq: u64,
    document: TriggerDocument,
}

/// Parsed documents, keyed by the file each one came from.
///
/// Several files may declare the same `metadata.id`; the most recently
/// loaded one is effective, and removing it falls back to the next.
#[derive(Debug, Default)]
pub(super) struct LoadedDocuments {
    files: HashMap<PathBuf, LoadedFile>,
    next_seq: u64,
}

impl LoadedDocuments {
    fn insert(&mut self, path: &Path, document: TriggerDocument) {
        let id = &document.metadata.id;
        if self
            .files
            .iter()
            .any(|(p, f)| p.as_path() != path && &f.document.metadata.id == id)
        {
            warn!(
                document_id = %id,
                path = %path.display(),
                "document id defined in more than one file, last loaded wins"
            );
        }
        self.next_seq += 1;
        let seq = self.next_seq;
        self.files.insert(path.to_path_buf(), LoadedFile { seq, document });
    }

    fn remove(&mut self, path: &Path) -> Option<String> {
        self.files.remove(path).map(|f| f.document.metadata.id)
    }

    /// The effective document for every id, ordered by id.
    fn effective(&self) -> BTreeMap<&str, &TriggerDocument> {
        let mut winners: BTreeMap<&str, &LoadedFile> = BTreeMap::new();
        for file in self.files.values() {
            let id = file.document.metadata.id.as_str();
            match winners.get(id) {
                Some(current) if current.seq > file.seq => {}
                _ => {
                    winners.insert(id, file);
                }
            }
        }
        winners.into_iter().map(|(id, f)| (id, &f.document)).collect()
    }

    /// Every file declaring `id`, sorted by path.
    fn paths_for(&self, id: &str) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .files
            .iter()
            .filter(|(_, f)| f.document.metadata.id == id)
            .map(|(p, _)| p.clone())
            .collect();
        paths.sort();
        paths
    }
}

/// State shared between the loader and its watcher callback.
///
/// Lock order is always `documents` then `triggers`.
#[derive(Debug, Clone, Default)]
pub(super) struct SharedState {
    documents: Arc<RwLock<LoadedDocuments>>,
    triggers: TriggerTable,
}

impl SharedState {
    /// Insert or replace the document loaded from `path` and rebuild the table.
    pub(super) fn upsert(&self, path: &Path, doc: TriggerDocument) {
        let mut docs = self.documents.write().expect("documents lock poisoned");
        docs.insert(path, doc);
        self.rebuild(&docs);
    }

    /// Drop whatever document was loaded from `path`.
    pub(super) fn remove_path(&self, path: &Path) -> Option<String> {
        let mut docs = self.documents.write().expect("documents lock poisoned");
        let id = docs.remove(path)?;
        self.rebuild(&docs);
        Some(id)
    }

    /// Recompute the trigger table from every enabled document, in document-id order.
    fn rebuild(&self, docs: &LoadedDocuments) {
        let effective = docs.effective();

        let mut table: HashMap<String, Trigger> = HashMap::new();
        let mut owners: HashMap<&str, &str> = HashMap::new();
        for (&id, doc) in &effective {
            if !doc.metadata.enabled {
                debug!(document_id = %id, "document disabled, contributing no triggers");
                continue;
            }
            for trigger in &doc.triggers {
                if let Some(previous) = owners.insert(trigger.event_name.as_str(), id) {
                    warn!(
                        event = %trigger.event_name,
                        overridden = %previous,
                        document_id = %id,
                        "trigger defined by more than one document, later document wins"
                    );
                }
                table.insert(trigger.event_name.clone(), trigger.clone());
            }
        }

        let count = table.len();
        *self.triggers.write().expect("triggers lock poisoned") = table;
        debug!(triggers = count, documents = effective.len(), "rebuilt trigger table");
    }
}

/// Parse and validate one trigger document. `.json` files are read as JSON,
/// everything else as YAML.
pub(super) fn parse_document(path: &Path) -> Result<TriggerDocument> {
    let contents = fs::read_to_string(path)?;
    let doc: TriggerDocument = if extension(path) == Some("json") {
        serde_json::from_str(&contents)?
    } else {
        serde_yaml::from_str(&contents)?
    };
    doc.validate().map_err(|e| {
        LoaderError::Validation(format!("document '{}': {}", doc.metadata.id, e))
    })?;
    Ok(doc)
}

pub(super) fn is_trigger_file(path: &Path) -> bool {
    matches!(extension(path), Some("yml" | "yaml" | "json"))
}

pub(super) fn is_dotfile(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|e| e.to_str())
}

/// Filesystem-backed trigger loader with optional hot-reload.
///
/// Scans a directory (recursively) for `*.yml`, `*.yaml` and `*.json`
/// files, parses each into a [`TriggerDocument`], and keeps the merged
/// trigger table current.
pub struct TriggerLoader {
    triggers_dir: PathBuf,
    state: SharedState,
    /// Active filesystem watcher (held to keep it alive).
    _watcher: Option<RecommendedWatcher>,
}

impl TriggerLoader {
    /// Create a new loader for the given directory.
    ///
    /// Creates the directory (and parents) if it does not exist.
    pub fn new(triggers_dir: PathBuf) -> Self {
        if !triggers_dir.exists() {
            if let Err(e) = fs::create_dir_all(&triggers_dir) {
                warn!(
                    path = %triggers_dir.display(),
                    error = %e,
                    "failed to create triggers directory"
                );
            }
        }
        Self {
            triggers_dir,
            state: SharedState::default(),
            _watcher: None,
        }
    }

    /// Recursively scan the triggers directory and load every document.
    ///
    /// Parse errors are reported per file but do not abort the scan. The
    /// trigger table is rebuilt once, after the whole tree was read.
    pub fn load_all(&self) -> Result<Vec<LoadResult>> {
        let mut results = Vec::new();
        let mut docs = self.state.documents.write().expect("documents lock poisoned");
        self.scan_dir_recursive(&self.triggers_dir, &mut docs, &mut results)?;
        self.state.rebuild(&docs);
        Ok(results)
    }

    fn scan_dir_recursive(
        &self,
        dir: &Path,
        docs: &mut LoadedDocuments,
        results: &mut Vec<LoadResult>,
    ) -> Result<()> {
        let mut entries = match fs::read_dir(dir) {
            Ok(e) => e.collect::<std::io::Result<Vec<_>>>()?,
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "failed to read directory");
                return Ok(());
            }
        };
        // Stable scan order keeps override warnings and results reproducible.
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            let path = entry.path();

            if is_dotfile(&path) {
                if path.is_file() {
                    results.push(LoadResult {
                        path,
                        status: LoadStatus::Skipped {
                            reason: "dotfile".to_string(),
                        },
                    });
                }
                continue;
            }

            if path.is_dir() {
                self.scan_dir_recursive(&path, docs, results)?;
                continue;
            }

            if !is_trigger_file(&path) {
                results.push(LoadResult {
                    path,
                    status: LoadStatus::Skipped {
                        reason: "not a YAML or JSON file".to_string(),
                    },
                });
                continue;
            }

            match parse_document(&path) {
                Ok(doc) => {
                    let document_id = doc.metadata.id.clone();
                    let triggers = if doc.metadata.enabled { doc.triggers.len() } else { 0 };
                    info!(
                        document_id = %document_id,
                        triggers,
                        path = %path.display(),
                        "loaded trigger document"
                    );
                    docs.insert(&path, doc);
                    results.push(LoadResult {
                        path,
                        status: LoadStatus::Loaded { document_id, triggers },
                    });
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to load trigger document");
                    results.push(LoadResult {
                        path,
                        status: LoadStatus::Failed {
                            error: e.to_string(),
                        },
                    });
                }
            }
        }

        Ok(())
    }

    /// Parse a single file without adding it to the loader.
    pub fn load_file(&self, path: &Path) -> Result<TriggerDocument> {
        parse_document(path)
    }

    /// Start a filesystem watcher with 500ms debounce.
    ///
    /// On create/modify the document is re-parsed and upserted; on delete it
    /// is dropped. Parse errors keep the previous version.
    pub fn watch(&mut self) -> Result<()> {
        let state = self.state.clone();

        let mut watcher = notify::recommended_watcher(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => handle_fs_event(&event, &state),
                Err(e) => warn!(error = %e, "filesystem watcher error"),
            },
        )?;

        watcher.watch(&self.triggers_dir, RecursiveMode::Recursive)?;

        let _ = watcher
            .configure(notify::Config::default().with_poll_interval(Duration::from_millis(500)));

        info!(
            path = %self.triggers_dir.display(),
            "watching triggers directory for changes (recursive)"
        );
        self._watcher = Some(watcher);
        Ok(())
    }

    pub fn triggers_dir(&self) -> &Path {
        &self.triggers_dir
    }

    /// Shared handle to the live trigger table.
    pub fn triggers(&self) -> TriggerTable {
        Arc::clone(&self.state.triggers)
    }

    /// Owned copy of the trigger table for one evaluation.
    pub fn snapshot(&self) -> HashMap<String, Trigger> {
        self.state
            .triggers
            .read()
            .expect("triggers lock poisoned")
            .clone()
    }

    /// A loaded document by `metadata.id`.
    pub fn document(&self, id: &str) -> Option<TriggerDocument> {
        self.state
            .documents
            .read()
            .expect("documents lock poisoned")
            .effective()
            .get(id)
            .map(|doc| (*doc).clone())
    }

    #[cfg(test)]
    pub(super) fn shared_state(&self) -> &SharedState {
        &self.state
    }

    pub fn document_count(&self) -> usize {
        self.state
            .documents
            .read()
            .expect("documents lock poisoned")
            .effective()
            .len()
    }

    /// Atomically write a document to `<id>.yml` and load it.
    ///
    /// Writes to a `.tmp` dotfile first, then renames to the final path to
    /// avoid partial writes on crash.
    pub fn write_document(&self, doc: &TriggerDocument) -> Result<PathBuf> {
        doc.validate().map_err(LoaderError::Validation)?;

        let id = &doc.metadata.id;
        let final_path = self.triggers_dir.join(format!("{}.yml", id));
        let tmp_path = self.triggers_dir.join(format!(".{}.tmp", id));

        let yaml = doc.to_yaml()?;
        fs::write(&tmp_path, yaml)?;
        fs::rename(&tmp_path, &final_path)?;

        info!(document_id = %id, path = %final_path.display(), "wrote trigger document");

        self.state.upsert(&final_path, doc.clone());
        Ok(final_path)
    }

    /// Delete every file declaring document `id`, and the document itself.
    pub fn delete_document(&self, id: &str) -> Result<()> {
        let paths = self
            .state
            .documents
            .read()
            .expect("documents lock poisoned")
            .paths_for(id);
        if paths.is_empty() {
            return Err(LoaderError::Validation(format!(
                "no trigger document loaded with id '{}'",
                id
            )));
        }

        for path in paths {
            fs::remove_file(&path)?;
            self.state.remove_path(&path);
            info!(document_id = %id, path = %path.display(), "deleted trigger document");
        }
        Ok(())
    }
}
