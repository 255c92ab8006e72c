//! Filesystem connector.
//!
//! Scans a root directory with `walkdir`, filtering by include/exclude
//! globs, and watches it recursively with `notify`. Document ids are paths
//! relative to the root, always `/`-separated.
//!
//! `.git`, `target`, and `node_modules` are always excluded.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc::UnboundedSender;
use walkdir::WalkDir;

use liveindex_core::models::{ChangeEvent, ChangeKind};

use crate::config::WatchConfig;
use crate::connector::{Connector, SourceDocument, WatchHandle};

const DEFAULT_EXCLUDES: [&str; 3] = ["**/.git/**", "**/target/**", "**/node_modules/**"];

pub struct FilesystemConnector {
    root: PathBuf,
    follow_symlinks: bool,
    include_set: GlobSet,
    exclude_set: GlobSet,
}

impl FilesystemConnector {
    pub fn new(config: &WatchConfig) -> Result<Self> {
        let include_set = build_globset(&config.include_globs)?;

        let mut excludes: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
        excludes.extend(config.exclude_globs.iter().cloned());
        let exclude_set = build_globset(&excludes)?;

        // notify reports canonical paths, so match against a canonical root.
        let root = std::fs::canonicalize(&config.root).unwrap_or_else(|_| config.root.clone());

        Ok(Self {
            root,
            follow_symlinks: config.follow_symlinks,
            include_set,
            exclude_set,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Document id for an absolute path, or `None` if the path is outside
    /// the root or filtered out.
    fn doc_id_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let rel_str = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if rel_str.is_empty() {
            return None;
        }
        if self.exclude_set.is_match(&rel_str) || !self.include_set.is_match(&rel_str) {
            return None;
        }
        Some(rel_str)
    }

    fn path_for(&self, doc_id: &str) -> Result<PathBuf> {
        let relative = Path::new(doc_id);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            bail!("Document id escapes the watch root: {}", doc_id);
        }
        Ok(self.root.join(relative))
    }

    /// Map one notify event to change events for documents under the root.
    fn translate(&self, event: &Event) -> Vec<ChangeEvent> {
        let mut out = Vec::new();
        let mut push = |kind: ChangeKind, path: &Path| {
            if let Some(id) = self.doc_id_for(path) {
                out.push(ChangeEvent::new(kind, id));
            }
        };

        match &event.kind {
            EventKind::Create(_) => {
                for p in &event.paths {
                    push(ChangeKind::Created, p);
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                if let [from, to] = event.paths.as_slice() {
                    push(ChangeKind::Deleted, from);
                    push(ChangeKind::Created, to);
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                for p in &event.paths {
                    push(ChangeKind::Deleted, p);
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                for p in &event.paths {
                    push(ChangeKind::Created, p);
                }
            }
            EventKind::Modify(ModifyKind::Name(_)) => {
                for p in &event.paths {
                    let kind = if p.exists() {
                        ChangeKind::Created
                    } else {
                        ChangeKind::Deleted
                    };
                    push(kind, p);
                }
            }
            EventKind::Modify(_) => {
                for p in &event.paths {
                    push(ChangeKind::Modified, p);
                }
            }
            EventKind::Remove(_) => {
                // Editors that save via temp file + rename produce a remove
                // for a path that exists again by the time we look.
                for p in &event.paths {
                    let kind = if p.exists() {
                        ChangeKind::Modified
                    } else {
                        ChangeKind::Deleted
                    };
                    push(kind, p);
                }
            }
            EventKind::Access(_) | EventKind::Any | EventKind::Other => {}
        }
        out
    }
}

#[async_trait]
impl Connector for FilesystemConnector {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn list_documents(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            bail!(
                "Filesystem connector root does not exist: {}",
                self.root.display()
            );
        }

        let mut ids = Vec::new();
        let walker = WalkDir::new(&self.root).follow_links(self.follow_symlinks);
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(id) = self.doc_id_for(entry.path()) {
                ids.push(id);
            }
        }

        // Sort for deterministic ordering
        ids.sort();
        Ok(ids)
    }

    async fn get_content(&self, doc_id: &str) -> Result<Option<SourceDocument>> {
        let path = self.path_for(doc_id)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };

        let updated_at = tokio::fs::metadata(&path)
            .await
            .ok()
            .and_then(|m| m.modified().ok())
            .map(DateTime::<Utc>::from);

        Ok(Some(SourceDocument {
            bytes,
            permission_level: None,
            updated_at,
        }))
    }

    fn watch(&self, sink: UnboundedSender<ChangeEvent>) -> Result<WatchHandle> {
        if !self.root.exists() {
            bail!("Watch root does not exist: {}", self.root.display());
        }

        let translator = FilesystemConnector {
            root: self.root.clone(),
            follow_symlinks: self.follow_symlinks,
            include_set: self.include_set.clone(),
            exclude_set: self.exclude_set.clone(),
        };

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for change in translator.translate(&event) {
                    tracing::debug!(doc_id = %change.doc_id, kind = ?change.kind, "file event");
                    if sink.send(change).is_err() {
                        return;
                    }
                }
            }
            Err(e) => tracing::error!("Watcher error: {}", e),
        })
        .context("Failed to create file watcher")?;

        watcher
            .watch(&self.root, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {}", self.root.display()))?;

        tracing::info!(root = %self.root.display(), "file watcher started");
        Ok(WatchHandle::new(watcher))
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}
