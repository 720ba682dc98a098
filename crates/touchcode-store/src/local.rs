//! On-device project storage.
//!
//! ## Layout
//!
//! ```text
//! <root>/
//!   metadata.json        listing index, one entry per project
//!   projects/<id>.json   full project record
//! ```
//!
//! The index lets the project list load without reading every file
//! body. Every write goes to a temporary file first and is renamed into
//! place, so a crash never leaves a half-written record behind.
//!
//! Records are the source of truth. The index is a cache: when it is
//! missing or unreadable it is rebuilt from the records, and a failed
//! index update after a successful record write drops the index rather
//! than failing the save.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use notify::{Event, RecursiveMode, Watcher};
use tokio::sync::Mutex;

use touchcode_core::model::sort_by_recent;
use touchcode_core::transfer::ProjectRecord;
use touchcode_core::{
    ChangeNotice, ChangeTopic, CoreError, CoreResult, Project, ProjectId, ProjectMetadata,
    ProjectStore, SaveGate, Subscription,
};

const PROJECTS_DIR: &str = "projects";
const METADATA_FILE: &str = "metadata.json";

/// Project store backed by a directory on the device.
pub struct LocalStore {
    /// Data directory
    root: PathBuf,

    /// Per-project save serialization
    gate: SaveGate,

    /// Guards read-modify-write of the metadata index
    index_lock: Mutex<()>,
}

impl LocalStore {
    /// Opens (and creates if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> CoreResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(root.join(PROJECTS_DIR))?;
        tracing::debug!("Local store at {}", root.display());

        Ok(Self {
            root,
            gate: SaveGate::new(),
            index_lock: Mutex::new(()),
        })
    }

    /// Returns the data directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn projects_dir(&self) -> PathBuf {
        self.root.join(PROJECTS_DIR)
    }

    fn index_path(&self) -> PathBuf {
        self.root.join(METADATA_FILE)
    }

    /// Maps an id to its record file, or `None` if the id could not
    /// name a file inside the store.
    fn record_path(&self, id: &ProjectId) -> Option<PathBuf> {
        is_safe_id(id.as_str()).then(|| self.projects_dir().join(format!("{id}.json")))
    }

    async fn read_record(&self, path: &Path) -> CoreResult<Option<Project>> {
        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let record: ProjectRecord = serde_json::from_str(&text).map_err(|e| {
            CoreError::Storage(format!("corrupt record {}: {e}", path.display()))
        })?;
        record
            .into_project()
            .map(Some)
            .map_err(|e| CoreError::Storage(format!("corrupt record {}: {e}", path.display())))
    }

    async fn read_index(&self) -> CoreResult<Vec<ProjectMetadata>> {
        let text = match tokio::fs::read_to_string(self.index_path()).await {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return self.rebuild_index().await,
            Err(err) => return Err(err.into()),
        };

        match serde_json::from_str(&text) {
            Ok(index) => Ok(index),
            Err(err) => {
                tracing::warn!("Metadata index unreadable ({}), rebuilding", err);
                self.rebuild_index().await
            }
        }
    }

    /// Recreates the index from the record files.
    async fn rebuild_index(&self) -> CoreResult<Vec<ProjectMetadata>> {
        let mut index = Vec::new();
        let mut entries = tokio::fs::read_dir(self.projects_dir()).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match self.read_record(&path).await {
                Ok(Some(project)) => index.push(project.metadata()),
                Ok(None) => {}
                Err(err) => tracing::warn!("Skipping {}: {}", path.display(), err),
            }
        }
        if let Err(err) = self.write_index(&index).await {
            tracing::warn!("Metadata index not written: {}", err);
        }
        Ok(index)
    }

    /// Applies `change` to the index. If the new index cannot be
    /// written the old one is removed so the next listing rebuilds it.
    async fn update_index(
        &self,
        change: impl FnOnce(&mut Vec<ProjectMetadata>),
    ) -> CoreResult<()> {
        let _index = self.index_lock.lock().await;
        let mut index = self.read_index().await?;
        change(&mut index);
        if let Err(err) = self.write_index(&index).await {
            tracing::warn!("Metadata index update failed ({}), dropping it", err);
            match tokio::fs::remove_file(self.index_path()).await {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    async fn write_index(&self, index: &[ProjectMetadata]) -> CoreResult<()> {
        let bytes = serde_json::to_vec_pretty(index).map_err(CoreError::storage)?;
        write_atomic(&self.index_path(), &bytes).await
    }
}

#[async_trait]
impl ProjectStore for LocalStore {
    async fn save(&self, project: &Project) -> CoreResult<()> {
        let path = self
            .record_path(&project.id)
            .ok_or_else(|| CoreError::Storage(format!("invalid project id {:?}", project.id.as_str())))?;

        let _slot = self.gate.enter(&project.id).await;

        let bytes = serde_json::to_vec_pretty(&ProjectRecord::from_project(project))
            .map_err(CoreError::storage)?;
        write_atomic(&path, &bytes).await?;

        let meta = project.metadata();
        self.update_index(|index| match index.iter_mut().find(|m| m.id == meta.id) {
            Some(existing) => *existing = meta,
            None => index.push(meta),
        })
        .await?;

        tracing::debug!(project = %project.id, "Saved to {}", path.display());
        Ok(())
    }

    async fn get(&self, id: &ProjectId) -> CoreResult<Option<Project>> {
        match self.record_path(id) {
            Some(path) => self.read_record(&path).await,
            None => Ok(None),
        }
    }

    async fn list_metadata(&self) -> CoreResult<Vec<ProjectMetadata>> {
        let mut index = self.read_index().await?;
        sort_by_recent(&mut index);
        Ok(index)
    }

    async fn delete(&self, id: &ProjectId) -> CoreResult<()> {
        let Some(path) = self.record_path(id) else {
            return Ok(());
        };

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        self.update_index(|index| index.retain(|m| &m.id != id)).await
    }

    fn subscribe(&self, topic: ChangeTopic) -> CoreResult<Subscription> {
        let (tx, subscription) = Subscription::channel(topic.clone());

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let Ok(event) = res else { return };
            if !(event.kind.is_create() || event.kind.is_modify() || event.kind.is_remove()) {
                return;
            }
            for path in event.paths {
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                let id = ProjectId::from(stem);
                if topic.matches(&id) {
                    let _ = tx.send(ChangeNotice { project: Some(id) });
                }
            }
        })
        .map_err(CoreError::storage)?;

        watcher
            .watch(&self.projects_dir(), RecursiveMode::NonRecursive)
            .map_err(CoreError::storage)?;

        Ok(subscription.with_guard(watcher))
    }

    fn is_saving(&self, id: &ProjectId) -> bool {
        self.gate.is_busy(id)
    }
}

/// Ids become file names, so only a conservative character set is allowed.
fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> CoreResult<()> {
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
