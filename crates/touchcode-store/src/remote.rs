//! Project store backed by a remote tabular service.
//!
//! `RemoteStore` owns the policy (identity, single-flight saves, local
//! mirror); a [`RemoteTable`] owns the transport. Swapping the HTTP
//! client for the in-process table changes nothing above this module.

use async_trait::async_trait;

use touchcode_core::model::sort_by_recent;
use touchcode_core::{
    ChangeTopic, CoreError, CoreResult, Project, ProjectId, ProjectMetadata, ProjectStore,
    SaveGate, Subscription,
};

use crate::local::LocalStore;
use crate::row::ProjectRow;

/// The signed-in user a remote store acts for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    /// Bearer token, when the backend needs one
    pub access_token: Option<String>,
}

impl Identity {
    /// Creates an identity without a token.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            access_token: None,
        }
    }

    /// Attaches a bearer token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }
}

/// Transport-level failures.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("Not authorized")]
    Unauthorized,

    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Transport(String),

    #[error("Backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl From<RemoteError> for CoreError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Unauthorized => CoreError::Authentication(err.to_string()),
            other => CoreError::Storage(other.to_string()),
        }
    }
}

/// Row-level access to the remote `projects` table.
#[async_trait]
pub trait RemoteTable: Send + Sync {
    /// Inserts or replaces the row with the same id.
    async fn upsert(&self, identity: &Identity, row: ProjectRow) -> Result<(), RemoteError>;

    /// Fetches one row owned by `identity`.
    async fn fetch(
        &self,
        identity: &Identity,
        id: &ProjectId,
    ) -> Result<Option<ProjectRow>, RemoteError>;

    /// Lists rows owned by `identity`, newest `updated_at` first.
    async fn list(&self, identity: &Identity) -> Result<Vec<ProjectRow>, RemoteError>;

    /// Deletes a row. Missing rows are not an error.
    async fn remove(&self, identity: &Identity, id: &ProjectId) -> Result<(), RemoteError>;

    /// Starts a change feed for `topic`.
    fn watch(&self, identity: &Identity, topic: ChangeTopic) -> Result<Subscription, RemoteError>;
}

/// Remote-backed [`ProjectStore`] with an optional on-device mirror.
///
/// With a mirror attached, every successful remote write is copied to
/// it and reads that fail at the transport level are answered from it.
pub struct RemoteStore<T: RemoteTable> {
    table: T,
    identity: Option<Identity>,
    fallback: Option<LocalStore>,
    gate: SaveGate,
}

impl<T: RemoteTable> RemoteStore<T> {
    /// Creates a store acting for `identity`.
    ///
    /// Without an identity every operation fails with
    /// [`CoreError::Authentication`].
    pub fn new(table: T, identity: Option<Identity>) -> Self {
        Self {
            table,
            identity,
            fallback: None,
            gate: SaveGate::new(),
        }
    }

    /// Attaches an on-device mirror.
    pub fn with_fallback(mut self, local: LocalStore) -> Self {
        self.fallback = Some(local);
        self
    }

    /// Returns the transport.
    pub fn table(&self) -> &T {
        &self.table
    }

    fn identity(&self) -> CoreResult<&Identity> {
        self.identity
            .as_ref()
            .ok_or_else(|| CoreError::Authentication("no signed-in user".into()))
    }

    /// Returns the mirror if `err` is worth falling back for.
    fn fallback_for(&self, err: &RemoteError) -> Option<&LocalStore> {
        match err {
            RemoteError::Unauthorized => None,
            _ => self.fallback.as_ref(),
        }
    }
}

#[async_trait]
impl<T: RemoteTable> ProjectStore for RemoteStore<T> {
    async fn save(&self, project: &Project) -> CoreResult<()> {
        let identity = self.identity()?;
        let _slot = self.gate.enter(&project.id).await;

        let row = ProjectRow::from_project(project, &identity.user_id);
        self.table.upsert(identity, row).await?;
        tracing::info!(project = %project.id, "Saved to remote");

        if let Some(local) = &self.fallback {
            if let Err(err) = local.save(project).await {
                tracing::warn!(project = %project.id, "Local mirror not updated: {}", err);
            }
        }
        Ok(())
    }

    async fn get(&self, id: &ProjectId) -> CoreResult<Option<Project>> {
        let identity = self.identity()?;
        match self.table.fetch(identity, id).await {
            Ok(row) => row.map(ProjectRow::into_project).transpose(),
            Err(err) => match self.fallback_for(&err) {
                Some(local) => {
                    tracing::warn!(project = %id, "Remote fetch failed ({}), using local copy", err);
                    local.get(id).await
                }
                None => Err(err.into()),
            },
        }
    }

    async fn list_metadata(&self) -> CoreResult<Vec<ProjectMetadata>> {
        let identity = self.identity()?;
        match self.table.list(identity).await {
            Ok(rows) => {
                let mut list: Vec<_> = rows.iter().map(ProjectRow::metadata).collect();
                sort_by_recent(&mut list);
                Ok(list)
            }
            Err(err) => match self.fallback_for(&err) {
                Some(local) => {
                    tracing::warn!("Remote listing failed ({}), using local copy", err);
                    local.list_metadata().await
                }
                None => Err(err.into()),
            },
        }
    }

    async fn delete(&self, id: &ProjectId) -> CoreResult<()> {
        let identity = self.identity()?;
        self.table.remove(identity, id).await?;

        if let Some(local) = &self.fallback {
            if let Err(err) = local.delete(id).await {
                tracing::warn!(project = %id, "Local mirror not updated: {}", err);
            }
        }
        Ok(())
    }

    fn subscribe(&self, topic: ChangeTopic) -> CoreResult<Subscription> {
        let identity = self.identity()?;
        Ok(self.table.watch(identity, topic)?)
    }

    fn is_saving(&self, id: &ProjectId) -> bool {
        self.gate.is_busy(id)
    }
}
