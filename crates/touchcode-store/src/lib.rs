//! # TouchCode Store
//!
//! Storage backends behind the [`ProjectStore`] contract.
//!
//! - [`LocalStore`]: JSON records in a directory on the device
//! - [`RemoteStore`]: rows in a hosted table, reached through a
//!   [`RemoteTable`] transport ([`HttpTable`] or [`MemoryTable`])
//!
//! ## Learning: Choosing an Implementation at Runtime
//!
//! [`open_store`] returns `Arc<dyn ProjectStore>`. The session is generic
//! over `S: ProjectStore + ?Sized`, so the same session code runs over a
//! concrete store in tests and a trait object in the application.

pub mod http;
pub mod local;
pub mod memory;
pub mod remote;
pub mod row;

use std::sync::Arc;

use touchcode_core::config::Backend;
use touchcode_core::{Config, CoreError, CoreResult, ProjectStore};

pub use http::HttpTable;
pub use local::LocalStore;
pub use memory::MemoryTable;
pub use remote::{Identity, RemoteError, RemoteStore, RemoteTable};
pub use row::ProjectRow;

/// Directory under the data dir that mirrors remote projects.
const MIRROR_DIR: &str = "mirror";

/// Opens the store selected by `config`.
///
/// `identity` is only consulted by the remote backend; a remote store
/// opened without one rejects every operation as unauthenticated.
pub fn open_store(
    config: &Config,
    identity: Option<Identity>,
) -> CoreResult<Arc<dyn ProjectStore>> {
    let data_dir = config.data_dir().map_err(CoreError::storage)?;

    match config.storage.backend {
        Backend::Local => {
            tracing::info!("Using local store at {}", data_dir.display());
            Ok(Arc::new(LocalStore::open(data_dir)?))
        }
        Backend::Remote => {
            let table = HttpTable::new(&config.remote)?;
            tracing::info!("Using remote store at {}", table.endpoint());

            let mut store = RemoteStore::new(table, identity);
            if config.storage.local_fallback {
                store = store.with_fallback(LocalStore::open(data_dir.join(MIRROR_DIR))?);
            }
            Ok(Arc::new(store))
        }
    }
}

/// Builds an identity from the configured user, if any.
pub fn configured_identity(config: &Config) -> Option<Identity> {
    let user = config.remote.user_id.as_deref()?.trim();
    if user.is_empty() {
        return None;
    }
    let identity = Identity::new(user);
    Some(match &config.remote.access_token {
        Some(token) => identity.with_token(token.clone()),
        None => identity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_local_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = Some(dir.path().to_path_buf());

        let store = open_store(&config, None).unwrap();
        assert!(store.list_metadata().await.unwrap().is_empty());
        assert!(dir.path().join("projects").is_dir());
    }

    #[test]
    fn test_remote_without_url_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = Some(dir.path().to_path_buf());
        config.storage.backend = Backend::Remote;

        assert!(matches!(
            open_store(&config, None),
            Err(CoreError::Storage(_))
        ));
    }

    #[tokio::test]
    async fn test_remote_without_identity_is_unauthenticated() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = Some(dir.path().to_path_buf());
        config.storage.backend = Backend::Remote;
        config.remote.url = "http://127.0.0.1:9".to_string();

        let store = open_store(&config, None).unwrap();
        assert!(matches!(
            store.list_metadata().await,
            Err(CoreError::Authentication(_))
        ));
        assert!(dir.path().join("mirror").is_dir());
    }

    #[test]
    fn test_configured_identity() {
        let mut config = Config::default();
        assert!(configured_identity(&config).is_none());

        config.remote.user_id = Some("  ".to_string());
        assert!(configured_identity(&config).is_none());

        config.remote.user_id = Some("alice".to_string());
        config.remote.access_token = Some("tok".to_string());
        let identity = configured_identity(&config).unwrap();
        assert_eq!(identity.user_id, "alice");
        assert_eq!(identity.access_token.as_deref(), Some("tok"));
    }
}
