//! # TouchCode Core
//!
//! Project model, preview composition and editor session state.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        Session                            │
//! │  ┌──────────────┐ ┌──────────────┐ ┌───────────────────┐ │
//! │  │ SessionState │ │ PreviewPanel │ │     EventBus      │ │
//! │  └──────────────┘ └──────────────┘ └───────────────────┘ │
//! │         │                                                 │
//! │  ┌──────┴───────────────────────────────────┐             │
//! │  │        dyn ProjectStore (local/remote)    │             │
//! │  └──────────────────────────────────────────┘             │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The storage backends live in `touchcode-store`; this crate only
//! defines the contract they implement.

pub mod config;
pub mod event;
pub mod model;
pub mod preview;
pub mod session;
pub mod store;
pub mod templates;
pub mod transfer;

pub use config::Config;
pub use event::{EventBus, EventHandler, SessionEvent};
pub use model::{File, FileId, Project, ProjectId, ProjectMetadata};
pub use preview::{Preview, PreviewKind, PreviewPanel, RenderSurface};
pub use session::{Session, SessionPhase, SessionState, Theme};
pub use store::{ChangeNotice, ChangeTopic, ProjectStore, SaveGate, Subscription};
pub use templates::{LanguageInfo, validate_file_name};

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in core operations
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Not authenticated: {0}")]
    Authentication(String),

    #[error("Project not found: {0}")]
    NotFound(ProjectId),

    #[error("File not found: {0}")]
    FileNotFound(FileId),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Invalid project data: {0}")]
    Format(String),

    #[error("No project is open")]
    NoActiveProject,

    #[error("No active file")]
    NoActiveFile,
}

impl CoreError {
    /// Wraps any displayable failure as a storage error.
    pub fn storage(err: impl std::fmt::Display) -> Self {
        CoreError::Storage(err.to_string())
    }

    /// Wraps any displayable failure as a format error.
    pub fn format(err: impl std::fmt::Display) -> Self {
        CoreError::Format(err.to_string())
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::Storage(err.to_string())
    }
}

/// Rejected file or project names.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("File name cannot be empty")]
    EmptyFileName,

    #[error("File name cannot contain slashes")]
    PathSeparator,

    #[error("File name too long ({0} characters, maximum is 100)")]
    FileNameTooLong(usize),

    #[error("File with this name already exists: {0}")]
    DuplicateFileName(String),

    #[error("Project name is required")]
    EmptyProjectName,
}
