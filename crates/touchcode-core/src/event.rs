//! Event system for session notifications.
//!
//! ## Learning: Observer Pattern in Rust
//!
//! Rendering code wants to know when the open project, the active file
//! or the preview changes, but it must not hold references into the
//! session. `tokio::sync::broadcast` carries events as values:
//! - No object references to manage
//! - Subscribers receive copies (Clone)
//! - Lagged receivers don't block the session

use crate::model::{FileId, ProjectId};
use tokio::sync::broadcast;

/// Events emitted by a [`Session`](crate::Session).
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    // Project events
    /// A project became the open project
    ProjectOpened(ProjectId),
    /// The session went back to the project list
    ProjectClosed(ProjectId),
    /// The open project was replaced by a fresh copy from storage
    ProjectRefreshed(ProjectId),

    // File events
    /// A file was added to the open project
    FileCreated(FileId),
    /// A file was removed from the open project
    FileDeleted(FileId),
    /// The active file changed (None = no active file)
    FileSelected(Option<FileId>),
    /// The active file's content was edited
    ContentChanged(FileId),

    // Persistence events
    /// A save request was handed to the store
    SaveStarted(ProjectId),
    /// The store accepted the save
    Saved(ProjectId),
    /// The store rejected the save
    SaveFailed(ProjectId),

    // Preview events
    /// Preview visibility changed
    PreviewToggled(bool),
    /// The composed preview document was regenerated
    PreviewUpdated,

    /// Theme changed
    ThemeChanged(crate::session::Theme),
}

/// Event bus for broadcasting session events.
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// Creates a new event bus.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self { sender }
    }

    /// Emits an event to all subscribers.
    pub fn emit(&self, event: SessionEvent) {
        // No receivers is fine
        let _ = self.sender.send(event);
    }

    /// Subscribes to events.
    ///
    /// Returns a receiver that will get all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

/// Helper for processing events asynchronously.
///
/// ## Example
///
/// ```ignore
/// let mut handler = EventHandler::new(session.subscribe());
///
/// tokio::spawn(async move {
///     while let Some(event) = handler.next().await {
///         if let SessionEvent::PreviewUpdated = event {
///             // Redraw the preview pane
///         }
///     }
/// });
/// ```
pub struct EventHandler {
    receiver: broadcast::Receiver<SessionEvent>,
}

impl EventHandler {
    /// Creates a new event handler.
    pub fn new(receiver: broadcast::Receiver<SessionEvent>) -> Self {
        Self { receiver }
    }

    /// Waits for the next event.
    pub async fn next(&mut self) -> Option<SessionEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Event handler lagged, missed {} events", n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
