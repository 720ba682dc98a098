//! The storage contract shared by local and remote backends.
//!
//! ## Learning: Trait Objects with Async Methods
//!
//! `#[async_trait]` boxes each returned future, which keeps the trait
//! object-safe: the session can hold an `Arc<dyn ProjectStore>` and never
//! learn whether projects live on disk or behind a network service.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::{OwnedMutexGuard, mpsc};
use tokio::task::JoinHandle;

use crate::CoreResult;
use crate::model::{Project, ProjectId, ProjectMetadata};
use crate::transfer;

/// Backend-agnostic project persistence.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Upserts the full project keyed by its id.
    ///
    /// Saving the same id twice overwrites; it never duplicates.
    async fn save(&self, project: &Project) -> CoreResult<()>;

    /// Fetches a project. `Ok(None)` means it does not exist.
    async fn get(&self, id: &ProjectId) -> CoreResult<Option<Project>>;

    /// Lists visible projects, most recently modified first.
    async fn list_metadata(&self) -> CoreResult<Vec<ProjectMetadata>>;

    /// Removes a project and its files. Missing ids are not an error.
    async fn delete(&self, id: &ProjectId) -> CoreResult<()>;

    /// Starts delivering change notices for `topic`.
    fn subscribe(&self, topic: ChangeTopic) -> CoreResult<Subscription>;

    /// Returns true while a save for `id` is in flight.
    fn is_saving(&self, _id: &ProjectId) -> bool {
        false
    }

    /// Serializes a project to portable text.
    fn export_to_text(&self, project: &Project) -> CoreResult<String> {
        transfer::export_project(project)
    }

    /// Parses portable text. The caller assigns a fresh id before saving.
    fn import_from_text(&self, text: &str) -> CoreResult<Project> {
        transfer::import_project(text)
    }
}

/// What a subscription listens to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChangeTopic {
    /// A single project record
    Project(ProjectId),
    /// Any project in the collection
    Collection,
}

impl ChangeTopic {
    /// Returns true if a change to `id` is relevant to this topic.
    pub fn matches(&self, id: &ProjectId) -> bool {
        match self {
            ChangeTopic::Project(wanted) => wanted == id,
            ChangeTopic::Collection => true,
        }
    }
}

/// "Something changed" signal. Carries no record data; receivers re-fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotice {
    /// Project that changed, when the backend knows it
    pub project: Option<ProjectId>,
}

/// A live change feed. Dropping it cancels the feed.
pub struct Subscription {
    topic: ChangeTopic,
    receiver: mpsc::UnboundedReceiver<ChangeNotice>,
    // Watchers or tasks that feed the channel
    _guard: Option<Box<dyn Any + Send>>,
}

impl Subscription {
    /// Creates a subscription fed through `receiver`.
    pub fn new(topic: ChangeTopic, receiver: mpsc::UnboundedReceiver<ChangeNotice>) -> Self {
        Self {
            topic,
            receiver,
            _guard: None,
        }
    }

    /// Creates a subscription and the sender that feeds it.
    pub fn channel(topic: ChangeTopic) -> (mpsc::UnboundedSender<ChangeNotice>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self::new(topic, rx))
    }

    /// Keeps `guard` alive for as long as the subscription exists.
    pub fn with_guard(mut self, guard: impl Any + Send) -> Self {
        self._guard = Some(Box::new(guard));
        self
    }

    /// Returns the subscribed topic.
    pub fn topic(&self) -> &ChangeTopic {
        &self.topic
    }

    /// Drains all pending notices, returning how many there were.
    pub fn drain(&mut self) -> usize {
        let mut count = 0;
        while self.receiver.try_recv().is_ok() {
            count += 1;
        }
        count
    }

    /// Waits for the next notice. `None` once the feed has shut down.
    pub async fn changed(&mut self) -> Option<ChangeNotice> {
        self.receiver.recv().await
    }

    /// Stops the feed.
    pub fn cancel(self) {
        tracing::debug!(topic = ?self.topic, "Subscription cancelled");
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

/// Aborts a background task when dropped.
pub struct TaskGuard(JoinHandle<()>);

impl TaskGuard {
    pub fn new(handle: JoinHandle<()>) -> Self {
        Self(handle)
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Serializes saves per project id.
///
/// A second save for the same project waits until the first one has
/// finished, so two upserts of one record never interleave.
#[derive(Default)]
pub struct SaveGate {
    slots: Mutex<HashMap<ProjectId, Arc<tokio::sync::Mutex<()>>>>,
}

impl SaveGate {
    /// Creates an empty gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive save access to `id`.
    pub async fn enter(&self, id: &ProjectId) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.entry(id.clone()).or_default().clone()
        };
        slot.lock_owned().await
    }

    /// Returns true if a save for `id` is currently running.
    pub fn is_busy(&self, id: &ProjectId) -> bool {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(id).is_some_and(|slot| slot.try_lock().is_err())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_topic_matching() {
        let id = ProjectId::from("p1");
        assert!(ChangeTopic::Collection.matches(&id));
        assert!(ChangeTopic::Project(id.clone()).matches(&id));
        assert!(!ChangeTopic::Project(ProjectId::from("p2")).matches(&id));
    }

    #[tokio::test]
    async fn test_subscription_drain_and_close() {
        let (tx, mut sub) = Subscription::channel(ChangeTopic::Collection);
        tx.send(ChangeNotice { project: None }).unwrap();
        tx.send(ChangeNotice { project: None }).unwrap();

        assert_eq!(sub.drain(), 2);
        assert_eq!(sub.drain(), 0);

        drop(tx);
        assert!(sub.changed().await.is_none());
    }

    #[tokio::test]
    async fn test_save_gate_queues_same_project() {
        let gate = Arc::new(SaveGate::new());
        let id = ProjectId::from("p1");

        let first = gate.enter(&id).await;
        assert!(gate.is_busy(&id));

        let waiter = {
            let gate = gate.clone();
            let id = id.clone();
            tokio::spawn(async move {
                let _second = gate.enter(&id).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(first);
        waiter.await.unwrap();
        assert!(!gate.is_busy(&id));
    }

    #[tokio::test]
    async fn test_save_gate_independent_projects() {
        let gate = SaveGate::new();
        let _a = gate.enter(&ProjectId::from("a")).await;
        let _b = gate.enter(&ProjectId::from("b")).await;
        assert!(gate.is_busy(&ProjectId::from("a")));
        assert!(gate.is_busy(&ProjectId::from("b")));
    }
}
