//! Editor session orchestration.
//!
//! ## Learning: The Facade Pattern
//!
//! `Session` is the one object the rendering layer talks to. It owns the
//! selection state, the preview pane and the event bus, and it is the
//! only place that decides when something gets written to the store.
//!
//! ## Persistence Rules
//!
//! - Structural changes (new project, new file, deleted file) are saved
//!   immediately. The change is applied to a copy first and only becomes
//!   the session state once the store accepted it.
//! - Content edits stay in memory until [`Session::save`].
//! - Leaving a project drops unsaved edits. The caller is expected to
//!   ask the user first; [`Session::has_unsaved_changes`] tells it when.

use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::config::Config;
use crate::event::{EventBus, SessionEvent};
use crate::model::{File, FileId, Project, ProjectId, ProjectMetadata};
use crate::preview::{PreviewPanel, RenderSurface};
use crate::store::{ChangeTopic, ProjectStore, Subscription};
use crate::templates;
use crate::{CoreError, CoreResult};

/// Color theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    /// Returns the other theme.
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Showing the project list
    NoProject,
    /// A project is open but no file is active
    ProjectSelected,
    /// A project is open and a file is being edited
    FileActive,
}

/// Everything the rendering layer needs to draw the editor.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    project: Option<Project>,
    active_file: Option<FileId>,
    dirty: bool,
    theme: Theme,
}

impl SessionState {
    /// Returns the open project.
    pub fn project(&self) -> Option<&Project> {
        self.project.as_ref()
    }

    /// Returns the active file's id.
    pub fn active_file_id(&self) -> Option<&FileId> {
        self.active_file.as_ref()
    }

    /// Returns the active file.
    pub fn active_file(&self) -> Option<&File> {
        let id = self.active_file.as_ref()?;
        self.project.as_ref()?.file(id)
    }

    /// Returns the current lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        match (&self.project, &self.active_file) {
            (None, _) => SessionPhase::NoProject,
            (Some(_), None) => SessionPhase::ProjectSelected,
            (Some(_), Some(_)) => SessionPhase::FileActive,
        }
    }

    /// Returns true if content edits have not been saved yet.
    pub fn has_unsaved_changes(&self) -> bool {
        self.dirty
    }

    /// Returns the color theme.
    pub fn theme(&self) -> Theme {
        self.theme
    }

    fn files(&self) -> &[File] {
        self.project.as_ref().map_or(&[], |p| p.files.as_slice())
    }
}

/// The editor session controller.
///
/// ## Thread Safety
///
/// A session is owned by a single task. Every mutating method takes
/// `&mut self`, so two saves from the same session can never overlap;
/// saves from different sessions sharing a store are queued by the
/// store's [`SaveGate`](crate::SaveGate).
pub struct Session<S: ProjectStore + ?Sized> {
    /// Persistence backend
    store: Arc<S>,

    /// Selection and edit state
    state: SessionState,

    /// Preview pane
    preview: PreviewPanel,

    /// Event bus for notifications
    events: EventBus,

    /// Change feed for the open project
    subscription: Option<Subscription>,

    /// Show the preview pane when a project is opened
    preview_on_open: bool,

    /// `last_modified` of the copy this session last loaded or wrote.
    /// A change notice whose re-fetch yields this stamp is our own write.
    last_synced: Option<DateTime<Utc>>,
}

impl<S: ProjectStore + ?Sized> Session<S> {
    /// Creates a session with no project open.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            state: SessionState::default(),
            preview: PreviewPanel::default(),
            events: EventBus::new(),
            subscription: None,
            preview_on_open: false,
            last_synced: None,
        }
    }

    /// Creates a session using UI preferences from `config`.
    pub fn with_config(store: Arc<S>, config: &Config) -> Self {
        let mut session = Self::new(store);
        session.state.theme = config.ui.theme;
        session.preview_on_open = config.preview.visible_on_open;
        session
    }

    // ==================== Accessors ====================

    /// Returns the session state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Returns the preview pane.
    pub fn preview(&self) -> &PreviewPanel {
        &self.preview
    }

    /// Returns the backing store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Returns true if content edits have not been saved yet.
    pub fn has_unsaved_changes(&self) -> bool {
        self.state.dirty
    }

    /// Subscribes to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Returns true while the store is writing the open project.
    ///
    /// Shared stores queue saves per project; a UI uses this to disable
    /// its save button instead of stacking another upsert behind one.
    pub fn is_saving(&self) -> bool {
        self.state
            .project
            .as_ref()
            .is_some_and(|p| self.store.is_saving(&p.id))
    }

    // ==================== Project List ====================

    /// Lists projects, most recently modified first.
    pub async fn list_projects(&self) -> CoreResult<Vec<ProjectMetadata>> {
        self.store.list_metadata().await
    }

    /// Starts a change feed for the whole collection, for keeping a
    /// project list current.
    pub fn watch_projects(&self) -> CoreResult<Subscription> {
        self.store.subscribe(ChangeTopic::Collection)
    }

    /// Creates, saves and opens a new empty project.
    pub async fn create_project(
        &mut self,
        name: &str,
        description: Option<&str>,
    ) -> CoreResult<ProjectId> {
        let project = Project::new(name, description)?;
        self.store.save(&project).await?;
        tracing::info!(project = %project.id, "Created project {:?}", project.name);

        let id = project.id.clone();
        self.select_project(project);
        Ok(id)
    }

    /// Fetches a project from the store and opens it.
    pub async fn open_project(&mut self, id: &ProjectId) -> CoreResult<()> {
        let project = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(id.clone()))?;
        self.select_project(project);
        Ok(())
    }

    /// Opens an already loaded project, activating its first file.
    pub fn select_project(&mut self, project: Project) {
        self.close_current();

        let id = project.id.clone();
        let first = project.files.first().map(|f| f.id.clone());
        tracing::debug!(project = %id, "Selecting project");

        self.last_synced = Some(project.last_modified);
        self.state.project = Some(project);
        self.state.active_file = first.clone();
        self.state.dirty = false;

        self.subscription = match self.store.subscribe(ChangeTopic::Project(id.clone())) {
            Ok(sub) => Some(sub),
            Err(err) => {
                tracing::warn!(project = %id, "Live updates unavailable: {}", err);
                None
            }
        };

        if self.preview_on_open {
            self.preview.set_visible(true);
        }

        self.emit(SessionEvent::ProjectOpened(id));
        self.emit(SessionEvent::FileSelected(first));
        self.regenerate_preview();
    }

    /// Deletes a stored project, leaving it first if it is open.
    pub async fn delete_project(&mut self, id: &ProjectId) -> CoreResult<()> {
        self.store.delete(id).await?;
        tracing::info!(project = %id, "Deleted project");

        if self.state.project.as_ref().is_some_and(|p| &p.id == id) {
            self.back_to_project_list();
        }
        Ok(())
    }

    /// Parses an exported project and stores it under a fresh id.
    ///
    /// Nothing is written when the text does not parse.
    pub async fn import_project(&self, text: &str) -> CoreResult<ProjectMetadata> {
        let project = self.store.import_from_text(text)?.into_fresh_copy();
        self.store.save(&project).await?;
        tracing::info!(project = %project.id, "Imported project {:?}", project.name);
        Ok(project.metadata())
    }

    /// Exports the open project, including unsaved edits.
    pub fn export_current(&self) -> CoreResult<String> {
        let project = self.state.project.as_ref().ok_or(CoreError::NoActiveProject)?;
        self.store.export_to_text(project)
    }

    /// Leaves the open project without saving.
    ///
    /// Returns true if unsaved edits were thrown away.
    pub fn back_to_project_list(&mut self) -> bool {
        let discarded = self.state.dirty;
        if discarded {
            tracing::warn!("Leaving project with unsaved changes");
        }
        self.close_current();
        discarded
    }

    // ==================== Files ====================

    /// Makes `id` the active file.
    pub fn select_file(&mut self, id: &FileId) -> CoreResult<()> {
        let project = self.state.project.as_ref().ok_or(CoreError::NoActiveProject)?;
        if project.file(id).is_none() {
            return Err(CoreError::FileNotFound(id.clone()));
        }
        self.state.active_file = Some(id.clone());
        self.emit(SessionEvent::FileSelected(Some(id.clone())));
        Ok(())
    }

    /// Creates a file from the template for `tag`, saves the project and
    /// activates the new file.
    ///
    /// A name without an extension gets `.<tag>` appended. A name with
    /// its own extension takes its type from that extension.
    pub async fn create_file(&mut self, name: &str, tag: &str) -> CoreResult<FileId> {
        let project = self.state.project.as_ref().ok_or(CoreError::NoActiveProject)?;

        templates::validate_file_name(name)?;
        let full_name = templates::resolve_file_name(name, tag);
        let tag = if full_name == name {
            templates::type_tag(&full_name)
        } else {
            tag.to_string()
        };

        let file = templates::new_file(&full_name, &tag);
        let id = file.id.clone();

        let mut candidate = project.clone();
        candidate.add_file(file)?;
        self.persist(candidate).await?;

        tracing::debug!(file = %id, "Created file {:?}", full_name);
        self.state.active_file = Some(id.clone());
        self.emit(SessionEvent::FileCreated(id.clone()));
        self.emit(SessionEvent::FileSelected(Some(id.clone())));
        self.regenerate_preview();
        Ok(id)
    }

    /// Removes a file and saves the project.
    ///
    /// If it was the active file, the first remaining file becomes active.
    pub async fn delete_file(&mut self, id: &FileId) -> CoreResult<()> {
        let project = self.state.project.as_ref().ok_or(CoreError::NoActiveProject)?;

        let mut candidate = project.clone();
        if candidate.remove_file(id).is_none() {
            return Err(CoreError::FileNotFound(id.clone()));
        }
        let fallback = candidate.files.first().map(|f| f.id.clone());
        self.persist(candidate).await?;

        tracing::debug!(file = %id, "Deleted file");
        self.emit(SessionEvent::FileDeleted(id.clone()));
        if self.state.active_file.as_ref() == Some(id) {
            self.state.active_file = fallback.clone();
            self.emit(SessionEvent::FileSelected(fallback));
        }
        self.regenerate_preview();
        Ok(())
    }

    /// Replaces the active file's content. Not persisted until [`save`].
    ///
    /// [`save`]: Session::save
    pub fn edit_content(&mut self, text: &str) -> CoreResult<()> {
        let active = self.state.active_file.clone().ok_or(CoreError::NoActiveFile)?;
        let project = self.state.project.as_mut().ok_or(CoreError::NoActiveProject)?;
        let file = project
            .file_mut(&active)
            .ok_or_else(|| CoreError::FileNotFound(active.clone()))?;

        file.content = text.to_string();
        file.last_modified = Utc::now();
        project.touch();
        self.state.dirty = true;

        self.emit(SessionEvent::ContentChanged(active));
        self.regenerate_preview();
        Ok(())
    }

    // ==================== Persistence ====================

    /// Writes the open project to the store.
    ///
    /// On failure the in-memory project is left exactly as it was and
    /// the error is returned for the user to retry.
    pub async fn save(&mut self) -> CoreResult<()> {
        let project = self.state.project.as_ref().ok_or(CoreError::NoActiveProject)?;
        let id = project.id.clone();

        let mut candidate = project.clone();
        candidate.touch();

        self.emit(SessionEvent::SaveStarted(id.clone()));
        match self.persist(candidate).await {
            Ok(()) => {
                tracing::info!(project = %id, "Project saved");
                self.emit(SessionEvent::Saved(id));
                Ok(())
            }
            Err(err) => {
                tracing::warn!(project = %id, "Save failed: {}", err);
                self.emit(SessionEvent::SaveFailed(id));
                Err(err)
            }
        }
    }

    /// Saves `candidate` and, only if that succeeds, makes it the open
    /// project.
    async fn persist(&mut self, candidate: Project) -> CoreResult<()> {
        self.store.save(&candidate).await?;
        self.last_synced = Some(candidate.last_modified);
        self.state.project = Some(candidate);
        self.state.dirty = false;
        Ok(())
    }

    // ==================== Live Updates ====================

    /// Applies any pending change notices for the open project.
    ///
    /// Returns true if the project was reloaded.
    pub async fn process_notifications(&mut self) -> CoreResult<bool> {
        let pending = self.subscription.as_mut().map_or(0, Subscription::drain);
        if pending == 0 {
            return Ok(false);
        }
        tracing::debug!("{} change notice(s) pending", pending);
        self.reload().await
    }

    /// Waits until the open project's change feed fires.
    ///
    /// Returns false when there is no feed or it has shut down.
    pub async fn wait_for_change(&mut self) -> bool {
        match self.subscription.as_mut() {
            Some(sub) => {
                let fired = sub.changed().await.is_some();
                sub.drain();
                fired
            }
            None => false,
        }
    }

    /// Re-fetches the open project and replaces the in-memory copy.
    ///
    /// The active file stays active if it still exists. A fetch error
    /// leaves the session untouched, and so does a stored copy that is
    /// the one this session last wrote: unsaved edits are only ever
    /// replaced by a write from somewhere else.
    pub async fn reload(&mut self) -> CoreResult<bool> {
        let id = match &self.state.project {
            Some(project) => project.id.clone(),
            None => return Ok(false),
        };

        let Some(fresh) = self.store.get(&id).await? else {
            tracing::warn!(project = %id, "Open project no longer exists in the store");
            return Ok(false);
        };

        if self
            .last_synced
            .is_some_and(|synced| same_write(synced, fresh.last_modified))
        {
            tracing::debug!(project = %id, "Store copy is our own last write");
            return Ok(false);
        }

        let active = self
            .state
            .active_file
            .as_ref()
            .filter(|a| fresh.file(a).is_some())
            .cloned()
            .or_else(|| fresh.files.first().map(|f| f.id.clone()));
        let active_changed = active != self.state.active_file;

        self.last_synced = Some(fresh.last_modified);
        self.state.project = Some(fresh);
        self.state.active_file = active.clone();
        self.state.dirty = false;

        self.emit(SessionEvent::ProjectRefreshed(id));
        if active_changed {
            self.emit(SessionEvent::FileSelected(active));
        }
        self.regenerate_preview();
        Ok(true)
    }

    // ==================== Preview ====================

    /// Shows or hides the preview pane. Returns the new visibility.
    pub fn toggle_preview(&mut self) -> bool {
        let visible = !self.preview.is_visible();
        self.preview.set_visible(visible);
        self.emit(SessionEvent::PreviewToggled(visible));
        self.regenerate_preview();
        visible
    }

    /// Re-composes the preview and reloads `surface`.
    pub fn refresh_preview(&mut self, surface: &mut dyn RenderSurface) {
        self.preview.refresh(self.state.files(), surface);
        self.emit(SessionEvent::PreviewUpdated);
    }

    /// Opens the composed preview on a separate surface.
    pub fn open_preview_externally(&self, surface: &mut dyn RenderSurface) -> bool {
        self.preview.open_externally(surface)
    }

    fn regenerate_preview(&mut self) {
        if self.preview.is_visible() && self.preview.regenerate(self.state.files()) {
            self.emit(SessionEvent::PreviewUpdated);
        }
    }

    // ==================== Appearance ====================

    /// Switches between light and dark themes.
    pub fn toggle_theme(&mut self) -> Theme {
        self.state.theme = self.state.theme.toggled();
        self.emit(SessionEvent::ThemeChanged(self.state.theme));
        self.state.theme
    }

    // ==================== Internals ====================

    fn close_current(&mut self) {
        if let Some(sub) = self.subscription.take() {
            sub.cancel();
        }
        if let Some(project) = self.state.project.take() {
            self.emit(SessionEvent::ProjectClosed(project.id));
        }
        self.last_synced = None;
        self.state.active_file = None;
        self.state.dirty = false;
        self.preview.reset();
    }

    fn emit(&self, event: SessionEvent) {
        self.events.emit(event);
    }
}

/// Compares write stamps at microsecond precision, which is all the
/// hosted table keeps.
fn same_write(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    a.trunc_subsecs(6) == b.trunc_subsecs(6)
}
