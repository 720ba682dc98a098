//! Row shape of the remote `projects` table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use touchcode_core::transfer::{FileRecord, ProjectRecord};
use touchcode_core::{CoreError, CoreResult, Project, ProjectId, ProjectMetadata};

/// One project as stored by the remote backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRow {
    pub id: ProjectId,
    /// Owner; rows are only visible to this user
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub files: Vec<FileRecord>,
    #[serde(default)]
    pub main_file: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProjectRow {
    /// Builds the row for `project`, owned by `user_id`.
    pub fn from_project(project: &Project, user_id: &str) -> Self {
        let record = ProjectRecord::from_project(project);
        Self {
            id: record.id,
            user_id: user_id.to_string(),
            name: record.name,
            description: record.description,
            files: record.files,
            main_file: record.main_file,
            created_at: record.created_at,
            updated_at: record.last_modified,
        }
    }

    /// Converts the row back into a project.
    pub fn into_project(self) -> CoreResult<Project> {
        let id = self.id.clone();
        ProjectRecord {
            id: self.id,
            name: self.name,
            description: self.description,
            files: self.files,
            main_file: self.main_file,
            created_at: self.created_at,
            last_modified: self.updated_at,
        }
        .into_project()
        .map_err(|e| CoreError::Storage(format!("malformed row {id}: {e}")))
    }

    /// Returns the listing view without converting file bodies.
    pub fn metadata(&self) -> ProjectMetadata {
        ProjectMetadata {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            created_at: self.created_at,
            last_modified: self.updated_at,
            file_count: self.files.len(),
        }
    }
}
