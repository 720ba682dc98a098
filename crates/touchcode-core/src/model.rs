//! Project and file data model.
//!
//! ## Learning: Newtypes for Identifiers
//!
//! `ProjectId` and `FileId` wrap a `String` rather than a `Uuid`.
//! New objects get a UUID v4, but records imported from older exports
//! may carry other identifier shapes, and those must survive verbatim.
//! The wrapper still stops a file id from being passed where a project
//! id is expected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::templates;
use crate::{CoreResult, ValidationError};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new unique identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Returns the identifier text.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Unique identifier for a project.
    ProjectId
);

string_id!(
    /// Unique identifier for a file within a project.
    FileId
);

/// A single source file owned by a project.
#[derive(Debug, Clone, PartialEq)]
pub struct File {
    pub id: FileId,
    pub name: String,
    pub content: String,
    /// Extension-derived type tag, see [`templates::type_tag`].
    pub file_type: String,
    pub last_modified: DateTime<Utc>,
}

impl File {
    /// Returns the lower-cased extension of the file name.
    pub fn extension(&self) -> String {
        templates::extension(&self.name)
    }
}

/// A named collection of files.
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub description: Option<String>,
    pub files: Vec<File>,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub main_file: Option<String>,
}

impl Project {
    /// Creates an empty project.
    ///
    /// Name and description are trimmed; a blank description is dropped.
    pub fn new(name: &str, description: Option<&str>) -> CoreResult<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyProjectName.into());
        }

        let now = Utc::now();
        Ok(Self {
            id: ProjectId::new(),
            name: name.to_string(),
            description: description
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
            files: Vec::new(),
            created_at: now,
            last_modified: now,
            main_file: None,
        })
    }

    /// Returns the lightweight listing view of this project.
    pub fn metadata(&self) -> ProjectMetadata {
        ProjectMetadata {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            created_at: self.created_at,
            last_modified: self.last_modified,
            file_count: self.files.len(),
        }
    }

    /// Returns a file by ID.
    pub fn file(&self, id: &FileId) -> Option<&File> {
        self.files.iter().find(|f| &f.id == id)
    }

    /// Returns a mutable file by ID.
    pub fn file_mut(&mut self, id: &FileId) -> Option<&mut File> {
        self.files.iter_mut().find(|f| &f.id == id)
    }

    /// Returns true if a file with this name exists, ignoring case.
    pub fn has_file_named(&self, name: &str) -> bool {
        let wanted = name.to_lowercase();
        self.files.iter().any(|f| f.name.to_lowercase() == wanted)
    }

    /// Appends a file after validating its name.
    ///
    /// Nothing is modified when validation fails.
    pub fn add_file(&mut self, file: File) -> CoreResult<()> {
        templates::validate_file_name(&file.name)?;
        if self.has_file_named(&file.name) {
            return Err(ValidationError::DuplicateFileName(file.name).into());
        }
        self.files.push(file);
        self.touch();
        Ok(())
    }

    /// Removes a file, returning it if it was present.
    pub fn remove_file(&mut self, id: &FileId) -> Option<File> {
        let index = self.files.iter().position(|f| &f.id == id)?;
        let removed = self.files.remove(index);
        self.touch();
        Some(removed)
    }

    /// Returns the designated main file, if it still exists.
    pub fn main_file(&self) -> Option<&File> {
        let main = self.main_file.as_deref()?;
        self.files.iter().find(|f| f.id.as_str() == main)
    }

    /// Stamps a new modification time.
    pub fn touch(&mut self) {
        self.last_modified = Utc::now();
    }

    /// Gives an imported project a fresh identity so it can't overwrite
    /// an existing record.
    pub fn into_fresh_copy(mut self) -> Self {
        self.id = ProjectId::new();
        self.touch();
        self
    }
}

/// Listing view of a project, without file bodies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMetadata {
    pub id: ProjectId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub file_count: usize,
}

/// Sorts metadata most-recently-modified first.
pub fn sort_by_recent(metadata: &mut [ProjectMetadata]) {
    metadata.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CoreError;

    fn file(name: &str) -> File {
        templates::new_file(name, &templates::type_tag(name))
    }

    #[test]
    fn test_new_project_trims_fields() {
        let project = Project::new("  Site  ", Some("   ")).unwrap();
        assert_eq!(project.name, "Site");
        assert!(project.description.is_none());
        assert!(project.files.is_empty());
        assert_eq!(project.created_at, project.last_modified);
    }

    #[test]
    fn test_blank_project_name_rejected() {
        let err = Project::new("   ", None).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::EmptyProjectName)
        ));
    }

    #[test]
    fn test_duplicate_name_is_case_insensitive() {
        let mut project = Project::new("Site", None).unwrap();
        project.add_file(file("Index.html")).unwrap();

        let err = project.add_file(file("index.HTML")).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::DuplicateFileName(_))
        ));
        assert_eq!(project.files.len(), 1);
    }

    #[test]
    fn test_remove_file_touches_project() {
        let mut project = Project::new("Site", None).unwrap();
        let f = file("a.css");
        let id = f.id.clone();
        project.add_file(f).unwrap();
        let before = project.last_modified;

        assert!(project.remove_file(&id).is_some());
        assert!(project.remove_file(&id).is_none());
        assert!(project.last_modified >= before);
    }

    #[test]
    fn test_metadata_counts_files() {
        let mut project = Project::new("Site", Some("demo")).unwrap();
        project.add_file(file("a.css")).unwrap();
        project.add_file(file("b.js")).unwrap();

        let meta = project.metadata();
        assert_eq!(meta.file_count, 2);
        assert_eq!(meta.description.as_deref(), Some("demo"));
    }

    #[test]
    fn test_sort_by_recent() {
        let mut older = Project::new("old", None).unwrap().metadata();
        older.last_modified = older.last_modified - chrono::Duration::hours(1);
        let newer = Project::new("new", None).unwrap().metadata();

        let mut list = vec![older, newer];
        sort_by_recent(&mut list);
        assert_eq!(list[0].name, "new");
    }

    #[test]
    fn test_main_file_follows_files() {
        let mut project = Project::new("Site", None).unwrap();
        assert!(project.main_file().is_none());

        let index = file("index.html");
        let id = index.id.clone();
        project.add_file(file("style.css")).unwrap();
        project.add_file(index).unwrap();
        project.main_file = Some(id.to_string());
        assert_eq!(project.main_file().unwrap().name, "index.html");

        // A dangling reference resolves to nothing
        project.remove_file(&id);
        assert!(project.main_file().is_none());
    }

    #[test]
    fn test_fresh_copy_changes_id_only() {
        let project = Project::new("Site", None).unwrap();
        let copy = project.clone().into_fresh_copy();
        assert_ne!(copy.id, project.id);
        assert_eq!(copy.name, project.name);
    }
}
