//! Portable project records and the export/import text format.
//!
//! ## Learning: Schema Types at the Boundary
//!
//! Imported text is parsed into `ProjectRecord`, a type that mirrors the
//! wire format exactly (`deny_unknown_fields`, camelCase names). Only a
//! record that passes that parse and the follow-up checks is turned into
//! a domain [`Project`]. Domain types never see untrusted JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{File, FileId, Project, ProjectId};
use crate::templates;
use crate::{CoreError, CoreResult};

/// Wire shape of a file inside an exported or stored project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FileRecord {
    pub id: FileId,
    pub name: String,
    pub content: String,
    #[serde(rename = "type")]
    pub file_type: String,
    /// Older exports omit this; see [`ProjectRecord::into_project`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

/// Wire shape of a full project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProjectRecord {
    pub id: ProjectId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub files: Vec<FileRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_file: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl FileRecord {
    /// Converts a domain file into its wire shape.
    pub fn from_file(file: &File) -> Self {
        Self {
            id: file.id.clone(),
            name: file.name.clone(),
            content: file.content.clone(),
            file_type: file.file_type.clone(),
            last_modified: Some(file.last_modified),
        }
    }

    /// Converts back into a domain file, using `fallback` as the
    /// timestamp when the record has none.
    pub fn into_file(self, fallback: DateTime<Utc>) -> File {
        File {
            id: self.id,
            name: self.name,
            content: self.content,
            file_type: self.file_type,
            last_modified: self.last_modified.unwrap_or(fallback),
        }
    }
}

impl ProjectRecord {
    /// Converts a domain project into its wire shape.
    pub fn from_project(project: &Project) -> Self {
        Self {
            id: project.id.clone(),
            name: project.name.clone(),
            description: project.description.clone(),
            files: project.files.iter().map(FileRecord::from_file).collect(),
            main_file: project.main_file.clone(),
            created_at: project.created_at,
            last_modified: project.last_modified,
        }
    }

    /// Validates the record and builds a domain project.
    ///
    /// File records without a timestamp inherit the project's
    /// `lastModified`.
    pub fn into_project(self) -> CoreResult<Project> {
        if self.name.trim().is_empty() {
            return Err(CoreError::Format("project name is empty".into()));
        }

        let mut project = Project {
            id: self.id,
            name: self.name,
            description: self.description,
            files: Vec::with_capacity(self.files.len()),
            created_at: self.created_at,
            last_modified: self.last_modified,
            main_file: self.main_file,
        };

        for record in self.files {
            templates::validate_file_name(&record.name)
                .map_err(|e| CoreError::Format(format!("file {:?}: {e}", record.name)))?;
            if project.has_file_named(&record.name) {
                return Err(CoreError::Format(format!(
                    "duplicate file name {:?}",
                    record.name
                )));
            }
            if project.file(&record.id).is_some() {
                return Err(CoreError::Format(format!("duplicate file id {}", record.id)));
            }
            project.files.push(record.into_file(self.last_modified));
        }

        Ok(project)
    }
}

/// Serializes a project to pretty-printed JSON.
pub fn export_project(project: &Project) -> CoreResult<String> {
    serde_json::to_string_pretty(&ProjectRecord::from_project(project)).map_err(CoreError::format)
}

/// Parses exported JSON back into a project.
///
/// The returned project keeps the exported id; give it a fresh one with
/// [`Project::into_fresh_copy`] before saving it next to the original.
pub fn import_project(text: &str) -> CoreResult<Project> {
    let record: ProjectRecord = serde_json::from_str(text).map_err(CoreError::format)?;
    record.into_project()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn sample() -> Project {
        let mut project = Project::new("Portfolio", Some("my site")).unwrap();
        project
            .add_file(templates::new_file("index.html", "html"))
            .unwrap();
        project
            .add_file(templates::new_file("style.css", "css"))
            .unwrap();
        project.main_file = Some(project.files[0].id.to_string());
        project
    }

    #[test]
    fn test_round_trip_preserves_project() {
        let project = sample();
        let text = export_project(&project).unwrap();
        let restored = import_project(&text).unwrap();
        assert_eq!(restored, project);
    }

    #[test]
    fn test_export_uses_record_field_names() {
        let text = export_project(&sample()).unwrap();
        assert!(text.contains("\"createdAt\""));
        assert!(text.contains("\"lastModified\""));
        assert!(text.contains("\"mainFile\""));
        assert!(text.contains("\"type\": \"html\""));
        assert!(text.contains('\n'));
    }

    #[test]
    fn test_timestamps_compared_by_instant() {
        let text = r#"{
            "id": "p1",
            "name": "Legacy",
            "files": [],
            "createdAt": "2024-03-01T10:00:00.000+02:00",
            "lastModified": "2024-03-01T08:00:00.000Z"
        }"#;
        let project = import_project(text).unwrap();
        assert_eq!(project.created_at, project.last_modified);
    }

    #[test]
    fn test_missing_file_timestamp_is_backfilled() {
        let text = r#"{
            "id": "p1",
            "name": "Legacy",
            "files": [
                {"id": "1712345678901", "name": "index.html", "content": "<p>hi</p>", "type": "html"}
            ],
            "createdAt": "2024-03-01T08:00:00Z",
            "lastModified": "2024-03-02T08:00:00Z"
        }"#;
        let project = import_project(text).unwrap();
        assert_eq!(project.files[0].id.as_str(), "1712345678901");
        assert_eq!(project.files[0].last_modified, project.last_modified);
    }

    #[test]
    fn test_malformed_input_rejected() {
        assert!(matches!(import_project("{not json"), Err(CoreError::Format(_))));
        assert!(matches!(import_project("[]"), Err(CoreError::Format(_))));
    }

    #[test]
    fn test_missing_and_unknown_fields_rejected() {
        let missing = r#"{"id": "p1", "name": "x", "createdAt": "2024-03-01T08:00:00Z", "lastModified": "2024-03-01T08:00:00Z"}"#;
        assert!(matches!(import_project(missing), Err(CoreError::Format(_))));

        let unknown = r#"{"id": "p1", "name": "x", "files": [], "owner": "me",
            "createdAt": "2024-03-01T08:00:00Z", "lastModified": "2024-03-01T08:00:00Z"}"#;
        assert!(matches!(import_project(unknown), Err(CoreError::Format(_))));
    }

    #[test]
    fn test_bad_timestamp_rejected() {
        let text = r#"{"id": "p1", "name": "x", "files": [],
            "createdAt": "yesterday", "lastModified": "2024-03-01T08:00:00Z"}"#;
        assert!(matches!(import_project(text), Err(CoreError::Format(_))));
    }

    #[test]
    fn test_invalid_file_names_rejected() {
        let text = r#"{"id": "p1", "name": "x", "createdAt": "2024-03-01T08:00:00Z",
            "lastModified": "2024-03-01T08:00:00Z", "files": [
              {"id": "a", "name": "A.css", "content": "", "type": "css"},
              {"id": "b", "name": "a.CSS", "content": "", "type": "css"}
            ]}"#;
        assert!(matches!(import_project(text), Err(CoreError::Format(_))));
    }

    /// Any instant between 1970 and the end of year 9999, to the nanosecond.
    fn instant() -> impl Strategy<Value = DateTime<Utc>> {
        (0i64..=253_402_300_799, 0u32..1_000_000_000).prop_map(|(secs, nanos)| {
            Utc.timestamp_opt(secs, nanos).single().unwrap()
        })
    }

    fn arb_file(index: usize) -> impl Strategy<Value = File> {
        (
            "[a-z][a-z0-9_]{0,11}",
            prop::sample::select(vec!["html", "css", "js", "md", "txt"]),
            any::<String>(),
            instant(),
        )
            .prop_map(move |(stem, tag, content, last_modified)| File {
                id: FileId::new(),
                // Index prefix keeps names distinct
                name: format!("{index}-{stem}.{tag}"),
                content,
                file_type: tag.to_string(),
                last_modified,
            })
    }

    fn arb_project() -> impl Strategy<Value = Project> {
        let files = (0usize..6).prop_flat_map(|n| (0..n).map(arb_file).collect::<Vec<_>>());
        (
            "[A-Za-z][A-Za-z0-9 _'\"-]{0,30}",
            proptest::option::of(any::<String>()),
            files,
            any::<bool>(),
            instant(),
            instant(),
        )
            .prop_map(|(name, description, files, has_main, created_at, last_modified)| {
                let main_file = if has_main {
                    Some(files.first().map_or("gone".to_string(), |f| f.id.to_string()))
                } else {
                    None
                };
                Project {
                    id: ProjectId::new(),
                    name,
                    description,
                    files,
                    created_at,
                    last_modified,
                    main_file,
                }
            })
    }

    proptest! {
        #[test]
        fn prop_export_import_round_trip(project in arb_project()) {
            let text = export_project(&project).unwrap();
            prop_assert_eq!(import_project(&text).unwrap(), project);
        }
    }
}
