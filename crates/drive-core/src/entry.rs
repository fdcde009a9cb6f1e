use serde::Serialize;

pub use drive_platform::EntryKind;
use drive_platform::StoreEntry;

use crate::file_type::{resolve_file_type, FileCategory};
use crate::path;

/// One visible node of the virtual tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub path: String,
    pub name: String,
    pub kind: EntryKind,
    /// Backend version token; present for files only
    pub content_id: Option<String>,
    /// Bytes; present for files only
    pub size: Option<u64>,
    /// Unix seconds, best effort
    pub modified: Option<u64>,
}

impl Entry {
    pub fn file(path: &str, content_id: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.to_string(),
            name: path::name_of(path).to_string(),
            kind: EntryKind::File,
            content_id: Some(content_id.into()),
            size: Some(size),
            modified: None,
        }
    }

    pub fn directory(path: &str) -> Self {
        Self {
            path: path.to_string(),
            name: path::name_of(path).to_string(),
            kind: EntryKind::Directory,
            content_id: None,
            size: None,
            modified: None,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    pub fn is_file(&self) -> bool {
        !self.kind.is_dir()
    }

    /// Category for icons and previews; `None` for directories.
    pub fn category(&self) -> Option<FileCategory> {
        self.is_file().then(|| resolve_file_type(&self.name))
    }
}

impl From<StoreEntry> for Entry {
    fn from(raw: StoreEntry) -> Self {
        let is_dir = raw.kind.is_dir();
        Self {
            path: raw.path,
            name: raw.name,
            kind: raw.kind,
            content_id: if is_dir { None } else { raw.content_id },
            size: (!is_dir).then_some(raw.size),
            modified: raw.modified,
        }
    }
}
