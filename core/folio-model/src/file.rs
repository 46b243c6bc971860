use serde::{Deserialize, Serialize};

/// A file as stored on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedFile {
    pub path: String,
    #[serde(with = "crate::bytes")]
    pub content: Vec<u8>,
    /// The host's version marker for this path; opaque to Folio.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

impl PersistedFile {
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            content_hash: None,
        }
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.content_hash = Some(hash.into());
        self
    }
}

/// A binary asset referenced by path from entry fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFile {
    pub path: String,
    #[serde(with = "crate::bytes", default)]
    pub content: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

impl MediaFile {
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            content_hash: None,
        }
    }

    /// File name without its folder.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// A single change inside a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FileChange {
    Write {
        path: String,
        #[serde(with = "crate::bytes")]
        content: Vec<u8>,
        /// Hash observed before the write; `None` when the file is new.
        #[serde(default)]
        previous_hash: Option<String>,
    },
    Delete {
        path: String,
        #[serde(default)]
        previous_hash: Option<String>,
    },
}

impl FileChange {
    pub fn path(&self) -> &str {
        match self {
            Self::Write { path, .. } | Self::Delete { path, .. } => path,
        }
    }

    pub fn previous_hash(&self) -> Option<&str> {
        match self {
            Self::Write { previous_hash, .. } | Self::Delete { previous_hash, .. } => {
                previous_hash.as_deref()
            }
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Self::Delete { .. })
    }
}

/// An ordered set of file changes applied as one logical commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRequest {
    pub branch: String,
    pub message: String,
    pub changes: Vec<FileChange>,
    /// Branch head the changes were prepared against. Hosts that move refs
    /// build on this commit and reject the update if the branch moved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

impl CommitRequest {
    pub fn new(branch: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            message: message.into(),
            changes: Vec::new(),
            parent: None,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn write(
        mut self,
        path: impl Into<String>,
        content: impl Into<Vec<u8>>,
        previous_hash: Option<String>,
    ) -> Self {
        self.changes.push(FileChange::Write {
            path: path.into(),
            content: content.into(),
            previous_hash,
        });
        self
    }

    pub fn delete(mut self, path: impl Into<String>, previous_hash: Option<String>) -> Self {
        self.changes.push(FileChange::Delete {
            path: path.into(),
            previous_hash,
        });
        self
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.changes.iter().map(FileChange::path)
    }
}
