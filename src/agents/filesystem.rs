//! Filesystem agent
//!
//! Handles spoken requests to list, read, create, and delete files inside a
//! configured workspace directory. Paths never escape the workspace.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::agents::Agent;
use crate::session::TurnId;
use crate::{Error, Result};

const KEYWORDS: &[&str] = &[
    "file", "files", "folder", "directory", "document", "read", "list", "save", "delete",
];

/// Filesystem operation parsed from a request
#[derive(Debug, PartialEq, Eq)]
enum FileOp {
    List,
    Read(String),
    Create(String),
    Delete(String),
}

/// Agent for workspace file operations
pub struct FilesystemAgent {
    workspace: PathBuf,
}

impl FilesystemAgent {
    /// Create an agent rooted at `workspace`
    #[must_use]
    pub fn new(workspace: PathBuf) -> Self {
        Self { workspace }
    }

    /// Resolve a spoken file name inside the workspace
    ///
    /// Rejects anything that would resolve outside the workspace root.
    fn resolve(&self, name: &str) -> Result<PathBuf> {
        let candidate = Path::new(name);
        if candidate.is_absolute()
            || candidate
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(Error::Agent(format!("path escapes workspace: {name}")));
        }
        Ok(self.workspace.join(candidate))
    }

    async fn list(&self) -> Result<String> {
        let mut entries = tokio::fs::read_dir(&self.workspace).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();

        if names.is_empty() {
            Ok("Your workspace is empty.".to_string())
        } else {
            Ok(format!(
                "You have {} items: {}",
                names.len(),
                names.join(", ")
            ))
        }
    }

    async fn read(&self, name: &str) -> Result<String> {
        let path = self.resolve(name)?;
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| Error::Agent(format!("cannot read {name}: {e}")))?;

        // Spoken replies stay short
        let preview: String = content.chars().take(600).collect();
        if preview.len() < content.len() {
            Ok(format!("{name} starts with: {preview}"))
        } else {
            Ok(format!("{name} contains: {preview}"))
        }
    }

    async fn create(&self, name: &str) -> Result<String> {
        let path = self.resolve(name)?;
        if tokio::fs::try_exists(&path).await? {
            return Err(Error::Agent(format!("{name} already exists")));
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, b"").await?;
        Ok(format!("Created {name}."))
    }

    async fn delete(&self, name: &str) -> Result<String> {
        let path = self.resolve(name)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| Error::Agent(format!("cannot delete {name}: {e}")))?;
        Ok(format!("Deleted {name}."))
    }
}

/// Parse a spoken request into a filesystem operation
fn parse_op(text: &str) -> Option<FileOp> {
    let lower = text.to_lowercase();

    if lower.contains("list") || lower.contains("what files") || lower.contains("show me the files")
    {
        return Some(FileOp::List);
    }

    let target = extract_target(&lower)?;

    if lower.contains("delete") || lower.contains("remove") {
        return Some(FileOp::Delete(target));
    }
    if lower.contains("create") || lower.contains("make a") || lower.contains("new file") {
        return Some(FileOp::Create(target));
    }
    if lower.contains("read") || lower.contains("open") || lower.contains("what's in") {
        return Some(FileOp::Read(target));
    }

    None
}

/// Pull a file name out of a spoken request
///
/// Prefers a token with an extension; falls back to the word after
/// "file"/"called"/"named".
fn extract_target(lower: &str) -> Option<String> {
    let words: Vec<&str> = lower
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric() && c != '.' && c != '_' && c != '-'))
        .filter(|w| !w.is_empty())
        .collect();

    if let Some(with_ext) = words.iter().find(|w| w.contains('.') && !w.ends_with('.')) {
        return Some((*with_ext).to_string());
    }

    for marker in ["called", "named", "file"] {
        if let Some(i) = words.iter().position(|w| *w == marker)
            && let Some(next) = words.get(i + 1)
            && !KEYWORDS.contains(next)
        {
            return Some((*next).to_string());
        }
    }

    None
}

#[async_trait]
impl Agent for FilesystemAgent {
    fn name(&self) -> &str {
        "filesystem"
    }

    fn can_handle(&self, text: &str) -> f32 {
        let lower = text.to_lowercase();
        let hits = KEYWORDS.iter().filter(|k| lower.contains(*k)).count();
        match hits {
            0 => 0.0,
            1 => 0.5,
            _ => 0.9,
        }
    }

    async fn execute(
        &self,
        turn_id: TurnId,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let op = parse_op(text)
            .ok_or_else(|| Error::Agent(format!("could not understand file request: {text}")))?;

        tracing::info!(turn = %turn_id, ?op, "filesystem operation");

        // Mutating ops are abandoned if the turn was superseded
        if cancel.is_cancelled() {
            return Err(Error::Agent("cancelled".to_string()));
        }

        match op {
            FileOp::List => self.list().await,
            FileOp::Read(name) => self.read(&name).await,
            FileOp::Create(name) => self.create(&name).await,
            FileOp::Delete(name) => self.delete(&name).await,
        }
    }
}
