//! Read-only continuity context for worker prompts.
//!
//! Continuity notes (identity, ongoing work, recent decisions) are maintained
//! outside the dispatcher. The configured path is either a single file or a
//! directory whose well-known files are concatenated in a fixed order.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

/// Well-known continuity file names, read in this order from a directory.
pub mod paths {
    pub const IDENTITY: &str = "IDENTITY.md";
    pub const CONTINUITY: &str = "CONTINUITY.md";
    pub const MEMORY: &str = "MEMORY.md";
    pub const ACTIVE_WORK: &str = "ACTIVE_WORK.md";
}

const CONTEXT_FILES: &[&str] = &[
    paths::IDENTITY,
    paths::CONTINUITY,
    paths::MEMORY,
    paths::ACTIVE_WORK,
];

/// Default snapshot cap (characters).
pub const DEFAULT_MAX_CHARS: usize = 8000;

/// Supplies the continuity snapshot embedded in each worker prompt.
#[async_trait]
pub trait ContextSource: Send + Sync {
    /// Current snapshot. Empty when nothing is available; never an error.
    async fn snapshot(&self) -> String;
}

/// File-backed continuity context.
pub struct Workspace {
    path: PathBuf,
    max_chars: usize,
}

impl Workspace {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_chars: DEFAULT_MAX_CHARS,
        }
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_dir_files(&self) -> String {
        let mut sections = Vec::new();
        for name in CONTEXT_FILES {
            if let Ok(content) = fs::read_to_string(self.path.join(name)).await {
                let content = content.trim();
                if !content.is_empty() {
                    sections.push(format!("## {name}\n\n{content}"));
                }
            }
        }
        sections.join("\n\n")
    }
}

#[async_trait]
impl ContextSource for Workspace {
    async fn snapshot(&self) -> String {
        let raw = match fs::metadata(&self.path).await {
            Ok(meta) if meta.is_dir() => self.read_dir_files().await,
            Ok(_) => fs::read_to_string(&self.path)
                .await
                .map(|s| s.trim().to_string())
                .unwrap_or_default(),
            Err(e) => {
                debug!(path = %self.path.display(), "No continuity context: {e}");
                String::new()
            }
        };
        truncate_chars(&raw, self.max_chars)
    }
}

/// Cut to at most `max` characters on a char boundary, marking the cut.
fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}\n[... truncated]", &s[..idx]),
        None => s.to_string(),
    }
}
