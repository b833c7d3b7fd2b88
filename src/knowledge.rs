//! File-backed knowledge base used as business context for replies.
//!
//! Documents live as `.txt` / `.md` files in a single directory. The
//! identifier of a document is its file stem. The directory is scanned once
//! at startup; afterwards only `save_document` changes the mapping.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::KnowledgeError;

/// Extensions recognized as knowledge documents.
pub const DOCUMENT_EXTENSIONS: &[&str] = &["txt", "md"];

static DOCUMENT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_\-]*$").expect("valid regex"));

/// In-memory view of the knowledge directory.
pub struct KnowledgeBase {
    dir: PathBuf,
    documents: RwLock<BTreeMap<String, String>>,
    /// Serializes writers so a file write and its index update are one step.
    write_lock: Mutex<()>,
}

impl KnowledgeBase {
    /// An empty knowledge base that will save into `dir`.
    pub fn empty(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            documents: RwLock::new(BTreeMap::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Scan `dir` for documents.
    ///
    /// Never fails: a missing directory or unreadable file is logged and
    /// skipped, leaving whatever did load.
    pub async fn load(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let documents = scan_dir(&dir).await;
        info!(
            dir = %dir.display(),
            documents = documents.len(),
            "Knowledge base loaded"
        );
        Self {
            dir,
            documents: RwLock::new(documents),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist a document, then index it.
    ///
    /// Readers see either the old mapping or the new one, never a document
    /// whose file is still being written.
    pub async fn save_document(&self, name: &str, text: &str) -> Result<(), KnowledgeError> {
        if !DOCUMENT_NAME.is_match(name) {
            return Err(KnowledgeError::InvalidName(name.to_string()));
        }

        let _writer = self.write_lock.lock().await;

        fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(format!("{name}.txt"));
        let tmp = self.dir.join(format!(".{name}.txt.tmp"));
        fs::write(&tmp, text).await?;
        fs::rename(&tmp, &path).await?;

        self.documents
            .write()
            .await
            .insert(name.to_string(), text.to_string());

        info!(document = %name, bytes = text.len(), "Saved knowledge document");
        Ok(())
    }

    pub async fn get(&self, name: &str) -> Option<String> {
        self.documents.read().await.get(name).cloned()
    }

    /// Document texts in identifier order.
    pub async fn documents(&self) -> Vec<String> {
        self.documents.read().await.values().cloned().collect()
    }

    pub async fn names(&self) -> Vec<String> {
        self.documents.read().await.keys().cloned().collect()
    }

    /// Copy of the full mapping.
    pub async fn snapshot(&self) -> BTreeMap<String, String> {
        self.documents.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

fn is_document(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| DOCUMENT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Read every document directly inside `dir`, in path order.
async fn scan_dir(dir: &Path) -> BTreeMap<String, String> {
    let mut documents = BTreeMap::new();

    let mut read_dir = match fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Knowledge directory not readable");
            return documents;
        }
    };

    let mut paths = Vec::new();
    loop {
        match read_dir.next_entry().await {
            Ok(Some(entry)) => paths.push(entry.path()),
            Ok(None) => break,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Failed to list knowledge directory");
                break;
            }
        }
    }
    paths.sort();

    for path in paths {
        if !is_document(&path) {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        match fs::read_to_string(&path).await {
            Ok(text) => {
                debug!(document = %name, "Loaded knowledge document");
                documents.insert(name.to_string(), text);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable knowledge document");
            }
        }
    }

    documents
}
