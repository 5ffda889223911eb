//! Fixed-lookup collaborator: the question→answer corpus.
//!
//! The corpus file is a strict JSON object mapping keywords to reply text.
//! A payload matches a key by case-insensitive substring containment; the
//! longest key wins, ties broken lexicographically, so the match order is
//! stable across reloads. The file is re-checked by mtime on every lookup
//! and hot-reloaded when it changes; a broken rewrite keeps the last-good
//! corpus.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::SystemTime;

use tracing::{error, info, warn};

use crate::error::ResponsesError;

#[derive(Debug)]
pub struct FixedResponses {
    path: PathBuf,
    /// Lowercased key → reply, sorted longest key first.
    entries: Vec<(String, String)>,
    last_mtime: Option<SystemTime>,
    missing_warned: bool,
}

impl FixedResponses {
    /// Load the corpus from `path`.
    ///
    /// A missing file is not an error — the corpus starts empty and the
    /// file is picked up once it appears. A present-but-malformed file is
    /// an error: failing fast at startup beats silently answering nothing.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ResponsesError> {
        let mut this = Self {
            path: path.into(),
            entries: Vec::new(),
            last_mtime: None,
            missing_warned: false,
        };
        if this.path.is_file() {
            this.reload()?;
        } else {
            warn!(
                path = %this.path.display(),
                "fixed responses file not found, starting with an empty corpus"
            );
            this.missing_warned = true;
        }
        Ok(this)
    }

    /// Re-read and re-parse the file, replacing the corpus.
    pub fn reload(&mut self) -> Result<(), ResponsesError> {
        let raw = fs::read_to_string(&self.path).map_err(|source| ResponsesError::Read {
            path: self.path.clone(),
            source,
        })?;
        let map: HashMap<String, String> =
            serde_json::from_str(&raw).map_err(|source| ResponsesError::Parse {
                path: self.path.clone(),
                source,
            })?;

        let mut entries: Vec<(String, String)> = map
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
        entries.sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        self.last_mtime = fs::metadata(&self.path).and_then(|m| m.modified()).ok();
        info!(
            path = %self.path.display(),
            entries = entries.len(),
            "fixed responses loaded"
        );
        self.entries = entries;
        Ok(())
    }

    /// First key contained in `text` (case-insensitive), longest key first.
    pub fn lookup(&mut self, text: &str) -> Option<String> {
        self.maybe_reload();
        let haystack = text.to_lowercase();
        self.entries
            .iter()
            .find(|(key, _)| haystack.contains(key.as_str()))
            .map(|(_, reply)| reply.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn maybe_reload(&mut self) {
        if !self.path.is_file() {
            if !self.missing_warned {
                warn!(path = %self.path.display(), "fixed responses file not found");
                self.missing_warned = true;
            }
            return;
        }
        self.missing_warned = false;

        let mtime = fs::metadata(&self.path).and_then(|m| m.modified()).ok();
        if mtime.is_none() || mtime == self.last_mtime {
            return;
        }
        if let Err(e) = self.reload() {
            error!(error = %e, "fixed responses reload failed, keeping previous corpus");
        }
    }
}
