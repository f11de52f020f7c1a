//! Experience log
//!
//! Bounded record of notable outcomes (goals completed, plans that went
//! sideways, operator notes). Recent entries are folded into plan-generation
//! prompts so the agent stops repeating known mistakes. Backed by a JSON
//! file flushed on the autosave cadence; losing it costs hints, not state.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experience {
    pub at: DateTime<Utc>,
    pub kind: String,
    pub text: String,
}

pub struct ExperienceLog {
    path: Option<PathBuf>,
    entries: Mutex<Vec<Experience>>,
    limit: usize,
}

impl ExperienceLog {
    /// Log without a backing file; flush becomes a no-op
    pub fn in_memory(limit: usize) -> Self {
        Self {
            path: None,
            entries: Mutex::new(Vec::new()),
            limit: limit.max(1),
        }
    }

    /// Open a file-backed log, loading whatever is already there.
    /// Unreadable content is logged and replaced on the next flush.
    pub async fn open(path: PathBuf, limit: usize) -> Self {
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str::<Vec<Experience>>(&content) {
                Ok(mut entries) => {
                    let overflow = entries.len().saturating_sub(limit.max(1));
                    entries.drain(..overflow);
                    entries
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "experience log corrupted, starting empty");
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "experience log unreadable, starting empty");
                Vec::new()
            }
        };
        if !entries.is_empty() {
            info!(count = entries.len(), "loaded experiences");
        }

        Self {
            path: Some(path),
            entries: Mutex::new(entries),
            limit: limit.max(1),
        }
    }

    pub fn record(&self, kind: &str, text: impl Into<String>) {
        let mut entries = self.entries.lock();
        entries.push(Experience {
            at: Utc::now(),
            kind: kind.to_string(),
            text: text.into(),
        });
        if entries.len() > self.limit {
            let overflow = entries.len() - self.limit;
            entries.drain(..overflow);
        }
    }

    /// Latest entries as prompt-ready lines, oldest first
    pub fn recent(&self, n: usize) -> Vec<String> {
        let entries = self.entries.lock();
        let start = entries.len().saturating_sub(n);
        entries[start..]
            .iter()
            .map(|e| format!("[{}] {}", e.kind, e.text))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Write the log to its backing file; failures are logged and absorbed
    pub async fn flush(&self) {
        let Some(path) = &self.path else { return };
        let json = {
            let entries = self.entries.lock();
            match serde_json::to_string_pretty(&*entries) {
                Ok(json) => json,
                Err(e) => {
                    warn!(error = %e, "experience log serialization failed");
                    return;
                }
            }
        };
        let temp_path = path.with_extension("tmp");
        let result = async {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&temp_path, json).await?;
            tokio::fs::rename(&temp_path, path).await
        }
        .await;
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "experience log flush failed");
        }
    }
}
