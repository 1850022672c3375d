mod redact;
mod rotation;

pub use redact::redact_secrets;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use qms_types::AuditEntry;
use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// One append-only JSONL file per agent key. Every public event is
/// appended as a single line, secret-shaped content is redacted before
/// the line is written, and the file is rotated by byte size (not time)
/// with an incrementing numeric suffix (`.1`, `.2`, ...) so the audit
/// trail is stable regardless of how long a project runs.
pub struct AuditLog {
    root: PathBuf,
    max_bytes: u64,
    writers: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AuditLog {
    pub fn new(root: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            root: root.into(),
            max_bytes,
            writers: Mutex::new(HashMap::new()),
        }
    }

    fn path_for(&self, agent_key: &str) -> PathBuf {
        self.root.join(format!("{agent_key}.jsonl"))
    }

    async fn lock_for(&self, agent_key: &str) -> Arc<Mutex<()>> {
        let mut writers = self.writers.lock().await;
        writers
            .entry(agent_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Appends one audit entry, applying secret redaction to the `detail`
    /// field and rotating the file first if it would exceed `max_bytes`.
    /// Writes for the same agent key are serialized by a per-file mutex;
    /// writes for different agent keys never block each other.
    pub async fn append(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        let lock = self.lock_for(&entry.agent_key).await;
        let _guard = lock.lock().await;

        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.path_for(&entry.agent_key);

        rotation::rotate_if_needed(&path, self.max_bytes).await?;

        let mut redacted = entry.clone();
        redact::redact_value(&mut redacted.detail);

        let mut line = serde_json::to_string(&redacted)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Reads every entry for an agent key in append order, across all
    /// rotated files (oldest rotation first), for audit review.
    pub async fn read_all(&self, agent_key: &str) -> Result<Vec<AuditEntry>, AuditError> {
        let base = self.path_for(agent_key);
        let mut files = rotation::rotated_files_oldest_first(&base).await?;
        files.push(base);

        let mut out = Vec::new();
        for path in files {
            let Ok(contents) = tokio::fs::read_to_string(&path).await else {
                continue;
            };
            for line in contents.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                out.push(serde_json::from_str(line)?);
            }
        }
        Ok(out)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use tempfile::tempdir;

    fn entry(agent_key: &str, detail: serde_json::Value) -> AuditEntry {
        AuditEntry {
            entry_id: uuid::Uuid::new_v4().to_string(),
            project_id: "proj-1".to_string(),
            agent_key: agent_key.to_string(),
            event: "tool_called".to_string(),
            recorded_at: Utc::now(),
            detail,
        }
    }

    #[tokio::test]
    async fn entries_are_appended_in_order() {
        let dir = tempdir().unwrap();
        let log = AuditLog::new(dir.path(), 10 * 1024 * 1024);
        log.append(&entry("pubmed_agent", json!({"n": 1}))).await.unwrap();
        log.append(&entry("pubmed_agent", json!({"n": 2}))).await.unwrap();
        log.append(&entry("pubmed_agent", json!({"n": 3}))).await.unwrap();

        let all = log.read_all("pubmed_agent").await.unwrap();
        let ns: Vec<_> = all.iter().map(|e| e.detail["n"].as_i64().unwrap()).collect();
        assert_eq!(ns, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn different_agent_keys_write_separate_files() {
        let dir = tempdir().unwrap();
        let log = AuditLog::new(dir.path(), 10 * 1024 * 1024);
        log.append(&entry("picot_agent", json!({}))).await.unwrap();
        log.append(&entry("citation_agent", json!({}))).await.unwrap();

        assert_eq!(log.read_all("picot_agent").await.unwrap().len(), 1);
        assert_eq!(log.read_all("citation_agent").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn secret_shaped_detail_fields_are_redacted_on_write() {
        let dir = tempdir().unwrap();
        let log = AuditLog::new(dir.path(), 10 * 1024 * 1024);
        log.append(&entry(
            "arxiv_agent",
            json!({ "api_key": "sk-abcdef1234567890" }),
        ))
        .await
        .unwrap();

        let raw = tokio::fs::read_to_string(dir.path().join("arxiv_agent.jsonl"))
            .await
            .unwrap();
        assert!(!raw.contains("sk-abcdef1234567890"));
    }

    #[tokio::test]
    async fn rotation_preserves_append_order_across_files() {
        let dir = tempdir().unwrap();
        // tiny max_bytes forces rotation after the first entry
        let log = AuditLog::new(dir.path(), 5);
        for i in 0..5 {
            log.append(&entry("nursing_agent", json!({"n": i}))).await.unwrap();
        }
        let all = log.read_all("nursing_agent").await.unwrap();
        let ns: Vec<_> = all.iter().map(|e| e.detail["n"].as_i64().unwrap()).collect();
        assert_eq!(ns, vec![0, 1, 2, 3, 4]);
    }
}
