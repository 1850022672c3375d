use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use qms_store::{ProjectStore, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const CAPACITY: usize = 50;
const REHYDRATE_TURNS: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub text: String,
    #[serde(default)]
    pub metadata: Value,
    pub recorded_at: DateTime<Utc>,
}

/// A pure function of artifact presence, never set directly by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Intake,
    PicotDrafted,
    Searching,
    Validated,
    Synthesized,
    Analyzed,
    Writing,
}

impl Phase {
    fn from_artifacts(artifacts: &HashMap<String, Value>) -> Phase {
        if artifacts.contains_key("writing_draft") {
            Phase::Writing
        } else if artifacts.contains_key("analysis") {
            Phase::Analyzed
        } else if artifacts.contains_key("synthesis") {
            Phase::Synthesized
        } else if artifacts.contains_key("validated_articles") {
            Phase::Validated
        } else if artifacts.contains_key("search_results") {
            Phase::Searching
        } else if artifacts.contains_key("picot") {
            Phase::PicotDrafted
        } else {
            Phase::Intake
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Phase::Intake => "intake",
            Phase::PicotDrafted => "picot_drafted",
            Phase::Searching => "searching",
            Phase::Validated => "validated",
            Phase::Synthesized => "synthesized",
            Phase::Analyzed => "analyzed",
            Phase::Writing => "writing",
        }
    }
}

/// One project's in-memory conversation state. Capacity ~50 messages with
/// overflow persisted to the store; a single executor owns writes per
/// session the way an agent loop owns a single transcript.
pub struct ConversationContext {
    pub project_id: String,
    pub session_id: String,
    messages: VecDeque<Message>,
    artifacts: HashMap<String, Value>,
    pub completed_tasks: Vec<String>,
    store: Arc<ProjectStore>,
}

impl ConversationContext {
    pub fn new(
        project_id: impl Into<String>,
        session_id: impl Into<String>,
        store: Arc<ProjectStore>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            session_id: session_id.into(),
            messages: VecDeque::new(),
            artifacts: HashMap::new(),
            completed_tasks: Vec::new(),
            store,
        }
    }

    pub async fn add_message(&mut self, role: impl Into<String>, text: impl Into<String>, metadata: Value) {
        self.messages.push_back(Message {
            role: role.into(),
            text: text.into(),
            metadata,
            recorded_at: Utc::now(),
        });
        if self.messages.len() > CAPACITY {
            if let Err(err) = self.save_to_db().await {
                tracing::warn!(error = %err, "failed to persist conversation context on overflow");
            }
            while self.messages.len() > CAPACITY {
                self.messages.pop_front();
            }
        }
    }

    pub fn add_artifact(&mut self, key: impl Into<String>, value: Value) {
        self.artifacts.insert(key.into(), value);
    }

    pub fn get_artifact(&self, key: &str) -> Option<&Value> {
        self.artifacts.get(key)
    }

    pub fn has_artifact(&self, key: &str) -> bool {
        self.artifacts.contains_key(key)
    }

    pub fn phase(&self) -> Phase {
        Phase::from_artifacts(&self.artifacts)
    }

    pub fn artifacts(&self) -> &HashMap<String, Value> {
        &self.artifacts
    }

    pub fn get_summary(&self) -> String {
        let mut artifact_keys: Vec<&str> = self.artifacts.keys().map(String::as_str).collect();
        artifact_keys.sort();
        let last_user_preview: String = self
            .messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.text.chars().take(160).collect())
            .unwrap_or_default();
        format!(
            "phase={} completed_tasks={:?} artifact_keys={:?} last_user_preview={:?}",
            self.phase().key(),
            self.completed_tasks,
            artifact_keys,
            last_user_preview,
        )
    }

    pub async fn save_to_db(&self) -> Result<(), StoreError> {
        let snapshot = serde_json::json!({
            "messages": self.messages.iter().cloned().collect::<Vec<_>>(),
            "artifacts": self.artifacts,
            "completed_tasks": self.completed_tasks,
        });
        self.store
            .save_conversation_snapshot(&self.project_id, &self.session_id, &snapshot)
            .await
    }

    /// Rehydrates from the store, keeping the last `REHYDRATE_TURNS` messages
    /// in chronological order.
    pub async fn load_from_db(&mut self) -> Result<(), StoreError> {
        let Some(snapshot) = self
            .store
            .load_conversation_snapshot(&self.project_id, &self.session_id)
            .await?
        else {
            return Ok(());
        };

        if let Some(messages) = snapshot.get("messages").and_then(Value::as_array) {
            let all: Vec<Message> = messages
                .iter()
                .filter_map(|m| serde_json::from_value(m.clone()).ok())
                .collect();
            let start = all.len().saturating_sub(REHYDRATE_TURNS);
            self.messages = all[start..].to_vec().into();
        }
        if let Some(artifacts) = snapshot.get("artifacts").and_then(Value::as_object) {
            self.artifacts = artifacts.clone().into_iter().collect();
        }
        if let Some(tasks) = snapshot.get("completed_tasks").and_then(Value::as_array) {
            self.completed_tasks = tasks
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn phase_is_derived_from_artifact_presence_only() {
        let store = Arc::new(ProjectStore::open_in_memory().await.unwrap());
        let mut ctx = ConversationContext::new("proj-1", "sess-1", store);
        assert_eq!(ctx.phase(), Phase::Intake);
        ctx.add_artifact("picot", Value::String("draft".to_string()));
        assert_eq!(ctx.phase(), Phase::PicotDrafted);
        ctx.add_artifact("search_results", Value::Array(Vec::new()));
        assert_eq!(ctx.phase(), Phase::Searching);
    }

    #[tokio::test]
    async fn save_and_load_round_trips_artifacts_and_tasks() {
        let store = Arc::new(ProjectStore::open_in_memory().await.unwrap());
        let mut ctx = ConversationContext::new("proj-1", "sess-1", store.clone());
        ctx.add_message("user", "hello", Value::Null).await;
        ctx.add_artifact("picot", Value::String("draft".to_string()));
        ctx.completed_tasks.push("t1".to_string());
        ctx.save_to_db().await.unwrap();

        let mut reloaded = ConversationContext::new("proj-1", "sess-1", store);
        reloaded.load_from_db().await.unwrap();
        assert_eq!(reloaded.get_artifact("picot"), Some(&Value::String("draft".to_string())));
        assert_eq!(reloaded.completed_tasks, vec!["t1".to_string()]);
    }
}
