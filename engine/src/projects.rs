use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use qms_agents::{AgentRegistry, Reasoner};
use qms_providers::AdapterRegistry;
use qms_store::ProjectStore;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use qms_orchestrator::Executor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Active,
    Archived,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectMeta {
    pub project_id: String,
    pub title: String,
    pub status: ProjectStatus,
    pub created_at: DateTime<Utc>,
}

/// A project's fully-wired runtime: its own SQLite-backed store and,
/// built against that store, its own agent registry and executor. The
/// planner, reasoner, and adapter registry are stateless with respect to
/// a project and are shared across every `ProjectRuntime`.
pub struct ProjectRuntime {
    pub store: Arc<ProjectStore>,
    pub agents: Arc<AgentRegistry>,
    pub executor: Arc<Executor>,
}

/// Lazily opens and caches one `ProjectRuntime` per project directory
/// under `root`: a single on-disk root scanned at startup and mutated
/// in place rather than a central database of every project's state.
pub struct ProjectRegistry {
    root: PathBuf,
    adapters: Arc<AdapterRegistry>,
    reasoner: Arc<dyn Reasoner>,
    runtimes: RwLock<HashMap<String, Arc<ProjectRuntime>>>,
}

impl ProjectRegistry {
    pub fn new(root: PathBuf, adapters: Arc<AdapterRegistry>, reasoner: Arc<dyn Reasoner>) -> Self {
        Self {
            root,
            adapters,
            reasoner,
            runtimes: RwLock::new(HashMap::new()),
        }
    }

    fn project_dir(&self, project_id: &str) -> PathBuf {
        self.root.join(project_id)
    }

    fn meta_path(&self, project_id: &str) -> PathBuf {
        self.project_dir(project_id).join("meta.json")
    }

    pub async fn create(&self, title: String) -> anyhow::Result<ProjectMeta> {
        let project_id = Uuid::new_v4().to_string();
        let dir = self.project_dir(&project_id);
        tokio::fs::create_dir_all(&dir).await?;

        let meta = ProjectMeta {
            project_id: project_id.clone(),
            title,
            status: ProjectStatus::Active,
            created_at: Utc::now(),
        };
        self.write_meta(&meta).await?;
        self.load_runtime(&project_id, &dir).await?;
        Ok(meta)
    }

    pub async fn list(&self) -> anyhow::Result<Vec<ProjectMeta>> {
        let mut out = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let meta_path = entry.path().join("meta.json");
            let Ok(raw) = tokio::fs::read_to_string(&meta_path).await else {
                continue;
            };
            if let Ok(meta) = serde_json::from_str::<ProjectMeta>(&raw) {
                out.push(meta);
            }
        }
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }

    pub async fn activate(&self, project_id: &str) -> anyhow::Result<ProjectMeta> {
        self.set_status(project_id, ProjectStatus::Active).await
    }

    pub async fn archive(&self, project_id: &str) -> anyhow::Result<ProjectMeta> {
        self.set_status(project_id, ProjectStatus::Archived).await
    }

    async fn set_status(&self, project_id: &str, status: ProjectStatus) -> anyhow::Result<ProjectMeta> {
        let mut meta = self.read_meta(project_id).await?;
        meta.status = status;
        self.write_meta(&meta).await?;
        Ok(meta)
    }

    async fn read_meta(&self, project_id: &str) -> anyhow::Result<ProjectMeta> {
        let raw = tokio::fs::read_to_string(self.meta_path(project_id)).await?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn write_meta(&self, meta: &ProjectMeta) -> anyhow::Result<()> {
        let path = self.meta_path(&meta.project_id);
        let raw = serde_json::to_string_pretty(meta)?;
        tokio::fs::write(path, raw).await?;
        Ok(())
    }

    /// Returns the cached runtime for a project, opening its store and
    /// building its agent registry on first access.
    pub async fn runtime(&self, project_id: &str) -> anyhow::Result<Arc<ProjectRuntime>> {
        if let Some(runtime) = self.runtimes.read().await.get(project_id) {
            return Ok(runtime.clone());
        }
        let dir = self.project_dir(project_id);
        if !dir.exists() {
            anyhow::bail!("no project `{project_id}`");
        }
        self.load_runtime(project_id, &dir).await
    }

    async fn load_runtime(&self, project_id: &str, dir: &Path) -> anyhow::Result<Arc<ProjectRuntime>> {
        let store = Arc::new(ProjectStore::open(&dir.join("project.sqlite3")).await?);
        let agents = Arc::new(qms_agents::build_registry(
            self.adapters.clone(),
            store.clone(),
            self.reasoner.clone(),
        ));
        let executor = Arc::new(Executor::new(agents.clone(), store.clone()));
        let runtime = Arc::new(ProjectRuntime {
            store,
            agents,
            executor,
        });
        self.runtimes
            .write()
            .await
            .insert(project_id.to_string(), runtime.clone());
        Ok(runtime)
    }
}
