mod error;
mod schema;

pub use error::StoreError;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use qms_types::{
    AuditEntry, Finding, IdentifierKind, Milestone, MilestoneStatus, WorkflowRun, WorkflowStatus,
    WorkflowStep,
};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;

/// The per-project embedded store: one SQLite file per project, opened in
/// WAL mode, with a single writer serialized through the executor the
/// same way `tandem-memory::MemoryDatabase` serializes writes through an
/// `Arc<Mutex<Connection>>`.
pub struct ProjectStore {
    conn: Arc<Mutex<Connection>>,
}

impl ProjectStore {
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(Duration::from_secs(10))?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema().await?;
        Ok(store)
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute_batch(schema::SCHEMA_SQL)?;
        Ok(())
    }

    // -- literature findings ------------------------------------------------

    /// Insert-unique on `(project_id, source, identifier)`: re-saving the
    /// same identifier from the same source is a no-op, not a duplicate
    /// row, since the same PMID can surface from more than one search.
    pub async fn save_finding(&self, finding: &Finding) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO literature_findings (
                finding_id, project_id, source, identifier_kind, identifier, title,
                authors, publication_year, venue, abstract_text, evidence_level,
                retracted, selected, retrieved_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            ON CONFLICT(project_id, source, identifier) DO NOTHING",
            params![
                finding.finding_id,
                finding.project_id,
                finding.source,
                identifier_kind_str(finding.identifier_kind),
                finding.identifier,
                finding.title,
                serde_json::to_string(&finding.authors)?,
                finding.publication_year,
                finding.venue,
                finding.abstract_text,
                finding.evidence_level,
                finding.retracted,
                finding.selected,
                finding.retrieved_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub async fn get_saved_findings(&self, project_id: &str) -> Result<Vec<Finding>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT finding_id, project_id, source, identifier_kind, identifier, title,
                    authors, publication_year, venue, abstract_text, evidence_level,
                    retracted, selected, retrieved_at
             FROM literature_findings WHERE project_id = ?1 ORDER BY retrieved_at ASC",
        )?;
        let rows = stmt.query_map(params![project_id], row_to_finding)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub async fn mark_finding_selected(
        &self,
        project_id: &str,
        finding_id: &str,
        selected: bool,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE literature_findings SET selected = ?1 WHERE project_id = ?2 AND finding_id = ?3",
            params![selected, project_id, finding_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!(
                "finding `{finding_id}` not found in project `{project_id}`"
            )));
        }
        Ok(())
    }

    // -- milestones -----------------------------------------------------------

    pub async fn upsert_milestone(&self, milestone: &Milestone) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO milestones (milestone_id, project_id, name, due_date, status, deliverables, notes, depends_on)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(milestone_id) DO UPDATE SET
                name = excluded.name,
                due_date = excluded.due_date,
                status = excluded.status,
                deliverables = excluded.deliverables,
                notes = excluded.notes,
                depends_on = excluded.depends_on",
            params![
                milestone.milestone_id,
                milestone.project_id,
                milestone.name,
                milestone.due_date.map(|d| d.to_string()),
                milestone_status_str(milestone.status),
                serde_json::to_string(&milestone.deliverables).unwrap_or_else(|_| "[]".to_string()),
                milestone.notes,
                milestone.depends_on,
            ],
        )?;
        Ok(())
    }

    pub async fn list_milestones(&self, project_id: &str) -> Result<Vec<Milestone>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT milestone_id, project_id, name, due_date, status, deliverables, notes, depends_on
             FROM milestones WHERE project_id = ?1 ORDER BY due_date ASC",
        )?;
        let rows = stmt.query_map(params![project_id], row_to_milestone)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub async fn delete_milestone(&self, project_id: &str, milestone_id: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "DELETE FROM milestones WHERE project_id = ?1 AND milestone_id = ?2",
            params![project_id, milestone_id],
        )?;
        Ok(())
    }

    // -- workflow runs/steps ----------------------------------------------------

    pub async fn insert_workflow_run(&self, run: &WorkflowRun) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO workflow_runs (run_id, project_id, plan_id, status, started_at, finished_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                run.run_id,
                run.project_id,
                run.plan_id,
                workflow_status_str(run.status),
                run.started_at.to_rfc3339(),
                run.finished_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    pub async fn update_workflow_run_status(
        &self,
        run_id: &str,
        status: WorkflowStatus,
        finished_at: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE workflow_runs SET status = ?1, finished_at = ?2 WHERE run_id = ?3",
            params![
                workflow_status_str(status),
                finished_at.map(|t| t.to_rfc3339()),
                run_id
            ],
        )?;
        Ok(())
    }

    pub async fn insert_workflow_step(&self, step: &WorkflowStep) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO workflow_steps (run_id, task_id, agent_key, status, started_at, finished_at, output_ref)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                step.run_id,
                step.task_id,
                step.agent_key,
                workflow_status_str(step.status),
                step.started_at.to_rfc3339(),
                step.finished_at.map(|t| t.to_rfc3339()),
                step.output_ref,
            ],
        )?;
        Ok(())
    }

    pub async fn insert_workflow_output(
        &self,
        run_id: &str,
        task_id: &str,
        output: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO workflow_outputs (run_id, task_id, output)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(run_id, task_id) DO UPDATE SET output = excluded.output",
            params![run_id, task_id, serde_json::to_string(output)?],
        )?;
        Ok(())
    }

    pub async fn get_workflow_output(
        &self,
        run_id: &str,
        task_id: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        let conn = self.conn.lock().await;
        let raw: Option<String> = conn
            .query_row(
                "SELECT output FROM workflow_outputs WHERE run_id = ?1 AND task_id = ?2",
                params![run_id, task_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(match raw {
            Some(raw) => Some(serde_json::from_str(&raw)?),
            None => None,
        })
    }

    // -- conversations ------------------------------------------------------

    pub async fn save_conversation_snapshot(
        &self,
        project_id: &str,
        session_id: &str,
        turns_json: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO conversations (project_id, session_id, turns, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(project_id, session_id) DO UPDATE SET
                turns = excluded.turns, updated_at = excluded.updated_at",
            params![
                project_id,
                session_id,
                serde_json::to_string(turns_json)?,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub async fn load_conversation_snapshot(
        &self,
        project_id: &str,
        session_id: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        let conn = self.conn.lock().await;
        let raw: Option<String> = conn
            .query_row(
                "SELECT turns FROM conversations WHERE project_id = ?1 AND session_id = ?2",
                params![project_id, session_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(match raw {
            Some(raw) => Some(serde_json::from_str(&raw)?),
            None => None,
        })
    }

    // -- PICOT drafts / writing drafts ---------------------------------------

    pub async fn save_picot_version(
        &self,
        project_id: &str,
        version: u32,
        picot_json: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO picot_versions (project_id, version, picot, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                project_id,
                version,
                serde_json::to_string(picot_json)?,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub async fn latest_picot_version(
        &self,
        project_id: &str,
    ) -> Result<Option<(u32, serde_json::Value)>, StoreError> {
        let conn = self.conn.lock().await;
        let row: Option<(u32, String)> = conn
            .query_row(
                "SELECT version, picot FROM picot_versions WHERE project_id = ?1
                 ORDER BY version DESC LIMIT 1",
                params![project_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(match row {
            Some((version, raw)) => Some((version, serde_json::from_str(&raw)?)),
            None => None,
        })
    }

    pub async fn save_writing_draft(
        &self,
        project_id: &str,
        section: &str,
        content: &str,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO writing_drafts (project_id, section, content, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(project_id, section) DO UPDATE SET
                content = excluded.content, updated_at = excluded.updated_at",
            params![project_id, section, content, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    // -- audit mirror ---------------------------------------------------------
    // The JSONL file in `qms-audit` is the contractual audit trail; this
    // mirrors entries into the store so the UI can query them relationally
    // without re-parsing JSONL files.

    pub async fn record_audit_entry(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO audit_entries (entry_id, project_id, agent_key, event, recorded_at, detail)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.entry_id,
                entry.project_id,
                entry.agent_key,
                entry.event,
                entry.recorded_at.to_rfc3339(),
                serde_json::to_string(&entry.detail)?,
            ],
        )?;
        Ok(())
    }
}

fn identifier_kind_str(kind: IdentifierKind) -> &'static str {
    match kind {
        IdentifierKind::Pmid => "pmid",
        IdentifierKind::Doi => "doi",
        IdentifierKind::ArxivId => "arxiv_id",
        IdentifierKind::NctId => "nct_id",
        IdentifierKind::Url => "url",
    }
}

fn identifier_kind_from_str(value: &str) -> IdentifierKind {
    match value {
        "doi" => IdentifierKind::Doi,
        "arxiv_id" => IdentifierKind::ArxivId,
        "nct_id" => IdentifierKind::NctId,
        "url" => IdentifierKind::Url,
        _ => IdentifierKind::Pmid,
    }
}

fn milestone_status_str(status: MilestoneStatus) -> &'static str {
    match status {
        MilestoneStatus::NotStarted => "not_started",
        MilestoneStatus::InProgress => "in_progress",
        MilestoneStatus::Complete => "complete",
        MilestoneStatus::Blocked => "blocked",
    }
}

fn milestone_status_from_str(value: &str) -> MilestoneStatus {
    match value {
        "in_progress" => MilestoneStatus::InProgress,
        "complete" => MilestoneStatus::Complete,
        "blocked" => MilestoneStatus::Blocked,
        _ => MilestoneStatus::NotStarted,
    }
}

fn workflow_status_str(status: WorkflowStatus) -> &'static str {
    match status {
        WorkflowStatus::Running => "running",
        WorkflowStatus::Succeeded => "succeeded",
        WorkflowStatus::Failed => "failed",
        WorkflowStatus::ValidationFailed => "validation_failed",
        WorkflowStatus::Canceled => "canceled",
    }
}

fn row_to_finding(row: &rusqlite::Row) -> rusqlite::Result<Finding> {
    let authors_json: String = row.get(6)?;
    let retrieved_at: String = row.get(13)?;
    Ok(Finding {
        finding_id: row.get(0)?,
        project_id: row.get(1)?,
        source: row.get(2)?,
        identifier_kind: identifier_kind_from_str(&row.get::<_, String>(3)?),
        identifier: row.get(4)?,
        title: row.get(5)?,
        authors: serde_json::from_str(&authors_json).unwrap_or_default(),
        publication_year: row.get(7)?,
        venue: row.get(8)?,
        abstract_text: row.get(9)?,
        evidence_level: row.get(10)?,
        retracted: row.get(11)?,
        selected: row.get(12)?,
        retrieved_at: retrieved_at
            .parse()
            .unwrap_or_else(|_| chrono::Utc::now()),
    })
}

fn row_to_milestone(row: &rusqlite::Row) -> rusqlite::Result<Milestone> {
    let due_date: Option<String> = row.get(3)?;
    let deliverables_json: String = row.get(5)?;
    Ok(Milestone {
        milestone_id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        due_date: due_date.and_then(|d| d.parse().ok()),
        status: milestone_status_from_str(&row.get::<_, String>(4)?),
        deliverables: serde_json::from_str(&deliverables_json).unwrap_or_default(),
        notes: row.get(6)?,
        depends_on: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use qms_types::IdentifierKind;

    fn sample_finding(project_id: &str, identifier: &str) -> Finding {
        Finding {
            finding_id: uuid::Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            source: "pubmed".to_string(),
            identifier_kind: IdentifierKind::Pmid,
            identifier: identifier.to_string(),
            title: "Fall prevention bundle".to_string(),
            authors: vec!["Smith J".to_string()],
            publication_year: Some(2023),
            venue: None,
            abstract_text: None,
            evidence_level: Some(2),
            retracted: false,
            selected: false,
            retrieved_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn saving_the_same_identifier_twice_is_a_no_op() {
        let store = ProjectStore::open_in_memory().await.unwrap();
        let finding = sample_finding("proj-1", "12345678");
        store.save_finding(&finding).await.unwrap();
        store.save_finding(&finding).await.unwrap();
        let saved = store.get_saved_findings("proj-1").await.unwrap();
        assert_eq!(saved.len(), 1);
    }

    #[tokio::test]
    async fn marking_an_unknown_finding_selected_is_an_error() {
        let store = ProjectStore::open_in_memory().await.unwrap();
        let err = store
            .mark_finding_selected("proj-1", "does-not-exist", true)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn milestone_upsert_replaces_existing_row() {
        let store = ProjectStore::open_in_memory().await.unwrap();
        let mut milestone = Milestone {
            milestone_id: "m-1".to_string(),
            project_id: "proj-1".to_string(),
            name: "Baseline data collection".to_string(),
            due_date: None,
            status: MilestoneStatus::NotStarted,
            deliverables: vec!["data collection plan".to_string()],
            notes: None,
            depends_on: None,
        };
        store.upsert_milestone(&milestone).await.unwrap();
        milestone.status = MilestoneStatus::Complete;
        store.upsert_milestone(&milestone).await.unwrap();

        let all = store.list_milestones("proj-1").await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, MilestoneStatus::Complete);
        assert_eq!(all[0].deliverables, vec!["data collection plan".to_string()]);
    }

    #[tokio::test]
    async fn conversation_snapshot_round_trips() {
        let store = ProjectStore::open_in_memory().await.unwrap();
        let turns = serde_json::json!([{ "role": "user", "content": "hello" }]);
        store
            .save_conversation_snapshot("proj-1", "sess-1", &turns)
            .await
            .unwrap();
        let loaded = store
            .load_conversation_snapshot("proj-1", "sess-1")
            .await
            .unwrap();
        assert_eq!(loaded, Some(turns));
    }
}
