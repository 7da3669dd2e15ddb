use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;
use uuid::Uuid;

use trellis_core::error::{Result, TrellisError};
use trellis_core::graph::{normalize_input_nodes, Workflow, WorkflowDefinition};
use trellis_core::run::{ExecutionRecord, ExecutionRequest, ExecutionStatus, ExecutionUpdate};
use trellis_core::traits::ExecutionStore;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS workflows (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        name TEXT NOT NULL,
        description TEXT,
        nodes TEXT NOT NULL,
        edges TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_workflows_user ON workflows(user_id);

    CREATE TABLE IF NOT EXISTS executions (
        id TEXT PRIMARY KEY,
        workflow_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        started_at TEXT NOT NULL,
        inputs TEXT NOT NULL,
        status TEXT NOT NULL,
        completed_at TEXT,
        execution_time REAL,
        outputs TEXT,
        node_results TEXT,
        error TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_executions_workflow
        ON executions(workflow_id, started_at);
";

/// SQLite-backed store for workflow documents and execution records.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                TrellisError::Database(format!("Failed to create db directory: {}", e))
            })?;
        }

        let conn =
            Connection::open(path).map_err(|e| TrellisError::Database(e.to_string()))?;

        // WAL for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| TrellisError::Database(e.to_string()))?;

        conn.execute_batch(SCHEMA)
            .map_err(|e| TrellisError::Database(e.to_string()))?;

        debug!(path = %path.display(), "SQLite store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| TrellisError::Database(e.to_string()))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| TrellisError::Database(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create a workflow from a portable definition. Input nodes are
    /// normalized (default `type`/`nodeName`) on the way in.
    pub fn create_workflow(
        &self,
        user_id: &str,
        mut definition: WorkflowDefinition,
    ) -> Result<Workflow> {
        normalize_input_nodes(&mut definition.nodes);
        let now = Utc::now();
        let workflow = Workflow {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            name: definition.name,
            description: definition.description,
            nodes: definition.nodes,
            edges: definition.edges,
            created_at: now,
            updated_at: now,
        };

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO workflows (id, user_id, name, description, nodes, edges, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                workflow.id,
                workflow.user_id,
                workflow.name,
                workflow.description,
                serde_json::to_string(&workflow.nodes)?,
                serde_json::to_string(&workflow.edges)?,
                workflow.created_at.to_rfc3339(),
                workflow.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| TrellisError::Database(e.to_string()))?;

        debug!(workflow_id = %workflow.id, "Workflow created");
        Ok(workflow)
    }

    /// List workflows owned by a user, newest first.
    pub fn list_workflows(&self, user_id: &str) -> Result<Vec<Workflow>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, name, description, nodes, edges, created_at, updated_at
                 FROM workflows WHERE user_id = ?1 ORDER BY updated_at DESC",
            )
            .map_err(|e| TrellisError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![user_id], row_to_workflow)
            .map_err(|e| TrellisError::Database(e.to_string()))?;

        let mut workflows = Vec::new();
        for row in rows {
            workflows.push(row.map_err(|e| TrellisError::Database(e.to_string()))?);
        }
        Ok(workflows)
    }

    /// Replace a workflow's definition, bumping `updated_at`.
    pub fn update_workflow(
        &self,
        id: &str,
        user_id: &str,
        mut definition: WorkflowDefinition,
    ) -> Result<Workflow> {
        normalize_input_nodes(&mut definition.nodes);
        let updated_at = Utc::now();

        let changed = {
            let conn = self.lock()?;
            conn.execute(
                "UPDATE workflows
                 SET name = ?1, description = ?2, nodes = ?3, edges = ?4, updated_at = ?5
                 WHERE id = ?6 AND user_id = ?7",
                params![
                    definition.name,
                    definition.description,
                    serde_json::to_string(&definition.nodes)?,
                    serde_json::to_string(&definition.edges)?,
                    updated_at.to_rfc3339(),
                    id,
                    user_id,
                ],
            )
            .map_err(|e| TrellisError::Database(e.to_string()))?
        };

        if changed == 0 {
            return Err(TrellisError::WorkflowNotFound(id.to_string()));
        }
        self.find_workflow(id, user_id)?
            .ok_or_else(|| TrellisError::WorkflowNotFound(id.to_string()))
    }

    /// Delete a workflow owned by the user.
    pub fn delete_workflow(&self, id: &str, user_id: &str) -> Result<()> {
        let conn = self.lock()?;
        let deleted = conn
            .execute(
                "DELETE FROM workflows WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )
            .map_err(|e| TrellisError::Database(e.to_string()))?;
        if deleted == 0 {
            return Err(TrellisError::WorkflowNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Duplicate a workflow under a new id, name suffixed " (Copy)".
    pub fn clone_workflow(&self, id: &str, user_id: &str) -> Result<Workflow> {
        let source = self
            .find_workflow(id, user_id)?
            .ok_or_else(|| TrellisError::WorkflowNotFound(id.to_string()))?;

        self.create_workflow(
            user_id,
            WorkflowDefinition {
                name: format!("{} (Copy)", source.name),
                description: source.description,
                nodes: source.nodes,
                edges: source.edges,
            },
        )
    }

    /// Export a workflow as a portable definition (internal ids stripped).
    pub fn export_workflow(&self, id: &str, user_id: &str) -> Result<WorkflowDefinition> {
        let workflow = self
            .find_workflow(id, user_id)?
            .ok_or_else(|| TrellisError::WorkflowNotFound(id.to_string()))?;
        Ok(workflow.into())
    }

    /// Fetch one execution record.
    pub fn get_execution(&self, id: &str) -> Result<Option<ExecutionRecord>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, workflow_id, user_id, started_at, inputs, status,
                    completed_at, execution_time, outputs, node_results, error
             FROM executions WHERE id = ?1",
            params![id],
            row_to_execution,
        )
        .optional()
        .map_err(|e| TrellisError::Database(e.to_string()))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| TrellisError::Database(e.to_string()))
    }
}

impl ExecutionStore for SqliteStore {
    fn find_workflow(&self, id: &str, user_id: &str) -> Result<Option<Workflow>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, user_id, name, description, nodes, edges, created_at, updated_at
             FROM workflows WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
            row_to_workflow,
        )
        .optional()
        .map_err(|e| TrellisError::Database(e.to_string()))
    }

    fn insert_execution(&self, record: &ExecutionRecord) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO executions (id, workflow_id, user_id, started_at, inputs, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.id,
                record.workflow_id,
                record.user_id,
                record.started_at.to_rfc3339(),
                serde_json::to_string(&record.inputs)?,
                record.status.as_str(),
            ],
        )
        .map_err(|e| TrellisError::Database(e.to_string()))?;
        debug!(execution_id = %record.id, "Execution record inserted");
        Ok(())
    }

    fn finalize_execution(&self, id: &str, update: &ExecutionUpdate) -> Result<()> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE executions
                 SET completed_at = ?1, execution_time = ?2, status = ?3,
                     outputs = ?4, node_results = ?5, error = ?6
                 WHERE id = ?7",
                params![
                    update.completed_at.to_rfc3339(),
                    update.execution_time,
                    update.status.as_str(),
                    serde_json::to_string(&update.outputs)?,
                    serde_json::to_string(&update.node_results)?,
                    update.error,
                    id,
                ],
            )
            .map_err(|e| TrellisError::Database(e.to_string()))?;

        if changed == 0 {
            return Err(TrellisError::Database(format!(
                "execution {} not found",
                id
            )));
        }
        debug!(execution_id = %id, status = update.status.as_str(), "Execution record finalized");
        Ok(())
    }
}

fn row_to_workflow(row: &Row<'_>) -> rusqlite::Result<Workflow> {
    let nodes_json: String = row.get(4)?;
    let edges_json: String = row.get(5)?;
    let created: String = row.get(6)?;
    let updated: String = row.get(7)?;

    Ok(Workflow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        nodes: serde_json::from_str(&nodes_json).unwrap_or_default(),
        edges: serde_json::from_str(&edges_json).unwrap_or_default(),
        created_at: parse_timestamp(&created),
        updated_at: parse_timestamp(&updated),
    })
}

fn row_to_execution(row: &Row<'_>) -> rusqlite::Result<ExecutionRecord> {
    let started: String = row.get(3)?;
    let inputs_json: String = row.get(4)?;
    let status: String = row.get(5)?;
    let completed: Option<String> = row.get(6)?;
    let outputs_json: Option<String> = row.get(8)?;
    let node_results_json: Option<String> = row.get(9)?;

    Ok(ExecutionRecord {
        id: row.get(0)?,
        workflow_id: row.get(1)?,
        user_id: row.get(2)?,
        started_at: parse_timestamp(&started),
        inputs: serde_json::from_str::<ExecutionRequest>(&inputs_json).unwrap_or_default(),
        status: match status.as_str() {
            "completed" => ExecutionStatus::Completed,
            "error" => ExecutionStatus::Error,
            _ => ExecutionStatus::InProgress,
        },
        completed_at: completed.as_deref().map(parse_timestamp),
        execution_time: row.get(7)?,
        outputs: outputs_json
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default(),
        node_results: node_results_json
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default(),
        error: row.get(10)?,
    })
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use trellis_core::graph::{kind, Edge, Node};
    use trellis_core::run::{NodeOutput, NodeRunRecord};

    fn sample_definition() -> WorkflowDefinition {
        WorkflowDefinition {
            name: "Summarizer".to_string(),
            description: Some("summarize things".to_string()),
            nodes: vec![
                Node::new("input-1", kind::INPUT),
                Node::new("openai-1", kind::OPENAI)
                    .with_param("prompt", serde_json::json!("Summarize {{input}}")),
                Node::new("output-1", kind::OUTPUT),
            ],
            edges: vec![
                Edge::new("input-1", "openai-1"),
                Edge::new("openai-1", "output-1"),
            ],
        }
    }

    #[test]
    fn test_create_and_find_scoped_by_owner() {
        let store = SqliteStore::in_memory().unwrap();
        let created = store.create_workflow("alice", sample_definition()).unwrap();

        let found = store.find_workflow(&created.id, "alice").unwrap().unwrap();
        assert_eq!(found.name, "Summarizer");
        assert_eq!(found.nodes.len(), 3);
        assert_eq!(found.edges.len(), 2);

        // other users never see it
        assert!(store.find_workflow(&created.id, "bob").unwrap().is_none());
    }

    #[test]
    fn test_create_normalizes_input_nodes() {
        let store = SqliteStore::in_memory().unwrap();
        let created = store.create_workflow("alice", sample_definition()).unwrap();
        let input = created.nodes.iter().find(|n| n.is_input()).unwrap();
        assert_eq!(input.param_str("type"), Some("Text"));
        assert_eq!(input.param_str("nodeName"), Some("Input 1"));
    }

    #[test]
    fn test_update_replaces_definition() {
        let store = SqliteStore::in_memory().unwrap();
        let created = store.create_workflow("alice", sample_definition()).unwrap();

        let mut definition = sample_definition();
        definition.name = "Renamed".to_string();
        definition.nodes.pop();
        let updated = store
            .update_workflow(&created.id, "alice", definition)
            .unwrap();
        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.nodes.len(), 2);
        assert!(updated.updated_at >= created.updated_at);
    }

    #[test]
    fn test_update_wrong_owner_is_not_found() {
        let store = SqliteStore::in_memory().unwrap();
        let created = store.create_workflow("alice", sample_definition()).unwrap();
        let err = store
            .update_workflow(&created.id, "mallory", sample_definition())
            .unwrap_err();
        assert!(matches!(err, TrellisError::WorkflowNotFound(_)));
    }

    #[test]
    fn test_delete() {
        let store = SqliteStore::in_memory().unwrap();
        let created = store.create_workflow("alice", sample_definition()).unwrap();
        store.delete_workflow(&created.id, "alice").unwrap();
        assert!(store.find_workflow(&created.id, "alice").unwrap().is_none());

        let err = store.delete_workflow(&created.id, "alice").unwrap_err();
        assert!(matches!(err, TrellisError::WorkflowNotFound(_)));
    }

    #[test]
    fn test_clone_appends_copy_suffix() {
        let store = SqliteStore::in_memory().unwrap();
        let created = store.create_workflow("alice", sample_definition()).unwrap();
        let cloned = store.clone_workflow(&created.id, "alice").unwrap();
        assert_ne!(cloned.id, created.id);
        assert_eq!(cloned.name, "Summarizer (Copy)");
        assert_eq!(store.list_workflows("alice").unwrap().len(), 2);
    }

    #[test]
    fn test_export_strips_internal_fields() {
        let store = SqliteStore::in_memory().unwrap();
        let created = store.create_workflow("alice", sample_definition()).unwrap();
        let exported = store.export_workflow(&created.id, "alice").unwrap();
        let json = serde_json::to_value(&exported).unwrap();
        assert!(json.get("id").is_none());
        assert!(json.get("user_id").is_none());
        assert_eq!(exported.nodes.len(), 3);
    }

    #[test]
    fn test_execution_insert_and_finalize_once() {
        let store = SqliteStore::in_memory().unwrap();
        let record = ExecutionRecord {
            id: "exec-1".to_string(),
            workflow_id: "wf-1".to_string(),
            user_id: "alice".to_string(),
            started_at: Utc::now(),
            inputs: ExecutionRequest::new(),
            status: ExecutionStatus::InProgress,
            completed_at: None,
            execution_time: None,
            outputs: IndexMap::new(),
            node_results: IndexMap::new(),
            error: None,
        };
        store.insert_execution(&record).unwrap();

        let stored = store.get_execution("exec-1").unwrap().unwrap();
        assert_eq!(stored.status, ExecutionStatus::InProgress);
        assert!(stored.completed_at.is_none());

        let mut node_results = IndexMap::new();
        node_results.insert(
            "text-1".to_string(),
            NodeRunRecord::success(0.01, NodeOutput::from_output("hi")),
        );
        let update = ExecutionUpdate {
            completed_at: Utc::now(),
            execution_time: 0.02,
            status: ExecutionStatus::Completed,
            outputs: IndexMap::new(),
            node_results,
            error: None,
        };
        store.finalize_execution("exec-1", &update).unwrap();

        let stored = store.get_execution("exec-1").unwrap().unwrap();
        assert_eq!(stored.status, ExecutionStatus::Completed);
        assert!(stored.completed_at.is_some());
        assert_eq!(stored.execution_time, Some(0.02));
        assert_eq!(stored.node_results.len(), 1);
    }

    #[test]
    fn test_finalize_unknown_execution_errors() {
        let store = SqliteStore::in_memory().unwrap();
        let update = ExecutionUpdate {
            completed_at: Utc::now(),
            execution_time: 0.0,
            status: ExecutionStatus::Error,
            outputs: IndexMap::new(),
            node_results: IndexMap::new(),
            error: Some("boom".to_string()),
        };
        assert!(store.finalize_execution("missing", &update).is_err());
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("trellis.db");
        let store = SqliteStore::open(&path).unwrap();
        store.create_workflow("alice", sample_definition()).unwrap();
        drop(store);

        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.list_workflows("alice").unwrap().len(), 1);
    }
}
