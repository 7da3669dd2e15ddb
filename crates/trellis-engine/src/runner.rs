//! Workflow run orchestration.
//!
//! Ties ordering, input resolution, and node dispatch together: computes
//! the plan, executes it sequentially, records per-node results, enforces
//! the abort policy, and persists the execution log. The log is created
//! with status `in_progress` before the first node runs and reaches a
//! terminal `completed`/`error` status exactly once on every path.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use indexmap::IndexMap;
use tracing::{error, info, warn};
use uuid::Uuid;

use trellis_core::error::{Result, TrellisError};
use trellis_core::graph::Workflow;
use trellis_core::run::{
    ExecutionRecord, ExecutionRequest, ExecutionResult, ExecutionStatus, ExecutionUpdate,
    Identity, NodeOutput, NodeRunRecord, OutputEntry, RunStatus,
};
use trellis_core::traits::ExecutionStore;

use crate::deps::has_pending_dependents;
use crate::executor::NodeExecutor;
use crate::order::{execution_order, fallback_order};
use crate::resolve::resolve_inputs;

pub struct WorkflowRunner {
    executor: NodeExecutor,
    store: Arc<dyn ExecutionStore>,
}

impl WorkflowRunner {
    pub fn new(executor: NodeExecutor, store: Arc<dyn ExecutionStore>) -> Self {
        Self { executor, store }
    }

    /// Look up a workflow scoped to the caller and execute it.
    pub async fn run_by_id(
        &self,
        workflow_id: &str,
        request: ExecutionRequest,
        identity: &Identity,
    ) -> Result<ExecutionResult> {
        let workflow = self
            .store
            .find_workflow(workflow_id, &identity.user_id)?
            .ok_or_else(|| TrellisError::WorkflowNotFound(workflow_id.to_string()))?;
        self.run(&workflow, request, identity).await
    }

    /// Execute a workflow snapshot.
    pub async fn run(
        &self,
        workflow: &Workflow,
        request: ExecutionRequest,
        identity: &Identity,
    ) -> Result<ExecutionResult> {
        let started = Instant::now();
        info!(workflow_id = %workflow.id, user_id = %identity.user_id, "Starting workflow execution");

        let plan = self.plan(workflow);
        let execution_path: Vec<String> = plan.iter().map(|n| n.id.clone()).collect();
        info!(path = ?execution_path, "Execution order resolved");

        let record = ExecutionRecord {
            id: Uuid::new_v4().to_string(),
            workflow_id: workflow.id.clone(),
            user_id: identity.user_id.clone(),
            started_at: Utc::now(),
            inputs: request.clone(),
            status: ExecutionStatus::InProgress,
            completed_at: None,
            execution_time: None,
            outputs: IndexMap::new(),
            node_results: IndexMap::new(),
            error: None,
        };
        self.store.insert_execution(&record)?;
        info!(execution_id = %record.id, "Created execution log");

        let mut collected: HashMap<String, NodeOutput> = HashMap::new();
        let mut node_results: IndexMap<String, NodeRunRecord> = IndexMap::new();
        let mut outputs: IndexMap<String, OutputEntry> = IndexMap::new();
        let mut halt: Option<String> = None;

        for (i, node) in plan.iter().enumerate() {
            info!(
                node_id = %node.id,
                node_kind = %node.kind,
                step = i + 1,
                total = plan.len(),
                "Executing node"
            );

            let inputs = resolve_inputs(
                &node.id,
                &workflow.edges,
                &collected,
                &request.inputs,
                &workflow.nodes,
            );

            let node_start = Instant::now();
            let output = self
                .executor
                .execute(&node.kind, &node.data, inputs, &request.mode)
                .await;
            let elapsed = node_start.elapsed().as_secs_f64();

            match output.error().map(str::to_string) {
                Some(message) => {
                    error!(node_id = %node.id, error = %message, "Node execution failed");
                    node_results.insert(
                        node.id.clone(),
                        NodeRunRecord::error(elapsed, message.clone()),
                    );

                    if node.is_output() {
                        outputs.insert(
                            format!("output_{}", node.id_suffix()),
                            OutputEntry {
                                output: String::new(),
                                output_type: node.param_str("type").unwrap_or("Text").to_string(),
                                execution_time: elapsed,
                                status: RunStatus::Error,
                                node_id: node.id.clone(),
                                node_name: node.display_name().to_string(),
                                error: Some(message.clone()),
                            },
                        );
                    }

                    // Downstream consumers may still read the error record.
                    collected.insert(node.id.clone(), output);

                    if i + 1 < plan.len()
                        && has_pending_dependents(&node.id, &workflow.edges, &plan[i + 1..])
                    {
                        warn!(node_id = %node.id, "Stopping execution: pending nodes depend on failed node");
                        halt = Some(
                            TrellisError::NodeFailed {
                                node: node.id.clone(),
                                message,
                            }
                            .to_string(),
                        );
                        break;
                    }
                }
                None => {
                    info!(node_id = %node.id, elapsed_secs = elapsed, "Node executed");
                    node_results.insert(
                        node.id.clone(),
                        NodeRunRecord::success(elapsed, output.clone()),
                    );

                    if node.is_output() {
                        outputs.insert(
                            format!("output_{}", node.id_suffix()),
                            OutputEntry {
                                output: output.output_text(),
                                output_type: node.param_str("type").unwrap_or("Text").to_string(),
                                execution_time: elapsed,
                                status: RunStatus::Success,
                                node_id: node.id.clone(),
                                node_name: node.display_name().to_string(),
                                error: None,
                            },
                        );
                    }

                    collected.insert(node.id.clone(), output);
                }
            }
        }

        let execution_time = started.elapsed().as_secs_f64();
        let result = match halt {
            None => {
                let update = ExecutionUpdate {
                    completed_at: Utc::now(),
                    execution_time,
                    status: ExecutionStatus::Completed,
                    outputs: outputs.clone(),
                    node_results: node_results.clone(),
                    error: None,
                };
                match self.store.finalize_execution(&record.id, &update) {
                    Ok(()) => {
                        info!(
                            execution_id = %record.id,
                            elapsed_secs = execution_time,
                            "Workflow executed successfully"
                        );
                        ExecutionResult {
                            execution_id: record.id,
                            outputs,
                            execution_time,
                            status: RunStatus::Success,
                            execution_path,
                            node_results,
                            error: None,
                        }
                    }
                    Err(e) => {
                        // The success update could not be persisted; the
                        // run must still reach a terminal error state.
                        let message = e.to_string();
                        error!(execution_id = %record.id, error = %message, "Failed to persist completed execution");
                        self.finalize_error(&record.id, started, &message, &node_results);
                        ExecutionResult {
                            execution_id: record.id,
                            outputs: IndexMap::new(),
                            execution_time: started.elapsed().as_secs_f64(),
                            status: RunStatus::Error,
                            execution_path,
                            node_results,
                            error: Some(message),
                        }
                    }
                }
            }
            Some(message) => {
                error!(execution_id = %record.id, error = %message, "Workflow execution failed");
                self.finalize_error(&record.id, started, &message, &node_results);
                ExecutionResult {
                    execution_id: record.id,
                    outputs: IndexMap::new(),
                    execution_time,
                    status: RunStatus::Error,
                    execution_path,
                    node_results,
                    error: Some(message),
                }
            }
        };

        Ok(result)
    }

    /// Derive the plan, recovering from cycles and degenerate orders with
    /// the heuristic fallback. Never fails.
    fn plan(&self, workflow: &Workflow) -> Vec<trellis_core::graph::Node> {
        let order = match execution_order(&workflow.nodes, &workflow.edges) {
            Ok(order) => order,
            Err(TrellisError::CycleDetected(node)) => {
                warn!(node_id = %node, "Cycle detected, falling back to heuristic order");
                return fallback_order(&workflow.nodes);
            }
            Err(_) => Vec::new(),
        };

        if order.is_empty() && !workflow.nodes.is_empty() {
            warn!("No execution order determined, falling back to heuristic order");
            return fallback_order(&workflow.nodes);
        }
        order
    }

    fn finalize_error(
        &self,
        execution_id: &str,
        started: Instant,
        message: &str,
        node_results: &IndexMap<String, NodeRunRecord>,
    ) {
        let update = ExecutionUpdate {
            completed_at: Utc::now(),
            execution_time: started.elapsed().as_secs_f64(),
            status: ExecutionStatus::Error,
            outputs: IndexMap::new(),
            node_results: node_results.clone(),
            error: Some(message.to_string()),
        };
        if let Err(e) = self.store.finalize_execution(execution_id, &update) {
            error!(execution_id = %execution_id, error = %e, "Failed to finalize execution log");
        }
    }
}
