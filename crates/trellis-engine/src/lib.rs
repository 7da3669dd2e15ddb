//! Workflow execution engine.
//!
//! A workflow is a user-authored directed graph of typed nodes connected by
//! edges that route one node's output into another's input. The engine
//! derives a linear plan from the graph (tolerating cycles and disconnected
//! pieces), resolves each node's inputs from upstream outputs or the
//! caller's initial values, dispatches execution per node kind through a
//! behavior registry, and records every step into a replayable execution
//! log.
//!
//! Execution is strictly sequential per run: one node at a time in plan
//! order, no fan-out across independent branches.

pub mod behaviors;
pub mod deps;
pub mod executor;
pub mod order;
pub mod resolve;
pub mod runner;
pub mod template;

pub use executor::{NodeBehavior, NodeContext, NodeExecutor};
pub use runner::WorkflowRunner;
