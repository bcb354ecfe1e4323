//! `engine` crate holds workflow models, flow import, graph ordering, and the
//! execution engine.

pub mod models;
pub mod error;
pub mod dag;
pub mod dispatch;
pub mod events;
pub mod executor;
pub mod import;
pub mod state;

pub use models::{AgentConfig, AgentWorkflow, NodeConfig, NodeConnection, NodeKind, WorkflowNode};
pub use error::{EngineError, STOPPED_BY_USER};
pub use dag::{execution_order, reachable_from, validate_workflow};
pub use events::{EventBus, EventSink, TracingSink, WorkflowEvent, WorkflowEventKind};
pub use executor::{ExecutorConfig, ProviderRegistry, WorkflowExecutor};
pub use import::{FlowExport, import_flow, import_flow_json, to_flow_export};
pub use state::{ExecutionState, RunHandle, RunStatus};
