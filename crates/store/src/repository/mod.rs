//! Repository trait: one method per persistence operation.
//!
//! Every method returns a `Result<T, StoreError>`. No business logic beyond
//! stamping `updated_at` on save.

mod file;
mod memory;

pub use file::FileRepository;
pub use memory::MemoryRepository;

use async_trait::async_trait;
use engine::{AgentWorkflow, import};
use uuid::Uuid;

use crate::StoreError;

/// Name given to workflows imported without one.
pub const DEFAULT_IMPORT_NAME: &str = "Imported Workflow";

#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    /// All stored workflows, most recently updated first.
    async fn list(&self) -> Result<Vec<AgentWorkflow>, StoreError>;

    /// Fetch a single workflow. Returns `StoreError::NotFound` if absent.
    async fn get(&self, id: &str) -> Result<AgentWorkflow, StoreError>;

    /// Insert or replace a workflow, stamping `updated_at`. Returns the
    /// stored value.
    async fn save(&self, workflow: AgentWorkflow) -> Result<AgentWorkflow, StoreError>;

    /// Permanently delete a workflow. Returns `StoreError::NotFound` if no
    /// workflow was deleted.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// Parse a flow export, give it a fresh id, and save it.
    async fn import_flow(&self, raw: &str, name: Option<&str>) -> Result<AgentWorkflow, StoreError> {
        let workflow = import::import_flow_json(
            raw,
            Uuid::new_v4().to_string(),
            name.unwrap_or(DEFAULT_IMPORT_NAME),
        )?;
        self.save(workflow).await
    }

    /// Render a stored workflow as flow-export JSON.
    async fn export_flow(&self, id: &str) -> Result<String, StoreError> {
        let workflow = self.get(id).await?;
        Ok(import::to_flow_export(&workflow).to_json_pretty()?)
    }
}

/// Newest `updated_at` first, ties broken by id.
pub(crate) fn sort_for_listing(workflows: &mut [AgentWorkflow]) {
    workflows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
}
