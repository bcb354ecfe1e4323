//! In-memory repository, for tests and embedding.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use engine::AgentWorkflow;
use tokio::sync::RwLock;

use super::{WorkflowRepository, sort_for_listing};
use crate::StoreError;

#[derive(Debug, Default)]
pub struct MemoryRepository {
    workflows: RwLock<HashMap<String, AgentWorkflow>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowRepository for MemoryRepository {
    async fn list(&self) -> Result<Vec<AgentWorkflow>, StoreError> {
        let mut all: Vec<_> = self.workflows.read().await.values().cloned().collect();
        sort_for_listing(&mut all);
        Ok(all)
    }

    async fn get(&self, id: &str) -> Result<AgentWorkflow, StoreError> {
        self.workflows
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_owned()))
    }

    async fn save(&self, mut workflow: AgentWorkflow) -> Result<AgentWorkflow, StoreError> {
        workflow.updated_at = Utc::now();
        self.workflows
            .write()
            .await
            .insert(workflow.id.clone(), workflow.clone());
        Ok(workflow)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.workflows
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::{NodeKind, WorkflowNode};

    const EXPORT: &str = r#"{ "drawflow": { "Home": { "data": {
        "1": { "name": "input", "outputs": { "output_1": { "connections": [ { "node": "2", "output": "input_1" } ] } } },
        "2": { "name": "output" }
    } } } }"#;

    #[tokio::test]
    async fn save_get_delete_cycle() {
        let repo = MemoryRepository::new();
        let wf = AgentWorkflow::new("wf-1", "demo", vec![WorkflowNode::input("in")], vec![]);
        let created = wf.created_at;

        let saved = repo.save(wf).await.unwrap();
        assert!(saved.updated_at >= created);
        assert_eq!(repo.get("wf-1").await.unwrap(), saved);

        repo.delete("wf-1").await.unwrap();
        assert!(matches!(repo.get("wf-1").await, Err(StoreError::NotFound(_))));
        assert!(matches!(repo.delete("wf-1").await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let repo = MemoryRepository::new();
        repo.save(AgentWorkflow::new("old", "old", vec![], vec![])).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        repo.save(AgentWorkflow::new("new", "new", vec![], vec![])).await.unwrap();

        let ids: Vec<_> = repo.list().await.unwrap().into_iter().map(|w| w.id).collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[tokio::test]
    async fn import_then_export_round_trips() {
        let repo = MemoryRepository::new();
        let imported = repo.import_flow(EXPORT, None).await.unwrap();

        assert_eq!(imported.name, crate::repository::DEFAULT_IMPORT_NAME);
        assert_eq!(imported.nodes_of_kind(NodeKind::Input).count(), 1);
        assert_eq!(repo.list().await.unwrap().len(), 1);

        let raw = repo.export_flow(&imported.id).await.unwrap();
        let again = repo.import_flow(&raw, Some("copy")).await.unwrap();
        assert_eq!(again.name, "copy");
        assert_ne!(again.id, imported.id);
        assert_eq!(again.connections, imported.connections);
    }

    #[tokio::test]
    async fn import_rejects_garbage() {
        let repo = MemoryRepository::new();
        let err = repo.import_flow("not json", None).await.unwrap_err();
        assert!(matches!(err, StoreError::Engine(engine::EngineError::InvalidExport(_))));
    }
}
