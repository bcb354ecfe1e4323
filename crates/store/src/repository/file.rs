//! JSON-directory repository: one `<id>.json` file per workflow.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use engine::AgentWorkflow;
use tokio::fs;
use tracing::{debug, info, warn};

use super::{WorkflowRepository, sort_for_listing};
use crate::StoreError;

#[derive(Debug, Clone)]
pub struct FileRepository {
    root: PathBuf,
}

impl FileRepository {
    /// Open (and create if needed) a repository rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        info!("Opened workflow store at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, StoreError> {
        let valid = !id.is_empty()
            && !id.starts_with('.')
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(StoreError::InvalidId(id.to_owned()));
        }
        Ok(self.root.join(format!("{id}.json")))
    }
}

#[async_trait]
impl WorkflowRepository for FileRepository {
    async fn list(&self) -> Result<Vec<AgentWorkflow>, StoreError> {
        let mut entries = fs::read_dir(&self.root).await?;
        let mut all = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = fs::read_to_string(&path).await?;
            match serde_json::from_str::<AgentWorkflow>(&content) {
                Ok(workflow) => all.push(workflow),
                Err(e) => warn!("skipping unreadable workflow file {}: {e}", path.display()),
            }
        }

        sort_for_listing(&mut all);
        Ok(all)
    }

    async fn get(&self, id: &str) -> Result<AgentWorkflow, StoreError> {
        let path = self.path_for(id)?;
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.to_owned()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&content)?)
    }

    async fn save(&self, mut workflow: AgentWorkflow) -> Result<AgentWorkflow, StoreError> {
        let path = self.path_for(&workflow.id)?;
        workflow.updated_at = Utc::now();

        // Write-then-rename so a crash never leaves a half-written file.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&workflow)?).await?;
        fs::rename(&tmp, &path).await?;

        debug!(workflow_id = %workflow.id, "saved workflow");
        Ok(workflow)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let path = self.path_for(id)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(id.to_owned()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
