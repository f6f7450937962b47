// Topology store: read-only lookup of diagram declarations by id.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use crate::models::Topology;

#[async_trait::async_trait]
pub trait TopologyStore: Send + Sync {
    async fn get(&self, diagram_id: &str) -> Option<Arc<Topology>>;
}

/// In-memory store, typically filled from a directory of `*.json` diagrams at startup.
#[derive(Default)]
pub struct InMemoryTopologyStore {
    diagrams: RwLock<HashMap<String, Arc<Topology>>>,
}

impl InMemoryTopologyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, topology: Topology) {
        self.diagrams
            .write()
            .await
            .insert(topology.id.clone(), Arc::new(topology));
    }

    pub async fn len(&self) -> usize {
        self.diagrams.read().await.len()
    }

    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.diagrams.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Loads every `*.json` file in `dir`. Unparseable files are skipped with a warning;
    /// a missing directory yields an empty store.
    #[instrument(skip(dir), fields(repo = "topology", operation = "load_dir"))]
    pub async fn load_dir(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = dir.as_ref();
        let store = Self::new();
        if !dir.exists() {
            warn!(path = %dir.display(), "topology directory missing; no diagrams loaded");
            return Ok(store);
        }
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = match tokio::fs::read_to_string(&path).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable diagram");
                    continue;
                }
            };
            match serde_json::from_str::<Topology>(&raw) {
                Ok(topology) => store.insert(topology).await,
                Err(e) => warn!(path = %path.display(), error = %e, "skipping invalid diagram"),
            }
        }
        info!(diagrams = store.len().await, path = %dir.display(), "topologies loaded");
        Ok(store)
    }
}

#[async_trait::async_trait]
impl TopologyStore for InMemoryTopologyStore {
    async fn get(&self, diagram_id: &str) -> Option<Arc<Topology>> {
        self.diagrams.read().await.get(diagram_id).cloned()
    }
}
