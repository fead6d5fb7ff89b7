//! In-memory [`MetadataStore`] with failure injection.
//!
//! Parent nodes exist implicitly as soon as a descendant is inserted.

use async_trait::async_trait;
use ledgerscope_connector::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct Inner {
    nodes: BTreeMap<String, Versioned>,
    unreachable: Vec<String>,
}

/// A coordination store held in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite the node at `path`, bumping its version.
    pub async fn insert(&self, path: impl Into<String>, data: Vec<u8>) {
        let mut inner = self.inner.lock().await;
        let path = path.into();
        let version = inner.nodes.get(&path).map_or(0, |v| v.version + 1);
        inner.nodes.insert(path, Versioned { data, version });
    }

    pub async fn remove(&self, path: &str) {
        self.inner.lock().await.nodes.remove(path);
    }

    /// Make every path under `prefix` unreachable.
    pub async fn fail_under(&self, prefix: impl Into<String>) {
        self.inner.lock().await.unreachable.push(prefix.into());
    }

    /// Clear all injected failures.
    pub async fn heal(&self) {
        self.inner.lock().await.unreachable.clear();
    }

    fn check_reachable(inner: &Inner, path: &str) -> SourceResult<()> {
        if inner
            .unreachable
            .iter()
            .any(|prefix| path == prefix || path.starts_with(&format!("{}/", prefix.trim_end_matches('/'))))
        {
            return Err(SourceError::unreachable(
                WitnessSource::MetadataStore,
                format!("injected failure for {path}"),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn list(&self, path: &str) -> SourceResult<Vec<String>> {
        let inner = self.inner.lock().await;
        Self::check_reachable(&inner, path)?;

        let prefix = format!("{}/", path.trim_end_matches('/'));
        let children: Vec<String> = inner
            .nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter_map(|(k, _)| k[prefix.len()..].split('/').next().map(str::to_string))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if children.is_empty() && !inner.nodes.contains_key(path) {
            return Err(SourceError::not_found(path.to_string()));
        }
        Ok(children)
    }

    async fn get(&self, path: &str) -> SourceResult<Versioned> {
        let inner = self.inner.lock().await;
        Self::check_reachable(&inner, path)?;
        inner
            .nodes
            .get(path)
            .cloned()
            .ok_or_else(|| SourceError::not_found(path.to_string()))
    }

    async fn set(&self, path: &str, data: Vec<u8>, expected_version: i32) -> SourceResult<i32> {
        let mut inner = self.inner.lock().await;
        Self::check_reachable(&inner, path)?;
        let node = inner
            .nodes
            .get_mut(path)
            .ok_or_else(|| SourceError::not_found(path.to_string()))?;
        if node.version != expected_version {
            return Err(SourceError::VersionConflict {
                path: path.to_string(),
            });
        }
        node.data = data;
        node.version += 1;
        Ok(node.version)
    }
}
