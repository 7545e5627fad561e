// SPDX-FileCopyrightText: 2025 Caution SEZC
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Commercial

use crate::call::PhysicalResourceId;
use anyhow::Context;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::Mutex;

#[derive(Debug, thiserror::Error, bon::Builder)]
#[error("id store {op} failed for {logical_id:?}")]
pub struct StoreError {
    pub op: &'static str,
    #[builder(into)]
    pub logical_id: String,
    #[source]
    #[builder(into)]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

/// Durable record of the physical resource id per logical resource.
///
/// The orchestrator writes the id here before reporting success, so a deploy
/// aborted right after a create still leaves enough state for the next run to
/// adopt or delete the remote resource.
#[async_trait]
pub trait PhysicalIdStore: Send + Sync {
    async fn record(&self, logical_id: &str, id: &PhysicalResourceId) -> Result<(), StoreError>;
    async fn fetch(&self, logical_id: &str) -> Result<Option<PhysicalResourceId>, StoreError>;
    async fn clear(&self, logical_id: &str) -> Result<(), StoreError>;
}

/// JSON-file-backed store, one entry per logical id. A missing file reads as
/// an empty store.
pub struct FileIdStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileIdStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> anyhow::Result<BTreeMap<String, String>> {
        match fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("Failed to parse state file {}", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e).with_context(|| {
                format!("Failed to read state file {}", self.path.display())
            }),
        }
    }

    async fn save(&self, entries: &BTreeMap<String, String>) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create state directory {}", parent.display())
            })?;
        }
        let body = serde_json::to_vec_pretty(entries).context("Failed to encode state file")?;
        // write-then-rename: a crash mid-write must not tear the map
        let staging = self.path.with_extension("tmp");
        fs::write(&staging, body)
            .await
            .with_context(|| format!("Failed to write state file {}", staging.display()))?;
        fs::rename(&staging, &self.path)
            .await
            .with_context(|| format!("Failed to replace state file {}", self.path.display()))
    }
}

fn store_error(op: &'static str, logical_id: &str, source: anyhow::Error) -> StoreError {
    StoreError::builder()
        .op(op)
        .logical_id(logical_id)
        .source(source)
        .build()
}

#[async_trait]
impl PhysicalIdStore for FileIdStore {
    async fn record(&self, logical_id: &str, id: &PhysicalResourceId) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut entries = self
            .load()
            .await
            .map_err(|e| store_error("record", logical_id, e))?;
        entries.insert(logical_id.to_string(), id.as_str().to_string());
        self.save(&entries)
            .await
            .map_err(|e| store_error("record", logical_id, e))
    }

    async fn fetch(&self, logical_id: &str) -> Result<Option<PhysicalResourceId>, StoreError> {
        let _guard = self.lock.lock().await;
        let entries = self
            .load()
            .await
            .map_err(|e| store_error("fetch", logical_id, e))?;
        Ok(entries.get(logical_id).map(PhysicalResourceId::new))
    }

    async fn clear(&self, logical_id: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut entries = self
            .load()
            .await
            .map_err(|e| store_error("clear", logical_id, e))?;
        if entries.remove(logical_id).is_some() {
            self.save(&entries)
                .await
                .map_err(|e| store_error("clear", logical_id, e))?;
        }
        Ok(())
    }
}

/// In-memory store for tests and dry runs.
#[derive(Default)]
pub struct MemoryIdStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryIdStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PhysicalIdStore for MemoryIdStore {
    async fn record(&self, logical_id: &str, id: &PhysicalResourceId) -> Result<(), StoreError> {
        self.entries
            .lock()
            .await
            .insert(logical_id.to_string(), id.as_str().to_string());
        Ok(())
    }

    async fn fetch(&self, logical_id: &str) -> Result<Option<PhysicalResourceId>, StoreError> {
        Ok(self
            .entries
            .lock()
            .await
            .get(logical_id)
            .map(PhysicalResourceId::new))
    }

    async fn clear(&self, logical_id: &str) -> Result<(), StoreError> {
        self.entries.lock().await.remove(logical_id);
        Ok(())
    }
}
