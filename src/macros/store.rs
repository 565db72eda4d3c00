// src/macros/store.rs - The persisted macro collection
use super::model::{InvalidFormat, Macro, parse_macros, serialize_macros};
use super::storage::{MacroStorage, StorageError};
use crate::kinematics::KinematicTable;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    InvalidFormat(#[from] InvalidFormat),
    #[error("no macro at index {index} ({len} stored)")]
    IndexOutOfRange { index: usize, len: usize },
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("could not encode macros: {0}")]
    Encode(String),
}

/// Listing entry for one stored macro.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MacroSummary {
    pub index: usize,
    pub name: String,
    pub frames: usize,
    pub span_ms: Option<f64>,
}

/// In-memory macro list mirrored to storage under one key.
///
/// The list is read from storage at most once per store; every mutation writes
/// the full list back before it becomes visible.
pub struct MacroStore {
    storage: Arc<dyn MacroStorage>,
    key: String,
    table: Arc<KinematicTable>,
    macros: RwLock<Vec<Macro>>,
    loaded: Mutex<bool>,
}

/// `name`, or `name (n)` with the smallest free `n >= 2`.
pub fn unique_name(taken: &[Macro], name: &str) -> String {
    let is_taken = |candidate: &str| taken.iter().any(|m| m.name == candidate);
    if !is_taken(name) {
        return name.to_string();
    }
    (2..)
        .map(|n| format!("{} ({})", name, n))
        .find(|candidate| !is_taken(candidate))
        .unwrap_or_else(|| name.to_string())
}

/// `Macro-<n>` for the first free `n` counting from the collection size.
fn default_name(taken: &[Macro]) -> String {
    (taken.len() + 1..)
        .map(|n| format!("Macro-{}", n))
        .find(|candidate| !taken.iter().any(|m| &m.name == candidate))
        .unwrap_or_else(|| "Macro".to_string())
}

/// Name `entry` (a default name when it has none, otherwise made unique)
/// and append it. Returns the name it was stored under.
fn admit(existing: &mut Vec<Macro>, mut entry: Macro) -> String {
    entry.name = if entry.name.is_empty() {
        default_name(existing)
    } else {
        unique_name(existing, &entry.name)
    };
    let name = entry.name.clone();
    existing.push(entry);
    name
}

impl MacroStore {
    pub fn new(storage: Arc<dyn MacroStorage>, key: impl Into<String>, table: Arc<KinematicTable>) -> Self {
        Self {
            storage,
            key: key.into(),
            table,
            macros: RwLock::new(Vec::new()),
            loaded: Mutex::new(false),
        }
    }

    /// Read the persisted collection. Only the first successful call touches
    /// storage; later calls return `Ok(false)` without reading.
    pub async fn load(&self) -> Result<bool, StoreError> {
        let mut loaded = self.loaded.lock().await;
        if *loaded {
            tracing::debug!("Macro collection already loaded");
            return Ok(false);
        }
        let mut stored = Vec::new();
        if let Some(text) = self.storage.read(&self.key).await? {
            if !text.trim().is_empty() {
                for entry in parse_macros(&text, &self.table)? {
                    admit(&mut stored, entry);
                }
            }
        }
        tracing::info!("Loaded {} macros from storage key '{}'", stored.len(), self.key);
        *self.macros.write().await = stored;
        *loaded = true;
        Ok(true)
    }

    pub async fn is_loaded(&self) -> bool {
        *self.loaded.lock().await
    }

    async fn persist(&self, macros: &[Macro]) -> Result<(), StoreError> {
        let text = serialize_macros(macros).map_err(|e| StoreError::Encode(e.to_string()))?;
        self.storage.write(&self.key, &text).await?;
        Ok(())
    }

    /// Append a macro, renaming it if the name is taken. Returns the stored name.
    pub async fn add(&self, entry: Macro) -> Result<String, StoreError> {
        let mut macros = self.macros.write().await;
        let mut next = macros.clone();
        let name = admit(&mut next, entry);
        self.persist(&next).await?;
        *macros = next;
        tracing::info!("Stored macro '{}' ({} total)", name, macros.len());
        Ok(name)
    }

    pub async fn delete(&self, index: usize) -> Result<Macro, StoreError> {
        let mut macros = self.macros.write().await;
        if index >= macros.len() {
            return Err(StoreError::IndexOutOfRange {
                index,
                len: macros.len(),
            });
        }
        let mut next = macros.clone();
        let removed = next.remove(index);
        self.persist(&next).await?;
        *macros = next;
        tracing::info!("Deleted macro '{}'", removed.name);
        Ok(removed)
    }

    /// Append every macro in `text`, or none of them. Returns the stored names.
    pub async fn import(&self, text: &str) -> Result<Vec<String>, StoreError> {
        let incoming = parse_macros(text, &self.table)?;
        let mut macros = self.macros.write().await;
        let mut next = macros.clone();
        let names: Vec<String> = incoming.into_iter().map(|entry| admit(&mut next, entry)).collect();
        self.persist(&next).await?;
        *macros = next;
        tracing::info!("Imported {} macros", names.len());
        Ok(names)
    }

    pub async fn export(&self) -> Result<String, StoreError> {
        let macros = self.macros.read().await;
        serialize_macros(&macros).map_err(|e| StoreError::Encode(e.to_string()))
    }

    pub async fn get_by_name(&self, name: &str) -> Option<Macro> {
        self.macros
            .read()
            .await
            .iter()
            .find(|m| m.name == name)
            .cloned()
    }

    pub async fn list(&self) -> Vec<MacroSummary> {
        self.macros
            .read()
            .await
            .iter()
            .enumerate()
            .map(|(index, m)| MacroSummary {
                index,
                name: m.name.clone(),
                frames: m.movements.len(),
                span_ms: m.span_ms(),
            })
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.macros.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.macros.read().await.is_empty()
    }

    pub async fn next_default_name(&self) -> String {
        default_name(&self.macros.read().await)
    }
}
