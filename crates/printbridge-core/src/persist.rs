// ── Durable printer configuration ──
//
// The gateway holds no printer registration across socket lifetimes, so
// the per-tenant `PrinterConfig` written here is what drives automatic
// re-registration after a reconnect. The store is an injected seam: the
// hosting application decides the storage technology.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use dashmap::DashMap;

use crate::error::CoreError;
use crate::model::PrinterConfig;

/// Key-value storage of one printer configuration per tenant.
pub trait PrinterStore: Send + Sync {
    fn get(&self, tenant_id: &str) -> Option<PrinterConfig>;
    fn set(&self, tenant_id: &str, config: &PrinterConfig) -> Result<(), CoreError>;
    fn remove(&self, tenant_id: &str) -> Result<(), CoreError>;
}

// ── In-memory store ──────────────────────────────────────────────────

/// Volatile store for tests and embedded hosts.
#[derive(Default)]
pub struct MemoryPrinterStore {
    configs: DashMap<String, PrinterConfig>,
}

impl MemoryPrinterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PrinterStore for MemoryPrinterStore {
    fn get(&self, tenant_id: &str) -> Option<PrinterConfig> {
        self.configs.get(tenant_id).map(|c| c.value().clone())
    }

    fn set(&self, tenant_id: &str, config: &PrinterConfig) -> Result<(), CoreError> {
        self.configs.insert(tenant_id.to_owned(), config.clone());
        Ok(())
    }

    fn remove(&self, tenant_id: &str) -> Result<(), CoreError> {
        self.configs.remove(tenant_id);
        Ok(())
    }
}

// ── File-backed store ────────────────────────────────────────────────

/// JSON-file-backed store: one document mapping tenant id to config,
/// loaded on open and written through on every mutation. The documents
/// are a handful of lines, so the synchronous write is negligible.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    cache: Mutex<HashMap<String, PrinterConfig>>,
}

impl JsonFileStore {
    /// Open (or create) the store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let path = path.into();
        let cache = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(|e| CoreError::Storage {
                message: format!("failed to read {}: {e}", path.display()),
            })?;
            serde_json::from_str(&raw).map_err(|e| CoreError::Storage {
                message: format!("malformed store file {}: {e}", path.display()),
            })?
        } else {
            HashMap::new()
        };

        Ok(Self {
            path,
            cache: Mutex::new(cache),
        })
    }

    fn persist(&self, cache: &HashMap<String, PrinterConfig>) -> Result<(), CoreError> {
        let raw = serde_json::to_string_pretty(cache).map_err(|e| CoreError::Storage {
            message: format!("failed to encode store: {e}"),
        })?;
        std::fs::write(&self.path, raw).map_err(|e| CoreError::Storage {
            message: format!("failed to write {}: {e}", self.path.display()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PrinterStore for JsonFileStore {
    fn get(&self, tenant_id: &str) -> Option<PrinterConfig> {
        self.cache
            .lock()
            .ok()
            .and_then(|c| c.get(tenant_id).cloned())
    }

    fn set(&self, tenant_id: &str, config: &PrinterConfig) -> Result<(), CoreError> {
        let mut cache = self.cache.lock().map_err(|_| CoreError::Storage {
            message: "store cache poisoned".to_owned(),
        })?;
        cache.insert(tenant_id.to_owned(), config.clone());
        self.persist(&cache)
    }

    fn remove(&self, tenant_id: &str) -> Result<(), CoreError> {
        let mut cache = self.cache.lock().map_err(|_| CoreError::Storage {
            message: "store cache poisoned".to_owned(),
        })?;
        if cache.remove(tenant_id).is_some() {
            self.persist(&cache)?;
        }
        Ok(())
    }
}
