// src/cache.rs
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ethers::types::Address;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::Result;
use crate::types::AccountConfig;

/// Durable storage for resolved smart account addresses.
pub trait AddressStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Address>>;

    fn set(&self, key: &str, address: Address) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Address>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AddressStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Address>> {
        Ok(self.entries.read().get(key).copied())
    }

    fn set(&self, key: &str, address: Address) -> Result<()> {
        self.entries.write().insert(key.to_string(), address);
        Ok(())
    }
}

/// JSON file of `key -> address`, rewritten on every insert.
pub struct FileStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, Address>>,
}

impl FileStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) if !raw.trim().is_empty() => serde_json::from_str(&raw)?,
            Ok(_) => HashMap::new(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, entries: RwLock::new(entries) })
    }
}

impl AddressStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Address>> {
        Ok(self.entries.read().get(key).copied())
    }

    fn set(&self, key: &str, address: Address) -> Result<()> {
        let mut entries = self.entries.write();
        entries.insert(key.to_string(), address);
        std::fs::write(&self.path, serde_json::to_vec_pretty(&*entries)?)?;
        Ok(())
    }
}

type PendingResolution = Shared<BoxFuture<'static, Result<Address>>>;

/// Read-through address cache that collapses concurrent lookups for the same account
/// configuration into a single backend request.
///
/// Failed lookups are never stored and leave no in-flight entry behind, so the next
/// caller starts a fresh request.
pub struct AddressResolver {
    store: Arc<dyn AddressStore>,
    in_flight: Arc<Mutex<HashMap<String, PendingResolution>>>,
}

impl AddressResolver {
    pub fn new(store: Arc<dyn AddressStore>) -> Self {
        Self { store, in_flight: Arc::new(Mutex::new(HashMap::new())) }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn store(&self) -> &Arc<dyn AddressStore> {
        &self.store
    }

    pub async fn resolve<F, Fut>(&self, config: &AccountConfig, fetch: F) -> Result<Address>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Address>> + Send + 'static,
    {
        let storage_key = config.storage_key();
        if let Some(address) = self.store.get(&storage_key)? {
            debug!("Smart account for {} served from store", storage_key);
            return Ok(address);
        }

        let flight_key = serde_json::to_string(config)?;
        let pending = {
            let mut in_flight = self.in_flight.lock();
            match in_flight.get(&flight_key) {
                Some(pending) => pending.clone(),
                None => {
                    let store = self.store.clone();
                    let registry = self.in_flight.clone();
                    let key = flight_key.clone();
                    let lookup = fetch();
                    let pending = async move {
                        let outcome = match lookup.await {
                            Ok(address) => store.set(&storage_key, address).map(|_| address),
                            Err(e) => Err(e),
                        };
                        registry.lock().remove(&key);
                        if let Ok(address) = &outcome {
                            info!("Resolved smart account {:?} for {}", address, storage_key);
                        }
                        outcome
                    }
                    .boxed()
                    .shared();
                    in_flight.insert(flight_key, pending.clone());
                    pending
                }
            }
        };
        pending.await
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.lock().len()
    }
}
