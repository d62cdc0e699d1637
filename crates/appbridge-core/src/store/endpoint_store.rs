//! Endpoint id assignment and persistence.

use super::backend::RecordBackend;
use crate::config::StoreConfig;
use crate::error::{BridgeError, Result};
use crate::models::{ContentApp, EndpointId, EndpointRecord};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use tracing::{debug, info, warn};

/// Durable mapping from content-app name to its endpoint record.
///
/// The store is the only party that hands out endpoint ids, which keeps ids
/// unique across records. Every mutation is written through to the backend
/// before the in-memory view changes.
pub struct EndpointStore {
    backend: Box<dyn RecordBackend>,
    records: RwLock<HashMap<String, EndpointRecord>>,
    first_dynamic_id: u16,
}

impl EndpointStore {
    /// Open the store and load every record from the backend.
    ///
    /// A record that fails to parse is logged and skipped without affecting
    /// the others. If two records claim the same endpoint id, the first one
    /// in key order keeps it and the other is loaded unassigned.
    pub fn open(backend: Box<dyn RecordBackend>) -> Result<Self> {
        Self::with_first_dynamic_id(backend, StoreConfig::FIRST_DYNAMIC_ENDPOINT_ID)
    }

    /// Open the store with a custom start of the dynamic endpoint range.
    pub fn with_first_dynamic_id(
        backend: Box<dyn RecordBackend>,
        first_dynamic_id: u16,
    ) -> Result<Self> {
        let mut entries = backend.load_all()?;
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut records = HashMap::new();
        let mut claimed: HashMap<EndpointId, String> = HashMap::new();
        for (key, raw) in entries {
            let mut record = match EndpointRecord::decode(&raw) {
                Ok(record) => record,
                Err(e) => {
                    let err = BridgeError::RecordCorrupt {
                        key: key.clone(),
                        message: e.to_string(),
                    };
                    warn!("Skipping endpoint record: {}", err);
                    continue;
                }
            };

            if record.endpoint_id.is_valid() {
                if let Some(owner) = claimed.get(&record.endpoint_id) {
                    warn!(
                        "Endpoint {} claimed by both {} and {}; {} loads unassigned",
                        record.endpoint_id, owner, key, key
                    );
                    record.endpoint_id = EndpointId::INVALID;
                } else {
                    claimed.insert(record.endpoint_id, key.clone());
                }
            }
            records.insert(key, record);
        }

        info!("Loaded {} endpoint records", records.len());

        Ok(Self {
            backend,
            records: RwLock::new(records),
            first_dynamic_id,
        })
    }

    /// Immutable snapshot of every persisted record.
    pub fn get_all_persisted(&self) -> HashMap<String, EndpointRecord> {
        self.records
            .read()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn get(&self, name: &str) -> Option<EndpointRecord> {
        self.records
            .read()
            .ok()
            .and_then(|records| records.get(name).cloned())
    }

    /// Find the app name and record holding an endpoint id.
    pub fn find_by_endpoint(&self, endpoint_id: EndpointId) -> Option<(String, EndpointRecord)> {
        if !endpoint_id.is_valid() {
            return None;
        }
        self.records.read().ok().and_then(|records| {
            records
                .iter()
                .find(|(_, record)| record.endpoint_id == endpoint_id)
                .map(|(name, record)| (name.clone(), record.clone()))
        })
    }

    /// Upsert the record for `app.name`.
    ///
    /// The app's endpoint id must be either unassigned, in which case any id
    /// already on record is kept, or exactly the id this store assigned to
    /// the app. Any other id is rejected; ids come from
    /// [`assign_endpoint_id`](Self::assign_endpoint_id).
    pub fn persist(&self, app: &ContentApp) -> Result<()> {
        let mut records = self.records.write().map_err(|_| lock_poisoned())?;

        let stored_id = records
            .get(&app.name)
            .map(|r| r.endpoint_id)
            .unwrap_or(EndpointId::INVALID);

        let mut record = app.to_record();
        if !record.endpoint_id.is_valid() {
            record.endpoint_id = stored_id;
        } else if record.endpoint_id != stored_id {
            if let Some((owner, _)) = records
                .iter()
                .find(|(name, r)| r.endpoint_id == record.endpoint_id && *name != &app.name)
            {
                return Err(BridgeError::EndpointConflict {
                    endpoint_id: record.endpoint_id,
                    owner: owner.clone(),
                });
            }
            return Err(BridgeError::Validation {
                field: "endpoint_id".to_string(),
                message: format!(
                    "endpoint {} was not assigned to {} by the store",
                    record.endpoint_id, app.name
                ),
            });
        }

        self.write_locked(&mut records, &app.name, record)
    }

    /// Return the app's endpoint id, assigning the lowest free one if needed.
    ///
    /// An app that already holds an id keeps it; its descriptive fields are
    /// refreshed. The assignment is durable before this returns.
    pub fn assign_endpoint_id(&self, app: &ContentApp) -> Result<EndpointId> {
        let mut records = self.records.write().map_err(|_| lock_poisoned())?;

        let mut record = app.to_record();
        if let Some(existing) = records.get(&app.name).filter(|r| r.endpoint_id.is_valid()) {
            record.endpoint_id = existing.endpoint_id;
            let endpoint_id = record.endpoint_id;
            if records.get(&app.name) != Some(&record) {
                self.write_locked(&mut records, &app.name, record)?;
            }
            return Ok(endpoint_id);
        }

        let used: HashSet<EndpointId> = records.values().map(|r| r.endpoint_id).collect();
        let endpoint_id = (self.first_dynamic_id..=StoreConfig::MAX_ENDPOINT_ID)
            .map(EndpointId::new)
            .find(|id| !used.contains(id))
            .ok_or(BridgeError::EndpointSpaceExhausted)?;

        record.endpoint_id = endpoint_id;
        self.write_locked(&mut records, &app.name, record)?;
        info!("Assigned endpoint {} to {}", endpoint_id, app.name);
        Ok(endpoint_id)
    }

    /// Explicitly forget an app's record, freeing its endpoint id.
    pub fn reset(&self, name: &str) -> Result<bool> {
        let mut records = self.records.write().map_err(|_| lock_poisoned())?;
        let removed = self.backend.remove(name)?;
        if records.remove(name).is_some() || removed {
            info!("Reset endpoint record for {}", name);
            return Ok(true);
        }
        Ok(false)
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn write_locked(
        &self,
        records: &mut HashMap<String, EndpointRecord>,
        name: &str,
        record: EndpointRecord,
    ) -> Result<()> {
        let encoded = record.encode()?;
        self.backend.put(name, &encoded)?;
        debug!("Persisted endpoint record for {}: {}", name, encoded);
        records.insert(name.to_string(), record);
        Ok(())
    }
}

fn lock_poisoned() -> BridgeError {
    BridgeError::Other("Endpoint store lock poisoned".to_string())
}
