use crate::error::ProvisionError;
use crate::module::{parse_params, Module, ProvisionContext, Storage};
use crate::registry::{Capability, ModuleDescriptor, ParamKind, ParamSchema};
use bytes::Bytes;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

pub const ID: &str = "storage.memory";

pub fn descriptor() -> ModuleDescriptor {
    ModuleDescriptor::new(ID, || Box::<MemoryStorage>::default())
        .capability(Capability::STORAGE)
        .params(ParamSchema::new().optional("entries", ParamKind::Object))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Params {
    entries: HashMap<String, String>,
}

/// Process-local key/value store. Contents live and die with the graph.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, Bytes>>,
}

impl Module for MemoryStorage {
    fn configure(&mut self, params: &Value, _ctx: &ProvisionContext<'_>) -> Result<(), ProvisionError> {
        let params: Params = parse_params(params)?;
        *self.entries.get_mut() = params
            .entries
            .into_iter()
            .map(|(k, v)| (k, Bytes::from(v)))
            .collect();
        Ok(())
    }

    fn as_storage(&self) -> Option<&dyn Storage> {
        Some(self)
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Option<Bytes> {
        self.entries.read().get(key).cloned()
    }

    fn put(&self, key: &str, value: Bytes) {
        self.entries.write().insert(key.to_string(), value);
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::node::NodePath;
    use serde_json::json;

    fn configured(params: Value) -> Result<MemoryStorage, ProvisionError> {
        let path = NodePath::root(0);
        let names = HashMap::new();
        let mut module = MemoryStorage::default();
        module.configure(&params, &ProvisionContext::new(&path, &[], &names))?;
        Ok(module)
    }

    #[test]
    fn test_seeded_entries() {
        let storage = configured(json!({"entries": {"greeting": "hello"}})).unwrap();
        assert_eq!(storage.get("greeting"), Some(Bytes::from("hello")));
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn test_put_overwrites() {
        let storage = configured(json!({})).unwrap();
        assert!(storage.is_empty());
        storage.put("k", Bytes::from("1"));
        storage.put("k", Bytes::from("2"));
        assert_eq!(storage.get("k"), Some(Bytes::from("2")));
        assert_eq!(storage.get("missing"), None);
    }

    #[test]
    fn test_entries_must_be_strings() {
        assert!(configured(json!({"entries": {"n": 1}})).is_err());
    }
}
