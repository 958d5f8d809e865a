pub mod schema;

pub use schema::{ParamField, ParamKind, ParamSchema};

use crate::error::RegistryError;
use crate::module::Module;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

lazy_static! {
    static ref MODULE_ID_PATTERN: Regex =
        Regex::new(r"^[a-z0-9_]+(\.[a-z0-9_]+)*$").expect("module id pattern is valid");
}

/// Namespaced module identifier such as `http.handlers.static_response`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ModuleId(String);

impl ModuleId {
    pub fn parse(id: &str) -> Result<Self, RegistryError> {
        let id = Self(id.to_string());
        if id.is_valid() {
            Ok(id)
        } else {
            Err(RegistryError::InvalidModuleId(id.0))
        }
    }

    pub fn is_valid(&self) -> bool {
        MODULE_ID_PATTERN.is_match(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last label of the id.
    pub fn name(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }

    /// Everything before the last label; empty for single-label ids.
    pub fn namespace(&self) -> &str {
        self.0.rsplit_once('.').map(|(ns, _)| ns).unwrap_or("")
    }
}

impl From<&str> for ModuleId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ModuleId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for ModuleId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extension point a module can fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Capability(&'static str);

impl Capability {
    pub const HTTP_HANDLER: Capability = Capability("http.handler");
    pub const STORAGE: Capability = Capability("storage");
    pub const APP: Capability = Capability("app");

    pub const fn new(tag: &'static str) -> Self {
        Self(tag)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

pub type ModuleFactory = Arc<dyn Fn() -> Box<dyn Module> + Send + Sync>;

/// Everything the host needs to know about a module before instantiating it.
#[derive(Clone)]
pub struct ModuleDescriptor {
    id: ModuleId,
    factory: ModuleFactory,
    capabilities: Vec<Capability>,
    schema: ParamSchema,
    child_capability: Option<Capability>,
}

impl ModuleDescriptor {
    pub fn new<F>(id: impl Into<ModuleId>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Module> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            factory: Arc::new(factory),
            capabilities: Vec::new(),
            schema: ParamSchema::default(),
            child_capability: None,
        }
    }

    pub fn capability(mut self, capability: Capability) -> Self {
        if !self.capabilities.contains(&capability) {
            self.capabilities.push(capability);
        }
        self
    }

    pub fn params(mut self, schema: ParamSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Allow children, each of which must offer `capability`.
    pub fn children(mut self, capability: Capability) -> Self {
        self.child_capability = Some(capability);
        self
    }

    pub fn id(&self) -> &ModuleId {
        &self.id
    }

    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    pub fn has_capability(&self, tag: &str) -> bool {
        self.capabilities.iter().any(|c| c.as_str() == tag)
    }

    pub fn schema(&self) -> &ParamSchema {
        &self.schema
    }

    pub fn child_capability(&self) -> Option<Capability> {
        self.child_capability
    }

    /// Produce a fresh, unconfigured module value.
    pub fn instantiate(&self) -> Box<dyn Module> {
        (self.factory)()
    }
}

impl fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("id", &self.id)
            .field("capabilities", &self.capabilities)
            .field("schema", &self.schema)
            .field("child_capability", &self.child_capability)
            .finish_non_exhaustive()
    }
}

/// Write phase of the registry. Only exists during process initialization;
/// [`RegistryBuilder::seal`] consumes it.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    modules: Vec<Arc<ModuleDescriptor>>,
    index: HashMap<ModuleId, usize>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: ModuleDescriptor) -> Result<(), RegistryError> {
        if !descriptor.id.is_valid() {
            return Err(RegistryError::InvalidModuleId(descriptor.id.0));
        }
        if self.index.contains_key(&descriptor.id) {
            return Err(RegistryError::DuplicateModule(descriptor.id));
        }

        debug!(module = %descriptor.id, "Registered module");
        self.index.insert(descriptor.id.clone(), self.modules.len());
        self.modules.push(Arc::new(descriptor));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Freeze the table. The returned registry has no mutation API.
    pub fn seal(self) -> Arc<Registry> {
        Arc::new(Registry {
            modules: self.modules,
            index: self.index,
        })
    }
}

/// Read phase of the registry: immutable, shared, lock-free to read.
#[derive(Debug)]
pub struct Registry {
    modules: Vec<Arc<ModuleDescriptor>>,
    index: HashMap<ModuleId, usize>,
}

impl Registry {
    pub fn lookup(&self, id: &str) -> Result<&Arc<ModuleDescriptor>, RegistryError> {
        match self.index.get(id) {
            Some(&i) => Ok(&self.modules[i]),
            None if MODULE_ID_PATTERN.is_match(id) => {
                Err(RegistryError::UnknownModule(id.to_string()))
            }
            None => Err(RegistryError::InvalidModuleId(id.to_string())),
        }
    }

    /// Descriptors offering `tag`, in registration order.
    pub fn list_by_capability(&self, tag: &str) -> Vec<&Arc<ModuleDescriptor>> {
        self.modules
            .iter()
            .filter(|d| d.has_capability(tag))
            .collect()
    }

    /// All descriptors in registration order.
    pub fn modules(&self) -> impl Iterator<Item = &Arc<ModuleDescriptor>> {
        self.modules.iter()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProvisionError;
    use crate::module::ProvisionContext;
    use serde_json::Value;

    struct Noop;

    impl Module for Noop {
        fn configure(&mut self, _: &Value, _: &ProvisionContext<'_>) -> Result<(), ProvisionError> {
            Ok(())
        }
    }

    fn descriptor(id: &str) -> ModuleDescriptor {
        ModuleDescriptor::new(id, || Box::new(Noop))
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let mut builder = RegistryBuilder::new();
        builder
            .register(descriptor("storage.memory").capability(Capability::STORAGE))
            .unwrap();

        let err = builder
            .register(descriptor("storage.memory").capability(Capability::APP))
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateModule(ModuleId::from("storage.memory")));

        let registry = builder.seal();
        assert_eq!(registry.len(), 1);
        let kept = registry.lookup("storage.memory").unwrap();
        assert!(kept.has_capability("storage"));
        assert!(!kept.has_capability("app"));
    }

    #[test]
    fn test_invalid_ids_are_rejected() {
        let mut builder = RegistryBuilder::new();
        for id in ["", "Http.handlers", "http..x", ".x", "x.", "a-b"] {
            assert_eq!(
                builder.register(descriptor(id)),
                Err(RegistryError::InvalidModuleId(id.to_string())),
                "{id}"
            );
        }
        assert!(builder.is_empty());
    }

    #[test]
    fn test_lookup_unknown_module() {
        let registry = RegistryBuilder::new().seal();
        assert_eq!(
            registry.lookup("http.handlers.nope").unwrap_err(),
            RegistryError::UnknownModule("http.handlers.nope".to_string())
        );
        assert_eq!(
            registry.lookup("HTTP").unwrap_err(),
            RegistryError::InvalidModuleId("HTTP".to_string())
        );
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        let mut builder = RegistryBuilder::new();
        builder.register(descriptor("tasks.heartbeat")).unwrap();
        let registry = builder.seal();
        assert!(registry.lookup("tasks.heartbeat").is_ok());
        assert!(registry.lookup("tasks.Heartbeat").is_err());
    }

    #[test]
    fn test_list_by_capability_keeps_registration_order() {
        let mut builder = RegistryBuilder::new();
        builder
            .register(descriptor("http.handlers.b").capability(Capability::HTTP_HANDLER))
            .unwrap();
        builder
            .register(descriptor("storage.memory").capability(Capability::STORAGE))
            .unwrap();
        builder
            .register(descriptor("http.handlers.a").capability(Capability::HTTP_HANDLER))
            .unwrap();
        let registry = builder.seal();

        let ids: Vec<&str> = registry
            .list_by_capability("http.handler")
            .iter()
            .map(|d| d.id().as_str())
            .collect();
        assert_eq!(ids, vec!["http.handlers.b", "http.handlers.a"]);
        assert!(registry.list_by_capability("tls.issuer").is_empty());
    }

    #[test]
    fn test_module_id_parts() {
        let id = ModuleId::parse("http.handlers.static_response").unwrap();
        assert_eq!(id.name(), "static_response");
        assert_eq!(id.namespace(), "http.handlers");

        let id = ModuleId::parse("admin").unwrap();
        assert_eq!(id.name(), "admin");
        assert_eq!(id.namespace(), "");
    }

    #[test]
    fn test_descriptor_capabilities_deduplicated() {
        let d = descriptor("x.y")
            .capability(Capability::APP)
            .capability(Capability::APP);
        assert_eq!(d.capabilities(), &[Capability::APP]);
    }

    #[test]
    fn test_third_party_capability() {
        const TLS_ISSUER: Capability = Capability::new("tls.issuer");
        let mut builder = RegistryBuilder::new();
        builder
            .register(descriptor("tls.issuance.acme").capability(TLS_ISSUER))
            .unwrap();
        let registry = builder.seal();
        assert_eq!(registry.list_by_capability("tls.issuer").len(), 1);
    }
}
