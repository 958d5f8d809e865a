use super::Instance;
use crate::config::node::NodePath;
use crate::error::ProvisionError;
use crate::registry::Capability;
use std::collections::HashMap;
use std::sync::Arc;

/// What a module can see while it is being configured: its own already
/// provisioned children and every named instance built before it.
pub struct ProvisionContext<'a> {
    path: &'a NodePath,
    children: &'a [Arc<Instance>],
    names: &'a HashMap<String, Arc<Instance>>,
}

impl<'a> ProvisionContext<'a> {
    pub(crate) fn new(
        path: &'a NodePath,
        children: &'a [Arc<Instance>],
        names: &'a HashMap<String, Arc<Instance>>,
    ) -> Self {
        Self {
            path,
            children,
            names,
        }
    }

    pub fn path(&self) -> &NodePath {
        self.path
    }

    pub fn children(&self) -> &[Arc<Instance>] {
        self.children
    }

    /// Look up a named instance. Only instances earlier in provisioning order
    /// are visible, so forward references fail.
    pub fn resolve(&self, name: &str) -> Result<Arc<Instance>, ProvisionError> {
        self.names
            .get(name)
            .cloned()
            .ok_or_else(|| ProvisionError::UnresolvedReference(name.to_string()))
    }

    pub fn resolve_capability(
        &self,
        name: &str,
        capability: Capability,
    ) -> Result<Arc<Instance>, ProvisionError> {
        let instance = self.resolve(name)?;
        if !instance.has_capability(capability) {
            return Err(ProvisionError::WrongCapability {
                name: name.to_string(),
                expected: capability,
            });
        }
        Ok(instance)
    }
}
