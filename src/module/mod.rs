pub mod context;

pub use context::ProvisionContext;

use crate::config::node::{ConfigNode, NodePath};
use crate::error::ProvisionError;
use crate::registry::{Capability, ModuleId};
use bytes::Bytes;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub type Request = hyper::Request<Bytes>;
pub type Response = hyper::Response<Bytes>;

/// The fixed contract every module implements.
///
/// `configure` and `validate` run while a graph is being provisioned and must
/// not acquire resources: a failed build is simply dropped. Anything that
/// opens sockets, files or spawns tasks belongs in `activate`.
pub trait Module: Send + Sync {
    fn configure(&mut self, params: &Value, ctx: &ProvisionContext<'_>) -> Result<(), ProvisionError>;

    fn validate(&self) -> Result<(), ProvisionError> {
        Ok(())
    }

    fn activate(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn deactivate(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn as_handler(&self) -> Option<&dyn Handler> {
        None
    }

    fn as_storage(&self) -> Option<&dyn Storage> {
        None
    }
}

/// `http.handler` capability. `None` means "not mine, try the next one".
pub trait Handler: Send + Sync {
    fn handle<'a>(&'a self, req: &'a Request) -> BoxFuture<'a, Option<Response>>;
}

/// `storage` capability.
pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Option<Bytes>;
    fn put(&self, key: &str, value: Bytes);
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Deserialize a node's params into a module's own parameter struct.
pub fn parse_params<T: DeserializeOwned>(params: &Value) -> Result<T, ProvisionError> {
    serde_json::from_value(params.clone())
        .map_err(|e| ProvisionError::invalid(format!("invalid params: {}", e)))
}

/// A provisioned module bound to one configuration node.
pub struct Instance {
    module_id: ModuleId,
    name: Option<String>,
    path: NodePath,
    capabilities: Vec<Capability>,
    children: Vec<Arc<Instance>>,
    module: Box<dyn Module>,
    active: AtomicBool,
}

impl Instance {
    pub(crate) fn new(node: &ConfigNode, children: Vec<Arc<Instance>>, module: Box<dyn Module>) -> Self {
        Self {
            module_id: node.module_id().clone(),
            name: node.name().map(str::to_string),
            path: node.path().clone(),
            capabilities: node.descriptor().capabilities().to_vec(),
            children,
            module,
            active: AtomicBool::new(false),
        }
    }

    pub fn module_id(&self) -> &ModuleId {
        &self.module_id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn path(&self) -> &NodePath {
        &self.path
    }

    pub fn children(&self) -> &[Arc<Instance>] {
        &self.children
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn module(&self) -> &dyn Module {
        self.module.as_ref()
    }

    pub fn handler(&self) -> Option<&dyn Handler> {
        self.module.as_handler()
    }

    pub fn storage(&self) -> Option<&dyn Storage> {
        self.module.as_storage()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub(crate) async fn activate(&self) -> anyhow::Result<()> {
        self.module.activate().await?;
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// No-op for an instance that was never activated or is already down.
    pub(crate) async fn deactivate(&self) -> anyhow::Result<()> {
        if !self.active.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.module.deactivate().await
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("module_id", &self.module_id)
            .field("name", &self.name)
            .field("path", &self.path)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}
