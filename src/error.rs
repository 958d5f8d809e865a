use crate::config::node::NodePath;
use crate::lifecycle::LifecycleState;
use crate::registry::{Capability, ModuleId};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while populating or querying the module registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("module '{0}' is already registered")]
    DuplicateModule(ModuleId),

    #[error("invalid module id '{0}': expected dot-separated labels of [a-z0-9_]")]
    InvalidModuleId(String),

    #[error("unknown module '{0}'")]
    UnknownModule(String),
}

/// What is wrong with a single configuration node.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeErrorKind {
    #[error(transparent)]
    Registry(RegistryError),

    #[error("{0}")]
    Params(String),

    #[error("instance name '{name}' is already declared at {first}")]
    DuplicateName { name: String, first: NodePath },

    #[error("module '{child}' cannot be nested here: parent requires capability '{expected}'")]
    ChildCapability { child: ModuleId, expected: Capability },

    #[error("module '{0}' does not accept children")]
    ChildrenNotAccepted(ModuleId),

    #[error("{0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeError {
    pub path: NodePath,
    pub kind: NodeErrorKind,
}

impl NodeError {
    pub fn new(path: NodePath, kind: NodeErrorKind) -> Self {
        Self { path, kind }
    }
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.kind)
    }
}

/// Every structural problem found in one configuration document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub errors: Vec<NodeError>,
}

impl ValidationError {
    /// A failure that concerns the document as a whole (unparseable input,
    /// unknown top-level keys).
    pub fn document(message: impl Into<String>) -> Self {
        Self {
            errors: vec![NodeError::new(
                NodePath::document(),
                NodeErrorKind::Malformed(message.into()),
            )],
        }
    }

    /// Module ids the document referenced that the registry does not know.
    pub fn unknown_modules(&self) -> Vec<&str> {
        self.errors
            .iter()
            .filter_map(|e| match &e.kind {
                NodeErrorKind::Registry(RegistryError::UnknownModule(id)) => Some(id.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "configuration has {} error(s):", self.errors.len())?;
        for error in &self.errors {
            write!(f, "\n  {}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Returned by a module's `configure` or `validate`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProvisionError {
    #[error("{0}")]
    Invalid(String),

    #[error("unresolved reference to '{0}'")]
    UnresolvedReference(String),

    #[error("instance '{name}' does not provide capability '{expected}'")]
    WrongCapability { name: String, expected: Capability },
}

impl ProvisionError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

/// A provisioning error located in the configuration tree.
#[derive(Debug, Clone, Error)]
#[error("provisioning '{module}' at {path} failed: {source}")]
pub struct ProvisionFailure {
    pub path: NodePath,
    pub module: ModuleId,
    #[source]
    pub source: ProvisionError,
}

#[derive(Debug, Error)]
#[error("activating '{module}' at {path} failed: {source}")]
pub struct ActivationError {
    pub path: NodePath,
    pub module: ModuleId,
    #[source]
    pub source: anyhow::Error,
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: LifecycleState,
    },

    #[error("reload aborted before the new configuration went live")]
    Aborted,

    #[error(transparent)]
    Activation(#[from] ActivationError),
}

/// A superseded graph did not finish its in-flight work before the deadline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "graph generation {generation} still had {remaining} in-flight operation(s) after {timeout:?}; deactivating anyway"
)]
pub struct DrainTimeoutError {
    pub generation: u64,
    pub remaining: usize,
    pub timeout: Duration,
}

/// A listener the process serves on could not be set up.
#[derive(Debug, Error)]
#[error("Failed to bind {what} {address}")]
pub struct StartError {
    pub what: &'static str,
    pub address: String,
    #[source]
    pub source: std::io::Error,
}

impl StartError {
    pub fn new(what: &'static str, address: impl fmt::Display, source: std::io::Error) -> Self {
        Self {
            what,
            address: address.to_string(),
            source,
        }
    }
}

/// A running process refused a command sent over its admin socket.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RemoteError {
    pub message: String,
    pub exit_code: u8,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Provision(#[from] ProvisionFailure),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Provision,
    Runtime,
}

impl ErrorCategory {
    pub fn exit_code(self) -> u8 {
        match self {
            Self::Validation => 2,
            Self::Provision => 3,
            Self::Runtime => 4,
        }
    }
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) => ErrorCategory::Validation,
            Self::Provision(_) => ErrorCategory::Provision,
            Self::Registry(_) | Self::Lifecycle(_) => ErrorCategory::Runtime,
        }
    }
}

/// Process exit code for an error that reached the command line.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(e) = err.downcast_ref::<Error>() {
        return e.category().exit_code();
    }
    if let Some(e) = err.downcast_ref::<RemoteError>() {
        return e.exit_code;
    }
    if err.downcast_ref::<ValidationError>().is_some() {
        return ErrorCategory::Validation.exit_code();
    }
    if err.downcast_ref::<ProvisionFailure>().is_some() {
        return ErrorCategory::Provision.exit_code();
    }
    if err.downcast_ref::<LifecycleError>().is_some()
        || err.downcast_ref::<ActivationError>().is_some()
        || err.downcast_ref::<StartError>().is_some()
    {
        return ErrorCategory::Runtime.exit_code();
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_lists_every_node() {
        let err = ValidationError {
            errors: vec![
                NodeError::new(
                    NodePath::root(0),
                    NodeErrorKind::Registry(RegistryError::UnknownModule("a.b".to_string())),
                ),
                NodeError::new(
                    NodePath::root(1).child(2),
                    NodeErrorKind::Params("params.status: expected integer, got string".to_string()),
                ),
            ],
        };

        let text = err.to_string();
        assert!(text.starts_with("configuration has 2 error(s):"));
        assert!(text.contains("apps[0]: unknown module 'a.b'"));
        assert!(text.contains("apps[1].children[2]: params.status"));
        assert_eq!(err.unknown_modules(), vec!["a.b"]);
    }

    #[test]
    fn test_exit_codes_by_category() {
        let validation = anyhow::Error::new(ValidationError::document("bad"));
        assert_eq!(exit_code(&validation), 2);

        let provision = anyhow::Error::new(Error::Provision(ProvisionFailure {
            path: NodePath::root(0),
            module: ModuleId::from("storage.memory"),
            source: ProvisionError::UnresolvedReference("store1".to_string()),
        }));
        assert_eq!(exit_code(&provision), 3);

        let runtime = anyhow::Error::new(LifecycleError::Aborted).context("reload failed");
        assert_eq!(exit_code(&runtime), 4);

        let bind = anyhow::Error::new(StartError::new(
            "listener",
            "127.0.0.1:8080",
            std::io::Error::from(std::io::ErrorKind::AddrInUse),
        ));
        assert_eq!(format!("{:#}", bind), format!(
            "Failed to bind listener 127.0.0.1:8080: {}",
            std::io::Error::from(std::io::ErrorKind::AddrInUse)
        ));
        assert_eq!(exit_code(&bind), 4);

        assert_eq!(exit_code(&anyhow::anyhow!("io")), 1);
    }
}
