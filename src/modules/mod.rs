//! Modules shipped with the host binary.

pub mod headers;
pub mod heartbeat;
pub mod kv;
pub mod memory_storage;
pub mod static_response;

use crate::error::RegistryError;
use crate::registry::{Registry, RegistryBuilder};
use std::sync::Arc;

/// Register every standard module. Called once by the composition root.
pub fn register_standard(builder: &mut RegistryBuilder) -> Result<(), RegistryError> {
    builder.register(static_response::descriptor())?;
    builder.register(headers::descriptor())?;
    builder.register(memory_storage::descriptor())?;
    builder.register(kv::descriptor())?;
    builder.register(heartbeat::descriptor())?;
    Ok(())
}

pub fn standard_registry() -> Result<Arc<Registry>, RegistryError> {
    let mut builder = RegistryBuilder::new();
    register_standard(&mut builder)?;
    Ok(builder.seal())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registry_capabilities() {
        let registry = standard_registry().unwrap();
        assert_eq!(registry.len(), 5);
        assert_eq!(registry.list_by_capability("http.handler").len(), 3);
        assert_eq!(registry.list_by_capability("storage").len(), 1);
        assert_eq!(registry.list_by_capability("app").len(), 1);
    }

    #[test]
    fn test_registering_twice_fails() {
        let mut builder = RegistryBuilder::new();
        register_standard(&mut builder).unwrap();
        assert!(matches!(
            register_standard(&mut builder),
            Err(RegistryError::DuplicateModule(_))
        ));
        assert_eq!(builder.len(), 5);
    }
}
