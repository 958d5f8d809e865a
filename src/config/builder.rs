use super::node::{ConfigNode, NodeFields, NodePath};
use super::Config;
use crate::error::{NodeError, NodeErrorKind, ValidationError};
use crate::registry::{ModuleDescriptor, Registry};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Typed tree of module references produced from one document.
#[derive(Debug, Clone)]
pub struct ConfigTree {
    roots: Vec<ConfigNode>,
    drain_timeout: std::time::Duration,
}

impl ConfigTree {
    pub fn roots(&self) -> &[ConfigNode] {
        &self.roots
    }

    pub fn drain_timeout(&self) -> std::time::Duration {
        self.drain_timeout
    }

    /// Total number of nodes at every depth.
    pub fn len(&self) -> usize {
        fn count(nodes: &[ConfigNode]) -> usize {
            nodes.iter().map(|n| 1 + count(n.children())).sum()
        }
        count(&self.roots)
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

/// Structural validation of a document against the registry. Never
/// instantiates a module.
pub struct GraphBuilder<'r> {
    registry: &'r Registry,
}

struct Pass {
    names: HashMap<String, NodePath>,
    errors: Vec<NodeError>,
}

impl<'r> GraphBuilder<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    /// Build the tree, or report every malformed node at once.
    pub fn build(&self, config: &Config) -> Result<ConfigTree, ValidationError> {
        let mut pass = Pass {
            names: HashMap::new(),
            errors: Vec::new(),
        };

        let roots: Vec<ConfigNode> = config
            .apps
            .iter()
            .enumerate()
            .filter_map(|(i, raw)| self.build_node(raw, NodePath::root(i), None, &mut pass))
            .collect();

        if !pass.errors.is_empty() {
            debug!(errors = pass.errors.len(), "Configuration rejected");
            return Err(ValidationError {
                errors: pass.errors,
            });
        }

        Ok(ConfigTree {
            roots,
            drain_timeout: config.lifecycle.drain_timeout(),
        })
    }

    fn build_node(
        &self,
        raw: &Value,
        path: NodePath,
        parent: Option<&ModuleDescriptor>,
        pass: &mut Pass,
    ) -> Option<ConfigNode> {
        let raw = NodeFields::read(raw);
        for problem in &raw.problems {
            pass.errors.push(NodeError::new(
                path.clone(),
                NodeErrorKind::Malformed(problem.clone()),
            ));
        }

        let descriptor = match raw.module.map(|module| self.registry.lookup(module)) {
            Some(Ok(descriptor)) => Some(Arc::clone(descriptor)),
            Some(Err(e)) => {
                pass.errors
                    .push(NodeError::new(path.clone(), NodeErrorKind::Registry(e)));
                None
            }
            None => None,
        };

        if let Some(descriptor) = &descriptor {
            if let Some(expected) = parent.and_then(|p| p.child_capability()) {
                if !descriptor.has_capability(expected.as_str()) {
                    pass.errors.push(NodeError::new(
                        path.clone(),
                        NodeErrorKind::ChildCapability {
                            child: descriptor.id().clone(),
                            expected,
                        },
                    ));
                }
            }

            for issue in descriptor.schema().check(&raw.params) {
                pass.errors
                    .push(NodeError::new(path.clone(), NodeErrorKind::Params(issue)));
            }

            if !raw.children.is_empty() && descriptor.child_capability().is_none() {
                pass.errors.push(NodeError::new(
                    path.clone(),
                    NodeErrorKind::ChildrenNotAccepted(descriptor.id().clone()),
                ));
            }
        }

        if let Some(name) = raw.name {
            if name.is_empty() {
                pass.errors.push(NodeError::new(
                    path.clone(),
                    NodeErrorKind::Malformed("instance name must not be empty".to_string()),
                ));
            } else if let Some(first) = pass.names.get(name) {
                pass.errors.push(NodeError::new(
                    path.clone(),
                    NodeErrorKind::DuplicateName {
                        name: name.to_string(),
                        first: first.clone(),
                    },
                ));
            } else {
                pass.names.insert(name.to_string(), path.clone());
            }
        }

        // Children of a broken node are still checked so the report is complete.
        let children: Vec<ConfigNode> = raw
            .children
            .iter()
            .enumerate()
            .filter_map(|(i, child)| self.build_node(child, path.child(i), descriptor.as_deref(), pass))
            .collect();

        descriptor.map(|descriptor| ConfigNode {
            descriptor,
            name: raw.name.map(str::to_string),
            params: raw.params,
            children,
            path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegistryError;
    use crate::modules;
    use serde_json::json;

    fn registry() -> Arc<Registry> {
        modules::standard_registry().unwrap()
    }

    fn config(apps: serde_json::Value) -> Config {
        Config::from_value(json!({ "apps": apps })).unwrap()
    }

    #[test]
    fn test_builds_tree_in_document_order() {
        let registry = registry();
        let tree = GraphBuilder::new(&registry)
            .build(&config(json!([
                {"module": "storage.memory", "name": "store1"},
                {"module": "http.handlers.headers", "params": {"set": {"x-a": "1"}}, "children": [
                    {"module": "http.handlers.kv", "params": {"storage": "store1"}},
                    {"module": "http.handlers.static_response", "params": {"body": "fallback"}}
                ]}
            ])))
            .unwrap();

        assert_eq!(tree.len(), 4);
        let ids: Vec<&str> = tree.roots()[1]
            .children()
            .iter()
            .map(|c| c.module_id().as_str())
            .collect();
        assert_eq!(ids, vec!["http.handlers.kv", "http.handlers.static_response"]);
        assert_eq!(tree.roots()[1].children()[1].path().to_string(), "apps[1].children[1]");
    }

    #[test]
    fn test_collects_all_unknown_modules() {
        let registry = registry();
        let err = GraphBuilder::new(&registry)
            .build(&config(json!([
                {"module": "http.handlers.nope"},
                {"module": "http.handlers.headers", "children": [
                    {"module": "dns.providers.desec"}
                ]},
                {"module": "storage.s3"}
            ])))
            .unwrap_err();

        assert_eq!(
            err.unknown_modules(),
            vec!["http.handlers.nope", "dns.providers.desec", "storage.s3"]
        );
        assert_eq!(err.errors[1].path.to_string(), "apps[1].children[0]");
    }

    #[test]
    fn test_children_of_unknown_module_are_checked() {
        let registry = registry();
        let err = GraphBuilder::new(&registry)
            .build(&config(json!([
                {"module": "layer4.handlers.bouncer", "children": [
                    {"module": "http.handlers.static_response", "params": {"status": "200"}}
                ]}
            ])))
            .unwrap_err();

        assert_eq!(err.errors.len(), 2);
        assert!(matches!(
            err.errors[0].kind,
            NodeErrorKind::Registry(RegistryError::UnknownModule(_))
        ));
        assert_eq!(err.errors[1].path.to_string(), "apps[0].children[0]");
        assert!(matches!(err.errors[1].kind, NodeErrorKind::Params(_)));
    }

    #[test]
    fn test_param_type_errors() {
        let registry = registry();
        let err = GraphBuilder::new(&registry)
            .build(&config(json!([
                {"module": "tasks.heartbeat", "params": {"interval": 10}}
            ])))
            .unwrap_err();

        let messages: Vec<String> = err.errors.iter().map(|e| e.to_string()).collect();
        assert_eq!(
            messages,
            vec![
                "apps[0]: params.interval_ms: required parameter is missing".to_string(),
                "apps[0]: params.interval: unknown parameter".to_string(),
            ]
        );
    }

    #[test]
    fn test_child_capability_and_leaf_modules() {
        let registry = registry();
        let err = GraphBuilder::new(&registry)
            .build(&config(json!([
                {"module": "http.handlers.headers", "children": [
                    {"module": "storage.memory"}
                ]},
                {"module": "storage.memory", "children": [
                    {"module": "storage.memory"}
                ]}
            ])))
            .unwrap_err();

        assert!(matches!(
            &err.errors[0].kind,
            NodeErrorKind::ChildCapability { child, .. } if child.as_str() == "storage.memory"
        ));
        assert!(matches!(&err.errors[1].kind, NodeErrorKind::ChildrenNotAccepted(_)));
        assert_eq!(err.errors[1].path.to_string(), "apps[1]");
    }

    #[test]
    fn test_duplicate_instance_names() {
        let registry = registry();
        let err = GraphBuilder::new(&registry)
            .build(&config(json!([
                {"module": "storage.memory", "name": "store1"},
                {"module": "storage.memory", "name": "store1"}
            ])))
            .unwrap_err();

        assert_eq!(err.errors.len(), 1);
        assert_eq!(
            err.errors[0].to_string(),
            "apps[1]: instance name 'store1' is already declared at apps[0]"
        );
    }

    #[test]
    fn test_malformed_nodes_are_reported_with_their_paths() {
        let registry = registry();
        let err = GraphBuilder::new(&registry)
            .build(&config(json!([
                {"module": "storage.memory", "parameters": {}},
                {"modul": "http.handlers.kv"},
                {"module": "http.handlers.headers", "children": [
                    {"module": "http.handlers.static_response", "children": "none"}
                ]}
            ])))
            .unwrap_err();

        let messages: Vec<String> = err.errors.iter().map(|e| e.to_string()).collect();
        assert_eq!(
            messages,
            vec![
                "apps[0]: unknown field 'parameters', expected one of: module, name, params, children".to_string(),
                "apps[1]: unknown field 'modul', expected one of: module, name, params, children".to_string(),
                "apps[1]: missing field 'module'".to_string(),
                "apps[2].children[0]: children: expected array, got string".to_string(),
            ]
        );
        assert!(err.errors.iter().all(|e| matches!(e.kind, NodeErrorKind::Malformed(_))));
    }

    #[test]
    fn test_empty_document_is_valid() {
        let registry = registry();
        let tree = GraphBuilder::new(&registry).build(&Config::default()).unwrap();
        assert!(tree.is_empty());
    }
}
