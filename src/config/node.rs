use crate::registry::schema::json_type_name;
use crate::registry::{ModuleDescriptor, ModuleId};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Position of a node in the document: `apps[1].children[0]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct NodePath(Vec<usize>);

impl NodePath {
    /// The document itself rather than any node in it.
    pub fn document() -> Self {
        Self(Vec::new())
    }

    pub fn root(index: usize) -> Self {
        Self(vec![index])
    }

    pub fn child(&self, index: usize) -> Self {
        let mut indices = self.0.clone();
        indices.push(index);
        Self(indices)
    }

    pub fn is_document(&self) -> bool {
        self.0.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut indices = self.0.iter();
        match indices.next() {
            None => write!(f, "<document>"),
            Some(first) => {
                write!(f, "apps[{}]", first)?;
                for index in indices {
                    write!(f, ".children[{}]", index)?;
                }
                Ok(())
            }
        }
    }
}

fn empty_params() -> Value {
    Value::Object(Default::default())
}

/// A node as written in the canonical document, before any registry lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct RawNode {
    pub module: String,
    pub name: Option<String>,
    pub params: Value,
    pub children: Vec<RawNode>,
}

impl RawNode {
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: None,
            params: empty_params(),
            children: Vec::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    pub fn with_child(mut self, child: RawNode) -> Self {
        self.children.push(child);
        self
    }
}

impl From<RawNode> for Value {
    fn from(node: RawNode) -> Self {
        let mut object = Map::new();
        object.insert("module".to_string(), Value::String(node.module));
        if let Some(name) = node.name {
            object.insert("name".to_string(), Value::String(name));
        }
        object.insert("params".to_string(), node.params);
        if !node.children.is_empty() {
            let children = node.children.into_iter().map(Value::from).collect();
            object.insert("children".to_string(), Value::Array(children));
        }
        Value::Object(object)
    }
}

const NODE_KEYS: [&str; 4] = ["module", "name", "params", "children"];

/// The fields of one node, read leniently so that every structural problem
/// in it is reported rather than only the first.
pub(crate) struct NodeFields<'v> {
    pub module: Option<&'v str>,
    pub name: Option<&'v str>,
    pub params: Value,
    pub children: &'v [Value],
    pub problems: Vec<String>,
}

impl<'v> NodeFields<'v> {
    pub fn read(value: &'v Value) -> Self {
        let mut fields = Self {
            module: None,
            name: None,
            params: empty_params(),
            children: &[],
            problems: Vec::new(),
        };

        let Some(object) = value.as_object() else {
            fields
                .problems
                .push(format!("expected a module node object, got {}", json_type_name(value)));
            return fields;
        };

        for key in object.keys() {
            if !NODE_KEYS.contains(&key.as_str()) {
                fields.problems.push(format!(
                    "unknown field '{}', expected one of: {}",
                    key,
                    NODE_KEYS.join(", ")
                ));
            }
        }

        match object.get("module") {
            Some(Value::String(module)) => fields.module = Some(module),
            Some(other) => fields
                .problems
                .push(format!("module: expected string, got {}", json_type_name(other))),
            None => fields.problems.push("missing field 'module'".to_string()),
        }

        match object.get("name") {
            None | Some(Value::Null) => {}
            Some(Value::String(name)) => fields.name = Some(name),
            Some(other) => fields
                .problems
                .push(format!("name: expected string, got {}", json_type_name(other))),
        }

        if let Some(params) = object.get("params") {
            fields.params = params.clone();
        }

        match object.get("children") {
            None | Some(Value::Null) => {}
            Some(Value::Array(children)) => fields.children = children,
            Some(other) => fields
                .problems
                .push(format!("children: expected array, got {}", json_type_name(other))),
        }

        fields
    }
}

/// A node whose type tag resolved against the registry and whose params
/// passed the structural check.
#[derive(Debug, Clone)]
pub struct ConfigNode {
    pub(crate) descriptor: Arc<ModuleDescriptor>,
    pub(crate) name: Option<String>,
    pub(crate) params: Value,
    pub(crate) children: Vec<ConfigNode>,
    pub(crate) path: NodePath,
}

impl ConfigNode {
    pub fn module_id(&self) -> &ModuleId {
        self.descriptor.id()
    }

    pub fn descriptor(&self) -> &Arc<ModuleDescriptor> {
        &self.descriptor
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn params(&self) -> &Value {
        &self.params
    }

    pub fn children(&self) -> &[ConfigNode] {
        &self.children
    }

    pub fn path(&self) -> &NodePath {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_path_display() {
        assert_eq!(NodePath::document().to_string(), "<document>");
        assert_eq!(NodePath::root(2).to_string(), "apps[2]");
        assert_eq!(NodePath::root(0).child(1).child(3).to_string(), "apps[0].children[1].children[3]");
    }

    #[test]
    fn test_raw_node_into_value() {
        let node = RawNode::new("http.handlers.headers")
            .named("edge")
            .with_child(RawNode::new("http.handlers.static_response"));
        assert_eq!(
            Value::from(node),
            json!({
                "module": "http.handlers.headers",
                "name": "edge",
                "params": {},
                "children": [{"module": "http.handlers.static_response", "params": {}}]
            })
        );
    }

    #[test]
    fn test_node_fields_defaults() {
        let value = json!({"module": "storage.memory"});
        let fields = NodeFields::read(&value);
        assert_eq!(fields.module, Some("storage.memory"));
        assert_eq!(fields.params, json!({}));
        assert!(fields.children.is_empty());
        assert!(fields.problems.is_empty());
    }

    #[test]
    fn test_node_fields_reports_every_problem() {
        let value = json!({"modul": "storage.memory", "name": 7, "children": {}});
        let fields = NodeFields::read(&value);
        assert_eq!(
            fields.problems,
            vec![
                "unknown field 'modul', expected one of: module, name, params, children".to_string(),
                "missing field 'module'".to_string(),
                "name: expected string, got integer".to_string(),
                "children: expected array, got object".to_string(),
            ]
        );
    }

    #[test]
    fn test_node_fields_rejects_non_object() {
        let value = json!("storage.memory");
        let fields = NodeFields::read(&value);
        assert_eq!(fields.problems, vec!["expected a module node object, got string".to_string()]);
    }
}
