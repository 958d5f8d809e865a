pub mod graph;

pub use graph::InstanceGraph;

use crate::config::{ConfigNode, ConfigTree};
use crate::error::{ProvisionError, ProvisionFailure};
use crate::module::{Instance, ProvisionContext};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Turn a validated tree into an [`InstanceGraph`].
///
/// Nodes are provisioned post-order so a parent sees its children already
/// built, and named instances become resolvable the moment they are built.
/// The first failure discards everything built so far.
pub fn provision(tree: &ConfigTree, generation: u64) -> Result<InstanceGraph, ProvisionFailure> {
    let mut resolver = Resolver {
        names: HashMap::new(),
        order: Vec::with_capacity(tree.len()),
    };

    let roots = tree
        .roots()
        .iter()
        .map(|node| resolver.build(node))
        .collect::<Result<Vec<_>, _>>()?;

    debug!(generation, instances = resolver.order.len(), "Provisioned instance graph");

    Ok(InstanceGraph::new(
        generation,
        roots,
        resolver.order,
        resolver.names,
        tree.drain_timeout(),
    ))
}

struct Resolver {
    names: HashMap<String, Arc<Instance>>,
    order: Vec<Arc<Instance>>,
}

impl Resolver {
    fn build(&mut self, node: &ConfigNode) -> Result<Arc<Instance>, ProvisionFailure> {
        let children = node
            .children()
            .iter()
            .map(|child| self.build(child))
            .collect::<Result<Vec<_>, _>>()?;

        let fail = |source: ProvisionError| ProvisionFailure {
            path: node.path().clone(),
            module: node.module_id().clone(),
            source,
        };

        let mut module = node.descriptor().instantiate();
        {
            let ctx = ProvisionContext::new(node.path(), &children, &self.names);
            module.configure(node.params(), &ctx).map_err(fail)?;
        }
        module.validate().map_err(fail)?;

        let instance = Arc::new(Instance::new(node, children, module));
        if let Some(name) = node.name() {
            self.names.insert(name.to_string(), Arc::clone(&instance));
        }
        self.order.push(Arc::clone(&instance));
        Ok(instance)
    }
}
