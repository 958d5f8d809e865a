use crate::error::ProvisionError;
use crate::module::{parse_params, Handler, Instance, Module, ProvisionContext, Request, Response};
use crate::registry::{Capability, ModuleDescriptor, ParamKind, ParamSchema};
use crate::utils::http::header_map;
use futures::future::BoxFuture;
use hyper::header::HeaderMap;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;

pub const ID: &str = "http.handlers.headers";

pub fn descriptor() -> ModuleDescriptor {
    ModuleDescriptor::new(ID, || Box::<Headers>::default())
        .capability(Capability::HTTP_HANDLER)
        .children(Capability::HTTP_HANDLER)
        .params(ParamSchema::new().optional("set", ParamKind::Object))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Params {
    set: Map<String, Value>,
}

/// Middleware: tries its children in order and stamps headers on the first
/// response produced.
#[derive(Default)]
pub struct Headers {
    set: HeaderMap,
    next: Vec<Arc<Instance>>,
}

impl Module for Headers {
    fn configure(&mut self, params: &Value, ctx: &ProvisionContext<'_>) -> Result<(), ProvisionError> {
        let params: Params = parse_params(params)?;
        self.set = header_map(&params.set).map_err(ProvisionError::invalid)?;
        self.next = ctx.children().to_vec();
        Ok(())
    }

    fn validate(&self) -> Result<(), ProvisionError> {
        if self.next.is_empty() {
            return Err(ProvisionError::invalid("at least one child handler is required"));
        }
        Ok(())
    }

    fn as_handler(&self) -> Option<&dyn Handler> {
        Some(self)
    }
}

impl Handler for Headers {
    fn handle<'a>(&'a self, req: &'a Request) -> BoxFuture<'a, Option<Response>> {
        Box::pin(async move {
            for child in &self.next {
                let Some(handler) = child.handler() else {
                    continue;
                };
                if let Some(mut response) = handler.handle(req).await {
                    for (name, value) in &self.set {
                        response.headers_mut().insert(name.clone(), value.clone());
                    }
                    return Some(response);
                }
            }
            None
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{Config, GraphBuilder};
    use crate::error::ProvisionError;
    use crate::modules;
    use crate::provision::provision;
    use bytes::Bytes;
    use serde_json::json;

    #[tokio::test]
    async fn test_first_child_response_gets_headers() {
        let registry = modules::standard_registry().unwrap();
        let config = Config::from_value(json!({"apps": [
            {"module": "http.handlers.headers", "params": {"set": {"x-served-by": "fe-host"}}, "children": [
                {"module": "http.handlers.static_response", "params": {"path": "/a", "body": "a"}},
                {"module": "http.handlers.static_response", "params": {"body": "b", "headers": {"x-served-by": "child"}}}
            ]}
        ]}))
        .unwrap();
        let graph = provision(&GraphBuilder::new(&registry).build(&config).unwrap(), 1).unwrap();

        let req = |path: &str| hyper::Request::builder().uri(path).body(Bytes::new()).unwrap();

        let a = graph.handle(&req("/a")).await;
        assert_eq!(a.body().as_ref(), b"a");
        assert_eq!(a.headers()["x-served-by"], "fe-host");

        let b = graph.handle(&req("/b")).await;
        assert_eq!(b.body().as_ref(), b"b");
        assert_eq!(b.headers()["x-served-by"], "fe-host");
    }

    #[test]
    fn test_requires_a_child() {
        let registry = modules::standard_registry().unwrap();
        let config = Config::from_value(json!({"apps": [{"module": "http.handlers.headers"}]})).unwrap();
        let err = provision(&GraphBuilder::new(&registry).build(&config).unwrap(), 1).unwrap_err();
        assert_eq!(err.source, ProvisionError::invalid("at least one child handler is required"));
    }
}
