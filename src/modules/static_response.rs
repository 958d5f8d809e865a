use crate::error::ProvisionError;
use crate::module::{parse_params, Handler, Module, ProvisionContext, Request, Response};
use crate::registry::{Capability, ModuleDescriptor, ParamKind, ParamSchema};
use crate::utils::http::header_map;
use bytes::Bytes;
use futures::future::BoxFuture;
use hyper::header::HeaderMap;
use hyper::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};

pub const ID: &str = "http.handlers.static_response";

pub fn descriptor() -> ModuleDescriptor {
    ModuleDescriptor::new(ID, || Box::<StaticResponse>::default())
        .capability(Capability::HTTP_HANDLER)
        .params(
            ParamSchema::new()
                .optional("status", ParamKind::Integer)
                .optional("body", ParamKind::String)
                .optional("headers", ParamKind::Object)
                .optional("path", ParamKind::String),
        )
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct Params {
    status: i64,
    body: String,
    headers: Map<String, Value>,
    path: Option<String>,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            status: 200,
            body: String::new(),
            headers: Map::new(),
            path: None,
        }
    }
}

/// Answers every matching request with the same status, headers and body.
#[derive(Debug, Default)]
pub struct StaticResponse {
    status: i64,
    body: Bytes,
    headers: HeaderMap,
    path: Option<String>,
}

impl Module for StaticResponse {
    fn configure(&mut self, params: &Value, _ctx: &ProvisionContext<'_>) -> Result<(), ProvisionError> {
        let params: Params = parse_params(params)?;
        self.headers = header_map(&params.headers).map_err(ProvisionError::invalid)?;
        self.status = params.status;
        self.body = Bytes::from(params.body);
        self.path = params.path;
        Ok(())
    }

    fn validate(&self) -> Result<(), ProvisionError> {
        if !(100..=599).contains(&self.status) {
            return Err(ProvisionError::invalid(format!(
                "status {} is outside 100..=599",
                self.status
            )));
        }
        Ok(())
    }

    fn as_handler(&self) -> Option<&dyn Handler> {
        Some(self)
    }
}

impl Handler for StaticResponse {
    fn handle<'a>(&'a self, req: &'a Request) -> BoxFuture<'a, Option<Response>> {
        Box::pin(async move {
            if let Some(prefix) = &self.path {
                if !req.uri().path().starts_with(prefix.as_str()) {
                    return None;
                }
            }

            let mut response = Response::new(self.body.clone());
            // validate() keeps the status in range
            *response.status_mut() = StatusCode::from_u16(self.status as u16).unwrap_or(StatusCode::OK);
            response.headers_mut().extend(self.headers.clone());
            Some(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::node::NodePath;
    use serde_json::json;
    use std::collections::HashMap;

    fn configured(params: Value) -> Result<StaticResponse, ProvisionError> {
        let path = NodePath::root(0);
        let names = HashMap::new();
        let ctx = ProvisionContext::new(&path, &[], &names);
        let mut module = StaticResponse::default();
        module.configure(&params, &ctx)?;
        module.validate()?;
        Ok(module)
    }

    fn request(path: &str) -> Request {
        hyper::Request::builder().uri(path).body(Bytes::new()).unwrap()
    }

    #[tokio::test]
    async fn test_defaults_to_200_with_empty_body() {
        let module = configured(json!({})).unwrap();
        let response = module.handle(&request("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.body().is_empty());
    }

    #[tokio::test]
    async fn test_status_headers_and_body() {
        let module = configured(json!({
            "status": 418,
            "body": "teapot",
            "headers": {"content-type": "text/plain"}
        }))
        .unwrap();

        let response = module.handle(&request("/brew")).await.unwrap();
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(response.headers()["content-type"], "text/plain");
        assert_eq!(response.body().as_ref(), b"teapot");
    }

    #[tokio::test]
    async fn test_path_prefix() {
        let module = configured(json!({"path": "/api"})).unwrap();
        assert!(module.handle(&request("/api/v1")).await.is_some());
        assert!(module.handle(&request("/other")).await.is_none());
    }

    #[test]
    fn test_status_out_of_range() {
        let err = configured(json!({"status": 42})).unwrap_err();
        assert_eq!(err.to_string(), "status 42 is outside 100..=599");
    }

    #[test]
    fn test_header_values_must_be_strings() {
        assert!(configured(json!({"headers": {"x-n": 1}})).is_err());
    }
}
