use crate::error::ProvisionError;
use crate::module::{parse_params, Handler, Instance, Module, ProvisionContext, Request, Response};
use crate::registry::{Capability, ModuleDescriptor, ParamKind, ParamSchema};
use bytes::Bytes;
use futures::future::BoxFuture;
use hyper::{Method, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

pub const ID: &str = "http.handlers.kv";

pub fn descriptor() -> ModuleDescriptor {
    ModuleDescriptor::new(ID, || Box::<KvHandler>::default())
        .capability(Capability::HTTP_HANDLER)
        .params(
            ParamSchema::new()
                .required("storage", ParamKind::String)
                .optional("prefix", ParamKind::String),
        )
}

fn default_prefix() -> String {
    "/kv/".to_string()
}

#[derive(Debug, Deserialize)]
struct Params {
    storage: String,
    #[serde(default = "default_prefix")]
    prefix: String,
}

/// `GET|HEAD {prefix}{key}` reads, `PUT {prefix}{key}` writes into a named
/// storage instance.
#[derive(Default)]
pub struct KvHandler {
    prefix: String,
    storage: Option<Arc<Instance>>,
}

fn reply(status: StatusCode, body: impl Into<Bytes>) -> Response {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    response
}

impl Module for KvHandler {
    fn configure(&mut self, params: &Value, ctx: &ProvisionContext<'_>) -> Result<(), ProvisionError> {
        let params: Params = parse_params(params)?;
        self.storage = Some(ctx.resolve_capability(&params.storage, Capability::STORAGE)?);
        self.prefix = params.prefix;
        Ok(())
    }

    fn validate(&self) -> Result<(), ProvisionError> {
        if !self.prefix.starts_with('/') {
            return Err(ProvisionError::invalid(format!(
                "prefix '{}' must start with '/'",
                self.prefix
            )));
        }
        Ok(())
    }

    fn as_handler(&self) -> Option<&dyn Handler> {
        Some(self)
    }
}

impl Handler for KvHandler {
    fn handle<'a>(&'a self, req: &'a Request) -> BoxFuture<'a, Option<Response>> {
        Box::pin(async move {
            let key = req.uri().path().strip_prefix(self.prefix.as_str())?;
            let storage = self.storage.as_ref().and_then(|i| i.storage())?;

            if key.is_empty() {
                return Some(reply(StatusCode::BAD_REQUEST, "missing key\n"));
            }

            let response = match *req.method() {
                Method::GET => match storage.get(key) {
                    Some(value) => reply(StatusCode::OK, value),
                    None => reply(StatusCode::NOT_FOUND, format!("no value for '{}'\n", key)),
                },
                Method::HEAD => match storage.get(key) {
                    Some(_) => reply(StatusCode::OK, Bytes::new()),
                    None => reply(StatusCode::NOT_FOUND, Bytes::new()),
                },
                Method::PUT => {
                    storage.put(key, req.body().clone());
                    reply(StatusCode::NO_CONTENT, Bytes::new())
                }
                _ => {
                    let mut response = reply(StatusCode::METHOD_NOT_ALLOWED, Bytes::new());
                    response.headers_mut().insert(
                        hyper::header::ALLOW,
                        hyper::header::HeaderValue::from_static("GET, HEAD, PUT"),
                    );
                    response
                }
            };
            Some(response)
        })
    }
}
