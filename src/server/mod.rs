pub mod shutdown;

pub use shutdown::ShutdownCoordinator;

use crate::error::StartError;
use crate::host::Host;
use crate::metrics;
use crate::utils::http::{read_body_with_limit, MAX_BODY_SIZE};
use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

/// HTTP/1 listener routing every request into whichever graph is live when
/// the request arrives.
pub struct FrontDoor {
    host: Arc<Host>,
    shutdown: Arc<ShutdownCoordinator>,
    grace: Duration,
    max_body: usize,
}

impl FrontDoor {
    pub fn new(host: Arc<Host>, shutdown: Arc<ShutdownCoordinator>, grace: Duration) -> Self {
        Self {
            host,
            shutdown,
            grace,
            max_body: MAX_BODY_SIZE,
        }
    }

    pub fn with_max_body(mut self, max_body: usize) -> Self {
        self.max_body = max_body;
        self
    }

    /// Resolve `addr` (IP or hostname) and bind it.
    pub async fn bind(addr: &str) -> Result<TcpListener, StartError> {
        let resolved: SocketAddr = addr
            .to_socket_addrs()
            .map_err(|e| StartError::new("listener", addr, e))?
            .next()
            .ok_or_else(|| {
                let e = io::Error::new(io::ErrorKind::AddrNotAvailable, "no addresses resolved");
                StartError::new("listener", addr, e)
            })?;

        TcpListener::bind(resolved)
            .await
            .map_err(|e| StartError::new("listener", resolved, e))
    }

    /// Accept until shutdown is triggered, then wait (bounded) for open
    /// connections to finish.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        let local = listener.local_addr().context("Listener has no local address")?;
        info!("Server listening on http://{}", local);

        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, remote_addr)) => {
                            if self.shutdown.is_shutting_down() {
                                debug!("Rejecting new connection during shutdown from {}", remote_addr);
                                continue;
                            }

                            let server = Arc::clone(&self);
                            let connection = self.shutdown.connection();
                            tokio::spawn(async move {
                                server.serve_connection(stream, remote_addr).await;
                                drop(connection);
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                        }
                    }
                }

                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping listener");
                    break;
                }
            }
        }

        drop(listener);
        self.shutdown.wait_for_connections(self.grace).await;
        Ok(())
    }

    async fn serve_connection(self: Arc<Self>, stream: TcpStream, remote_addr: SocketAddr) {
        let io = TokioIo::new(stream);
        let server = Arc::clone(&self);

        let service = service_fn(move |req: Request<Incoming>| {
            let server = Arc::clone(&server);
            async move { server.handle_request(req).await }
        });

        if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
            debug!("Error serving connection from {}: {}", remote_addr, err);
        }
    }

    async fn handle_request(&self, req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
        let response = self.route(req).await;
        metrics::record_request(response.status().as_u16());
        Ok(response.map(Full::new))
    }

    async fn route(&self, req: Request<Incoming>) -> Response<Bytes> {
        // One load of the live pointer per request; the guard keeps that
        // graph from being deactivated until the response is built.
        let Some(graph) = self.host.orchestrator().acquire() else {
            return plain(StatusCode::SERVICE_UNAVAILABLE, "no configuration is live\n");
        };

        let (parts, body) = req.into_parts();
        let body = match read_body_with_limit(body, Some(self.max_body)).await {
            Ok(body) => body,
            Err(e) => {
                warn!("{:#}", e);
                return plain(StatusCode::PAYLOAD_TOO_LARGE, "request body too large\n");
            }
        };

        let req = Request::from_parts(parts, body);
        let response = graph.handle(&req).await;
        drop(graph);
        response
    }
}

fn plain(status: StatusCode, body: &'static str) -> Response<Bytes> {
    let mut response = Response::new(Bytes::from_static(body.as_bytes()));
    *response.status_mut() = status;
    response
}
