//! # Proxy Server
//!
//! Loopback HTTP listener forwarding every request to the API server.
//!
//! Inbound credentials are never looked at: the `Authorization` header the
//! console sends carries a placeholder token and is passed through untouched,
//! while the upstream connection authenticates with the client certificate.
//! Response bodies are streamed so watch requests keep flowing. Requests asking
//! for a protocol upgrade keep their `Upgrade` header, and once the API server
//! switches protocols the two connections are bridged byte for byte.

use super::{Mangler, ProxyError, UpstreamTransport};
use crate::constants::{
    CI_PROXY_LISTEN_ADDR, DEFAULT_PROXY_LISTEN_ADDR, MAX_REQUEST_BODY_BYTES,
    PROXY_SHUTDOWN_TIMEOUT_SECS,
};
use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::{CONNECTION, HOST, UPGRADE};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use http_body_util::LengthLimitError;
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Headers that only describe a single connection and are never forwarded
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const X_FORWARDED_FOR: &str = "x-forwarded-for";

#[derive(Clone)]
struct ProxyState {
    mangler: Arc<Mangler>,
    transport: UpstreamTransport,
}

/// Router forwarding every path and method upstream
pub fn router(mangler: Mangler, transport: UpstreamTransport) -> Router {
    let state = ProxyState {
        mangler: Arc::new(mangler),
        transport,
    };

    Router::new()
        .fallback(forward)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Bind the proxy listener
///
/// In CI the OS picks a free port so parallel runs do not collide.
pub async fn bind_proxy_listener(ci: bool) -> Result<TcpListener, ProxyError> {
    let addr = if ci {
        CI_PROXY_LISTEN_ADDR
    } else {
        DEFAULT_PROXY_LISTEN_ADDR
    };

    TcpListener::bind(addr)
        .await
        .map_err(|source| ProxyError::Bind {
            addr: addr.to_string(),
            source,
        })
}

async fn forward(State(state): State<ProxyState>, request: Request) -> Response {
    match forward_request(&state, request).await {
        Ok(response) => response,
        Err(e) => {
            warn!("Proxy error: {}", e);
            (error_status(&e), e.to_string()).into_response()
        }
    }
}

fn error_status(error: &ProxyError) -> StatusCode {
    match error {
        ProxyError::RequestTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        _ => StatusCode::BAD_GATEWAY,
    }
}

async fn forward_request(state: &ProxyState, request: Request) -> Result<Response, ProxyError> {
    let (mut parts, body) = request.into_parts();
    info!("Proxy request: {}", parts.uri.path());

    let upgrade = requested_upgrade(&parts.headers);
    let on_upgrade = parts
        .extensions
        .remove::<OnUpgrade>()
        .filter(|_| upgrade.is_some());

    let target = state.mangler.rewrite(&parts.uri)?;

    let mut headers = parts.headers;
    strip_hop_by_hop(&mut headers);
    if let Some(protocol) = upgrade {
        headers.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
        headers.insert(UPGRADE, protocol);
    }
    let host = HeaderValue::from_str(state.mangler.host())
        .map_err(|e| ProxyError::Rewrite(e.to_string()))?;
    headers.insert(HOST, host);
    if let Some(ConnectInfo(peer)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
        append_forwarded_for(&mut headers, peer.ip());
    }

    let body = axum::body::to_bytes(body, MAX_REQUEST_BODY_BYTES)
        .await
        .map_err(body_error)?;

    let mut upstream = state
        .transport
        .client()
        .request(parts.method, target.to_string())
        .headers(headers);
    if !body.is_empty() {
        upstream = upstream.body(body);
    }

    let response = upstream.send().await.map_err(ProxyError::Upstream)?;
    let status = response.status();
    debug!("Upstream answered {} for {}", status, target);

    if status == StatusCode::SWITCHING_PROTOCOLS {
        if let Some(on_upgrade) = on_upgrade {
            return bridge_upgrade(response, on_upgrade).await;
        }
    }

    let mut response_headers = response.headers().clone();
    strip_hop_by_hop(&mut response_headers);

    let mut forwarded = Response::new(Body::from_stream(response.bytes_stream()));
    *forwarded.status_mut() = status;
    *forwarded.headers_mut() = response_headers;
    Ok(forwarded)
}

fn body_error(error: axum::Error) -> ProxyError {
    let too_large = std::error::Error::source(&error)
        .is_some_and(|inner| inner.is::<LengthLimitError>());
    if too_large {
        ProxyError::RequestTooLarge {
            limit: MAX_REQUEST_BODY_BYTES,
        }
    } else {
        ProxyError::RequestBody(error)
    }
}

/// Protocol the client asks to switch to, if `Connection` lists `upgrade`
fn requested_upgrade(headers: &HeaderMap) -> Option<HeaderValue> {
    let wants_upgrade = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));

    headers.get(UPGRADE).filter(|_| wants_upgrade).cloned()
}

/// Answer 101 with the upstream's headers and splice both connections
async fn bridge_upgrade(
    response: reqwest::Response,
    on_upgrade: OnUpgrade,
) -> Result<Response, ProxyError> {
    let mut switching = Response::new(Body::empty());
    *switching.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    *switching.headers_mut() = response.headers().clone();

    let mut upstream = response.upgrade().await.map_err(ProxyError::Upstream)?;

    tokio::spawn(async move {
        match on_upgrade.await {
            Ok(inbound) => {
                let mut inbound = TokioIo::new(inbound);
                match tokio::io::copy_bidirectional(&mut inbound, &mut upstream).await {
                    Ok((sent, received)) => debug!(
                        "Upgraded connection closed, {} bytes sent, {} bytes received",
                        sent, received
                    ),
                    Err(e) => debug!("Upgraded connection ended: {}", e),
                }
            }
            Err(e) => warn!("Failed to upgrade inbound connection: {}", e),
        }
    });

    Ok(switching)
}

/// Remove hop-by-hop headers, including any named by `Connection`
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(*name);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, peer: IpAddr) {
    let value = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(existing) => format!("{existing}, {peer}"),
        None => peer.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

/// A running proxy
#[derive(Debug)]
pub struct ProxyServer {
    local_addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<std::io::Result<()>>,
}

impl ProxyServer {
    /// Serve the proxy on an already bound listener
    pub fn start(
        listener: TcpListener,
        mangler: Mangler,
        transport: UpstreamTransport,
    ) -> Result<Self, ProxyError> {
        let local_addr = listener.local_addr().map_err(ProxyError::Serve)?;
        let app = router(mangler, transport);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
        });

        info!("Proxy listening on {}", local_addr);
        Ok(Self {
            local_addr,
            shutdown_tx,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Base URL the console should use as its API server
    pub fn url(&self) -> String {
        format!("http://{}/", self.local_addr)
    }

    /// Stop accepting connections and drain in-flight requests
    ///
    /// Long-running watches would keep the server alive forever, so whatever
    /// is still open after the drain timeout is aborted.
    pub async fn shutdown(self) -> Result<(), ProxyError> {
        let ProxyServer {
            local_addr,
            shutdown_tx,
            mut task,
        } = self;

        let _ = shutdown_tx.send(());
        let timeout = Duration::from_secs(PROXY_SHUTDOWN_TIMEOUT_SECS);
        match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(result)) => {
                info!("Proxy on {} stopped", local_addr);
                result.map_err(ProxyError::Serve)
            }
            Ok(Err(e)) => {
                warn!("Proxy task on {} ended abnormally: {}", local_addr, e);
                Ok(())
            }
            Err(_) => {
                warn!(
                    "Proxy on {} did not drain within {}s, giving up on open connections",
                    local_addr, PROXY_SHUTDOWN_TIMEOUT_SECS
                );
                task.abort();
                Ok(())
            }
        }
    }
}
