//! # Auth-Stripping Proxy
//!
//! Reverse proxy between the console and the test environment's API server.
//!
//! The console talks plain, unauthenticated HTTP to a loopback listener. Every
//! request is rewritten by the `Mangler` to target the API server and sent
//! through an `UpstreamTransport` that authenticates with the environment's
//! client certificate. The proxy is the only component holding that identity.

mod mangler;
mod server;
mod transport;

pub use mangler::Mangler;
pub use server::{bind_proxy_listener, router, ProxyServer};
pub use transport::UpstreamTransport;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid API server host {host:?}: {reason}")]
    InvalidHost { host: String, reason: String },
    #[error("failed to rewrite request URI: {0}")]
    Rewrite(String),
    #[error("invalid client key pair: {0}")]
    KeyPair(#[source] reqwest::Error),
    #[error("invalid CA certificate: {0}")]
    CaCertificate(#[source] reqwest::Error),
    #[error("failed to build upstream TLS client: {0}")]
    Tls(#[source] reqwest::Error),
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("proxy server error: {0}")]
    Serve(#[source] std::io::Error),
    #[error("failed to read request body: {0}")]
    RequestBody(#[source] axum::Error),
    #[error("request body exceeds {limit} bytes")]
    RequestTooLarge { limit: usize },
    #[error("upstream request failed: {0}")]
    Upstream(#[source] reqwest::Error),
}
