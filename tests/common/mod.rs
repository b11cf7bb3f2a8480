//! Common test utilities
//!
//! Provides rustls crypto provider setup, a throwaway PKI, a fake test
//! environment and small upstream servers for the proxy tests.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{HeaderMap, Method, Uri};
use axum::Router;
use console_testenv::environment::{
    ConnectionConfig, EnvironmentError, EnvironmentOptions, TestEnvironment, TlsClientConfig,
};
use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair,
    SanType,
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_rustls::rustls;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio_rustls::TlsAcceptor;
use zeroize::Zeroizing;

static RUSTLS_INIT: Once = Once::new();

/// Initialize rustls crypto provider for tests
///
/// Uses a `Once` to ensure it's only called once per test binary.
pub fn init_rustls() {
    RUSTLS_INIT.call_once(|| {
        // Another test in the same binary may have installed it already
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// A certificate with its key, in both PEM and DER
pub struct IssuedCert {
    pub cert_pem: String,
    pub key_pem: String,
    pub cert_der: CertificateDer<'static>,
    pub key_der: Vec<u8>,
}

/// A CA able to issue server and client certificates
pub struct TestPki {
    pub ca_pem: String,
    pub ca_der: CertificateDer<'static>,
    issuer: Issuer<'static, KeyPair>,
}

impl TestPki {
    pub fn new(name: &str) -> Self {
        let mut params = CertificateParams::default();
        params
            .distinguished_name
            .push(DnType::CommonName, format!("{name} CA"));
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);

        let key = KeyPair::generate().unwrap();
        let cert = params.self_signed(&key).unwrap();

        Self {
            ca_pem: cert.pem(),
            ca_der: cert.der().clone(),
            issuer: Issuer::new(params, key),
        }
    }

    /// Server certificate valid for 127.0.0.1 and localhost
    pub fn server_cert(&self) -> IssuedCert {
        let mut params = CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        params
            .subject_alt_names
            .push(SanType::IpAddress(IpAddr::V4(Ipv4Addr::LOCALHOST)));
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        self.issue(params, "test-apiserver")
    }

    pub fn client_cert(&self, common_name: &str) -> IssuedCert {
        let mut params = CertificateParams::default();
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
        self.issue(params, common_name)
    }

    /// TLS bundle as an environment would hand it out
    pub fn client_bundle(&self, common_name: &str) -> TlsClientConfig {
        let client = self.client_cert(common_name);
        TlsClientConfig {
            cert_data: client.cert_pem.into_bytes(),
            key_data: Zeroizing::new(client.key_pem.into_bytes()),
            ca_data: self.ca_pem.clone().into_bytes(),
        }
    }

    fn issue(&self, mut params: CertificateParams, common_name: &str) -> IssuedCert {
        params
            .distinguished_name
            .push(DnType::CommonName, common_name);
        params.is_ca = IsCa::NoCa;

        let key = KeyPair::generate().unwrap();
        let cert = params.signed_by(&key, &self.issuer).unwrap();

        IssuedCert {
            cert_pem: cert.pem(),
            key_pem: key.serialize_pem(),
            cert_der: cert.der().clone(),
            key_der: key.serialize_der(),
        }
    }
}

/// What the echo upstream saw
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Plain HTTP upstream answering every request with a fixed body
/// and recording what it received
pub async fn spawn_echo_upstream() -> (SocketAddr, Arc<Mutex<Vec<RecordedRequest>>>) {
    let recorded = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&recorded);

    let app = Router::new().fallback(
        move |method: Method, uri: Uri, headers: HeaderMap, body: Bytes| {
            let sink = Arc::clone(&sink);
            async move {
                let path = uri.path().to_string();
                sink.lock().unwrap().push(RecordedRequest {
                    method,
                    uri,
                    headers,
                    body,
                });
                (
                    axum::http::StatusCode::CREATED,
                    [("x-upstream", "echo"), ("keep-alive", "timeout=5")],
                    format!("echo:{path}"),
                )
            }
        },
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, recorded)
}

/// HTTPS upstream that requires a client certificate issued by `pki`
///
/// Answers each request with `mtls-ok` and closes the connection.
pub async fn spawn_mtls_upstream(pki: &TestPki) -> SocketAddr {
    let server = pki.server_cert();

    let mut roots = rustls::RootCertStore::empty();
    roots.add(pki.ca_der.clone()).unwrap();
    let verifier = rustls::server::WebPkiClientVerifier::builder(Arc::new(roots))
        .build()
        .unwrap();

    let config = rustls::ServerConfig::builder()
        .with_client_cert_verifier(verifier)
        .with_single_cert(
            vec![server.cert_der],
            PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(server.key_der)),
        )
        .unwrap();
    let acceptor = TlsAcceptor::from(Arc::new(config));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                // Handshake failures are the point of some tests
                let Ok(mut tls) = acceptor.accept(stream).await else {
                    return;
                };

                let mut request = Vec::new();
                let mut chunk = [0_u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match tls.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&chunk[..n]),
                    }
                }

                let body = "mtls-ok";
                let response = format!(
                    concat!(
                        "HTTP/1.1 200 OK\r\n",
                        "Content-Type: text/plain\r\n",
                        "Content-Length: {}\r\n",
                        "Connection: close\r\n\r\n{}",
                    ),
                    body.len(),
                    body
                );
                let _ = tls.write_all(response.as_bytes()).await;
                let _ = tls.shutdown().await;
            });
        }
    });
    addr
}

/// Upstream that switches every connection to a byte echo protocol
///
/// Records the request head it received, answers `101 Switching Protocols`
/// with `Upgrade: echo` and then writes back whatever it reads.
pub async fn spawn_upgrade_upstream() -> (SocketAddr, Arc<Mutex<Vec<String>>>) {
    let heads = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&heads);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let sink = Arc::clone(&sink);
            tokio::spawn(async move {
                let mut head = Vec::new();
                let mut byte = [0_u8; 1];
                while !head.ends_with(b"\r\n\r\n") {
                    match stream.read(&mut byte).await {
                        Ok(0) | Err(_) => return,
                        Ok(_) => head.push(byte[0]),
                    }
                }
                sink.lock()
                    .unwrap()
                    .push(String::from_utf8_lossy(&head).to_lowercase());

                let switching = concat!(
                    "HTTP/1.1 101 Switching Protocols\r\n",
                    "Connection: Upgrade\r\n",
                    "Upgrade: echo\r\n\r\n",
                );
                if stream.write_all(switching.as_bytes()).await.is_err() {
                    return;
                }
                let (mut reader, mut writer) = stream.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });
    (addr, heads)
}

/// Client for talking to the proxy, ignoring any system proxy settings
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// An address nothing listens on
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Counters shared between a `FakeEnvironment` and the test
#[derive(Debug, Default)]
pub struct EnvironmentCalls {
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub crd_paths: Mutex<Vec<String>>,
}

impl EnvironmentCalls {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

/// `TestEnvironment` handing out a fixed connection
#[derive(Debug)]
pub struct FakeEnvironment {
    connection: Option<ConnectionConfig>,
    pub calls: Arc<EnvironmentCalls>,
}

impl FakeEnvironment {
    pub fn new(host: String, tls: TlsClientConfig) -> Self {
        Self {
            connection: Some(ConnectionConfig { host, tls }),
            calls: Arc::new(EnvironmentCalls::default()),
        }
    }

    /// An environment whose start always fails
    pub fn failing() -> Self {
        Self {
            connection: None,
            calls: Arc::new(EnvironmentCalls::default()),
        }
    }
}

#[async_trait]
impl TestEnvironment for FakeEnvironment {
    async fn start(
        &mut self,
        options: &EnvironmentOptions,
    ) -> Result<ConnectionConfig, EnvironmentError> {
        self.calls.starts.fetch_add(1, Ordering::SeqCst);
        self.calls
            .crd_paths
            .lock()
            .unwrap()
            .clone_from(&options.crd_directory_paths);
        self.connection
            .clone()
            .ok_or(EnvironmentError::MissingSetting("TEST_ENV_API_SERVER"))
    }

    async fn stop(&mut self) -> Result<(), EnvironmentError> {
        self.calls.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
