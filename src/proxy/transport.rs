//! # Upstream Transport
//!
//! HTTP client the proxy uses to reach the API server. It trusts only the
//! environment's CA and presents the environment's client certificate on
//! every connection, whatever the inbound request carried.

use super::ProxyError;
use crate::environment::TlsClientConfig;
use zeroize::Zeroizing;

#[derive(Debug, Clone)]
pub struct UpstreamTransport {
    client: reqwest::Client,
}

impl UpstreamTransport {
    pub fn new(tls: &TlsClientConfig) -> Result<Self, ProxyError> {
        // reqwest wants certificate and key in one PEM buffer
        let mut identity_pem = Zeroizing::new(Vec::with_capacity(
            tls.cert_data.len() + tls.key_data.len() + 1,
        ));
        identity_pem.extend_from_slice(&tls.cert_data);
        identity_pem.push(b'\n');
        identity_pem.extend_from_slice(&tls.key_data);

        let identity = reqwest::Identity::from_pem(&identity_pem)
            .map_err(ProxyError::KeyPair)?;
        let ca = reqwest::Certificate::from_pem(&tls.ca_data)
            .map_err(ProxyError::CaCertificate)?;

        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .tls_built_in_root_certs(false)
            .add_root_certificate(ca)
            .identity(identity)
            // Redirects and proxies are the caller's business, not ours
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .build()
            .map_err(ProxyError::Tls)?;

        Ok(Self { client })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}
