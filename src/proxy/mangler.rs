//! # Mangler
//!
//! Redirects every inbound request to the API server: scheme and authority
//! are replaced, path and query are kept.

use super::ProxyError;
use crate::environment::ConnectionConfig;
use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::Uri;

#[derive(Debug, Clone)]
pub struct Mangler {
    scheme: Scheme,
    authority: Authority,
}

impl Mangler {
    /// Parse the API server address once from the connection config
    pub fn new(config: &ConnectionConfig) -> Result<Self, ProxyError> {
        Self::from_host(&config.host)
    }

    pub fn from_host(host: &str) -> Result<Self, ProxyError> {
        let invalid = |reason: &str| ProxyError::InvalidHost {
            host: host.to_string(),
            reason: reason.to_string(),
        };

        let uri: Uri = host
            .parse()
            .map_err(|e: axum::http::uri::InvalidUri| invalid(&e.to_string()))?;
        let parts = uri.into_parts();
        let scheme = parts.scheme.ok_or_else(|| invalid("missing scheme"))?;
        let authority = parts.authority.ok_or_else(|| invalid("missing host"))?;

        Ok(Self { scheme, authority })
    }

    /// Target URI for an inbound request URI
    pub fn rewrite(&self, uri: &Uri) -> Result<Uri, ProxyError> {
        let path_and_query = uri
            .path_and_query()
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));

        Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
            .map_err(|e| ProxyError::Rewrite(e.to_string()))
    }

    /// Value for the forwarded `Host` header
    pub fn host(&self) -> &str {
        self.authority.as_str()
    }

    pub fn scheme(&self) -> &str {
        self.scheme.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrite_replaces_scheme_and_authority_only() {
        let mangler = Mangler::from_host("https://127.0.0.1:44771").unwrap();
        let inbound: Uri = "http://localhost:8092/api/v1/namespaces?watch=true&resourceVersion=12"
            .parse()
            .unwrap();

        let target = mangler.rewrite(&inbound).unwrap();
        assert_eq!(
            target.to_string(),
            "https://127.0.0.1:44771/api/v1/namespaces?watch=true&resourceVersion=12"
        );
        assert_eq!(mangler.host(), "127.0.0.1:44771");
        assert_eq!(mangler.scheme(), "https");
    }

    #[test]
    fn test_rewrite_origin_form_request() {
        let mangler = Mangler::from_host("https://127.0.0.1:6443").unwrap();
        let inbound: Uri = "/apis/example.com/v1/widgets".parse().unwrap();

        let target = mangler.rewrite(&inbound).unwrap();
        assert_eq!(target.scheme_str(), Some("https"));
        assert_eq!(
            target.authority().map(Authority::as_str),
            Some("127.0.0.1:6443")
        );
        assert_eq!(target.path(), "/apis/example.com/v1/widgets");
    }

    #[test]
    fn test_host_path_is_ignored() {
        let mangler = Mangler::from_host("https://127.0.0.1:6443/ignored").unwrap();
        let target = mangler.rewrite(&"/version".parse().unwrap()).unwrap();
        assert_eq!(target.to_string(), "https://127.0.0.1:6443/version");
    }

    #[test]
    fn test_host_without_scheme_is_rejected() {
        assert!(matches!(
            Mangler::from_host("127.0.0.1:6443"),
            Err(ProxyError::InvalidHost { .. })
        ));
        assert!(Mangler::from_host("").is_err());
    }
}
