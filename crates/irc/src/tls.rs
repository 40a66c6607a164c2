//! Client-side TLS configuration.
//!
//! Certificates are verified against the platform trust store, hostnames are
//! checked by rustls, and only TLS 1.2 and 1.3 are offered. There is no
//! fallback to an unverified or plaintext connection.

use std::sync::Arc;

use {
    rustls::{ClientConfig, RootCertStore},
    tracing::{debug, warn},
};

use crate::{Error, Result};

/// Build a verifying client config from the platform's native roots.
pub fn client_config() -> Result<Arc<ClientConfig>> {
    let native = rustls_native_certs::load_native_certs();
    for err in &native.errors {
        warn!(error = %err, "failed to load some native root certificates");
    }
    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(native.certs);
    debug!(added, ignored, "loaded native root certificates");
    client_config_with_roots(roots)
}

/// Build a verifying client config trusting exactly `roots`.
pub fn client_config_with_roots(roots: RootCertStore) -> Result<Arc<ClientConfig>> {
    if roots.is_empty() {
        return Err(Error::message(
            "no trusted root certificates available; refusing to connect without verification",
        ));
    }
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13, &rustls::version::TLS12])?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(config))
}
