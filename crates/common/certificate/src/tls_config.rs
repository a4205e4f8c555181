use crate::IdentityError;
use crate::TlsIdentity;
use crate::TrustRoots;
use rustls::ClientConfig;
use rustls::RootCertStore;
use std::sync::Arc;

/// Create a TLS client configuration authenticating the device with its identity.
///
/// Only TLS 1.2 and TLS 1.3 are negotiated.
/// The server certificate is checked against the given trust roots,
/// which are by default the root certificates of the platform.
pub fn create_tls_config(
    identity: &TlsIdentity,
    trust_roots: &TrustRoots,
) -> Result<ClientConfig, IdentityError> {
    let root_store = trust_roots.root_store()?;
    client_config_with_roots(identity, root_store)
}

pub(crate) fn client_config_with_roots(
    identity: &TlsIdentity,
    root_store: RootCertStore,
) -> Result<ClientConfig, IdentityError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13, &rustls::version::TLS12])?
        .with_root_certificates(root_store)
        .with_client_auth_cert(identity.cert_chain().to_vec(), identity.private_key())?;
    Ok(config)
}
