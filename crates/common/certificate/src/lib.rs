//! TLS client identities for the device gateways.
//!
//! The device certificate endpoint delivers a PEM bundle (private key and certificate chain)
//! protected by a passphrase. This crate turns such a bundle into a [TlsIdentity]
//! and the identity into a `rustls` client configuration requiring TLS 1.2 or higher,
//! presenting the device certificate for mutual authentication
//! and validating the server against the trusted roots.
//!
//! ```no_run
//! use certificate::{build_identity, create_tls_config, TrustRoots};
//!
//! # fn main() -> Result<(), certificate::IdentityError> {
//! let bundle = std::fs::read_to_string("device.pem").unwrap();
//! let identity = build_identity(&bundle, "passphrase")?;
//! let tls_config = create_tls_config(&identity, &TrustRoots::native())?;
//! # Ok(())
//! # }
//! ```
use std::path::PathBuf;

mod bundle;
mod identity;
mod tls_config;
mod trust_roots;

pub use bundle::CertificateBundle;
pub use identity::build_identity;
pub use identity::TlsIdentity;
pub use tls_config::create_tls_config;
pub use trust_roots::TrustRoots;

pub use rustls;

#[derive(thiserror::Error, Debug)]
pub enum IdentityError {
    #[error("Fail to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid certificate bundle: {0}")]
    InvalidBundleJson(#[from] serde_json::Error),

    #[error("PEM file format error: {0}")]
    PemError(#[from] pem::PemError),

    #[error("No certificate found in the PEM bundle")]
    NoCertificate,

    #[error("No private key found in the PEM bundle")]
    NoPrivateKey,

    #[error("The PEM bundle contains {count} private keys where exactly one is expected")]
    MultiplePrivateKeys { count: usize },

    #[error("Fail to decrypt the private key: wrong passphrase or corrupted key")]
    KeyDecryptionFailed,

    #[error("Unsupported private key encryption: use an encrypted PKCS#8 key instead of a legacy encrypted PEM")]
    UnsupportedKeyEncryption,

    #[error("Unknown private key format: {tag}")]
    UnknownPrivateKeyFormat { tag: String },

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("X509 file format error: {0}")]
    X509Error(String),

    #[error("Invalid CA certificate in {path:?}: {reason}")]
    InvalidCaCertificate { path: PathBuf, reason: String },

    #[error("Invalid CA certificate: {reason}")]
    InvalidCaPem { reason: String },

    #[error("No trusted root certificate found")]
    NoTrustRoots,

    #[error("Failed to add the certificate to root store: {0}")]
    RootStoreAdd(rustls::Error),

    #[error("TLS configuration error: {0}")]
    Tls(#[from] rustls::Error),
}
