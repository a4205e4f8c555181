use crate::build_identity;
use crate::IdentityError;
use crate::TlsIdentity;
use serde::Deserialize;
use std::fmt::Debug;
use std::fmt::Formatter;
use std::path::Path;
use zeroize::Zeroizing;

/// The credentials of a device: a PEM bundle and the passphrase of its private key.
pub struct CertificateBundle {
    pem: Zeroizing<String>,
    secret: Zeroizing<String>,
}

/// Payload returned by the device certificate endpoint
#[derive(Deserialize)]
struct RawBundle {
    pem: String,
    secret: String,
}

impl CertificateBundle {
    pub fn new(pem: impl Into<String>, secret: impl Into<String>) -> Self {
        CertificateBundle {
            pem: Zeroizing::new(pem.into()),
            secret: Zeroizing::new(secret.into()),
        }
    }

    /// Parse the `{"pem": "...", "secret": "..."}` document of the device certificate endpoint.
    pub fn from_json(json: &str) -> Result<Self, IdentityError> {
        let raw: RawBundle = serde_json::from_str(json)?;
        Ok(CertificateBundle::new(raw.pem, raw.secret))
    }

    /// Read the PEM bundle from a file, the passphrase being provided separately.
    pub fn from_pem_file(
        path: impl AsRef<Path>,
        secret: impl Into<String>,
    ) -> Result<Self, IdentityError> {
        let path = path.as_ref();
        let pem = std::fs::read_to_string(path).map_err(|source| IdentityError::Io {
            path: path.to_owned(),
            source,
        })?;
        Ok(CertificateBundle::new(pem, secret))
    }

    pub fn pem(&self) -> &str {
        &self.pem
    }

    pub fn identity(&self) -> Result<TlsIdentity, IdentityError> {
        build_identity(&self.pem, &self.secret)
    }
}

impl Debug for CertificateBundle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateBundle")
            .field("pem", &format!("{} bytes", self.pem.len()))
            .field("secret", &"<redacted>")
            .finish()
    }
}
