use crate::tls_config::client_config_with_roots;
use crate::IdentityError;
use pem::Pem;
use pkcs8::EncryptedPrivateKeyInfo;
use rustls::pki_types::CertificateDer;
use rustls::pki_types::PrivateKeyDer;
use rustls::pki_types::PrivatePkcs1KeyDer;
use rustls::pki_types::PrivatePkcs8KeyDer;
use rustls::pki_types::PrivateSec1KeyDer;
use rustls::RootCertStore;
use std::fmt::Debug;
use std::fmt::Formatter;
use time::OffsetDateTime;
use tracing::debug;
use x509_parser::certificate::X509Certificate;

/// A certificate chain and the matching private key, ready for mutual TLS authentication.
///
/// An identity is only built from a bundle that yields a key accepted by the TLS stack:
/// there is no partially usable identity.
pub struct TlsIdentity {
    // never empty, the first certificate being the device certificate
    cert_chain: Vec<CertificateDer<'static>>,
    private_key: PrivateKeyDer<'static>,
}

/// Build a TLS identity from a PEM bundle holding a private key and a certificate chain.
///
/// The private key can be an encrypted PKCS#8 key, to be decrypted with the `passphrase`,
/// or an unencrypted PKCS#8, PKCS#1 or SEC1 key, in which case the passphrase is ignored.
pub fn build_identity(pem_bundle: &str, passphrase: &str) -> Result<TlsIdentity, IdentityError> {
    let mut cert_chain = Vec::new();
    let mut keys = Vec::new();
    for section in pem::parse_many(pem_bundle.as_bytes())? {
        match section.tag() {
            "CERTIFICATE" => cert_chain.push(CertificateDer::from(section.into_contents())),
            tag if tag.ends_with("PRIVATE KEY") => keys.push(section),
            tag => debug!("Ignoring {tag} section of the certificate bundle"),
        }
    }

    if cert_chain.is_empty() {
        return Err(IdentityError::NoCertificate);
    }
    let private_key = match keys.len() {
        0 => return Err(IdentityError::NoPrivateKey),
        1 => decode_private_key(keys.remove(0), passphrase)?,
        count => return Err(IdentityError::MultiplePrivateKeys { count }),
    };

    let identity = TlsIdentity {
        cert_chain,
        private_key,
    };
    identity.check_usable()?;

    debug!(
        "Loaded TLS identity with {} certificate(s), fingerprint {}",
        identity.cert_chain.len(),
        identity.fingerprint()
    );
    Ok(identity)
}

fn decode_private_key(
    section: Pem,
    passphrase: &str,
) -> Result<PrivateKeyDer<'static>, IdentityError> {
    // Legacy OpenSSL encryption is announced by headers in front of the base64 content
    if section.headers().get("Proc-Type").is_some() {
        return Err(IdentityError::UnsupportedKeyEncryption);
    }

    match section.tag() {
        "ENCRYPTED PRIVATE KEY" => {
            let encrypted = EncryptedPrivateKeyInfo::try_from(section.contents())
                .map_err(|err| IdentityError::InvalidPrivateKey(err.to_string()))?;
            let document = encrypted
                .decrypt(passphrase.as_bytes())
                .map_err(|_| IdentityError::KeyDecryptionFailed)?;
            Ok(PrivatePkcs8KeyDer::from(document.as_bytes().to_vec()).into())
        }
        "PRIVATE KEY" => Ok(PrivatePkcs8KeyDer::from(section.into_contents()).into()),
        "RSA PRIVATE KEY" => Ok(PrivatePkcs1KeyDer::from(section.into_contents()).into()),
        "EC PRIVATE KEY" => Ok(PrivateSec1KeyDer::from(section.into_contents()).into()),
        tag => Err(IdentityError::UnknownPrivateKeyFormat {
            tag: tag.to_string(),
        }),
    }
}

impl TlsIdentity {
    /// The device certificate followed by its intermediates
    pub fn cert_chain(&self) -> &[CertificateDer<'static>] {
        &self.cert_chain
    }

    pub fn private_key(&self) -> PrivateKeyDer<'static> {
        self.private_key.clone_key()
    }

    /// The device certificate
    pub fn certificate(&self) -> &CertificateDer<'static> {
        &self.cert_chain[0]
    }

    /// SHA-256 fingerprint of the device certificate, as lower-case hex.
    ///
    /// This is the fingerprint used by the platform to list and revoke device certificates.
    pub fn fingerprint(&self) -> String {
        sha256::digest(self.certificate().as_ref())
    }

    pub fn subject(&self) -> Result<String, IdentityError> {
        self.with_certificate(|x509| x509.subject().to_string())
    }

    pub fn subject_common_name(&self) -> Result<String, IdentityError> {
        self.with_certificate(|x509| {
            x509.subject()
                .iter_common_name()
                .next()
                .and_then(|cn| cn.as_str().ok())
                .map(str::to_owned)
        })?
        .ok_or_else(|| IdentityError::X509Error("no common name in the certificate subject".into()))
    }

    pub fn not_after(&self) -> Result<OffsetDateTime, IdentityError> {
        self.with_certificate(|x509| x509.validity().not_after.to_datetime())
    }

    fn with_certificate<T>(
        &self,
        extract: impl FnOnce(&X509Certificate<'_>) -> T,
    ) -> Result<T, IdentityError> {
        let (_, x509) = x509_parser::parse_x509_certificate(self.certificate().as_ref())
            .map_err(|err| IdentityError::X509Error(err.to_string()))?;
        Ok(extract(&x509))
    }

    /// Check that the TLS stack accepts this chain and key for client authentication.
    fn check_usable(&self) -> Result<(), IdentityError> {
        client_config_with_roots(self, RootCertStore::empty()).map(|_| ())
    }
}

impl Clone for TlsIdentity {
    fn clone(&self) -> Self {
        TlsIdentity {
            cert_chain: self.cert_chain.clone(),
            private_key: self.private_key.clone_key(),
        }
    }
}

impl Debug for TlsIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsIdentity")
            .field("chain_length", &self.cert_chain.len())
            .field("fingerprint", &self.fingerprint())
            .field("private_key", &"<redacted>")
            .finish()
    }
}
