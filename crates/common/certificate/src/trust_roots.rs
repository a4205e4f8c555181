use crate::IdentityError;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::CertificateDer;
use rustls::RootCertStore;
use std::ffi::OsStr;
use std::path::Path;
use tracing::debug;

/// The root certificates used to authenticate the gateway.
///
/// By default, these are the root certificates of the platform,
/// to which custom CA certificates can be added.
#[derive(Clone, Debug)]
pub struct TrustRoots {
    native: bool,
    extra: Vec<CertificateDer<'static>>,
}

impl Default for TrustRoots {
    fn default() -> Self {
        TrustRoots::native()
    }
}

impl TrustRoots {
    /// The root certificates of the platform
    pub fn native() -> Self {
        TrustRoots {
            native: true,
            extra: vec![],
        }
    }

    /// No trust roots at all: custom CA certificates must be added
    pub fn empty() -> Self {
        TrustRoots {
            native: false,
            extra: vec![],
        }
    }

    pub fn with_certificate(mut self, certificate: CertificateDer<'static>) -> Self {
        self.extra.push(certificate);
        self
    }

    /// Trust all the certificates of a PEM document
    pub fn with_pem(mut self, pem: &str) -> Result<Self, IdentityError> {
        let certs = CertificateDer::pem_slice_iter(pem.as_bytes())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| IdentityError::InvalidCaPem {
                reason: err.to_string(),
            })?;
        if certs.is_empty() {
            return Err(IdentityError::InvalidCaPem {
                reason: "no certificate found".to_string(),
            });
        }
        self.extra.extend(certs);
        Ok(self)
    }

    /// Trust all the certificates of a PEM file
    pub fn with_cafile(mut self, path: impl AsRef<Path>) -> Result<Self, IdentityError> {
        let path = path.as_ref();
        let invalid = |reason: String| IdentityError::InvalidCaCertificate {
            path: path.to_owned(),
            reason,
        };
        let certs = CertificateDer::pem_file_iter(path)
            .map_err(|err| invalid(err.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| invalid(err.to_string()))?;
        if certs.is_empty() {
            return Err(invalid("no certificate found".to_string()));
        }
        debug!("Trusting {} certificate(s) from {path:?}", certs.len());
        self.extra.extend(certs);
        Ok(self)
    }

    /// Trust all the certificates of the `.pem`, `.cer` and `.crt` files of a directory
    pub fn with_cadir(mut self, dir: impl AsRef<Path>) -> Result<Self, IdentityError> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|source| IdentityError::Io {
            path: dir.to_owned(),
            source,
        })?;
        let mut cert_files: Vec<_> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| {
                path.extension()
                    .and_then(OsStr::to_str)
                    .is_some_and(|ext| ["pem", "cer", "crt"].contains(&ext))
            })
            .collect();
        cert_files.sort();

        for cert_file in cert_files {
            self = self.with_cafile(cert_file)?;
        }
        Ok(self)
    }

    pub fn custom_certificates(&self) -> &[CertificateDer<'static>] {
        &self.extra
    }

    /// Build the root store, failing if there is not a single trust anchor.
    pub fn root_store(&self) -> Result<RootCertStore, IdentityError> {
        let mut roots = RootCertStore::empty();

        if self.native {
            let native = rustls_native_certs::load_native_certs();
            for err in native.errors {
                debug!("Fail to load platform certificates: {err}");
            }
            let (valid_count, invalid_count) = roots.add_parsable_certificates(native.certs);
            debug!(
                "Native roots: {} valid and {} invalid certificates",
                valid_count, invalid_count
            );
        }

        for cert in self.extra.iter().cloned() {
            roots.add(cert).map_err(IdentityError::RootStoreAdd)?;
        }

        if roots.is_empty() {
            return Err(IdentityError::NoTrustRoots);
        }
        Ok(roots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use gateway_test_utils::*;

    #[test]
    fn empty_roots_are_rejected() {
        assert_matches!(
            TrustRoots::empty().root_store(),
            Err(IdentityError::NoTrustRoots)
        );
    }

    #[test]
    fn ca_certificate_from_a_pem_string() {
        let roots = TrustRoots::empty().with_pem(CA_CERT_PEM).unwrap();

        assert_eq!(roots.root_store().unwrap().len(), 1);
    }

    #[test]
    fn pem_string_without_certificate() {
        assert_matches!(
            TrustRoots::empty().with_pem(PLAIN_KEY_PEM),
            Err(IdentityError::InvalidCaPem { .. })
        );
    }

    #[test]
    fn ca_certificate_from_a_file() {
        let credentials = TempCredentials::new();

        let roots = TrustRoots::empty()
            .with_cafile(credentials.ca_file())
            .unwrap();

        assert_eq!(roots.custom_certificates().len(), 1);
        assert_eq!(roots.root_store().unwrap().len(), 1);
    }

    #[test]
    fn missing_ca_file() {
        let credentials = TempCredentials::new();

        assert_matches!(
            TrustRoots::empty().with_cafile(credentials.path().join("missing.pem")),
            Err(IdentityError::InvalidCaCertificate { .. })
        );
    }

    #[test]
    fn ca_certificates_from_a_directory() {
        let credentials = TempCredentials::new();
        credentials.file("platform.crt", CA_CERT_PEM);
        credentials.file("device.pem", DEVICE_CERT_PEM);
        credentials.file("notes.txt", "not a certificate");

        let roots = TrustRoots::empty().with_cadir(credentials.path()).unwrap();

        assert_eq!(roots.custom_certificates().len(), 2);
        assert_eq!(roots.root_store().unwrap().len(), 2);
    }

    #[test]
    fn custom_certificates_extend_the_default_roots() {
        let roots = TrustRoots::default().with_pem(CA_CERT_PEM).unwrap();

        // the platform may have no root certificates at all, but the custom one is always there
        assert!(!roots.root_store().unwrap().is_empty());
    }
}
