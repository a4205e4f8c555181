//! Device credentials used across the test suites.
//!
//! The key pair is a P-256 key with a self-signed certificate for `CN=dev-42`,
//! valid for a century so the fixtures never expire under the tests.
use std::io::Write;
use std::path::PathBuf;
use tempfile::TempDir;

mod test_gateway;

pub use test_gateway::*;

pub const DEVICE_ALTERNATE_ID: &str = "dev-42";

/// The passphrase protecting [ENCRYPTED_KEY_PEM]
pub const BUNDLE_SECRET: &str = "correct-horse-battery";

/// PKCS#8 key encrypted with PBES2 (PBKDF2-HMAC-SHA256, AES-256-CBC)
pub const ENCRYPTED_KEY_PEM: &str = include_str!("../fixtures/device_key_encrypted.pem");

/// The same key, unencrypted
pub const PLAIN_KEY_PEM: &str = include_str!("../fixtures/device_key.pem");

pub const DEVICE_CERT_PEM: &str = include_str!("../fixtures/device_cert.pem");

/// SHA-256 of the DER encoding of [DEVICE_CERT_PEM]
pub const DEVICE_CERT_SHA256: &str =
    "252c43d0d57ccafb5da62508aa7617590e8c8749ed267f22621d0887e1b963ee";

/// An unrelated self-signed CA, usable as a custom trust anchor
pub const CA_CERT_PEM: &str = include_str!("../fixtures/ca_cert.pem");

/// The CA that signed [GATEWAY_SERVER_CERT_PEM]
pub const GATEWAY_CA_CERT_PEM: &str = include_str!("../fixtures/gateway_ca_cert.pem");

/// Server certificate of the test gateway, for `localhost` and `127.0.0.1`
pub const GATEWAY_SERVER_CERT_PEM: &str = include_str!("../fixtures/gateway_server_cert.pem");

pub const GATEWAY_SERVER_KEY_PEM: &str = include_str!("../fixtures/gateway_server_key.pem");

/// A bundle as delivered by the device certificate endpoint: encrypted key then certificate
pub fn encrypted_bundle() -> String {
    format!("{ENCRYPTED_KEY_PEM}{DEVICE_CERT_PEM}")
}

pub fn plain_bundle() -> String {
    format!("{PLAIN_KEY_PEM}{DEVICE_CERT_PEM}")
}

/// A temporary directory holding credential files, removed on drop
pub struct TempCredentials {
    dir: TempDir,
}

impl TempCredentials {
    pub fn new() -> Self {
        TempCredentials {
            dir: TempDir::new().expect("fail to create a temp directory"),
        }
    }

    /// Write `content` under `name` and return the file path
    pub fn file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        let mut file = std::fs::File::create(&path).expect("fail to create a credential file");
        file.write_all(content.as_bytes())
            .expect("fail to write a credential file");
        path
    }

    pub fn encrypted_bundle_file(&self) -> PathBuf {
        self.file("device.pem", &encrypted_bundle())
    }

    pub fn ca_file(&self) -> PathBuf {
        self.file("ca.pem", CA_CERT_PEM)
    }

    pub fn path(&self) -> &std::path::Path {
        self.dir.path()
    }
}

impl Default for TempCredentials {
    fn default() -> Self {
        Self::new()
    }
}
