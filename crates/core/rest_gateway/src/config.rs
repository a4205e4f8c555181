use certificate::TrustRoots;
use std::time::Duration;

/// Configuration of the REST gateway client
#[derive(Debug, Clone)]
pub struct Config {
    /// Host of the IoT services instance
    pub instance: String,

    /// Device on behalf of which measures and commands are sent, unless specified otherwise
    pub device_alternate_id: String,

    /// Path of the gateway on the instance
    ///
    /// Default: "/iot/gateway/rest"
    pub base_path: String,

    /// Scheme, host and port of the gateway, when not `https://<instance>`
    ///
    /// Default: None
    pub base_url: Option<String>,

    /// Time given to the gateway to respond
    ///
    /// Default: 30 seconds
    pub timeout: Duration,

    /// Root certificates used to authenticate the gateway
    ///
    /// Default: the platform root certificates
    pub trust_roots: TrustRoots,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            instance: String::from("localhost"),
            device_alternate_id: String::new(),
            base_path: String::from("/iot/gateway/rest"),
            base_url: None,
            timeout: Duration::from_secs(30),
            trust_roots: TrustRoots::default(),
        }
    }
}

impl Config {
    pub fn new(instance: impl Into<String>, device_alternate_id: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            device_alternate_id: device_alternate_id.into(),
            ..Config::default()
        }
    }

    pub fn with_base_path(self, base_path: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            ..self
        }
    }

    /// Send the requests to this URL instead of `https://<instance>`
    pub fn with_base_url(self, base_url: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            ..self
        }
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    pub fn with_trust_roots(self, trust_roots: TrustRoots) -> Self {
        Self {
            trust_roots,
            ..self
        }
    }

    /// The URL of the gateway, to which the endpoint paths are appended
    pub fn gateway_url(&self) -> String {
        let base_url = match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}", self.instance),
        };
        format!("{base_url}/{}", self.base_path.trim_matches('/'))
    }
}
