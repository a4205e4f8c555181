use crate::ConfigError;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use certificate::CertificateBundle;
use certificate::TlsIdentity;
use certificate::TrustRoots;
use serde::Deserialize;
use std::fmt::Debug;
use std::fmt::Formatter;
use std::time::Duration;

/// The configuration file of a gateway client
///
/// ```toml
/// [gateway]
/// instance = "my-instance.example.com"
/// device_alternate_id = "dev-42"
/// certificate_bundle = "dev-42.json"
/// ca_file = "/etc/ssl/certs/gateway-ca.pem"
///
/// [mqtt]
/// keepalive = 30
/// pending_ttl = 300
///
/// [rest]
/// timeout = 10
///
/// [log]
/// level = "debug"
/// ```
///
/// Relative paths are resolved from the directory of the configuration file.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub gateway: GatewaySection,
    #[serde(default)]
    pub mqtt: MqttSection,
    #[serde(default)]
    pub rest: RestSection,
    #[serde(default)]
    pub log: LogConfig,

    #[serde(skip)]
    config_dir: Option<Utf8PathBuf>,
}

#[derive(Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    /// Host of the IoT services instance
    pub instance: String,

    pub device_alternate_id: String,

    /// JSON document `{"pem": "...", "secret": "..."}` as delivered by the device certificate endpoint
    pub certificate_bundle: Option<Utf8PathBuf>,

    /// PEM bundle holding the device certificate and its encrypted private key
    pub certificate: Option<Utf8PathBuf>,

    /// Passphrase of the `certificate` private key
    pub secret: Option<String>,

    /// Trust the platform root certificates
    #[serde(default = "GatewaySection::default_native_roots")]
    pub native_roots: bool,

    /// Additional trusted CA certificates
    pub ca_file: Option<Utf8PathBuf>,
    pub ca_dir: Option<Utf8PathBuf>,
}

impl GatewaySection {
    fn default_native_roots() -> bool {
        true
    }
}

impl Debug for GatewaySection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewaySection")
            .field("instance", &self.instance)
            .field("device_alternate_id", &self.device_alternate_id)
            .field("certificate_bundle", &self.certificate_bundle)
            .field("certificate", &self.certificate)
            .field("secret", &self.secret.as_ref().map(|_| "********"))
            .field("native_roots", &self.native_roots)
            .field("ca_file", &self.ca_file)
            .field("ca_dir", &self.ca_dir)
            .finish()
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MqttSection {
    /// Defaults to the instance host
    pub host: Option<String>,

    #[serde(default = "MqttSection::default_port")]
    pub port: u16,

    /// Keep-alive interval in seconds
    #[serde(default = "MqttSection::default_keepalive")]
    pub keepalive: u64,

    /// Seconds after which an unacknowledged measure message is reported as failed
    pub pending_ttl: Option<u64>,
}

impl MqttSection {
    fn default_port() -> u16 {
        8883
    }

    fn default_keepalive() -> u64 {
        60
    }
}

impl Default for MqttSection {
    fn default() -> Self {
        MqttSection {
            host: None,
            port: MqttSection::default_port(),
            keepalive: MqttSection::default_keepalive(),
            pending_ttl: None,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RestSection {
    #[serde(default = "RestSection::default_base_path")]
    pub base_path: String,

    /// Scheme, host and port of the gateway, when not `https://<instance>`
    pub base_url: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "RestSection::default_timeout")]
    pub timeout: u64,
}

impl RestSection {
    fn default_base_path() -> String {
        "/iot/gateway/rest".to_string()
    }

    fn default_timeout() -> u64 {
        30
    }
}

impl Default for RestSection {
    fn default() -> Self {
        RestSection {
            base_path: RestSection::default_base_path(),
            base_url: None,
            timeout: RestSection::default_timeout(),
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// One of trace, debug, info, warn or error, case insensitive
    pub level: Option<String>,
}

impl LogConfig {
    pub fn max_level(&self) -> Result<Option<tracing::Level>, ConfigError> {
        self.level
            .as_deref()
            .map(|name| {
                name.to_uppercase()
                    .parse()
                    .map_err(|_| ConfigError::InvalidLogLevel {
                        name: name.to_string(),
                    })
            })
            .transpose()
    }
}

impl GatewayConfig {
    pub fn from_file(path: impl AsRef<Utf8Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        let mut config =
            GatewayConfig::parse(&content).map_err(|reason| ConfigError::InvalidSyntax {
                path: path.to_owned(),
                reason,
            })?;
        config.config_dir = path.parent().map(Utf8Path::to_owned);
        Ok(config)
    }

    /// Parse a configuration, relative paths being resolved from the current directory
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        GatewayConfig::parse(content).map_err(|reason| ConfigError::InvalidSyntax {
            path: Utf8PathBuf::new(),
            reason,
        })
    }

    fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|err| err.to_string())
    }

    /// Load the device identity from the configured certificate files
    pub fn load_identity(&self) -> Result<TlsIdentity, ConfigError> {
        let gateway = &self.gateway;
        let bundle = match (&gateway.certificate_bundle, &gateway.certificate, &gateway.secret) {
            (Some(bundle_path), _, _) => {
                let path = self.resolve(bundle_path);
                let json = std::fs::read_to_string(&path)
                    .map_err(|source| ConfigError::Io { path, source })?;
                CertificateBundle::from_json(&json)?
            }
            (None, Some(pem_path), Some(secret)) => {
                CertificateBundle::from_pem_file(self.resolve(pem_path), secret.as_str())?
            }
            _ => return Err(ConfigError::MissingIdentity),
        };
        Ok(bundle.identity()?)
    }

    pub fn trust_roots(&self) -> Result<TrustRoots, ConfigError> {
        let mut trust_roots = if self.gateway.native_roots {
            TrustRoots::native()
        } else {
            TrustRoots::empty()
        };
        if let Some(ca_file) = &self.gateway.ca_file {
            trust_roots = trust_roots.with_cafile(self.resolve(ca_file))?;
        }
        if let Some(ca_dir) = &self.gateway.ca_dir {
            trust_roots = trust_roots.with_cadir(self.resolve(ca_dir))?;
        }
        Ok(trust_roots)
    }

    pub fn mqtt_keep_alive(&self) -> Duration {
        Duration::from_secs(self.mqtt.keepalive)
    }

    pub fn mqtt_config(&self) -> Result<mqtt_gateway::Config, ConfigError> {
        let host = self.mqtt.host.as_deref().unwrap_or(&self.gateway.instance);
        let mut config = mqtt_gateway::Config::new(host, &self.gateway.device_alternate_id)
            .with_port(self.mqtt.port)
            .with_keep_alive(self.mqtt_keep_alive())
            .with_trust_roots(self.trust_roots()?);
        if let Some(ttl) = self.mqtt.pending_ttl {
            config = config.with_pending_ttl(Duration::from_secs(ttl));
        }
        Ok(config)
    }

    pub fn rest_config(&self) -> Result<rest_gateway::Config, ConfigError> {
        let mut config =
            rest_gateway::Config::new(&self.gateway.instance, &self.gateway.device_alternate_id)
                .with_base_path(&self.rest.base_path)
                .with_timeout(Duration::from_secs(self.rest.timeout))
                .with_trust_roots(self.trust_roots()?);
        if let Some(base_url) = &self.rest.base_url {
            config = config.with_base_url(base_url);
        }
        Ok(config)
    }

    fn resolve(&self, path: &Utf8Path) -> Utf8PathBuf {
        match &self.config_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_owned(),
        }
    }
}
