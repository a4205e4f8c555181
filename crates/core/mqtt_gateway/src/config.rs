use certificate::rustls::ClientConfig;
use certificate::TrustRoots;
use rumqttc::QoS;
use rumqttc::Transport;
use std::time::Duration;

/// Configuration of the connection to the MQTT gateway
#[derive(Debug, Clone)]
pub struct Config {
    /// Host of the IoT services instance
    ///
    /// Default: "localhost"
    pub host: String,

    /// MQTT port of the gateway
    ///
    /// Default: 8883
    pub port: u16,

    /// Alternate id of the device, used as MQTT client id
    /// and to build the acknowledgement topic
    pub device_alternate_id: String,

    /// Keep-alive interval used when none is given on connect
    ///
    /// Default: 60 seconds
    pub keep_alive: Duration,

    /// Capacity of the internal request queue
    ///
    /// Default: `1024`.
    pub queue_capacity: usize,

    /// Maximum size for a message payload
    ///
    /// Default: `1024 * 1024`.
    pub max_packet_size: usize,

    /// Root certificates used to authenticate the gateway
    ///
    /// Default: the platform root certificates
    pub trust_roots: TrustRoots,

    /// How long a measure message can wait for its acknowledgement
    /// before being reported as failed.
    ///
    /// Default: None, i.e. unacknowledged messages are kept until disconnect
    pub pending_ttl: Option<Duration>,

    /// QoS used to publish measure messages
    ///
    /// Default: `QoS::AtLeastOnce`
    pub publish_qos: QoS,

    /// How long to wait for the gateway to accept a connection or a subscription
    ///
    /// Default: 30 seconds
    pub response_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: String::from("localhost"),
            port: 8883,
            device_alternate_id: String::new(),
            keep_alive: Duration::from_secs(60),
            queue_capacity: 1024,
            max_packet_size: 1024 * 1024,
            trust_roots: TrustRoots::default(),
            pending_ttl: None,
            publish_qos: QoS::AtLeastOnce,
            response_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn new(host: impl Into<String>, device_alternate_id: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            device_alternate_id: device_alternate_id.into(),
            ..Config::default()
        }
    }

    /// Set a custom host
    pub fn with_host(self, host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..self
        }
    }

    /// Set a custom port
    pub fn with_port(self, port: u16) -> Self {
        Self { port, ..self }
    }

    pub fn with_device_alternate_id(self, device_alternate_id: impl Into<String>) -> Self {
        Self {
            device_alternate_id: device_alternate_id.into(),
            ..self
        }
    }

    pub fn with_keep_alive(self, keep_alive: Duration) -> Self {
        Self { keep_alive, ..self }
    }

    /// Set the queue capacity
    pub fn with_queue_capacity(self, queue_capacity: usize) -> Self {
        Self {
            queue_capacity,
            ..self
        }
    }

    /// Set the maximum size for a message payload
    pub fn with_max_packet_size(self, max_packet_size: usize) -> Self {
        Self {
            max_packet_size,
            ..self
        }
    }

    pub fn with_trust_roots(self, trust_roots: TrustRoots) -> Self {
        Self {
            trust_roots,
            ..self
        }
    }

    /// Report as failed the messages not acknowledged within the given delay
    pub fn with_pending_ttl(self, ttl: Duration) -> Self {
        Self {
            pending_ttl: Some(ttl),
            ..self
        }
    }

    pub fn with_publish_qos(self, publish_qos: QoS) -> Self {
        Self {
            publish_qos,
            ..self
        }
    }

    pub fn with_response_timeout(self, response_timeout: Duration) -> Self {
        Self {
            response_timeout,
            ..self
        }
    }

    /// Wrap this config into an internal set of options for `rumqttc`.
    pub(crate) fn mqtt_options(
        &self,
        tls_config: ClientConfig,
        keep_alive: Duration,
    ) -> rumqttc::MqttOptions {
        let mut mqtt_options =
            rumqttc::MqttOptions::new(&self.device_alternate_id, &self.host, self.port);

        // No session is resumed: the client is not reconnected on failure
        mqtt_options.set_clean_session(true);
        mqtt_options.set_keep_alive(keep_alive);
        mqtt_options.set_max_packet_size(self.max_packet_size, self.max_packet_size);
        mqtt_options.set_transport(Transport::tls_with_config(tls_config.into()));

        mqtt_options
    }
}
