use crate::interpret_response;
use crate::Config;
use crate::Response;
use crate::RestGatewayError;
use certificate::create_tls_config;
use certificate::TlsIdentity;
use clock::unix_millis;
use clock::Clock;
use clock::WallClock;
use gateway_api::Measure;
use gateway_api::MeasureEnvelope;
use gateway_api::OutboundCommand;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use tracing::info;

/// Optional parts of a measure message
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeasureOptions {
    /// Sent on behalf of this device rather than the configured one
    pub device_alternate_id: Option<String>,

    pub sensor_type_alternate_id: Option<String>,

    /// Timestamp the measures
    pub use_timestamp: bool,

    /// Milliseconds since the UNIX epoch, the current time if not set.
    ///
    /// Ignored unless `use_timestamp` is set.
    pub timestamp: Option<i64>,
}

impl MeasureOptions {
    pub fn for_device(self, device_alternate_id: impl Into<String>) -> Self {
        Self {
            device_alternate_id: Some(device_alternate_id.into()),
            ..self
        }
    }

    pub fn with_sensor_type(self, sensor_type_alternate_id: impl Into<String>) -> Self {
        Self {
            sensor_type_alternate_id: Some(sensor_type_alternate_id.into()),
            ..self
        }
    }

    /// Timestamp the measures with the current time
    pub fn timestamped(self) -> Self {
        Self {
            use_timestamp: true,
            ..self
        }
    }

    /// Timestamp the measures with the given time
    pub fn with_timestamp(self, timestamp: i64) -> Self {
        Self {
            use_timestamp: true,
            timestamp: Some(timestamp),
            ..self
        }
    }
}

/// A client of the REST gateway
///
/// ```no_run
/// use certificate::CertificateBundle;
/// use rest_gateway::Config;
/// use rest_gateway::MeasureOptions;
/// use rest_gateway::RestGatewayClient;
///
/// # async fn post() -> Result<(), Box<dyn std::error::Error>> {
/// let bundle = CertificateBundle::from_json(&std::fs::read_to_string("dev-42.json")?)?;
/// let client = RestGatewayClient::new(
///     Config::new("my-instance.example.com", "dev-42"),
///     &bundle.identity()?,
/// )?;
///
/// let measure = serde_json::json!({"temperature": 21.5});
/// let measures = vec![measure.as_object().cloned().unwrap_or_default()];
/// let response = client
///     .post_measures("cap-1", "sensor-1", measures, MeasureOptions::default().timestamped())
///     .await?;
/// println!("{}", response.status);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RestGatewayClient {
    config: Config,
    gateway_url: String,
    http: reqwest::Client,
    clock: Arc<dyn Clock>,
}

impl RestGatewayClient {
    pub fn new(config: Config, identity: &TlsIdentity) -> Result<Self, RestGatewayError> {
        RestGatewayClient::with_clock(config, identity, Arc::new(WallClock))
    }

    pub fn with_clock(
        config: Config,
        identity: &TlsIdentity,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RestGatewayError> {
        if config.device_alternate_id.is_empty() {
            return Err(RestGatewayError::MissingDeviceId);
        }

        let tls_config = create_tls_config(identity, &config.trust_roots)?;
        let http = reqwest::Client::builder()
            .use_preconfigured_tls(tls_config)
            .timeout(config.timeout)
            .build()
            .map_err(RestGatewayError::HttpClient)?;

        Ok(RestGatewayClient {
            gateway_url: config.gateway_url(),
            config,
            http,
            clock,
        })
    }

    pub fn device_alternate_id(&self) -> &str {
        &self.config.device_alternate_id
    }

    /// Send a command to a device, by default the configured one
    pub async fn post_command(
        &self,
        capability_alternate_id: &str,
        sensor_alternate_id: &str,
        command: Map<String, Value>,
        device_alternate_id: Option<&str>,
    ) -> Result<Response, RestGatewayError> {
        let device = self.target_device(device_alternate_id)?;
        let payload = OutboundCommand::new(capability_alternate_id, sensor_alternate_id, command);
        self.post(&format!("/commands/{device}"), &payload).await
    }

    /// Send a single measure message
    pub async fn post_measures(
        &self,
        capability_alternate_id: &str,
        sensor_alternate_id: &str,
        measures: Vec<Measure>,
        options: MeasureOptions,
    ) -> Result<Response, RestGatewayError> {
        let device = self.target_device(options.device_alternate_id.as_deref())?;
        let payload =
            self.measure_envelope(capability_alternate_id, sensor_alternate_id, measures, &options);
        self.post(&format!("/measures/{device}"), &payload).await
    }

    /// Send several measure messages in a single request
    pub async fn post_batched_measures(
        &self,
        envelopes: &[MeasureEnvelope],
        device_alternate_id: Option<&str>,
    ) -> Result<Response, RestGatewayError> {
        let device = self.target_device(device_alternate_id)?;
        self.post(&format!("/measures/{device}"), &envelopes).await
    }

    fn measure_envelope(
        &self,
        capability_alternate_id: &str,
        sensor_alternate_id: &str,
        measures: Vec<Measure>,
        options: &MeasureOptions,
    ) -> MeasureEnvelope {
        let mut envelope =
            MeasureEnvelope::new(capability_alternate_id, sensor_alternate_id, measures);
        if let Some(sensor_type) = &options.sensor_type_alternate_id {
            envelope = envelope.with_sensor_type(sensor_type);
        }
        if options.use_timestamp {
            let timestamp = options
                .timestamp
                .unwrap_or_else(|| unix_millis(self.clock.now()));
            envelope = envelope.with_timestamp(timestamp);
        }
        envelope
    }

    fn target_device<'a>(&'a self, device: Option<&'a str>) -> Result<&'a str, RestGatewayError> {
        match device.unwrap_or(&self.config.device_alternate_id) {
            "" => Err(RestGatewayError::MissingDeviceId),
            device => Ok(device),
        }
    }

    async fn post(
        &self,
        path: &str,
        payload: &impl Serialize,
    ) -> Result<Response, RestGatewayError> {
        let url = format!("{}{path}", self.gateway_url);
        debug!(target: "rest_gateway", %url, "POST");

        let response = self
            .http
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(RestGatewayError::from_transport_error)?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .text()
            .await
            .map_err(RestGatewayError::from_transport_error)?;

        let result = interpret_response(status, headers, &body);
        if let Err(err) = &result {
            info!(target: "rest_gateway", %url, "{err}");
        }
        result
    }
}

impl std::fmt::Debug for RestGatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestGatewayClient")
            .field("gateway_url", &self.gateway_url)
            .field("device_alternate_id", &self.config.device_alternate_id)
            .field("timeout", &self.config.timeout)
            .finish()
    }
}
