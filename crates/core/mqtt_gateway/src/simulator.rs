use crate::MqttGatewayError;
use async_trait::async_trait;
use base64::prelude::*;
use gateway_api::Measure;
use mockall::automock;
use rand::seq::IndexedRandom;
use rand::Rng;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;
use tracing::warn;

/// Destination of measures
#[automock]
#[async_trait]
pub trait MeasureSink: Send + Sync {
    async fn publish_measures(
        &self,
        device_alternate_id: &str,
        capability_alternate_id: &str,
        sensor_alternate_id: &str,
        measures: Vec<Measure>,
    ) -> Result<(), MqttGatewayError>;
}

/// How to generate random values for a measure
///
/// ```
/// use mqtt_gateway::SimulatedMeasure;
///
/// let measures: Vec<SimulatedMeasure> = serde_json::from_str(r#"[
///     {"key": "temperature", "dataType": "double", "min": -10.0, "max": 40.0},
///     {"key": "status", "dataType": "string", "allowedStrings": ["idle", "running"]},
///     {"key": "on", "dataType": "boolean"}
/// ]"#).unwrap();
///
/// assert_eq!(measures.len(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedMeasure {
    pub key: String,

    #[serde(flatten)]
    pub values: SimulatedValues,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dataType", rename_all = "lowercase")]
pub enum SimulatedValues {
    /// One of the allowed strings
    String {
        #[serde(rename = "allowedStrings")]
        allowed_strings: Vec<String>,
    },

    /// A number between min and max
    #[serde(alias = "float", alias = "long")]
    Double { min: f64, max: f64 },

    /// An integer between min and max, both included
    Integer { min: i64, max: i64 },

    Boolean,

    /// One of the allowed strings, base64 encoded
    Binary {
        #[serde(rename = "allowedStrings")]
        allowed_strings: Vec<String>,
    },
}

impl SimulatedMeasure {
    pub fn validate(&self) -> Result<(), MqttGatewayError> {
        let invalid = |reason: &str| MqttGatewayError::InvalidSimulatedMeasure {
            key: self.key.clone(),
            reason: reason.to_string(),
        };
        match &self.values {
            SimulatedValues::String { allowed_strings }
            | SimulatedValues::Binary { allowed_strings }
                if allowed_strings.is_empty() =>
            {
                Err(invalid("no allowed strings"))
            }
            SimulatedValues::Double { min, max } if !is_float_range(*min, *max) => {
                Err(invalid("min and max must be finite, min not greater than max"))
            }
            SimulatedValues::Integer { min, max } if min > max => {
                Err(invalid("min is greater than max"))
            }
            _ => Ok(()),
        }
    }

    /// Draw a random value, `None` if the value range is invalid
    pub fn sample(&self, rng: &mut impl Rng) -> Option<Value> {
        let value = match &self.values {
            SimulatedValues::String { allowed_strings } => {
                Value::from(allowed_strings.choose(rng)?.as_str())
            }
            SimulatedValues::Double { min, max } if is_float_range(*min, *max) => {
                Value::from(rng.random_range(*min..=*max))
            }
            SimulatedValues::Integer { min, max } if min <= max => {
                Value::from(rng.random_range(*min..=*max))
            }
            SimulatedValues::Boolean => Value::from(rng.random::<bool>()),
            SimulatedValues::Binary { allowed_strings } => {
                Value::from(BASE64_STANDARD.encode(allowed_strings.choose(rng)?))
            }
            _ => return None,
        };
        Some(value)
    }
}

fn is_float_range(min: f64, max: f64) -> bool {
    min.is_finite() && max.is_finite() && min <= max
}

/// Publish random measures at a fixed interval
#[derive(Debug, Clone)]
pub struct Simulation {
    pub device_alternate_id: String,
    pub capability_alternate_id: String,
    pub sensor_alternate_id: String,
    pub measures: Vec<SimulatedMeasure>,

    /// Default: 1 second
    pub interval: Duration,

    /// Default: 60 seconds
    pub runtime: Duration,
}

impl Simulation {
    pub fn new(
        device_alternate_id: impl Into<String>,
        capability_alternate_id: impl Into<String>,
        sensor_alternate_id: impl Into<String>,
        measures: Vec<SimulatedMeasure>,
    ) -> Self {
        Simulation {
            device_alternate_id: device_alternate_id.into(),
            capability_alternate_id: capability_alternate_id.into(),
            sensor_alternate_id: sensor_alternate_id.into(),
            measures,
            interval: Duration::from_secs(1),
            runtime: Duration::from_secs(60),
        }
    }

    pub fn with_interval(self, interval: Duration) -> Self {
        Self { interval, ..self }
    }

    pub fn with_runtime(self, runtime: Duration) -> Self {
        Self { runtime, ..self }
    }

    /// One set of random measures, each measure holding a single key
    pub fn sample(&self, rng: &mut impl Rng) -> Result<Vec<Measure>, MqttGatewayError> {
        self.measures
            .iter()
            .map(|measure| {
                measure.validate()?;
                let value = measure.sample(rng).unwrap_or(Value::Null);
                let mut simulated = Measure::new();
                simulated.insert(measure.key.clone(), value);
                Ok(simulated)
            })
            .collect()
    }

    /// Publish random measures every interval until the runtime is elapsed.
    ///
    /// Publish failures are logged and do not stop the simulation.
    /// Returns the number of measure messages successfully published.
    pub async fn run<S, R>(&self, sink: &S, rng: &mut R) -> Result<usize, MqttGatewayError>
    where
        S: MeasureSink + ?Sized,
        R: Rng + Send,
    {
        if self.interval.is_zero() {
            return Err(MqttGatewayError::InvalidSimulatedMeasure {
                key: String::new(),
                reason: "the interval must not be zero".to_string(),
            });
        }
        for measure in &self.measures {
            measure.validate()?;
        }

        let start = Instant::now();
        let mut ticker = tokio::time::interval(self.interval);
        let mut published = 0;
        loop {
            ticker.tick().await;
            if start.elapsed() >= self.runtime {
                break;
            }
            let measures = self.sample(rng)?;
            match sink
                .publish_measures(
                    &self.device_alternate_id,
                    &self.capability_alternate_id,
                    &self.sensor_alternate_id,
                    measures,
                )
                .await
            {
                Ok(()) => published += 1,
                Err(err) => warn!("Fail to publish simulated measures: {err}"),
            }
        }

        info!(
            device = %self.device_alternate_id,
            "Simulation completed: {published} measure message(s) published"
        );
        Ok(published)
    }
}
