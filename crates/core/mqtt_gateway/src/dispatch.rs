use crate::Correlator;
use crate::GatewayTopic;
use crate::Message;
use crate::MqttGatewayError;
use gateway_api::parse_ack_batch;
use gateway_api::AckEntry;
use gateway_api::Command;
use gateway_api::MeasureEnvelope;
use gateway_api::MessageId;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::time::Duration;
use tracing::debug;
use tracing::warn;

/// Reason given for the messages evicted after their time-to-live
pub const NO_ACK_REASON: &str = "no acknowledgement received";

/// A measure message rejected by the gateway
#[derive(Debug, Clone, PartialEq)]
pub struct AckFailure {
    pub message_id: MessageId,

    /// The measure message as published
    pub message: MeasureEnvelope,

    /// The failure reasons given by the gateway
    pub error: String,
}

/// Called once per acknowledgement batch with all the failures of the batch
pub type ErrorHandler = Arc<dyn Fn(&[AckFailure]) + Send + Sync>;

/// Called with the device alternate id and the command received for this device
pub type CommandHandler = Arc<dyn Fn(&str, Command) + Send + Sync>;

/// Called when the connection to the gateway is lost
pub type ConnectionLostHandler = Arc<dyn Fn(&MqttGatewayError) + Send + Sync>;

/// A registered handler, replaced as a whole when a new one is set
struct HandlerSlot<H> {
    handler: RwLock<Option<H>>,
}

impl<H: Clone> HandlerSlot<H> {
    fn set(&self, handler: Option<H>) {
        *self.handler.write().unwrap_or_else(PoisonError::into_inner) = handler;
    }

    // The handler is cloned out of the lock, so it can replace itself when called
    fn get(&self) -> Option<H> {
        self.handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl<H> Default for HandlerSlot<H> {
    fn default() -> Self {
        HandlerSlot {
            handler: RwLock::new(None),
        }
    }
}

/// Routes the messages received from the gateway:
/// acknowledgements are matched against the pending messages
/// and commands are forwarded to the command handler.
pub struct Dispatcher {
    correlator: Arc<Correlator>,
    pending_ttl: Option<Duration>,
    on_error: HandlerSlot<ErrorHandler>,
    on_command: HandlerSlot<CommandHandler>,
    on_connection_lost: HandlerSlot<ConnectionLostHandler>,
}

impl Dispatcher {
    pub fn new(correlator: Arc<Correlator>, pending_ttl: Option<Duration>) -> Self {
        Dispatcher {
            correlator,
            pending_ttl,
            on_error: HandlerSlot::default(),
            on_command: HandlerSlot::default(),
            on_connection_lost: HandlerSlot::default(),
        }
    }

    pub fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    pub fn set_error_handler(&self, handler: Option<ErrorHandler>) {
        self.on_error.set(handler)
    }

    pub fn set_command_handler(&self, handler: Option<CommandHandler>) {
        self.on_command.set(handler)
    }

    pub fn set_connection_lost_handler(&self, handler: Option<ConnectionLostHandler>) {
        self.on_connection_lost.set(handler)
    }

    pub fn dispatch(&self, message: Message) {
        match GatewayTopic::parse(&message.topic.name) {
            Some(GatewayTopic::Ack(_)) => self.on_ack_message(&message),
            Some(GatewayTopic::Commands(device)) => self.on_command_message(&device, &message),
            _ => debug!(topic = %message.topic, "Ignoring message on unexpected topic"),
        }
    }

    pub fn connection_lost(&self, error: &MqttGatewayError) {
        match self.on_connection_lost.get() {
            Some(handler) => handler(error),
            None => debug!("No connection-lost handler: {error}"),
        }
    }

    fn on_ack_message(&self, message: &Message) {
        let batch = match message
            .payload_str()
            .and_then(|payload| parse_ack_batch(payload).map_err(MqttGatewayError::from))
        {
            Ok(batch) => batch,
            Err(err) => {
                warn!(topic = %message.topic, "Ignoring acknowledgements: {err}");
                return;
            }
        };
        for (entry, err) in &batch.invalid_entries {
            warn!(topic = %message.topic, "Ignoring acknowledgement {entry}: {err}");
        }

        let mut failures = self.process_ack_batch(batch.entries);
        failures.extend(self.evict_expired());
        self.report_failures(failures);
    }

    /// Remove the acknowledged messages from the pending ones
    /// and return those of them that have been rejected.
    pub fn process_ack_batch(&self, batch: Vec<AckEntry>) -> Vec<AckFailure> {
        let mut failures = Vec::new();
        for entry in batch {
            let Some(pending) = self.correlator.resolve(&entry.id) else {
                warn!(
                    message_id = %entry.id,
                    code = ?entry.code,
                    "Acknowledgement for an unknown message"
                );
                continue;
            };
            if entry.is_success() {
                debug!(
                    message_id = %entry.id,
                    code = ?entry.code,
                    "Measure message acknowledged"
                );
            } else {
                failures.push(AckFailure {
                    message_id: pending.message_id,
                    message: pending.payload,
                    error: entry.reason(),
                });
            }
        }
        failures
    }

    /// Remove the messages pending for longer than the time-to-live, if any,
    /// and return them as failures.
    pub fn evict_expired(&self) -> Vec<AckFailure> {
        let Some(ttl) = self.pending_ttl else {
            return vec![];
        };
        self.correlator
            .evict_older_than(ttl)
            .into_iter()
            .map(|pending| AckFailure {
                message_id: pending.message_id,
                message: pending.payload,
                error: NO_ACK_REASON.to_string(),
            })
            .collect()
    }

    pub fn report_failures(&self, failures: Vec<AckFailure>) {
        if failures.is_empty() {
            return;
        }
        match self.on_error.get() {
            Some(handler) => handler(&failures),
            None => debug!("No error handler: dropping {} failure(s)", failures.len()),
        }
    }

    fn on_command_message(&self, device: &str, message: &Message) {
        let command = match message
            .payload_str()
            .and_then(|payload| Command::from_json(payload).map_err(MqttGatewayError::from))
        {
            Ok(command) => command,
            Err(err) => {
                warn!(topic = %message.topic, "Ignoring command: {err}");
                return;
            }
        };

        match self.on_command.get() {
            Some(handler) => handler(device, command),
            None => debug!(topic = %message.topic, "No command handler: dropping command"),
        }
    }
}
