use crate::Config;
use crate::Correlator;
use crate::Dispatcher;
use crate::GatewayTopic;
use crate::MeasureSink;
use crate::Message;
use crate::MqttGatewayError;
use crate::PendingMessage;
use crate::Topic;
use async_trait::async_trait;
use certificate::create_tls_config;
use certificate::rustls::ClientConfig;
use certificate::TlsIdentity;
use clock::unix_millis;
use clock::Clock;
use clock::WallClock;
use gateway_api::Measure;
use gateway_api::MeasureEnvelope;
use gateway_api::MessageId;
use rumqttc::AsyncClient;
use rumqttc::Event;
use rumqttc::EventLoop;
use rumqttc::Incoming;
use rumqttc::Outgoing;
use rumqttc::Packet;
use rumqttc::QoS;
use rumqttc::SubAck;
use rumqttc::SubscribeReasonCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::warn;

/// Time given to the dispatch loop to flush the disconnect request
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// The state of the connection to the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    /// Connected and subscribed to a command topic
    SubscribedCommands,
}

/// A measure message published and waiting for its acknowledgement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMeasure {
    pub message_id: MessageId,
    pub topic: Topic,
}

/// An MQTT client publishing measures on behalf of a device.
///
/// On connect, the client subscribes to the acknowledgement topic of the device.
/// The acknowledgements and commands are then processed by a background dispatch loop
/// that runs until [GatewayClient::disconnect] is called or the connection is lost.
/// A lost connection is reported to the connection-lost handler, and never re-established
/// by the client itself.
///
/// ```no_run
/// use certificate::build_identity;
/// use mqtt_gateway::{AckFailure, Config, GatewayClient};
/// use serde_json::json;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn example(pem_bundle: &str, secret: &str) -> Result<(), Box<dyn std::error::Error>> {
/// let identity = build_identity(pem_bundle, secret)?;
/// let config = Config::new("my-instance.example.com", "dev-42");
/// let client = GatewayClient::new(config, &identity)?;
///
/// client.set_error_handler(Arc::new(|failures: &[AckFailure]| {
///     for failure in failures {
///         eprintln!("{} rejected: {}", failure.message_id, failure.error);
///     }
/// }));
/// client.connect(Duration::from_secs(60)).await?;
///
/// let measure = json!({"temperature": 21.5}).as_object().cloned().unwrap_or_default();
/// client.publish("cap-1", "sensor-1", vec![measure], None, None).await?;
///
/// let unacknowledged = client.disconnect().await;
/// # Ok(())
/// # }
/// ```
pub struct GatewayClient {
    config: Config,
    tls_config: ClientConfig,
    clock: Arc<dyn Clock>,
    dispatcher: Arc<Dispatcher>,
    status: watch::Sender<ConnectionStatus>,
    session: Mutex<Option<Session>>,
}

struct Session {
    handle: SessionHandle,
    dispatch_loop: JoinHandle<()>,
}

#[derive(Clone)]
struct SessionHandle {
    mqtt_client: AsyncClient,
    /// Responses to the command subscriptions, one request at a time
    sub_acks: Arc<Mutex<mpsc::UnboundedReceiver<SubAck>>>,
}

impl GatewayClient {
    /// Create a client for the device, authenticated by the given identity.
    ///
    /// The TLS configuration is built once and reused on each connection.
    pub fn new(config: Config, identity: &TlsIdentity) -> Result<Self, MqttGatewayError> {
        GatewayClient::with_clock(config, identity, Arc::new(WallClock))
    }

    pub fn with_clock(
        config: Config,
        identity: &TlsIdentity,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, MqttGatewayError> {
        if config.device_alternate_id.is_empty() {
            return Err(MqttGatewayError::MissingDeviceId);
        }
        let tls_config = create_tls_config(identity, &config.trust_roots)?;
        let correlator = Arc::new(Correlator::new());
        let dispatcher = Arc::new(Dispatcher::new(correlator, config.pending_ttl));
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);

        Ok(GatewayClient {
            config,
            tls_config,
            clock,
            dispatcher,
            status,
            session: Mutex::new(None),
        })
    }

    pub fn device_alternate_id(&self) -> &str {
        &self.config.device_alternate_id
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Watch the connection status
    pub fn status_updates(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Set the handler called with the measure messages rejected by the gateway.
    ///
    /// The handler is called once per acknowledgement batch, with all the failures of the batch.
    /// It replaces any previous error handler.
    /// Without error handler, the failures are silently dropped.
    pub fn set_error_handler(&self, handler: crate::ErrorHandler) {
        self.dispatcher.set_error_handler(Some(handler))
    }

    /// Set the handler called with the commands received on the subscribed command topics.
    ///
    /// It replaces any previous command handler.
    pub fn set_command_handler(&self, handler: crate::CommandHandler) {
        self.dispatcher.set_command_handler(Some(handler))
    }

    /// Set the handler called when the connection to the gateway is lost.
    ///
    /// It replaces any previous connection-lost handler.
    pub fn set_connection_lost_handler(&self, handler: crate::ConnectionLostHandler) {
        self.dispatcher.set_connection_lost_handler(Some(handler))
    }

    pub fn clear_handlers(&self) {
        self.dispatcher.set_error_handler(None);
        self.dispatcher.set_command_handler(None);
        self.dispatcher.set_connection_lost_handler(None);
    }

    /// Connect the gateway and subscribe to the acknowledgement topic of the device.
    ///
    /// Returns once the subscription has been granted,
    /// or fails with `ConnectTimeout` after the configured response timeout.
    /// Fails with `AlreadyConnected` if the client is already connected.
    pub async fn connect(&self, keep_alive: Duration) -> Result<(), MqttGatewayError> {
        if !keep_alive.is_zero() && keep_alive < Duration::from_secs(1) {
            return Err(MqttGatewayError::InvalidKeepAlive(keep_alive));
        }

        let mut session = self.session.lock().await;
        if let Some(current) = session.as_ref() {
            if !current.dispatch_loop.is_finished() {
                return Err(MqttGatewayError::AlreadyConnected);
            }
        }

        self.status.send_replace(ConnectionStatus::Connecting);
        let timeout = self.config.response_timeout;
        let opened = tokio::time::timeout(timeout, self.open(keep_alive))
            .await
            .unwrap_or(Err(MqttGatewayError::ConnectTimeout(timeout)));
        let (mqtt_client, event_loop) = match opened {
            Ok(connection) => connection,
            Err(err) => {
                self.status.send_replace(ConnectionStatus::Disconnected);
                return Err(err);
            }
        };

        // Set before the dispatch loop starts, which might report a loss right away
        self.status.send_replace(ConnectionStatus::Connected);
        let (sub_ack_sender, sub_acks) = mpsc::unbounded_channel();
        let dispatch_loop = tokio::spawn(GatewayClient::dispatch_loop(
            event_loop,
            self.dispatcher.clone(),
            self.status.clone(),
            sub_ack_sender,
        ));
        *session = Some(Session {
            handle: SessionHandle {
                mqtt_client,
                sub_acks: Arc::new(Mutex::new(sub_acks)),
            },
            dispatch_loop,
        });
        info!(
            device = %self.config.device_alternate_id,
            "Connected to {}:{}", self.config.host, self.config.port
        );
        Ok(())
    }

    /// Connect using the keep-alive interval of the configuration
    pub async fn connect_with_default_keep_alive(&self) -> Result<(), MqttGatewayError> {
        self.connect(self.config.keep_alive).await
    }

    async fn open(
        &self,
        keep_alive: Duration,
    ) -> Result<(AsyncClient, EventLoop), MqttGatewayError> {
        let mqtt_options = self.config.mqtt_options(self.tls_config.clone(), keep_alive);
        let (mqtt_client, mut event_loop) =
            AsyncClient::new(mqtt_options, self.config.queue_capacity);
        let ack_topic = GatewayTopic::Ack(self.config.device_alternate_id.clone()).to_topic()?;

        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    mqtt_client.subscribe(&ack_topic.name, QoS::AtLeastOnce).await?;
                }

                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    check_subscription(&ack, &ack_topic)?;
                    break;
                }

                Ok(Event::Incoming(Packet::Publish(msg))) => {
                    // Messages can be received before a sub ack
                    self.dispatcher.dispatch(msg.into());
                }

                Err(err) => return Err(err.into()),

                _ => (),
            }
        }

        Ok((mqtt_client, event_loop))
    }

    /// Process all the MQTT events until disconnect or connection failure
    async fn dispatch_loop(
        mut event_loop: EventLoop,
        dispatcher: Arc<Dispatcher>,
        status: watch::Sender<ConnectionStatus>,
        sub_acks: mpsc::UnboundedSender<SubAck>,
    ) {
        let lost = loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::Publish(msg))) => {
                    dispatcher.dispatch(msg.into());
                }

                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    if let Err(unexpected) = sub_acks.send(ack) {
                        debug!(pkid = unexpected.0.pkid, "Ignoring subscription acknowledgement");
                    }
                }

                Ok(Event::Incoming(Incoming::Disconnect)) => {
                    break Some(MqttGatewayError::ConnectionClosed);
                }

                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    break None;
                }

                Err(err) => {
                    break Some(MqttGatewayError::from(err));
                }

                _ => (),
            }
        };

        status.send_replace(ConnectionStatus::Disconnected);
        match lost {
            None => debug!("Disconnected from the gateway"),
            Some(err) => {
                warn!("Connection to the gateway lost: {err}");
                dispatcher.connection_lost(&err);
            }
        }
    }

    /// Subscribe to the command topic of a device.
    ///
    /// Returns once the gateway granted the subscription.
    /// Fails with `SubscriptionRejected` if refused
    /// and with `SubscriptionTimeout` if not answered within the response timeout.
    pub async fn subscribe_commands(
        &self,
        device_alternate_id: &str,
    ) -> Result<(), MqttGatewayError> {
        let topic = GatewayTopic::Commands(device_alternate_id.to_string()).to_topic()?;
        let handle = self.session_handle().await?;

        let mut sub_acks = handle.sub_acks.lock().await;
        // Late responses to subscriptions given up on timeout
        while sub_acks.try_recv().is_ok() {}
        handle
            .mqtt_client
            .subscribe(&topic.name, QoS::AtLeastOnce)
            .await?;
        let timeout = self.config.response_timeout;
        let ack = match tokio::time::timeout(timeout, sub_acks.recv()).await {
            Ok(Some(ack)) => ack,
            Ok(None) => return Err(MqttGatewayError::NotConnected),
            Err(_) => {
                return Err(MqttGatewayError::SubscriptionTimeout {
                    topic: topic.name,
                    timeout,
                })
            }
        };
        check_subscription(&ack, &topic)?;

        self.status.send_if_modified(|status| {
            let connected = *status == ConnectionStatus::Connected;
            if connected {
                *status = ConnectionStatus::SubscribedCommands;
            }
            connected
        });
        debug!(%topic, "Subscribed to commands");
        Ok(())
    }

    /// Publish measures for a device, by default the device of this client.
    ///
    /// The measure message is registered as pending before being sent,
    /// and stays pending until acknowledged by the gateway.
    /// Returns as soon as the message has been handed over to the MQTT connection.
    pub async fn publish(
        &self,
        capability_alternate_id: &str,
        sensor_alternate_id: &str,
        measures: Vec<Measure>,
        device_alternate_id: Option<&str>,
        timestamp: Option<i64>,
    ) -> Result<PublishedMeasure, MqttGatewayError> {
        let device = device_alternate_id.unwrap_or(&self.config.device_alternate_id);
        let topic = GatewayTopic::Measures(device.to_string()).to_topic()?;
        let mqtt_client = self.session_handle().await?.mqtt_client;

        let message_id = MessageId::random();
        let envelope = self
            .measure_envelope(capability_alternate_id, sensor_alternate_id, measures, timestamp)
            .with_message_id(message_id.clone());
        let message = Message::new(&topic, serde_json::to_vec(&envelope)?)
            .with_qos(self.config.publish_qos);

        let correlator = self.dispatcher.correlator();
        correlator.track(message_id.clone(), envelope)?;
        if let Err(err) = mqtt_client
            .publish(message.topic.name, message.qos, false, message.payload)
            .await
        {
            correlator.resolve(&message_id);
            return Err(err.into());
        }

        debug!(%message_id, %topic, "Measure message published");
        Ok(PublishedMeasure { message_id, topic })
    }

    fn measure_envelope(
        &self,
        capability_alternate_id: &str,
        sensor_alternate_id: &str,
        measures: Vec<Measure>,
        timestamp: Option<i64>,
    ) -> MeasureEnvelope {
        let timestamp = timestamp.unwrap_or_else(|| unix_millis(self.clock.now()));
        MeasureEnvelope::new(capability_alternate_id, sensor_alternate_id, measures)
            .with_timestamp(timestamp)
    }

    /// Number of measure messages waiting for their acknowledgement
    pub fn pending_count(&self) -> usize {
        self.dispatcher.correlator().len()
    }

    /// Report the messages pending for longer than the time-to-live to the error handler.
    ///
    /// This is done by the dispatch loop on each acknowledgement batch,
    /// but can also be triggered when no acknowledgements are received anymore.
    pub fn evict_expired(&self) -> usize {
        let expired = self.dispatcher.evict_expired();
        let count = expired.len();
        self.dispatcher.report_failures(expired);
        count
    }

    /// Disconnect from the gateway, stopping the dispatch loop.
    ///
    /// Returns the measure messages that have not been acknowledged,
    /// which are no longer tracked afterwards.
    pub async fn disconnect(&self) -> Vec<PendingMessage> {
        if let Some(session) = self.session.lock().await.take() {
            let Session {
                handle,
                mut dispatch_loop,
            } = session;
            if !dispatch_loop.is_finished() {
                if let Err(err) = handle.mqtt_client.disconnect().await {
                    debug!("Fail to send the disconnect request: {err}");
                }
                if tokio::time::timeout(DISCONNECT_TIMEOUT, &mut dispatch_loop)
                    .await
                    .is_err()
                {
                    warn!("The dispatch loop did not stop on disconnect");
                    dispatch_loop.abort();
                }
            }
        }
        self.status.send_replace(ConnectionStatus::Disconnected);

        let pending = self.dispatcher.correlator().drain();
        if !pending.is_empty() {
            info!("{} measure message(s) not acknowledged", pending.len());
        }
        pending
    }

    async fn session_handle(&self) -> Result<SessionHandle, MqttGatewayError> {
        // Not waiting for the session lock held by a pending connect
        if matches!(
            self.status(),
            ConnectionStatus::Disconnected | ConnectionStatus::Connecting
        ) {
            return Err(MqttGatewayError::NotConnected);
        }
        match self.session.lock().await.as_ref() {
            Some(session) if !session.dispatch_loop.is_finished() => Ok(session.handle.clone()),
            _ => Err(MqttGatewayError::NotConnected),
        }
    }
}

fn check_subscription(ack: &SubAck, topic: &Topic) -> Result<(), MqttGatewayError> {
    if ack.return_codes.contains(&SubscribeReasonCode::Failure) {
        return Err(MqttGatewayError::SubscriptionRejected {
            topic: topic.name.clone(),
        });
    }
    Ok(())
}

#[async_trait]
impl MeasureSink for GatewayClient {
    async fn publish_measures(
        &self,
        device_alternate_id: &str,
        capability_alternate_id: &str,
        sensor_alternate_id: &str,
        measures: Vec<Measure>,
    ) -> Result<(), MqttGatewayError> {
        self.publish(
            capability_alternate_id,
            sensor_alternate_id,
            measures,
            Some(device_alternate_id),
            None,
        )
        .await
        .map(|_| ())
    }
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("device_alternate_id", &self.config.device_alternate_id)
            .field("status", &self.status())
            .finish()
    }
}
