//! An MQTT gateway running in the test process, over TLS with client authentication.
//!
//! The gateway serves one connection at a time and answers the client as a broker would:
//! connections are accepted, subscriptions granted and QoS 1/2 publishes acknowledged.
//! The tests observe the packets sent by the client and push messages to it.
use crate::GATEWAY_SERVER_CERT_PEM;
use crate::GATEWAY_SERVER_KEY_PEM;
use bytes::BytesMut;
use rumqttc::ConnAck;
use rumqttc::ConnectReturnCode;
use rumqttc::Packet;
use rumqttc::PubAck;
use rumqttc::PubComp;
use rumqttc::PubRec;
use rumqttc::Publish;
use rumqttc::QoS;
use rumqttc::SubAck;
use rumqttc::SubscribeReasonCode;
use rustls::client::danger::HandshakeSignatureValid;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::CertificateDer;
use rustls::pki_types::PrivateKeyDer;
use rustls::pki_types::UnixTime;
use rustls::server::danger::ClientCertVerified;
use rustls::server::danger::ClientCertVerifier;
use rustls::DigitallySignedStruct;
use rustls::DistinguishedName;
use rustls::ServerConfig;
use rustls::SignatureScheme;
use rustls::SupportedProtocolVersion;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_rustls::TlsAcceptor;

const MAX_PACKET_SIZE: usize = 1024 * 1024;

/// How long the helpers wait for a packet from the client
pub const RECEIVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Server side TLS configuration of the test gateway, restricted to the given versions
pub fn gateway_server_config(versions: &[&'static SupportedProtocolVersion]) -> ServerConfig {
    gateway_server_config_with_verifier(versions, Arc::new(RecordingVerifier::default()))
}

fn gateway_server_config_with_verifier(
    versions: &[&'static SupportedProtocolVersion],
    verifier: Arc<RecordingVerifier>,
) -> ServerConfig {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let chain = CertificateDer::pem_slice_iter(GATEWAY_SERVER_CERT_PEM.as_bytes())
        .collect::<Result<Vec<_>, _>>()
        .expect("valid gateway certificate");
    let key = PrivateKeyDer::from_pem_slice(GATEWAY_SERVER_KEY_PEM.as_bytes())
        .expect("valid gateway key");
    ServerConfig::builder_with_provider(provider)
        .with_protocol_versions(versions)
        .expect("supported protocol versions")
        .with_client_cert_verifier(verifier)
        .with_single_cert(chain, key)
        .expect("consistent gateway certificate and key")
}

/// Requires a client certificate, checks the handshake signatures
/// but accepts any certificate, recording it.
#[derive(Debug)]
struct RecordingVerifier {
    provider: CryptoProvider,
    presented: Mutex<Vec<CertificateDer<'static>>>,
}

impl Default for RecordingVerifier {
    fn default() -> Self {
        RecordingVerifier {
            provider: rustls::crypto::ring::default_provider(),
            presented: Mutex::new(vec![]),
        }
    }
}

impl ClientCertVerifier for RecordingVerifier {
    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _now: UnixTime,
    ) -> Result<ClientCertVerified, rustls::Error> {
        if let Ok(mut presented) = self.presented.lock() {
            presented.push(end_entity.clone().into_owned());
        }
        Ok(ClientCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// How the test gateway answers the client
#[derive(Debug, Clone, Default)]
pub struct GatewayBehavior {
    /// Subscriptions to these topics are rejected
    pub rejected_topics: Vec<String>,

    /// Subscriptions to these topics are never answered
    pub unanswered_topics: Vec<String>,
}

enum Control {
    Send(Packet),
    Close,
}

pub struct TestGateway {
    port: u16,
    control: mpsc::UnboundedSender<Control>,
    received: mpsc::UnboundedReceiver<Packet>,
    verifier: Arc<RecordingVerifier>,
}

impl TestGateway {
    pub async fn start() -> TestGateway {
        TestGateway::start_with(GatewayBehavior::default()).await
    }

    pub async fn start_with(behavior: GatewayBehavior) -> TestGateway {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("a free port for the test gateway");
        let port = listener.local_addr().expect("a bound address").port();

        let verifier = Arc::new(RecordingVerifier::default());
        let tls_config = gateway_server_config_with_verifier(
            &[&rustls::version::TLS13, &rustls::version::TLS12],
            verifier.clone(),
        );
        let acceptor = TlsAcceptor::from(Arc::new(tls_config));

        let (control, control_receiver) = mpsc::unbounded_channel();
        let (received_sender, received) = mpsc::unbounded_channel();
        tokio::spawn(serve(
            listener,
            acceptor,
            behavior,
            control_receiver,
            received_sender,
        ));

        TestGateway {
            port,
            control,
            received,
            verifier,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Send a message to the connected client
    pub fn publish(&self, topic: &str, payload: impl Into<Vec<u8>>) {
        let message = Publish::new(topic, QoS::AtMostOnce, payload);
        let _ = self.control.send(Control::Send(Packet::Publish(message)));
    }

    /// Close the connection of the client, without MQTT disconnect
    pub fn close_connection(&self) {
        let _ = self.control.send(Control::Close);
    }

    /// The certificates presented by the clients so far
    pub fn client_certificates(&self) -> Vec<CertificateDer<'static>> {
        self.verifier
            .presented
            .lock()
            .map(|presented| presented.clone())
            .unwrap_or_default()
    }

    /// The next packet sent by the client, if any within [RECEIVE_TIMEOUT]
    pub async fn next_packet(&mut self) -> Option<Packet> {
        tokio::time::timeout(RECEIVE_TIMEOUT, self.received.recv())
            .await
            .ok()
            .flatten()
    }

    /// The next message published by the client
    pub async fn next_publish(&mut self) -> Option<Publish> {
        loop {
            if let Packet::Publish(message) = self.next_packet().await? {
                return Some(message);
            }
        }
    }

    /// The topic filters of the next subscription request of the client
    pub async fn next_subscription(&mut self) -> Option<Vec<String>> {
        loop {
            if let Packet::Subscribe(subscribe) = self.next_packet().await? {
                return Some(
                    subscribe
                        .filters
                        .into_iter()
                        .map(|filter| filter.path)
                        .collect(),
                );
            }
        }
    }
}

async fn serve(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    behavior: GatewayBehavior,
    mut control: mpsc::UnboundedReceiver<Control>,
    received: mpsc::UnboundedSender<Packet>,
) {
    while let Ok((tcp, _)) = listener.accept().await {
        let Ok(mut stream) = acceptor.accept(tcp).await else {
            continue;
        };
        serve_connection(&mut stream, &behavior, &mut control, &received).await;
        let _ = stream.shutdown().await;
    }
}

async fn serve_connection<S>(
    stream: &mut S,
    behavior: &GatewayBehavior,
    control: &mut mpsc::UnboundedReceiver<Control>,
    received: &mpsc::UnboundedSender<Packet>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buffer = BytesMut::new();
    loop {
        tokio::select! {
            read = stream.read_buf(&mut buffer) => {
                if !matches!(read, Ok(n) if n > 0) {
                    return;
                }
                loop {
                    let packet = match Packet::read(&mut buffer, MAX_PACKET_SIZE) {
                        Ok(packet) => packet,
                        Err(rumqttc::mqttbytes::Error::InsufficientBytes(_)) => break,
                        Err(_) => return,
                    };
                    let disconnect = packet == Packet::Disconnect;
                    let replies = replies_to(behavior, &packet);
                    let _ = received.send(packet);
                    for reply in replies {
                        if send(stream, reply).await.is_err() {
                            return;
                        }
                    }
                    if disconnect {
                        return;
                    }
                }
            }

            order = control.recv() => match order {
                Some(Control::Send(packet)) => {
                    if send(stream, packet).await.is_err() {
                        return;
                    }
                }
                Some(Control::Close) | None => return,
            }
        }
    }
}

fn replies_to(behavior: &GatewayBehavior, packet: &Packet) -> Vec<Packet> {
    match packet {
        Packet::Connect(_) => vec![Packet::ConnAck(ConnAck::new(
            ConnectReturnCode::Success,
            false,
        ))],
        Packet::Subscribe(subscribe)
            if subscribe
                .filters
                .iter()
                .any(|filter| behavior.unanswered_topics.contains(&filter.path)) =>
        {
            vec![]
        }
        Packet::Subscribe(subscribe) => {
            let return_codes = subscribe
                .filters
                .iter()
                .map(|filter| {
                    if behavior.rejected_topics.contains(&filter.path) {
                        SubscribeReasonCode::Failure
                    } else {
                        SubscribeReasonCode::Success(filter.qos)
                    }
                })
                .collect();
            vec![Packet::SubAck(SubAck::new(subscribe.pkid, return_codes))]
        }
        Packet::Publish(message) => match message.qos {
            QoS::AtMostOnce => vec![],
            QoS::AtLeastOnce => vec![Packet::PubAck(PubAck::new(message.pkid))],
            QoS::ExactlyOnce => vec![Packet::PubRec(PubRec::new(message.pkid))],
        },
        Packet::PubRel(release) => vec![Packet::PubComp(PubComp::new(release.pkid))],
        Packet::PingReq => vec![Packet::PingResp],
        _ => vec![],
    }
}

async fn send<S>(stream: &mut S, packet: Packet) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let mut bytes = BytesMut::new();
    packet
        .write(&mut bytes, MAX_PACKET_SIZE)
        .map_err(std::io::Error::other)?;
    stream.write_all(&bytes).await?;
    stream.flush().await
}
