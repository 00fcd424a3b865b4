//! ---
//! rc_section: "02-messaging"
//! rc_subsection: "module"
//! rc_type: "source"
//! rc_scope: "code"
//! rc_description: "MQTT over TLS transport backed by rumqttc."
//! rc_version: "v0.1.0"
//! rc_owner: "tbd"
//! ---
//! MQTT transport adapter.
//!
//! The event loop runs on its own task and forwards every inbound publish into
//! the inbound channel. A connection error ends the task and is reported
//! through [`Transport::health`]; there is no reconnect.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rulecheck_common::config::MqttConfig;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, TlsConfiguration,
};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::transport::{InboundSender, Transport};
use crate::{DeliveryGuarantee, InboundMessage, MessagingError, Result};

const TRANSPORT_NAME: &str = "mqtt";
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Live broker connection.
pub struct MqttTransport {
    client: AsyncClient,
    failure: Arc<Mutex<Option<String>>>,
    closing: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MqttTransport {
    /// Connect, wait for the CONNACK, subscribe to the configured topics and
    /// start the delivery task.
    pub async fn connect(config: &MqttConfig, inbound: InboundSender) -> Result<Self> {
        let missing = config.missing_keys();
        if !missing.is_empty() {
            return Err(MessagingError::Connection(format!(
                "Missing required MQTT configuration: {}",
                missing.join(", ")
            )));
        }
        let guarantee = DeliveryGuarantee::try_from(config.qos)?;
        let options = mqtt_options(config)?;
        let (client, mut eventloop) = AsyncClient::new(options, config.request_capacity);

        tokio::time::timeout(config.connect_timeout, await_connack(&mut eventloop))
            .await
            .map_err(|_| {
                MessagingError::Connection(format!(
                    "no CONNACK within {}s",
                    config.connect_timeout.as_secs()
                ))
            })??;
        info!(
            host = config.host.as_deref().unwrap_or_default(),
            port = config.port,
            "connected to broker"
        );

        for topic in &config.topics {
            client
                .subscribe(topic.as_str(), guarantee.to_mqtt())
                .await
                .map_err(|err| MessagingError::Connection(err.to_string()))?;
            debug!(topic = %topic, "subscription requested");
        }

        let failure = Arc::new(Mutex::new(None));
        let closing = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(delivery_loop(
            eventloop,
            inbound,
            failure.clone(),
            closing.clone(),
        ));

        Ok(Self {
            client,
            failure,
            closing,
            task: Mutex::new(Some(task)),
        })
    }

    /// Send DISCONNECT and wait briefly for the delivery task to finish.
    pub async fn disconnect(&self) -> Result<()> {
        self.closing.store(true, Ordering::SeqCst);
        if let Err(err) = self.client.disconnect().await {
            warn!(error = %err, "disconnect request failed");
        }
        let task = self.task.lock().take();
        if let Some(task) = task {
            if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
                warn!("delivery task did not stop within the grace period");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn publish(
        &self,
        topic: &str,
        payload: String,
        guarantee: DeliveryGuarantee,
    ) -> Result<()> {
        self.health()?;
        self.client
            .publish(topic, guarantee.to_mqtt(), false, payload.into_bytes())
            .await
            .map_err(|err| MessagingError::Transport {
                transport: TRANSPORT_NAME,
                reason: err.to_string(),
            })
    }

    fn health(&self) -> Result<()> {
        match self.failure.lock().as_ref() {
            Some(reason) => Err(MessagingError::Connection(reason.clone())),
            None => Ok(()),
        }
    }

    fn name(&self) -> &'static str {
        TRANSPORT_NAME
    }
}

async fn await_connack(eventloop: &mut EventLoop) -> Result<()> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                return if connack.code == ConnectReturnCode::Success {
                    Ok(())
                } else {
                    Err(MessagingError::Connection(format!(
                        "broker refused connection: {:?}",
                        connack.code
                    )))
                };
            }
            Ok(_) => continue,
            Err(err) => return Err(MessagingError::Connection(err.to_string())),
        }
    }
}

async fn delivery_loop(
    mut eventloop: EventLoop,
    inbound: InboundSender,
    failure: Arc<Mutex<Option<String>>>,
    closing: Arc<AtomicBool>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = InboundMessage::new(publish.topic, publish.payload);
                if inbound.send(message).is_err() {
                    debug!("inbound receiver dropped, stopping delivery task");
                    break;
                }
            }
            Ok(Event::Incoming(Packet::SubAck(ack))) => {
                debug!(pkid = ack.pkid, codes = ?ack.return_codes, "subscription acknowledged");
            }
            Ok(_) => {}
            Err(err) => {
                if closing.load(Ordering::SeqCst) {
                    debug!(error = %err, "event loop closed");
                } else {
                    error!(error = %err, "broker connection lost");
                    *failure.lock() = Some(err.to_string());
                }
                break;
            }
        }
    }
}

fn mqtt_options(config: &MqttConfig) -> Result<MqttOptions> {
    let client_id = config.client_id.clone().unwrap_or_default();
    let host = config.host.clone().unwrap_or_default();
    let mut options = MqttOptions::new(client_id, host, config.port);
    options.set_keep_alive(config.keep_alive);
    options.set_transport(rumqttc::Transport::tls_with_config(tls_configuration(
        config,
    )?));
    Ok(options)
}

/// Assemble the TLS settings: CA-verified by default, verification skipped
/// entirely when `tls_insecure` is set.
pub fn tls_configuration(config: &MqttConfig) -> Result<TlsConfiguration> {
    let (certfile, keyfile) = match (&config.certfile, &config.keyfile) {
        (Some(cert), Some(key)) => (cert, key),
        _ => {
            return Err(MessagingError::Tls(
                "client certificate and key are required".to_owned(),
            ))
        }
    };

    if config.tls_insecure {
        let certs = load_certs(certfile)?;
        let key = load_private_key(keyfile)?;
        let client_config = ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert::new()))
            .with_client_auth_cert(certs, key)
            .map_err(|err| MessagingError::Tls(err.to_string()))?;
        return Ok(TlsConfiguration::Rustls(Arc::new(client_config)));
    }

    let ca_path = config
        .ca_certs
        .as_ref()
        .ok_or_else(|| MessagingError::Tls("ca_certs is required unless tls_insecure".into()))?;
    Ok(TlsConfiguration::Simple {
        ca: fs::read(ca_path)?,
        alpn: None,
        client_auth: Some((fs::read(certfile)?, fs::read(keyfile)?)),
    })
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let pem = fs::read(path)?;
    let certs = rustls_pemfile::certs(&mut &pem[..]).collect::<std::io::Result<Vec<_>>>()?;
    if certs.is_empty() {
        return Err(MessagingError::Tls(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let pem = fs::read(path)?;
    rustls_pemfile::private_key(&mut &pem[..])?.ok_or_else(|| {
        MessagingError::Tls(format!("no private key found in {}", path.display()))
    })
}

/// Accepts any server certificate. Handshake signatures are still checked.
#[derive(Debug)]
struct AcceptAnyServerCert {
    algorithms: WebPkiSupportedAlgorithms,
}

impl AcceptAnyServerCert {
    fn new() -> Self {
        Self {
            algorithms: rustls::crypto::ring::default_provider().signature_verification_algorithms,
        }
    }
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}
