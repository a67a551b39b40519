//! rumqttc-backed publisher.
//!
//! `MqttRuntime` owns the connection: the synchronous event loop runs on one
//! background thread and is drained until disconnect. Publishing goes through
//! cheap [`MqttPublisher`] handles that share the client request channel.
//! Requests never block the caller: while the broker is unreachable the
//! channel fills up and further publishes fail instead of waiting.

use anyhow::{Context, Result};
use rumqttc::v5::mqttbytes::v5::LastWill;
use rumqttc::v5::{mqttbytes::QoS, Client, Connection, Event, MqttOptions};
use rumqttc::Outgoing;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::endpoint::MqttEndpoint;
use super::tls::{build_transport, TlsMaterials};
use super::{Publisher, PAYLOAD_OFFLINE};

const KEEP_ALIVE: Duration = Duration::from_secs(60);
const REQUEST_CAPACITY: usize = 10;
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const STOP_POLL: Duration = Duration::from_millis(100);

#[derive(Clone, Debug)]
pub struct MqttSettings {
    pub endpoint: MqttEndpoint,
    pub tls: TlsMaterials,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Receives a retained `offline` Last Will on unclean disconnect.
    pub will_topic: String,
}

pub struct MqttRuntime {
    client: Client,
    stopping: Arc<AtomicBool>,
    connection_handle: Option<std::thread::JoinHandle<()>>,
}

impl MqttRuntime {
    pub fn connect(settings: &MqttSettings) -> Result<Self> {
        let endpoint = &settings.endpoint;
        let mut options = MqttOptions::new(&settings.client_id, &endpoint.host, endpoint.port);
        options.set_keep_alive(KEEP_ALIVE);
        options.set_clean_start(true);
        if let Some(user) = settings.username.as_deref() {
            options.set_credentials(user, settings.password.as_deref().unwrap_or_default());
        }
        let will = LastWill::new(
            &settings.will_topic,
            PAYLOAD_OFFLINE.as_bytes().to_vec(),
            QoS::AtLeastOnce,
            true,
            None,
        );
        options.set_last_will(will);
        options.set_transport(
            build_transport(endpoint, &settings.tls).context("configure MQTT transport")?,
        );

        let (client, connection) = Client::new(options, REQUEST_CAPACITY);
        log::info!(
            "MQTT client configured for {}:{} (TLS: {}, auth: {})",
            endpoint.host,
            endpoint.port,
            endpoint.use_tls,
            settings.username.is_some()
        );
        Ok(Self::spawn(client, connection))
    }

    fn spawn(client: Client, mut connection: Connection) -> Self {
        let stopping = Arc::new(AtomicBool::new(false));
        let flag = stopping.clone();
        let handle = std::thread::spawn(move || {
            for event in connection.iter() {
                match event {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
                    Ok(Event::Incoming(_)) | Ok(Event::Outgoing(_)) => {}
                    Err(e) => {
                        if flag.load(Ordering::SeqCst) {
                            break;
                        }
                        log::warn!("MQTT connection error: {}", e);
                        let mut waited = Duration::ZERO;
                        while waited < RECONNECT_DELAY && !flag.load(Ordering::SeqCst) {
                            std::thread::sleep(STOP_POLL);
                            waited += STOP_POLL;
                        }
                    }
                }
            }
        });

        Self {
            client,
            stopping,
            connection_handle: Some(handle),
        }
    }

    pub fn publisher(&self) -> MqttPublisher {
        MqttPublisher {
            client: self.client.clone(),
        }
    }

    /// Flush queued publishes, send DISCONNECT and join the event loop.
    ///
    /// With a full request queue the DISCONNECT cannot be queued; the event
    /// loop is then left to exit on its next connection error.
    pub fn disconnect(mut self) -> Result<()> {
        self.stopping.store(true, Ordering::SeqCst);
        self.client.try_disconnect().context("MQTT disconnect")?;
        if let Some(handle) = self.connection_handle.take() {
            let _ = handle.join();
        }
        Ok(())
    }
}

/// Publishes with QoS 1 through a shared client.
#[derive(Clone)]
pub struct MqttPublisher {
    client: Client,
}

impl Publisher for MqttPublisher {
    fn publish(&self, topic: &str, payload: &[u8], retain: bool) -> Result<()> {
        self.client
            .try_publish(topic, QoS::AtLeastOnce, retain, payload.to_vec())
            .with_context(|| format!("queue MQTT publish to {}", topic))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::sync::mpsc;

    #[test]
    fn tls_material_mismatch_fails_before_connecting() {
        let settings = MqttSettings {
            endpoint: MqttEndpoint::parse("127.0.0.1:1883", false).unwrap(),
            tls: TlsMaterials {
                ca: Some(b"ca".to_vec()),
                client_auth: None,
            },
            client_id: "camera_motiond".to_string(),
            username: None,
            password: None,
            will_topic: "camera_detection/status".to_string(),
        };
        assert!(MqttRuntime::connect(&settings).is_err());
    }

    fn unreachable_broker() -> MqttSettings {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
            listener.local_addr().expect("addr").port()
        };
        MqttSettings {
            endpoint: MqttEndpoint::parse(&format!("127.0.0.1:{}", port), false).unwrap(),
            tls: TlsMaterials::default(),
            client_id: "camera_motiond_test".to_string(),
            username: None,
            password: None,
            will_topic: "camera_detection/status".to_string(),
        }
    }

    #[test]
    fn publishing_without_a_broker_fails_instead_of_blocking() {
        let runtime = MqttRuntime::connect(&unreachable_broker()).expect("connect");
        let publisher = runtime.publisher();

        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let failures = (0..30)
                .filter(|_| {
                    publisher
                        .publish("camera_detection/motion/binary", b"ON", false)
                        .is_err()
                })
                .count();
            let _ = tx.send(failures);
        });
        let failures = rx
            .recv_timeout(Duration::from_secs(8))
            .expect("publish calls returned");
        assert!(failures > 0, "queue should have overflowed");

        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let _ = tx.send(runtime.disconnect().is_ok());
        });
        rx.recv_timeout(Duration::from_secs(8))
            .expect("disconnect returned");
    }
}
