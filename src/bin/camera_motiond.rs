//! camera_motiond - camera motion monitor with vision classification.
//!
//! This daemon:
//! 1. Loads `MonitorConfig` (TOML file + environment overrides)
//! 2. Connects to the MQTT broker (loopback-only unless allowed) with an
//!    `offline` Last Will on the status topic
//! 3. Publishes Home Assistant discovery configs and `online`
//! 4. Runs the motion tick on a fixed interval until Ctrl-C / SIGTERM
//! 5. Publishes `offline` and disconnects

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use camera_detection::classify::AnthropicClassifier;
use camera_detection::config::MonitorConfig;
use camera_detection::ingest::source_from_config;
use camera_detection::monitor::MotionMonitor;
use camera_detection::publish::discovery::{
    publish_discovery, DiscoveryConfig, DEFAULT_DISCOVERY_PREFIX,
};
use camera_detection::publish::tls::TlsMaterials;
use camera_detection::publish::{
    availability_topic, DetectionPublisher, MqttEndpoint, MqttRuntime, MqttSettings,
};
use camera_detection::scheduler::Scheduler;

const DAEMON_NAME: &str = "camera_motiond";

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Watch a camera for motion, classify it with a vision model, publish to MQTT"
)]
struct Args {
    /// Path to the TOML config file.
    #[arg(long, env = "CAMERA_DETECTION_CONFIG")]
    config: Option<PathBuf>,

    /// MQTT broker address.
    #[arg(long, env = "MQTT_BROKER_ADDR", default_value = "127.0.0.1:1883")]
    mqtt_broker_addr: String,

    /// Allow non-loopback MQTT connections.
    /// Use in trusted environments like Home Assistant containers.
    #[arg(long, env = "ALLOW_REMOTE_MQTT")]
    allow_remote_mqtt: bool,

    /// MQTT username for authentication.
    #[arg(long, env = "MQTT_USERNAME")]
    mqtt_username: Option<String>,

    /// MQTT password for authentication.
    #[arg(long, env = "MQTT_PASSWORD")]
    mqtt_password: Option<String>,

    /// Enable TLS for MQTT (required for mqtts:// brokers).
    #[arg(long, env = "MQTT_USE_TLS")]
    mqtt_use_tls: bool,

    /// Path to a PEM-encoded CA certificate to trust for MQTT TLS.
    #[arg(long, env = "MQTT_TLS_CA_PATH")]
    mqtt_tls_ca_path: Option<PathBuf>,

    /// Path to a PEM-encoded client certificate for MQTT TLS.
    #[arg(long, env = "MQTT_TLS_CLIENT_CERT_PATH")]
    mqtt_tls_client_cert_path: Option<PathBuf>,

    /// Path to a PEM-encoded client private key for MQTT TLS.
    #[arg(long, env = "MQTT_TLS_CLIENT_KEY_PATH")]
    mqtt_tls_client_key_path: Option<PathBuf>,

    /// MQTT client identifier.
    #[arg(long, env = "MQTT_CLIENT_ID", default_value = DAEMON_NAME)]
    mqtt_client_id: String,

    /// Home Assistant MQTT discovery prefix.
    #[arg(long, env = "HA_DISCOVERY_PREFIX", default_value = DEFAULT_DISCOVERY_PREFIX)]
    ha_discovery_prefix: String,

    /// Disable Home Assistant discovery.
    #[arg(long, env = "NO_DISCOVERY")]
    no_discovery: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = MonitorConfig::load(args.config.as_deref())?;
    log::info!("{} {} starting", DAEMON_NAME, env!("CARGO_PKG_VERSION"));

    let endpoint = MqttEndpoint::parse(&args.mqtt_broker_addr, args.mqtt_use_tls)?;
    if !args.allow_remote_mqtt {
        endpoint.require_loopback()?;
    } else {
        log::warn!("Remote MQTT enabled - ensure broker is in a trusted network");
    }
    let tls = TlsMaterials::load(
        args.mqtt_tls_ca_path.as_deref(),
        args.mqtt_tls_client_cert_path.as_deref(),
        args.mqtt_tls_client_key_path.as_deref(),
    )?;

    let source = source_from_config(&config.snapshot_url, &config.capture)
        .context("configure frame source")?;
    let classifier = AnthropicClassifier::new(
        config.classifier.clone(),
        config.anthropic_api_key.clone(),
    );

    let mqtt = MqttRuntime::connect(&MqttSettings {
        endpoint,
        tls,
        client_id: args.mqtt_client_id.clone(),
        username: args.mqtt_username.clone(),
        password: args.mqtt_password.clone(),
        will_topic: availability_topic(&config.topic_prefix),
    })?;

    if !args.no_discovery {
        let discovery = DiscoveryConfig {
            discovery_prefix: args.ha_discovery_prefix.clone(),
            topic_prefix: config.topic_prefix.clone(),
            off_delay_secs: config.discovery.off_delay_secs,
        };
        if let Err(err) = publish_discovery(&mqtt.publisher(), &discovery) {
            log::warn!("failed to publish HA discovery: {:#}", err);
        }
    }

    let publisher = DetectionPublisher::new(Box::new(mqtt.publisher()), config.topic_prefix.clone());
    let mut monitor = MotionMonitor::new(&config, source, Box::new(classifier), publisher)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .expect("error setting Ctrl-C handler");

    monitor.start();
    let mut scheduler = Scheduler::new(config.check_interval, config.startup_delay, shutdown);
    scheduler.run(|| monitor.tick());

    log::info!("shutdown signal received, stopping monitor...");
    monitor.shutdown();
    if let Err(err) = mqtt.disconnect() {
        log::warn!("MQTT disconnect failed: {:#}", err);
    }
    Ok(())
}
