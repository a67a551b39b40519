//! Home Assistant MQTT discovery.
//!
//! Two entities are announced under one device: a motion `binary_sensor`
//! fed by `motion/binary`, and a `sensor` showing the type of the last
//! detection with the full payload as attributes. Both follow the
//! availability topic.

use anyhow::{Context, Result};
use serde::Serialize;

use super::{
    availability_topic, Publisher, LAST_DETECTION_TOPIC_SUFFIX, MOTION_TOPIC_SUFFIX,
    PAYLOAD_MOTION_ON, PAYLOAD_OFFLINE, PAYLOAD_ONLINE,
};

pub const DEFAULT_DISCOVERY_PREFIX: &str = "homeassistant";

#[derive(Serialize)]
struct HaSensorConfig {
    name: String,
    unique_id: String,
    state_topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    json_attributes_topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon: Option<String>,
    availability_topic: String,
    payload_available: String,
    payload_not_available: String,
    device: HaDeviceInfo,
}

#[derive(Serialize)]
struct HaBinarySensorConfig {
    name: String,
    unique_id: String,
    state_topic: String,
    device_class: String,
    payload_on: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    off_delay: Option<u32>,
    availability_topic: String,
    payload_available: String,
    payload_not_available: String,
    device: HaDeviceInfo,
}

#[derive(Clone, Serialize)]
struct HaDeviceInfo {
    identifiers: Vec<String>,
    name: String,
    manufacturer: String,
    model: String,
    sw_version: String,
}

#[derive(Clone, Debug)]
pub struct DiscoveryConfig {
    pub discovery_prefix: String,
    pub topic_prefix: String,
    /// Seconds after which Home Assistant resets the motion sensor to off.
    pub off_delay_secs: u32,
}

impl DiscoveryConfig {
    fn device_id(&self) -> String {
        sanitize_for_id(&self.topic_prefix)
    }
}

/// Retained `(topic, payload)` pairs announcing the entities.
pub fn discovery_messages(config: &DiscoveryConfig) -> Result<Vec<(String, Vec<u8>)>> {
    let device_id = config.device_id();
    let prefix = &config.topic_prefix;
    let availability = availability_topic(prefix);
    let device = HaDeviceInfo {
        identifiers: vec![device_id.clone()],
        name: format!("Camera Detection ({})", prefix),
        manufacturer: "camera-detection".to_string(),
        model: "Vision motion monitor".to_string(),
        sw_version: env!("CARGO_PKG_VERSION").to_string(),
    };

    let motion = HaBinarySensorConfig {
        name: "Camera Motion".to_string(),
        unique_id: format!("{}_motion", device_id),
        state_topic: format!("{}/{}", prefix, MOTION_TOPIC_SUFFIX),
        device_class: "motion".to_string(),
        payload_on: PAYLOAD_MOTION_ON.to_string(),
        off_delay: (config.off_delay_secs > 0).then_some(config.off_delay_secs),
        availability_topic: availability.clone(),
        payload_available: PAYLOAD_ONLINE.to_string(),
        payload_not_available: PAYLOAD_OFFLINE.to_string(),
        device: device.clone(),
    };
    let last_detection_topic = format!("{}/{}", prefix, LAST_DETECTION_TOPIC_SUFFIX);
    let last_detection = HaSensorConfig {
        name: "Camera Last Detection".to_string(),
        unique_id: format!("{}_last_detection", device_id),
        state_topic: last_detection_topic.clone(),
        json_attributes_topic: Some(last_detection_topic),
        value_template: Some("{{ value_json.type }}".to_string()),
        icon: Some("mdi:cctv".to_string()),
        availability_topic: availability,
        payload_available: PAYLOAD_ONLINE.to_string(),
        payload_not_available: PAYLOAD_OFFLINE.to_string(),
        device,
    };

    Ok(vec![
        (
            format!(
                "{}/binary_sensor/{}/motion/config",
                config.discovery_prefix, device_id
            ),
            serde_json::to_vec(&motion).context("encode motion discovery config")?,
        ),
        (
            format!(
                "{}/sensor/{}/last_detection/config",
                config.discovery_prefix, device_id
            ),
            serde_json::to_vec(&last_detection).context("encode detection discovery config")?,
        ),
    ])
}

pub fn publish_discovery(publisher: &dyn Publisher, config: &DiscoveryConfig) -> Result<()> {
    let messages = discovery_messages(config)?;
    for (topic, payload) in &messages {
        publisher.publish(topic, payload, true)?;
    }
    log::info!(
        "Published HA discovery for {} entities under {}",
        messages.len(),
        config.discovery_prefix
    );
    Ok(())
}

fn sanitize_for_id(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}
