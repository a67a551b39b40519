//! Fan-out of motion and detection results to MQTT topics.
//!
//! Topics are relative to a configurable prefix:
//!
//! | topic                      | payload              | retained |
//! |----------------------------|----------------------|----------|
//! | `motion/binary`            | `ON`                 | no       |
//! | `{location}/{type}`        | detection JSON       | no       |
//! | `last_detection`           | detection JSON       | yes      |
//! | `status`                   | `online` / `offline` | yes      |
//!
//! Every publish is best-effort. Failures are logged and never retried.

pub mod discovery;
pub mod endpoint;
pub mod mqtt;
pub mod tls;

use anyhow::Result;
use chrono::{DateTime, Local, SecondsFormat};
use serde::Serialize;

use crate::classify::{Detection, Location, ObjectKind};

pub use endpoint::MqttEndpoint;
pub use mqtt::{MqttPublisher, MqttRuntime, MqttSettings};

pub const MOTION_TOPIC_SUFFIX: &str = "motion/binary";
pub const LAST_DETECTION_TOPIC_SUFFIX: &str = "last_detection";
pub const AVAILABILITY_TOPIC_SUFFIX: &str = "status";
pub const PAYLOAD_MOTION_ON: &str = "ON";
pub const PAYLOAD_ONLINE: &str = "online";
pub const PAYLOAD_OFFLINE: &str = "offline";

/// A message sink. The MQTT implementation publishes with QoS 1.
pub trait Publisher: Send {
    fn publish(&self, topic: &str, payload: &[u8], retain: bool) -> Result<()>;
}

/// Body of a detection message.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectionPayload {
    #[serde(rename = "type")]
    pub kind: ObjectKind,
    pub location: Location,
    pub description: String,
    pub confidence: f64,
    pub timestamp: String,
}

impl DetectionPayload {
    pub fn new(detection: &Detection, timestamp: DateTime<Local>) -> Self {
        Self {
            kind: detection.kind,
            location: detection.location,
            description: detection.description.clone(),
            confidence: round_confidence(detection.confidence),
            timestamp: timestamp.to_rfc3339_opts(SecondsFormat::Secs, false),
        }
    }
}

fn round_confidence(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn availability_topic(prefix: &str) -> String {
    format!("{}/{}", prefix, AVAILABILITY_TOPIC_SUFFIX)
}

/// Stateless fan-out over a [`Publisher`] and a topic prefix.
pub struct DetectionPublisher {
    publisher: Box<dyn Publisher>,
    prefix: String,
}

impl DetectionPublisher {
    pub fn new(publisher: Box<dyn Publisher>, prefix: impl Into<String>) -> Self {
        Self {
            publisher,
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn topic(&self, suffix: &str) -> String {
        format!("{}/{}", self.prefix, suffix)
    }

    pub fn detection_topic(&self, detection: &Detection) -> String {
        format!(
            "{}/{}/{}",
            self.prefix,
            detection.location.as_str(),
            detection.kind.as_str()
        )
    }

    pub fn publish_motion(&self) -> bool {
        self.send(&self.topic(MOTION_TOPIC_SUFFIX), PAYLOAD_MOTION_ON.as_bytes(), false)
    }

    /// Publish one detection to its location/type topic and as the retained
    /// last detection. True when both publishes were accepted.
    pub fn publish_detection(&self, detection: &Detection, timestamp: DateTime<Local>) -> bool {
        let payload = DetectionPayload::new(detection, timestamp);
        let json = match serde_json::to_vec(&payload) {
            Ok(json) => json,
            Err(err) => {
                log::warn!("failed to encode detection payload: {}", err);
                return false;
            }
        };
        let direct = self.send(&self.detection_topic(detection), &json, false);
        let last = self.send(&self.topic(LAST_DETECTION_TOPIC_SUFFIX), &json, true);
        direct && last
    }

    pub fn publish_status(&self, online: bool) -> bool {
        let payload = if online { PAYLOAD_ONLINE } else { PAYLOAD_OFFLINE };
        self.send(&availability_topic(&self.prefix), payload.as_bytes(), true)
    }

    fn send(&self, topic: &str, payload: &[u8], retain: bool) -> bool {
        match self.publisher.publish(topic, payload, retain) {
            Ok(()) => {
                log::debug!("published {} bytes to {} (retain: {})", payload.len(), topic, retain);
                true
            }
            Err(err) => {
                log::warn!("failed to publish to {}: {:#}", topic, err);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use chrono::TimeZone;
    use std::sync::{Arc, Mutex};

    type Sent = Arc<Mutex<Vec<(String, String, bool)>>>;

    struct Recorder {
        sent: Sent,
        fail_on: Option<&'static str>,
    }

    impl Publisher for Recorder {
        fn publish(&self, topic: &str, payload: &[u8], retain: bool) -> Result<()> {
            if self.fail_on.is_some_and(|t| topic.ends_with(t)) {
                return Err(anyhow!("broker unavailable"));
            }
            self.sent.lock().unwrap().push((
                topic.to_string(),
                String::from_utf8_lossy(payload).to_string(),
                retain,
            ));
            Ok(())
        }
    }

    fn publisher(fail_on: Option<&'static str>) -> (DetectionPublisher, Sent) {
        let sent = Sent::default();
        let recorder = Recorder {
            sent: sent.clone(),
            fail_on,
        };
        (DetectionPublisher::new(Box::new(recorder), "camera_detection"), sent)
    }

    fn courier() -> Detection {
        Detection {
            kind: ObjectKind::Person,
            location: Location::Driveway,
            description: "Courier with a parcel".to_string(),
            confidence: 0.876,
        }
    }

    #[test]
    fn motion_flag_is_transient() {
        let (out, sent) = publisher(None);
        assert!(out.publish_motion());
        assert_eq!(
            sent.lock().unwrap().as_slice(),
            &[("camera_detection/motion/binary".to_string(), "ON".to_string(), false)]
        );
    }

    #[test]
    fn detection_goes_to_typed_topic_and_last_detection() {
        let (out, sent) = publisher(None);
        let ts = Local.with_ymd_and_hms(2024, 12, 24, 18, 30, 5).unwrap();
        assert!(out.publish_detection(&courier(), ts));

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, "camera_detection/driveway/person");
        assert!(!sent[0].2);
        assert_eq!(sent[1].0, "camera_detection/last_detection");
        assert!(sent[1].2);
        assert_eq!(sent[0].1, sent[1].1);

        let json: serde_json::Value = serde_json::from_str(&sent[0].1).unwrap();
        assert_eq!(json["type"], "person");
        assert_eq!(json["location"], "driveway");
        assert_eq!(json["description"], "Courier with a parcel");
        assert_eq!(json["confidence"], 0.88);
        assert!(json["timestamp"].as_str().unwrap().starts_with("2024-12-24T18:30:05"));
    }

    #[test]
    fn status_is_retained() {
        let (out, sent) = publisher(None);
        assert!(out.publish_status(true));
        assert!(out.publish_status(false));
        let sent = sent.lock().unwrap();
        assert_eq!(sent[0], ("camera_detection/status".to_string(), "online".to_string(), true));
        assert_eq!(sent[1], ("camera_detection/status".to_string(), "offline".to_string(), true));
    }

    #[test]
    fn failures_are_reported_not_raised() {
        let (out, sent) = publisher(Some("last_detection"));
        assert!(!out.publish_detection(&courier(), Local::now()));
        assert_eq!(sent.lock().unwrap().len(), 1, "direct topic still published");
    }

    #[test]
    fn confidence_rounds_to_two_places() {
        assert_eq!(round_confidence(0.876), 0.88);
        assert_eq!(round_confidence(1.0), 1.0);
        assert_eq!(round_confidence(0.0), 0.0);
    }
}
