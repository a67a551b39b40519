//! Vision classification of triggered frames.
//!
//! A classifier turns one frame into an [`Analysis`]: zero or more
//! [`Detection`]s plus a short summary. Classification never fails from the
//! caller's point of view; transport and API errors degrade to an empty
//! analysis whose summary carries the error.

mod anthropic;
pub mod filter;
pub mod prompt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

use crate::frame::Frame;

pub use anthropic::AnthropicClassifier;
pub use filter::DecorationFilter;

/// What the model saw.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", rename_all = "snake_case")]
pub enum ObjectKind {
    Person,
    Vehicle,
    Animal,
    #[default]
    Unknown,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Vehicle => "vehicle",
            Self::Animal => "animal",
            Self::Unknown => "unknown",
        }
    }
}

impl From<String> for ObjectKind {
    fn from(label: String) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "person" | "people" | "pedestrian" => Self::Person,
            "vehicle" | "car" | "truck" | "van" | "bike" | "bicycle" | "motorcycle" => {
                Self::Vehicle
            }
            "animal" | "dog" | "cat" | "pet" => Self::Animal,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where on the property the object was seen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", rename_all = "snake_case")]
pub enum Location {
    Driveway,
    InFront,
    WalkingBy,
    #[default]
    Unknown,
}

impl Location {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Driveway => "driveway",
            Self::InFront => "in_front",
            Self::WalkingBy => "walking_by",
            Self::Unknown => "unknown",
        }
    }
}

impl From<String> for Location {
    fn from(label: String) -> Self {
        let normalized = label.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "driveway" => Self::Driveway,
            "in_front" | "front" => Self::InFront,
            "walking_by" | "passing_by" => Self::WalkingBy,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One object reported by the vision model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "type", default)]
    pub kind: ObjectKind,
    #[serde(default)]
    pub location: Location,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_confidence")]
    pub confidence: f64,
}

/// Accepts numbers and numeric strings, clamps into `[0, 1]`; anything else is 0.
fn lenient_confidence<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    let value = match raw {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    Ok(clamp_confidence(value))
}

pub(crate) fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Result of classifying one frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Analysis {
    pub detections: Vec<Detection>,
    pub summary: String,
}

impl Analysis {
    pub fn empty(summary: impl Into<String>) -> Self {
        Self {
            detections: Vec::new(),
            summary: summary.into(),
        }
    }

    /// Degraded result for a failed classifier call.
    pub fn failed(err: &anyhow::Error) -> Self {
        Self::empty(format!("Error: {:#}", err))
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

/// Classifies a frame. Implementations must not panic or propagate errors.
pub trait VisionClassifier: Send {
    fn name(&self) -> &'static str;
    fn classify(&mut self, frame: &Frame) -> Analysis;
}

/// Interpret model output text.
///
/// The first well-formed JSON object carrying `detections` or `summary` is
/// used, so prose or code fences around it are tolerated. Without one (a reply
/// cut off mid-object included), the raw text becomes the summary and there
/// are no detections.
pub fn parse_analysis(text: &str) -> Analysis {
    let Some(object) = first_analysis_object(text) else {
        return Analysis::empty(text);
    };

    let summary = object
        .get("summary")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let detections = match object.get("detections") {
        Some(Value::Array(entries)) => entries
            .iter()
            .filter_map(|entry| match Detection::deserialize(entry) {
                Ok(detection) => Some(detection),
                Err(err) => {
                    log::warn!("skipping malformed detection {}: {}", entry, err);
                    None
                }
            })
            .collect(),
        Some(other) => {
            log::warn!("detections is not an array: {}", other);
            Vec::new()
        }
        None => Vec::new(),
    };

    Analysis {
        detections,
        summary,
    }
}

fn first_analysis_object(text: &str) -> Option<serde_json::Map<String, Value>> {
    text.match_indices('{').find_map(|(start, _)| {
        let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(Value::Object(map)))
                if map.contains_key("detections") || map.contains_key("summary") =>
            {
                Some(map)
            }
            _ => None,
        }
    })
}
