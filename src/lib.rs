//! Camera motion detection with vision classification.
//!
//! A periodic monitor grabs a still frame from a camera, compares it with the
//! previous one and, when enough has changed and the cooldown has elapsed,
//! asks a vision model what it sees. Findings are published to MQTT for home
//! automation.
//!
//! # Pipeline
//!
//! ```text
//! FrameSource ──► FrameComparator ──► CooldownGate ──► VisionClassifier
//!                                                         │
//!                              DetectionPublisher ◄── DecorationFilter
//! ```
//!
//! # Module Structure
//!
//! - `config`: `MonitorConfig` (TOML file, environment overrides, validation)
//! - `frame`: captured still frames
//! - `ingest`: frame sources (ffmpeg one-shot grab, HTTP snapshot)
//! - `motion`: frame comparison policies and the cooldown gate
//! - `classify`: vision model client, response parsing, decoration filter
//! - `publish`: MQTT fan-out, TLS transport, Home Assistant discovery
//! - `monitor`: the capture → compare → classify → publish tick
//! - `scheduler`: fixed-interval driver with cooperative shutdown

pub mod classify;
pub mod config;
pub mod frame;
pub mod ingest;
pub mod monitor;
pub mod motion;
pub mod publish;
pub mod scheduler;

pub use classify::{
    parse_analysis, AnthropicClassifier, Analysis, DecorationFilter, Detection, Location,
    ObjectKind, VisionClassifier,
};
pub use config::{ApiKey, MonitorConfig, MotionPolicy, MotionSettings};
pub use frame::Frame;
pub use ingest::{source_from_config, CaptureStats, FfmpegSource, FrameSource, HttpSnapshotSource};
pub use monitor::{MotionMonitor, TickOutcome};
pub use motion::{Comparison, CooldownGate, FrameComparator, MotionMetric};
pub use publish::{DetectionPublisher, Publisher};
pub use scheduler::{Scheduler, SchedulerStats};
