//! The motion tick: capture, compare, gate, classify, publish.
//!
//! `MotionMonitor` owns every collaborator and the only cross-tick state (the
//! comparator's baseline and the cooldown gate). A tick never fails: each
//! external failure is logged and degrades the tick to a no-op or a partial
//! result, and the next tick is the implicit retry.

use anyhow::Result;
use std::time::{Duration, Instant};

use crate::classify::{Analysis, DecorationFilter, Detection, VisionClassifier};
use crate::config::MonitorConfig;
use crate::ingest::{CaptureStats, FrameSource};
use crate::motion::{Comparison, CooldownGate, FrameComparator, GateDecision, MotionMetric};
use crate::publish::DetectionPublisher;

/// What one tick did.
#[derive(Clone, Debug, PartialEq)]
pub enum TickOutcome {
    CaptureFailed,
    /// Pixel policy could not decode the frame; the baseline is unchanged.
    DecodeFailed,
    /// First usable frame, stored as the baseline.
    Baseline,
    Quiet(MotionMetric),
    CoolingDown {
        metric: MotionMetric,
        remaining: Duration,
    },
    Triggered {
        metric: MotionMetric,
        analysis: Analysis,
        /// Detections whose messages were all accepted by the publisher.
        published: usize,
        /// Detections dropped by the decoration filter.
        ignored: Vec<Detection>,
    },
}

impl TickOutcome {
    pub fn is_triggered(&self) -> bool {
        matches!(self, Self::Triggered { .. })
    }
}

pub struct MotionMonitor {
    source: Box<dyn FrameSource>,
    comparator: FrameComparator,
    gate: CooldownGate,
    classifier: Box<dyn VisionClassifier>,
    filter: DecorationFilter,
    publisher: DetectionPublisher,
}

impl MotionMonitor {
    pub fn new(
        config: &MonitorConfig,
        source: Box<dyn FrameSource>,
        classifier: Box<dyn VisionClassifier>,
        publisher: DetectionPublisher,
    ) -> Result<Self> {
        Ok(Self {
            source,
            comparator: FrameComparator::new(config.motion.clone()),
            gate: CooldownGate::new(config.cooldown),
            classifier,
            filter: DecorationFilter::new(config.ignore_keywords.as_slice())?,
            publisher,
        })
    }

    /// Announce availability.
    pub fn start(&self) {
        log::info!(
            "motion monitor starting (source: {}, policy: {}, classifier: {}, topics: {}/#)",
            self.source.name(),
            self.comparator.policy(),
            self.classifier.name(),
            self.publisher.prefix()
        );
        self.publisher.publish_status(true);
    }

    pub fn shutdown(&self) {
        self.publisher.publish_status(false);
        let stats = self.source.stats();
        log::info!(
            "motion monitor stopped ({} frames captured, {} capture failures from {})",
            stats.frames_captured,
            stats.failures,
            stats.source
        );
    }

    pub fn capture_stats(&self) -> CaptureStats {
        self.source.stats()
    }

    pub fn tick(&mut self) -> TickOutcome {
        self.tick_at(Instant::now())
    }

    /// Run one tick with `now` as the cooldown reference time.
    pub fn tick_at(&mut self, now: Instant) -> TickOutcome {
        let frame = match self.source.capture() {
            Ok(frame) => frame,
            Err(err) => {
                log::warn!("frame capture failed: {:#}", err);
                return TickOutcome::CaptureFailed;
            }
        };

        let metric = match self.comparator.compare(&frame) {
            Ok(Comparison::Baseline) => {
                log::info!(
                    "first frame captured ({} bytes), establishing baseline",
                    frame.byte_len()
                );
                return TickOutcome::Baseline;
            }
            Ok(Comparison::Measured(metric)) => metric,
            Err(err) => {
                log::warn!("frame comparison failed: {:#}", err);
                return TickOutcome::DecodeFailed;
            }
        };

        log::debug!("motion check: {}", metric);
        if !metric.is_motion() {
            return TickOutcome::Quiet(metric);
        }

        if let GateDecision::Closed { remaining } = self.gate.try_trigger(now) {
            log::info!(
                "motion detected ({}) but in cooldown, {}s remaining",
                metric,
                remaining.as_secs()
            );
            return TickOutcome::CoolingDown { metric, remaining };
        }
        log::info!("motion detected: {}", metric);

        self.publisher.publish_motion();
        let analysis = self.classifier.classify(&frame);

        let (kept, ignored) = self.filter.partition(analysis.detections.clone());
        for detection in &ignored {
            log::info!("ignoring decoration: {}", detection.description);
        }

        let mut published = 0;
        for detection in &kept {
            log::info!(
                "detected {} at {}: {} (confidence {:.2})",
                detection.kind,
                detection.location,
                detection.description,
                detection.confidence
            );
            if self.publisher.publish_detection(detection, frame.timestamp()) {
                published += 1;
            }
        }
        if kept.is_empty() {
            log::info!("no detections in focus areas: {}", analysis.summary);
        }

        TickOutcome::Triggered {
            metric,
            analysis,
            published,
            ignored,
        }
    }
}
