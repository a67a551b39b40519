use std::time::{Duration, Instant};

/// Minimum spacing between two triggered analyses.
#[derive(Clone, Debug)]
pub struct CooldownGate {
    cooldown: Duration,
    last_trigger: Option<Instant>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateDecision {
    Open,
    Closed { remaining: Duration },
}

impl CooldownGate {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_trigger: None,
        }
    }

    pub fn check(&self, now: Instant) -> GateDecision {
        let Some(last) = self.last_trigger else {
            return GateDecision::Open;
        };
        let elapsed = now.saturating_duration_since(last);
        if elapsed >= self.cooldown {
            GateDecision::Open
        } else {
            GateDecision::Closed {
                remaining: self.cooldown - elapsed,
            }
        }
    }

    /// Admit a trigger at `now` if the gate is open, recording it.
    pub fn try_trigger(&mut self, now: Instant) -> GateDecision {
        let decision = self.check(now);
        if decision == GateDecision::Open {
            self.last_trigger = Some(now);
        }
        decision
    }

    pub fn last_trigger(&self) -> Option<Instant> {
        self.last_trigger
    }
}
