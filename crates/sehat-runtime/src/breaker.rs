//! Per-stage circuit breakers.
//!
//! One lock guards every stage's counters so increment-and-check is a single
//! serialized step under concurrent failures.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use sehat_core::{PipelineSettings, StageKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerStatus {
    /// Remote calls allowed.
    Closed,
    /// Remote calls skipped until the cooldown elapses.
    Open,
    /// Cooldown elapsed; one trial call decides.
    HalfOpen,
}

#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub stage: StageKind,
    pub status: BreakerStatus,
    pub consecutive_failures: u32,
}

#[derive(Debug, Default)]
struct StageBreaker {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_started: Option<Instant>,
}

/// Shared breaker state, injected into the orchestrator and shared across requests.
#[derive(Debug)]
pub struct CircuitBreakers {
    threshold: u32,
    cooldown: Duration,
    stages: Mutex<HashMap<StageKind, StageBreaker>>,
}

impl CircuitBreakers {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            stages: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_settings(settings: &PipelineSettings) -> Self {
        Self::new(settings.breaker_threshold, settings.breaker_cooldown)
    }

    pub fn allows_remote(&self, stage: StageKind) -> bool {
        self.allows_remote_at(stage, Instant::now())
    }

    /// Whether `stage` may call the remote reasoner at `now`. Claims the
    /// half-open trial slot when it grants one.
    pub fn allows_remote_at(&self, stage: StageKind, now: Instant) -> bool {
        let mut stages = self.stages.lock();
        let b = stages.entry(stage).or_default();
        let Some(opened_at) = b.opened_at else {
            return true;
        };
        if now.saturating_duration_since(opened_at) < self.cooldown {
            return false;
        }
        // An abandoned trial (e.g. cut off by the pipeline deadline) frees the slot after a cooldown.
        match b.trial_started {
            Some(t) if now.saturating_duration_since(t) < self.cooldown => false,
            _ => {
                b.trial_started = Some(now);
                true
            }
        }
    }

    pub fn record_success(&self, stage: StageKind) {
        let mut stages = self.stages.lock();
        let b = stages.entry(stage).or_default();
        if b.opened_at.is_some() {
            info!(stage = %stage, "Circuit breaker closed");
        }
        *b = StageBreaker::default();
    }

    pub fn record_failure(&self, stage: StageKind) {
        self.record_failure_at(stage, Instant::now());
    }

    /// Count one `RemoteUnavailable`. Opens at the threshold; a failed trial reopens.
    pub fn record_failure_at(&self, stage: StageKind, now: Instant) {
        let mut stages = self.stages.lock();
        let b = stages.entry(stage).or_default();
        b.consecutive_failures = b.consecutive_failures.saturating_add(1);

        if b.opened_at.is_some() {
            if b.trial_started.take().is_some() {
                b.opened_at = Some(now);
                warn!(stage = %stage, "Trial call failed, circuit breaker reopened");
            }
        } else if b.consecutive_failures >= self.threshold {
            b.opened_at = Some(now);
            warn!(
                stage = %stage,
                failures = b.consecutive_failures,
                cooldown_secs = self.cooldown.as_secs(),
                "Circuit breaker opened"
            );
        }
    }

    /// A call ended without a verdict on availability (malformed output).
    /// Releases a held trial slot; counters are untouched.
    pub fn record_inconclusive(&self, stage: StageKind) {
        let mut stages = self.stages.lock();
        if let Some(b) = stages.get_mut(&stage) {
            b.trial_started = None;
        }
    }

    pub fn status(&self, stage: StageKind) -> BreakerStatus {
        self.status_at(stage, Instant::now())
    }

    pub fn status_at(&self, stage: StageKind, now: Instant) -> BreakerStatus {
        let stages = self.stages.lock();
        match stages.get(&stage).and_then(|b| b.opened_at) {
            None => BreakerStatus::Closed,
            Some(t) if now.saturating_duration_since(t) < self.cooldown => BreakerStatus::Open,
            Some(_) => BreakerStatus::HalfOpen,
        }
    }

    pub fn consecutive_failures(&self, stage: StageKind) -> u32 {
        self.stages
            .lock()
            .get(&stage)
            .map(|b| b.consecutive_failures)
            .unwrap_or(0)
    }

    /// State of every stage, in pipeline order.
    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        StageKind::all()
            .iter()
            .map(|&stage| BreakerSnapshot {
                stage,
                status: self.status(stage),
                consecutive_failures: self.consecutive_failures(stage),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const COOLDOWN: Duration = Duration::from_secs(60);

    #[test]
    fn test_opens_after_threshold() {
        let b = CircuitBreakers::new(3, COOLDOWN);
        let t0 = Instant::now();
        for _ in 0..2 {
            b.record_failure_at(StageKind::Symptom, t0);
            assert!(b.allows_remote_at(StageKind::Symptom, t0));
        }
        b.record_failure_at(StageKind::Symptom, t0);
        assert!(!b.allows_remote_at(StageKind::Symptom, t0));
        assert!(!b.allows_remote_at(StageKind::Symptom, t0 + Duration::from_secs(59)));
        assert_eq!(b.status_at(StageKind::Symptom, t0), BreakerStatus::Open);
        // Other stages unaffected.
        assert!(b.allows_remote_at(StageKind::Risk, t0));
    }

    #[test]
    fn test_success_resets_count() {
        let b = CircuitBreakers::new(3, COOLDOWN);
        b.record_failure(StageKind::Risk);
        b.record_failure(StageKind::Risk);
        b.record_success(StageKind::Risk);
        b.record_failure(StageKind::Risk);
        assert!(b.allows_remote(StageKind::Risk));
        assert_eq!(b.consecutive_failures(StageKind::Risk), 1);
    }

    #[test]
    fn test_single_trial_after_cooldown() {
        let b = CircuitBreakers::new(3, COOLDOWN);
        let t0 = Instant::now();
        for _ in 0..3 {
            b.record_failure_at(StageKind::Safety, t0);
        }
        let later = t0 + COOLDOWN;
        assert_eq!(b.status_at(StageKind::Safety, later), BreakerStatus::HalfOpen);
        assert!(b.allows_remote_at(StageKind::Safety, later));
        assert!(!b.allows_remote_at(StageKind::Safety, later));

        // Failed trial reopens immediately.
        b.record_failure_at(StageKind::Safety, later);
        assert_eq!(b.status_at(StageKind::Safety, later), BreakerStatus::Open);
        assert!(!b.allows_remote_at(StageKind::Safety, later + Duration::from_secs(1)));
    }

    #[test]
    fn test_successful_trial_closes() {
        let b = CircuitBreakers::new(1, COOLDOWN);
        let t0 = Instant::now();
        b.record_failure_at(StageKind::Recommendation, t0);
        assert!(b.allows_remote_at(StageKind::Recommendation, t0 + COOLDOWN));
        b.record_success(StageKind::Recommendation);
        assert_eq!(b.status(StageKind::Recommendation), BreakerStatus::Closed);
        assert_eq!(b.consecutive_failures(StageKind::Recommendation), 0);
    }

    #[test]
    fn test_inconclusive_releases_trial() {
        let b = CircuitBreakers::new(1, COOLDOWN);
        let t0 = Instant::now();
        b.record_failure_at(StageKind::Symptom, t0);
        let later = t0 + COOLDOWN;
        assert!(b.allows_remote_at(StageKind::Symptom, later));
        b.record_inconclusive(StageKind::Symptom);
        assert!(b.allows_remote_at(StageKind::Symptom, later));
        assert_eq!(b.consecutive_failures(StageKind::Symptom), 1);
    }

    #[test]
    fn test_concurrent_failures_not_lost() {
        let b = Arc::new(CircuitBreakers::new(500, COOLDOWN));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let b = b.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        b.record_failure(StageKind::Risk);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(b.consecutive_failures(StageKind::Risk), 800);
        assert_eq!(b.status(StageKind::Risk), BreakerStatus::Open);
    }

    #[test]
    fn test_snapshot_in_stage_order() {
        let b = CircuitBreakers::new(3, COOLDOWN);
        let snap = b.snapshot();
        let stages: Vec<_> = snap.iter().map(|s| s.stage).collect();
        assert_eq!(stages, StageKind::all());
        assert!(snap.iter().all(|s| s.status == BreakerStatus::Closed));
    }
}
