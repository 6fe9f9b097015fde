//! Cutover phase state machine.
//!
//! The controller is the only writer of the phase record. Readers get the
//! cached value; every accepted transition is persisted together with its
//! audit entry before the cache changes, so a failed write leaves the phase
//! untouched.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::RollbackConfig;
use crate::context::AppPhaseStore;
use crate::error::AppError;
use crate::models::{MigrationPhase, PhaseRecord, PhaseTransition};

/// When a cutover should be reverted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RollbackPolicy {
    /// Rollback is warranted when the failure rate is strictly above this.
    pub max_failure_rate: f64,
    /// How long after cutover rollback stays available.
    pub window: Duration,
}

impl Default for RollbackPolicy {
    fn default() -> Self {
        Self::from(&RollbackConfig::default())
    }
}

impl From<&RollbackConfig> for RollbackPolicy {
    fn from(config: &RollbackConfig) -> Self {
        Self {
            max_failure_rate: config.max_failure_rate,
            window: Duration::minutes(config.window_minutes.max(0)),
        }
    }
}

/// Target-side error counts observed by live traffic since cutover.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TargetHealth {
    pub failed: u64,
    pub total: u64,
    pub observed_at: DateTime<Utc>,
}

impl TargetHealth {
    pub fn new(failed: u64, total: u64) -> Self {
        Self {
            failed,
            total,
            observed_at: Utc::now(),
        }
    }

    pub fn failure_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.failed.min(self.total) as f64 / self.total as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum RollbackDecision {
    /// Only `DUAL_WRITE_TARGET_PRIMARY` can roll back.
    NotApplicable { phase: MigrationPhase },
    OutsideWindow { minutes_since_cutover: i64 },
    Healthy { failure_rate: f64 },
    Warranted { failure_rate: f64 },
}

impl RollbackDecision {
    pub fn is_warranted(&self) -> bool {
        matches!(self, RollbackDecision::Warranted { .. })
    }
}

pub struct PhaseController {
    store: AppPhaseStore,
    policy: RollbackPolicy,
    current: RwLock<PhaseRecord>,
}

impl PhaseController {
    /// Loads the persisted phase, creating the initial record on first use.
    pub async fn bootstrap(store: AppPhaseStore, policy: RollbackPolicy) -> Result<Self, AppError> {
        let record = match store.load().await? {
            Some(record) => record,
            None => {
                let record = PhaseRecord::initial(Utc::now());
                store.save(&record, None).await?;
                info!(phase = %record.phase, "Initialized migration phase");
                record
            }
        };

        Ok(Self {
            store,
            policy,
            current: RwLock::new(record),
        })
    }

    pub async fn get_phase(&self) -> MigrationPhase {
        self.current.read().await.phase
    }

    pub async fn record(&self) -> PhaseRecord {
        self.current.read().await.clone()
    }

    pub fn policy(&self) -> &RollbackPolicy {
        &self.policy
    }

    pub async fn transitions(&self) -> Result<Vec<PhaseTransition>, AppError> {
        self.store.transitions().await
    }

    pub async fn transition_phase(&self, to: MigrationPhase) -> Result<PhaseTransition, AppError> {
        self.transition_with_reason(to, "operator request").await
    }

    /// Applies `current → to` if it is a permitted forward edge.
    ///
    /// The rollback edge is not available here; it is taken only by
    /// [`rollback_if_degraded`](Self::rollback_if_degraded), while the rollback
    /// window is open and the target is degraded.
    ///
    /// # Errors
    ///
    /// `InvalidPhaseTransition` for any other edge, or the store error if the
    /// new record could not be persisted. The phase is unchanged in both cases.
    pub async fn transition_with_reason(
        &self,
        to: MigrationPhase,
        reason: &str,
    ) -> Result<PhaseTransition, AppError> {
        let mut current = self.current.write().await;
        let from = current.phase;
        if !from.can_transition_to(to) || from.is_rollback_to(to) {
            warn!(%from, %to, "Rejected phase transition");
            return Err(AppError::InvalidPhaseTransition { from, to });
        }
        self.apply(&mut current, to, reason).await
    }

    /// Persists `current → to`, then updates the cached record.
    async fn apply(
        &self,
        current: &mut PhaseRecord,
        to: MigrationPhase,
        reason: &str,
    ) -> Result<PhaseTransition, AppError> {
        let from = current.phase;
        let now = Utc::now();
        let record = PhaseRecord {
            phase: to,
            entered_at: now,
        };
        let transition = PhaseTransition {
            from,
            to,
            at: now,
            reason: reason.to_string(),
        };
        self.store.save(&record, Some(&transition)).await?;
        *current = record;

        info!(%from, %to, reason, rollback = from.is_rollback_to(to), "Phase transitioned");
        Ok(transition)
    }

    /// Whether the rollback edge should be taken given `health`.
    pub async fn evaluate_rollback(&self, health: &TargetHealth) -> RollbackDecision {
        let current = self.current.read().await;
        self.decide(&current, health)
    }

    fn decide(&self, current: &PhaseRecord, health: &TargetHealth) -> RollbackDecision {
        if current.phase != MigrationPhase::DualWriteTargetPrimary {
            return RollbackDecision::NotApplicable {
                phase: current.phase,
            };
        }

        let since_cutover = health.observed_at.max(Utc::now()) - current.entered_at;
        if since_cutover > self.policy.window {
            return RollbackDecision::OutsideWindow {
                minutes_since_cutover: since_cutover.num_minutes(),
            };
        }

        let failure_rate = health.failure_rate();
        if failure_rate > self.policy.max_failure_rate {
            RollbackDecision::Warranted { failure_rate }
        } else {
            RollbackDecision::Healthy { failure_rate }
        }
    }

    /// Takes the rollback edge when the target is degraded within the
    /// rollback window; otherwise leaves the phase alone.
    ///
    /// The decision and the transition happen under one write lock, so the
    /// phase cannot move between them.
    pub async fn rollback_if_degraded(
        &self,
        health: &TargetHealth,
    ) -> Result<RollbackDecision, AppError> {
        let mut current = self.current.write().await;
        let decision = self.decide(&current, health);
        if let RollbackDecision::Warranted { failure_rate } = decision {
            let reason = format!(
                "target failure rate {:.4} above {:.4} within {} minutes of cutover",
                failure_rate,
                self.policy.max_failure_rate,
                self.policy.window.num_minutes()
            );
            self.apply(&mut current, MigrationPhase::DualWriteSourcePrimary, &reason)
                .await?;
        }
        Ok(decision)
    }
}
