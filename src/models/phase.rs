//! Cutover phases and their persisted records.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Process-wide migration phase.
///
/// Forward chain with a single rollback edge:
/// `DUAL_WRITE_SOURCE_PRIMARY → DUAL_WRITE_TARGET_PRIMARY → TARGET_ONLY`,
/// plus `DUAL_WRITE_TARGET_PRIMARY → DUAL_WRITE_SOURCE_PRIMARY`.
/// `TARGET_ONLY` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MigrationPhase {
    #[default]
    DualWriteSourcePrimary,
    DualWriteTargetPrimary,
    TargetOnly,
}

/// The store that answers reads in a given phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadAuthority {
    Source,
    Target,
}

impl MigrationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationPhase::DualWriteSourcePrimary => "DUAL_WRITE_SOURCE_PRIMARY",
            MigrationPhase::DualWriteTargetPrimary => "DUAL_WRITE_TARGET_PRIMARY",
            MigrationPhase::TargetOnly => "TARGET_ONLY",
        }
    }

    /// Whether `self → to` is one of the permitted edges.
    pub fn can_transition_to(&self, to: MigrationPhase) -> bool {
        use MigrationPhase::*;
        matches!(
            (self, to),
            (DualWriteSourcePrimary, DualWriteTargetPrimary)
                | (DualWriteTargetPrimary, TargetOnly)
                | (DualWriteTargetPrimary, DualWriteSourcePrimary)
        )
    }

    /// True for the one backward edge.
    pub fn is_rollback_to(&self, to: MigrationPhase) -> bool {
        *self == MigrationPhase::DualWriteTargetPrimary
            && to == MigrationPhase::DualWriteSourcePrimary
    }

    pub fn read_authority(&self) -> ReadAuthority {
        match self {
            MigrationPhase::DualWriteSourcePrimary => ReadAuthority::Source,
            MigrationPhase::DualWriteTargetPrimary | MigrationPhase::TargetOnly => {
                ReadAuthority::Target
            }
        }
    }

    /// Live application writes must go to both stores in this phase.
    pub fn requires_dual_write(&self) -> bool {
        !matches!(self, MigrationPhase::TargetOnly)
    }

    /// Bulk backfill needs the source; it is gone once `TARGET_ONLY` is reached.
    pub fn allows_backfill(&self) -> bool {
        self.requires_dual_write()
    }
}

impl std::fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MigrationPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "DUAL_WRITE_SOURCE_PRIMARY" => Ok(MigrationPhase::DualWriteSourcePrimary),
            "DUAL_WRITE_TARGET_PRIMARY" => Ok(MigrationPhase::DualWriteTargetPrimary),
            "TARGET_ONLY" => Ok(MigrationPhase::TargetOnly),
            _ => Err(format!(
                "Invalid phase '{}'. Valid values: DUAL_WRITE_SOURCE_PRIMARY, \
                 DUAL_WRITE_TARGET_PRIMARY, TARGET_ONLY",
                s
            )),
        }
    }
}

/// The single durable phase record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub phase: MigrationPhase,
    /// When the current phase was entered; the rollback window starts here.
    pub entered_at: DateTime<Utc>,
}

impl PhaseRecord {
    /// Bootstrap record for a system that has never been migrated.
    pub fn initial(now: DateTime<Utc>) -> Self {
        Self {
            phase: MigrationPhase::default(),
            entered_at: now,
        }
    }
}

/// Audit entry written for every accepted phase change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: MigrationPhase,
    pub to: MigrationPhase,
    pub at: DateTime<Utc>,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use MigrationPhase::*;

    #[test]
    fn test_permitted_edges() {
        assert!(DualWriteSourcePrimary.can_transition_to(DualWriteTargetPrimary));
        assert!(DualWriteTargetPrimary.can_transition_to(TargetOnly));
        assert!(DualWriteTargetPrimary.can_transition_to(DualWriteSourcePrimary));
    }

    #[test]
    fn test_forbidden_edges() {
        assert!(!DualWriteSourcePrimary.can_transition_to(TargetOnly));
        assert!(!TargetOnly.can_transition_to(DualWriteSourcePrimary));
        assert!(!TargetOnly.can_transition_to(DualWriteTargetPrimary));
        for phase in [DualWriteSourcePrimary, DualWriteTargetPrimary, TargetOnly] {
            assert!(!phase.can_transition_to(phase));
        }
    }

    #[test]
    fn test_read_authority() {
        assert_eq!(DualWriteSourcePrimary.read_authority(), ReadAuthority::Source);
        assert_eq!(DualWriteTargetPrimary.read_authority(), ReadAuthority::Target);
        assert!(!TargetOnly.requires_dual_write());
    }

    #[test]
    fn test_phase_serde_names() {
        let json = serde_json::to_string(&DualWriteTargetPrimary).unwrap();
        assert_eq!(json, "\"DUAL_WRITE_TARGET_PRIMARY\"");
        assert_eq!("target_only".parse::<MigrationPhase>(), Ok(TargetOnly));
    }
}
