//! Mutations, their outcomes, and the confirmation gate
// (c) 2024 NetTune contributors

use std::fmt::Display;

use tracing::{info, warn};

use crate::os::SystemMutator;
use crate::snapshot::SnapshotId;

/// A single privileged change to the running system
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Writes a kernel parameter (`sysctl -w oid=value`)
    Sysctl {
        /// Parameter identifier, e.g. `net.core.rmem_max`
        oid: String,
        /// New value
        value: String,
    },
    /// Sets the MTU of a network interface
    Mtu {
        /// Interface name
        interface: String,
        /// New MTU
        mtu: String,
    },
}

impl Mutation {
    /// Convenience constructor
    #[must_use]
    pub fn sysctl<V: ToString>(oid: &str, value: V) -> Self {
        Self::Sysctl {
            oid: oid.into(),
            value: value.to_string(),
        }
    }

    /// What this mutation changes, for display
    #[must_use]
    pub fn target(&self) -> String {
        match self {
            Mutation::Sysctl { oid, .. } => oid.clone(),
            Mutation::Mtu { interface, .. } => format!("{interface} mtu"),
        }
    }

    /// The value this mutation sets
    #[must_use]
    pub fn value(&self) -> &str {
        match self {
            Mutation::Sysctl { value, .. } => value,
            Mutation::Mtu { mtu, .. } => mtu,
        }
    }
}

impl Display for Mutation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.target(), self.value())
    }
}

/// Result of one attempted mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    /// The change was applied
    Applied,
    /// The change failed; the reason is kept for display
    Failed(String),
}

/// One mutation and what happened when we tried it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    /// The attempted change
    pub mutation: Mutation,
    /// What happened
    pub result: StepResult,
}

impl StepOutcome {
    /// Did this step succeed?
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.result == StepResult::Applied
    }
}

/// What happened to the safety backup taken before mutating anything
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupStatus {
    /// Saved under this identifier
    Saved(SnapshotId),
    /// Could not be saved
    Failed(String),
}

/// The outcome of a multi-step apply (restore, preset, reset).
///
/// All steps are attempted regardless of earlier failures.
/// Overall success means every attempted step succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Safety backup status
    pub backup: BackupStatus,
    /// Per-step outcomes, in the order they were attempted
    pub steps: Vec<StepOutcome>,
    /// Snapshot labels that were not applied because this platform does not recognise them
    pub skipped: Vec<String>,
}

impl ApplyOutcome {
    /// True if every attempted step succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.steps.iter().all(StepOutcome::succeeded)
    }

    /// Steps that succeeded
    pub fn succeeded(&self) -> impl Iterator<Item = &StepOutcome> {
        self.steps.iter().filter(|s| s.succeeded())
    }

    /// Steps that failed
    pub fn failed(&self) -> impl Iterator<Item = &StepOutcome> {
        self.steps.iter().filter(|s| !s.succeeded())
    }
}

/// Proof that the user explicitly agreed to a mutating operation.
///
/// Every mutating entry point consumes one of these.
/// It can only be obtained from an affirmative answer.
#[derive(Debug)]
#[must_use]
#[allow(missing_copy_implementations)]
pub struct Confirmation {
    _private: (),
}

impl Confirmation {
    /// Turns an answer into a confirmation, if it was affirmative
    #[must_use]
    pub fn affirm(answer: bool) -> Option<Self> {
        answer.then_some(Self { _private: () })
    }
}

/// Attempts every mutation in order, recording each outcome.
#[must_use]
pub fn apply_all<M>(mutator: &M, mutations: Vec<Mutation>) -> Vec<StepOutcome>
where
    M: SystemMutator + ?Sized,
{
    mutations
        .into_iter()
        .map(|mutation| {
            let result = match mutator.apply(&mutation) {
                Ok(()) => {
                    info!("applied {mutation}");
                    StepResult::Applied
                }
                Err(e) => {
                    warn!("failed to apply {mutation}: {e:#}");
                    StepResult::Failed(format!("{e:#}"))
                }
            };
            StepOutcome { mutation, result }
        })
        .collect()
}
