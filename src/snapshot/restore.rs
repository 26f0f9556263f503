// Reapplying a snapshot
// (c) 2024 NetTune contributors

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use super::{
    ConfigSnapshot, SnapshotStore, BACKUP_LABEL, INTERFACE_NOT_FOUND, MTU_NOT_APPLICABLE,
    UNKNOWN, VALUE_NOT_FOUND,
};
use crate::apply::{apply_all, ApplyOutcome, BackupStatus, Confirmation, Mutation};
use crate::os::{NetworkFacts, SystemMutator, Tunable};

/// The changes needed to return to a snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestorePlan {
    /// Changes to make, in order
    pub mutations: Vec<Mutation>,
    /// Labels in the snapshot that this platform does not know
    pub skipped: Vec<String>,
}

/// Works out which changes would return the host to `snapshot`.
///
/// Buffer values recorded as unreadable are left alone, as is the MTU if it was
/// not captured.
#[must_use]
pub fn plan_restore(snapshot: &ConfigSnapshot, table: &[Tunable]) -> RestorePlan {
    let mut plan = RestorePlan::default();
    for (label, value) in &snapshot.settings.tcp_buffers {
        let Some(tunable) = table.iter().find(|t| t.label == label) else {
            plan.skipped.push(label.clone());
            continue;
        };
        if value == VALUE_NOT_FOUND {
            debug!("{label} was not captured; leaving it alone");
            continue;
        }
        plan.mutations.push(Mutation::sysctl(tunable.oid, value));
    }

    let interface = &snapshot.metadata.interface;
    let mtu = &snapshot.settings.mtu;
    if mtu != UNKNOWN
        && mtu != MTU_NOT_APPLICABLE
        && !interface.is_empty()
        && interface != INTERFACE_NOT_FOUND
    {
        plan.mutations.push(Mutation::Mtu {
            interface: interface.clone(),
            mtu: mtu.clone(),
        });
    }
    plan
}

/// Captures the current state and saves it under [`BACKUP_LABEL`].
///
/// Failure is reported, not propagated: the caller has already been given the go-ahead.
#[must_use]
pub fn safety_backup<F: NetworkFacts + ?Sized>(
    facts: &F,
    store: &SnapshotStore,
    now: NaiveDateTime,
) -> BackupStatus {
    let current = ConfigSnapshot::capture(facts, now);
    match store.save(&current, Some(BACKUP_LABEL)) {
        Ok(id) => {
            info!("safety backup saved as {id}");
            BackupStatus::Saved(id)
        }
        Err(e) => {
            warn!("could not save safety backup: {e}");
            BackupStatus::Failed(e.to_string())
        }
    }
}

/// Returns the host to a snapshot.
///
/// A safety backup of the current state is taken first. Every change is attempted,
/// whatever happens to the others.
#[must_use]
pub fn restore<F, M>(
    facts: &F,
    mutator: &M,
    store: &SnapshotStore,
    snapshot: &ConfigSnapshot,
    now: NaiveDateTime,
    _confirmation: Confirmation,
) -> ApplyOutcome
where
    F: NetworkFacts + ?Sized,
    M: SystemMutator + ?Sized,
{
    let backup = safety_backup(facts, store, now);
    let plan = plan_restore(snapshot, facts.buffer_parameters());
    for label in &plan.skipped {
        warn!("skipping {label}: not a recognised parameter on {}", facts.family());
    }
    ApplyOutcome {
        backup,
        steps: apply_all(mutator, plan.mutations),
        skipped: plan.skipped,
    }
}

#[cfg(test)]
mod test {
    use super::{plan_restore, restore};
    use crate::apply::{test::RecordingMutator, BackupStatus, Confirmation, Mutation};
    use crate::snapshot::{
        test::{at, FakeFacts, TABLE},
        ConfigSnapshot, SnapshotStore, MTU_NOT_APPLICABLE, UNKNOWN,
    };

    fn full_snapshot() -> ConfigSnapshot {
        let facts = FakeFacts {
            buffers: vec![
                ("core_rmem_max".into(), Some("33554432".into())),
                ("core_wmem_max".into(), Some("33554432".into())),
                ("optmem_max".into(), Some("20480".into())),
            ],
            mtu: Some("9000".into()),
            ..Default::default()
        };
        ConfigSnapshot::capture(&facts, at("2024-03-01 09:15:42"))
    }

    #[test]
    fn plan_covers_buffers_and_mtu() {
        let plan = plan_restore(&full_snapshot(), TABLE);
        assert!(plan.skipped.is_empty());
        assert_eq!(
            plan.mutations,
            vec![
                Mutation::sysctl("net.core.rmem_max", "33554432"),
                Mutation::sysctl("net.core.wmem_max", "33554432"),
                Mutation::sysctl("net.core.optmem_max", "20480"),
                Mutation::Mtu {
                    interface: "eth0".into(),
                    mtu: "9000".into()
                },
            ]
        );
    }

    #[test]
    fn plan_skips_missing_values_and_foreign_labels() {
        let mut s = ConfigSnapshot::capture(&FakeFacts::default(), at("2024-03-01 09:15:42"));
        let _ = s
            .settings
            .tcp_buffers
            .insert("tcp_sendspace".into(), "131072".into());
        let plan = plan_restore(&s, TABLE);
        // optmem_max was "Not found"
        assert_eq!(plan.mutations.len(), 3);
        assert_eq!(plan.skipped, vec!["tcp_sendspace".to_string()]);
    }

    #[test]
    fn plan_leaves_uncaptured_mtu_alone() {
        for mtu in [UNKNOWN, MTU_NOT_APPLICABLE] {
            let mut s = full_snapshot();
            s.settings.mtu = mtu.into();
            let plan = plan_restore(&s, TABLE);
            assert!(!plan
                .mutations
                .iter()
                .any(|m| matches!(m, Mutation::Mtu { .. })));
        }
        let mut s = full_snapshot();
        s.metadata.interface = "Not Found".into();
        assert_eq!(plan_restore(&s, TABLE).mutations.len(), 3);
    }

    #[test]
    fn one_failure_of_three() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let mut snapshot = full_snapshot();
        snapshot.settings.mtu = UNKNOWN.into();
        let mutator = RecordingMutator::failing(&["net.core.wmem_max"]);

        let outcome = restore(
            &FakeFacts::default(),
            &mutator,
            &store,
            &snapshot,
            at("2024-04-01 10:00:00"),
            Confirmation::affirm(true).unwrap(),
        );
        assert!(!outcome.is_success());
        assert_eq!(outcome.steps.len(), 3);
        assert_eq!(outcome.failed().count(), 1);
        assert_eq!(outcome.succeeded().count(), 2);
        assert_eq!(mutator.seen.borrow().len(), 3);

        let BackupStatus::Saved(id) = &outcome.backup else {
            panic!("backup was not saved: {:?}", outcome.backup);
        };
        assert_eq!(id.as_str(), "linux_20240401_100000_bk");
        assert_eq!(store.list().unwrap(), vec![id.clone()]);
    }

    #[test]
    fn backup_failure_does_not_stop_restore() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "not a directory").unwrap();
        let store = SnapshotStore::new(&blocker);
        let mutator = RecordingMutator::default();

        let outcome = restore(
            &FakeFacts::default(),
            &mutator,
            &store,
            &full_snapshot(),
            at("2024-04-01 10:00:00"),
            Confirmation::affirm(true).unwrap(),
        );
        assert!(matches!(outcome.backup, BackupStatus::Failed(_)));
        assert!(outcome.is_success());
        assert_eq!(outcome.steps.len(), 4);
    }
}
