//! High-throughput tuning and reset to stock settings
// (c) 2024 NetTune contributors

use chrono::NaiveDateTime;
use tracing::info;

use crate::apply::{apply_all, ApplyOutcome, Confirmation, Mutation};
use crate::guideline;
use crate::os::{NetworkFacts, Platform, SystemMutator};
use crate::snapshot::{self, ConfigSnapshot, SnapshotStore};

/// Maximum socket buffer recommended by ESnet's fasterdata host tuning guide (32 MiB)
pub const ESNET_MAX_BUFFER: u64 = 33_554_432;

/// Where the target maximum buffer size comes from
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    strum::Display,
    strum::EnumIter,
    clap::ValueEnum,
)]
#[strum(serialize_all = "lowercase")]
pub enum Preset {
    /// ESnet fasterdata figure, 32 MiB
    #[default]
    Esnet,
    /// Computed from this host's memory
    Memory,
}

impl Preset {
    /// The target maximum buffer in bytes.
    ///
    /// [`Preset::Memory`] needs the host's total memory; it returns `None` without it.
    #[must_use]
    pub fn max_buffer(self, total_memory: Option<u64>) -> Option<u64> {
        match self {
            Preset::Esnet => Some(ESNET_MAX_BUFFER),
            Preset::Memory => total_memory.map(|m| guideline::recommend(m).bytes),
        }
    }
}

/// Applies multi-step changes to a host, taking a safety backup first
#[derive(Debug)]
pub struct Tuner<'a, F: ?Sized, M: ?Sized> {
    facts: &'a F,
    mutator: &'a M,
    platform: &'a dyn Platform,
    store: &'a SnapshotStore,
}

impl<'a, F, M> Tuner<'a, F, M>
where
    F: NetworkFacts + ?Sized,
    M: SystemMutator + ?Sized,
{
    /// Constructor
    #[must_use]
    pub fn new(
        facts: &'a F,
        mutator: &'a M,
        platform: &'a dyn Platform,
        store: &'a SnapshotStore,
    ) -> Self {
        Self {
            facts,
            mutator,
            platform,
            store,
        }
    }

    /// The changes [`Self::apply_preset`] would make
    #[must_use]
    pub fn preset_changes(&self, max_buffer: u64, congestion: Option<&str>) -> Vec<Mutation> {
        let congestion = congestion.map(str::trim).filter(|c| !c.is_empty());
        self.platform.highspeed_preset(max_buffer, congestion)
    }

    /// Applies the high-throughput settings with the given maximum buffer size
    #[must_use]
    pub fn apply_preset(
        &self,
        max_buffer: u64,
        congestion: Option<&str>,
        now: NaiveDateTime,
        _confirmation: Confirmation,
    ) -> ApplyOutcome {
        info!("applying high-speed settings, max buffer {max_buffer} bytes");
        self.run(self.preset_changes(max_buffer, congestion), now)
    }

    /// Returns the platform's buffer parameters to stock values
    #[must_use]
    pub fn reset_defaults(&self, now: NaiveDateTime, _confirmation: Confirmation) -> ApplyOutcome {
        info!("resetting network settings to stock values");
        self.run(self.platform.stock_defaults(), now)
    }

    /// Returns the host to a snapshot
    #[must_use]
    pub fn restore(
        &self,
        snapshot: &ConfigSnapshot,
        now: NaiveDateTime,
        confirmation: Confirmation,
    ) -> ApplyOutcome {
        snapshot::restore(
            self.facts,
            self.mutator,
            self.store,
            snapshot,
            now,
            confirmation,
        )
    }

    fn run(&self, mutations: Vec<Mutation>, now: NaiveDateTime) -> ApplyOutcome {
        let backup = snapshot::safety_backup(self.facts, self.store, now);
        ApplyOutcome {
            backup,
            steps: apply_all(self.mutator, mutations),
            skipped: Vec::new(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::{Preset, Tuner, ESNET_MAX_BUFFER};
    use crate::apply::{test::RecordingMutator, BackupStatus, Confirmation, Mutation};
    use crate::guideline::GIB;
    use crate::os::{Linux, MacOs};
    use crate::snapshot::{
        test::{at, FakeFacts},
        SnapshotStore,
    };

    fn yes() -> Confirmation {
        Confirmation::affirm(true).unwrap()
    }

    #[test]
    fn preset_targets() {
        assert_eq!(Preset::Esnet.max_buffer(None), Some(ESNET_MAX_BUFFER));
        assert_eq!(Preset::Memory.max_buffer(Some(8 * GIB)), Some(67_108_864));
        assert_eq!(Preset::Memory.max_buffer(None), None);
        assert_eq!(Preset::Memory.to_string(), "memory");
    }

    #[test]
    fn macos_preset() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let facts = FakeFacts::default();
        let mutator = RecordingMutator::default();
        let tuner = Tuner::new(&facts, &mutator, &MacOs, &store);

        let outcome = tuner.apply_preset(
            ESNET_MAX_BUFFER,
            Some("bbr"),
            at("2024-04-01 10:00:00"),
            yes(),
        );
        assert!(outcome.is_success());
        assert!(matches!(outcome.backup, BackupStatus::Saved(_)));
        assert_eq!(
            *mutator.seen.borrow(),
            vec![
                Mutation::sysctl("net.inet.tcp.win_scale_factor", 8),
                Mutation::sysctl("net.inet.tcp.autorcvbufmax", 33_554_432),
                Mutation::sysctl("net.inet.tcp.autosndbufmax", 33_554_432),
            ]
        );
    }

    #[test]
    fn linux_preset_with_congestion() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let facts = FakeFacts::default();
        let mutator = RecordingMutator::default();
        let tuner = Tuner::new(&facts, &mutator, &Linux, &store);

        let plain = tuner.preset_changes(1000, Some("  "));
        let with_bbr = tuner.preset_changes(1000, Some("bbr"));
        assert_eq!(plain.len() + 1, with_bbr.len());
        assert_eq!(
            with_bbr.last(),
            Some(&Mutation::sysctl("net.ipv4.tcp_congestion_control", "bbr"))
        );
        assert!(plain.contains(&Mutation::sysctl("net.ipv4.tcp_rmem", "4096 131072 1000")));
    }

    #[test]
    fn reset_keeps_going() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let facts = FakeFacts::default();
        let mutator = RecordingMutator::failing(&["net.inet.tcp.sendspace"]);
        let tuner = Tuner::new(&facts, &mutator, &MacOs, &store);

        let outcome = tuner.reset_defaults(at("2024-04-01 10:00:00"), yes());
        assert_eq!(outcome.steps.len(), 6);
        assert_eq!(outcome.failed().count(), 1);
        assert!(!outcome.is_success());
        assert_eq!(store.list().unwrap().len(), 1);
    }
}
