//! User-facing messages
// (c) 2024 NetTune contributors

use std::fmt::Display;

use crate::apply::{ApplyOutcome, BackupStatus, Mutation, StepResult};
use crate::diagnosis::Tip;
use crate::snapshot::SnapshotId;
use crate::styles;

/// How prominently a [`Message`] is shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Something worked
    Success,
    /// Neutral information
    Info,
    /// Needs the user's attention, but nothing failed
    Warning,
    /// Something failed
    Error,
}

impl Level {
    fn style(self) -> anstyle::Style {
        match self {
            Level::Success => styles::SUCCESS,
            Level::Info => styles::INFO,
            Level::Warning => styles::WARNING,
            Level::Error => styles::ERROR,
        }
    }
}

/// Everything the tool tells the user, other than tables and reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message<'a> {
    /// A safety backup was taken
    BackupSaved(&'a SnapshotId),
    /// A safety backup could not be taken
    BackupFailed(&'a str),
    /// A change was made
    Applied(&'a Mutation),
    /// A change failed, with the reason
    ApplyFailed(&'a Mutation, &'a str),
    /// A snapshot label this platform does not recognise
    Skipped(&'a str),
    /// Overall result of a multi-step apply
    Summary {
        /// Steps that worked
        succeeded: usize,
        /// Steps that failed
        failed: usize,
    },
    /// A snapshot was saved
    SnapshotSaved(&'a SnapshotId),
    /// A snapshot was deleted
    SnapshotDeleted(&'a SnapshotId),
    /// The snapshot directory is empty
    NoSnapshots,
    /// The user declined a confirmation
    Cancelled,
    /// Changes are runtime-only; this says where to persist them
    Persist(&'a str),
    /// The RTT probe failed and a fallback was used
    RttFallback(&'a str),
    /// iperf3 is not installed
    IperfMissing,
    /// Advice from a diagnosis
    Tip(Tip),
    /// A command that addresses a tip
    Remedy(&'a str),
}

impl Message<'_> {
    /// How prominently this should be shown
    #[must_use]
    pub fn level(&self) -> Level {
        match self {
            Message::BackupSaved(_)
            | Message::Applied(_)
            | Message::SnapshotSaved(_)
            | Message::SnapshotDeleted(_) => Level::Success,
            Message::Summary { failed, .. } if *failed == 0 => Level::Success,
            Message::Summary { .. } | Message::ApplyFailed(..) => Level::Error,
            Message::BackupFailed(_)
            | Message::Skipped(_)
            | Message::Cancelled
            | Message::RttFallback(_)
            | Message::IperfMissing => Level::Warning,
            Message::Tip(t) if t.is_warning() => Level::Warning,
            Message::NoSnapshots | Message::Persist(_) | Message::Tip(_) | Message::Remedy(_) => {
                Level::Info
            }
        }
    }

    /// Writes this message to stdout, styled by its level
    pub fn show(&self) {
        let style = self.level().style();
        anstream::println!("{style}{self}{style:#}");
    }
}

impl Display for Message<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Message::BackupSaved(id) => write!(f, "Current settings backed up as {id}"),
            Message::BackupFailed(e) => write!(f, "Could not back up current settings: {e}"),
            Message::Applied(m) => write!(f, "  ok    {m}"),
            Message::ApplyFailed(m, e) => write!(f, "  FAIL  {m}: {e}"),
            Message::Skipped(label) => {
                write!(f, "  skip  {label} (not recognised on this system)")
            }
            Message::Summary { succeeded, failed } => {
                if *failed == 0 {
                    write!(f, "All {succeeded} changes applied")
                } else {
                    write!(
                        f,
                        "{failed} of {} changes failed",
                        succeeded + failed
                    )
                }
            }
            Message::SnapshotSaved(id) => write!(f, "Saved snapshot {id}"),
            Message::SnapshotDeleted(id) => write!(f, "Deleted snapshot {id}"),
            Message::NoSnapshots => f.write_str("No snapshots saved yet"),
            Message::Cancelled => f.write_str("Cancelled; nothing was changed"),
            Message::Persist(hint) => write!(f, "These changes last until reboot. {hint}"),
            Message::RttFallback(target) => write!(
                f,
                "Could not measure RTT to {target}; assuming {} ms",
                crate::bdp::FALLBACK_RTT_MS
            ),
            Message::IperfMissing => f.write_str("iperf3 is not installed"),
            Message::Tip(t) => write!(f, "Tip: {t}"),
            Message::Remedy(cmd) => write!(f, "  {cmd}"),
        }
    }
}

/// The messages that describe an [`ApplyOutcome`], in display order
#[must_use]
pub fn for_outcome(outcome: &ApplyOutcome) -> Vec<Message<'_>> {
    let mut messages = vec![match &outcome.backup {
        BackupStatus::Saved(id) => Message::BackupSaved(id),
        BackupStatus::Failed(e) => Message::BackupFailed(e),
    }];
    messages.extend(outcome.steps.iter().map(|s| match &s.result {
        StepResult::Applied => Message::Applied(&s.mutation),
        StepResult::Failed(e) => Message::ApplyFailed(&s.mutation, e),
    }));
    messages.extend(outcome.skipped.iter().map(|l| Message::Skipped(l)));
    messages.push(Message::Summary {
        succeeded: outcome.succeeded().count(),
        failed: outcome.failed().count(),
    });
    messages
}

#[cfg(test)]
mod test {
    use super::{for_outcome, Level, Message};
    use crate::apply::{ApplyOutcome, BackupStatus, Mutation, StepOutcome, StepResult};
    use crate::diagnosis::Tip;

    fn outcome() -> ApplyOutcome {
        ApplyOutcome {
            backup: BackupStatus::Failed("read-only file system".into()),
            steps: vec![
                StepOutcome {
                    mutation: Mutation::sysctl("net.core.rmem_max", 1024),
                    result: StepResult::Applied,
                },
                StepOutcome {
                    mutation: Mutation::sysctl("net.core.wmem_max", 1024),
                    result: StepResult::Failed("permission denied".into()),
                },
            ],
            skipped: vec!["tcp_sendspace".into()],
        }
    }

    #[test]
    fn outcome_messages() {
        let o = outcome();
        let m = for_outcome(&o);
        assert_eq!(m.len(), 5);
        assert_eq!(m[0].level(), Level::Warning);
        assert_eq!(m[1].to_string(), "  ok    net.core.rmem_max -> 1024");
        assert_eq!(
            m[2].to_string(),
            "  FAIL  net.core.wmem_max -> 1024: permission denied"
        );
        assert_eq!(m[3], Message::Skipped("tcp_sendspace"));
        assert_eq!(m[4].to_string(), "1 of 2 changes failed");
        assert_eq!(m[4].level(), Level::Error);
    }

    #[test]
    fn summary_success() {
        let m = Message::Summary {
            succeeded: 3,
            failed: 0,
        };
        assert_eq!(m.to_string(), "All 3 changes applied");
        assert_eq!(m.level(), Level::Success);
    }

    #[test]
    fn tip_levels() {
        assert_eq!(Message::Tip(Tip::PowersaveGovernor).level(), Level::Warning);
        assert_eq!(Message::Tip(Tip::JumboFrames).level(), Level::Info);
        assert!(Message::RttFallback("8.8.8.8").to_string().contains("100 ms"));
    }
}
