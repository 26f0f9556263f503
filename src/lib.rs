//! nettune: host TCP/IP tuning utility
// (c) 2024 NetTune contributors

//! nettune inspects the network tuning of a Linux or macOS host, sizes socket buffers
//! against the bandwidth-delay product of a path, and keeps restorable snapshots of
//! the runtime network configuration.
//!
//! Everything that touches the operating system goes through three traits in [`os`]:
//! [`os::NetworkFacts`] (read-only lookups), [`os::RttProbe`] (latency measurement) and
//! [`os::SystemMutator`] (privileged parameter changes). The production implementation of
//! all three is [`os::HostSystem`].
//!
//! Mutating operations require a [`apply::Confirmation`], which can only be obtained from an
//! affirmative answer. They take a safety backup first, attempt every change regardless of
//! earlier failures, and report each outcome.
//!
//! Changes are runtime-only; they do not survive a reboot.

pub mod apply;
pub mod bdp;
mod cli;
pub use cli::cli;
pub mod config;
pub mod diagnosis;
pub mod guideline;
pub mod message;
/// OS abstraction layer
pub mod os;
/// Configuration snapshots: capture, storage and restore
pub mod snapshot;
mod styles;
pub mod throughput;
pub mod tuning;
/// Utilities
pub mod util;
