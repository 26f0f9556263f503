// (c) 2024 NetTune contributors
//! # Configuration management
//!
//! nettune obtains run-time configuration from the following sources, in order:
//! 1. Command-line options
//! 2. A configuration file named with `--config-file`
//! 3. The user's configuration file (typically `~/.config/nettune/nettune.toml`)
//! 4. The system-wide configuration file (`/etc/nettune.toml`)
//! 5. Hard-wired defaults
//!
//! Each option may appear in multiple places, but only the first match is used.
//!
//! ## File format
//!
//! Configuration files are TOML. Every key is optional.
//!
//! ### Example
//!
//! ```toml
//! # Keep snapshots somewhere that gets backed up
//! snapshot_dir = "/srv/nettune/snapshots"
//! # Our nearest well-connected host
//! probe_target = "192.0.2.1"
//! bandwidth_gbps = 25
//! iperf_server = "iperf.example.net"
//! congestion = "bbr"
//! ```
//!
//! ## Configurable options
//!
//! The full list of supported fields is defined by [Configuration].
//!
//! On the command line:
//! * `nettune --show-config` outputs a list of supported fields, their current values, and where each value came from.
//! * `nettune --config-files` outputs the list of configuration files for the current user and platform.

mod structure;
pub use structure::{default_snapshot_dir, ConfigOverrides, Configuration};

mod manager;
pub use manager::Manager;
