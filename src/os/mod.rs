//! OS abstraction layer
// (c) 2024 NetTune contributors

use anyhow::Result;

use crate::apply::Mutation;

mod command;
pub use command::{CommandLine, CommandRunner, SystemRunner};

mod host;
pub use host::{HostSystem, DEFAULT_PROBE_COUNT};

mod linux;
pub use linux::Linux;

mod macos;
pub use macos::MacOs;

/// The operating system families we know how to tune
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum OsFamily {
    /// Linux
    Linux,
    /// macOS. Displayed as the kernel name, `Darwin`.
    #[strum(to_string = "Darwin")]
    MacOs,
}

impl OsFamily {
    /// The family we were built for, if supported
    #[must_use]
    pub fn current() -> Option<Self> {
        if cfg!(target_os = "linux") {
            Some(Self::Linux)
        } else if cfg!(target_os = "macos") {
            Some(Self::MacOs)
        } else {
            None
        }
    }
}

/// A kernel parameter we read, record in snapshots, and may later restore
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tunable {
    /// The label under which the value appears in snapshots
    pub label: &'static str,
    /// The sysctl OID
    pub oid: &'static str,
}

/// A network interface as seen in the interface listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    /// Interface name
    pub name: String,
    /// First IPv4 address, if any
    pub ipv4: Option<String>,
    /// Administratively up?
    pub up: bool,
}

/// Everything that differs between operating systems.
///
/// There are two implementations, [`Linux`] and [`MacOs`]; [`detect`] selects one at startup.
/// Lookups return `None` when the information is unavailable; they never fail hard.
pub trait Platform: std::fmt::Debug {
    /// Which OS family this is
    fn family(&self) -> OsFamily;

    /// The TCP buffer parameters recorded in snapshots, label to OID
    fn buffer_parameters(&self) -> &'static [Tunable];

    /// The interface carrying the default route
    fn default_interface(&self, runner: &dyn CommandRunner) -> Option<String>;

    /// All non-loopback interfaces
    fn interfaces(&self, runner: &dyn CommandRunner) -> Vec<Interface>;

    /// Current MTU of an interface
    fn mtu(&self, runner: &dyn CommandRunner, interface: &str) -> Option<String>;

    /// Negotiated link speed of an interface, as the OS describes it
    fn link_speed(&self, runner: &dyn CommandRunner, interface: &str) -> Option<String>;

    /// Active TCP congestion control algorithm
    fn congestion_control(&self, runner: &dyn CommandRunner) -> Option<String>;

    /// CPU frequency governor(s) in use
    fn cpu_governor(&self) -> Option<String>;

    /// Total physical memory in bytes
    fn total_memory(&self, runner: &dyn CommandRunner) -> Option<u64>;

    /// Command line for a latency probe
    fn ping_command(&self, target: &str, count: u16) -> CommandLine;

    /// Command line to set an interface's MTU
    fn set_mtu_command(&self, interface: &str, mtu: &str) -> CommandLine;

    /// Parameter changes for high-throughput, long-distance transfers.
    ///
    /// `max_buffer` is the target maximum socket buffer in bytes.
    /// If `congestion` is given, the congestion control algorithm is changed too (where supported).
    fn highspeed_preset(&self, max_buffer: u64, congestion: Option<&str>) -> Vec<Mutation>;

    /// Parameter changes which return the system to stock settings
    fn stock_defaults(&self) -> Vec<Mutation>;

    /// Where to make changes persist across reboots
    fn persistence_hint(&self) -> &'static str;

    /// Reads a single sysctl value
    fn read_sysctl(&self, runner: &dyn CommandRunner, oid: &str) -> Option<String> {
        runner
            .run("sysctl", &["-n", oid])
            .ok()
            .filter(|s| !s.is_empty())
    }
}

/// Selects the platform implementation for the running OS
pub fn detect() -> Result<Box<dyn Platform>> {
    match OsFamily::current() {
        Some(OsFamily::Linux) => Ok(Box::new(Linux)),
        Some(OsFamily::MacOs) => Ok(Box::new(MacOs)),
        None => anyhow::bail!("unsupported operating system: {}", std::env::consts::OS),
    }
}

/// Read-only access to the host's network facts
pub trait NetworkFacts {
    /// OS family of the host
    fn family(&self) -> OsFamily;
    /// See [`Platform::buffer_parameters`]
    fn buffer_parameters(&self) -> &'static [Tunable];
    /// See [`Platform::default_interface`]
    fn default_interface(&self) -> Option<String>;
    /// See [`Platform::interfaces`]
    fn interfaces(&self) -> Vec<Interface>;
    /// See [`Platform::mtu`]
    fn mtu(&self, interface: &str) -> Option<String>;
    /// See [`Platform::link_speed`]
    fn link_speed(&self, interface: &str) -> Option<String>;
    /// Current values of every [`Platform::buffer_parameters`] entry, in table order
    fn tcp_buffers(&self) -> Vec<(String, Option<String>)>;
    /// See [`Platform::congestion_control`]
    fn congestion_control(&self) -> Option<String>;
    /// See [`Platform::cpu_governor`]
    fn cpu_governor(&self) -> Option<String>;
    /// See [`Platform::total_memory`]
    fn total_memory(&self) -> Option<u64>;
}

/// Live latency measurement
pub trait RttProbe {
    /// Average round-trip time to `target` in milliseconds
    fn probe(&self, target: &str) -> Result<f64>;
}

/// Executes single privileged parameter changes.
///
/// The caller is responsible for having obtained the user's confirmation.
pub trait SystemMutator {
    /// Writes a kernel parameter
    fn set_sysctl(&self, oid: &str, value: &str) -> Result<()>;
    /// Sets an interface MTU
    fn set_mtu(&self, interface: &str, mtu: &str) -> Result<()>;

    /// Dispatches a [`Mutation`]
    fn apply(&self, mutation: &Mutation) -> Result<()> {
        match mutation {
            Mutation::Sysctl { oid, value } => self.set_sysctl(oid, value),
            Mutation::Mtu { interface, mtu } => self.set_mtu(interface, mtu),
        }
    }
}

/// Extracts the average from the summary line `ping` prints,
/// e.g. `rtt min/avg/max/mdev = 0.030/0.041/0.052/0.009 ms`
pub(crate) fn parse_ping_average(output: &str) -> Option<f64> {
    let line = output.lines().find(|l| l.contains("min/avg/max"))?;
    let (_, stats) = line.split_once('=')?;
    stats.trim().split('/').nth(1)?.trim().parse().ok()
}

static_assertions::assert_cfg!(unix, "This OS is not yet supported");

#[cfg(test)]
pub(crate) mod test {
    use std::collections::HashMap;

    use anyhow::Result;

    use super::{parse_ping_average, CommandRunner, OsFamily};

    /// Replays canned command output, keyed by the full command line
    #[derive(Debug, Default)]
    pub(crate) struct FakeRunner {
        pub(crate) responses: HashMap<String, String>,
    }

    impl FakeRunner {
        pub(crate) fn with(pairs: &[(&str, &str)]) -> Self {
            Self {
                responses: pairs
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect(),
            }
        }
    }

    impl CommandRunner for FakeRunner {
        fn run(&self, program: &str, args: &[&str]) -> Result<String> {
            let key = std::iter::once(program)
                .chain(args.iter().copied())
                .collect::<Vec<_>>()
                .join(" ");
            self.responses
                .get(&key)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("{program}: command failed"))
        }

        fn run_privileged(&self, program: &str, args: &[&str]) -> Result<String> {
            self.run(program, args)
        }
    }

    #[test]
    fn family_names() {
        assert_eq!(OsFamily::Linux.to_string(), "Linux");
        assert_eq!(OsFamily::MacOs.to_string(), "Darwin");
    }

    #[test]
    fn ping_linux() {
        let out = "PING 8.8.8.8 (8.8.8.8) 56(84) bytes of data.\n\
            --- 8.8.8.8 ping statistics ---\n\
            4 packets transmitted, 4 received, 0% packet loss, time 3004ms\n\
            rtt min/avg/max/mdev = 9.870/10.512/11.210/0.480 ms";
        assert_eq!(parse_ping_average(out), Some(10.512));
    }

    #[test]
    fn ping_macos() {
        let out = "round-trip min/avg/max/stddev = 14.100/15.250/16.300/0.800 ms";
        assert_eq!(parse_ping_average(out), Some(15.25));
    }

    #[test]
    fn ping_no_summary() {
        assert_eq!(parse_ping_average("100% packet loss"), None);
    }
}
