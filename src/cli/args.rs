// nettune command-line arguments
// (c) 2024 NetTune contributors

use clap::{Args, Parser, Subcommand};

use crate::bdp::{parse_bandwidth, parse_rtt, Region};
use crate::config::ConfigOverrides;
use crate::snapshot::SnapshotId;
use crate::tuning::Preset;

#[derive(Debug, Parser, Clone)]
#[command(
    author,
    version(env!("NETTUNE_VERSION_STRING")),
    about,
    before_help = "Run without a command for the interactive menu.",
    infer_long_args(true)
)]
#[command(help_template(
    "\
{name} version {version}
{about-with-newline}
{usage-heading} {usage}
{before-help}
{all-args}{after-help}
"
))]
#[command(styles=crate::styles::CLAP_STYLES)]
#[allow(clippy::struct_excessive_bools)]
pub(crate) struct CliArgs {
    /// What to do. If omitted, the interactive menu starts.
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Quiet mode
    ///
    /// Reports only errors in the log
    #[arg(short, long, action, global = true, conflicts_with("debug"))]
    pub quiet: bool,

    /// Answers yes to every confirmation prompt
    #[arg(short, long, action, global = true)]
    pub yes: bool,

    // CONFIGURATION ======================================================================
    #[command(flatten)]
    pub overrides: ConfigOverrides,

    /// Reads an additional configuration file, with priority over the system and user files
    #[arg(long, global = true, value_name("FILE"), help_heading("Configuration"))]
    pub config_file: Option<String>,

    /// Outputs the configuration, then exits.
    ///
    /// The table shows each setting, its value, and where the value came from.
    #[arg(long, action, help_heading("Configuration"))]
    pub show_config: bool,

    /// Outputs the paths to configuration file(s), then exits
    #[arg(long, action, help_heading("Configuration"))]
    pub config_files: bool,

    // DEBUG ==============================================================================
    /// Enable detailed debug output
    ///
    /// This has the same effect as setting `RUST_LOG=nettune=debug` in the environment.
    /// If present, `RUST_LOG` overrides this option.
    #[arg(short, long, action, global = true, help_heading("Debug"))]
    pub debug: bool,

    /// Log to a file
    ///
    /// By default the log receives everything printed to stderr.
    /// To override this behaviour, set the environment variable `RUST_LOG_FILE_DETAIL` (same semantics as `RUST_LOG`).
    #[arg(
        short('l'),
        long,
        action,
        global = true,
        help_heading("Debug"),
        value_name("FILE")
    )]
    pub log_file: Option<String>,
}

impl CliArgs {
    /// Does this invocation run the interactive menu?
    pub(crate) fn is_interactive(&self) -> bool {
        matches!(self.command, None | Some(Command::Menu))
    }

    /// The configuration overrides, including those given as subcommand options
    pub(crate) fn all_overrides(&self) -> ConfigOverrides {
        let mut o = self.overrides.clone();
        match &self.command {
            Some(Command::Bdp(bdp)) => {
                o.bandwidth_gbps = bdp.bandwidth;
                o.probe_target.clone_from(&bdp.target);
            }
            Some(Command::Iperf { server }) => o.iperf_server.clone_from(server),
            _ => (),
        }
        o
    }
}

#[derive(Debug, Subcommand, Clone)]
pub(crate) enum Command {
    /// Interactive menu (the default)
    Menu,

    /// Reports on the network interface and host tuning, with tips
    Diagnose {
        /// Interface to examine [default: the one carrying the default route]
        #[arg(short, long, value_name("IF"))]
        interface: Option<String>,

        /// Lists the available interfaces instead
        #[arg(long, action, conflicts_with("interface"))]
        list: bool,
    },

    /// Computes the bandwidth-delay product and the buffer size it calls for
    Bdp(BdpArgs),

    /// Suggests a maximum socket buffer size from system memory
    Guideline {
        /// Memory size to compute for, in bytes [default: this host's]
        #[arg(short, long, value_name("BYTES"))]
        memory: Option<u64>,
    },

    /// Saves, lists, restores and deletes configuration snapshots
    Snapshot {
        #[command(subcommand)]
        action: SnapshotCommand,
    },

    /// Applies settings for high-throughput, long-distance transfers
    ///
    /// A snapshot of the current settings is saved first.
    Tune {
        /// Where the maximum buffer size comes from
        #[arg(short, long, value_enum, default_value_t)]
        preset: Preset,
    },

    /// Returns network settings to the operating system's stock values
    ///
    /// A snapshot of the current settings is saved first.
    Reset,

    /// Measures end-to-end throughput with iperf3
    Iperf {
        /// iperf3 server to test against
        #[arg(short, long, value_name("HOST"))]
        server: Option<String>,
    },

    /// Explains the settings this tool reports on
    Explain,
}

#[derive(Debug, Args, Clone)]
pub(crate) struct BdpArgs {
    /// Bandwidth in Gbit/s [default: from configuration, 10]
    #[arg(short, long, value_name("GBPS"), value_parser = parse_bandwidth)]
    pub bandwidth: Option<f64>,

    /// Measures the RTT to this host [default: from configuration, 8.8.8.8]
    #[arg(short, long, value_name("HOST"), group("rtt_source"))]
    pub target: Option<String>,

    /// Uses the typical RTT to a region instead of measuring
    #[arg(long, value_enum, group("rtt_source"))]
    pub region: Option<Region>,

    /// Uses this RTT in milliseconds instead of measuring
    #[arg(long, value_name("MS"), value_parser = parse_rtt, group("rtt_source"))]
    pub rtt: Option<f64>,
}

#[derive(Debug, Subcommand, Clone)]
pub(crate) enum SnapshotCommand {
    /// Saves the current settings
    Save {
        /// Appended to the snapshot identifier
        #[arg(long)]
        label: Option<String>,
    },
    /// Lists saved snapshots, newest first
    List,
    /// Shows the contents of a snapshot
    Show {
        /// Snapshot identifier, as shown by `snapshot list`
        #[arg(value_parser = SnapshotId::parse)]
        id: SnapshotId,
    },
    /// Returns the system to a snapshot
    ///
    /// A snapshot of the current settings is saved first.
    Restore {
        /// Snapshot identifier, as shown by `snapshot list`
        #[arg(value_parser = SnapshotId::parse)]
        id: SnapshotId,
    },
    /// Deletes a snapshot
    Delete {
        /// Snapshot identifier, as shown by `snapshot list`
        #[arg(value_parser = SnapshotId::parse)]
        id: SnapshotId,
    },
}

#[cfg(test)]
mod test {
    use clap::{CommandFactory as _, Parser as _};

    use super::{CliArgs, Command, SnapshotCommand};
    use crate::bdp::Region;
    use crate::tuning::Preset;

    #[test]
    fn definition_is_valid() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn no_command_is_interactive() {
        let a = CliArgs::try_parse_from(["nettune"]).unwrap();
        assert!(a.is_interactive());
        let a = CliArgs::try_parse_from(["nettune", "explain"]).unwrap();
        assert!(!a.is_interactive());
    }

    #[test]
    fn bdp_sources_are_exclusive() {
        let a = CliArgs::try_parse_from(["nettune", "bdp", "--region", "us-east", "-b", "1"])
            .unwrap();
        let Some(Command::Bdp(bdp)) = a.command else {
            panic!("wrong command");
        };
        assert_eq!(bdp.region, Some(Region::UsEast));
        assert_eq!(bdp.bandwidth, Some(1.0));

        assert!(
            CliArgs::try_parse_from(["nettune", "bdp", "--region", "europe", "--rtt", "5"])
                .is_err()
        );
        assert!(CliArgs::try_parse_from(["nettune", "bdp", "-b", "-3"]).is_err());
        assert!(CliArgs::try_parse_from(["nettune", "bdp", "-b", "fast"]).is_err());
    }

    #[test]
    fn subcommand_options_become_overrides() {
        let a = CliArgs::try_parse_from(["nettune", "bdp", "-t", "192.0.2.1", "-b", "40"])
            .unwrap();
        let o = a.all_overrides();
        assert_eq!(o.probe_target.as_deref(), Some("192.0.2.1"));
        assert_eq!(o.bandwidth_gbps, Some(40.0));

        let a = CliArgs::try_parse_from(["nettune", "iperf", "--server", "localhost"]).unwrap();
        assert_eq!(a.all_overrides().iperf_server.as_deref(), Some("localhost"));
    }

    #[test]
    fn global_options_after_subcommand() {
        let a = CliArgs::try_parse_from([
            "nettune",
            "tune",
            "--preset",
            "memory",
            "--yes",
            "--snapshot-dir",
            "/tmp/x",
        ])
        .unwrap();
        assert!(a.yes);
        assert!(matches!(
            a.command,
            Some(Command::Tune {
                preset: Preset::Memory
            })
        ));
        assert_eq!(a.overrides.snapshot_dir.as_deref(), Some("/tmp/x"));
    }

    #[test]
    fn snapshot_ids_are_checked() {
        let a = CliArgs::try_parse_from([
            "nettune",
            "snapshot",
            "show",
            "linux_20240301_091542.json",
        ])
        .unwrap();
        let Some(Command::Snapshot {
            action: SnapshotCommand::Show { id },
        }) = a.command
        else {
            panic!("wrong command");
        };
        assert_eq!(id.as_str(), "linux_20240301_091542");
        assert!(
            CliArgs::try_parse_from(["nettune", "snapshot", "delete", "../etc/passwd"]).is_err()
        );
    }
}
