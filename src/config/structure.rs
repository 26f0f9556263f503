//! Configuration structure
// (c) 2024 NetTune contributors

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    value::{Dict, Map, Value},
    Metadata, Profile, Provider,
};
use serde::{Deserialize, Serialize};
use struct_field_names_as_array::FieldNamesAsSlice;

/// The set of configurable options supported by nettune.
///
/// **Note:** The implementation of `default()` for this struct returns nettune's hard-wired configuration defaults.
///
// Maintainer note: None of the members of this struct should be Option<anything>. Absence is expressed with an empty value.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, FieldNamesAsSlice)]
pub struct Configuration {
    /// Directory holding configuration snapshots
    pub snapshot_dir: String,

    /// Host to ping when measuring RTT [default: 8.8.8.8]
    pub probe_target: String,
    /// Number of echo requests per RTT probe [default: 4]
    pub probe_count: u16,
    /// Link bandwidth assumed by the BDP calculator, Gbit/s [default: 10]
    pub bandwidth_gbps: f64,

    /// iperf3 server for the throughput test [default: iperf.he.net]
    pub iperf_server: String,
    /// Length of the throughput test, seconds [default: 5]
    pub iperf_duration: u16,
    /// iperf3 connection timeout, seconds [default: 5]
    pub iperf_connect_timeout: u16,
    /// Wall-clock limit on the whole throughput test, seconds [default: 15]
    pub iperf_timeout: u16,

    /// Congestion control algorithm to select when applying the high-speed preset (Linux only).
    ///
    /// Empty leaves it unchanged.
    pub congestion: String,
    /// Whether to prefix privileged commands with `sudo` [default: true]
    ///
    /// Has no effect when running as root.
    pub use_sudo: bool,
}

/// Where snapshots live unless configured otherwise
#[must_use]
pub fn default_snapshot_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(env!("CARGO_PKG_NAME"))
        .join("snapshots")
}

impl Default for Configuration {
    /// **(Unusual!)**
    /// Returns nettune's hard-wired configuration defaults.
    fn default() -> Self {
        Self {
            snapshot_dir: default_snapshot_dir().to_string_lossy().into(),
            probe_target: "8.8.8.8".into(),
            probe_count: crate::os::DEFAULT_PROBE_COUNT,
            bandwidth_gbps: crate::bdp::DEFAULT_BANDWIDTH_GBPS,
            iperf_server: "iperf.he.net".into(),
            iperf_duration: 5,
            iperf_connect_timeout: 5,
            iperf_timeout: 15,
            congestion: String::new(),
            use_sudo: true,
        }
    }
}

impl Configuration {
    /// The snapshot directory as a path
    #[must_use]
    pub fn snapshot_path(&self) -> PathBuf {
        PathBuf::from(&self.snapshot_dir)
    }

    /// Congestion algorithm to select, if any
    #[must_use]
    pub fn congestion(&self) -> Option<&str> {
        Some(self.congestion.trim()).filter(|c| !c.is_empty())
    }

    /// Checks values that deserialise cleanly but make no sense
    ///
    /// # Errors
    /// Names the first offending field.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.bandwidth_gbps.is_finite() && self.bandwidth_gbps > 0.0) {
            anyhow::bail!(
                "bandwidth_gbps must be a positive number of Gbit/s (got {})",
                self.bandwidth_gbps
            );
        }
        Ok(())
    }

    /// Accessor for `iperf_timeout`, as a Duration
    #[must_use]
    pub fn iperf_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.iperf_timeout.into())
    }
}

/// Helper function for `figment::Provider` implementation
///
/// If the given `arg` is not None, inserts it into `dict` with key `arg_name`.
fn insert_if_some<T>(dict: &mut Dict, arg_name: &str, arg: Option<T>) -> Result<(), figment::Error>
where
    T: serde::Serialize,
{
    if let Some(a) = arg {
        let _ = dict.insert(arg_name.to_string(), Value::serialize(a)?);
    }
    Ok(())
}

/// Configuration values given on the command line.
///
/// Only the values the user actually entered are provided to the figment,
/// so wherever they did not, values from lower-priority sources obtain.
#[derive(Debug, Clone, Default, PartialEq, clap::Args)]
pub struct ConfigOverrides {
    /// Directory holding configuration snapshots
    #[arg(long, global = true, value_name = "DIR", help_heading("Configuration"))]
    pub snapshot_dir: Option<String>,

    /// Number of echo requests per RTT probe
    #[arg(long, global = true, value_name = "N", help_heading("Configuration"))]
    pub probe_count: Option<u16>,

    /// Congestion control algorithm to select when applying the high-speed preset (Linux only)
    #[arg(long, global = true, value_name = "alg", help_heading("Configuration"))]
    pub congestion: Option<String>,

    /// Never prefix privileged commands with `sudo`
    #[arg(long, global = true, action, help_heading("Configuration"))]
    pub no_sudo: bool,

    /// Set by subcommand options
    #[arg(skip)]
    pub probe_target: Option<String>,
    /// Set by subcommand options
    #[arg(skip)]
    pub bandwidth_gbps: Option<f64>,
    /// Set by subcommand options
    #[arg(skip)]
    pub iperf_server: Option<String>,
}

impl ConfigOverrides {
    const META_NAME: &str = "command line";
}

impl Provider for ConfigOverrides {
    fn metadata(&self) -> Metadata {
        Metadata::named(Self::META_NAME)
    }

    fn data(&self) -> Result<Map<Profile, Dict>, figment::Error> {
        let mut dict = Dict::new();
        insert_if_some(&mut dict, "snapshot_dir", self.snapshot_dir.clone())?;
        insert_if_some(&mut dict, "probe_count", self.probe_count)?;
        insert_if_some(&mut dict, "congestion", self.congestion.clone())?;
        insert_if_some(&mut dict, "use_sudo", self.no_sudo.then_some(false))?;
        insert_if_some(&mut dict, "probe_target", self.probe_target.clone())?;
        insert_if_some(&mut dict, "bandwidth_gbps", self.bandwidth_gbps)?;
        insert_if_some(&mut dict, "iperf_server", self.iperf_server.clone())?;
        Ok(Profile::Default.collect(dict))
    }
}

#[cfg(test)]
mod test {
    use figment::Provider as _;

    use super::{ConfigOverrides, Configuration};

    #[test]
    fn defaults() {
        let c = Configuration::default();
        assert_eq!(c.probe_target, "8.8.8.8");
        assert_eq!(c.probe_count, 4);
        assert_eq!(c.iperf_server, "iperf.he.net");
        assert!(c.snapshot_dir.ends_with("snapshots"));
        assert!(c.congestion().is_none());
        assert!(c.use_sudo);
    }

    #[test]
    fn congestion_accessor() {
        let c = Configuration {
            congestion: " bbr ".into(),
            ..Default::default()
        };
        assert_eq!(c.congestion(), Some("bbr"));
    }

    #[test]
    fn bandwidth_must_be_positive() {
        assert!(Configuration::default().validate().is_ok());
        for bad in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            let c = Configuration {
                bandwidth_gbps: bad,
                ..Default::default()
            };
            let e = c.validate().unwrap_err();
            assert!(e.to_string().contains("bandwidth_gbps"));
        }
    }

    #[test]
    fn only_entered_values_are_provided() {
        let o = ConfigOverrides {
            probe_count: Some(2),
            no_sudo: true,
            ..Default::default()
        };
        let data = o.data().unwrap();
        let dict = &data[&figment::Profile::Default];
        assert_eq!(dict.len(), 2);
        assert!(dict.contains_key("probe_count"));
        assert!(dict.contains_key("use_sudo"));
        assert!(ConfigOverrides::default()
            .data()
            .unwrap()
            .values()
            .all(figment::value::Dict::is_empty));
    }
}
