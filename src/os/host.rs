// The running host, as seen through a Platform
// (c) 2024 NetTune contributors

use anyhow::{Context as _, Result};
use tracing::debug;

use super::{
    parse_ping_average, CommandRunner, Interface, NetworkFacts, OsFamily, Platform, RttProbe,
    SystemMutator, SystemRunner, Tunable,
};

/// Number of echo requests a probe sends, unless configured otherwise
pub const DEFAULT_PROBE_COUNT: u16 = 4;

/// Production implementation of [`NetworkFacts`], [`RttProbe`] and [`SystemMutator`].
#[derive(Debug)]
pub struct HostSystem<R: CommandRunner = SystemRunner> {
    platform: Box<dyn Platform>,
    runner: R,
    probe_count: u16,
}

impl<R: CommandRunner> HostSystem<R> {
    /// Constructor
    #[must_use]
    pub fn new(platform: Box<dyn Platform>, runner: R) -> Self {
        Self {
            platform,
            runner,
            probe_count: DEFAULT_PROBE_COUNT,
        }
    }

    /// Sets the number of echo requests sent by [`RttProbe::probe`]
    #[must_use]
    pub fn with_probe_count(mut self, count: u16) -> Self {
        self.probe_count = count.max(1);
        self
    }

    /// Access to the underlying platform
    #[must_use]
    pub fn platform(&self) -> &dyn Platform {
        self.platform.as_ref()
    }

    /// The command runner in use
    #[must_use]
    pub fn runner(&self) -> &R {
        &self.runner
    }
}

impl<R: CommandRunner> NetworkFacts for HostSystem<R> {
    fn family(&self) -> OsFamily {
        self.platform.family()
    }

    fn buffer_parameters(&self) -> &'static [Tunable] {
        self.platform.buffer_parameters()
    }

    fn default_interface(&self) -> Option<String> {
        self.platform.default_interface(&self.runner)
    }

    fn interfaces(&self) -> Vec<Interface> {
        self.platform.interfaces(&self.runner)
    }

    fn mtu(&self, interface: &str) -> Option<String> {
        self.platform.mtu(&self.runner, interface)
    }

    fn link_speed(&self, interface: &str) -> Option<String> {
        self.platform.link_speed(&self.runner, interface)
    }

    fn tcp_buffers(&self) -> Vec<(String, Option<String>)> {
        self.platform
            .buffer_parameters()
            .iter()
            .map(|t| {
                (
                    t.label.to_string(),
                    self.platform.read_sysctl(&self.runner, t.oid),
                )
            })
            .collect()
    }

    fn congestion_control(&self) -> Option<String> {
        self.platform.congestion_control(&self.runner)
    }

    fn cpu_governor(&self) -> Option<String> {
        self.platform.cpu_governor()
    }

    fn total_memory(&self) -> Option<u64> {
        self.platform.total_memory(&self.runner)
    }
}

impl<R: CommandRunner> RttProbe for HostSystem<R> {
    fn probe(&self, target: &str) -> Result<f64> {
        let cmd = self.platform.ping_command(target, self.probe_count);
        debug!("probing RTT: {cmd}");
        let out = self
            .runner
            .run_line(&cmd)
            .with_context(|| format!("ping {target} failed"))?;
        parse_ping_average(&out)
            .with_context(|| format!("could not find an RTT summary in ping output for {target}"))
    }
}

impl<R: CommandRunner> SystemMutator for HostSystem<R> {
    fn set_sysctl(&self, oid: &str, value: &str) -> Result<()> {
        let assignment = format!("{oid}={value}");
        let _ = self
            .runner
            .run_privileged("sysctl", &["-w", assignment.as_str()])?;
        Ok(())
    }

    fn set_mtu(&self, interface: &str, mtu: &str) -> Result<()> {
        let cmd = self.platform.set_mtu_command(interface, mtu);
        let _ = self.runner.run_line_privileged(&cmd)?;
        Ok(())
    }
}
