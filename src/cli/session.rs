// Command implementations shared by the CLI and the interactive menu
// (c) 2024 NetTune contributors

use anstream::println;
use anyhow::{Context as _, Result};
use human_repr::HumanCount as _;
use num_format::{Locale, ToFormattedString as _};
use owo_colors::OwoColorize as _;
use tabled::{settings::style::Style, Table, Tabled};
use tracing::error;

use crate::apply::{ApplyOutcome, Confirmation, Mutation};
use crate::bdp::{self, RttMeasurement, RttSource};
use crate::config::Configuration;
use crate::diagnosis::{self, Diagnosis, EXPLANATIONS};
use crate::guideline::{self, BufferGuideline};
use crate::message::{self, Message};
use crate::os::{self, HostSystem, Interface, NetworkFacts as _, SystemRunner};
use crate::snapshot::{
    ConfigSnapshot, SnapshotId, SnapshotStore, INTERFACE_NOT_FOUND, UNKNOWN, VALUE_NOT_FOUND,
};
use crate::styles::HEADING;
use crate::throughput::{self, IperfParams, ThroughputError, INSTALL_HINTS};
use crate::tuning::{Preset, Tuner};

#[derive(Tabled)]
struct Row {
    #[tabled(rename = "Setting")]
    setting: String,
    #[tabled(rename = "Value")]
    value: String,
}

impl Row {
    fn new<S: Into<String>, V: Into<String>>(setting: S, value: V) -> Self {
        Self {
            setting: setting.into(),
            value: value.into(),
        }
    }
}

#[derive(Tabled)]
struct InterfaceRow {
    #[tabled(rename = "Interface")]
    name: String,
    #[tabled(rename = "IPv4 address")]
    ipv4: String,
    #[tabled(rename = "Status")]
    status: &'static str,
}

fn table<T: Tabled>(rows: impl IntoIterator<Item = T>) -> String {
    Table::new(rows).with(Style::sharp()).to_string()
}

fn heading(title: &str) {
    println!("\n{HEADING}{title}{HEADING:#}");
}

fn bytes(n: u64) -> String {
    n.to_formatted_string(&Locale::en)
}

fn or_sentinel(value: Option<&str>, sentinel: &str) -> String {
    value.unwrap_or(sentinel).to_string()
}

fn mtu_cell(d: &Diagnosis) -> String {
    let mut mtu = or_sentinel(d.mtu.as_deref(), UNKNOWN);
    if d.has_jumbo_frames() {
        mtu.push_str(" (jumbo frames)");
    }
    mtu
}

fn guideline_rows(g: &BufferGuideline) -> [Row; 2] {
    [
        Row::new(
            "Total memory",
            format!(
                "{:.2} GB ({})",
                g.total_memory_gb(),
                g.total_memory_bytes.human_count_bytes()
            ),
        ),
        Row::new(
            "Suggested max buffer",
            format!("{:.2} MB ({} bytes)", g.mb, bytes(g.bytes)),
        ),
    ]
}

/// Everything a command needs: configuration, the host, and the snapshot store
#[derive(Debug)]
pub(crate) struct Session {
    config: Configuration,
    host: HostSystem,
    store: SnapshotStore,
    assume_yes: bool,
}

impl Session {
    pub(crate) fn new(config: Configuration, assume_yes: bool) -> Result<Self> {
        let platform = os::detect()?;
        let host = HostSystem::new(platform, SystemRunner::new(config.use_sudo))
            .with_probe_count(config.probe_count);
        let store = SnapshotStore::new(config.snapshot_path());
        Ok(Self {
            config,
            host,
            store,
            assume_yes,
        })
    }

    pub(crate) fn config(&self) -> &Configuration {
        &self.config
    }

    pub(crate) fn store(&self) -> &SnapshotStore {
        &self.store
    }

    fn tuner(&self) -> Tuner<'_, HostSystem, HostSystem> {
        Tuner::new(&self.host, &self.host, self.host.platform(), &self.store)
    }

    fn now() -> chrono::NaiveDateTime {
        chrono::Local::now().naive_local()
    }

    /// Asks the user to confirm, unless they already said yes on the command line.
    /// The answer defaults to no.
    pub(crate) fn confirm(&self, prompt: &str) -> Result<Option<Confirmation>> {
        if self.assume_yes {
            return Ok(Confirmation::affirm(true));
        }
        let answer = dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()?;
        if !answer {
            Message::Cancelled.show();
        }
        Ok(Confirmation::affirm(answer))
    }

    fn report(&self, outcome: &ApplyOutcome) -> bool {
        for m in message::for_outcome(outcome) {
            m.show();
        }
        Message::Persist(self.host.platform().persistence_hint()).show();
        outcome.is_success()
    }

    fn preview(changes: &[Mutation]) {
        for m in changes {
            println!("  {m}");
        }
    }

    // DIAGNOSIS /////////////////////////////////////////////////////////////////////////

    pub(crate) fn diagnose(&self, interface: Option<&str>) {
        let d = diagnosis::diagnose(&self.host, interface);
        heading("Network diagnosis");
        println!("{}", table(Self::diagnosis_rows(&d)));
        for tip in d.tips() {
            Message::Tip(tip).show();
            if let Some(cmd) = tip.remedy(d.family) {
                Message::Remedy(cmd).show();
            }
        }
    }

    fn diagnosis_rows(d: &Diagnosis) -> Vec<Row> {
        let mut rows = vec![
            Row::new("Operating system", d.family.to_string()),
            Row::new(
                "Interface",
                or_sentinel(d.interface.as_deref(), INTERFACE_NOT_FOUND),
            ),
        ];
        if d.interface.is_some() {
            rows.push(Row::new(
                "Link speed",
                or_sentinel(d.link_speed.as_deref(), UNKNOWN),
            ));
            rows.push(Row::new("MTU", mtu_cell(d)));
        }
        rows.extend(
            d.buffers
                .iter()
                .map(|(k, v)| Row::new(k.as_str(), or_sentinel(v.as_deref(), VALUE_NOT_FOUND))),
        );
        rows.push(Row::new(
            "Congestion control",
            or_sentinel(d.congestion.as_deref(), UNKNOWN),
        ));
        rows.push(Row::new(
            "CPU governor",
            or_sentinel(d.governor.as_deref(), UNKNOWN),
        ));
        if let Some(g) = &d.guideline {
            rows.extend(guideline_rows(g));
        }
        rows
    }

    /// The host's interfaces, and the name of the default-route interface
    pub(crate) fn interfaces(&self) -> (Vec<Interface>, Option<String>) {
        (self.host.interfaces(), self.host.default_interface())
    }

    pub(crate) fn list_interfaces(&self) {
        let rows: Vec<_> = self
            .host
            .interfaces()
            .into_iter()
            .map(|i| InterfaceRow {
                name: i.name,
                ipv4: i.ipv4.unwrap_or_else(|| "-".into()),
                status: if i.up { "up" } else { "down" },
            })
            .collect();
        heading("Network interfaces");
        println!("{}", table(rows));
    }

    // SIZING ////////////////////////////////////////////////////////////////////////////

    pub(crate) fn probe_rtt(&self, target: Option<&str>) -> RttMeasurement {
        let target = target.unwrap_or(&self.config.probe_target);
        println!("Measuring RTT to {target}...");
        let rtt = RttMeasurement::probe(&self.host, target);
        if let RttSource::Fallback(t) = &rtt.source {
            Message::RttFallback(t).show();
        }
        rtt
    }

    pub(crate) fn bdp(&self, rtt: &RttMeasurement, bandwidth_gbps: f64) {
        let result = bdp::compute(bandwidth_gbps, rtt.rtt_ms);
        let source = match &rtt.source {
            RttSource::Probed(t) => format!("measured to {t}"),
            RttSource::Fallback(t) => format!("assumed; {t} did not respond"),
            RttSource::Region(r) => format!("typical for {}", r.describe()),
            RttSource::Given => "as given".into(),
        };
        heading("Bandwidth-delay product");
        let mut rows = vec![
            Row::new("Bandwidth", format!("{} Gbps", result.bandwidth_gbps)),
            Row::new("RTT", format!("{:.1} ms ({source})", result.rtt_ms)),
            Row::new(
                "BDP",
                format!("{:.2} MB ({} bytes)", result.bdp_mb, bytes(result.bdp_bytes)),
            ),
        ];
        let g = self.host.total_memory().map(guideline::recommend);
        if let Some(g) = &g {
            rows.extend(guideline_rows(g));
        }
        println!("{}", table(rows));
        println!(
            "A single TCP flow needs socket buffers of at least {} to fill this path.",
            result.bdp_bytes.human_count_bytes().bold()
        );
        if g.is_some_and(|g| g.bytes < result.bdp_bytes) {
            println!(
                "{}",
                "This exceeds the memory-based guideline; consider more parallel streams.".yellow()
            );
        }
    }

    pub(crate) fn guideline(&self, memory: Option<u64>) -> Result<()> {
        let memory = memory
            .or_else(|| self.host.total_memory())
            .context("could not determine total memory; try --memory")?;
        heading("Buffer guideline");
        println!("{}", table(guideline_rows(&guideline::recommend(memory))));
        Ok(())
    }

    // SNAPSHOTS /////////////////////////////////////////////////////////////////////////

    pub(crate) fn snapshot_save(&self, label: Option<&str>) -> Result<()> {
        let snapshot = ConfigSnapshot::capture(&self.host, Self::now());
        let id = self.store.save(&snapshot, label)?;
        Message::SnapshotSaved(&id).show();
        Ok(())
    }

    pub(crate) fn snapshot_list(&self) -> Result<Vec<SnapshotId>> {
        let ids = self.store.list()?;
        if ids.is_empty() {
            Message::NoSnapshots.show();
        } else {
            heading(&format!("Snapshots in {}", self.store.dir().display()));
            for (i, id) in ids.iter().enumerate() {
                println!("{:>3}. {id}", i + 1);
            }
        }
        Ok(ids)
    }

    pub(crate) fn snapshot_show(&self, id: &SnapshotId) -> Result<()> {
        let s = self.store.load(id)?;
        heading(&format!("Snapshot {id}"));
        let mut rows = vec![
            Row::new("Operating system", s.metadata.os.as_str()),
            Row::new("Captured", s.metadata.timestamp.as_str()),
            Row::new("Interface", s.metadata.interface.as_str()),
        ];
        rows.extend(
            s.settings
                .tcp_buffers
                .iter()
                .map(|(k, v)| Row::new(k.as_str(), v.as_str())),
        );
        rows.push(Row::new(
            "Congestion control",
            s.settings.congestion_control.as_str(),
        ));
        rows.push(Row::new("MTU", s.settings.mtu.as_str()));
        println!("{}", table(rows));
        Ok(())
    }

    pub(crate) fn snapshot_restore(&self, id: &SnapshotId) -> Result<bool> {
        let snapshot = self.store.load(id)?;
        let plan = crate::snapshot::plan_restore(&snapshot, self.host.buffer_parameters());
        heading(&format!("Restoring {id}"));
        Self::preview(&plan.mutations);
        let Some(yes) = self.confirm("Apply these settings? (requires sudo)")? else {
            return Ok(true);
        };
        let outcome = self.tuner().restore(&snapshot, Self::now(), yes);
        Ok(self.report(&outcome))
    }

    pub(crate) fn snapshot_delete(&self, id: &SnapshotId) -> Result<bool> {
        let Some(yes) = self.confirm(&format!("Delete snapshot {id}?"))? else {
            return Ok(true);
        };
        self.store.delete(id, yes)?;
        Message::SnapshotDeleted(id).show();
        Ok(true)
    }

    // TUNING ////////////////////////////////////////////////////////////////////////////

    pub(crate) fn tune(&self, preset: Preset) -> Result<bool> {
        let max_buffer = preset
            .max_buffer(self.host.total_memory())
            .context("could not determine total memory for the memory-based preset")?;
        let tuner = self.tuner();
        let congestion = self.config.congestion();
        let changes = tuner.preset_changes(max_buffer, congestion);
        heading(&format!(
            "High-speed tuning: {preset} preset, max buffer {} bytes",
            bytes(max_buffer)
        ));
        Self::preview(&changes);
        let Some(yes) = self.confirm("Apply these settings? (requires sudo)")? else {
            return Ok(true);
        };
        let outcome = tuner.apply_preset(max_buffer, congestion, Self::now(), yes);
        Ok(self.report(&outcome))
    }

    pub(crate) fn reset(&self) -> Result<bool> {
        heading("Reset to stock settings");
        Self::preview(&self.host.platform().stock_defaults());
        let Some(yes) = self.confirm("Reset network settings to defaults? (requires sudo)")? else {
            return Ok(true);
        };
        let outcome = self.tuner().reset_defaults(Self::now(), yes);
        Ok(self.report(&outcome))
    }

    // THROUGHPUT ////////////////////////////////////////////////////////////////////////

    /// Runs the throughput test against `server`, or the configured server
    pub(crate) fn iperf(&self, server: Option<&str>) -> bool {
        let mut params = IperfParams::from(&self.config);
        if let Some(server) = server {
            params.server = server.to_string();
        }
        heading(&format!("Throughput test against {}", params.server));
        println!("This takes about {} seconds...", params.duration);
        match throughput::measure(self.host.runner(), &params) {
            Ok(report) => {
                match report.receiver {
                    Some(line) => println!("{}", line.green()),
                    None => println!("{}", report.output),
                }
                true
            }
            Err(ThroughputError::NotInstalled) => {
                Message::IperfMissing.show();
                for (system, cmd) in INSTALL_HINTS {
                    println!("  {system}: {}", cmd.bold());
                }
                false
            }
            Err(e) => {
                error!("{e}");
                false
            }
        }
    }

    // GUIDE /////////////////////////////////////////////////////////////////////////////

    pub(crate) fn explain(&self) {
        heading("Network tuning guide");
        for topic in EXPLANATIONS {
            println!("\n{}", topic.title.bold());
            for line in topic.body {
                println!("  {line}");
            }
        }
        println!(
            "\n{}\n  {}",
            "Making changes permanent".bold(),
            self.host.platform().persistence_hint()
        );
    }
}

#[cfg(test)]
mod test {
    use super::mtu_cell;
    use crate::diagnosis::diagnose;
    use crate::snapshot::test::FakeFacts;

    #[test]
    fn mtu_cell_marks_jumbo_frames() {
        let mut d = diagnose(&FakeFacts::default(), Some("eth0"));
        d.mtu = Some("9000".into());
        assert_eq!(mtu_cell(&d), "9000 (jumbo frames)");
        d.mtu = Some("1500".into());
        assert_eq!(mtu_cell(&d), "1500");
        d.mtu = None;
        assert_eq!(mtu_cell(&d), "Unknown");
    }
}
